//! Supabase control tool for Crewbase deployments
//!
//! Checks that a deployment has its Supabase configuration in place, writes a
//! `.env` template, and runs single table operations from the shell.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use crewbase_core::{record_from_value, validate_env, FilterSet, Record};
use crewbase_storage_supabase::supabase::{
    SUPABASE_ALLOW_UNSCOPED_VAR, SUPABASE_KEY_VAR, SUPABASE_MEMORY_TABLE_VAR,
    SUPABASE_SCHEMA_VAR, SUPABASE_TIMEOUT_VAR, SUPABASE_URL_VAR,
};
use crewbase_storage_supabase::{SupabaseConfig, SupabaseManager};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Environment file to load before running
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate configuration and ping the REST endpoint
    Check,

    /// Write a .env template with the Supabase variables
    EnvTemplate {
        /// Output file path
        #[arg(short, long, default_value = ".env")]
        output: PathBuf,

        /// Force overwrite if file exists
        #[arg(short, long)]
        force: bool,
    },

    /// Insert one JSON record
    Insert {
        #[arg(short, long)]
        table: String,
        /// Record as a JSON object
        #[arg(short, long)]
        data: String,
    },

    /// Select rows, optionally filtered by key=value pairs
    Query {
        #[arg(short, long)]
        table: String,
        #[arg(short, long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,
    },

    /// Update rows matching the filters
    Update {
        #[arg(short, long)]
        table: String,
        /// Fields to set as a JSON object
        #[arg(short, long)]
        data: String,
        #[arg(short, long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,
    },

    /// Delete rows matching the filters
    Delete {
        #[arg(short, long)]
        table: String,
        #[arg(short, long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,
    },
}

/// Parse `key=value`; the value is JSON when it parses, a string otherwise
fn parse_filters(raw: &[String]) -> anyhow::Result<FilterSet> {
    let mut filters = FilterSet::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Filter '{}' must look like KEY=VALUE", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Filter '{}' has an empty key", pair);
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        filters.insert(key.to_string(), value);
    }
    Ok(filters)
}

fn parse_record(raw: &str) -> anyhow::Result<Record> {
    let value: Value = serde_json::from_str(raw).context("--data must be valid JSON")?;
    Ok(record_from_value(value)?)
}

fn env_template() -> String {
    format!(
        "# ========================================\n\
         # Crewbase - Supabase configuration\n\
         # ========================================\n\
         # Generated: {}\n\
         #\n\
         # Never commit this file. On Render, set the same keys under\n\
         # Environment for the service instead.\n\
         \n\
         # Required\n\
         {}=https://your-project.supabase.co\n\
         {}=\n\
         \n\
         # Optional\n\
         # {}=30\n\
         # {}=public\n\
         {}={}\n\
         {}=false\n\
         \n\
         # Logging\n\
         CREWBASE_LOG_LEVEL=info\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        SUPABASE_URL_VAR,
        SUPABASE_KEY_VAR,
        SUPABASE_TIMEOUT_VAR,
        SUPABASE_SCHEMA_VAR,
        SUPABASE_MEMORY_TABLE_VAR,
        crewbase_storage_supabase::supabase::DEFAULT_MEMORY_TABLE,
        SUPABASE_ALLOW_UNSCOPED_VAR,
    )
}

fn write_template(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        bail!("File {:?} already exists, use --force to overwrite", output);
    }
    fs::write(output, env_template()).with_context(|| format!("Failed to write {:?}", output))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(output, fs::Permissions::from_mode(0o600)) {
            tracing::warn!("Could not set file permissions on {:?}: {}", output, e);
        }
    }
    Ok(())
}

/// Load `.env` (or `--env-file`); must run before logging is initialized
fn load_environment(env_file: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    Ok(match env_file {
        Some(path) => Some(crewbase_core::load_env_from_path(path)?),
        None => crewbase_core::load_env()?,
    })
}

async fn check() -> anyhow::Result<()> {
    validate_env(&[SUPABASE_URL_VAR, SUPABASE_KEY_VAR])?;
    let config = SupabaseConfig::from_env()?;
    println!("✓ {} and {} are set", SUPABASE_URL_VAR, SUPABASE_KEY_VAR);
    println!("  project:      {}", config.url);
    println!("  memory table: {}", config.memory_table);

    let manager = SupabaseManager::new(config)?;
    if !manager.is_ready().await {
        bail!("Supabase REST endpoint did not answer; check the URL, key and network");
    }
    println!("✓ REST endpoint reachable");
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let loaded = load_environment(cli.env_file.as_deref())?;
    crewbase_core::init_logging();
    match &loaded {
        Some(path) => tracing::info!("Loaded environment from: {}", path.display()),
        None => tracing::debug!("No .env file found - using system environment variables only"),
    }

    match cli.command {
        Command::Check => check().await?,
        Command::EnvTemplate { output, force } => {
            write_template(&output, force)?;
            println!("✓ Configuration template written to: {:?}", output);
            println!("  Fill in {} before deploying", SUPABASE_KEY_VAR);
        }
        Command::Insert { table, data } => {
            let manager = SupabaseManager::from_env()?;
            print_json(&manager.insert(&table, parse_record(&data)?).await?)?;
        }
        Command::Query { table, filters } => {
            let manager = SupabaseManager::from_env()?;
            let filters = parse_filters(&filters)?;
            print_json(&manager.query(&table, Some(&filters)).await?)?;
        }
        Command::Update {
            table,
            data,
            filters,
        } => {
            let manager = SupabaseManager::from_env()?;
            let filters = parse_filters(&filters)?;
            print_json(&manager.update(&table, parse_record(&data)?, &filters).await?)?;
        }
        Command::Delete { table, filters } => {
            let manager = SupabaseManager::from_env()?;
            let filters = parse_filters(&filters)?;
            print_json(&manager.delete(&table, &filters).await?)?;
        }
    }

    Ok(())
}
