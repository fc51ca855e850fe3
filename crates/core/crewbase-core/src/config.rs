//! Configuration management and environment variable loading

use crate::{CrewbaseError, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Load environment variables from .env file
///
/// Looks in the current directory and its parents. Returns the path that was
/// loaded, or `None` when there is no file and the process environment is
/// used as-is. Does not log; call it before [`crate::init_logging`] so log
/// settings in `.env` apply.
///
/// # Example
///
/// ```no_run
/// use crewbase_core::{init_logging, load_env};
///
/// let loaded = load_env().ok().flatten();
/// init_logging();
/// if let Some(path) = loaded {
///     tracing::info!("Loaded environment from: {}", path.display());
/// }
/// ```
pub fn load_env() -> Result<Option<PathBuf>> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(dotenvy::Error::LineParse(line, pos)) => Err(CrewbaseError::config(format!(
            "Failed to parse .env file at line {}, position {}",
            line, pos
        ))),
        Err(dotenvy::Error::Io(_)) => Ok(None),
        Err(e) => Err(CrewbaseError::config(format!(
            "Failed to load .env file: {}",
            e
        ))),
    }
}

/// Load environment variables from a specific file
///
/// Variables already present in the process environment win.
pub fn load_env_from_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    dotenvy::from_path(path.as_ref()).map_err(|e| {
        CrewbaseError::config(format!(
            "Failed to load {} environment file: {}",
            path.as_ref().display(),
            e
        ))
    })?;
    Ok(path.as_ref().to_path_buf())
}

/// Get required environment variable
///
/// Unset and empty values are both reported as
/// [`CrewbaseError::ConfigurationMissing`].
pub fn get_required_env(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(CrewbaseError::configuration_missing(format!(
            "Required environment variable '{}' is not set. \
             Check your .env file or system environment.",
            key
        ))),
    }
}

/// Get optional environment variable with default
pub fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get environment variable as boolean
pub fn get_env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

/// Validate that required environment variables are set
pub fn validate_env(required_vars: &[&str]) -> Result<()> {
    let missing: Vec<&str> = required_vars
        .iter()
        .copied()
        .filter(|var| env::var(var).map(|v| v.trim().is_empty()).unwrap_or(true))
        .collect();

    if !missing.is_empty() {
        return Err(CrewbaseError::configuration_missing(format!(
            "Missing required environment variables: {}\n\
             Run 'supabase-ctl env-template' to create a .env file",
            missing.join(", ")
        )));
    }

    Ok(())
}
