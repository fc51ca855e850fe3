//! Crewbase Core
//!
//! Shared building blocks for the Crewbase data access crates:
//!
//! - A single error type covering configuration and remote service failures
//! - Environment and `.env` loading helpers
//! - Logging initialization
//! - The record/filter vocabulary and the external memory interface
//!
//! # Example
//!
//! ```no_run
//! use crewbase_core::*;
//!
//! fn main() -> Result<()> {
//!     load_env()?;
//!     init_logging();
//!     let url = get_required_env("SUPABASE_URL")?;
//!     tracing::info!("Using project {}", url);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use config::{
    get_env_bool, get_env_or, get_required_env, load_env, load_env_from_path,
    validate_env,
};
pub use error::{CrewbaseError, Result};
pub use types::*;
pub use utils::logger::init_logging;
