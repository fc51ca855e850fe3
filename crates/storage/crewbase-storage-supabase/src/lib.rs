//! Crewbase Supabase storage
//!
//! Thin data access over Supabase's REST API (PostgREST): table-level
//! insert/query/update/delete through [`SupabaseManager`], and a key/value
//! [`SupabaseStorage`] usable as external memory for agent crews.
//!
//! ```no_run
//! use crewbase_storage_supabase::{SupabaseManager, SupabaseConfig};
//! use serde_json::json;
//!
//! # async fn run() -> crewbase_core::Result<()> {
//! let manager = SupabaseManager::new(SupabaseConfig::new(
//!     "https://your-project.supabase.co",
//!     "your-anon-key",
//! ))?;
//! let filters = json!({"agent_name": "researcher"});
//! let rows = manager.query("agent_outputs", filters.as_object()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-exports
pub use crewbase_core;

pub mod manager;
pub mod memory;
pub mod request;
pub mod supabase;

pub use manager::SupabaseManager;
pub use memory::{SupabaseStorage, DEFAULT_SEARCH_LIMIT};
pub use request::{Filter, TableOperation, TableRequest};
pub use supabase::{HttpTransport, PostgrestTransport, ServiceResponse, SupabaseConfig};
