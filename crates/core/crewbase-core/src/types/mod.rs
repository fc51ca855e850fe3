//! Shared types

pub mod memory;
pub mod record;

pub use memory::ExternalMemory;
pub use record::{record_from_value, FilterSet, Record};
