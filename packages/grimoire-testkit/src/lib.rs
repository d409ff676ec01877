//! Test helpers: throwaway Postgres databases and in-memory store implementations.

pub mod memory;

mod database;
mod error;

pub use database::TestDatabase;
pub use error::{Error, Result};
pub use memory::{MemoryFileStore, MemoryIndex, MemoryMetadataStore};

use std::env;

pub fn env_dsn() -> Option<String> {
	env::var("GRIMOIRE_PG_DSN").ok()
}

pub fn env_qdrant_url() -> Option<String> {
	env::var("GRIMOIRE_QDRANT_URL").ok()
}
