use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub activity: Activity,
	#[serde(default)]
	pub sync: Sync,
	pub security: Security,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
	pub files: Files,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	#[serde(default = "default_collection")]
	pub collection: String,
	#[serde(default = "default_vector_dim")]
	pub vector_dim: u32,
	#[serde(default = "default_qdrant_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Files {
	/// Directory holding uploaded file bytes. Enumerated during reconciliation.
	pub root: PathBuf,
	#[serde(default = "default_max_upload_bytes")]
	pub max_upload_bytes: u64,
	/// Lowercase extensions accepted on upload. Empty accepts any extension.
	#[serde(default = "default_allowed_extensions")]
	pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	/// `http` for an OpenAI-compatible endpoint, `local` for the in-process n-gram embedder.
	pub provider_id: String,
	#[serde(default)]
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	#[serde(default = "default_embedding_path")]
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	#[serde(default = "default_embedding_timeout_ms")]
	pub timeout_ms: u64,
	#[serde(default = "default_max_concurrency")]
	pub max_concurrency: u32,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Search {
	pub page_size: u32,
	pub knn_k: u32,
	pub candidate_pool: u32,
	pub index_timeout_ms: u64,
}
impl Default for Search {
	fn default() -> Self {
		Self { page_size: 10, knn_k: 100, candidate_pool: 500, index_timeout_ms: 3_000 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Activity {
	pub recent_retention: u32,
	pub recent_limit: u32,
}
impl Default for Activity {
	fn default() -> Self {
		Self { recent_retention: 50, recent_limit: 6 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Sync {
	pub poll_interval_ms: u64,
	pub batch_size: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
	/// Delete metadata rows whose file no longer exists during reconciliation.
	pub prune_metadata: bool,
}
impl Default for Sync {
	fn default() -> Self {
		Self {
			poll_interval_ms: 1_000,
			batch_size: 32,
			base_backoff_ms: 500,
			max_backoff_ms: 30_000,
			prune_metadata: true,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
	pub api_auth_token: Option<String>,
	pub admin_auth_token: Option<String>,
	#[serde(default = "default_public_department")]
	pub public_department: String,
}

fn default_collection() -> String {
	"grimoire_files".to_string()
}

fn default_vector_dim() -> u32 {
	384
}

fn default_qdrant_timeout_ms() -> u64 {
	3_000
}

fn default_max_upload_bytes() -> u64 {
	50 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
	["pdf", "txt", "docx", "doc"].into_iter().map(String::from).collect()
}

fn default_embedding_path() -> String {
	"/embeddings".to_string()
}

fn default_embedding_timeout_ms() -> u64 {
	10_000
}

fn default_max_concurrency() -> u32 {
	4
}

fn default_public_department() -> String {
	"public".to_string()
}
