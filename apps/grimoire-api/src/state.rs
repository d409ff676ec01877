use std::sync::Arc;

use grimoire_service::{GrimoireService, Providers};
use grimoire_storage::{db::Db, files::LocalFileStore, index::SearchIndex, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<GrimoireService>,
}
impl AppState {
	/// Connects every backend and applies the schema.
	///
	/// An unreachable search index is logged, not fatal; searches degrade until it returns.
	pub async fn new(config: grimoire_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;

		if let Err(err) = qdrant.ensure_ready().await {
			tracing::warn!(error = %err, "Search index is not ready. Searches will degrade.");
		}

		let files = LocalFileStore::new(config.storage.files.root.clone());

		files.ensure_root().await?;

		let providers = Providers::from_config(&config.providers.embedding)?;
		let service = GrimoireService::new(
			config,
			Arc::new(db),
			Arc::new(qdrant),
			Arc::new(files),
			providers,
		);

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: GrimoireService) -> Self {
		Self { service: Arc::new(service) }
	}

	pub fn api_token(&self) -> Option<&str> {
		self.service.cfg.security.api_auth_token.as_deref()
	}

	pub fn admin_token(&self) -> Option<&str> {
		self.service.cfg.security.admin_auth_token.as_deref()
	}
}
