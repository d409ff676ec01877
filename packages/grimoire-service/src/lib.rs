//! Search orchestration, metadata sync, and per-user activity for the file catalogue.

pub mod activity;
pub mod filters;
pub mod metadata;
pub mod search;
pub mod sync;
pub mod upload;
pub mod users;
pub mod view;

mod error;

pub use activity::{FavoriteSetRequest, FavoriteState, FavoriteToggleRequest, ListResponse};
pub use error::{Error, Result};
pub use filters::FilterOptions;
pub use metadata::{
	IdentityUpdateRequest, IdentityUpdateResponse, TagUpdateRequest, TagUpdateResponse,
};
pub use search::{SearchFilters, SearchRequest, SearchResponse};
pub use sync::{RebuildReport, SyncOutcome};
pub use upload::UploadResponse;
pub use users::{ProvisionUserRequest, UserView};
pub use view::FileView;

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use time::{Date, OffsetDateTime};
use tokio::sync::Semaphore;

use grimoire_config::{Config, EmbeddingProviderConfig};
use grimoire_domain::access::AccessPolicy;
use grimoire_providers::{embedding::HttpEmbedder, local::NgramEmbedder};
use grimoire_storage::{files::FileStore, index::SearchIndex, metadata::MetadataStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	/// One vector per input text, in input order.
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}

	/// Builds the configured provider once; it is shared by every request afterwards.
	pub fn from_config(cfg: &EmbeddingProviderConfig) -> Result<Self> {
		let backend = match cfg.provider_id.as_str() {
			"http" => EmbeddingBackend::Http(HttpEmbedder::new(cfg).map_err(|err| {
				Error::invalid(format!("Embedding provider configuration is invalid: {err}."))
			})?),
			"local" => EmbeddingBackend::Local(NgramEmbedder::new(cfg.dimensions)),
			other => {
				return Err(Error::invalid(format!("Unknown embedding provider {other:?}.")));
			},
		};
		let permits = Semaphore::new(cfg.max_concurrency.max(1) as usize);

		Ok(Self::new(Arc::new(DefaultProviders { backend, permits })))
	}
}

enum EmbeddingBackend {
	Http(HttpEmbedder),
	Local(NgramEmbedder),
}

struct DefaultProviders {
	backend: EmbeddingBackend,
	permits: Semaphore,
}
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			let _permit = self.permits.acquire().await?;

			match &self.backend {
				EmbeddingBackend::Http(embedder) => Ok(embedder.embed(texts).await?),
				EmbeddingBackend::Local(embedder) => Ok(embedder.embed_many(texts)),
			}
		})
	}
}

pub struct GrimoireService {
	pub cfg: Config,
	pub policy: AccessPolicy,
	pub metadata: Arc<dyn MetadataStore>,
	pub index: Arc<dyn SearchIndex>,
	pub files: Arc<dyn FileStore>,
	pub providers: Providers,
	embedding_version: String,
}
impl GrimoireService {
	pub fn new(
		cfg: Config,
		metadata: Arc<dyn MetadataStore>,
		index: Arc<dyn SearchIndex>,
		files: Arc<dyn FileStore>,
		providers: Providers,
	) -> Self {
		let policy = AccessPolicy::new(cfg.security.public_department.clone());
		let embedding_version = grimoire_providers::embedding_version(&cfg.providers.embedding);

		Self { cfg, policy, metadata, index, files, providers, embedding_version }
	}

	pub fn embedding_version(&self) -> &str {
		&self.embedding_version
	}

	pub(crate) fn today(&self) -> Date {
		OffsetDateTime::now_utc().date()
	}

	pub(crate) fn index_timeout(&self) -> Duration {
		Duration::from_millis(self.cfg.search.index_timeout_ms)
	}

	/// Embeds texts and checks every vector against the index dimension.
	pub(crate) async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let vectors = self
			.providers
			.embedding
			.embed(texts)
			.await
			.map_err(|err| Error::EmbeddingFailure { message: err.to_string() })?;

		if vectors.len() != texts.len() {
			return Err(Error::EmbeddingFailure {
				message: "Embedding provider returned the wrong number of vectors.".to_string(),
			});
		}

		let dim = self.cfg.storage.qdrant.vector_dim as usize;

		if vectors.iter().any(|vector| vector.len() != dim) {
			return Err(Error::EmbeddingFailure {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok(vectors)
	}

	pub(crate) async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
		let mut vectors = self.embed(&[text.to_string()]).await?;

		vectors.pop().ok_or_else(|| Error::EmbeddingFailure {
			message: "Embedding provider returned no vectors.".to_string(),
		})
	}

	/// Runs an index call under the configured deadline.
	pub(crate) async fn within_deadline<T, F>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = grimoire_storage::Result<T>>,
	{
		match tokio::time::timeout(self.index_timeout(), fut).await {
			Ok(result) => result.map_err(Error::from),
			Err(_) => Err(Error::IndexUnavailable {
				message: "Search index did not answer before the deadline.".to_string(),
			}),
		}
	}
}
