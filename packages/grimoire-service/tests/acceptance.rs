mod acceptance {
	mod activity;
	mod filters;
	mod metadata_sync;
	mod search_scoping;
	mod upload;
	mod users;

	use std::sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	};

	use time::{Date, OffsetDateTime};
	use uuid::Uuid;

	use grimoire_domain::{access::Identity, tags::TagSet};
	use grimoire_service::{BoxFuture, EmbeddingProvider, GrimoireService, Providers};
	use grimoire_storage::metadata::MetadataStore;
	use grimoire_testkit::{MemoryFileStore, MemoryIndex, MemoryMetadataStore};

	pub const VECTOR_DIM: u32 = 64;

	pub fn test_config() -> grimoire_config::Config {
		grimoire_config::Config {
			service: grimoire_config::Service {
				http_bind: "127.0.0.1:0".to_string(),
				admin_bind: "127.0.0.1:0".to_string(),
				log_level: "info".to_string(),
			},
			storage: grimoire_config::Storage {
				postgres: grimoire_config::Postgres {
					dsn: "postgres://unused".to_string(),
					pool_max_conns: 1,
				},
				qdrant: grimoire_config::Qdrant {
					url: "http://127.0.0.1:6334".to_string(),
					collection: "grimoire_acceptance".to_string(),
					vector_dim: VECTOR_DIM,
					timeout_ms: 1_000,
				},
				files: grimoire_config::Files {
					root: "unused".into(),
					max_upload_bytes: 1_024,
					allowed_extensions: vec!["pdf".to_string(), "txt".to_string()],
				},
			},
			providers: grimoire_config::Providers {
				embedding: grimoire_config::EmbeddingProviderConfig {
					provider_id: "local".to_string(),
					api_base: String::new(),
					api_key: String::new(),
					path: "/embeddings".to_string(),
					model: "ngram".to_string(),
					dimensions: VECTOR_DIM,
					timeout_ms: 1_000,
					max_concurrency: 2,
					default_headers: Default::default(),
				},
			},
			search: grimoire_config::Search {
				page_size: 10,
				knn_k: 100,
				candidate_pool: 500,
				index_timeout_ms: 1_000,
			},
			activity: grimoire_config::Activity { recent_retention: 50, recent_limit: 6 },
			sync: grimoire_config::Sync {
				poll_interval_ms: 10,
				batch_size: 4,
				base_backoff_ms: 1,
				max_backoff_ms: 10,
				prune_metadata: true,
			},
			security: grimoire_config::Security {
				bind_localhost_only: true,
				api_auth_token: None,
				admin_auth_token: None,
				public_department: "public".to_string(),
			},
		}
	}

	pub struct Harness {
		pub service: GrimoireService,
		pub metadata: Arc<MemoryMetadataStore>,
		pub index: Arc<MemoryIndex>,
		pub files: Arc<MemoryFileStore>,
	}
	impl Harness {
		pub fn new() -> Self {
			Self::with_config(test_config())
		}

		pub fn with_config(cfg: grimoire_config::Config) -> Self {
			let providers = Providers::from_config(&cfg.providers.embedding)
				.expect("Failed to build local embedding provider.");

			Self::with_providers(cfg, providers)
		}

		pub fn with_providers(cfg: grimoire_config::Config, providers: Providers) -> Self {
			let metadata = Arc::new(MemoryMetadataStore::new());
			let index = Arc::new(MemoryIndex::new());
			let files = Arc::new(MemoryFileStore::new());
			let service =
				GrimoireService::new(cfg, metadata.clone(), index.clone(), files.clone(), providers);

			Self { service, metadata, index, files }
		}

		/// Stores a file dated today with the given identity fields and tags.
		pub async fn seed(&self, name: &str, owner: &str, department: &str, tags: &[&str]) {
			let today = OffsetDateTime::now_utc().date();

			self.seed_dated(name, owner, department, tags, today, today).await;
		}

		pub async fn seed_dated(
			&self,
			name: &str,
			owner: &str,
			department: &str,
			tags: &[&str],
			uploaded: Date,
			created: Date,
		) {
			self.files.put(name, name.as_bytes(), uploaded, created);
			self.metadata
				.save_identity(name, owner, department)
				.await
				.expect("Failed to seed identity.");

			let tags = tags.iter().copied().collect::<TagSet>();

			self.metadata.save_tags(name, &tags).await.expect("Failed to seed tags.");
		}

		pub async fn reconcile(&self) {
			self.service.reconcile_all().await.expect("Failed to rebuild index.");
		}
	}

	pub fn member(department: &str) -> Identity {
		Identity {
			user_id: Uuid::new_v4(),
			username: format!("member_{}", department.to_lowercase()),
			department: department.to_string(),
			is_admin: false,
		}
	}

	pub fn admin() -> Identity {
		Identity {
			user_id: Uuid::new_v4(),
			username: "admin".to_string(),
			department: String::new(),
			is_admin: true,
		}
	}

	pub struct FailingEmbedding {
		pub calls: Arc<AtomicUsize>,
	}
	impl FailingEmbedding {
		pub fn providers() -> Providers {
			Providers::new(Arc::new(Self { calls: Arc::new(AtomicUsize::new(0)) }))
		}
	}
	impl EmbeddingProvider for FailingEmbedding {
		fn embed<'a>(
			&'a self,
			_texts: &'a [String],
		) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Box::pin(async move { Err(color_eyre::eyre::eyre!("Embedding endpoint is down.")) })
		}
	}

	/// Returns vectors of the wrong width.
	pub struct NarrowEmbedding;
	impl EmbeddingProvider for NarrowEmbedding {
		fn embed<'a>(
			&'a self,
			texts: &'a [String],
		) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
			let vectors = texts.iter().map(|_| vec![1.0; 3]).collect();

			Box::pin(async move { Ok(vectors) })
		}
	}
}
