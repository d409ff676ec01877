mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Activity, Config, EmbeddingProviderConfig, Files, Postgres, Providers, Qdrant, Search,
	Security, Service, Storage, Sync,
};

use std::{fs, net::SocketAddr, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, bind) in
		[("service.http_bind", &cfg.service.http_bind), ("service.admin_bind", &cfg.service.admin_bind)]
	{
		let Ok(addr) = bind.parse::<SocketAddr>() else {
			return Err(Error::validation(format!("{label} must be a socket address.")));
		};

		if cfg.security.bind_localhost_only && !addr.ip().is_loopback() {
			return Err(Error::validation(format!(
				"{label} must be a loopback address when security.bind_localhost_only is true."
			)));
		}
	}

	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::validation("storage.postgres.dsn must be non-empty."));
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::validation("storage.postgres.pool_max_conns must be greater than zero."));
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::validation("storage.qdrant.collection must be non-empty."));
	}
	if cfg.storage.files.max_upload_bytes == 0 {
		return Err(Error::validation("storage.files.max_upload_bytes must be greater than zero."));
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::validation("providers.embedding.dimensions must be greater than zero."));
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::validation(
			"providers.embedding.dimensions must match storage.qdrant.vector_dim.",
		));
	}
	if cfg.providers.embedding.max_concurrency == 0 {
		return Err(Error::validation(
			"providers.embedding.max_concurrency must be greater than zero.",
		));
	}
	if cfg.providers.embedding.model.trim().is_empty() {
		return Err(Error::validation("providers.embedding.model must be non-empty."));
	}

	match cfg.providers.embedding.provider_id.as_str() {
		"http" =>
			if cfg.providers.embedding.api_base.trim().is_empty() {
				return Err(Error::validation(
					"providers.embedding.api_base must be non-empty for the http provider.",
				));
			},
		"local" => {},
		_ => {
			return Err(Error::validation(
				"providers.embedding.provider_id must be one of http or local.",
			));
		},
	}

	if cfg.search.page_size == 0 {
		return Err(Error::validation("search.page_size must be greater than zero."));
	}
	if cfg.search.knn_k == 0 {
		return Err(Error::validation("search.knn_k must be greater than zero."));
	}
	if cfg.search.candidate_pool < cfg.search.knn_k {
		return Err(Error::validation("search.candidate_pool must be at least search.knn_k."));
	}
	if cfg.search.index_timeout_ms == 0 {
		return Err(Error::validation("search.index_timeout_ms must be greater than zero."));
	}
	if cfg.activity.recent_limit == 0 {
		return Err(Error::validation("activity.recent_limit must be greater than zero."));
	}
	if cfg.activity.recent_limit > cfg.activity.recent_retention {
		return Err(Error::validation(
			"activity.recent_limit must not exceed activity.recent_retention.",
		));
	}
	if cfg.sync.batch_size == 0 {
		return Err(Error::validation("sync.batch_size must be greater than zero."));
	}
	if cfg.sync.base_backoff_ms > cfg.sync.max_backoff_ms {
		return Err(Error::validation("sync.base_backoff_ms must not exceed sync.max_backoff_ms."));
	}
	if cfg.security.public_department.trim().is_empty() {
		return Err(Error::validation("security.public_department must be non-empty."));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.security.api_auth_token.as_deref().map(|token| token.trim().is_empty()).unwrap_or(false)
	{
		cfg.security.api_auth_token = None;
	}
	if cfg
		.security
		.admin_auth_token
		.as_deref()
		.map(|token| token.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.security.admin_auth_token = None;
	}

	cfg.providers.embedding.provider_id = cfg.providers.embedding.provider_id.trim().to_lowercase();
	cfg.storage.files.allowed_extensions = cfg
		.storage
		.files
		.allowed_extensions
		.iter()
		.map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
		.filter(|ext| !ext.is_empty())
		.collect();
	cfg.security.public_department = cfg.security.public_department.trim().to_string();
}
