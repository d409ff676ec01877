use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use grimoire_domain::{access::Identity, file::FileIndexDoc};

use crate::{Error, FileView, GrimoireService, Result, view};

#[derive(Debug, Clone, Deserialize)]
pub struct FavoriteToggleRequest {
	pub filename: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FavoriteSetRequest {
	pub filename: String,
	pub favorite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FavoriteState {
	pub filename: String,
	pub favorite: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResponse {
	pub results: Vec<FileView>,
}

impl GrimoireService {
	/// Flips the favorite flag. Two concurrent toggles may cancel out.
	pub async fn toggle_favorite(
		&self,
		req: FavoriteToggleRequest,
		identity: &Identity,
	) -> Result<FavoriteState> {
		self.require_visible_file(&req.filename, identity).await?;

		let favorite = self
			.metadata
			.toggle_favorite(identity.user_id, &req.filename)
			.await
			.map_err(Error::metadata_write)?;

		Ok(FavoriteState { filename: req.filename, favorite })
	}

	/// Idempotent favorite write.
	pub async fn set_favorite(
		&self,
		req: FavoriteSetRequest,
		identity: &Identity,
	) -> Result<FavoriteState> {
		if req.favorite {
			self.require_visible_file(&req.filename, identity).await?;
		}

		self.metadata
			.set_favorite(identity.user_id, &req.filename, req.favorite)
			.await
			.map_err(Error::metadata_write)?;

		Ok(FavoriteState { filename: req.filename, favorite: req.favorite })
	}

	pub async fn list_favorites(&self, identity: &Identity) -> Result<ListResponse> {
		let names = self
			.metadata
			.list_favorites(identity.user_id)
			.await?
			.into_iter()
			.map(|entry| entry.filename)
			.collect::<Vec<_>>();
		let docs = self.lookup_visible(&names, identity).await?;
		let results = self.to_views(identity.user_id, docs).await;

		Ok(ListResponse { results })
	}

	/// Records an access and keeps only the newest entries per user.
	pub async fn record_access(&self, filename: &str, identity: &Identity) -> Result<()> {
		self.metadata
			.record_access(
				identity.user_id,
				filename,
				OffsetDateTime::now_utc(),
				i64::from(self.cfg.activity.recent_retention),
			)
			.await
			.map_err(Error::metadata_write)
	}

	/// Newest distinct files the caller opened, filtered by visibility before the cut.
	pub async fn list_recent(&self, identity: &Identity) -> Result<ListResponse> {
		let names = self
			.metadata
			.recent_filenames(identity.user_id, i64::from(self.cfg.activity.recent_retention))
			.await?
			.into_iter()
			.map(|entry| entry.filename)
			.collect::<Vec<_>>();
		let mut docs = self.lookup_visible(&names, identity).await?;

		docs.truncate(self.cfg.activity.recent_limit as usize);

		let results = self.to_views(identity.user_id, docs).await;

		Ok(ListResponse { results })
	}

	/// Returns the bytes of a visible file and records the access.
	pub async fn open_file(&self, filename: &str, identity: &Identity) -> Result<Vec<u8>> {
		self.require_visible_file(filename, identity).await?;

		let bytes = self.files.read(filename).await?;

		if let Err(err) = self.record_access(filename, identity).await {
			tracing::warn!(filename = %filename, error = %err, "Failed to record file access.");
		}

		Ok(bytes)
	}

	/// Exact-name lookup preserving input order, merged and access-filtered.
	///
	/// Files missing from the index are built from storage, so listings survive an index
	/// outage or a document that was never indexed.
	async fn lookup_visible(
		&self,
		names: &[String],
		identity: &Identity,
	) -> Result<Vec<(FileIndexDoc, Option<f32>)>> {
		if names.is_empty() {
			return Ok(Vec::new());
		}

		let mut indexed = match self.within_deadline(self.index.get_many(names)).await {
			Ok(docs) => docs,
			Err(Error::IndexUnavailable { message }) => {
				tracing::warn!(error = %message, "Search index unavailable. Listing from storage.");

				Vec::new()
			},
			Err(err) => return Err(err),
		};
		let mut docs = Vec::with_capacity(names.len());

		for name in names {
			if let Some(pos) = indexed.iter().position(|doc| &doc.name == name) {
				docs.push(indexed.swap_remove(pos));
			} else if let Some(file) = self.files.stat(name).await? {
				docs.push(view::doc_from_stored(&file, self.embedding_version()));
			}
		}

		self.merge_authoritative(&mut docs).await?;

		Ok(docs
			.into_iter()
			.filter(|doc| self.policy.is_visible(identity, &doc.department))
			.map(|doc| (doc, None))
			.collect())
	}
}
