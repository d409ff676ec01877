use serde::{Deserialize, Serialize};

use grimoire_domain::{access::Identity, tags::TagSet};

use crate::{Error, GrimoireService, Result, SyncOutcome};

#[derive(Debug, Clone, Deserialize)]
pub struct TagUpdateRequest {
	pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagUpdateResponse {
	pub filename: String,
	pub tags: TagSet,
	pub sync: SyncOutcome,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityUpdateRequest {
	pub owner: String,
	pub department: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentityUpdateResponse {
	pub filename: String,
	pub owner: String,
	pub department: String,
	pub sync: SyncOutcome,
}

impl GrimoireService {
	/// Replaces the tag set of a file, then pushes it to the index.
	///
	/// The metadata write is the operation of record; a failed push is reported in `sync`.
	pub async fn update_tags(
		&self,
		filename: &str,
		req: TagUpdateRequest,
		identity: &Identity,
	) -> Result<TagUpdateResponse> {
		self.require_visible_file(filename, identity).await?;

		let tags = req.tags.into_iter().collect::<TagSet>();
		let saved = self.metadata.save_tags(filename, &tags).await.map_err(Error::metadata_write)?;
		let sync = self.push_metadata(filename).await;

		tracing::info!(filename = %filename, tags = saved.tags.len(), "Tags updated.");

		Ok(TagUpdateResponse { filename: saved.filename, tags: saved.tags, sync })
	}

	/// Admin-only reassignment of owner and department.
	pub async fn update_identity(
		&self,
		filename: &str,
		req: IdentityUpdateRequest,
		identity: &Identity,
	) -> Result<IdentityUpdateResponse> {
		if !identity.is_admin {
			return Err(Error::Forbidden {
				message: "Only administrators may change file ownership.".to_string(),
			});
		}

		self.require_stored_file(filename).await?;

		let owner = req.owner.trim();
		let department = self.policy.normalize_department(&req.department);
		let saved = self
			.metadata
			.save_identity(filename, owner, &department)
			.await
			.map_err(Error::metadata_write)?;
		let sync = self.push_metadata(filename).await;

		tracing::info!(
			filename = %filename,
			owner = %saved.owner,
			department = %saved.department,
			"File identity updated."
		);

		Ok(IdentityUpdateResponse {
			filename: saved.filename,
			owner: saved.owner,
			department: saved.department,
			sync,
		})
	}

	pub(crate) async fn require_stored_file(&self, filename: &str) -> Result<()> {
		match self.files.stat(filename).await? {
			Some(_) => Ok(()),
			None => Err(Error::NotFound { message: format!("File {filename} does not exist.") }),
		}
	}

	/// Hidden files are reported as missing so their existence does not leak.
	pub(crate) async fn require_visible_file(
		&self,
		filename: &str,
		identity: &Identity,
	) -> Result<()> {
		self.require_stored_file(filename).await?;

		let department = self
			.metadata
			.get_metadata(filename)
			.await?
			.map(|meta| meta.department)
			.unwrap_or_default();

		if !self.policy.is_visible(identity, &department) {
			return Err(Error::NotFound { message: format!("File {filename} does not exist.") });
		}

		Ok(())
	}
}
