use serde::Serialize;

use grimoire_domain::{
	access::Identity,
	file::{extension, numbered_name, sanitize_filename},
};
use grimoire_storage::files::StoredFile;

use crate::{Error, FileView, GrimoireService, Result, SyncOutcome};

const MAX_RENAME_ATTEMPTS: u32 = 1_000;

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
	pub file: FileView,
	/// False when the embedding provider failed and the file is reachable by name only.
	pub has_vector: bool,
	pub sync: SyncOutcome,
}

impl GrimoireService {
	/// Stores a new file, registers its metadata, and indexes it.
	///
	/// The owner is the uploader and the department is the uploader's department. A taken name
	/// gets a numeric suffix.
	pub async fn upload(
		&self,
		original_name: &str,
		bytes: &[u8],
		identity: &Identity,
	) -> Result<UploadResponse> {
		let name = sanitize_filename(original_name)?;

		self.check_upload(&name, bytes)?;

		let stored = self.write_unique(&name, bytes).await?;
		let department = self.policy.normalize_department(&identity.department);
		let meta = self
			.metadata
			.ensure_metadata(&stored.name, identity.username.trim(), &department)
			.await
			.map_err(Error::metadata_write)?;
		let doc = self.build_doc(&stored, Some(&meta)).await;
		let has_vector = doc.embedding.is_some();
		let sync = match self.within_deadline(self.index.upsert(std::slice::from_ref(&doc))).await
		{
			Ok(()) => SyncOutcome::Applied,
			Err(err) => self.defer(&stored.name, 0, &err.to_string()).await,
		};

		tracing::info!(
			filename = %stored.name,
			size_bytes = stored.size_bytes,
			has_vector,
			"File uploaded."
		);

		Ok(UploadResponse { file: FileView::new(&doc, false, None), has_vector, sync })
	}

	/// Removes the bytes and the index document. Metadata stays until the next prune.
	pub async fn delete_file(&self, filename: &str, identity: &Identity) -> Result<()> {
		if !identity.is_admin {
			return Err(Error::Forbidden {
				message: "Only administrators may delete files.".to_string(),
			});
		}
		if !self.files.remove(filename).await? {
			return Err(Error::NotFound { message: format!("File {filename} does not exist.") });
		}

		if let Err(err) = self.within_deadline(self.index.delete(filename)).await {
			tracing::warn!(
				filename = %filename,
				error = %err,
				"Index delete failed. The next rebuild drops the document."
			);
		}
		if let Err(err) = self.metadata.forget_file(filename).await {
			tracing::warn!(filename = %filename, error = %err, "Failed to clear file activity.");
		}

		tracing::info!(filename = %filename, "File deleted.");

		Ok(())
	}

	fn check_upload(&self, name: &str, bytes: &[u8]) -> Result<()> {
		let files = &self.cfg.storage.files;

		if !files.allowed_extensions.is_empty() {
			let allowed = extension(name)
				.is_some_and(|ext| files.allowed_extensions.iter().any(|allowed| *allowed == ext));

			if !allowed {
				return Err(Error::invalid(format!(
					"File type of {name} is not allowed. Allowed extensions: {}.",
					files.allowed_extensions.join(", ")
				)));
			}
		}
		if bytes.len() as u64 > files.max_upload_bytes {
			return Err(Error::invalid(format!(
				"File exceeds the upload limit of {} bytes.",
				files.max_upload_bytes
			)));
		}

		Ok(())
	}

	async fn write_unique(&self, name: &str, bytes: &[u8]) -> Result<StoredFile> {
		let mut candidate = name.to_string();

		for n in 1..=MAX_RENAME_ATTEMPTS {
			match self.files.write_new(&candidate, bytes).await {
				Ok(stored) => return Ok(stored),
				Err(grimoire_storage::Error::Conflict(_)) => candidate = numbered_name(name, n),
				Err(err) => return Err(err.into()),
			}
		}

		Err(Error::invalid(format!("Could not find a free name for {name}.")))
	}
}
