use std::collections::{HashMap, HashSet};

use serde::Serialize;

use grimoire_domain::file::{FileIndexDoc, FileMetadata, format_size};
use grimoire_storage::files::StoredFile;

use crate::{GrimoireService, Result};

/// A document as returned to callers, carrying authoritative identity fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileView {
	pub name: String,
	pub size_bytes: u64,
	/// Human-readable size, `x.x MB` above 1024 KB and `x.x KB` otherwise.
	pub size: String,
	/// ISO `YYYY-MM-DD`.
	pub upload_date: String,
	pub creation_date: String,
	#[serde(rename = "type")]
	pub file_type: String,
	pub tags: Vec<String>,
	pub owner: String,
	pub department: String,
	pub is_favorite: bool,
	/// Present only on ranked results.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub score: Option<f32>,
}
impl FileView {
	pub fn new(doc: &FileIndexDoc, is_favorite: bool, score: Option<f32>) -> Self {
		Self {
			name: doc.name.clone(),
			size_bytes: doc.size_bytes,
			size: format_size(doc.size_bytes),
			upload_date: doc.upload_date.to_string(),
			creation_date: doc.creation_date.to_string(),
			file_type: doc.file_type.clone(),
			tags: doc.tags.to_vec(),
			owner: doc.owner.clone(),
			department: doc.department.clone(),
			is_favorite,
			score,
		}
	}
}

/// Builds a document for a stored file that has no index entry.
pub(crate) fn doc_from_stored(file: &StoredFile, embedding_version: &str) -> FileIndexDoc {
	FileIndexDoc {
		name: file.name.clone(),
		size_bytes: file.size_bytes,
		upload_date: file.modified,
		creation_date: file.created,
		file_type: grimoire_domain::file::file_type_for(&file.name),
		tags: Default::default(),
		owner: String::new(),
		department: String::new(),
		embedding: None,
		embedding_version: embedding_version.to_string(),
	}
}

impl GrimoireService {
	/// Replaces cached identity fields with authoritative ones.
	///
	/// A file without a metadata row has empty tags, owner, and department; the index copy never
	/// fills the gap.
	pub(crate) async fn merge_authoritative(&self, docs: &mut [FileIndexDoc]) -> Result<()> {
		if docs.is_empty() {
			return Ok(());
		}

		let names = docs.iter().map(|doc| doc.name.clone()).collect::<Vec<_>>();
		let rows = self.metadata.get_metadata_many(&names).await?;
		let by_name = rows
			.into_iter()
			.map(|meta| (meta.filename.clone(), meta))
			.collect::<HashMap<String, FileMetadata>>();

		for doc in docs.iter_mut() {
			match by_name.get(&doc.name) {
				Some(meta) => doc.apply_metadata(meta),
				None => doc.apply_metadata(&FileMetadata::empty(doc.name.clone())),
			}

			doc.department = self.policy.normalize_department(&doc.department);
		}

		Ok(())
	}

	/// Favorite lookups decorate results; a failure hides the flag rather than the results.
	pub(crate) async fn favorite_set(
		&self,
		user_id: uuid::Uuid,
		names: &[String],
	) -> HashSet<String> {
		match self.metadata.favorite_filenames(user_id, names).await {
			Ok(found) => found.into_iter().collect(),
			Err(err) => {
				tracing::warn!(error = %err, "Favorite lookup failed.");

				HashSet::new()
			},
		}
	}

	pub(crate) async fn to_views(
		&self,
		user_id: uuid::Uuid,
		docs: Vec<(FileIndexDoc, Option<f32>)>,
	) -> Vec<FileView> {
		let names = docs.iter().map(|(doc, _)| doc.name.clone()).collect::<Vec<_>>();
		let favorites = self.favorite_set(user_id, &names).await;

		docs.iter()
			.map(|(doc, score)| FileView::new(doc, favorites.contains(&doc.name), *score))
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use time::macros::date;

	use super::*;

	#[test]
	fn view_formats_size_and_dates() {
		let doc = FileIndexDoc {
			name: "scan.pdf".to_string(),
			size_bytes: 3 * 1024 * 1024,
			upload_date: date!(2026 - 01 - 05),
			creation_date: date!(2025 - 12 - 31),
			file_type: "pdf".to_string(),
			tags: ["scan"].into_iter().collect(),
			owner: "ana".to_string(),
			department: String::new(),
			embedding: None,
			embedding_version: "local:ngram:4".to_string(),
		};
		let view = FileView::new(&doc, true, None);

		assert_eq!(view.size, "3.0 MB");
		assert_eq!(view.upload_date, "2026-01-05");
		assert_eq!(view.creation_date, "2025-12-31");
		assert!(view.is_favorite);

		let json = serde_json::to_value(&view).expect("Failed to serialize view.");

		assert_eq!(json["type"], "pdf");
		assert!(json.get("score").is_none());
	}
}
