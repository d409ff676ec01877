use regex::Regex;
use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use crate::{Error, Result, tags::TagSet};

/// Type recorded for files without a usable extension.
pub const UNTYPED: &str = "file";

const UNSAFE_FILENAME_CHARS: &str = r"[^A-Za-z0-9_.-]";

/// One searchable document per stored file.
///
/// `tags`, `owner`, and `department` are a cache of [`FileMetadata`] and may lag behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct FileIndexDoc {
	pub name: String,
	pub size_bytes: u64,
	pub upload_date: Date,
	pub creation_date: Date,
	pub file_type: String,
	pub tags: TagSet,
	pub owner: String,
	pub department: String,
	/// Absent when the embedding provider failed; such documents are reachable by name only.
	pub embedding: Option<Vec<f32>>,
	pub embedding_version: String,
}
impl FileIndexDoc {
	pub fn id(&self) -> Uuid {
		document_id(&self.name)
	}

	/// Overwrites the cached identity fields with authoritative values.
	pub fn apply_metadata(&mut self, meta: &FileMetadata) {
		self.tags = meta.tags.clone();
		self.owner = meta.owner.clone();
		self.department = meta.department.clone();
	}
}

/// Authoritative per-file tags and identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
	pub filename: String,
	pub tags: TagSet,
	pub owner: String,
	pub department: String,
}
impl FileMetadata {
	pub fn empty(filename: impl Into<String>) -> Self {
		Self { filename: filename.into(), ..Default::default() }
	}
}

/// Stable index key for a filename. Re-indexing the same name always targets the same point.
pub fn document_id(name: &str) -> Uuid {
	Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("grimoire:file:{name}").as_bytes())
}

/// Lowercase extension after the last dot, if any.
pub fn extension(name: &str) -> Option<String> {
	let (stem, ext) = name.rsplit_once('.')?;

	if stem.is_empty() || ext.is_empty() {
		return None;
	}

	Some(ext.to_lowercase())
}

pub fn file_type_for(name: &str) -> String {
	extension(name).unwrap_or_else(|| UNTYPED.to_string())
}

/// Reduces a client-supplied name to a flat, portable filename.
///
/// Path separators and whitespace become underscores, anything outside `[A-Za-z0-9_.-]` is
/// dropped, and leading or trailing dots and underscores are stripped.
pub fn sanitize_filename(raw: &str) -> Result<String> {
	let flattened = raw.replace(['/', '\\'], " ");
	let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
	let unsafe_chars = Regex::new(UNSAFE_FILENAME_CHARS).map_err(|err| Error::InvalidFilename {
		message: format!("Filename pattern failed to compile: {err}."),
	})?;
	let cleaned = unsafe_chars.replace_all(&joined, "");
	let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');

	if trimmed.is_empty() {
		return Err(Error::InvalidFilename {
			message: format!("Filename {raw:?} has no usable characters."),
		});
	}

	Ok(trimmed.to_string())
}

/// `report.pdf` with `n = 2` becomes `report_2.pdf`.
pub fn numbered_name(name: &str, n: u32) -> String {
	match name.rfind('.') {
		Some(idx) if idx > 0 => format!("{}_{n}{}", &name[..idx], &name[idx..]),
		_ => format!("{name}_{n}"),
	}
}

/// Human-readable size, one decimal, in KB up to 1024 KB and MB beyond.
pub fn format_size(bytes: u64) -> String {
	let size_kb = bytes as f64 / 1024.0;

	if size_kb > 1024.0 { format!("{:.1} MB", size_kb / 1024.0) } else { format!("{size_kb:.1} KB") }
}
