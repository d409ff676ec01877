use time::OffsetDateTime;
use uuid::Uuid;

use grimoire_domain::{access::Identity, file::FileMetadata, tags::TagSet};

#[derive(Debug, sqlx::FromRow)]
pub struct FileMetadataRow {
	pub filename: String,
	pub tags: Vec<String>,
	pub owner: String,
	pub department: String,
}
impl From<FileMetadataRow> for FileMetadata {
	fn from(row: FileMetadataRow) -> Self {
		Self {
			filename: row.filename,
			tags: row.tags.into_iter().collect::<TagSet>(),
			owner: row.owner,
			department: row.department,
		}
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
	pub user_id: Uuid,
	pub username: String,
	pub password_hash: String,
	pub department: String,
	pub is_admin: bool,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl UserRow {
	pub fn identity(&self) -> Identity {
		Identity {
			user_id: self.user_id,
			username: self.username.clone(),
			department: self.department.clone(),
			is_admin: self.is_admin,
		}
	}
}

#[derive(Debug, Clone)]
pub struct NewUser {
	pub user_id: Uuid,
	pub username: String,
	pub password_hash: String,
	pub department: String,
	pub is_admin: bool,
}

/// A metadata row whose index copy is known to be stale.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DirtyEntry {
	pub filename: String,
	pub sync_attempts: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RecentEntry {
	pub filename: String,
	pub accessed_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FavoriteEntry {
	pub filename: String,
	pub created_at: OffsetDateTime,
}

/// Distinct values present in the authoritative metadata, used to populate filter pickers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFacets {
	pub tags: Vec<String>,
	pub owners: Vec<String>,
	pub departments: Vec<String>,
}
