use time::OffsetDateTime;
use uuid::Uuid;

use grimoire_domain::{file::FileMetadata, tags::TagSet};

use crate::{
	BoxFuture, Result,
	models::{DirtyEntry, FavoriteEntry, MetadataFacets, NewUser, RecentEntry, UserRow},
};

/// Authoritative store for per-file metadata, users, favorites, and access history.
///
/// Every write that the search index mirrors lands here first. Rows flagged dirty are
/// the ones whose index copy failed to refresh and still need a push.
pub trait MetadataStore
where
	Self: Send + Sync,
{
	fn get_metadata<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<Option<FileMetadata>>>;

	/// Missing filenames are absent from the result rather than reported as errors.
	fn get_metadata_many<'a>(
		&'a self,
		filenames: &'a [String],
	) -> BoxFuture<'a, Result<Vec<FileMetadata>>>;

	/// Creates an empty row unless one exists, then returns the stored row.
	fn ensure_metadata<'a>(
		&'a self,
		filename: &'a str,
		owner: &'a str,
		department: &'a str,
	) -> BoxFuture<'a, Result<FileMetadata>>;

	fn save_tags<'a>(
		&'a self,
		filename: &'a str,
		tags: &'a TagSet,
	) -> BoxFuture<'a, Result<FileMetadata>>;

	fn save_identity<'a>(
		&'a self,
		filename: &'a str,
		owner: &'a str,
		department: &'a str,
	) -> BoxFuture<'a, Result<FileMetadata>>;

	fn delete_metadata<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<bool>>;

	fn list_metadata_filenames(&self) -> BoxFuture<'_, Result<Vec<String>>>;

	/// Deletes metadata rows whose filename is not in `keep`, returning how many were removed.
	fn prune_metadata<'a>(&'a self, keep: &'a [String]) -> BoxFuture<'a, Result<u64>>;

	fn distinct_metadata_values(&self) -> BoxFuture<'_, Result<MetadataFacets>>;

	/// Flags a row as stale in the index and returns the attempt count so far.
	fn mark_dirty<'a>(
		&'a self,
		filename: &'a str,
		error: &'a str,
		available_at: OffsetDateTime,
	) -> BoxFuture<'a, Result<i32>>;

	fn clear_dirty<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<()>>;

	/// Leases up to `limit` dirty rows that are due, hiding them from other claimers until
	/// `lease_until`.
	fn claim_dirty(
		&self,
		now: OffsetDateTime,
		lease_until: OffsetDateTime,
		limit: i64,
	) -> BoxFuture<'_, Result<Vec<DirtyEntry>>>;

	fn get_user(&self, user_id: Uuid) -> BoxFuture<'_, Result<Option<UserRow>>>;

	fn get_user_by_name<'a>(&'a self, username: &'a str)
	-> BoxFuture<'a, Result<Option<UserRow>>>;

	fn upsert_user<'a>(&'a self, user: &'a NewUser) -> BoxFuture<'a, Result<UserRow>>;

	fn set_user_department<'a>(
		&'a self,
		user_id: Uuid,
		department: &'a str,
	) -> BoxFuture<'a, Result<Option<UserRow>>>;

	fn set_user_admin(&self, user_id: Uuid, is_admin: bool)
	-> BoxFuture<'_, Result<Option<UserRow>>>;

	fn list_users(&self) -> BoxFuture<'_, Result<Vec<UserRow>>>;

	/// Flips the favorite and returns the resulting state.
	fn toggle_favorite<'a>(&'a self, user_id: Uuid, filename: &'a str)
	-> BoxFuture<'a, Result<bool>>;

	fn set_favorite<'a>(
		&'a self,
		user_id: Uuid,
		filename: &'a str,
		favorite: bool,
	) -> BoxFuture<'a, Result<()>>;

	/// Returns the subset of `among` that the user has marked as favorite.
	fn favorite_filenames<'a>(
		&'a self,
		user_id: Uuid,
		among: &'a [String],
	) -> BoxFuture<'a, Result<Vec<String>>>;

	fn list_favorites(&self, user_id: Uuid) -> BoxFuture<'_, Result<Vec<FavoriteEntry>>>;

	/// Appends an access and trims the history so at most `retention` rows remain.
	fn record_access<'a>(
		&'a self,
		user_id: Uuid,
		filename: &'a str,
		at: OffsetDateTime,
		retention: i64,
	) -> BoxFuture<'a, Result<()>>;

	/// Most recent first, one entry per filename.
	fn recent_filenames(&self, user_id: Uuid, limit: i64)
	-> BoxFuture<'_, Result<Vec<RecentEntry>>>;

	fn forget_file<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<()>>;
}
