//! Postgres implementation of [`MetadataStore`].

use sqlx::{Executor, Postgres};
use time::OffsetDateTime;
use uuid::Uuid;

use grimoire_domain::{file::FileMetadata, tags::TagSet};

use crate::{
	BoxFuture, Result,
	db::Db,
	metadata::MetadataStore,
	models::{
		DirtyEntry, FavoriteEntry, FileMetadataRow, MetadataFacets, NewUser, RecentEntry, UserRow,
	},
};

const USER_COLUMNS: &str =
	"user_id, username, password_hash, department, is_admin, created_at, updated_at";

impl MetadataStore for Db {
	fn get_metadata<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<Option<FileMetadata>>> {
		Box::pin(async move {
			let row = sqlx::query_as::<_, FileMetadataRow>(
				"\
SELECT filename, tags, owner, department
FROM file_metadata
WHERE filename = $1",
			)
			.bind(filename)
			.fetch_optional(&self.pool)
			.await?;

			Ok(row.map(FileMetadata::from))
		})
	}

	fn get_metadata_many<'a>(
		&'a self,
		filenames: &'a [String],
	) -> BoxFuture<'a, Result<Vec<FileMetadata>>> {
		Box::pin(async move {
			if filenames.is_empty() {
				return Ok(Vec::new());
			}

			let rows = sqlx::query_as::<_, FileMetadataRow>(
				"\
SELECT filename, tags, owner, department
FROM file_metadata
WHERE filename = ANY($1)",
			)
			.bind(filenames)
			.fetch_all(&self.pool)
			.await?;

			Ok(rows.into_iter().map(FileMetadata::from).collect())
		})
	}

	fn ensure_metadata<'a>(
		&'a self,
		filename: &'a str,
		owner: &'a str,
		department: &'a str,
	) -> BoxFuture<'a, Result<FileMetadata>> {
		Box::pin(async move {
			// The no-op update makes RETURNING yield the existing row on conflict.
			let row = sqlx::query_as::<_, FileMetadataRow>(
				"\
INSERT INTO file_metadata (filename, owner, department)
VALUES ($1, $2, $3)
ON CONFLICT (filename) DO UPDATE
SET filename = EXCLUDED.filename
RETURNING filename, tags, owner, department",
			)
			.bind(filename)
			.bind(owner)
			.bind(department)
			.fetch_one(&self.pool)
			.await?;

			Ok(row.into())
		})
	}

	fn save_tags<'a>(
		&'a self,
		filename: &'a str,
		tags: &'a TagSet,
	) -> BoxFuture<'a, Result<FileMetadata>> {
		Box::pin(async move {
			let row = sqlx::query_as::<_, FileMetadataRow>(
				"\
INSERT INTO file_metadata (filename, tags)
VALUES ($1, $2)
ON CONFLICT (filename) DO UPDATE
SET
	tags = EXCLUDED.tags,
	updated_at = now()
RETURNING filename, tags, owner, department",
			)
			.bind(filename)
			.bind(tags.to_vec())
			.fetch_one(&self.pool)
			.await?;

			Ok(row.into())
		})
	}

	fn save_identity<'a>(
		&'a self,
		filename: &'a str,
		owner: &'a str,
		department: &'a str,
	) -> BoxFuture<'a, Result<FileMetadata>> {
		Box::pin(async move {
			let row = sqlx::query_as::<_, FileMetadataRow>(
				"\
INSERT INTO file_metadata (filename, owner, department)
VALUES ($1, $2, $3)
ON CONFLICT (filename) DO UPDATE
SET
	owner = EXCLUDED.owner,
	department = EXCLUDED.department,
	updated_at = now()
RETURNING filename, tags, owner, department",
			)
			.bind(filename)
			.bind(owner)
			.bind(department)
			.fetch_one(&self.pool)
			.await?;

			Ok(row.into())
		})
	}

	fn delete_metadata<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let result = sqlx::query("DELETE FROM file_metadata WHERE filename = $1")
				.bind(filename)
				.execute(&self.pool)
				.await?;

			Ok(result.rows_affected() > 0)
		})
	}

	fn list_metadata_filenames(&self) -> BoxFuture<'_, Result<Vec<String>>> {
		Box::pin(async move {
			let names = sqlx::query_scalar::<_, String>(
				"SELECT filename FROM file_metadata ORDER BY filename",
			)
			.fetch_all(&self.pool)
			.await?;

			Ok(names)
		})
	}

	fn prune_metadata<'a>(&'a self, keep: &'a [String]) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let result =
				sqlx::query("DELETE FROM file_metadata WHERE NOT (filename = ANY($1))")
					.bind(keep)
					.execute(&self.pool)
					.await?;

			Ok(result.rows_affected())
		})
	}

	fn distinct_metadata_values(&self) -> BoxFuture<'_, Result<MetadataFacets>> {
		Box::pin(async move {
			let tags = sqlx::query_scalar::<_, String>(
				"\
SELECT DISTINCT tag
FROM file_metadata, unnest(tags) AS tag
WHERE tag <> ''
ORDER BY tag",
			)
			.fetch_all(&self.pool)
			.await?;
			let owners = sqlx::query_scalar::<_, String>(
				"SELECT DISTINCT owner FROM file_metadata WHERE owner <> '' ORDER BY owner",
			)
			.fetch_all(&self.pool)
			.await?;
			let departments = sqlx::query_scalar::<_, String>(
				"\
SELECT DISTINCT department
FROM file_metadata
WHERE department <> ''
ORDER BY department",
			)
			.fetch_all(&self.pool)
			.await?;

			Ok(MetadataFacets { tags, owners, departments })
		})
	}

	fn mark_dirty<'a>(
		&'a self,
		filename: &'a str,
		error: &'a str,
		available_at: OffsetDateTime,
	) -> BoxFuture<'a, Result<i32>> {
		Box::pin(async move {
			let attempts = sqlx::query_scalar::<_, i32>(
				"\
INSERT INTO file_metadata (filename, index_dirty, sync_attempts, sync_error, sync_available_at)
VALUES ($1, true, 1, $2, $3)
ON CONFLICT (filename) DO UPDATE
SET
	index_dirty = true,
	sync_attempts = file_metadata.sync_attempts + 1,
	sync_error = EXCLUDED.sync_error,
	sync_available_at = EXCLUDED.sync_available_at,
	updated_at = now()
RETURNING sync_attempts",
			)
			.bind(filename)
			.bind(error)
			.bind(available_at)
			.fetch_one(&self.pool)
			.await?;

			Ok(attempts)
		})
	}

	fn clear_dirty<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			sqlx::query(
				"\
UPDATE file_metadata
SET
	index_dirty = false,
	sync_attempts = 0,
	sync_error = NULL
WHERE filename = $1 AND index_dirty",
			)
			.bind(filename)
			.execute(&self.pool)
			.await?;

			Ok(())
		})
	}

	fn claim_dirty(
		&self,
		now: OffsetDateTime,
		lease_until: OffsetDateTime,
		limit: i64,
	) -> BoxFuture<'_, Result<Vec<DirtyEntry>>> {
		Box::pin(async move {
			let mut tx = self.pool.begin().await?;
			let rows = sqlx::query_as::<_, DirtyEntry>(
				"\
WITH due AS (
	SELECT filename
	FROM file_metadata
	WHERE index_dirty AND sync_available_at <= $1
	ORDER BY sync_available_at ASC, filename ASC
	LIMIT $3
	FOR UPDATE SKIP LOCKED
)
UPDATE file_metadata AS m
SET sync_available_at = $2
FROM due
WHERE m.filename = due.filename
RETURNING m.filename, m.sync_attempts",
			)
			.bind(now)
			.bind(lease_until)
			.bind(limit)
			.fetch_all(&mut *tx)
			.await?;

			tx.commit().await?;

			Ok(rows)
		})
	}

	fn get_user(&self, user_id: Uuid) -> BoxFuture<'_, Result<Option<UserRow>>> {
		Box::pin(async move {
			let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");
			let row = sqlx::query_as::<_, UserRow>(&sql)
				.bind(user_id)
				.fetch_optional(&self.pool)
				.await?;

			Ok(row)
		})
	}

	fn get_user_by_name<'a>(
		&'a self,
		username: &'a str,
	) -> BoxFuture<'a, Result<Option<UserRow>>> {
		Box::pin(async move {
			let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
			let row = sqlx::query_as::<_, UserRow>(&sql)
				.bind(username)
				.fetch_optional(&self.pool)
				.await?;

			Ok(row)
		})
	}

	fn upsert_user<'a>(&'a self, user: &'a NewUser) -> BoxFuture<'a, Result<UserRow>> {
		Box::pin(async move {
			let sql = format!(
				"\
INSERT INTO users (user_id, username, password_hash, department, is_admin)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (user_id) DO UPDATE
SET
	username = EXCLUDED.username,
	password_hash = EXCLUDED.password_hash,
	department = EXCLUDED.department,
	is_admin = EXCLUDED.is_admin,
	updated_at = now()
RETURNING {USER_COLUMNS}"
			);
			let row = sqlx::query_as::<_, UserRow>(&sql)
				.bind(user.user_id)
				.bind(user.username.as_str())
				.bind(user.password_hash.as_str())
				.bind(user.department.as_str())
				.bind(user.is_admin)
				.fetch_one(&self.pool)
				.await?;

			Ok(row)
		})
	}

	fn set_user_department<'a>(
		&'a self,
		user_id: Uuid,
		department: &'a str,
	) -> BoxFuture<'a, Result<Option<UserRow>>> {
		Box::pin(async move {
			let sql = format!(
				"\
UPDATE users
SET
	department = $2,
	updated_at = now()
WHERE user_id = $1
RETURNING {USER_COLUMNS}"
			);
			let row = sqlx::query_as::<_, UserRow>(&sql)
				.bind(user_id)
				.bind(department)
				.fetch_optional(&self.pool)
				.await?;

			Ok(row)
		})
	}

	fn set_user_admin(
		&self,
		user_id: Uuid,
		is_admin: bool,
	) -> BoxFuture<'_, Result<Option<UserRow>>> {
		Box::pin(async move {
			let sql = format!(
				"\
UPDATE users
SET
	is_admin = $2,
	updated_at = now()
WHERE user_id = $1
RETURNING {USER_COLUMNS}"
			);
			let row = sqlx::query_as::<_, UserRow>(&sql)
				.bind(user_id)
				.bind(is_admin)
				.fetch_optional(&self.pool)
				.await?;

			Ok(row)
		})
	}

	fn list_users(&self) -> BoxFuture<'_, Result<Vec<UserRow>>> {
		Box::pin(async move {
			let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY username");
			let rows = sqlx::query_as::<_, UserRow>(&sql).fetch_all(&self.pool).await?;

			Ok(rows)
		})
	}

	fn toggle_favorite<'a>(
		&'a self,
		user_id: Uuid,
		filename: &'a str,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut tx = self.pool.begin().await?;
			let removed = delete_favorite_exec(&mut *tx, user_id, filename).await?;

			if !removed {
				insert_favorite_exec(&mut *tx, user_id, filename).await?;
			}

			tx.commit().await?;

			Ok(!removed)
		})
	}

	fn set_favorite<'a>(
		&'a self,
		user_id: Uuid,
		filename: &'a str,
		favorite: bool,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if favorite {
				insert_favorite_exec(&self.pool, user_id, filename).await?;
			} else {
				delete_favorite_exec(&self.pool, user_id, filename).await?;
			}

			Ok(())
		})
	}

	fn favorite_filenames<'a>(
		&'a self,
		user_id: Uuid,
		among: &'a [String],
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			if among.is_empty() {
				return Ok(Vec::new());
			}

			let names = sqlx::query_scalar::<_, String>(
				"\
SELECT filename
FROM favorites
WHERE user_id = $1 AND filename = ANY($2)",
			)
			.bind(user_id)
			.bind(among)
			.fetch_all(&self.pool)
			.await?;

			Ok(names)
		})
	}

	fn list_favorites(&self, user_id: Uuid) -> BoxFuture<'_, Result<Vec<FavoriteEntry>>> {
		Box::pin(async move {
			let rows = sqlx::query_as::<_, FavoriteEntry>(
				"\
SELECT filename, created_at
FROM favorites
WHERE user_id = $1
ORDER BY created_at DESC, filename ASC",
			)
			.bind(user_id)
			.fetch_all(&self.pool)
			.await?;

			Ok(rows)
		})
	}

	fn record_access<'a>(
		&'a self,
		user_id: Uuid,
		filename: &'a str,
		at: OffsetDateTime,
		retention: i64,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut tx = self.pool.begin().await?;

			sqlx::query(
				"INSERT INTO recent_access (user_id, filename, accessed_at) VALUES ($1, $2, $3)",
			)
			.bind(user_id)
			.bind(filename)
			.bind(at)
			.execute(&mut *tx)
			.await?;
			sqlx::query(
				"\
DELETE FROM recent_access
WHERE user_id = $1
	AND access_id NOT IN (
		SELECT access_id
		FROM recent_access
		WHERE user_id = $1
		ORDER BY accessed_at DESC, access_id DESC
		LIMIT $2
	)",
			)
			.bind(user_id)
			.bind(retention)
			.execute(&mut *tx)
			.await?;

			tx.commit().await?;

			Ok(())
		})
	}

	fn recent_filenames(
		&self,
		user_id: Uuid,
		limit: i64,
	) -> BoxFuture<'_, Result<Vec<RecentEntry>>> {
		Box::pin(async move {
			let rows = sqlx::query_as::<_, RecentEntry>(
				"\
SELECT filename, max(accessed_at) AS accessed_at
FROM recent_access
WHERE user_id = $1
GROUP BY filename
ORDER BY accessed_at DESC, filename ASC
LIMIT $2",
			)
			.bind(user_id)
			.bind(limit)
			.fetch_all(&self.pool)
			.await?;

			Ok(rows)
		})
	}

	fn forget_file<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut tx = self.pool.begin().await?;

			sqlx::query("DELETE FROM favorites WHERE filename = $1")
				.bind(filename)
				.execute(&mut *tx)
				.await?;
			sqlx::query("DELETE FROM recent_access WHERE filename = $1")
				.bind(filename)
				.execute(&mut *tx)
				.await?;

			tx.commit().await?;

			Ok(())
		})
	}
}

async fn delete_favorite_exec<'e, E>(executor: E, user_id: Uuid, filename: &str) -> Result<bool>
where
	E: Executor<'e, Database = Postgres>,
{
	let result = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND filename = $2")
		.bind(user_id)
		.bind(filename)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() > 0)
}

async fn insert_favorite_exec<'e, E>(executor: E, user_id: Uuid, filename: &str) -> Result<()>
where
	E: Executor<'e, Database = Postgres>,
{
	sqlx::query(
		"\
INSERT INTO favorites (user_id, filename)
VALUES ($1, $2)
ON CONFLICT (user_id, filename) DO NOTHING",
	)
	.bind(user_id)
	.bind(filename)
	.execute(executor)
	.await?;

	Ok(())
}
