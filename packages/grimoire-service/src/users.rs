use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use grimoire_domain::access::Identity;
use grimoire_storage::models::{NewUser, UserRow};

use crate::{Error, GrimoireService, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionUserRequest {
	/// Generated when absent.
	#[serde(default)]
	pub user_id: Option<Uuid>,
	pub username: String,
	/// Opaque to this service; credentials are checked by the authentication layer.
	#[serde(default)]
	pub password_hash: String,
	#[serde(default)]
	pub department: String,
	#[serde(default)]
	pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
	pub user_id: Uuid,
	pub username: String,
	pub department: String,
	pub is_admin: bool,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl From<UserRow> for UserView {
	fn from(row: UserRow) -> Self {
		Self {
			user_id: row.user_id,
			username: row.username,
			department: row.department,
			is_admin: row.is_admin,
			updated_at: row.updated_at,
		}
	}
}

impl GrimoireService {
	/// Looks up the caller asserted by the authentication layer.
	pub async fn resolve_identity(&self, user_id: Uuid) -> Result<Identity> {
		match self.metadata.get_user(user_id).await? {
			Some(user) => Ok(user.identity()),
			None => Err(Error::Forbidden { message: "Unknown user.".to_string() }),
		}
	}

	pub async fn provision_user(&self, req: ProvisionUserRequest) -> Result<UserView> {
		let username = req.username.trim();

		if username.is_empty() {
			return Err(Error::invalid("username must be non-empty."));
		}

		let user = NewUser {
			user_id: req.user_id.unwrap_or_else(Uuid::new_v4),
			username: username.to_string(),
			password_hash: req.password_hash,
			department: self.policy.normalize_department(&req.department),
			is_admin: req.is_admin,
		};
		let row = self.metadata.upsert_user(&user).await.map_err(Error::metadata_write)?;

		tracing::info!(user_id = %row.user_id, username = %row.username, "User provisioned.");

		Ok(row.into())
	}

	pub async fn set_user_department(&self, user_id: Uuid, department: &str) -> Result<UserView> {
		let department = self.policy.normalize_department(department);
		let row = self
			.metadata
			.set_user_department(user_id, &department)
			.await
			.map_err(Error::metadata_write)?
			.ok_or_else(|| Error::NotFound { message: format!("User {user_id} does not exist.") })?;

		Ok(row.into())
	}

	pub async fn set_user_admin(&self, user_id: Uuid, is_admin: bool) -> Result<UserView> {
		let row = self
			.metadata
			.set_user_admin(user_id, is_admin)
			.await
			.map_err(Error::metadata_write)?
			.ok_or_else(|| Error::NotFound { message: format!("User {user_id} does not exist.") })?;

		Ok(row.into())
	}

	pub async fn list_users(&self) -> Result<Vec<UserView>> {
		Ok(self.metadata.list_users().await?.into_iter().map(UserView::from).collect())
	}
}
