use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller identity as asserted by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	pub user_id: Uuid,
	pub username: String,
	pub department: String,
	pub is_admin: bool,
}

/// Department scoping rule.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
	public_department: String,
}
impl AccessPolicy {
	pub fn new(public_department: impl Into<String>) -> Self {
		Self { public_department: public_department.into().trim().to_string() }
	}

	pub fn public_department(&self) -> &str {
		&self.public_department
	}

	/// A department is unscoped when blank or equal to the public sentinel.
	pub fn is_unscoped(&self, department: &str) -> bool {
		let department = department.trim();

		department.is_empty() || department.eq_ignore_ascii_case(&self.public_department)
	}

	/// Canonical stored form: trimmed, with any casing of the public sentinel folded onto it.
	pub fn normalize_department(&self, raw: &str) -> String {
		let trimmed = raw.trim();

		if trimmed.eq_ignore_ascii_case(&self.public_department) {
			self.public_department.clone()
		} else {
			trimmed.to_string()
		}
	}

	pub fn is_visible(&self, identity: &Identity, department: &str) -> bool {
		if identity.is_admin || self.is_unscoped(department) {
			return true;
		}

		let department = department.trim();
		let own = identity.department.trim();

		!own.is_empty() && department == own
	}

	/// Departments a caller may see, for pushing scoping into an index filter.
	///
	/// `None` means unrestricted. The empty string stands for unscoped documents. Index copies
	/// carry departments in [`Self::normalize_department`] form, so only that spelling is listed.
	pub fn visible_departments(&self, identity: &Identity) -> Option<Vec<String>> {
		if identity.is_admin {
			return None;
		}

		let mut departments = vec![String::new(), self.public_department.clone()];
		let own = identity.department.trim();

		if !own.is_empty() && !self.is_unscoped(own) {
			departments.push(own.to_string());
		}

		Some(departments)
	}
}
impl Default for AccessPolicy {
	fn default() -> Self {
		Self::new("public")
	}
}
