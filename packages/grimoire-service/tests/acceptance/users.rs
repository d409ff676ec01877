use uuid::Uuid;

use grimoire_service::{Error, ProvisionUserRequest};

use super::Harness;

fn provision(username: &str, department: &str) -> ProvisionUserRequest {
	ProvisionUserRequest {
		user_id: None,
		username: username.to_string(),
		password_hash: "$argon2id$opaque".to_string(),
		department: department.to_string(),
		is_admin: false,
	}
}

#[tokio::test]
async fn provisioned_users_resolve_to_identities() {
	let harness = Harness::new();
	let user = harness
		.service
		.provision_user(provision(" maria ", " Finance "))
		.await
		.expect("Provision failed.");

	assert_eq!(user.username, "maria");
	assert_eq!(user.department, "Finance");

	let identity = harness.service.resolve_identity(user.user_id).await.expect("Resolve failed.");

	assert_eq!(identity.username, "maria");
	assert_eq!(identity.department, "Finance");
	assert!(!identity.is_admin);
}

#[tokio::test]
async fn unknown_users_are_forbidden() {
	let harness = Harness::new();
	let err = harness
		.service
		.resolve_identity(Uuid::new_v4())
		.await
		.expect_err("Expected an unknown user.");

	assert!(matches!(err, Error::Forbidden { .. }));
}

#[tokio::test]
async fn usernames_are_unique_and_required() {
	let harness = Harness::new();

	harness.service.provision_user(provision("maria", "")).await.expect("Provision failed.");

	let err = harness
		.service
		.provision_user(provision("maria", "Sales"))
		.await
		.expect_err("Expected a duplicate username.");

	assert!(matches!(err, Error::InvalidRequest { .. }));

	let err = harness
		.service
		.provision_user(provision("  ", ""))
		.await
		.expect_err("Expected a blank username to be rejected.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
}

#[tokio::test]
async fn department_and_admin_changes_take_effect() {
	let harness = Harness::new();
	let user =
		harness.service.provision_user(provision("ivan", "Sales")).await.expect("Provision failed.");
	let moved = harness
		.service
		.set_user_department(user.user_id, "PUBLIC")
		.await
		.expect("Department change failed.");

	assert_eq!(moved.department, "public");

	harness.service.set_user_admin(user.user_id, true).await.expect("Admin change failed.");

	let identity = harness.service.resolve_identity(user.user_id).await.expect("Resolve failed.");

	assert!(identity.is_admin);
	assert_eq!(harness.service.list_users().await.expect("List failed.").len(), 1);

	let err = harness
		.service
		.set_user_admin(Uuid::new_v4(), true)
		.await
		.expect_err("Expected a missing user.");

	assert!(matches!(err, Error::NotFound { .. }));
}
