use grimoire_domain::tags::TagSet;
use grimoire_service::{Error, IdentityUpdateRequest, SyncOutcome, TagUpdateRequest};
use grimoire_storage::metadata::MetadataStore;

use super::{FailingEmbedding, Harness, admin, member, test_config};

fn tags(values: &[&str]) -> TagUpdateRequest {
	TagUpdateRequest { tags: values.iter().map(|tag| tag.to_string()).collect() }
}

#[tokio::test]
async fn tag_update_is_pushed_to_the_index() {
	let harness = Harness::new();

	harness.seed("budget.pdf", "maria", "Finance", &["draft"]).await;
	harness.reconcile().await;

	let response = harness
		.service
		.update_tags("budget.pdf", tags(&[" final ", "q3", "final", " "]), &member("Finance"))
		.await
		.expect("Tag update failed.");

	assert_eq!(response.sync, SyncOutcome::Applied);
	assert_eq!(response.tags.to_vec(), vec!["final", "q3"]);

	let doc = harness.index.doc("budget.pdf").expect("Expected an indexed document.");

	assert_eq!(doc.tags.to_vec(), vec!["final", "q3"]);
	assert!(!harness.metadata.is_dirty("budget.pdf"));
}

#[tokio::test]
async fn push_failure_keeps_the_write_and_flags_the_file() {
	let harness = Harness::new();

	harness.seed("budget.pdf", "maria", "Finance", &[]).await;
	harness.reconcile().await;
	harness.index.set_unavailable(true);

	let response = harness
		.service
		.update_tags("budget.pdf", tags(&["approved"]), &admin())
		.await
		.expect("The metadata write is the operation of record.");

	assert!(matches!(response.sync, SyncOutcome::Deferred { attempts: 1, .. }));
	assert!(harness.metadata.is_dirty("budget.pdf"));
	assert!(harness.metadata.sync_error("budget.pdf").is_some());

	let stored = harness
		.metadata
		.get_metadata("budget.pdf")
		.await
		.expect("Metadata read failed.")
		.expect("Expected a metadata row.");

	assert_eq!(stored.tags.to_vec(), vec!["approved"]);

	harness.index.set_unavailable(false);

	let outcome = harness.service.repair_file("budget.pdf", 1).await;

	assert_eq!(outcome, SyncOutcome::Applied);
	assert!(!harness.metadata.is_dirty("budget.pdf"));
	assert_eq!(
		harness.index.doc("budget.pdf").expect("Expected an indexed document.").tags.to_vec(),
		vec!["approved"]
	);
}

#[tokio::test]
async fn repeated_push_failures_count_attempts() {
	let harness = Harness::new();

	harness.seed("budget.pdf", "maria", "Finance", &[]).await;
	harness.reconcile().await;
	harness.index.set_unavailable(true);

	let first = harness.service.repair_file("budget.pdf", 0).await;
	let second = harness.service.repair_file("budget.pdf", 1).await;

	assert!(matches!(first, SyncOutcome::Deferred { attempts: 1, .. }));
	assert!(matches!(second, SyncOutcome::Deferred { attempts: 2, .. }));
}

#[tokio::test]
async fn unreadable_metadata_flags_the_file_for_retry() {
	let harness = Harness::new();

	harness.seed("budget.pdf", "maria", "Finance", &["q1"]).await;
	harness.reconcile().await;
	harness.metadata.set_fail_reads(true);

	let outcome = harness.service.push_metadata("budget.pdf").await;

	assert!(matches!(outcome, SyncOutcome::Deferred { attempts: 1, .. }));
	assert!(harness.metadata.is_dirty("budget.pdf"));

	harness.metadata.set_fail_reads(false);

	assert_eq!(harness.service.repair_file("budget.pdf", 1).await, SyncOutcome::Applied);
	assert!(!harness.metadata.is_dirty("budget.pdf"));
}

#[tokio::test]
async fn metadata_write_failure_is_surfaced() {
	let harness = Harness::new();

	harness.seed("budget.pdf", "maria", "Finance", &[]).await;
	harness.reconcile().await;
	harness.metadata.set_fail_writes(true);

	let err = harness
		.service
		.update_tags("budget.pdf", tags(&["lost"]), &admin())
		.await
		.expect_err("Expected the write failure to surface.");

	assert!(matches!(err, Error::MetadataWrite { .. }));
	assert_eq!(harness.index.metadata_pushes(), 0);
}

#[tokio::test]
async fn hidden_files_read_as_missing() {
	let harness = Harness::new();

	harness.seed("budget.pdf", "maria", "Finance", &[]).await;

	let err = harness
		.service
		.update_tags("budget.pdf", tags(&["x"]), &member("Sales"))
		.await
		.expect_err("Expected the file to be hidden.");

	assert!(matches!(err, Error::NotFound { .. }));

	let err = harness
		.service
		.update_tags("missing.pdf", tags(&["x"]), &admin())
		.await
		.expect_err("Expected a missing file.");

	assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn identity_update_is_admin_only_and_normalized() {
	let harness = Harness::new();

	harness.seed("budget.pdf", "maria", "Finance", &[]).await;
	harness.reconcile().await;

	let req =
		IdentityUpdateRequest { owner: " ivan ".to_string(), department: " PUBLIC ".to_string() };
	let err = harness
		.service
		.update_identity("budget.pdf", req.clone(), &member("Finance"))
		.await
		.expect_err("Members must not reassign ownership.");

	assert!(matches!(err, Error::Forbidden { .. }));

	let response = harness
		.service
		.update_identity("budget.pdf", req, &admin())
		.await
		.expect("Identity update failed.");

	assert_eq!(response.owner, "ivan");
	assert_eq!(response.department, "public");
	assert_eq!(response.sync, SyncOutcome::Applied);

	let doc = harness.index.doc("budget.pdf").expect("Expected an indexed document.");

	assert_eq!(doc.department, "public");
	assert_eq!(doc.owner, "ivan");
}

#[tokio::test]
async fn rebuild_restores_authoritative_values_and_prunes_orphans() {
	let harness = Harness::new();

	harness.seed("budget.pdf", "maria", "Finance", &["q1"]).await;
	harness.seed("minutes.txt", "", "", &[]).await;
	harness.reconcile().await;
	harness.index.overwrite_cached_identity("budget.pdf", Default::default(), "x", "Sales");
	harness
		.metadata
		.save_tags("deleted_long_ago.pdf", &["stale"].into_iter().collect::<TagSet>())
		.await
		.expect("Failed to seed orphan metadata.");

	let report = harness.service.reconcile_all().await.expect("Rebuild failed.");

	assert_eq!(report.indexed, 2);
	assert_eq!(report.missing_vector, 0);
	assert_eq!(report.errors, 0);
	assert_eq!(report.pruned_metadata, 1);

	let doc = harness.index.doc("budget.pdf").expect("Expected an indexed document.");

	assert_eq!(doc.department, "Finance");
	assert_eq!(doc.owner, "maria");
	assert_eq!(doc.tags.to_vec(), vec!["q1"]);
	assert_eq!(doc.embedding_version, harness.service.embedding_version());
}

#[tokio::test]
async fn rebuild_without_embeddings_still_indexes_by_name() {
	let harness = Harness::with_providers(test_config(), FailingEmbedding::providers());

	harness.seed("budget.pdf", "maria", "Finance", &[]).await;

	let report = harness.service.reconcile_all().await.expect("Rebuild failed.");

	assert_eq!(report.indexed, 1);
	assert_eq!(report.missing_vector, 1);
	assert!(harness.index.doc("budget.pdf").expect("Expected a document.").embedding.is_none());
}

#[tokio::test]
async fn repair_indexes_files_the_index_never_saw() {
	let harness = Harness::new();

	harness.seed("late.pdf", "maria", "Finance", &["q4"]).await;

	assert!(harness.index.is_empty());

	let outcome = harness.service.repair_file("late.pdf", 0).await;

	assert_eq!(outcome, SyncOutcome::Applied);

	let doc = harness.index.doc("late.pdf").expect("Expected the repaired document.");

	assert_eq!(doc.tags.to_vec(), vec!["q4"]);
	assert!(doc.embedding.is_some());
}

#[tokio::test]
async fn repair_of_a_removed_file_reports_not_indexed() {
	let harness = Harness::new();

	harness
		.metadata
		.save_tags("gone.pdf", &["x"].into_iter().collect::<TagSet>())
		.await
		.expect("Failed to seed metadata.");

	assert_eq!(harness.service.repair_file("gone.pdf", 0).await, SyncOutcome::NotIndexed);
}
