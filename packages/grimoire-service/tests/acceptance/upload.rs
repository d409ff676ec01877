use grimoire_service::{Error, FavoriteToggleRequest, SyncOutcome};
use grimoire_storage::{files::FileStore, metadata::MetadataStore};

use super::{FailingEmbedding, Harness, admin, member, test_config};

#[tokio::test]
async fn upload_registers_uploader_identity_and_indexes() {
	let harness = Harness::new();
	let caller = member("Sales");
	let response = harness
		.service
		.upload("Q3 Pipeline.txt", b"forecast", &caller)
		.await
		.expect("Upload failed.");

	assert_eq!(response.file.name, "Q3_Pipeline.txt");
	assert_eq!(response.file.owner, caller.username);
	assert_eq!(response.file.department, "Sales");
	assert_eq!(response.file.file_type, "txt");
	assert!(response.has_vector);
	assert_eq!(response.sync, SyncOutcome::Applied);

	let meta = harness
		.metadata
		.get_metadata("Q3_Pipeline.txt")
		.await
		.expect("Metadata read failed.")
		.expect("Expected a metadata row.");

	assert_eq!(meta.department, "Sales");
	assert!(harness.index.doc("Q3_Pipeline.txt").is_some());
}

#[tokio::test]
async fn taken_names_get_a_numeric_suffix() {
	let harness = Harness::new();
	let caller = member("Sales");
	let first = harness.service.upload("notes.txt", b"one", &caller).await.expect("Upload failed.");
	let second =
		harness.service.upload("notes.txt", b"two", &caller).await.expect("Upload failed.");
	let third = harness.service.upload("notes.txt", b"3", &caller).await.expect("Upload failed.");

	assert_eq!(first.file.name, "notes.txt");
	assert_eq!(second.file.name, "notes_1.txt");
	assert_eq!(third.file.name, "notes_2.txt");
	assert_eq!(harness.files.read("notes.txt").await.expect("Read failed."), b"one");
}

#[tokio::test]
async fn disallowed_type_and_oversize_are_rejected() {
	let harness = Harness::new();
	let caller = member("Sales");
	let err = harness
		.service
		.upload("macro.exe", b"MZ", &caller)
		.await
		.expect_err("Expected the extension to be rejected.");

	assert!(matches!(err, Error::InvalidRequest { .. }));

	let too_big = vec![0_u8; 2_048];
	let err = harness
		.service
		.upload("big.pdf", &too_big, &caller)
		.await
		.expect_err("Expected the size limit to apply.");

	assert!(matches!(err, Error::InvalidRequest { .. }));

	let err = harness
		.service
		.upload("../..", b"x", &caller)
		.await
		.expect_err("Expected the name to be rejected.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert!(harness.files.list().await.expect("List failed.").is_empty());
}

#[tokio::test]
async fn embedding_failure_still_stores_the_file() {
	let harness = Harness::with_providers(test_config(), FailingEmbedding::providers());
	let response = harness
		.service
		.upload("scan.pdf", b"%PDF", &member("Sales"))
		.await
		.expect("Upload should succeed without a vector.");

	assert!(!response.has_vector);

	let doc = harness.index.doc("scan.pdf").expect("Expected a document without a vector.");

	assert!(doc.embedding.is_none());
}

#[tokio::test]
async fn index_outage_defers_the_new_document() {
	let harness = Harness::new();

	harness.index.set_unavailable(true);

	let response = harness
		.service
		.upload("scan.pdf", b"%PDF", &member("Sales"))
		.await
		.expect("Upload should succeed while the index is down.");

	assert!(matches!(response.sync, SyncOutcome::Deferred { attempts: 1, .. }));
	assert!(harness.metadata.is_dirty("scan.pdf"));

	harness.index.set_unavailable(false);

	assert_eq!(harness.service.repair_file("scan.pdf", 1).await, SyncOutcome::Applied);
	assert!(harness.index.doc("scan.pdf").is_some());
}

#[tokio::test]
async fn metadata_failure_on_upload_is_surfaced() {
	let harness = Harness::new();

	harness.metadata.set_fail_writes(true);

	let err = harness
		.service
		.upload("scan.pdf", b"%PDF", &member("Sales"))
		.await
		.expect_err("Expected the metadata write to fail.");

	assert!(matches!(err, Error::MetadataWrite { .. }));
}

#[tokio::test]
async fn delete_is_admin_only_and_clears_activity() {
	let harness = Harness::new();
	let caller = member("Sales");

	harness.seed("pipeline.txt", "ivan", "Sales", &[]).await;
	harness.reconcile().await;
	harness
		.service
		.toggle_favorite(FavoriteToggleRequest { filename: "pipeline.txt".to_string() }, &caller)
		.await
		.expect("Toggle failed.");
	harness.service.open_file("pipeline.txt", &caller).await.expect("Open failed.");

	let err = harness
		.service
		.delete_file("pipeline.txt", &caller)
		.await
		.expect_err("Members must not delete files.");

	assert!(matches!(err, Error::Forbidden { .. }));

	harness.service.delete_file("pipeline.txt", &admin()).await.expect("Delete failed.");

	assert!(harness.files.stat("pipeline.txt").await.expect("Stat failed.").is_none());
	assert!(harness.index.doc("pipeline.txt").is_none());
	assert_eq!(harness.metadata.recent_rows(caller.user_id), 0);
	assert!(
		harness.service.list_favorites(&caller).await.expect("List failed.").results.is_empty()
	);

	let err = harness
		.service
		.delete_file("pipeline.txt", &admin())
		.await
		.expect_err("Expected a missing file.");

	assert!(matches!(err, Error::NotFound { .. }));
}
