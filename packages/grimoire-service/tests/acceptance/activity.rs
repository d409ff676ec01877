use std::time::Duration;

use grimoire_domain::access::Identity;
use grimoire_service::{Error, FavoriteSetRequest, FavoriteToggleRequest};

use super::{Harness, member, test_config};

fn toggle(filename: &str) -> FavoriteToggleRequest {
	FavoriteToggleRequest { filename: filename.to_string() }
}

async fn open_in_order(harness: &Harness, identity: &Identity, names: &[&str]) {
	for name in names {
		harness.service.open_file(name, identity).await.expect("Open failed.");
		// Distinct access timestamps keep the ordering deterministic.
		tokio::time::sleep(Duration::from_millis(2)).await;
	}
}

#[tokio::test]
async fn toggle_twice_restores_the_original_state() {
	let harness = Harness::new();
	let caller = member("Sales");

	harness.seed("pipeline.txt", "ivan", "Sales", &[]).await;

	let first = harness.service.toggle_favorite(toggle("pipeline.txt"), &caller).await;
	let second = harness.service.toggle_favorite(toggle("pipeline.txt"), &caller).await;

	assert!(first.expect("First toggle failed.").favorite);
	assert!(!second.expect("Second toggle failed.").favorite);
	assert!(
		harness.service.list_favorites(&caller).await.expect("List failed.").results.is_empty()
	);
}

#[tokio::test]
async fn set_favorite_is_idempotent() {
	let harness = Harness::new();
	let caller = member("Sales");

	harness.seed("pipeline.txt", "ivan", "Sales", &[]).await;

	for _ in 0..2 {
		let state = harness
			.service
			.set_favorite(
				FavoriteSetRequest { filename: "pipeline.txt".to_string(), favorite: true },
				&caller,
			)
			.await
			.expect("Set failed.");

		assert!(state.favorite);
	}

	let listed = harness.service.list_favorites(&caller).await.expect("List failed.");

	assert_eq!(listed.results.len(), 1);
	assert!(listed.results[0].is_favorite);

	harness
		.service
		.set_favorite(
			FavoriteSetRequest { filename: "pipeline.txt".to_string(), favorite: false },
			&caller,
		)
		.await
		.expect("Unset failed.");

	assert!(
		harness.service.list_favorites(&caller).await.expect("List failed.").results.is_empty()
	);
}

#[tokio::test]
async fn favoriting_a_hidden_file_reads_as_missing() {
	let harness = Harness::new();

	harness.seed("payroll.txt", "maria", "Finance", &[]).await;

	let err = harness
		.service
		.toggle_favorite(toggle("payroll.txt"), &member("Sales"))
		.await
		.expect_err("Expected the file to be hidden.");

	assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn favorites_list_survives_an_index_outage() {
	let harness = Harness::new();
	let caller = member("Sales");

	harness.seed("pipeline.txt", "ivan", "Sales", &["q1"]).await;
	harness.reconcile().await;
	harness.service.toggle_favorite(toggle("pipeline.txt"), &caller).await.expect("Toggle failed.");
	harness.index.set_unavailable(true);

	let listed = harness.service.list_favorites(&caller).await.expect("List failed.");

	assert_eq!(listed.results.len(), 1);
	assert_eq!(listed.results[0].tags, vec!["q1"]);
}

#[tokio::test]
async fn favorites_are_filtered_when_access_changes() {
	let harness = Harness::new();
	let mut caller = member("Finance");

	harness.seed("payroll.txt", "maria", "Finance", &[]).await;
	harness.service.toggle_favorite(toggle("payroll.txt"), &caller).await.expect("Toggle failed.");

	caller.department = "Sales".to_string();

	assert!(
		harness.service.list_favorites(&caller).await.expect("List failed.").results.is_empty()
	);
}

#[tokio::test]
async fn recent_files_are_newest_first_distinct_and_capped() {
	let harness = Harness::new();
	let caller = member("Sales");
	let names = ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt", "f.txt", "g.txt", "h.txt"];

	for name in names {
		harness.seed(name, "", "", &[]).await;
	}

	open_in_order(&harness, &caller, &names).await;
	open_in_order(&harness, &caller, &["a.txt"]).await;

	let recent = harness.service.list_recent(&caller).await.expect("List failed.");
	let listed = recent.results.iter().map(|view| view.name.as_str()).collect::<Vec<_>>();

	assert_eq!(listed, vec!["a.txt", "h.txt", "g.txt", "f.txt", "e.txt", "d.txt"]);
}

#[tokio::test]
async fn recent_files_are_filtered_before_the_cut() {
	let harness = Harness::new();
	let mut caller = member("Finance");
	let public = ["p1.txt", "p2.txt", "p3.txt", "p4.txt"];
	let finance = ["f1.txt", "f2.txt", "f3.txt"];

	for name in public {
		harness.seed(name, "", "", &[]).await;
	}
	for name in finance {
		harness.seed(name, "maria", "Finance", &[]).await;
	}

	open_in_order(&harness, &caller, &public).await;
	open_in_order(&harness, &caller, &finance).await;

	caller.department = "Sales".to_string();

	let recent = harness.service.list_recent(&caller).await.expect("List failed.");
	let listed = recent.results.iter().map(|view| view.name.as_str()).collect::<Vec<_>>();

	assert_eq!(listed, vec!["p4.txt", "p3.txt", "p2.txt", "p1.txt"]);
}

#[tokio::test]
async fn access_history_is_trimmed_to_the_retention_window() {
	let mut cfg = test_config();

	cfg.activity.recent_retention = 5;

	let harness = Harness::with_config(cfg);
	let caller = member("Sales");

	harness.seed("loop.txt", "", "", &[]).await;

	for _ in 0..12 {
		harness.service.record_access("loop.txt", &caller).await.expect("Record failed.");
	}

	assert_eq!(harness.metadata.recent_rows(caller.user_id), 5);
}

#[tokio::test]
async fn open_file_returns_bytes_and_records_access() {
	let harness = Harness::new();
	let caller = member("Sales");

	harness.seed("pipeline.txt", "ivan", "Sales", &[]).await;

	let bytes = harness.service.open_file("pipeline.txt", &caller).await.expect("Open failed.");

	assert_eq!(bytes, b"pipeline.txt");
	assert_eq!(harness.metadata.recent_rows(caller.user_id), 1);

	let err = harness
		.service
		.open_file("pipeline.txt", &member("Finance"))
		.await
		.expect_err("Expected the file to be hidden.");

	assert!(matches!(err, Error::NotFound { .. }));
}
