use time::{Duration, OffsetDateTime};

use grimoire_domain::filter::DateBucket;
use grimoire_service::{Error, SearchFilters, SearchRequest};

use super::{FailingEmbedding, Harness, admin, member, test_config};

fn request(query: &str) -> SearchRequest {
	SearchRequest { query: query.to_string(), ..Default::default() }
}

fn names(response: &grimoire_service::SearchResponse) -> Vec<String> {
	let mut names = response.results.iter().map(|view| view.name.clone()).collect::<Vec<_>>();

	names.sort();

	names
}

async fn seeded() -> Harness {
	let harness = Harness::new();

	harness.seed("finance_report.pdf", "maria", "Finance", &["q1"]).await;
	harness.seed("sales_report.pdf", "ivan", "Sales", &["q1", "pipeline"]).await;
	harness.seed("handbook_report.pdf", "hr", "", &[]).await;
	harness.seed("holiday_report.txt", "hr", "public", &["calendar"]).await;
	harness.reconcile().await;

	harness
}

#[tokio::test]
async fn members_only_see_their_department_and_unscoped_files() {
	let harness = seeded().await;
	let response = harness
		.service
		.search(request("report"), &member("Sales"))
		.await
		.expect("Search failed.");

	assert_eq!(
		names(&response),
		vec!["handbook_report.pdf", "holiday_report.txt", "sales_report.pdf"]
	);
	assert!(!response.degraded);
	assert!(response.results.iter().all(|view| view.score.is_some()));
}

#[tokio::test]
async fn department_filter_cannot_reach_a_hidden_department() {
	let harness = Harness::new();

	harness.seed("invoice.pdf", "maria", "Finance", &[]).await;
	harness.seed("invoice_draft.pdf", "ivan", "Sales", &[]).await;
	harness.reconcile().await;

	let req = SearchRequest {
		query: "invoice".to_string(),
		filters: SearchFilters { department: Some("Finance".to_string()), ..Default::default() },
		..Default::default()
	};
	let response = harness.service.search(req, &member("Sales")).await.expect("Search failed.");

	assert!(response.results.is_empty());
	assert_eq!(response.total_matched, 0);
}

#[tokio::test]
async fn legacy_public_spelling_stays_visible_to_members() {
	let harness = Harness::new();

	harness.seed("handbook.pdf", "hr", "Public", &[]).await;
	harness.reconcile().await;

	let response = harness
		.service
		.search(request("handbook"), &member("Sales"))
		.await
		.expect("Search failed.");

	assert_eq!(names(&response), vec!["handbook.pdf"]);
	assert_eq!(response.results[0].department, "public");
	assert_eq!(
		harness.index.doc("handbook.pdf").expect("Expected an indexed document.").department,
		"public"
	);
}

#[tokio::test]
async fn admins_see_every_department() {
	let harness = seeded().await;
	let response =
		harness.service.search(request("report"), &admin()).await.expect("Search failed.");

	assert_eq!(response.total_matched, 4);
}

#[tokio::test]
async fn stale_index_identity_never_widens_access() {
	let harness = seeded().await;

	// The cached copy claims Sales and an extra tag; the metadata store still says Finance.
	harness.index.overwrite_cached_identity(
		"finance_report.pdf",
		["q1", "urgent"].into_iter().collect(),
		"ivan",
		"Sales",
	);

	let sales = member("Sales");
	let response =
		harness.service.search(request("report"), &sales).await.expect("Search failed.");

	assert!(!names(&response).contains(&"finance_report.pdf".to_string()));

	let tagged = SearchRequest {
		query: "report".to_string(),
		filters: SearchFilters { tags: vec!["urgent".to_string()], ..Default::default() },
		..Default::default()
	};
	let response = harness.service.search(tagged, &admin()).await.expect("Search failed.");

	assert!(response.results.is_empty());
}

#[tokio::test]
async fn results_carry_authoritative_tags() {
	let harness = seeded().await;

	harness.index.overwrite_cached_identity("sales_report.pdf", Default::default(), "", "Sales");

	let response =
		harness.service.search(request("sales"), &member("Sales")).await.expect("Search failed.");
	let view = response
		.results
		.iter()
		.find(|view| view.name == "sales_report.pdf")
		.expect("Expected the sales report.");

	assert_eq!(view.tags, vec!["pipeline", "q1"]);
	assert_eq!(view.owner, "ivan");
}

#[tokio::test]
async fn structured_filters_narrow_results() {
	let harness = seeded().await;
	let by_type = SearchRequest {
		query: "report".to_string(),
		filters: SearchFilters { file_type: Some(".TXT".to_string()), ..Default::default() },
		..Default::default()
	};
	let response = harness.service.search(by_type, &admin()).await.expect("Search failed.");

	assert_eq!(names(&response), vec!["holiday_report.txt"]);

	let by_owner = SearchRequest {
		query: "report".to_string(),
		filters: SearchFilters { owner: Some("hr".to_string()), ..Default::default() },
		..Default::default()
	};
	let response = harness.service.search(by_owner, &admin()).await.expect("Search failed.");

	assert_eq!(names(&response), vec!["handbook_report.pdf", "holiday_report.txt"]);

	let by_public = SearchRequest {
		query: "report".to_string(),
		filters: SearchFilters { department: Some("PUBLIC".to_string()), ..Default::default() },
		..Default::default()
	};
	let response = harness.service.search(by_public, &admin()).await.expect("Search failed.");

	assert_eq!(names(&response), vec!["holiday_report.txt"]);
}

#[tokio::test]
async fn date_buckets_filter_on_upload_day() {
	let harness = Harness::new();
	let today = OffsetDateTime::now_utc().date();
	let long_ago = today - Duration::days(45);

	harness.seed_dated("old_minutes.txt", "", "", &[], long_ago, long_ago).await;
	harness.seed_dated("new_minutes.txt", "", "", &[], today, long_ago).await;
	harness.reconcile().await;

	for (bucket, expected) in [
		(DateBucket::Older, "old_minutes.txt"),
		(DateBucket::Today, "new_minutes.txt"),
		(DateBucket::Week, "new_minutes.txt"),
	] {
		let req = SearchRequest {
			query: "minutes".to_string(),
			filters: SearchFilters { upload_date_range: Some(bucket), ..Default::default() },
			..Default::default()
		};
		let response = harness.service.search(req, &admin()).await.expect("Search failed.");

		assert_eq!(names(&response), vec![expected], "Unexpected results for {bucket:?}.");
	}
}

#[tokio::test]
async fn pagination_reports_total_pages() {
	let harness = Harness::new();

	for n in 1..=25 {
		harness.seed(&format!("ledger_{n:02}.txt"), "", "", &[]).await;
	}

	harness.reconcile().await;

	let first =
		harness.service.search(request("ledger"), &admin()).await.expect("Search failed.");

	assert_eq!(first.total_matched, 25);
	assert_eq!(first.total_pages, 3);
	assert_eq!(first.results.len(), 10);

	let last = SearchRequest { query: "ledger".to_string(), offset: 20, ..Default::default() };
	let last = harness.service.search(last, &admin()).await.expect("Search failed.");

	assert_eq!(last.results.len(), 5);
	assert_eq!(last.offset, 20);
}

#[tokio::test]
async fn negative_offset_is_rejected() {
	let harness = Harness::new();
	let req = SearchRequest { query: "x".to_string(), offset: -1, ..Default::default() };
	let err = harness.service.search(req, &admin()).await.expect_err("Expected rejection.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
}

#[tokio::test]
async fn blank_query_returns_no_results() {
	let harness = seeded().await;
	let response = harness.service.search(request("   "), &admin()).await.expect("Search failed.");

	assert!(response.results.is_empty());
	assert_eq!(response.total_pages, 0);
}

#[tokio::test]
async fn index_outage_falls_back_to_filename_matches() {
	let harness = seeded().await;

	harness.index.set_unavailable(true);

	let response = harness
		.service
		.search(request("REPORT"), &member("Finance"))
		.await
		.expect("Search should degrade, not fail.");

	assert!(response.degraded);
	assert_eq!(
		names(&response),
		vec!["finance_report.pdf", "handbook_report.pdf", "holiday_report.txt"]
	);
	assert!(response.results.iter().all(|view| view.score.is_none()));
}

#[tokio::test]
async fn metadata_outage_returns_an_empty_degraded_page() {
	let harness = seeded().await;

	harness.metadata.set_fail_reads(true);

	let response = harness
		.service
		.search(request("report"), &admin())
		.await
		.expect("Search should degrade, not fail.");

	assert!(response.degraded);
	assert!(response.results.is_empty());
	assert_eq!(response.total_matched, 0);
}

#[tokio::test]
async fn metadata_outage_during_fallback_returns_nothing() {
	let harness = seeded().await;

	harness.index.set_unavailable(true);
	harness.metadata.set_fail_reads(true);

	let response = harness
		.service
		.search(request("report"), &member("Finance"))
		.await
		.expect("Search should degrade, not fail.");

	assert!(response.degraded);
	assert!(response.results.is_empty());
}

#[tokio::test]
async fn embedding_failure_is_retryable() {
	let harness = Harness::with_providers(test_config(), FailingEmbedding::providers());
	let err = harness
		.service
		.search(request("anything"), &admin())
		.await
		.expect_err("Expected an embedding failure.");

	assert!(matches!(err, Error::EmbeddingFailure { .. }));
	assert!(err.is_retryable());
}

#[tokio::test]
async fn wrong_vector_width_is_an_embedding_failure() {
	let harness = Harness::with_providers(
		test_config(),
		grimoire_service::Providers::new(std::sync::Arc::new(super::NarrowEmbedding)),
	);
	let err = harness
		.service
		.search(request("anything"), &admin())
		.await
		.expect_err("Expected a dimension mismatch.");

	assert!(matches!(err, Error::EmbeddingFailure { .. }));
}

#[tokio::test]
async fn favorites_are_flagged_in_results() {
	let harness = seeded().await;
	let caller = member("Sales");

	harness
		.service
		.toggle_favorite(
			grimoire_service::FavoriteToggleRequest { filename: "sales_report.pdf".to_string() },
			&caller,
		)
		.await
		.expect("Toggle failed.");

	let response = harness.service.search(request("report"), &caller).await.expect("Search failed.");

	for view in &response.results {
		assert_eq!(view.is_favorite, view.name == "sales_report.pdf");
	}
}
