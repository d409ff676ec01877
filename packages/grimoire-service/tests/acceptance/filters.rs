use super::{Harness, admin, member};

async fn seeded() -> Harness {
	let harness = Harness::new();

	harness.seed("payroll.pdf", "maria", "Finance", &["salary"]).await;
	harness.seed("pipeline.txt", "ivan", "Sales", &["q1"]).await;
	harness.seed("handbook.pdf", "hr", "public", &["policy"]).await;
	harness.reconcile().await;

	harness
}

#[tokio::test]
async fn options_hide_departments_the_caller_cannot_see() {
	let harness = seeded().await;
	let options = harness.service.filter_options(&member("Sales")).await.expect("Options failed.");

	assert_eq!(options.departments, vec!["Sales", "public"]);
	assert_eq!(options.types, vec!["pdf", "txt"]);
	assert_eq!(options.owners, vec!["hr", "ivan", "maria"]);

	let options = harness.service.filter_options(&admin()).await.expect("Options failed.");

	assert_eq!(options.departments, vec!["Finance", "Sales", "public"]);
}

#[tokio::test]
async fn options_fall_back_to_stored_values_during_an_outage() {
	let harness = seeded().await;

	harness.index.set_unavailable(true);

	let options = harness.service.filter_options(&admin()).await.expect("Options failed.");

	assert_eq!(options.tags, vec!["policy", "q1", "salary"]);
	assert_eq!(options.departments, vec!["Finance", "Sales", "public"]);
	assert_eq!(options.types, vec!["pdf", "txt"]);
}
