//! Retry loop for files whose index copy fell behind the metadata store.

use std::time::Duration as StdDuration;

use color_eyre::Result;
use time::{Duration, OffsetDateTime};

use grimoire_service::{GrimoireService, SyncOutcome};

const CLAIM_LEASE_SECONDS: i64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
	pub claimed: usize,
	pub applied: usize,
	pub not_indexed: usize,
	pub deferred: usize,
}

pub async fn run_worker(service: &GrimoireService) -> Result<()> {
	let poll = StdDuration::from_millis(service.cfg.sync.poll_interval_ms.max(1));
	let batch_size = service.cfg.sync.batch_size as usize;

	tracing::info!(poll_interval_ms = poll.as_millis() as u64, batch_size, "Sync worker started.");

	loop {
		let mut drained = true;

		match process_dirty_once(service, OffsetDateTime::now_utc()).await {
			Ok(summary) => {
				if summary.claimed > 0 {
					tracing::info!(
						claimed = summary.claimed,
						applied = summary.applied,
						not_indexed = summary.not_indexed,
						deferred = summary.deferred,
						"Dirty files processed."
					);
				}

				drained = summary.claimed < batch_size;
			},
			Err(err) => {
				tracing::error!(error = %err, "Dirty file processing failed.");
			},
		}

		// A full batch means more rows are probably due; skip the pause.
		if !drained {
			continue;
		}

		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				tracing::info!("Sync worker stopping.");

				return Ok(());
			},
			_ = tokio::time::sleep(poll) => {},
		}
	}
}

/// Claims due dirty files under a lease and pushes each one again.
pub async fn process_dirty_once(
	service: &GrimoireService,
	now: OffsetDateTime,
) -> grimoire_storage::Result<PassSummary> {
	let lease_until = now + Duration::seconds(CLAIM_LEASE_SECONDS);
	let batch = service
		.metadata
		.claim_dirty(now, lease_until, i64::from(service.cfg.sync.batch_size))
		.await?;
	let mut summary = PassSummary { claimed: batch.len(), ..Default::default() };

	for entry in batch {
		match service.repair_file(&entry.filename, entry.sync_attempts).await {
			SyncOutcome::Applied => summary.applied += 1,
			SyncOutcome::NotIndexed => summary.not_indexed += 1,
			SyncOutcome::Deferred { attempts, error } => {
				tracing::error!(
					filename = %entry.filename,
					attempts,
					error = %error,
					"Index repair failed."
				);

				summary.deferred += 1;
			},
		}
	}

	Ok(summary)
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use grimoire_domain::tags::TagSet;
	use grimoire_service::Providers;
	use grimoire_storage::metadata::MetadataStore;
	use grimoire_testkit::{MemoryFileStore, MemoryIndex, MemoryMetadataStore};

	use super::*;

	struct Fixture {
		service: GrimoireService,
		metadata: Arc<MemoryMetadataStore>,
		index: Arc<MemoryIndex>,
	}

	fn fixture() -> Fixture {
		let raw = include_str!(
			"../../../packages/grimoire-config/tests/fixtures/sample_config.template.toml"
		);
		let mut cfg: grimoire_config::Config =
			toml::from_str(raw).expect("Failed to parse sample config.");

		cfg.providers.embedding.provider_id = "local".to_string();
		cfg.providers.embedding.dimensions = 16;
		cfg.storage.qdrant.vector_dim = 16;

		let providers =
			Providers::from_config(&cfg.providers.embedding).expect("Failed to build providers.");
		let metadata = Arc::new(MemoryMetadataStore::new());
		let index = Arc::new(MemoryIndex::new());
		let files = Arc::new(MemoryFileStore::new());
		let today = OffsetDateTime::now_utc().date();

		files.put("contract.pdf", b"%PDF", today, today);

		let service =
			GrimoireService::new(cfg, metadata.clone(), index.clone(), files, providers);

		Fixture { service, metadata, index }
	}

	async fn flag(fixture: &Fixture, available_at: OffsetDateTime) {
		let tags = ["legal"].into_iter().collect::<TagSet>();

		fixture.metadata.save_tags("contract.pdf", &tags).await.expect("Failed to save tags.");
		fixture
			.metadata
			.mark_dirty("contract.pdf", "Search index timed out.", available_at)
			.await
			.expect("Failed to flag file.");
	}

	#[tokio::test]
	async fn due_files_are_repaired_and_cleared() {
		let fixture = fixture();
		let now = OffsetDateTime::now_utc();

		flag(&fixture, now - Duration::seconds(1)).await;

		let summary =
			process_dirty_once(&fixture.service, now).await.expect("Processing failed.");

		assert_eq!(summary, PassSummary { claimed: 1, applied: 1, ..Default::default() });
		assert!(!fixture.metadata.is_dirty("contract.pdf"));

		let doc = fixture.index.doc("contract.pdf").expect("Expected the repaired document.");

		assert_eq!(doc.tags.to_vec(), vec!["legal"]);
	}

	#[tokio::test]
	async fn failures_back_off_before_the_next_claim() {
		let fixture = fixture();
		let now = OffsetDateTime::now_utc();

		flag(&fixture, now - Duration::seconds(1)).await;
		fixture.index.set_unavailable(true);

		let summary =
			process_dirty_once(&fixture.service, now).await.expect("Processing failed.");

		assert_eq!(summary.deferred, 1);
		assert!(fixture.metadata.is_dirty("contract.pdf"));

		let again = process_dirty_once(&fixture.service, now).await.expect("Processing failed.");

		assert_eq!(again.claimed, 0);
	}

	#[tokio::test]
	async fn files_not_yet_due_are_left_alone() {
		let fixture = fixture();
		let now = OffsetDateTime::now_utc();

		flag(&fixture, now + Duration::minutes(5)).await;

		let summary =
			process_dirty_once(&fixture.service, now).await.expect("Processing failed.");

		assert_eq!(summary.claimed, 0);
		assert!(fixture.index.is_empty());
	}
}
