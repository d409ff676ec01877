//! One-directional projection of authoritative metadata onto the search index.

use std::collections::HashMap;

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use grimoire_domain::file::{FileIndexDoc, FileMetadata};
use grimoire_storage::files::StoredFile;

use crate::{Error, GrimoireService, Result, view};

const MAX_SYNC_ERROR_CHARS: usize = 1_024;

/// Result of pushing one file's metadata to the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
	Applied,
	/// The index holds no document for the file; nothing was stale.
	NotIndexed,
	/// The index write failed and the file is flagged for retry.
	Deferred { attempts: i32, error: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
	pub indexed: u32,
	pub missing_vector: u32,
	pub errors: u32,
	pub pruned_metadata: u64,
}

/// `base * 2^(attempt - 1)`, capped at `max`.
pub fn backoff_for_attempt(attempt: i32, base_ms: u64, max_ms: u64) -> Duration {
	let exp = (attempt.max(1) as u32).saturating_sub(1).min(16);
	let delay = base_ms.saturating_mul(1_u64 << exp).min(max_ms);

	Duration::milliseconds(i64::try_from(delay).unwrap_or(i64::MAX))
}

/// Redacts credentials and truncates an error before it is stored on a metadata row.
pub fn sanitize_sync_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_SYNC_ERROR_CHARS {
		out = out.chars().take(MAX_SYNC_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}

impl GrimoireService {
	/// Applies the stored tags, owner, and department of `filename` onto its index document.
	///
	/// Never fails: an index error leaves the metadata write in place and flags the file.
	pub async fn push_metadata(&self, filename: &str) -> SyncOutcome {
		self.push_with_attempts(filename, 0).await
	}

	/// Brings one flagged file back in line with the authoritative store.
	///
	/// Files that have no index document yet are indexed from scratch.
	pub async fn repair_file(&self, filename: &str, prior_attempts: i32) -> SyncOutcome {
		match self.push_with_attempts(filename, prior_attempts).await {
			SyncOutcome::NotIndexed => match self.index_stored_file(filename).await {
				Ok(true) => {
					self.clear_dirty(filename).await;

					SyncOutcome::Applied
				},
				Ok(false) => {
					self.clear_dirty(filename).await;

					SyncOutcome::NotIndexed
				},
				Err(err) => self.defer(filename, prior_attempts, &err.to_string()).await,
			},
			outcome => outcome,
		}
	}

	async fn push_with_attempts(&self, filename: &str, prior_attempts: i32) -> SyncOutcome {
		let mut meta = match self.metadata.get_metadata(filename).await {
			Ok(Some(meta)) => meta,
			Ok(None) => FileMetadata::empty(filename),
			Err(err) => {
				tracing::warn!(filename = %filename, error = %err, "Metadata read failed before push.");

				return self.defer(filename, prior_attempts, &err.to_string()).await;
			},
		};

		meta.department = self.policy.normalize_department(&meta.department);

		match self.within_deadline(self.index.apply_metadata(&meta)).await {
			Ok(true) => {
				self.clear_dirty(filename).await;

				SyncOutcome::Applied
			},
			Ok(false) => SyncOutcome::NotIndexed,
			Err(err) => self.defer(filename, prior_attempts, &err.to_string()).await,
		}
	}

	pub(crate) async fn defer(&self, filename: &str, prior_attempts: i32, error: &str) -> SyncOutcome {
		let error = sanitize_sync_error(error);
		let backoff = backoff_for_attempt(
			prior_attempts + 1,
			self.cfg.sync.base_backoff_ms,
			self.cfg.sync.max_backoff_ms,
		);
		let available_at = OffsetDateTime::now_utc() + backoff;
		let attempts = match self.metadata.mark_dirty(filename, &error, available_at).await {
			Ok(attempts) => attempts,
			Err(mark_err) => {
				tracing::error!(
					filename = %filename,
					error = %mark_err,
					"Failed to flag file for index retry."
				);

				prior_attempts + 1
			},
		};

		tracing::warn!(
			filename = %filename,
			attempts,
			error = %error,
			"Search index push failed. File flagged for retry."
		);

		SyncOutcome::Deferred { attempts, error }
	}

	async fn clear_dirty(&self, filename: &str) {
		if let Err(err) = self.metadata.clear_dirty(filename).await {
			tracing::warn!(filename = %filename, error = %err, "Failed to clear retry flag.");
		}
	}

	/// Embeds and upserts one stored file under the current embedding version.
	///
	/// Returns `Ok(false)` when the file is no longer in storage. An embedding failure
	/// still indexes the document, without a vector.
	pub(crate) async fn index_stored_file(&self, filename: &str) -> Result<bool> {
		let Some(file) = self.files.stat(filename).await? else {
			return Ok(false);
		};
		let meta = self.metadata.get_metadata(filename).await?;
		let doc = self.build_doc(&file, meta.as_ref()).await;

		self.within_deadline(self.index.upsert(std::slice::from_ref(&doc))).await?;

		Ok(true)
	}

	pub(crate) async fn build_doc(
		&self,
		file: &StoredFile,
		meta: Option<&FileMetadata>,
	) -> FileIndexDoc {
		let mut doc = view::doc_from_stored(file, self.embedding_version());

		if let Some(meta) = meta {
			doc.apply_metadata(meta);
		}

		doc.department = self.policy.normalize_department(&doc.department);

		match self.embed_one(&file.name).await {
			Ok(vector) => doc.embedding = Some(vector),
			Err(err) => {
				tracing::warn!(
					filename = %file.name,
					error = %err,
					"Embedding failed. Indexing without a vector."
				);
			},
		}

		doc
	}

	/// Rebuilds the index from stored files and authoritative metadata.
	pub async fn reconcile_all(&self) -> Result<RebuildReport> {
		let files = self.files.list().await?;
		let names = files.iter().map(|file| file.name.clone()).collect::<Vec<_>>();
		let metadata = self
			.metadata
			.get_metadata_many(&names)
			.await?
			.into_iter()
			.map(|meta| (meta.filename.clone(), meta))
			.collect::<HashMap<_, _>>();
		let batch_size = self.cfg.sync.batch_size.max(1) as usize;
		let mut report = RebuildReport::default();
		let mut docs = Vec::with_capacity(files.len());

		for batch in files.chunks(batch_size) {
			let batch_names = batch.iter().map(|file| file.name.clone()).collect::<Vec<_>>();
			let vectors = match self.embed(&batch_names).await {
				Ok(vectors) => vectors.into_iter().map(Some).collect::<Vec<_>>(),
				Err(err) => {
					tracing::warn!(error = %err, "Batch embedding failed. Indexing without vectors.");

					vec![None; batch.len()]
				},
			};

			for (file, vector) in batch.iter().zip(vectors) {
				let mut doc = view::doc_from_stored(file, self.embedding_version());

				if let Some(meta) = metadata.get(&file.name) {
					doc.apply_metadata(meta);
				}

				doc.department = self.policy.normalize_department(&doc.department);

				if vector.is_none() {
					report.missing_vector += 1;
				}

				doc.embedding = vector;

				docs.push(doc);
			}
		}

		self.within_deadline(self.index.recreate()).await?;

		for chunk in docs.chunks(batch_size) {
			match self.within_deadline(self.index.upsert(chunk)).await {
				Ok(()) => {
					report.indexed += chunk.len() as u32;

					for doc in chunk {
						self.clear_dirty(&doc.name).await;
					}
				},
				Err(err) => {
					tracing::error!(
						error = %err,
						count = chunk.len(),
						"Index upsert failed during rebuild."
					);

					report.errors += chunk.len() as u32;
				},
			}
		}

		if self.cfg.sync.prune_metadata {
			report.pruned_metadata =
				self.metadata.prune_metadata(&names).await.map_err(Error::metadata_write)?;
		}

		tracing::info!(
			indexed = report.indexed,
			missing_vector = report.missing_vector,
			errors = report.errors,
			pruned_metadata = report.pruned_metadata,
			"Search index rebuilt."
		);

		Ok(report)
	}
}
