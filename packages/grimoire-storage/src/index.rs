use grimoire_domain::{
	file::{FileIndexDoc, FileMetadata},
	filter::IndexFilter,
};

use crate::{BoxFuture, Result};

/// Nearest-neighbour request combined with exact-match filters.
#[derive(Debug, Clone)]
pub struct IndexQuery {
	pub vector: Vec<f32>,
	pub k: usize,
	/// Candidates examined per shard before the top `k` are cut.
	pub candidate_pool: usize,
	pub filter: IndexFilter,
	pub embedding_version: String,
}

#[derive(Debug, Clone)]
pub struct ScoredDoc {
	pub doc: FileIndexDoc,
	pub score: f32,
}

/// Orders hits by descending score, breaking ties by filename so pages are reproducible.
pub fn rank_hits(hits: &mut [ScoredDoc]) {
	hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc.name.cmp(&b.doc.name)));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetField {
	Tags,
	Owner,
	Department,
	FileType,
}

/// Derived, rebuildable store used only for ranking and filtering.
pub trait SearchIndex
where
	Self: Send + Sync,
{
	/// Creates the collection and payload indexes when missing.
	fn ensure_ready(&self) -> BoxFuture<'_, Result<()>>;

	/// Drops every document and recreates an empty collection.
	fn recreate(&self) -> BoxFuture<'_, Result<()>>;

	fn upsert<'a>(&'a self, docs: &'a [FileIndexDoc]) -> BoxFuture<'a, Result<()>>;

	fn delete<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>>;

	/// Results are ordered by descending similarity. Documents without a vector never match.
	fn query<'a>(&'a self, query: &'a IndexQuery) -> BoxFuture<'a, Result<Vec<ScoredDoc>>>;

	/// Exact-name lookup. Unknown names are skipped.
	fn get_many<'a>(&'a self, names: &'a [String]) -> BoxFuture<'a, Result<Vec<FileIndexDoc>>>;

	/// Overwrites the cached identity fields of one document.
	///
	/// Returns `false` when no document exists for the filename.
	fn apply_metadata<'a>(&'a self, meta: &'a FileMetadata) -> BoxFuture<'a, Result<bool>>;

	/// Distinct values of a keyword field, sorted.
	fn distinct_values(&self, field: FacetField, limit: u64)
	-> BoxFuture<'_, Result<Vec<String>>>;
}
