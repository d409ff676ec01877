use serde::{Deserialize, Serialize};

use grimoire_domain::{
	access::Identity,
	file::FileIndexDoc,
	filter::{DateBucket, DayRange, IndexFilter, SizeRange, deserialize_bucket},
};
use grimoire_storage::index::IndexQuery;

use crate::{Error, FileView, GrimoireService, Result, view};

/// Structured filters. An absent field is no constraint; `Some("")` on `owner` or
/// `department` selects documents whose field is blank.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchFilters {
	#[serde(rename = "minSizeMB")]
	pub min_size_mb: Option<f64>,
	#[serde(rename = "maxSizeMB")]
	pub max_size_mb: Option<f64>,
	#[serde(deserialize_with = "deserialize_bucket")]
	pub upload_date_range: Option<DateBucket>,
	#[serde(deserialize_with = "deserialize_bucket")]
	pub creation_date_range: Option<DateBucket>,
	pub tags: Vec<String>,
	pub owner: Option<String>,
	pub department: Option<String>,
	#[serde(rename = "type")]
	pub file_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	#[serde(default)]
	pub offset: i64,
	#[serde(default)]
	pub filters: SearchFilters,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
	pub query: String,
	pub results: Vec<FileView>,
	pub total_matched: usize,
	pub total_pages: usize,
	pub page_size: usize,
	pub offset: usize,
	/// Set when results come from the filename fallback, or when authoritative metadata could
	/// not be read and the page is empty.
	pub degraded: bool,
	pub user_context: Identity,
}

impl GrimoireService {
	pub async fn search(&self, req: SearchRequest, identity: &Identity) -> Result<SearchResponse> {
		let offset = usize::try_from(req.offset)
			.map_err(|_| Error::invalid("offset must be a non-negative integer."))?;
		let filter = self.build_filter(&req.filters)?;
		let query = req.query.trim().to_string();
		let page_size = self.cfg.search.page_size.max(1) as usize;
		let mut response = SearchResponse {
			query: req.query.clone(),
			results: Vec::new(),
			total_matched: 0,
			total_pages: 0,
			page_size,
			offset,
			degraded: false,
			user_context: identity.clone(),
		};

		if query.is_empty() {
			return Ok(response);
		}

		let vector = self.embed_one(&query).await?;
		let mut scoped = filter.clone();

		scoped.visible_departments = self.policy.visible_departments(identity);

		let index_query = IndexQuery {
			vector,
			k: self.cfg.search.knn_k as usize,
			candidate_pool: self.cfg.search.candidate_pool as usize,
			filter: scoped,
			embedding_version: self.embedding_version().to_string(),
		};
		let ranked = match self.within_deadline(self.index.query(&index_query)).await {
			Ok(ranked) => ranked,
			Err(Error::IndexUnavailable { message }) => {
				tracing::warn!(error = %message, "Search index unavailable. Serving filename matches.");

				let matches = self.fallback_matches(&query, &filter, identity).await?;

				response.degraded = true;

				return Ok(self.paginate(response, identity, matches).await);
			},
			Err(err) => return Err(err),
		};
		let (mut docs, scores) = ranked
			.into_iter()
			.map(|scored| (scored.doc, scored.score))
			.unzip::<_, _, Vec<FileIndexDoc>, Vec<f32>>();

		if let Err(err) = self.merge_authoritative(&mut docs).await {
			// Unmerged index copies may carry stale departments, so nothing is returned.
			tracing::warn!(error = %err, "Metadata read failed. Returning no results.");

			response.degraded = true;

			return Ok(response);
		}

		let candidates = docs
			.into_iter()
			.zip(scores)
			.filter(|(doc, _)| self.passes_post_filter(&filter, doc, identity))
			.map(|(doc, score)| (doc, Some(score)))
			.collect::<Vec<_>>();

		Ok(self.paginate(response, identity, candidates).await)
	}

	/// Validates and converts request filters. Department scoping is added separately.
	pub fn build_filter(&self, filters: &SearchFilters) -> Result<IndexFilter> {
		let today = self.today();
		let size = SizeRange::from_megabytes(filters.min_size_mb, filters.max_size_mb)?;
		let tags = filters
			.tags
			.iter()
			.map(|tag| tag.trim())
			.filter(|tag| !tag.is_empty())
			.map(str::to_string)
			.collect::<Vec<_>>();

		Ok(IndexFilter {
			tags_any: tags,
			owner: filters.owner.as_deref().map(|owner| owner.trim().to_string()),
			department: filters
				.department
				.as_deref()
				.map(|department| self.policy.normalize_department(department)),
			file_type: filters
				.file_type
				.as_deref()
				.map(|file_type| file_type.trim().trim_start_matches('.').to_lowercase())
				.filter(|file_type| !file_type.is_empty()),
			size,
			upload_days: DayRange::for_bucket(filters.upload_date_range, today),
			creation_days: DayRange::for_bucket(filters.creation_date_range, today),
			visible_departments: None,
		})
	}

	/// Re-checks identity-backed predicates against authoritative values, plus visibility.
	fn passes_post_filter(
		&self,
		filter: &IndexFilter,
		doc: &FileIndexDoc,
		identity: &Identity,
	) -> bool {
		self.policy.is_visible(identity, &doc.department)
			&& filter.matches_identity_fields(&doc.tags, &doc.owner, &doc.department)
	}

	/// Case-insensitive filename substring match over stored files.
	async fn fallback_matches(
		&self,
		query: &str,
		filter: &IndexFilter,
		identity: &Identity,
	) -> Result<Vec<(FileIndexDoc, Option<f32>)>> {
		let files = match self.files.list().await {
			Ok(files) => files,
			Err(err) => {
				tracing::warn!(error = %err, "Fallback listing failed. Returning no results.");

				return Ok(Vec::new());
			},
		};
		let needle = query.to_lowercase();
		let mut docs = files
			.iter()
			.filter(|file| file.name.to_lowercase().contains(&needle))
			.map(|file| view::doc_from_stored(file, self.embedding_version()))
			.collect::<Vec<_>>();

		if let Err(err) = self.merge_authoritative(&mut docs).await {
			tracing::warn!(error = %err, "Metadata read failed. Returning no fallback matches.");

			return Ok(Vec::new());
		}

		Ok(docs
			.into_iter()
			.filter(|doc| filter.matches(doc) && self.policy.is_visible(identity, &doc.department))
			.map(|doc| (doc, None))
			.collect())
	}

	async fn paginate(
		&self,
		mut response: SearchResponse,
		identity: &Identity,
		candidates: Vec<(FileIndexDoc, Option<f32>)>,
	) -> SearchResponse {
		let total = candidates.len();

		response.total_matched = total;
		response.total_pages = total.div_ceil(response.page_size);

		let page = candidates.into_iter().skip(response.offset).take(response.page_size).collect();

		response.results = self.to_views(identity.user_id, page).await;

		response
	}
}
