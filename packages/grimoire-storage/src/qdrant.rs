use std::{collections::HashMap, future::Future, time::Duration};

use qdrant_client::{
	Payload, Qdrant,
	qdrant::{
		Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
		DeletePointsBuilder, Distance, FacetCountsBuilder, FieldType, Filter, GetPointsBuilder,
		PointId, PointStruct, PointsIdsList, Query, QueryPointsBuilder, Range, SearchParamsBuilder,
		SetPayloadPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
		VectorsConfigBuilder, facet_value::Variant, value::Kind,
	},
};
use time::Date;

use grimoire_domain::{
	file::{FileIndexDoc, FileMetadata, document_id},
	filter::{DayRange, IndexFilter},
	tags::TagSet,
};

use crate::{
	BoxFuture, Error, Result,
	index::{FacetField, IndexQuery, ScoredDoc, SearchIndex, rank_hits},
};

pub const DENSE_VECTOR_NAME: &str = "dense";

const KEYWORD_FIELDS: [&str; 6] =
	["name", "file_type", "tags", "owner", "department", "embedding_version"];
const INTEGER_FIELDS: [&str; 3] = ["size_bytes", "upload_day", "creation_day"];

pub struct QdrantStore {
	pub client: Qdrant,
	pub collection: String,
	pub vector_dim: u32,
	timeout: Duration,
}
impl QdrantStore {
	pub fn new(cfg: &grimoire_config::Qdrant) -> Result<Self> {
		let timeout = Duration::from_millis(cfg.timeout_ms);
		let client = Qdrant::from_url(&cfg.url).timeout(timeout).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim, timeout })
	}

	async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
	where
		F: Future<Output = std::result::Result<T, qdrant_client::QdrantError>>,
	{
		match tokio::time::timeout(self.timeout, fut).await {
			Ok(result) => Ok(result?),
			Err(_) => Err(Error::Timeout(format!("Qdrant {op} exceeded {:?}.", self.timeout))),
		}
	}

	async fn create_collection(&self) -> Result<()> {
		let mut vectors = VectorsConfigBuilder::default();

		vectors.add_named_vector_params(
			DENSE_VECTOR_NAME,
			VectorParamsBuilder::new(self.vector_dim as u64, Distance::Cosine),
		);

		self.bounded(
			"create collection",
			self.client.create_collection(
				CreateCollectionBuilder::new(self.collection.clone()).vectors_config(vectors),
			),
		)
		.await?;

		for field in KEYWORD_FIELDS {
			self.create_field_index(field, FieldType::Keyword).await?;
		}
		for field in INTEGER_FIELDS {
			self.create_field_index(field, FieldType::Integer).await?;
		}

		tracing::info!(collection = %self.collection, "Search index collection created.");

		Ok(())
	}

	async fn create_field_index(&self, field: &str, field_type: FieldType) -> Result<()> {
		self.bounded(
			"create field index",
			self.client.create_field_index(
				CreateFieldIndexCollectionBuilder::new(self.collection.clone(), field, field_type)
					.wait(true),
			),
		)
		.await?;

		Ok(())
	}
}
impl SearchIndex for QdrantStore {
	fn ensure_ready(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			let exists = self
				.bounded("collection lookup", self.client.collection_exists(self.collection.clone()))
				.await?;

			if !exists {
				self.create_collection().await?;
			}

			Ok(())
		})
	}

	fn recreate(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			let exists = self
				.bounded("collection lookup", self.client.collection_exists(self.collection.clone()))
				.await?;

			if exists {
				self.bounded(
					"delete collection",
					self.client.delete_collection(self.collection.clone()),
				)
				.await?;
			}

			self.create_collection().await
		})
	}

	fn upsert<'a>(&'a self, docs: &'a [FileIndexDoc]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if docs.is_empty() {
				return Ok(());
			}

			let points = docs.iter().map(to_point).collect::<Vec<_>>();

			self.bounded(
				"upsert",
				self.client.upsert_points(
					UpsertPointsBuilder::new(self.collection.clone(), points).wait(true),
				),
			)
			.await?;

			Ok(())
		})
	}

	fn delete<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let ids = PointsIdsList { ids: vec![point_id(name)] };

			self.bounded(
				"delete",
				self.client.delete_points(
					DeletePointsBuilder::new(self.collection.clone()).points(ids).wait(true),
				),
			)
			.await?;

			Ok(())
		})
	}

	fn query<'a>(&'a self, query: &'a IndexQuery) -> BoxFuture<'a, Result<Vec<ScoredDoc>>> {
		Box::pin(async move {
			let filter = build_filter(&query.filter, &query.embedding_version);
			let request = QueryPointsBuilder::new(self.collection.clone())
				.query(Query::new_nearest(query.vector.clone()))
				.using(DENSE_VECTOR_NAME)
				.filter(filter)
				.params(SearchParamsBuilder::default().hnsw_ef(query.candidate_pool as u64))
				.limit(query.k as u64)
				.with_payload(true);
			let response = self.bounded("query", self.client.query(request)).await?;
			let mut out = Vec::with_capacity(response.result.len());

			for point in response.result {
				let doc = decode_doc(&point.payload)?;

				out.push(ScoredDoc { doc, score: point.score });
			}

			rank_hits(&mut out);

			Ok(out)
		})
	}

	fn get_many<'a>(&'a self, names: &'a [String]) -> BoxFuture<'a, Result<Vec<FileIndexDoc>>> {
		Box::pin(async move {
			if names.is_empty() {
				return Ok(Vec::new());
			}

			let ids = names.iter().map(|name| point_id(name)).collect::<Vec<_>>();
			let response = self
				.bounded(
					"get",
					self.client.get_points(
						GetPointsBuilder::new(self.collection.clone(), ids).with_payload(true),
					),
				)
				.await?;

			response.result.iter().map(|point| decode_doc(&point.payload)).collect()
		})
	}

	fn apply_metadata<'a>(&'a self, meta: &'a FileMetadata) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let id = point_id(&meta.filename);
			let existing = self
				.bounded(
					"get",
					self.client.get_points(
						GetPointsBuilder::new(self.collection.clone(), vec![id.clone()])
							.with_payload(false),
					),
				)
				.await?;

			if existing.result.is_empty() {
				return Ok(false);
			}

			let mut payload = Payload::new();

			payload.insert("tags", meta.tags.to_vec());
			payload.insert("owner", meta.owner.clone());
			payload.insert("department", meta.department.clone());

			self.bounded(
				"set payload",
				self.client.set_payload(
					SetPayloadPointsBuilder::new(self.collection.clone(), payload)
						.points_selector(PointsIdsList { ids: vec![id] })
						.wait(true),
				),
			)
			.await?;

			Ok(true)
		})
	}

	fn distinct_values(
		&self,
		field: FacetField,
		limit: u64,
	) -> BoxFuture<'_, Result<Vec<String>>> {
		Box::pin(async move {
			let key = match field {
				FacetField::Tags => "tags",
				FacetField::Owner => "owner",
				FacetField::Department => "department",
				FacetField::FileType => "file_type",
			};
			let response = self
				.bounded(
					"facet",
					self.client.facet(
						FacetCountsBuilder::new(self.collection.clone(), key)
							.limit(limit)
							.exact(true),
					),
				)
				.await?;
			let mut values = response
				.hits
				.into_iter()
				.filter_map(|hit| match hit.value.and_then(|value| value.variant) {
					Some(Variant::StringValue(value)) if !value.trim().is_empty() => Some(value),
					_ => None,
				})
				.collect::<Vec<_>>();

			values.sort();
			values.dedup();

			Ok(values)
		})
	}
}

fn point_id(name: &str) -> PointId {
	PointId::from(document_id(name).to_string())
}

fn to_point(doc: &FileIndexDoc) -> PointStruct {
	let mut payload = Payload::new();

	payload.insert("name", doc.name.clone());
	payload.insert("size_bytes", doc.size_bytes as i64);
	payload.insert("upload_date", doc.upload_date.to_string());
	payload.insert("upload_day", doc.upload_date.to_julian_day() as i64);
	payload.insert("creation_date", doc.creation_date.to_string());
	payload.insert("creation_day", doc.creation_date.to_julian_day() as i64);
	payload.insert("file_type", doc.file_type.clone());
	payload.insert("tags", doc.tags.to_vec());
	payload.insert("owner", doc.owner.clone());
	payload.insert("department", doc.department.clone());
	payload.insert("embedding_version", doc.embedding_version.clone());
	payload.insert("has_vector", doc.embedding.is_some());

	let mut vectors = HashMap::new();

	if let Some(embedding) = doc.embedding.as_ref() {
		vectors.insert(DENSE_VECTOR_NAME.to_string(), embedding.clone());
	}

	PointStruct::new(doc.id().to_string(), vectors, payload)
}

fn build_filter(filter: &IndexFilter, embedding_version: &str) -> Filter {
	let mut must = vec![Condition::matches("embedding_version", embedding_version.to_string())];

	if !filter.tags_any.is_empty() {
		must.push(Condition::matches("tags", filter.tags_any.clone()));
	}
	if let Some(owner) = filter.owner.as_ref() {
		must.push(Condition::matches("owner", owner.clone()));
	}
	if let Some(department) = filter.department.as_ref() {
		must.push(Condition::matches("department", department.clone()));
	}
	if let Some(file_type) = filter.file_type.as_ref() {
		must.push(Condition::matches("file_type", file_type.clone()));
	}
	if let Some(departments) = filter.visible_departments.as_ref() {
		must.push(Condition::matches("department", departments.clone()));
	}
	if !filter.size.is_unbounded() {
		must.push(Condition::range(
			"size_bytes",
			Range {
				gte: filter.size.min_bytes.map(|bytes| bytes as f64),
				lte: filter.size.max_bytes.map(|bytes| bytes as f64),
				..Default::default()
			},
		));
	}

	push_day_range(&mut must, "upload_day", filter.upload_days);
	push_day_range(&mut must, "creation_day", filter.creation_days);

	Filter::must(must)
}

fn push_day_range(must: &mut Vec<Condition>, field: &str, range: DayRange) {
	if range.is_unbounded() {
		return;
	}

	must.push(Condition::range(
		field,
		Range {
			gte: range.min.map(f64::from),
			lte: range.max.map(f64::from),
			..Default::default()
		},
	));
}

fn decode_doc(payload: &HashMap<String, Value>) -> Result<FileIndexDoc> {
	let name = payload_str(payload, "name")?;
	let size_bytes = payload_i64(payload, "size_bytes")?;

	Ok(FileIndexDoc {
		size_bytes: u64::try_from(size_bytes)
			.map_err(|_| Error::InvalidPayload(format!("Negative size_bytes for {name}.")))?,
		upload_date: payload_date(payload, "upload_day")?,
		creation_date: payload_date(payload, "creation_day")?,
		file_type: payload_str(payload, "file_type")?,
		tags: payload_strings(payload, "tags").into_iter().collect::<TagSet>(),
		owner: payload_str(payload, "owner").unwrap_or_default(),
		department: payload_str(payload, "department").unwrap_or_default(),
		embedding: None,
		embedding_version: payload_str(payload, "embedding_version").unwrap_or_default(),
		name,
	})
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Result<String> {
	match payload.get(key).and_then(|value| value.kind.as_ref()) {
		Some(Kind::StringValue(value)) => Ok(value.clone()),
		_ => Err(Error::InvalidPayload(format!("Missing string field {key}."))),
	}
}

fn payload_i64(payload: &HashMap<String, Value>, key: &str) -> Result<i64> {
	match payload.get(key).and_then(|value| value.kind.as_ref()) {
		Some(Kind::IntegerValue(value)) => Ok(*value),
		Some(Kind::DoubleValue(value)) => Ok(*value as i64),
		_ => Err(Error::InvalidPayload(format!("Missing integer field {key}."))),
	}
}

fn payload_date(payload: &HashMap<String, Value>, key: &str) -> Result<Date> {
	let day = payload_i64(payload, key)?;
	let day = i32::try_from(day)
		.map_err(|_| Error::InvalidPayload(format!("Day number out of range in {key}.")))?;

	Date::from_julian_day(day)
		.map_err(|_| Error::InvalidPayload(format!("Day number out of range in {key}.")))
}

fn payload_strings(payload: &HashMap<String, Value>, key: &str) -> Vec<String> {
	match payload.get(key).and_then(|value| value.kind.as_ref()) {
		Some(Kind::ListValue(list)) => list
			.values
			.iter()
			.filter_map(|value| match value.kind.as_ref() {
				Some(Kind::StringValue(value)) => Some(value.clone()),
				_ => None,
			})
			.collect(),
		Some(Kind::StringValue(value)) => vec![value.clone()],
		_ => Vec::new(),
	}
}
