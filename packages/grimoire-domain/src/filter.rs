use serde::{Deserialize, Deserializer, Serialize};
use time::{Date, Duration};

use crate::{Error, Result, file::FileIndexDoc, tags::TagSet};

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Relative date window at day granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateBucket {
	Today,
	Yesterday,
	Week,
	Month,
	Older,
}
impl DateBucket {
	/// `all` and blank input mean no date filter.
	pub fn parse(raw: &str) -> Result<Option<Self>> {
		let bucket = match raw.trim().to_ascii_lowercase().as_str() {
			"" | "all" => return Ok(None),
			"today" => Self::Today,
			"yesterday" => Self::Yesterday,
			"week" => Self::Week,
			"month" => Self::Month,
			"older" => Self::Older,
			other => {
				return Err(Error::InvalidFilter {
					message: format!(
						"Date range {other:?} must be one of all, today, yesterday, week, month, or older."
					),
				});
			},
		};

		Ok(Some(bucket))
	}

	/// Inclusive day window relative to `today`.
	///
	/// Every bucket except `older` runs through the end of today, so `yesterday` covers
	/// yesterday and today, `week` the last seven days plus today, and so on.
	pub fn day_range(self, today: Date) -> DayRange {
		let today_day = today.to_julian_day();
		let since = |days: i64| (today - Duration::days(days)).to_julian_day();

		match self {
			Self::Today => DayRange { min: Some(today_day), max: Some(today_day) },
			Self::Yesterday => DayRange { min: Some(since(1)), max: Some(today_day) },
			Self::Week => DayRange { min: Some(since(7)), max: Some(today_day) },
			Self::Month => DayRange { min: Some(since(30)), max: Some(today_day) },
			Self::Older => DayRange { min: None, max: Some(since(30) - 1) },
		}
	}
}

/// Serde helper for optional bucket fields that also accepts the `all` sentinel.
pub fn deserialize_bucket<'de, D>(deserializer: D) -> Result<Option<DateBucket>, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = Option::<String>::deserialize(deserializer)?;

	match raw {
		None => Ok(None),
		Some(raw) => DateBucket::parse(&raw).map_err(serde::de::Error::custom),
	}
}

/// Inclusive range over Julian day numbers. Unbounded sides are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayRange {
	pub min: Option<i32>,
	pub max: Option<i32>,
}
impl DayRange {
	pub fn for_bucket(bucket: Option<DateBucket>, today: Date) -> Self {
		bucket.map(|bucket| bucket.day_range(today)).unwrap_or_default()
	}

	pub fn is_unbounded(&self) -> bool {
		self.min.is_none() && self.max.is_none()
	}

	pub fn contains(&self, date: Date) -> bool {
		let day = date.to_julian_day();

		self.min.is_none_or(|min| day >= min) && self.max.is_none_or(|max| day <= max)
	}
}

/// Inclusive byte-size range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeRange {
	pub min_bytes: Option<u64>,
	pub max_bytes: Option<u64>,
}
impl SizeRange {
	pub fn from_megabytes(min_mb: Option<f64>, max_mb: Option<f64>) -> Result<Self> {
		let min_bytes = min_mb.map(|mb| megabytes_to_bytes("minSizeMB", mb)).transpose()?;
		let max_bytes = max_mb.map(|mb| megabytes_to_bytes("maxSizeMB", mb)).transpose()?;

		if let (Some(min), Some(max)) = (min_bytes, max_bytes)
			&& min > max
		{
			return Err(Error::InvalidFilter {
				message: "minSizeMB must not exceed maxSizeMB.".to_string(),
			});
		}

		Ok(Self { min_bytes, max_bytes })
	}

	pub fn is_unbounded(&self) -> bool {
		self.min_bytes.is_none() && self.max_bytes.is_none()
	}

	pub fn contains(&self, bytes: u64) -> bool {
		self.min_bytes.is_none_or(|min| bytes >= min) && self.max_bytes.is_none_or(|max| bytes <= max)
	}
}

fn megabytes_to_bytes(label: &str, mb: f64) -> Result<u64> {
	if !mb.is_finite() || mb < 0.0 {
		return Err(Error::InvalidFilter {
			message: format!("{label} must be a non-negative number."),
		});
	}

	Ok((mb * BYTES_PER_MEGABYTE) as u64)
}

/// Exact-match predicates ANDed with vector ranking.
///
/// Every `None` (or empty `tags_any`) is "no constraint". `Some(String::new())` on `owner`
/// or `department` matches documents whose field is blank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexFilter {
	pub tags_any: Vec<String>,
	pub owner: Option<String>,
	pub department: Option<String>,
	pub file_type: Option<String>,
	pub size: SizeRange,
	pub upload_days: DayRange,
	pub creation_days: DayRange,
	/// Department scoping derived from the caller. `None` is unrestricted.
	pub visible_departments: Option<Vec<String>>,
}
impl IndexFilter {
	pub fn matches(&self, doc: &FileIndexDoc) -> bool {
		self.matches_identity_fields(&doc.tags, &doc.owner, &doc.department)
			&& self.file_type.as_deref().is_none_or(|file_type| doc.file_type == file_type)
			&& self.size.contains(doc.size_bytes)
			&& self.upload_days.contains(doc.upload_date)
			&& self.creation_days.contains(doc.creation_date)
	}

	/// Checks only the predicates backed by authoritative metadata.
	pub fn matches_identity_fields(&self, tags: &TagSet, owner: &str, department: &str) -> bool {
		(self.tags_any.is_empty() || tags.contains_any(&self.tags_any))
			&& self.owner.as_deref().is_none_or(|wanted| owner == wanted)
			&& self.department.as_deref().is_none_or(|wanted| department == wanted)
			&& self
				.visible_departments
				.as_ref()
				.is_none_or(|allowed| allowed.iter().any(|d| d == department.trim()))
	}
}
