use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

/// Unordered set of tags. Members are trimmed and never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TagSet(BTreeSet<String>);
impl TagSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, tag: impl AsRef<str>) -> bool {
		let tag = tag.as_ref().trim();

		if tag.is_empty() {
			return false;
		}

		self.0.insert(tag.to_string())
	}

	pub fn contains(&self, tag: &str) -> bool {
		self.0.contains(tag.trim())
	}

	/// True when at least one of `wanted` is a member. An empty `wanted` never matches.
	pub fn contains_any<S>(&self, wanted: &[S]) -> bool
	where
		S: AsRef<str>,
	{
		wanted.iter().any(|tag| self.contains(tag.as_ref()))
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(String::as_str)
	}

	pub fn to_vec(&self) -> Vec<String> {
		self.0.iter().cloned().collect()
	}
}
impl<S> FromIterator<S> for TagSet
where
	S: AsRef<str>,
{
	fn from_iter<I>(iter: I) -> Self
	where
		I: IntoIterator<Item = S>,
	{
		let mut set = Self::new();

		for tag in iter {
			set.insert(tag);
		}

		set
	}
}
impl IntoIterator for TagSet {
	type IntoIter = std::collections::btree_set::IntoIter<String>;
	type Item = String;

	fn into_iter(self) -> Self::IntoIter {
		self.0.into_iter()
	}
}
impl<'de> Deserialize<'de> for TagSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = Vec::<String>::deserialize(deserializer)?;

		Ok(raw.into_iter().collect())
	}
}
