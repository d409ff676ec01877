use serde::Serialize;

use grimoire_domain::{access::Identity, file::file_type_for};
use grimoire_storage::index::FacetField;

use crate::{Error, GrimoireService, Result};

const FACET_LIMIT: u64 = 1_000;

/// Values offered by the search filter pickers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
	pub tags: Vec<String>,
	pub owners: Vec<String>,
	pub departments: Vec<String>,
	pub types: Vec<String>,
}

impl GrimoireService {
	/// Distinct filter values. Departments the caller cannot see are left out.
	pub async fn filter_options(&self, identity: &Identity) -> Result<FilterOptions> {
		let mut options = match self.index_facets().await {
			Ok(options) => options,
			Err(Error::IndexUnavailable { message }) => {
				tracing::warn!(error = %message, "Search index unavailable. Using stored facets.");

				self.stored_facets().await?
			},
			Err(err) => return Err(err),
		};

		options.departments.retain(|department| self.policy.is_visible(identity, department));

		Ok(options)
	}

	async fn index_facets(&self) -> Result<FilterOptions> {
		let mut options = FilterOptions::default();

		for (field, out) in [
			(FacetField::Tags, &mut options.tags),
			(FacetField::Owner, &mut options.owners),
			(FacetField::Department, &mut options.departments),
			(FacetField::FileType, &mut options.types),
		] {
			*out = self.within_deadline(self.index.distinct_values(field, FACET_LIMIT)).await?;
		}

		Ok(options)
	}

	async fn stored_facets(&self) -> Result<FilterOptions> {
		let facets = self.metadata.distinct_metadata_values().await?;
		let mut types = self
			.files
			.list()
			.await?
			.iter()
			.map(|file| file_type_for(&file.name))
			.collect::<Vec<_>>();

		types.sort();
		types.dedup();

		Ok(FilterOptions {
			tags: facets.tags,
			owners: facets.owners,
			departments: facets.departments,
			types,
		})
	}
}
