pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced at the service boundary. Driver errors are flattened into messages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Search index unavailable: {message}")]
	IndexUnavailable { message: String },
	#[error("Embedding failed: {message}")]
	EmbeddingFailure { message: String },
	#[error("Metadata write failed: {message}")]
	MetadataWrite { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Forbidden: {message}")]
	Forbidden { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::EmbeddingFailure { .. } | Self::IndexUnavailable { .. })
	}

	/// Wraps a failed write against the authoritative metadata store.
	pub(crate) fn metadata_write(err: grimoire_storage::Error) -> Self {
		match err {
			grimoire_storage::Error::InvalidArgument(message)
			| grimoire_storage::Error::Conflict(message) => Self::InvalidRequest { message },
			other => Self::MetadataWrite { message: other.to_string() },
		}
	}

	pub(crate) fn invalid(message: impl Into<String>) -> Self {
		Self::InvalidRequest { message: message.into() }
	}
}
impl From<grimoire_storage::Error> for Error {
	fn from(err: grimoire_storage::Error) -> Self {
		match err {
			grimoire_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			grimoire_storage::Error::NotFound(message) => Self::NotFound { message },
			grimoire_storage::Error::Conflict(message) => Self::InvalidRequest { message },
			grimoire_storage::Error::Timeout(message) => Self::IndexUnavailable { message },
			grimoire_storage::Error::Qdrant(inner) =>
				Self::IndexUnavailable { message: inner.to_string() },
			grimoire_storage::Error::InvalidPayload(message) => Self::Storage { message },
			grimoire_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			grimoire_storage::Error::Io(inner) => Self::Storage { message: inner.to_string() },
		}
	}
}
impl From<grimoire_domain::Error> for Error {
	fn from(err: grimoire_domain::Error) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}
