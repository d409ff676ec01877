pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
	#[error("{message}")]
	InvalidFilter { message: String },
	#[error("{message}")]
	InvalidFilename { message: String },
}
