pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Upstream fetch failed: {message}")]
	UpstreamFetch { message: String },
	#[error("Failed to {operation} document: {source}")]
	DocumentOperation { operation: &'static str, source: Box<Error> },
}
impl Error {
	pub(crate) fn document_operation(operation: &'static str, source: Error) -> Self {
		Self::DocumentOperation { operation, source: Box::new(source) }
	}

	/// The innermost error, looking through document operation wrappers.
	pub fn root(&self) -> &Error {
		match self {
			Self::DocumentOperation { source, .. } => source.root(),
			other => other,
		}
	}
}

impl From<kb_storage::Error> for Error {
	fn from(err: kb_storage::Error) -> Self {
		match err {
			kb_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			kb_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			kb_storage::Error::NotFound(message) => Self::NotFound { message },
		}
	}
}

impl From<kb_providers::Error> for Error {
	fn from(err: kb_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
