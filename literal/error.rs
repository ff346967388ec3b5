use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The errors returned by this crate. Every error is returned by the call that detected it, and a failed call leaves any existing shape or literal unchanged.
#[derive(Debug, Error)]
pub enum Error {
	/// A malformed shape or layout, an element type that cannot be stored, or a type or shape mismatch between a literal and an array.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),
	/// The storage for a literal could not be sized or allocated.
	#[error("resource exhausted: {0}")]
	ResourceExhausted(String),
	#[error("failed to parse config: {0}")]
	Config(String),
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Decode(#[from] rmp_serde::decode::Error),
	#[error(transparent)]
	Encode(#[from] rmp_serde::encode::Error),
}

#[macro_export]
macro_rules! invalid_argument {
	($($arg:tt)*) => {
		$crate::Error::InvalidArgument(format!($($arg)*))
	};
}
