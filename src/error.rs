use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
	/// A store was read while its own computation was still running.
	#[error("circular reference: store `{store}` was read while it was being computed")]
	CircularReference { store: &'static str },
}
