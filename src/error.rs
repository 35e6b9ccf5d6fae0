//! Errors raised by the ring data structures.
//!
//! These are contract violations: a caller handed a structure something
//! that can never be valid for it. Remote failures live in
//! [RequestFailure](crate::chord::message::RequestFailure) and
//! [MaintenanceError](crate::chord::maintenance::MaintenanceError) instead.

/// A wrap `Result` carrying [ChordError].
pub type Result<T> = std::result::Result<T, ChordError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChordError {
	#[error("bit count must be greater than zero")]
	InvalidBitCount,

	#[error("bit count mismatch: expected {expected}, found {found}")]
	BitCountMismatch { expected: usize, found: usize },

	#[error("a node cannot point to itself")]
	SelfPointerConflict,

	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	#[error("successor table is empty")]
	EmptyTable,

	#[error("index {index} out of range for length {len}")]
	IndexOutOfRange { index: usize, len: usize },
}
