//! OverlapError: unified error type for aij-overlap public APIs
//!
//! Every fallible operation in the crate returns this error. Nothing here is
//! retried: an error aborts the whole overlap call and no partially grown
//! index sets are handed back.

use std::fmt::Debug;
use thiserror::Error;

/// Free-form transport failure carried as the `source` of [`OverlapError::CommError`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CommError(pub String);

/// Unified error type for overlap operations.
#[derive(Debug, Error)]
pub enum OverlapError {
    /// The requested overlap depth was negative.
    #[error("negative overlap depth {0} requested")]
    NegativeOverlap(i64),
    /// An [`OverlapOptions`](crate::overlap::options::OverlapOptions) value was rejected.
    #[error("invalid overlap option: {0}")]
    InvalidOption(String),
    /// Row-ownership prefix array or CSR parts are inconsistent.
    #[error("invalid matrix layout: {0}")]
    InvalidLayout(String),
    /// The communicator does not describe the same partitioning as the matrix.
    #[error(
        "communicator (rank {comm_rank} of {comm_size}) does not match matrix layout (rank {mat_rank} of {mat_size})"
    )]
    LayoutMismatch {
        comm_rank: usize,
        comm_size: usize,
        mat_rank: usize,
        mat_size: usize,
    },
    /// A row index lies outside `0..global_rows`.
    #[error("row {row} outside global range 0..{global_rows}")]
    RowOutOfRange { row: usize, global_rows: usize },
    /// A column index lies outside `0..global_cols`.
    #[error("column {col} outside global range 0..{global_cols}")]
    ColumnOutOfRange { col: usize, global_cols: usize },
    /// A buffer could not be allocated.
    #[error("failed to allocate {words} words for {what}")]
    Allocation { what: &'static str, words: usize },
    /// Transport-level failure while talking to `neighbor`.
    #[error("communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A received message does not follow the `[n, (set, count)*, rows*]` layout.
    #[error("malformed overlap message from rank {source_rank}: {reason}")]
    MalformedMessage { source_rank: usize, reason: String },
}

impl OverlapError {
    /// Shorthand for a [`OverlapError::CommError`] with a plain message.
    pub fn comm(neighbor: usize, msg: impl Into<String>) -> Self {
        OverlapError::CommError {
            neighbor,
            source: Box::new(CommError(msg.into())),
        }
    }

    /// Shorthand for a [`OverlapError::MalformedMessage`].
    pub fn malformed(source_rank: usize, reason: impl Into<String>) -> Self {
        OverlapError::MalformedMessage {
            source_rank,
            reason: reason.into(),
        }
    }
}
