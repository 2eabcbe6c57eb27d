#![cfg_attr(docsrs, feature(doc_cfg))]
//! # aij-overlap
//!
//! aij-overlap grows index sets over the rows of a row-distributed sparse
//! matrix. Each rank owns a contiguous block of rows stored as a diagonal
//! block and an off-diagonal block with a compressed column map. Given one or
//! more sets of global row indices, [`increase_overlap`] adds every row that
//! is reachable in `ov` hops of the matrix graph, asking the owning ranks for
//! rows it cannot expand itself.
//!
//! ## Features
//! - Direct-lookup row ownership and a two-block distributed matrix layout
//! - Dense or hashed per-set membership, chosen by global row count
//! - Pluggable communication backends (serial, in-process threads, MPI)
//! - Non-blocking exchange phases that overlap local work with messaging
//! - Reply buffers sized from an estimate and grown on overflow
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! aij-overlap = "0.3"
//! # Optional features:
//! # features = ["mpi-support","rayon"]
//! ```
//!
//! ```
//! use aij_overlap::prelude::*;
//!
//! let rows: Vec<Vec<usize>> = (0..6).map(|i| vec![i, (i + 1) % 6]).collect();
//! let own = RowOwnership::uniform(6, 1).unwrap();
//! let mat = DistAijMatrix::from_global_rows(own, 0, &rows).unwrap();
//! let out = increase_overlap(&mat, &NoComm, vec![IndexSet::new(vec![0])], 2).unwrap();
//! assert_eq!(out[0].sorted(), vec![0, 1, 2]);
//! ```
//!
//! ## Determinism
//!
//! Set membership is deterministic for a given matrix and input. The order of
//! rows inside a returned set depends on message arrival order; enable
//! [`OverlapOptions::sort_indices`](overlap::OverlapOptions) when a stable
//! order is needed.

pub mod algs;
pub mod index_set;
pub mod matrix;
pub mod overlap;
pub mod overlap_error;

pub use overlap::{increase_overlap, increase_overlap_with};

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{
        CommTag, Communicator, LocalComm, LocalWorld, NoComm, OverlapTags,
    };
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::index_set::IndexSet;
    pub use crate::matrix::{CsrBlock, DistAijMatrix, RowOwnership};
    pub use crate::overlap::{
        increase_overlap, increase_overlap_with, OverlapOptions, OverlapReport, OverlapStats,
    };
    pub use crate::overlap_error::OverlapError;
}
