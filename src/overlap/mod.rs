//! Overlap growth: extend index sets by whole hops of the matrix graph.
//!
//! [`increase::increase_overlap`] drives the algorithm. The submodules hold
//! its pieces: [`local`] expands owned rows, [`request`] packs rows for their
//! owners and defines the message layout, [`reply`] answers requests from
//! other ranks, and [`options`] carries the tunables.

pub mod increase;
pub mod local;
pub mod options;
pub mod reply;
pub mod request;

pub use increase::{increase_overlap, increase_overlap_with, OverlapReport, OverlapStats};
pub use options::OverlapOptions;
