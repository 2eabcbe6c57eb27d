//! Communication plumbing used by the overlap algorithm.

pub mod communicator;
pub mod exchange;
pub mod wire;

pub use communicator::{CommTag, Communicator, LocalComm, LocalWorld, NoComm, OverlapTags};
pub use exchange::run_phase;
