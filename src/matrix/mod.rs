//! Structure of a row-partitioned sparse (AIJ) matrix.

pub mod csr;
pub mod dist_aij;
pub mod ownership;

pub use csr::CsrBlock;
pub use dist_aij::DistAijMatrix;
pub use ownership::RowOwnership;
