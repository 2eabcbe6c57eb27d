//! Row ownership for a row-partitioned matrix.
//!
//! Rows are owned in contiguous blocks: rank `p` owns
//! `rowners[p]..rowners[p + 1]`. [`RowOwnership`] keeps the prefix array and a
//! direct lookup table so that `owner_of` is a single index.

use crate::overlap_error::OverlapError;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RowOwnership {
    rowners: Vec<usize>,
    owner: Vec<u32>,
}

impl RowOwnership {
    /// Build from a prefix array of per-rank row starts (`len = n_ranks + 1`).
    pub fn from_prefix(rowners: Vec<usize>) -> Result<Self, OverlapError> {
        if rowners.len() < 2 {
            return Err(OverlapError::InvalidLayout(
                "row-ownership prefix needs at least one rank".into(),
            ));
        }
        if rowners[0] != 0 {
            return Err(OverlapError::InvalidLayout(format!(
                "row-ownership prefix must start at 0, got {}",
                rowners[0]
            )));
        }
        if let Some(w) = rowners.windows(2).find(|w| w[1] < w[0]) {
            return Err(OverlapError::InvalidLayout(format!(
                "row-ownership prefix decreases from {} to {}",
                w[0], w[1]
            )));
        }
        let n_ranks = rowners.len() - 1;
        if u32::try_from(n_ranks).is_err() {
            return Err(OverlapError::InvalidLayout(format!(
                "{n_ranks} ranks do not fit the ownership table"
            )));
        }
        let global = rowners[n_ranks];
        let mut owner = vec![0u32; global];
        for p in 0..n_ranks {
            owner[rowners[p]..rowners[p + 1]].fill(p as u32);
        }
        Ok(Self { rowners, owner })
    }

    /// Build from the number of rows each rank owns.
    pub fn from_local_sizes(sizes: &[usize]) -> Result<Self, OverlapError> {
        let mut rowners = Vec::with_capacity(sizes.len() + 1);
        rowners.push(0);
        let mut acc = 0usize;
        for &n in sizes {
            acc += n;
            rowners.push(acc);
        }
        Self::from_prefix(rowners)
    }

    /// Split `global_rows` as evenly as possible; the first ranks get the remainder.
    pub fn uniform(global_rows: usize, n_ranks: usize) -> Result<Self, OverlapError> {
        if n_ranks == 0 {
            return Err(OverlapError::InvalidLayout("zero ranks".into()));
        }
        let base = global_rows / n_ranks;
        let extra = global_rows % n_ranks;
        let sizes: Vec<usize> = (0..n_ranks).map(|p| base + usize::from(p < extra)).collect();
        Self::from_local_sizes(&sizes)
    }

    pub fn n_ranks(&self) -> usize {
        self.rowners.len() - 1
    }

    pub fn global_rows(&self) -> usize {
        self.rowners[self.n_ranks()]
    }

    /// The prefix array this table was built from.
    pub fn rowners(&self) -> &[usize] {
        &self.rowners
    }

    /// Rows owned by `rank`.
    pub fn range(&self, rank: usize) -> std::ops::Range<usize> {
        self.rowners[rank]..self.rowners[rank + 1]
    }

    /// Owning rank of a global row. The row must be `< global_rows()`.
    #[inline]
    pub fn owner_of(&self, row: usize) -> usize {
        self.owner[row] as usize
    }

    /// Owning rank of a global row, or `None` when out of range.
    pub fn try_owner_of(&self, row: usize) -> Option<usize> {
        self.owner.get(row).map(|&p| p as usize)
    }

    /// Check that `row` is a valid global row.
    pub fn check_row(&self, row: usize) -> Result<(), OverlapError> {
        if row < self.global_rows() {
            Ok(())
        } else {
            Err(OverlapError::RowOutOfRange {
                row,
                global_rows: self.global_rows(),
            })
        }
    }
}
