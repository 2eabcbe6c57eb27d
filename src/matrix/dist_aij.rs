//! Row-partitioned sparse matrix structure, as seen by one rank.
//!
//! The rank owns the contiguous global rows `rstart..rend`. Its rows are split
//! into two CSR blocks:
//! - the *diagonal* block `A` holds columns owned by this rank, stored as
//!   `col - cstart`;
//! - the *off-diagonal* block `B` holds every other column, stored as an
//!   index into `garray`, the sorted local-to-global column map.
//!
//! The matrix is square with the column layout equal to the row layout, so
//! `cstart == rstart`. Only the sparsity pattern is stored.

use super::csr::CsrBlock;
use super::ownership::RowOwnership;
use crate::overlap_error::OverlapError;
use itertools::Itertools;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct DistAijMatrix {
    rank: usize,
    ownership: RowOwnership,
    diag: CsrBlock,
    off_diag: CsrBlock,
    garray: Vec<usize>,
}

impl DistAijMatrix {
    /// Build this rank's part from the global column indices of its own rows.
    ///
    /// `rows[i]` lists the nonzero columns of global row `rstart + i`.
    /// Duplicate columns within a row are merged.
    pub fn from_local_rows<R: AsRef<[usize]>>(
        ownership: RowOwnership,
        rank: usize,
        rows: &[R],
    ) -> Result<Self, OverlapError> {
        if rank >= ownership.n_ranks() {
            return Err(OverlapError::InvalidLayout(format!(
                "rank {rank} outside layout of {} ranks",
                ownership.n_ranks()
            )));
        }
        let range = ownership.range(rank);
        if rows.len() != range.len() {
            return Err(OverlapError::InvalidLayout(format!(
                "rank {rank} owns {} rows but {} were supplied",
                range.len(),
                rows.len()
            )));
        }
        let global = ownership.global_rows();
        let (rstart, rend) = (range.start, range.end);

        let mut garray: Vec<usize> = Vec::new();
        for row in rows {
            for &c in row.as_ref() {
                if c >= global {
                    return Err(OverlapError::ColumnOutOfRange {
                        col: c,
                        global_cols: global,
                    });
                }
                if !(rstart..rend).contains(&c) {
                    garray.push(c);
                }
            }
        }
        garray.sort_unstable();
        garray.dedup();

        let mut diag_rows = Vec::with_capacity(rows.len());
        let mut off_rows = Vec::with_capacity(rows.len());
        for row in rows {
            let (mut d, mut o): (Vec<usize>, Vec<usize>) = (Vec::new(), Vec::new());
            for c in row.as_ref().iter().copied().sorted_unstable().dedup() {
                if (rstart..rend).contains(&c) {
                    d.push(c - rstart);
                } else if let Ok(k) = garray.binary_search(&c) {
                    o.push(k);
                }
            }
            diag_rows.push(d);
            off_rows.push(o);
        }

        let diag = CsrBlock::from_rows(&diag_rows, rend - rstart)?;
        let off_diag = CsrBlock::from_rows(&off_rows, garray.len())?;
        Ok(Self {
            rank,
            ownership,
            diag,
            off_diag,
            garray,
        })
    }

    /// Build this rank's part from a global adjacency (`rows[r]` = columns of row `r`).
    pub fn from_global_rows<R: AsRef<[usize]>>(
        ownership: RowOwnership,
        rank: usize,
        rows: &[R],
    ) -> Result<Self, OverlapError> {
        if rows.len() != ownership.global_rows() {
            return Err(OverlapError::InvalidLayout(format!(
                "layout has {} rows but the adjacency has {}",
                ownership.global_rows(),
                rows.len()
            )));
        }
        if rank >= ownership.n_ranks() {
            return Err(OverlapError::InvalidLayout(format!(
                "rank {rank} outside layout of {} ranks",
                ownership.n_ranks()
            )));
        }
        let range = ownership.range(rank);
        Self::from_local_rows(ownership, rank, &rows[range])
    }

    /// Assemble from already split blocks.
    pub fn from_parts(
        ownership: RowOwnership,
        rank: usize,
        diag: CsrBlock,
        off_diag: CsrBlock,
        garray: Vec<usize>,
    ) -> Result<Self, OverlapError> {
        if rank >= ownership.n_ranks() {
            return Err(OverlapError::InvalidLayout(format!(
                "rank {rank} outside layout of {} ranks",
                ownership.n_ranks()
            )));
        }
        let range = ownership.range(rank);
        if diag.rows() != range.len() || off_diag.rows() != range.len() {
            return Err(OverlapError::InvalidLayout(format!(
                "blocks have {} and {} rows, rank {rank} owns {}",
                diag.rows(),
                off_diag.rows(),
                range.len()
            )));
        }
        if diag.ncols() != range.len() {
            return Err(OverlapError::InvalidLayout(format!(
                "diagonal block has {} columns, expected {}",
                diag.ncols(),
                range.len()
            )));
        }
        if off_diag.ncols() != garray.len() {
            return Err(OverlapError::InvalidLayout(format!(
                "off-diagonal block has {} columns but garray maps {}",
                off_diag.ncols(),
                garray.len()
            )));
        }
        let global = ownership.global_rows();
        for &g in &garray {
            if g >= global {
                return Err(OverlapError::ColumnOutOfRange {
                    col: g,
                    global_cols: global,
                });
            }
            if range.contains(&g) {
                return Err(OverlapError::InvalidLayout(format!(
                    "garray maps column {g}, which rank {rank} owns"
                )));
            }
        }
        Ok(Self {
            rank,
            ownership,
            diag,
            off_diag,
            garray,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn n_ranks(&self) -> usize {
        self.ownership.n_ranks()
    }

    pub fn ownership(&self) -> &RowOwnership {
        &self.ownership
    }

    pub fn global_rows(&self) -> usize {
        self.ownership.global_rows()
    }

    pub fn local_rows(&self) -> usize {
        self.diag.rows()
    }

    pub fn rstart(&self) -> usize {
        self.ownership.range(self.rank).start
    }

    pub fn rend(&self) -> usize {
        self.ownership.range(self.rank).end
    }

    /// First global column of the diagonal block.
    pub fn cstart(&self) -> usize {
        self.rstart()
    }

    /// Stored entries in both blocks.
    pub fn nonzeros(&self) -> usize {
        self.diag.nnz() + self.off_diag.nnz()
    }

    pub fn diag(&self) -> &CsrBlock {
        &self.diag
    }

    pub fn off_diag(&self) -> &CsrBlock {
        &self.off_diag
    }

    pub fn garray(&self) -> &[usize] {
        &self.garray
    }

    #[inline]
    pub fn owns_row(&self, row: usize) -> bool {
        self.ownership.owner_of(row) == self.rank
    }

    /// Global columns of an owned global row: diagonal block first, then `B` via `garray`.
    ///
    /// `row` must be owned by this rank.
    pub fn row_columns(&self, row: usize) -> impl Iterator<Item = usize> + '_ {
        let local = row - self.rstart();
        let cstart = self.cstart();
        let garray = &self.garray;
        self.diag
            .row(local)
            .iter()
            .map(move |&c| c + cstart)
            .chain(self.off_diag.row(local).iter().map(move |&c| garray[c]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path4() -> Vec<Vec<usize>> {
        // 0 - 1 - 2 - 3 with self loops
        vec![vec![0, 1], vec![0, 1, 2], vec![1, 2, 3], vec![2, 3]]
    }

    #[test]
    fn split_into_blocks() {
        let own = RowOwnership::uniform(4, 2).unwrap();
        let m = DistAijMatrix::from_global_rows(own, 1, &path4()).unwrap();
        assert_eq!(m.rstart(), 2);
        assert_eq!(m.local_rows(), 2);
        assert_eq!(m.garray(), &[1]);
        assert_eq!(m.diag().row(0), &[0, 1]);
        assert_eq!(m.off_diag().row(0), &[0]);
        assert!(m.off_diag().row(1).is_empty());
        assert_eq!(m.nonzeros(), 5);
        let cols: Vec<usize> = m.row_columns(2).collect();
        assert_eq!(cols, vec![2, 3, 1]);
    }

    #[test]
    fn duplicate_columns_merged() {
        let own = RowOwnership::uniform(2, 1).unwrap();
        let m = DistAijMatrix::from_local_rows(own, 0, &[vec![1, 1, 0], vec![1]]).unwrap();
        assert_eq!(m.diag().row(0), &[0, 1]);
        assert_eq!(m.nonzeros(), 3);
    }

    #[test]
    fn wrong_row_count_rejected() {
        let own = RowOwnership::uniform(4, 2).unwrap();
        let err = DistAijMatrix::from_local_rows(own, 0, &[vec![0]]).unwrap_err();
        assert!(matches!(err, OverlapError::InvalidLayout(_)));
    }

    #[test]
    fn column_out_of_range_rejected() {
        let own = RowOwnership::uniform(2, 1).unwrap();
        let err = DistAijMatrix::from_local_rows(own, 0, &[vec![0], vec![9]]).unwrap_err();
        assert!(matches!(err, OverlapError::ColumnOutOfRange { col: 9, .. }));
    }

    #[test]
    fn from_parts_checks_garray() {
        let own = RowOwnership::uniform(4, 2).unwrap();
        let diag = CsrBlock::from_rows([vec![0], vec![1]], 2).unwrap();
        let off = CsrBlock::from_rows([vec![0], vec![]], 1).unwrap();
        assert!(DistAijMatrix::from_parts(own.clone(), 0, diag.clone(), off.clone(), vec![3]).is_ok());
        assert!(DistAijMatrix::from_parts(own, 0, diag, off, vec![1]).is_err());
    }
}
