//! Compressed sparse row storage for the structure of one matrix block.
//!
//! Only the sparsity pattern is kept: `offsets[r]..offsets[r + 1]` indexes the
//! column entries of local row `r`. Columns are block-local (shifted by
//! `cstart` for the diagonal block, indices into `garray` for the
//! off-diagonal block).

use crate::overlap_error::OverlapError;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CsrBlock {
    offsets: Vec<usize>,
    cols: Vec<usize>,
    ncols: usize,
}

impl Default for CsrBlock {
    fn default() -> Self {
        Self {
            offsets: vec![0],
            cols: Vec::new(),
            ncols: 0,
        }
    }
}

impl CsrBlock {
    /// Build from raw CSR arrays, validating offsets and column bounds.
    pub fn from_parts(
        offsets: Vec<usize>,
        cols: Vec<usize>,
        ncols: usize,
    ) -> Result<Self, OverlapError> {
        if offsets.first() != Some(&0) {
            return Err(OverlapError::InvalidLayout(
                "CSR offsets must start with 0".into(),
            ));
        }
        if offsets.windows(2).any(|w| w[1] < w[0]) {
            return Err(OverlapError::InvalidLayout(
                "CSR offsets must be non-decreasing".into(),
            ));
        }
        if offsets.last() != Some(&cols.len()) {
            return Err(OverlapError::InvalidLayout(format!(
                "CSR offsets end at {:?} but {} column entries are stored",
                offsets.last(),
                cols.len()
            )));
        }
        if let Some(&c) = cols.iter().find(|&&c| c >= ncols) {
            return Err(OverlapError::ColumnOutOfRange {
                col: c,
                global_cols: ncols,
            });
        }
        Ok(Self {
            offsets,
            cols,
            ncols,
        })
    }

    /// Build from per-row column lists.
    pub fn from_rows<I, R>(rows: I, ncols: usize) -> Result<Self, OverlapError>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[usize]>,
    {
        let mut offsets = vec![0];
        let mut cols = Vec::new();
        for row in rows {
            cols.extend_from_slice(row.as_ref());
            offsets.push(cols.len());
        }
        Self::from_parts(offsets, cols, ncols)
    }

    pub fn rows(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.cols.len()
    }

    /// Block-local column indices of `row`.
    #[inline]
    pub fn row(&self, row: usize) -> &[usize] {
        &self.cols[self.offsets[row]..self.offsets[row + 1]]
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn cols(&self) -> &[usize] {
        &self.cols
    }
}
