//! Index sets of global rows and the per-set tables used while growing them.
//!
//! An [`IndexSet`] is what callers hand in and get back. During an overlap
//! call each set is held in a [`RowTable`]: the row array plus [`RowMarks`],
//! an O(1) membership structure that guarantees a row is inserted at most once.

use crate::overlap_error::OverlapError;
use hashbrown::HashSet;
use itertools::Itertools;

/// Ordered list of global row numbers.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IndexSet {
    indices: Vec<usize>,
}

impl IndexSet {
    pub fn new(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Linear scan; use a [`RowTable`] for repeated queries.
    pub fn contains(&self, row: usize) -> bool {
        self.indices.contains(&row)
    }

    /// Ascending copy of the indices.
    pub fn sorted(&self) -> Vec<usize> {
        self.indices.iter().copied().sorted_unstable().collect()
    }

    pub fn sort(&mut self) {
        self.indices.sort_unstable();
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.indices
    }
}

impl From<Vec<usize>> for IndexSet {
    fn from(indices: Vec<usize>) -> Self {
        Self::new(indices)
    }
}

impl FromIterator<usize> for IndexSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Dense bitset using `Vec<u64>` words.
#[derive(Clone, Debug)]
pub struct DenseMarks {
    words: Vec<u64>,
}

impl DenseMarks {
    /// Bitset for rows `0..n`, all clear. Fails instead of aborting when the
    /// words cannot be allocated.
    pub fn with_size(n: usize) -> Result<Self, OverlapError> {
        let len = n.div_ceil(64);
        let mut words = Vec::new();
        words
            .try_reserve_exact(len)
            .map_err(|_| OverlapError::Allocation {
                what: "membership bitset",
                words: len,
            })?;
        words.resize(len, 0);
        Ok(Self { words })
    }
    #[inline]
    fn test_and_set(&mut self, i: usize) -> bool {
        let w = &mut self.words[i / 64];
        let b = 1u64 << (i % 64);
        let was = *w & b != 0;
        *w |= b;
        was
    }
    #[inline]
    fn get(&self, i: usize) -> bool {
        (self.words[i / 64] >> (i % 64)) & 1 == 1
    }
    fn clear(&mut self) {
        self.words.fill(0);
    }
}

/// Membership marks for one index set.
#[derive(Clone, Debug)]
pub enum RowMarks {
    /// One bit per global row.
    Dense(DenseMarks),
    /// Hash set of marked rows, for very large global row counts.
    Sparse(HashSet<usize>),
}

impl RowMarks {
    /// Dense marks when `global_rows <= dense_limit`, sparse otherwise.
    pub fn for_rows(global_rows: usize, dense_limit: usize) -> Result<Self, OverlapError> {
        Ok(if global_rows <= dense_limit {
            RowMarks::Dense(DenseMarks::with_size(global_rows)?)
        } else {
            RowMarks::Sparse(HashSet::new())
        })
    }

    /// Mark `row`; returns `true` if it was not marked before.
    #[inline]
    pub fn insert(&mut self, row: usize) -> bool {
        match self {
            RowMarks::Dense(d) => !d.test_and_set(row),
            RowMarks::Sparse(s) => s.insert(row),
        }
    }

    #[inline]
    pub fn contains(&self, row: usize) -> bool {
        match self {
            RowMarks::Dense(d) => d.get(row),
            RowMarks::Sparse(s) => s.contains(&row),
        }
    }

    pub fn clear(&mut self) {
        match self {
            RowMarks::Dense(d) => d.clear(),
            RowMarks::Sparse(s) => s.clear(),
        }
    }
}

/// Rows of one set being grown, with duplicate-free insertion.
#[derive(Clone, Debug)]
pub struct RowTable {
    marks: RowMarks,
    rows: Vec<usize>,
}

impl RowTable {
    pub fn new(global_rows: usize, dense_limit: usize) -> Result<Self, OverlapError> {
        Ok(Self {
            marks: RowMarks::for_rows(global_rows, dense_limit)?,
            rows: Vec::new(),
        })
    }

    /// Append `row` unless it is already present. Returns `true` if appended.
    #[inline]
    pub fn insert(&mut self, row: usize) -> bool {
        if self.marks.insert(row) {
            self.rows.push(row);
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn contains(&self, row: usize) -> bool {
        self.marks.contains(row)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Forget every row, keeping the allocation.
    pub fn reset(&mut self) {
        self.marks.clear();
        self.rows.clear();
    }

    pub fn into_index_set(self) -> IndexSet {
        IndexSet::new(self.rows)
    }
}
