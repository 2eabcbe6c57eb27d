//! One-hop expansion over the rows this rank owns.

use crate::index_set::{RowMarks, RowTable};
use crate::matrix::DistAijMatrix;

/// Insert the neighbours of owned global `row` into `table`; returns how many were new.
#[inline]
pub fn expand_row(mat: &DistAijMatrix, row: usize, table: &mut RowTable) -> usize {
    let mut added = 0;
    for col in mat.row_columns(row) {
        if table.insert(col) {
            added += 1;
        }
    }
    added
}

/// Like [`expand_row`], but marks into `marks` and appends new columns through `push`.
pub fn expand_row_into<E>(
    mat: &DistAijMatrix,
    row: usize,
    marks: &mut RowMarks,
    mut push: impl FnMut(usize) -> Result<(), E>,
) -> Result<(), E> {
    for col in mat.row_columns(row) {
        if marks.insert(col) {
            push(col)?;
        }
    }
    Ok(())
}

/// Expand one table by a single hop.
///
/// Only the rows resident when the call starts are expanded; rows found on
/// the way are not. Rows owned elsewhere are skipped.
pub fn expand_table(mat: &DistAijMatrix, table: &mut RowTable) -> usize {
    let resident = table.len();
    let mut added = 0;
    for k in 0..resident {
        let row = table.rows()[k];
        if mat.owns_row(row) {
            added += expand_row(mat, row, table);
        }
    }
    added
}

/// Expand every table by a single hop. Returns the number of rows added.
#[cfg(not(feature = "rayon"))]
pub fn expand_local(mat: &DistAijMatrix, tables: &mut [RowTable]) -> usize {
    tables.iter_mut().map(|t| expand_table(mat, t)).sum()
}

/// Expand every table by a single hop. Returns the number of rows added.
#[cfg(feature = "rayon")]
pub fn expand_local(mat: &DistAijMatrix, tables: &mut [RowTable]) -> usize {
    use rayon::prelude::*;
    tables.par_iter_mut().map(|t| expand_table(mat, t)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::RowOwnership;

    fn ring(n: usize) -> Vec<Vec<usize>> {
        (0..n).map(|i| vec![(i + n - 1) % n, i, (i + 1) % n]).collect()
    }

    #[test]
    fn single_hop_only() {
        let own = RowOwnership::uniform(8, 1).unwrap();
        let m = DistAijMatrix::from_global_rows(own, 0, &ring(8)).unwrap();
        let mut t = RowTable::new(8, 64).unwrap();
        t.insert(0);
        assert_eq!(expand_table(&m, &mut t), 2);
        let mut rows = t.rows().to_vec();
        rows.sort_unstable();
        assert_eq!(rows, vec![0, 1, 7]);
    }

    #[test]
    fn re_expanding_adds_nothing() {
        let own = RowOwnership::uniform(8, 1).unwrap();
        let m = DistAijMatrix::from_global_rows(own, 0, &ring(8)).unwrap();
        let mut t = RowTable::new(8, 64).unwrap();
        t.insert(3);
        expand_table(&m, &mut t);
        assert_eq!(expand_row(&m, 3, &mut t), 0);
    }

    #[test]
    fn remote_columns_via_garray() {
        let own = RowOwnership::uniform(8, 2).unwrap();
        let m = DistAijMatrix::from_global_rows(own, 0, &ring(8)).unwrap();
        let mut t = RowTable::new(8, 64).unwrap();
        t.insert(0);
        t.insert(5); // owned by rank 1: skipped
        expand_table(&m, &mut t);
        let mut rows = t.rows().to_vec();
        rows.sort_unstable();
        assert_eq!(rows, vec![0, 1, 5, 7]);
    }

    #[test]
    fn tables_stay_isolated() {
        let own = RowOwnership::uniform(8, 1).unwrap();
        let m = DistAijMatrix::from_global_rows(own, 0, &ring(8)).unwrap();
        let mut tables = vec![RowTable::new(8, 64).unwrap(), RowTable::new(8, 0).unwrap()];
        tables[0].insert(1);
        tables[1].insert(5);
        assert_eq!(expand_local(&m, &mut tables), 4);
        let a: Vec<usize> = tables[0].rows().to_vec();
        let b: Vec<usize> = tables[1].rows().to_vec();
        assert_eq!(a, vec![1, 0, 2]);
        assert_eq!(b, vec![5, 4, 6]);
    }
}
