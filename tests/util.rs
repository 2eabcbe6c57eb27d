#![allow(dead_code)]
use aij_overlap::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

/// Periodic 1-D stencil: row `i` touches `i-1`, `i`, `i+1`.
pub fn ring(n: usize) -> Vec<Vec<usize>> {
    (0..n).map(|i| vec![(i + n - 1) % n, i, (i + 1) % n]).collect()
}

/// Non-periodic 1-D stencil.
pub fn path(n: usize) -> Vec<Vec<usize>> {
    (0..n)
        .map(|i| {
            let mut r = vec![i];
            if i > 0 {
                r.push(i - 1);
            }
            if i + 1 < n {
                r.push(i + 1);
            }
            r
        })
        .collect()
}

/// Random rows with a diagonal and up to `extra` off-diagonal columns each.
pub fn random_rows(n: usize, extra: usize, seed: u64) -> Vec<Vec<usize>> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let k = rng.gen_range(0..=extra);
            let mut r = vec![i];
            r.extend((0..k).map(|_| rng.gen_range(0..n)));
            r
        })
        .collect()
}

/// `ov` hops from `start`, computed serially on the global adjacency.
pub fn reference(rows: &[Vec<usize>], start: &[usize], ov: usize) -> Vec<usize> {
    let mut cur: BTreeSet<usize> = start.iter().copied().collect();
    for _ in 0..ov {
        let mut next = cur.clone();
        for &r in &cur {
            next.extend(rows[r].iter().copied());
        }
        cur = next;
    }
    cur.into_iter().collect()
}

/// Run `increase_overlap_with` on `sizes.len()` threaded ranks.
///
/// `sets(rank)` supplies the input sets of each rank.
pub fn run_ranks<F>(
    rows: &[Vec<usize>],
    sizes: &[usize],
    sets: F,
    ov: i64,
    opts: &OverlapOptions,
) -> Vec<OverlapReport>
where
    F: Fn(usize) -> Vec<IndexSet> + Sync,
{
    let own = RowOwnership::from_local_sizes(sizes).unwrap();
    LocalWorld::run(sizes.len(), |comm| {
        let m = DistAijMatrix::from_global_rows(own.clone(), comm.rank(), rows).unwrap();
        increase_overlap_with(&m, &comm, sets(comm.rank()), ov, opts).unwrap()
    })
}

/// Even split of `n` rows over `ranks`.
pub fn even(n: usize, ranks: usize) -> Vec<usize> {
    (0..ranks)
        .map(|p| n / ranks + usize::from(p < n % ranks))
        .collect()
}

/// Assert a set holds no repeated row.
pub fn assert_unique(set: &IndexSet) {
    let sorted = set.sorted();
    let mut dedup = sorted.clone();
    dedup.dedup();
    assert_eq!(sorted, dedup, "duplicate rows in {:?}", set.indices());
}
