mod util;

use aij_overlap::prelude::*;
use proptest::prelude::*;
use util::{even, random_rows, reference, run_ranks};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_matches_serial_hops(
        n in 1usize..40,
        ranks in 1usize..5,
        extra in 0usize..4,
        ov in 0i64..4,
        seed in any::<u64>(),
        starts in proptest::collection::vec(proptest::collection::vec(0usize..1000, 0..5), 0..3),
    ) {
        let rows = random_rows(n, extra, seed);
        let starts: Vec<Vec<usize>> = starts
            .into_iter()
            .map(|s| s.into_iter().map(|r| r % n).collect())
            .collect();
        let sizes = even(n, ranks);
        let out = run_ranks(
            &rows,
            &sizes,
            |_| starts.iter().cloned().map(IndexSet::new).collect(),
            ov,
            &OverlapOptions::default(),
        );
        for rep in &out {
            prop_assert_eq!(rep.sets.len(), starts.len());
            for (set, start) in rep.sets.iter().zip(&starts) {
                let got = set.sorted();
                if ov > 0 {
                    // no repeats once at least one pass has run
                    let mut dedup = got.clone();
                    dedup.dedup();
                    prop_assert_eq!(&got, &dedup);
                    prop_assert_eq!(got, reference(&rows, start, ov as usize));
                } else {
                    let mut want = start.clone();
                    want.sort_unstable();
                    prop_assert_eq!(got, want);
                }
            }
        }
    }

    #[test]
    fn prop_growth_is_monotone(
        n in 2usize..30,
        seed in any::<u64>(),
        start in 0usize..30,
    ) {
        let rows = random_rows(n, 2, seed);
        let start = start % n;
        let sizes = even(n, 2);
        let mut prev: Vec<usize> = vec![start];
        for ov in 1..4 {
            let out = run_ranks(&rows, &sizes, |_| vec![IndexSet::new(vec![start])], ov, &OverlapOptions::default());
            let got = out[0].sets[0].sorted();
            prop_assert!(prev.iter().all(|r| got.binary_search(r).is_ok()), "{prev:?} ⊄ {got:?}");
            // every new row is a column of some row from the previous depth
            for r in &got {
                if prev.binary_search(r).is_err() {
                    prop_assert!(prev.iter().any(|p| rows[*p].contains(r)));
                }
            }
            prev = got;
        }
    }
}
