mod util;

use aij_overlap::prelude::*;
use util::{assert_unique, even, path, random_rows, reference, ring, run_ranks};

fn sorted_opts() -> OverlapOptions {
    OverlapOptions::default().with_sorted_indices(true)
}

#[test]
fn ring_on_three_ranks_matches_reference() {
    let rows = ring(12);
    let starts = [vec![0usize], vec![4, 11], vec![8]];
    for ov in 1..5 {
        let out = run_ranks(&rows, &even(12, 3), |r| vec![IndexSet::new(starts[r].clone())], ov, &sorted_opts());
        for (r, rep) in out.iter().enumerate() {
            assert_eq!(
                rep.sets[0].indices(),
                reference(&rows, &starts[r], ov as usize).as_slice(),
                "rank {r}, ov {ov}"
            );
        }
    }
}

#[test]
fn random_matrix_on_four_ranks() {
    let n = 40;
    let rows = random_rows(n, 3, 0xC0FFEE);
    let starts = |r: usize| -> Vec<Vec<usize>> {
        vec![vec![r], vec![(r * 7 + 3) % n, (r * 11 + 5) % n], vec![]]
    };
    for ov in 0..4 {
        let out = run_ranks(
            &rows,
            &even(n, 4),
            |r| starts(r).into_iter().map(IndexSet::new).collect(),
            ov,
            &OverlapOptions::default(),
        );
        for (r, rep) in out.iter().enumerate() {
            for (i, set) in rep.sets.iter().enumerate() {
                assert_unique(set);
                assert_eq!(
                    set.sorted(),
                    reference(&rows, &starts(r)[i], ov as usize),
                    "rank {r}, set {i}, ov {ov}"
                );
            }
        }
    }
}

#[test]
fn result_does_not_depend_on_rank_count() {
    let n = 30;
    let rows = random_rows(n, 2, 7);
    let start = vec![3usize, 17, 29];
    let serial = run_ranks(&rows, &[n], |_| vec![IndexSet::new(start.clone())], 3, &sorted_opts());
    for ranks in 2..=5 {
        let out = run_ranks(&rows, &even(n, ranks), |_| vec![IndexSet::new(start.clone())], 3, &sorted_opts());
        for rep in &out {
            assert_eq!(rep.sets, serial[0].sets, "{ranks} ranks");
        }
    }
}

#[test]
fn sets_on_one_rank_stay_isolated() {
    let rows = path(16);
    let out = run_ranks(
        &rows,
        &even(16, 2),
        |r| {
            if r == 0 {
                vec![IndexSet::new(vec![15]), IndexSet::new(vec![0])]
            } else {
                Vec::new()
            }
        },
        1,
        &sorted_opts(),
    );
    assert_eq!(out[0].sets[0].indices(), &[14, 15]);
    assert_eq!(out[0].sets[1].indices(), &[0, 1]);
    assert!(out[1].sets.is_empty());
    assert_eq!(out[0].stats.requests_sent, 1);
    assert_eq!(out[1].stats.requests_received, 1);
}

#[test]
fn same_row_in_two_sets_reaches_both() {
    let rows = ring(8);
    let out = run_ranks(
        &rows,
        &even(8, 2),
        |r| {
            if r == 0 {
                vec![IndexSet::new(vec![6]), IndexSet::new(vec![6, 1])]
            } else {
                vec![IndexSet::new(vec![2])]
            }
        },
        1,
        &sorted_opts(),
    );
    assert_eq!(out[0].sets[0].indices(), &[5, 6, 7]);
    assert_eq!(out[0].sets[1].indices(), &[0, 1, 2, 5, 6, 7]);
    assert_eq!(out[1].sets[0].indices(), &[1, 2, 3]);
}

#[test]
fn rank_without_rows_takes_part() {
    let rows = ring(9);
    let sizes = [4, 0, 5];
    let out = run_ranks(
        &rows,
        &sizes,
        |r| vec![IndexSet::new(vec![r * 3])],
        2,
        &sorted_opts(),
    );
    for (r, rep) in out.iter().enumerate() {
        assert_eq!(rep.sets[0].indices(), reference(&rows, &[r * 3], 2).as_slice());
    }
}

#[test]
fn dense_row_forces_reply_growth() {
    let n = 64;
    let mut rows: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    rows[32] = (0..n).collect();
    let out = run_ranks(
        &rows,
        &even(n, 2),
        |r| {
            if r == 0 {
                vec![IndexSet::new(vec![32])]
            } else {
                Vec::new()
            }
        },
        1,
        &sorted_opts(),
    );
    assert_eq!(out[0].sets[0].indices(), (0..n).collect::<Vec<_>>().as_slice());
    let stats = out[1].stats;
    assert!(stats.reply_allocations > 1, "{stats:?}");
    assert_eq!(stats.reply_words_required, 3 + n);
    assert!(stats.reply_words_allocated >= stats.reply_words_required);
}

#[test]
fn repeated_calls_on_one_world_do_not_interfere() {
    let rows = ring(10);
    let own = RowOwnership::uniform(10, 2).unwrap();
    let out = LocalWorld::run(2, |comm| {
        let m = DistAijMatrix::from_global_rows(own.clone(), comm.rank(), &rows).unwrap();
        let first = increase_overlap(&m, &comm, vec![IndexSet::new(vec![comm.rank() * 5])], 1).unwrap();
        let second = increase_overlap(&m, &comm, first.clone(), 1).unwrap();
        (first[0].sorted(), second[0].sorted())
    });
    assert_eq!(out[0].0, vec![0, 1, 9]);
    assert_eq!(out[0].1, vec![0, 1, 2, 8, 9]);
    assert_eq!(out[1].0, vec![4, 5, 6]);
    assert_eq!(out[1].1, vec![3, 4, 5, 6, 7]);
}

#[test]
fn custom_tags_work() {
    let rows = ring(6);
    let opts = OverlapOptions::default()
        .with_tags(OverlapTags::from_base(CommTag::new(0x7700)))
        .with_sorted_indices(true);
    let out = run_ranks(&rows, &even(6, 3), |r| vec![IndexSet::new(vec![r * 2])], 1, &opts);
    assert_eq!(out[1].sets[0].indices(), &[1, 2, 3]);
}
