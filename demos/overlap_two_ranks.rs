// cargo run --example overlap_two_ranks
//
// Splits a 12-row periodic stencil over two in-process ranks and grows one
// index set per rank by two hops. Each rank prints its set before and after.
use aij_overlap::prelude::*;

fn main() -> Result<(), OverlapError> {
    let n = 12;
    let rows: Vec<Vec<usize>> = (0..n).map(|i| vec![(i + n - 1) % n, i, (i + 1) % n]).collect();
    let own = RowOwnership::uniform(n, 2)?;
    let opts = OverlapOptions::default().with_sorted_indices(true);

    let results = LocalWorld::run(2, |comm| -> Result<_, OverlapError> {
        let mat = DistAijMatrix::from_global_rows(own.clone(), comm.rank(), &rows)?;
        // start from the last owned row so the first hop crosses a rank boundary
        let start = IndexSet::new(vec![mat.rend() - 1]);
        let report = increase_overlap_with(&mat, &comm, vec![start.clone()], 2, &opts)?;
        Ok((start, report))
    });

    for (rank, res) in results.into_iter().enumerate() {
        let (start, report) = res?;
        println!("rank {rank}: {:?} -> {:?}", start.indices(), report.sets[0].indices());
        println!("rank {rank}: {:?}", report.stats);
    }
    Ok(())
}
