// mpirun -n 3 cargo run --features mpi-support --example overlap_mpi
//
// Every rank owns a slice of a 1-D periodic stencil and grows the set made of
// its first owned row by two hops.
fn main() {
    use aij_overlap::prelude::*;
    use mpi::traits::CommunicatorCollectives;

    let universe = mpi::initialize().unwrap();
    let comm = MpiComm::new(universe.world());

    let n = 8 * comm.size();
    let rows: Vec<Vec<usize>> = (0..n).map(|i| vec![(i + n - 1) % n, i, (i + 1) % n]).collect();
    let own = RowOwnership::uniform(n, comm.size()).unwrap();
    let mat = DistAijMatrix::from_global_rows(own, comm.rank(), &rows).unwrap();

    let opts = OverlapOptions::default().with_sorted_indices(true);
    let start = IndexSet::new(vec![mat.rstart()]);
    let report = increase_overlap_with(&mat, &comm, vec![start], 2, &opts).unwrap();
    println!("rank {}: {:?}", comm.rank(), report.sets[0].indices());
    comm.raw().barrier();
}
