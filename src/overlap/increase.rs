//! `increase_overlap`: grow index sets by `ov` hops of the matrix graph.
//!
//! Every iteration runs two exchange phases on every rank:
//!
//! 1. **Requests.** Rows of each set are classified by owner. Owned rows go
//!    into the set's table; the rest are packed into one message per owning
//!    rank. Receive count and size come from a `SUM` and a `MAX` all-reduce.
//!    While the requests are in flight the owned rows are expanded locally.
//! 2. **Replies.** Each received request is answered with the requested rows
//!    plus their neighbours, per set. Reply size comes from a `MAX`
//!    all-reduce; the number of replies equals the number of requests sent.
//!    Replies are merged into the tables without duplicates.
//!
//! All collectives are reached by every rank on every iteration, so every rank
//! must call with the same `ov`.

use super::local::expand_local;
use super::options::OverlapOptions;
use super::reply::build_replies;
use super::request::{parse_message, RequestMessages};
use crate::algs::communicator::{Communicator, Envelope};
use crate::algs::exchange::run_phase;
use crate::algs::wire::{decode_words, encode_words, Word};
use crate::index_set::{IndexSet, RowTable};
use crate::matrix::DistAijMatrix;
use crate::overlap_error::OverlapError;

/// Counters accumulated over all iterations of one call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OverlapStats {
    pub iterations: usize,
    pub requests_sent: usize,
    pub requests_received: usize,
    /// Rows added by local expansion.
    pub local_rows_added: usize,
    /// Reply words reserved, summed over iterations.
    pub reply_words_allocated: usize,
    /// Reply words written, summed over iterations.
    pub reply_words_required: usize,
    /// Reply buffer allocations, summed over iterations.
    pub reply_allocations: usize,
}

/// Grown sets plus the counters of the call.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OverlapReport {
    pub sets: Vec<IndexSet>,
    pub stats: OverlapStats,
}

/// Grow every set in `sets` by `ov` hops using default options.
///
/// Collective over `comm`. Returns one set per input set, in input order.
/// Only membership is defined; the order of rows inside a set is not.
pub fn increase_overlap<C: Communicator>(
    mat: &DistAijMatrix,
    comm: &C,
    sets: Vec<IndexSet>,
    ov: i64,
) -> Result<Vec<IndexSet>, OverlapError> {
    increase_overlap_with(mat, comm, sets, ov, &OverlapOptions::default()).map(|r| r.sets)
}

/// Grow every set in `sets` by `ov` hops.
///
/// Arguments are validated before any communication: a negative `ov`, bad
/// options, a communicator that disagrees with the matrix layout, or an
/// out-of-range row is reported without doing any work.
pub fn increase_overlap_with<C: Communicator>(
    mat: &DistAijMatrix,
    comm: &C,
    sets: Vec<IndexSet>,
    ov: i64,
    opts: &OverlapOptions,
) -> Result<OverlapReport, OverlapError> {
    if ov < 0 {
        return Err(OverlapError::NegativeOverlap(ov));
    }
    opts.validate()?;
    if comm.size() != mat.n_ranks() || comm.rank() != mat.rank() {
        return Err(OverlapError::LayoutMismatch {
            comm_rank: comm.rank(),
            comm_size: comm.size(),
            mat_rank: mat.rank(),
            mat_size: mat.n_ranks(),
        });
    }
    for set in &sets {
        for &row in set.indices() {
            mat.ownership().check_row(row)?;
        }
    }

    let mut stats = OverlapStats::default();
    let mut sets = sets;
    for it in 0..ov {
        sets = overlap_once(mat, comm, sets, opts, &mut stats)?;
        stats.iterations += 1;
        log::debug!(
            "[{}] overlap iteration {}/{}: {} rows across {} sets",
            comm.rank(),
            it + 1,
            ov,
            sets.iter().map(IndexSet::len).sum::<usize>(),
            sets.len()
        );
    }
    if opts.sort_indices {
        sets.iter_mut().for_each(IndexSet::sort);
    }
    Ok(OverlapReport { sets, stats })
}

/// One request/reply round.
fn overlap_once<C: Communicator>(
    mat: &DistAijMatrix,
    comm: &C,
    sets: Vec<IndexSet>,
    opts: &OverlapOptions,
    stats: &mut OverlapStats,
) -> Result<Vec<IndexSet>, OverlapError> {
    let rank = comm.rank();
    let global = mat.global_rows();
    let mut tables: Vec<RowTable> = sets
        .iter()
        .map(|_| RowTable::new(global, opts.dense_row_limit))
        .collect::<Result<_, _>>()?;

    // --- request phase ---
    let requests = RequestMessages::build(mat, &sets, &mut tables)?;
    drop(sets);
    let max_len = comm.all_reduce_max(&requests.message_lengths())?[rank] as usize;
    let n_inbound = comm.all_reduce_sum(&requests.destination_flags())?[rank] as usize;
    let outgoing = requests.encode()?;
    let n_requests = outgoing.len();
    drop(requests);
    log::debug!(
        "[{rank}] sending {n_requests} request(s), expecting {n_inbound} of up to {max_len} words"
    );

    let (added, inbound) = run_phase(
        comm,
        opts.tags.request,
        outgoing,
        n_inbound,
        max_len,
        || expand_local(mat, &mut tables),
    )?;
    stats.local_rows_added += added;
    stats.requests_sent += n_requests;
    stats.requests_received += inbound.len();

    // --- reply phase ---
    let decoded: Vec<(usize, Vec<Word>)> = inbound
        .iter()
        .map(|env| -> Result<_, OverlapError> {
            Ok((env.source, decode_words(&env.payload, env.source)?))
        })
        .collect::<Result<_, _>>()?;
    drop(inbound);
    let replies = build_replies(mat, &decoded, opts)?;
    let reply_stats = replies.stats();
    stats.reply_words_allocated += reply_stats.capacity;
    stats.reply_words_required += reply_stats.required;
    stats.reply_allocations += reply_stats.allocations;

    let mut reply_lens = vec![0u64; comm.size()];
    for (k, (src, _)) in decoded.iter().enumerate() {
        reply_lens[*src] = replies.reply(k).len() as u64;
    }
    let max_reply = comm.all_reduce_max(&reply_lens)?[rank] as usize;
    let mut outgoing = Vec::with_capacity(decoded.len());
    for (k, (src, _)) in decoded.iter().enumerate() {
        outgoing.push((*src, encode_words(replies.reply(k))?));
    }
    drop(replies);

    let ((), answers) = run_phase(
        comm,
        opts.tags.response,
        outgoing,
        n_requests,
        max_reply,
        || (),
    )?;
    for env in &answers {
        merge_reply(&mut tables, env, global)?;
    }

    Ok(tables.into_iter().map(RowTable::into_index_set).collect())
}

/// Fold one reply into the tables it names.
fn merge_reply(
    tables: &mut [RowTable],
    env: &Envelope,
    global_rows: usize,
) -> Result<(), OverlapError> {
    let words = decode_words(&env.payload, env.source)?;
    for seg in parse_message(&words, env.source)? {
        let n_sets = tables.len();
        let table = tables.get_mut(seg.set).ok_or_else(|| {
            OverlapError::malformed(
                env.source,
                format!("reply names set {} but only {n_sets} sets exist", seg.set),
            )
        })?;
        for &w in seg.rows {
            match usize::try_from(w) {
                Ok(row) if row < global_rows => {
                    table.insert(row);
                }
                _ => {
                    return Err(OverlapError::malformed(
                        env.source,
                        format!("reply row {w} outside 0..{global_rows}"),
                    ));
                }
            }
        }
    }
    Ok(())
}
