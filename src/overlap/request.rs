//! Request-phase message aggregation and the shared message layout.
//!
//! A message is a flat word array:
//!
//! ```text
//! [ n,  set_0, count_0,  set_1, count_1, ...,  rows of set_0 ..., rows of set_1 ... ]
//!   ^   \_____________ n pairs _____________/  \________ sum(count_k) words ______/
//! ```
//!
//! One message goes to each destination rank and covers every index set that
//! has rows owned there. A row that occurs in several sets is sent once per
//! set.

use crate::algs::wire::{encode_words, word_to_index, Word};
use crate::index_set::{IndexSet, RowTable};
use crate::matrix::DistAijMatrix;
use crate::overlap_error::OverlapError;
use bytes::Bytes;

/// Sub-range of a backing buffer owned by one message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Words needed for a message carrying `rows` rows from `sets` index sets.
pub fn message_len(rows: usize, sets: usize) -> usize {
    rows + 2 * sets + 1
}

/// Reserve exactly `words` words or fail with [`OverlapError::Allocation`].
pub(crate) fn alloc_words(words: usize, what: &'static str) -> Result<Vec<Word>, OverlapError> {
    let mut v = Vec::new();
    v.try_reserve_exact(words)
        .map_err(|_| OverlapError::Allocation { what, words })?;
    Ok(v)
}

/// Outgoing requests of one rank: one message per destination in a single buffer.
#[derive(Debug)]
pub struct RequestMessages {
    buf: Vec<Word>,
    spans: Vec<Option<Span>>,
}

impl RequestMessages {
    /// Classify every row of every set.
    ///
    /// Rows this rank owns go straight into `tables[i]` (deduplicated); rows
    /// owned by another rank are queued for that rank. `tables` must hold one
    /// table per set and every row must be a valid global row.
    pub fn build(
        mat: &DistAijMatrix,
        sets: &[IndexSet],
        tables: &mut [RowTable],
    ) -> Result<Self, OverlapError> {
        debug_assert_eq!(sets.len(), tables.len());
        let own = mat.ownership();
        let size = own.n_ranks();
        let rank = mat.rank();

        // 1) per destination: rows (w1) and sets touched (w3)
        let mut w1 = vec![0usize; size];
        let mut w3 = vec![0usize; size];
        let mut w4 = vec![0usize; size];
        for set in sets {
            w4.fill(0);
            for &row in set.indices() {
                w4[own.owner_of(row)] += 1;
            }
            for p in 0..size {
                if w4[p] > 0 {
                    w1[p] += w4[p];
                    w3[p] += 1;
                }
            }
        }
        w1[rank] = 0;
        w3[rank] = 0;

        // 2) one span per destination in rank order
        let mut spans = vec![None; size];
        let mut total = 0usize;
        for p in 0..size {
            if w1[p] > 0 {
                let len = message_len(w1[p], w3[p]);
                spans[p] = Some(Span { offset: total, len });
                total += len;
            }
        }
        let mut buf = alloc_words(total, "outgoing requests")?;
        buf.resize(total, 0);

        // 3) row cursors start right after each header
        let mut cursor = vec![0usize; size];
        for p in 0..size {
            if let Some(s) = spans[p] {
                cursor[p] = s.offset + 1 + 2 * w3[p];
            }
        }

        // 4) fill rows, then the (set, count) pair of each set per destination
        let mut ctr = vec![0usize; size];
        for (i, (set, table)) in sets.iter().zip(tables.iter_mut()).enumerate() {
            ctr.fill(0);
            for &row in set.indices() {
                let p = own.owner_of(row);
                if p == rank {
                    table.insert(row);
                } else {
                    buf[cursor[p]] = row as Word;
                    cursor[p] += 1;
                    ctr[p] += 1;
                }
            }
            for p in 0..size {
                if ctr[p] == 0 {
                    continue;
                }
                if let Some(s) = spans[p] {
                    buf[s.offset] += 1;
                    let k = buf[s.offset] as usize;
                    buf[s.offset + 2 * k - 1] = i as Word;
                    buf[s.offset + 2 * k] = ctr[p] as Word;
                }
            }
        }

        Ok(Self { buf, spans })
    }

    /// Number of outgoing messages.
    pub fn len(&self) -> usize {
        self.spans.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destination ranks in ascending order.
    pub fn destinations(&self) -> impl Iterator<Item = usize> + '_ {
        self.spans
            .iter()
            .enumerate()
            .filter_map(|(p, s)| s.map(|_| p))
    }

    /// The message for `dst`, if any.
    pub fn message(&self, dst: usize) -> Option<&[Word]> {
        self.spans
            .get(dst)
            .copied()
            .flatten()
            .map(|s| &self.buf[s.range()])
    }

    /// Per-rank message length in words (0 where nothing is sent).
    pub fn message_lengths(&self) -> Vec<u64> {
        self.spans
            .iter()
            .map(|s| s.map_or(0, |s| s.len as u64))
            .collect()
    }

    /// Per-rank 1 where a message is sent, 0 elsewhere.
    pub fn destination_flags(&self) -> Vec<u64> {
        self.spans.iter().map(|s| u64::from(s.is_some())).collect()
    }

    /// Wire payloads, one per destination.
    pub fn encode(&self) -> Result<Vec<(usize, Bytes)>, OverlapError> {
        let mut out = Vec::with_capacity(self.len());
        for (p, s) in self.spans.iter().enumerate() {
            if let Some(s) = s {
                out.push((p, encode_words(&self.buf[s.range()])?));
            }
        }
        Ok(out)
    }
}

/// One `(set id, rows)` segment of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment<'a> {
    pub set: usize,
    pub rows: &'a [Word],
}

/// Split a message into its segments, checking that the header matches the payload.
pub fn parse_message(words: &[Word], source: usize) -> Result<Vec<Segment<'_>>, OverlapError> {
    let Some(&n) = words.first() else {
        return Err(OverlapError::malformed(source, "empty message"));
    };
    let n = word_to_index(n, source)?;
    let header = n
        .checked_mul(2)
        .and_then(|h| h.checked_add(1))
        .filter(|&h| h <= words.len())
        .ok_or_else(|| {
            OverlapError::malformed(
                source,
                format!("header of {n} pairs does not fit in {} words", words.len()),
            )
        })?;
    let mut segments = Vec::with_capacity(n);
    let mut at = header;
    for k in 1..=n {
        let set = word_to_index(words[2 * k - 1], source)?;
        let count = word_to_index(words[2 * k], source)?;
        let end = at
            .checked_add(count)
            .filter(|&e| e <= words.len())
            .ok_or_else(|| {
                OverlapError::malformed(
                    source,
                    format!("segment for set {set} runs past the end of the message"),
                )
            })?;
        segments.push(Segment {
            set,
            rows: &words[at..end],
        });
        at = end;
    }
    if at != words.len() {
        return Err(OverlapError::malformed(
            source,
            format!("{} trailing words after the last segment", words.len() - at),
        ));
    }
    Ok(segments)
}
