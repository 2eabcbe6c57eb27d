//! Response builder: expand the rows other ranks asked for and pack the replies.
//!
//! All replies of one phase share a single backing buffer whose capacity
//! starts from an estimate and grows on overflow. Each reply owns a
//! contiguous span stored as an offset, so spans stay valid across
//! reallocations.

use super::local::expand_row_into;
use super::options::OverlapOptions;
use super::request::{alloc_words, parse_message, Segment, Span};
use crate::algs::wire::Word;
use crate::index_set::RowMarks;
use crate::matrix::DistAijMatrix;
use crate::overlap_error::OverlapError;

/// Allocation report of one response build.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReplyStats {
    /// Words reserved after the last growth.
    pub capacity: usize,
    /// Words actually written.
    pub required: usize,
    /// Number of buffer allocations, the initial one included.
    pub allocations: usize,
}

/// Growable word buffer holding consecutive replies.
#[derive(Debug)]
pub struct ReplyBuffer {
    data: Vec<Word>,
    capacity: usize,
    spans: Vec<Span>,
    /// Start of the reply being written.
    open: usize,
    allocations: usize,
}

impl ReplyBuffer {
    pub fn with_capacity(capacity: usize) -> Result<Self, OverlapError> {
        Ok(Self {
            data: alloc_words(capacity, "reply buffer")?,
            capacity,
            spans: Vec::new(),
            open: 0,
            allocations: 1,
        })
    }

    /// Words written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Append one word, reallocating first if the buffer is full.
    #[inline]
    pub fn push(&mut self, w: Word, opts: &OverlapOptions) -> Result<(), OverlapError> {
        if self.data.len() >= self.capacity {
            self.grow(opts)?;
        }
        self.data.push(w);
        Ok(())
    }

    #[inline]
    pub fn word(&self, at: usize) -> Word {
        self.data[at]
    }

    #[inline]
    pub fn set_word(&mut self, at: usize, w: Word) {
        self.data[at] = w;
    }

    /// Move everything written so far into a larger allocation.
    fn grow(&mut self, opts: &OverlapOptions) -> Result<(), OverlapError> {
        let new_cap = opts.grown_capacity(self.capacity);
        let mut next = alloc_words(new_cap, "reply buffer")?;
        next.extend_from_slice(&self.data);
        self.data = next;
        self.capacity = new_cap;
        self.allocations += 1;
        Ok(())
    }

    /// Close the reply started at the previous close; returns its index.
    pub fn finish_reply(&mut self) -> usize {
        let len = self.data.len() - self.open;
        self.spans.push(Span {
            offset: self.open,
            len,
        });
        self.open = self.data.len();
        self.spans.len() - 1
    }

    /// Number of finished replies.
    pub fn replies(&self) -> usize {
        self.spans.len()
    }

    /// Words of finished reply `k`.
    pub fn reply(&self, k: usize) -> &[Word] {
        &self.data[self.spans[k].range()]
    }

    pub fn stats(&self) -> ReplyStats {
        ReplyStats {
            capacity: self.capacity,
            required: self.data.len(),
            allocations: self.allocations,
        }
    }
}

/// Initial reply capacity: `factor · (max(total rows, pairs · nnz / local rows) + 1)`.
///
/// `requests` holds the parsed segments of every received request.
pub fn reply_estimate(
    mat: &DistAijMatrix,
    requests: &[(usize, Vec<Segment<'_>>)],
    opts: &OverlapOptions,
) -> usize {
    let pairs: usize = requests.iter().map(|(_, segs)| segs.len()).sum();
    let total: usize = requests
        .iter()
        .flat_map(|(_, segs)| segs.iter())
        .map(|seg| seg.rows.len())
        .sum();
    let per_row = match mat.local_rows() {
        0 => 0,
        m => pairs * mat.nonzeros() / m,
    };
    opts.reply_estimate_factor * (total.max(per_row) + 1)
}

/// Build one reply per request, in request order.
///
/// For each `(set, rows)` segment a fresh membership table is used: every
/// requested row not yet seen is echoed, then the neighbours of those rows are
/// appended. The reply repeats the request's set ids with the new counts.
pub fn build_replies(
    mat: &DistAijMatrix,
    requests: &[(usize, Vec<Word>)],
    opts: &OverlapOptions,
) -> Result<ReplyBuffer, OverlapError> {
    let parsed: Vec<(usize, Vec<Segment<'_>>)> = requests
        .iter()
        .map(|(src, words)| -> Result<_, OverlapError> {
            Ok((*src, parse_message(words, *src)?))
        })
        .collect::<Result<_, _>>()?;
    let mut out = ReplyBuffer::with_capacity(reply_estimate(mat, &parsed, opts))?;
    let mut marks = RowMarks::for_rows(mat.global_rows(), opts.dense_row_limit)?;
    let own = mat.ownership();

    for (src, segments) in &parsed {
        let src = *src;
        let start = out.len();
        out.push(segments.len() as Word, opts)?;
        for seg in segments.iter() {
            out.push(seg.set as Word, opts)?;
            out.push(0, opts)?;
        }

        for (j, seg) in segments.iter().enumerate() {
            marks.clear();
            let seg_start = out.len();
            for &w in seg.rows {
                let row = usize::try_from(w).ok().filter(|&r| own.try_owner_of(r) == Some(mat.rank()));
                let Some(row) = row else {
                    return Err(OverlapError::malformed(
                        src,
                        format!("requested row {w} is not owned by rank {}", mat.rank()),
                    ));
                };
                if marks.insert(row) {
                    out.push(row as Word, opts)?;
                }
            }
            let requested_end = out.len();
            for k in seg_start..requested_end {
                let row = out.word(k) as usize;
                expand_row_into(mat, row, &mut marks, |col| out.push(col as Word, opts))?;
            }
            out.set_word(start + 2 * j + 2, (out.len() - seg_start) as Word);
        }
        out.finish_reply();
    }

    let stats = out.stats();
    log::info!(
        "[{}] overlap replies: allocated {} words, required {} words, {} allocation(s)",
        mat.rank(),
        stats.capacity,
        stats.required,
        stats.allocations
    );
    Ok(out)
}
