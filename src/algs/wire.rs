//! Word encoding for overlap messages on the transport.
//!
//! Messages are flat arrays of [`Word`]s. On the wire every word is a
//! little-endian `u64`; we store them pre-LE with `.to_le()` and decode with
//! `.from_le()`.

use crate::overlap_error::OverlapError;
use bytemuck::{Pod, Zeroable};
use bytes::Bytes;
use static_assertions::const_assert_eq;
use std::mem::size_of;

/// One message word: a header entry, a set id, a count, or a global row.
pub type Word = u64;

/// Bytes per word on the wire.
pub const WORD_BYTES: usize = size_of::<Word>();

#[repr(transparent)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct WireWord {
    le: u64,
}

const_assert_eq!(size_of::<WireWord>(), WORD_BYTES);

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Encode words into an owned byte buffer ready for `isend`.
pub fn encode_words(words: &[Word]) -> Result<Bytes, OverlapError> {
    let mut wire: Vec<WireWord> = Vec::new();
    wire.try_reserve_exact(words.len())
        .map_err(|_| OverlapError::Allocation {
            what: "encoded message",
            words: words.len(),
        })?;
    wire.extend(words.iter().map(|&w| WireWord { le: w.to_le() }));
    let mut raw = Vec::new();
    raw.try_reserve_exact(words.len() * WORD_BYTES)
        .map_err(|_| OverlapError::Allocation {
            what: "encoded message",
            words: words.len(),
        })?;
    raw.extend_from_slice(cast_slice(&wire));
    Ok(Bytes::from(raw))
}

/// Decode a received byte buffer back into words.
///
/// `source` is only used to attribute a malformed payload.
pub fn decode_words(raw: &[u8], source: usize) -> Result<Vec<Word>, OverlapError> {
    if raw.len() % WORD_BYTES != 0 {
        return Err(OverlapError::malformed(
            source,
            format!("payload of {} bytes is not a whole number of words", raw.len()),
        ));
    }
    let n = raw.len() / WORD_BYTES;
    let mut wire: Vec<WireWord> = Vec::new();
    wire.try_reserve_exact(n)
        .map_err(|_| OverlapError::Allocation {
            what: "decoded message",
            words: n,
        })?;
    wire.resize(n, WireWord::zeroed());
    cast_slice_mut(&mut wire).copy_from_slice(raw);
    Ok(wire.into_iter().map(|w| u64::from_le(w.le)).collect())
}

/// Convert a word to a `usize` index, rejecting values that do not fit.
pub fn word_to_index(w: Word, source: usize) -> Result<usize, OverlapError> {
    usize::try_from(w)
        .map_err(|_| OverlapError::malformed(source, format!("word {w} does not fit in usize")))
}
