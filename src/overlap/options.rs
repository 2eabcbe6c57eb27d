//! Tunables for [`increase_overlap_with`](super::increase::increase_overlap_with).

use crate::algs::communicator::{CommTag, OverlapTags, MAX_TAG};
use crate::overlap_error::OverlapError;

/// Smallest accepted reply-buffer growth factor.
pub const MIN_GROWTH_FACTOR: f64 = 1.5;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OverlapOptions {
    /// Tags for the request and response phases.
    pub tags: OverlapTags,
    /// Global row count up to which membership uses a dense bitset.
    pub dense_row_limit: usize,
    /// Reply-buffer growth factor on overflow (at least 1.5).
    pub growth_factor: f64,
    /// Multiplier of the initial reply-buffer estimate.
    pub reply_estimate_factor: usize,
    /// Sort every returned index set ascending.
    pub sort_indices: bool,
}

impl Default for OverlapOptions {
    fn default() -> Self {
        Self {
            tags: OverlapTags::from_base(CommTag::new(0x0A10)),
            dense_row_limit: 1 << 24,
            growth_factor: MIN_GROWTH_FACTOR,
            reply_estimate_factor: 3,
            sort_indices: false,
        }
    }
}

impl OverlapOptions {
    pub fn with_tags(mut self, tags: OverlapTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_dense_row_limit(mut self, limit: usize) -> Self {
        self.dense_row_limit = limit;
        self
    }

    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    pub fn with_reply_estimate_factor(mut self, factor: usize) -> Self {
        self.reply_estimate_factor = factor;
        self
    }

    pub fn with_sorted_indices(mut self, sort: bool) -> Self {
        self.sort_indices = sort;
        self
    }

    pub fn validate(&self) -> Result<(), OverlapError> {
        if !self.growth_factor.is_finite() || self.growth_factor < MIN_GROWTH_FACTOR {
            return Err(OverlapError::InvalidOption(format!(
                "growth factor {} must be a finite value ≥ {MIN_GROWTH_FACTOR}",
                self.growth_factor
            )));
        }
        if self.reply_estimate_factor == 0 {
            return Err(OverlapError::InvalidOption(
                "reply estimate factor must be positive".into(),
            ));
        }
        if self.tags.request == self.tags.response {
            return Err(OverlapError::InvalidOption(format!(
                "request and response phases share tag {:#x}",
                self.tags.request.as_u16()
            )));
        }
        for tag in [self.tags.request, self.tags.response] {
            if !tag.is_portable() {
                return Err(OverlapError::InvalidOption(format!(
                    "tag {:#x} exceeds the portable maximum {MAX_TAG:#x}",
                    tag.as_u16()
                )));
            }
        }
        Ok(())
    }

    /// Capacity after one growth step from `cap`: `ceil(cap · factor)`, at least `cap + 1`.
    pub fn grown_capacity(&self, cap: usize) -> usize {
        let grown = (cap as f64 * self.growth_factor).ceil() as usize;
        grown.max(cap + 1)
    }
}
