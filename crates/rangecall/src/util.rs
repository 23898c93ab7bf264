//! Small range utilities that sit next to the dispatcher on the caller
//! surface.

use crate::range::{Flatten, RangeData};
use crate::Result;

/// Sum of the last `n` cells of the flattened range, `n` clamped to the
/// range length. NaN cells propagate into the sum, matching plain cell
/// arithmetic rather than the dispatcher's trimming rules.
pub fn sum_last(range: &RangeData, n: usize, policy: Flatten) -> Result<f64> {
    let mut flat = Vec::new();
    range.flatten_into(policy, &mut flat)?;
    let n = n.min(flat.len());
    Ok(flat[flat.len() - n..].iter().sum())
}
