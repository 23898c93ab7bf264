//! Column trimming: find the contiguous run of valid values in one ragged
//! column and copy it, origin-shifted, into a working buffer.

/// Inclusive span of sentinel-free values within one column, in the
/// original row index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidRange {
    pub begin: usize,
    pub end: usize,
}

impl ValidRange {
    /// Number of values in the span. Always at least 1; an all-sentinel
    /// column never produces a `ValidRange`.
    pub fn count(&self) -> usize {
        self.end - self.begin + 1
    }
}

/// Trim `src` into `dst` (cleared first), returning the valid span, or
/// `None` when the column holds no valid value at all.
///
/// Two-phase scan: leading NaNs are skipped, then values are copied until
/// the first trailing NaN or the end of the column. Anything after the
/// first trailing NaN is dropped, even if valid — the first gap is treated
/// as end-of-series.
pub fn trim_real(src: &[f64], dst: &mut Vec<f64>) -> Option<ValidRange> {
    dst.clear();
    let begin = src.iter().position(|v| !v.is_nan())?;
    let mut end = begin;
    dst.push(src[begin]);
    for (i, &v) in src.iter().enumerate().skip(begin + 1) {
        if v.is_nan() {
            break;
        }
        dst.push(v);
        end = i;
    }
    Some(ValidRange { begin, end })
}

/// Integer-series variant: same scan, casting each valid cell to `i32` the
/// way the caller's doubles arrive for integer inputs.
pub fn trim_integer(src: &[f64], dst: &mut Vec<i32>) -> Option<ValidRange> {
    dst.clear();
    let begin = src.iter().position(|v| !v.is_nan())?;
    let mut end = begin;
    dst.push(src[begin] as i32);
    for (i, &v) in src.iter().enumerate().skip(begin + 1) {
        if v.is_nan() {
            break;
        }
        dst.push(v as i32);
        end = i;
    }
    Some(ValidRange { begin, end })
}
