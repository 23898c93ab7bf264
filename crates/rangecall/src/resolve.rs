//! Optional-parameter resolution.
//!
//! Callers may supply an optional parameter as a number, as the encoded
//! numeric value spelled in digits, or as the display label of an
//! enumerated entry. Resolution never fails: worst case is the library's
//! unset sentinel, which the kernel may then reject.

use crate::library::{OptInputInfo, OptKind, UNSET_INTEGER, UNSET_REAL};
use crate::range::ArgValue;

/// A resolved optional parameter, ready for the holder's typed setters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolvedOpt {
    Real(f64),
    Integer(i32),
}

impl ResolvedOpt {
    /// The value as a double, widening integers.
    pub fn as_real(&self) -> f64 {
        match self {
            ResolvedOpt::Real(v) => *v,
            ResolvedOpt::Integer(v) => *v as f64,
        }
    }

    /// The value as an i32, truncating reals.
    pub fn as_integer(&self) -> i32 {
        match self {
            ResolvedOpt::Real(v) => *v as i32,
            ResolvedOpt::Integer(v) => *v,
        }
    }
}

/// Digit-only classification: every character must be an ASCII digit.
/// Deliberately not a numeric-literal parser — no sign, decimal point, or
/// exponent. A label that happens to be all digits is therefore always
/// treated as the encoded numeric value, never matched against the table.
fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Resolve one optional parameter against its spec.
///
/// - absent (or explicitly missing) → declared default;
/// - numeric on a range kind → passed through unchanged (bound checking is
///   the kernel's business, not this layer's);
/// - list kinds: digit-only text parses as the numeric value directly;
///   other text is matched case-insensitively against the table's labels in
///   declared order, and an unrecognized label resolves to the unset
///   sentinel — distinct from "not supplied".
pub fn resolve(spec: &OptInputInfo, supplied: Option<&ArgValue>) -> ResolvedOpt {
    let arg = match supplied {
        None | Some(ArgValue::Missing) => return spec.kind.default_value(),
        Some(arg) => arg,
    };
    match &spec.kind {
        OptKind::RealRange { default, .. } => match arg {
            ArgValue::Number(v) => ResolvedOpt::Real(*v),
            ArgValue::Text(s) => {
                ResolvedOpt::Real(s.trim().parse::<f64>().unwrap_or(*default))
            }
            _ => ResolvedOpt::Real(*default),
        },
        OptKind::IntegerRange { default, .. } => match arg {
            ArgValue::Number(v) => ResolvedOpt::Integer(*v as i32),
            ArgValue::Text(s) => ResolvedOpt::Integer(
                s.trim().parse::<f64>().map(|v| v as i32).unwrap_or(*default),
            ),
            _ => ResolvedOpt::Integer(*default),
        },
        OptKind::RealList { table, default } => match arg {
            ArgValue::Number(v) => ResolvedOpt::Real(*v),
            ArgValue::Text(s) => {
                if all_digits(s) {
                    ResolvedOpt::Real(s.parse::<f64>().unwrap_or(UNSET_REAL))
                } else {
                    ResolvedOpt::Real(table.lookup(s).unwrap_or(UNSET_REAL))
                }
            }
            _ => ResolvedOpt::Real(*default),
        },
        OptKind::IntegerList { table, default } => match arg {
            ArgValue::Number(v) => ResolvedOpt::Integer(*v as i32),
            ArgValue::Text(s) => {
                if all_digits(s) {
                    ResolvedOpt::Integer(s.parse::<i32>().unwrap_or(UNSET_INTEGER))
                } else {
                    ResolvedOpt::Integer(table.lookup(s).unwrap_or(UNSET_INTEGER))
                }
            }
            _ => ResolvedOpt::Integer(*default),
        },
    }
}
