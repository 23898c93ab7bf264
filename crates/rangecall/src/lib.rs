//! rangecall: marshalling engine between ragged spreadsheet ranges and a
//! dense-array analysis function library.
//!
//! A spreadsheet hands over named ranges whose cells may be missing (NaN).
//! The analysis library underneath wants densely packed, validity-trimmed
//! slices plus resolved optional parameters, and produces output arrays that
//! are shorter than the input and offset by a per-function lookback. This
//! crate owns everything in between:
//!
//! - trim each input column to its contiguous run of valid values,
//! - intersect the per-column valid ranges into one common range,
//! - resolve optional parameters (numeric, or labels matched against an
//!   enumerated value table) with default fallback,
//! - invoke the library kernel exactly once,
//! - re-inflate the outputs into a rectangular NaN-padded frame that lines
//!   up row-for-row with the original range.
//!
//! The function library itself is consumed through [`Registry`]: descriptor
//! metadata plus opaque kernels behind a trait object. A small builtin set
//! ships for demonstration; callers register their own the same way.

pub mod align;
pub mod builtins;
pub mod engine;
pub mod library;
pub mod pack;
pub mod range;
pub mod resolve;
mod scratch;
pub mod trim;
pub mod util;

pub use align::CommonRange;
pub use engine::Engine;
pub use library::{
    FuncHandle, FuncInfo, InputInfo, InputKind, Kernel, OptInputInfo, OptKind, OutputInfo,
    OutputKind, PriceFlags, Registry, RetCode, ValueTable,
};
pub use pack::OutputFrame;
pub use range::{ArgValue, CellOrder, Flatten, RangeData};
pub use resolve::ResolvedOpt;
pub use trim::ValidRange;

/// Crate version, for display surfaces.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error values surfaced by the marshalling layer.
///
/// Structural problems (arity, shape, length) and empty data abort the call
/// before the kernel runs; `Computation` carries the kernel's result code.
/// Unrecognized option labels are NOT an error: the resolver absorbs them
/// into the library's unset sentinel and the call proceeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No function with this name in the registry.
    UnknownFunction(String),
    /// Argument count does not match the declared parameter list.
    Arity { expected: usize, got: usize },
    /// A required input argument was not supplied.
    MissingInput(usize),
    /// Input columns must all have the original length of the first one.
    LengthMismatch { expected: usize, got: usize },
    /// A range argument flattened to zero cells.
    EmptyRange,
    /// Argument shape unusable for this parameter.
    BadShape(&'static str),
    /// No valid overlapping data across the inputs.
    EmptyData,
    /// The library kernel reported failure.
    Computation(library::RetCode),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownFunction(name) => write!(f, "unknown function: {name}"),
            Error::Arity { expected, got } => {
                write!(f, "wrong argument count: expected {expected}, got {got}")
            }
            Error::MissingInput(idx) => write!(f, "required input {idx} is missing"),
            Error::LengthMismatch { expected, got } => {
                write!(f, "input length mismatch: expected {expected}, got {got}")
            }
            Error::EmptyRange => f.write_str("input range is empty"),
            Error::BadShape(what) => write!(f, "bad argument shape: {what}"),
            Error::EmptyData => f.write_str("no valid overlapping data"),
            Error::Computation(code) => write!(f, "computation failed: {code}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
