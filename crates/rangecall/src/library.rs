//! The downstream function-library contract.
//!
//! Mirrors the narrow interface the engine consumes: lookup-by-name to an
//! opaque handle, per-handle descriptor introspection, a parameter holder
//! with typed setters, and a single execute entry point returning a result
//! code plus the produced begin index and element count. Kernels live
//! behind a trait object; the [`Registry`] owns descriptors and kernels
//! together.

use std::collections::HashMap;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::resolve::ResolvedOpt;
use crate::{Error, Result};

/// Optional-parameter sentinel for an unrecognized label: distinct from the
/// declared default, so the kernel can decide whether it is fatal.
pub const UNSET_REAL: f64 = f64::MIN;
pub const UNSET_INTEGER: i32 = i32::MIN;

// ---------------------------------------------------------------------------
// Result codes
// ---------------------------------------------------------------------------

/// Failure codes a kernel or parameter holder can report. The engine maps
/// every one of them to a single caller-visible computation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetCode {
    BadParam,
    OutOfMemory,
    Internal,
}

impl std::fmt::Display for RetCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RetCode::BadParam => "bad parameter",
            RetCode::OutOfMemory => "out of memory",
            RetCode::Internal => "internal error",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

bitflags! {
    /// Fields of a composite price input. One declared library input with
    /// these flags consumes one caller column per set flag, in the order
    /// open, high, low, close, volume, open interest.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PriceFlags: u32 {
        const OPEN          = 1 << 0;
        const HIGH          = 1 << 1;
        const LOW           = 1 << 2;
        const CLOSE         = 1 << 3;
        const VOLUME        = 1 << 4;
        const OPEN_INTEREST = 1 << 5;
    }
}

/// Kind of one declared input parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// A series of doubles.
    RealSeries,
    /// A series of 32-bit integers (cast from the caller's doubles).
    IntegerSeries,
    /// A composite of price fields, one caller column per flag.
    Price(PriceFlags),
}

#[derive(Debug, Clone)]
pub struct InputInfo {
    pub name: &'static str,
    pub kind: InputKind,
}

/// Kind of one declared output parameter. Integer outputs are widened to
/// doubles when the engine packs the caller-facing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Real,
    Integer,
}

#[derive(Debug, Clone)]
pub struct OutputInfo {
    pub name: &'static str,
    pub kind: OutputKind,
}

/// Accepted values of an enumerated optional parameter: ordered
/// (numeric value, display label) pairs. Label matching is case-insensitive
/// and exact, first match in declared order wins.
#[derive(Debug, Clone)]
pub struct ValueTable<T: Copy> {
    pairs: Vec<(T, &'static str)>,
}

impl<T: Copy + std::fmt::Display> ValueTable<T> {
    pub fn new(pairs: Vec<(T, &'static str)>) -> Self {
        ValueTable { pairs }
    }

    /// Case-insensitive exact label lookup, declared order.
    pub fn lookup(&self, label: &str) -> Option<T> {
        self.pairs
            .iter()
            .find(|(_, s)| s.eq_ignore_ascii_case(label))
            .map(|(v, _)| *v)
    }

    pub fn pairs(&self) -> &[(T, &'static str)] {
        &self.pairs
    }

    /// Render the pairs for help text: "0=Simple, 1=Exponential, 2=Weighted".
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (i, (v, s)) in self.pairs.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!("{v}={s}"));
        }
        out
    }
}

/// Kind, bounds, and default of one declared optional parameter.
#[derive(Debug, Clone)]
pub enum OptKind {
    RealRange { min: f64, max: f64, default: f64 },
    IntegerRange { min: i32, max: i32, default: i32 },
    RealList { table: ValueTable<f64>, default: f64 },
    IntegerList { table: ValueTable<i32>, default: i32 },
}

impl OptKind {
    /// The declared default as a resolved value.
    pub fn default_value(&self) -> ResolvedOpt {
        match self {
            OptKind::RealRange { default, .. } | OptKind::RealList { default, .. } => {
                ResolvedOpt::Real(*default)
            }
            OptKind::IntegerRange { default, .. } | OptKind::IntegerList { default, .. } => {
                ResolvedOpt::Integer(*default)
            }
        }
    }

    /// Render bounds/pairs and the default for help text.
    pub fn describe(&self) -> String {
        match self {
            OptKind::RealRange { min, max, default } => {
                format!("real in [{min}, {max}], default {default}")
            }
            OptKind::IntegerRange { min, max, default } => {
                format!("integer in [{min}, {max}], default {default}")
            }
            OptKind::RealList { table, default } => {
                format!("{}; default {default}", table.describe())
            }
            OptKind::IntegerList { table, default } => {
                format!("{}; default {default}", table.describe())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptInputInfo {
    pub name: &'static str,
    pub hint: &'static str,
    pub kind: OptKind,
}

/// Full descriptor of one library function: ordered inputs, optional
/// inputs, and outputs.
#[derive(Debug, Clone)]
pub struct FuncInfo {
    pub name: &'static str,
    pub group: &'static str,
    pub hint: &'static str,
    pub inputs: Vec<InputInfo>,
    pub opt_inputs: Vec<OptInputInfo>,
    pub outputs: Vec<OutputInfo>,
}

impl FuncInfo {
    /// Caller columns the declared inputs consume: one per plain series,
    /// one per set flag of a price composite.
    pub fn caller_input_columns(&self) -> usize {
        self.inputs
            .iter()
            .map(|i| match i.kind {
                InputKind::RealSeries | InputKind::IntegerSeries => 1,
                InputKind::Price(flags) => flags.bits().count_ones() as usize,
            })
            .sum()
    }

    /// Full caller arity: input columns plus declared optionals.
    pub fn caller_arity(&self) -> usize {
        self.caller_input_columns() + self.opt_inputs.len()
    }
}

// ---------------------------------------------------------------------------
// Call-time views
// ---------------------------------------------------------------------------

/// Price field slices for one composite input. Only the flagged fields are
/// populated.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriceSeries<'a> {
    pub open: Option<&'a [f64]>,
    pub high: Option<&'a [f64]>,
    pub low: Option<&'a [f64]>,
    pub close: Option<&'a [f64]>,
    pub volume: Option<&'a [f64]>,
    pub open_interest: Option<&'a [f64]>,
}

impl<'a> PriceSeries<'a> {
    pub fn high(&self) -> std::result::Result<&'a [f64], RetCode> {
        self.high.ok_or(RetCode::BadParam)
    }

    pub fn low(&self) -> std::result::Result<&'a [f64], RetCode> {
        self.low.ok_or(RetCode::BadParam)
    }

    pub fn close(&self) -> std::result::Result<&'a [f64], RetCode> {
        self.close.ok_or(RetCode::BadParam)
    }

    pub fn volume(&self) -> std::result::Result<&'a [f64], RetCode> {
        self.volume.ok_or(RetCode::BadParam)
    }
}

/// One input as the kernel sees it: dense, trimmed, common-range-adjusted.
#[derive(Debug, Clone, Copy)]
pub enum InputSeries<'a> {
    Real(&'a [f64]),
    Integer(&'a [i32]),
    Price(PriceSeries<'a>),
}

impl<'a> InputSeries<'a> {
    pub fn as_real(&self) -> std::result::Result<&'a [f64], RetCode> {
        match self {
            InputSeries::Real(s) => Ok(*s),
            _ => Err(RetCode::BadParam),
        }
    }

    pub fn as_integer(&self) -> std::result::Result<&'a [i32], RetCode> {
        match self {
            InputSeries::Integer(s) => Ok(*s),
            _ => Err(RetCode::BadParam),
        }
    }

    pub fn as_price(&self) -> std::result::Result<PriceSeries<'a>, RetCode> {
        match self {
            InputSeries::Price(p) => Ok(*p),
            _ => Err(RetCode::BadParam),
        }
    }
}

/// One output buffer as the kernel fills it.
#[derive(Debug)]
pub enum OutputSeries<'a> {
    Real(&'a mut [f64]),
    Integer(&'a mut [i32]),
}

impl<'a> OutputSeries<'a> {
    pub fn as_real_mut(&mut self) -> std::result::Result<&mut [f64], RetCode> {
        match self {
            OutputSeries::Real(s) => Ok(s),
            _ => Err(RetCode::BadParam),
        }
    }

    pub fn as_integer_mut(&mut self) -> std::result::Result<&mut [i32], RetCode> {
        match self {
            OutputSeries::Integer(s) => Ok(s),
            _ => Err(RetCode::BadParam),
        }
    }
}

/// What the execute entry point actually produced: `out_beg` leading rows
/// discarded by the kernel beyond the caller's trimming (its lookback), and
/// the number of elements written to every output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOutcome {
    pub out_beg: usize,
    pub nb_element: usize,
}

/// The computation behind one registered function.
///
/// `eval` runs exactly once per call over `inputs[..][beg ..= end]` with all
/// slices already trimmed and offset to the common valid range; `beg` is 0
/// in practice. Kernels write at most `end - beg + 1` elements per output
/// and report how many they produced and at what lookback offset.
pub trait Kernel: Send + Sync {
    fn eval(
        &self,
        inputs: &[InputSeries<'_>],
        opts: &[ResolvedOpt],
        outputs: &mut [OutputSeries<'_>],
        beg: usize,
        end: usize,
    ) -> std::result::Result<CallOutcome, RetCode>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Opaque handle to one registered function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncHandle(usize);

pub(crate) struct FuncDef {
    pub(crate) info: FuncInfo,
    pub(crate) kernel: Box<dyn Kernel>,
}

/// Descriptor and kernel store; the engine's view of the analysis library.
/// Lookup is case-insensitive.
pub struct Registry {
    funcs: Vec<FuncDef>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Registry {
            funcs: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// A registry pre-populated with the builtin demonstration set.
    pub fn with_builtins() -> Self {
        let mut reg = Registry::new();
        crate::builtins::install(&mut reg);
        reg
    }

    /// Register a function. Names are case-insensitive; re-registering a
    /// name replaces the previous binding, and existing handles follow it.
    pub fn register(&mut self, info: FuncInfo, kernel: Box<dyn Kernel>) -> FuncHandle {
        let key = info.name.to_ascii_uppercase();
        match self.by_name.get(&key) {
            Some(&idx) => {
                self.funcs[idx] = FuncDef { info, kernel };
                FuncHandle(idx)
            }
            None => {
                let idx = self.funcs.len();
                self.funcs.push(FuncDef { info, kernel });
                self.by_name.insert(key, idx);
                FuncHandle(idx)
            }
        }
    }

    /// Lookup by name, case-insensitive.
    pub fn handle(&self, name: &str) -> Result<FuncHandle> {
        self.by_name
            .get(&name.to_ascii_uppercase())
            .map(|&idx| FuncHandle(idx))
            .ok_or_else(|| Error::UnknownFunction(name.to_string()))
    }

    /// Descriptor introspection for a handle.
    pub fn info(&self, handle: FuncHandle) -> &FuncInfo {
        &self.funcs[handle.0].info
    }

    /// All registered descriptors, registration order.
    pub fn iter(&self) -> impl Iterator<Item = &FuncInfo> {
        self.funcs.iter().map(|def| &def.info)
    }

    /// Allocate a parameter holder for one call. Optionals start at their
    /// declared defaults; inputs and outputs must be set before `call`.
    pub fn param_holder<'data>(&self, handle: FuncHandle) -> ParamHolder<'_, 'data> {
        let def = &self.funcs[handle.0];
        let opts = def
            .info
            .opt_inputs
            .iter()
            .map(|o| o.kind.default_value())
            .collect();
        ParamHolder {
            def,
            inputs: def.info.inputs.iter().map(|_| None).collect(),
            opts,
            outputs: def.info.outputs.iter().map(|_| None).collect(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

// ---------------------------------------------------------------------------
// Parameter holder
// ---------------------------------------------------------------------------

/// Per-call parameter accumulator: typed setters by index, then one
/// `call(beg, end)`. Consumed by the call, so every borrow it holds ends
/// when the kernel returns.
pub struct ParamHolder<'lib, 'data> {
    def: &'lib FuncDef,
    inputs: SmallVec<[Option<InputSeries<'data>>; 4]>,
    opts: SmallVec<[ResolvedOpt; 4]>,
    outputs: SmallVec<[Option<OutputSeries<'data>>; 4]>,
}

impl<'lib, 'data> ParamHolder<'lib, 'data> {
    fn input_kind(&self, idx: usize) -> std::result::Result<InputKind, RetCode> {
        self.def
            .info
            .inputs
            .get(idx)
            .map(|i| i.kind)
            .ok_or(RetCode::BadParam)
    }

    pub fn set_input_real(
        &mut self,
        idx: usize,
        series: &'data [f64],
    ) -> std::result::Result<(), RetCode> {
        match self.input_kind(idx)? {
            InputKind::RealSeries => {
                self.inputs[idx] = Some(InputSeries::Real(series));
                Ok(())
            }
            _ => Err(RetCode::BadParam),
        }
    }

    pub fn set_input_integer(
        &mut self,
        idx: usize,
        series: &'data [i32],
    ) -> std::result::Result<(), RetCode> {
        match self.input_kind(idx)? {
            InputKind::IntegerSeries => {
                self.inputs[idx] = Some(InputSeries::Integer(series));
                Ok(())
            }
            _ => Err(RetCode::BadParam),
        }
    }

    /// Set a composite price input. Every flagged field must be populated.
    pub fn set_input_price(
        &mut self,
        idx: usize,
        price: PriceSeries<'data>,
    ) -> std::result::Result<(), RetCode> {
        let flags = match self.input_kind(idx)? {
            InputKind::Price(flags) => flags,
            _ => return Err(RetCode::BadParam),
        };
        let complete = (!flags.contains(PriceFlags::OPEN) || price.open.is_some())
            && (!flags.contains(PriceFlags::HIGH) || price.high.is_some())
            && (!flags.contains(PriceFlags::LOW) || price.low.is_some())
            && (!flags.contains(PriceFlags::CLOSE) || price.close.is_some())
            && (!flags.contains(PriceFlags::VOLUME) || price.volume.is_some())
            && (!flags.contains(PriceFlags::OPEN_INTEREST) || price.open_interest.is_some());
        if !complete {
            return Err(RetCode::BadParam);
        }
        self.inputs[idx] = Some(InputSeries::Price(price));
        Ok(())
    }

    pub fn set_opt_real(&mut self, idx: usize, value: f64) -> std::result::Result<(), RetCode> {
        match self.def.info.opt_inputs.get(idx).map(|o| &o.kind) {
            Some(OptKind::RealRange { .. }) | Some(OptKind::RealList { .. }) => {
                self.opts[idx] = ResolvedOpt::Real(value);
                Ok(())
            }
            _ => Err(RetCode::BadParam),
        }
    }

    pub fn set_opt_integer(&mut self, idx: usize, value: i32) -> std::result::Result<(), RetCode> {
        match self.def.info.opt_inputs.get(idx).map(|o| &o.kind) {
            Some(OptKind::IntegerRange { .. }) | Some(OptKind::IntegerList { .. }) => {
                self.opts[idx] = ResolvedOpt::Integer(value);
                Ok(())
            }
            _ => Err(RetCode::BadParam),
        }
    }

    pub fn set_output_real(
        &mut self,
        idx: usize,
        buf: &'data mut [f64],
    ) -> std::result::Result<(), RetCode> {
        match self.def.info.outputs.get(idx).map(|o| o.kind) {
            Some(OutputKind::Real) => {
                self.outputs[idx] = Some(OutputSeries::Real(buf));
                Ok(())
            }
            _ => Err(RetCode::BadParam),
        }
    }

    pub fn set_output_integer(
        &mut self,
        idx: usize,
        buf: &'data mut [i32],
    ) -> std::result::Result<(), RetCode> {
        match self.def.info.outputs.get(idx).map(|o| o.kind) {
            Some(OutputKind::Integer) => {
                self.outputs[idx] = Some(OutputSeries::Integer(buf));
                Ok(())
            }
            _ => Err(RetCode::BadParam),
        }
    }

    /// Execute the kernel once over `beg ..= end` of the supplied slices.
    /// Fails with `BadParam` if any input or output was left unset.
    pub fn call(
        mut self,
        beg: usize,
        end: usize,
    ) -> std::result::Result<CallOutcome, RetCode> {
        let mut inputs: SmallVec<[InputSeries<'data>; 4]> = SmallVec::new();
        for slot in self.inputs.drain(..) {
            inputs.push(slot.ok_or(RetCode::BadParam)?);
        }
        let mut outputs: SmallVec<[OutputSeries<'data>; 4]> = SmallVec::new();
        for slot in self.outputs.drain(..) {
            outputs.push(slot.ok_or(RetCode::BadParam)?);
        }
        self.def.kernel.eval(&inputs, &self.opts, &mut outputs, beg, end)
    }
}
