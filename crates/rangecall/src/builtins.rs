//! Builtin demonstration kernels.
//!
//! A small representative slice of an analysis library: enough to exercise
//! every descriptor kind (plain and composite inputs, enumerated optionals,
//! integer outputs), multi-output packing, and nonzero lookbacks. These are
//! collaborators of the marshalling engine, not part of it.

use crate::library::{
    CallOutcome, FuncInfo, InputInfo, InputKind, InputSeries, Kernel, OptInputInfo, OptKind,
    OutputInfo, OutputKind, OutputSeries, PriceFlags, Registry, RetCode, ValueTable,
};
use crate::resolve::ResolvedOpt;

type KernelResult = std::result::Result<CallOutcome, RetCode>;

/// Register the builtin set into `reg`. [`Registry::with_builtins`] is the
/// usual entry point; this is for composing builtins with custom functions.
pub fn install(reg: &mut Registry) {
    reg.register(sma_info(), Box::new(Sma));
    reg.register(ema_info(), Box::new(Ema));
    reg.register(wma_info(), Box::new(Wma));
    reg.register(ma_info(), Box::new(Ma));
    reg.register(midprice_info(), Box::new(MidPrice));
    reg.register(macd_info(), Box::new(Macd));
    reg.register(roc_info(), Box::new(Roc));
    reg.register(minmax_info(), Box::new(MinMax));
    reg.register(maxindex_info(), Box::new(MaxIndex));
    reg.register(obv_info(), Box::new(Obv));
}

// ---------------------------------------------------------------------------
// Descriptor helpers
// ---------------------------------------------------------------------------

fn real_input(name: &'static str) -> InputInfo {
    InputInfo {
        name,
        kind: InputKind::RealSeries,
    }
}

fn real_output(name: &'static str) -> OutputInfo {
    OutputInfo {
        name,
        kind: OutputKind::Real,
    }
}

fn period_opt(default: i32, min: i32) -> OptInputInfo {
    OptInputInfo {
        name: "period",
        hint: "Number of rows in the trailing window",
        kind: OptKind::IntegerRange {
            min,
            max: 100_000,
            default,
        },
    }
}

/// Fetch and sanity-check an integer period option.
fn period(opts: &[ResolvedOpt], idx: usize, min: i32) -> std::result::Result<usize, RetCode> {
    let p = opts.get(idx).ok_or(RetCode::BadParam)?.as_integer();
    if p < min {
        return Err(RetCode::BadParam);
    }
    Ok(p as usize)
}

// ---------------------------------------------------------------------------
// Moving-average cores, shared between the dedicated kernels and `ma`
// ---------------------------------------------------------------------------

/// Simple moving average of `src` into `out[0 .. n-p+1]`.
fn sma_core(src: &[f64], p: usize, out: &mut [f64]) -> usize {
    let n = src.len();
    if n < p {
        return 0;
    }
    let mut sum: f64 = src[..p].iter().sum();
    out[0] = sum / p as f64;
    for i in p..n {
        sum += src[i] - src[i - p];
        out[i - p + 1] = sum / p as f64;
    }
    n - p + 1
}

/// Exponential moving average, SMA-seeded, smoothing 2/(p+1).
fn ema_core(src: &[f64], p: usize, out: &mut [f64]) -> usize {
    let n = src.len();
    if n < p {
        return 0;
    }
    let k = 2.0 / (p as f64 + 1.0);
    let mut prev: f64 = src[..p].iter().sum::<f64>() / p as f64;
    out[0] = prev;
    for i in p..n {
        prev = (src[i] - prev) * k + prev;
        out[i - p + 1] = prev;
    }
    n - p + 1
}

/// Linearly weighted moving average, newest value carrying weight `p`.
fn wma_core(src: &[f64], p: usize, out: &mut [f64]) -> usize {
    let n = src.len();
    if n < p {
        return 0;
    }
    let denom = (p * (p + 1) / 2) as f64;
    let mut sum: f64 = src[..p].iter().sum();
    let mut wsum: f64 = src[..p]
        .iter()
        .enumerate()
        .map(|(j, v)| (j + 1) as f64 * v)
        .sum();
    out[0] = wsum / denom;
    for i in p..n {
        wsum += p as f64 * src[i] - sum;
        sum += src[i] - src[i - p];
        out[i - p + 1] = wsum / denom;
    }
    n - p + 1
}

// ---------------------------------------------------------------------------
// sma / ema / wma
// ---------------------------------------------------------------------------

fn sma_info() -> FuncInfo {
    FuncInfo {
        name: "sma",
        group: "Overlap Studies",
        hint: "Simple moving average",
        inputs: vec![real_input("series")],
        opt_inputs: vec![period_opt(30, 2)],
        outputs: vec![real_output("sma")],
    }
}

struct Sma;

impl Kernel for Sma {
    fn eval(
        &self,
        inputs: &[InputSeries<'_>],
        opts: &[ResolvedOpt],
        outputs: &mut [OutputSeries<'_>],
        beg: usize,
        end: usize,
    ) -> KernelResult {
        let src = &inputs[0].as_real()?[beg..=end];
        let p = period(opts, 0, 2)?;
        let out = outputs[0].as_real_mut()?;
        let nb = sma_core(src, p, out);
        Ok(CallOutcome {
            out_beg: if nb == 0 { 0 } else { p - 1 },
            nb_element: nb,
        })
    }
}

fn ema_info() -> FuncInfo {
    FuncInfo {
        name: "ema",
        group: "Overlap Studies",
        hint: "Exponential moving average",
        inputs: vec![real_input("series")],
        opt_inputs: vec![period_opt(30, 2)],
        outputs: vec![real_output("ema")],
    }
}

struct Ema;

impl Kernel for Ema {
    fn eval(
        &self,
        inputs: &[InputSeries<'_>],
        opts: &[ResolvedOpt],
        outputs: &mut [OutputSeries<'_>],
        beg: usize,
        end: usize,
    ) -> KernelResult {
        let src = &inputs[0].as_real()?[beg..=end];
        let p = period(opts, 0, 2)?;
        let out = outputs[0].as_real_mut()?;
        let nb = ema_core(src, p, out);
        Ok(CallOutcome {
            out_beg: if nb == 0 { 0 } else { p - 1 },
            nb_element: nb,
        })
    }
}

fn wma_info() -> FuncInfo {
    FuncInfo {
        name: "wma",
        group: "Overlap Studies",
        hint: "Weighted moving average",
        inputs: vec![real_input("series")],
        opt_inputs: vec![period_opt(30, 2)],
        outputs: vec![real_output("wma")],
    }
}

struct Wma;

impl Kernel for Wma {
    fn eval(
        &self,
        inputs: &[InputSeries<'_>],
        opts: &[ResolvedOpt],
        outputs: &mut [OutputSeries<'_>],
        beg: usize,
        end: usize,
    ) -> KernelResult {
        let src = &inputs[0].as_real()?[beg..=end];
        let p = period(opts, 0, 2)?;
        let out = outputs[0].as_real_mut()?;
        let nb = wma_core(src, p, out);
        Ok(CallOutcome {
            out_beg: if nb == 0 { 0 } else { p - 1 },
            nb_element: nb,
        })
    }
}

// ---------------------------------------------------------------------------
// ma — moving average with an enumerated type selector
// ---------------------------------------------------------------------------

const MA_SIMPLE: i32 = 0;
const MA_EXPONENTIAL: i32 = 1;
const MA_WEIGHTED: i32 = 2;

fn ma_info() -> FuncInfo {
    FuncInfo {
        name: "ma",
        group: "Overlap Studies",
        hint: "Moving average with selectable type",
        inputs: vec![real_input("series")],
        opt_inputs: vec![
            period_opt(30, 2),
            OptInputInfo {
                name: "matype",
                hint: "Averaging method",
                kind: OptKind::IntegerList {
                    table: ValueTable::new(vec![
                        (MA_SIMPLE, "Simple"),
                        (MA_EXPONENTIAL, "Exponential"),
                        (MA_WEIGHTED, "Weighted"),
                    ]),
                    default: MA_SIMPLE,
                },
            },
        ],
        outputs: vec![real_output("ma")],
    }
}

struct Ma;

impl Kernel for Ma {
    fn eval(
        &self,
        inputs: &[InputSeries<'_>],
        opts: &[ResolvedOpt],
        outputs: &mut [OutputSeries<'_>],
        beg: usize,
        end: usize,
    ) -> KernelResult {
        let src = &inputs[0].as_real()?[beg..=end];
        let p = period(opts, 0, 2)?;
        let matype = opts.get(1).ok_or(RetCode::BadParam)?.as_integer();
        let out = outputs[0].as_real_mut()?;
        // An unrecognized label arrives as the unset sentinel and is
        // rejected here, not silently defaulted.
        let nb = match matype {
            MA_SIMPLE => sma_core(src, p, out),
            MA_EXPONENTIAL => ema_core(src, p, out),
            MA_WEIGHTED => wma_core(src, p, out),
            _ => return Err(RetCode::BadParam),
        };
        Ok(CallOutcome {
            out_beg: if nb == 0 { 0 } else { p - 1 },
            nb_element: nb,
        })
    }
}

// ---------------------------------------------------------------------------
// macd
// ---------------------------------------------------------------------------

fn macd_info() -> FuncInfo {
    FuncInfo {
        name: "macd",
        group: "Momentum Indicators",
        hint: "Moving average convergence/divergence",
        inputs: vec![real_input("series")],
        opt_inputs: vec![
            OptInputInfo {
                name: "fast",
                hint: "Fast EMA period",
                kind: OptKind::IntegerRange {
                    min: 2,
                    max: 100_000,
                    default: 12,
                },
            },
            OptInputInfo {
                name: "slow",
                hint: "Slow EMA period",
                kind: OptKind::IntegerRange {
                    min: 2,
                    max: 100_000,
                    default: 26,
                },
            },
            OptInputInfo {
                name: "signal",
                hint: "Signal line EMA period",
                kind: OptKind::IntegerRange {
                    min: 1,
                    max: 100_000,
                    default: 9,
                },
            },
        ],
        outputs: vec![
            real_output("macd"),
            real_output("signal"),
            real_output("hist"),
        ],
    }
}

struct Macd;

impl Kernel for Macd {
    fn eval(
        &self,
        inputs: &[InputSeries<'_>],
        opts: &[ResolvedOpt],
        outputs: &mut [OutputSeries<'_>],
        beg: usize,
        end: usize,
    ) -> KernelResult {
        let src = &inputs[0].as_real()?[beg..=end];
        let mut fast = period(opts, 0, 2)?;
        let mut slow = period(opts, 1, 2)?;
        let signal = period(opts, 2, 1)?;
        if fast > slow {
            std::mem::swap(&mut fast, &mut slow);
        }
        let n = src.len();
        let lookback = (slow - 1) + (signal - 1);
        if n <= lookback {
            return Ok(CallOutcome {
                out_beg: 0,
                nb_element: 0,
            });
        }

        // MACD line over the range where the slow EMA exists.
        let mut fast_line = vec![0.0; n - fast + 1];
        let mut slow_line = vec![0.0; n - slow + 1];
        ema_core(src, fast, &mut fast_line);
        ema_core(src, slow, &mut slow_line);
        let macd_line: Vec<f64> = slow_line
            .iter()
            .enumerate()
            .map(|(i, s)| fast_line[i + slow - fast] - s)
            .collect();

        // Signal EMA over the MACD line, then trim both to where it exists.
        let mut signal_line = vec![0.0; macd_line.len() - signal + 1];
        let nb = ema_core(&macd_line, signal, &mut signal_line);

        let (macd_out, rest) = outputs.split_at_mut(1);
        let (signal_out, hist_out) = rest.split_at_mut(1);
        let macd_out = macd_out[0].as_real_mut()?;
        let signal_out = signal_out[0].as_real_mut()?;
        let hist_out = hist_out[0].as_real_mut()?;
        for i in 0..nb {
            let m = macd_line[i + signal - 1];
            macd_out[i] = m;
            signal_out[i] = signal_line[i];
            hist_out[i] = m - signal_line[i];
        }
        Ok(CallOutcome {
            out_beg: lookback,
            nb_element: nb,
        })
    }
}

// ---------------------------------------------------------------------------
// minmax / maxindex
// ---------------------------------------------------------------------------

fn minmax_info() -> FuncInfo {
    FuncInfo {
        name: "minmax",
        group: "Math Operators",
        hint: "Lowest and highest value over the trailing window",
        inputs: vec![real_input("series")],
        opt_inputs: vec![period_opt(30, 2)],
        outputs: vec![real_output("min"), real_output("max")],
    }
}

struct MinMax;

impl Kernel for MinMax {
    fn eval(
        &self,
        inputs: &[InputSeries<'_>],
        opts: &[ResolvedOpt],
        outputs: &mut [OutputSeries<'_>],
        beg: usize,
        end: usize,
    ) -> KernelResult {
        let src = &inputs[0].as_real()?[beg..=end];
        let p = period(opts, 0, 2)?;
        let n = src.len();
        if n < p {
            return Ok(CallOutcome {
                out_beg: 0,
                nb_element: 0,
            });
        }
        let (min_out, max_out) = outputs.split_at_mut(1);
        let min_out = min_out[0].as_real_mut()?;
        let max_out = max_out[0].as_real_mut()?;
        for i in 0..n - p + 1 {
            let win = &src[i..i + p];
            let mut lo = win[0];
            let mut hi = win[0];
            for &v in &win[1..] {
                if v < lo {
                    lo = v;
                }
                if v > hi {
                    hi = v;
                }
            }
            min_out[i] = lo;
            max_out[i] = hi;
        }
        Ok(CallOutcome {
            out_beg: p - 1,
            nb_element: n - p + 1,
        })
    }
}

fn maxindex_info() -> FuncInfo {
    FuncInfo {
        name: "maxindex",
        group: "Math Operators",
        hint: "Index of the highest value over the trailing window",
        inputs: vec![real_input("series")],
        opt_inputs: vec![period_opt(30, 2)],
        outputs: vec![OutputInfo {
            name: "idx",
            kind: OutputKind::Integer,
        }],
    }
}

struct MaxIndex;

impl Kernel for MaxIndex {
    fn eval(
        &self,
        inputs: &[InputSeries<'_>],
        opts: &[ResolvedOpt],
        outputs: &mut [OutputSeries<'_>],
        beg: usize,
        end: usize,
    ) -> KernelResult {
        let src = &inputs[0].as_real()?[beg..=end];
        let p = period(opts, 0, 2)?;
        let n = src.len();
        if n < p {
            return Ok(CallOutcome {
                out_beg: 0,
                nb_element: 0,
            });
        }
        let out = outputs[0].as_integer_mut()?;
        for i in 0..n - p + 1 {
            let mut best = i;
            for j in i + 1..i + p {
                if src[j] > src[best] {
                    best = j;
                }
            }
            out[i] = best as i32;
        }
        Ok(CallOutcome {
            out_beg: p - 1,
            nb_element: n - p + 1,
        })
    }
}

// ---------------------------------------------------------------------------
// roc
// ---------------------------------------------------------------------------

fn roc_info() -> FuncInfo {
    FuncInfo {
        name: "roc",
        group: "Momentum Indicators",
        hint: "Rate of change: ((value / previous value) - 1) * 100",
        inputs: vec![real_input("series")],
        opt_inputs: vec![period_opt(10, 1)],
        outputs: vec![real_output("roc")],
    }
}

struct Roc;

impl Kernel for Roc {
    fn eval(
        &self,
        inputs: &[InputSeries<'_>],
        opts: &[ResolvedOpt],
        outputs: &mut [OutputSeries<'_>],
        beg: usize,
        end: usize,
    ) -> KernelResult {
        let src = &inputs[0].as_real()?[beg..=end];
        let p = period(opts, 0, 1)?;
        let n = src.len();
        if n <= p {
            return Ok(CallOutcome {
                out_beg: 0,
                nb_element: 0,
            });
        }
        let out = outputs[0].as_real_mut()?;
        for i in p..n {
            let prev = src[i - p];
            out[i - p] = if prev != 0.0 {
                (src[i] / prev - 1.0) * 100.0
            } else {
                0.0
            };
        }
        Ok(CallOutcome {
            out_beg: p,
            nb_element: n - p,
        })
    }
}

// ---------------------------------------------------------------------------
// obv — real series plus a volume price column
// ---------------------------------------------------------------------------

fn obv_info() -> FuncInfo {
    FuncInfo {
        name: "obv",
        group: "Volume Indicators",
        hint: "On-balance volume",
        inputs: vec![
            real_input("series"),
            InputInfo {
                name: "volume",
                kind: InputKind::Price(PriceFlags::VOLUME),
            },
        ],
        opt_inputs: vec![],
        outputs: vec![real_output("obv")],
    }
}

struct Obv;

impl Kernel for Obv {
    fn eval(
        &self,
        inputs: &[InputSeries<'_>],
        _opts: &[ResolvedOpt],
        outputs: &mut [OutputSeries<'_>],
        beg: usize,
        end: usize,
    ) -> KernelResult {
        let src = &inputs[0].as_real()?[beg..=end];
        let volume = &inputs[1].as_price()?.volume()?[beg..=end];
        let out = outputs[0].as_real_mut()?;
        let mut obv = volume[0];
        out[0] = obv;
        for i in 1..src.len() {
            if src[i] > src[i - 1] {
                obv += volume[i];
            } else if src[i] < src[i - 1] {
                obv -= volume[i];
            }
            out[i] = obv;
        }
        Ok(CallOutcome {
            out_beg: 0,
            nb_element: src.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// midprice — composite high/low input
// ---------------------------------------------------------------------------

fn midprice_info() -> FuncInfo {
    FuncInfo {
        name: "midprice",
        group: "Overlap Studies",
        hint: "Midpoint of the highest high and lowest low over the window",
        inputs: vec![InputInfo {
            name: "price",
            kind: InputKind::Price(PriceFlags::HIGH.union(PriceFlags::LOW)),
        }],
        opt_inputs: vec![period_opt(14, 2)],
        outputs: vec![real_output("midprice")],
    }
}

struct MidPrice;

impl Kernel for MidPrice {
    fn eval(
        &self,
        inputs: &[InputSeries<'_>],
        opts: &[ResolvedOpt],
        outputs: &mut [OutputSeries<'_>],
        beg: usize,
        end: usize,
    ) -> KernelResult {
        let price = inputs[0].as_price()?;
        let high = &price.high()?[beg..=end];
        let low = &price.low()?[beg..=end];
        let p = period(opts, 0, 2)?;
        let n = high.len();
        if n < p {
            return Ok(CallOutcome {
                out_beg: 0,
                nb_element: 0,
            });
        }
        let out = outputs[0].as_real_mut()?;
        for i in 0..n - p + 1 {
            let mut hi = high[i];
            let mut lo = low[i];
            for j in i + 1..i + p {
                if high[j] > hi {
                    hi = high[j];
                }
                if low[j] < lo {
                    lo = low[j];
                }
            }
            out[i] = (hi + lo) / 2.0;
        }
        Ok(CallOutcome {
            out_beg: p - 1,
            nb_element: n - p + 1,
        })
    }
}
