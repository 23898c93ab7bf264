//! End-to-end dispatch tests: full calls through the engine against probe
//! kernels and the builtin set.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rangecall::library::{
    CallOutcome, FuncInfo, InputInfo, InputKind, InputSeries, Kernel, OutputInfo, OutputKind,
    OutputSeries, RetCode,
};
use rangecall::range::{ArgValue, CellOrder, Flatten, RangeData};
use rangecall::resolve::ResolvedOpt;
use rangecall::{Engine, Error, Registry};

const NAN: f64 = f64::NAN;

// ---------------------------------------------------------------------------
// Probe kernel: records invocations, produces predictable output
// ---------------------------------------------------------------------------

struct Probe {
    calls: Arc<AtomicUsize>,
    lens: Arc<Mutex<Vec<usize>>>,
    out_beg: usize,
    /// Elements to produce; `None` means everything past `out_beg`.
    produce: Option<usize>,
}

impl Kernel for Probe {
    fn eval(
        &self,
        inputs: &[InputSeries<'_>],
        _opts: &[ResolvedOpt],
        outputs: &mut [OutputSeries<'_>],
        beg: usize,
        end: usize,
    ) -> Result<CallOutcome, RetCode> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut lens = self.lens.lock().unwrap();
        lens.clear();
        for input in inputs {
            lens.push(input.as_real()?.len());
        }
        let n = end - beg + 1;
        let nb = self.produce.unwrap_or(n - self.out_beg);
        for (k, out) in outputs.iter_mut().enumerate() {
            let out = out.as_real_mut()?;
            for (i, slot) in out.iter_mut().take(nb).enumerate() {
                *slot = (k * 100 + i) as f64;
            }
        }
        Ok(CallOutcome {
            out_beg: self.out_beg,
            nb_element: nb,
        })
    }
}

fn probe_info(name: &'static str, n_inputs: usize, n_outputs: usize) -> FuncInfo {
    FuncInfo {
        name,
        group: "Test",
        hint: "probe",
        inputs: (0..n_inputs)
            .map(|_| InputInfo {
                name: "series",
                kind: InputKind::RealSeries,
            })
            .collect(),
        opt_inputs: vec![],
        outputs: (0..n_outputs)
            .map(|_| OutputInfo {
                name: "out",
                kind: OutputKind::Real,
            })
            .collect(),
    }
}

struct ProbeHarness {
    engine: Engine,
    calls: Arc<AtomicUsize>,
    lens: Arc<Mutex<Vec<usize>>>,
}

fn probe_engine(n_inputs: usize, n_outputs: usize, out_beg: usize, produce: Option<usize>) -> ProbeHarness {
    let calls = Arc::new(AtomicUsize::new(0));
    let lens = Arc::new(Mutex::new(Vec::new()));
    let mut registry = Registry::new();
    registry.register(
        probe_info("probe", n_inputs, n_outputs),
        Box::new(Probe {
            calls: calls.clone(),
            lens: lens.clone(),
            out_beg,
            produce,
        }),
    );
    ProbeHarness {
        engine: Engine::new(registry),
        calls,
        lens,
    }
}

fn col(cells: Vec<f64>) -> ArgValue {
    ArgValue::Range(RangeData::from_column(cells))
}

fn nan_then(leading: usize, values: &[f64]) -> Vec<f64> {
    let mut v = vec![NAN; leading];
    v.extend_from_slice(values);
    v
}

/// Cell-wise frame equality treating NaN as equal to NaN.
fn assert_frames_eq(a: &rangecall::OutputFrame, b: &rangecall::OutputFrame) {
    assert_eq!((a.rows(), a.cols()), (b.rows(), b.cols()));
    for (i, (x, y)) in a.cells().iter().zip(b.cells()).enumerate() {
        assert!(
            (x.is_nan() && y.is_nan()) || x == y,
            "cell {i}: {x} vs {y}"
        );
    }
}

// ---------------------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_three_ragged_inputs_share_common_range() {
    // Three columns, length 10, two leading sentinel rows each.
    let mut h = probe_engine(3, 1, 0, None);
    let data: Vec<f64> = (1..=8).map(f64::from).collect();
    let args = vec![
        col(nan_then(2, &data)),
        col(nan_then(2, &data)),
        col(nan_then(2, &data)),
    ];
    let frame = h.engine.call("probe", &args).unwrap();

    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    assert_eq!(*h.lens.lock().unwrap(), vec![8, 8, 8]);
    assert_eq!(frame.rows(), 10);
    assert!(frame.get(0, 0).is_nan());
    assert!(frame.get(1, 0).is_nan());
    assert_eq!(frame.get(2, 0), 0.0);
    assert_eq!(frame.get(9, 0), 7.0);
}

#[test]
fn scenario_b_leading_and_trailing_raggedness() {
    // One input ragged at the top, the other at the bottom: common = {2, 6}.
    let mut h = probe_engine(2, 1, 0, None);
    let top_ragged = nan_then(2, &[1.0; 8]);
    let mut bottom_ragged = vec![1.0; 7];
    bottom_ragged.extend_from_slice(&[NAN, NAN, NAN]);
    let frame = h
        .engine
        .call("probe", &[col(top_ragged), col(bottom_ragged)])
        .unwrap();

    assert_eq!(*h.lens.lock().unwrap(), vec![5, 5]);
    assert_eq!(frame.rows(), 10);
    assert!(frame.get(1, 0).is_nan());
    assert_eq!(frame.get(2, 0), 0.0);
    assert_eq!(frame.get(6, 0), 4.0);
    assert!(frame.get(7, 0).is_nan());
}

#[test]
fn scenario_c_all_sentinel_input_fails_without_invoking() {
    let mut h = probe_engine(1, 1, 0, None);
    let err = h.engine.call("probe", &[col(vec![NAN; 5])]).unwrap_err();
    assert_eq!(err, Error::EmptyData);
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn scenario_d_lookback_offsets_the_packed_window() {
    // Common range begins at row 2, the kernel discards 1 more row and
    // produces 5 values: rows 0-2 sentinel, rows 3-7 data, rows 8-9 sentinel.
    let mut h = probe_engine(1, 2, 1, Some(5));
    let input = nan_then(2, &[1.0; 8]);
    let frame = h.engine.call("probe", &[col(input)]).unwrap();

    assert_eq!((frame.rows(), frame.cols()), (10, 2));
    for r in 0..3 {
        assert!(frame.get(r, 0).is_nan() && frame.get(r, 1).is_nan(), "row {r}");
    }
    for r in 3..8 {
        assert_eq!(frame.get(r, 0), (r - 3) as f64);
        assert_eq!(frame.get(r, 1), (100 + r - 3) as f64);
    }
    for r in 8..10 {
        assert!(frame.get(r, 0).is_nan() && frame.get(r, 1).is_nan(), "row {r}");
    }
}

#[test]
fn scenario_e_enumerated_label_matches_any_case() {
    let series: Vec<f64> = (1..=12).map(f64::from).collect();
    let mut engine = Engine::new(Registry::with_builtins());
    let by_value = engine
        .call(
            "ma",
            &[col(series.clone()), ArgValue::Number(3.0), ArgValue::Number(1.0)],
        )
        .unwrap();
    for label in ["Exponential", "exponential", "EXPONENTIAL"] {
        let by_label = engine
            .call(
                "ma",
                &[
                    col(series.clone()),
                    ArgValue::Number(3.0),
                    ArgValue::Text(label.into()),
                ],
            )
            .unwrap();
        assert_frames_eq(&by_label, &by_value);
    }
}

// ---------------------------------------------------------------------------
// Validation failures
// ---------------------------------------------------------------------------

#[test]
fn unknown_function_fails() {
    let mut engine = Engine::new(Registry::with_builtins());
    let err = engine.call("nope", &[col(vec![1.0])]).unwrap_err();
    assert!(matches!(err, Error::UnknownFunction(_)));
}

#[test]
fn wrong_arity_fails() {
    let mut h = probe_engine(2, 1, 0, None);
    let err = h.engine.call("probe", &[col(vec![1.0])]).unwrap_err();
    assert!(matches!(err, Error::Arity { .. }));
    let err = h
        .engine
        .call(
            "probe",
            &[col(vec![1.0]), col(vec![1.0]), col(vec![1.0])],
        )
        .unwrap_err();
    assert!(matches!(err, Error::Arity { .. }));
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn missing_required_input_fails() {
    let mut h = probe_engine(2, 1, 0, None);
    let err = h
        .engine
        .call("probe", &[col(vec![1.0]), ArgValue::Missing])
        .unwrap_err();
    assert_eq!(err, Error::MissingInput(1));
}

#[test]
fn mismatched_input_lengths_fail() {
    let mut h = probe_engine(2, 1, 0, None);
    let err = h
        .engine
        .call("probe", &[col(vec![1.0, 2.0, 3.0]), col(vec![1.0, 2.0])])
        .unwrap_err();
    assert_eq!(
        err,
        Error::LengthMismatch {
            expected: 3,
            got: 2
        }
    );
}

#[test]
fn empty_range_fails() {
    let mut h = probe_engine(1, 1, 0, None);
    let err = h.engine.call("probe", &[col(vec![])]).unwrap_err();
    assert_eq!(err, Error::EmptyRange);
}

#[test]
fn disjoint_valid_runs_fail() {
    let mut h = probe_engine(2, 1, 0, None);
    let first = vec![1.0, 1.0, 1.0, NAN, NAN, NAN];
    let second = vec![NAN, NAN, NAN, NAN, 2.0, 2.0];
    let err = h.engine.call("probe", &[col(first), col(second)]).unwrap_err();
    assert_eq!(err, Error::EmptyData);
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn text_input_series_fails() {
    let mut h = probe_engine(1, 1, 0, None);
    let err = h
        .engine
        .call("probe", &[ArgValue::Text("oops".into())])
        .unwrap_err();
    assert!(matches!(err, Error::BadShape(_)));
}

// ---------------------------------------------------------------------------
// Builtins through the engine
// ---------------------------------------------------------------------------

#[test]
fn sma_small_window() {
    let mut engine = Engine::new(Registry::with_builtins());
    let frame = engine
        .call(
            "sma",
            &[
                col(vec![1.0, 2.0, 3.0, 4.0, 5.0]),
                ArgValue::Number(2.0),
            ],
        )
        .unwrap();
    assert!(frame.get(0, 0).is_nan());
    assert_eq!(
        frame.column(0).skip(1).collect::<Vec<_>>(),
        vec![1.5, 2.5, 3.5, 4.5]
    );
}

#[test]
fn sma_trims_and_realigns() {
    let mut engine = Engine::new(Registry::with_builtins());
    let input = nan_then(3, &[2.0, 4.0, 6.0, 8.0]);
    let frame = engine
        .call("sma", &[col(input), ArgValue::Number(2.0)])
        .unwrap();
    // Valid run starts at row 3; the first average lands on row 4.
    assert_eq!(frame.rows(), 7);
    for r in 0..4 {
        assert!(frame.get(r, 0).is_nan(), "row {r}");
    }
    assert_eq!(frame.get(4, 0), 3.0);
    assert_eq!(frame.get(5, 0), 5.0);
    assert_eq!(frame.get(6, 0), 7.0);
}

#[test]
fn omitted_trailing_optional_uses_default() {
    // Default period is 30: first value lands on row 29.
    let mut engine = Engine::new(Registry::with_builtins());
    let series: Vec<f64> = (1..=40).map(f64::from).collect();
    let frame = engine.call("sma", &[col(series)]).unwrap();
    assert!(frame.get(28, 0).is_nan());
    assert!(!frame.get(29, 0).is_nan());
}

#[test]
fn digit_string_period_is_numeric() {
    let mut engine = Engine::new(Registry::with_builtins());
    let series: Vec<f64> = (1..=10).map(f64::from).collect();
    let by_number = engine
        .call("sma", &[col(series.clone()), ArgValue::Number(4.0)])
        .unwrap();
    let by_text = engine
        .call("sma", &[col(series), ArgValue::Text("4".into())])
        .unwrap();
    assert_frames_eq(&by_number, &by_text);
}

#[test]
fn unknown_matype_label_is_rejected_by_the_kernel() {
    // The resolver absorbs the bad label into the unset sentinel; the
    // kernel is the one that refuses it.
    let mut engine = Engine::new(Registry::with_builtins());
    let series: Vec<f64> = (1..=12).map(f64::from).collect();
    let err = engine
        .call(
            "ma",
            &[
                col(series),
                ArgValue::Number(3.0),
                ArgValue::Text("Hull".into()),
            ],
        )
        .unwrap_err();
    assert_eq!(err, Error::Computation(RetCode::BadParam));
}

#[test]
fn macd_shape_and_histogram() {
    let mut engine = Engine::new(Registry::with_builtins());
    let series: Vec<f64> = (1..=20).map(f64::from).collect();
    let frame = engine
        .call(
            "macd",
            &[
                col(series),
                ArgValue::Number(3.0),
                ArgValue::Number(5.0),
                ArgValue::Number(2.0),
            ],
        )
        .unwrap();
    assert_eq!((frame.rows(), frame.cols()), (20, 3));
    // Lookback is (5-1)+(2-1) = 5 rows.
    for r in 0..5 {
        assert!(frame.get(r, 0).is_nan(), "row {r}");
    }
    for r in 5..20 {
        let macd = frame.get(r, 0);
        let signal = frame.get(r, 1);
        let hist = frame.get(r, 2);
        assert!(macd.is_finite() && signal.is_finite());
        assert!((hist - (macd - signal)).abs() < 1e-12, "row {r}");
    }
}

#[test]
fn minmax_two_outputs() {
    let mut engine = Engine::new(Registry::with_builtins());
    let frame = engine
        .call(
            "minmax",
            &[col(vec![3.0, 1.0, 4.0, 1.0, 5.0]), ArgValue::Number(3.0)],
        )
        .unwrap();
    assert_eq!(frame.cols(), 2);
    assert_eq!(frame.get(2, 0), 1.0);
    assert_eq!(frame.get(2, 1), 4.0);
    assert_eq!(frame.get(4, 0), 1.0);
    assert_eq!(frame.get(4, 1), 5.0);
}

#[test]
fn maxindex_integer_output_is_widened() {
    let mut engine = Engine::new(Registry::with_builtins());
    let input = vec![NAN, 1.0, 3.0, 2.0, 5.0, 4.0];
    let frame = engine
        .call("maxindex", &[col(input), ArgValue::Number(2.0)])
        .unwrap();
    // Valid run starts at row 1; indices are relative to the trimmed slice.
    assert!(frame.get(0, 0).is_nan());
    assert!(frame.get(1, 0).is_nan());
    assert_eq!(frame.get(2, 0), 1.0);
    assert_eq!(frame.get(3, 0), 1.0);
    assert_eq!(frame.get(4, 0), 3.0);
    assert_eq!(frame.get(5, 0), 3.0);
}

#[test]
fn obv_consumes_a_volume_price_column() {
    let mut engine = Engine::new(Registry::with_builtins());
    let price = vec![NAN, 1.0, 2.0, 2.0, 1.0];
    let volume = vec![NAN, 10.0, 20.0, 30.0, 40.0];
    let frame = engine.call("obv", &[col(price), col(volume)]).unwrap();
    assert!(frame.get(0, 0).is_nan());
    assert_eq!(frame.get(1, 0), 10.0);
    assert_eq!(frame.get(2, 0), 30.0);
    assert_eq!(frame.get(3, 0), 30.0);
    assert_eq!(frame.get(4, 0), -10.0);
}

#[test]
fn midprice_composite_high_low() {
    let mut engine = Engine::new(Registry::with_builtins());
    let high = vec![NAN, 3.0, 5.0, 4.0];
    let low = vec![NAN, 1.0, 2.0, 3.0];
    let frame = engine
        .call("midprice", &[col(high), col(low), ArgValue::Number(2.0)])
        .unwrap();
    assert!(frame.get(0, 0).is_nan());
    assert!(frame.get(1, 0).is_nan());
    assert_eq!(frame.get(2, 0), 3.0);
    assert_eq!(frame.get(3, 0), 3.5);
}

#[test]
fn integer_series_inputs_are_cast_from_doubles() {
    struct CastBack;
    impl Kernel for CastBack {
        fn eval(
            &self,
            inputs: &[InputSeries<'_>],
            _opts: &[ResolvedOpt],
            outputs: &mut [OutputSeries<'_>],
            beg: usize,
            end: usize,
        ) -> Result<CallOutcome, RetCode> {
            let src = &inputs[0].as_integer()?[beg..=end];
            let out = outputs[0].as_real_mut()?;
            for (i, &v) in src.iter().enumerate() {
                out[i] = v as f64;
            }
            Ok(CallOutcome {
                out_beg: 0,
                nb_element: src.len(),
            })
        }
    }
    let mut registry = Registry::new();
    registry.register(
        FuncInfo {
            name: "castback",
            group: "Test",
            hint: "echo an integer series",
            inputs: vec![InputInfo {
                name: "series",
                kind: InputKind::IntegerSeries,
            }],
            opt_inputs: vec![],
            outputs: vec![OutputInfo {
                name: "out",
                kind: OutputKind::Real,
            }],
        },
        Box::new(CastBack),
    );
    let mut engine = Engine::new(registry);
    let frame = engine
        .call("castback", &[col(vec![NAN, 1.9, 2.2, 3.0])])
        .unwrap();
    assert!(frame.get(0, 0).is_nan());
    assert_eq!(frame.get(1, 0), 1.0);
    assert_eq!(frame.get(2, 0), 2.0);
    assert_eq!(frame.get(3, 0), 3.0);
}

// ---------------------------------------------------------------------------
// Flattening and cell order
// ---------------------------------------------------------------------------

#[test]
fn row_major_grid_flattens_into_one_series() {
    let mut engine = Engine::new(Registry::with_builtins());
    let grid = RangeData::new(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let frame = engine
        .call("sma", &[ArgValue::Range(grid), ArgValue::Number(2.0)])
        .unwrap();
    assert_eq!(frame.rows(), 6);
    assert_eq!(frame.get(1, 0), 1.5);
    assert_eq!(frame.get(5, 0), 5.5);
}

#[test]
fn unidimensional_engine_rejects_grids() {
    let mut engine = Engine::new(Registry::with_builtins()).with_flatten(Flatten::UniDimensional);
    let grid = RangeData::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let err = engine
        .call("sma", &[ArgValue::Range(grid), ArgValue::Number(2.0)])
        .unwrap_err();
    assert!(matches!(err, Error::BadShape(_)));
}

#[test]
fn scalar_number_input_is_a_one_cell_series() {
    let mut h = probe_engine(1, 1, 0, None);
    let frame = h.engine.call("probe", &[ArgValue::Number(42.0)]).unwrap();
    assert_eq!(frame.rows(), 1);
    assert_eq!(*h.lens.lock().unwrap(), vec![1]);
}

#[test]
fn bottom_up_reverses_input_and_output() {
    // Sheet stores newest-first: chronological series is 1..=5 bottom-up.
    let mut engine =
        Engine::new(Registry::with_builtins()).with_cell_order(CellOrder::BottomUp);
    let sheet = vec![5.0, 4.0, 3.0, 2.0, 1.0];
    let frame = engine
        .call("sma", &[col(sheet), ArgValue::Number(2.0)])
        .unwrap();
    // Chronological averages 1.5, 2.5, 3.5, 4.5 land back newest-first.
    assert_eq!(frame.get(0, 0), 4.5);
    assert_eq!(frame.get(1, 0), 3.5);
    assert_eq!(frame.get(2, 0), 2.5);
    assert_eq!(frame.get(3, 0), 1.5);
    assert!(frame.get(4, 0).is_nan());
}

// ---------------------------------------------------------------------------
// Engine reuse
// ---------------------------------------------------------------------------

#[test]
fn scratch_reuse_across_calls_is_clean() {
    // A long call followed by a short one must not see stale data.
    let mut engine = Engine::new(Registry::with_builtins());
    let long: Vec<f64> = (1..=1000).map(f64::from).collect();
    engine
        .call("sma", &[col(long), ArgValue::Number(10.0)])
        .unwrap();
    let frame = engine
        .call("sma", &[col(vec![2.0, 4.0]), ArgValue::Number(2.0)])
        .unwrap();
    assert_eq!(frame.rows(), 2);
    assert!(frame.get(0, 0).is_nan());
    assert_eq!(frame.get(1, 0), 3.0);
}
