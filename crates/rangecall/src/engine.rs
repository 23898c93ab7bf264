//! The call dispatcher: one entry point per requested function, walking
//! Validating → Trimming → Aligning → Resolving → Invoking → Packing, with
//! failure possible at every step before the kernel runs and scratch
//! recycled on every exit path.

use smallvec::SmallVec;

use crate::align::align;
use crate::library::{InputKind, OutputKind, PriceFlags, PriceSeries, Registry};
use crate::pack::{pack, OutputData, OutputFrame};
use crate::range::{ArgValue, CellOrder, Flatten};
use crate::resolve::{resolve, ResolvedOpt};
use crate::scratch::{F64Lease, I32Lease, ScratchPool};
use crate::trim::{trim_integer, trim_real, ValidRange};
use crate::{Error, Result};

/// Canonical consumption order of price-composite fields.
const PRICE_ORDER: [PriceFlags; 6] = [
    PriceFlags::OPEN,
    PriceFlags::HIGH,
    PriceFlags::LOW,
    PriceFlags::CLOSE,
    PriceFlags::VOLUME,
    PriceFlags::OPEN_INTEREST,
];

/// One trimmed caller column, leased from the pool.
enum ColBuf<'p> {
    Real(F64Lease<'p>),
    Integer(I32Lease<'p>),
}

/// One kernel output buffer, leased from the pool.
enum OutBuf<'p> {
    Real(F64Lease<'p>),
    Integer(I32Lease<'p>),
}

/// Marshalling engine over one [`Registry`].
///
/// A call borrows the engine mutably, so two concurrent calls require two
/// engines — the scratch pool is per-engine and never shared.
pub struct Engine {
    registry: Registry,
    flatten: Flatten,
    cell_order: CellOrder,
    scratch: ScratchPool,
}

impl Engine {
    /// An engine with row-major flattening and top-down cell order.
    pub fn new(registry: Registry) -> Self {
        Engine {
            registry,
            flatten: Flatten::RowMajor,
            cell_order: CellOrder::TopDown,
            scratch: ScratchPool::new(),
        }
    }

    pub fn with_flatten(mut self, flatten: Flatten) -> Self {
        self.flatten = flatten;
        self
    }

    pub fn with_cell_order(mut self, order: CellOrder) -> Self {
        self.cell_order = order;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Dispatch one call: positional `args` are the declared input columns
    /// (price composites expanded, one column per flagged field) followed
    /// by the declared optionals; trailing optionals may be omitted.
    ///
    /// The kernel is invoked exactly once, over the intersection of every
    /// input's valid span; the returned frame has one row per original
    /// input row and one column per declared output, NaN everywhere the
    /// computation produced nothing.
    pub fn call(&mut self, name: &str, args: &[ArgValue]) -> Result<OutputFrame> {
        let handle = self.registry.handle(name)?;
        let info = self.registry.info(handle);
        let n_cols = info.caller_input_columns();
        let n_opts = info.opt_inputs.len();

        #[cfg(feature = "tracing")]
        tracing::debug!(func = name, args = args.len(), "dispatching call");

        // -- Validating ----------------------------------------------------
        // Everything here fails before any scratch is leased: arity, missing
        // required inputs, empty ranges, and length mismatches (cell counts
        // are flatten-invariant, so lengths are checkable up front).
        if args.len() < n_cols || args.len() > n_cols + n_opts {
            return Err(Error::Arity {
                expected: n_cols + n_opts,
                got: args.len(),
            });
        }
        let mut original_rows = 0usize;
        for (col, arg) in args.iter().take(n_cols).enumerate() {
            let len = match arg {
                ArgValue::Range(r) => r.len(),
                ArgValue::Number(_) => 1,
                ArgValue::Text(_) => {
                    return Err(Error::BadShape("text cannot be an input series"));
                }
                ArgValue::Missing => return Err(Error::MissingInput(col)),
            };
            if len == 0 {
                return Err(Error::EmptyRange);
            }
            if col == 0 {
                original_rows = len;
            } else if len != original_rows {
                return Err(Error::LengthMismatch {
                    expected: original_rows,
                    got: len,
                });
            }
        }

        // Caller-column element types, price composites expanded.
        let mut col_integer: SmallVec<[bool; 8]> = SmallVec::new();
        for inp in &info.inputs {
            match inp.kind {
                InputKind::RealSeries => col_integer.push(false),
                InputKind::IntegerSeries => col_integer.push(true),
                InputKind::Price(flags) => {
                    for _ in 0..flags.bits().count_ones() {
                        col_integer.push(false);
                    }
                }
            }
        }

        // -- Trimming ------------------------------------------------------
        let mut ranges: SmallVec<[ValidRange; 8]> = SmallVec::new();
        let mut cols: Vec<ColBuf<'_>> = Vec::with_capacity(n_cols);
        let mut flat = self.scratch.lease_f64();
        for col in 0..n_cols {
            match &args[col] {
                ArgValue::Range(r) => {
                    r.flatten_into(self.flatten, &mut flat)?;
                }
                ArgValue::Number(v) => {
                    flat.clear();
                    flat.push(*v);
                }
                // Already rejected while validating.
                ArgValue::Text(_) => {
                    return Err(Error::BadShape("text cannot be an input series"));
                }
                ArgValue::Missing => return Err(Error::MissingInput(col)),
            }
            if self.cell_order == CellOrder::BottomUp {
                flat.reverse();
            }
            if col_integer[col] {
                let mut dst = self.scratch.lease_i32();
                let vr = trim_integer(&flat, &mut dst).ok_or(Error::EmptyData)?;
                ranges.push(vr);
                cols.push(ColBuf::Integer(dst));
            } else {
                let mut dst = self.scratch.lease_f64();
                let vr = trim_real(&flat, &mut dst).ok_or(Error::EmptyData)?;
                ranges.push(vr);
                cols.push(ColBuf::Real(dst));
            }
        }
        drop(flat);

        // -- Aligning ------------------------------------------------------
        let common = align(ranges.iter().copied()).ok_or(Error::EmptyData)?;
        let nb_valid = common.nb_valid();

        // -- Resolving -----------------------------------------------------
        let resolved: SmallVec<[ResolvedOpt; 4]> = info
            .opt_inputs
            .iter()
            .enumerate()
            .map(|(i, spec)| resolve(spec, args.get(n_cols + i)))
            .collect();

        // -- Invoking ------------------------------------------------------
        let mut out_bufs: Vec<OutBuf<'_>> = Vec::with_capacity(info.outputs.len());
        for o in &info.outputs {
            match o.kind {
                OutputKind::Real => {
                    let mut b = self.scratch.lease_f64();
                    b.resize(nb_valid, f64::NAN);
                    out_bufs.push(OutBuf::Real(b));
                }
                OutputKind::Integer => {
                    let mut b = self.scratch.lease_i32();
                    b.resize(nb_valid, 0);
                    out_bufs.push(OutBuf::Integer(b));
                }
            }
        }

        let mut holder = self.registry.param_holder(handle);
        let mut cur = 0usize;
        for (i, inp) in info.inputs.iter().enumerate() {
            match inp.kind {
                InputKind::RealSeries => {
                    let slice = real_window(&cols[cur], ranges[cur], common.begin, nb_valid)?;
                    cur += 1;
                    holder.set_input_real(i, slice).map_err(Error::Computation)?;
                }
                InputKind::IntegerSeries => {
                    let slice = match &cols[cur] {
                        ColBuf::Integer(buf) => {
                            let offset = common.begin - ranges[cur].begin;
                            &buf[offset..offset + nb_valid]
                        }
                        ColBuf::Real(_) => return Err(Error::Computation(
                            crate::library::RetCode::Internal,
                        )),
                    };
                    cur += 1;
                    holder
                        .set_input_integer(i, slice)
                        .map_err(Error::Computation)?;
                }
                InputKind::Price(flags) => {
                    let mut price = PriceSeries::default();
                    for flag in PRICE_ORDER {
                        if !flags.contains(flag) {
                            continue;
                        }
                        let slice = real_window(&cols[cur], ranges[cur], common.begin, nb_valid)?;
                        cur += 1;
                        if flag == PriceFlags::OPEN {
                            price.open = Some(slice);
                        } else if flag == PriceFlags::HIGH {
                            price.high = Some(slice);
                        } else if flag == PriceFlags::LOW {
                            price.low = Some(slice);
                        } else if flag == PriceFlags::CLOSE {
                            price.close = Some(slice);
                        } else if flag == PriceFlags::VOLUME {
                            price.volume = Some(slice);
                        } else {
                            price.open_interest = Some(slice);
                        }
                    }
                    holder
                        .set_input_price(i, price)
                        .map_err(Error::Computation)?;
                }
            }
        }
        for (i, opt) in resolved.iter().enumerate() {
            match opt {
                ResolvedOpt::Real(v) => {
                    holder.set_opt_real(i, *v).map_err(Error::Computation)?;
                }
                ResolvedOpt::Integer(v) => {
                    holder.set_opt_integer(i, *v).map_err(Error::Computation)?;
                }
            }
        }
        for (k, buf) in out_bufs.iter_mut().enumerate() {
            match buf {
                OutBuf::Real(b) => {
                    holder
                        .set_output_real(k, &mut b[..])
                        .map_err(Error::Computation)?;
                }
                OutBuf::Integer(b) => {
                    holder
                        .set_output_integer(k, &mut b[..])
                        .map_err(Error::Computation)?;
                }
            }
        }

        let outcome = holder
            .call(0, nb_valid - 1)
            .map_err(Error::Computation)?;

        #[cfg(feature = "tracing")]
        tracing::trace!(
            out_beg = outcome.out_beg,
            nb_element = outcome.nb_element,
            "kernel returned"
        );

        // -- Packing -------------------------------------------------------
        let nb_element = outcome.nb_element.min(nb_valid);
        let views: SmallVec<[OutputData<'_>; 4]> = out_bufs
            .iter()
            .map(|buf| match buf {
                OutBuf::Real(b) => OutputData::Real(&b[..nb_element]),
                OutBuf::Integer(b) => OutputData::Integer(&b[..nb_element]),
            })
            .collect();
        let mut frame = pack(
            &views,
            common.begin + outcome.out_beg,
            nb_element,
            original_rows,
        );
        if self.cell_order == CellOrder::BottomUp {
            frame.reverse_rows();
        }
        Ok(frame)
    }
}

/// Common-range window of one real caller column.
fn real_window<'a>(
    col: &'a ColBuf<'_>,
    range: ValidRange,
    common_begin: usize,
    nb_valid: usize,
) -> Result<&'a [f64]> {
    match col {
        ColBuf::Real(buf) => {
            let offset = common_begin - range.begin;
            Ok(&buf[offset..offset + nb_valid])
        }
        ColBuf::Integer(_) => Err(Error::Computation(crate::library::RetCode::Internal)),
    }
}
