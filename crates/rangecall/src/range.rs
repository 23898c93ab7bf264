//! Caller-side data model: rectangular cell grids, flattening policy, and
//! the dynamic argument list handed to [`Engine::call`](crate::Engine::call).

use crate::{Error, Result};

/// How a multi-row/multi-column range is flattened into one series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flatten {
    /// Walk rows first (left-to-right within a row, then down).
    RowMajor,
    /// Walk columns first (top-to-bottom within a column, then right).
    ColumnMajor,
    /// Require a single row or a single column; anything else fails.
    UniDimensional,
}

/// Direction the sheet's series runs in.
///
/// `BottomUp` reverses every flattened input before trimming and reverses
/// the packed output rows before returning, so the result lines up with a
/// sheet whose newest value sits in the top cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellOrder {
    TopDown,
    BottomUp,
}

/// A rectangular grid of cells, row-major, with NaN marking missing values.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeData {
    rows: usize,
    cols: usize,
    cells: Vec<f64>,
}

impl RangeData {
    /// Build from row-major cell storage. Fails if `cells.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, cells: Vec<f64>) -> Result<Self> {
        if cells.len() != rows * cols {
            return Err(Error::BadShape("cell count does not match rows * cols"));
        }
        Ok(RangeData { rows, cols, cells })
    }

    /// A single-column range.
    pub fn from_column(cells: Vec<f64>) -> Self {
        RangeData {
            rows: cells.len(),
            cols: 1,
            cells,
        }
    }

    /// A single-row range.
    pub fn from_row(cells: Vec<f64>) -> Self {
        RangeData {
            rows: 1,
            cols: cells.len(),
            cells,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total cell count.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Row-major backing storage.
    pub fn cells(&self) -> &[f64] {
        &self.cells
    }

    /// Flatten into `out` (cleared first) according to `policy`.
    ///
    /// `UniDimensional` fails unless the range is a single row or column.
    pub fn flatten_into(&self, policy: Flatten, out: &mut Vec<f64>) -> Result<()> {
        out.clear();
        match policy {
            Flatten::RowMajor => out.extend_from_slice(&self.cells),
            Flatten::ColumnMajor => {
                out.reserve(self.cells.len());
                for c in 0..self.cols {
                    for r in 0..self.rows {
                        out.push(self.cells[r * self.cols + c]);
                    }
                }
            }
            Flatten::UniDimensional => {
                if self.rows != 1 && self.cols != 1 {
                    return Err(Error::BadShape("range must be a single row or column"));
                }
                out.extend_from_slice(&self.cells);
            }
        }
        Ok(())
    }
}

/// One positional argument of a call: declared inputs first (price-composite
/// inputs contribute one column per flagged field), then declared optionals.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// A cell range. For inputs this is the normal case; a scalar cell is a
    /// 1x1 range.
    Range(RangeData),
    /// A bare number (inputs treat it as a one-cell series; optionals use it
    /// directly).
    Number(f64),
    /// Free text, meaningful only for optional parameters.
    Text(String),
    /// Explicitly absent. Required inputs fail on this; optionals fall back
    /// to their default.
    Missing,
}

impl ArgValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, ArgValue::Missing)
    }
}
