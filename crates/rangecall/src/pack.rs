//! Output packing: re-inflate the kernel's short, offset output arrays into
//! one rectangular NaN-padded frame matching the original range's shape.

/// Read-only view of one kernel output for packing.
#[derive(Debug, Clone, Copy)]
pub enum OutputData<'a> {
    Real(&'a [f64]),
    Integer(&'a [i32]),
}

/// The caller-facing result: `rows x cols` doubles, row-major, one column
/// per declared output, row-aligned with the original (untrimmed) range.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFrame {
    rows: usize,
    cols: usize,
    cells: Vec<f64>,
}

impl OutputFrame {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Cell at (row, output column).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.cells[row * self.cols + col]
    }

    /// Row-major backing storage.
    pub fn cells(&self) -> &[f64] {
        &self.cells
    }

    /// One output column, top to bottom.
    pub fn column(&self, col: usize) -> impl Iterator<Item = f64> + '_ {
        (0..self.rows).map(move |r| self.get(r, col))
    }

    /// Reverse the row order in place (bottom-up sheets).
    pub(crate) fn reverse_rows(&mut self) {
        let cols = self.cols;
        let (mut lo, mut hi) = (0, self.rows.saturating_sub(1));
        while lo < hi {
            for c in 0..cols {
                self.cells.swap(lo * cols + c, hi * cols + c);
            }
            lo += 1;
            hi -= 1;
        }
    }
}

/// Interleave the outputs into a fresh frame.
///
/// `lead` is the total number of leading pad rows: the common range's begin
/// plus the lookback rows the kernel itself discarded (`out_beg`). Rows
/// `lead .. lead + nb_element` carry data; everything before and after is
/// the NaN sentinel, up to exactly `original_rows` rows. Integer outputs
/// are widened to doubles here.
pub fn pack(
    outputs: &[OutputData<'_>],
    lead: usize,
    nb_element: usize,
    original_rows: usize,
) -> OutputFrame {
    let cols = outputs.len();
    let mut cells = vec![f64::NAN; original_rows * cols];
    // A well-formed kernel never produces past the original row count;
    // clamp anyway so the frame invariant holds unconditionally.
    let produced = nb_element.min(original_rows.saturating_sub(lead));
    for (k, out) in outputs.iter().enumerate() {
        match out {
            OutputData::Real(data) => {
                for r in 0..produced {
                    cells[(lead + r) * cols + k] = data[r];
                }
            }
            OutputData::Integer(data) => {
                for r in 0..produced {
                    cells[(lead + r) * cols + k] = data[r] as f64;
                }
            }
        }
    }
    OutputFrame {
        rows: original_rows,
        cols,
        cells,
    }
}
