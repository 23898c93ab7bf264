//! Per-engine scratch buffer pool.
//!
//! Trimmed inputs and kernel outputs are leased from here instead of
//! allocated per call. Capacity only ever grows; content is never assumed
//! valid across calls. Leases return their buffer on drop, so every exit
//! path of a call — including failures — recycles what it took. The pool
//! belongs to one engine, never to the process: two engines never share
//! scratch.

use std::cell::RefCell;

pub(crate) struct ScratchPool {
    f64_bufs: RefCell<Vec<Vec<f64>>>,
    i32_bufs: RefCell<Vec<Vec<i32>>>,
}

impl ScratchPool {
    pub(crate) fn new() -> Self {
        ScratchPool {
            f64_bufs: RefCell::new(Vec::new()),
            i32_bufs: RefCell::new(Vec::new()),
        }
    }

    /// Lease an empty f64 buffer, reusing pooled capacity when available.
    pub(crate) fn lease_f64(&self) -> F64Lease<'_> {
        let buf = self.f64_bufs.borrow_mut().pop().unwrap_or_default();
        F64Lease { pool: self, buf }
    }

    /// Lease an empty i32 buffer.
    pub(crate) fn lease_i32(&self) -> I32Lease<'_> {
        let buf = self.i32_bufs.borrow_mut().pop().unwrap_or_default();
        I32Lease { pool: self, buf }
    }
}

pub(crate) struct F64Lease<'p> {
    pool: &'p ScratchPool,
    buf: Vec<f64>,
}

impl std::ops::Deref for F64Lease<'_> {
    type Target = Vec<f64>;
    fn deref(&self) -> &Vec<f64> {
        &self.buf
    }
}

impl std::ops::DerefMut for F64Lease<'_> {
    fn deref_mut(&mut self) -> &mut Vec<f64> {
        &mut self.buf
    }
}

impl Drop for F64Lease<'_> {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        self.pool.f64_bufs.borrow_mut().push(buf);
    }
}

pub(crate) struct I32Lease<'p> {
    pool: &'p ScratchPool,
    buf: Vec<i32>,
}

impl std::ops::Deref for I32Lease<'_> {
    type Target = Vec<i32>;
    fn deref(&self) -> &Vec<i32> {
        &self.buf
    }
}

impl std::ops::DerefMut for I32Lease<'_> {
    fn deref_mut(&mut self) -> &mut Vec<i32> {
        &mut self.buf
    }
}

impl Drop for I32Lease<'_> {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        self.pool.i32_bufs.borrow_mut().push(buf);
    }
}
