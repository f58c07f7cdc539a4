//! Reusable work buffers for encoding
//!
//! One encode needs ~167 KB of scratch (proxy floats, two cosine tables, the
//! AC array). Buffers are leased per call and recycled through a mutex
//! stack, so steady-state encoding allocates nothing but the returned hash.

use std::sync::Mutex;

use crate::consts::{MAX_AC_COUNT, MAX_THUMB_DIM};

/// Scratch space for one encode call.
pub(crate) struct WorkBuf {
    /// Proxy RGBA floats, `dst_w * dst_h * 4` in use
    pub rgba: [f32; MAX_THUMB_DIM * MAX_THUMB_DIM * 4],
    /// Cosine table, `max_nx * dst_w` in use
    pub cos_x: [f32; 8 * MAX_THUMB_DIM],
    /// Cosine table, `max_ny * dst_h` in use
    pub cos_y: [f32; 8 * MAX_THUMB_DIM],
    /// AC coefficients for all channels, contiguous
    pub ac: [f32; MAX_AC_COUNT],
}

impl WorkBuf {
    fn new() -> Box<Self> {
        Box::new(WorkBuf {
            rgba: [0.0; MAX_THUMB_DIM * MAX_THUMB_DIM * 4],
            cos_x: [0.0; 8 * MAX_THUMB_DIM],
            cos_y: [0.0; 8 * MAX_THUMB_DIM],
            ac: [0.0; MAX_AC_COUNT],
        })
    }
}

/// Free-list of work buffers shared by all encodes on one [`crate::Encoder`].
///
/// A buffer is held by exactly one caller between `acquire` and `release`;
/// an empty pool allocates. There is no upper bound, so the pool's
/// high-water mark is the peak number of concurrent encodes.
pub(crate) struct BufferPool {
    free: Mutex<Vec<Box<WorkBuf>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Lease a buffer with the first `proxy_len` proxy floats zeroed.
    ///
    /// Only the proxy prefix needs clearing: the cosine tables and AC array
    /// are fully overwritten before they are read, but the premultiplied
    /// downsample path skips RGB writes for fully transparent spans.
    pub fn acquire(&self, proxy_len: usize) -> Box<WorkBuf> {
        let mut buf = self
            .free
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .unwrap_or_else(WorkBuf::new);
        buf.rgba[..proxy_len].fill(0.0);
        buf
    }

    /// Return a leased buffer for reuse by any thread.
    pub fn release(&self, buf: Box<WorkBuf>) {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).push(buf);
    }

    /// Number of idle buffers currently pooled.
    #[cfg(test)]
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
