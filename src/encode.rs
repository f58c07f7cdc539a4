//! ThumbHash encoder
//!
//! Pipeline: proxy build -> average color -> basis selection -> LPQA
//! conversion -> forward DCT per channel -> bit packing. One call is
//! strictly sequential; concurrent calls share only the YCbCr tables and
//! this encoder's buffer pool. Identical input always produces the
//! byte-identical hash.

use std::sync::OnceLock;

use crate::bitstream::{self, Channel};
use crate::consts::{L_LIMIT_ALPHA, L_LIMIT_OPAQUE};
use crate::dct::{fill_cos_table, forward_channel};
use crate::downscale::{area_downscale, extract_pixels, thumb_dims};
use crate::pool::{BufferPool, WorkBuf};
use crate::types::ImageSource;

/// ThumbHash encoder with its own work-buffer pool.
///
/// Cheap to construct; hold one per subsystem (or use the free
/// [`encode`](crate::encode()) function, which shares a process-wide
/// instance). Encoding is `&self` and thread-safe.
pub struct Encoder {
    pool: BufferPool,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    /// Create an encoder with an empty pool.
    pub fn new() -> Self {
        Self {
            pool: BufferPool::new(),
        }
    }

    /// Encode a source image into a ThumbHash of at most 40 bytes.
    ///
    /// Returns an empty vector for a zero-area source. Steady-state this
    /// allocates only the returned hash.
    pub fn encode(&self, src: &ImageSource<'_>) -> Vec<u8> {
        let src_w = src.width();
        let src_h = src.height();
        if src_w == 0 || src_h == 0 {
            return Vec::new();
        }

        let (dst_w, dst_h) = thumb_dims(src_w, src_h);
        let n = dst_w * dst_h * 4;

        let mut wb = self.pool.acquire(n);
        if src_w <= dst_w && src_h <= dst_h {
            extract_pixels(src, dst_w, dst_h, &mut wb.rgba[..n]);
        } else {
            area_downscale(src, src_w, src_h, dst_w, dst_h, &mut wb.rgba[..n]);
        }

        let hash = assemble_hash(dst_w, dst_h, &mut wb);
        self.pool.release(wb);
        hash
    }

    #[cfg(test)]
    pub(crate) fn pooled_buffers(&self) -> usize {
        self.pool.idle()
    }
}

/// Encode with a shared process-wide encoder.
pub fn encode(src: &ImageSource<'_>) -> Vec<u8> {
    static SHARED: OnceLock<Encoder> = OnceLock::new();
    SHARED.get_or_init(Encoder::new).encode(src)
}

/// DCT-transform the proxy and pack the hash bytes.
fn assemble_hash(w: usize, h: usize, wb: &mut WorkBuf) -> Vec<u8> {
    let WorkBuf { rgba, cos_x, cos_y, ac } = wb;
    let count = w * h;
    let rgba = &mut rgba[..count * 4];

    // Mean alpha decides the luma basis limit and the alpha channel's
    // presence.
    let mut avg_a = 0.0f32;
    for i in 0..count {
        avg_a += rgba[i * 4 + 3];
    }
    avg_a /= count as f32;

    let has_alpha = avg_a < 1.0;
    let l_limit = if has_alpha { L_LIMIT_ALPHA } else { L_LIMIT_OPAQUE };
    let max_wh = w.max(h);
    let lx = (((l_limit * w) as f32 / max_wh as f32).round() as usize).max(1);
    let ly = (((l_limit * h) as f32 / max_wh as f32).round() as usize).max(1);
    let px = (((3 * w) as f32 / max_wh as f32).round() as usize).max(1);
    let py = (((3 * h) as f32 / max_wh as f32).round() as usize).max(1);
    let (ax, ay) = if has_alpha {
        (
            (((5 * w) as f32 / max_wh as f32).round() as usize).max(1),
            (((5 * h) as f32 / max_wh as f32).round() as usize).max(1),
        )
    } else {
        (0, 0)
    };

    // RGBA -> LPQA in place, premultiplying by alpha.
    for i in 0..count {
        let off = i * 4;
        let af = rgba[off + 3];
        let r = rgba[off] * af;
        let g = rgba[off + 1] * af;
        let b = rgba[off + 2] * af;
        rgba[off] = (r + g + b) / 3.0;
        rgba[off + 1] = (r + g) / 2.0 - b;
        rgba[off + 2] = r - g;
    }

    // One cosine-table pair serves every channel.
    let mut max_nx = lx.max(px);
    let mut max_ny = ly.max(py);
    if has_alpha {
        max_nx = max_nx.max(ax);
        max_ny = max_ny.max(ay);
    }
    fill_cos_table(&mut cos_x[..max_nx * w], max_nx, w);
    fill_cos_table(&mut cos_y[..max_ny * h], max_ny, h);
    let cos_x = &cos_x[..max_nx * w];
    let cos_y = &cos_y[..max_ny * h];

    // Contiguous per-channel AC slices.
    let l_n = lx * ly - 1;
    let p_n = px * py - 1;
    let a_n = if has_alpha { ax * ay - 1 } else { 0 };

    let (l_scale, l_dc) = forward_channel(rgba, 0, w, h, lx, ly, cos_x, cos_y, &mut ac[..l_n]);
    let (p_scale, p_dc) =
        forward_channel(rgba, 1, w, h, px, py, cos_x, cos_y, &mut ac[l_n..l_n + p_n]);
    let (q_scale, q_dc) = forward_channel(
        rgba,
        2,
        w,
        h,
        px,
        py,
        cos_x,
        cos_y,
        &mut ac[l_n + p_n..l_n + 2 * p_n],
    );
    let alpha = if has_alpha {
        let base = l_n + 2 * p_n;
        let (a_scale, a_dc) = forward_channel(
            rgba,
            3,
            w,
            h,
            ax,
            ay,
            cos_x,
            cos_y,
            &mut ac[base..base + a_n],
        );
        Some((a_scale, a_dc))
    } else {
        None
    };

    bitstream::pack(
        w,
        h,
        lx,
        ly,
        Channel { scale: l_scale, dc: l_dc, ac: &ac[..l_n] },
        Channel { scale: p_scale, dc: p_dc, ac: &ac[l_n..l_n + p_n] },
        Channel { scale: q_scale, dc: q_dc, ac: &ac[l_n + p_n..l_n + 2 * p_n] },
        alpha.map(|(a_scale, a_dc)| Channel {
            scale: a_scale,
            dc: a_dc,
            ac: &ac[l_n + 2 * p_n..l_n + 2 * p_n + a_n],
        }),
    )
}
