//! Proxy builder: direct extraction and area downsampling
//!
//! Produces the small RGBA float proxy (longest side <= 100 px) the DCT
//! runs on. Every layout gets its own loop so the per-pixel work is a plain
//! load-accumulate; layout dispatch happens exactly once per call.
//!
//! All sums run in destination order with integer accumulators (float for
//! the generic fallback), so the proxy is bit-identical regardless of
//! thread scheduling.

use imgref::ImgRef;
use rgb::RGBA8;

use crate::consts::{clamp01, clamp_byte, ycbcr_lut, MAX_THUMB_DIM};
use crate::types::{ImageSource, PixelAccess, Subsampling, YCbCrView};

/// Choose proxy dimensions for a source.
///
/// Sources that already fit keep their size; otherwise the longer side is
/// clamped to [`MAX_THUMB_DIM`] and the other scaled proportionally.
pub(crate) fn thumb_dims(src_w: usize, src_h: usize) -> (usize, usize) {
    if src_w <= MAX_THUMB_DIM && src_h <= MAX_THUMB_DIM {
        return (src_w, src_h);
    }
    if src_w >= src_h {
        let h = ((src_h * MAX_THUMB_DIM) as f32 / src_w as f32).round() as usize;
        (MAX_THUMB_DIM, h.max(1))
    } else {
        let w = ((src_w * MAX_THUMB_DIM) as f32 / src_h as f32).round() as usize;
        (w.max(1), MAX_THUMB_DIM)
    }
}

/// Source span covered by destination cell `d`: `[s0, s1)`, never empty,
/// clamped to the source.
#[inline]
fn src_span(d: usize, dst_size: usize, src_size: usize) -> (usize, usize) {
    let s0 = d * src_size / dst_size;
    let mut s1 = (d + 1) * src_size / dst_size;
    if s1 <= s0 {
        s1 = s0 + 1;
    }
    if s1 > src_size {
        s1 = src_size;
    }
    (s0, s1)
}

// ─── direct extraction (source already fits the proxy) ───────────────────

pub(crate) fn extract_pixels(src: &ImageSource, w: usize, h: usize, rgba: &mut [f32]) {
    match src {
        ImageSource::Nrgba(img) => extract_nrgba(*img, w, h, rgba),
        ImageSource::Rgba(img) => extract_rgba(*img, w, h, rgba),
        ImageSource::YCbCr(v) => extract_ycbcr(v, w, h, rgba),
        ImageSource::Gray(img) => extract_gray(*img, w, h, rgba),
        ImageSource::Generic(p) => extract_generic(*p, w, h, rgba),
    }
}

fn extract_nrgba(img: ImgRef<'_, RGBA8>, w: usize, h: usize, rgba: &mut [f32]) {
    let pix = img.buf();
    let stride = img.stride();
    let mut di = 0;
    for y in 0..h {
        let row = &pix[y * stride..y * stride + w];
        for px in row {
            rgba[di] = px.r as f32 / 255.0;
            rgba[di + 1] = px.g as f32 / 255.0;
            rgba[di + 2] = px.b as f32 / 255.0;
            rgba[di + 3] = px.a as f32 / 255.0;
            di += 4;
        }
    }
}

fn extract_rgba(img: ImgRef<'_, RGBA8>, w: usize, h: usize, rgba: &mut [f32]) {
    let pix = img.buf();
    let stride = img.stride();
    let mut di = 0;
    for y in 0..h {
        let row = &pix[y * stride..y * stride + w];
        for px in row {
            let a = px.a as f32;
            if a > 0.0 {
                rgba[di] = px.r as f32 / a;
                rgba[di + 1] = px.g as f32 / a;
                rgba[di + 2] = px.b as f32 / a;
            }
            rgba[di + 3] = a / 255.0;
            di += 4;
        }
    }
}

fn extract_ycbcr(v: &YCbCrView<'_>, w: usize, h: usize, rgba: &mut [f32]) {
    let lut = ycbcr_lut();
    let mut di = 0;
    for y in 0..h {
        let y_off = v.luma_offset(0, y);
        for x in 0..w {
            let yv = v.y[y_off + x] as i32;
            let ci = v.chroma_offset(x, y);
            let cb = v.cb[ci] as usize;
            let cr = v.cr[ci] as usize;
            rgba[di] = clamp_byte(yv + lut.cr_r[cr]) as f32 / 255.0;
            rgba[di + 1] = clamp_byte(yv - lut.cb_g[cb] - lut.cr_g[cr]) as f32 / 255.0;
            rgba[di + 2] = clamp_byte(yv + lut.cb_b[cb]) as f32 / 255.0;
            rgba[di + 3] = 1.0;
            di += 4;
        }
    }
}

fn extract_gray(img: ImgRef<'_, u8>, w: usize, h: usize, rgba: &mut [f32]) {
    let pix = img.buf();
    let stride = img.stride();
    let mut di = 0;
    for y in 0..h {
        for x in 0..w {
            let v = pix[y * stride + x] as f32 / 255.0;
            rgba[di] = v;
            rgba[di + 1] = v;
            rgba[di + 2] = v;
            rgba[di + 3] = 1.0;
            di += 4;
        }
    }
}

fn extract_generic(p: &dyn PixelAccess, w: usize, h: usize, rgba: &mut [f32]) {
    let mut di = 0;
    for y in 0..h {
        for x in 0..w {
            let [r, g, b, a] = p.at(x, y);
            let af = a as f32 / 65535.0;
            if af > 0.0 {
                rgba[di] = r as f32 / 65535.0 / af;
                rgba[di + 1] = g as f32 / 65535.0 / af;
                rgba[di + 2] = b as f32 / 65535.0 / af;
            }
            rgba[di + 3] = af;
            di += 4;
        }
    }
}

// ─── area downsample ─────────────────────────────────────────────────────

pub(crate) fn area_downscale(
    src: &ImageSource,
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
    rgba: &mut [f32],
) {
    match src {
        ImageSource::Nrgba(img) => ds_nrgba(*img, src_w, src_h, dst_w, dst_h, rgba),
        ImageSource::Rgba(img) => ds_rgba(*img, src_w, src_h, dst_w, dst_h, rgba),
        ImageSource::YCbCr(v) => match v.subsampling {
            Subsampling::S420 | Subsampling::S422 => {
                ds_ycbcr_two_pass(v, src_w, src_h, dst_w, dst_h, rgba)
            }
            _ => ds_ycbcr_any(v, src_w, src_h, dst_w, dst_h, rgba),
        },
        ImageSource::Gray(img) => ds_gray(*img, src_w, src_h, dst_w, dst_h, rgba),
        ImageSource::Generic(p) => ds_generic(*p, src_w, src_h, dst_w, dst_h, rgba),
    }
}

/// Non-premultiplied RGBA: u32 accumulation, one divide per channel.
fn ds_nrgba(
    img: ImgRef<'_, RGBA8>,
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
    rgba: &mut [f32],
) {
    let pix = img.buf();
    let stride = img.stride();

    for dy in 0..dst_h {
        let (sy0, sy1) = src_span(dy, dst_h, src_h);
        for dx in 0..dst_w {
            let (sx0, sx1) = src_span(dx, dst_w, src_w);

            let mut r_sum = 0u32;
            let mut g_sum = 0u32;
            let mut b_sum = 0u32;
            let mut a_sum = 0u32;
            for sy in sy0..sy1 {
                let row = &pix[sy * stride + sx0..sy * stride + sx1];
                for px in row {
                    r_sum += px.r as u32;
                    g_sum += px.g as u32;
                    b_sum += px.b as u32;
                    a_sum += px.a as u32;
                }
            }

            let inv = 1.0f32 / (((sy1 - sy0) * (sx1 - sx0)) as f32 * 255.0);
            let di = (dy * dst_w + dx) * 4;
            rgba[di] = r_sum as f32 * inv;
            rgba[di + 1] = g_sum as f32 * inv;
            rgba[di + 2] = b_sum as f32 * inv;
            rgba[di + 3] = a_sum as f32 * inv;
        }
    }
}

/// Premultiplied RGBA: u32 accumulation, un-premultiply by the alpha sum.
///
/// Fully transparent spans leave RGB untouched; the proxy was zeroed on
/// acquisition.
fn ds_rgba(
    img: ImgRef<'_, RGBA8>,
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
    rgba: &mut [f32],
) {
    let pix = img.buf();
    let stride = img.stride();

    for dy in 0..dst_h {
        let (sy0, sy1) = src_span(dy, dst_h, src_h);
        for dx in 0..dst_w {
            let (sx0, sx1) = src_span(dx, dst_w, src_w);

            let mut r_sum = 0u32;
            let mut g_sum = 0u32;
            let mut b_sum = 0u32;
            let mut a_sum = 0u32;
            for sy in sy0..sy1 {
                let row = &pix[sy * stride + sx0..sy * stride + sx1];
                for px in row {
                    r_sum += px.r as u32;
                    g_sum += px.g as u32;
                    b_sum += px.b as u32;
                    a_sum += px.a as u32;
                }
            }

            let di = (dy * dst_w + dx) * 4;
            if a_sum > 0 {
                let a_f = a_sum as f32;
                rgba[di] = r_sum as f32 / a_f;
                rgba[di + 1] = g_sum as f32 / a_f;
                rgba[di + 2] = b_sum as f32 / a_f;
            }
            rgba[di + 3] = a_sum as f32 / (((sy1 - sy0) * (sx1 - sx0)) as f32 * 255.0);
        }
    }
}

/// 4:2:0 and 4:2:2: two sequential plane passes.
///
/// Pass 1 averages the Y plane into the proxy's R slots; pass 2 averages
/// Cb/Cr over the chroma-plane span and converts per destination pixel.
fn ds_ycbcr_two_pass(
    v: &YCbCrView<'_>,
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
    rgba: &mut [f32],
) {
    let (ox, oy) = v.origin;

    // Pass 1: downsample Y.
    for dy in 0..dst_h {
        let (sy0, sy1) = src_span(dy, dst_h, src_h);
        for dx in 0..dst_w {
            let (sx0, sx1) = src_span(dx, dst_w, src_w);
            let mut y_sum = 0u32;
            for sy in sy0..sy1 {
                let off = (oy + sy) * v.y_stride + ox;
                for &s in &v.y[off + sx0..off + sx1] {
                    y_sum += s as u32;
                }
            }
            rgba[(dy * dst_w + dx) * 4] = y_sum as f32 / ((sy1 - sy0) * (sx1 - sx0)) as f32;
        }
    }

    // Chroma-plane dimensions for the window.
    let (c_src_w, c_src_h, c_bx, c_by) = match v.subsampling {
        Subsampling::S420 => ((src_w + 1) >> 1, (src_h + 1) >> 1, ox / 2, oy / 2),
        _ => ((src_w + 1) >> 1, src_h, ox / 2, oy),
    };

    // Pass 2: downsample Cb/Cr and convert.
    for dy in 0..dst_h {
        let (csy0, csy1) = src_span(dy, dst_h, c_src_h);
        for dx in 0..dst_w {
            let (csx0, csx1) = src_span(dx, dst_w, c_src_w);

            let mut cb_sum = 0u32;
            let mut cr_sum = 0u32;
            for csy in csy0..csy1 {
                let off = (c_by + csy) * v.c_stride + c_bx;
                for ci in off + csx0..off + csx1 {
                    cb_sum += v.cb[ci] as u32;
                    cr_sum += v.cr[ci] as u32;
                }
            }

            let cnt = ((csy1 - csy0) * (csx1 - csx0)) as f32;
            let cb = cb_sum as f32 / cnt - 128.0;
            let cr = cr_sum as f32 / cnt - 128.0;

            let di = (dy * dst_w + dx) * 4;
            let y = rgba[di];

            rgba[di] = clamp01((y + 1.402 * cr) / 255.0);
            rgba[di + 1] = clamp01((y - 0.34414 * cb - 0.71414 * cr) / 255.0);
            rgba[di + 2] = clamp01((y + 1.772 * cb) / 255.0);
            rgba[di + 3] = 1.0;
        }
    }
}

/// Remaining subsamplings (4:4:4, 4:4:0, 4:1:1, 4:1:0): single pass over
/// per-pixel RGB reconstructed through the integer LUT. No per-pixel clamp;
/// only the final average is clamped.
fn ds_ycbcr_any(
    v: &YCbCrView<'_>,
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
    rgba: &mut [f32],
) {
    let lut = ycbcr_lut();
    let (ox, oy) = v.origin;

    for dy in 0..dst_h {
        let (sy0, sy1) = src_span(dy, dst_h, src_h);
        for dx in 0..dst_w {
            let (sx0, sx1) = src_span(dx, dst_w, src_w);

            let mut r_sum = 0i32;
            let mut g_sum = 0i32;
            let mut b_sum = 0i32;
            for sy in sy0..sy1 {
                let y_off = (oy + sy) * v.y_stride + ox;
                for sx in sx0..sx1 {
                    let y = v.y[y_off + sx] as i32;
                    let ci = v.chroma_offset(sx, sy);
                    let cb = v.cb[ci] as usize;
                    let cr = v.cr[ci] as usize;

                    r_sum += y + lut.cr_r[cr];
                    g_sum += y - lut.cb_g[cb] - lut.cr_g[cr];
                    b_sum += y + lut.cb_b[cb];
                }
            }

            let inv = 1.0f32 / (((sy1 - sy0) * (sx1 - sx0)) as f32 * 255.0);
            let di = (dy * dst_w + dx) * 4;
            rgba[di] = clamp01(r_sum as f32 * inv);
            rgba[di + 1] = clamp01(g_sum as f32 * inv);
            rgba[di + 2] = clamp01(b_sum as f32 * inv);
            rgba[di + 3] = 1.0;
        }
    }
}

fn ds_gray(
    img: ImgRef<'_, u8>,
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
    rgba: &mut [f32],
) {
    let pix = img.buf();
    let stride = img.stride();

    for dy in 0..dst_h {
        let (sy0, sy1) = src_span(dy, dst_h, src_h);
        for dx in 0..dst_w {
            let (sx0, sx1) = src_span(dx, dst_w, src_w);

            let mut v_sum = 0u32;
            for sy in sy0..sy1 {
                for &s in &pix[sy * stride + sx0..sy * stride + sx1] {
                    v_sum += s as u32;
                }
            }

            let v = v_sum as f32 / (((sy1 - sy0) * (sx1 - sx0)) as f32 * 255.0);
            let di = (dy * dst_w + dx) * 4;
            rgba[di] = v;
            rgba[di + 1] = v;
            rgba[di + 2] = v;
            rgba[di + 3] = 1.0;
        }
    }
}

/// Per-pixel accessor fallback: float accumulation in a fixed scan order.
fn ds_generic(
    p: &dyn PixelAccess,
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
    rgba: &mut [f32],
) {
    for dy in 0..dst_h {
        let (sy0, sy1) = src_span(dy, dst_h, src_h);
        for dx in 0..dst_w {
            let (sx0, sx1) = src_span(dx, dst_w, src_w);

            let mut r_sum = 0.0f32;
            let mut g_sum = 0.0f32;
            let mut b_sum = 0.0f32;
            let mut a_sum = 0.0f32;
            for sy in sy0..sy1 {
                for sx in sx0..sx1 {
                    let [r, g, b, a] = p.at(sx, sy);
                    let af = a as f32 / 65535.0;
                    if af > 0.0 {
                        r_sum += r as f32 / 65535.0 / af;
                        g_sum += g as f32 / 65535.0 / af;
                        b_sum += b as f32 / 65535.0 / af;
                    }
                    a_sum += af;
                }
            }

            let inv = 1.0f32 / ((sy1 - sy0) * (sx1 - sx0)) as f32;
            let di = (dy * dst_w + dx) * 4;
            rgba[di] = r_sum * inv;
            rgba[di + 1] = g_sum * inv;
            rgba[di + 2] = b_sum * inv;
            rgba[di + 3] = a_sum * inv;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumb_dims_small_passthrough() {
        assert_eq!(thumb_dims(64, 64), (64, 64));
        assert_eq!(thumb_dims(100, 50), (100, 50));
        assert_eq!(thumb_dims(1, 1), (1, 1));
        assert_eq!(thumb_dims(100, 100), (100, 100));
    }

    #[test]
    fn test_thumb_dims_clamps_longest_side() {
        assert_eq!(thumb_dims(200, 10), (100, 5));
        assert_eq!(thumb_dims(10, 200), (5, 100));
        assert_eq!(thumb_dims(256, 256), (100, 100));
        assert_eq!(thumb_dims(150, 100), (100, 67));
        // Extreme ratios still keep both sides at least 1
        assert_eq!(thumb_dims(4000, 1), (100, 1));
        assert_eq!(thumb_dims(1, 4000), (1, 100));
    }

    #[test]
    fn test_src_span_partitions_source() {
        // Every source index must be covered exactly once when shrinking
        for (dst, src) in [(5, 17), (100, 256), (3, 3), (7, 100)] {
            let mut next = 0;
            for d in 0..dst {
                let (s0, s1) = src_span(d, dst, src);
                assert_eq!(s0, next, "gap at cell {} of {}->{}", d, src, dst);
                assert!(s1 > s0);
                next = s1;
            }
            assert_eq!(next, src);
        }
    }

    #[test]
    fn test_src_span_never_empty_when_growing() {
        // dst > src spans repeat source samples but are never empty
        for d in 0..10 {
            let (s0, s1) = src_span(d, 10, 4);
            assert!(s1 > s0);
            assert!(s1 <= 4);
        }
    }

    #[test]
    fn test_ds_nrgba_solid() {
        let pix = vec![RGBA8::new(200, 100, 50, 255); 200 * 120];
        let img = ImgRef::new(&pix, 200, 120);
        let mut rgba = vec![0.0f32; 100 * 60 * 4];
        ds_nrgba(img, 200, 120, 100, 60, &mut rgba);
        for px in rgba.chunks_exact(4) {
            assert!((px[0] - 200.0 / 255.0).abs() < 1e-6);
            assert!((px[1] - 100.0 / 255.0).abs() < 1e-6);
            assert!((px[2] - 50.0 / 255.0).abs() < 1e-6);
            assert!((px[3] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_ds_rgba_fully_transparent_leaves_rgb_zeroed() {
        let pix = vec![RGBA8::new(0, 0, 0, 0); 128 * 128];
        let img = ImgRef::new(&pix, 128, 128);
        let mut rgba = vec![0.0f32; 100 * 100 * 4];
        ds_rgba(img, 128, 128, 100, 100, &mut rgba);
        assert!(rgba.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_extract_premultiplied_matches_nrgba_when_opaque() {
        // Property: an opaque premultiplied buffer and the same bytes as
        // non-premultiplied describe the same image.
        let pix: Vec<RGBA8> = (0..16 * 16)
            .map(|i| RGBA8::new((i % 256) as u8, (i * 7 % 256) as u8, 3, 255))
            .collect();
        let img = ImgRef::new(&pix, 16, 16);
        let mut a = vec![0.0f32; 16 * 16 * 4];
        let mut b = vec![0.0f32; 16 * 16 * 4];
        extract_nrgba(img, 16, 16, &mut a);
        extract_rgba(img, 16, 16, &mut b);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_ds_ycbcr_420_neutral_chroma_is_gray() {
        let w = 128;
        let h = 128;
        let y_plane = vec![90u8; w * h];
        let c = vec![128u8; (w / 2) * (h / 2)];
        let v = YCbCrView::new(&y_plane, &c, &c, w, w / 2, w, h, Subsampling::S420);
        let mut rgba = vec![0.0f32; 100 * 100 * 4];
        ds_ycbcr_two_pass(&v, w, h, 100, 100, &mut rgba);
        for px in rgba.chunks_exact(4) {
            assert!((px[0] - 90.0 / 255.0).abs() < 1e-5);
            assert!((px[0] - px[1]).abs() < 1e-5);
            assert!((px[1] - px[2]).abs() < 1e-5);
            assert_eq!(px[3], 1.0);
        }
    }

    #[test]
    fn test_ds_ycbcr_444_matches_extract_for_solid() {
        let w = 150;
        let h = 150;
        let y_plane = vec![120u8; w * h];
        let cb = vec![90u8; w * h];
        let cr = vec![190u8; w * h];
        let v = YCbCrView::new(&y_plane, &cb, &cr, w, w, w, h, Subsampling::S444);
        let mut rgba = vec![0.0f32; 100 * 100 * 4];
        ds_ycbcr_any(&v, w, h, 100, 100, &mut rgba);

        let lut = ycbcr_lut();
        let r = clamp_byte(120 + lut.cr_r[190]) as f32 / 255.0;
        let g = clamp_byte(120 - lut.cb_g[90] - lut.cr_g[190]) as f32 / 255.0;
        let b = clamp_byte(120 + lut.cb_b[90]) as f32 / 255.0;
        for px in rgba.chunks_exact(4) {
            assert!((px[0] - r).abs() < 1e-5);
            assert!((px[1] - g).abs() < 1e-5);
            assert!((px[2] - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_ds_gray_average() {
        // 2x1 cells of 0 and 255 average to 127.5
        let mut pix = vec![0u8; 200];
        for (i, p) in pix.iter_mut().enumerate() {
            *p = if i % 2 == 0 { 0 } else { 255 };
        }
        let img = ImgRef::new(&pix, 200, 1);
        let mut rgba = vec![0.0f32; 100 * 4];
        ds_gray(img, 200, 1, 100, 1, &mut rgba);
        for px in rgba.chunks_exact(4) {
            assert!((px[0] - 0.5).abs() < 2e-3);
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
        }
    }

    struct SolidAccess(u16, u16, u16, u16);
    impl PixelAccess for SolidAccess {
        fn dimensions(&self) -> (usize, usize) {
            (120, 120)
        }
        fn at(&self, _x: usize, _y: usize) -> [u16; 4] {
            [self.0, self.1, self.2, self.3]
        }
    }

    #[test]
    fn test_ds_generic_unpremultiplies() {
        // Half-opaque mid-gray, premultiplied: channel = 0.25 raw, 0.5 after
        // un-premultiply.
        let p = SolidAccess(16384, 16384, 16384, 32768);
        let mut rgba = vec![0.0f32; 100 * 100 * 4];
        ds_generic(&p, 120, 120, 100, 100, &mut rgba);
        for px in rgba.chunks_exact(4) {
            assert!((px[0] - 0.5).abs() < 1e-3);
            assert!((px[3] - 0.5).abs() < 1e-3);
        }
    }
}
