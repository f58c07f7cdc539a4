//! ThumbHash decoder
//!
//! Expands a hash into a placeholder bitmap no larger than 32 px on its
//! longest side, with optional chroma attenuation or adaptive mean-color
//! correction. For the same hash and options the output is byte-identical
//! on every call.

use crate::bitstream::{Header, NibbleReader};
use crate::consts::{clamp01, MAX_RENDER_DIM};
use crate::dct::fill_cos_table;
use crate::error::{Error, Result};
use crate::types::{DecodeOptions, Thumbnail};

/// Adaptive attenuation tiers: nearer targets keep more saturation.
const ADAPTIVE_NEAR_DIST: f32 = 20.0;
const ADAPTIVE_FAR_DIST: f32 = 45.0;
const ADAPTIVE_CHROMA: [f32; 3] = [0.55, 0.40, 0.28];

/// Gain applied to the post-attenuation mean error.
const BIAS_GAIN: f32 = 0.45;

/// Decode a ThumbHash into an RGBA placeholder bitmap.
///
/// Fails with [`Error::TruncatedHash`] when the input is shorter than its
/// header demands, or [`Error::MalformedBasis`] when the AC stream ends
/// before all declared coefficients.
pub fn decode(hash: &[u8], opts: &DecodeOptions) -> Result<Thumbnail> {
    let hdr = Header::parse(hash)?;

    let expected = hdr.ac_count();
    let available = (hash.len() - hdr.ac_offset) * 2;
    if available < expected {
        return Err(Error::MalformedBasis { expected, available });
    }

    let mut nibbles = NibbleReader::new(&hash[hdr.ac_offset..]);
    let mut read_channel = |nx: usize, ny: usize, scale: f32| -> Vec<f32> {
        let mut ac = Vec::with_capacity(nx * ny - 1);
        for _ in 0..nx * ny - 1 {
            ac.push((nibbles.read() as f32 / 7.5 - 1.0) * scale);
        }
        ac
    };
    let l_ac = read_channel(hdr.lx, hdr.ly, hdr.l_scale);
    let p_ac = read_channel(hdr.px, hdr.py, hdr.p_scale);
    let q_ac = read_channel(hdr.px, hdr.py, hdr.q_scale);
    let a_ac = if hdr.has_alpha {
        read_channel(hdr.ax, hdr.ay, hdr.a_scale)
    } else {
        Vec::new()
    };

    let (w, h) = render_dims(&hdr);
    let mut rgba = render(&hdr, &l_ac, &p_ac, &q_ac, &a_ac, w, h);

    if let Some(target) = opts.target_mean {
        adaptive_correct(&mut rgba, target);
    } else if opts.chroma < 1.0 {
        attenuate_chroma(&mut rgba, opts.chroma.max(0.0));
    }

    Ok(Thumbnail { width: w, height: h, rgba })
}

/// Average color implied by the header DCs alone, RGBA in `[0, 1]`.
///
/// Useful as a one-pixel placeholder without rendering.
pub fn mean_color(hash: &[u8]) -> Result<(f32, f32, f32, f32)> {
    let hdr = Header::parse(hash)?;
    let (r, g, b) = lpq_to_rgb(hdr.l_dc, hdr.p_dc, hdr.q_dc);
    Ok((clamp01(r), clamp01(g), clamp01(b), clamp01(hdr.a_dc)))
}

/// Approximate aspect ratio (width / height) of the encoded image.
pub fn aspect_ratio(hash: &[u8]) -> Result<f32> {
    let hdr = Header::parse(hash)?;
    Ok(hdr.lx as f32 / hdr.ly as f32)
}

/// Output dimensions: longest side 32, the other proportional to the luma
/// basis rectangle.
fn render_dims(hdr: &Header) -> (usize, usize) {
    let dim = MAX_RENDER_DIM as f32;
    if hdr.is_landscape && hdr.lx > hdr.ly {
        let h = (dim * hdr.ly as f32 / hdr.lx as f32).round() as usize;
        (MAX_RENDER_DIM, h.max(1))
    } else if !hdr.is_landscape && hdr.ly > hdr.lx {
        let w = (dim * hdr.lx as f32 / hdr.ly as f32).round() as usize;
        (w.max(1), MAX_RENDER_DIM)
    } else {
        (MAX_RENDER_DIM, MAX_RENDER_DIM)
    }
}

#[inline]
fn lpq_to_rgb(l: f32, p: f32, q: f32) -> (f32, f32, f32) {
    let b = l - 2.0 / 3.0 * p;
    let r = (3.0 * l - b + q) / 2.0;
    let g = r - q;
    (r, g, b)
}

/// Inverse DCT into RGBA bytes.
fn render(
    hdr: &Header,
    l_ac: &[f32],
    p_ac: &[f32],
    q_ac: &[f32],
    a_ac: &[f32],
    w: usize,
    h: usize,
) -> Vec<u8> {
    // A forged dimFlag can push the basis to 15, so the tables hold 16 rows.
    let mut nx_max = hdr.lx.max(hdr.px);
    let mut ny_max = hdr.ly.max(hdr.py);
    if hdr.has_alpha {
        nx_max = nx_max.max(hdr.ax);
        ny_max = ny_max.max(hdr.ay);
    }
    let mut cos_x = [0.0f32; 16 * MAX_RENDER_DIM];
    let mut cos_y = [0.0f32; 16 * MAX_RENDER_DIM];
    fill_cos_table(&mut cos_x[..nx_max * w], nx_max, w);
    fill_cos_table(&mut cos_y[..ny_max * h], ny_max, h);

    let sum_channel = |ac: &[f32], nx: usize, ny: usize, x: usize, y: usize| -> f32 {
        let mut acc = 0.0f32;
        let mut idx = 0;
        for cy in 0..ny {
            let fy = cos_y[cy * h + y];
            for cx in 0..nx {
                if cx == 0 && cy == 0 {
                    continue;
                }
                acc += ac[idx] * cos_x[cx * w + x] * fy;
                idx += 1;
            }
        }
        acc
    };

    let mut rgba = Vec::with_capacity(w * h * 4);
    for y in 0..h {
        for x in 0..w {
            let l = hdr.l_dc + sum_channel(l_ac, hdr.lx, hdr.ly, x, y);
            let p = hdr.p_dc + sum_channel(p_ac, hdr.px, hdr.py, x, y);
            let q = hdr.q_dc + sum_channel(q_ac, hdr.px, hdr.py, x, y);
            let a = if hdr.has_alpha {
                hdr.a_dc + sum_channel(a_ac, hdr.ax, hdr.ay, x, y)
            } else {
                1.0
            };

            let (r, g, b) = lpq_to_rgb(l, p, q);
            rgba.push((clamp01(r) * 255.0) as u8);
            rgba.push((clamp01(g) * 255.0) as u8);
            rgba.push((clamp01(b) * 255.0) as u8);
            rgba.push((clamp01(a) * 255.0) as u8);
        }
    }
    rgba
}

/// Shrink every pixel's color toward its BT.709 luma.
///
/// `chroma = 0` yields exact gray; `chroma = 1` leaves the buffer as is.
fn attenuate_chroma(rgba: &mut [u8], chroma: f32) {
    for px in rgba.chunks_exact_mut(4) {
        let y = 0.2126 * px[0] as f32 + 0.7152 * px[1] as f32 + 0.0722 * px[2] as f32;
        for c in px[..3].iter_mut() {
            *c = (y + (*c as f32 - y) * chroma).round().clamp(0.0, 255.0) as u8;
        }
    }
}

fn mean_rgb(rgba: &[u8]) -> [f32; 3] {
    let count = (rgba.len() / 4) as f32;
    let mut sum = [0.0f32; 3];
    for px in rgba.chunks_exact(4) {
        sum[0] += px[0] as f32;
        sum[1] += px[1] as f32;
        sum[2] += px[2] as f32;
    }
    [sum[0] / count, sum[1] / count, sum[2] / count]
}

/// Adaptive chroma + bias correction against a caller-supplied target mean.
///
/// Attenuation strength drops as the raw mean drifts from the target, then
/// a constant bias pulls the attenuated mean toward the target.
fn adaptive_correct(rgba: &mut [u8], target: [f32; 3]) {
    let raw = mean_rgb(rgba);
    let dist = ((raw[0] - target[0]).powi(2)
        + (raw[1] - target[1]).powi(2)
        + (raw[2] - target[2]).powi(2))
    .sqrt();

    let chroma = if dist < ADAPTIVE_NEAR_DIST {
        ADAPTIVE_CHROMA[0]
    } else if dist < ADAPTIVE_FAR_DIST {
        ADAPTIVE_CHROMA[1]
    } else {
        ADAPTIVE_CHROMA[2]
    };
    attenuate_chroma(rgba, chroma);

    let attenuated = mean_rgb(rgba);
    let bias = [
        (target[0] - attenuated[0]) * BIAS_GAIN,
        (target[1] - attenuated[1]) * BIAS_GAIN,
        (target[2] - attenuated[2]) * BIAS_GAIN,
    ];
    for px in rgba.chunks_exact_mut(4) {
        for i in 0..3 {
            px[i] = (px[i] as f32 + bias[i]).round().clamp(0.0, 255.0) as u8;
        }
    }
}
