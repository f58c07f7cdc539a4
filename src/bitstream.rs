//! Bit-exact hash packing and parsing
//!
//! Wire format (all multi-byte fields little-endian):
//!
//! Bytes 0-3: main header (32 bits)
//!   bits  0-5  (6): lDC      = round(lDC * 63)        decode: val / 63
//!   bits  6-11 (6): pDC      = round(pDC * 31 + 31)   decode: val / 31 - 1
//!   bits 12-17 (6): qDC      = round(qDC * 31 + 31)   decode: val / 31 - 1
//!   bits 18-22 (5): lScale   = round(lScale * 31)     decode: val / 31
//!   bit  23    (1): hasAlpha
//!   bits 24-27 (4): dimFlag  = isLandscape ? ly : lx  (range 1..7)
//!   bit  28    (1): isLandscape
//!   bits 29-31:     unused, zero
//!
//! Bytes 4-5: header2 (16 bits)
//!   bits  0-5  (6): pScale   = round(pScale * 63)
//!   bits  6-11 (6): qScale   = round(qScale * 63)
//!   bits 12-15:     unused
//!
//! Bytes 6-7 (only if hasAlpha): alpha header (16 bits)
//!   bits  0-3  (4): aDC      = round(aDC * 15)
//!   bits  4-7  (4): aScale   = round(aScale * 15)
//!   bits  8-15:     unused
//!
//! Remaining bytes: AC coefficients as 4-bit nibbles in the order
//! lAC, pAC, qAC [, aAC], each `round(clamp01(c/2 + 0.5) * 15)`, packed
//! low nibble first. An odd count leaves the final high nibble zero.
//!
//! pDC and qDC are 6-bit fields. Parsing them with a 5-bit mask silently
//! truncates raw values >= 32 and corrupts chroma; both sides mask with
//! 0x3F.

use crate::consts::{clamp01, L_LIMIT_ALPHA, L_LIMIT_OPAQUE};
use crate::error::{Error, Result};

/// One encoded channel handed to the packer: the DC term, the AC
/// normalization scale, and the normalized AC vector in `[-1, 1]`.
pub(crate) struct Channel<'a> {
    pub scale: f32,
    pub dc: f32,
    pub ac: &'a [f32],
}

/// Assemble the hash bytes. The sole heap allocation of an encode call.
pub(crate) fn pack(
    dst_w: usize,
    dst_h: usize,
    lx: usize,
    ly: usize,
    l: Channel<'_>,
    p: Channel<'_>,
    q: Channel<'_>,
    a: Option<Channel<'_>>,
) -> Vec<u8> {
    let has_alpha = a.is_some();
    let is_landscape = dst_w > dst_h;

    // Quantized field products are formed in f64; rounding is
    // half-away-from-zero. The golden fixtures pin both choices.
    let mut header: u32 = (l.dc as f64 * 63.0).round() as u32
        | (((p.dc as f64 * 31.0 + 31.0).round() as u32) << 6)
        | (((q.dc as f64 * 31.0 + 31.0).round() as u32) << 12)
        | (((l.scale as f64 * 31.0).round() as u32) << 18)
        | ((has_alpha as u32) << 23);
    header |= ((if is_landscape { ly } else { lx }) as u32) << 24;
    header |= (is_landscape as u32) << 28;

    let header2: u16 = (p.scale as f64 * 63.0).round() as u16
        | (((q.scale as f64 * 63.0).round() as u16) << 6);

    let total_ac = l.ac.len()
        + p.ac.len()
        + q.ac.len()
        + a.as_ref().map_or(0, |ch| ch.ac.len());
    let ac_offset = if has_alpha { 8 } else { 6 };
    let mut hash = vec![0u8; ac_offset + (total_ac + 1) / 2];

    hash[0] = header as u8;
    hash[1] = (header >> 8) as u8;
    hash[2] = (header >> 16) as u8;
    hash[3] = (header >> 24) as u8;
    hash[4] = header2 as u8;
    hash[5] = (header2 >> 8) as u8;

    if let Some(ref ch) = a {
        let alpha_hdr: u16 = (ch.dc as f64 * 15.0).round() as u16
            | (((ch.scale as f64 * 15.0).round() as u16) << 4);
        hash[6] = alpha_hdr as u8;
        hash[7] = (alpha_hdr >> 8) as u8;
    }

    let mut nib = 0usize;
    let mut pack_ac = |hash: &mut [u8], ac: &[f32]| {
        for &c in ac {
            let v = clamp01(c / 2.0 + 0.5);
            let b = (v as f64 * 15.0).round() as u8;
            let pos = ac_offset + nib / 2;
            if nib % 2 == 0 {
                hash[pos] = b;
            } else {
                hash[pos] |= b << 4;
            }
            nib += 1;
        }
    };
    pack_ac(hash.as_mut_slice(), l.ac);
    pack_ac(hash.as_mut_slice(), p.ac);
    pack_ac(hash.as_mut_slice(), q.ac);
    if let Some(ref ch) = a {
        pack_ac(hash.as_mut_slice(), ch.ac);
    }

    hash
}

/// Parsed header fields plus the basis rectangles they imply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Header {
    pub l_dc: f32,
    pub p_dc: f32,
    pub q_dc: f32,
    pub a_dc: f32,
    pub l_scale: f32,
    pub p_scale: f32,
    pub q_scale: f32,
    pub a_scale: f32,
    pub has_alpha: bool,
    pub is_landscape: bool,
    pub lx: usize,
    pub ly: usize,
    pub px: usize,
    pub py: usize,
    pub ax: usize,
    pub ay: usize,
    /// Byte offset of the AC nibble stream
    pub ac_offset: usize,
}

impl Header {
    /// Parse and validate the fixed-size header portion of a hash.
    pub fn parse(hash: &[u8]) -> Result<Self> {
        if hash.len() < 6 {
            return Err(Error::TruncatedHash { len: hash.len(), need: 6 });
        }
        let h = u32::from_le_bytes([hash[0], hash[1], hash[2], hash[3]]);
        let h2 = u16::from_le_bytes([hash[4], hash[5]]);

        let has_alpha = (h >> 23) & 1 == 1;
        if has_alpha && hash.len() < 8 {
            return Err(Error::TruncatedHash { len: hash.len(), need: 8 });
        }

        // 6-bit mask on pDC/qDC. & 31 here is the historic chroma bug.
        let l_dc = (h & 63) as f32 / 63.0;
        let p_dc = ((h >> 6) & 63) as f32 / 31.0 - 1.0;
        let q_dc = ((h >> 12) & 63) as f32 / 31.0 - 1.0;
        let l_scale = ((h >> 18) & 31) as f32 / 31.0;
        let dim_flag = ((h >> 24) & 15) as usize;
        let is_landscape = (h >> 28) & 1 == 1;

        let p_scale = (h2 & 63) as f32 / 63.0;
        let q_scale = ((h2 >> 6) & 63) as f32 / 63.0;

        let (a_dc, a_scale) = if has_alpha {
            ((hash[6] & 15) as f32 / 15.0, (hash[6] >> 4) as f32 / 15.0)
        } else {
            (1.0, 1.0)
        };

        let l_limit = if has_alpha { L_LIMIT_ALPHA } else { L_LIMIT_OPAQUE };
        let (lx, ly) = if is_landscape {
            (l_limit, dim_flag.max(1))
        } else {
            (dim_flag.max(1), l_limit)
        };

        // The chroma and alpha rectangles are not transmitted; they are
        // re-derived from the luma rectangle the same way the encoder
        // derived them from the proxy aspect. The alpha formula coincides
        // with luma's at lLimit = 5, so ax/ay are just lx/ly.
        let px = ((3 * lx) as f32 / l_limit as f32).round().max(1.0) as usize;
        let py = ((3 * ly) as f32 / l_limit as f32).round().max(1.0) as usize;
        let (ax, ay) = if has_alpha { (lx, ly) } else { (0, 0) };

        Ok(Header {
            l_dc,
            p_dc,
            q_dc,
            a_dc,
            l_scale,
            p_scale,
            q_scale,
            a_scale,
            has_alpha,
            is_landscape,
            lx,
            ly,
            px,
            py,
            ax,
            ay,
            ac_offset: if has_alpha { 8 } else { 6 },
        })
    }

    /// Total AC coefficient count across all channels.
    pub fn ac_count(&self) -> usize {
        (self.lx * self.ly - 1)
            + 2 * (self.px * self.py - 1)
            + if self.has_alpha { self.ax * self.ay - 1 } else { 0 }
    }
}

/// Sequential nibble reader over the AC portion of a hash.
///
/// Length is validated against [`Header::ac_count`] before reading, so
/// `read` never runs past the slice.
pub(crate) struct NibbleReader<'a> {
    bytes: &'a [u8],
    nib: usize,
}

impl<'a> NibbleReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, nib: 0 }
    }

    /// Next nibble, low half of each byte first.
    #[inline]
    pub fn read(&mut self) -> u8 {
        let b = self.bytes[self.nib / 2];
        let v = if self.nib % 2 == 0 { b & 15 } else { b >> 4 };
        self.nib += 1;
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_header(
        dst_w: usize,
        dst_h: usize,
        lx: usize,
        ly: usize,
        l: (f32, f32),
        p: (f32, f32),
        q: (f32, f32),
    ) -> Header {
        let l_ac = vec![0.0f32; lx * ly - 1];
        let hash = pack(
            dst_w,
            dst_h,
            lx,
            ly,
            Channel { scale: l.0, dc: l.1, ac: &l_ac },
            Channel { scale: p.0, dc: p.1, ac: &[0.0; 8] },
            Channel { scale: q.0, dc: q.1, ac: &[0.0; 8] },
            None,
        );
        Header::parse(&hash).unwrap()
    }

    #[test]
    fn test_header_field_roundtrip() {
        let hdr = roundtrip_header(
            100,
            100,
            7,
            7,
            (0.5, 0.25),
            (0.75, 0.5),
            (0.3, -0.5),
        );
        assert!(!hdr.has_alpha);
        assert!(!hdr.is_landscape);
        assert_eq!((hdr.lx, hdr.ly), (7, 7));
        assert_eq!((hdr.px, hdr.py), (3, 3));
        // Field resolution: 1/63 for lDC, 1/31 for the signed chroma DCs
        assert!((hdr.l_dc - 0.25).abs() <= 0.5 / 63.0);
        assert!((hdr.p_dc - 0.5).abs() <= 0.6 / 31.0);
        assert!((hdr.q_dc + 0.5).abs() <= 0.6 / 31.0);
        assert!((hdr.l_scale - 0.5).abs() <= 0.6 / 31.0);
        assert!((hdr.p_scale - 0.75).abs() <= 0.5 / 63.0);
        assert!((hdr.q_scale - 0.3).abs() <= 0.5 / 63.0);
    }

    #[test]
    fn test_landscape_dim_flag_stores_short_axis() {
        let hdr = roundtrip_header(100, 50, 7, 4, (0.0, 0.5), (0.0, 0.0), (0.0, 0.0));
        assert!(hdr.is_landscape);
        assert_eq!((hdr.lx, hdr.ly), (7, 4));
        assert_eq!((hdr.px, hdr.py), (3, 2));
    }

    #[test]
    fn test_six_bit_chroma_dc_mask() {
        // qDC = 1.0 encodes to raw 62, which a 5-bit mask would fold to 30.
        let hash = pack(
            64,
            64,
            7,
            7,
            Channel { scale: 0.0, dc: 1.0, ac: &[0.0; 48] },
            Channel { scale: 0.0, dc: 0.516, ac: &[0.0; 8] },
            Channel { scale: 0.0, dc: 1.0, ac: &[0.0; 8] },
            None,
        );
        let h = u32::from_le_bytes([hash[0], hash[1], hash[2], hash[3]]);
        let q_raw = (h >> 12) & 63;
        assert_eq!(q_raw, 62);

        let hdr = Header::parse(&hash).unwrap();
        assert!((hdr.q_dc - 1.0).abs() < 1e-3);

        // The historic bug for comparison
        let q_dc_5bit = ((h >> 12) & 31) as f32 / 31.0 - 1.0;
        assert!((q_dc_5bit - hdr.q_dc).abs() > 0.5);
    }

    #[test]
    fn test_alpha_header() {
        let hash = pack(
            64,
            64,
            5,
            5,
            Channel { scale: 0.25, dc: 0.5, ac: &[0.0; 24] },
            Channel { scale: 0.0, dc: 0.0, ac: &[0.0; 8] },
            Channel { scale: 0.0, dc: 0.0, ac: &[0.0; 8] },
            Some(Channel { scale: 1.0, dc: 0.4, ac: &[0.0; 24] }),
        );
        assert_eq!(hash[2] >> 7, 1, "hasAlpha bit is bit 23");
        let hdr = Header::parse(&hash).unwrap();
        assert!(hdr.has_alpha);
        assert_eq!(hdr.ac_offset, 8);
        assert_eq!((hdr.ax, hdr.ay), (5, 5));
        assert!((hdr.a_dc - 0.4).abs() <= 0.5 / 15.0);
        assert!((hdr.a_scale - 1.0).abs() < 1e-6);
        assert_eq!(hdr.ac_count(), 24 + 16 + 24);
    }

    #[test]
    fn test_nibble_order_low_first() {
        // Two AC values: -1 -> nibble 0, +1 -> nibble 15
        let ac = [-1.0f32, 1.0];
        let hash = pack(
            10,
            100,
            1,
            3,
            Channel { scale: 1.0, dc: 0.0, ac: &ac },
            Channel { scale: 0.0, dc: 0.0, ac: &[] },
            Channel { scale: 0.0, dc: 0.0, ac: &[] },
            None,
        );
        assert_eq!(hash[6], 0xF0);
    }

    #[test]
    fn test_odd_nibble_count_zero_pads() {
        let ac = [1.0f32, 1.0, 1.0];
        let hash = pack(
            10,
            100,
            2,
            2,
            Channel { scale: 1.0, dc: 0.0, ac: &ac },
            Channel { scale: 0.0, dc: 0.0, ac: &[] },
            Channel { scale: 0.0, dc: 0.0, ac: &[] },
            None,
        );
        assert_eq!(hash.len(), 6 + 2);
        assert_eq!(hash[6], 0xFF);
        assert_eq!(hash[7], 0x0F, "final high nibble must stay zero");
    }

    #[test]
    fn test_truncated_header() {
        assert_eq!(
            Header::parse(&[0u8; 5]),
            Err(Error::TruncatedHash { len: 5, need: 6 })
        );
        // Alpha bit set but only 6 bytes present
        let mut hash = [0u8; 6];
        hash[2] = 0x80;
        assert_eq!(
            Header::parse(&hash),
            Err(Error::TruncatedHash { len: 6, need: 8 })
        );
    }

    #[test]
    fn test_nibble_reader() {
        let mut r = NibbleReader::new(&[0x21, 0x43]);
        assert_eq!(r.read(), 1);
        assert_eq!(r.read(), 2);
        assert_eq!(r.read(), 3);
        assert_eq!(r.read(), 4);
    }
}
