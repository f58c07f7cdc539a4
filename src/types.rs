//! Core types for zenthumb
//!
//! The encoder consumes a tagged view over one of several source pixel
//! layouts; dispatch happens once at the proxy-builder boundary, never per
//! pixel.

use imgref::ImgRef;
use rgb::RGBA8;

/// Chroma subsampling for planar Y/Cb/Cr sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Subsampling {
    /// No subsampling (4:4:4)
    #[default]
    S444,
    /// Half-width chroma (4:2:2)
    S422,
    /// Half-width, half-height chroma (4:2:0) - most common JPEG layout
    S420,
    /// Full-width, half-height chroma (4:4:0)
    S440,
    /// Quarter-width chroma (4:1:1)
    S411,
    /// Quarter-width, half-height chroma (4:1:0)
    S410,
}

impl Subsampling {
    /// Horizontal sampling factor for chroma components
    #[must_use]
    pub const fn h_factor(self) -> usize {
        match self {
            Subsampling::S444 | Subsampling::S440 => 1,
            Subsampling::S422 | Subsampling::S420 => 2,
            Subsampling::S411 | Subsampling::S410 => 4,
        }
    }

    /// Vertical sampling factor for chroma components
    #[must_use]
    pub const fn v_factor(self) -> usize {
        match self {
            Subsampling::S444 | Subsampling::S422 | Subsampling::S411 => 1,
            Subsampling::S420 | Subsampling::S440 | Subsampling::S410 => 2,
        }
    }
}

/// A borrowed view over planar Y/Cb/Cr sample data.
///
/// `origin` is the window's offset within the full frame; chroma addressing
/// uses absolute coordinates so a window keeps the frame's subsample phase.
#[derive(Debug, Clone, Copy)]
pub struct YCbCrView<'a> {
    pub y: &'a [u8],
    pub cb: &'a [u8],
    pub cr: &'a [u8],
    pub y_stride: usize,
    pub c_stride: usize,
    pub width: usize,
    pub height: usize,
    pub subsampling: Subsampling,
    pub origin: (usize, usize),
}

impl<'a> YCbCrView<'a> {
    /// Create a full-frame view.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        y: &'a [u8],
        cb: &'a [u8],
        cr: &'a [u8],
        y_stride: usize,
        c_stride: usize,
        width: usize,
        height: usize,
        subsampling: Subsampling,
    ) -> Self {
        Self {
            y,
            cb,
            cr,
            y_stride,
            c_stride,
            width,
            height,
            subsampling,
            origin: (0, 0),
        }
    }

    /// Narrow the view to a window of the frame.
    ///
    /// Coordinates are relative to the current view; the window must lie
    /// within it.
    #[must_use]
    pub fn window(mut self, x: usize, y: usize, width: usize, height: usize) -> Self {
        assert!(x + width <= self.width && y + height <= self.height);
        self.origin = (self.origin.0 + x, self.origin.1 + y);
        self.width = width;
        self.height = height;
        self
    }

    /// Index into the Y plane for view-relative `(x, y)`.
    #[inline]
    pub fn luma_offset(&self, x: usize, y: usize) -> usize {
        (self.origin.1 + y) * self.y_stride + self.origin.0 + x
    }

    /// Index into the Cb/Cr planes for view-relative `(x, y)`.
    #[inline]
    pub fn chroma_offset(&self, x: usize, y: usize) -> usize {
        let ax = self.origin.0 + x;
        let ay = self.origin.1 + y;
        (ay / self.subsampling.v_factor()) * self.c_stride + ax / self.subsampling.h_factor()
    }
}

/// Generic per-pixel fallback accessor.
///
/// `at` returns premultiplied 16-bit RGBA channels in `[0, 65535]`, the
/// contract shared with Go's `image.Image.At().RGBA()`.
pub trait PixelAccess {
    /// Width and height of the accessible grid.
    fn dimensions(&self) -> (usize, usize);
    /// Premultiplied RGBA at `(x, y)`.
    fn at(&self, x: usize, y: usize) -> [u16; 4];
}

/// A source image in one of the supported pixel layouts.
///
/// The three packed layouts and the planar layout are fast paths; `Generic`
/// goes through [`PixelAccess`] per pixel and is 2-5x slower.
pub enum ImageSource<'a> {
    /// Packed 8-bit RGBA, alpha not premultiplied (PNG-style)
    Nrgba(ImgRef<'a, RGBA8>),
    /// Packed 8-bit RGBA, alpha premultiplied
    Rgba(ImgRef<'a, RGBA8>),
    /// Packed 8-bit grayscale
    Gray(ImgRef<'a, u8>),
    /// Planar Y/Cb/Cr with any subsampling
    YCbCr(YCbCrView<'a>),
    /// Per-pixel fallback
    Generic(&'a dyn PixelAccess),
}

impl ImageSource<'_> {
    /// Width of the source in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        match self {
            ImageSource::Nrgba(img) | ImageSource::Rgba(img) => img.width(),
            ImageSource::Gray(img) => img.width(),
            ImageSource::YCbCr(v) => v.width,
            ImageSource::Generic(p) => p.dimensions().0,
        }
    }

    /// Height of the source in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        match self {
            ImageSource::Nrgba(img) | ImageSource::Rgba(img) => img.height(),
            ImageSource::Gray(img) => img.height(),
            ImageSource::YCbCr(v) => v.height,
            ImageSource::Generic(p) => p.dimensions().1,
        }
    }

    /// Bounding rectangle as `(min_x, min_y, max_x, max_y)`.
    ///
    /// Views are always self-relative, so the minimum corner is the origin.
    #[must_use]
    pub fn bounds(&self) -> (usize, usize, usize, usize) {
        (0, 0, self.width(), self.height())
    }

    /// Reports whether any pixel is less than fully opaque.
    ///
    /// Gray and Y/Cb/Cr sources never carry alpha.
    #[must_use]
    pub fn has_alpha(&self) -> bool {
        match self {
            ImageSource::Nrgba(img) | ImageSource::Rgba(img) => img
                .rows()
                .any(|row| row.iter().any(|px| px.a < 255)),
            ImageSource::Gray(_) | ImageSource::YCbCr(_) => false,
            ImageSource::Generic(p) => {
                let (w, h) = p.dimensions();
                for y in 0..h {
                    for x in 0..w {
                        if p.at(x, y)[3] < 65535 {
                            return true;
                        }
                    }
                }
                false
            }
        }
    }
}

/// Decoder post-processing options.
///
/// `target_mean` enables the adaptive chroma + bias-correction path and
/// supersedes `chroma`.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    pub(crate) chroma: f32,
    pub(crate) target_mean: Option<[f32; 3]>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeOptions {
    /// Default options: no attenuation, no bias correction.
    pub fn new() -> Self {
        Self {
            chroma: 1.0,
            target_mean: None,
        }
    }

    /// Set the chroma attenuation factor in `[0, 1]`.
    ///
    /// `0` produces exact gray; values at or above `1` are a no-op.
    /// Ignored when a target mean is set.
    #[must_use]
    pub fn chroma(mut self, chroma: f32) -> Self {
        self.chroma = chroma;
        self
    }

    /// Set the target mean color (each channel in `[0, 255]`) and enable the
    /// adaptive chroma + bias-correction path.
    #[must_use]
    pub fn target_mean(mut self, rgb: [f32; 3]) -> Self {
        self.target_mean = Some(rgb);
        self
    }
}

/// A decoded placeholder bitmap.
///
/// Dense row-major RGBA bytes, not premultiplied, with
/// `max(width, height) <= 32`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

impl Thumbnail {
    /// Mean RGB over all pixels.
    #[must_use]
    pub fn mean_rgb(&self) -> [f32; 3] {
        let count = (self.width * self.height) as f32;
        let mut sum = [0.0f32; 3];
        for px in self.rgba.chunks_exact(4) {
            sum[0] += px[0] as f32;
            sum[1] += px[1] as f32;
            sum[2] += px[2] as f32;
        }
        [sum[0] / count, sum[1] / count, sum[2] / count]
    }
}
