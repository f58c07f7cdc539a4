//! # zenthumb - Deterministic ThumbHash Codec
//!
//! zenthumb compresses any raster image into a placeholder hash of a few
//! dozen bytes and expands that hash back into a tiny RGBA bitmap (longest
//! side 32 px) for instant image placeholders.
//!
//! ## Key Features
//!
//! - **Bit-exact wire format**: a 32-bit header, a 16-bit scale header, an
//!   optional 16-bit alpha header, and 4-bit AC nibbles; encoder and
//!   decoder agree on every field width
//! - **Deterministic encoding**: identical input produces the identical
//!   hash regardless of thread count or pool state
//! - **Layout fast paths**: packed non-premultiplied and premultiplied
//!   RGBA, planar Y/Cb/Cr at any subsampling, 8-bit gray, plus a generic
//!   per-pixel fallback
//! - **Zero steady-state allocation**: work buffers are pooled; an encode
//!   allocates only the returned hash
//! - **Adaptive placeholder tuning**: the decoder can attenuate chroma and
//!   bias-correct toward a caller-supplied mean color
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zenthumb::{Encoder, DecodeOptions, ImageSource};
//!
//! let encoder = Encoder::new();
//! let hash = encoder.encode(&ImageSource::Nrgba(pixels));
//!
//! let thumb = zenthumb::decode(&hash, &DecodeOptions::new())?;
//! let tinted = zenthumb::decode(&hash, &DecodeOptions::new().target_mean([92.0, 120.0, 74.0]))?;
//! ```
//!
//! ## Encoding pipeline
//!
//! source image -> RGBA proxy (longest side 100 px, area-averaged) -> LPQA
//! channels -> low-order forward DCT with an aspect-adaptive basis ->
//! quantized header fields + AC nibbles.

// Core modules
mod consts;
mod error;
mod pool;
mod types;

// Encoding pipeline
mod bitstream;
mod dct;
mod downscale;
mod encode;

// Decoding pipeline
mod decode;

// Public API
pub use decode::{aspect_ratio, decode, mean_color};
pub use encode::{encode, Encoder};
pub use error::Error;
pub use types::{DecodeOptions, ImageSource, PixelAccess, Subsampling, Thumbnail, YCbCrView};

// Boundary pixel types, re-exported for callers constructing sources.
pub use imgref::ImgRef;
pub use rgb::RGBA8;

/// Result type for zenthumb operations
pub type Result<T> = std::result::Result<T, Error>;
