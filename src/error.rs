//! Error types for zenthumb

use std::fmt;

/// Result type for zenthumb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for zenthumb decoding operations
///
/// Encoding never fails: a zero-area source yields an empty hash and every
/// quantization step clamps by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Hash is shorter than the minimum its header demands
    /// (6 bytes without alpha, 8 bytes with alpha)
    TruncatedHash {
        len: usize,
        need: usize,
    },
    /// AC nibble stream ended before all declared coefficients could be read
    MalformedBasis {
        expected: usize,
        available: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TruncatedHash { len, need } => {
                write!(f, "Truncated hash: {} bytes, need at least {}", len, need)
            }
            Error::MalformedBasis { expected, available } => {
                write!(
                    f,
                    "Malformed basis: header declares {} AC coefficients, stream holds {}",
                    expected, available
                )
            }
        }
    }
}

impl std::error::Error for Error {}
