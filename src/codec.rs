//! Property codec
//!
//! Decodes the raw EDT bytes returned for one property into integers.
//! All formats are big-endian; signed formats are two's-complement.
//!
//! # Array format
//!
//! ```text
//! [min_index: 1] [max_index: 1] [element: W] * (max_index - min_index + 1)
//! ```
//!
//! Length problems are data errors, never panics: [`PropertyCodec::decode`]
//! returns the sentinel `0` and [`PropertyCodec::try_decode`] returns a
//! [`DecodeError`] the caller can skip on.

use crate::error::DecodeError;
use crate::protocol::{NumericFormat, PropertyEncoding};
use tracing::warn;

/// Value returned by [`PropertyCodec::decode`] for a malformed buffer
pub const MALFORMED_SENTINEL: i64 = 0;

/// A decoded property value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading {
    /// Single integer value
    Scalar(i64),
    /// One slot per array index; `None` marks a not-applicable element
    Array(Vec<Option<i64>>),
}

/// Stateless decoder for property buffers
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyCodec;

impl PropertyCodec {
    /// Decode a scalar, returning [`MALFORMED_SENTINEL`] on length mismatch
    pub fn decode(buffer: &[u8], format: NumericFormat) -> i64 {
        match Self::try_decode(buffer, format) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, %format, "malformed property buffer");
                MALFORMED_SENTINEL
            }
        }
    }

    /// Decode a scalar, failing when the buffer length is not the format width
    pub fn try_decode(buffer: &[u8], format: NumericFormat) -> Result<i64, DecodeError> {
        read_value(buffer, format).ok_or(DecodeError::LengthMismatch {
            expected: format.width(),
            actual: buffer.len(),
        })
    }

    /// Decode an array, returning an empty list when the buffer is malformed
    pub fn decode_array(buffer: &[u8], format: NumericFormat) -> Vec<Option<i64>> {
        match Self::try_decode_array(buffer, format) {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, %format, "malformed array buffer");
                Vec::new()
            }
        }
    }

    /// Decode an array of homogeneous elements
    ///
    /// The slot count comes from the `(min_index, max_index)` header. When
    /// fewer complete elements are present than announced, the result is
    /// truncated to what is there; elements beyond the announced count are
    /// ignored.
    pub fn try_decode_array(
        buffer: &[u8],
        format: NumericFormat,
    ) -> Result<Vec<Option<i64>>, DecodeError> {
        let (min, max, payload) = match buffer {
            [min, max, payload @ ..] => (*min, *max, payload),
            _ => return Err(DecodeError::MissingArrayHeader(buffer.len())),
        };

        if max < min {
            return Err(DecodeError::InvalidArrayRange { min, max });
        }

        let width = format.width();
        if payload.len() % width != 0 {
            return Err(DecodeError::RaggedArray {
                len: payload.len(),
                width,
            });
        }

        let count = (max - min) as usize + 1;
        Ok(payload
            .chunks_exact(width)
            .take(count)
            .map(|chunk| read_value(chunk, format).filter(|v| !format.is_not_applicable(*v)))
            .collect())
    }

    /// Decode according to a full property encoding
    pub fn decode_property(
        buffer: &[u8],
        encoding: PropertyEncoding,
    ) -> Result<Reading, DecodeError> {
        match encoding {
            PropertyEncoding::Scalar(format) => Self::try_decode(buffer, format).map(Reading::Scalar),
            PropertyEncoding::Array(format) => {
                Self::try_decode_array(buffer, format).map(Reading::Array)
            }
        }
    }
}

/// Read one value; `None` when the slice is not exactly the format width
fn read_value(bytes: &[u8], format: NumericFormat) -> Option<i64> {
    let value = match (format, bytes) {
        (NumericFormat::UInt8, [b]) => *b as i64,
        (NumericFormat::Int8, [b]) => *b as i8 as i64,
        (NumericFormat::UInt16, [b0, b1]) => u16::from_be_bytes([*b0, *b1]) as i64,
        (NumericFormat::Int16, [b0, b1]) => i16::from_be_bytes([*b0, *b1]) as i64,
        (NumericFormat::UInt32, [b0, b1, b2, b3]) => {
            u32::from_be_bytes([*b0, *b1, *b2, *b3]) as i64
        }
        (NumericFormat::Int32, [b0, b1, b2, b3]) => {
            i32::from_be_bytes([*b0, *b1, *b2, *b3]) as i64
        }
        _ => return None,
    };
    Some(value)
}
