//! Frame decoding errors
//!
//! Every variant carries enough context to tell a truncated read from a
//! foreign producer or a corrupted body when it shows up in the logs.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Buffer shorter than the header or the declared body
    #[error("Frame truncated: need {need} bytes, got {got} (context: {context})")]
    Truncated {
        need: usize,
        got: usize,
        context: String,
    },

    /// First four bytes are not the frame magic
    #[error("Invalid magic number: expected {expected:#010x}, got {actual:#010x} (indicates: {diagnosis})")]
    BadMagic {
        expected: u32,
        actual: u32,
        diagnosis: String,
    },

    /// Frame produced by an incompatible codec revision
    #[error("Unsupported frame version {version}: this build speaks version {supported}")]
    UnsupportedVersion { version: u8, supported: u8 },

    /// Body checksum does not match the header
    #[error("Checksum mismatch: expected {expected:#010x}, calculated {calculated:#010x} ({body_size} byte body)")]
    ChecksumMismatch {
        expected: u32,
        calculated: u32,
        body_size: usize,
    },

    /// Declared or produced body above the frame limit
    #[error("Frame too large: {size} bytes exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },

    #[error("Failed to encode frame: {message}")]
    Encode { message: String },

    /// Body passed the checksum but is not a valid frame
    #[error("Failed to decode frame body: {message}")]
    Decode { message: String },
}

pub type Result<T> = std::result::Result<T, CodecError>;

impl CodecError {
    pub fn truncated(need: usize, got: usize, context: impl Into<String>) -> Self {
        Self::Truncated {
            need,
            got,
            context: context.into(),
        }
    }

    /// Magic mismatch with a best guess at what the buffer actually holds
    pub fn bad_magic(expected: u32, actual: u32) -> Self {
        let diagnosis = if actual == 0 {
            "uninitialized buffer"
        } else if actual == expected.swap_bytes() {
            "byte order mismatch"
        } else if actual.to_be_bytes().iter().all(u8::is_ascii_graphic) {
            "text payload from a foreign producer"
        } else {
            "not a tunnel frame"
        };
        Self::BadMagic {
            expected,
            actual,
            diagnosis: diagnosis.to_string(),
        }
    }

    pub fn checksum_mismatch(expected: u32, calculated: u32, body_size: usize) -> Self {
        Self::ChecksumMismatch {
            expected,
            calculated,
            body_size,
        }
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}
