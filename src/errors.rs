use std::io;

use thiserror::Error;

/// Broad classification of a [`ConversionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The source or sink failed, or the source is shorter than a record declares.
    Io,
    /// The RIFF/RIFX container itself is malformed.
    Container,
    /// A structurally valid field carries a value this converter cannot accept.
    Decode,
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("container error: {0}")]
    Container(String),

    #[error("decode error: {0}")]
    Decode(String),

    /// A setup reference points past the number of entries declared so far.
    #[error("decode error: {field} {index} out of range (count {bound})")]
    IndexOutOfRange {
        field: &'static str,
        index: u32,
        bound: u32,
    },

    #[error("decode error: {record} size mismatch, expected {expected} bytes, consumed {actual}")]
    SizeMismatch {
        record: &'static str,
        expected: u64,
        actual: u64,
    },
}

impl ConversionError {
    pub fn container(message: impl Into<String>) -> Self {
        ConversionError::Container(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        ConversionError::Decode(message.into())
    }

    pub fn out_of_range(field: &'static str, index: u32, bound: u32) -> Self {
        ConversionError::IndexOutOfRange { field, index, bound }
    }

    pub fn size_mismatch(record: &'static str, expected: u64, actual: u64) -> Self {
        ConversionError::SizeMismatch {
            record,
            expected,
            actual,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ConversionError::Io(_) => ErrorCategory::Io,
            ConversionError::Container(_) => ErrorCategory::Container,
            ConversionError::Decode(_)
            | ConversionError::IndexOutOfRange { .. }
            | ConversionError::SizeMismatch { .. } => ErrorCategory::Decode,
        }
    }
}

/// Checks `index < bound`, naming `field` in the error otherwise.
pub fn check_index(field: &'static str, index: u32, bound: u32) -> Result<()> {
    if index >= bound {
        return Err(ConversionError::out_of_range(field, index, bound));
    }
    Ok(())
}

pub type Result<T> = std::result::Result<T, ConversionError>;
