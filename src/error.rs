//! Error types for the PDF security handler

use std::io;
use thiserror::Error;

/// Main error type for PDF security operations
#[derive(Error, Debug)]
pub enum PdfSecurityError {
    /// Encryption version/revision combination this crate does not implement
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Security handler named by /Filter is not registered
    #[error("Unsupported security handler: {0}")]
    UnsupportedFilter(String),

    /// Encryption dictionary is structurally invalid
    #[error("Malformed encryption dictionary: {0}")]
    MalformedDescriptor(String),

    /// Missing required dictionary entry
    #[error("Missing required dictionary entry: {0}")]
    MissingDictionaryEntry(String),

    /// Invalid dictionary value
    #[error("Invalid dictionary value for key {key}: {message}")]
    InvalidDictionaryValue {
        key: String,
        message: String,
    },

    /// A stream names a crypt filter absent from /CF
    #[error("Unknown crypt filter: {0}")]
    UnknownCryptFilter(String),

    /// Encrypt/decrypt attempted before a successful authorization
    #[error("Security handler is not authenticated")]
    NotAuthenticated,

    /// Underlying cipher rejected the input
    #[error("Cipher failure: {0}")]
    CipherFailure(String),

    /// Invalid key length
    #[error("Invalid key length: {0}")]
    InvalidKeyLength(usize),

    /// Invalid data length
    #[error("Invalid data length for {operation}")]
    InvalidDataLength {
        operation: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Result type for PDF security operations
pub type PdfSecurityResult<T> = Result<T, PdfSecurityError>;

impl PdfSecurityError {
    /// Create a new malformed descriptor error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedDescriptor(msg.into())
    }

    /// Create a new cipher failure
    pub fn cipher(msg: impl Into<String>) -> Self {
        Self::CipherFailure(msg.into())
    }

    /// Create a new unsupported algorithm error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(msg.into())
    }

    /// Create a new invalid data length error
    pub fn invalid_length(operation: impl Into<String>) -> Self {
        Self::InvalidDataLength {
            operation: operation.into(),
        }
    }

    /// Create a new invalid dictionary value error
    pub fn invalid_dict_value(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidDictionaryValue {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Errors raised while building a handler; these abort opening the document.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedAlgorithm(_)
                | Self::UnsupportedFilter(_)
                | Self::MalformedDescriptor(_)
                | Self::MissingDictionaryEntry(_)
                | Self::InvalidDictionaryValue { .. }
        )
    }

    /// Errors confined to a single string or stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CipherFailure(_)
                | Self::InvalidDataLength { .. }
                | Self::InvalidKeyLength(_)
                | Self::UnknownCryptFilter(_)
                | Self::IoError(_)
        )
    }
}

impl From<cbc::cipher::InvalidLength> for PdfSecurityError {
    fn from(err: cbc::cipher::InvalidLength) -> Self {
        Self::CipherFailure(err.to_string())
    }
}

impl From<cbc::cipher::block_padding::UnpadError> for PdfSecurityError {
    fn from(err: cbc::cipher::block_padding::UnpadError) -> Self {
        Self::CipherFailure(format!("invalid padding: {}", err))
    }
}
