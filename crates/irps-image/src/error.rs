//! Error types for firmware container handling

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, ImageError>;

/// Errors that can occur while loading or validating a firmware container
#[derive(Debug, Error)]
pub enum ImageError {
    /// Image file not present at the staging path
    #[error("Firmware image not found: {path}")]
    FileNotFound {
        /// Path that was attempted
        path: PathBuf,
    },

    /// Image file larger than the accepted maximum
    #[error("Firmware image is {size} bytes, larger than the {max} byte limit")]
    OversizeImage {
        /// Actual file size
        size: u64,
        /// Accepted maximum
        max: u64,
    },

    /// File too small to carry a header plus detached signature
    #[error("Firmware image is {size} bytes, too small for header and signature")]
    Truncated {
        /// Actual file size
        size: usize,
    },

    /// Header CRC32 does not match the header bytes
    #[error("Header CRC32 mismatch: header says {expected:#010x}, computed {computed:#010x}")]
    HeaderCorrupt {
        /// CRC stored in the header
        expected: u32,
        /// CRC computed over the header bytes
        computed: u32,
    },

    /// Signature tag is not the fixed identity string
    #[error("Bad image signature tag")]
    BadSignature,

    /// Device-model tag names a different product
    #[error("Image device model {found:?} does not match {expected:?}")]
    ModelMismatch {
        /// Tag found in the header
        found: String,
        /// Tag this build accepts
        expected: String,
    },

    /// File size disagrees with ImgOffset + ImgSize + signature
    #[error("Image size mismatch: header implies {expected} bytes, file has {actual}")]
    SizeMismatch {
        /// Size implied by the header fields
        expected: usize,
        /// Actual file size
        actual: usize,
    },

    /// Payload CRC32 does not match the payload bytes
    #[error("Payload CRC32 mismatch: header says {expected:#010x}, computed {computed:#010x}")]
    PayloadCorrupt {
        /// CRC stored in the header
        expected: u32,
        /// CRC computed over the payload
        computed: u32,
    },

    /// RSA digest signature rejected
    #[error("Digest signature verification failed: {reason}")]
    SignatureInvalid {
        /// Reason from the verifier
        reason: String,
    },

    /// Public key file missing or not parseable
    #[error("Cannot load public key {path}: {reason}")]
    PublicKey {
        /// Key path
        path: PathBuf,
        /// Reason from the decoder
        reason: String,
    },

    /// Payload length is not a whole number of register records
    #[error("Payload length {len} is not a multiple of the {record} byte record size")]
    RaggedPayload {
        /// Payload length in bytes
        len: usize,
        /// Record size
        record: usize,
    },

    /// I/O error reading the image or key
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl ImageError {
    /// Create a signature-invalid error
    pub fn signature_invalid(reason: impl Into<String>) -> Self {
        Self::SignatureInvalid {
            reason: reason.into(),
        }
    }

    /// Create a public-key error
    pub fn public_key(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::PublicKey {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
