//! Error types and completion codes for the update engine.
//!
//! Internally everything is an [`UpdateError`]; at the engine boundary
//! each error maps onto exactly one [`CompletionCode`], the stable
//! management-plane taxonomy callers see. Lock contention gets its own
//! code so callers can retry without resubmitting a doomed request.

use irps_chip::OtpSection;
use irps_image::ImageError;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Errors raised while driving one update or query
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Instance id outside the board table
    #[error("Chip instance {instance} out of range (board has {count})")]
    ParamOutOfRange {
        /// Requested instance
        instance: u8,
        /// Instances on the board
        count: usize,
    },

    /// Request mask names no programmable section
    #[error("Request mask {mask:#x} names no programmable section")]
    InvalidRequest {
        /// Raw mask from the request
        mask: u32,
    },

    /// An update is already running on this instance
    #[error("Instance {instance} is already executing an update")]
    AlreadyExecuting {
        /// Busy instance
        instance: u8,
    },

    /// Non-blocking lock acquisition denied — busy, retry later
    #[error("Bus lock busy")]
    LockBusy,

    /// Image failed structural or cryptographic validation
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Image sub-model tag matches no board instance
    #[error("Image sub-model {tag:?} matches no board instance")]
    SubModelUnknown {
        /// Tag from the image header
        tag: String,
    },

    /// Image is built for a different instance than requested
    #[error("Image targets instance {image}, request named {requested}")]
    InstanceMismatch {
        /// Instance named in the request
        requested: u8,
        /// Instance the image resolves to
        image: u8,
    },

    /// Silicon revision below the programming minimum
    #[error("Silicon revision {found:#x} below minimum {min:#x}")]
    UnsupportedSilicon {
        /// Revision read from the chip
        found: u8,
        /// Required minimum
        min: u8,
    },

    /// Section write budget fully consumed
    #[error("{section} section write budget exhausted")]
    BudgetExhausted {
        /// Affected section
        section: OtpSection,
    },

    /// Budget at or below the warning threshold
    #[error("{section} section has {remaining} writes left, at warning threshold {warn}")]
    CapabilityLimited {
        /// Affected section
        section: OtpSection,
        /// Remaining write cycles
        remaining: u8,
        /// Configured threshold
        warn: u8,
    },

    /// Payload carries no records for the requested section
    #[error("Image carries no {section} section records")]
    NoSectionData {
        /// Requested section
        section: OtpSection,
    },

    /// Page select outside the chip's valid window
    #[error("Page {page:#x} outside [{min:#x}, {max:#x}]")]
    PageOutOfRange {
        /// Requested page
        page: u8,
        /// Lowest valid page
        min: u8,
        /// Highest valid page
        max: u8,
    },

    /// Transport failure or short transfer
    #[error("Bus error: {reason}")]
    Bus {
        /// Reason for failure
        reason: String,
    },

    /// A register write failed mid-programming
    #[error("Flash write failed at register {addr:#06x}")]
    FlashWrite {
        /// Register being written
        addr: u16,
    },

    /// OTP commit did not report done within the settle window
    #[error("Chip stayed in firmware-protect mode after {section} commit")]
    FirmwareProtectMode {
        /// Section being committed
        section: OtpSection,
    },

    /// Budget did not decrease by exactly one after commit
    #[error("{section} budget was {before} before commit, {after} after; expected {expected}")]
    CommitVerify {
        /// Section committed
        section: OtpSection,
        /// Remaining writes before commit
        before: u8,
        /// Remaining writes read back
        after: u8,
        /// Expected read-back
        expected: u8,
    },

    /// CRC error latched against the committed OTP image
    #[error("Chip latched a CRC error against the committed user image")]
    FlashVerify,

    /// No register qualified for post-write verification
    #[error("No verifiable registers in the user section")]
    NoVerifiableRegisters,

    /// Read-back values disagreed with the image
    #[error("Verification found {count} mismatched registers")]
    VerifyMismatch {
        /// Mismatch count
        count: usize,
    },

    /// I/O error staging the image
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl UpdateError {
    /// Create a bus error
    pub fn bus(reason: impl Into<String>) -> Self {
        Self::Bus {
            reason: reason.into(),
        }
    }

    /// The stable completion code this error reports at the boundary.
    #[must_use]
    pub fn completion_code(&self) -> CompletionCode {
        match self {
            Self::ParamOutOfRange { .. } => CompletionCode::ParamOutOfRange,
            Self::InvalidRequest { .. } | Self::NoSectionData { .. } => {
                CompletionCode::InvalidRequest
            }
            Self::AlreadyExecuting { .. } => CompletionCode::AlreadyExecuting,
            Self::LockBusy => CompletionCode::LockBusy,
            Self::Image(e) => completion_for_image(e),
            Self::SubModelUnknown { .. } | Self::InstanceMismatch { .. } => {
                CompletionCode::ModelMismatch
            }
            Self::UnsupportedSilicon { .. } => CompletionCode::UnsupportedSilicon,
            Self::BudgetExhausted { .. } => CompletionCode::BudgetExhausted,
            Self::CapabilityLimited { .. } => CompletionCode::CapabilityLimited,
            Self::PageOutOfRange { .. } | Self::Bus { .. } => CompletionCode::BusError,
            Self::FlashWrite { .. } => CompletionCode::FlashWriteError,
            Self::FirmwareProtectMode { .. } => CompletionCode::FirmwareProtectMode,
            Self::CommitVerify { .. } => CompletionCode::CommitVerifyError,
            Self::FlashVerify | Self::VerifyMismatch { .. } | Self::NoVerifiableRegisters => {
                CompletionCode::FlashVerifyError
            }
            Self::Io { .. } => CompletionCode::ReadError,
        }
    }
}

fn completion_for_image(e: &ImageError) -> CompletionCode {
    match e {
        ImageError::FileNotFound { .. } => CompletionCode::FileNotExist,
        ImageError::OversizeImage { .. }
        | ImageError::Truncated { .. }
        | ImageError::SizeMismatch { .. }
        | ImageError::RaggedPayload { .. } => CompletionCode::SizeInvalid,
        ImageError::HeaderCorrupt { .. } => CompletionCode::HeaderCrcError,
        ImageError::BadSignature => CompletionCode::SignatureInvalid,
        ImageError::ModelMismatch { .. } => CompletionCode::ModelMismatch,
        ImageError::PayloadCorrupt { .. } => CompletionCode::PayloadCrcError,
        ImageError::SignatureInvalid { .. } | ImageError::PublicKey { .. } => {
            CompletionCode::DigestSignInvalid
        }
        ImageError::Io { .. } => CompletionCode::ReadError,
    }
}

/// Completion codes reported at the engine boundary.
///
/// Values are stable wire constants; `Normal` is the only success code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompletionCode {
    /// Update completed and verified
    Normal = 0x00,
    /// Instance id out of range
    ParamOutOfRange = 0xC9,
    /// Bus lock busy; retry later
    LockBusy = 0xC0,
    /// Another update is running on the instance
    AlreadyExecuting = 0x81,
    /// Request names no programmable section, or image has no data for it
    InvalidRequest = 0x82,
    /// Staging image absent
    FileNotExist = 0x83,
    /// Staging image unreadable
    ReadError = 0x84,
    /// Image size fields inconsistent or out of bounds
    SizeInvalid = 0x85,
    /// Header CRC32 mismatch
    HeaderCrcError = 0x86,
    /// Identity tag wrong
    SignatureInvalid = 0x87,
    /// Product or sub-model tag wrong for this board
    ModelMismatch = 0x88,
    /// Payload CRC32 mismatch
    PayloadCrcError = 0x89,
    /// RSA digest signature rejected
    DigestSignInvalid = 0x8A,
    /// Silicon too old to program
    UnsupportedSilicon = 0x8B,
    /// Write budget used up
    BudgetExhausted = 0x8C,
    /// Write budget at warning threshold
    CapabilityLimited = 0x8D,
    /// Transport failure
    BusError = 0x8E,
    /// Chip refused the commit
    FirmwareProtectMode = 0x8F,
    /// Register write failed mid-programming
    FlashWriteError = 0x90,
    /// Committed image failed verification
    FlashVerifyError = 0x91,
    /// Budget did not decrease by exactly one
    CommitVerifyError = 0x92,
    /// Out of memory staging the image
    NoMem = 0xFF,
}

impl CompletionCode {
    /// Raw wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// True for the success code.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_busy_is_distinct_from_failures() {
        assert_ne!(
            UpdateError::LockBusy.completion_code(),
            UpdateError::bus("x").completion_code()
        );
        assert!(!CompletionCode::LockBusy.is_success());
    }

    #[test]
    fn image_errors_map_to_their_codes() {
        let e = UpdateError::Image(ImageError::BadSignature);
        assert_eq!(e.completion_code(), CompletionCode::SignatureInvalid);

        let e = UpdateError::Image(ImageError::HeaderCorrupt { expected: 1, computed: 2 });
        assert_eq!(e.completion_code(), CompletionCode::HeaderCrcError);
    }
}
