//! Firmware container codec and validator for IRPS5401 OTP images.
//!
//! The container is a fixed little-endian layout: a 128-byte header with
//! its own CRC32, a payload of `(addr, value, mask)` register records
//! covered by a second CRC32, and a detached 128-byte RSA PKCS#1 v1.5
//! signature over the SHA-256 digest of everything before it.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use irps_image::{load_public_key, FirmwareImage};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let key = load_public_key(Path::new("/etc/power_chip_public.pem"))?;
//! let image = FirmwareImage::load(Path::new("/var/powerChip.bin"), &key)?;
//!
//! println!("sub-model: {}", image.sub_model());
//! println!("records:   {}", image.records().len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod error;
pub mod header;
mod image;
mod records;
#[cfg(feature = "test-util")]
pub mod testing;

pub use error::{ImageError, Result};
pub use header::{crc32, make_tag, ImageHeader};
pub use image::{load_public_key, FirmwareImage};
pub use records::{count_section_records, RegisterRecord, SectionGroup, SectionGroups, RECORD_SIZE};
