//! Firmware image loading and validation.
//!
//! All checks run before any hardware is touched, in a fixed order:
//! header CRC32, identity tag, product tag, total size, payload CRC32,
//! then the RSA digest signature over everything preceding it. A file
//! that fails any step never reaches the bus.

use std::path::Path;

use bytes::Bytes;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{ImageError, Result};
use crate::header::{
    crc32, tag_str, ImageHeader, DEVMODEL_TAG, DIGEST_SIGN_SIZE, HDR_CRC_OFFSET, IMAGE_SIZE_MAX,
    SIGNATURE_TAG,
};
use crate::records::{parse_records, RegisterRecord, SectionGroups};
use irps_chip::OtpSection;

/// A fully validated firmware image.
///
/// Immutable once constructed; owns the raw file bytes (`Bytes`, so the
/// payload view is zero-copy) plus the decoded header and record
/// stream. Lives for one update attempt and is dropped with the
/// session — never cached across attempts.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    data: Bytes,
    header: ImageHeader,
    records: Vec<RegisterRecord>,
}

impl FirmwareImage {
    /// Read and validate a container file.
    ///
    /// # Errors
    ///
    /// Returns the first failed check, in the validation order above;
    /// [`ImageError::FileNotFound`] / [`ImageError::OversizeImage`] for
    /// staging problems detected before the read.
    pub fn load(path: &Path, public_key: &RsaPublicKey) -> Result<Self> {
        if !path.exists() {
            return Err(ImageError::FileNotFound { path: path.into() });
        }

        let size = std::fs::metadata(path)?.len();
        if size > IMAGE_SIZE_MAX {
            warn!("Firmware image {} is {size} bytes, over limit", path.display());
            return Err(ImageError::OversizeImage { size, max: IMAGE_SIZE_MAX });
        }
        info!("Firmware image {} is {size} bytes", path.display());

        let data = Bytes::from(std::fs::read(path)?);
        Self::from_bytes(data, public_key)
    }

    /// Validate an in-memory container.
    ///
    /// # Errors
    ///
    /// Returns the first failed check in validation order.
    pub fn from_bytes(data: Bytes, public_key: &RsaPublicKey) -> Result<Self> {
        let header = ImageHeader::parse(&data)?;

        let computed = crc32(&data[..HDR_CRC_OFFSET]);
        if header.hdr_crc32 != computed {
            return Err(ImageError::HeaderCorrupt { expected: header.hdr_crc32, computed });
        }

        if &header.signature[..SIGNATURE_TAG.len()] != SIGNATURE_TAG.as_bytes() {
            return Err(ImageError::BadSignature);
        }

        if &header.dev_model[..DEVMODEL_TAG.len()] != DEVMODEL_TAG.as_bytes() {
            return Err(ImageError::ModelMismatch {
                found: tag_str(&header.dev_model),
                expected: DEVMODEL_TAG.into(),
            });
        }

        let expected_size =
            header.img_offset as usize + header.img_size as usize + DIGEST_SIGN_SIZE;
        if data.len() != expected_size {
            return Err(ImageError::SizeMismatch { expected: expected_size, actual: data.len() });
        }

        let payload_start = header.img_offset as usize;
        let payload_end = payload_start + header.img_size as usize;
        let computed = crc32(&data[payload_start..payload_end]);
        if header.img_crc32 != computed {
            return Err(ImageError::PayloadCorrupt { expected: header.img_crc32, computed });
        }

        let signed_len = data.len() - DIGEST_SIGN_SIZE;
        let digest = Sha256::digest(&data[..signed_len]);
        public_key
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &data[signed_len..])
            .map_err(|e| ImageError::signature_invalid(e.to_string()))?;

        let records = parse_records(&data[payload_start..payload_end])?;
        debug!(
            "Validated image: sub-model {}, rev {}, {} records",
            tag_str(&header.sub_model),
            header.fw_rev_string(),
            records.len()
        );

        Ok(Self { data, header, records })
    }

    /// Decoded header.
    #[must_use]
    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    /// Sub-model tag string from the header.
    #[must_use]
    pub fn sub_model(&self) -> String {
        self.header.sub_model_str()
    }

    /// Firmware revision byte.
    #[must_use]
    pub fn fw_rev(&self) -> u8 {
        self.header.fw_rev
    }

    /// Decoded register records, payload order.
    #[must_use]
    pub fn records(&self) -> &[RegisterRecord] {
        &self.records
    }

    /// Payload bytes (zero-copy view).
    #[must_use]
    pub fn payload(&self) -> Bytes {
        let start = self.header.img_offset as usize;
        self.data.slice(start..start + self.header.img_size as usize)
    }

    /// Lazy per-row grouping of the records for one OTP section.
    #[must_use]
    pub fn section_groups(&self, section: OtpSection) -> SectionGroups<'_> {
        SectionGroups::new(&self.records, section)
    }
}

/// Load the image-signing public key from a PEM file.
///
/// Accepts both SubjectPublicKeyInfo (`BEGIN PUBLIC KEY`) and PKCS#1
/// (`BEGIN RSA PUBLIC KEY`) encodings.
///
/// # Errors
///
/// Returns [`ImageError::PublicKey`] if the file is missing or neither
/// encoding parses.
pub fn load_public_key(path: &Path) -> Result<RsaPublicKey> {
    let pem = std::fs::read_to_string(path)
        .map_err(|e| ImageError::public_key(path, e.to_string()))?;

    RsaPublicKey::from_public_key_pem(&pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(&pem))
        .map_err(|e| ImageError::public_key(path, e.to_string()))
}
