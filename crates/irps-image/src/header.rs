//! Container header codec.
//!
//! The firmware container starts with a fixed 128-byte header, all
//! multi-byte fields little-endian:
//!
//! | Offset | Field     | Size | Meaning                              |
//! |--------|-----------|------|--------------------------------------|
//! | 0      | Signature | 16   | fixed ASCII identity tag             |
//! | 16     | DevModel  | 16   | fixed ASCII product tag              |
//! | 32     | SubModel  | 16   | chip-variant tag, e.g. `IRPS5401_U1` |
//! | 48     | FwRev     | 1    | firmware revision byte               |
//! | 49     | ImgOffset | 4    | payload start offset                 |
//! | 53     | ImgSize   | 4    | payload length                       |
//! | 57     | ImgCRC32  | 4    | CRC32 of the payload                 |
//! | 61     | SigOffset | 4    | `ImgOffset + ImgSize`                |
//! | 65     | Reserved  | 59   | zero-filled                          |
//! | 124    | HdrCRC32  | 4    | CRC32 of bytes `[0, 124)`            |

use crate::error::{ImageError, Result};

/// Fixed identity tag every container must carry.
pub const SIGNATURE_TAG: &str = "$FW@MyCompany";
/// Product tag identifying regulator firmware for this board family.
pub const DEVMODEL_TAG: &str = "MYDEV_POWER";

/// Length of each ASCII tag field.
pub const TAG_LEN: usize = 16;
/// Total header size in bytes.
pub const HEADER_SIZE: usize = 128;
/// Offset of the trailing header CRC; the CRC covers `[0, this)`.
pub const HDR_CRC_OFFSET: usize = 124;
/// Size of the detached RSA digest signature at the end of the file.
pub const DIGEST_SIGN_SIZE: usize = 128;
/// Largest container file accepted.
pub const IMAGE_SIZE_MAX: u64 = 100 * 1024;

const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// CRC32 as used throughout the container (ISO-HDLC: reflected
/// 0xEDB88320, seed and xorout 0xFFFFFFFF).
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Decoded container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHeader {
    /// Identity tag bytes.
    pub signature: [u8; TAG_LEN],
    /// Product tag bytes.
    pub dev_model: [u8; TAG_LEN],
    /// Chip-variant tag bytes.
    pub sub_model: [u8; TAG_LEN],
    /// Firmware revision; high nibble major, low nibble minor.
    pub fw_rev: u8,
    /// Payload start offset in the file.
    pub img_offset: u32,
    /// Payload length in bytes.
    pub img_size: u32,
    /// CRC32 of the payload bytes.
    pub img_crc32: u32,
    /// Offset of the detached signature, `img_offset + img_size`.
    pub sig_offset: u32,
    /// CRC32 of header bytes `[0, 124)`.
    pub hdr_crc32: u32,
}

impl ImageHeader {
    /// Decode a header from the front of `data`.
    ///
    /// Structural only — tag and CRC checks live with the image
    /// validator, which applies them in the mandated order.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::Truncated`] if `data` cannot hold a header
    /// and a detached signature.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE + DIGEST_SIGN_SIZE {
            return Err(ImageError::Truncated { size: data.len() });
        }

        let mut signature = [0u8; TAG_LEN];
        let mut dev_model = [0u8; TAG_LEN];
        let mut sub_model = [0u8; TAG_LEN];
        signature.copy_from_slice(&data[0..16]);
        dev_model.copy_from_slice(&data[16..32]);
        sub_model.copy_from_slice(&data[32..48]);

        Ok(Self {
            signature,
            dev_model,
            sub_model,
            fw_rev: data[48],
            img_offset: read_u32(data, 49),
            img_size: read_u32(data, 53),
            img_crc32: read_u32(data, 57),
            sig_offset: read_u32(data, 61),
            hdr_crc32: read_u32(data, HDR_CRC_OFFSET),
        })
    }

    /// Encode the header back into its 128-byte wire form.
    ///
    /// `hdr_crc32` is written as stored; call [`Self::seal`] first to
    /// recompute it when building an image.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..16].copy_from_slice(&self.signature);
        out[16..32].copy_from_slice(&self.dev_model);
        out[32..48].copy_from_slice(&self.sub_model);
        out[48] = self.fw_rev;
        out[49..53].copy_from_slice(&self.img_offset.to_le_bytes());
        out[53..57].copy_from_slice(&self.img_size.to_le_bytes());
        out[57..61].copy_from_slice(&self.img_crc32.to_le_bytes());
        out[61..65].copy_from_slice(&self.sig_offset.to_le_bytes());
        out[HDR_CRC_OFFSET..].copy_from_slice(&self.hdr_crc32.to_le_bytes());
        out
    }

    /// Recompute `hdr_crc32` over the encoded header bytes.
    pub fn seal(&mut self) {
        let encoded = self.to_bytes();
        self.hdr_crc32 = crc32(&encoded[..HDR_CRC_OFFSET]);
    }

    /// Sub-model tag as a string, trailing NULs stripped.
    #[must_use]
    pub fn sub_model_str(&self) -> String {
        tag_str(&self.sub_model)
    }

    /// Firmware revision rendered the way the chip reports it:
    /// `V{major}.{minor:02}` from the revision nibbles.
    #[must_use]
    pub fn fw_rev_string(&self) -> String {
        format!("V{}.{:02}", self.fw_rev >> 4, self.fw_rev & 0x0F)
    }
}

/// Render a fixed tag field, stopping at the first NUL.
#[must_use]
pub fn tag_str(tag: &[u8]) -> String {
    let end = tag.iter().position(|&b| b == 0).unwrap_or(tag.len());
    String::from_utf8_lossy(&tag[..end]).into_owned()
}

/// Write an ASCII tag into a fixed field, NUL-padded.
#[must_use]
pub fn make_tag(s: &str) -> [u8; TAG_LEN] {
    let mut out = [0u8; TAG_LEN];
    let bytes = s.as_bytes();
    let n = bytes.len().min(TAG_LEN);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_reference_vector() {
        // ISO-HDLC check value
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn header_round_trip() {
        let mut hdr = ImageHeader {
            signature: make_tag(SIGNATURE_TAG),
            dev_model: make_tag(DEVMODEL_TAG),
            sub_model: make_tag("IRPS5401_U1"),
            fw_rev: 0x12,
            img_offset: 128,
            img_size: 64,
            img_crc32: 0xDEAD_BEEF,
            sig_offset: 192,
            hdr_crc32: 0,
        };
        hdr.seal();

        let mut wire = hdr.to_bytes().to_vec();
        wire.extend_from_slice(&[0u8; 64 + DIGEST_SIGN_SIZE]);
        let parsed = ImageHeader::parse(&wire).unwrap();
        assert_eq!(parsed, hdr);
        assert_eq!(parsed.sub_model_str(), "IRPS5401_U1");
        assert_eq!(parsed.fw_rev_string(), "V1.02");
    }

    #[test]
    fn truncated_input_rejected() {
        assert!(matches!(
            ImageHeader::parse(&[0u8; HEADER_SIZE]),
            Err(ImageError::Truncated { .. })
        ));
    }
}
