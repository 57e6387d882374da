//! Test-only image synthesis (`test-util` feature).
//!
//! Builds well-formed, signed container files so the engine can be
//! exercised end to end without the external image builder tool.

use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha256};

use crate::header::{make_tag, ImageHeader, DEVMODEL_TAG, HEADER_SIZE, SIGNATURE_TAG};
use crate::records::RegisterRecord;

/// Builder for signed firmware containers.
#[derive(Debug, Clone)]
pub struct SignedImageBuilder {
    sub_model: String,
    fw_rev: u8,
    records: Vec<RegisterRecord>,
}

impl SignedImageBuilder {
    /// Start a builder for the given sub-model tag.
    #[must_use]
    pub fn new(sub_model: &str) -> Self {
        Self {
            sub_model: sub_model.to_owned(),
            fw_rev: 0x10,
            records: Vec::new(),
        }
    }

    /// Set the firmware revision byte.
    #[must_use]
    pub fn fw_rev(mut self, rev: u8) -> Self {
        self.fw_rev = rev;
        self
    }

    /// Append one register record.
    #[must_use]
    pub fn record(mut self, addr: u16, value: u8, mask: u8) -> Self {
        self.records.push(RegisterRecord { addr, value, mask });
        self
    }

    /// Append many records.
    #[must_use]
    pub fn records(mut self, recs: impl IntoIterator<Item = RegisterRecord>) -> Self {
        self.records.extend(recs);
        self
    }

    /// Assemble and sign the container with `key`.
    #[must_use]
    pub fn build(&self, key: &RsaPrivateKey) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.records.len() * 4);
        for r in &self.records {
            payload.extend_from_slice(&r.addr.to_le_bytes());
            payload.push(r.value);
            payload.push(r.mask);
        }

        #[allow(clippy::cast_possible_truncation)]
        let mut header = ImageHeader {
            signature: make_tag(SIGNATURE_TAG),
            dev_model: make_tag(DEVMODEL_TAG),
            sub_model: make_tag(&self.sub_model),
            fw_rev: self.fw_rev,
            img_offset: HEADER_SIZE as u32,
            img_size: payload.len() as u32,
            img_crc32: crate::header::crc32(&payload),
            sig_offset: (HEADER_SIZE + payload.len()) as u32,
            hdr_crc32: 0,
        };
        header.seal();

        let mut out = header.to_bytes().to_vec();
        out.extend_from_slice(&payload);

        let digest = Sha256::digest(&out);
        let sig = key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .expect("test image signing");
        out.extend_from_slice(&sig);
        out
    }
}
