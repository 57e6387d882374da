//! Container validation against deliberately damaged images.

use bytes::Bytes;
use rsa::{RsaPrivateKey, RsaPublicKey};

use irps_image::header::{DIGEST_SIGN_SIZE, HDR_CRC_OFFSET, HEADER_SIZE};
use irps_image::testing::SignedImageBuilder;
use irps_image::{FirmwareImage, ImageError};

fn test_key() -> (RsaPrivateKey, RsaPublicKey) {
    let mut rng = rand::thread_rng();
    // 1024-bit to match the 128-byte detached signature field.
    let private = RsaPrivateKey::new(&mut rng, 1024).expect("key generation");
    let public = RsaPublicKey::from(&private);
    (private, public)
}

fn sample_image(key: &RsaPrivateKey) -> Vec<u8> {
    SignedImageBuilder::new("IRPS5401_U1")
        .fw_rev(0x21)
        .record(0x0000, 0x11, 0xFF)
        .record(0x0001, 0x22, 0xFF)
        .record(0x0020, 0x33, 0x0F)
        .record(0x003B, 0x44, 0xFF)
        .build(key)
}

#[test]
fn pristine_image_validates() {
    let (private, public) = test_key();
    let data = sample_image(&private);

    let image = FirmwareImage::from_bytes(Bytes::from(data), &public).unwrap();
    assert_eq!(image.sub_model(), "IRPS5401_U1");
    assert_eq!(image.fw_rev(), 0x21);
    assert_eq!(image.records().len(), 4);
    assert_eq!(image.header().fw_rev_string(), "V2.01");
}

#[test]
fn every_header_bit_flip_is_caught() {
    let (private, public) = test_key();
    let pristine = sample_image(&private);

    // Walk a sample of bit positions across the CRC-covered header
    // bytes; each single flip must fail validation.
    for byte in (0..HDR_CRC_OFFSET).step_by(7) {
        let mut data = pristine.clone();
        data[byte] ^= 0x01;
        let err = FirmwareImage::from_bytes(Bytes::from(data), &public).unwrap_err();
        assert!(
            matches!(err, ImageError::HeaderCorrupt { .. }),
            "flip at byte {byte} gave {err:?}"
        );
    }
}

#[test]
fn payload_truncation_fails_size_check() {
    let (private, public) = test_key();
    let mut data = sample_image(&private);
    data.remove(HEADER_SIZE); // drop one payload byte

    let err = FirmwareImage::from_bytes(Bytes::from(data), &public).unwrap_err();
    assert!(matches!(err, ImageError::SizeMismatch { .. }), "got {err:?}");
}

#[test]
fn payload_extension_fails_size_check() {
    let (private, public) = test_key();
    let mut data = sample_image(&private);
    data.insert(HEADER_SIZE, 0x00);

    let err = FirmwareImage::from_bytes(Bytes::from(data), &public).unwrap_err();
    assert!(matches!(err, ImageError::SizeMismatch { .. }), "got {err:?}");
}

#[test]
fn payload_corruption_fails_crc() {
    let (private, public) = test_key();
    let mut data = sample_image(&private);
    data[HEADER_SIZE + 2] ^= 0xFF; // flip a record value in place

    let err = FirmwareImage::from_bytes(Bytes::from(data), &public).unwrap_err();
    assert!(matches!(err, ImageError::PayloadCorrupt { .. }), "got {err:?}");
}

#[test]
fn signature_from_wrong_key_is_rejected() {
    let (private, _) = test_key();
    let (_, other_public) = test_key();
    let data = sample_image(&private);

    let err = FirmwareImage::from_bytes(Bytes::from(data), &other_public).unwrap_err();
    assert!(matches!(err, ImageError::SignatureInvalid { .. }), "got {err:?}");
}

#[test]
fn tampered_signature_is_rejected() {
    let (private, public) = test_key();
    let mut data = sample_image(&private);
    let sig_start = data.len() - DIGEST_SIGN_SIZE;
    data[sig_start] ^= 0x80;

    let err = FirmwareImage::from_bytes(Bytes::from(data), &public).unwrap_err();
    assert!(matches!(err, ImageError::SignatureInvalid { .. }), "got {err:?}");
}

#[test]
fn wrong_identity_tag_is_rejected() {
    let (private, public) = test_key();
    let mut data = sample_image(&private);
    data[0] = b'#';
    // Keep the header internally consistent so only the tag check trips.
    let crc = irps_image::crc32(&data[..HDR_CRC_OFFSET]);
    data[HDR_CRC_OFFSET..HEADER_SIZE].copy_from_slice(&crc.to_le_bytes());

    let err = FirmwareImage::from_bytes(Bytes::from(data), &public).unwrap_err();
    assert!(matches!(err, ImageError::BadSignature), "got {err:?}");
}

#[test]
fn load_reports_missing_file() {
    let (_, public) = test_key();
    let dir = tempfile::tempdir().unwrap();
    let err = FirmwareImage::load(&dir.path().join("nope.bin"), &public).unwrap_err();
    assert!(matches!(err, ImageError::FileNotFound { .. }));
}

#[test]
fn load_round_trips_through_a_file() {
    let (private, public) = test_key();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("powerChip.bin");
    std::fs::write(&path, sample_image(&private)).unwrap();

    let image = FirmwareImage::load(&path, &public).unwrap();
    assert_eq!(image.records().len(), 4);
}
