//! End-to-end update flows against the simulated chip.

use std::sync::Arc;
use std::time::Duration;

use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

use irps_chip::{regs, SectionMask};
use irps_image::testing::SignedImageBuilder;
use irps_updater::{
    CompletionCode, SimChip, Stage, Status, UpdateError, UpdateRequest, Updater, UpdaterConfig,
};

const SUB_MODEL: &str = "IRPS5401_U1";

fn keys() -> (RsaPrivateKey, RsaPublicKey) {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, 1024).expect("key generation");
    let public = RsaPublicKey::from(&private);
    (private, public)
}

const USER_RECORDS: &[(u16, u8, u8)] = &[
    (0x0020, 0xA5, 0xFF),
    (0x0021, 0x5A, 0xF0),
    (0x0600, 0x11, 0xFF),
    (0x1700, 0x77, 0xFF),
];

fn user_image(private: &RsaPrivateKey) -> Vec<u8> {
    let mut b = SignedImageBuilder::new(SUB_MODEL).fw_rev(0x22);
    for &(addr, value, mask) in USER_RECORDS {
        b = b.record(addr, value, mask);
    }
    b.build(private)
}

fn full_image(private: &RsaPrivateKey) -> Vec<u8> {
    let mut b = SignedImageBuilder::new(SUB_MODEL)
        .fw_rev(0x22)
        .record(0x0000, 0x01, 0xFF)
        .record(0x0001, 0x02, 0xFF);
    for &(addr, value, mask) in USER_RECORDS {
        b = b.record(addr, value, mask);
    }
    b.build(private)
}

struct Rig {
    _dir: tempfile::TempDir,
    config: UpdaterConfig,
}

fn rig(public: &RsaPublicKey, image: Option<&[u8]>) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let key_path = dir.path().join("public.pem");
    let pem = public.to_public_key_pem(LineEnding::LF).unwrap();
    std::fs::write(&key_path, pem).unwrap();
    let staging = dir.path().join("powerChip.bin");
    let working = dir.path().join("powerChip.bin_used.bin");
    if let Some(data) = image {
        // Seed both paths so tests may call update() without going
        // through the staging copy in run_request().
        std::fs::write(&staging, data).unwrap();
        std::fs::write(&working, data).unwrap();
    }
    let config = UpdaterConfig {
        staging_path: staging,
        working_path: working,
        public_key_path: key_path,
        settle: Duration::ZERO,
        terminal_dwell: Duration::ZERO,
        ..UpdaterConfig::default()
    };
    Rig { _dir: dir, config }
}

#[test]
fn user_update_end_to_end() {
    let (private, public) = keys();
    let r = rig(&public, Some(&user_image(&private)));
    let updater = Updater::new(SimChip::new(), r.config);

    let code = updater.run_request(UpdateRequest {
        instance: 0,
        mask: SectionMask::USER,
    });
    assert_eq!(code, CompletionCode::Normal);

    let report = updater.progress(0).unwrap();
    assert_eq!(report.status, Status::Idle);
    assert_eq!(report.stage, Stage::Idle);

    let sim = updater.into_bus();
    for &(addr, value, _) in USER_RECORDS {
        assert_eq!(sim.reg(addr), value, "register {addr:#06x}");
    }
    // Exactly one user cycle consumed, conf untouched.
    assert_eq!(sim.reg(regs::USER_LEFT_LO), 0b1);
    assert_eq!(sim.reg(regs::CONF_LEFT), 0);
}

#[test]
fn conf_and_user_update_consumes_both_budgets() {
    let (private, public) = keys();
    let r = rig(&public, Some(&full_image(&private)));
    let updater = Updater::new(SimChip::new(), r.config);

    let code = updater.run_request(UpdateRequest {
        instance: 0,
        mask: SectionMask::CONF.union(SectionMask::USER),
    });
    assert_eq!(code, CompletionCode::Normal);

    let sim = updater.into_bus();
    assert_eq!(sim.reg(0x0000), 0x01);
    assert_eq!(sim.reg(regs::CONF_LEFT), 0b1);
    assert_eq!(sim.reg(regs::USER_LEFT_LO), 0b1);
}

#[test]
fn conf_only_update_verifies_against_existing_user_image() {
    let (private, public) = keys();
    let r = rig(&public, Some(&full_image(&private)));
    let mut sim = SimChip::new();
    // The user registers already hold what the image carries.
    for &(addr, value, _) in USER_RECORDS {
        sim.set_reg(addr, value);
    }
    let updater = Updater::new(sim, r.config);

    let code = updater.update(0, SectionMask::CONF);
    assert_eq!(code, CompletionCode::Normal);

    let sim = updater.into_bus();
    assert_eq!(sim.reg(regs::CONF_LEFT), 0b1);
    assert_eq!(sim.reg(regs::USER_LEFT_LO), 0, "user budget must be untouched");
}

#[test]
fn old_silicon_is_rejected_before_any_write() {
    let (private, public) = keys();
    let r = rig(&public, Some(&user_image(&private)));
    let mut sim = SimChip::new();
    sim.set_silicon(regs::SILICON_VERSION_MIN - 1);
    let updater = Updater::new(sim, r.config);

    let code = updater.run_request(UpdateRequest {
        instance: 0,
        mask: SectionMask::USER,
    });
    assert_eq!(code, CompletionCode::UnsupportedSilicon);

    let report = updater.progress(0).unwrap();
    assert_eq!(report.status, Status::Fail);
    assert_eq!(report.error_code, CompletionCode::UnsupportedSilicon.as_u8());

    assert_eq!(updater.into_bus().write_count(), 0);
}

#[test]
fn exhausted_budget_blocks_the_update() {
    let (private, public) = keys();
    let r = rig(&public, Some(&user_image(&private)));
    let mut sim = SimChip::new();
    sim.set_user_used(regs::USER_WRITE_MAX);
    let updater = Updater::new(sim, r.config);

    let code = updater.update(0, SectionMask::USER);
    assert_eq!(code, CompletionCode::BudgetExhausted);
    assert_eq!(updater.into_bus().write_count(), 0);
}

#[test]
fn budget_at_warning_threshold_is_refused() {
    let (private, public) = keys();
    let r = rig(&public, Some(&user_image(&private)));
    let mut config = r.config;
    config.user_warn = 2;
    let mut sim = SimChip::new();
    sim.set_user_used(regs::USER_WRITE_MAX - 2);
    let updater = Updater::new(sim, config);

    let code = updater.update(0, SectionMask::USER);
    assert_eq!(code, CompletionCode::CapabilityLimited);
}

#[test]
fn commit_that_consumes_nothing_is_caught() {
    let (private, public) = keys();
    let r = rig(&public, Some(&user_image(&private)));
    let mut sim = SimChip::new();
    sim.fail_commit = true;
    let updater = Updater::new(sim, r.config);

    let code = updater.update(0, SectionMask::USER);
    assert_eq!(code, CompletionCode::CommitVerifyError);
}

#[test]
fn missing_done_bit_reads_as_protect_mode() {
    let (private, public) = keys();
    let r = rig(&public, Some(&user_image(&private)));
    let mut sim = SimChip::new();
    sim.suppress_done = true;
    let updater = Updater::new(sim, r.config);

    let code = updater.update(0, SectionMask::USER);
    assert_eq!(code, CompletionCode::FirmwareProtectMode);
}

#[test]
fn latched_crc_error_fails_verification() {
    let (private, public) = keys();
    let r = rig(&public, Some(&user_image(&private)));
    let mut sim = SimChip::new();
    sim.latch_crc_error = true;
    let updater = Updater::new(sim, r.config);

    let code = updater.update(0, SectionMask::USER);
    assert_eq!(code, CompletionCode::FlashVerifyError);
}

#[test]
fn corrupted_burn_fails_read_back() {
    let (private, public) = keys();
    let r = rig(&public, Some(&user_image(&private)));
    let mut sim = SimChip::new();
    sim.corrupt_on_load = vec![(0x0600, 0xFF)];
    let updater = Updater::new(sim, r.config);

    let code = updater.update(0, SectionMask::USER);
    assert_eq!(code, CompletionCode::FlashVerifyError);
}

#[test]
fn image_touching_only_volatile_registers_cannot_be_verified() {
    let (private, public) = keys();
    // Every record sits on the documented nondeterministic-register
    // list, so nothing qualifies for read-back comparison.
    let image = SignedImageBuilder::new(SUB_MODEL)
        .record(0x16F9, 0x01, 0xFF)
        .record(0x16FB, 0x02, 0xFF)
        .record(0x16FD, 0x03, 0xFF)
        .record(0x17B0, 0x04, 0xFF)
        .record(0x17BC, 0x05, 0xFF)
        .build(&private);
    let r = rig(&public, Some(&image));
    let updater = Updater::new(SimChip::new(), r.config);

    let code = updater.update(0, SectionMask::USER);
    assert_eq!(code, CompletionCode::FlashVerifyError);

    // The failure is in verification, after the commit went through.
    let sim = updater.into_bus();
    assert_eq!(sim.reg(regs::USER_LEFT_LO), 0b1);
}

#[test]
fn user_request_against_conf_only_image_is_refused() {
    let (private, public) = keys();
    let image = SignedImageBuilder::new(SUB_MODEL)
        .record(0x0000, 0x01, 0xFF)
        .record(0x0001, 0x02, 0xFF)
        .build(&private);
    let r = rig(&public, Some(&image));
    let updater = Updater::new(SimChip::new(), r.config);

    let code = updater.update(0, SectionMask::USER);
    assert_eq!(code, CompletionCode::InvalidRequest);
    assert_eq!(updater.into_bus().write_count(), 0);
}

#[test]
fn masked_out_bits_do_not_count_as_mismatches() {
    let (private, public) = keys();
    let r = rig(&public, Some(&user_image(&private)));
    let mut sim = SimChip::new();
    // 0x0021 is programmed with mask 0xF0; the low nibble is don't-care.
    sim.corrupt_on_load = vec![(0x0021, 0x0F)];
    let updater = Updater::new(sim, r.config);

    let code = updater.update(0, SectionMask::USER);
    assert_eq!(code, CompletionCode::Normal);
}

#[test]
fn image_for_another_model_is_rejected() {
    let (private, public) = keys();
    let image = SignedImageBuilder::new("XDPE12284C_U21")
        .record(0x0020, 0xA5, 0xFF)
        .build(&private);
    let r = rig(&public, Some(&image));
    let updater = Updater::new(SimChip::new(), r.config);

    let code = updater.update(0, SectionMask::USER);
    assert_eq!(code, CompletionCode::ModelMismatch);
}

#[test]
fn missing_staging_file_is_reported() {
    let (_, public) = keys();
    let r = rig(&public, None);
    let updater = Updater::new(SimChip::new(), r.config);

    let code = updater.run_request(UpdateRequest {
        instance: 0,
        mask: SectionMask::USER,
    });
    assert_eq!(code, CompletionCode::FileNotExist);
}

#[test]
fn bad_request_parameters_are_refused() {
    let (_, public) = keys();
    let r = rig(&public, None);
    let updater = Updater::new(SimChip::new(), r.config);

    assert_eq!(
        updater.update(9, SectionMask::USER),
        CompletionCode::ParamOutOfRange
    );
    assert_eq!(
        updater.update(0, SectionMask::from_bits(0)),
        CompletionCode::InvalidRequest
    );
    assert!(matches!(
        updater.progress(9),
        Err(UpdateError::ParamOutOfRange { .. })
    ));
}

#[test]
fn fw_version_reads_the_revision_register() {
    let (_, public) = keys();
    let r = rig(&public, None);
    let updater = Updater::new(SimChip::new(), r.config);
    assert_eq!(updater.fw_version(0).unwrap(), "V2.01");
}

#[test]
fn concurrent_requests_see_busy_codes() {
    let (private, public) = keys();
    let r = rig(&public, Some(&user_image(&private)));
    let mut config = r.config;
    // Slow the burn down so the main thread can observe the in-flight
    // session.
    config.settle = Duration::from_millis(150);
    let updater = Arc::new(Updater::new(SimChip::new(), config));

    let bg = {
        let u = Arc::clone(&updater);
        std::thread::spawn(move || {
            u.run_request(UpdateRequest {
                instance: 0,
                mask: SectionMask::USER,
            })
        })
    };

    // Wait until the writer is past preparation and holds the bus.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let report = updater.progress(0).unwrap();
        if matches!(
            report.stage,
            Stage::Writing | Stage::Committing | Stage::Verifying
        ) {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "update never started");
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(
        updater.update(0, SectionMask::USER),
        CompletionCode::AlreadyExecuting
    );
    assert!(matches!(updater.fw_version(0), Err(UpdateError::LockBusy)));

    assert_eq!(bg.join().unwrap(), CompletionCode::Normal);
}
