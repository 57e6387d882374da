//! Update orchestrator.
//!
//! One [`Updater`] owns the bus and the per-instance session registry.
//! [`Updater::update`] drives the full sequence for one instance: image
//! validation, precondition gating, per-section unlock + write + commit,
//! then post-write verification. The bus is held under one mutex for
//! the whole sequence; version queries take it non-blocking and report
//! [`CompletionCode::LockBusy`] instead of stalling behind an update.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use irps_chip::{
    board_instances, instance_for_sub_model, offset_of, regs, regs::nvm_cmd, InstanceInfo,
    OtpSection, SectionMask,
};
use irps_image::{count_section_records, load_public_key, FirmwareImage};
use tracing::{info, warn};

use crate::budget;
use crate::bus::{DevI2cBus, RawBus};
use crate::error::{CompletionCode, Result, UpdateError};
use crate::paged::PagedAccess;
use crate::session::{ProgressReport, SessionSlot, Stage};
use crate::verify;

/// Engine configuration. All fields have production defaults; tests
/// override the paths and zero the delays.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Where management software stages a new image.
    pub staging_path: PathBuf,
    /// Working copy the engine validates and programs from.
    pub working_path: PathBuf,
    /// PEM public key that signed images must verify against.
    pub public_key_path: PathBuf,
    /// Refuse conf updates at or below this many remaining cycles.
    pub conf_warn: u8,
    /// Refuse user updates at or below this many remaining cycles.
    pub user_warn: u8,
    /// OTP burn / load settle time.
    pub settle: Duration,
    /// How long a finished session stays visible before going idle.
    pub terminal_dwell: Duration,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            staging_path: PathBuf::from("/var/powerChip.bin"),
            working_path: PathBuf::from("/var/powerChip.bin_used.bin"),
            public_key_path: PathBuf::from("/etc/power_chip_public.pem"),
            conf_warn: 0,
            user_warn: 0,
            settle: Duration::from_millis(regs::PROGRAM_SETTLE_MS),
            terminal_dwell: Duration::from_secs(2),
        }
    }
}

/// An update request as received from management software.
#[derive(Debug, Clone, Copy)]
pub struct UpdateRequest {
    /// Target board instance.
    pub instance: u8,
    /// Sections to program.
    pub mask: SectionMask,
}

/// The update engine.
pub struct Updater<B: RawBus> {
    config: UpdaterConfig,
    bus: Mutex<B>,
    sessions: Vec<SessionSlot>,
}

impl Updater<DevI2cBus> {
    /// Open the production engine over the board's bus device.
    pub fn open(config: UpdaterConfig) -> Result<Self> {
        let info = board_instances()
            .first()
            .ok_or_else(|| UpdateError::bus("board table is empty"))?;
        let bus = DevI2cBus::open(Path::new(info.chip.bus_dev))?;
        Ok(Self::new(bus, config))
    }
}

impl<B: RawBus> Updater<B> {
    /// Build an engine over `bus`, one session slot per board instance.
    pub fn new(bus: B, config: UpdaterConfig) -> Self {
        let sessions = board_instances()
            .iter()
            .map(|_| SessionSlot::default())
            .collect();
        Self {
            config,
            bus: Mutex::new(bus),
            sessions,
        }
    }

    /// Tear down the engine and recover the bus. Test hook.
    pub fn into_bus(self) -> B {
        self.bus
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle a staged update request end to end: check the staging
    /// file, snapshot it to the working path, then run the update.
    pub fn run_request(&self, req: UpdateRequest) -> CompletionCode {
        info!(
            target: "audit",
            instance = req.instance,
            mask = req.mask.bits(),
            "firmware update requested"
        );
        if !self.config.staging_path.exists() {
            warn!(
                target: "audit",
                path = %self.config.staging_path.display(),
                "staging image missing"
            );
            return CompletionCode::FileNotExist;
        }
        if let Err(e) = std::fs::copy(&self.config.staging_path, &self.config.working_path) {
            warn!(
                target: "audit",
                path = %self.config.staging_path.display(),
                error = %e,
                "failed to snapshot staging image"
            );
            return CompletionCode::ReadError;
        }
        self.update(req.instance, req.mask)
    }

    /// Run a full update of `mask` on `instance`.
    pub fn update(&self, instance: u8, mask: SectionMask) -> CompletionCode {
        if usize::from(instance) >= self.sessions.len() {
            warn!(target: "audit", instance, "update refused, instance out of range");
            return CompletionCode::ParamOutOfRange;
        }
        if mask.is_empty() {
            warn!(target: "audit", instance, "update refused, no section requested");
            return CompletionCode::InvalidRequest;
        }
        let slot = &self.sessions[usize::from(instance)];
        if !slot.try_begin() {
            warn!(target: "audit", instance, "update refused, already executing");
            return CompletionCode::AlreadyExecuting;
        }
        match self.run_update(instance, mask, slot) {
            Ok(()) => {
                slot.succeed();
                info!(target: "audit", instance, "firmware update verified");
                std::thread::sleep(self.config.terminal_dwell);
                slot.finish();
                CompletionCode::Normal
            }
            Err(e) => {
                let code = e.completion_code();
                warn!(
                    target: "audit",
                    instance,
                    code = code.as_u8(),
                    error = %e,
                    "firmware update failed"
                );
                slot.fail(code);
                code
            }
        }
    }

    /// Snapshot an instance's session without touching the bus.
    pub fn progress(&self, instance: u8) -> Result<ProgressReport> {
        let slot = self
            .sessions
            .get(usize::from(instance))
            .ok_or(UpdateError::ParamOutOfRange {
                instance,
                count: self.sessions.len(),
            })?;
        Ok(slot.report())
    }

    /// Read the running firmware version, e.g. `V2.01`. Non-blocking:
    /// returns [`UpdateError::LockBusy`] while an update holds the bus.
    pub fn fw_version(&self, instance: u8) -> Result<String> {
        let info = self.instance_info(instance)?;
        let mut bus = match self.bus.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(UpdateError::LockBusy),
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
        };
        let mut paged = PagedAccess::new(&mut *bus, &info.chip);
        read_fw_version(&mut paged)
    }

    fn instance_info(&self, instance: u8) -> Result<&'static InstanceInfo> {
        board_instances()
            .get(usize::from(instance))
            .ok_or(UpdateError::ParamOutOfRange {
                instance,
                count: self.sessions.len(),
            })
    }

    fn lock_bus(&self) -> MutexGuard<'_, B> {
        self.bus.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn warn_threshold(&self, section: OtpSection) -> u8 {
        match section {
            OtpSection::Conf => self.config.conf_warn,
            OtpSection::User => self.config.user_warn,
        }
    }

    fn run_update(&self, instance: u8, mask: SectionMask, slot: &SessionSlot) -> Result<()> {
        let mut bus = self.lock_bus();

        let key = load_public_key(&self.config.public_key_path)?;
        let image = FirmwareImage::load(&self.config.working_path, &key)?;

        let info = instance_for_sub_model(&image.sub_model()).ok_or_else(|| {
            UpdateError::SubModelUnknown {
                tag: image.sub_model(),
            }
        })?;
        if info.instance != instance {
            return Err(UpdateError::InstanceMismatch {
                requested: instance,
                image: info.instance,
            });
        }

        let mut paged = PagedAccess::new(&mut *bus, &info.chip);

        let silicon = paged.read_byte(regs::SILICON_VERSION)?;
        if silicon < regs::SILICON_VERSION_MIN {
            return Err(UpdateError::UnsupportedSilicon {
                found: silicon,
                min: regs::SILICON_VERSION_MIN,
            });
        }
        let running = read_fw_version(&mut paged)?;
        info!(
            instance,
            running = %running,
            staged = %image.header().fw_rev_string(),
            "starting firmware update"
        );

        // Gate every requested section before any register is written,
        // so a doomed two-section request burns nothing.
        for section in mask.sections() {
            let remaining = budget::read_remaining(&mut paged, section)?;
            budget::gate(section, remaining, self.warn_threshold(section))?;
        }

        let mut user_snapshot = None;
        for section in mask.sections() {
            let pre_commit = self.program_section(&mut paged, &image, section, slot)?;
            if section == OtpSection::User {
                user_snapshot = Some(pre_commit);
            }
        }

        slot.set_stage(Stage::Verifying);
        // The image number the chip just burned: budget cycles consumed
        // before the commit. Without a user commit this session, fall
        // back to the newest existing image.
        let image_number = match user_snapshot {
            Some(pre_commit) => regs::USER_WRITE_MAX - pre_commit,
            None => {
                let remaining = budget::read_remaining(&mut paged, OtpSection::User)?;
                (regs::USER_WRITE_MAX - remaining).saturating_sub(1)
            }
        };
        verify::run(&mut paged, &image, image_number, self.config.settle, slot)
    }

    /// Unlock, stream and commit one section. Returns the remaining
    /// write budget as read just before the commit was issued.
    fn program_section(
        &self,
        paged: &mut PagedAccess<'_, B>,
        image: &FirmwareImage,
        section: OtpSection,
        slot: &SessionSlot,
    ) -> Result<u8> {
        let total = count_section_records(image.records(), section);
        if total == 0 {
            return Err(UpdateError::NoSectionData { section });
        }

        slot.set_stage(Stage::Writing);
        info!(%section, records = total, "programming section");

        self.unlock(paged)?;

        let mut written = 0usize;
        for group in image.section_groups(section) {
            if group.records.is_empty() {
                continue;
            }
            paged.set_page(group.row.page)?;
            for rec in &group.records {
                paged
                    .write_offset(offset_of(rec.addr), rec.value)
                    .map_err(|e| {
                        warn!(addr = format_args!("{:#06x}", rec.addr), error = %e, "register write failed");
                        UpdateError::FlashWrite { addr: rec.addr }
                    })?;
                written += 1;
                slot.set_progress((written * 100 / total) as u8);
            }
        }

        slot.set_stage(Stage::Committing);
        self.commit(paged, section)
    }

    /// Programming unlock handshake, all on page 0: clear the address
    /// lock, present the trim password if the chip has not seen it yet,
    /// then clear the vendor's undocumented gate register.
    fn unlock(&self, paged: &mut PagedAccess<'_, B>) -> Result<()> {
        paged.set_page(0)?;
        paged.write_offset(offset_of(regs::LOCK), 0x00)?;
        let passwd = paged.read_offset(offset_of(regs::PASSWD))?;
        if passwd & regs::PASSWD_UNLOCKED == 0 {
            paged.write_offset(offset_of(regs::TRIM_PWD0), regs::TRIM_PWD0_VALUE)?;
            paged.write_offset(offset_of(regs::TRIM_PWD1), regs::TRIM_PWD1_VALUE)?;
        }
        paged.write_offset(offset_of(regs::REG_0B), 0x00)?;
        Ok(())
    }

    /// Burn the staged register map into the next OTP image and confirm
    /// the chip consumed exactly one budget cycle.
    fn commit(&self, paged: &mut PagedAccess<'_, B>, section: OtpSection) -> Result<u8> {
        let remaining = budget::read_remaining(paged, section)?;
        if remaining == 0 {
            // Rechecked here because the writes above took real time and
            // another master may share the bus.
            return Err(UpdateError::BudgetExhausted { section });
        }
        let image_number = section.write_max() - remaining;
        let opcode = match section {
            OtpSection::Conf => nvm_cmd::RESTORE_CONF,
            OtpSection::User => nvm_cmd::RESTORE_USER,
        };
        info!(%section, image = image_number, "committing register map to OTP");
        let word = (u16::from(image_number) << 8) | u16::from(opcode);
        paged.write_word(regs::NVM_CMD, word)?;
        std::thread::sleep(self.config.settle);

        let status = paged.read_byte(regs::NVM_CMD_STATUS)?;
        if status & nvm_cmd::STATUS_DONE == 0 {
            return Err(UpdateError::FirmwareProtectMode { section });
        }
        let after = budget::read_remaining(paged, section)?;
        let expected = remaining - 1;
        if after != expected {
            return Err(UpdateError::CommitVerify {
                section,
                before: remaining,
                after,
                expected,
            });
        }
        Ok(remaining)
    }
}

/// Read and format the running firmware revision register.
pub fn read_fw_version<B: RawBus>(paged: &mut PagedAccess<'_, B>) -> Result<String> {
    let v = paged.read_byte(regs::VERSION)?;
    Ok(format!("V{}.{:02}", v >> 4, v & 0x0F))
}
