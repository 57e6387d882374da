//! Post-write verification.
//!
//! After a commit the register map may still hold staged values, so the
//! committed image is first loaded back from OTP, refreshing the chip's
//! own CRC status. The whole register space is then swept into a shadow
//! buffer with one page select per page, and every user-section record
//! of the image is compared through its mask. Registers of disabled
//! rails and the documented volatile registers are skipped.
//!
//! Progress weighting: load 10%, sweep 80%, compare 10%.

use std::time::Duration;

use irps_chip::{offset_of, page_of, regs, regs::nvm_cmd, OtpSection};
use irps_image::FirmwareImage;
use tracing::{debug, error, info, warn};

use crate::bus::RawBus;
use crate::error::{Result, UpdateError};
use crate::paged::PagedAccess;
use crate::rails::RailEnable;
use crate::session::SessionSlot;

const REG_COUNT: usize = regs::REG_END as usize + 1;

/// Verify the committed user image number `image_number` against the
/// records carried in `image`.
pub(crate) fn run<B: RawBus>(
    paged: &mut PagedAccess<'_, B>,
    image: &FirmwareImage,
    image_number: u8,
    settle: Duration,
    slot: &SessionSlot,
) -> Result<()> {
    let rails = RailEnable::detect(paged)?;

    let total: usize = image
        .section_groups(OtpSection::User)
        .map(|g| {
            g.records
                .iter()
                .filter(|r| rails.verification_required(r.addr))
                .count()
        })
        .sum();
    if total == 0 {
        return Err(UpdateError::NoVerifiableRegisters);
    }

    // Reload the committed image so the sweep reads what was burned,
    // not what programming left in the register map.
    let word = (u16::from(image_number) << 8) | u16::from(nvm_cmd::LOAD_USER);
    paged.write_word(regs::NVM_CMD, word)?;
    std::thread::sleep(settle);
    let status = paged.read_byte(regs::NVM_CMD_STATUS)?;
    if status & nvm_cmd::STATUS_DONE == 0 {
        // Loads are occasionally slow to raise done; give it one more
        // settle window before trusting the CRC status.
        warn!(status, "image load still busy after settle, extending");
        std::thread::sleep(settle);
    }
    let nvram = paged.read_byte(regs::NVRAM_IMAGE)?;
    if nvram & regs::NVRAM_CRC_ERROR != 0 {
        error!(
            target: "audit",
            image = image_number,
            "chip latched a CRC error against the committed image"
        );
        return Err(UpdateError::FlashVerify);
    }
    slot.set_progress(10);

    let mut shadow = vec![0u8; REG_COUNT];
    let mut current = None;
    for addr in regs::REG_START..=regs::REG_END {
        let page = page_of(addr);
        if current != Some(page) {
            paged.set_page(page)?;
            current = Some(page);
        }
        shadow[usize::from(addr)] = paged.read_offset(offset_of(addr))?;
        if offset_of(addr) == 0xFF {
            slot.set_progress(10 + (usize::from(addr) * 80 / REG_COUNT) as u8);
        }
    }
    slot.set_progress(90);

    let mut checked = 0usize;
    let mut mismatches = 0usize;
    for group in image.section_groups(OtpSection::User) {
        for rec in &group.records {
            if !rails.verification_required(rec.addr) {
                continue;
            }
            let read = shadow[usize::from(rec.addr)];
            if (read ^ rec.value) & rec.mask != 0 {
                debug!(
                    addr = format_args!("{:#06x}", rec.addr),
                    wrote = rec.value,
                    read,
                    mask = rec.mask,
                    "verify mismatch"
                );
                mismatches += 1;
            }
            checked += 1;
            slot.set_progress(90 + (checked * 10 / total) as u8);
        }
    }
    if mismatches > 0 {
        return Err(UpdateError::VerifyMismatch { count: mismatches });
    }
    info!(checked, image = image_number, "verification clean");
    slot.set_progress(100);
    Ok(())
}
