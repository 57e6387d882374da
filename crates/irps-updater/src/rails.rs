//! Rail-enable overlay.
//!
//! The static rail topology in [`irps_chip`] says which address range
//! belongs to which loop; whether a loop is actually active on this
//! board is runtime state read from two control registers at the start
//! of each verification pass. Registers of a disabled loop read back as
//! whatever the hardware left there, so the verifier must skip them.

use irps_chip::{rail_section_of, regs, RailSection, VERIFY_IGNORED_REGS};
use tracing::debug;

use crate::bus::RawBus;
use crate::error::Result;
use crate::paged::PagedAccess;

/// Snapshot of which rails are enabled, valid for one session.
#[derive(Debug, Clone, Copy)]
pub struct RailEnable {
    switch_en: u8,
    combine: u8,
}

impl RailEnable {
    /// Build the overlay from raw register values.
    #[must_use]
    pub fn from_registers(switch_en: u8, combine: u8) -> Self {
        Self { switch_en, combine }
    }

    /// Read the overlay from the chip.
    pub fn detect<B: RawBus>(paged: &mut PagedAccess<'_, B>) -> Result<Self> {
        let switch_en = paged.read_byte(regs::SWITCH_EN)?;
        let combine = paged.read_byte(regs::SWITCH_COMBINE)?;
        let overlay = Self::from_registers(switch_en, combine);
        debug!(switch_en, combine, "rail enable overlay");
        Ok(overlay)
    }

    /// Whether `rail` is enabled on this board.
    ///
    /// The common section is always enabled. Loop D is additionally
    /// disabled when the combine bit routes it through another loop.
    #[must_use]
    pub fn enabled(&self, rail: RailSection) -> bool {
        let Some(bit) = rail.disable_bit() else {
            return true;
        };
        if self.switch_en & bit != 0 {
            return false;
        }
        rail != RailSection::LoopD || self.combine & (1 << 4) == 0
    }

    /// Whether a register at `addr` takes part in verification.
    ///
    /// Excluded: registers of disabled rails and the fixed ignore list
    /// of volatile trim registers.
    #[must_use]
    pub fn verification_required(&self, addr: u16) -> bool {
        if VERIFY_IGNORED_REGS.contains(&addr) {
            return false;
        }
        self.enabled(rail_section_of(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_rails_enabled_by_default() {
        let overlay = RailEnable::from_registers(0, 0);
        for rail in [
            RailSection::Common,
            RailSection::LoopA,
            RailSection::LoopB,
            RailSection::LoopC,
            RailSection::LoopD,
            RailSection::Ldo,
        ] {
            assert!(overlay.enabled(rail), "{rail:?}");
        }
    }

    #[test]
    fn switch_en_bits_disable_loops() {
        let overlay = RailEnable::from_registers(0b0_0101, 0);
        assert!(!overlay.enabled(RailSection::LoopA));
        assert!(overlay.enabled(RailSection::LoopB));
        assert!(!overlay.enabled(RailSection::LoopC));
        assert!(overlay.enabled(RailSection::Common));
    }

    #[test]
    fn combine_bit_disables_loop_d_only() {
        let overlay = RailEnable::from_registers(0, 1 << 4);
        assert!(!overlay.enabled(RailSection::LoopD));
        assert!(overlay.enabled(RailSection::LoopC));
        assert!(overlay.enabled(RailSection::Ldo));
    }

    #[test]
    fn verification_skips_ignored_registers() {
        let overlay = RailEnable::from_registers(0, 0);
        for &addr in VERIFY_IGNORED_REGS {
            assert!(!overlay.verification_required(addr), "{addr:#06x}");
        }
        assert!(overlay.verification_required(0x0000));
        assert!(overlay.verification_required(0x16F8));
    }

    #[test]
    fn disabled_rail_registers_are_skipped() {
        // Loop A disabled: its section drops out, common stays.
        let overlay = RailEnable::from_registers(0b0_0001, 0);
        assert!(!overlay.verification_required(0x0400));
        assert!(overlay.verification_required(0x0000));
    }
}
