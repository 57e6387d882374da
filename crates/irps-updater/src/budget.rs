//! OTP write-budget accounting.
//!
//! The chip tracks consumed program cycles as a unary bit pattern: each
//! commit sets one more bit, low bits first. Remaining cycles are the
//! section maximum minus the count of trailing set bits, floored at
//! zero so a fully burned counter never underflows.

use irps_chip::{regs, OtpSection};
use tracing::debug;

use crate::bus::RawBus;
use crate::error::{Result, UpdateError};
use crate::paged::PagedAccess;

/// Decode a unary consumption pattern into remaining write cycles.
#[must_use]
pub fn decode_remaining(pattern: u32, max: u8) -> u8 {
    let used = pattern.trailing_ones();
    u32::from(max).saturating_sub(used) as u8
}

/// Read the remaining write cycles for `section` from the chip.
///
/// The conf counter is one 16-bit register; the user counter spans two,
/// high half first in the register map.
pub fn read_remaining<B: RawBus>(
    paged: &mut PagedAccess<'_, B>,
    section: OtpSection,
) -> Result<u8> {
    let (pattern, max) = match section {
        OtpSection::Conf => {
            let p = u32::from(paged.read_word(regs::CONF_LEFT)?);
            (p, regs::CONF_WRITE_MAX)
        }
        OtpSection::User => {
            let hi = u32::from(paged.read_word(regs::USER_LEFT_HI)?);
            let lo = u32::from(paged.read_word(regs::USER_LEFT_LO)?);
            ((hi << 16) | lo, regs::USER_WRITE_MAX)
        }
    };
    let remaining = decode_remaining(pattern, max);
    debug!(%section, pattern = format_args!("{pattern:#010x}"), remaining, "write budget");
    Ok(remaining)
}

/// Gate an update on the remaining budget.
///
/// Zero remaining is a hard stop; at or below `warn` the update is
/// refused with a distinct code so callers can override deliberately.
pub fn gate(section: OtpSection, remaining: u8, warn: u8) -> Result<()> {
    if remaining == 0 {
        return Err(UpdateError::BudgetExhausted { section });
    }
    if remaining <= warn {
        return Err(UpdateError::CapabilityLimited {
            section,
            remaining,
            warn,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unary_decode() {
        assert_eq!(decode_remaining(0, regs::USER_WRITE_MAX), 26);
        assert_eq!(decode_remaining(0b1, regs::USER_WRITE_MAX), 25);
        assert_eq!(decode_remaining(0b111, regs::USER_WRITE_MAX), 23);
        assert_eq!(decode_remaining(0, regs::CONF_WRITE_MAX), 5);
        assert_eq!(decode_remaining(0b1_1111, regs::CONF_WRITE_MAX), 0);
    }

    #[test]
    fn decode_floors_at_zero() {
        // More bits set than the section maximum still reads as zero.
        assert_eq!(decode_remaining(u32::MAX, regs::CONF_WRITE_MAX), 0);
        assert_eq!(decode_remaining((1 << 30) - 1, regs::USER_WRITE_MAX), 0);
    }

    #[test]
    fn gating() {
        assert!(gate(OtpSection::User, 26, 0).is_ok());
        assert!(matches!(
            gate(OtpSection::User, 0, 0),
            Err(UpdateError::BudgetExhausted { .. })
        ));
        assert!(matches!(
            gate(OtpSection::Conf, 2, 2),
            Err(UpdateError::CapabilityLimited { remaining: 2, .. })
        ));
        assert!(gate(OtpSection::Conf, 3, 2).is_ok());
    }
}
