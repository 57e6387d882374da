//! IRPS5401 register map.
//!
//! Addresses are flat 16-bit values over the paged bus protocol:
//! `page = addr / PAGE_SIZE`, in-page offset = `addr % PAGE_SIZE`.
//! The page is selected by writing [`PAGE_REG`] on the current page —
//! the page register itself is visible at the same offset on every page.

/// First flat register address.
pub const REG_START: u16 = 0x0000;
/// Last flat register address (page 0x17, offset 0xFF).
pub const REG_END: u16 = 0x17FF;

/// Page-select register (in-page offset, visible on every page).
pub const PAGE_REG: u8 = 0xFF;
/// Lowest selectable page.
pub const PAGE_MIN: u8 = 0x00;
/// Highest selectable page.
pub const PAGE_MAX: u8 = 0x17;
/// Bytes per page.
pub const PAGE_SIZE: u16 = 256;

/// Undocumented register cleared during the update unlock handshake.
/// The vendor flow writes 0x00 here before programming; meaning unknown.
pub const REG_0B: u16 = 0x000B;

/// Rail-combine control. Bit 4 set routes loop D through another
/// controller, which disables loop D's own register section.
pub const SWITCH_COMBINE: u16 = 0x0023;

/// Firmware revision register. High nibble = major, low nibble = minor.
pub const VERSION: u16 = 0x002A;

/// Switcher enable status. Bits 0..=4 SET mean loop A, B, C, D and the
/// LDO respectively are **disabled**.
pub const SWITCH_EN: u16 = 0x0038;

/// NVRAM image status. Bit 6 set means a CRC error is latched against
/// the currently loaded OTP image.
pub const NVRAM_IMAGE: u16 = 0x0052;

/// Conf-section write counter — a unary bit pattern, one bit gained per
/// consumed program cycle, low bits first.
pub const CONF_LEFT: u16 = 0x0056;

/// User-section write counter, high 16 bits of the 32-bit unary pattern.
pub const USER_LEFT_HI: u16 = 0x0058;
/// User-section write counter, low 16 bits.
pub const USER_LEFT_LO: u16 = 0x005A;

/// Password/unlock status. Bit 1 set means the trim password has already
/// been presented.
pub const PASSWD: u16 = 0x006C;

/// Bus-address lock register. Written 0x00 to unlock programming.
pub const LOCK: u16 = 0x0086;

/// NVM command register (16-bit). Low byte is the opcode, high byte the
/// OTP image number the command applies to.
pub const NVM_CMD: u16 = 0x0088;
/// NVM command status (the high byte of [`NVM_CMD`] read back).
pub const NVM_CMD_STATUS: u16 = 0x0089;

/// Trim password registers; the unlock handshake writes
/// [`TRIM_PWD0_VALUE`] then [`TRIM_PWD1_VALUE`].
pub const TRIM_PWD0: u16 = 0x008A;
/// Second trim password register.
pub const TRIM_PWD1: u16 = 0x008B;

/// Silicon revision register.
pub const SILICON_VERSION: u16 = 0x00FD;

/// First byte of the trim password.
pub const TRIM_PWD0_VALUE: u8 = 0x5A;
/// Second byte of the trim password.
pub const TRIM_PWD1_VALUE: u8 = 0xA5;

/// Bit 1 of [`PASSWD`]: trim password already presented.
pub const PASSWD_UNLOCKED: u8 = 1 << 1;

/// Bit 6 of [`NVRAM_IMAGE`]: CRC error latched in the loaded image.
pub const NVRAM_CRC_ERROR: u8 = 1 << 6;

/// NVM command opcodes (low byte of [`NVM_CMD`]).
pub mod nvm_cmd {
    /// Commit the conf register map to the OTP image in the high byte.
    pub const RESTORE_CONF: u8 = 0x12;
    /// Commit the user register map to the OTP image in the high byte.
    pub const RESTORE_USER: u8 = 0x42;
    /// Load the user OTP image in the high byte back into the register
    /// map, refreshing the CRC status. Used before verification.
    pub const LOAD_USER: u8 = 0x41;

    /// Bit 7 of [`super::NVM_CMD_STATUS`]: command completed.
    pub const STATUS_DONE: u8 = 1 << 7;
}

/// Remaining-write maximum for the conf section.
pub const CONF_WRITE_MAX: u8 = 5;
/// Remaining-write maximum for the user section.
pub const USER_WRITE_MAX: u8 = 26;

/// Minimum silicon revision that supports in-field OTP programming.
pub const SILICON_VERSION_MIN: u8 = 2;

/// Time the chip needs to burn the register map into OTP, and for the
/// reverse load before verification. Vendor figure, not a backoff.
pub const PROGRAM_SETTLE_MS: u64 = 250;

/// Compute the page a flat address lives on.
#[must_use]
pub const fn page_of(addr: u16) -> u8 {
    (addr / PAGE_SIZE) as u8
}

/// Compute the in-page offset of a flat address.
#[must_use]
pub const fn offset_of(addr: u16) -> u8 {
    (addr % PAGE_SIZE) as u8
}
