//! OTP section topology and power-rail register ranges.
//!
//! Two independently programmable OTP sections exist (conf and user),
//! each scattered across several pages. The section map below binds each
//! logical section to the physical page ranges the firmware payload may
//! touch; ranges are disjoint per page and listed in ascending address
//! order, which the record stream in the firmware image also follows.

use crate::regs;

/// One of the two independently programmable OTP regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtpSection {
    /// Configuration section — takes effect only after a power cycle.
    Conf,
    /// User section — live after commit, verifiable in place.
    User,
}

impl OtpSection {
    /// Remaining-write maximum for this section.
    #[must_use]
    pub const fn write_max(self) -> u8 {
        match self {
            Self::Conf => regs::CONF_WRITE_MAX,
            Self::User => regs::USER_WRITE_MAX,
        }
    }

    /// Human-readable name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Conf => "conf",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for OtpSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Request bitmask naming the sections an update should program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionMask(u32);

impl SectionMask {
    /// Conf section bit.
    pub const CONF: Self = Self(1 << 0);
    /// User section bit.
    pub const USER: Self = Self(1 << 2);

    /// Build a mask from a raw request word, keeping only known bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & (Self::CONF.0 | Self::USER.0))
    }

    /// Raw bit value.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if no known section is named.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if the mask includes `section`.
    #[must_use]
    pub const fn contains(self, section: OtpSection) -> bool {
        match section {
            OtpSection::Conf => self.0 & Self::CONF.0 != 0,
            OtpSection::User => self.0 & Self::USER.0 != 0,
        }
    }

    /// Union of two masks.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Sections in programming order (conf before user).
    #[must_use]
    pub fn sections(self) -> Vec<OtpSection> {
        let mut out = Vec::with_capacity(2);
        if self.contains(OtpSection::Conf) {
            out.push(OtpSection::Conf);
        }
        if self.contains(OtpSection::User) {
            out.push(OtpSection::User);
        }
        out
    }
}

/// One row of the section map: a page-local address range belonging to
/// an OTP section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionMapRow {
    /// Owning OTP section.
    pub section: OtpSection,
    /// Physical page the range lives on.
    pub page: u8,
    /// First flat address of the range (inclusive).
    pub start: u16,
    /// Last flat address of the range (inclusive).
    pub end: u16,
}

impl SectionMapRow {
    /// True if `addr` falls inside this row's range.
    #[must_use]
    pub const fn contains(&self, addr: u16) -> bool {
        addr >= self.start && addr <= self.end
    }
}

/// Section→page map for the IRPS5401. Vendor programming guide layout.
static SECTION_MAP: &[SectionMapRow] = &[
    row(OtpSection::Conf, 0x00, 0x0000, 0x0001),
    row(OtpSection::User, 0x00, 0x0020, 0x003B),
    row(OtpSection::User, 0x04, 0x0420, 0x042B),
    row(OtpSection::User, 0x06, 0x0600, 0x06FF),
    row(OtpSection::User, 0x07, 0x0700, 0x07FF),
    row(OtpSection::User, 0x08, 0x0820, 0x082B),
    row(OtpSection::User, 0x0A, 0x0A00, 0x0AFF),
    row(OtpSection::User, 0x0B, 0x0B00, 0x0BFF),
    row(OtpSection::User, 0x0C, 0x0C20, 0x0C2B),
    row(OtpSection::User, 0x0E, 0x0E00, 0x0EFF),
    row(OtpSection::User, 0x0F, 0x0F00, 0x0FFF),
    row(OtpSection::User, 0x10, 0x1020, 0x102B),
    row(OtpSection::User, 0x12, 0x1200, 0x12FF),
    row(OtpSection::User, 0x13, 0x1300, 0x13FF),
    row(OtpSection::User, 0x14, 0x1420, 0x1421),
    row(OtpSection::User, 0x16, 0x1600, 0x16FF),
    row(OtpSection::User, 0x17, 0x1700, 0x17FF),
];

const fn row(section: OtpSection, page: u8, start: u16, end: u16) -> SectionMapRow {
    SectionMapRow { section, page, start, end }
}

/// The static section map, in ascending address order.
#[must_use]
pub fn section_map() -> &'static [SectionMapRow] {
    SECTION_MAP
}

/// A power-rail register range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RailSection {
    /// Shared always-on range; never disabled.
    Common,
    /// Switcher loop A.
    LoopA,
    /// Switcher loop B.
    LoopB,
    /// Switcher loop C.
    LoopC,
    /// Switcher loop D.
    LoopD,
    /// LDO output.
    Ldo,
}

impl RailSection {
    /// Bit in [`crate::regs::SWITCH_EN`] that, when SET, disables this
    /// rail. `None` for the common range.
    #[must_use]
    pub const fn disable_bit(self) -> Option<u8> {
        match self {
            Self::Common => None,
            Self::LoopA => Some(1 << 0),
            Self::LoopB => Some(1 << 1),
            Self::LoopC => Some(1 << 2),
            Self::LoopD => Some(1 << 3),
            Self::Ldo => Some(1 << 4),
        }
    }
}

/// A rail section bound to its flat address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RailSectionInfo {
    /// Which rail.
    pub rail: RailSection,
    /// First flat address (inclusive).
    pub start: u16,
    /// Last flat address (inclusive).
    pub end: u16,
}

impl RailSectionInfo {
    /// True if `addr` falls inside this rail's range.
    #[must_use]
    pub const fn contains(&self, addr: u16) -> bool {
        addr >= self.start && addr <= self.end
    }
}

static RAIL_SECTIONS: &[RailSectionInfo] = &[
    RailSectionInfo { rail: RailSection::Common, start: 0x0000, end: 0x03FF },
    RailSectionInfo { rail: RailSection::LoopA, start: 0x0400, end: 0x07FF },
    RailSectionInfo { rail: RailSection::LoopB, start: 0x0800, end: 0x0BFF },
    RailSectionInfo { rail: RailSection::LoopC, start: 0x0C00, end: 0x0FFF },
    RailSectionInfo { rail: RailSection::LoopD, start: 0x1000, end: 0x13FF },
    RailSectionInfo { rail: RailSection::Ldo, start: 0x1400, end: 0x17FF },
];

/// The static rail table covering the whole address space.
#[must_use]
pub fn rail_sections() -> &'static [RailSectionInfo] {
    RAIL_SECTIONS
}

/// Rail owning flat address `addr`. Addresses past the mapped space
/// fall back to the common range, which is never disabled.
#[must_use]
pub fn rail_section_of(addr: u16) -> RailSection {
    RAIL_SECTIONS
        .iter()
        .find(|r| r.contains(addr))
        .map_or(RailSection::Common, |r| r.rail)
}

/// Registers the vendor documents as legitimately nondeterministic;
/// excluded from post-write verification.
pub const VERIFY_IGNORED_REGS: &[u16] = &[0x16F9, 0x16FB, 0x16FD, 0x17B0, 0x17BC];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_map_is_ascending_and_page_consistent() {
        let mut last_end = None;
        for r in section_map() {
            assert!(r.start <= r.end);
            assert_eq!(crate::regs::page_of(r.start), r.page);
            assert_eq!(crate::regs::page_of(r.end), r.page);
            if let Some(prev) = last_end {
                assert!(r.start > prev, "rows must not overlap");
            }
            last_end = Some(r.end);
        }
    }

    #[test]
    fn rail_table_tiles_the_address_space() {
        let mut next = 0x0000u16;
        for r in rail_sections() {
            assert_eq!(r.start, next);
            next = r.end + 1;
        }
        assert_eq!(next, 0x1800);
    }

    #[test]
    fn mask_round_trip() {
        let m = SectionMask::CONF.union(SectionMask::USER);
        assert!(m.contains(OtpSection::Conf));
        assert!(m.contains(OtpSection::User));
        assert_eq!(m.sections(), vec![OtpSection::Conf, OtpSection::User]);
        assert!(SectionMask::from_bits(0x02).is_empty()); // trim bit: unsupported
    }
}
