//! Static board instance table.
//!
//! Each entry binds a chip instance id to the firmware sub-model tag it
//! accepts and the bus parameters needed to reach it. The table is the
//! single source of truth for instance lookup — callers index it through
//! [`board_instances`] with a bounds-checked id, never through ambient
//! globals.

use crate::regs;

/// Upper bound on chip instances a board may carry. Sizes the request
/// queue and the session registry.
pub const INSTANCE_COUNT_MAX: usize = 4;

/// Bus parameters for one regulator chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipInfo {
    /// Character device of the bus the chip sits on.
    pub bus_dev: &'static str,
    /// 7-bit bus address.
    pub address: u8,
    /// In-page offset of the page-select register.
    pub page_reg: u8,
    /// Lowest selectable page.
    pub page_min: u8,
    /// Highest selectable page.
    pub page_max: u8,
    /// Bytes per page.
    pub page_size: u16,
}

/// One board instance: a chip plus the firmware sub-model tag that
/// identifies images built for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Instance id, equal to the entry's index in the table.
    pub instance: u8,
    /// Sub-model tag carried in the firmware container header.
    pub sub_model: &'static str,
    /// Bus parameters.
    pub chip: ChipInfo,
}

static BOARD: &[InstanceInfo] = &[InstanceInfo {
    instance: 0,
    sub_model: "IRPS5401_U1",
    chip: ChipInfo {
        bus_dev: "/dev/i2c4",
        address: 0x14,
        page_reg: regs::PAGE_REG,
        page_min: regs::PAGE_MIN,
        page_max: regs::PAGE_MAX,
        page_size: regs::PAGE_SIZE,
    },
}];

/// The board instance table.
#[must_use]
pub fn board_instances() -> &'static [InstanceInfo] {
    BOARD
}

/// Resolve a sub-model tag (as found in an image header) to an instance.
#[must_use]
pub fn instance_for_sub_model(tag: &str) -> Option<&'static InstanceInfo> {
    board_instances().iter().find(|i| tag.starts_with(i.sub_model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_match_indices() {
        for (i, info) in board_instances().iter().enumerate() {
            assert_eq!(usize::from(info.instance), i);
        }
        assert!(board_instances().len() <= INSTANCE_COUNT_MAX);
    }

    #[test]
    fn sub_model_lookup() {
        assert_eq!(
            instance_for_sub_model("IRPS5401_U1").map(|i| i.instance),
            Some(0)
        );
        assert!(instance_for_sub_model("XDPE12284C_U21").is_none());
    }
}
