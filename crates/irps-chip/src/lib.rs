//! Silicon model for the Infineon IRPS5401 multi-rail regulator.
//!
//! This crate has **no dependencies** and **no hardware access** — it is a
//! pure model of the silicon as seen from the management bus: register
//! addresses, page geometry, NVM command opcodes, OTP section topology,
//! power-rail register ranges, and the board instance table.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`regs`] | Flat 16-bit register map, NVM opcodes, status bits |
//! | [`sections`] | OTP sections, section→page map, rail ranges |
//! | [`board`] | Static board instance table (bus path, address, paging) |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod board;
pub mod regs;
pub mod sections;

pub use board::{board_instances, instance_for_sub_model, ChipInfo, InstanceInfo, INSTANCE_COUNT_MAX};
pub use regs::{offset_of, page_of};
pub use sections::{
    rail_section_of, rail_sections, section_map, OtpSection, RailSection, RailSectionInfo,
    SectionMask, SectionMapRow, VERIFY_IGNORED_REGS,
};
