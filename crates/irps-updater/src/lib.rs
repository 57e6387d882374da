//! OTP firmware update engine for the IRPS5401 multi-rail regulator.
//!
//! The engine takes a validated firmware container, gates it against
//! the chip's silicon revision and one-time-programmable write budgets,
//! streams the register records over the paged bus protocol, burns them
//! into the next OTP image, and verifies the burned image by reading
//! the whole register space back.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`bus`] | Raw transfer seam and the `/dev/i2c-*` transport |
//! | [`paged`] | Flat-address register access over the page protocol |
//! | [`budget`] | Unary write-budget decode and gating |
//! | [`rails`] | Runtime rail-enable overlay for verification |
//! | [`session`] | Lock-free per-instance progress state |
//! | [`updater`] | The orchestrator and its configuration |
//! | [`verify`] | Post-write read-back verification |
//! | [`sim`] | Software chip for tests and CI |
//!
//! All failures surface as an [`UpdateError`] internally and collapse
//! to a stable [`CompletionCode`] at the engine boundary.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

pub mod budget;
pub mod bus;
mod error;
pub mod paged;
pub mod rails;
pub mod session;
pub mod sim;
mod updater;
mod verify;

pub use bus::{DevI2cBus, RawBus};
pub use error::{CompletionCode, Result, UpdateError};
pub use paged::PagedAccess;
pub use session::{ProgressReport, SessionSlot, Stage, Status};
pub use sim::SimChip;
pub use updater::{read_fw_version, UpdateRequest, Updater, UpdaterConfig};
