//! Paged register access over a raw bus.
//!
//! Flat 16-bit register addresses are split into a page and an in-page
//! offset; the page is selected by writing the page register, which is
//! visible at the same offset on every page. Word accesses are
//! little-endian, two bytes in one transaction.
//!
//! The `*_raw` methods skip page selection and trust the caller to know
//! which page is live — the programming loop uses them to write a run of
//! records on one page without re-selecting it per byte.

use irps_chip::{offset_of, page_of, ChipInfo};

use crate::bus::RawBus;
use crate::error::{Result, UpdateError};

/// Register accessor bound to one chip for the duration of a bus hold.
pub struct PagedAccess<'a, B: RawBus> {
    bus: &'a mut B,
    chip: &'a ChipInfo,
}

impl<'a, B: RawBus> PagedAccess<'a, B> {
    /// Bind the accessor to `chip` on `bus`.
    pub fn new(bus: &'a mut B, chip: &'a ChipInfo) -> Self {
        Self { bus, chip }
    }

    /// The chip this accessor drives.
    pub fn chip(&self) -> &ChipInfo {
        self.chip
    }

    /// Select `page`, validating it against the chip's window first.
    pub fn set_page(&mut self, page: u8) -> Result<()> {
        if page < self.chip.page_min || page > self.chip.page_max {
            return Err(UpdateError::PageOutOfRange {
                page,
                min: self.chip.page_min,
                max: self.chip.page_max,
            });
        }
        self.bus
            .bus_write(self.chip.address, &[self.chip.page_reg, page])
    }

    /// Read the currently selected page.
    pub fn current_page(&mut self) -> Result<u8> {
        self.read_offset(self.chip.page_reg)
    }

    /// Read one byte at in-page `offset` on the current page.
    pub fn read_offset(&mut self, offset: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.bus
            .bus_write_read(self.chip.address, &[offset], &mut buf)?;
        Ok(buf[0])
    }

    /// Write one byte at in-page `offset` on the current page.
    pub fn write_offset(&mut self, offset: u8, value: u8) -> Result<()> {
        self.bus.bus_write(self.chip.address, &[offset, value])
    }

    /// Read one byte at flat address `addr`, selecting its page.
    pub fn read_byte(&mut self, addr: u16) -> Result<u8> {
        self.set_page(page_of(addr))?;
        self.read_offset(offset_of(addr))
    }

    /// Write one byte at flat address `addr`, selecting its page.
    pub fn write_byte(&mut self, addr: u16, value: u8) -> Result<()> {
        self.set_page(page_of(addr))?;
        self.write_offset(offset_of(addr), value)
    }

    /// Read a little-endian word at flat address `addr`.
    pub fn read_word(&mut self, addr: u16) -> Result<u16> {
        self.set_page(page_of(addr))?;
        let mut buf = [0u8; 2];
        self.bus
            .bus_write_read(self.chip.address, &[offset_of(addr)], &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Write a little-endian word at flat address `addr`.
    pub fn write_word(&mut self, addr: u16, value: u16) -> Result<()> {
        self.set_page(page_of(addr))?;
        let [lo, hi] = value.to_le_bytes();
        self.bus
            .bus_write(self.chip.address, &[offset_of(addr), lo, hi])
    }
}
