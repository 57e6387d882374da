//! Software-simulated chip for tests and CI.
//!
//! [`SimChip`] implements [`RawBus`] with a flat shadow of the whole
//! register space plus just enough NVM behaviour to drive the engine:
//! page selection, the unary write-budget counters, the commit and
//! load commands with their done bit, and the latched CRC flag.
//!
//! Failure injection is by public flags, set before handing the chip to
//! the engine.

use irps_chip::{offset_of, page_of, regs, regs::nvm_cmd};

use crate::bus::RawBus;
use crate::error::{Result, UpdateError};

const REG_COUNT: usize = regs::REG_END as usize + 1;

/// In-memory IRPS5401 stand-in.
pub struct SimChip {
    regs: Vec<u8>,
    page: u8,
    conf_used: u8,
    user_used: u8,
    data_writes: Vec<(u16, u8)>,
    /// Commit reports done but never consumes a budget cycle.
    pub fail_commit: bool,
    /// NVM commands never raise the done bit.
    pub suppress_done: bool,
    /// Loading the committed image latches the CRC error flag.
    pub latch_crc_error: bool,
    /// XOR these into the register map when the committed image is
    /// loaded back, modelling a bad burn.
    pub corrupt_on_load: Vec<(u16, u8)>,
}

impl Default for SimChip {
    fn default() -> Self {
        Self::new()
    }
}

impl SimChip {
    /// Fresh chip: current silicon, no budget consumed, all rails on.
    #[must_use]
    pub fn new() -> Self {
        let mut sim = Self {
            regs: vec![0u8; REG_COUNT],
            page: 0,
            conf_used: 0,
            user_used: 0,
            data_writes: Vec::new(),
            fail_commit: false,
            suppress_done: false,
            latch_crc_error: false,
            corrupt_on_load: Vec::new(),
        };
        sim.regs[regs::SILICON_VERSION as usize] = regs::SILICON_VERSION_MIN;
        sim.regs[regs::VERSION as usize] = 0x21;
        sim.sync_budget_regs();
        sim
    }

    /// Override the silicon revision register.
    pub fn set_silicon(&mut self, rev: u8) {
        self.regs[regs::SILICON_VERSION as usize] = rev;
    }

    /// Pre-consume `used` cycles of the user budget.
    pub fn set_user_used(&mut self, used: u8) {
        self.user_used = used;
        self.sync_budget_regs();
    }

    /// Pre-consume `used` cycles of the conf budget.
    pub fn set_conf_used(&mut self, used: u8) {
        self.conf_used = used;
        self.sync_budget_regs();
    }

    /// Poke a register directly.
    pub fn set_reg(&mut self, addr: u16, value: u8) {
        self.regs[usize::from(addr)] = value;
    }

    /// Peek a register directly.
    #[must_use]
    pub fn reg(&self, addr: u16) -> u8 {
        self.regs[usize::from(addr)]
    }

    /// Register writes seen so far, page selects excluded.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.data_writes.len()
    }

    /// The write log itself: `(flat address, value)` in arrival order.
    #[must_use]
    pub fn writes(&self) -> &[(u16, u8)] {
        &self.data_writes
    }

    fn sync_budget_regs(&mut self) {
        let conf = ones(self.conf_used) as u16;
        self.regs[regs::CONF_LEFT as usize..regs::CONF_LEFT as usize + 2]
            .copy_from_slice(&conf.to_le_bytes());
        let user = ones(self.user_used);
        let hi = (user >> 16) as u16;
        let lo = (user & 0xFFFF) as u16;
        self.regs[regs::USER_LEFT_HI as usize..regs::USER_LEFT_HI as usize + 2]
            .copy_from_slice(&hi.to_le_bytes());
        self.regs[regs::USER_LEFT_LO as usize..regs::USER_LEFT_LO as usize + 2]
            .copy_from_slice(&lo.to_le_bytes());
    }

    fn nvm_command(&mut self, opcode: u8, image: u8) {
        let _ = image; // a real chip selects the OTP slot; the sim has one
        if !self.suppress_done {
            self.regs[regs::NVM_CMD_STATUS as usize] |= nvm_cmd::STATUS_DONE;
        }
        match opcode {
            nvm_cmd::RESTORE_CONF => {
                if !self.fail_commit {
                    self.conf_used += 1;
                    self.sync_budget_regs();
                }
            }
            nvm_cmd::RESTORE_USER => {
                if !self.fail_commit {
                    self.user_used += 1;
                    self.sync_budget_regs();
                }
            }
            nvm_cmd::LOAD_USER => {
                if self.latch_crc_error {
                    self.regs[regs::NVRAM_IMAGE as usize] |= regs::NVRAM_CRC_ERROR;
                }
                for i in 0..self.corrupt_on_load.len() {
                    let (addr, bits) = self.corrupt_on_load[i];
                    self.regs[usize::from(addr)] ^= bits;
                }
            }
            _ => {}
        }
    }

    fn flat(&self, offset: u8) -> u16 {
        u16::from(self.page) * regs::PAGE_SIZE + u16::from(offset)
    }
}

const fn ones(n: u8) -> u32 {
    if n >= 32 {
        u32::MAX
    } else {
        (1u32 << n) - 1
    }
}

impl RawBus for SimChip {
    fn bus_write(&mut self, _addr: u8, data: &[u8]) -> Result<()> {
        let (offset, payload) = data
            .split_first()
            .ok_or_else(|| UpdateError::bus("sim: empty write"))?;
        if *offset == regs::PAGE_REG && payload.len() == 1 {
            self.page = payload[0];
            return Ok(());
        }
        for (i, &b) in payload.iter().enumerate() {
            let flat = self.flat(*offset) + i as u16;
            if usize::from(flat) >= REG_COUNT {
                return Err(UpdateError::bus(format!("sim: write past {flat:#06x}")));
            }
            self.regs[usize::from(flat)] = b;
            self.data_writes.push((flat, b));
        }
        // A word landing on the NVM command register runs the command.
        if self.page == page_of(regs::NVM_CMD)
            && *offset == offset_of(regs::NVM_CMD)
            && payload.len() == 2
        {
            self.nvm_command(payload[0], payload[1]);
        }
        Ok(())
    }

    fn bus_write_read(&mut self, _addr: u8, out: &[u8], buf: &mut [u8]) -> Result<()> {
        let offset = *out
            .first()
            .ok_or_else(|| UpdateError::bus("sim: empty read setup"))?;
        if offset == regs::PAGE_REG {
            buf.fill(self.page);
            return Ok(());
        }
        for (i, slot) in buf.iter_mut().enumerate() {
            let flat = self.flat(offset) + i as u16;
            if usize::from(flat) >= REG_COUNT {
                return Err(UpdateError::bus(format!("sim: read past {flat:#06x}")));
            }
            *slot = self.regs[usize::from(flat)];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_chip_reports_full_budgets() {
        let sim = SimChip::new();
        assert_eq!(sim.reg(regs::CONF_LEFT), 0);
        assert_eq!(sim.reg(regs::USER_LEFT_LO), 0);
    }

    #[test]
    fn commits_consume_one_cycle_each() {
        let mut sim = SimChip::new();
        sim.nvm_command(nvm_cmd::RESTORE_USER, 0);
        assert_eq!(sim.reg(regs::USER_LEFT_LO), 0b1);
        sim.nvm_command(nvm_cmd::RESTORE_USER, 1);
        assert_eq!(sim.reg(regs::USER_LEFT_LO), 0b11);
        assert_ne!(sim.reg(regs::NVM_CMD_STATUS) & nvm_cmd::STATUS_DONE, 0);
    }

    #[test]
    fn budget_pattern_spans_both_user_words() {
        let mut sim = SimChip::new();
        sim.set_user_used(20);
        let lo = u16::from_le_bytes([
            sim.reg(regs::USER_LEFT_LO),
            sim.reg(regs::USER_LEFT_LO + 1),
        ]);
        let hi = u16::from_le_bytes([
            sim.reg(regs::USER_LEFT_HI),
            sim.reg(regs::USER_LEFT_HI + 1),
        ]);
        let pattern = (u32::from(hi) << 16) | u32::from(lo);
        assert_eq!(pattern.trailing_ones(), 20);
    }
}
