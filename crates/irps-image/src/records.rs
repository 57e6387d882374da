//! Register record stream and per-section grouping.
//!
//! The payload is a flat array of 4-byte records, ascending by section
//! address. Both the writer and the verifier walk it segmented by the
//! section map: an explicit cursor scans forward once, never rewinding,
//! so each record is visited at most one time across all groups.

use irps_chip::{OtpSection, SectionMapRow};

use crate::error::{ImageError, Result};

/// Size of one payload record on the wire.
pub const RECORD_SIZE: usize = 4;

/// One payload record: a register address, the value to program, and
/// the mask of bits the value is meaningful for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterRecord {
    /// Flat 16-bit register address.
    pub addr: u16,
    /// Byte to program.
    pub value: u8,
    /// Verification mask; bits outside it are don't-care.
    pub mask: u8,
}

/// Decode the payload into records.
///
/// # Errors
///
/// Returns [`ImageError::RaggedPayload`] if the payload length is not a
/// whole number of records.
pub fn parse_records(payload: &[u8]) -> Result<Vec<RegisterRecord>> {
    if payload.len() % RECORD_SIZE != 0 {
        return Err(ImageError::RaggedPayload {
            len: payload.len(),
            record: RECORD_SIZE,
        });
    }

    Ok(payload
        .chunks_exact(RECORD_SIZE)
        .map(|c| RegisterRecord {
            addr: u16::from_le_bytes([c[0], c[1]]),
            value: c[2],
            mask: c[3],
        })
        .collect())
}

/// Records of one section-map row, in payload order.
#[derive(Debug, Clone)]
pub struct SectionGroup<'a> {
    /// The section-map row this group programs.
    pub row: &'static SectionMapRow,
    /// In-range records for the row.
    pub records: Vec<&'a RegisterRecord>,
}

/// Lazy per-row grouping of a record stream for one OTP section.
///
/// Restartable: constructing a new iterator is free, the cursor lives in
/// the iterator itself.
pub struct SectionGroups<'a> {
    records: &'a [RegisterRecord],
    rows: std::slice::Iter<'static, SectionMapRow>,
    section: OtpSection,
    cursor: usize,
}

impl<'a> SectionGroups<'a> {
    /// Group `records` by the section-map rows of `section`.
    #[must_use]
    pub fn new(records: &'a [RegisterRecord], section: OtpSection) -> Self {
        Self {
            records,
            rows: irps_chip::section_map().iter(),
            section,
            cursor: 0,
        }
    }
}

impl<'a> Iterator for SectionGroups<'a> {
    type Item = SectionGroup<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = self.rows.next()?;
            if row.section != self.section {
                continue;
            }

            let mut group = Vec::new();
            while self.cursor < self.records.len() {
                let rec = &self.records[self.cursor];
                if rec.addr > row.end {
                    // Belongs to a later row; leave it for the next group.
                    break;
                }
                self.cursor += 1;
                if row.contains(rec.addr) {
                    group.push(rec);
                }
            }
            return Some(SectionGroup { row, records: group });
        }
    }
}

/// Number of records that fall inside `section`'s mapped ranges.
#[must_use]
pub fn count_section_records(records: &[RegisterRecord], section: OtpSection) -> usize {
    SectionGroups::new(records, section)
        .map(|g| g.records.len())
        .sum()
}
