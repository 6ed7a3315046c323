//! Byte-level table builder shared by the unit tests.
//!
//! Builds tables bottom-up: records referenced by offset (parents, cache
//! chain heads) are appended first so their offsets are known when the
//! referencing record is written. `build` patches the declared length and
//! the checksum so the result passes provider-side validation.

use crate::acpi::raw::{
    self, CACHE_LEN, PROCESSOR_FIXED_LEN, RECORD_TYPE_CACHE, RECORD_TYPE_PROCESSOR,
    TABLE_HEADER_LEN,
};

pub(crate) struct TableBuilder {
    data: Vec<u8>,
}

impl TableBuilder {
    pub fn new() -> Self {
        let mut data = vec![0u8; TABLE_HEADER_LEN];
        data[0..4].copy_from_slice(raw::PPTT_SIGNATURE);
        data[8] = 1; // revision
        Self { data }
    }

    /// Offset the next appended record will land at.
    pub fn next_offset(&self) -> u32 {
        self.data.len() as u32
    }

    fn record_header(&mut self, record_type: u16, length: u16) -> u32 {
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(&record_type.to_le_bytes());
        self.data.extend_from_slice(&length.to_le_bytes());
        self.data.extend_from_slice(&0u32.to_le_bytes());
        offset
    }

    /// Append a processor record, returning its offset.
    pub fn processor(&mut self, parent: u32, flags: u32, acpi_id: u32, resources: &[u32]) -> u32 {
        self.processor_with_bogus_count(parent, flags, acpi_id, resources, resources.len() as u32)
    }

    /// Same, but with a freely chosen resource count field (for tables
    /// whose count disagrees with the record body).
    pub fn processor_with_bogus_count(
        &mut self,
        parent: u32,
        flags: u32,
        acpi_id: u32,
        resources: &[u32],
        count: u32,
    ) -> u32 {
        let length = (PROCESSOR_FIXED_LEN + resources.len() * 4) as u16;
        let offset = self.record_header(RECORD_TYPE_PROCESSOR, length);
        self.data.extend_from_slice(&flags.to_le_bytes());
        self.data.extend_from_slice(&parent.to_le_bytes());
        self.data.extend_from_slice(&acpi_id.to_le_bytes());
        self.data.extend_from_slice(&count.to_le_bytes());
        for resource in resources {
            self.data.extend_from_slice(&resource.to_le_bytes());
        }
        offset
    }

    /// Append a cache record, returning its offset.
    #[allow(clippy::too_many_arguments)]
    pub fn cache(
        &mut self,
        next_level: u32,
        flags: u32,
        size: u32,
        number_of_sets: u32,
        associativity: u8,
        attributes: u8,
        line_size: u16,
    ) -> u32 {
        let offset = self.record_header(RECORD_TYPE_CACHE, CACHE_LEN as u16);
        self.data.extend_from_slice(&flags.to_le_bytes());
        self.data.extend_from_slice(&next_level.to_le_bytes());
        self.data.extend_from_slice(&size.to_le_bytes());
        self.data.extend_from_slice(&number_of_sets.to_le_bytes());
        self.data.push(associativity);
        self.data.push(attributes);
        self.data.extend_from_slice(&line_size.to_le_bytes());
        offset
    }

    /// Append a bare record header with an arbitrary declared length and
    /// no body (for malformed-input tests).
    pub fn raw_record(&mut self, record_type: u16, declared_length: u16) -> u32 {
        self.record_header(record_type, declared_length)
    }

    /// Patch the table length and checksum and hand the bytes out.
    pub fn build(mut self) -> Vec<u8> {
        let length = self.data.len() as u32;
        self.data[4..8].copy_from_slice(&length.to_le_bytes());
        self.data[9] = 0;
        let sum = self.data.iter().fold(0u8, |s, b| s.wrapping_add(*b));
        self.data[9] = sum.wrapping_neg();
        self.data
    }
}
