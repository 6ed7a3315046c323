//! Acquisition and validation of the binary topology table.
//!
//! The core walkers in [`crate::acpi::pptt`] only ever borrow table bytes;
//! ownership and validation live here. A [`TableBuffer`] is a checked,
//! immutable copy of the firmware blob, handed out behind an `Arc` so a
//! query can hold the table for exactly as long as it needs it.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::acpi::pptt::Pptt;
use crate::acpi::raw::{self, RawTableHeader, TABLE_HEADER_LEN};
use crate::error::{PpttError, PpttResult};

/// Where Linux exposes the firmware table as a plain binary file.
const SYSFS_TABLE_PATH: &str = "/sys/firmware/acpi/tables/PPTT";

fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

/// A validated, immutable copy of the topology table.
///
/// Construction checks the header signature, the declared length and the
/// whole-table checksum; the walkers downstream rely on none of it having
/// to be re-checked. The buffer is trimmed to the declared length so that
/// trailing garbage from the source can never be reached by a record scan.
pub struct TableBuffer {
    data: Vec<u8>,
}

impl TableBuffer {
    /// Validate a raw blob and take ownership of it.
    ///
    /// # Errors
    /// Returns [`PpttError::MalformedTable`] if the blob is shorter than a
    /// table header, carries the wrong signature, declares a length the
    /// blob cannot back, or fails the checksum.
    pub fn new(mut data: Vec<u8>) -> PpttResult<Self> {
        let header: RawTableHeader = raw::read_unaligned_at(&data, 0)
            .ok_or(PpttError::MalformedTable("shorter than the table header"))?;

        if &header.signature != raw::PPTT_SIGNATURE {
            return Err(PpttError::MalformedTable("signature mismatch"));
        }

        let declared = header.length as usize;
        if declared < TABLE_HEADER_LEN || declared > data.len() {
            return Err(PpttError::MalformedTable("declared length out of range"));
        }

        if checksum(&data[..declared]) != 0 {
            return Err(PpttError::MalformedTable("checksum mismatch"));
        }

        data.truncate(declared);
        Ok(Self { data })
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn revision(&self) -> u8 {
        self.data[8]
    }

    /// Borrow the table for walking. The view is valid for as long as this
    /// buffer (or the `Arc` holding it) stays alive.
    #[must_use]
    pub fn pptt(&self) -> Pptt<'_> {
        Pptt::new(&self.data)
    }
}

/// Source of topology tables. `acquire` hands out a reference-counted
/// buffer; dropping the last clone releases it.
pub trait TableSource {
    fn acquire(&self) -> PpttResult<Arc<TableBuffer>>;
}

/// Reads the table the firmware exports through sysfs.
pub struct SysfsTableSource {
    path: PathBuf,
}

impl SysfsTableSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: PathBuf::from(SYSFS_TABLE_PATH),
        }
    }

    /// Use a non-default table location (alternate sysfs root, dumped
    /// table file, test fixture).
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for SysfsTableSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TableSource for SysfsTableSource {
    fn acquire(&self) -> PpttResult<Arc<TableBuffer>> {
        if !self.path.exists() {
            log::debug!("no topology table at {}", self.path.display());
            return Err(PpttError::TableUnavailable);
        }
        let data = fs::read(&self.path)?;
        Ok(Arc::new(TableBuffer::new(data)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acpi::fixtures::TableBuilder;

    #[test]
    fn accepts_a_well_formed_table() {
        let mut builder = TableBuilder::new();
        builder.processor(0, 0, 1, &[]);
        let data = builder.build();
        let expected_len = data.len();

        let table = TableBuffer::new(data).unwrap();
        assert_eq!(table.bytes().len(), expected_len);
        assert_eq!(table.revision(), 1);
    }

    #[test]
    fn rejects_short_buffers() {
        assert!(matches!(
            TableBuffer::new(vec![0u8; 10]),
            Err(PpttError::MalformedTable(_))
        ));
    }

    #[test]
    fn rejects_wrong_signature() {
        let mut data = TableBuilder::new().build();
        data[0..4].copy_from_slice(b"XXXX");
        assert!(TableBuffer::new(data).is_err());
    }

    #[test]
    fn rejects_checksum_mismatch() {
        let mut data = TableBuilder::new().build();
        let last = data.len() - 1;
        data[last] = data[last].wrapping_add(1);
        assert!(TableBuffer::new(data).is_err());
    }

    #[test]
    fn rejects_declared_length_beyond_buffer() {
        let mut data = TableBuilder::new().build();
        let bogus = (data.len() as u32 + 64).to_le_bytes();
        data[4..8].copy_from_slice(&bogus);
        assert!(TableBuffer::new(data).is_err());
    }

    #[test]
    fn trims_trailing_bytes_past_declared_length() {
        let mut builder = TableBuilder::new();
        builder.processor(0, 0, 1, &[]);
        let mut data = builder.build();
        let declared = data.len();
        data.extend_from_slice(&[0xAB; 16]);

        let table = TableBuffer::new(data).unwrap();
        assert_eq!(table.bytes().len(), declared);
    }

    #[test]
    fn sysfs_source_reports_missing_table() {
        let source = SysfsTableSource::with_path("/nonexistent/definitely/PPTT");
        assert!(matches!(
            source.acquire(),
            Err(PpttError::TableUnavailable)
        ));
    }
}
