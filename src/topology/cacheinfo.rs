//! Destination records for discovered cache properties.
//!
//! Callers hand a slice of [`CacheInfo`] slots (one per cache level/type
//! they care about) to [`crate::topology::CpuTopology::populate_cache_properties`].
//! The table extends and corrects hardware-probed values: only fields whose
//! validity flag is set in the matched record are written, everything else
//! keeps whatever the caller probed.

use crate::acpi::pptt::{CacheNode, ProcessorNode};
use crate::acpi::raw::{self, CacheFlags, CacheKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WritePolicy {
    WriteThrough,
    WriteBack,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationPolicy {
    ReadAllocate,
    WriteAllocate,
    ReadWriteAllocate,
}

/// One cache-info slot: the `(level, kind)` a caller wants described, plus
/// the fields the table filled in. `None` means the table said nothing.
#[derive(Clone, Debug)]
pub struct CacheInfo {
    pub level: u32,
    pub kind: CacheKind,
    pub size: Option<u32>,
    pub line_size: Option<u16>,
    pub number_of_sets: Option<u32>,
    pub associativity: Option<u8>,
    pub write_policy: Option<WritePolicy>,
    pub allocation_policy: Option<AllocationPolicy>,
    /// Identity of the processor record owning the matched cache; equal
    /// across CPUs whose slots resolved to the same node.
    pub firmware_tag: Option<u64>,
}

impl CacheInfo {
    #[must_use]
    pub fn new(level: u32, kind: CacheKind) -> Self {
        Self {
            level,
            kind,
            size: None,
            line_size: None,
            number_of_sets: None,
            associativity: None,
            write_policy: None,
            allocation_policy: None,
            firmware_tag: None,
        }
    }

    /// Apply a matched cache record, honoring its validity flags.
    pub fn update_from(&mut self, cache: &CacheNode, owner: &ProcessorNode) {
        self.firmware_tag = Some(u64::from(owner.offset()));

        let flags = cache.flags();
        if flags.contains(CacheFlags::SIZE_VALID) {
            self.size = Some(cache.size());
        }
        if flags.contains(CacheFlags::LINE_SIZE_VALID) {
            self.line_size = Some(cache.line_size());
        }
        if flags.contains(CacheFlags::NUMBER_OF_SETS_VALID) {
            self.number_of_sets = Some(cache.number_of_sets());
        }
        if flags.contains(CacheFlags::ASSOCIATIVITY_VALID) {
            self.associativity = Some(cache.associativity());
        }
        if flags.contains(CacheFlags::WRITE_POLICY_VALID) {
            self.write_policy = Some(if cache.attributes().write_through() {
                WritePolicy::WriteThrough
            } else {
                WritePolicy::WriteBack
            });
        }
        if flags.contains(CacheFlags::ALLOCATION_TYPE_VALID) {
            self.allocation_policy = match cache.attributes().allocation_type() {
                raw::CACHE_ALLOC_READ => Some(AllocationPolicy::ReadAllocate),
                raw::CACHE_ALLOC_WRITE => Some(AllocationPolicy::WriteAllocate),
                // both read+write encodings of the two-bit field
                _ => Some(AllocationPolicy::ReadWriteAllocate),
            };
        }
    }
}
