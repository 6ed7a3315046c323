//! Walkers over the processor topology table.
//!
//! The table is an inverted tree addressed by byte offsets: each processor
//! record names its parent, and carries a list of offsets to the cache
//! records private to it, each of which may chain onward to the next cache
//! level. The same cache record may be reachable from several processor
//! records (a shared L2, for example); nothing here assumes otherwise.
//!
//! No tree is ever materialized. Every query re-walks the raw bytes, and
//! every offset is re-validated against the table bounds before it is
//! dereferenced, so all of these functions are total over arbitrary input.
//! Walks that follow links (parent chains, cache chains) carry an explicit
//! hop budget derived from the table length, so even a table with cyclic
//! links cannot hang a query: the walk stops, logs, and the query degrades
//! to "not found".

use crate::acpi::raw::{
    self, CacheAttributes, CacheFlags, CacheKind, ProcessorFlags, RawCache, RawProcessor,
    RawRecordHeader, CACHE_LEN, PROCESSOR_FIXED_LEN, RECORD_HEADER_LEN, RECORD_TYPE_CACHE,
    RECORD_TYPE_PROCESSOR, TABLE_HEADER_LEN,
};

/// Passing this (or any larger) level to the package search makes it
/// terminate only on a flag match or at the root of the tree.
pub const PACKAGE_SEARCH_LIMIT: u32 = 0xFF;

/// Borrowed view of a validated table, scoped to one query.
#[derive(Clone, Copy)]
pub struct Pptt<'a> {
    data: &'a [u8],
}

/// A resolved record of not-yet-known kind.
#[derive(Clone, Copy)]
pub struct Subtable<'a> {
    data: &'a [u8],
    offset: usize,
    header: RawRecordHeader,
}

impl<'a> Subtable<'a> {
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset as u32
    }

    #[must_use]
    pub fn record_type(&self) -> u16 {
        self.header.record_type
    }

    #[must_use]
    pub fn length(&self) -> u16 {
        self.header.length
    }

    /// Reinterpret as a processor record. The discriminant must match and
    /// the declared length must cover the fixed processor fields.
    #[must_use]
    pub fn as_processor(&self) -> Option<ProcessorNode> {
        if self.header.record_type != RECORD_TYPE_PROCESSOR {
            return None;
        }
        if (self.header.length as usize) < PROCESSOR_FIXED_LEN {
            return None;
        }
        let raw = raw::read_unaligned_at::<RawProcessor>(self.data, self.offset)?;
        Some(ProcessorNode {
            offset: self.offset,
            raw,
        })
    }

    /// Reinterpret as a cache record, with the same kind checks.
    #[must_use]
    pub fn as_cache(&self) -> Option<CacheNode> {
        if self.header.record_type != RECORD_TYPE_CACHE {
            return None;
        }
        if (self.header.length as usize) < CACHE_LEN {
            return None;
        }
        let raw = raw::read_unaligned_at::<RawCache>(self.data, self.offset)?;
        Some(CacheNode {
            offset: self.offset,
            raw,
        })
    }
}

/// A processor record, copied out of the table together with its offset.
///
/// The offset doubles as the record's identity: two views are the same
/// node exactly when their offsets agree.
#[derive(Clone, Copy, Debug)]
pub struct ProcessorNode {
    offset: usize,
    raw: RawProcessor,
}

impl ProcessorNode {
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset as u32
    }

    #[must_use]
    pub fn parent(&self) -> u32 {
        self.raw.parent
    }

    #[must_use]
    pub fn acpi_processor_id(&self) -> u32 {
        self.raw.acpi_processor_id
    }

    #[must_use]
    pub fn flags(&self) -> ProcessorFlags {
        ProcessorFlags::from_bits_truncate(self.raw.flags)
    }

    #[must_use]
    pub fn resource_count(&self) -> u32 {
        self.raw.number_of_private_resources
    }

    fn declared_length(&self) -> usize {
        self.raw.header.length as usize
    }
}

/// A cache record, copied out of the table together with its offset.
#[derive(Clone, Copy, Debug)]
pub struct CacheNode {
    offset: usize,
    raw: RawCache,
}

impl CacheNode {
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset as u32
    }

    #[must_use]
    pub fn flags(&self) -> CacheFlags {
        CacheFlags::from_bits_truncate(self.raw.flags)
    }

    #[must_use]
    pub fn next_level(&self) -> u32 {
        self.raw.next_level_of_cache
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.raw.size
    }

    #[must_use]
    pub fn number_of_sets(&self) -> u32 {
        self.raw.number_of_sets
    }

    #[must_use]
    pub fn associativity(&self) -> u8 {
        self.raw.associativity
    }

    #[must_use]
    pub fn attributes(&self) -> CacheAttributes {
        CacheAttributes(self.raw.attributes)
    }

    #[must_use]
    pub fn line_size(&self) -> u16 {
        self.raw.line_size
    }
}

impl<'a> Pptt<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Upper bound on link hops: a table of N bytes cannot hold more than
    /// N / RECORD_HEADER_LEN distinct records, so any longer walk must be
    /// revisiting one.
    fn hop_budget(&self) -> usize {
        self.data.len() / RECORD_HEADER_LEN + 1
    }

    /// Resolve a record reference to a typed view.
    ///
    /// `None` when the reference is inside the reserved low range, when a
    /// whole record header does not fit at it, or when the declared record
    /// length runs past the end of the table. Callers treat `None` as "no
    /// such record", never as a hard failure.
    #[must_use]
    pub fn subtable(&self, offset: u32) -> Option<Subtable<'a>> {
        let offset = offset as usize;
        // there is no record at reference 0, nor inside the first header
        if offset < RECORD_HEADER_LEN {
            return None;
        }
        let header: RawRecordHeader = raw::read_unaligned_at(self.data, offset)?;
        let end = offset.checked_add(header.length as usize)?;
        if end > self.data.len() {
            return None;
        }
        Some(Subtable {
            data: self.data,
            offset,
            header,
        })
    }

    #[must_use]
    pub fn processor(&self, offset: u32) -> Option<ProcessorNode> {
        self.subtable(offset)?.as_processor()
    }

    #[must_use]
    pub fn cache(&self, offset: u32) -> Option<CacheNode> {
        self.subtable(offset)?.as_cache()
    }

    /// The parent of a processor record, if its parent reference resolves
    /// to one. Root records carry reference 0, which never resolves.
    #[must_use]
    pub fn parent_of(&self, node: &ProcessorNode) -> Option<ProcessorNode> {
        self.processor(node.parent())
    }

    /// The `index`-th private resource of a processor record.
    ///
    /// Checks the index against the declared resource count and against
    /// what the record's length can actually carry, then resolves the
    /// stored reference. A bad reference yields `None`, which enumeration
    /// callers treat as the end of the resource list.
    #[must_use]
    pub fn resource(&self, node: &ProcessorNode, index: u32) -> Option<Subtable<'a>> {
        if index >= node.resource_count() {
            return None;
        }
        let slot = PROCESSOR_FIXED_LEN + index as usize * 4;
        if slot + 4 > node.declared_length() {
            // count claims more slots than the record body holds
            return None;
        }
        let reference: u32 = raw::read_unaligned_at(self.data, node.offset + slot)?;
        self.subtable(reference)
    }

    /// Walk one cache chain starting from a private resource.
    ///
    /// Each hop down the chain increments the running level counter that
    /// began at `start_level`. When a target is given and the level, the
    /// CACHE_TYPE_VALID flag and the cache type all line up, the record is
    /// stored in `found` -- unless a different record already matched, in
    /// which case the table is ambiguous and the first match is kept.
    ///
    /// Returns the level of the deepest cache reached.
    pub fn walk_cache_chain(
        &self,
        start_level: u32,
        head: Subtable<'a>,
        target: Option<(u32, CacheKind)>,
        found: &mut Option<CacheNode>,
    ) -> u32 {
        let mut level = start_level;
        let Some(mut cache) = head.as_cache() else {
            return level;
        };

        let mut hops = self.hop_budget();
        loop {
            level += 1;

            if let Some((target_level, kind)) = target
                && level == target_level
                && cache.flags().contains(CacheFlags::CACHE_TYPE_VALID)
                && kind.matches_raw(cache.attributes().cache_type())
            {
                match *found {
                    Some(prev) if prev.offset != cache.offset => {
                        log::warn!(
                            "duplicate level {target_level} {kind:?} cache at {:#x}, keeping the match at {:#x}",
                            cache.offset,
                            prev.offset
                        );
                    }
                    Some(_) => {}
                    None => {
                        log::debug!("found {kind:?} cache @ level {target_level}");
                        *found = Some(cache);
                    }
                }
                // keep walking the chain so deeper levels are still counted
                // and duplicates further down are still noticed
            }

            hops -= 1;
            if hops == 0 {
                log::error!("cache chain at {:#x} exceeds table capacity", head.offset);
                break;
            }
            match self.cache(cache.next_level()) {
                Some(next) => cache = next,
                None => break,
            }
        }
        level
    }

    /// Scan every private resource of a processor record, counting cache
    /// levels and optionally looking for a `(level, kind)` match.
    ///
    /// `running_level` is the number of levels attributed to descendants
    /// so far; after the scan it is raised to the deepest level seen here
    /// (a node may carry resources of differing depths) and never lowered.
    pub fn find_cache_level(
        &self,
        node: &ProcessorNode,
        running_level: &mut u32,
        target: Option<(u32, CacheKind)>,
    ) -> Option<CacheNode> {
        let mut found = None;
        let mut deepest = *running_level;
        let mut index = 0;

        while let Some(head) = self.resource(node, index) {
            index += 1;
            let depth = self.walk_cache_chain(*running_level, head, target, &mut found);
            if depth > deepest {
                deepest = depth;
            }
        }
        if deepest > *running_level {
            *running_level = deepest;
        }

        found
    }

    /// Total cache levels visible to a processor record: its own, plus the
    /// levels contributed at each ancestor on the way to the root.
    #[must_use]
    pub fn count_cache_levels(&self, node: &ProcessorNode) -> u32 {
        let mut levels = 0;
        let mut current = *node;
        let mut hops = self.hop_budget();

        loop {
            self.find_cache_level(&current, &mut levels, None);
            match self.parent_of(&current) {
                Some(parent) => current = parent,
                None => break,
            }
            hops -= 1;
            if hops == 0 {
                log::error!(
                    "parent chain above {:#x} exceeds table capacity",
                    node.offset
                );
                break;
            }
        }
        levels
    }

    /// Linear scan over the records following the table header. Stops at a
    /// zero-length record (a table this malformed cannot be scanned past
    /// the defect) or at the end of the table.
    #[must_use]
    pub fn records(&self) -> RecordIter<'a> {
        RecordIter {
            data: self.data,
            offset: TABLE_HEADER_LEN,
        }
    }

    /// Whether no other processor record names this one as its parent.
    ///
    /// A full table scan per call; acceptable because leaf checks only run
    /// inside [`Pptt::find_processor`], which is itself a linear scan.
    #[must_use]
    pub fn is_leaf(&self, node: &ProcessorNode) -> bool {
        for record in self.records() {
            if let Some(other) = record.as_processor()
                && other.parent() == node.offset()
            {
                return false;
            }
        }
        true
    }

    /// Find the leaf processor record carrying `acpi_id`.
    ///
    /// Only leaf nodes are guaranteed a valid, unique id, so interior
    /// records with the same id are skipped. The first qualifying record
    /// in table order wins.
    #[must_use]
    pub fn find_processor(&self, acpi_id: u32) -> Option<ProcessorNode> {
        for record in self.records() {
            if let Some(node) = record.as_processor()
                && node.acpi_processor_id() == acpi_id
                && self.is_leaf(&node)
            {
                return Some(node);
            }
        }
        None
    }

    /// Find the cache record for `(level, kind)` as seen by the leaf
    /// processor with `acpi_id`, together with the processor record whose
    /// resource list reached it.
    #[must_use]
    pub fn find_cache_node(
        &self,
        acpi_id: u32,
        level: u32,
        kind: CacheKind,
    ) -> Option<(CacheNode, ProcessorNode)> {
        log::debug!("looking for ACPI id {acpi_id}'s level {level} {kind:?} cache");

        let mut total_levels = 0;
        let mut node = self.find_processor(acpi_id)?;
        let mut hops = self.hop_budget();

        loop {
            if let Some(cache) = self.find_cache_level(&node, &mut total_levels, Some((level, kind)))
            {
                return Some((cache, node));
            }
            node = self.parent_of(&node)?;
            hops -= 1;
            if hops == 0 {
                log::error!("parent chain exceeds table capacity while locating a cache");
                return None;
            }
        }
    }

    /// Ascend from a processor record for at most `max_levels` hops,
    /// stopping early at a node whose flags intersect `stop` or at the
    /// root. Returns the last node visited.
    #[must_use]
    pub fn package_node(
        &self,
        node: &ProcessorNode,
        max_levels: u32,
        stop: ProcessorFlags,
    ) -> ProcessorNode {
        let mut current = *node;
        let mut remaining = max_levels;
        let mut hops = self.hop_budget();

        while remaining > 0 {
            if current.flags().intersects(stop) {
                break;
            }
            let Some(parent) = self.parent_of(&current) else {
                break;
            };
            current = parent;
            remaining -= 1;
            hops -= 1;
            if hops == 0 {
                log::error!(
                    "parent chain above {:#x} exceeds table capacity",
                    node.offset
                );
                break;
            }
        }
        current
    }

    /// A value shared by every CPU under the same ancestor grouping.
    ///
    /// Level 0 yields the leaf's ACPI processor id, the only field with a
    /// guaranteed identity. Any higher grouping is identified by the
    /// ancestor record's byte offset: opaque, but stable and identical for
    /// all CPUs that reach the same node.
    #[must_use]
    pub fn topology_tag(&self, acpi_id: u32, level: u32, stop: ProcessorFlags) -> Option<i64> {
        let leaf = self.find_processor(acpi_id)?;
        let node = self.package_node(&leaf, level, stop);
        if level == 0 {
            Some(i64::from(node.acpi_processor_id()))
        } else {
            Some(i64::from(node.offset()))
        }
    }
}

/// Iterator behind [`Pptt::records`].
pub struct RecordIter<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Subtable<'a>;

    fn next(&mut self) -> Option<Subtable<'a>> {
        let header: RawRecordHeader = raw::read_unaligned_at(self.data, self.offset)?;
        if header.length == 0 {
            log::error!("invalid zero length record at {:#x}", self.offset);
            return None;
        }
        let end = self.offset.checked_add(header.length as usize)?;
        if end > self.data.len() {
            return None;
        }
        let record = Subtable {
            data: self.data,
            offset: self.offset,
            header,
        };
        self.offset = end;
        Some(record)
    }
}
