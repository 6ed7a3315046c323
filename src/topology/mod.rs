//! High-level CPU topology queries backed by the firmware table.
//!
//! This is the surface platform-initialization code talks to: it maps
//! caller-visible logical CPU numbers into the table's native id space,
//! runs the offset walkers in [`crate::acpi::pptt`], and degrades to
//! "nothing found" whenever the table is absent or unhelpful -- the
//! answers here are advisory overrides for hardware-probed defaults,
//! never something worth failing a boot over.

pub mod cacheinfo;

pub use cacheinfo::{AllocationPolicy, CacheInfo, WritePolicy};

use std::sync::{Arc, Mutex};

use crate::acpi::pptt::{Pptt, PACKAGE_SEARCH_LIMIT};
use crate::acpi::raw::ProcessorFlags;
use crate::acpi::tables::{TableBuffer, TableSource};
use crate::error::{PpttError, PpttResult};

/// Maps caller-visible logical CPU numbers to the table's native
/// (ACPI processor) id space. Platform glue owns this mapping; the
/// simplest realization is a `Vec<u32>` indexed by logical CPU.
pub trait CpuIdMap: Send + Sync {
    fn acpi_id(&self, cpu: u32) -> Option<u32>;
}

impl CpuIdMap for Vec<u32> {
    fn acpi_id(&self, cpu: u32) -> Option<u32> {
        self.get(cpu as usize).copied()
    }
}

/// A topology snapshot: an acquired table plus the CPU id mapping.
///
/// Holding this struct keeps the table buffer alive; every query borrows
/// the bytes for its own duration only and re-walks them from scratch.
pub struct CpuTopology {
    table: Arc<TableBuffer>,
    cpu_ids: Box<dyn CpuIdMap>,
}

static GLOBAL_TOPOLOGY: Mutex<Option<Arc<CpuTopology>>> = Mutex::new(None);

impl CpuTopology {
    pub fn new(table: Arc<TableBuffer>, cpu_ids: impl CpuIdMap + 'static) -> Self {
        Self {
            table,
            cpu_ids: Box::new(cpu_ids),
        }
    }

    /// Acquire the table from `source` and build a snapshot over it.
    ///
    /// # Errors
    /// Propagates [`PpttError::TableUnavailable`] (or an I/O error) from
    /// the source; callers fall back to hardware-probed values.
    pub fn from_source(
        source: &dyn TableSource,
        cpu_ids: impl CpuIdMap + 'static,
    ) -> PpttResult<Self> {
        Ok(Self::new(source.acquire()?, cpu_ids))
    }

    fn acpi_id(&self, cpu: u32) -> PpttResult<u32> {
        self.cpu_ids.acpi_id(cpu).ok_or(PpttError::UnknownCpu(cpu))
    }

    fn pptt(&self) -> Pptt<'_> {
        self.table.pptt()
    }

    /// Number of cache levels the table describes for a logical CPU.
    ///
    /// 0 when the CPU has no mapping, no leaf processor record matches,
    /// or the table simply lists no caches.
    #[must_use]
    pub fn last_cache_level(&self, cpu: u32) -> u32 {
        let Ok(acpi_id) = self.acpi_id(cpu) else {
            return 0;
        };
        let pptt = self.pptt();
        let Some(node) = pptt.find_processor(acpi_id) else {
            log::debug!("no leaf processor record for CPU {cpu} (ACPI id {acpi_id})");
            return 0;
        };
        pptt.count_cache_levels(&node)
    }

    /// Fill the caller's cache-info slots from the table.
    ///
    /// Each slot names a `(level, kind)`; a slot whose cache the table
    /// does not describe is left untouched. Fields of matched slots are
    /// written only when the record marks them valid.
    ///
    /// # Errors
    /// [`PpttError::UnknownCpu`] if the CPU has no id mapping,
    /// [`PpttError::ProcessorNotFound`] if no leaf processor record
    /// carries its ACPI id.
    pub fn populate_cache_properties(
        &self,
        cpu: u32,
        slots: &mut [CacheInfo],
    ) -> PpttResult<()> {
        let acpi_id = self.acpi_id(cpu)?;
        let pptt = self.pptt();
        if pptt.find_processor(acpi_id).is_none() {
            log::debug!("no leaf processor record for CPU {cpu} (ACPI id {acpi_id})");
            return Err(PpttError::ProcessorNotFound(acpi_id));
        }
        for slot in slots {
            if let Some((cache, owner)) = pptt.find_cache_node(acpi_id, slot.level, slot.kind) {
                slot.update_from(&cache, &owner);
            }
        }
        Ok(())
    }

    /// Opaque id shared by all CPUs under the same ancestor at `level`.
    ///
    /// Level 0 returns the CPU's own native id; higher levels return a
    /// generated value that is stable for an unchanged table. Levels past
    /// the root all return the root's value.
    ///
    /// # Errors
    /// [`PpttError::UnknownCpu`] / [`PpttError::ProcessorNotFound`] as
    /// for [`Self::populate_cache_properties`].
    pub fn topology_tag(&self, cpu: u32, level: u32) -> PpttResult<i64> {
        self.tag(cpu, level, ProcessorFlags::empty())
    }

    /// Opaque id shared by all CPUs in the same physical package: the
    /// ascent is unbounded and stops at the first record flagged as a
    /// package boundary (or the root).
    ///
    /// # Errors
    /// As for [`Self::topology_tag`].
    pub fn package_tag(&self, cpu: u32) -> PpttResult<i64> {
        self.tag(cpu, PACKAGE_SEARCH_LIMIT, ProcessorFlags::PHYSICAL_PACKAGE)
    }

    fn tag(&self, cpu: u32, level: u32, stop: ProcessorFlags) -> PpttResult<i64> {
        let acpi_id = self.acpi_id(cpu)?;
        let tag = self
            .pptt()
            .topology_tag(acpi_id, level, stop)
            .ok_or_else(|| {
                log::debug!("table found, but unable to locate a core for CPU {cpu}");
                PpttError::ProcessorNotFound(acpi_id)
            })?;
        log::debug!("topology tag for CPU {cpu} at level {level}: {tag}");
        Ok(tag)
    }
}

/// Install a snapshot as the process-wide default and hand back a shared
/// reference to it.
///
/// # Panics
/// Panics if another thread panicked while holding the registry lock.
pub fn initialize(topology: CpuTopology) -> Arc<CpuTopology> {
    let shared = Arc::new(topology);
    *GLOBAL_TOPOLOGY.lock().unwrap() = Some(Arc::clone(&shared));
    shared
}

/// The process-wide snapshot, if one has been installed.
///
/// # Panics
/// Panics if another thread panicked while holding the registry lock.
#[must_use]
pub fn global() -> Option<Arc<CpuTopology>> {
    GLOBAL_TOPOLOGY.lock().unwrap().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acpi::fixtures::TableBuilder;
    use crate::acpi::raw::{CacheFlags, CacheKind, CACHE_TYPE_DATA, CACHE_TYPE_UNIFIED};

    fn attr(cache_type: u8, write_through: bool, alloc: u8) -> u8 {
        (u8::from(write_through) << 4) | (cache_type << 2) | alloc
    }

    /// One package, one cluster, two CPUs; each CPU has a private L1 data
    /// cache chaining into the cluster's L2.
    fn sample_topology() -> CpuTopology {
        let mut builder = TableBuilder::new();
        let package = builder.processor(0, ProcessorFlags::PHYSICAL_PACKAGE.bits(), 200, &[]);
        let l2 = builder.cache(
            0,
            (CacheFlags::SIZE_VALID | CacheFlags::CACHE_TYPE_VALID).bits(),
            0x100000,
            0,
            0,
            attr(CACHE_TYPE_UNIFIED, false, 2),
            0,
        );
        let cluster = builder.processor(package, 0, 100, &[l2]);
        let l1_flags = CacheFlags::all().bits();
        let l1a = builder.cache(0, l1_flags, 0x8000, 256, 4, attr(CACHE_TYPE_DATA, true, 2), 64);
        let l1b = builder.cache(0, l1_flags, 0x8000, 256, 4, attr(CACHE_TYPE_DATA, true, 2), 64);
        builder.processor(cluster, 0, 10, &[l1a]);
        builder.processor(cluster, 0, 11, &[l1b]);

        let table = Arc::new(TableBuffer::new(builder.build()).unwrap());
        CpuTopology::new(table, vec![10, 11])
    }

    #[test]
    fn last_cache_level_counts_private_and_shared_levels() {
        let topo = sample_topology();
        assert_eq!(topo.last_cache_level(0), 2);
        assert_eq!(topo.last_cache_level(1), 2);
        // no mapping for CPU 2
        assert_eq!(topo.last_cache_level(2), 0);
    }

    #[test]
    fn populate_writes_exactly_the_flagged_fields() {
        let topo = sample_topology();
        let mut slots = [
            CacheInfo::new(1, CacheKind::Data),
            CacheInfo::new(2, CacheKind::Unified),
            CacheInfo::new(3, CacheKind::Unified),
        ];
        topo.populate_cache_properties(0, &mut slots).unwrap();

        // L1: every validity flag set, so every field arrives
        assert_eq!(slots[0].size, Some(0x8000));
        assert_eq!(slots[0].line_size, Some(64));
        assert_eq!(slots[0].number_of_sets, Some(256));
        assert_eq!(slots[0].associativity, Some(4));
        assert_eq!(slots[0].write_policy, Some(WritePolicy::WriteThrough));
        assert_eq!(
            slots[0].allocation_policy,
            Some(AllocationPolicy::ReadWriteAllocate)
        );
        assert!(slots[0].firmware_tag.is_some());

        // L2: only size and type are valid; the rest stays untouched
        assert_eq!(slots[1].size, Some(0x100000));
        assert_eq!(slots[1].line_size, None);
        assert_eq!(slots[1].number_of_sets, None);
        assert_eq!(slots[1].associativity, None);
        assert_eq!(slots[1].write_policy, None);
        assert_eq!(slots[1].allocation_policy, None);

        // no L3 in the table: the slot is untouched entirely
        assert!(slots[2].size.is_none());
        assert!(slots[2].firmware_tag.is_none());
    }

    #[test]
    fn shared_cache_slots_carry_the_same_owner_tag() {
        let topo = sample_topology();
        let mut a = [CacheInfo::new(2, CacheKind::Unified)];
        let mut b = [CacheInfo::new(2, CacheKind::Unified)];
        topo.populate_cache_properties(0, &mut a).unwrap();
        topo.populate_cache_properties(1, &mut b).unwrap();

        assert!(a[0].firmware_tag.is_some());
        assert_eq!(a[0].firmware_tag, b[0].firmware_tag);

        // private L1 slots resolve to different owners
        let mut a = [CacheInfo::new(1, CacheKind::Data)];
        let mut b = [CacheInfo::new(1, CacheKind::Data)];
        topo.populate_cache_properties(0, &mut a).unwrap();
        topo.populate_cache_properties(1, &mut b).unwrap();
        assert_ne!(a[0].firmware_tag, b[0].firmware_tag);
    }

    #[test]
    fn tags_group_cpus_by_ancestor_level() {
        let topo = sample_topology();

        assert_eq!(topo.topology_tag(0, 0).unwrap(), 10);
        assert_eq!(topo.topology_tag(1, 0).unwrap(), 11);

        let cluster0 = topo.topology_tag(0, 1).unwrap();
        let cluster1 = topo.topology_tag(1, 1).unwrap();
        assert_eq!(cluster0, cluster1);
        assert_ne!(cluster0, 10);

        assert_eq!(topo.package_tag(0).unwrap(), topo.package_tag(1).unwrap());

        // repeated queries over an unchanged table agree
        assert_eq!(topo.topology_tag(0, 1).unwrap(), cluster0);
    }

    #[test]
    fn unknown_cpu_and_missing_processor_are_distinct_errors() {
        let topo = sample_topology();
        assert!(matches!(
            topo.topology_tag(9, 0),
            Err(PpttError::UnknownCpu(9))
        ));

        let mut slots = [CacheInfo::new(1, CacheKind::Data)];
        assert!(matches!(
            topo.populate_cache_properties(9, &mut slots),
            Err(PpttError::UnknownCpu(9))
        ));

        // mapped, but the table has no leaf record with that id
        let table = {
            let mut builder = TableBuilder::new();
            builder.processor(0, 0, 1, &[]);
            Arc::new(TableBuffer::new(builder.build()).unwrap())
        };
        let topo = CpuTopology::new(table, vec![42]);
        assert!(matches!(
            topo.populate_cache_properties(0, &mut slots),
            Err(PpttError::ProcessorNotFound(42))
        ));
        assert_eq!(topo.last_cache_level(0), 0);
    }

    #[test]
    fn global_registry_round_trip() {
        let shared = initialize(sample_topology());
        let fetched = global().expect("snapshot was just installed");
        assert!(Arc::ptr_eq(&shared, &fetched));
        assert_eq!(fetched.last_cache_level(0), 2);
    }
}
