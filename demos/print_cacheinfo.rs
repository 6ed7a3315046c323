//! Fills the usual set of cache-info slots for CPU 0 from the firmware
//! table and prints whatever the table was willing to say.

use pptt_rs::{CacheInfo, CacheKind, CpuTopology, PpttResult, SysfsTableSource, TableSource};

fn main() -> PpttResult<()> {
    let table = SysfsTableSource::new().acquire()?;
    let topo = CpuTopology::new(table, vec![0]);

    let mut slots = [
        CacheInfo::new(1, CacheKind::Data),
        CacheInfo::new(1, CacheKind::Instruction),
        CacheInfo::new(2, CacheKind::Unified),
        CacheInfo::new(3, CacheKind::Unified),
    ];
    topo.populate_cache_properties(0, &mut slots)?;

    for slot in &slots {
        println!("L{} {:?}:", slot.level, slot.kind);
        match slot.firmware_tag {
            Some(tag) => println!("  owner node {tag:#x}"),
            None => {
                println!("  not described by the table");
                continue;
            }
        }
        if let Some(size) = slot.size {
            println!("  size {size} bytes");
        }
        if let Some(line) = slot.line_size {
            println!("  line size {line} bytes");
        }
        if let Some(sets) = slot.number_of_sets {
            println!("  {sets} sets");
        }
        if let Some(ways) = slot.associativity {
            println!("  {ways}-way");
        }
        if let Some(policy) = slot.write_policy {
            println!("  write policy {policy:?}");
        }
        if let Some(policy) = slot.allocation_policy {
            println!("  allocation {policy:?}");
        }
    }

    Ok(())
}
