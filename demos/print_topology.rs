//! Prints cache level counts and topology tags for every CPU the firmware
//! table describes. Without platform glue the demo assumes the common
//! layout of sequential ACPI processor ids.

use pptt_rs::{CpuTopology, PpttResult, SysfsTableSource, TableSource};

fn main() -> PpttResult<()> {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1);

    let table = SysfsTableSource::new().acquire()?;
    println!("table revision {} ({} bytes)", table.revision(), table.bytes().len());

    let topo = CpuTopology::new(table, (0..cpus).collect::<Vec<u32>>());

    for cpu in 0..cpus {
        let levels = topo.last_cache_level(cpu);
        let core = topo.topology_tag(cpu, 0);
        let cluster = topo.topology_tag(cpu, 1);
        let package = topo.package_tag(cpu);
        println!(
            "cpu{cpu}: cache levels {levels}, core {core:?}, cluster {cluster:?}, package {package:?}"
        );
    }

    Ok(())
}
