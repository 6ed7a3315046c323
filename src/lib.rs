//! `pptt-rs` --- CPU cache and topology extraction from the firmware
//! processor topology table.
//!
//! Firmware describes processing elements as an inverted tree of
//! offset-addressed records: processor records point at their parents, and
//! each one carries offsets to the cache records private to it, chained by
//! level. This crate walks that structure, untrusted bytes and all, to
//! answer four questions platform-initialization code keeps asking:
//!
//! - how many cache levels a CPU has ([`CpuTopology::last_cache_level`])
//! - what the per-level cache properties are, to override probed defaults
//!   ([`CpuTopology::populate_cache_properties`])
//! - which CPUs share a topological grouping at some level
//!   ([`CpuTopology::topology_tag`])
//! - which CPUs share a physical package ([`CpuTopology::package_tag`])
//!
//! Every query re-walks the raw table; nothing is cached or mutated, and a
//! missing or malformed table degrades to "no answer" rather than an abort.
//!
//! ```ignore
//! use pptt_rs::{CpuTopology, SysfsTableSource, TableSource};
//!
//! let table = SysfsTableSource::new().acquire()?;
//! let topo = CpuTopology::new(table, vec![0, 1, 2, 3]);
//! println!("cpu0 sees {} cache levels", topo.last_cache_level(0));
//! ```

pub mod acpi;
pub mod error;
pub mod topology;

// Re-export the types most callers need at the crate root.
pub use acpi::pptt::Pptt;
pub use acpi::raw::CacheKind;
pub use acpi::tables::{SysfsTableSource, TableBuffer, TableSource};
pub use error::{PpttError, PpttResult};
pub use topology::{AllocationPolicy, CacheInfo, CpuTopology, WritePolicy};
