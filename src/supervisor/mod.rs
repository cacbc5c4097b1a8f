//! Resource supervisor.
//!
//! # Data Flow
//! ```text
//! startup: sampler::detect(cgroup_root) → CgroupSampler | ProcessSampler
//! every interval:
//!     → ResourceSampler::sample → MemorySample (logged, exported as gauges)
//!     → monitor::should_reclaim
//!     → Reclaimer::reclaim (advisory, failures only logged)
//! shutdown: broadcast → loop exits
//! ```
//!
//! # Design Decisions
//! - Reclamation is housekeeping; nothing depends on it for correctness
//! - File probing happens once at startup, not on every tick

pub mod monitor;
pub mod reclaim;
pub mod sampler;

pub use monitor::{should_reclaim, MemoryMonitor, ReclaimReason};
pub use reclaim::{Reclaimer, SqliteReclaimer};
pub use sampler::{detect, CgroupSampler, MemorySample, ProcessSampler, ResourceSampler};
