//! Memory samplers.
//!
//! # Responsibilities
//! - Read process memory from `/proc/self/status`
//! - Read container usage/limit from the cgroup filesystem (v2, then v1)
//! - Pick one implementation at startup by probing the files once

use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::raw::buffered_bytes;

const MIB: f64 = 1024.0 * 1024.0;

/// v1 reports "unlimited" as a page-aligned i64::MAX; anything this large
/// is treated as no limit.
const CGROUP_V1_UNLIMITED: u64 = 1 << 60;

/// Container-level usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerUsage {
    pub usage: u64,
    /// `None` when the group is unlimited.
    pub limit: Option<u64>,
}

impl ContainerUsage {
    pub fn ratio(&self) -> Option<f64> {
        self.limit
            .filter(|l| *l > 0)
            .map(|l| self.usage as f64 / l as f64)
    }
}

/// One normalized snapshot. All values are bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemorySample {
    /// Resident set size.
    pub resident: u64,
    /// Anonymous resident memory, the closest analogue of a live heap.
    pub heap_used: u64,
    /// Data segment size, the heap's current reservation.
    pub heap_total: u64,
    /// Request bodies held in memory by the ingestion pipeline.
    pub external: u64,
    pub container: Option<ContainerUsage>,
}

impl MemorySample {
    pub fn heap_ratio(&self) -> Option<f64> {
        (self.heap_total > 0).then(|| self.heap_used as f64 / self.heap_total as f64)
    }

    /// Log the snapshot in megabytes.
    pub fn log(&self, sampler: &str) {
        let mb = |b: u64| (b as f64 / MIB * 10.0).round() / 10.0;
        match self.container {
            Some(c) => tracing::info!(
                sampler = sampler,
                rss_mb = mb(self.resident),
                heap_used_mb = mb(self.heap_used),
                heap_total_mb = mb(self.heap_total),
                external_mb = mb(self.external),
                container_usage_mb = mb(c.usage),
                container_limit_mb = ?c.limit.map(mb),
                container_ratio = ?c.ratio(),
                "Memory sample"
            ),
            None => tracing::info!(
                sampler = sampler,
                rss_mb = mb(self.resident),
                heap_used_mb = mb(self.heap_used),
                heap_total_mb = mb(self.heap_total),
                external_mb = mb(self.external),
                "Memory sample"
            ),
        }
    }
}

/// Source of memory samples.
pub trait ResourceSampler: Send + Sync {
    fn name(&self) -> &'static str;
    fn sample(&self) -> MemorySample;
}

/// Process-only sampler.
#[derive(Debug, Clone)]
pub struct ProcessSampler {
    status_path: PathBuf,
}

impl ProcessSampler {
    pub fn new() -> Self {
        Self::with_status_path("/proc/self/status")
    }

    pub fn with_status_path(path: impl Into<PathBuf>) -> Self {
        Self {
            status_path: path.into(),
        }
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for ProcessSampler {
    fn name(&self) -> &'static str {
        "process"
    }

    fn sample(&self) -> MemorySample {
        let mut sample = match fs::read_to_string(&self.status_path) {
            Ok(status) => parse_proc_status(&status),
            Err(e) => {
                tracing::debug!(path = %self.status_path.display(), error = %e, "Process status unavailable");
                MemorySample::default()
            }
        };
        sample.external = buffered_bytes();
        sample
    }
}

/// Which cgroup interface was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupVersion {
    V1,
    V2,
}

/// Container-aware sampler: process numbers plus cgroup usage/limit.
#[derive(Debug, Clone)]
pub struct CgroupSampler {
    process: ProcessSampler,
    version: CgroupVersion,
    usage_path: PathBuf,
    limit_path: PathBuf,
}

impl CgroupSampler {
    /// Probe `root` for a v2 interface, then a v1 one.
    pub fn probe(root: &Path, process: ProcessSampler) -> Option<Self> {
        let v2 = (root.join("memory.current"), root.join("memory.max"));
        if v2.0.is_file() {
            return Some(Self {
                process,
                version: CgroupVersion::V2,
                usage_path: v2.0,
                limit_path: v2.1,
            });
        }

        let v1_dir = root.join("memory");
        let v1 = (v1_dir.join("memory.usage_in_bytes"), v1_dir.join("memory.limit_in_bytes"));
        if v1.0.is_file() {
            return Some(Self {
                process,
                version: CgroupVersion::V1,
                usage_path: v1.0,
                limit_path: v1.1,
            });
        }
        None
    }

    pub fn version(&self) -> CgroupVersion {
        self.version
    }

    fn read_container(&self) -> Option<ContainerUsage> {
        let usage = read_u64(&self.usage_path)?;
        let limit = fs::read_to_string(&self.limit_path)
            .ok()
            .and_then(|raw| parse_limit(&raw));
        Some(ContainerUsage { usage, limit })
    }
}

impl ResourceSampler for CgroupSampler {
    fn name(&self) -> &'static str {
        match self.version {
            CgroupVersion::V1 => "cgroup-v1",
            CgroupVersion::V2 => "cgroup-v2",
        }
    }

    fn sample(&self) -> MemorySample {
        let mut sample = self.process.sample();
        sample.container = self.read_container();
        if sample.container.is_none() {
            tracing::debug!(path = %self.usage_path.display(), "Cgroup usage unreadable this tick");
        }
        sample
    }
}

/// Select the sampler for this process, probing the cgroup files once.
pub fn detect(cgroup_root: &Path) -> Box<dyn ResourceSampler> {
    match CgroupSampler::probe(cgroup_root, ProcessSampler::new()) {
        Some(sampler) => {
            tracing::info!(version = ?sampler.version(), root = %cgroup_root.display(), "Container memory accounting detected");
            Box::new(sampler)
        }
        None => {
            tracing::info!("No cgroup memory interface; sampling process memory only");
            Box::new(ProcessSampler::new())
        }
    }
}

/// Extract RSS / anonymous / data sizes from `/proc/<pid>/status`.
pub fn parse_proc_status(status: &str) -> MemorySample {
    let mut sample = MemorySample::default();
    for line in status.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kib) = rest.split_whitespace().next().and_then(|v| v.parse::<u64>().ok()) else {
            continue;
        };
        let bytes = kib * 1024;
        match key {
            "VmRSS" => sample.resident = bytes,
            "RssAnon" => sample.heap_used = bytes,
            "VmData" => sample.heap_total = bytes,
            _ => {}
        }
    }
    sample
}

fn parse_limit(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw == "max" {
        return None;
    }
    raw.parse::<u64>().ok().filter(|v| *v < CGROUP_V1_UNLIMITED)
}

fn read_u64(path: &Path) -> Option<u64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}
