//! Periodic memory sampling loop.
//!
//! # Responsibilities
//! - Sample on a fixed interval and log/export every snapshot
//! - Decide whether the snapshot warrants an advisory reclaim
//! - Exit promptly on shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::SupervisorConfig;
use crate::observability::metrics;
use crate::supervisor::reclaim::Reclaimer;
use crate::supervisor::sampler::{MemorySample, ResourceSampler};

/// Why a reclaim was requested.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReclaimReason {
    ContainerRatio(f64),
    HeapRatio(f64),
    External(u64),
}

/// Apply the trigger heuristic to one sample.
///
/// The container ratio is authoritative when the group has a limit; the
/// heap ratio is consulted only without one. Buffered body memory is
/// checked either way.
pub fn should_reclaim(sample: &MemorySample, ratio_threshold: f64, external_threshold: u64) -> Option<ReclaimReason> {
    match sample.container.and_then(|c| c.ratio()) {
        Some(ratio) if ratio > ratio_threshold => return Some(ReclaimReason::ContainerRatio(ratio)),
        Some(_) => {}
        None => {
            if let Some(ratio) = sample.heap_ratio().filter(|r| *r > ratio_threshold) {
                return Some(ReclaimReason::HeapRatio(ratio));
            }
        }
    }
    (sample.external > external_threshold).then_some(ReclaimReason::External(sample.external))
}

pub struct MemoryMonitor {
    sampler: Box<dyn ResourceSampler>,
    reclaimer: Option<Arc<dyn Reclaimer>>,
    config: SupervisorConfig,
}

impl MemoryMonitor {
    pub fn new(
        config: SupervisorConfig,
        sampler: Box<dyn ResourceSampler>,
        reclaimer: Option<Arc<dyn Reclaimer>>,
    ) -> Self {
        Self {
            sampler,
            reclaimer,
            config,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Memory supervisor disabled");
            return;
        }

        tracing::info!(
            interval_minutes = self.config.interval_minutes,
            sampler = self.sampler.name(),
            reclaimer = self.reclaimer.as_ref().map(|r| r.name()),
            "Memory supervisor starting"
        );

        let interval = Duration::from_secs(self.config.interval_minutes.max(1) * 60);
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Memory supervisor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Take one sample and act on it.
    pub async fn tick(&self) -> Option<ReclaimReason> {
        let sample = self.sampler.sample();
        sample.log(self.sampler.name());
        export(&sample);

        let reason = should_reclaim(
            &sample,
            self.config.usage_ratio_threshold,
            self.config.external_threshold_bytes,
        )?;

        let Some(reclaimer) = &self.reclaimer else {
            tracing::debug!(reason = ?reason, "Reclaim warranted but no reclaimer available");
            return Some(reason);
        };

        tracing::info!(reason = ?reason, reclaimer = reclaimer.name(), "Requesting memory reclaim");
        match reclaimer.reclaim().await {
            Ok(()) => metrics::record_reclaim(),
            Err(e) => tracing::warn!(error = %e, "Memory reclaim failed"),
        }
        Some(reason)
    }
}

fn export(sample: &MemorySample) {
    metrics::record_memory("resident", sample.resident);
    metrics::record_memory("heap_used", sample.heap_used);
    metrics::record_memory("heap_total", sample.heap_total);
    metrics::record_memory("external", sample.external);
    if let Some(c) = sample.container {
        metrics::record_memory("container_usage", c.usage);
        if let Some(limit) = c.limit {
            metrics::record_memory("container_limit", limit);
        }
    }
}
