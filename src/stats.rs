//! Dropout and throughput accounting shared with the audio callbacks.

use std::sync::atomic::{AtomicU64, Ordering};

/// Relaxed atomic counters bumped from the capture and render callbacks.
/// A dropout here is a health metric, not a failure; see
/// [`PlaythruEvent`](crate::events::PlaythruEvent) for per-occurrence
/// notifications.
#[derive(Debug, Default)]
pub struct DropoutStats {
    frames_captured: AtomicU64,
    frames_rendered: AtomicU64,
    underruns: AtomicU64,
    stale_fetches: AtomicU64,
    rejected_stores: AtomicU64,
}

impl DropoutStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add_captured(&self, frames: usize) {
        self.frames_captured
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_rendered(&self, frames: usize) {
        self.frames_rendered
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale(&self) {
        self.stale_fetches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected_store(&self) {
        self.rejected_stores.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            stale_fetches: self.stale_fetches.load(Ordering::Relaxed),
            rejected_stores: self.rejected_stores.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of the counters at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub frames_rendered: u64,
    pub underruns: u64,
    pub stale_fetches: u64,
    pub rejected_stores: u64,
}

impl StatsSnapshot {
    /// Total fetches that came back with silence substituted somewhere.
    pub fn dropouts(&self) -> u64 {
        self.underruns + self.stale_fetches
    }
}
