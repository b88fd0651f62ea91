// src/backpressure.rs
//!
//! # Backpressure Manager
//!
//! Two independent pressure sources: a memory sampler (shares the resource
//! monitor's `sysinfo` handle) and queue-fill sensing over the two bounded
//! channels. Both are advisory: they insert sleeps, never hard errors.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sysinfo::{Pid, System};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::BackpressureSettings;

#[derive(Debug, Clone, Copy)]
pub struct BackpressureStats {
    pub enabled: bool,
    pub files_processed: u64,
    pub current_memory_usage: u64,
    pub max_memory_usage: u64,
    pub memory_warning_active: bool,
    pub last_memory_check: Instant,
    pub max_pending_files: usize,
    pub max_pending_writes: usize,
}

pub struct Manager {
    settings: BackpressureSettings,
    files_observed: AtomicU64,
    memory_warning_active: AtomicBool,
    last_memory_check: Mutex<Instant>,
    system: Arc<Mutex<System>>,
    pid: Pid,
}

impl Manager {
    pub fn new(settings: BackpressureSettings, system: Arc<Mutex<System>>) -> Self {
        Manager {
            settings,
            files_observed: AtomicU64::new(0),
            memory_warning_active: AtomicBool::new(false),
            last_memory_check: Mutex::new(Instant::now()),
            system,
            pid: Pid::from_u32(std::process::id()),
        }
    }

    fn memory_usage_bytes(&self) -> u64 {
        let mut system = self.system.lock().unwrap();
        system.refresh_process(self.pid);
        system
            .process(self.pid)
            .map(|p| p.memory())
            .unwrap_or(0)
    }

    /// Increments the file counter and, on every `memory_check_interval`th
    /// call (or every call if the interval is non-positive), samples memory
    /// usage against the ceiling.
    pub fn should_apply_backpressure(&self) -> bool {
        if !self.settings.enabled {
            return false;
        }

        let count = self.files_observed.fetch_add(1, Ordering::Relaxed) + 1;
        let interval = self.settings.memory_check_interval;
        let should_sample = interval == 0 || count % interval.max(1) == 0;
        if !should_sample {
            return self.memory_warning_active.load(Ordering::Relaxed);
        }

        *self.last_memory_check.lock().unwrap() = Instant::now();
        let usage = self.memory_usage_bytes();
        let over_ceiling = usage > self.settings.max_memory_usage;

        if over_ceiling {
            self.memory_warning_active.store(true, Ordering::Relaxed);
        } else if (usage as f64) < (self.settings.max_memory_usage as f64) * 0.8 {
            self.memory_warning_active.store(false, Ordering::Relaxed);
        }

        over_ceiling
    }

    /// Runs a best-effort memory-pressure pause: briefly yields and sleeps
    /// 10ms, interruptible by cancellation.
    pub async fn apply_backpressure(&self, cancel: &CancellationToken) {
        if !self.settings.enabled {
            return;
        }
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_millis(10)) => {}
        }
    }

    /// Sleeps 5ms if `queue` is at or above 90% of `capacity`. Used by each
    /// producer at its own send site, the walker before pushing onto the
    /// file queue, the processor before pushing onto the write queue,
    /// rather than a single call inspecting both queues, since holding a
    /// `Sender` clone across an `await` inside a task that also drains the
    /// paired `Receiver` would prevent that channel from ever reporting
    /// closed.
    pub async fn wait_if_full<T>(
        &self,
        queue: &mpsc::Sender<T>,
        capacity: usize,
        cancel: &CancellationToken,
    ) {
        if !self.settings.enabled || capacity == 0 {
            return;
        }
        if !is_queue_full(queue, capacity) {
            return;
        }
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_millis(5)) => {}
        }
    }

    /// Creates the file and write queues. When disabled, returns queues of
    /// capacity 1 (`tokio::sync::mpsc` has no true zero-buffer channel, so a
    /// capacity-1 channel is the closest rendezvous approximation).
    pub fn create_channels<T, U>(
        &self,
    ) -> (
        (mpsc::Sender<T>, mpsc::Receiver<T>),
        (mpsc::Sender<U>, mpsc::Receiver<U>),
    ) {
        if self.settings.enabled {
            (
                mpsc::channel(self.settings.max_pending_files.max(1)),
                mpsc::channel(self.settings.max_pending_writes.max(1)),
            )
        } else {
            (mpsc::channel(1), mpsc::channel(1))
        }
    }

    pub fn stats(&self) -> BackpressureStats {
        BackpressureStats {
            enabled: self.settings.enabled,
            files_processed: self.files_observed.load(Ordering::Relaxed),
            current_memory_usage: self.memory_usage_bytes(),
            max_memory_usage: self.settings.max_memory_usage,
            memory_warning_active: self.memory_warning_active.load(Ordering::Relaxed),
            last_memory_check: *self.last_memory_check.lock().unwrap(),
            max_pending_files: self.settings.max_pending_files,
            max_pending_writes: self.settings.max_pending_writes,
        }
    }
}

pub(crate) fn is_queue_full<T>(sender: &mpsc::Sender<T>, capacity: usize) -> bool {
    let available = sender.capacity();
    let occupied = capacity.saturating_sub(available);
    (occupied as f64) >= (capacity as f64) * 0.9
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BackpressureSettings {
        BackpressureSettings {
            enabled: true,
            max_memory_usage: 1,
            memory_check_interval: 1,
            max_pending_files: 4,
            max_pending_writes: 4,
        }
    }

    #[test]
    fn disabled_never_applies_backpressure() {
        let mut s = settings();
        s.enabled = false;
        let mgr = Manager::new(s, Arc::new(Mutex::new(System::new())));
        assert!(!mgr.should_apply_backpressure());
    }

    #[test]
    fn sampling_triggers_on_every_call_when_interval_is_one() {
        let mgr = Manager::new(settings(), Arc::new(Mutex::new(System::new())));
        // max_memory_usage=1 byte guarantees the process is "over ceiling".
        assert!(mgr.should_apply_backpressure());
    }

    #[tokio::test]
    async fn create_channels_disabled_yields_small_capacity() {
        let mut s = settings();
        s.enabled = false;
        let mgr = Manager::new(s, Arc::new(Mutex::new(System::new())));
        let ((file_tx, _file_rx), (write_tx, _write_rx)) = mgr.create_channels::<u8, u8>();
        assert_eq!(file_tx.capacity(), 1);
        assert_eq!(write_tx.capacity(), 1);
    }

    #[tokio::test]
    async fn create_channels_enabled_matches_configured_capacity() {
        let mgr = Manager::new(settings(), Arc::new(Mutex::new(System::new())));
        let ((file_tx, _file_rx), (write_tx, _write_rx)) = mgr.create_channels::<u8, u8>();
        assert_eq!(file_tx.capacity(), 4);
        assert_eq!(write_tx.capacity(), 4);
    }
}
