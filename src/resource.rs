// src/resource.rs
//!
//! # Resource Monitor
//!
//! Enforces file-count, byte, concurrency, timeout, rate, and memory budgets
//! and exposes a metrics snapshot. The state machine `Normal -> Degraded ->
//! EmergencyStop` is forward-only and driven solely by the hard memory check.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sysinfo::{Pid, System};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::ResourceLimits;
use crate::error::DigestError;

struct Flags {
    emergency_stop: bool,
    degradation_active: bool,
    violation_logged: HashSet<String>,
}

impl Flags {
    fn new() -> Self {
        Flags {
            emergency_stop: false,
            degradation_active: false,
            violation_logged: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Metrics {
    pub files_processed: u64,
    pub total_size_processed: u64,
    pub concurrent_reads: u32,
    pub max_concurrent_reads: usize,
    pub processing_duration: Duration,
    pub average_file_size: f64,
    pub processing_rate: f64,
    pub memory_usage_mb: f64,
    pub max_memory_usage_mb: u64,
    pub violations_detected: usize,
    pub degradation_active: bool,
    pub emergency_stop_active: bool,
    pub last_updated: Instant,
}

/// Enforces the six resource budgets named in the configuration surface and
/// tracks the process-wide counters they're measured against.
pub struct Monitor {
    limits: ResourceLimits,
    enabled: bool,

    files_processed: AtomicU64,
    total_size_processed: AtomicU64,
    concurrent_reads: AtomicU32,

    flags: Mutex<Flags>,
    start_time: Instant,

    rate_tokens: AtomicU32,
    rate_notify: Notify,
    rate_capacity: u32,
    refill_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,

    system: Arc<Mutex<System>>,
    pid: Pid,
}

impl Monitor {
    pub fn new(limits: ResourceLimits) -> Arc<Self> {
        let rate_capacity = limits.rate_limit_files_per_sec;
        let monitor = Arc::new(Monitor {
            enabled: limits.enabled,
            files_processed: AtomicU64::new(0),
            total_size_processed: AtomicU64::new(0),
            concurrent_reads: AtomicU32::new(0),
            flags: Mutex::new(Flags::new()),
            start_time: Instant::now(),
            rate_tokens: AtomicU32::new(rate_capacity),
            rate_notify: Notify::new(),
            rate_capacity,
            refill_handle: Mutex::new(None),
            system: Arc::new(Mutex::new(System::new())),
            pid: Pid::from_u32(std::process::id()),
            limits,
        });

        if rate_capacity > 0 {
            let weak = Arc::clone(&monitor);
            let handle = tokio::spawn(async move {
                let period = Duration::from_secs(1) / rate_capacity.max(1);
                let mut ticker = tokio::time::interval(period);
                loop {
                    ticker.tick().await;
                    let prev = weak.rate_tokens.fetch_update(
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                        |t| if t < weak.rate_capacity { Some(t + 1) } else { None },
                    );
                    if prev.is_ok() {
                        weak.rate_notify.notify_waiters();
                    }
                }
            });
            *monitor.refill_handle.lock().unwrap() = Some(handle);
        }

        monitor
    }

    /// Returns the shared memory-sampling handle so the backpressure manager
    /// can reuse the same `sysinfo::System` instead of opening a second probe.
    pub fn shared_system(&self) -> Arc<Mutex<System>> {
        Arc::clone(&self.system)
    }

    pub fn file_processing_timeout(&self) -> Option<Duration> {
        if self.limits.file_processing_timeout_sec == 0 {
            None
        } else {
            Some(Duration::from_secs(self.limits.file_processing_timeout_sec))
        }
    }

    pub fn overall_timeout(&self) -> Option<Duration> {
        if self.limits.overall_timeout_sec == 0 {
            None
        } else {
            Some(Duration::from_secs(self.limits.overall_timeout_sec))
        }
    }

    /// Admission check run before any I/O for a candidate file.
    pub fn validate_file_processing(&self, size: u64) -> Result<(), DigestError> {
        {
            let flags = self.flags.lock().unwrap();
            if flags.emergency_stop {
                return Err(DigestError::ResourceLimitMemory {
                    path: None,
                    emergency_stop: true,
                });
            }
        }

        if !self.enabled {
            return Ok(());
        }

        if self.files_processed.load(Ordering::Relaxed) >= self.limits.max_files {
            return Err(DigestError::ResourceLimitFiles { path: None });
        }

        let projected = self.total_size_processed.load(Ordering::Relaxed) + size;
        if projected > self.limits.max_total_size {
            return Err(DigestError::ResourceLimitTotalSize { path: None });
        }

        if let Some(timeout) = self.overall_timeout() {
            if self.start_time.elapsed() > timeout {
                return Err(DigestError::ResourceLimitTimeout { path: None });
            }
        }

        Ok(())
    }

    /// Acquires a read slot via a bounded compare-and-swap loop, sleeping
    /// briefly between attempts. Returns a cancellation error if `cancel`
    /// fires first.
    pub async fn acquire_read_slot(&self, cancel: &CancellationToken) -> Result<(), DigestError> {
        loop {
            let current = self.concurrent_reads.load(Ordering::SeqCst);
            if current < self.limits.max_concurrent_reads as u32 {
                if self
                    .concurrent_reads
                    .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return Ok(());
                }
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(DigestError::ResourceLimitConcurrency { path: None });
                }
                _ = tokio::time::sleep(Duration::from_millis(1)) => {}
            }
        }
    }

    /// Releases a read slot. Never blocks; over-release is a caller bug and
    /// is not guarded against.
    pub fn release_read_slot(&self) {
        self.concurrent_reads.fetch_sub(1, Ordering::SeqCst);
    }

    /// Takes one token from the rate-limiter bucket, or proceeds after a 1
    /// second advisory timeout, or returns cancellation.
    pub async fn wait_for_rate_limit(&self, cancel: &CancellationToken) -> Result<(), DigestError> {
        if self.rate_capacity == 0 {
            return Ok(());
        }

        loop {
            let current = self.rate_tokens.load(Ordering::SeqCst);
            if current > 0
                && self
                    .rate_tokens
                    .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                return Ok(());
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(DigestError::ResourceLimitRate { path: None });
                }
                _ = tokio::time::timeout(Duration::from_secs(1), self.rate_notify.notified()) => {}
            }

            if self.rate_tokens.load(Ordering::SeqCst) == 0 {
                tracing::warn!("rate limit wait exceeded 1s advisory timeout, proceeding");
                return Ok(());
            }
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

    /// Checks the hard memory ceiling, escalating Normal -> Degraded ->
    /// EmergencyStop as needed. Forward-only and sticky once Degraded or
    /// EmergencyStop is reached.
    pub fn check_hard_memory_limit(&self) -> Result<(), DigestError> {
        if !self.enabled || self.limits.hard_memory_limit_mb == 0 {
            return Ok(());
        }

        let ceiling_bytes = self.limits.hard_memory_limit_mb * 1024 * 1024;
        let usage = self.memory_usage_bytes();
        if usage <= ceiling_bytes {
            return Ok(());
        }

        let mut flags = self.flags.lock().unwrap();
        if flags.violation_logged.insert("hard_memory_limit".to_string()) {
            tracing::warn!(usage_bytes = usage, ceiling_bytes, "hard memory limit exceeded");
        }

        if !self.limits.enable_graceful_degradation {
            flags.emergency_stop = true;
            return Err(DigestError::ResourceLimitMemory {
                path: None,
                emergency_stop: true,
            });
        }

        drop(flags);
        let usage_after = self.memory_usage_bytes();
        let mut flags = self.flags.lock().unwrap();
        if usage_after > ceiling_bytes {
            flags.emergency_stop = true;
            Err(DigestError::ResourceLimitMemory {
                path: None,
                emergency_stop: true,
            })
        } else {
            flags.degradation_active = true;
            Ok(())
        }
    }

    pub fn record_file_processed(&self, size: u64) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.total_size_processed.fetch_add(size, Ordering::Relaxed);
    }

    pub fn metrics(&self) -> Metrics {
        let flags = self.flags.lock().unwrap();
        let files_processed = self.files_processed.load(Ordering::Relaxed);
        let total_size_processed = self.total_size_processed.load(Ordering::Relaxed);
        let duration = self.start_time.elapsed();
        let average_file_size = if files_processed > 0 {
            total_size_processed as f64 / files_processed as f64
        } else {
            0.0
        };
        let processing_rate = if duration.as_secs_f64() > 0.0 {
            files_processed as f64 / duration.as_secs_f64()
        } else {
            0.0
        };
        let memory_usage_mb = self.memory_usage_bytes() as f64 / (1024.0 * 1024.0);

        Metrics {
            files_processed,
            total_size_processed,
            concurrent_reads: self.concurrent_reads.load(Ordering::Relaxed),
            max_concurrent_reads: self.limits.max_concurrent_reads,
            processing_duration: duration,
            average_file_size,
            processing_rate,
            memory_usage_mb,
            max_memory_usage_mb: self.limits.hard_memory_limit_mb,
            violations_detected: flags.violation_logged.len(),
            degradation_active: flags.degradation_active,
            emergency_stop_active: flags.emergency_stop,
            last_updated: Instant::now(),
        }
    }

    /// Idempotent: stops the rate-limiter refill task if one is running.
    pub fn close(&self) {
        if let Some(handle) = self.refill_handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ResourceLimits {
        ResourceLimits {
            enabled: true,
            max_files: 2,
            max_total_size: 100,
            file_processing_timeout_sec: 0,
            overall_timeout_sec: 0,
            max_concurrent_reads: 2,
            rate_limit_files_per_sec: 0,
            hard_memory_limit_mb: 0,
            enable_graceful_degradation: true,
            enable_resource_monitoring: true,
        }
    }

    #[test]
    fn admits_within_budget() {
        let monitor = Monitor::new(limits());
        assert!(monitor.validate_file_processing(10).is_ok());
    }

    #[test]
    fn rejects_over_max_files() {
        let monitor = Monitor::new(limits());
        monitor.record_file_processed(10);
        monitor.record_file_processed(10);
        let err = monitor.validate_file_processing(10).unwrap_err();
        assert!(matches!(err, DigestError::ResourceLimitFiles { .. }));
    }

    #[test]
    fn rejects_over_total_size() {
        let monitor = Monitor::new(limits());
        let err = monitor.validate_file_processing(200).unwrap_err();
        assert!(matches!(err, DigestError::ResourceLimitTotalSize { .. }));
    }

    #[tokio::test]
    async fn read_slot_bounds_concurrency() {
        let monitor = Monitor::new(limits());
        let cancel = CancellationToken::new();
        monitor.acquire_read_slot(&cancel).await.unwrap();
        monitor.acquire_read_slot(&cancel).await.unwrap();
        assert_eq!(monitor.concurrent_reads.load(Ordering::SeqCst), 2);
        monitor.release_read_slot();
        assert_eq!(monitor.concurrent_reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_rate_limiter_never_blocks() {
        let monitor = Monitor::new(limits());
        let cancel = CancellationToken::new();
        monitor.wait_for_rate_limit(&cancel).await.unwrap();
    }

    #[test]
    fn disabled_master_switch_always_admits() {
        let mut l = limits();
        l.enabled = false;
        l.max_files = 0;
        let monitor = Monitor::new(l);
        assert!(monitor.validate_file_processing(1_000_000).is_ok());
    }

    #[test]
    fn hard_memory_limit_without_degradation_sets_sticky_emergency_stop() {
        let mut l = limits();
        l.hard_memory_limit_mb = 1;
        l.enable_graceful_degradation = false;
        let monitor = Monitor::new(l);

        let err = monitor.check_hard_memory_limit().unwrap_err();
        assert!(matches!(
            err,
            DigestError::ResourceLimitMemory {
                emergency_stop: true,
                ..
            }
        ));

        let err = monitor.validate_file_processing(1).unwrap_err();
        assert!(matches!(
            err,
            DigestError::ResourceLimitMemory {
                emergency_stop: true,
                ..
            }
        ));
    }
}
