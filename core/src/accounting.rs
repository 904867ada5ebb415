//! Memory and time accounting
//!
//! Counters are atomics so the controlling thread can publish the world clock
//! while a worker is resuming the guest, without taking the instance lock.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Instant;

/// Current wall-clock time in milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Default)]
pub struct Accountant {
    /// Kernel footprint plus fixed overhead, subtracted from the reported total
    kernel_memory: AtomicUsize,
    /// Accumulated guest execution time
    cpu_time_ns: AtomicI64,
    /// Set while a resume is in flight
    cpu_start: Mutex<Option<Instant>>,
    /// World time (ticks) at which the current run began
    time_started: AtomicI64,
    /// Latest world time (ticks) published by the host
    world_time: AtomicI64,
}

impl Accountant {
    pub fn new() -> Self {
        Self::default()
    }

    /* ===================== Memory ===================== */

    pub fn kernel_memory(&self) -> usize {
        self.kernel_memory.load(Ordering::Acquire)
    }

    pub fn set_kernel_memory(&self, bytes: usize) {
        self.kernel_memory.store(bytes, Ordering::Release);
    }

    /// Interpreter ceiling: the kernel floor plus the configured user budget
    pub fn memory_ceiling(&self, budget: usize) -> usize {
        self.kernel_memory().saturating_add(budget)
    }

    /* ===================== CPU time ===================== */

    /// Record the start of a resume
    pub fn begin_cpu(&self) {
        *self.cpu_start.lock() = Some(Instant::now());
    }

    /// Fold the time since [`Accountant::begin_cpu`] into the total
    pub fn end_cpu(&self) {
        if let Some(start) = self.cpu_start.lock().take() {
            let elapsed = start.elapsed().as_nanos().min(i64::MAX as u128) as i64;
            self.cpu_time_ns.fetch_add(elapsed, Ordering::AcqRel);
        }
    }

    pub fn cpu_time_ns(&self) -> i64 {
        self.cpu_time_ns.load(Ordering::Acquire)
    }

    pub fn set_cpu_time_ns(&self, ns: i64) {
        self.cpu_time_ns.store(ns, Ordering::Release);
    }

    /// Elapsed CPU clock in seconds, including an in-flight resume
    pub fn cpu_clock(&self) -> f64 {
        let running = self
            .cpu_start
            .lock()
            .map(|start| start.elapsed().as_nanos() as i64)
            .unwrap_or(0);
        (self.cpu_time_ns() + running) as f64 * 1e-9
    }

    /* ===================== World time ===================== */

    pub fn world_time(&self) -> i64 {
        self.world_time.load(Ordering::Acquire)
    }

    pub fn set_world_time(&self, ticks: i64) {
        self.world_time.store(ticks, Ordering::Release);
    }

    pub fn time_started(&self) -> i64 {
        self.time_started.load(Ordering::Acquire)
    }

    pub fn set_time_started(&self, ticks: i64) {
        self.time_started.store(ticks, Ordering::Release);
    }

    /// Seconds of world time since the current run began
    pub fn uptime(&self, ticks_per_second: u32) -> f64 {
        (self.world_time() - self.time_started()).max(0) as f64 / ticks_per_second.max(1) as f64
    }

    /// Zero every field when the interpreter is released
    pub fn reset(&self) {
        self.kernel_memory.store(0, Ordering::Release);
        self.cpu_time_ns.store(0, Ordering::Release);
        *self.cpu_start.lock() = None;
        self.time_started.store(0, Ordering::Release);
    }
}
