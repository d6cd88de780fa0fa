#![forbid(unsafe_code)]

//! The background tick loop.
//!
//! One named thread calls [`TickTarget::tick`] on a fixed cadence until
//! stopped. Ticks never overlap: the loop is single-threaded, and a tick
//! that overruns its slot makes the next one start as soon as it returns
//! (counted as deferred) instead of running alongside it. Missed slots are
//! not replayed in a burst.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Tick panics | Logged, counted in [`SchedulerStats::panics`], loop continues |
//! | Tick overruns the interval | Next tick starts immediately, counted as deferred |
//! | Thread spawn fails | [`spawn`] returns the I/O error |

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use scoreboard_core::Tick;

use crate::config::PanelConfig;

// ─────────────────────────────────────────────────────────────────────────────
// Stop signal
// ─────────────────────────────────────────────────────────────────────────────

/// Signal for stopping the loop.
///
/// Checked between ticks; waiting on it doubles as the inter-tick sleep.
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    /// Create a new (signal, trigger) pair.
    #[must_use]
    pub fn new() -> (Self, StopTrigger) {
        let inner = Arc::new((Mutex::new(false), Condvar::new()));
        let signal = Self {
            inner: Arc::clone(&inner),
        };
        (signal, StopTrigger { inner })
    }

    /// Whether the trigger fired.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for the trigger or a timeout.
    ///
    /// Returns `true` if stopped, `false` if timed out. Spurious wakeups
    /// are absorbed.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut stopped = lock.lock().unwrap_or_else(|e| e.into_inner());
        if *stopped {
            return true;
        }

        let start = Instant::now();
        let mut remaining = duration;
        loop {
            let (guard, result) = cvar
                .wait_timeout(stopped, remaining)
                .unwrap_or_else(|e| e.into_inner());
            stopped = guard;
            if *stopped {
                return true;
            }
            if result.timed_out() {
                return false;
            }
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return false;
            }
            remaining = duration - elapsed;
        }
    }
}

/// Fires a [`StopSignal`].
pub struct StopTrigger {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopTrigger {
    /// Signal the loop to stop.
    pub fn stop(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner()) = true;
        cvar.notify_all();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reports
// ─────────────────────────────────────────────────────────────────────────────

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Animation clock after advancing.
    pub clock: Tick,
    /// Online viewers visited.
    pub viewers: usize,
    /// Frames pushed to the backend.
    pub rendered: usize,
    /// Viewers whose frame was identical to what they already see.
    pub unchanged: usize,
    /// Panels blanked because nothing resolved.
    pub cleared: usize,
    /// Skipped: disabled.
    pub skipped_disabled: usize,
    /// Skipped: hidden.
    pub skipped_hidden: usize,
    /// Skipped: no panel.
    pub skipped_no_panel: usize,
    /// Skipped: went offline mid-tick.
    pub skipped_offline: usize,
    /// Backend calls that failed or panicked.
    pub failed: usize,
    /// Backend calls slower than the budget.
    pub slow_calls: usize,
}

/// Totals accumulated by the background loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Ticks run.
    pub ticks: u64,
    /// Ticks started late because the previous one overran.
    pub deferred: u64,
    /// Ticks that panicked.
    pub panics: u64,
    /// Frames pushed.
    pub rendered: u64,
    /// Failed backend calls.
    pub failed: u64,
    /// Slow backend calls.
    pub slow_calls: u64,
    /// Longest tick.
    pub longest_tick: Duration,
    /// Clock value after the last tick.
    pub last_clock: Tick,
}

impl SchedulerStats {
    fn record(&mut self, report: &TickReport, elapsed: Duration) {
        self.ticks += 1;
        self.rendered += report.rendered as u64;
        self.failed += report.failed as u64;
        self.slow_calls += report.slow_calls as u64;
        self.longest_tick = self.longest_tick.max(elapsed);
        self.last_clock = report.clock;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loop
// ─────────────────────────────────────────────────────────────────────────────

/// Something the scheduler ticks.
pub trait TickTarget: Send + Sync {
    /// Run one tick.
    fn tick(&self) -> TickReport;
}

/// Scheduler timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Time between tick starts.
    pub tick_interval: Duration,
    /// Time before the first tick.
    pub initial_delay: Duration,
}

impl From<&PanelConfig> for SchedulerConfig {
    fn from(config: &PanelConfig) -> Self {
        Self {
            tick_interval: config.tick_interval,
            initial_delay: config.initial_delay,
        }
    }
}

/// Run the loop on the current thread until `stop` fires.
pub fn run(target: &dyn TickTarget, config: SchedulerConfig, stop: &StopSignal) -> SchedulerStats {
    let mut stats = SchedulerStats::default();
    if stop.wait_timeout(config.initial_delay) {
        return stats;
    }

    let mut next = Instant::now();
    loop {
        let started = Instant::now();
        match panic::catch_unwind(AssertUnwindSafe(|| target.tick())) {
            Ok(report) => {
                stats.record(&report, started.elapsed());
                if report.failed > 0 {
                    tracing::warn!(
                        clock = report.clock,
                        failed = report.failed,
                        viewers = report.viewers,
                        "backend calls failed this tick"
                    );
                }
            }
            Err(_) => {
                stats.ticks += 1;
                stats.panics += 1;
                tracing::error!(tick = stats.ticks, "tick panicked; continuing");
            }
        }

        next += config.tick_interval;
        let now = Instant::now();
        if now >= next {
            stats.deferred += 1;
            tracing::trace!(
                overrun_us = (now - next).as_micros() as u64,
                "tick overran its slot"
            );
            next = now;
            if stop.is_stopped() {
                break;
            }
            continue;
        }
        if stop.wait_timeout(next - now) {
            break;
        }
    }
    stats
}

/// Handle to the background loop.
///
/// Dropping the handle stops the loop without waiting for it.
pub struct SchedulerHandle {
    trigger: StopTrigger,
    thread: Option<thread::JoinHandle<SchedulerStats>>,
}

impl SchedulerHandle {
    /// Stop the loop, wait for the current tick to finish, and return totals.
    pub fn stop(mut self) -> SchedulerStats {
        self.trigger.stop();
        let stats = self
            .thread
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        tracing::info!(
            ticks = stats.ticks,
            deferred = stats.deferred,
            panics = stats.panics,
            "scheduler stopped"
        );
        stats
    }

    /// Whether the loop thread is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.trigger.stop();
    }
}

/// Start the loop on a named background thread.
pub fn spawn(target: Arc<dyn TickTarget>, config: SchedulerConfig) -> std::io::Result<SchedulerHandle> {
    let (signal, trigger) = StopSignal::new();
    let thread = thread::Builder::new()
        .name("scoreboard-scheduler".into())
        .spawn(move || run(target.as_ref(), config, &signal))?;
    tracing::info!(
        interval_ms = config.tick_interval.as_millis() as u64,
        initial_delay_ms = config.initial_delay.as_millis() as u64,
        "scheduler started"
    );
    Ok(SchedulerHandle {
        trigger,
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        ticks: AtomicU64,
        in_flight: AtomicBool,
        overlaps: AtomicUsize,
        work: Duration,
        panic_on: Option<u64>,
    }

    impl TickTarget for Counter {
        fn tick(&self) -> TickReport {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            let n = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.work.is_zero() {
                thread::sleep(self.work);
            }
            self.in_flight.store(false, Ordering::SeqCst);
            if self.panic_on == Some(n) {
                panic!("tick {n} exploded");
            }
            TickReport {
                clock: n,
                ..TickReport::default()
            }
        }
    }

    fn fast() -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_millis(2),
            initial_delay: Duration::ZERO,
        }
    }

    fn wait_for(target: &Counter, ticks: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while target.ticks.load(Ordering::SeqCst) < ticks && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn stop_signal_wait_timeout() {
        let (signal, trigger) = StopSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(5)));
        trigger.stop();
        assert!(signal.wait_timeout(Duration::from_secs(10)));
        assert!(signal.is_stopped());
    }

    #[test]
    fn stop_before_initial_delay_runs_nothing() {
        let target = Arc::new(Counter::default());
        let handle = spawn(
            target.clone(),
            SchedulerConfig {
                tick_interval: Duration::from_millis(1),
                initial_delay: Duration::from_secs(60),
            },
        )
        .unwrap();
        let stats = handle.stop();
        assert_eq!(stats.ticks, 0);
        assert_eq!(target.ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn loop_ticks_until_stopped() {
        let target = Arc::new(Counter::default());
        let handle = spawn(target.clone(), fast()).unwrap();
        wait_for(&target, 5);
        assert!(handle.is_running());
        let stats = handle.stop();
        assert!(stats.ticks >= 5);
        assert_eq!(stats.ticks, target.ticks.load(Ordering::SeqCst));
        assert_eq!(stats.last_clock, stats.ticks);
    }

    #[test]
    fn slow_ticks_are_deferred_not_overlapped() {
        let target = Arc::new(Counter {
            work: Duration::from_millis(6),
            ..Counter::default()
        });
        let handle = spawn(target.clone(), fast()).unwrap();
        wait_for(&target, 4);
        let stats = handle.stop();
        assert_eq!(target.overlaps.load(Ordering::SeqCst), 0);
        assert!(stats.deferred >= 3, "{stats:?}");
    }

    #[test]
    fn panicking_tick_does_not_kill_loop() {
        let target = Arc::new(Counter {
            panic_on: Some(2),
            ..Counter::default()
        });
        let handle = spawn(target.clone(), fast()).unwrap();
        wait_for(&target, 4);
        let stats = handle.stop();
        assert_eq!(stats.panics, 1);
        assert!(stats.ticks >= 4);
    }
}
