//! Timer wheel driven by a dedicated thread.
//!
//! Callers arm one-shot callbacks against a [`TimerHandle`]; re-arming a
//! handle replaces its pending entry, disarming removes it synchronously.
//! Callbacks run on the wheel thread without the wheel lock held, so a
//! callback may re-arm its own handle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one armed (or re-armable) timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Allocates a fresh handle.
    pub fn new() -> Self {
        TimerHandle(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TimerHandle {
    fn default() -> Self {
        Self::new()
    }
}

struct TimerEntry {
    id: u64,
    deadline: Instant,
    callback: Box<dyn FnOnce() + Send>,
}

struct WheelInner {
    entries: Mutex<Vec<TimerEntry>>,
    cond: Condvar,
    running: AtomicBool,
}

/// Shared handle onto the timer wheel. Clones refer to the same wheel.
#[derive(Clone)]
pub struct TimerWheel {
    inner: Arc<WheelInner>,
}

impl TimerWheel {
    /// Creates a wheel and starts its driver thread.
    pub fn start() -> (Self, JoinHandle<()>) {
        let wheel = TimerWheel {
            inner: Arc::new(WheelInner {
                entries: Mutex::new(Vec::new()),
                cond: Condvar::new(),
                running: AtomicBool::new(true),
            }),
        };
        let inner = Arc::clone(&wheel.inner);
        let thread = std::thread::Builder::new()
            .name("timer".into())
            .spawn(move || wheel_thread(inner))
            .unwrap_or_else(|e| panic!("failed to spawn timer thread: {e}"));
        (wheel, thread)
    }

    /// Arms `handle` to fire `callback` after `delay`, replacing any
    /// pending entry for the same handle.
    pub fn arm(&self, handle: &TimerHandle, delay: Duration, callback: Box<dyn FnOnce() + Send>) {
        let mut entries = self.inner.entries.lock();
        entries.retain(|e| e.id != handle.0);
        entries.push(TimerEntry {
            id: handle.0,
            deadline: Instant::now() + delay,
            callback,
        });
        self.inner.cond.notify_one();
    }

    /// Removes any pending entry for `handle`.
    pub fn disarm(&self, handle: &TimerHandle) {
        self.inner.entries.lock().retain(|e| e.id != handle.0);
    }

    /// Stops the driver thread; pending entries are dropped and never
    /// fire. Dropping them here also releases callbacks that capture a
    /// handle onto this wheel.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.entries.lock().clear();
        self.inner.cond.notify_one();
    }
}

fn wheel_thread(inner: Arc<WheelInner>) {
    let mut entries = inner.entries.lock();
    while inner.running.load(Ordering::SeqCst) {
        let now = Instant::now();
        let mut due = Vec::new();
        let mut i = 0;
        while i < entries.len() {
            if entries[i].deadline <= now {
                due.push(entries.swap_remove(i));
            } else {
                i += 1;
            }
        }
        if !due.is_empty() {
            drop(entries);
            due.sort_by_key(|e| e.deadline);
            for e in due {
                (e.callback)();
            }
            entries = inner.entries.lock();
            continue;
        }
        match entries.iter().map(|e| e.deadline).min() {
            Some(next) => {
                inner.cond.wait_until(&mut entries, next);
            }
            None => {
                inner.cond.wait(&mut entries);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    #[test]
    fn fires_after_delay() {
        let (wheel, thread) = TimerWheel::start();
        let fired = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&fired);
        let h = TimerHandle::new();
        wheel.arm(
            &h,
            Duration::from_millis(10),
            Box::new(move || {
                f.fetch_add(1, Ordering::SeqCst);
            }),
        );
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        wheel.stop();
        thread.join().unwrap();
    }

    #[test]
    fn disarm_prevents_firing() {
        let (wheel, thread) = TimerWheel::start();
        let fired = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&fired);
        let h = TimerHandle::new();
        wheel.arm(
            &h,
            Duration::from_millis(30),
            Box::new(move || {
                f.fetch_add(1, Ordering::SeqCst);
            }),
        );
        wheel.disarm(&h);
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        wheel.stop();
        thread.join().unwrap();
    }

    #[test]
    fn rearming_replaces_the_pending_entry() {
        let (wheel, thread) = TimerWheel::start();
        let fired = Arc::new(AtomicU32::new(0));
        let h = TimerHandle::new();
        for _ in 0..3 {
            let f = Arc::clone(&fired);
            wheel.arm(
                &h,
                Duration::from_millis(20),
                Box::new(move || {
                    f.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        wheel.stop();
        thread.join().unwrap();
    }
}
