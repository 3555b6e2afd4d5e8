//! Background service-config saver.
//!
//! Saving is coalesced: a service sits on the queue at most once, and a
//! second request with `restart` set upgrades the queued state to "save
//! then restart". The saver thread pops one service at a time and works
//! under the global lock domain.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::context::PvrContext;

use super::{Service, ServiceStatus, PS_NONE, PS_SAVE, PS_SAVE_RESTART};

struct SaverInner {
    queue: Mutex<VecDeque<Arc<Service>>>,
    cond: Condvar,
    running: AtomicBool,
}

/// Queue plus worker thread writing service configuration asynchronously.
pub struct AsyncSaver {
    inner: Arc<SaverInner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncSaver {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(SaverInner {
                queue: Mutex::new(VecDeque::new()),
                cond: Condvar::new(),
                running: AtomicBool::new(true),
            }),
            thread: Mutex::new(None),
        }
    }

    pub(crate) fn start(&self, ctx: Weak<PvrContext>) {
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("service-saver".into())
            .spawn(move || saver_thread(inner, ctx))
            .unwrap_or_else(|e| panic!("failed to spawn saver thread: {e}"));
        *self.thread.lock() = Some(handle);
    }

    /// Queues `svc` for saving; `restart` additionally restarts it after
    /// the save when it is still running. Inserts once, upgrades in place.
    pub fn request_save(&self, svc: &Arc<Service>, restart: bool) {
        let mut q = self.inner.queue.lock();
        if svc.save_state.load(Ordering::Relaxed) == PS_NONE {
            svc.save_state.store(
                if restart { PS_SAVE_RESTART } else { PS_SAVE },
                Ordering::Relaxed,
            );
            q.push_back(Arc::clone(svc));
            self.inner.cond.notify_one();
        } else if restart {
            // upgrade to restart too
            svc.save_state.store(PS_SAVE_RESTART, Ordering::Relaxed);
        }
    }

    #[cfg(test)]
    pub(crate) fn queued_len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Stops the worker thread, draining nothing further.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.cond.notify_one();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn saver_thread(inner: Arc<SaverInner>, ctx: Weak<PvrContext>) {
    let mut q = inner.queue.lock();
    while inner.running.load(Ordering::SeqCst) {
        let svc = match q.pop_front() {
            Some(svc) => svc,
            None => {
                inner.cond.wait(&mut q);
                continue;
            }
        };
        let restart = svc.save_state.swap(PS_NONE, Ordering::Relaxed) == PS_SAVE_RESTART;
        drop(q);

        if let Some(ctx) = ctx.upgrade() {
            if svc.state().status != ServiceStatus::Zombie {
                svc.source().config_save(&svc);
            }
            if restart && svc.state().status == ServiceStatus::Running {
                svc.restart(&ctx, true);
            }
        }

        q = inner.queue.lock();
    }
}
