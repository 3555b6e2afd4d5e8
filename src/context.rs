//! Application context.
//!
//! Everything that used to be a process-wide singleton lives here: the
//! service registry, the channel registry, the elementary-stream filter
//! rules, the descrambler clients, the async saver and the timer wheel.
//! The context is passed explicitly, so tests can run several engines
//! side by side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};

use crate::channel::Channel;
use crate::descrambler::CaClientRegistry;
use crate::service::filter::EsFilterSet;
use crate::service::saver::AsyncSaver;
use crate::service::Service;
use crate::timer::TimerWheel;

/// The engine: registries, rule sets, daemon threads.
pub struct PvrContext {
    services: Mutex<Vec<Arc<Service>>>,
    channels: Mutex<Vec<Arc<Channel>>>,
    /// Elementary-stream filter rules
    pub esfilters: RwLock<EsFilterSet>,
    /// Descrambler clients
    pub caclients: CaClientRegistry,
    /// Async service-config saver
    pub saver: AsyncSaver,
    /// Timer wheel
    pub timers: TimerWheel,
    running: AtomicBool,
    timer_thread: Mutex<Option<JoinHandle<()>>>,
}

impl PvrContext {
    /// Creates the context and starts its daemon threads (saver, timers).
    pub fn new() -> Arc<PvrContext> {
        let (timers, timer_thread) = TimerWheel::start();
        let ctx = Arc::new(PvrContext {
            services: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            esfilters: RwLock::new(EsFilterSet::new()),
            caclients: CaClientRegistry::new(),
            saver: AsyncSaver::new(),
            timers,
            running: AtomicBool::new(true),
            timer_thread: Mutex::new(Some(timer_thread)),
        });
        ctx.saver.start(Arc::downgrade(&ctx));
        ctx
    }

    /// True until [`shutdown`](Self::shutdown) ran.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the daemon threads. Idempotent.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.saver.stop();
        self.timers.stop();
        if let Some(handle) = self.timer_thread.lock().take() {
            let _ = handle.join();
        }
    }

    pub(crate) fn register_service(&self, svc: &Arc<Service>) {
        self.services.lock().push(Arc::clone(svc));
    }

    pub(crate) fn unregister_service(&self, svc: &Arc<Service>) {
        self.services.lock().retain(|s| !Arc::ptr_eq(s, svc));
    }

    /// Snapshot of all registered services.
    pub fn services(&self) -> Vec<Arc<Service>> {
        self.services.lock().clone()
    }

    /// Finds a service by id.
    pub fn find_service(&self, id: uuid::Uuid) -> Option<Arc<Service>> {
        self.services.lock().iter().find(|s| s.id() == id).cloned()
    }

    /// Creates and registers a channel.
    pub fn create_channel(&self, name: &str) -> Arc<Channel> {
        let ch = Channel::new(name, 0, None);
        self.channels.lock().push(Arc::clone(&ch));
        ch
    }

    /// Finds a channel by name.
    pub fn find_channel(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.lock().iter().find(|c| c.name() == name).cloned()
    }

    /// Snapshot of all channels.
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.channels.lock().clone()
    }
}

impl Drop for PvrContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_registry_finds_by_name() {
        let ctx = PvrContext::new();
        let ch = ctx.create_channel("One");
        assert!(Arc::ptr_eq(&ctx.find_channel("One").unwrap(), &ch));
        assert!(ctx.find_channel("Two").is_none());
        ctx.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let ctx = PvrContext::new();
        ctx.shutdown();
        ctx.shutdown();
        assert!(!ctx.is_running());
    }
}
