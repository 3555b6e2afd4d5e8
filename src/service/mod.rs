//! # Services
//!
//! A service is one discoverable TV or radio program: an aggregate of
//! elementary streams with a status machine, a streaming pad fanning
//! messages out to subscribers, and a polymorphic source binding it to a
//! concrete input flavour.
//!
//! Locking: the global registry lock of [`crate::context::PvrContext`] is
//! outermost, the per-service stream mutex (guarding components, filtered
//! list, status, streaming-status flags and the pad target set) comes next,
//! then the streaming-queue locks of individual targets. Violating this
//! order is a bug.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use uuid::Uuid;

use crate::channel::Channel;
use crate::context::PvrContext;
use crate::descrambler::Mux;
use crate::streaming::{
    tss, SourceInfo, StartComponent, StreamingCode, StreamingMessage, StreamingPad, StreamingStart,
};
use crate::subscription::Subscription;
use crate::timer::TimerHandle;

pub mod filter;
pub mod instance;
pub mod persist;
pub mod saver;
pub mod stream;

use stream::{ElementaryStream, RateStat, StreamType};

/// Status of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Not feeding; no subscriptions, no pad targets
    Idle,
    /// Feeding packets to the pad
    Running,
    /// Destroyed, waiting for the last reference to drop
    Zombie,
}

/// Declared type of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceType {
    /// Unknown; classification falls back to component inspection
    #[default]
    None,
    /// High-definition TV
    Hdtv,
    /// Standard-definition TV
    Sdtv,
    /// Radio
    Radio,
}

/// Everything guarded by the service's stream mutex.
pub struct ServiceState {
    /// Current status
    pub status: ServiceStatus,
    /// Declared service type
    pub service_type: ServiceType,
    /// Program clock reference PID
    pub pcr_pid: u16,
    /// Program map table PID
    pub pmt_pid: u16,
    /// Full ordered component list
    pub components: Vec<ElementaryStream>,
    /// Positions into `components`, in filtered order
    pub filtered: Vec<usize>,
    /// Delivery hub for subscribers
    pub pad: StreamingPad,
    /// Streaming-status bitmask, see [`tss`]
    pub streaming_status: u32,
    /// Live bit, cleared by every data-timeout tick
    pub streaming_live: u32,
    /// A scrambled packet has been seen since start
    pub scrambled_seen: bool,
    /// Start time, unix epoch seconds
    pub start_time: i64,
    /// Display name, `adapter/network/mux/service`
    pub nicename: String,
    /// Byte length of the `adapter/network/mux` prefix in `nicename`
    pub nicename_prefidx: usize,
    /// Payload rate over the stat window
    pub rate: RateStat,
    last_pid: i32,
    last_pos: Option<usize>,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            status: ServiceStatus::Idle,
            service_type: ServiceType::None,
            pcr_pid: 0,
            pmt_pid: 0,
            components: Vec::new(),
            filtered: Vec::new(),
            pad: StreamingPad::new(),
            streaming_status: 0,
            streaming_live: 0,
            scrambled_seen: false,
            start_time: 0,
            nicename: String::new(),
            nicename_prefidx: 0,
            rate: RateStat::default(),
            last_pid: -1,
            last_pos: None,
        }
    }
}

impl ServiceState {
    /// Adds a stream, or returns the existing position when a stream with
    /// the same non-(-1) PID already exists. Indices are unique and
    /// monotonically assigned.
    pub fn stream_create(&mut self, pid: i32, stream_type: StreamType) -> usize {
        let mut idx = 0;
        for (pos, st) in self.components.iter().enumerate() {
            if st.index > idx {
                idx = st.index;
            }
            if pid != -1 && st.pid == pid {
                return pos;
            }
        }
        self.components
            .push(ElementaryStream::new(idx + 1, pid, stream_type));
        self.components.len() - 1
    }

    /// Finds a stream by PID, caching the last hit.
    pub fn stream_find(&mut self, pid: i32) -> Option<usize> {
        if self.last_pid == pid {
            return self.last_pos;
        }
        let pos = self.components.iter().position(|st| st.pid == pid)?;
        self.last_pid = pid;
        self.last_pos = Some(pos);
        Some(pos)
    }

    /// Destroys the stream at `pos`, fixing up the filtered list and the
    /// lookup cache.
    pub fn stream_destroy(&mut self, pos: usize) {
        if pos >= self.components.len() {
            return;
        }
        if self.status == ServiceStatus::Running {
            self.components[pos].clean();
        }
        self.components[pos].rate.flush();
        self.components[pos].cc_errors.flush();
        self.last_pid = -1;
        self.last_pos = None;
        self.components.remove(pos);
        self.filtered.retain(|&p| p != pos);
        for p in &mut self.filtered {
            if *p > pos {
                *p -= 1;
            }
        }
    }

    /// Components currently admitted by the filter, in filtered order.
    pub fn filtered_streams(&self) -> impl Iterator<Item = &ElementaryStream> {
        self.filtered.iter().map(|&p| &self.components[p])
    }

    /// True when any component is a CA stream.
    pub fn is_encrypted(&self) -> bool {
        self.components
            .iter()
            .any(|st| st.stream_type == StreamType::Ca)
    }

    /// First nonzero CAID of the first CA component, 0 when clear.
    pub fn encryption_caid(&self) -> u16 {
        for st in &self.components {
            if st.stream_type == StreamType::Ca {
                if let Some(c) = st.caids.iter().find(|c| c.caid != 0) {
                    return c.caid;
                }
            }
        }
        0
    }
}

/// Polymorphic operations each input flavour implements for its services.
///
/// The optional operations default to "not provided", matching a service
/// created without them.
pub trait ServiceSource: Send + Sync {
    /// Starts feeding the given tuner instance. Errors propagate to the
    /// instance selector unmodified.
    fn start_feed(&self, svc: &Arc<Service>, instance: u32) -> Result<(), StreamingCode>;

    /// Stops the feed.
    fn stop_feed(&self, svc: &Arc<Service>);

    /// Refreshes the feed after a restart; default does nothing.
    fn refresh_feed(&self, svc: &Arc<Service>) {
        let _ = svc;
    }

    /// Whether the service may be used, under the given subscription flags.
    fn is_enabled(&self, svc: &Arc<Service>, flags: u32) -> bool {
        let _ = flags;
        svc.is_enabled()
    }

    /// Inserts or refreshes (prio, weight) candidates for this service
    /// into the instance list.
    fn enlist(&self, svc: &Arc<Service>, list: &mut instance::ServiceInstanceList, flags: u32);

    /// Describes where the data comes from.
    fn source_info(&self, svc: &Service) -> SourceInfo {
        let _ = svc;
        SourceInfo::default()
    }

    /// Seconds after start during which missing input is tolerated.
    fn grace_period(&self, svc: &Service) -> u32 {
        let _ = svc;
        10
    }

    /// Deletes backing state, optionally including persisted config.
    fn delete(&self, svc: &Arc<Service>, delete_config: bool) {
        let _ = (svc, delete_config);
    }

    /// Writes the service configuration to the persistence layer.
    fn config_save(&self, svc: &Service) {
        let _ = svc;
    }

    /// Channel name override, when the input knows one.
    fn channel_name(&self, svc: &Service) -> Option<String> {
        let _ = svc;
        None
    }

    /// Channel number, 0 when unknown.
    fn channel_number(&self, svc: &Service) -> i64 {
        let _ = svc;
        0
    }

    /// Channel icon URL.
    fn channel_icon(&self, svc: &Service) -> Option<String> {
        let _ = svc;
        None
    }

    /// Provider name.
    fn provider_name(&self, svc: &Service) -> Option<String> {
        let _ = svc;
        None
    }
}

/// Pending-save queue membership: not queued.
pub(crate) const PS_NONE: u8 = 0;
/// Pending-save queue membership: save requested.
pub(crate) const PS_SAVE: u8 = 1;
/// Pending-save queue membership: save then restart.
pub(crate) const PS_SAVE_RESTART: u8 = 2;

/// One discoverable program.
///
/// Shared between its owning input, its subscriptions and the async saver
/// via `Arc`; freed when the last reference drops.
pub struct Service {
    id: Uuid,
    enabled: AtomicBool,
    source: Box<dyn ServiceSource>,
    state: Mutex<ServiceState>,
    status_cond: Condvar,
    /// Live subscriptions; global-lock domain
    pub(crate) subscriptions: Mutex<Vec<Arc<Subscription>>>,
    /// Channel mappings; global-lock domain
    pub(crate) channels: Mutex<Vec<Weak<Channel>>>,
    mux: Mutex<Option<Arc<Mux>>>,
    pub(crate) receive_timer: TimerHandle,
    grace_delay: AtomicU32,
    pub(crate) save_state: AtomicU8,
}

impl Service {
    /// Creates a service, registers it with the context, and loads the
    /// optional persisted record.
    pub fn create(
        ctx: &PvrContext,
        source: Box<dyn ServiceSource>,
        conf: Option<&serde_json::Value>,
    ) -> Arc<Service> {
        let svc = Arc::new(Service {
            id: Uuid::new_v4(),
            enabled: AtomicBool::new(true),
            source,
            state: Mutex::new(ServiceState::default()),
            status_cond: Condvar::new(),
            subscriptions: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            mux: Mutex::new(None),
            receive_timer: TimerHandle::new(),
            grace_delay: AtomicU32::new(0),
            save_state: AtomicU8::new(PS_NONE),
        });
        ctx.register_service(&svc);
        if let Some(conf) = conf {
            persist::load(&svc, conf);
        }
        svc
    }

    /// Unique identifier registered with the UI node registry.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the service is administratively enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enables or disables the service.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// The polymorphic source operations.
    pub fn source(&self) -> &dyn ServiceSource {
        self.source.as_ref()
    }

    /// Locks the stream mutex.
    pub fn state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock()
    }

    /// The mux this service currently rides on, if the input set one.
    pub fn mux(&self) -> Option<Arc<Mux>> {
        self.mux.lock().clone()
    }

    /// Seconds of grace granted at the last start.
    pub fn grace_delay(&self) -> u32 {
        self.grace_delay.load(Ordering::Relaxed)
    }

    /// Called by the input when the service moves to a mux.
    pub fn set_mux(&self, mux: Option<Arc<Mux>>) {
        *self.mux.lock() = mux;
    }

    /// Display name.
    pub fn nicename(&self) -> String {
        self.state.lock().nicename.clone()
    }

    /// Starts the service on the given tuner instance.
    ///
    /// Precondition: status is not `Running`.
    pub fn start(
        self: &Arc<Self>,
        ctx: &PvrContext,
        instance: u32,
        postpone: u32,
    ) -> Result<(), StreamingCode> {
        log::trace!(target: "service", "starting {}", self.nicename());

        let ca_snapshot;
        {
            let mut st = self.state.lock();
            assert!(st.status != ServiceStatus::Running);
            st.streaming_status = 0;
            st.streaming_live = 0;
            st.scrambled_seen = false;
            st.start_time = chrono::Utc::now().timestamp();

            let filters = ctx.esfilters.read();
            let ServiceState {
                components,
                filtered,
                nicename,
                ..
            } = &mut *st;
            filter::build_filter(components, filtered, &filters, &self.id, nicename);
            ca_snapshot = ca_updates(&st);
        }
        self.dispatch_caid_updates(ctx, &ca_snapshot);

        self.source.start_feed(self, instance)?;

        ctx.caclients.service_start(self);

        {
            let mut st = self.state.lock();
            st.status = ServiceStatus::Running;
            let filtered = st.filtered.clone();
            for pos in filtered {
                st.components[pos].reinit();
            }
        }

        let timeout = self.source.grace_period(self) + postpone;
        self.grace_delay.store(timeout, Ordering::Relaxed);
        self.arm_receive_timer(ctx, Duration::from_secs(u64::from(timeout)));
        Ok(())
    }

    /// Stops the feed and cleans up. Both the pad target set and the
    /// subscription list must already be empty.
    pub fn stop(self: &Arc<Self>, ctx: &PvrContext) {
        ctx.timers.disarm(&self.receive_timer);

        self.source.stop_feed(self);

        let mut st = self.state.lock();

        assert!(st.pad.is_empty());
        assert!(self.subscriptions.lock().is_empty());

        for es in &mut st.components {
            es.clean();
        }
        st.status = ServiceStatus::Idle;
    }

    /// Atomic source swap: emits a single STOP/START pair when the
    /// composition changes under running subscribers.
    pub fn restart(self: &Arc<Self>, ctx: &PvrContext, had_components: bool) {
        let ca_snapshot;
        {
            let mut st = self.state.lock();

            if had_components {
                st.pad
                    .deliver(&StreamingMessage::Stop(StreamingCode::SourceReconfigured));
            }

            let filters = ctx.esfilters.read();
            let ServiceState {
                components,
                filtered,
                nicename,
                ..
            } = &mut *st;
            filter::build_filter(components, filtered, &filters, &self.id, nicename);

            if !st.filtered.is_empty() {
                let ss = Arc::new(self.build_stream_start(&st));
                st.pad.deliver(&StreamingMessage::Start(ss));
            }
            ca_snapshot = ca_updates(&st);
        }

        self.source.refresh_feed(self);
        self.dispatch_caid_updates(ctx, &ca_snapshot);
        ctx.caclients.service_start(self);
    }

    /// Removes one subscriber, or all of them, stopping the feed when the
    /// last one goes. Global lock must be held.
    pub fn remove_subscriber(
        self: &Arc<Self>,
        ctx: &PvrContext,
        sub: Option<&Arc<Subscription>>,
        reason: StreamingCode,
    ) {
        let removed: Vec<Arc<Subscription>> = {
            let mut subs = self.subscriptions.lock();
            match sub {
                Some(s) => {
                    subs.retain(|x| !Arc::ptr_eq(x, s));
                    vec![Arc::clone(s)]
                }
                None => subs.drain(..).collect(),
            }
        };
        for s in removed {
            s.unlink(reason);
        }
        if self.subscriptions.lock().is_empty() {
            self.stop(ctx);
        }
    }

    /// Destroys the service: stops the feed, unlinks subscriptions and
    /// channel mappings, and unregisters it.
    pub fn destroy(self: &Arc<Self>, ctx: &PvrContext, delete_config: bool) {
        self.source.delete(self, delete_config);

        for ch in self.channels.lock().drain(..) {
            if let Some(ch) = ch.upgrade() {
                ch.unmap_service_only(self);
            }
        }

        let subs: Vec<Arc<Subscription>> = self.subscriptions.lock().drain(..).collect();
        for s in subs {
            s.unlink(StreamingCode::SourceDeleted);
        }

        if self.state.lock().status != ServiceStatus::Idle {
            self.stop(ctx);
        }

        let mut st = self.state.lock();
        st.status = ServiceStatus::Zombie;
        st.filtered.clear();
        while !st.components.is_empty() {
            st.stream_destroy(0);
        }
        st.rate.flush();
        drop(st);

        ctx.unregister_service(self);
    }

    /// Replaces the streaming-status word, broadcasting on change only.
    pub fn set_streaming_status(&self, set: u32) {
        let mut st = self.state.lock();
        self.set_streaming_status_locked(&mut st, set);
    }

    /// OR-in streaming-status bits, broadcasting on change only.
    pub fn set_streaming_status_flags(&self, flags: u32) {
        let mut st = self.state.lock();
        let set = st.streaming_status | flags;
        self.set_streaming_status_locked(&mut st, set);
    }

    pub(crate) fn set_streaming_status_locked(&self, st: &mut ServiceState, set: u32) {
        if set == st.streaming_status {
            return; // already set
        }
        st.streaming_status = set;

        log::debug!(
            target: "service",
            "{}: status changed to {:#x} ({})",
            st.nicename,
            set,
            crate::streaming::tss_to_text(set)
        );

        st.pad.deliver(&StreamingMessage::ServiceStatus(set));
        self.status_cond.notify_all();
    }

    /// Blocks until the streaming-status word satisfies `pred`.
    pub fn wait_streaming_status<F: Fn(u32) -> bool>(&self, pred: F) {
        let mut st = self.state.lock();
        while !pred(st.streaming_status) {
            self.status_cond.wait(&mut st);
        }
    }

    fn arm_receive_timer(self: &Arc<Self>, ctx: &PvrContext, delay: Duration) {
        let weak = Arc::downgrade(self);
        let timers = ctx.timers.clone();
        ctx.timers.arm(
            &self.receive_timer,
            delay,
            Box::new(move || {
                if let Some(svc) = weak.upgrade() {
                    svc.data_timeout(&timers);
                }
            }),
        );
    }

    /// Periodic input watchdog: flags a missing grace period or a data
    /// timeout, clears the live bit, re-arms itself.
    fn data_timeout(self: &Arc<Self>, timers: &crate::timer::TimerWheel) {
        {
            let mut st = self.state.lock();
            let mut flags = 0;
            if st.streaming_status & tss::PACKETS == 0 {
                flags |= tss::GRACEPERIOD;
            }
            if st.streaming_live & tss::LIVE == 0 {
                flags |= tss::TIMEOUT;
            }
            if flags != 0 {
                let set = st.streaming_status | flags;
                self.set_streaming_status_locked(&mut st, set);
            }
            st.streaming_live &= !tss::LIVE;
        }

        let weak = Arc::downgrade(self);
        let timers2 = timers.clone();
        timers.arm(
            &self.receive_timer,
            Duration::from_secs(5),
            Box::new(move || {
                if let Some(svc) = weak.upgrade() {
                    svc.data_timeout(&timers2);
                }
            }),
        );
    }

    /// Builds the START payload from the filtered component list.
    pub fn build_stream_start(&self, st: &ServiceState) -> StreamingStart {
        let components = st
            .filtered_streams()
            .map(|es| StartComponent {
                index: es.index,
                stream_type: es.stream_type,
                lang: es.lang.clone(),
                audio_type: es.audio_type,
                composition_id: es.composition_id,
                ancillary_id: es.ancillary_id,
                pid: es.pid,
                width: es.width,
                height: es.height,
                frame_duration: es.frame_duration,
                aspect_num: es.aspect_num,
                aspect_den: es.aspect_den,
                sri: es.sri,
                channels: es.channels,
                disabled: false,
            })
            .collect();
        StreamingStart {
            components,
            pcr_pid: st.pcr_pid,
            pmt_pid: st.pmt_pid,
            service_id: 0,
            source: self.source.source_info(self),
        }
    }

    /// Rebuilds the service and component display names from source info.
    pub fn make_nicename(&self, st: &mut ServiceState) {
        let si = self.source.source_info(self);

        let service_name = match si.service.as_deref() {
            Some(s) if !s.starts_with('0') => s.to_owned(),
            _ => format!("{{PMT:{}}}", st.pmt_pid),
        };

        let mut name = String::new();
        let mut prefidx = 0;
        for part in [&si.adapter, &si.network, &si.mux] {
            if let Some(p) = part {
                if !name.is_empty() {
                    name.push('/');
                }
                name.push_str(p);
            }
        }
        if !name.is_empty() {
            prefidx = name.len();
            name.push('/');
        }
        name.push_str(&service_name);

        st.nicename = name;
        st.nicename_prefidx = prefidx;

        let svc_name = st.nicename.clone();
        for es in &mut st.components {
            es.nicename = if es.pid != -1 {
                format!("{}: {} @ #{}", svc_name, es.stream_type.as_str(), es.pid)
            } else {
                format!("{}: {}", svc_name, es.stream_type.as_str())
            };
        }
    }

    /// True for standard-definition TV services.
    pub fn is_sdtv(&self) -> bool {
        let st = self.state.lock();
        match st.service_type {
            ServiceType::Sdtv => true,
            ServiceType::None => st
                .components
                .iter()
                .any(|es| es.stream_type.is_video() && es.height < 720),
            _ => false,
        }
    }

    /// True for high-definition TV services.
    pub fn is_hdtv(&self) -> bool {
        let st = self.state.lock();
        match st.service_type {
            ServiceType::Hdtv => true,
            ServiceType::None => st
                .components
                .iter()
                .any(|es| es.stream_type.is_video() && es.height >= 720),
            _ => false,
        }
    }

    /// True for radio services (audio components but no video).
    pub fn is_radio(&self) -> bool {
        let st = self.state.lock();
        match st.service_type {
            ServiceType::Radio => true,
            ServiceType::None => {
                let mut ret = false;
                for es in &st.components {
                    if es.stream_type.is_video() {
                        return false;
                    }
                    if es.stream_type.is_audio() {
                        ret = true;
                    }
                }
                ret
            }
            _ => false,
        }
    }

    /// Human label for the service type.
    pub fn service_type_label(&self) -> &'static str {
        if self.is_hdtv() {
            "HDTV"
        } else if self.is_sdtv() {
            "SDTV"
        } else if self.is_radio() {
            "Radio"
        } else {
            "Other"
        }
    }

    /// Channel name from the source, falling back to the nicename.
    pub fn channel_name(&self) -> String {
        self.source
            .channel_name(self)
            .unwrap_or_else(|| self.nicename())
    }

    /// Full channel name: the `adapter/network/mux` prefix of the nicename
    /// joined with the channel name.
    pub fn channel_name_full(&self) -> String {
        let name = match self.source.channel_name(self) {
            Some(n) => n,
            None => return self.nicename(),
        };
        let st = self.state.lock();
        let prefix = &st.nicename[..st.nicename_prefidx.min(st.nicename.len())];
        if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        }
    }

    /// Requests an asynchronous configuration save, optionally upgrading
    /// to a save-then-restart.
    pub fn request_save(self: &Arc<Self>, ctx: &PvrContext, restart: bool) {
        ctx.saver.request_save(self, restart);
    }

    fn dispatch_caid_updates(&self, ctx: &PvrContext, updates: &[(u16, u16, bool)]) {
        if updates.is_empty() {
            return;
        }
        if let Some(mux) = self.mux() {
            for &(caid, pid, valid) in updates {
                ctx.caclients.caid_update(&mux, caid, pid, valid);
            }
        }
    }
}

/// Snapshot of (caid, pid, in-use) triples for descrambler notification.
fn ca_updates(st: &ServiceState) -> Vec<(u16, u16, bool)> {
    let mut out = Vec::new();
    for es in &st.components {
        if es.stream_type != StreamType::Ca {
            continue;
        }
        for ca in &es.caids {
            let pid = if ca.pid != 0 {
                ca.pid
            } else if es.pid >= 0 {
                es.pid as u16
            } else {
                0
            };
            out.push((ca.caid, pid, ca.in_use));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::streaming::StreamingQueue;

    #[test]
    fn stream_create_dedupes_by_pid_and_assigns_indices() {
        let mut st = ServiceState::default();
        let a = st.stream_create(0x100, StreamType::H264);
        let b = st.stream_create(0x101, StreamType::Aac);
        let dup = st.stream_create(0x100, StreamType::H264);
        assert_eq!(a, dup);
        assert_eq!(st.components[a].index, 1);
        assert_eq!(st.components[b].index, 2);

        // -1 PIDs never dedupe
        let c = st.stream_create(-1, StreamType::Ca);
        let d = st.stream_create(-1, StreamType::Ca);
        assert_ne!(c, d);
        assert_eq!(st.components[d].index, 4);
    }

    #[test]
    fn stream_destroy_fixes_filtered_positions() {
        let mut st = ServiceState::default();
        st.stream_create(0x100, StreamType::H264);
        st.stream_create(0x101, StreamType::Aac);
        st.stream_create(0x102, StreamType::Ac3);
        st.filtered = vec![0, 1, 2];
        st.stream_destroy(1);
        assert_eq!(st.filtered, vec![0, 1]);
        assert_eq!(st.components[1].pid, 0x102);
    }

    #[test]
    fn stream_find_caches_last_hit() {
        let mut st = ServiceState::default();
        st.stream_create(0x100, StreamType::H264);
        assert_eq!(st.stream_find(0x100), Some(0));
        assert_eq!(st.stream_find(0x100), Some(0));
        assert_eq!(st.stream_find(0x999), None);
    }

    #[test]
    fn encryption_queries() {
        let mut st = ServiceState::default();
        assert!(!st.is_encrypted());
        let pos = st.stream_create(0x102, StreamType::Ca);
        st.components[pos]
            .caids
            .push(stream::Caid::new(0x0500, 0x123456));
        assert!(st.is_encrypted());
        assert_eq!(st.encryption_caid(), 0x0500);
    }

    /// A pad target must see ServiceStatus only on change.
    #[test]
    fn streaming_status_broadcasts_on_change_only() {
        let svc = test_service();
        let q = Arc::new(StreamingQueue::new());
        let target: Arc<dyn crate::streaming::StreamingTarget> = q.clone();
        svc.state().pad.add_target(&target);

        svc.set_streaming_status_flags(tss::PACKETS);
        svc.set_streaming_status_flags(tss::PACKETS);
        svc.set_streaming_status_flags(tss::PACKETS | tss::NO_ACCESS);

        assert!(matches!(
            q.try_recv(),
            Some(StreamingMessage::ServiceStatus(f)) if f == tss::PACKETS
        ));
        assert!(matches!(
            q.try_recv(),
            Some(StreamingMessage::ServiceStatus(f)) if f == tss::PACKETS | tss::NO_ACCESS
        ));
        assert!(q.try_recv().is_none());
    }

    struct NullSource;
    impl ServiceSource for NullSource {
        fn start_feed(&self, _svc: &Arc<Service>, _instance: u32) -> Result<(), StreamingCode> {
            Ok(())
        }
        fn stop_feed(&self, _svc: &Arc<Service>) {}
        fn enlist(
            &self,
            svc: &Arc<Service>,
            list: &mut instance::ServiceInstanceList,
            _flags: u32,
        ) {
            list.add(svc, 0, 0, 0);
        }
    }

    fn test_service() -> Arc<Service> {
        let ctx = crate::context::PvrContext::new();
        Service::create(&ctx, Box::new(NullSource), None)
    }

    #[test]
    fn classification_falls_back_to_components() {
        let svc = test_service();
        {
            let mut st = svc.state();
            let v = st.stream_create(0x100, StreamType::H264);
            st.components[v].height = 1080;
        }
        assert!(svc.is_hdtv());
        assert!(!svc.is_sdtv());
        assert!(!svc.is_radio());
        assert_eq!(svc.service_type_label(), "HDTV");
    }

    #[test]
    fn radio_means_audio_without_video() {
        let svc = test_service();
        svc.state().stream_create(0x101, StreamType::Aac);
        assert!(svc.is_radio());
        assert_eq!(svc.service_type_label(), "Radio");
    }
}
