//! # Subscriptions
//!
//! A subscription is one consumer's handle onto a live service: it carries
//! a weight for tuner arbitration, the streaming target the service's pad
//! feeds, and byte/error counters for the UI. Linkage runs in the global
//! lock domain.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::channel::Channel;
use crate::context::PvrContext;
use crate::service::instance::{find_instance, ServiceInstanceList};
use crate::service::{Service, ServiceStatus};
use crate::streaming::{StreamingCode, StreamingMessage, StreamingTarget};

/// Subscription flag: the consumer wants raw MPEG-TS, not reassembled
/// packets.
pub const SUBSCRIPTION_RAW_MPEGTS: u32 = 1 << 0;

static NEXT_SUB_ID: AtomicU64 = AtomicU64::new(1);

/// One consumer handle onto a service.
pub struct Subscription {
    id: u64,
    title: String,
    weight: i32,
    flags: u32,
    target: Arc<dyn StreamingTarget>,
    service: Mutex<Option<Arc<Service>>>,
    /// Total payload bytes delivered to the target
    pub bytes_out: AtomicU64,
    /// Total transport errors observed
    pub total_err: AtomicU32,
}

impl Subscription {
    /// Subscribes to a channel: picks and starts the best backing
    /// instance, links the target to the service's pad, and replays the
    /// current START when the service is already running.
    ///
    /// On selection failure the target receives a single `NoStart` message
    /// and the subscription is returned unlinked.
    pub fn create_from_channel(
        ctx: &PvrContext,
        channel: &Arc<Channel>,
        weight: i32,
        title: &str,
        target: Arc<dyn StreamingTarget>,
        flags: u32,
    ) -> Arc<Subscription> {
        let sub = Arc::new(Subscription {
            id: NEXT_SUB_ID.fetch_add(1, Ordering::Relaxed),
            title: title.to_owned(),
            weight,
            flags,
            target,
            service: Mutex::new(None),
            bytes_out: AtomicU64::new(0),
            total_err: AtomicU32::new(0),
        });

        let mut list = ServiceInstanceList::new();
        let mut error = StreamingCode::Ok;
        let chosen = find_instance(
            ctx,
            None,
            Some(channel),
            &mut list,
            &mut error,
            weight,
            flags,
            0,
        );
        match chosen {
            Some(pos) => {
                let svc = Arc::clone(&list.entries()[pos].service);
                sub.link_service(&svc);
                log::info!(
                    target: "subscription",
                    "\"{}\" subscribing on \"{}\", weight: {}",
                    sub.title,
                    channel.name(),
                    weight
                );
            }
            None => {
                log::info!(
                    target: "subscription",
                    "\"{}\" unable to subscribe on \"{}\": {}",
                    sub.title,
                    channel.name(),
                    error
                );
                sub.target.deliver(StreamingMessage::NoStart(error));
            }
        }
        sub
    }

    /// Subscribes directly to a service, bypassing channel resolution.
    pub fn create_from_service(
        ctx: &PvrContext,
        service: &Arc<Service>,
        weight: i32,
        title: &str,
        target: Arc<dyn StreamingTarget>,
        flags: u32,
    ) -> Arc<Subscription> {
        let sub = Arc::new(Subscription {
            id: NEXT_SUB_ID.fetch_add(1, Ordering::Relaxed),
            title: title.to_owned(),
            weight,
            flags,
            target,
            service: Mutex::new(None),
            bytes_out: AtomicU64::new(0),
            total_err: AtomicU32::new(0),
        });

        let mut list = ServiceInstanceList::new();
        let mut error = StreamingCode::Ok;
        match find_instance(
            ctx,
            Some(service),
            None,
            &mut list,
            &mut error,
            weight,
            flags,
            0,
        ) {
            Some(pos) => {
                let svc = Arc::clone(&list.entries()[pos].service);
                sub.link_service(&svc);
            }
            None => {
                sub.target.deliver(StreamingMessage::NoStart(error));
            }
        }
        sub
    }

    /// Subscription id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Subscription title shown in the UI.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Arbitration weight.
    pub fn weight(&self) -> i32 {
        self.weight
    }

    /// Subscription flags.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// The service this subscription is currently linked to.
    pub fn service(&self) -> Option<Arc<Service>> {
        self.service.lock().clone()
    }

    /// Bytes delivered so far.
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }

    fn link_service(self: &Arc<Self>, svc: &Arc<Service>) {
        *self.service.lock() = Some(Arc::clone(svc));
        svc.subscriptions.lock().push(Arc::clone(self));

        let mut st = svc.state();
        st.pad.add_target(&self.target);
        if st.status == ServiceStatus::Running && !st.filtered.is_empty() {
            let ss = Arc::new(svc.build_stream_start(&st));
            self.target.deliver(StreamingMessage::Start(ss));
            if st.streaming_status != 0 {
                self.target
                    .deliver(StreamingMessage::ServiceStatus(st.streaming_status));
            }
        }
    }

    /// Detaches from the current service's pad, delivering a final STOP
    /// with `reason` to the target. Does not touch the service's
    /// subscription list; use [`Subscription::unsubscribe`] or
    /// [`Service::remove_subscriber`] for the full path.
    pub(crate) fn unlink(&self, reason: StreamingCode) {
        let Some(svc) = self.service.lock().take() else {
            return;
        };
        let mut st = svc.state();
        self.target.deliver(StreamingMessage::Stop(reason));
        st.pad.remove_target(&self.target);
    }

    /// Full unsubscribe: unlinks and stops the service when this was the
    /// last subscriber. Global lock must be held.
    pub fn unsubscribe(self: &Arc<Self>, ctx: &PvrContext) {
        let svc = self.service.lock().clone();
        if let Some(svc) = svc {
            log::info!(
                target: "subscription",
                "\"{}\" unsubscribing from \"{}\"",
                self.title,
                svc.nicename()
            );
            svc.remove_subscriber(ctx, Some(self), StreamingCode::Ok);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::service::instance::ServiceInstanceList;
    use crate::service::ServiceSource;
    use crate::streaming::StreamingQueue;

    struct NullSource;
    impl ServiceSource for NullSource {
        fn start_feed(&self, _svc: &Arc<Service>, _instance: u32) -> Result<(), StreamingCode> {
            Ok(())
        }
        fn stop_feed(&self, _svc: &Arc<Service>) {}
        fn enlist(&self, svc: &Arc<Service>, list: &mut ServiceInstanceList, _flags: u32) {
            list.add(svc, 0, 0, 0);
        }
    }

    struct DeadSource;
    impl ServiceSource for DeadSource {
        fn start_feed(&self, _svc: &Arc<Service>, _instance: u32) -> Result<(), StreamingCode> {
            Err(StreamingCode::TuningFailed)
        }
        fn stop_feed(&self, _svc: &Arc<Service>) {}
        fn enlist(&self, svc: &Arc<Service>, list: &mut ServiceInstanceList, _flags: u32) {
            list.add(svc, 0, 0, 0);
        }
    }

    #[test]
    fn subscribe_starts_service_and_replays_start() {
        let ctx = PvrContext::new();
        let svc = Service::create(&ctx, Box::new(NullSource), None);
        svc.state()
            .stream_create(0x100, crate::service::stream::StreamType::H264);
        let ch = ctx.create_channel("One");
        ch.map_service(&svc);

        let q = Arc::new(StreamingQueue::new());
        let target: Arc<dyn StreamingTarget> = q.clone();
        let sub = Subscription::create_from_channel(&ctx, &ch, 300, "Test", target, 0);

        assert_eq!(svc.state().status, ServiceStatus::Running);
        assert!(sub.service().is_some());
        // the pad replayed the running composition
        assert!(matches!(q.recv(), StreamingMessage::Start(_)));

        sub.unsubscribe(&ctx);
        assert_eq!(svc.state().status, ServiceStatus::Idle);
        assert!(matches!(
            q.recv(),
            StreamingMessage::Stop(StreamingCode::Ok)
        ));
        ctx.shutdown();
    }

    #[test]
    fn failed_subscribe_delivers_nostart() {
        let ctx = PvrContext::new();
        let svc = Service::create(&ctx, Box::new(DeadSource), None);
        let ch = ctx.create_channel("One");
        ch.map_service(&svc);

        let q = Arc::new(StreamingQueue::new());
        let target: Arc<dyn StreamingTarget> = q.clone();
        let sub = Subscription::create_from_channel(&ctx, &ch, 300, "Test", target, 0);

        assert!(sub.service().is_none());
        assert!(matches!(
            q.recv(),
            StreamingMessage::NoStart(StreamingCode::TuningFailed)
        ));
        ctx.shutdown();
    }

    #[test]
    fn byte_counter_is_monotonic() {
        let ctx = PvrContext::new();
        let svc = Service::create(&ctx, Box::new(NullSource), None);
        let ch = ctx.create_channel("One");
        ch.map_service(&svc);
        let q = Arc::new(StreamingQueue::new());
        let target: Arc<dyn StreamingTarget> = q.clone();
        let sub = Subscription::create_from_channel(&ctx, &ch, 300, "Test", target, 0);

        sub.bytes_out.fetch_add(188, Ordering::Relaxed);
        sub.bytes_out.fetch_add(376, Ordering::Relaxed);
        assert_eq!(sub.bytes_out(), 564);

        sub.unsubscribe(&ctx);
        ctx.shutdown();
    }
}
