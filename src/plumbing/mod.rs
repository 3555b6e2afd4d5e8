//! Streaming filters placed between a service and a consumer.
//!
//! Both filters implement [`StreamingTarget`] and forward into a
//! downstream target, so chains compose freely: the recorder stacks
//! `tsfix -> globalheaders -> queue` for container muxers that need
//! normalized timestamps and codec parameters up front.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::streaming::{StreamingMessage, StreamingStart, StreamingTarget};

/// Timestamp normalizer.
///
/// Rebases packet DTS/PTS to a zero origin established by the first timed
/// packet after a start, so downstream containers see monotonic time from
/// zero regardless of the transmitter's clock.
pub struct TsFix {
    next: Arc<dyn StreamingTarget>,
    state: Mutex<TsFixState>,
}

#[derive(Default)]
struct TsFixState {
    start_time: i64,
    base: Option<i64>,
}

impl TsFix {
    /// Creates a tsfix forwarding into `next`.
    pub fn new(next: Arc<dyn StreamingTarget>) -> Arc<Self> {
        Arc::new(Self {
            next,
            state: Mutex::new(TsFixState::default()),
        })
    }

    /// Sets the scheduled start time (unix epoch seconds); packets are
    /// rebased relative to the first one seen from there on.
    pub fn set_start_time(&self, start_time: i64) {
        self.state.lock().start_time = start_time;
    }

    /// The configured scheduled start time.
    pub fn start_time(&self) -> i64 {
        self.state.lock().start_time
    }
}

impl StreamingTarget for TsFix {
    fn deliver(&self, msg: StreamingMessage) {
        match msg {
            StreamingMessage::Start(ss) => {
                self.state.lock().base = None;
                self.next.deliver(StreamingMessage::Start(ss));
            }
            StreamingMessage::Packet(mut pkt) => {
                let mut st = self.state.lock();
                let base = match (st.base, pkt.dts.or(pkt.pts)) {
                    (Some(b), _) => Some(b),
                    (None, Some(t)) => {
                        st.base = Some(t);
                        Some(t)
                    }
                    (None, None) => None,
                };
                drop(st);
                if let Some(b) = base {
                    pkt.dts = pkt.dts.map(|t| t - b);
                    pkt.pts = pkt.pts.map(|t| t - b);
                }
                self.next.deliver(StreamingMessage::Packet(pkt));
            }
            other => self.next.deliver(other),
        }
    }
}

/// Start-info gatekeeper.
///
/// Holds back packets until a start message announced the composition, so
/// container muxers never see data for streams they have not been told
/// about.
pub struct GlobalHeaders {
    next: Arc<dyn StreamingTarget>,
    state: Mutex<GhState>,
}

#[derive(Default)]
struct GhState {
    start: Option<Arc<StreamingStart>>,
}

impl GlobalHeaders {
    /// Creates a globalheaders filter forwarding into `next`.
    pub fn new(next: Arc<dyn StreamingTarget>) -> Arc<Self> {
        Arc::new(Self {
            next,
            state: Mutex::new(GhState::default()),
        })
    }
}

impl StreamingTarget for GlobalHeaders {
    fn deliver(&self, msg: StreamingMessage) {
        match msg {
            StreamingMessage::Start(ss) => {
                self.state.lock().start = Some(Arc::clone(&ss));
                self.next.deliver(StreamingMessage::Start(ss));
            }
            StreamingMessage::Stop(code) => {
                self.state.lock().start = None;
                self.next.deliver(StreamingMessage::Stop(code));
            }
            StreamingMessage::Packet(pkt) => {
                if self.state.lock().start.is_some() {
                    self.next.deliver(StreamingMessage::Packet(pkt));
                }
            }
            other => self.next.deliver(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::{Packet, StreamingQueue};

    #[test]
    fn tsfix_rebases_timestamps() {
        let q = Arc::new(StreamingQueue::new());
        let tsfix = TsFix::new(q.clone());
        tsfix.deliver(StreamingMessage::Start(Arc::new(StreamingStart::default())));
        tsfix.deliver(StreamingMessage::Packet(
            Packet::new(1, vec![0u8; 8]).with_dts(90_000).with_pts(93_600),
        ));
        tsfix.deliver(StreamingMessage::Packet(
            Packet::new(1, vec![0u8; 8]).with_dts(93_600),
        ));
        let _ = q.recv(); // start
        match q.recv() {
            StreamingMessage::Packet(p) => {
                assert_eq!(p.dts, Some(0));
                assert_eq!(p.pts, Some(3_600));
            }
            other => panic!("unexpected {other:?}"),
        }
        match q.recv() {
            StreamingMessage::Packet(p) => assert_eq!(p.dts, Some(3_600)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn globalheaders_gates_packets_until_start() {
        let q = Arc::new(StreamingQueue::new());
        let gh = GlobalHeaders::new(q.clone());
        gh.deliver(StreamingMessage::Packet(Packet::new(1, vec![0u8; 8])));
        assert!(q.is_empty());
        gh.deliver(StreamingMessage::Start(Arc::new(StreamingStart::default())));
        gh.deliver(StreamingMessage::Packet(Packet::new(1, vec![0u8; 8])));
        assert!(matches!(q.recv(), StreamingMessage::Start(_)));
        assert!(matches!(q.recv(), StreamingMessage::Packet(_)));
    }
}
