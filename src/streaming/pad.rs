//! Fan-out point of a service to its subscribers.
//!
//! The pad holds weak references to its targets; the subscription owning a
//! target keeps it alive. A dead target is skipped on delivery and swept on
//! the next mutation. The pad itself is guarded by the owning service's
//! stream mutex, so no internal locking happens here.

use std::sync::{Arc, Weak};

use super::{StreamingMessage, StreamingTarget};

/// Broadcast hub delivering streaming messages to all attached targets.
#[derive(Default)]
pub struct StreamingPad {
    targets: Vec<Weak<dyn StreamingTarget>>,
}

impl StreamingPad {
    /// Creates an empty pad.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a target. The pad does not keep it alive.
    pub fn add_target(&mut self, target: &Arc<dyn StreamingTarget>) {
        self.targets.push(Arc::downgrade(target));
    }

    /// Detaches a target previously attached with [`add_target`](Self::add_target).
    pub fn remove_target(&mut self, target: &Arc<dyn StreamingTarget>) {
        self.targets
            .retain(|t| t.upgrade().map(|t| !Arc::ptr_eq(&t, target)).unwrap_or(false));
    }

    /// Delivers `msg` to every live target, cloning per target.
    ///
    /// Payload bytes are refcounted, so the clones share data.
    pub fn deliver(&self, msg: &StreamingMessage) {
        for t in &self.targets {
            if let Some(t) = t.upgrade() {
                t.deliver(msg.clone());
            }
        }
    }

    /// True when no live target is attached.
    pub fn is_empty(&self) -> bool {
        !self.targets.iter().any(|t| t.strong_count() > 0)
    }

    /// Number of live targets.
    pub fn len(&self) -> usize {
        self.targets.iter().filter(|t| t.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::{StreamingCode, StreamingQueue};

    #[test]
    fn fans_out_to_all_targets() {
        let mut pad = StreamingPad::new();
        let a: Arc<StreamingQueue> = Arc::new(StreamingQueue::new());
        let b: Arc<StreamingQueue> = Arc::new(StreamingQueue::new());
        let ta: Arc<dyn StreamingTarget> = a.clone();
        let tb: Arc<dyn StreamingTarget> = b.clone();
        pad.add_target(&ta);
        pad.add_target(&tb);
        pad.deliver(&StreamingMessage::Stop(StreamingCode::Ok));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn dropped_target_is_skipped() {
        let mut pad = StreamingPad::new();
        let a: Arc<StreamingQueue> = Arc::new(StreamingQueue::new());
        let ta: Arc<dyn StreamingTarget> = a.clone();
        pad.add_target(&ta);
        drop(ta);
        drop(a);
        assert!(pad.is_empty());
        pad.deliver(&StreamingMessage::Skip);
    }

    #[test]
    fn remove_detaches_only_that_target() {
        let mut pad = StreamingPad::new();
        let a: Arc<StreamingQueue> = Arc::new(StreamingQueue::new());
        let b: Arc<StreamingQueue> = Arc::new(StreamingQueue::new());
        let ta: Arc<dyn StreamingTarget> = a.clone();
        let tb: Arc<dyn StreamingTarget> = b.clone();
        pad.add_target(&ta);
        pad.add_target(&tb);
        pad.remove_target(&ta);
        assert_eq!(pad.len(), 1);
        pad.deliver(&StreamingMessage::Skip);
        assert!(a.is_empty());
        assert_eq!(b.len(), 1);
    }
}
