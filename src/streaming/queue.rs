//! Blocking message queue between a streaming pad and a consumer thread.
//!
//! A single producer (the service, under its stream mutex) pushes messages;
//! a single consumer (a recording worker or analyzer thread) pops them with
//! a blocking receive. [`StreamingMessage::Exit`] is the only cancellation
//! path for the consumer.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use super::{StreamingMessage, StreamingTarget};

/// Unbounded FIFO of streaming messages with a blocking consumer side.
///
/// Backpressure is intentional: if the consumer (typically disk I/O) is
/// slow, the queue grows and the upstream input layer may eventually drop.
pub struct StreamingQueue {
    queue: Mutex<VecDeque<StreamingMessage>>,
    cond: Condvar,
    reject: u32,
}

impl StreamingQueue {
    /// Creates a queue accepting every message kind.
    pub fn new() -> Self {
        Self::with_reject(0)
    }

    /// Creates a queue that silently drops message kinds whose
    /// [`kind_bit`](StreamingMessage::kind_bit) is set in `reject`.
    /// `Exit` is always accepted.
    pub fn with_reject(reject: u32) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            reject,
        }
    }

    /// Blocking receive of the next message.
    ///
    /// `before_release` runs while the queue lock is still held, with the
    /// popped message, so the consumer can account for it atomically with
    /// the removal.
    pub fn recv_with<F: FnOnce(&StreamingMessage)>(&self, before_release: F) -> StreamingMessage {
        let mut q = self.queue.lock();
        loop {
            if let Some(msg) = q.pop_front() {
                before_release(&msg);
                return msg;
            }
            self.cond.wait(&mut q);
        }
    }

    /// Blocking receive without accounting hook.
    pub fn recv(&self) -> StreamingMessage {
        self.recv_with(|_| {})
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Option<StreamingMessage> {
        self.queue.lock().pop_front()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True when no messages are queued.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl Default for StreamingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingTarget for StreamingQueue {
    fn deliver(&self, msg: StreamingMessage) {
        if self.reject & msg.kind_bit() != 0 && !matches!(msg, StreamingMessage::Exit) {
            return;
        }
        let mut q = self.queue.lock();
        q.push_back(msg);
        self.cond.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::streaming::{Packet, StreamingCode, SMT_PACKET};

    #[test]
    fn delivers_in_order() {
        let q = StreamingQueue::new();
        q.deliver(StreamingMessage::Grace(5));
        q.deliver(StreamingMessage::Stop(StreamingCode::Ok));
        assert!(matches!(q.recv(), StreamingMessage::Grace(5)));
        assert!(matches!(
            q.recv(),
            StreamingMessage::Stop(StreamingCode::Ok)
        ));
    }

    #[test]
    fn reject_mask_drops_packets_but_not_exit() {
        let q = StreamingQueue::with_reject(SMT_PACKET);
        q.deliver(StreamingMessage::Packet(Packet::new(0, vec![0u8; 4])));
        q.deliver(StreamingMessage::Exit);
        assert!(matches!(q.recv(), StreamingMessage::Exit));
        assert!(q.is_empty());
    }

    #[test]
    fn blocking_recv_wakes_on_deliver() {
        let q = Arc::new(StreamingQueue::new());
        let q2 = Arc::clone(&q);
        let h = thread::spawn(move || q2.recv());
        q.deliver(StreamingMessage::Skip);
        assert!(matches!(h.join().unwrap(), StreamingMessage::Skip));
    }

    #[test]
    fn accounting_hook_sees_payload_under_lock() {
        let q = StreamingQueue::new();
        q.deliver(StreamingMessage::Mpegts(vec![0u8; 188].into()));
        let mut seen = 0usize;
        q.recv_with(|m| seen = m.payload_len());
        assert_eq!(seen, 188);
    }
}
