use std::collections::VecDeque;
use switchyard_proto::Envelope;

/// FIFO buffer of envelopes awaiting delivery.
///
/// Lives only in process memory; anything still queued when the process
/// exits is lost.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    items: VecDeque<Envelope>,
}

impl OutboundQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an envelope at the back.
    pub fn push(&mut self, envelope: Envelope) {
        self.items.push_back(envelope);
    }

    /// Put an envelope back at the front, ahead of everything queued after it.
    pub fn requeue(&mut self, envelope: Envelope) {
        self.items.push_front(envelope);
    }

    /// Put a batch back at the front, keeping the batch's own order.
    pub fn requeue_all(&mut self, envelopes: impl DoubleEndedIterator<Item = Envelope>) {
        for envelope in envelopes.rev() {
            self.items.push_front(envelope);
        }
    }

    /// Take the oldest envelope.
    pub fn pop(&mut self) -> Option<Envelope> {
        self.items.pop_front()
    }

    /// Take everything, oldest first.
    pub fn drain(&mut self) -> Vec<Envelope> {
        self.items.drain(..).collect()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Number of queued envelopes.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(n: u64) -> Envelope {
        Envelope::new("request", json!({ "n": n }))
    }

    fn ns(items: Vec<Envelope>) -> Vec<u64> {
        items.iter().map(|e| e.data["n"].as_u64().unwrap()).collect()
    }

    #[test]
    fn drains_in_fifo_order() {
        let mut q = OutboundQueue::new();
        q.push(env(1));
        q.push(env(2));
        q.push(env(3));
        assert_eq!(ns(q.drain()), vec![1, 2, 3]);
        assert!(q.is_empty());
    }

    #[test]
    fn requeue_goes_to_the_front() {
        let mut q = OutboundQueue::new();
        q.push(env(2));
        q.requeue(env(1));
        assert_eq!(q.pop().unwrap().data["n"], 1);
    }

    #[test]
    fn requeue_all_preserves_batch_order() {
        let mut q = OutboundQueue::new();
        q.push(env(4));
        q.requeue_all(vec![env(1), env(2), env(3)].into_iter());
        assert_eq!(ns(q.drain()), vec![1, 2, 3, 4]);
    }
}
