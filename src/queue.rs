//! Outbound packet queue.
//!
//! FIFO of data frames awaiting transmission. The head is peeked (not
//! popped) when a handshake starts, because a failed handshake leaves
//! the frame queued for the next attempt; a frame only leaves the
//! queue on acknowledgement, on unacknowledged transmit, or on drop
//! after the retry limit.

use heapless::Vec;

use crate::packet::Frame;
use crate::Seq;

/// Hard upper bound on queue capacity, fixed at compile time
pub const MAX_QUEUE: usize = 32;

pub struct PacketQueue {
    items: Vec<Frame, MAX_QUEUE>,
    capacity: usize,
}

impl PacketQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::new(),
            capacity: capacity.min(MAX_QUEUE).max(1),
        }
    }

    /// Append a frame, or hand it back if the queue is at capacity.
    pub fn enqueue(&mut self, frame: Frame) -> Result<(), Frame> {
        if self.items.len() >= self.capacity {
            return Err(frame);
        }
        // Push cannot fail here, capacity <= MAX_QUEUE
        self.items.push(frame).map_err(|f| f)
    }

    /// The frame that the next handshake will negotiate for.
    pub fn peek_head(&self) -> Option<&Frame> {
        self.items.first()
    }

    pub fn head_mut(&mut self) -> Option<&mut Frame> {
        self.items.first_mut()
    }

    /// Remove and return the head frame.
    pub fn dequeue_head(&mut self) -> Option<Frame> {
        let seq = self.items.first()?.seq;
        self.erase_by_seq(seq)
    }

    /// Remove the first frame carrying `seq`, front to back.
    ///
    /// Idempotent: a second erase of the same sequence number finds
    /// nothing and returns `None` (a duplicate ACK is not an error).
    pub fn erase_by_seq(&mut self, seq: Seq) -> Option<Frame> {
        let idx = self.items.iter().position(|f| f.seq == seq)?;
        let frame = self.items[idx].clone();
        for i in idx..self.items.len() - 1 {
            self.items[i] = self.items[i + 1].clone();
        }
        self.items.pop();
        Some(frame)
    }

    pub fn contains_seq(&self, seq: Seq) -> bool {
        self.items.iter().any(|f| f.seq == seq)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet::Frame;

    fn data(seq: Seq) -> Frame {
        Frame::data(1, 2, seq, 64, &[0xab; 8])
    }

    #[test]
    fn fifo_order_is_preserved() {
        let mut q = PacketQueue::new(8);
        q.enqueue(data(10)).unwrap();
        q.enqueue(data(11)).unwrap();
        q.enqueue(data(12)).unwrap();

        assert_eq!(q.peek_head().unwrap().seq, 10);
        q.erase_by_seq(10);
        assert_eq!(q.peek_head().unwrap().seq, 11);
        q.erase_by_seq(11);
        assert_eq!(q.peek_head().unwrap().seq, 12);
    }

    #[test]
    fn full_queue_hands_the_frame_back() {
        let mut q = PacketQueue::new(2);
        q.enqueue(data(1)).unwrap();
        q.enqueue(data(2)).unwrap();

        let rejected = q.enqueue(data(3)).unwrap_err();
        assert_eq!(rejected.seq, 3);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn erase_is_idempotent() {
        let mut q = PacketQueue::new(4);
        q.enqueue(data(5)).unwrap();
        q.enqueue(data(6)).unwrap();

        assert!(q.erase_by_seq(5).is_some());
        assert!(q.erase_by_seq(5).is_none());
        assert_eq!(q.len(), 1);
        assert!(q.contains_seq(6));
    }

    #[test]
    fn erase_removes_front_instance_first() {
        let mut q = PacketQueue::new(4);
        q.enqueue(data(7)).unwrap();
        q.enqueue(data(8)).unwrap();
        q.enqueue(data(7)).unwrap();

        q.erase_by_seq(7);
        assert_eq!(q.peek_head().unwrap().seq, 8);
        assert!(q.contains_seq(7));
    }

    #[test]
    fn capacity_is_clamped() {
        let q = PacketQueue::new(1000);
        assert_eq!(q.capacity(), MAX_QUEUE);
        let q = PacketQueue::new(0);
        assert_eq!(q.capacity(), 1);
    }
}
