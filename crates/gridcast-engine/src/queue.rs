//! Bounded frame queue between a session's decode worker and its tick.
//!
//! The producer blocks while the queue is full. [`FrameQueue::interrupt`]
//! releases a blocked producer without touching the queued frames, so it
//! can look at its control messages. A generation counter invalidates
//! everything in flight once a reposition has happened: items are cleared
//! and a producer still holding a frame of the old generation gets
//! [`PushError::Stale`] instead of inserting it.

use gridcast_core::{RationalTime, SharedFrameBuffer};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Why a push was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The queue was invalidated after the frame was produced
    Stale,
    /// The queue was closed; the producer should exit
    Closed,
    /// The wait for space was interrupted; the frame was not inserted
    Interrupted,
}

/// How a stream of frames ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEnd {
    EndOfStream,
    /// Decoding failed beyond recovery
    Failed(String),
}

#[derive(Debug)]
struct Inner {
    items: VecDeque<SharedFrameBuffer>,
    generation: u64,
    end: Option<QueueEnd>,
    closed: bool,
    interrupted: bool,
}

#[derive(Debug)]
pub struct FrameQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    space: Condvar,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.max(1)),
                generation: 0,
                end: None,
                closed: false,
                interrupted: false,
            }),
            space: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Insert a frame produced for `generation`, waiting while the queue is
    /// full. Returns the occupancy after the insert. A pending
    /// [`interrupt`](Self::interrupt) ends the wait with
    /// [`PushError::Interrupted`].
    pub fn push(&self, frame: SharedFrameBuffer, generation: u64) -> Result<usize, PushError> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return Err(PushError::Closed);
            }
            if inner.generation != generation {
                return Err(PushError::Stale);
            }
            if inner.items.len() < self.capacity {
                inner.items.push_back(frame);
                return Ok(inner.items.len());
            }
            if inner.interrupted {
                inner.interrupted = false;
                return Err(PushError::Interrupted);
            }
            self.space.wait(&mut inner);
        }
    }

    /// Remove every frame due at `position` and return the latest of them
    /// plus how many earlier ones were skipped.
    pub fn pop_due(&self, position: RationalTime) -> (Option<SharedFrameBuffer>, u64) {
        let mut inner = self.inner.lock();
        let mut latest = None;
        let mut skipped = 0;
        while inner
            .items
            .front()
            .is_some_and(|f| f.timestamp() <= position)
        {
            if latest.is_some() {
                skipped += 1;
            }
            latest = inner.items.pop_front();
        }
        if latest.is_some() {
            self.space.notify_all();
        }
        (latest, skipped)
    }

    /// Remove the oldest frame regardless of its timestamp.
    pub fn pop(&self) -> Option<SharedFrameBuffer> {
        let mut inner = self.inner.lock();
        let frame = inner.items.pop_front();
        if frame.is_some() {
            self.space.notify_all();
        }
        frame
    }

    /// Wake a producer waiting for space, or the next one to wait. Queued
    /// frames stay where they are.
    pub fn interrupt(&self) {
        let mut inner = self.inner.lock();
        inner.interrupted = true;
        self.space.notify_all();
    }

    /// Drop all queued frames and start a new generation. Blocked producers
    /// wake up with [`PushError::Stale`].
    pub fn invalidate(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.items.clear();
        inner.end = None;
        inner.generation += 1;
        self.space.notify_all();
        inner.generation
    }

    /// Record the end of `generation`'s stream. Ignored for older
    /// generations.
    pub fn finish(&self, generation: u64, end: QueueEnd) {
        let mut inner = self.inner.lock();
        if inner.generation == generation && !inner.closed {
            inner.end = Some(end);
        }
    }

    /// The recorded end, once every frame before it has been consumed.
    pub fn drained_end(&self) -> Option<QueueEnd> {
        let inner = self.inner.lock();
        if inner.items.is_empty() {
            inner.end.clone()
        } else {
            None
        }
    }

    /// Refuse all further pushes and release blocked producers.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.items.clear();
        self.space.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcast_core::FrameBuffer;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn frame(seq: u64) -> SharedFrameBuffer {
        Arc::new(FrameBuffer::filled(
            1,
            1,
            0,
            RationalTime::new(seq as i64, 20),
            seq,
        ))
    }

    #[test]
    fn test_push_blocks_when_full() {
        let queue = Arc::new(FrameQueue::new(2));
        queue.push(frame(0), 0).unwrap();
        queue.push(frame(1), 0).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(frame(2), 0))
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.len(), 2);
        assert!(!producer.is_finished());

        assert_eq!(queue.pop().map(|f| f.seq()), Some(0));
        assert_eq!(producer.join().unwrap(), Ok(2));
    }

    #[test]
    fn test_invalidate_wakes_producer_as_stale() {
        let queue = Arc::new(FrameQueue::new(1));
        queue.push(frame(0), 0).unwrap();
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(frame(1), 0))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.invalidate(), 1);
        assert_eq!(producer.join().unwrap(), Err(PushError::Stale));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_interrupt_releases_producer_and_keeps_frames() {
        let queue = Arc::new(FrameQueue::new(1));
        queue.push(frame(0), 0).unwrap();
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(frame(1), 0))
        };
        thread::sleep(Duration::from_millis(20));
        queue.interrupt();
        assert_eq!(producer.join().unwrap(), Err(PushError::Interrupted));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.generation(), 0);

        // An interrupt raised before the producer waits is not lost.
        queue.interrupt();
        assert_eq!(queue.push(frame(1), 0), Err(PushError::Interrupted));
        assert_eq!(queue.pop().map(|f| f.seq()), Some(0));
        assert_eq!(queue.push(frame(1), 0), Ok(1));
    }

    #[test]
    fn test_close_wakes_producer() {
        let queue = Arc::new(FrameQueue::new(1));
        queue.push(frame(0), 0).unwrap();
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(frame(1), 0))
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(producer.join().unwrap(), Err(PushError::Closed));
    }

    #[test]
    fn test_pop_due_keeps_latest() {
        let queue = FrameQueue::new(4);
        for seq in 0..4 {
            queue.push(frame(seq), 0).unwrap();
        }
        let (latest, skipped) = queue.pop_due(RationalTime::new(2, 20));
        assert_eq!(latest.map(|f| f.seq()), Some(2));
        assert_eq!(skipped, 2);
        assert_eq!(queue.len(), 1);

        let (none, _) = queue.pop_due(RationalTime::new(2, 20));
        assert!(none.is_none());
    }

    #[test]
    fn test_end_reported_after_drain() {
        let queue = FrameQueue::new(2);
        queue.push(frame(0), 0).unwrap();
        queue.finish(0, QueueEnd::EndOfStream);
        assert_eq!(queue.drained_end(), None);
        queue.pop();
        assert_eq!(queue.drained_end(), Some(QueueEnd::EndOfStream));

        // An end recorded for an older generation is ignored.
        let generation = queue.invalidate();
        queue.finish(generation - 1, QueueEnd::Failed("old".into()));
        assert_eq!(queue.drained_end(), None);
    }

    #[test]
    fn test_occupancy_bounded_with_fast_producer() {
        let queue = Arc::new(FrameQueue::new(4));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut high = 0;
                for seq in 0..100 {
                    match queue.push(frame(seq), 0) {
                        Ok(len) => high = high.max(len),
                        Err(_) => break,
                    }
                }
                high
            })
        };
        for _ in 0..100 {
            assert!(queue.len() <= 4);
            thread::sleep(Duration::from_millis(1));
            queue.pop();
        }
        queue.close();
        assert!(producer.join().unwrap() <= 4);
    }
}
