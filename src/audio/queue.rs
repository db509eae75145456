//! Bounded wait-free SPSC queue for handing fixed-size records between
//! the playback, analysis and UI threads.
//!
//! Each end is a separate handle that is moved into exactly one thread.
//! Pushing never blocks: when the queue is full the new record is dropped
//! and the contents are left untouched.

use rtrb::{Consumer, Producer, RingBuffer};

/// Create a queue holding at most `capacity` records
///
/// The backing store is allocated here and never grows.
pub fn channel<T>(capacity: usize) -> (QueueProducer<T>, QueueConsumer<T>) {
    let (producer, consumer) = RingBuffer::new(capacity);
    (
        QueueProducer { inner: producer },
        QueueConsumer { inner: consumer },
    )
}

/// Producer end of a bounded queue
pub struct QueueProducer<T> {
    inner: Producer<T>,
}

impl<T> QueueProducer<T> {
    /// Push a record without blocking. Returns `false` (and drops the
    /// record) if the queue is full.
    pub fn try_push(&mut self, record: T) -> bool {
        self.inner.push(record).is_ok()
    }

    /// Number of records currently queued
    pub fn size(&self) -> usize {
        self.capacity() - self.inner.slots()
    }

    pub fn capacity(&self) -> usize {
        self.inner.buffer().capacity()
    }
}

/// Consumer end of a bounded queue
pub struct QueueConsumer<T> {
    inner: Consumer<T>,
}

impl<T> QueueConsumer<T> {
    /// Peek at the oldest record without removing it
    pub fn front(&self) -> Option<&T> {
        self.inner.peek().ok()
    }

    /// Remove and return the oldest record
    pub fn pop(&mut self) -> Option<T> {
        self.inner.pop().ok()
    }

    /// Number of records currently queued
    pub fn size(&self) -> usize {
        self.inner.slots()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.buffer().capacity()
    }

    /// Drop everything except the newest record. Returns how many
    /// records were discarded.
    pub fn discard_stale(&mut self) -> usize {
        let stale = self.size().saturating_sub(1);
        for _ in 0..stale {
            let _ = self.inner.pop();
        }
        stale
    }

    /// Newest record, discarding any older ones
    pub fn latest(&mut self) -> Option<T> {
        self.discard_stale();
        self.pop()
    }

    /// Remove everything currently queued
    pub fn clear(&mut self) {
        while self.inner.pop().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SpectrumBins;

    #[test]
    fn test_full_queue_rejects_push() {
        let (mut producer, consumer) = channel::<u32>(3);

        assert!(producer.try_push(1));
        assert!(producer.try_push(2));
        assert!(producer.try_push(3));
        assert!(!producer.try_push(4));

        assert_eq!(producer.size(), 3);
        assert_eq!(consumer.size(), 3);
        // Contents unchanged by the rejected push
        assert_eq!(consumer.front(), Some(&1));
    }

    #[test]
    fn test_pop_is_fifo() {
        let (mut producer, mut consumer) = channel::<u32>(4);

        for i in 0..4 {
            producer.try_push(i);
        }

        for expected in 0..4 {
            assert_eq!(consumer.front(), Some(&expected));
            assert_eq!(consumer.pop(), Some(expected));
        }

        assert!(consumer.front().is_none());
        assert!(consumer.pop().is_none());
    }

    #[test]
    fn test_latest_favors_newest() {
        let (mut producer, mut consumer) = channel::<SpectrumBins>(20);

        for i in 0..7 {
            let mut record = SpectrumBins::zeroed();
            record.data[0] = i as f32;
            producer.try_push(record);
        }

        let newest = consumer.latest().expect("queue should not be empty");
        assert_eq!(newest.data[0], 6.0);
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_discard_stale_keeps_one() {
        let (mut producer, mut consumer) = channel::<u32>(8);
        assert_eq!(consumer.discard_stale(), 0);

        for i in 0..5 {
            producer.try_push(i);
        }

        assert_eq!(consumer.discard_stale(), 4);
        assert_eq!(consumer.size(), 1);
        assert_eq!(consumer.front(), Some(&4));
    }

    #[test]
    fn test_space_is_reused_after_pop() {
        let (mut producer, mut consumer) = channel::<u32>(2);

        assert!(producer.try_push(1));
        assert!(producer.try_push(2));
        assert!(!producer.try_push(3));

        consumer.pop();
        assert!(producer.try_push(3));
        assert_eq!(consumer.pop(), Some(2));
        assert_eq!(consumer.pop(), Some(3));
        assert_eq!(consumer.capacity(), 2);
    }

    #[test]
    fn test_cross_thread_handoff() {
        let (mut producer, mut consumer) = channel::<u64>(20);

        let handle = std::thread::spawn(move || {
            let mut pushed = 0u64;
            for i in 0..1000u64 {
                if producer.try_push(i) {
                    pushed += 1;
                }
            }
            pushed
        });

        let pushed = handle.join().unwrap();

        // Whatever made it through arrives in order
        let mut last = None;
        let mut received = 0u64;
        while let Some(value) = consumer.pop() {
            if let Some(prev) = last {
                assert!(value > prev);
            }
            last = Some(value);
            received += 1;
        }
        assert_eq!(received, pushed);
    }
}
