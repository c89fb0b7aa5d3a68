//! Fixed-capacity circular buffer of pending indications.
//!
//! Producers push here when the one-at-a-time indication transport is busy;
//! the periodic tick drains one entry whenever the transport frees up.
//!
//! `count` is the single source of truth. `write_index == read_index` alone
//! cannot tell empty from full, so the full/empty flags reported by
//! [`IndicationQueue::status`] are derived from it.
//!
//! The queue is only touched from task context. A port that produces
//! indications from interrupt context must wrap `enqueue`/`dequeue` in a
//! critical section the same way [`crate::signal::SignalFlags`] does.

use crate::config::{INDICATION_PAYLOAD_MAX, QUEUE_CAPACITY};
use crate::error::Error;
use crate::gatt::Characteristic;

/// One queued indication, copied by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IndicationEntry {
    pub characteristic: Characteristic,
    len: u8,
    payload: [u8; INDICATION_PAYLOAD_MAX],
}

impl IndicationEntry {
    pub fn new(characteristic: Characteristic, value: &[u8]) -> Result<Self, Error> {
        if value.len() > INDICATION_PAYLOAD_MAX {
            return Err(Error::PayloadTooLong);
        }
        let mut payload = [0u8; INDICATION_PAYLOAD_MAX];
        payload[..value.len()].copy_from_slice(value);
        Ok(Self {
            characteristic,
            len: value.len() as u8,
            payload,
        })
    }

    const fn blank() -> Self {
        Self {
            characteristic: Characteristic::TemperatureMeasurement,
            len: 0,
            payload: [0; INDICATION_PAYLOAD_MAX],
        }
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len as usize]
    }
}

/// Snapshot of the queue pointers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueStatus {
    pub write_index: usize,
    pub read_index: usize,
    pub is_full: bool,
    pub is_empty: bool,
}

pub struct IndicationQueue<const N: usize = QUEUE_CAPACITY> {
    slots: [IndicationEntry; N],
    write_index: usize,
    read_index: usize,
    count: usize,
}

impl<const N: usize> IndicationQueue<N> {
    pub const fn new() -> Self {
        Self {
            slots: [IndicationEntry::blank(); N],
            write_index: 0,
            read_index: 0,
            count: 0,
        }
    }

    /// Copy an indication into the next free slot.
    ///
    /// On a full queue nothing is written and `Error::QueueFull` is returned;
    /// the caller decides what to do with the value.
    pub fn enqueue(&mut self, characteristic: Characteristic, value: &[u8]) -> Result<(), Error> {
        if self.is_full() {
            return Err(Error::QueueFull);
        }
        let entry = IndicationEntry::new(characteristic, value)?;
        self.slots[self.write_index] = entry;
        self.write_index = (self.write_index + 1) % N;
        self.count += 1;
        Ok(())
    }

    /// Remove the oldest entry.
    pub fn dequeue(&mut self) -> Option<IndicationEntry> {
        if self.is_empty() {
            return None;
        }
        let entry = self.slots[self.read_index];
        self.read_index = (self.read_index + 1) % N;
        self.count -= 1;
        Some(entry)
    }

    /// Oldest entry without removing it.
    pub fn peek(&self) -> Option<&IndicationEntry> {
        (!self.is_empty()).then(|| &self.slots[self.read_index])
    }

    pub fn depth(&self) -> usize {
        self.count
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn is_full(&self) -> bool {
        self.count == N
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            write_index: self.write_index,
            read_index: self.read_index,
            is_full: self.is_full(),
            is_empty: self.is_empty(),
        }
    }

    /// Discard every pending entry (connection closed).
    pub fn clear(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.count = 0;
    }
}

impl<const N: usize> Default for IndicationQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMP: Characteristic = Characteristic::TemperatureMeasurement;
    const BUTTON: Characteristic = Characteristic::ButtonState;

    #[test]
    fn new_queue_is_empty() {
        let q: IndicationQueue = IndicationQueue::new();
        assert_eq!(q.depth(), 0);
        assert_eq!(q.capacity(), QUEUE_CAPACITY);
        assert_eq!(
            q.status(),
            QueueStatus {
                write_index: 0,
                read_index: 0,
                is_full: false,
                is_empty: true,
            }
        );
    }

    #[test]
    fn entries_come_out_in_order() {
        let mut q: IndicationQueue = IndicationQueue::new();
        q.enqueue(TEMP, &[0, 1, 2, 3, 4]).unwrap();
        q.enqueue(BUTTON, &[1]).unwrap();

        let first = q.dequeue().unwrap();
        assert_eq!(first.characteristic, TEMP);
        assert_eq!(first.payload(), &[0, 1, 2, 3, 4]);

        let second = q.dequeue().unwrap();
        assert_eq!(second.characteristic, BUTTON);
        assert_eq!(second.payload(), &[1]);
        assert_eq!(second.len(), 1);

        assert!(q.dequeue().is_none());
    }

    #[test]
    fn depth_tracks_enqueues_minus_dequeues() {
        let mut q: IndicationQueue = IndicationQueue::new();
        for n in 1..=10 {
            q.enqueue(BUTTON, &[n as u8]).unwrap();
            assert_eq!(q.depth(), n);
        }
        for m in 1..=4 {
            q.dequeue().unwrap();
            assert_eq!(q.depth(), 10 - m);
        }
        let status = q.status();
        assert!(!status.is_full);
        assert!(!status.is_empty);
    }

    #[test]
    fn full_queue_rejects_without_moving_write_index() {
        let mut q: IndicationQueue = IndicationQueue::new();
        for n in 0..QUEUE_CAPACITY {
            q.enqueue(BUTTON, &[n as u8]).unwrap();
        }
        let before = q.status();
        assert!(before.is_full);
        assert!(!before.is_empty);
        // Full and empty share write_index == read_index; count tells them apart.
        assert_eq!(before.write_index, before.read_index);

        assert_eq!(q.enqueue(TEMP, &[9]), Err(Error::QueueFull));
        assert_eq!(q.status(), before);
        assert_eq!(q.depth(), QUEUE_CAPACITY);
    }

    #[test]
    fn empty_queue_dequeue_leaves_read_index() {
        let mut q: IndicationQueue = IndicationQueue::new();
        q.enqueue(BUTTON, &[1]).unwrap();
        q.dequeue().unwrap();
        let before = q.status();
        assert!(q.dequeue().is_none());
        assert_eq!(q.status(), before);
        assert_eq!(before.read_index, 1);
    }

    #[test]
    fn dequeue_from_full_clears_full_flag() {
        let mut q: IndicationQueue<4> = IndicationQueue::new();
        for n in 0..4 {
            q.enqueue(BUTTON, &[n]).unwrap();
        }
        assert!(q.is_full());
        assert_eq!(q.dequeue().unwrap().payload(), &[0]);
        let status = q.status();
        assert!(!status.is_full);
        assert!(!status.is_empty);
    }

    #[test]
    fn indices_wrap_around() {
        let mut q: IndicationQueue<4> = IndicationQueue::new();
        for round in 0..3u8 {
            for n in 0..3u8 {
                q.enqueue(BUTTON, &[round * 10 + n]).unwrap();
            }
            for n in 0..3u8 {
                assert_eq!(q.dequeue().unwrap().payload(), &[round * 10 + n]);
            }
        }
        let status = q.status();
        assert_eq!(status.write_index, 9 % 4);
        assert_eq!(status.read_index, 9 % 4);
        assert!(status.is_empty);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut q: IndicationQueue = IndicationQueue::new();
        assert_eq!(q.enqueue(TEMP, &[0; 6]), Err(Error::PayloadTooLong));
        assert_eq!(q.depth(), 0);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut q: IndicationQueue = IndicationQueue::new();
        assert!(q.peek().is_none());
        q.enqueue(BUTTON, &[1]).unwrap();
        assert_eq!(q.peek().unwrap().payload(), &[1]);
        assert_eq!(q.depth(), 1);
    }

    #[test]
    fn clear_discards_entries() {
        let mut q: IndicationQueue = IndicationQueue::new();
        q.enqueue(BUTTON, &[1]).unwrap();
        q.enqueue(BUTTON, &[0]).unwrap();
        q.clear();
        assert!(q.is_empty());
        assert!(q.dequeue().is_none());
    }
}
