//! Fixed-capacity FIFO of decisions already sent to the environment.
//!
//! Each entry is one frame of every agent's most recently popped decision.
//! The ring is sized `1 + min_delay` at construction and its length stays
//! at that value between rollout steps (one pop and one push per step).
//! Overflow and underflow are synchronization bugs, reported as
//! [`SyncError`] rather than silently growing or blocking.

use crate::error::SyncError;

/// A fixed-capacity FIFO ring.
///
/// The read position is monotonic; slot index is `pos % capacity`.
#[derive(Debug)]
pub struct PendingOutputs<T> {
    slots: Vec<Option<T>>,
    read_pos: u64,
    len: usize,
}

impl<T> PendingOutputs<T> {
    /// Create an empty ring.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "PendingOutputs capacity must be >= 1, got {capacity}");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            read_pos: 0,
            len: 0,
        }
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Current number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the ring holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the ring holds `capacity` entries.
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    fn slot(&self, offset: usize) -> usize {
        ((self.read_pos + offset as u64) % self.capacity() as u64) as usize
    }

    /// Append at the tail.
    pub fn push(&mut self, item: T) -> Result<(), SyncError> {
        if self.is_full() {
            return Err(SyncError::PendingOverflow {
                capacity: self.capacity(),
            });
        }
        let idx = self.slot(self.len);
        self.slots[idx] = Some(item);
        self.len += 1;
        Ok(())
    }

    /// Remove the head.
    pub fn pop(&mut self) -> Result<T, SyncError> {
        let idx = self.slot(0);
        let item = self.slots[idx].take().ok_or(SyncError::PendingUnderflow)?;
        self.read_pos += 1;
        self.len -= 1;
        Ok(item)
    }

    /// Borrow the head.
    pub fn front(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.slot(0)].as_ref()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |offset| self.slots[self.slot(offset)].as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fifo_order_and_bounds() {
        let mut ring = PendingOutputs::new(2);
        assert_eq!(ring.pop(), Err(SyncError::PendingUnderflow));
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        assert_eq!(ring.push(3), Err(SyncError::PendingOverflow { capacity: 2 }));
        assert_eq!(ring.front(), Some(&1));
        assert_eq!(ring.pop(), Ok(1));
        ring.push(3).unwrap();
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(ring.pop(), Ok(2));
        assert_eq!(ring.pop(), Ok(3));
        assert!(ring.is_empty());
        assert_eq!(ring.front(), None);
    }

    #[test]
    #[should_panic(expected = "capacity must be >= 1")]
    fn zero_capacity_panics() {
        let _ = PendingOutputs::<u8>::new(0);
    }

    proptest! {
        #[test]
        fn steady_state_keeps_length(capacity in 1usize..8, steps in 0usize..64) {
            let mut ring = PendingOutputs::new(capacity);
            for i in 0..capacity {
                ring.push(i).unwrap();
            }
            for i in 0..steps {
                let head = ring.pop().unwrap();
                prop_assert_eq!(head, i);
                ring.push(i + capacity).unwrap();
                prop_assert_eq!(ring.len(), capacity);
            }
        }
    }
}
