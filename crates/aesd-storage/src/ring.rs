//! Fixed-capacity ring of command entries
//!
//! Slots hold `Option<Entry>`; overwriting or taking a slot drops the owned
//! buffer, so every evicted command is released exactly once.

use tracing::trace;

use crate::entry::Entry;
use crate::seek::{self, Position};

/// Number of commands retained by default
pub const DEFAULT_CAPACITY: usize = 10;

/// Circular store of the most recent commands
#[derive(Debug)]
pub struct RingStore {
    /// Slot array, indexed physically
    slots: Box<[Option<Entry>]>,
    /// Slot that receives the next insert
    write_index: usize,
    /// Slot holding the oldest retained entry
    read_index: usize,
    /// Every slot is occupied
    full: bool,
}

impl Default for RingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RingStore {
    /// Create a ring with the default capacity of ten commands
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a ring holding `capacity` commands (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            write_index: 0,
            read_index: 0,
            full: false,
        }
    }

    /// Maximum number of retained commands
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of retained commands
    pub fn len(&self) -> usize {
        if self.full {
            self.slots.len()
        } else {
            (self.write_index + self.slots.len() - self.read_index) % self.slots.len()
        }
    }

    /// Check if no commands are retained
    pub fn is_empty(&self) -> bool {
        !self.full && self.write_index == self.read_index
    }

    /// Check if the next insert will evict
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Store `entry` as the newest command.
    ///
    /// When the ring is full the oldest entry is removed first and handed
    /// back; dropping it releases its buffer.
    pub fn insert(&mut self, entry: Entry) -> Option<Entry> {
        let capacity = self.slots.len();
        let evicted = if self.full {
            let oldest = self.slots[self.read_index].take();
            self.read_index = (self.read_index + 1) % capacity;
            oldest
        } else {
            None
        };

        trace!(slot = self.write_index, size = entry.size(), "Inserting command");
        self.slots[self.write_index] = Some(entry);
        self.write_index = (self.write_index + 1) % capacity;
        self.full = self.write_index == self.read_index;

        evicted
    }

    /// Iterate retained entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Entry> + '_ {
        let capacity = self.slots.len();
        (0..self.len()).filter_map(move |i| self.slots[(self.read_index + i) % capacity].as_ref())
    }

    /// Sizes of retained entries, oldest first
    pub fn sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.iter().map(Entry::size)
    }

    /// Total bytes across all retained entries
    pub fn total_bytes(&self) -> u64 {
        self.sizes().map(|size| size as u64).sum()
    }

    /// The `index`-th oldest retained entry
    pub fn entry_at(&self, index: usize) -> Option<&Entry> {
        if index >= self.len() {
            return None;
        }
        self.slots[(self.read_index + index) % self.slots.len()].as_ref()
    }

    /// Find the entry containing `linear_offset` and the offset inside it.
    ///
    /// `None` means the offset is at or past the end of the retained history.
    pub fn resolve(&self, linear_offset: u64) -> Option<(&Entry, usize)> {
        let Position {
            index,
            intra_offset,
        } = seek::locate(self.sizes(), linear_offset)?;
        self.entry_at(index).map(|entry| (entry, intra_offset))
    }

    /// Release every retained entry, returning how many were freed
    pub fn clear(&mut self) -> usize {
        let freed = self.slots.iter_mut().filter_map(Option::take).count();
        self.write_index = 0;
        self.read_index = 0;
        self.full = false;
        freed
    }
}
