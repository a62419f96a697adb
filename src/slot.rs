//! Buffer slots, the exchange unit between the pipeline and the component.
//!
//! A [`Slot`] is the minimal unit handed across the component boundary: a
//! backing byte region, a fill length, flags, and a timestamp in component
//! ticks. Ownership of the slot value itself is the synchronization
//! discipline — exactly one side (the port or the component) holds a slot
//! at any instant, so exactly one side can write its storage. The slot is
//! moved into the component on `empty_buffer`/`fill_buffer` and moved back
//! through the session's `buffer_returned` notification.

use crate::buffer::Buffer;
use std::time::Duration;

/// Component timestamp resolution: ticks per second.
pub const TICKS_PER_SECOND: i64 = 1_000_000;

/// Convert a pipeline timestamp to component ticks.
pub fn ticks_from_pts(pts: Duration) -> i64 {
    (pts.as_nanos() * TICKS_PER_SECOND as u128 / 1_000_000_000) as i64
}

/// Convert component ticks back to a pipeline timestamp.
pub fn pts_from_ticks(ticks: i64) -> Duration {
    let ns = ticks.max(0) as u128 * 1_000_000_000 / TICKS_PER_SECOND as u128;
    Duration::from_nanos(ns as u64)
}

/// Backing storage of a slot.
///
/// The `Attached` variant doubles as the owning reference to a pipeline
/// buffer in shared (zero-copy) mode: attaching a buffer transfers
/// ownership into the slot, detaching transfers it back out. There is no
/// separate refcount to balance.
#[derive(Debug)]
pub enum SlotStorage {
    /// Slot-owned storage: component-allocated or raw copied-mode backing.
    Owned(Box<[u8]>),
    /// Storage aliased to a pipeline buffer (zero-copy mode).
    Attached(Buffer),
    /// No backing. Only valid while the fill length is zero, between
    /// shared-mode cycles.
    Detached,
}

/// Flags carried by a slot across the component boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotFlags {
    /// Slot marks end of stream.
    pub eos: bool,
    /// Slot carries codec configuration data.
    pub config: bool,
}

/// A single buffer-exchange slot.
#[derive(Debug)]
pub struct Slot {
    id: usize,
    port_index: u32,
    storage: SlotStorage,
    /// Valid payload length within storage.
    filled: usize,
    /// Payload start within storage.
    offset: usize,
    /// Exchange flags.
    pub flags: SlotFlags,
    /// Timestamp in component ticks, when timestamp propagation is on.
    pub ticks: Option<i64>,
}

impl Slot {
    /// Create a slot backed by slot-owned storage.
    pub fn new_owned(id: usize, port_index: u32, storage: Box<[u8]>) -> Self {
        Self {
            id,
            port_index,
            storage: SlotStorage::Owned(storage),
            filled: 0,
            offset: 0,
            flags: SlotFlags::default(),
            ticks: None,
        }
    }

    /// Create a slot backed by a pipeline buffer (shared mode).
    pub fn new_attached(id: usize, port_index: u32, buffer: Buffer) -> Self {
        Self {
            id,
            port_index,
            storage: SlotStorage::Attached(buffer),
            filled: 0,
            offset: 0,
            flags: SlotFlags::default(),
            ticks: None,
        }
    }

    /// Slot id within its port's pool.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Index of the port this slot belongs to.
    pub fn port_index(&self) -> u32 {
        self.port_index
    }

    /// Capacity of the current backing storage.
    pub fn capacity(&self) -> usize {
        match &self.storage {
            SlotStorage::Owned(s) => s.len(),
            SlotStorage::Attached(b) => b.len(),
            SlotStorage::Detached => 0,
        }
    }

    /// Valid payload length.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Set the valid payload length.
    ///
    /// # Panics
    ///
    /// Panics if `offset + filled` exceeds the storage capacity.
    pub fn set_filled(&mut self, filled: usize) {
        assert!(
            self.offset + filled <= self.capacity(),
            "fill length exceeds slot capacity"
        );
        self.filled = filled;
    }

    /// Payload start offset within storage.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Whether the slot currently aliases a pipeline buffer.
    pub fn is_attached(&self) -> bool {
        matches!(self.storage, SlotStorage::Attached(_))
    }

    /// The valid payload bytes, `storage[offset .. offset + filled]`.
    pub fn payload(&self) -> &[u8] {
        match &self.storage {
            SlotStorage::Owned(s) => &s[self.offset..self.offset + self.filled],
            SlotStorage::Attached(b) => &b.as_bytes()[self.offset..self.offset + self.filled],
            SlotStorage::Detached => &[],
        }
    }

    /// Mutable access to the full backing storage.
    ///
    /// Returns `None` for a detached slot. Only the holder of the slot can
    /// reach this, which is what keeps the one-writer invariant.
    pub fn storage_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.storage {
            SlotStorage::Owned(s) => Some(&mut s[..]),
            SlotStorage::Attached(b) => Some(b.as_mut_bytes()),
            SlotStorage::Detached => None,
        }
    }

    /// Copy `data` into the storage at the current offset, clamped to the
    /// remaining capacity. Sets and returns the fill length.
    pub fn fill_from(&mut self, data: &[u8]) -> usize {
        let offset = self.offset;
        let len = match self.storage_mut() {
            Some(storage) => {
                let len = data.len().min(storage.len().saturating_sub(offset));
                storage[offset..offset + len].copy_from_slice(&data[..len]);
                len
            }
            None => 0,
        };
        self.filled = len;
        len
    }

    /// Attach a pipeline buffer as the new backing storage.
    ///
    /// Ownership of `buffer` moves into the slot; any previous backing is
    /// dropped. The offset resets to zero since the slot now controls the
    /// full region.
    pub fn attach(&mut self, buffer: Buffer) {
        self.storage = SlotStorage::Attached(buffer);
        self.offset = 0;
    }

    /// Detach and return the attached pipeline buffer, if any.
    ///
    /// This is the single point where a stale shared-mode reference leaves
    /// the slot; the storage becomes `Detached`. Owned storage is not
    /// affected and returns `None`.
    pub fn take_attached(&mut self) -> Option<Buffer> {
        match std::mem::replace(&mut self.storage, SlotStorage::Detached) {
            SlotStorage::Attached(b) => Some(b),
            other => {
                self.storage = other;
                None
            }
        }
    }

    /// Replace the backing with slot-owned storage.
    ///
    /// Used when a shared-mode slot needs writable scratch space (config
    /// data is always copied, never aliased).
    pub fn back_with(&mut self, storage: Box<[u8]>) {
        self.storage = SlotStorage::Owned(storage);
        self.offset = 0;
    }

    /// Reset fill length, flags, and timestamp. Storage is untouched.
    pub fn clear(&mut self) {
        self.filled = 0;
        self.flags = SlotFlags::default();
        self.ticks = None;
    }
}
