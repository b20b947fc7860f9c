//! Deferred deletion of GPU resources.
//!
//! The CPU records frame N+1 while the GPU may still execute frame N, so a
//! resource replaced during recording (a resized attachment, a regrown
//! instance buffer) cannot be destroyed on the spot. It is retired into the
//! queue of the current frame slot instead, and destroyed when the renderer
//! comes back around to that slot, after waiting on the slot's fence.
//!
//! ```text
//! push() at slot k            end_frame() x frames_in_flight
//!        │                                   │
//!        ▼                                   ▼
//! ┌──────────┐ ┌──────────┐           ┌──────────┐
//! │ slot k   │ │ slot k+1 │    ...    │ slot k   │──▶ wait fence(k), flush(k)
//! │ pending  │ │ pending  │           │ pending  │
//! └──────────┘ └──────────┘           └──────────┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::backend::{BufferHandle, GraphicsDevice, QueryPoolHandle, TextureHandle};

/// A resource waiting for the GPU to finish with it.
pub enum RetiredResource {
    Buffer(BufferHandle),
    Texture(TextureHandle),
    QueryPool(QueryPoolHandle),
    /// Arbitrary cleanup that needs the device.
    Custom(Box<dyn FnOnce(&dyn GraphicsDevice) + Send>),
}

impl RetiredResource {
    fn destroy(self, device: &dyn GraphicsDevice) {
        match self {
            Self::Buffer(buffer) => device.destroy_buffer(buffer),
            Self::Texture(texture) => device.destroy_texture(texture),
            Self::QueryPool(pool) => device.destroy_query_pool(pool),
            Self::Custom(cleanup) => cleanup(device),
        }
    }
}

impl fmt::Debug for RetiredResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(buffer) => f.debug_tuple("Buffer").field(buffer).finish(),
            Self::Texture(texture) => f.debug_tuple("Texture").field(texture).finish(),
            Self::QueryPool(pool) => f.debug_tuple("QueryPool").field(pool).finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[derive(Debug)]
struct PendingDeletion {
    label: String,
    resource: RetiredResource,
}

/// Per-slot queues of retired resources.
///
/// `push` takes `&self` so passes can retire resources through the shared
/// [`FrameInfo`](crate::renderer::FrameInfo).
#[derive(Debug)]
pub struct DeletionQueue {
    slots: Vec<Mutex<Vec<PendingDeletion>>>,
    current_slot: AtomicUsize,
}

impl DeletionQueue {
    /// Create a queue for `frames_in_flight` slots.
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "frames_in_flight must be at least 1");
        Self {
            slots: (0..frames_in_flight).map(|_| Mutex::new(Vec::new())).collect(),
            current_slot: AtomicUsize::new(0),
        }
    }

    /// Retire a resource into the current slot.
    pub fn push(&self, label: impl Into<String>, resource: RetiredResource) {
        let slot = self.current_slot();
        let label = label.into();
        log::trace!("Retiring '{}' ({:?}) at slot {}", label, resource, slot);
        self.slots[slot].lock().push(PendingDeletion { label, resource });
    }

    /// Slot that new entries go to.
    pub fn current_slot(&self) -> usize {
        self.current_slot.load(Ordering::Acquire)
    }

    pub(crate) fn set_current_slot(&self, slot: usize) {
        debug_assert!(slot < self.slots.len());
        self.current_slot.store(slot, Ordering::Release);
    }

    /// Destroy everything retired into `slot`. The caller must have waited
    /// for the GPU work that last used that slot.
    pub fn flush(&self, slot: usize, device: &dyn GraphicsDevice) -> usize {
        let pending = std::mem::take(&mut *self.slots[slot].lock());
        let count = pending.len();
        for entry in pending {
            log::trace!("Destroying retired '{}'", entry.label);
            entry.resource.destroy(device);
        }
        if count > 0 {
            log::debug!("Flushed {} retired resources from slot {}", count, slot);
        }
        count
    }

    /// Destroy everything in every slot. The device must be idle.
    pub fn flush_all(&self, device: &dyn GraphicsDevice) -> usize {
        (0..self.slots.len()).map(|slot| self.flush(slot, device)).sum()
    }

    /// Total number of resources awaiting destruction.
    pub fn pending_count(&self) -> usize {
        self.slots.iter().map(|slot| slot.lock().len()).sum()
    }

    /// Number of resources awaiting destruction in `slot`.
    pub fn pending_in_slot(&self, slot: usize) -> usize {
        self.slots[slot].lock().len()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
