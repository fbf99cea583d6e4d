// listener.rs
//
// Observers of memory traffic. Debuggers and memory viewers register a listener
// for an address range and are called back on every notifying access that
// touches it, plus once on every reset.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};

use thiserror::Error;

/// One notifying access: the narrow value actually read or written, and the
/// word that contains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAccess {
    pub address: u32,
    pub length: u32,
    pub value: u32,
    pub word_address: u32,
    pub word_value: u32,
}

impl MemoryAccess {
    /// Last byte address touched by the access.
    pub fn last_address(&self) -> u32 {
        self.address.saturating_add(self.length.saturating_sub(1))
    }
}

pub trait MemoryListener: Send + Sync {
    fn memory_read(&self, _access: &MemoryAccess) {}

    fn memory_written(&self, _access: &MemoryAccess) {}

    fn memory_reset(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid listener range 0x{first:08x}-0x{last:08x}: first address is above last")]
pub struct InvalidListenerRange {
    pub first: u32,
    pub last: u32,
}

/// A listener registered for `[first, last]`.
#[derive(Clone)]
pub struct ListenerRange {
    pub listener: Arc<dyn MemoryListener>,
    pub first: u32,
    pub last: u32,
}

impl ListenerRange {
    pub fn intersects(&self, first: u32, last: u32) -> bool {
        self.first <= last && first <= self.last
    }

    /// Overlapping or directly adjacent.
    fn touches(&self, first: u32, last: u32) -> bool {
        self.intersects(first, last)
            || self.last.checked_add(1) == Some(first)
            || last.checked_add(1) == Some(self.first)
    }

    fn belongs_to(&self, listener: &Arc<dyn MemoryListener>) -> bool {
        Arc::ptr_eq(&self.listener, listener)
    }
}

impl std::fmt::Debug for ListenerRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRange")
            .field("listener", &Arc::as_ptr(&self.listener).cast::<()>())
            .field("first", &format_args!("0x{:08x}", self.first))
            .field("last", &format_args!("0x{:08x}", self.last))
            .finish()
    }
}

/// The registered ranges. Dispatch works on a snapshot taken under the lock, so
/// listeners may register or remove themselves from inside a callback.
#[derive(Default)]
pub struct ListenerSet {
    ranges: RwLock<Vec<ListenerRange>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<ListenerRange>> {
        self.ranges.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<ListenerRange>> {
        self.ranges.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `listener` for `[first, last]`, merging with any of its existing
    /// ranges that overlap or adjoin the new one.
    pub fn add(&self, listener: Arc<dyn MemoryListener>, first: u32, last: u32) -> Result<(), InvalidListenerRange> {
        if first > last {
            return Err(InvalidListenerRange { first, last });
        }
        let (mut first, mut last) = (first, last);
        let mut ranges = self.write();
        while let Some(index) = ranges.iter().position(|r| r.belongs_to(&listener) && r.touches(first, last)) {
            let merged = ranges.swap_remove(index);
            first = first.min(merged.first);
            last = last.max(merged.last);
        }
        tracing::trace!(first = format_args!("0x{:08x}", first), last = format_args!("0x{:08x}", last), "listener added");
        ranges.push(ListenerRange { listener, first, last });
        Ok(())
    }

    /// Drop every range registered by `listener`.
    pub fn remove(&self, listener: &Arc<dyn MemoryListener>) {
        self.write().retain(|r| !r.belongs_to(listener));
    }

    pub fn ranges(&self) -> Vec<ListenerRange> {
        self.read().clone()
    }

    /// The ranges registered by `listener`, as `(first, last)` sorted by address.
    pub fn ranges_of(&self, listener: &Arc<dyn MemoryListener>) -> Vec<(u32, u32)> {
        let mut ranges: Vec<(u32, u32)> =
            self.read().iter().filter(|r| r.belongs_to(listener)).map(|r| (r.first, r.last)).collect();
        ranges.sort_unstable();
        ranges
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Listeners with a range intersecting `[first, last]`, each once.
    fn interested(&self, first: u32, last: u32) -> Vec<Arc<dyn MemoryListener>> {
        let ranges = self.read();
        let mut listeners: Vec<Arc<dyn MemoryListener>> = Vec::new();
        for range in ranges.iter().filter(|r| r.intersects(first, last)) {
            if !listeners.iter().any(|l| Arc::ptr_eq(l, &range.listener)) {
                listeners.push(Arc::clone(&range.listener));
            }
        }
        listeners
    }

    pub fn dispatch_read(&self, access: &MemoryAccess) {
        for listener in self.interested(access.address, access.last_address()) {
            listener.memory_read(access);
        }
    }

    pub fn dispatch_write(&self, access: &MemoryAccess) {
        for listener in self.interested(access.address, access.last_address()) {
            listener.memory_written(access);
        }
    }

    /// Every listener, regardless of range.
    pub fn dispatch_reset(&self) {
        let mut listeners: Vec<Arc<dyn MemoryListener>> = Vec::new();
        for range in self.read().iter() {
            if !listeners.iter().any(|l| Arc::ptr_eq(l, &range.listener)) {
                listeners.push(Arc::clone(&range.listener));
            }
        }
        for listener in listeners {
            listener.memory_reset();
        }
    }
}
