use std::collections::HashMap;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use core_types::BufferId;

/// Fixed-size, zero-initialised host storage backing one tensor.
///
/// The byte region never moves or grows, so `as_ptr` stays valid for the
/// storage's whole lifetime.
#[derive(Debug)]
pub struct Storage {
    bytes: RwLock<Box<[u8]>>,
}

impl Storage {
    pub fn zeroed(len: usize) -> Self {
        Self { bytes: RwLock::new(vec![0u8; len].into_boxed_slice()) }
    }

    pub fn len(&self) -> usize {
        self.bytes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.bytes.read().as_ptr()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.bytes.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.bytes.write()
    }
}

/// Shared handle to a pooled storage
pub type BufferHandle = Arc<Storage>;

struct BufferEntry {
    buffer: BufferHandle,
    size: usize,
}

/// thread-safe pool of host buffers
pub struct BufferPool {
    next_id: AtomicU64,
    entries: Mutex<HashMap<BufferId, BufferEntry>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a buffer of `size_bytes` unless it would push the pool past
    /// `capacity`; the error carries the bytes still available.
    ///
    /// Unreferenced buffers are dropped first, under the same lock as the
    /// check and the insert.
    pub fn try_create_buffer(
        &self,
        size_bytes: usize,
        capacity: Option<usize>,
    ) -> Result<(BufferId, BufferHandle), usize> {
        let mut entries = self.entries.lock();
        if let Some(capacity) = capacity {
            entries.retain(|_, entry| Arc::strong_count(&entry.buffer) > 1);
            let live: usize = entries.values().map(|e| e.size).sum();
            let available = capacity.saturating_sub(live);
            if size_bytes > available {
                return Err(available);
            }
        }

        let id = BufferId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = Arc::new(Storage::zeroed(size_bytes));
        entries.insert(id, BufferEntry {
            buffer: handle.clone(),
            size: size_bytes,
        });
        Ok((id, handle))
    }

    /// Retrieve a clonable handle to the buffer for a given ID
    pub fn get(&self, id: BufferId) -> Option<BufferHandle> {
        self.entries.lock().get(&id).map(|e| e.buffer.clone())
    }

    /// Clear entries with only one reference (the one in the pool)
    pub fn clear_unused(&self) {
        self.entries.lock().retain(|_, entry| Arc::strong_count(&entry.buffer) > 1);
    }

    /// Bytes held by all tracked buffers
    pub fn live_bytes(&self) -> usize {
        self.entries.lock().values().map(|e| e.size).sum()
    }

}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_pool_allocation() {
        let pool = BufferPool::new();

        let (id, handle) = pool.try_create_buffer(1024, None).unwrap();
        assert!(pool.get(id).is_some(), "Buffer should be allocated");
        assert_eq!(handle.len(), 1024);
        assert!(handle.read().iter().all(|&b| b == 0), "Buffer should be zeroed");
        assert_eq!(pool.live_bytes(), 1024);
    }

    #[test]
    fn capacity_counts_only_referenced_buffers() {
        let pool = BufferPool::new();
        let (_, held) = pool.try_create_buffer(16, Some(48)).unwrap();
        let (dropped_id, dropped) = pool.try_create_buffer(32, Some(48)).unwrap();
        assert_eq!(pool.try_create_buffer(1, Some(48)).unwrap_err(), 0);
        drop(dropped);

        assert!(pool.try_create_buffer(32, Some(48)).is_ok());
        assert!(pool.get(dropped_id).is_none());
        drop(held);
    }

    #[test]
    fn clear_unused_keeps_referenced_buffers() {
        let pool = BufferPool::new();
        let (_, held) = pool.try_create_buffer(16, None).unwrap();
        let (dropped_id, dropped) = pool.try_create_buffer(32, None).unwrap();
        drop(dropped);

        pool.clear_unused();
        assert!(pool.get(dropped_id).is_none());
        assert_eq!(pool.live_bytes(), 16);
        drop(held);
    }

    #[test]
    fn storage_pointer_is_stable() {
        let storage = Storage::zeroed(8);
        let before = storage.as_ptr();
        storage.write()[3] = 7;
        assert_eq!(storage.as_ptr(), before);
        assert_eq!(storage.read()[3], 7);
    }
}
