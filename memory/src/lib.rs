mod pool;

use bytemuck::{cast_slice, Pod};
use core_types::BufferId;
use thiserror::Error;

pub use pool::{BufferHandle, BufferPool, Storage};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },
    #[error("unknown buffer {0}")]
    UnknownBuffer(BufferId),
    #[error("buffer {id} holds {capacity} bytes, got {found}")]
    SizeMismatch { id: BufferId, capacity: usize, found: usize },
}

/// Host allocator for framework tensors.
///
/// Buffers are released when the pool holds the last reference; an optional
/// capacity bounds the bytes alive at once.
pub struct MemoryManager {
    main_pool: BufferPool,
    capacity:  Option<usize>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self { main_pool: BufferPool::new(), capacity: None }
    }

    pub fn with_capacity(capacity_bytes: usize) -> Self {
        Self { main_pool: BufferPool::new(), capacity: Some(capacity_bytes) }
    }

    /// Raw allocation. The capacity check and the insert are atomic.
    pub fn allocate_raw(&self, size_bytes: usize) -> Result<(BufferId, BufferHandle), AllocError> {
        self.main_pool
            .try_create_buffer(size_bytes, self.capacity)
            .map_err(|available| AllocError::OutOfMemory { requested: size_bytes, available })
    }

    /// Raw upload: host slice → pooled buffer.
    pub fn write_to_buffer<T: Pod>(
        &self,
        dest_id: BufferId,
        data: &[T],
    ) -> Result<(), AllocError> {
        let bytes: &[u8] = cast_slice(data);
        let dst = self.main_pool.get(dest_id).ok_or(AllocError::UnknownBuffer(dest_id))?;
        let mut region = dst.write();
        if region.len() != bytes.len() {
            return Err(AllocError::SizeMismatch {
                id: dest_id,
                capacity: region.len(),
                found: bytes.len(),
            });
        }
        region.copy_from_slice(bytes);
        Ok(())
    }

    /// Bytes currently held, after dropping buffers nobody references
    pub fn live_bytes(&self) -> usize {
        self.main_pool.clear_unused();
        self.main_pool.live_bytes()
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}
