mod adapter;
mod dtype;
mod utils;

use core_types::BufferId;
use memory::{AllocError, BufferHandle, MemoryManager};
use thiserror::Error;
use utils::{compute_strides, element_count};

pub use adapter::{engine_dtype, TensorAdapter};
pub use dtype::{Element, FrameworkDType};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error("shape {shape:?} needs {expected} elements, got {found}")]
    ElementCount { shape: Vec<usize>, expected: usize, found: usize },
    #[error("tensor holds {actual}, requested {requested}")]
    DtypeMismatch { actual: FrameworkDType, requested: FrameworkDType },
    #[error("{0} has no fixed element size")]
    UnsizedType(FrameworkDType),
    #[error("shape {0:?} is too large")]
    ShapeOverflow(Vec<usize>),
}

/// Framework tensor: dtype tag, dense row-major shape and pooled host storage.
///
/// Cloning is cheap and shares the storage.
#[derive(Clone, Debug)]
pub struct Tensor {
    buffer_id: BufferId,
    buffer:    BufferHandle,
    shape:     Vec<usize>,
    dtype:     FrameworkDType,
}

impl Tensor {
    /* --------------------------------------------------------------------- */
    /* Constructors                                                          */
    /* --------------------------------------------------------------------- */

    /// Allocate a zero-filled tensor.
    pub fn empty(
        mgr:   &MemoryManager,
        dtype: FrameworkDType,
        shape: &[usize],
    ) -> Result<Self, TensorError> {
        let elem_size = dtype.size_in_bytes().ok_or(TensorError::UnsizedType(dtype))?;
        let bytes = element_count(shape)
            .and_then(|n| n.checked_mul(elem_size))
            .ok_or_else(|| TensorError::ShapeOverflow(shape.to_vec()))?;
        let (buffer_id, buffer) = mgr.allocate_raw(bytes)?;

        Ok(Tensor {
            buffer_id,
            buffer,
            shape: shape.to_vec(),
            dtype,
        })
    }

    /// Construct a tensor by copying a host slice
    pub fn from_vec<T: Element>(
        mgr:   &MemoryManager,
        data:  &[T],
        shape: &[usize],
    ) -> Result<Self, TensorError> {
        let expected = element_count(shape).ok_or_else(|| TensorError::ShapeOverflow(shape.to_vec()))?;
        if expected != data.len() {
            return Err(TensorError::ElementCount {
                shape: shape.to_vec(),
                expected,
                found: data.len(),
            });
        }
        let tensor = Self::empty(mgr, T::DTYPE, shape)?;
        mgr.write_to_buffer(tensor.buffer_id, data)?;
        Ok(tensor)
    }

    /// Construct a tensor of any sized dtype from its raw bytes
    pub fn from_bytes(
        mgr:   &MemoryManager,
        dtype: FrameworkDType,
        shape: &[usize],
        bytes: &[u8],
    ) -> Result<Self, TensorError> {
        let tensor = Self::empty(mgr, dtype, shape)?;
        mgr.write_to_buffer(tensor.buffer_id, bytes)?;
        Ok(tensor)
    }

    /// Rank-0 tensor holding `value`
    pub fn scalar<T: Element>(mgr: &MemoryManager, value: T) -> Result<Self, TensorError> {
        Self::from_vec(mgr, &[value], &[])
    }

    /// Copy the contents out as `Vec<T>`.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>, TensorError> {
        if T::DTYPE != self.dtype {
            return Err(TensorError::DtypeMismatch { actual: self.dtype, requested: T::DTYPE });
        }
        let bytes = self.buffer.read();
        Ok(bytes
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned::<T>)
            .collect())
    }

    /* --------------------------------------------------------------------- */
    /* Accessors                                                             */
    /* --------------------------------------------------------------------- */

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Row-major strides in elements
    pub fn strides(&self) -> Vec<usize> {
        compute_strides(&self.shape)
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// The internal BufferId
    pub fn buffer_id(&self) -> BufferId {
        self.buffer_id
    }

    /// Shared handle on the backing storage
    pub fn storage(&self) -> &BufferHandle {
        &self.buffer
    }

    /// The tensor's element type tag
    pub fn dtype(&self) -> FrameworkDType {
        self.dtype
    }

    /// Exact length of the backing storage
    pub fn size_in_bytes(&self) -> usize {
        self.buffer.len()
    }
}

/* ------------------------------------------------------------------------- */
/*                                     Tests                                 */
/* ------------------------------------------------------------------------- */
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tensor_dtype_and_shape() {
        let mm = MemoryManager::new();

        let shape = [2, 3, 4];
        let t = Tensor::empty(&mm, FrameworkDType::Float, &shape).unwrap();

        assert_eq!(t.dtype(), FrameworkDType::Float);
        assert_eq!(t.shape(), &shape);
        assert_eq!(t.strides(), vec![12, 4, 1]);
        assert_eq!(t.num_elements(), 24);
        assert_eq!(t.size_in_bytes(), 24 * 4);
    }

    #[test]
    fn test_from_vec_and_to_vec_preserves_data_and_dtype() {
        let mm = MemoryManager::new();

        let data = vec![1u32, 2, 3, 4];
        let t = Tensor::from_vec(&mm, &data, &[2, 2]).unwrap();

        assert_eq!(t.to_vec::<u32>().unwrap(), data);
        assert_eq!(t.dtype(), FrameworkDType::UInt32);
        assert_eq!(
            t.to_vec::<f32>().unwrap_err(),
            TensorError::DtypeMismatch { actual: FrameworkDType::UInt32, requested: FrameworkDType::Float }
        );
    }

    #[test]
    fn from_vec_checks_element_count() {
        let mm = MemoryManager::new();
        let err = Tensor::from_vec(&mm, &[1.0f32, 2.0, 3.0], &[2, 2]).unwrap_err();
        assert!(matches!(err, TensorError::ElementCount { expected: 4, found: 3, .. }));
    }

    #[test]
    fn scalar_has_rank_zero() {
        let mm = MemoryManager::new();
        let t = Tensor::scalar(&mm, 7i32).unwrap();
        assert!(t.shape().is_empty());
        assert_eq!(t.num_elements(), 1);
        assert_eq!(t.to_vec::<i32>().unwrap(), vec![7]);
    }

    #[test]
    fn string_tensors_cannot_be_allocated() {
        let mm = MemoryManager::new();
        let err = Tensor::empty(&mm, FrameworkDType::String, &[3]).unwrap_err();
        assert_eq!(err, TensorError::UnsizedType(FrameworkDType::String));
    }

    #[test]
    fn allocation_failure_surfaces() {
        let mm = MemoryManager::with_capacity(8);
        let err = Tensor::empty(&mm, FrameworkDType::Double, &[4]).unwrap_err();
        assert!(matches!(err, TensorError::Alloc(AllocError::OutOfMemory { requested: 32, .. })));
    }

    #[test]
    fn clones_share_storage() {
        let mm = MemoryManager::new();
        let a = Tensor::from_vec(&mm, &[1i64, 2], &[2]).unwrap();
        let b = a.clone();
        assert_eq!(a.buffer_id(), b.buffer_id());
        assert_eq!(a.storage().as_ptr(), b.storage().as_ptr());
    }
}
