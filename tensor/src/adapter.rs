use core_types::{DataType, EngineTensor, TensorShape};

use crate::{FrameworkDType, Tensor};

/// Engine type for a framework tag, `None` when the engine cannot reduce it.
pub fn engine_dtype(dtype: FrameworkDType) -> Option<DataType> {
    match dtype {
        FrameworkDType::UInt8 => Some(DataType::UInt8),
        FrameworkDType::Int8 => Some(DataType::Int8),
        FrameworkDType::UInt16 => Some(DataType::UInt16),
        FrameworkDType::Int16 => Some(DataType::Int16),
        FrameworkDType::Int32 => Some(DataType::Int32),
        FrameworkDType::Int64 => Some(DataType::Int64),
        FrameworkDType::Half => Some(DataType::Float16),
        FrameworkDType::Float => Some(DataType::Float32),
        FrameworkDType::Double => Some(DataType::Float64),
        _ => None,
    }
}

/// Read-only engine view over a framework tensor.
///
/// Holds a handle on the tensor's storage, so the buffer outlives every
/// pending operation that references this view. Contents are never copied
/// on construction.
#[derive(Clone, Debug)]
pub struct TensorAdapter {
    tensor: Tensor,
}

impl TensorAdapter {
    pub fn new(tensor: &Tensor) -> Self {
        Self { tensor: tensor.clone() }
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }
}

impl EngineTensor for TensorAdapter {
    /// Panics on types the engine does not support: push-pull kernels are
    /// only ever instantiated for supported types.
    fn dtype(&self) -> DataType {
        let dt = self.tensor.dtype();
        engine_dtype(dt).unwrap_or_else(|| panic!("Invalid tensor type: {dt}"))
    }

    fn shape(&self) -> TensorShape {
        let mut shape = TensorShape::new();
        for &dim in self.tensor.shape() {
            shape.add_dim(dim as i64);
        }
        shape
    }

    fn data(&self) -> *const u8 {
        self.tensor.storage().as_ptr()
    }

    fn size_in_bytes(&self) -> usize {
        self.tensor.size_in_bytes()
    }

    fn copy_to(&self, dst: &mut [u8]) {
        dst.copy_from_slice(&self.tensor.storage().read());
    }

    fn copy_from(&self, src: &[u8]) {
        self.tensor.storage().write().copy_from_slice(src);
    }
}
