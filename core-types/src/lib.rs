mod status;

use std::fmt;
use std::sync::Arc;

pub use status::{Status, StatusType};

include!("generated_data_types.rs");

/// Type alias for a buffer identifier
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);
impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferId({})", self.0)
    }
}

/// Device index as seen by the engine. Accelerators are numbered from 0.
pub type DeviceId = i32;

/// Device id used for tensors living in host memory
pub const CPU_DEVICE_ID: DeviceId = -1;

/// Ordered dimension sizes, outermost first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TensorShape {
    dims: Vec<i64>,
}

impl TensorShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dim(&mut self, size: i64) {
        self.dims.push(size);
    }

    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Product of all dimensions; 1 for a scalar
    pub fn num_elements(&self) -> i64 {
        self.dims.iter().product()
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> Self {
        Self { dims: dims.iter().map(|&d| d as i64).collect() }
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// Tensor as seen by the engine: a view that never owns or copies storage.
///
/// `data()` must stay valid for as long as the view is alive. `copy_to` and
/// `copy_from` are the engine's only way to move bytes; `copy_from` is called
/// on output views after the reduction finished.
pub trait EngineTensor: Send + Sync {
    fn dtype(&self) -> DataType;
    fn shape(&self) -> TensorShape;
    fn data(&self) -> *const u8;
    fn size_in_bytes(&self) -> usize;

    fn copy_to(&self, dst: &mut [u8]);
    fn copy_from(&self, src: &[u8]);
}

/// "The producing device work is done and the buffers are safe to touch."
///
/// Implementations are monotonic: once `ready()` returned true it keeps
/// returning true.
pub trait ReadyEvent: Send + Sync {
    fn ready(&self) -> bool;
}

/// Readiness for synchronous devices, or when no device context exists.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysReady;

impl ReadyEvent for AlwaysReady {
    fn ready(&self) -> bool {
        true
    }
}

impl AlwaysReady {
    pub fn shared() -> Arc<dyn ReadyEvent> {
        Arc::new(AlwaysReady)
    }
}
