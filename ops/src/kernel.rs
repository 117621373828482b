use std::fmt;
use std::sync::Arc;

use core_types::{DeviceId, CPU_DEVICE_ID};
use derive_more::From;
use memory::MemoryManager;
use parking_lot::Mutex;
use pushpull_core::GpuContext;
use tensor::{FrameworkDType, Tensor};

use crate::status::{errors, Status};
use crate::types::DeviceType;

/// Invoked exactly once when an async kernel has finished.
pub type DoneCallback = Box<dyn FnOnce() + Send + 'static>;

/// A GPU the kernel runs on, with the context its producers submit to.
#[derive(Clone)]
pub struct GpuDevice {
    pub index:   u16,
    pub context: Option<GpuContext>,
}

impl GpuDevice {
    /// A GPU whose work is already complete by the time kernels run.
    pub fn without_context(index: u16) -> Self {
        Self { index, context: None }
    }
}

impl fmt::Debug for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuDevice")
            .field("index", &self.index)
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

#[derive(Clone, Debug, From)]
pub enum Device {
    Cpu,
    Gpu(GpuDevice),
}

impl Device {
    pub fn device_type(&self) -> DeviceType {
        match self {
            Device::Cpu => DeviceType::Cpu,
            Device::Gpu(_) => DeviceType::Gpu,
        }
    }

    /// Engine device identifier
    pub fn id(&self) -> DeviceId {
        match self {
            Device::Cpu => CPU_DEVICE_ID,
            Device::Gpu(gpu) => DeviceId::from(gpu.index),
        }
    }

    pub fn device_context(&self) -> Option<&GpuContext> {
        match self {
            Device::Cpu => None,
            Device::Gpu(gpu) => gpu.context.as_ref(),
        }
    }
}

/// Per-invocation state handed to a kernel: inputs, device, allocator,
/// and the slots the kernel fills before signalling completion.
pub struct OpKernelContext {
    inputs:    Vec<Tensor>,
    device:    Device,
    allocator: Arc<MemoryManager>,
    outputs:   Mutex<Vec<Option<Tensor>>>,
    status:    Mutex<Status>,
}

impl OpKernelContext {
    pub fn new(
        inputs: Vec<Tensor>,
        device: Device,
        allocator: Arc<MemoryManager>,
        num_outputs: usize,
    ) -> Self {
        Self {
            inputs,
            device,
            allocator,
            outputs: Mutex::new(vec![None; num_outputs]),
            status: Mutex::new(Status::ok()),
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn input(&self, index: usize) -> &Tensor {
        &self.inputs[index]
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Allocate output `index`; the tensor is also returned to the caller.
    pub fn allocate_output(
        &self,
        index: usize,
        shape: &[usize],
        dtype: FrameworkDType,
    ) -> Result<Tensor, Status> {
        let mut outputs = self.outputs.lock();
        let slot = outputs
            .get_mut(index)
            .ok_or_else(|| errors::internal(format!("output {index} out of range")))?;
        let tensor = Tensor::empty(&self.allocator, dtype, shape).map_err(|e| {
            errors::resource_exhausted(format!(
                "OOM when allocating tensor with shape {shape:?} and type {dtype}: {e}"
            ))
        })?;
        *slot = Some(tensor.clone());
        Ok(tensor)
    }

    pub fn output(&self, index: usize) -> Option<Tensor> {
        self.outputs.lock().get(index).cloned().flatten()
    }

    pub fn set_status(&self, status: Status) {
        *self.status.lock() = status;
    }

    pub fn status(&self) -> Status {
        self.status.lock().clone()
    }
}

/// A kernel that completes through a callback instead of on return.
pub trait AsyncOpKernel: Send + Sync {
    fn name(&self) -> &str;

    /// Must call `done` exactly once, possibly from another thread.
    fn compute_async(&self, ctx: Arc<OpKernelContext>, done: DoneCallback);
}
