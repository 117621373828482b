use std::sync::Arc;

use tensor::FrameworkDType;

use crate::kernel::AsyncOpKernel;
use crate::runtime::Runtime;
use crate::types::{DeviceType, OpSignature};

/// What a kernel is built from once its signature has been checked.
pub struct KernelConstruction {
    /// Graph node name; also the engine-side tensor name
    pub node_name:   String,
    /// Resolved type attribute
    pub dtype:       FrameworkDType,
    pub device_type: DeviceType,
    pub runtime:     Arc<Runtime>,
}

/// Trait to implement for each Op
pub trait Op: Send + Sync {
    /// Full signature
    fn signature(&self) -> &OpSignature;

    /// Build the kernel for one node
    fn create_kernel(&self, construction: KernelConstruction) -> Box<dyn AsyncOpKernel>;
}

/// Wrapper for op factory functions
pub struct OpFactory {
    pub name:    &'static str,
    pub factory: fn() -> Box<dyn Op>,
}

// Collect all registered ops
inventory::collect!(OpFactory);
