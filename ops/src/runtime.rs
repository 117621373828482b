use std::sync::Arc;

use engine::CommEngine;
use memory::MemoryManager;
use tensor::FrameworkDType;

use crate::init_guard::TensorInitGuard;
use crate::kernel::AsyncOpKernel;
use crate::types::{DeviceType, OpError};
use crate::OpRegistry;

/// Process-wide state shared by every push-pull kernel: the engine, the
/// host allocator, the per-name registration guard and the op registry.
pub struct Runtime {
    engine:     Arc<dyn CommEngine>,
    allocator:  Arc<MemoryManager>,
    init_guard: TensorInitGuard,
    registry:   OpRegistry,
}

impl Runtime {
    pub fn new(engine: Arc<dyn CommEngine>, allocator: Arc<MemoryManager>) -> Arc<Self> {
        let mut registry = OpRegistry::new();
        registry.collect_inventory();
        Arc::new(Self {
            engine,
            allocator,
            init_guard: TensorInitGuard::new(),
            registry,
        })
    }

    pub fn engine(&self) -> &Arc<dyn CommEngine> {
        &self.engine
    }

    pub fn allocator(&self) -> &Arc<MemoryManager> {
        &self.allocator
    }

    pub fn init_guard(&self) -> &TensorInitGuard {
        &self.init_guard
    }

    pub fn registry(&self) -> &OpRegistry {
        &self.registry
    }

    /// Validate and build a kernel for node `node_name` of op `op`.
    pub fn kernel(
        self: &Arc<Self>,
        op: &str,
        node_name: &str,
        input_dtypes: &[FrameworkDType],
        device_type: DeviceType,
    ) -> Result<Box<dyn AsyncOpKernel>, OpError> {
        self.registry
            .instantiate(op, node_name, input_dtypes, device_type, Arc::clone(self))
    }
}
