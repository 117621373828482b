pub mod bridge;
pub mod builtin;
pub mod completion;
pub mod init_guard;
pub mod kernel;
pub mod launch;
pub mod op;
pub mod runtime;
pub mod status;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::sync::Arc;

use tensor::FrameworkDType;

pub use kernel::{AsyncOpKernel, Device, DoneCallback, GpuDevice, OpKernelContext};
pub use launch::{push_pull, PendingPushPull, PushPullArgs, PushPullOutcome};
pub use op::{KernelConstruction, Op, OpFactory};
pub use runtime::Runtime;
pub use status::{Code, Status};
pub use types::{ArgDef, DeviceType, OpError, OpSignature, RegistrationInfo, TypeAttr, TypeConstraint};

#[doc(hidden)]
pub use inventory;

/// Register an operation with the inventory system
#[macro_export]
macro_rules! register_op {
    ($op_type:ident) => {
        $crate::inventory::submit! {
            $crate::OpFactory {
                name: <$op_type as $crate::RegistrationInfo>::NAME,
                factory: || Box::new($op_type::new()),
            }
        }
    };
}

/// Holds all registered ops, validates signature & dtypes, then builds kernels
#[derive(Default)]
pub struct OpRegistry {
    map: HashMap<&'static str, Box<dyn Op>>,
}

impl OpRegistry {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    pub fn collect_inventory(&mut self) {
        for factory in inventory::iter::<OpFactory> {
            let op = (factory.factory)();
            self.register_boxed(factory.name, op);
        }
    }

    /// Register a boxed Op with an explicit name
    pub fn register_boxed(&mut self, name: &'static str, op: Box<dyn Op>) {
        self.map.insert(name, op);
    }

    fn lookup(&self, name: &str) -> Result<&dyn Op, OpError> {
        self.get(name).ok_or_else(|| OpError::UnknownOp(name.to_string()))
    }

    /// Lookup + validate arity, dtypes and device, then build the kernel.
    ///
    /// Nothing reaches the engine when validation fails.
    pub fn instantiate(
        &self,
        name:         &str,
        node_name:    &str,
        input_dtypes: &[FrameworkDType],
        device_type:  DeviceType,
        runtime:      Arc<Runtime>,
    ) -> Result<Box<dyn AsyncOpKernel>, OpError> {
        let op = self.lookup(name)?;
        let sig = op.signature();

        if input_dtypes.len() != sig.inputs.len() {
            return Err(OpError::ArityMismatch {
                op: name.to_string(),
                expected: sig.inputs.len(),
                found: input_dtypes.len(),
            });
        }

        // the first attr-typed input binds the attribute, later ones must agree
        let mut resolved: Option<FrameworkDType> = None;
        for (index, (arg, &found)) in sig.inputs.iter().zip(input_dtypes).enumerate() {
            let expected = match (&arg.ty, resolved) {
                (TypeConstraint::Fixed(dt), _) => vec![*dt],
                (TypeConstraint::Attr(_), Some(dt)) => vec![dt],
                (TypeConstraint::Attr(_), None) => sig.type_attr.allowed.clone(),
            };
            if !expected.contains(&found) {
                return Err(OpError::DtypeMismatch { op: name.to_string(), index, expected, found });
            }
            if matches!(arg.ty, TypeConstraint::Attr(_)) {
                resolved = Some(found);
            }
        }

        let dtype = resolved.ok_or_else(|| OpError::UnboundTypeAttr {
            op: name.to_string(),
            attr: sig.type_attr.name,
        })?;

        if !sig.devices.contains(&device_type) {
            return Err(OpError::UnsupportedDevice { op: name.to_string(), device: device_type });
        }

        Ok(op.create_kernel(KernelConstruction {
            node_name: node_name.to_string(),
            dtype,
            device_type,
            runtime,
        }))
    }

    /// Output shapes of op `name` for the given input shapes
    pub fn infer_shapes(&self, name: &str, input_shapes: &[&[usize]]) -> Result<Vec<Vec<usize>>, OpError> {
        let sig = self.lookup(name)?.signature();
        if input_shapes.len() != sig.inputs.len() {
            return Err(OpError::ArityMismatch {
                op: name.to_string(),
                expected: sig.inputs.len(),
                found: input_shapes.len(),
            });
        }
        Ok((sig.shape_fn)(input_shapes))
    }

    /// lookup sans validation
    pub fn get(&self, name: &str) -> Option<&dyn Op> {
        self.map.get(name).map(|b| b.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.map.keys().copied()
    }
}
