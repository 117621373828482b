use std::sync::Arc;

use core_types::EngineTensor;
use engine::PushPullRequest;
use tensor::{FrameworkDType, Tensor, TensorAdapter};
use tracing::{debug, info};

use crate::completion::Completion;
use crate::kernel::{AsyncOpKernel, DoneCallback, OpKernelContext};
use crate::op::{KernelConstruction, Op};
use crate::register_op;
use crate::runtime::Runtime;
use crate::status::{errors, Status};
use crate::types::{ArgDef, DeviceType, OpSignature, RegistrationInfo, TypeAttr};

/// Element types with an engine counterpart
const SUPPORTED: [FrameworkDType; 9] = [
    FrameworkDType::UInt8,
    FrameworkDType::Int8,
    FrameworkDType::UInt16,
    FrameworkDType::Int16,
    FrameworkDType::Int32,
    FrameworkDType::Int64,
    FrameworkDType::Half,
    FrameworkDType::Float,
    FrameworkDType::Double,
];

/// "PushPull": tensor, int32 version, int32 priority → summed tensor
pub struct PushPullOp {
    sig: OpSignature,
}

impl PushPullOp {
    pub fn new() -> Self {
        Self {
            sig: OpSignature {
                name:      Self::NAME,
                type_attr: TypeAttr { name: "T", allowed: SUPPORTED.to_vec() },
                inputs:    vec![
                    ArgDef::attr("tensor", "T"),
                    ArgDef::fixed("version", FrameworkDType::Int32),
                    ArgDef::fixed("priority", FrameworkDType::Int32),
                ],
                outputs:   vec![ArgDef::attr("sum", "T")],
                devices:   vec![DeviceType::Cpu, DeviceType::Gpu],
                shape_fn:  |inputs| inputs.first().map(|s| vec![s.to_vec()]).unwrap_or_default(),
                doc:       "Sum a tensor over every participant of the communication engine.\n\n\
                            The node name identifies the tensor to the engine. `version` and \
                            `priority` are passed through as ordering hints. The output has the \
                            shape and type of `tensor`.",
            },
        }
    }
}

impl Default for PushPullOp {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationInfo for PushPullOp {
    const NAME: &'static str = "PushPull";
}

impl Op for PushPullOp {
    fn signature(&self) -> &OpSignature { &self.sig }

    fn create_kernel(&self, construction: KernelConstruction) -> Box<dyn AsyncOpKernel> {
        Box::new(PushPullKernel {
            node_name:   construction.node_name,
            dtype:       construction.dtype,
            device_type: construction.device_type,
            runtime:     construction.runtime,
        })
    }
}

register_op!(PushPullOp);

pub struct PushPullKernel {
    node_name:   String,
    /// Element type the kernel was built for
    dtype:       FrameworkDType,
    device_type: DeviceType,
    runtime:     Arc<Runtime>,
}

impl PushPullKernel {
    /// The invocation must match what the kernel was instantiated with.
    fn check_invocation(&self, ctx: &OpKernelContext) -> Result<(), Status> {
        if ctx.num_inputs() != 3 {
            return Err(errors::invalid_argument(format!(
                "{} expects 3 inputs, got {}",
                self.node_name,
                ctx.num_inputs()
            )));
        }
        let found = ctx.input(0).dtype();
        if found != self.dtype {
            return Err(errors::invalid_argument(format!(
                "{} was built for {}, got a {found} tensor",
                self.node_name, self.dtype
            )));
        }
        let device_type = ctx.device().device_type();
        if device_type != self.device_type {
            return Err(errors::invalid_argument(format!(
                "{} was built for {}, invoked on {device_type}",
                self.node_name, self.device_type
            )));
        }
        Ok(())
    }
}

/// First element of an int32 input.
fn read_scalar(tensor: &Tensor, what: &str) -> Result<i32, Status> {
    let values = tensor
        .to_vec::<i32>()
        .map_err(|e| errors::invalid_argument(format!("{what}: {e}")))?;
    values
        .first()
        .copied()
        .ok_or_else(|| errors::invalid_argument(format!("{what} must hold at least one element")))
}

impl AsyncOpKernel for PushPullKernel {
    fn name(&self) -> &str {
        &self.node_name
    }

    fn compute_async(&self, ctx: Arc<OpKernelContext>, done: DoneCallback) {
        let name = self.node_name.as_str();
        let completion = Completion::new(name, Arc::clone(&ctx), done);
        let engine = self.runtime.engine();

        if let Err(status) = self.check_invocation(&ctx) {
            completion.fire(status);
            return;
        }

        let status = engine.check_initialized();
        if !status.is_ok() {
            completion.fire(Status::from(&status));
            return;
        }

        let device = ctx.device().id();
        let input = ctx.input(0).clone();
        let (version, priority) = match read_scalar(ctx.input(1), "version")
            .and_then(|v| Ok((v, read_scalar(ctx.input(2), "priority")?)))
        {
            Ok(pair) => pair,
            Err(status) => {
                completion.fire(status);
                return;
            }
        };

        let output = match ctx.allocate_output(0, input.shape(), input.dtype()) {
            Ok(output) => output,
            Err(status) => {
                completion.fire(status);
                return;
            }
        };

        // recorded after the output exists so readiness covers both buffers
        let ready = pushpull_core::record_ready_event(ctx.device().device_context());
        let input: Arc<dyn EngineTensor> = Arc::new(TensorAdapter::new(&input));
        let output: Arc<dyn EngineTensor> = Arc::new(TensorAdapter::new(&output));
        let (size, dtype) = (input.size_in_bytes(), input.dtype());

        let registered = self.runtime.init_guard().ensure_registered(
            name,
            || engine.is_tensor_registered(name, size, device, dtype),
            || {
                let context = engine.get_or_create_context(name);
                engine.register_tensor(&context, Arc::clone(&input), Arc::clone(&ready), name, device)
            },
        );
        match registered {
            Ok(true) => info!(tensor = %name, size, device, ?dtype, "tensor registered"),
            Ok(false) => {}
            Err(status) => {
                completion.fire(Status::from(&status));
                return;
            }
        }

        let request = PushPullRequest {
            context: engine.get_or_create_context(name),
            input,
            output,
            ready,
            name: name.to_string(),
            device,
            priority,
            version,
        };
        let on_done = Arc::clone(&completion);
        let status = engine.enqueue_push_pull(
            request,
            Box::new(move |status| {
                on_done.fire(Status::from(&status));
            }),
        );
        if status.is_ok() {
            debug!(tensor = %name, device, priority, version, "push-pull enqueued");
        } else {
            completion.fire(Status::from(&status));
        }
    }
}
