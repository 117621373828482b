use std::sync::Arc;

use tensor::{FrameworkDType, Tensor};
use tokio::sync::oneshot;

use crate::builtin::PushPullOp;
use crate::kernel::{Device, OpKernelContext};
use crate::runtime::Runtime;
use crate::status::{errors, Status};
use crate::types::{OpError, RegistrationInfo};

/// One push-pull invocation.
pub struct PushPullArgs {
    /// Identifies the tensor to the engine across calls
    pub name:     String,
    pub tensor:   Tensor,
    pub version:  i32,
    pub priority: i32,
    pub device:   Device,
}

#[derive(Debug)]
pub struct PushPullOutcome {
    pub status: Status,
    /// Set once the output was allocated, even if the push-pull later failed
    pub output: Option<Tensor>,
}

/// Result of a launched push-pull, delivered exactly once.
pub struct PendingPushPull {
    rx: oneshot::Receiver<PushPullOutcome>,
}

impl PendingPushPull {
    fn dropped() -> PushPullOutcome {
        PushPullOutcome {
            status: errors::internal("push-pull completion was dropped"),
            output: None,
        }
    }

    /// Block the current thread until the outcome arrives.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> PushPullOutcome {
        self.rx.blocking_recv().unwrap_or_else(|_| Self::dropped())
    }

    pub async fn outcome(self) -> PushPullOutcome {
        self.rx.await.unwrap_or_else(|_| Self::dropped())
    }

    /// Non-blocking probe; hands the pending result back if not done.
    pub fn try_outcome(mut self) -> Result<PushPullOutcome, Self> {
        match self.rx.try_recv() {
            Ok(outcome) => Ok(outcome),
            Err(oneshot::error::TryRecvError::Empty) => Err(self),
            Err(oneshot::error::TryRecvError::Closed) => Ok(Self::dropped()),
        }
    }
}

/// Launch a push-pull of `args.tensor` without blocking on the engine.
///
/// Type and device errors are returned here, before the engine sees
/// anything. Every other failure arrives through the pending result.
pub fn push_pull(runtime: &Arc<Runtime>, args: PushPullArgs) -> Result<PendingPushPull, OpError> {
    let kernel = runtime.kernel(
        PushPullOp::NAME,
        &args.name,
        &[args.tensor.dtype(), FrameworkDType::Int32, FrameworkDType::Int32],
        args.device.device_type(),
    )?;

    let allocator = runtime.allocator();
    let version = Tensor::scalar(allocator, args.version)?;
    let priority = Tensor::scalar(allocator, args.priority)?;
    let ctx = Arc::new(OpKernelContext::new(
        vec![args.tensor, version, priority],
        args.device,
        Arc::clone(allocator),
        1,
    ));

    let (tx, rx) = oneshot::channel();
    let result_ctx = Arc::clone(&ctx);
    kernel.compute_async(
        ctx,
        Box::new(move || {
            // receiver may be gone; nothing left to notify then
            let _ = tx.send(PushPullOutcome {
                status: result_ctx.status(),
                output: result_ctx.output(0),
            });
        }),
    );
    Ok(PendingPushPull { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Code;
    use crate::testing::RecordingEngine;
    use core_types::Status as EngineStatus;
    use memory::MemoryManager;
    use pollster::block_on;

    #[test]
    fn outcome_is_awaitable() {
        let engine = Arc::new(RecordingEngine::new());
        let runtime = Runtime::new(engine.clone(), Arc::new(MemoryManager::new()));
        let tensor = Tensor::from_vec(runtime.allocator(), &[1i64, 2, 3], &[3]).unwrap();
        let args = PushPullArgs { name: "ids".into(), tensor, version: 1, priority: 0, device: Device::Cpu };

        let pending = push_pull(&runtime, args).unwrap();
        let pending = match pending.try_outcome() {
            Ok(outcome) => panic!("completed before the engine ran: {}", outcome.status),
            Err(pending) => pending,
        };
        engine.complete_all(EngineStatus::aborted("engine shut down"));

        let outcome = block_on(pending.outcome());
        assert_eq!(outcome.status.code(), Code::Aborted);
        assert_eq!(outcome.output.unwrap().shape(), &[3]);
    }
}
