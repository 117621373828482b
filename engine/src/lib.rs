//! Communication engine contract and an in-process implementation.
//!
//! The push-pull kernel only talks to [`CommEngine`]. [`LoopbackEngine`]
//! implements it inside one process: every participant shares the same
//! engine, and a round completes once `world_size` contributions for the
//! same (name, version) have been summed.

mod config;
mod context;
mod loopback;
mod queue;
mod reduce;

use std::sync::Arc;

use core_types::{DataType, DeviceId, EngineTensor, ReadyEvent, Status};

pub use config::{ConfigError, EngineConfig};
pub use context::{TensorContext, TensorSpec};
pub use loopback::{EngineError, EngineStats, LoopbackEngine};
pub use reduce::sum_into;

/// Completion callback handed to the engine. Consumed on the single call.
pub type StatusCallback = Box<dyn FnOnce(Status) + Send + 'static>;

/// Everything the engine needs to run one push-pull.
pub struct PushPullRequest {
    pub context:  Arc<TensorContext>,
    pub input:    Arc<dyn EngineTensor>,
    pub output:   Arc<dyn EngineTensor>,
    pub ready:    Arc<dyn ReadyEvent>,
    pub name:     String,
    pub device:   DeviceId,
    pub priority: i32,
    pub version:  i32,
}

/// What the push-pull kernel consumes from a communication engine.
pub trait CommEngine: Send + Sync {
    /// Global readiness probe; non-ok until the engine was started.
    fn check_initialized(&self) -> Status;

    /// True when `name` already has a context matching all three attributes.
    fn is_tensor_registered(&self, name: &str, size: usize, device: DeviceId, dtype: DataType) -> bool;

    fn get_or_create_context(&self, name: &str) -> Arc<TensorContext>;

    /// Blocking, one-time registration of a tensor's layout.
    fn register_tensor(
        &self,
        context: &Arc<TensorContext>,
        input:   Arc<dyn EngineTensor>,
        ready:   Arc<dyn ReadyEvent>,
        name:    &str,
        device:  DeviceId,
    ) -> Status;

    /// Non-blocking submission. The returned status only says whether the
    /// request was accepted; when it is not ok `callback` is dropped unfired.
    fn enqueue_push_pull(&self, request: PushPullRequest, callback: StatusCallback) -> Status;
}
