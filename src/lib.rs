//! Asynchronous push-pull (all-reduce) for framework tensors.
//!
//! A [`push_pull`] call hands a tensor to a [`CommEngine`], registering the
//! tensor the first time its name is seen, and resolves to the summed
//! result once every participant has contributed.
//!
//! ```no_run
//! use std::sync::Arc;
//! use pushpull::{push_pull, Device, EngineConfig, LoopbackEngine, MemoryManager, PushPullArgs, Runtime, Tensor};
//!
//! let engine = Arc::new(LoopbackEngine::new(EngineConfig::default())?);
//! engine.init()?;
//! let runtime = Runtime::new(engine, Arc::new(MemoryManager::new()));
//!
//! let tensor = Tensor::from_vec(runtime.allocator(), &[1.0f32, 2.0], &[2])?;
//! let args = PushPullArgs { name: "grad".into(), tensor, version: 0, priority: 0, device: Device::Cpu };
//! let outcome = push_pull(&runtime, args)?.wait();
//! assert!(outcome.status.is_ok());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod logging;

pub use core_types::{DataType, DeviceId, EngineTensor, ReadyEvent, StatusType, CPU_DEVICE_ID};
pub use engine::{CommEngine, ConfigError, EngineConfig, EngineError, EngineStats, LoopbackEngine};
pub use memory::{AllocError, MemoryManager};
pub use pushpull_core::{record_ready_event, GpuContext};
pub use pushpull_ops::{
    push_pull, Code, Device, GpuDevice, OpError, OpRegistry, PendingPushPull, PushPullArgs,
    PushPullOutcome, Runtime, Status,
};
pub use tensor::{FrameworkDType, Tensor, TensorAdapter, TensorError};

/// Engine-side status, as opposed to the framework [`Status`]
pub type EngineStatus = core_types::Status;
