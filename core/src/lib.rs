pub mod ready;

use anyhow::Result;
use std::sync::Arc;
use wgpu::{Device, Instance, PollType, Queue};

use core_types::{AlwaysReady, ReadyEvent};
use ready::GpuReadyEvent;

/// Context for GPU operations: one device and the queue every producer
/// submits to.
#[derive(Clone)]
pub struct GpuContext {
    pub device: Arc<Device>,
    pub queue:  Arc<Queue>,
}

impl GpuContext {
    /* ------------------------------------------------------------------ */
    /* Construction                                                       */
    /* ------------------------------------------------------------------ */
    pub async fn new() -> Result<Self> {
        let instance = Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .map_err(|e| anyhow::anyhow!("No suitable adapter found: {}", e))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /* ------------------------------------------------------------------ */
    /* Markers                                                            */
    /* ------------------------------------------------------------------ */

    /// Record a marker behind all work submitted to the queue so far.
    pub fn record_ready_event(&self) -> GpuReadyEvent {
        GpuReadyEvent::record(self)
    }

    /// Non-blocking poll, lets queued callbacks fire.
    pub(crate) fn poll(&self) {
        if let Err(e) = self.device.poll(PollType::Poll) {
            tracing::warn!(error = %e, "device poll failed");
        }
    }
}

/// Readiness signal for the buffers of one operation.
///
/// With a device context this is a marker on that context's queue; without
/// one there is nothing to wait for.
pub fn record_ready_event(device_context: Option<&GpuContext>) -> Arc<dyn ReadyEvent> {
    match device_context {
        Some(ctx) => Arc::new(ctx.record_ready_event()),
        None => AlwaysReady::shared(),
    }
}
