use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use core_types::ReadyEvent;

use crate::GpuContext;

/// One-way flag: starts unset, can only ever become set.
#[derive(Debug, Default)]
pub struct Latch {
    set: AtomicBool,
}

impl Latch {
    pub fn set(&self) {
        self.set.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }
}

/// Marker queued behind the work that produced a tensor.
///
/// Recorded after the output buffer was allocated, so `ready()` implies
/// both "input contents settled" and "output buffer exists".
pub struct GpuReadyEvent {
    ctx:   GpuContext,
    latch: Arc<Latch>,
}

impl GpuReadyEvent {
    pub(crate) fn record(ctx: &GpuContext) -> Self {
        let latch = Arc::new(Latch::default());
        let signal = Arc::clone(&latch);
        ctx.queue.on_submitted_work_done(move || signal.set());
        Self { ctx: ctx.clone(), latch }
    }
}

impl ReadyEvent for GpuReadyEvent {
    fn ready(&self) -> bool {
        if self.latch.is_set() {
            return true;
        }
        self.ctx.poll();
        self.latch.is_set()
    }
}
