use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::kernel::{DoneCallback, OpKernelContext};
use crate::status::Status;

/// Single-fire hand-off of a kernel's terminal status.
///
/// Whoever fires first (the engine callback or a synchronous failure path)
/// records the status on the context and runs `done`; later fires are
/// ignored.
pub struct Completion {
    tensor: String,
    ctx:    Arc<OpKernelContext>,
    done:   Mutex<Option<DoneCallback>>,
}

impl Completion {
    pub fn new(tensor: &str, ctx: Arc<OpKernelContext>, done: DoneCallback) -> Arc<Self> {
        Arc::new(Self {
            tensor: tensor.to_string(),
            ctx,
            done: Mutex::new(Some(done)),
        })
    }

    /// Returns false when the completion had already fired.
    pub fn fire(&self, status: Status) -> bool {
        let Some(done) = self.done.lock().take() else {
            warn!(tensor = %self.tensor, %status, "ignoring duplicate completion");
            return false;
        };
        debug!(tensor = %self.tensor, %status, "push-pull complete");
        self.ctx.set_status(status);
        done();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Device;
    use crate::status::{errors, Code};
    use memory::MemoryManager;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn context() -> Arc<OpKernelContext> {
        Arc::new(OpKernelContext::new(vec![], Device::Cpu, Arc::new(MemoryManager::new()), 0))
    }

    #[test]
    fn first_status_wins() {
        let ctx = context();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let completion = Completion::new("g", Arc::clone(&ctx), Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(completion.fire(errors::aborted("engine stopped")));
        assert!(!completion.fire(Status::ok()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.status().code(), Code::Aborted);
    }

    #[test]
    fn racing_fires_run_done_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let completion = Completion::new("g", context(), Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let n = 8;
        let barrier = Arc::new(Barrier::new(n));
        let handles: Vec<_> = (0..n)
            .map(|_| {
                let completion = Arc::clone(&completion);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    completion.fire(Status::ok())
                })
            })
            .collect();
        let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count();

        assert_eq!(winners, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
