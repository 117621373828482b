//! Recording `CommEngine` used by the kernel tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use core_types::{DataType, DeviceId, EngineTensor, ReadyEvent, Status};
use engine::{CommEngine, PushPullRequest, StatusCallback, TensorContext, TensorSpec};
use parking_lot::Mutex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    CheckInitialized,
    IsRegistered { name: String },
    GetContext { name: String },
    Register { name: String, device: DeviceId },
    Enqueue { name: String, device: DeviceId, priority: i32, version: i32 },
}

pub struct RecordingEngine {
    initialized:    AtomicBool,
    next_key:       AtomicU64,
    calls:          Mutex<Vec<Call>>,
    contexts:       Mutex<HashMap<String, Arc<TensorContext>>>,
    pending:        Mutex<Vec<(PushPullRequest, StatusCallback)>>,
    register_delay: Mutex<Duration>,
    register_error: Mutex<Option<Status>>,
    /// Status returned from enqueue, and whether the callback is kept anyway
    enqueue_error:  Mutex<Option<(Status, bool)>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(true),
            next_key: AtomicU64::new(0),
            calls: Mutex::new(Vec::new()),
            contexts: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            register_delay: Mutex::new(Duration::ZERO),
            register_error: Mutex::new(None),
            enqueue_error: Mutex::new(None),
        }
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::SeqCst);
    }

    pub fn set_register_delay(&self, delay: Duration) {
        *self.register_delay.lock() = delay;
    }

    pub fn fail_registration(&self, status: Status) {
        *self.register_error.lock() = Some(status);
    }

    /// Reject every enqueue with `status`; `keep_callback` simulates an
    /// engine that fires the callback even so.
    pub fn reject_enqueue(&self, status: Status, keep_callback: bool) {
        *self.enqueue_error.lock() = Some((status, keep_callback));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// Fire every held callback with `status`, copying input to output on ok.
    pub fn complete_all(&self, status: Status) {
        let pending = std::mem::take(&mut *self.pending.lock());
        for (request, callback) in pending {
            if status.is_ok() {
                let mut bytes = vec![0u8; request.input.size_in_bytes()];
                request.input.copy_to(&mut bytes);
                request.output.copy_from(&bytes);
            }
            callback(status.clone());
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

impl CommEngine for RecordingEngine {
    fn check_initialized(&self) -> Status {
        self.record(Call::CheckInitialized);
        if self.initialized.load(Ordering::SeqCst) {
            Status::ok()
        } else {
            Status::precondition_error("engine not initialized")
        }
    }

    fn is_tensor_registered(&self, name: &str, size: usize, device: DeviceId, dtype: DataType) -> bool {
        self.record(Call::IsRegistered { name: name.to_string() });
        self.contexts
            .lock()
            .get(name)
            .and_then(|ctx| ctx.spec())
            .is_some_and(|spec| spec == TensorSpec { size, device, dtype })
    }

    fn get_or_create_context(&self, name: &str) -> Arc<TensorContext> {
        self.record(Call::GetContext { name: name.to_string() });
        let mut contexts = self.contexts.lock();
        let ctx = contexts.entry(name.to_string()).or_insert_with(|| {
            Arc::new(TensorContext::new(name, self.next_key.fetch_add(1, Ordering::SeqCst)))
        });
        Arc::clone(ctx)
    }

    fn register_tensor(
        &self,
        context: &Arc<TensorContext>,
        input:   Arc<dyn EngineTensor>,
        ready:   Arc<dyn ReadyEvent>,
        name:    &str,
        device:  DeviceId,
    ) -> Status {
        self.record(Call::Register { name: name.to_string(), device });
        let delay = *self.register_delay.lock();
        std::thread::sleep(delay);
        if let Some(status) = self.register_error.lock().clone() {
            return status;
        }
        assert!(ready.ready());
        let spec = TensorSpec { size: input.size_in_bytes(), device, dtype: input.dtype() };
        match context.initialize(spec) {
            Ok(()) => Status::ok(),
            Err(existing) => Status::precondition_error(format!("{name} already holds {existing}")),
        }
    }

    fn enqueue_push_pull(&self, request: PushPullRequest, callback: StatusCallback) -> Status {
        self.record(Call::Enqueue {
            name: request.name.clone(),
            device: request.device,
            priority: request.priority,
            version: request.version,
        });
        let rejection = self.enqueue_error.lock().clone();
        match rejection {
            Some((status, keep_callback)) => {
                if keep_callback {
                    self.pending.lock().push((request, callback));
                }
                status
            }
            None => {
                self.pending.lock().push((request, callback));
                Status::ok()
            }
        }
    }
}
