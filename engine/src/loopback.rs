use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use core_types::{DataType, DeviceId, EngineTensor, ReadyEvent, Status};

use crate::config::{ConfigError, EngineConfig};
use crate::context::{TensorContext, TensorSpec};
use crate::queue::{Task, TaskQueue};
use crate::reduce::sum_into;
use crate::{CommEngine, PushPullRequest, StatusCallback};

const NOT_INITIALIZED: &str = "engine has not been initialized; call init() first";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to spawn engine worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Counters since construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub registered: u64,
    pub enqueued:   u64,
    pub completed:  u64,
    pub aborted:    u64,
}

#[derive(Default)]
struct Counters {
    registered: AtomicU64,
    enqueued:   AtomicU64,
    completed:  AtomicU64,
    aborted:    AtomicU64,
}

/// Contributions gathered so far for one (tensor, version).
#[derive(Default)]
struct Round {
    submitted:   usize,
    contributed: usize,
    accum:       Vec<u8>,
    waiters:     Vec<(Arc<dyn EngineTensor>, StatusCallback)>,
}

type RoundKey = (u64, i32);

struct Inner {
    config:      EngineConfig,
    initialized: AtomicBool,
    contexts:    DashMap<String, Arc<TensorContext>>,
    next_key:    AtomicU64,
    queue:       TaskQueue,
    rounds:      Mutex<HashMap<RoundKey, Round>>,
    counters:    Counters,
}

/// In-process communication engine.
///
/// Every participant of a push-pull shares the same engine; a round for
/// (name, version) is summed once `world_size` contributions arrived and the
/// result is written into every participant's output.
pub struct LoopbackEngine {
    inner:   Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl LoopbackEngine {
    /// Build a stopped engine; `check_initialized` fails until [`init`](Self::init).
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                initialized: AtomicBool::new(false),
                contexts: DashMap::new(),
                next_key: AtomicU64::new(0),
                queue: TaskQueue::new(),
                rounds: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Start the worker threads. Calling it on a running engine is a no-op.
    pub fn init(&self) -> Result<(), EngineError> {
        let mut workers = self.workers.lock();
        if self.inner.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        self.inner.queue.open();
        for i in 0..self.inner.config.worker_threads {
            let inner = Arc::clone(&self.inner);
            let spawned = std::thread::Builder::new()
                .name(format!("pushpull-worker-{i}"))
                .spawn(move || inner.worker_loop());
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    self.inner.queue.close();
                    for handle in workers.drain(..) {
                        let _ = handle.join();
                    }
                    return Err(e.into());
                }
            }
        }

        self.inner.initialized.store(true, Ordering::Release);
        info!(
            world_size = self.inner.config.world_size,
            workers = workers.len(),
            "loopback engine started"
        );
        Ok(())
    }

    /// Stop the workers and abort everything still pending.
    pub fn shutdown(&self) {
        let mut workers = self.workers.lock();
        if !self.inner.initialized.swap(false, Ordering::AcqRel) && workers.is_empty() {
            return;
        }

        let queued = self.inner.queue.close();
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                warn!("engine worker panicked");
            }
        }

        let mut aborted = 0usize;
        for task in queued {
            self.inner.abort(task.callback, &format!("engine shut down before {} ran", task.request.name));
            aborted += 1;
        }
        let rounds = std::mem::take(&mut *self.inner.rounds.lock());
        for (_, round) in rounds {
            for (_, callback) in round.waiters {
                self.inner.abort(callback, "engine shut down mid-round");
                aborted += 1;
            }
        }
        info!(aborted, "loopback engine stopped");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Tasks waiting for a worker
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.inner.counters;
        EngineStats {
            registered: c.registered.load(Ordering::Relaxed),
            enqueued: c.enqueued.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            aborted: c.aborted.load(Ordering::Relaxed),
        }
    }
}

impl Drop for LoopbackEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn is_running(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Poll until ready; false if the engine stopped first.
    fn wait_ready(&self, ready: &dyn ReadyEvent) -> bool {
        loop {
            if ready.ready() {
                return true;
            }
            if !self.is_running() {
                return false;
            }
            std::thread::sleep(self.config.ready_poll_interval());
        }
    }

    fn abort(&self, callback: StatusCallback, reason: &str) {
        self.counters.aborted.fetch_add(1, Ordering::Relaxed);
        callback(Status::aborted(reason));
    }

    fn worker_loop(&self) {
        while let Some(task) = self.queue.pop() {
            self.process(task);
        }
    }

    fn process(&self, task: Task) {
        let Task { request, callback, .. } = task;
        if !self.wait_ready(request.ready.as_ref()) {
            self.release_slot((request.context.key(), request.version));
            self.abort(callback, &format!("engine shut down before {} was ready", request.name));
            return;
        }

        let mut contribution = vec![0u8; request.input.size_in_bytes()];
        request.input.copy_to(&mut contribution);
        let dtype = request.input.dtype();
        let key = (request.context.key(), request.version);

        let finished = {
            let mut rounds = self.rounds.lock();
            let round = rounds.entry(key).or_default();
            if round.contributed == 0 {
                round.accum = contribution;
            } else {
                sum_into(dtype, &mut round.accum, &contribution);
            }
            round.contributed += 1;
            round.waiters.push((request.output, callback));
            let done = round.contributed == self.config.world_size;
            if done { rounds.remove(&key) } else { None }
        };

        match finished {
            Some(round) => {
                debug!(
                    tensor = %request.name,
                    version = request.version,
                    participants = round.waiters.len(),
                    "push-pull round complete"
                );
                for (output, callback) in round.waiters {
                    output.copy_from(&round.accum);
                    self.counters.completed.fetch_add(1, Ordering::Relaxed);
                    callback(Status::ok());
                }
            }
            None => debug!(
                tensor = %request.name,
                version = request.version,
                "waiting for remaining participants"
            ),
        }
    }

    /// Claim a participant slot in the round, refusing over-subscription.
    fn reserve_slot(&self, key: RoundKey) -> bool {
        let mut rounds = self.rounds.lock();
        let round = rounds.entry(key).or_default();
        if round.submitted >= self.config.world_size {
            return false;
        }
        round.submitted += 1;
        true
    }

    fn release_slot(&self, key: RoundKey) {
        let mut rounds = self.rounds.lock();
        if let Some(round) = rounds.get_mut(&key) {
            round.submitted = round.submitted.saturating_sub(1);
            if round.submitted == 0 && round.waiters.is_empty() {
                rounds.remove(&key);
            }
        }
    }
}

impl CommEngine for LoopbackEngine {
    fn check_initialized(&self) -> Status {
        if self.inner.is_running() {
            Status::ok()
        } else {
            Status::precondition_error(NOT_INITIALIZED)
        }
    }

    fn is_tensor_registered(&self, name: &str, size: usize, device: DeviceId, dtype: DataType) -> bool {
        self.inner
            .contexts
            .get(name)
            .and_then(|ctx| ctx.spec())
            .is_some_and(|spec| spec == TensorSpec { size, device, dtype })
    }

    fn get_or_create_context(&self, name: &str) -> Arc<TensorContext> {
        if let Some(ctx) = self.inner.contexts.get(name) {
            return Arc::clone(ctx.value());
        }
        let entry = self.inner.contexts.entry(name.to_string()).or_insert_with(|| {
            let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
            Arc::new(TensorContext::new(name, key))
        });
        Arc::clone(entry.value())
    }

    fn register_tensor(
        &self,
        context: &Arc<TensorContext>,
        input:   Arc<dyn EngineTensor>,
        ready:   Arc<dyn ReadyEvent>,
        name:    &str,
        device:  DeviceId,
    ) -> Status {
        if !self.inner.is_running() {
            return Status::precondition_error(NOT_INITIALIZED);
        }
        if context.name() != name {
            return Status::invalid_argument(format!(
                "context {} cannot register tensor {name}",
                context.name()
            ));
        }

        let spec = TensorSpec { size: input.size_in_bytes(), device, dtype: input.dtype() };
        // The layout is only trusted once the producer finished writing it
        if !self.inner.wait_ready(ready.as_ref()) {
            return Status::aborted(format!("engine shut down while registering {name}"));
        }

        match context.initialize(spec) {
            Ok(()) => {
                self.inner.counters.registered.fetch_add(1, Ordering::Relaxed);
                info!(tensor = %name, key = context.key(), %spec, "tensor registered");
                Status::ok()
            }
            Err(existing) => Status::precondition_error(format!(
                "tensor {name} is registered as {existing}, got {spec}"
            )),
        }
    }

    fn enqueue_push_pull(&self, request: PushPullRequest, callback: StatusCallback) -> Status {
        if !self.inner.is_running() {
            return Status::precondition_error(NOT_INITIALIZED);
        }
        let name = request.name.clone();
        let Some(spec) = request.context.spec() else {
            return Status::precondition_error(format!("tensor {name} was not registered"));
        };

        let given = TensorSpec {
            size: request.input.size_in_bytes(),
            device: request.device,
            dtype: request.input.dtype(),
        };
        if given != spec {
            return Status::precondition_error(format!(
                "tensor {name} is registered as {spec}, got {given}"
            ));
        }
        if request.output.size_in_bytes() != spec.size {
            return Status::invalid_argument(format!(
                "output of {name} holds {} bytes, expected {}",
                request.output.size_in_bytes(),
                spec.size
            ));
        }

        let key = (request.context.key(), request.version);
        if !self.inner.reserve_slot(key) {
            return Status::invalid_argument(format!(
                "duplicate push-pull of {name} for version {}",
                request.version
            ));
        }

        let (priority, version) = (request.priority, request.version);
        if self.inner.queue.push(request, callback).is_err() {
            self.inner.release_slot(key);
            return Status::aborted(format!("engine is shutting down, {name} not queued"));
        }

        self.inner.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        debug!(tensor = %name, priority, version, "push-pull enqueued");
        Status::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{AlwaysReady, StatusType};
    use memory::MemoryManager;
    use std::sync::mpsc;
    use std::time::Duration;
    use tensor::{FrameworkDType, Tensor, TensorAdapter};

    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Readiness the test opens by hand.
    #[derive(Default)]
    struct Gate(AtomicBool);

    impl Gate {
        fn open(&self) {
            self.0.store(true, Ordering::Release);
        }
    }

    impl ReadyEvent for Gate {
        fn ready(&self) -> bool {
            self.0.load(Ordering::Acquire)
        }
    }

    fn engine(world_size: usize, worker_threads: usize) -> LoopbackEngine {
        let engine = LoopbackEngine::new(EngineConfig {
            world_size,
            worker_threads,
            ready_poll_interval_us: 10,
        })
        .unwrap();
        engine.init().unwrap();
        engine
    }

    fn view(t: &Tensor) -> Arc<dyn EngineTensor> {
        Arc::new(TensorAdapter::new(t))
    }

    fn register(engine: &LoopbackEngine, name: &str, input: &Tensor) -> Arc<TensorContext> {
        let ctx = engine.get_or_create_context(name);
        let status = engine.register_tensor(&ctx, view(input), AlwaysReady::shared(), name, -1);
        assert!(status.is_ok(), "{status}");
        ctx
    }

    fn request(
        ctx: &Arc<TensorContext>,
        input: &Tensor,
        output: &Tensor,
        ready: Arc<dyn ReadyEvent>,
        priority: i32,
        version: i32,
    ) -> PushPullRequest {
        PushPullRequest {
            context: Arc::clone(ctx),
            input: view(input),
            output: view(output),
            ready,
            name: ctx.name().to_string(),
            device: -1,
            priority,
            version,
        }
    }

    fn reply_to(tx: &mpsc::Sender<Status>) -> StatusCallback {
        let tx = tx.clone();
        Box::new(move |status| {
            let _ = tx.send(status);
        })
    }

    #[test]
    fn stopped_engine_refuses_everything() {
        let mm = MemoryManager::new();
        let engine = LoopbackEngine::new(EngineConfig::default()).unwrap();
        assert_eq!(engine.check_initialized().kind(), StatusType::PreconditionError);

        let input = Tensor::from_vec(&mm, &[1.0f32; 4], &[4]).unwrap();
        let ctx = engine.get_or_create_context("w");
        let status = engine.register_tensor(&ctx, view(&input), AlwaysReady::shared(), "w", -1);
        assert_eq!(status.kind(), StatusType::PreconditionError);

        let (tx, rx) = mpsc::channel();
        let status = engine.enqueue_push_pull(
            request(&ctx, &input, &input, AlwaysReady::shared(), 0, 0),
            reply_to(&tx),
        );
        assert_eq!(status.kind(), StatusType::PreconditionError);
        drop(tx);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err(), "callback must not fire");
    }

    #[test]
    fn registration_is_checked_against_layout() {
        let mm = MemoryManager::new();
        let engine = engine(1, 1);
        let input = Tensor::from_vec(&mm, &[0.0f32; 16], &[4, 4]).unwrap();

        assert!(!engine.is_tensor_registered("grad1", 64, -1, DataType::Float32));
        let ctx = register(&engine, "grad1", &input);
        assert!(engine.is_tensor_registered("grad1", 64, -1, DataType::Float32));
        assert!(!engine.is_tensor_registered("grad1", 32, -1, DataType::Float32));
        assert!(!engine.is_tensor_registered("grad1", 64, 0, DataType::Float32));
        assert!(Arc::ptr_eq(&ctx, &engine.get_or_create_context("grad1")));

        let smaller = Tensor::from_vec(&mm, &[0.0f32; 4], &[2, 2]).unwrap();
        let status = engine.register_tensor(&ctx, view(&smaller), AlwaysReady::shared(), "grad1", -1);
        assert_eq!(status.kind(), StatusType::PreconditionError);
        assert!(status.reason().contains("grad1"));
    }

    #[test]
    fn single_participant_copies_input_to_output() {
        let mm = MemoryManager::new();
        let engine = engine(1, 2);
        let input = Tensor::from_vec(&mm, &[1i32, 2, 3, 4], &[2, 2]).unwrap();
        let output = Tensor::empty(&mm, FrameworkDType::Int32, &[2, 2]).unwrap();
        let ctx = register(&engine, "grad", &input);

        let (tx, rx) = mpsc::channel();
        let status = engine.enqueue_push_pull(
            request(&ctx, &input, &output, AlwaysReady::shared(), 0, 1),
            reply_to(&tx),
        );
        assert!(status.is_ok());
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Status::ok());
        assert_eq!(output.to_vec::<i32>().unwrap(), vec![1, 2, 3, 4]);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err(), "exactly one completion");
        assert_eq!(engine.stats().completed, 1);
    }

    #[test]
    fn participants_receive_the_sum() {
        let mm = MemoryManager::new();
        let engine = engine(2, 2);
        let a = Tensor::from_vec(&mm, &[1.0f64, 2.0], &[2]).unwrap();
        let b = Tensor::from_vec(&mm, &[10.0f64, 20.0], &[2]).unwrap();
        let out_a = Tensor::empty(&mm, FrameworkDType::Double, &[2]).unwrap();
        let out_b = Tensor::empty(&mm, FrameworkDType::Double, &[2]).unwrap();
        let ctx = register(&engine, "layer0", &a);

        let (tx, rx) = mpsc::channel();
        let first = engine.enqueue_push_pull(request(&ctx, &a, &out_a, AlwaysReady::shared(), 0, 7), reply_to(&tx));
        let second = engine.enqueue_push_pull(request(&ctx, &b, &out_b, AlwaysReady::shared(), 0, 7), reply_to(&tx));
        assert!(first.is_ok() && second.is_ok());

        for _ in 0..2 {
            assert!(rx.recv_timeout(TIMEOUT).unwrap().is_ok());
        }
        assert_eq!(out_a.to_vec::<f64>().unwrap(), vec![11.0, 22.0]);
        assert_eq!(out_b.to_vec::<f64>().unwrap(), vec![11.0, 22.0]);
    }

    #[test]
    fn oversubscribed_round_is_rejected_synchronously() {
        let mm = MemoryManager::new();
        let engine = engine(2, 2);
        let input = Tensor::from_vec(&mm, &[1u8, 1], &[2]).unwrap();
        let outputs: Vec<Tensor> = (0..3)
            .map(|_| Tensor::empty(&mm, FrameworkDType::UInt8, &[2]).unwrap())
            .collect();
        let ctx = register(&engine, "mask", &input);
        let gate = Arc::new(Gate::default());

        let (tx, rx) = mpsc::channel();
        let statuses: Vec<Status> = outputs
            .iter()
            .map(|out| engine.enqueue_push_pull(request(&ctx, &input, out, gate.clone(), 0, 3), reply_to(&tx)))
            .collect();
        assert!(statuses[0].is_ok() && statuses[1].is_ok());
        assert_eq!(statuses[2].kind(), StatusType::InvalidArgument);

        gate.open();
        for _ in 0..2 {
            assert!(rx.recv_timeout(TIMEOUT).unwrap().is_ok());
        }
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(outputs[0].to_vec::<u8>().unwrap(), vec![2, 2]);
        assert_eq!(outputs[2].to_vec::<u8>().unwrap(), vec![0, 0]);
    }

    #[test]
    fn mismatched_output_is_invalid_argument() {
        let mm = MemoryManager::new();
        let engine = engine(1, 1);
        let input = Tensor::from_vec(&mm, &[1i64, 2], &[2]).unwrap();
        let output = Tensor::empty(&mm, FrameworkDType::Int64, &[3]).unwrap();
        let ctx = register(&engine, "bias", &input);

        let (tx, _rx) = mpsc::channel();
        let status = engine.enqueue_push_pull(
            request(&ctx, &input, &output, AlwaysReady::shared(), 0, 0),
            reply_to(&tx),
        );
        assert_eq!(status.kind(), StatusType::InvalidArgument);
    }

    #[test]
    fn unregistered_context_is_a_precondition_error() {
        let mm = MemoryManager::new();
        let engine = engine(1, 1);
        let input = Tensor::from_vec(&mm, &[1i64, 2], &[2]).unwrap();
        let ctx = engine.get_or_create_context("never-registered");

        let (tx, _rx) = mpsc::channel();
        let status = engine.enqueue_push_pull(
            request(&ctx, &input, &input, AlwaysReady::shared(), 0, 0),
            reply_to(&tx),
        );
        assert_eq!(status.kind(), StatusType::PreconditionError);
    }

    #[test]
    fn higher_priority_runs_first() {
        let mm = MemoryManager::new();
        let engine = engine(1, 1);
        let input = Tensor::from_vec(&mm, &[1.0f32], &[1]).unwrap();
        let ctx = register(&engine, "t", &input);
        let gate = Arc::new(Gate::default());
        let order = Arc::new(Mutex::new(Vec::new()));

        let record = |label: &'static str| -> StatusCallback {
            let order = Arc::clone(&order);
            Box::new(move |_| order.lock().push(label))
        };

        let out0 = Tensor::empty(&mm, FrameworkDType::Float, &[1]).unwrap();
        assert!(engine.enqueue_push_pull(request(&ctx, &input, &out0, gate.clone(), 0, 0), record("first")).is_ok());
        // wait until the only worker holds the gated task
        while engine.pending() > 0 {
            std::thread::sleep(Duration::from_millis(1));
        }

        let out1 = Tensor::empty(&mm, FrameworkDType::Float, &[1]).unwrap();
        let out2 = Tensor::empty(&mm, FrameworkDType::Float, &[1]).unwrap();
        assert!(engine.enqueue_push_pull(request(&ctx, &input, &out1, AlwaysReady::shared(), -5, 1), record("low")).is_ok());
        assert!(engine.enqueue_push_pull(request(&ctx, &input, &out2, AlwaysReady::shared(), 5, 2), record("high")).is_ok());
        gate.open();

        let deadline = std::time::Instant::now() + TIMEOUT;
        while order.lock().len() < 3 {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(*order.lock(), vec!["first", "high", "low"]);
    }

    #[test]
    fn shutdown_aborts_pending_work_once() {
        let mm = MemoryManager::new();
        let engine = engine(1, 1);
        let input = Tensor::from_vec(&mm, &[1i16, 2], &[2]).unwrap();
        let output = Tensor::empty(&mm, FrameworkDType::Int16, &[2]).unwrap();
        let ctx = register(&engine, "g", &input);
        let gate = Arc::new(Gate::default());

        let (tx, rx) = mpsc::channel();
        let status = engine.enqueue_push_pull(request(&ctx, &input, &output, gate, 0, 0), reply_to(&tx));
        assert!(status.is_ok());

        engine.shutdown();
        let status = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(status.kind(), StatusType::Aborted);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(engine.check_initialized().kind(), StatusType::PreconditionError);
        assert_eq!(engine.stats().aborted, 1);
    }
}
