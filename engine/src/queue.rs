use std::cmp::Ordering;
use std::collections::BinaryHeap;

use parking_lot::{Condvar, Mutex};

use crate::{PushPullRequest, StatusCallback};

/// A submitted push-pull waiting for a worker.
pub(crate) struct Task {
    pub request:  PushPullRequest,
    pub callback: StatusCallback,
    seq:          u64,
}

impl Task {
    fn rank(&self) -> (i32, std::cmp::Reverse<u64>) {
        (self.request.priority, std::cmp::Reverse(self.seq))
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl Eq for Task {}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Higher priority first, FIFO among equal priorities
impl Ord for Task {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

struct QueueState {
    heap:     BinaryHeap<Task>,
    next_seq: u64,
    closed:   bool,
}

/// Priority queue shared by the engine's worker threads.
pub(crate) struct TaskQueue {
    state:     Mutex<QueueState>,
    available: Condvar,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState { heap: BinaryHeap::new(), next_seq: 0, closed: true }),
            available: Condvar::new(),
        }
    }

    /// Hand the request back when the queue is closed.
    pub fn push(
        &self,
        request: PushPullRequest,
        callback: StatusCallback,
    ) -> Result<(), (PushPullRequest, StatusCallback)> {
        let mut state = self.state.lock();
        if state.closed {
            return Err((request, callback));
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Task { request, callback, seq });
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Block until a task is available; `None` once the queue is closed.
    pub fn pop(&self) -> Option<Task> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(task) = state.heap.pop() {
                return Some(task);
            }
            self.available.wait(&mut state);
        }
    }

    pub fn open(&self) {
        self.state.lock().closed = false;
    }

    /// Close the queue, wake every worker, and return what was still queued.
    pub fn close(&self) -> Vec<Task> {
        let mut state = self.state.lock();
        state.closed = true;
        let drained = std::mem::take(&mut state.heap).into_sorted_vec();
        drop(state);
        self.available.notify_all();
        drained
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }
}
