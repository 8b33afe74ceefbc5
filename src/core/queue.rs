//! Task Queue - blocking FIFO shared by the manager and the worker pool
//!
//! `dequeue_timeout` never blocks indefinitely so that workers notice stop
//! requests within one timeout period without a separate wake-up mechanism.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::core::models::DownloadTask;

/// Default dequeue timeout used by workers
pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Default)]
struct QueueState {
    items: VecDeque<DownloadTask>,
    /// Tasks enqueued but not yet marked done (queued + in flight)
    unfinished: usize,
}

/// Unbounded multi-producer / multi-consumer FIFO of task records
#[derive(Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    all_done: Condvar,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, task: DownloadTask) {
        let mut state = self.state.lock();
        state.items.push_back(task);
        state.unfinished += 1;
        self.not_empty.notify_one();
    }

    /// Pop the oldest task, waiting at most `timeout` for one to arrive.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<DownloadTask> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.items.pop_front() {
                return Some(task);
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return state.items.pop_front();
            }
        }
    }

    /// Mark one previously dequeued task as fully processed. Returns the
    /// number of tasks still unfinished.
    pub fn task_done(&self) -> usize {
        let mut state = self.state.lock();
        state.unfinished = state.unfinished.saturating_sub(1);
        if state.unfinished == 0 {
            self.all_done.notify_all();
        }
        state.unfinished
    }

    pub fn unfinished(&self) -> usize {
        self.state.lock().unfinished
    }

    /// Block until every enqueued task was marked done, or the timeout elapses.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.unfinished > 0 {
            if self.all_done.wait_until(&mut state, deadline).timed_out() {
                return state.unfinished == 0;
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Remove and return every unclaimed task.
    pub fn drain(&self) -> Vec<DownloadTask> {
        let mut state = self.state.lock();
        let dropped: Vec<DownloadTask> = state.items.drain(..).collect();
        state.unfinished = state.unfinished.saturating_sub(dropped.len());
        if state.unfinished == 0 {
            self.all_done.notify_all();
        }
        dropped
    }
}
