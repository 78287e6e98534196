use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use thiserror::Error;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Error surfaced when joining a task handle.
#[derive(Debug, Error, Clone)]
pub enum TaskError {
    #[error("worker task panicked: {0}")]
    Panicked(String),

    #[error("task dropped before execution")]
    Canceled,
}

/// Completion handle for an enqueued task. Joining blocks until the task
/// finishes and yields its return value, or the captured panic if the task
/// failed.
pub struct TaskHandle<T> {
    result: Receiver<thread::Result<T>>,
}

impl<T> TaskHandle<T> {
    pub fn join(self) -> Result<T, TaskError> {
        match self.result.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(TaskError::Panicked(panic_message(&payload))),
            Err(_) => Err(TaskError::Canceled),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(inner) = payload.downcast_ref::<Box<dyn std::any::Any + Send>>() {
        panic_message(inner.as_ref())
    } else {
        "unknown panic payload".to_string()
    }
}

/// Fixed-size worker pool fed by a single FIFO task queue.
///
/// Workers block on the queue while idle. Dropping the pool stops the
/// workers after their current task; tasks still queued are drained without
/// being run, and their handles report [`TaskError::Canceled`].
pub struct ThreadPool {
    workers: Vec<thread::JoinHandle<()>>,
    sender: Option<Sender<Job>>,
    stop: Arc<AtomicBool>,
}

impl ThreadPool {
    /// Pool with one worker per unit of available hardware concurrency.
    pub fn with_default_threads() -> Self {
        Self::new(default_thread_count())
    }

    pub fn new(threads: usize) -> Self {
        assert!(threads > 0, "thread pool requires at least one worker");
        let (sender, receiver) = unbounded::<Job>();
        let stop = Arc::new(AtomicBool::new(false));
        let workers = (0..threads)
            .map(|_| {
                let receiver = receiver.clone();
                let stop = Arc::clone(&stop);
                thread::spawn(move || worker_loop(receiver, stop))
            })
            .collect();
        ThreadPool {
            workers,
            sender: Some(sender),
            stop,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a task and return a handle resolving to its return value. A
    /// panic inside the task is captured and re-surfaced on join; the worker
    /// itself survives.
    pub fn enqueue<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(task));
            let _ = tx.send(result);
        });
        if let Some(sender) = &self.sender {
            // A send can only fail once shutdown has begun; the handle then
            // reports cancellation on join.
            let _ = sender.send(job);
        }
        TaskHandle { result: rx }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        // Closing the channel wakes every idle worker.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(receiver: Receiver<Job>, stop: Arc<AtomicBool>) {
    while let Ok(job) = receiver.recv() {
        if stop.load(Ordering::Acquire) {
            // Drain the queue without executing on shutdown.
            continue;
        }
        job();
    }
}

pub fn default_thread_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Join a set of kernel task handles, then turn any captured failure into a
/// fatal panic. Every handle is joined before the first failure propagates
/// so no task is left running behind the caller's back.
pub fn join_all(handles: Vec<TaskHandle<()>>) {
    let results: Vec<_> = handles.into_iter().map(TaskHandle::join).collect();
    for result in results {
        if let Err(err) = result {
            panic!("{err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_returns_value() {
        let pool = ThreadPool::new(2);
        let handle = pool.enqueue(|| 21 * 2);
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn test_many_tasks() {
        let pool = ThreadPool::new(4);
        let handles: Vec<_> = (0..100u64).map(|i| pool.enqueue(move || i * i)).collect();
        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, (0..100u64).map(|i| i * i).sum());
    }

    #[test]
    fn test_panic_is_captured() {
        let pool = ThreadPool::new(1);
        let bad: TaskHandle<()> = pool.enqueue(|| panic!("boom"));
        match bad.join() {
            Err(TaskError::Panicked(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected captured panic, got {other:?}"),
        }
        // The worker survives a panicking task.
        let ok = pool.enqueue(|| 7);
        assert_eq!(ok.join().unwrap(), 7);
    }

    #[test]
    fn test_thread_count() {
        let pool = ThreadPool::new(3);
        assert_eq!(pool.thread_count(), 3);
    }
}
