//! The thread source (§4.A): a fixed-size pool of OS threads draining a FIFO task queue.
//!
//! Unlike the teacher's multi-threaded session loop, which grows and shrinks its worker count
//! between `max_idle_threads` and `max_threads` in response to kernel request volume, this
//! pool is sized once at construction and never resizes — the dispatcher is the layer that
//! decides how much concurrency an operation graph needs, and it does so by how it chains
//! operations, not by asking the thread source to grow.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Worker {
    thread: Option<JoinHandle<()>>,
    #[allow(dead_code)]
    id: usize,
}

struct QueueState {
    tasks: std::collections::VecDeque<Task>,
    exit: bool,
}

struct PoolState {
    queue: Mutex<QueueState>,
    not_empty: Condvar,
    pending: AtomicUsize,
    exiting: AtomicBool,
}

/// A fixed-size pool of worker threads draining a FIFO task queue (§4.A).
pub struct ThreadSource {
    state: Arc<PoolState>,
    workers: Mutex<Vec<Worker>>,
}

impl ThreadSource {
    /// Spawns `worker_threads` OS threads, each looping on the shared queue until `shutdown`.
    pub fn new(worker_threads: usize) -> Self {
        let worker_threads = worker_threads.max(1);
        let state = Arc::new(PoolState {
            queue: Mutex::new(QueueState {
                tasks: std::collections::VecDeque::new(),
                exit: false,
            }),
            not_empty: Condvar::new(),
            pending: AtomicUsize::new(0),
            exiting: AtomicBool::new(false),
        });
        let mut workers = Vec::with_capacity(worker_threads);
        for id in 0..worker_threads {
            let state = Arc::clone(&state);
            let thread = thread::Builder::new()
                .name(format!("nativeio-worker-{id}"))
                .spawn(move || Self::worker_loop(&state))
                .expect("failed to spawn worker thread");
            workers.push(Worker {
                thread: Some(thread),
                id,
            });
        }
        Self {
            state,
            workers: Mutex::new(workers),
        }
    }

    fn worker_loop(state: &PoolState) {
        loop {
            let task = {
                let mut guard = state.queue.lock().unwrap_or_else(|e| e.into_inner());
                loop {
                    if let Some(task) = guard.tasks.pop_front() {
                        break Some(task);
                    }
                    if guard.exit {
                        break None;
                    }
                    guard = state
                        .not_empty
                        .wait(guard)
                        .unwrap_or_else(|e| e.into_inner());
                }
            };
            match task {
                Some(task) => {
                    task();
                    state.pending.fetch_sub(1, Ordering::AcqRel);
                }
                None => break,
            }
        }
    }

    /// Enqueues a task for execution by the next available worker.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) {
        let mut guard = self.state.queue.lock().unwrap_or_else(|e| e.into_inner());
        if guard.exit {
            log::warn!("task submitted after pool shutdown; dropping");
            return;
        }
        guard.tasks.push_back(Box::new(task));
        self.state.pending.fetch_add(1, Ordering::AcqRel);
        self.state.not_empty.notify_one();
    }

    /// The number of tasks queued or currently executing (`Dispatcher::pool_depth`, §4.J).
    pub fn depth(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }
}

impl Drop for ThreadSource {
    fn drop(&mut self) {
        if self.state.exiting.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut guard = self.state.queue.lock().unwrap_or_else(|e| e.into_inner());
            guard.exit = true;
        }
        self.state.not_empty.notify_all();
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        for worker in workers.iter_mut() {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    log::error!("worker thread panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn runs_every_submitted_task() {
        let pool = ThreadSource::new(4);
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn depth_reflects_outstanding_work() {
        let pool = ThreadSource::new(1);
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        pool.submit(move || {
            let _ = rx.recv();
        });
        pool.submit(|| {});
        assert!(pool.depth() >= 1);
        tx.send(()).unwrap();
        drop(pool);
    }
}
