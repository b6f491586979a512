use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::model::observable::lock;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Building and saving trees recurses once per nesting level.
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

struct Queue {
    jobs: VecDeque<Job>,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    ready: Condvar,
}

/// Fixed-size pool of background threads for record I/O.
///
/// Dropping the pool lets the workers drain every queued job, then joins them.
pub struct WorkerPool {
    spawner: Spawner,
    workers: Vec<JoinHandle<()>>,
}

/// Cloneable handle for submitting jobs to a [`WorkerPool`].
///
/// Jobs submitted after the pool has shut down run on the caller's thread.
#[derive(Clone)]
pub struct Spawner {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Start `size` worker threads (at least one).
    pub fn new(size: usize) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                shutdown: false,
            }),
            ready: Condvar::new(),
        });
        let mut workers = Vec::with_capacity(size.max(1));
        for n in 0..size.max(1) {
            let shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("tally-io-{n}"))
                .stack_size(WORKER_STACK_SIZE)
                .spawn(move || worker_loop(&shared))?;
            workers.push(handle);
        }
        Ok(WorkerPool {
            spawner: Spawner { shared },
            workers,
        })
    }

    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }
}

impl Spawner {
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        let mut queue = lock(&self.shared.queue);
        if queue.shutdown {
            drop(queue);
            job();
            return;
        }
        queue.jobs.push_back(Box::new(job));
        drop(queue);
        self.shared.ready.notify_one();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = lock(&shared.queue);
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break Some(job);
                }
                if queue.shutdown {
                    break None;
                }
                queue = shared
                    .ready
                    .wait(queue)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        };
        match job {
            Some(job) => job(),
            None => return,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        lock(&self.spawner.shared.queue).shutdown = true;
        self.spawner.shared.ready.notify_all();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}
