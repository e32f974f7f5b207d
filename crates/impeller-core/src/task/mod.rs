// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Worker threads for background work such as pipeline compilation.

use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::sync::PoisonError;
use std::thread::JoinHandle;

/// A unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks off the calling thread.
pub trait TaskRunner: Send + Sync + Debug + 'static {
    /// Schedules `task`.
    ///
    /// ## Returns
    /// `false` if the runner has shut down and the task was dropped without
    /// running. Dropping the task runs the destructors of everything it
    /// captured.
    fn post_task(&self, task: Task) -> bool;
}

/// A fixed pool of named worker threads fed by a shared channel.
///
/// Dropping the runner closes the channel, lets the workers drain the tasks
/// already queued, and joins them.
#[derive(Debug)]
pub struct ConcurrentTaskRunner {
    sender: Mutex<Option<flume::Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ConcurrentTaskRunner {
    /// Spawns `worker_count` workers (at least one).
    ///
    /// ## Arguments
    /// * `name` - Prefix of the worker thread names.
    /// * `worker_count` - Number of threads.
    pub fn new(name: &str, worker_count: usize) -> Self {
        let (sender, receiver) = flume::unbounded::<Task>();
        let mut workers = Vec::new();
        for index in 0..worker_count.max(1) {
            let receiver = receiver.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("{name}.{index}"))
                .spawn(move || {
                    while let Ok(task) = receiver.recv() {
                        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                            log::error!("A background task panicked.");
                        }
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => log::error!("Failed to spawn worker thread {name}.{index}: {e}"),
            }
        }
        log::debug!("Task runner '{name}' started with {} workers.", workers.len());
        Self {
            sender: Mutex::new((!workers.is_empty()).then_some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// The number of live worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stops accepting tasks, drains the queue and joins the workers.
    pub fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let workers =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        let current = std::thread::current().id();
        for worker in workers {
            // A task that drops the last handle to the runner runs on a worker.
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                log::error!("A worker thread panicked during shutdown.");
            }
        }
    }
}

impl TaskRunner for ConcurrentTaskRunner {
    fn post_task(&self, task: Task) -> bool {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => sender.send(task).is_ok(),
            None => {
                log::warn!("Task posted to a runner that has shut down.");
                false
            }
        }
    }
}

impl Drop for ConcurrentTaskRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_tasks_run_on_named_workers() {
        let runner = ConcurrentTaskRunner::new("test.worker", 2);
        let (tx, rx) = flume::unbounded();
        assert!(runner.post_task(Box::new(move || {
            let name = std::thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        })));

        let name = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("task should run");
        assert!(name.unwrap().starts_with("test.worker."));
    }

    #[test]
    fn test_drop_drains_queued_tasks() {
        // --- 1. ARRANGE ---
        let counter = Arc::new(AtomicUsize::new(0));
        let runner = ConcurrentTaskRunner::new("test.drain", 1);

        // --- 2. ACT ---
        for _ in 0..32 {
            let counter = counter.clone();
            runner.post_task(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        drop(runner);

        // --- 3. ASSERT ---
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn test_post_after_shutdown_is_rejected() {
        let runner = ConcurrentTaskRunner::new("test.closed", 1);
        runner.shutdown();
        assert!(!runner.post_task(Box::new(|| {})));
        assert_eq!(runner.worker_count(), 0);
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let runner = ConcurrentTaskRunner::new("test.panic", 1);
        runner.post_task(Box::new(|| panic!("boom")));
        let (tx, rx) = flume::bounded(1);
        runner.post_task(Box::new(move || tx.send(()).unwrap()));
        assert!(rx.recv_timeout(std::time::Duration::from_secs(5)).is_ok());
    }
}
