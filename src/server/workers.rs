//! Fixed-size worker pool.
//!
//! Each worker is one OS thread driving a single-threaded tokio runtime. A
//! connection is bound to the least-loaded worker at accept time and stays
//! there for life, so everything a connection does runs on one thread and
//! its handlers need no locking.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime;

/// One worker thread.
pub struct Worker {
    index: usize,
    handle: runtime::Handle,
    load: Arc<AtomicUsize>,
}

impl Worker {
    /// Position of this worker in the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of live connections bound to this worker.
    pub fn load(&self) -> usize {
        self.load.load(Ordering::Relaxed)
    }

    /// Run a connection task on this worker, counting it as load until it
    /// finishes.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        struct LoadGuard(Arc<AtomicUsize>);

        impl Drop for LoadGuard {
            fn drop(&mut self) {
                self.0.fetch_sub(1, Ordering::Relaxed);
            }
        }

        self.load.fetch_add(1, Ordering::Relaxed);
        let guard = LoadGuard(self.load.clone());

        let _task = self.handle.spawn(async move {
            let _guard = guard;
            task.await;
        });
    }
}

/// The pool of worker threads, sized once at startup.
pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    /// Spawn `count` worker threads and wait until all runtimes are up.
    pub fn start(count: usize) -> io::Result<Self> {
        let count = count.max(1);
        let mut workers = Vec::with_capacity(count);

        for index in 0..count {
            let (tx, rx) = std::sync::mpsc::channel::<io::Result<runtime::Handle>>();

            // Workers are detached; they live for the process lifetime.
            let _thread = std::thread::Builder::new()
                .name(format!("quanta-worker-{index}"))
                .spawn(move || {
                    let rt = match runtime::Builder::new_current_thread().enable_all().build() {
                        Ok(rt) => rt,
                        Err(e) => {
                            let _ = tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = tx.send(Ok(rt.handle().clone()));
                    rt.block_on(std::future::pending::<()>());
                })?;

            let handle = rx
                .recv()
                .map_err(|_| io::Error::other("worker thread died during startup"))??;

            workers.push(Worker { index, handle, load: Arc::new(AtomicUsize::new(0)) });
        }

        Ok(Self { workers })
    }

    /// The worker with the fewest live connections.
    pub fn least_loaded(&self) -> &Worker {
        self.workers
            .iter()
            .min_by_key(|w| w.load())
            .expect("pool holds at least one worker")
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the pool is empty; never true for a started pool.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
