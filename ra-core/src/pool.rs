//! Bounded worker pool for fanning out outbound RPCs.
//!
//! A slow or failing peer must not block delivery to the others, so
//! sends are dispatched onto a small fixed pool rather than one
//! thread per peer or strictly sequential iteration.
use crossbeam_channel as chan;

type Task = Box<dyn FnOnce() + Send>;

pub struct DispatchPool {
    tx: Option<chan::Sender<Task>>,
    workers: Vec<std::thread::JoinHandle<()>>,
}

const DEFAULT_WORKERS: usize = 10;

impl DispatchPool {
    pub fn new() -> Self {
        Self::with_size(DEFAULT_WORKERS)
    }

    pub fn with_size(size: usize) -> Self {
        let (tx, rx) = chan::unbounded::<Task>();
        let workers = (0..size.max(1))
            .map(|n| {
                let rx = rx.clone();
                std::thread::Builder::new()
                    .name(format!("ra-dispatch-{}", n))
                    .spawn(move || {
                        while let Ok(task) = rx.recv() {
                            task();
                        }
                    })
                    .expect("failed to spawn dispatch worker")
            })
            .collect();
        Self {
            tx: Some(tx),
            workers,
        }
    }

    /// Submit a task to run on the pool. Never blocks the caller on
    /// the task's completion.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Box::new(task));
        }
    }
}

impl Default for DispatchPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DispatchPool {
    fn drop(&mut self) {
        // Drop the sender first so worker recv loops observe a closed
        // channel once in-flight tasks drain, instead of blocking on
        // `recv` forever.
        self.tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
