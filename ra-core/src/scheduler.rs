//! One-shot and interval job scheduling.
//!
//! Jobs are identified by a string id and are cancellable; cancelling
//! an id that isn't registered is a no-op. A single background thread
//! owns all job bookkeeping, so job callbacks run serialized with
//! respect to each other (they still need to take whatever lock guards
//! the RA state before mutating it).
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossbeam_channel as chan;

type Job = Box<dyn FnMut() + Send>;

enum Cmd {
    Once(String, Instant, Job),
    Interval(String, Duration, Job),
    Cancel(String),
    Shutdown,
}

struct Entry {
    next: Instant,
    interval: Option<Duration>,
    job: Job,
}

/// Handle to the background scheduler thread.
pub struct Scheduler {
    tx: chan::Sender<Cmd>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (tx, rx) = chan::unbounded::<Cmd>();
        let handle = std::thread::spawn(move || Self::run(rx));
        Self {
            tx,
            handle: Some(handle),
        }
    }

    fn run(rx: chan::Receiver<Cmd>) {
        let mut jobs: HashMap<String, Entry> = HashMap::new();
        loop {
            let timeout = jobs
                .values()
                .map(|e| e.next)
                .min()
                .map(|next| next.saturating_duration_since(Instant::now()))
                .unwrap_or_else(|| Duration::from_secs(3600));

            match rx.recv_timeout(timeout) {
                Ok(Cmd::Once(id, at, job)) => {
                    jobs.insert(
                        id,
                        Entry {
                            next: at,
                            interval: None,
                            job,
                        },
                    );
                }
                Ok(Cmd::Interval(id, interval, job)) => {
                    jobs.insert(
                        id,
                        Entry {
                            next: Instant::now() + interval,
                            interval: Some(interval),
                            job,
                        },
                    );
                }
                Ok(Cmd::Cancel(id)) => {
                    jobs.remove(&id);
                }
                Ok(Cmd::Shutdown) => break,
                Err(chan::RecvTimeoutError::Timeout) => {}
                Err(chan::RecvTimeoutError::Disconnected) => break,
            }

            let now = Instant::now();
            let due: Vec<String> = jobs
                .iter()
                .filter(|(_, e)| e.next <= now)
                .map(|(id, _)| id.clone())
                .collect();

            for id in due {
                let reschedule = if let Some(entry) = jobs.get_mut(&id) {
                    (entry.job)();
                    entry.interval.map(|iv| now + iv)
                } else {
                    None
                };
                match reschedule {
                    Some(next) => {
                        if let Some(entry) = jobs.get_mut(&id) {
                            entry.next = next;
                        }
                    }
                    None => {
                        jobs.remove(&id);
                    }
                }
            }
        }
    }

    /// Schedule `f` to run once, after `delay`, under job id `id`.
    pub fn schedule_once(&self, id: impl Into<String>, delay: Duration, f: impl FnMut() + Send + 'static) {
        let _ = self
            .tx
            .send(Cmd::Once(id.into(), Instant::now() + delay, Box::new(f)));
    }

    /// Schedule `f` to run every `interval`, starting one interval from
    /// now, under job id `id`.
    pub fn schedule_interval(
        &self,
        id: impl Into<String>,
        interval: Duration,
        f: impl FnMut() + Send + 'static,
    ) {
        let _ = self.tx.send(Cmd::Interval(id.into(), interval, Box::new(f)));
    }

    /// Cancel a job by id. A no-op if the id is not registered.
    pub fn cancel(&self, id: impl Into<String>) {
        let _ = self.tx.send(Cmd::Cancel(id.into()));
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.tx.send(Cmd::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn once_fires_after_delay() {
        let sched = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        sched.schedule_once("job", Duration::from_millis(20), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_prevents_fire() {
        let sched = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        sched.schedule_once("job", Duration::from_millis(30), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        sched.cancel("job");
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancel_unknown_id_is_noop() {
        let sched = Scheduler::new();
        sched.cancel("nope");
    }

    #[test]
    fn interval_fires_repeatedly() {
        let sched = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        sched.schedule_interval("heartbeat", Duration::from_millis(15), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(80));
        assert!(count.load(Ordering::SeqCst) >= 3);
    }
}
