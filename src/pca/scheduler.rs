// Background job scheduler: a FIFO of PCA jobs drained by at most one worker
// thread. The worker exits when the queue is empty and a later enqueue spawns
// a fresh one; nothing on the detection path ever waits on it.

use super::PcaJob;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Mutex<SchedulerState>>,
}

struct SchedulerState {
    queue: VecDeque<PcaJob>,
    worker_running: bool,
    enqueued_total: u64,
    completed_total: u64,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SchedulerState {
                queue: VecDeque::new(),
                worker_running: false,
                enqueued_total: 0,
                completed_total: 0,
            })),
        }
    }

    /// Queue a job and start the worker if it is not already running.
    pub fn enqueue(&self, job: PcaJob) {
        let spawn_worker = {
            let mut state = self.inner.lock().unwrap();
            state.queue.push_back(job);
            state.enqueued_total += 1;
            if state.worker_running {
                false
            } else {
                state.worker_running = true;
                true
            }
        };
        if spawn_worker {
            let inner = Arc::clone(&self.inner);
            thread::spawn(move || drain(inner));
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.lock().unwrap();
        !state.worker_running && state.queue.is_empty()
    }

    /// Total jobs ever enqueued; used to verify the single-flight guard.
    pub fn enqueued_total(&self) -> u64 {
        self.inner.lock().unwrap().enqueued_total
    }

    pub fn completed_total(&self) -> u64 {
        self.inner.lock().unwrap().completed_total
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

// Worker body. The running flag is cleared under the same lock that sees the
// queue empty, so an enqueue can never be missed between pop and exit.
fn drain(inner: Arc<Mutex<SchedulerState>>) {
    loop {
        let job = {
            let mut state = inner.lock().unwrap();
            match state.queue.pop_front() {
                Some(job) => job,
                None => {
                    state.worker_running = false;
                    return;
                }
            }
        };
        // The numeric work runs fully unlocked.
        job.run();
        inner.lock().unwrap().completed_total += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pca::new_basis_slot;
    use std::time::{Duration, Instant};

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    fn trivial_snapshot() -> Vec<Vec<f64>> {
        (0..10)
            .map(|i| vec![i as f64, -(i as f64), 1.0, 0.5])
            .collect()
    }

    #[test]
    fn enqueue_runs_job_and_worker_goes_idle() {
        let scheduler = JobScheduler::new();
        let slot = new_basis_slot();
        scheduler.enqueue(PcaJob::new(trivial_snapshot(), 1, 4, Arc::clone(&slot)));

        assert!(wait_until(Duration::from_secs(5), || slot.get().is_some()));
        assert!(wait_until(Duration::from_secs(5), || scheduler.is_idle()));
        assert_eq!(scheduler.enqueued_total(), 1);
        assert_eq!(scheduler.completed_total(), 1);
    }

    #[test]
    fn worker_restarts_after_draining() {
        let scheduler = JobScheduler::new();

        let first = new_basis_slot();
        scheduler.enqueue(PcaJob::new(trivial_snapshot(), 1, 4, Arc::clone(&first)));
        assert!(wait_until(Duration::from_secs(5), || scheduler.is_idle()));

        // A later enqueue must spawn a new worker
        let second = new_basis_slot();
        scheduler.enqueue(PcaJob::new(trivial_snapshot(), 1, 4, Arc::clone(&second)));
        assert!(wait_until(Duration::from_secs(5), || second.get().is_some()));
        assert_eq!(scheduler.completed_total(), 2);
    }

    #[test]
    fn jobs_complete_in_fifo_order() {
        let scheduler = JobScheduler::new();
        let slots: Vec<_> = (0..4).map(|_| new_basis_slot()).collect();
        for slot in &slots {
            scheduler.enqueue(PcaJob::new(trivial_snapshot(), 1, 4, Arc::clone(slot)));
        }
        assert!(wait_until(Duration::from_secs(10), || scheduler.is_idle()));
        for slot in &slots {
            assert!(slot.get().is_some());
        }
        assert_eq!(scheduler.enqueued_total(), 4);
    }
}
