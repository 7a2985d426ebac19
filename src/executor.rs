use crate::error::EngineError;
use crossbeam_channel::{Sender, bounded};
use parking_lot::{Condvar, Mutex};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt::Write as _;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// A unit of work executed on one worker thread.
///
/// Tasks report failure through their return value; the pool captures the
/// first failure of a batch and re-raises it from [`TiredExecutor::submit_all`]
/// once the batch has drained.
pub type Task = Box<dyn FnOnce() -> Result<(), EngineError> + Send + 'static>;

/// Fatigue every worker starts out with.
const INITIAL_FATIGUE: f64 = 1.0;

/// An idle worker as seen by the scheduler, ordered by ascending fatigue
/// with ties broken by the stable worker id.
struct IdleWorker {
    fatigue: f64,
    id: usize,
}

impl PartialEq for IdleWorker {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IdleWorker {}

impl PartialOrd for IdleWorker {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IdleWorker {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fatigue
            .total_cmp(&other.fatigue)
            .then(self.id.cmp(&other.id))
    }
}

/// Scheduler state shared between the submitting thread and all workers.
struct PoolState {
    idle: BinaryHeap<Reverse<IdleWorker>>,
    in_flight: usize,
    first_error: Option<EngineError>,
}

struct PoolShared {
    state: Mutex<PoolState>,
    /// Signalled whenever a worker re-enters the idle heap.
    worker_idle: Condvar,
    /// Signalled when `in_flight` drops to zero.
    batch_drained: Condvar,
}

/// Cumulative usage counters for one worker, read by the report.
struct WorkerStats {
    fatigue: f64,
    time_busy: Duration,
    time_idle: Duration,
    working: bool,
}

enum Mailbox {
    Run(Task),
    Stop,
}

struct WorkerHandle {
    id: usize,
    sender: Sender<Mailbox>,
    stats: Arc<Mutex<WorkerStats>>,
    handle: JoinHandle<()>,
}

/// A fixed pool of persistent worker threads scheduled by fatigue.
///
/// Each worker owns a single-slot mailbox and runs one task at a time.
/// Submission always picks the least-fatigued idle worker, where fatigue
/// starts at 1.0 and grows by the wall-clock seconds each task took — no
/// decay. Heterogeneous task costs thereby even out across the pool: a
/// worker that drew a long row sinks in the idle ordering and sits out the
/// next few dispatches.
///
/// [`TiredExecutor::submit_all`] is the synchronous fan-out/fan-in barrier
/// between batches: it returns only once every task of the batch has
/// completed, and re-raises the first task failure of the batch if there
/// was one.
///
/// # Example
///
/// ```rust
/// use lae::executor::{Task, TiredExecutor};
///
/// let executor = TiredExecutor::new(4);
/// let tasks: Vec<Task> = (0..8).map(|_| Box::new(|| Ok(())) as Task).collect();
/// executor.submit_all(tasks).unwrap();
/// println!("{}", executor.worker_report());
/// executor.shutdown();
/// ```
pub struct TiredExecutor {
    workers: Vec<WorkerHandle>,
    shared: Arc<PoolShared>,
}

impl TiredExecutor {
    /// Spawns `num_workers` worker threads, all starting idle.
    ///
    /// # Panics
    ///
    /// Panics if `num_workers` is zero or a worker thread cannot be spawned.
    pub fn new(num_workers: usize) -> Self {
        assert!(num_workers > 0, "executor needs at least one worker");

        let mut idle = BinaryHeap::with_capacity(num_workers);
        for id in 0..num_workers {
            idle.push(Reverse(IdleWorker {
                fatigue: INITIAL_FATIGUE,
                id,
            }));
        }
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                idle,
                in_flight: 0,
                first_error: None,
            }),
            worker_idle: Condvar::new(),
            batch_drained: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let (sender, receiver) = bounded::<Mailbox>(1);
            let stats = Arc::new(Mutex::new(WorkerStats {
                fatigue: INITIAL_FATIGUE,
                time_busy: Duration::ZERO,
                time_idle: Duration::ZERO,
                working: false,
            }));
            let worker_shared = Arc::clone(&shared);
            let worker_stats = Arc::clone(&stats);
            let handle = std::thread::Builder::new()
                .name(format!("lae-worker-{}", id))
                .spawn(move || worker_loop(id, receiver, worker_shared, worker_stats))
                .expect("failed to spawn worker thread");
            workers.push(WorkerHandle {
                id,
                sender,
                stats,
                handle,
            });
        }

        debug!(workers = num_workers, "executor started");
        TiredExecutor { workers, shared }
    }

    /// Hands `task` to the least-fatigued idle worker.
    ///
    /// Blocks the calling thread until some worker is idle. The worker
    /// re-registers itself as idle once the task completes.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Task dispatched
    /// * `Err(EngineError::Interrupted)` - The chosen worker's mailbox is
    ///   disconnected
    pub fn submit(&self, task: Task) -> Result<(), EngineError> {
        let worker_id = {
            let mut state = self.shared.state.lock();
            let worker = loop {
                if let Some(Reverse(worker)) = state.idle.pop() {
                    break worker;
                }
                self.shared.worker_idle.wait(&mut state);
            };
            state.in_flight += 1;
            worker.id
        };

        trace!(worker = worker_id, "dispatching task");
        if self.workers[worker_id]
            .sender
            .send(Mailbox::Run(task))
            .is_err()
        {
            let mut state = self.shared.state.lock();
            state.in_flight -= 1;
            if state.in_flight == 0 {
                self.shared.batch_drained.notify_all();
            }
            return Err(EngineError::Interrupted(format!(
                "worker {} mailbox disconnected",
                worker_id
            )));
        }
        Ok(())
    }

    /// Submits every task of a batch, then blocks until the batch drains.
    ///
    /// This is the sole synchronization point between batches: when it
    /// returns, no task of the batch is still running or pending, so the
    /// caller may read shared results without racing any writer. Tasks of
    /// one batch complete in no particular order.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Every task completed successfully
    /// * `Err(_)` - The first task failure (or panic) of the batch, raised
    ///   after the barrier has drained
    pub fn submit_all(&self, tasks: Vec<Task>) -> Result<(), EngineError> {
        let mut submit_failure = None;
        for task in tasks {
            if let Err(err) = self.submit(task) {
                submit_failure = Some(err);
                break;
            }
        }

        let first_error = {
            let mut state = self.shared.state.lock();
            while state.in_flight > 0 {
                self.shared.batch_drained.wait(&mut state);
            }
            state.first_error.take()
        };

        match first_error.or(submit_failure) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Returns a human-readable snapshot of every worker's counters.
    pub fn worker_report(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(
            report,
            "-------------------------------------------------------------"
        );
        let _ = writeln!(report, "Executor Worker Report:");
        for worker in &self.workers {
            let stats = worker.stats.lock();
            let _ = writeln!(report, "Worker {}:", worker.id);
            let _ = writeln!(report, "Fatigue: {:.2}", stats.fatigue);
            let _ = writeln!(report, "Time Used: {}ms", stats.time_busy.as_millis());
            let _ = writeln!(report, "Time Idle: {}ms", stats.time_idle.as_millis());
            let _ = writeln!(
                report,
                "Status: {}",
                if stats.working { "WORKING" } else { "IDLE" }
            );
            let _ = writeln!(
                report,
                "-------------------------------------------------------------"
            );
        }
        report
    }

    /// Stops every worker and joins all worker threads.
    ///
    /// Each worker finishes the task currently in its mailbox before it
    /// sees the stop signal, so this is an orderly drain rather than a
    /// cancellation.
    pub fn shutdown(self) {
        debug!(workers = self.workers.len(), "shutting down executor");
        for worker in &self.workers {
            let _ = worker.sender.send(Mailbox::Stop);
        }
        for worker in self.workers {
            let _ = worker.handle.join();
        }
    }
}

fn worker_loop(
    id: usize,
    receiver: crossbeam_channel::Receiver<Mailbox>,
    shared: Arc<PoolShared>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    let mut last_finished = Instant::now();

    while let Ok(message) = receiver.recv() {
        let task = match message {
            Mailbox::Run(task) => task,
            Mailbox::Stop => break,
        };

        let waited = last_finished.elapsed();
        {
            let mut s = stats.lock();
            s.time_idle += waited;
            s.working = true;
        }

        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(task));
        let elapsed = started.elapsed();
        last_finished = Instant::now();

        let fatigue = {
            let mut s = stats.lock();
            s.time_busy += elapsed;
            s.fatigue += elapsed.as_secs_f64();
            s.working = false;
            s.fatigue
        };

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(panic) => Some(EngineError::TaskPanic(panic_message(panic.as_ref()))),
        };

        let drained = {
            let mut state = shared.state.lock();
            if let Some(err) = failure {
                trace!(worker = id, %err, "task failed");
                state.first_error.get_or_insert(err);
            }
            state.idle.push(Reverse(IdleWorker { fatigue, id }));
            state.in_flight -= 1;
            state.in_flight == 0
        };
        if drained {
            shared.batch_drained.notify_all();
        }
        shared.worker_idle.notify_one();
    }

    trace!(worker = id, "worker stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    #[test]
    fn idle_ordering_prefers_low_fatigue_then_low_id() {
        let mut heap = BinaryHeap::new();
        heap.push(Reverse(IdleWorker { fatigue: 2.5, id: 0 }));
        heap.push(Reverse(IdleWorker { fatigue: 1.0, id: 2 }));
        heap.push(Reverse(IdleWorker { fatigue: 1.0, id: 1 }));

        assert_eq!(heap.pop().unwrap().0.id, 1);
        assert_eq!(heap.pop().unwrap().0.id, 2);
        assert_eq!(heap.pop().unwrap().0.id, 0);
    }

    #[test]
    fn submit_all_waits_for_every_task() {
        let executor = TiredExecutor::new(3);
        let counter = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<Task> = (0..20)
            .map(|_| {
                let counter = Arc::clone(&counter);
                Box::new(move || {
                    std::thread::sleep(Duration::from_millis(2));
                    counter.fetch_add(1, AtomicOrdering::SeqCst);
                    Ok(())
                }) as Task
            })
            .collect();

        executor.submit_all(tasks).unwrap();
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 20);
        executor.shutdown();
    }

    #[test]
    fn first_task_error_surfaces_after_the_barrier() {
        let executor = TiredExecutor::new(2);

        let mut tasks: Vec<Task> = vec![Box::new(|| {
            Err(EngineError::DimensionMismatch("boom".to_string()))
        })];
        for _ in 0..5 {
            tasks.push(Box::new(|| Ok(())));
        }

        let err = executor.submit_all(tasks).unwrap_err();
        assert_eq!(err, EngineError::DimensionMismatch("boom".to_string()));

        // The pool stays usable after a failed batch.
        executor.submit_all(vec![Box::new(|| Ok(()))]).unwrap();
        executor.shutdown();
    }

    #[test]
    fn task_panic_is_captured_and_reported() {
        let executor = TiredExecutor::new(2);

        let tasks: Vec<Task> = vec![Box::new(|| panic!("row exploded")), Box::new(|| Ok(()))];
        match executor.submit_all(tasks) {
            Err(EngineError::TaskPanic(message)) => assert!(message.contains("row exploded")),
            other => panic!("expected TaskPanic, got {:?}", other),
        }
        executor.shutdown();
    }

    #[test]
    fn no_worker_runs_two_tasks_at_once() {
        use std::collections::HashSet;
        use std::thread::ThreadId;

        let executor = TiredExecutor::new(3);
        let inside: Arc<Mutex<HashSet<ThreadId>>> = Arc::new(Mutex::new(HashSet::new()));
        let violations = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<Task> = (0..30)
            .map(|_| {
                let inside = Arc::clone(&inside);
                let violations = Arc::clone(&violations);
                Box::new(move || {
                    // Entering a worker thread that is already inside a task
                    // would mean the scheduler double-assigned it.
                    if !inside.lock().insert(std::thread::current().id()) {
                        violations.fetch_add(1, AtomicOrdering::SeqCst);
                    }
                    std::thread::sleep(Duration::from_millis(2));
                    inside.lock().remove(&std::thread::current().id());
                    Ok(())
                }) as Task
            })
            .collect();

        executor.submit_all(tasks).unwrap();
        assert_eq!(violations.load(AtomicOrdering::SeqCst), 0);
        executor.shutdown();
    }

    fn fatigue_values(report: &str) -> Vec<f64> {
        report
            .lines()
            .filter_map(|line| line.strip_prefix("Fatigue: "))
            .map(|value| value.parse().unwrap())
            .collect()
    }

    #[test]
    fn fatigue_starts_at_one_and_grows_with_work() {
        let executor = TiredExecutor::new(2);

        let before = fatigue_values(&executor.worker_report());
        assert_eq!(before, vec![INITIAL_FATIGUE; 2]);

        // Six sleeping tasks across two workers: least-fatigue selection
        // guarantees both workers draw at least one.
        let tasks: Vec<Task> = (0..6)
            .map(|_| {
                Box::new(|| {
                    std::thread::sleep(Duration::from_millis(20));
                    Ok(())
                }) as Task
            })
            .collect();
        executor.submit_all(tasks).unwrap();

        let after = fatigue_values(&executor.worker_report());
        assert_eq!(after.len(), 2);
        for (before, after) in before.iter().zip(&after) {
            assert!(*after >= INITIAL_FATIGUE);
            assert!(after > before);
        }
        executor.shutdown();
    }

    #[test]
    fn report_lists_every_worker() {
        let executor = TiredExecutor::new(3);
        executor
            .submit_all(vec![Box::new(|| Ok(())) as Task])
            .unwrap();

        let report = executor.worker_report();
        for id in 0..3 {
            assert!(report.contains(&format!("Worker {}:", id)));
        }
        assert!(report.contains("Fatigue:"));
        executor.shutdown();
    }
}
