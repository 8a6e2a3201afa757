//! Fans chunks of work out to a rayon pool and gathers the results over a
//! channel.

use crate::{
    worker::{Batch, Report, RunSettings, Task},
    GameError,
};
use futures::{
    channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
    StreamExt,
};
use shoebox_types::WorkUnit;
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Messages sent from workers to the collector.
#[derive(Debug)]
pub enum WorkerMessage {
    Reported {
        worker: usize,
        report: Report,
    },
    Completed {
        worker: usize,
        batch: Batch,
    },
    Failed {
        worker: usize,
        error: WorkerError,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error(transparent)]
    Game(#[from] GameError),
    #[error("worker panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("worker {worker} failed: {source}")]
    Worker {
        worker: usize,
        #[source]
        source: WorkerError,
    },
    #[error("workers disconnected after {completed} of {expected} completed")]
    Disconnected { completed: usize, expected: usize },
}

/// Callback a job uses to report progress.
pub type ReportSink<'a> = &'a mut dyn FnMut(Report);

/// A unit of work the pool can run.
///
/// Jobs should poll `cancel` between steps and stop early once it is set.
pub trait Job: Send + 'static {
    fn execute(self: Box<Self>, cancel: &AtomicBool, report: ReportSink<'_>)
        -> Result<Batch, GameError>;
}

impl Job for Task {
    fn execute(
        self: Box<Self>,
        cancel: &AtomicBool,
        report: ReportSink<'_>,
    ) -> Result<Batch, GameError> {
        self.run(cancel, report)
    }
}

/// Owns the worker thread pool. Reused across simulations.
pub struct Executor {
    pool: rayon::ThreadPool,
}

impl Executor {
    /// Build a pool of `threads` workers (0 selects the available parallelism).
    pub fn new(threads: usize) -> Result<Self, ExecutorError> {
        let threads = match threads {
            0 => thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("shoebox-worker-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Start one worker per chunk.
    pub fn dispatch(&self, chunks: Vec<Vec<WorkUnit>>, settings: RunSettings) -> Dispatch {
        let jobs = chunks
            .into_iter()
            .enumerate()
            .map(|(worker, units)| {
                Box::new(Task {
                    worker,
                    units,
                    settings,
                }) as Box<dyn Job>
            })
            .collect();
        self.dispatch_jobs(jobs)
    }

    pub fn dispatch_jobs(&self, jobs: Vec<Box<dyn Job>>) -> Dispatch {
        let (sender, receiver) = mpsc::unbounded();
        let cancel = Arc::new(AtomicBool::new(false));
        let expected = jobs.len();
        for (worker, job) in jobs.into_iter().enumerate() {
            let sender = sender.clone();
            let cancel = cancel.clone();
            self.pool.spawn(move || run_job(worker, job, &cancel, sender));
        }
        debug!(workers = expected, "dispatched");
        Dispatch {
            receiver,
            expected,
            cancel,
        }
    }
}

fn run_job(
    worker: usize,
    job: Box<dyn Job>,
    cancel: &AtomicBool,
    sender: UnboundedSender<WorkerMessage>,
) {
    let reports = sender.clone();
    let mut on_report = move |report: Report| {
        let _ = reports.unbounded_send(WorkerMessage::Reported { worker, report });
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.execute(cancel, &mut on_report)));
    let message = match outcome {
        Ok(Ok(batch)) => WorkerMessage::Completed { worker, batch },
        Ok(Err(err)) => WorkerMessage::Failed {
            worker,
            error: err.into(),
        },
        Err(payload) => WorkerMessage::Failed {
            worker,
            error: WorkerError::Panicked(panic_message(payload.as_ref())),
        },
    };

    // The collector drops the receiver after the first failure.
    let _ = sender.unbounded_send(message);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a running set of workers.
///
/// Dropping the handle cancels any worker that has not finished, so an
/// abandoned or failed collection frees the pool for the next simulation.
pub struct Dispatch {
    receiver: UnboundedReceiver<WorkerMessage>,
    expected: usize,
    cancel: Arc<AtomicBool>,
}

impl Dispatch {
    pub fn workers(&self) -> usize {
        self.expected
    }

    /// Ask every worker still running to stop.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Wait until every worker completes, or fail on the first worker error.
    ///
    /// Batches are returned in completion order.
    pub async fn collect(
        mut self,
        mut on_report: impl FnMut(usize, Report),
    ) -> Result<Vec<Batch>, ExecutorError> {
        let mut batches = Vec::with_capacity(self.expected);
        while batches.len() < self.expected {
            match self.receiver.next().await {
                Some(WorkerMessage::Reported { worker, report }) => on_report(worker, report),
                Some(WorkerMessage::Completed { worker, batch }) => {
                    debug!(worker, games = batch.games.len(), "worker completed");
                    batches.push(batch);
                }
                Some(WorkerMessage::Failed { worker, error }) => {
                    warn!(worker, ?error, "worker failed");
                    return Err(ExecutorError::Worker {
                        worker,
                        source: error,
                    });
                }
                None => {
                    return Err(ExecutorError::Disconnected {
                        completed: batches.len(),
                        expected: self.expected,
                    })
                }
            }
        }
        Ok(batches)
    }
}

impl Drop for Dispatch {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition;
    use futures::executor::block_on;
    use shoebox_types::{GameResult, SimulationConfig};
    use std::time::{Duration, Instant};

    fn config() -> SimulationConfig {
        SimulationConfig {
            plays: 3,
            games_per_play: 7,
            hands_per_game: 30,
            skip_card: 2,
            ..Default::default()
        }
    }

    fn sorted_games(batches: Vec<Batch>) -> Vec<GameResult> {
        let mut games: Vec<GameResult> = batches.into_iter().flat_map(|b| b.games).collect();
        games.sort_by_key(|g| g.unit());
        games
    }

    #[test]
    fn test_collects_every_game() {
        let executor = Executor::new(4).unwrap();
        assert_eq!(executor.threads(), 4);

        let config = config();
        let chunks = partition::plan(&config, executor.threads());
        let dispatch = executor.dispatch(chunks, RunSettings::new(&config, 5, false));
        assert_eq!(dispatch.workers(), 4);

        let mut skipped = 0;
        let mut dealt = 0;
        let batches = block_on(dispatch.collect(|_, report| match report {
            Report::Skipped { cards, .. } => {
                assert_eq!(cards.len(), 2);
                skipped += 1;
            }
            Report::Dealt(_) => dealt += 1,
        }))
        .unwrap();

        let games = sorted_games(batches);
        assert_eq!(games.len(), 21);
        assert_eq!(skipped, 21);
        assert_eq!(dealt, 21);
        assert_eq!(games[0].unit(), WorkUnit::new(1, 1));
        assert_eq!(games[20].unit(), WorkUnit::new(3, 7));
        assert!(games.iter().all(|g| g.tally.total_hands == 30));
    }

    #[test]
    fn test_pool_size_does_not_change_results() {
        let config = config();
        let run = |threads| {
            let executor = Executor::new(threads).unwrap();
            let chunks = partition::plan(&config, executor.threads());
            let dispatch = executor.dispatch(chunks, RunSettings::new(&config, 5, true));
            sorted_games(block_on(dispatch.collect(|_, _| {})).unwrap())
        };
        assert_eq!(run(1), run(3));
    }

    struct Fixed(Result<Batch, GameError>);

    impl Job for Fixed {
        fn execute(self: Box<Self>, _: &AtomicBool, _: ReportSink<'_>) -> Result<Batch, GameError> {
            self.0
        }
    }

    struct Panics;

    impl Job for Panics {
        fn execute(self: Box<Self>, _: &AtomicBool, _: ReportSink<'_>) -> Result<Batch, GameError> {
            panic!("boom")
        }
    }

    /// Runs until cancelled, then records that it saw the cancellation.
    struct UntilCancelled(Arc<AtomicBool>);

    impl Job for UntilCancelled {
        fn execute(
            self: Box<Self>,
            cancel: &AtomicBool,
            _: ReportSink<'_>,
        ) -> Result<Batch, GameError> {
            let deadline = Instant::now() + Duration::from_secs(10);
            while !cancel.load(Ordering::Relaxed) && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            self.0.store(cancel.load(Ordering::Relaxed), Ordering::SeqCst);
            Err(GameError::Cancelled)
        }
    }

    fn wait_for(flag: &AtomicBool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if flag.load(Ordering::SeqCst) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_worker_error_is_fatal() {
        let executor = Executor::new(2).unwrap();
        let dispatch = executor.dispatch_jobs(vec![
            Box::new(Fixed(Ok(Batch::default()))) as Box<dyn Job>,
            Box::new(Fixed(Err(GameError::DeckExhausted))),
        ]);
        let err = block_on(dispatch.collect(|_, _| {})).unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::Worker {
                worker: 1,
                source: WorkerError::Game(GameError::DeckExhausted)
            }
        ));
    }

    #[test]
    fn test_failure_cancels_remaining_workers() {
        let executor = Executor::new(2).unwrap();
        let stopped = Arc::new(AtomicBool::new(false));
        let dispatch = executor.dispatch_jobs(vec![
            Box::new(Fixed(Err(GameError::DeckExhausted))) as Box<dyn Job>,
            Box::new(UntilCancelled(stopped.clone())),
        ]);
        assert!(block_on(dispatch.collect(|_, _| {})).is_err());
        assert!(wait_for(&stopped));
    }

    #[test]
    fn test_dropped_dispatch_cancels_workers() {
        let executor = Executor::new(1).unwrap();
        let stopped = Arc::new(AtomicBool::new(false));
        let dispatch =
            executor.dispatch_jobs(vec![Box::new(UntilCancelled(stopped.clone())) as Box<dyn Job>]);
        drop(dispatch);
        assert!(wait_for(&stopped));
    }

    #[test]
    fn test_worker_panic_is_caught() {
        let executor = Executor::new(1).unwrap();
        let dispatch = executor.dispatch_jobs(vec![Box::new(Panics) as Box<dyn Job>]);
        let err = block_on(dispatch.collect(|_, _| {})).unwrap_err();
        match err {
            ExecutorError::Worker {
                source: WorkerError::Panicked(message),
                ..
            } => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_dispatch() {
        let executor = Executor::new(1).unwrap();
        let dispatch = executor.dispatch(Vec::new(), RunSettings::new(&config(), 1, false));
        assert!(block_on(dispatch.collect(|_, _| {})).unwrap().is_empty());
    }
}
