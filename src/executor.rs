//! Single-threaded executor for delayed tasks.
//!
//! Each root webhook client owns one of these. The worker thread runs a
//! small `futures-lite` loop: it waits for either a new command on an
//! `async-channel` or the next timer, then runs every task that is due.
//! Tasks run one at a time, so anything they do (including blocking HTTP
//! calls) is naturally serialized.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use async_io::Timer;
use futures_lite::future;
use tracing::{debug, error, trace};

type Task = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Schedule { at: Instant, task: Task },
    /// Finish whatever is already scheduled, then exit.
    Shutdown,
    /// Drop everything that is scheduled and exit.
    Halt,
}

/// A task waiting for its due time. Ordered so that `BinaryHeap` pops the
/// earliest deadline first, and FIFO among equal deadlines.
struct Scheduled {
    at: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Returned by [`ScheduledExecutor::schedule`] after shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected;

/// Handle to the worker thread. Cheap to clone.
#[derive(Clone)]
pub struct ScheduledExecutor {
    commands: async_channel::Sender<Command>,
    shutdown: Arc<AtomicBool>,
}

impl ScheduledExecutor {
    /// Spawn the worker thread.
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (tx, rx) = async_channel::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker_name = name.clone();
        thread::Builder::new()
            .name(name)
            .spawn(move || run(worker_name, rx))?;

        Ok(Self {
            commands: tx,
            shutdown,
        })
    }

    /// Run `task` on the worker thread after `delay`.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> Result<(), Rejected>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(Rejected);
        }
        let at = Instant::now() + delay;
        self.commands
            .try_send(Command::Schedule {
                at,
                task: Box::new(task),
            })
            .map_err(|_| Rejected)
    }

    /// Stop accepting tasks. Already scheduled tasks still run.
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, AtomicOrdering::SeqCst) {
            let _ = self.commands.try_send(Command::Shutdown);
        }
    }

    /// Stop accepting tasks and discard the ones not yet started.
    pub fn shutdown_now(&self) {
        self.shutdown.store(true, AtomicOrdering::SeqCst);
        let _ = self.commands.try_send(Command::Halt);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(AtomicOrdering::SeqCst)
    }
}

impl std::fmt::Debug for ScheduledExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledExecutor")
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

fn run(name: String, commands: async_channel::Receiver<Command>) {
    debug!(executor = %name, "executor started");
    let mut heap: BinaryHeap<Scheduled> = BinaryHeap::new();
    let mut seq: u64 = 0;
    let mut draining = false;
    let mut disconnected = false;

    future::block_on(async {
        loop {
            run_due(&name, &mut heap);

            if (draining || disconnected) && heap.is_empty() {
                break;
            }

            let next = heap.peek().map(|task| task.at);
            let command = match next {
                Some(at) if disconnected => {
                    Timer::at(at).await;
                    None
                }
                Some(at) => {
                    future::or(async { Some(commands.recv().await) }, async {
                        Timer::at(at).await;
                        None
                    })
                    .await
                }
                None => Some(commands.recv().await),
            };

            match command {
                // Timer fired; loop around and run what is due.
                None => {}
                Some(Ok(Command::Schedule { at, task })) => {
                    seq += 1;
                    heap.push(Scheduled { at, seq, task });
                }
                Some(Ok(Command::Shutdown)) => draining = true,
                Some(Ok(Command::Halt)) => {
                    trace!(executor = %name, dropped = heap.len(), "halting executor");
                    heap.clear();
                    break;
                }
                // Every handle is gone; nothing can be scheduled any more.
                Some(Err(_)) => disconnected = true,
            }
        }
    });

    debug!(executor = %name, "executor stopped");
}

fn run_due(name: &str, heap: &mut BinaryHeap<Scheduled>) {
    let now = Instant::now();
    while heap.peek().is_some_and(|task| task.at <= now) {
        let Some(scheduled) = heap.pop() else { break };
        if let Err(panic) = catch_unwind(AssertUnwindSafe(scheduled.task)) {
            let reason = panic_reason(panic.as_ref());
            error!(executor = %name, reason = %reason, "unhandled panic in scheduled task");
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_reason(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
