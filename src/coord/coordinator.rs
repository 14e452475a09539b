//! Coordinator - seats the philosophers, starts the broadcaster and drives
//! shutdown.
//!
//! Shutdown is cooperative. `request_stop` raises the terminate flag and runs
//! one promotion sweep; philosophers notice the flag at the top of their next
//! think phase. A philosopher that is hungry when the stop arrives is not
//! interrupted: it is woken by the normal promotion path once its neighbors
//! put their forks down, eats one last time and then leaves.

use crate::broadcast::{Observer, SnapshotBroadcaster};
use crate::core::config::TableConfig;
use crate::core::delay::{DelayPolicy, UniformDelay};
use crate::core::errors::{DiningError, Result};
use crate::philosopher::Philosopher;
use crate::table::{Arbiter, ArbiterStats, RunControl, Snapshot, StateStore};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{error, info};
use uuid::Uuid;

/// Builds and starts a simulation
pub struct Coordinator {
    config: TableConfig,
    observers: Vec<Arc<dyn Observer>>,
    delays: Option<Arc<dyn DelayPolicy>>,
}

impl Coordinator {
    pub fn new(config: TableConfig) -> Self {
        Self {
            config,
            observers: Vec::new(),
            delays: None,
        }
    }

    /// Default timings with `actors` philosophers
    pub fn for_actors(actors: usize) -> Self {
        Self::new(TableConfig {
            actors,
            ..Default::default()
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_observers(mut self, observers: impl IntoIterator<Item = Arc<dyn Observer>>) -> Self {
        self.observers.extend(observers);
        self
    }

    /// Replace the configured uniform think/eat delays
    pub fn with_delay_policy(mut self, delays: Arc<dyn DelayPolicy>) -> Self {
        self.delays = Some(delays);
        self
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Seat everybody and start the broadcaster.
    ///
    /// Returns only after every philosopher has entered its loop. An invalid
    /// configuration is rejected before anything is spawned.
    pub async fn start(self) -> Result<SimulationHandle> {
        self.config.validate()?;

        let run_id = Uuid::new_v4();
        let actors = self.config.actors;
        info!(%run_id, actors, "starting simulation");

        let control = Arc::new(RunControl::new());
        let store = Arc::new(StateStore::new(actors, control.clone())?);
        let arbiter = Arc::new(Arbiter::new(store.clone()));
        let delays: Arc<dyn DelayPolicy> = match self.delays {
            Some(delays) => delays,
            None => Arc::new(UniformDelay::from_config(&self.config)),
        };

        let seated = Arc::new(Barrier::new(actors + 1));
        let philosophers: Vec<JoinHandle<u64>> = (0..actors)
            .map(|id| {
                let philosopher =
                    Philosopher::new(id, arbiter.clone(), control.clone(), delays.clone())
                        .with_barrier(seated.clone());
                tokio::spawn(philosopher.run())
            })
            .collect();

        seated.wait().await;
        info!(%run_id, "all philosophers seated");

        let broadcaster = tokio::spawn(SnapshotBroadcaster::new(store, self.observers).run());

        Ok(SimulationHandle {
            run_id,
            stop: StopHandle { control, arbiter },
            philosophers,
            broadcaster,
            started_at: Instant::now(),
            shutdown_timeout: self.config.shutdown_timeout,
        })
    }
}

/// Cloneable handle that can request a stop from anywhere
#[derive(Clone)]
pub struct StopHandle {
    control: Arc<RunControl>,
    arbiter: Arc<Arbiter>,
}

impl StopHandle {
    /// Raise the terminate flag. Later calls are no-ops.
    pub async fn request_stop(&self) {
        if !self.control.request_terminate() {
            return;
        }
        info!("stop requested");
        // Every hungry philosopher already has an eating neighbor here, so
        // this normally promotes nobody; it makes the drain independent of
        // that invariant.
        let promoted = self.arbiter.sweep().await;
        if promoted > 0 {
            info!(promoted, "final sweep promoted waiting philosophers");
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.control.is_terminated()
    }
}

/// Outcome of a finished simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownReport {
    pub run_id: Uuid,
    /// Meals per philosopher as counted by the philosophers themselves
    pub meals: Vec<u64>,
    pub stats: ArbiterStats,
    pub snapshots_published: u64,
    pub elapsed: Duration,
}

impl ShutdownReport {
    pub fn total_meals(&self) -> u64 {
        self.meals.iter().sum()
    }
}

/// A running simulation
pub struct SimulationHandle {
    run_id: Uuid,
    stop: StopHandle,
    philosophers: Vec<JoinHandle<u64>>,
    broadcaster: JoinHandle<u64>,
    started_at: Instant,
    shutdown_timeout: Option<Duration>,
}

impl SimulationHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn actors(&self) -> usize {
        self.philosophers.len()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub async fn request_stop(&self) {
        self.stop.request_stop().await;
    }

    pub fn arbiter(&self) -> &Arc<Arbiter> {
        &self.stop.arbiter
    }

    /// Current states, copied under the table lock
    pub async fn snapshot(&self) -> Snapshot {
        self.stop.arbiter.store().snapshot(0).await
    }

    /// Wait for every philosopher and the broadcaster to finish.
    ///
    /// Does not stop the simulation by itself; call `request_stop` first (or
    /// from a `StopHandle`). A failed task is fatal: the rest of the
    /// simulation is stopped and aborted and the failure is returned.
    pub async fn await_shutdown(self) -> Result<ShutdownReport> {
        let mut aborts: Vec<AbortHandle> =
            self.philosophers.iter().map(|h| h.abort_handle()).collect();
        aborts.push(self.broadcaster.abort_handle());

        let stop = self.stop.clone();
        let run_id = self.run_id;
        let started_at = self.started_at;
        let join = join_all_tasks(self.philosophers, self.broadcaster, stop.clone());

        let (meals, snapshots_published) = match self.shutdown_timeout {
            Some(limit) => match tokio::time::timeout(limit, join).await {
                Ok(result) => result,
                Err(_) => {
                    let err = DiningError::timeout("await_shutdown", limit.as_millis() as u64);
                    error!(%run_id, category = err.category(), error = %err, "shutdown timed out");
                    Err(err)
                }
            },
            None => join.await,
        }
        .map_err(|e| {
            for abort in &aborts {
                abort.abort();
            }
            e
        })?;

        let report = ShutdownReport {
            run_id,
            meals,
            stats: stop.arbiter.stats(),
            snapshots_published,
            elapsed: started_at.elapsed(),
        };
        info!(
            %run_id,
            meals = report.total_meals(),
            snapshots = report.snapshots_published,
            "shutdown complete"
        );
        Ok(report)
    }
}

/// Task spawned by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskId {
    Philosopher(usize),
    Broadcaster,
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Philosopher(id) => write!(f, "philosopher-{}", id),
            TaskId::Broadcaster => write!(f, "broadcaster"),
        }
    }
}

async fn labelled(
    task: TaskId,
    handle: JoinHandle<u64>,
) -> (TaskId, std::result::Result<u64, JoinError>) {
    (task, handle.await)
}

/// Collect every task as it finishes. The first failure stops the
/// simulation and is returned right away, whichever task it came from.
async fn join_all_tasks(
    philosophers: Vec<JoinHandle<u64>>,
    broadcaster: JoinHandle<u64>,
    stop: StopHandle,
) -> Result<(Vec<u64>, u64)> {
    let mut meals = vec![0; philosophers.len()];
    let mut published = 0;

    let mut pending: FuturesUnordered<_> = philosophers
        .into_iter()
        .enumerate()
        .map(|(id, handle)| labelled(TaskId::Philosopher(id), handle))
        .collect();
    pending.push(labelled(TaskId::Broadcaster, broadcaster));

    while let Some((task, result)) = pending.next().await {
        match (task, result) {
            (TaskId::Philosopher(id), Ok(count)) => meals[id] = count,
            (TaskId::Broadcaster, Ok(count)) => published = count,
            (task, Err(e)) => {
                let err = DiningError::task_join(task.to_string(), e);
                error!(%task, category = err.category(), error = %err, "task failed, stopping simulation");
                stop.request_stop().await;
                return Err(err);
            }
        }
    }

    Ok((meals, published))
}
