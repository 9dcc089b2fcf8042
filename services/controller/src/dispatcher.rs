//! Partitioned dispatcher.
//!
//! Owns a fixed number of lanes. Each event is routed by a stable hash of its
//! identity, so every event for one pod address lands on the same lane and is
//! handled by that lane's single worker in submission order. Lane mailboxes
//! are bounded: a full lane suspends the submitter rather than dropping.
//!
//! ```text
//! submit(event) ──lane_for(identity)──▶ lane k mailbox ──▶ LaneWorker k ──▶ Reconcile
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use podeip_events::Event;
use podeip_reconcile::{Reconcile, DEFAULT_RECONCILE_TIMEOUT};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::actors::{self, ActorError, ActorHandle};
use crate::lane::{CommitPolicy, LaneStats, LaneWorker};

/// Default number of lanes.
pub const DEFAULT_LANES: usize = 16;

/// Default per-lane queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Dispatch errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Configuration rejected at construction.
    #[error("invalid dispatcher configuration: {0}")]
    InvalidConfig(String),

    /// The target lane has stopped and can no longer accept events.
    #[error("lane {0} is closed")]
    LaneClosed(usize),

    /// The target lane is full (non-blocking submit only).
    #[error("lane {0} is full")]
    LaneFull(usize),
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of lanes (and workers).
    pub lanes: usize,

    /// Bounded queue capacity per lane.
    pub queue_capacity: usize,

    /// Upper bound for a single reconcile call.
    pub reconcile_timeout: Duration,

    /// Commit policy for failed transitions.
    pub commit_policy: CommitPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            lanes: DEFAULT_LANES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            commit_policy: CommitPolicy::default(),
        }
    }
}

/// Select the lane for an identity.
///
/// IP identities map by their numeric value, so consecutive pod addresses
/// spread evenly across lanes. Anything else is hashed.
pub fn lane_for(identity: &str, lanes: usize) -> usize {
    let lanes = lanes.max(1) as u64;
    let key = match identity.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => u64::from(u32::from(v4)),
        Ok(IpAddr::V6(v6)) => {
            let bits = u128::from(v6);
            (bits as u64) ^ ((bits >> 64) as u64)
        }
        Err(_) => {
            let mut hasher = DefaultHasher::new();
            identity.hash(&mut hasher);
            hasher.finish()
        }
    };
    (key % lanes) as usize
}

/// Fixed pool of ordered lanes.
pub struct Dispatcher {
    lanes: Vec<ActorHandle<Event>>,
    workers: Vec<JoinHandle<LaneWorker>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Dispatcher {
    /// Spawn one worker per lane.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &DispatcherConfig,
        reconciler: Arc<dyn Reconcile>,
    ) -> Result<Self, DispatchError> {
        if config.lanes == 0 {
            return Err(DispatchError::InvalidConfig(
                "lane count must be positive".to_string(),
            ));
        }
        if config.queue_capacity == 0 {
            return Err(DispatchError::InvalidConfig(
                "queue capacity must be positive".to_string(),
            ));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut lanes = Vec::with_capacity(config.lanes);
        let mut workers = Vec::with_capacity(config.lanes);

        for lane in 0..config.lanes {
            let worker = LaneWorker::new(
                lane,
                Arc::clone(&reconciler),
                config.reconcile_timeout,
                config.commit_policy,
            );
            let (handle, task) = actors::spawn(worker, config.queue_capacity, shutdown_rx.clone());
            lanes.push(handle);
            workers.push(task);
        }

        info!(
            lanes = config.lanes,
            queue_capacity = config.queue_capacity,
            reconcile_timeout_ms = config.reconcile_timeout.as_millis() as u64,
            commit_policy = ?config.commit_policy,
            "Dispatcher started"
        );

        Ok(Self {
            lanes,
            workers,
            shutdown_tx,
        })
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Lane that events for `identity` are routed to.
    pub fn lane_of(&self, identity: &str) -> usize {
        lane_for(identity, self.lanes.len())
    }

    /// Enqueue an event on its lane, waiting while the lane is full.
    ///
    /// Returns the lane index.
    pub async fn submit(&self, event: Event) -> Result<usize, DispatchError> {
        let lane = self.lane_of(event.identity());
        let handle = &self.lanes[lane];

        debug!(lane, event = %event, "Submitting event");
        handle.send(event).await.map_err(|e| lane_error(lane, e))?;
        Ok(lane)
    }

    /// Enqueue an event without waiting.
    pub fn try_submit(&self, event: Event) -> Result<usize, DispatchError> {
        let lane = self.lane_of(event.identity());
        self.lanes[lane]
            .try_send(event)
            .map_err(|e| lane_error(lane, e))?;
        Ok(lane)
    }

    /// Stop all lanes immediately, dropping queued events.
    pub fn halt(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Close every lane, let workers drain what is already queued, and
    /// return per-lane statistics.
    pub async fn shutdown(self) -> Vec<LaneStats> {
        let Self { lanes, workers, .. } = self;
        drop(lanes);

        let mut stats = Vec::with_capacity(workers.len());
        for task in workers {
            match task.await {
                Ok(worker) => stats.push(worker.stats()),
                Err(e) => error!(error = %e, "Lane worker panicked"),
            }
        }

        info!(
            lanes = stats.len(),
            processed = stats.iter().map(|s| s.processed).sum::<u64>(),
            "Dispatcher stopped"
        );
        stats
    }
}

fn lane_error(lane: usize, error: ActorError) -> DispatchError {
    match error {
        ActorError::MailboxFull => DispatchError::LaneFull(lane),
        ActorError::ActorStopped => DispatchError::LaneClosed(lane),
    }
}
