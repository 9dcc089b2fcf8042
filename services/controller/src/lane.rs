//! Lane worker: the single sequential consumer of one dispatch lane.
//!
//! For every event the worker:
//! 1. Drops it if the last recorded event for the identity has the same version
//! 2. Runs the create path (`reconcile(None, event)`) for unknown identities
//!    and records the event only on success
//! 3. Runs the transition path (`reconcile(Some(previous), event)`) otherwise
//!    and records the event according to the [`CommitPolicy`]
//!
//! A failed transition may have applied some of its steps, so under
//! [`CommitPolicy::OnSuccess`] the identity is forgotten and the next event
//! for it converges through the create path.
//!
//! Every reconcile call is bounded by a timeout; a timeout is a failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use podeip_events::Event;
use podeip_reconcile::{Reconcile, ReconcileError};
use tracing::{debug, error, info, warn};

use crate::actors::{Actor, ActorContext};

/// When a transition result is recorded in lane state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CommitPolicy {
    /// Record only after the transition call succeeds. A failed transition
    /// forgets the identity, so a redelivery runs the full create path.
    #[default]
    OnSuccess,

    /// Record regardless of the transition call's outcome.
    Always,
}

/// What happened to a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Same version as the recorded event; nothing was called.
    Duplicate,
    /// Create path succeeded and the event was recorded.
    Created,
    /// Create path failed; nothing was recorded.
    CreateFailed,
    /// Transition path succeeded and the event was recorded.
    Transitioned,
    /// Transition path failed. `committed` tells whether the event was
    /// recorded anyway; otherwise the identity was forgotten.
    TransitionFailed { committed: bool },
}

/// Per-lane counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaneStats {
    pub lane: usize,
    pub processed: u64,
    pub duplicates: u64,
    pub created: u64,
    pub transitioned: u64,
    pub failed: u64,
    /// Identities with a recorded event.
    pub tracked: usize,
}

/// Sequential worker owning one lane's state.
pub struct LaneWorker {
    lane: usize,
    name: String,
    reconciler: Arc<dyn Reconcile>,
    timeout: Duration,
    commit_policy: CommitPolicy,
    /// Last successfully processed event per identity.
    state: HashMap<String, Event>,
    stats: LaneStats,
}

impl LaneWorker {
    pub fn new(
        lane: usize,
        reconciler: Arc<dyn Reconcile>,
        timeout: Duration,
        commit_policy: CommitPolicy,
    ) -> Self {
        Self {
            lane,
            name: format!("lane-{}", lane),
            reconciler,
            timeout,
            commit_policy,
            state: HashMap::new(),
            stats: LaneStats {
                lane,
                ..Default::default()
            },
        }
    }

    /// Last recorded event for `identity`.
    pub fn last_seen(&self, identity: &str) -> Option<&Event> {
        self.state.get(identity)
    }

    pub fn stats(&self) -> LaneStats {
        LaneStats {
            tracked: self.state.len(),
            ..self.stats.clone()
        }
    }

    /// Process one event.
    pub async fn process(&mut self, event: Event) -> Outcome {
        self.stats.processed += 1;

        let outcome = match self.state.get(event.identity()) {
            Some(previous) if previous.same_version(&event) => {
                debug!(
                    lane = self.lane,
                    identity = %event.identity(),
                    version = %event.version(),
                    "Duplicate version, skipping"
                );
                Outcome::Duplicate
            }
            Some(previous) => {
                let previous = previous.clone();
                self.transition(previous, event).await
            }
            None => self.create(event).await,
        };

        match outcome {
            Outcome::Duplicate => self.stats.duplicates += 1,
            Outcome::Created => self.stats.created += 1,
            Outcome::Transitioned => self.stats.transitioned += 1,
            Outcome::CreateFailed | Outcome::TransitionFailed { .. } => self.stats.failed += 1,
        }
        outcome
    }

    async fn create(&mut self, event: Event) -> Outcome {
        match self.call(None, &event).await {
            Ok(()) => {
                info!(lane = self.lane, event = %event, "Created");
                self.state.insert(event.identity().to_string(), event);
                Outcome::Created
            }
            Err(e) => {
                error!(
                    lane = self.lane,
                    event = %event,
                    error = %e,
                    "Create failed, waiting for redelivery"
                );
                Outcome::CreateFailed
            }
        }
    }

    async fn transition(&mut self, previous: Event, event: Event) -> Outcome {
        match self.call(Some(&previous), &event).await {
            Ok(()) => {
                info!(
                    lane = self.lane,
                    from = %previous,
                    to = %event,
                    "Transitioned"
                );
                self.state.insert(event.identity().to_string(), event);
                Outcome::Transitioned
            }
            Err(e) => {
                let committed = self.commit_policy == CommitPolicy::Always;
                warn!(
                    lane = self.lane,
                    from = %previous,
                    to = %event,
                    error = %e,
                    committed,
                    "Transition failed"
                );
                if committed {
                    self.state.insert(event.identity().to_string(), event);
                } else {
                    self.state.remove(event.identity());
                }
                Outcome::TransitionFailed { committed }
            }
        }
    }

    async fn call(&self, previous: Option<&Event>, event: &Event) -> Result<(), ReconcileError> {
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.reconciler.reconcile(previous, event)).await
        {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::Timeout {
                resource: event.identity().to_string(),
                elapsed: started.elapsed(),
            }),
        }
    }
}

#[async_trait]
impl Actor for LaneWorker {
    type Message = Event;

    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&mut self, event: Event, _ctx: &mut ActorContext) {
        self.process(event).await;
    }

    async fn on_start(&mut self, ctx: &mut ActorContext) {
        debug!(
            actor_id = %ctx.actor_id,
            lane = self.lane,
            timeout_ms = self.timeout.as_millis() as u64,
            commit_policy = ?self.commit_policy,
            "Lane started"
        );
    }

    async fn on_stop(&mut self, ctx: &mut ActorContext) {
        let stats = self.stats();
        info!(
            actor_id = %ctx.actor_id,
            lane = stats.lane,
            processed = stats.processed,
            duplicates = stats.duplicates,
            created = stats.created,
            transitioned = stats.transitioned,
            failed = stats.failed,
            tracked = stats.tracked,
            "Lane stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use podeip_reconcile::{AddressService, ResourceReconciler};

    use crate::cloud::InMemoryCloud;
    use crate::imds::NetworkContext;

    /// Address service whose detach can be made to fail.
    struct DetachFails {
        cloud: Arc<InMemoryCloud>,
        failing: AtomicBool,
    }

    #[async_trait]
    impl AddressService for DetachFails {
        async fn attach(&self, identity: &str) -> Result<(), ReconcileError> {
            self.cloud.attach(identity).await
        }

        async fn detach(&self, identity: &str) -> Result<(), ReconcileError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ReconcileError::Unavailable("detach rejected".to_string()));
            }
            self.cloud.detach(identity).await
        }
    }

    #[derive(Default)]
    struct Scripted {
        calls: Mutex<Vec<(Option<Event>, Event)>>,
        failing: AtomicBool,
        hang: bool,
    }

    impl Scripted {
        fn calls(&self) -> Vec<(Option<Event>, Event)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Reconcile for Scripted {
        async fn reconcile(
            &self,
            previous: Option<&Event>,
            current: &Event,
        ) -> Result<(), ReconcileError> {
            self.calls
                .lock()
                .unwrap()
                .push((previous.cloned(), current.clone()));
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(ReconcileError::Unavailable("scripted".to_string()));
            }
            Ok(())
        }
    }

    fn worker(reconciler: Arc<Scripted>, policy: CommitPolicy) -> LaneWorker {
        LaneWorker::new(0, reconciler, Duration::from_secs(5), policy)
    }

    #[tokio::test]
    async fn test_first_event_takes_create_path() {
        let reconciler = Arc::new(Scripted::default());
        let mut lane = worker(reconciler.clone(), CommitPolicy::OnSuccess);

        let event = Event::attach("10.0.0.5", "100", false);
        assert_eq!(lane.process(event.clone()).await, Outcome::Created);

        assert_eq!(reconciler.calls(), vec![(None, event.clone())]);
        assert_eq!(lane.last_seen("10.0.0.5"), Some(&event));
    }

    #[tokio::test]
    async fn test_same_version_is_duplicate() {
        let reconciler = Arc::new(Scripted::default());
        let mut lane = worker(reconciler.clone(), CommitPolicy::OnSuccess);

        let event = Event::attach("10.0.0.5", "100", false);
        lane.process(event.clone()).await;
        assert_eq!(lane.process(event).await, Outcome::Duplicate);

        assert_eq!(reconciler.calls().len(), 1);
        assert_eq!(lane.stats().duplicates, 1);
    }

    #[tokio::test]
    async fn test_new_version_takes_transition_path() {
        let reconciler = Arc::new(Scripted::default());
        let mut lane = worker(reconciler.clone(), CommitPolicy::OnSuccess);

        let attach = Event::attach("10.0.0.5", "100", false);
        let detach = Event::detach("10.0.0.5", "101");
        lane.process(attach.clone()).await;
        assert_eq!(lane.process(detach.clone()).await, Outcome::Transitioned);

        assert_eq!(reconciler.calls()[1], (Some(attach), detach.clone()));
        assert_eq!(lane.last_seen("10.0.0.5"), Some(&detach));
    }

    #[tokio::test]
    async fn test_failed_create_is_not_recorded() {
        let reconciler = Arc::new(Scripted::default());
        reconciler.failing.store(true, Ordering::SeqCst);
        let mut lane = worker(reconciler.clone(), CommitPolicy::OnSuccess);

        let event = Event::attach("10.0.0.5", "100", true);
        assert_eq!(lane.process(event.clone()).await, Outcome::CreateFailed);
        assert!(lane.last_seen("10.0.0.5").is_none());

        // Redelivery retries the full create.
        reconciler.failing.store(false, Ordering::SeqCst);
        assert_eq!(lane.process(event.clone()).await, Outcome::Created);
        assert_eq!(reconciler.calls(), vec![(None, event.clone()), (None, event)]);
    }

    #[tokio::test]
    async fn test_failed_transition_on_success_policy_forgets_identity() {
        let reconciler = Arc::new(Scripted::default());
        let mut lane = worker(reconciler.clone(), CommitPolicy::OnSuccess);

        let attach = Event::attach("10.0.0.5", "100", false);
        let shielded = Event::attach("10.0.0.5", "101", true);
        lane.process(attach.clone()).await;

        reconciler.failing.store(true, Ordering::SeqCst);
        assert_eq!(
            lane.process(shielded.clone()).await,
            Outcome::TransitionFailed { committed: false }
        );
        assert!(lane.last_seen("10.0.0.5").is_none());

        // Redelivery converges from scratch.
        reconciler.failing.store(false, Ordering::SeqCst);
        assert_eq!(lane.process(shielded.clone()).await, Outcome::Created);
        assert_eq!(reconciler.calls()[2], (None, shielded.clone()));
        assert_eq!(lane.last_seen("10.0.0.5"), Some(&shielded));
    }

    #[tokio::test]
    async fn test_partially_applied_transition_converges_on_next_event() {
        let cloud = Arc::new(InMemoryCloud::new(NetworkContext {
            vpc_id: "vpc-test".to_string(),
            region: "us-west-2".to_string(),
        }));
        let addresses = Arc::new(DetachFails {
            cloud: cloud.clone(),
            failing: AtomicBool::new(false),
        });
        let reconciler = Arc::new(ResourceReconciler::new(addresses.clone(), cloud.clone()));
        let mut lane = LaneWorker::new(
            0,
            reconciler,
            Duration::from_secs(5),
            CommitPolicy::OnSuccess,
        );

        let v1 = Event::attach("10.0.0.5", "1", true);
        assert_eq!(lane.process(v1).await, Outcome::Created);
        assert!(cloud.is_shielded("10.0.0.5").await);

        // Shield comes off, then the detach fails.
        addresses.failing.store(true, Ordering::SeqCst);
        let v2 = Event::detach("10.0.0.5", "2");
        assert_eq!(
            lane.process(v2).await,
            Outcome::TransitionFailed { committed: false }
        );
        assert!(cloud.is_attached("10.0.0.5").await);
        assert!(!cloud.is_shielded("10.0.0.5").await);

        addresses.failing.store(false, Ordering::SeqCst);
        let v3 = Event::attach("10.0.0.5", "3", true);
        assert_eq!(lane.process(v3).await, Outcome::Created);
        assert!(cloud.is_attached("10.0.0.5").await);
        assert!(cloud.is_shielded("10.0.0.5").await);
    }

    #[tokio::test]
    async fn test_failed_transition_always_policy_commits() {
        let reconciler = Arc::new(Scripted::default());
        let mut lane = worker(reconciler.clone(), CommitPolicy::Always);

        let attach = Event::attach("10.0.0.5", "100", false);
        let detach = Event::detach("10.0.0.5", "101");
        lane.process(attach).await;

        reconciler.failing.store(true, Ordering::SeqCst);
        assert_eq!(
            lane.process(detach.clone()).await,
            Outcome::TransitionFailed { committed: true }
        );
        assert_eq!(lane.last_seen("10.0.0.5"), Some(&detach));

        // The redelivery now looks like a duplicate.
        assert_eq!(lane.process(detach).await, Outcome::Duplicate);
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let reconciler = Arc::new(Scripted {
            hang: true,
            ..Default::default()
        });
        let mut lane = LaneWorker::new(
            3,
            reconciler.clone(),
            Duration::from_millis(20),
            CommitPolicy::OnSuccess,
        );

        let event = Event::attach("10.0.0.5", "100", false);
        assert_eq!(lane.process(event).await, Outcome::CreateFailed);
        assert!(lane.last_seen("10.0.0.5").is_none());

        let stats = lane.stats();
        assert_eq!(stats.lane, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.tracked, 0);
    }
}
