//! Reconciliation boundary for pod addresses.
//!
//! The dispatch engine hands each accepted [`Event`] to a [`Reconcile`]
//! implementation which converges two external resources:
//!
//! - **Address**: an elastic IP associated with the pod's private address.
//! - **Shield**: advanced DDoS protection on that elastic IP.
//!
//! # Invariants
//!
//! - All service calls are idempotent
//! - Plans are deterministic given the same `(previous, current)` pair
//! - Shield is enabled only after the address is attached and disabled
//!   before it is detached

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use podeip_events::Event;
use thiserror::Error;
use tracing::{debug, info};

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Timeout waiting for the external service.
    #[error("timeout after {elapsed:?} waiting for {resource}")]
    Timeout {
        resource: String,
        elapsed: Duration,
    },

    /// Resource not found.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The external service rejected or failed the call.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Default upper bound for a single reconcile call.
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Capability interfaces
// =============================================================================

/// Elastic IP association for a pod address.
#[async_trait]
pub trait AddressService: Send + Sync {
    /// Ensure an elastic IP is associated with `identity`.
    async fn attach(&self, identity: &str) -> Result<(), ReconcileError>;

    /// Ensure no elastic IP is associated with `identity`.
    async fn detach(&self, identity: &str) -> Result<(), ReconcileError>;
}

/// Advanced shield protection for the elastic IP of a pod address.
#[async_trait]
pub trait ShieldService: Send + Sync {
    async fn enable_advanced(&self, identity: &str) -> Result<(), ReconcileError>;

    async fn disable_advanced(&self, identity: &str) -> Result<(), ReconcileError>;
}

/// Converges external state to match `current`.
///
/// `previous` is the last event successfully applied for the same identity,
/// or `None` when nothing is known about it.
#[async_trait]
pub trait Reconcile: Send + Sync {
    async fn reconcile(&self, previous: Option<&Event>, current: &Event)
        -> Result<(), ReconcileError>;
}

// =============================================================================
// Planning
// =============================================================================

/// A single external call needed to converge one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AttachAddress,
    DetachAddress,
    EnableShield,
    DisableShield,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::AttachAddress => "attach_address",
            Step::DetachAddress => "detach_address",
            Step::EnableShield => "enable_shield",
            Step::DisableShield => "disable_shield",
        };
        write!(f, "{}", s)
    }
}

/// Compute the steps that move `previous` to `current`.
///
/// Without a previous event the plan converges from an unknown state, so a
/// detach also clears any shield that may be left over.
pub fn plan(previous: Option<&Event>, current: &Event) -> Vec<Step> {
    let Some(previous) = previous else {
        return match (current.wants_address(), current.wants_shield_advanced()) {
            (true, true) => vec![Step::AttachAddress, Step::EnableShield],
            (true, false) => vec![Step::AttachAddress],
            (false, _) => vec![Step::DisableShield, Step::DetachAddress],
        };
    };

    let mut steps = Vec::new();
    match (previous.wants_address(), current.wants_address()) {
        (true, true) => {
            match (previous.wants_shield_advanced(), current.wants_shield_advanced()) {
                (false, true) => steps.push(Step::EnableShield),
                (true, false) => steps.push(Step::DisableShield),
                _ => {}
            }
        }
        (true, false) => {
            if previous.wants_shield_advanced() {
                steps.push(Step::DisableShield);
            }
            steps.push(Step::DetachAddress);
        }
        (false, true) => {
            steps.push(Step::AttachAddress);
            if current.wants_shield_advanced() {
                steps.push(Step::EnableShield);
            }
        }
        (false, false) => {}
    }
    steps
}

// =============================================================================
// Resource reconciler
// =============================================================================

/// [`Reconcile`] implementation that executes a [`plan`] against an address
/// service and a shield service, stopping at the first failing step.
#[derive(Clone)]
pub struct ResourceReconciler {
    addresses: Arc<dyn AddressService>,
    shields: Arc<dyn ShieldService>,
}

impl ResourceReconciler {
    pub fn new(addresses: Arc<dyn AddressService>, shields: Arc<dyn ShieldService>) -> Self {
        Self { addresses, shields }
    }

    async fn apply(&self, step: Step, identity: &str) -> Result<(), ReconcileError> {
        match step {
            Step::AttachAddress => self.addresses.attach(identity).await,
            Step::DetachAddress => self.addresses.detach(identity).await,
            Step::EnableShield => self.shields.enable_advanced(identity).await,
            Step::DisableShield => self.shields.disable_advanced(identity).await,
        }
    }
}

#[async_trait]
impl Reconcile for ResourceReconciler {
    async fn reconcile(
        &self,
        previous: Option<&Event>,
        current: &Event,
    ) -> Result<(), ReconcileError> {
        let steps = plan(previous, current);
        if steps.is_empty() {
            debug!(identity = %current.identity(), "Nothing to reconcile");
            return Ok(());
        }

        for step in &steps {
            debug!(identity = %current.identity(), step = %step, "Applying step");
            self.apply(*step, current.identity()).await?;
        }

        info!(
            identity = %current.identity(),
            version = %current.version(),
            steps = steps.len(),
            "Reconciled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Mutex;

    fn attached(shield: bool) -> Event {
        Event::attach("10.0.0.5", "1", shield)
    }

    fn detached() -> Event {
        Event::detach("10.0.0.5", "1")
    }

    #[rstest]
    #[case::create_plain(None, attached(false), vec![Step::AttachAddress])]
    #[case::create_shielded(None, attached(true), vec![Step::AttachAddress, Step::EnableShield])]
    #[case::create_detached(None, detached(), vec![Step::DisableShield, Step::DetachAddress])]
    #[case::unchanged(Some(attached(true)), attached(true), vec![])]
    #[case::shield_on(Some(attached(false)), attached(true), vec![Step::EnableShield])]
    #[case::shield_off(Some(attached(true)), attached(false), vec![Step::DisableShield])]
    #[case::detach_plain(Some(attached(false)), detached(), vec![Step::DetachAddress])]
    #[case::detach_shielded(Some(attached(true)), detached(), vec![Step::DisableShield, Step::DetachAddress])]
    #[case::reattach(Some(detached()), attached(true), vec![Step::AttachAddress, Step::EnableShield])]
    #[case::still_detached(Some(detached()), detached(), vec![])]
    fn test_plan(
        #[case] previous: Option<Event>,
        #[case] current: Event,
        #[case] expected: Vec<Step>,
    ) {
        assert_eq!(plan(previous.as_ref(), &current), expected);
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Step>>,
        fail_on: Option<Step>,
    }

    impl Recorder {
        fn record(&self, step: Step) -> Result<(), ReconcileError> {
            self.calls.lock().unwrap().push(step);
            if self.fail_on == Some(step) {
                return Err(ReconcileError::Unavailable(step.to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AddressService for Recorder {
        async fn attach(&self, _identity: &str) -> Result<(), ReconcileError> {
            self.record(Step::AttachAddress)
        }

        async fn detach(&self, _identity: &str) -> Result<(), ReconcileError> {
            self.record(Step::DetachAddress)
        }
    }

    #[async_trait]
    impl ShieldService for Recorder {
        async fn enable_advanced(&self, _identity: &str) -> Result<(), ReconcileError> {
            self.record(Step::EnableShield)
        }

        async fn disable_advanced(&self, _identity: &str) -> Result<(), ReconcileError> {
            self.record(Step::DisableShield)
        }
    }

    #[tokio::test]
    async fn test_reconciler_applies_plan_in_order() {
        let recorder = Arc::new(Recorder::default());
        let reconciler = ResourceReconciler::new(recorder.clone(), recorder.clone());

        reconciler
            .reconcile(Some(&attached(true)), &detached())
            .await
            .unwrap();

        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec![Step::DisableShield, Step::DetachAddress]
        );
    }

    #[tokio::test]
    async fn test_reconciler_stops_at_first_failure() {
        let recorder = Arc::new(Recorder {
            fail_on: Some(Step::AttachAddress),
            ..Default::default()
        });
        let reconciler = ResourceReconciler::new(recorder.clone(), recorder.clone());

        let result = reconciler.reconcile(None, &attached(true)).await;

        assert!(matches!(result, Err(ReconcileError::Unavailable(_))));
        assert_eq!(*recorder.calls.lock().unwrap(), vec![Step::AttachAddress]);
    }
}
