//! In-memory cloud backend.
//!
//! Implements the address and shield services against an in-process
//! allocation table scoped to one [`NetworkContext`]. Used as the dry-run
//! backend of the binary and as the service double in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use podeip_reconcile::{AddressService, ReconcileError, ShieldService};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::imds::NetworkContext;

/// One recorded service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudCall {
    Attach(String),
    Detach(String),
    EnableShield(String),
    DisableShield(String),
}

/// An elastic IP associated with a pod address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub allocation_id: String,
    pub public_ip: String,
    pub shield_advanced: bool,
}

/// Address and shield services backed by memory.
pub struct InMemoryCloud {
    context: NetworkContext,
    allocations: Mutex<HashMap<String, Allocation>>,
    calls: Mutex<Vec<CloudCall>>,
    allocation_counter: AtomicU64,
    failing: AtomicBool,
}

impl InMemoryCloud {
    pub fn new(context: NetworkContext) -> Self {
        Self {
            context,
            allocations: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            allocation_counter: AtomicU64::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn context(&self) -> &NetworkContext {
        &self.context
    }

    /// Current allocation for a pod address.
    pub async fn allocation(&self, identity: &str) -> Option<Allocation> {
        self.allocations.lock().await.get(identity).cloned()
    }

    pub async fn is_attached(&self, identity: &str) -> bool {
        self.allocations.lock().await.contains_key(identity)
    }

    pub async fn is_shielded(&self, identity: &str) -> bool {
        self.allocations
            .lock()
            .await
            .get(identity)
            .is_some_and(|a| a.shield_advanced)
    }

    /// Every call received so far, in order.
    pub async fn calls(&self) -> Vec<CloudCall> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: CloudCall) -> Result<(), ReconcileError> {
        debug!(call = ?call, context = %self.context, "[DRY-RUN] Cloud call");
        self.calls.lock().await.push(call);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReconcileError::Unavailable(
                "in-memory cloud configured to fail".to_string(),
            ));
        }
        Ok(())
    }

    fn next_allocation(&self) -> Allocation {
        let n = self.allocation_counter.fetch_add(1, Ordering::SeqCst);
        Allocation {
            allocation_id: format!("eipalloc-{:017x}", n),
            // 198.18.0.0/15 is reserved for benchmarking and never routed.
            public_ip: format!("198.18.{}.{}", (n >> 8) & 0xff, n & 0xff),
            shield_advanced: false,
        }
    }
}

#[async_trait]
impl AddressService for InMemoryCloud {
    async fn attach(&self, identity: &str) -> Result<(), ReconcileError> {
        self.record(CloudCall::Attach(identity.to_string())).await?;

        let mut allocations = self.allocations.lock().await;
        if allocations.contains_key(identity) {
            return Ok(());
        }
        let allocation = self.next_allocation();
        info!(
            identity = %identity,
            allocation_id = %allocation.allocation_id,
            public_ip = %allocation.public_ip,
            vpc_id = %self.context.vpc_id,
            "[DRY-RUN] Associated elastic IP"
        );
        allocations.insert(identity.to_string(), allocation);
        Ok(())
    }

    async fn detach(&self, identity: &str) -> Result<(), ReconcileError> {
        self.record(CloudCall::Detach(identity.to_string())).await?;

        if let Some(allocation) = self.allocations.lock().await.remove(identity) {
            info!(
                identity = %identity,
                allocation_id = %allocation.allocation_id,
                "[DRY-RUN] Released elastic IP"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl ShieldService for InMemoryCloud {
    async fn enable_advanced(&self, identity: &str) -> Result<(), ReconcileError> {
        self.record(CloudCall::EnableShield(identity.to_string()))
            .await?;

        let mut allocations = self.allocations.lock().await;
        let allocation = allocations
            .get_mut(identity)
            .ok_or_else(|| ReconcileError::NotFound(format!("elastic IP for {}", identity)))?;
        if !allocation.shield_advanced {
            allocation.shield_advanced = true;
            info!(
                identity = %identity,
                allocation_id = %allocation.allocation_id,
                region = %self.context.region,
                "[DRY-RUN] Enabled advanced shield"
            );
        }
        Ok(())
    }

    async fn disable_advanced(&self, identity: &str) -> Result<(), ReconcileError> {
        self.record(CloudCall::DisableShield(identity.to_string()))
            .await?;

        if let Some(allocation) = self.allocations.lock().await.get_mut(identity) {
            if allocation.shield_advanced {
                allocation.shield_advanced = false;
                info!(
                    identity = %identity,
                    allocation_id = %allocation.allocation_id,
                    "[DRY-RUN] Disabled advanced shield"
                );
            }
        }
        Ok(())
    }
}
