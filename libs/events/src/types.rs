//! Event and notification types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::snapshot::PodSnapshot;

// =============================================================================
// Constants
// =============================================================================

/// Annotation that opts a pod into address attachment.
pub const ANNOTATION_EIP_TYPE: &str = "service.beta.kubernetes.io/aws-eip-pod-controller-type";

/// Value of [`ANNOTATION_EIP_TYPE`] that enables attachment.
pub const EIP_TYPE_AUTO: &str = "auto";

/// Annotation that selects the shield protection level.
pub const ANNOTATION_SHIELD: &str = "service.beta.kubernetes.io/aws-eip-pod-controller-shield";

/// Value of [`ANNOTATION_SHIELD`] that enables advanced protection.
pub const SHIELD_ADVANCED: &str = "advanced";

/// Pod phase in which a pod may own an address.
pub const PHASE_RUNNING: &str = "Running";

// =============================================================================
// Event
// =============================================================================

/// Desired address state for one pod lease.
///
/// `wants_shield_advanced` is only ever true together with `wants_address`;
/// the constructors enforce this.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    identity: String,
    version: String,
    wants_address: bool,
    wants_shield_advanced: bool,
}

impl Event {
    /// Build an event, clearing the shield flag when no address is wanted.
    pub fn new(
        identity: impl Into<String>,
        version: impl Into<String>,
        wants_address: bool,
        wants_shield_advanced: bool,
    ) -> Self {
        Self {
            identity: identity.into(),
            version: version.into(),
            wants_address,
            wants_shield_advanced: wants_address && wants_shield_advanced,
        }
    }

    /// An event requesting an attached address.
    pub fn attach(identity: impl Into<String>, version: impl Into<String>, shield: bool) -> Self {
        Self::new(identity, version, true, shield)
    }

    /// An event requesting that any address be released.
    pub fn detach(identity: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(identity, version, false, false)
    }

    /// Pod address used as the dispatch key.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Opaque resource version token.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn wants_address(&self) -> bool {
        self.wants_address
    }

    pub fn wants_shield_advanced(&self) -> bool {
        self.wants_shield_advanced
    }

    /// True when both events carry the same version token.
    pub fn same_version(&self, other: &Event) -> bool {
        self.version == other.version
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let desired = match (self.wants_address, self.wants_shield_advanced) {
            (true, true) => "attach+shield",
            (true, false) => "attach",
            (false, _) => "detach",
        };
        write!(f, "{}@{} {}", self.identity, self.version, desired)
    }
}

// =============================================================================
// Actions and notifications
// =============================================================================

/// Lifecycle action reported by the watch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[serde(alias = "add")]
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn is_delete(self) -> bool {
        matches!(self, Self::Delete)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" | "add" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}

/// A single lifecycle notification in wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub action: Action,

    /// Current pod object.
    pub object: PodSnapshot,

    /// Pod object before the change (updates only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_object: Option<PodSnapshot>,
}

// =============================================================================
// Tests
// =============================================================================
