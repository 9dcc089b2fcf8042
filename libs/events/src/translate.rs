//! Translation of raw lifecycle notifications into events.
//!
//! Rules, applied in order:
//! 1. A pod whose phase is present and not `Running` is skipped.
//! 2. A pod without a usable `status.podIP` is skipped.
//! 3. Deletes always produce a detach event.
//! 4. Creates and updates produce an attach event when the type annotation is
//!    `auto`, a detach event when it was `auto` on the previous snapshot and
//!    no longer is, and nothing otherwise.
//!
//! `metadata.resourceVersion` is only required once an event is emitted.

use std::fmt;

use crate::error::TranslateError;
use crate::snapshot::PodSnapshot;
use crate::types::{
    Action, Event, ANNOTATION_EIP_TYPE, ANNOTATION_SHIELD, EIP_TYPE_AUTO, PHASE_RUNNING,
    SHIELD_ADVANCED,
};

/// Outcome of translating one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// Dispatch this event.
    Emit(Event),

    /// Nothing to reconcile.
    Skip(SkipReason),
}

impl Translation {
    /// The emitted event, if any.
    pub fn into_event(self) -> Option<Event> {
        match self {
            Translation::Emit(event) => Some(event),
            Translation::Skip(_) => None,
        }
    }
}

/// Why a notification produced no event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Pod is not running yet (or any more).
    NotRunning(String),

    /// `status.podIP` is present but empty.
    EmptyPodIp,

    /// `status.podIP` is absent.
    MissingPodIp,

    /// Pod never opted in, so there is nothing to undo.
    NotOptedIn,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotRunning(phase) => write!(f, "phase {}", phase),
            SkipReason::EmptyPodIp => write!(f, "pod IP is empty"),
            SkipReason::MissingPodIp => write!(f, "pod IP is missing"),
            SkipReason::NotOptedIn => write!(f, "pod is not opted in"),
        }
    }
}

/// Translate a lifecycle notification into at most one event.
pub fn translate(
    current: &PodSnapshot,
    previous: Option<&PodSnapshot>,
    action: Action,
) -> Result<Translation, TranslateError> {
    if let Some(phase) = current.phase()? {
        if phase != PHASE_RUNNING {
            return Ok(Translation::Skip(SkipReason::NotRunning(phase.to_string())));
        }
    }

    let pod_ip = match current.pod_ip()? {
        Some("") => return Ok(Translation::Skip(SkipReason::EmptyPodIp)),
        Some(ip) => ip,
        None => return Ok(Translation::Skip(SkipReason::MissingPodIp)),
    };

    let attach = !action.is_delete() && wants_eip(current);
    let detach = action.is_delete() || previous.is_some_and(wants_eip);
    if !attach && !detach {
        return Ok(Translation::Skip(SkipReason::NotOptedIn));
    }

    let version = current
        .resource_version()?
        .ok_or(TranslateError::MissingField("metadata.resourceVersion"))?;

    if attach {
        let shield = current.annotation(ANNOTATION_SHIELD) == Some(SHIELD_ADVANCED);
        return Ok(Translation::Emit(Event::attach(pod_ip, version, shield)));
    }
    Ok(Translation::Emit(Event::detach(pod_ip, version)))
}

fn wants_eip(pod: &PodSnapshot) -> bool {
    pod.annotation(ANNOTATION_EIP_TYPE) == Some(EIP_TYPE_AUTO)
}
