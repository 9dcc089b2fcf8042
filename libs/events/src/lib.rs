//! # podeip-events
//!
//! Pod lifecycle snapshots and the reconciliation events derived from them.
//!
//! ## Design Principles
//!
//! - A snapshot is the raw, schemaless pod object delivered by the watch layer
//! - An [`Event`] is the normalized unit of work for one pod address lease
//! - Translation is pure: it never performs I/O and never logs
//!
//! ## Annotations
//!
//! Pods opt in with:
//! - `service.beta.kubernetes.io/aws-eip-pod-controller-type: auto`
//! - `service.beta.kubernetes.io/aws-eip-pod-controller-shield: advanced` (optional)

mod error;
mod snapshot;
mod translate;
mod types;

pub use error::TranslateError;
pub use snapshot::PodSnapshot;
pub use translate::{translate, SkipReason, Translation};
pub use types::*;
