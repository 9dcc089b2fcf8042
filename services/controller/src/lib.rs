//! Pod EIP Controller Library
//!
//! Converges elastic IP association and advanced shield protection for pods
//! that opt in through annotations. Lifecycle notifications are translated
//! into events and dispatched onto a fixed set of ordered lanes.
//!
//! ## Architecture
//!
//! ```text
//! Handler (translate)
//! └── Dispatcher (lane_for(identity) % N)
//!     └── LaneWorker(k)  (dedup, reconcile, record last-seen)
//!         └── ResourceReconciler → AddressService + ShieldService
//! ```
//!
//! ## Modules
//!
//! - `actors`: Actor framework the lanes run on
//! - `dispatcher`: Lane routing and lifecycle
//! - `lane`: Per-lane sequential worker
//! - `handler`: Inbound callback and bootstrap
//! - `imds`: Network context discovery
//! - `cloud`: In-memory address and shield backend
//! - `feed`: JSON-lines notification source

pub mod actors;
pub mod cloud;
pub mod config;
pub mod dispatcher;
pub mod feed;
pub mod handler;
pub mod imds;
pub mod lane;

// Re-export commonly used types
pub use cloud::InMemoryCloud;
pub use dispatcher::{lane_for, DispatchError, Dispatcher, DispatcherConfig};
pub use handler::{BootstrapError, Handler, HandlerError};
pub use lane::{CommitPolicy, LaneStats, LaneWorker, Outcome};
