//! Inbound lifecycle callback.
//!
//! The watch layer calls [`Handler::on_lifecycle_event`] for every pod
//! add/update/delete. The handler translates the notification and submits the
//! resulting event to the dispatcher. Submission may suspend while the target
//! lane is full.

use std::sync::Arc;

use podeip_events::{translate, Action, Notification, PodSnapshot, TranslateError, Translation};
use podeip_reconcile::ResourceReconciler;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::cloud::InMemoryCloud;
use crate::config::Config;
use crate::dispatcher::{DispatchError, Dispatcher};
use crate::imds::{self, ImdsError};
use crate::lane::LaneStats;

/// Errors returned to the watch layer.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The notification could not be read; it was discarded.
    #[error("translation failed: {0}")]
    Translate(#[from] TranslateError),

    /// The event could not be enqueued.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to resolve network context: {0}")]
    Context(#[from] ImdsError),

    #[error("failed to start dispatcher: {0}")]
    Dispatcher(#[from] DispatchError),
}

/// Entry point for lifecycle notifications.
pub struct Handler {
    dispatcher: Dispatcher,
}

impl Handler {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Resolve the network context, build the cloud backend and start the
    /// dispatcher.
    pub async fn bootstrap(config: &Config) -> Result<(Self, Arc<InMemoryCloud>), BootstrapError> {
        let context = imds::resolve(
            config.vpc_id.as_deref(),
            config.region.as_deref(),
            &config.imds_url,
        )
        .await?;
        info!(vpc_id = %context.vpc_id, region = %context.region, "Network context resolved");

        let cloud = Arc::new(InMemoryCloud::new(context));
        let reconciler = ResourceReconciler::new(cloud.clone(), cloud.clone());
        let dispatcher = Dispatcher::start(&config.dispatcher(), Arc::new(reconciler))?;

        Ok((Self::new(dispatcher), cloud))
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle one lifecycle notification.
    #[instrument(skip_all, fields(action = %action, pod = %current.name()))]
    pub async fn on_lifecycle_event(
        &self,
        current: &PodSnapshot,
        previous: Option<&PodSnapshot>,
        action: Action,
    ) -> Result<(), HandlerError> {
        let translation = translate(current, previous, action).map_err(|e| {
            warn!(
                namespace = %current.namespace(),
                uid = %current.uid(),
                error = %e,
                "Discarding malformed notification"
            );
            e
        })?;

        let event = match translation {
            Translation::Emit(event) => event,
            Translation::Skip(reason) => {
                debug!(
                    namespace = %current.namespace(),
                    reason = %reason,
                    "Ignoring notification"
                );
                return Ok(());
            }
        };

        let lane = self.dispatcher.submit(event.clone()).await?;
        info!(event = %event, lane, "Event queued");
        Ok(())
    }

    /// Handle a notification in wire form.
    pub async fn handle_notification(&self, notification: &Notification) -> Result<(), HandlerError> {
        self.on_lifecycle_event(
            &notification.object,
            notification.old_object.as_ref(),
            notification.action,
        )
        .await
    }

    /// Drain the lanes and stop the workers.
    pub async fn shutdown(self) -> Vec<LaneStats> {
        self.dispatcher.shutdown().await
    }
}
