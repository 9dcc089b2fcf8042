//! Core actor framework types and traits.
//!
//! Provides the building blocks the dispatcher runs its lanes on:
//! - `Actor` trait for defining actor behavior
//! - `ActorHandle` for sending messages to actors (bounded, with backpressure)
//! - `spawn` to start an actor loop on the tokio runtime

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

// =============================================================================
// Core Traits
// =============================================================================

/// Marker trait for actor messages.
pub trait Message: Send + Debug + 'static {}

impl<T: Send + Debug + 'static> Message for T {}

/// The Actor trait defines behavior for an actor.
///
/// Actors:
/// - Process messages one at a time (no internal concurrency)
/// - Own mutable state not shared with other actors
/// - Communicate only via message passing
#[async_trait]
pub trait Actor: Send + 'static {
    /// The message type this actor handles.
    type Message: Message;

    /// Actor name for logging.
    fn name(&self) -> &str;

    /// Handle a single message.
    async fn handle(&mut self, msg: Self::Message, ctx: &mut ActorContext);

    /// Called before the first message is handled.
    async fn on_start(&mut self, _ctx: &mut ActorContext) {}

    /// Called when the actor is about to stop.
    async fn on_stop(&mut self, _ctx: &mut ActorContext) {}
}

/// Context provided to actors during message handling.
pub struct ActorContext {
    /// Actor's unique ID.
    pub actor_id: String,

    /// Shutdown signal receiver.
    pub shutdown: watch::Receiver<bool>,

    /// Message counter.
    pub messages_processed: u64,
}

impl ActorContext {
    /// Create a new actor context.
    pub fn new(actor_id: String, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            actor_id,
            shutdown,
            messages_processed: 0,
        }
    }

    /// Check if shutdown has been signaled.
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors returned when sending to an actor.
#[derive(Debug, Error)]
pub enum ActorError {
    /// Actor mailbox is full.
    #[error("mailbox full")]
    MailboxFull,

    /// Actor has stopped.
    #[error("actor stopped")]
    ActorStopped,
}

// =============================================================================
// Actor Handle
// =============================================================================

/// Handle for sending messages to an actor.
#[derive(Debug, Clone)]
pub struct ActorHandle<M: Message> {
    /// Sender for the actor's mailbox.
    tx: mpsc::Sender<M>,
}

impl<M: Message> ActorHandle<M> {
    /// Send a message to the actor, waiting for mailbox space.
    pub async fn send(&self, msg: M) -> Result<(), ActorError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| ActorError::ActorStopped)
    }

    /// Try to send a message without blocking.
    pub fn try_send(&self, msg: M) -> Result<(), ActorError> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ActorError::MailboxFull,
            mpsc::error::TrySendError::Closed(_) => ActorError::ActorStopped,
        })
    }
}

// =============================================================================
// Spawning
// =============================================================================

/// Spawn an actor with a bounded mailbox.
///
/// The actor stops when `shutdown` flips to `true` (pending messages are
/// dropped) or when every handle is dropped (pending messages are drained
/// first). The join handle yields the actor back so callers can inspect its
/// final state.
pub fn spawn<A>(
    actor: A,
    mailbox_size: usize,
    shutdown: watch::Receiver<bool>,
) -> (ActorHandle<A::Message>, JoinHandle<A>)
where
    A: Actor,
{
    let actor_id = format!("{}_{}", actor.name(), generate_actor_id());
    let (tx, rx) = mpsc::channel(mailbox_size);

    debug!(actor_id = %actor_id, mailbox_size, "Spawning actor");

    let task = tokio::spawn(run_actor_loop(actor, rx, shutdown, actor_id));

    (ActorHandle { tx }, task)
}

// =============================================================================
// Actor Loop
// =============================================================================

/// Run the main actor loop.
async fn run_actor_loop<A: Actor>(
    mut actor: A,
    mut rx: mpsc::Receiver<A::Message>,
    mut shutdown: watch::Receiver<bool>,
    actor_id: String,
) -> A {
    let mut ctx = ActorContext::new(actor_id.clone(), shutdown.clone());

    actor.on_start(&mut ctx).await;
    debug!(actor_id = %actor_id, "Actor started");

    // A dropped shutdown sender means nobody can stop us that way any more.
    let mut watching = !*shutdown.borrow();

    while watching || !ctx.is_shutdown() {
        tokio::select! {
            biased;

            // Check shutdown first
            changed = shutdown.changed(), if watching => {
                match changed {
                    Ok(()) if *shutdown.borrow() => {
                        info!(actor_id = %actor_id, "Actor received shutdown signal");
                        break;
                    }
                    Ok(()) => {}
                    Err(_) => watching = false,
                }
            }

            msg = rx.recv() => {
                let Some(msg) = msg else {
                    debug!(actor_id = %actor_id, "Actor mailbox closed");
                    break;
                };

                ctx.messages_processed += 1;
                actor.handle(msg, &mut ctx).await;
            }
        }
    }

    actor.on_stop(&mut ctx).await;

    info!(
        actor_id = %actor_id,
        messages_processed = ctx.messages_processed,
        "Actor stopped"
    );
    actor
}

// =============================================================================
// Helpers
// =============================================================================

static ACTOR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_actor_id() -> u64 {
    ACTOR_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collector {
        seen: Vec<u32>,
        started: bool,
        stopped: bool,
    }

    #[async_trait]
    impl Actor for Collector {
        type Message = u32;

        fn name(&self) -> &str {
            "collector"
        }

        async fn handle(&mut self, msg: u32, _ctx: &mut ActorContext) {
            self.seen.push(msg);
        }

        async fn on_start(&mut self, _ctx: &mut ActorContext) {
            self.started = true;
        }

        async fn on_stop(&mut self, _ctx: &mut ActorContext) {
            self.stopped = true;
        }
    }

    #[tokio::test]
    async fn test_actor_handle_send() {
        let (tx, mut rx) = mpsc::channel::<u32>(16);
        let handle = ActorHandle { tx };

        handle.send(7).await.unwrap();

        assert_eq!(rx.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_try_send_reports_full_and_closed() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        let handle = ActorHandle { tx };

        handle.try_send(1).unwrap();
        assert!(matches!(handle.try_send(2), Err(ActorError::MailboxFull)));

        drop(rx);
        assert!(matches!(handle.try_send(3), Err(ActorError::ActorStopped)));
    }

    #[tokio::test]
    async fn test_closed_mailbox_drains_pending_messages() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (handle, task) = spawn(Collector::default(), 8, shutdown_rx);

        for n in 0..6 {
            handle.send(n).await.unwrap();
        }
        drop(handle);

        let actor = task.await.unwrap();
        assert_eq!(actor.seen, vec![0, 1, 2, 3, 4, 5]);
        assert!(actor.started);
        assert!(actor.stopped);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_actor() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (handle, task) = spawn(Collector::default(), 8, shutdown_rx);

        shutdown_tx.send(true).unwrap();

        let actor = task.await.unwrap();
        assert!(actor.stopped);
        assert!(matches!(handle.send(1).await, Err(ActorError::ActorStopped)));
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_keeps_actor_running() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (handle, task) = spawn(Collector::default(), 8, shutdown_rx);
        drop(shutdown_tx);

        handle.send(9).await.unwrap();
        drop(handle);

        let actor = task.await.unwrap();
        assert_eq!(actor.seen, vec![9]);
    }
}
