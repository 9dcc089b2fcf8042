//! Actor framework for the controller.
//!
//! A lightweight actor runtime tailored to the dispatch engine: every lane is
//! one actor with a bounded mailbox, so ordering, ownership and backpressure
//! all come from the mailbox.
//!
//! ## Design Principles
//!
//! - **One consumer per mailbox**: messages are handled strictly in order
//! - **Owned state**: an actor's state is never shared with siblings
//! - **Bounded mailboxes**: senders wait for space instead of dropping
//! - **Isolation**: a slow actor never blocks its siblings

mod framework;

pub use framework::{spawn, Actor, ActorContext, ActorError, ActorHandle, Message};
