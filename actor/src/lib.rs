// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runtime
//!
//! A typed actor runtime on top of tokio. Every actor runs in its own task and handles one
//! message at a time, so its state needs no locking.
//!
//! In response to a message, an actor can:
//! - update its private state,
//! - create child actors, which live under its path and stop with it,
//! - send messages to other actors, `tell` without waiting or `ask` for a response,
//! - publish events to its subscribers,
//! - watch another actor and be told when it terminates,
//! - schedule a message to itself after a delay.
//!
//! ## Addressing
//!
//! Root actors live under `/user`; a child appends its name to the path of its parent. The
//! [`SystemRef`] keeps a registry of live actors by path, so any actor can be looked up with
//! `get_actor` while it runs. An [`ActorRef`] identifies one actor instance: a reference kept
//! after its actor stopped never addresses a new actor created later at the same path.
//!
//! ## Lifecycle
//!
//! `pre_start` runs before the first message; messages sent meanwhile wait in the mailbox. If
//! it fails, the root actor applies its [`SupervisionStrategy`] and a child reports the failure
//! to its parent. Stopping an actor stops its children first, then runs `post_stop`, and
//! finally closes the mailbox, which is what watchers and `ActorRef::closed` observe.
//!
//! ```ignore
//! let (system, mut runner) = ActorSystem::create(CancellationToken::new());
//! tokio::spawn(async move { runner.run().await });
//!
//! let counter = system.create_root_actor("counter", Counter::default()).await?;
//! counter.tell(CounterCommand::Add(5)).await?;
//! let value = counter.ask(CounterCommand::Get).await?;
//! ```
//!

mod actor;
mod error;
mod handler;
mod path;
mod runner;
mod sink;
mod supervision;
mod system;

pub use actor::{
    Actor, ActorContext, ActorRef, ChildAction, Event, Handler, Message,
    Response,
};
pub use error::Error;
pub use path::ActorPath;
pub use sink::{Sink, Subscriber};
pub use supervision::{
    ExponentialBackoffStrategy, FixedIntervalStrategy, NoIntervalStrategy,
    RetryStrategy, Strategy, SupervisionStrategy,
};
pub use system::{ActorSystem, SystemEvent, SystemRef, SystemRunner};

pub use tokio_util::sync::CancellationToken;
