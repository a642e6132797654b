// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Event-sourced actors
//!
//! An `EventSourced` behavior describes a persistent entity as three functions: a command
//! handler deciding what to do, an event handler folding events into state, and an optional
//! signal handler observing the lifecycle. `EventSourcedActor` runs a behavior as an actor:
//!
//! - while starting it replays the journal of the behavior's persistence id and folds every
//!   event from `empty_state`; commands sent meanwhile wait in the mailbox,
//! - once recovered it fires `Signal::RecoveryCompleted` and handles commands,
//! - events of an `Effect::Persist` are folded only after the journal stored all of them.
//!
//! The state is `None` until recovery completes. `Some(empty_state)` is an ordinary state, even
//! when the behavior models emptiness with a sentinel such as `Option::None`.
//!

use crate::{
    database::{Collection, DbManager},
    error::Error as StoreError,
    journal::{JOURNAL, Journal, JournalCommand, JournalResponse},
};

use actor::{
    Actor, ActorContext, ActorPath, ActorRef, Error as ActorError, Event,
    Handler, Message, Response, SupervisionStrategy,
};

use async_trait::async_trait;

use tracing::{debug, error};

use std::fmt::{self, Debug};

/// Name of the collection holding the journals.
pub const JOURNAL_COLLECTION: &str = "journal";

/// Identity of a persistent entity, and prefix of its journal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PersistenceId(String);

impl PersistenceId {
    pub fn of_unique_id(id: impl Into<String>) -> Self {
        PersistenceId(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersistenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a command handler decided.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect<E, R> {
    /// Store the events, fold them, then reply.
    Persist { events: Vec<E>, reply: Option<R> },
    Reply(R),
    None,
    Stop,
    StopWithReply(R),
}

impl<E, R> Effect<E, R> {
    pub fn persist(event: E) -> Self {
        Effect::Persist {
            events: vec![event],
            reply: None,
        }
    }

    pub fn persist_all(events: Vec<E>) -> Self {
        Effect::Persist {
            events,
            reply: None,
        }
    }

    pub fn reply(reply: R) -> Self {
        Effect::Reply(reply)
    }

    pub fn none() -> Self {
        Effect::None
    }

    pub fn stop() -> Self {
        Effect::Stop
    }

    pub fn stop_with_reply(reply: R) -> Self {
        Effect::StopWithReply(reply)
    }

    /// Attaches the reply sent once the effect has been applied.
    pub fn then_reply(self, reply: R) -> Self {
        match self {
            Effect::Persist { events, .. } => Effect::Persist {
                events,
                reply: Some(reply),
            },
            Effect::Stop | Effect::StopWithReply(_) => {
                Effect::StopWithReply(reply)
            }
            Effect::Reply(_) | Effect::None => Effect::Reply(reply),
        }
    }
}

/// Lifecycle signals delivered to `EventSourced::signal_handler`.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Replay finished; the state is the fully folded one.
    RecoveryCompleted,
    /// Replay failed; the actor will not handle commands.
    RecoveryFailed(ActorError),
    /// The actor stopped after a completed recovery.
    PostStop,
}

/// Behavior of a persistent entity.
pub trait EventSourced: Send + Sync + 'static {
    type Command: Message;
    type Event: Event;
    type State: Debug + Clone + Send + Sync + 'static;
    type Reply: Response;

    fn persistence_id(&self) -> PersistenceId;

    /// State before the first event.
    fn empty_state(&self) -> Self::State;

    fn command_handler(
        &self,
        state: &Self::State,
        command: Self::Command,
    ) -> Effect<Self::Event, Self::Reply>;

    /// Folds one event. Must not depend on anything but its arguments.
    fn event_handler(
        &self,
        state: Self::State,
        event: &Self::Event,
    ) -> Self::State;

    fn signal_handler(&self, _state: &Self::State, _signal: &Signal) {}

    /// Strategy applied when recovery fails on a root actor.
    fn supervision_strategy() -> SupervisionStrategy {
        SupervisionStrategy::Stop
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Recovering,
    Running,
    Stopped,
}

type CollectionFactory = Box<
    dyn Fn(&PersistenceId) -> Result<Box<dyn Collection>, StoreError>
        + Send
        + Sync,
>;

/// Actor running an `EventSourced` behavior over a journal.
pub struct EventSourcedActor<B: EventSourced> {
    behavior: B,
    state: Option<B::State>,
    phase: Phase,
    open_collection: CollectionFactory,
    password: Option<[u8; 32]>,
}

impl<B: EventSourced> EventSourcedActor<B> {
    /// Runs `behavior` with its journal stored through `manager`.
    pub fn new<C>(behavior: B, manager: impl DbManager<C> + 'static) -> Self
    where
        C: Collection + 'static,
    {
        let open_collection: CollectionFactory =
            Box::new(move |persistence_id: &PersistenceId| {
                let collection = manager
                    .create_collection(JOURNAL_COLLECTION, persistence_id.id())?;
                Ok(Box::new(collection) as Box<dyn Collection>)
            });
        Self {
            behavior,
            state: None,
            phase: Phase::Recovering,
            open_collection,
            password: None,
        }
    }

    /// Encrypts the journal with `password`.
    pub fn with_password(mut self, password: [u8; 32]) -> Self {
        self.password = Some(password);
        self
    }

    async fn journal(
        &self,
        ctx: &mut ActorContext<Self>,
    ) -> Result<ActorRef<Journal<B::Event>>, ActorError> {
        if let Some(journal) = ctx.get_child(JOURNAL).await {
            return Ok(journal);
        }
        let persistence_id = self.behavior.persistence_id();
        let collection = (self.open_collection)(&persistence_id)
            .map_err(|e| ActorError::Store(e.to_string()))?;
        let journal = Journal::new(collection, self.password)
            .map_err(|e| ActorError::Store(e.to_string()))?;
        ctx.create_child(JOURNAL, journal).await
    }

    async fn recover(
        &self,
        ctx: &mut ActorContext<Self>,
    ) -> Result<B::State, ActorError> {
        let journal = self.journal(ctx).await?;
        let events = match journal.ask(JournalCommand::Replay).await? {
            JournalResponse::Events(events) => events,
            JournalResponse::Error(e) => {
                return Err(ActorError::Recovery(e.to_string()));
            }
            other => {
                return Err(ActorError::Recovery(format!(
                    "Unexpected journal response: {:?}",
                    other
                )));
            }
        };
        let mut state = self.behavior.empty_state();
        for (sequence_nr, event) in events {
            debug!("Replaying event {}: {:?}", sequence_nr, event);
            state = self.behavior.event_handler(state, &event);
        }
        Ok(state)
    }

    async fn persist(
        &mut self,
        events: Vec<B::Event>,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), ActorError> {
        if events.is_empty() {
            return Ok(());
        }
        let appended = match self.journal(ctx).await {
            Ok(journal) => journal.ask(JournalCommand::Append(events.clone())).await,
            Err(e) => Err(e),
        };
        let error = match appended {
            Ok(JournalResponse::Appended(sequence_nr)) => {
                debug!(
                    "Persisted {} events up to {} for {}",
                    events.len(),
                    sequence_nr,
                    self.behavior.persistence_id()
                );
                for event in events {
                    if let Some(state) = self.state.take() {
                        self.state =
                            Some(self.behavior.event_handler(state, &event));
                    }
                    if let Err(e) = ctx.publish_event(event).await {
                        error!("Can't publish event: {}", e);
                    }
                }
                return Ok(());
            }
            Ok(JournalResponse::Error(e)) => ActorError::Store(e.to_string()),
            Ok(other) => ActorError::Store(format!(
                "Unexpected journal response: {:?}",
                other
            )),
            Err(e) => ActorError::Store(e.to_string()),
        };
        error!(
            "Can't persist events of {}: {}",
            self.behavior.persistence_id(),
            error
        );
        self.phase = Phase::Stopped;
        ctx.emit_fail(error.clone()).await?;
        Err(error)
    }

    async fn stop(&mut self, ctx: &mut ActorContext<Self>) {
        self.phase = Phase::Stopped;
        ctx.stop(None).await;
    }
}

#[async_trait]
impl<B: EventSourced> Actor for EventSourcedActor<B> {
    type Message = B::Command;
    type Event = B::Event;
    type Response = Option<B::Reply>;

    fn supervision_strategy() -> SupervisionStrategy {
        B::supervision_strategy()
    }

    async fn pre_start(
        &mut self,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), ActorError> {
        self.phase = Phase::Recovering;
        match self.recover(ctx).await {
            Ok(state) => {
                debug!("Recovered {}: {:?}", self.behavior.persistence_id(), state);
                self.behavior
                    .signal_handler(&state, &Signal::RecoveryCompleted);
                self.state = Some(state);
                self.phase = Phase::Running;
                Ok(())
            }
            Err(e) => {
                error!(
                    "Recovery of {} failed: {}",
                    self.behavior.persistence_id(),
                    e
                );
                let empty = self.behavior.empty_state();
                self.behavior
                    .signal_handler(&empty, &Signal::RecoveryFailed(e.clone()));
                Err(ActorError::Recovery(e.to_string()))
            }
        }
    }

    async fn post_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), ActorError> {
        if let Some(state) = &self.state {
            self.behavior.signal_handler(state, &Signal::PostStop);
        }
        self.phase = Phase::Stopped;
        Ok(())
    }
}

#[async_trait]
impl<B: EventSourced> Handler<EventSourcedActor<B>> for EventSourcedActor<B> {
    async fn handle_message(
        &mut self,
        _sender: ActorPath,
        msg: B::Command,
        ctx: &mut ActorContext<EventSourcedActor<B>>,
    ) -> Result<Option<B::Reply>, ActorError> {
        let Some(state) = self.state.as_ref().filter(|_| self.phase == Phase::Running)
        else {
            return Err(ActorError::Functional(format!(
                "{} is not running",
                self.behavior.persistence_id()
            )));
        };
        match self.behavior.command_handler(state, msg) {
            Effect::Persist { events, reply } => {
                self.persist(events, ctx).await?;
                Ok(reply)
            }
            Effect::Reply(reply) => Ok(Some(reply)),
            Effect::None => Ok(None),
            Effect::Stop => {
                self.stop(ctx).await;
                Ok(None)
            }
            Effect::StopWithReply(reply) => {
                self.stop(ctx).await;
                Ok(Some(reply))
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::memory::MemoryManager;

    use actor::ActorSystem;

    use serde::{Deserialize, Serialize};
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    struct Counter;

    #[derive(Debug, Clone)]
    enum CounterCommand {
        Add(i64),
        Get,
        Noop,
    }

    impl Message for CounterCommand {}

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Added(i64);

    impl Event for Added {}

    impl EventSourced for Counter {
        type Command = CounterCommand;
        type Event = Added;
        type State = i64;
        type Reply = i64;

        fn persistence_id(&self) -> PersistenceId {
            PersistenceId::of_unique_id("counter")
        }

        fn empty_state(&self) -> i64 {
            0
        }

        fn command_handler(
            &self,
            state: &i64,
            command: CounterCommand,
        ) -> Effect<Added, i64> {
            match command {
                CounterCommand::Add(value) => {
                    Effect::persist(Added(value)).then_reply(state + value)
                }
                CounterCommand::Get => Effect::reply(*state),
                CounterCommand::Noop => Effect::none(),
            }
        }

        fn event_handler(&self, state: i64, event: &Added) -> i64 {
            state + event.0
        }
    }

    #[test]
    fn test_effect_builders() {
        let effect: Effect<i64, i64> = Effect::stop().then_reply(1);
        assert_eq!(effect, Effect::StopWithReply(1));
        let effect: Effect<i64, i64> = Effect::persist_all(vec![1, 2]).then_reply(3);
        assert_eq!(
            effect,
            Effect::Persist {
                events: vec![1, 2],
                reply: Some(3)
            }
        );
        let effect: Effect<i64, i64> = Effect::none().then_reply(4);
        assert_eq!(effect, Effect::Reply(4));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_counter() {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let manager = MemoryManager::default();
        let counter = system
            .create_root_actor(
                "counter",
                EventSourcedActor::new(Counter, manager.clone()),
            )
            .await
            .unwrap();

        assert_eq!(counter.ask(CounterCommand::Add(2)).await.unwrap(), Some(2));
        assert_eq!(counter.ask(CounterCommand::Add(3)).await.unwrap(), Some(5));
        assert_eq!(counter.ask(CounterCommand::Noop).await.unwrap(), None);
        assert_eq!(counter.ask(CounterCommand::Get).await.unwrap(), Some(5));
        assert!(logs_contain("Persisted 1 events up to 2 for counter"));

        counter.ask_stop().await.unwrap();
        counter.closed().await;

        let counter = system
            .create_root_actor("counter", EventSourcedActor::new(Counter, manager))
            .await
            .unwrap();
        assert_eq!(counter.ask(CounterCommand::Get).await.unwrap(), Some(5));
    }
}
