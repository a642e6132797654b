// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor
//!
//! The `actor` module provides the `Actor` trait and the `ActorRef` type. The `Actor` trait is the
//! main trait that actors must implement. The `ActorRef` type is a reference to an actor that can
//! be used to send messages to him.
//!

use crate::{
    ActorPath, Error,
    handler::HandleHelper,
    runner::{InnerAction, InnerSender, StopSender},
    supervision::SupervisionStrategy,
    system::SystemRef,
};

use tokio::{
    select,
    sync::{broadcast::Receiver as EventReceiver, mpsc, oneshot},
};
use tokio_util::sync::CancellationToken;

use async_trait::async_trait;

use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use std::{fmt::Debug, time::Duration};

/// Execution context handed to an actor on every hook and message.
///
/// Through the context an actor reaches the system, its own reference, its children,
/// the event bus, the termination watch and the scheduler.
pub struct ActorContext<A: Actor + Handler<A>> {
    /// Stop channel of this actor.
    stop: StopSender,
    /// The path of the actor.
    path: ActorPath,
    /// The actor system.
    system: SystemRef,
    /// Error in the actor, blocks message handling until cleared.
    error: Option<Error>,
    /// Sender handed to children so they can report errors and faults.
    error_sender: ChildErrorSender,
    /// Inner channel of the actor runner.
    inner_sender: InnerSender<A>,
    /// Stop channels of the children.
    child_senders: Vec<StopSender>,
    /// Cancelled when the actor terminates; parent of watch and timer tasks.
    token: CancellationToken,
}

impl<A> ActorContext<A>
where
    A: Actor + Handler<A>,
{
    pub(crate) fn new(
        stop: StopSender,
        path: ActorPath,
        system: SystemRef,
        error_sender: ChildErrorSender,
        inner_sender: InnerSender<A>,
    ) -> Self {
        Self {
            stop,
            path,
            system,
            error: None,
            error_sender,
            inner_sender,
            child_senders: Vec::new(),
            token: CancellationToken::new(),
        }
    }

    pub(crate) async fn restart(
        &mut self,
        actor: &mut A,
        error: Option<&Error>,
    ) -> Result<(), Error> {
        actor.pre_restart(self, error).await
    }

    /// Reference to the actor owning this context.
    pub async fn reference(&self) -> Option<ActorRef<A>> {
        self.system.get_actor(&self.path).await
    }

    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    pub fn system(&self) -> &SystemRef {
        &self.system
    }

    /// Stops every child and waits for each of them to finish.
    pub(crate) async fn stop_childs(&mut self) {
        while let Some(sender) = self.child_senders.pop() {
            let (stop_sender, stop_receiver) = oneshot::channel();
            if sender.send(Some(stop_sender)).await.is_ok() {
                let _ = stop_receiver.await;
            }
        }
    }

    pub(crate) async fn remove_actor(&self) {
        self.system.remove_actor(&self.path).await;
    }

    /// Cancels the watch and timer tasks spawned by this actor.
    pub(crate) fn cancel_tasks(&self) {
        self.token.cancel();
    }

    /// Asks the runner to stop this actor once the current turn ends.
    pub async fn stop(&self, sender: Option<oneshot::Sender<()>>) {
        debug!("Stopping actor {} from context.", self.path);
        let _ = self.stop.send(sender).await;
    }

    /// Publishes an event to the subscribers of this actor.
    pub async fn publish_event(&self, event: A::Event) -> Result<(), Error> {
        self.inner_sender
            .send(InnerAction::Event(event))
            .map_err(|e| Error::SendEvent(e.to_string()))
    }

    /// Reports a fault. Message handling is suspended until the parent decides: the actor
    /// stops, or resumes if the parent answers `ChildAction::Resume`. Root actors always stop.
    pub async fn emit_fail(&mut self, error: Error) -> Result<(), Error> {
        self.set_error(error.clone());
        self.inner_sender
            .send(InnerAction::Fail(error))
            .map_err(|e| Error::Send(e.to_string()))
    }

    /// Creates a child actor at `<self path>/<name>` and waits until it has started.
    ///
    /// # Errors
    ///
    /// `Error::Exists` if a live actor already has that path, `Error::Start` if the child
    /// failed to start.
    ///
    pub async fn create_child<C>(
        &mut self,
        name: &str,
        actor: C,
    ) -> Result<ActorRef<C>, Error>
    where
        C: Actor + Handler<C>,
    {
        let path = self.path.clone() / name;
        let (actor_ref, stop_sender) = self
            .system
            .create_actor_path(path, actor, Some(self.error_sender.clone()))
            .await?;
        self.child_senders.retain(|sender| !sender.is_closed());
        self.child_senders.push(stop_sender);
        Ok(actor_ref)
    }

    /// Retrieves a live child by name.
    pub async fn get_child<C>(&self, name: &str) -> Option<ActorRef<C>>
    where
        C: Actor + Handler<C>,
    {
        let path = self.path.clone() / name;
        self.system.get_actor(&path).await
    }

    /// Watches `target`: when it terminates, `Handler::on_terminated` is called on this
    /// actor with the target path, within a regular turn. Watching an actor that already
    /// terminated notifies immediately.
    pub fn watch<W>(&self, target: &ActorRef<W>)
    where
        W: Actor + Handler<W>,
    {
        let target = target.clone();
        let inner_sender = self.inner_sender.clone();
        let token = self.token.clone();
        debug!("Actor {} watching {}.", self.path, target.path());
        tokio::spawn(async move {
            select! {
                _ = token.cancelled() => {}
                _ = target.closed() => {
                    let _ = inner_sender.send(InnerAction::Terminated(target.path()));
                }
            }
        });
    }

    /// Delivers `message` to this actor after `delay`.
    ///
    /// The returned token cancels the delivery. Pending deliveries are dropped when the
    /// actor terminates.
    ///
    /// # Errors
    ///
    /// `Error::Send` if the actor can no longer be addressed.
    ///
    pub async fn schedule_once(
        &self,
        delay: Duration,
        message: A::Message,
    ) -> Result<CancellationToken, Error> {
        let Some(myself) = self.reference().await else {
            return Err(Error::Send(format!(
                "Can't schedule message, actor {} not found",
                self.path
            )));
        };
        let token = self.token.child_token();
        let cancel = token.clone();
        tokio::spawn(async move {
            select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = myself.tell(message).await {
                        debug!("Scheduled message not delivered: {}", e);
                    }
                }
            }
        });
        Ok(token)
    }

    pub(crate) fn error(&self) -> Option<Error> {
        self.error.clone()
    }

    pub(crate) fn set_error(&mut self, error: Error) {
        self.error = Some(error);
    }

    pub(crate) fn clean_error(&mut self) {
        self.error = None;
    }
}

/// The lifecycle of an actor.
#[derive(Debug, Clone, PartialEq)]
pub enum ActorLifecycle {
    Created,
    Started,
    Restarted,
    Failed,
    Stopped,
    Terminated,
}

/// Decision of a parent about a faulty child.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildAction {
    /// The child stops and its path is released.
    Stop,
    /// The child clears the fault and keeps handling messages.
    Resume,
}

pub(crate) type ChildErrorReceiver = mpsc::UnboundedReceiver<ChildFault>;

pub(crate) type ChildErrorSender = mpsc::UnboundedSender<ChildFault>;

/// Fault reported by a child to its parent, with the channel for the decision.
pub struct ChildFault {
    pub error: Error,
    pub sender: oneshot::Sender<ChildAction>,
}

/// The `Actor` trait is the main trait that actors must implement.
///
/// The hooks run inside the actor task; `pre_start` completes before the first message is
/// handled, so anything sent to the actor meanwhile waits in its mailbox.
#[async_trait]
pub trait Actor: Send + Sync + Sized + 'static + Handler<Self> {
    /// The type of messages this actor can receive.
    type Message: Message;

    /// The type of events this actor can publish.
    type Event: Event;

    /// The type of response this actor can send.
    type Response: Response;

    /// Strategy applied when `pre_start` fails on a root actor.
    fn supervision_strategy() -> SupervisionStrategy {
        SupervisionStrategy::Stop
    }

    async fn pre_start(
        &mut self,
        _context: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }

    async fn pre_restart(
        &mut self,
        ctx: &mut ActorContext<Self>,
        _error: Option<&Error>,
    ) -> Result<(), Error> {
        self.pre_start(ctx).await
    }

    async fn pre_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }

    async fn post_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// Events published by actors.
pub trait Event:
    Serialize + DeserializeOwned + Debug + Clone + Send + Sync + 'static
{
}

/// Messages accepted by actors.
pub trait Message: Clone + Send + Sync + 'static {}

/// Responses returned by actors.
pub trait Response: Send + Sync + 'static {}

impl Message for String {}
impl Event for String {}
impl Response for String {}

impl Event for () {}
impl Response for () {}

impl<T: Response> Response for Option<T> {}

impl Message for Vec<String> {}
impl Response for usize {}
impl Response for i64 {}

/// Message handling of an actor.
#[async_trait]
pub trait Handler<A: Actor + Handler<A>>: Send + Sync {
    /// Handles one message. The result is returned to the asker, if any.
    async fn handle_message(
        &mut self,
        sender: ActorPath,
        msg: A::Message,
        ctx: &mut ActorContext<A>,
    ) -> Result<A::Response, Error>;

    /// Called for each event published by this actor, before it reaches subscribers.
    async fn on_event(&mut self, _event: A::Event, _ctx: &mut ActorContext<A>) {}

    /// Called when an actor watched with `ActorContext::watch` has terminated.
    async fn on_terminated(
        &mut self,
        path: ActorPath,
        _ctx: &mut ActorContext<A>,
    ) {
        debug!("Watched actor {} terminated.", path);
    }

    /// Decides the fate of a child that reported a fault.
    async fn on_child_fault(
        &mut self,
        error: Error,
        _ctx: &mut ActorContext<A>,
    ) -> ChildAction {
        debug!("Handling fault: {:?}", error);
        ChildAction::Stop
    }
}

/// Actor reference.
///
/// Two references are equal when they address the same actor instance: same path and same
/// mailbox. A reference kept after its actor stopped is not equal to the reference of a new
/// actor created later at the same path.
pub struct ActorRef<A>
where
    A: Actor + Handler<A>,
{
    path: ActorPath,
    sender: HandleHelper<A>,
    event_receiver: EventReceiver<<A as Actor>::Event>,
    stop_sender: StopSender,
}

impl<A> ActorRef<A>
where
    A: Actor + Handler<A>,
{
    pub(crate) fn new(
        path: ActorPath,
        sender: HandleHelper<A>,
        stop_sender: StopSender,
        event_receiver: EventReceiver<<A as Actor>::Event>,
    ) -> Self {
        Self {
            path,
            sender,
            stop_sender,
            event_receiver,
        }
    }

    /// Sends a message without waiting for the response.
    pub async fn tell(&self, message: A::Message) -> Result<(), Error> {
        self.sender.tell(self.path(), message).await
    }

    /// Sends a message and waits for the response.
    pub async fn ask(&self, message: A::Message) -> Result<A::Response, Error> {
        self.sender.ask(self.path(), message).await
    }

    /// Stops the actor and waits until it has stopped.
    pub async fn ask_stop(&self) -> Result<(), Error> {
        debug!("Stopping actor {} from handle reference.", self.path);
        let (response_sender, response_receiver) = oneshot::channel();
        if self.stop_sender.send(Some(response_sender)).await.is_err() {
            Ok(())
        } else {
            response_receiver
                .await
                .map_err(|error| Error::Send(error.to_string()))
        }
    }

    /// Stops the actor without waiting.
    pub async fn tell_stop(&self) {
        debug!("Stopping actor {} from handle reference.", self.path);
        let _ = self.stop_sender.send(None).await;
    }

    pub fn path(&self) -> ActorPath {
        self.path.clone()
    }

    /// True once the actor has terminated.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Resolves once the actor has terminated.
    pub async fn closed(&self) {
        self.sender.closed().await;
    }

    /// Receiver of the events published by the actor.
    pub fn subscribe(&self) -> EventReceiver<<A as Actor>::Event> {
        self.event_receiver.resubscribe()
    }
}

impl<A> Clone for ActorRef<A>
where
    A: Actor + Handler<A>,
{
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            sender: self.sender.clone(),
            stop_sender: self.stop_sender.clone(),
            event_receiver: self.event_receiver.resubscribe(),
        }
    }
}

impl<A> PartialEq for ActorRef<A>
where
    A: Actor + Handler<A>,
{
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.sender.same_channel(&other.sender)
    }
}

impl<A> Eq for ActorRef<A> where A: Actor + Handler<A> {}

impl<A> Debug for ActorRef<A>
where
    A: Actor + Handler<A>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ActorRef").field(&self.path).finish()
    }
}
