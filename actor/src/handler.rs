// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Mailbox
//!
//! Type-erased envelopes queued in an actor's mailbox, and the `HandleHelper` that every
//! `ActorRef` uses to put them there.
//!

use crate::{
    ActorPath, Error,
    actor::{Actor, ActorContext, Handler},
};

use async_trait::async_trait;

use tokio::sync::{mpsc, oneshot};

use tracing::{debug, error};

/// Something the actor runner can apply to an actor within one turn.
#[async_trait]
pub trait MessageHandler<A: Actor>: Send + Sync {
    async fn handle(&mut self, actor: &mut A, ctx: &mut ActorContext<A>);
}

/// Reply channel of an `ask`.
type Rsvp<A> = oneshot::Sender<Result<<A as Actor>::Response, Error>>;

/// A user message with its sender path and, for `ask`, the reply channel.
struct Envelope<A>
where
    A: Actor + Handler<A>,
{
    message: Option<A::Message>,
    sender: ActorPath,
    rsvp: Option<Rsvp<A>>,
}

#[async_trait]
impl<A> MessageHandler<A> for Envelope<A>
where
    A: Actor + Handler<A>,
{
    async fn handle(&mut self, actor: &mut A, ctx: &mut ActorContext<A>) {
        let Some(message) = self.message.take() else {
            return;
        };
        let result = actor
            .handle_message(self.sender.clone(), message, ctx)
            .await;

        if let Some(rsvp) = self.rsvp.take() {
            debug!("Sending back response to {}.", self.sender);
            if rsvp.send(result).is_err() {
                // The asker gave up waiting.
                debug!("Response receiver for {} dropped.", self.sender);
            }
        }
    }
}

/// Boxed message handler for type-erased message handling.
pub type BoxedMessageHandler<A> = Box<dyn MessageHandler<A>>;

/// Mailbox receiver side, owned by the actor runner.
pub type MailboxReceiver<A> = mpsc::UnboundedReceiver<BoxedMessageHandler<A>>;

/// Mailbox sender side, shared by every reference to the actor.
pub type MailboxSender<A> = mpsc::UnboundedSender<BoxedMessageHandler<A>>;

/// Complete mailbox tuple containing both sender and receiver sides.
pub type Mailbox<A> = (MailboxSender<A>, MailboxReceiver<A>);

/// Creates a new unbounded mailbox for an actor. Messages from one sender are
/// dequeued in the order they were sent.
pub fn mailbox<A>() -> Mailbox<A> {
    mpsc::unbounded_channel()
}

/// Typed wrapper over the mailbox sender.
pub struct HandleHelper<A> {
    sender: MailboxSender<A>,
}

impl<A> HandleHelper<A>
where
    A: Actor + Handler<A>,
{
    pub(crate) fn new(sender: MailboxSender<A>) -> Self {
        Self { sender }
    }

    /// Queues a message without waiting for a response.
    ///
    /// # Errors
    ///
    /// Returns `Error::Send` if the actor's mailbox is closed.
    ///
    pub(crate) async fn tell(
        &self,
        sender: ActorPath,
        message: A::Message,
    ) -> Result<(), Error> {
        let envelope = Envelope {
            message: Some(message),
            sender,
            rsvp: None,
        };
        self.sender.send(Box::new(envelope)).map_err(|error| {
            debug!("Failed to tell message! {}", error);
            Error::Send(error.to_string())
        })
    }

    /// Queues a message and waits for the handler result.
    ///
    /// # Errors
    ///
    /// Returns `Error::Send` if the mailbox is closed, or if the actor terminated
    /// before handling the message. Errors returned by the handler are passed through.
    ///
    pub(crate) async fn ask(
        &self,
        sender: ActorPath,
        message: A::Message,
    ) -> Result<A::Response, Error> {
        let (response_sender, response_receiver) = oneshot::channel();
        let envelope = Envelope {
            message: Some(message),
            sender,
            rsvp: Some(response_sender),
        };
        if let Err(error) = self.sender.send(Box::new(envelope)) {
            error!("Failed to ask message! {}", error);
            return Err(Error::Send(error.to_string()));
        }
        response_receiver
            .await
            .map_err(|error| Error::Send(error.to_string()))?
    }

    /// Resolves once the mailbox receiver is closed, i.e. the actor terminated.
    pub async fn closed(&self) {
        self.sender.closed().await;
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// True if both helpers feed the same mailbox.
    pub fn same_channel(&self, other: &Self) -> bool {
        self.sender.same_channel(&other.sender)
    }
}

impl<A> Clone for HandleHelper<A> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
