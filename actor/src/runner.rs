// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runner
//!
//! Each actor is driven by its own `ActorRunner`, spawned as one tokio task. The runner walks
//! the actor through its lifecycle (Created → Started → Stopped → Terminated, with Failed and
//! Restarted on the error path) and, while started, runs a select loop over:
//!
//! 1. the stop channel,
//! 2. faults reported by children,
//! 3. inner actions (published events, own faults, termination of watched actors),
//! 4. the mailbox.
//!
//! Exactly one of them is handled at a time, so the actor never sees two turns concurrently.
//!

use crate::{
    ActorPath, Error,
    actor::{
        Actor, ActorContext, ActorLifecycle, ActorRef, ChildAction, ChildFault,
        ChildErrorReceiver, ChildErrorSender, Handler,
    },
    handler::{HandleHelper, MailboxReceiver, mailbox},
    supervision::{RetryStrategy, SupervisionStrategy},
    system::SystemRef,
};

use tokio::{
    select,
    sync::{
        broadcast::{self, Sender as EventSender},
        mpsc, oneshot,
    },
};

use tracing::{debug, error};

/// Inner sender.
pub type InnerSender<A> = mpsc::UnboundedSender<InnerAction<A>>;

/// Inner receiver.
pub type InnerReceiver<A> = mpsc::UnboundedReceiver<InnerAction<A>>;

/// Stop receiver.
pub type StopReceiver = mpsc::Receiver<Option<oneshot::Sender<()>>>;

/// Stop sender.
pub type StopSender = mpsc::Sender<Option<oneshot::Sender<()>>>;

/// Capacity of the event broadcast channel of each actor.
const EVENT_BUFFER: usize = 10000;

/// Actor runner.
pub(crate) struct ActorRunner<A: Actor> {
    path: ActorPath,
    actor: A,
    lifecycle: ActorLifecycle,
    receiver: MailboxReceiver<A>,
    event_sender: EventSender<A::Event>,
    stop_receiver: StopReceiver,
    error_sender: ChildErrorSender,
    parent_sender: Option<ChildErrorSender>,
    error_receiver: ChildErrorReceiver,
    inner_sender: InnerSender<A>,
    inner_receiver: InnerReceiver<A>,
    stop_signal: bool,
    removed: bool,
}

impl<A> ActorRunner<A>
where
    A: Actor + Handler<A>,
{
    /// Creates a new actor runner and the actor reference.
    pub(crate) fn create(
        path: ActorPath,
        actor: A,
        parent_sender: Option<ChildErrorSender>,
    ) -> (Self, ActorRef<A>, StopSender) {
        debug!("Creating new actor runner {}.", &path);
        let (sender, receiver) = mailbox();
        let (stop_sender, stop_receiver) = mpsc::channel(100);
        let (error_sender, error_receiver) = mpsc::unbounded_channel();
        let (event_sender, event_receiver) = broadcast::channel(EVENT_BUFFER);
        let (inner_sender, inner_receiver) = mpsc::unbounded_channel();
        let helper = HandleHelper::new(sender);

        let actor_ref = ActorRef::new(
            path.clone(),
            helper,
            stop_sender.clone(),
            event_receiver,
        );
        let runner: ActorRunner<A> = ActorRunner {
            path,
            actor,
            lifecycle: ActorLifecycle::Created,
            receiver,
            stop_receiver,
            event_sender,
            error_sender,
            parent_sender,
            error_receiver,
            inner_sender,
            inner_receiver,
            stop_signal: false,
            removed: false,
        };
        (runner, actor_ref, stop_sender)
    }

    /// Drives the actor lifecycle until termination. `sender` is told whether the actor
    /// reached the started state.
    pub(crate) async fn init(
        &mut self,
        system: SystemRef,
        stop_sender: StopSender,
        mut sender: Option<oneshot::Sender<bool>>,
    ) {
        debug!("Initializing actor {} runner.", &self.path);

        let mut ctx: ActorContext<A> = ActorContext::new(
            stop_sender,
            self.path.clone(),
            system,
            self.error_sender.clone(),
            self.inner_sender.clone(),
        );

        let mut retries = 0;
        let mut strategy = A::supervision_strategy();
        loop {
            match self.lifecycle {
                // State: CREATED
                ActorLifecycle::Created => {
                    debug!("Actor {} is created.", &self.path);
                    match self.actor.pre_start(&mut ctx).await {
                        Ok(_) => {
                            self.lifecycle = ActorLifecycle::Started;
                        }
                        Err(err) => {
                            error!(
                                "Actor {} failed to start: {:?}",
                                &self.path, err
                            );
                            ctx.set_error(err);
                            self.lifecycle = ActorLifecycle::Failed;
                        }
                    }
                }
                // State: STARTED
                ActorLifecycle::Started => {
                    debug!("Actor {} is started.", &self.path);
                    if let Some(sender) = sender.take() {
                        sender.send(true).unwrap_or_else(|err| {
                            error!("Failed to send signal: {:?}", err);
                        });
                    }
                    self.run(&mut ctx).await;
                    // A fault raised while running is final; retries only cover `pre_start`.
                    if ctx.error().is_some() {
                        debug!("Actor {} is faulty.", &self.path);
                        self.lifecycle = ActorLifecycle::Stopped;
                    }
                }
                // State: RESTARTED
                ActorLifecycle::Restarted => {
                    self.apply_supervision_strategy(
                        &mut strategy,
                        &mut ctx,
                        &mut retries,
                    )
                    .await;
                }
                // State: STOPPED
                ActorLifecycle::Stopped => {
                    debug!("Actor {} is stopped.", &self.path);
                    if self.actor.post_stop(&mut ctx).await.is_err() {
                        error!("Actor '{}' failed to stop!", &self.path);
                    }
                    self.lifecycle = ActorLifecycle::Terminated;
                }
                // State: FAILED
                ActorLifecycle::Failed => {
                    debug!("Actor {} failed to start.", &self.path);
                    if self.parent_sender.is_none() {
                        self.lifecycle = ActorLifecycle::Restarted;
                    } else {
                        self.lifecycle = ActorLifecycle::Terminated;
                    }
                }
                // State: TERMINATED
                ActorLifecycle::Terminated => {
                    debug!("Actor {} is terminated.", &self.path);
                    // Children created by a failed `pre_start` are still running.
                    ctx.stop_childs().await;
                    if !self.removed {
                        ctx.remove_actor().await;
                    }
                    ctx.cancel_tasks();
                    if let Some(sender) = sender.take() {
                        sender.send(false).unwrap_or_else(|err| {
                            error!("Failed to send signal: {:?}", err);
                        });
                    }
                    break;
                }
            }
        }
        // Closing the mailbox is what watchers observe as termination.
        self.receiver.close();
    }

    /// Main loop of a started actor.
    pub(crate) async fn run(&mut self, ctx: &mut ActorContext<A>) {
        debug!("Running actor {}.", &self.path);
        loop {
            select! {
                stop = self.stop_receiver.recv() => {
                    debug!("Stopping actor {}.", &self.path);
                    if self.actor.pre_stop(ctx).await.is_err() {
                        error!("Failed to stop actor {}!", &self.path);
                        let _ = ctx.emit_fail(Error::Stop).await;
                    }
                    ctx.stop_childs().await;
                    ctx.remove_actor().await;
                    self.removed = true;
                    if let Some(Some(stop)) = stop {
                        let _ = stop.send(());
                    }
                    if let ActorLifecycle::Started = self.lifecycle {
                        self.lifecycle = ActorLifecycle::Stopped;
                    }
                    break;
                }
                error = self.error_receiver.recv(), if !self.stop_signal => {
                    if let Some(ChildFault { error, sender }) = error {
                        let action = self.actor.on_child_fault(error, ctx).await;
                        if sender.send(action).is_err() {
                            error!("Can not send action to child!");
                        }
                    } else {
                        ctx.stop(None).await;
                        self.stop_signal = true;
                    }
                }
                recv = self.inner_receiver.recv(), if !self.stop_signal => {
                    if let Some(action) = recv {
                        self.inner_handle(action, ctx).await;
                    } else {
                        ctx.stop(None).await;
                        self.stop_signal = true;
                    }
                }
                msg = self.receiver.recv(), if !self.stop_signal => {
                    if let Some(mut msg) = msg {
                        if ctx.error().is_none() {
                            msg.handle(&mut self.actor, ctx).await;
                        } else {
                            debug!("Actor {} is faulty, message dropped.", &self.path);
                        }
                    } else {
                        ctx.stop(None).await;
                        self.stop_signal = true;
                    }
                }
            }
        }
    }

    async fn inner_handle(
        &mut self,
        action: InnerAction<A>,
        ctx: &mut ActorContext<A>,
    ) {
        match action {
            InnerAction::Event(event) => {
                self.actor.on_event(event.clone(), ctx).await;
                match self.event_sender.send(event) {
                    Ok(size) => {
                        debug!(
                            "Event sent successfully to {} subscribers.",
                            size
                        );
                    }
                    Err(_err) => {
                        debug!("Event of {} has no subscribers.", &self.path);
                    }
                }
            }
            InnerAction::Terminated(path) => {
                self.actor.on_terminated(path, ctx).await;
            }
            InnerAction::Fail(error) => {
                let mut action = ChildAction::Stop;
                if let Some(parent_helper) = self.parent_sender.as_mut() {
                    let (action_sender, action_receiver) = oneshot::channel();
                    parent_helper
                        .send(ChildFault {
                            error,
                            sender: action_sender,
                        })
                        .unwrap_or_else(|err| {
                            error!(
                                "Failed to send fail to parent actor: {:?}",
                                err
                            );
                        });
                    if let Ok(decision) = action_receiver.await {
                        action = decision;
                    }
                }
                match action {
                    ChildAction::Resume => {
                        debug!("Actor {} resumed by its parent.", &self.path);
                        ctx.clean_error();
                    }
                    ChildAction::Stop => {
                        ctx.stop(None).await;
                        self.stop_signal = true;
                    }
                }
            }
        }
    }

    async fn apply_supervision_strategy(
        &mut self,
        strategy: &mut SupervisionStrategy,
        ctx: &mut ActorContext<A>,
        retries: &mut usize,
    ) {
        match strategy {
            SupervisionStrategy::Stop => {
                error!("Actor '{}' failed to start!", &self.path);
                self.lifecycle = ActorLifecycle::Stopped;
            }
            SupervisionStrategy::Retry(retry_strategy) => {
                debug!(
                    "Restarting actor with retry strategy: {:?}",
                    &retry_strategy
                );
                if *retries < retry_strategy.max_retries() {
                    if let Some(duration) = retry_strategy.next_backoff() {
                        debug!("Backoff for {:?}", &duration);
                        tokio::time::sleep(duration).await;
                    }
                    *retries += 1;
                    let error = ctx.error();
                    match ctx.restart(&mut self.actor, error.as_ref()).await {
                        Ok(_) => {
                            ctx.clean_error();
                            self.lifecycle = ActorLifecycle::Started;
                            *retries = 0;
                        }
                        Err(err) => {
                            ctx.set_error(err);
                        }
                    }
                } else {
                    self.lifecycle = ActorLifecycle::Stopped;
                }
            }
        }
    }
}

/// Inner actions of a runner, queued from the actor context and from watch tasks.
pub enum InnerAction<A: Actor> {
    /// Event to publish.
    Event(A::Event),
    /// A watched actor terminated.
    Terminated(ActorPath),
    /// Fault to report to the parent.
    Fail(Error),
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::{
        Error,
        actor::{Actor, ActorContext, Handler, Message},
        supervision::{FixedIntervalStrategy, Strategy, SupervisionStrategy},
        system::SystemRef,
    };

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    use std::time::Duration;

    #[derive(Debug, Clone)]
    pub enum TestMessage {
        Ping,
        Fail,
        Stop,
    }

    impl Message for TestMessage {}

    #[derive(Debug, Clone)]
    pub struct TestActor {
        failures: usize,
    }

    #[async_trait]
    impl Actor for TestActor {
        type Message = TestMessage;
        type Response = ();
        type Event = ();

        fn supervision_strategy() -> SupervisionStrategy {
            SupervisionStrategy::Retry(Strategy::FixedInterval(
                FixedIntervalStrategy::new(3, Duration::from_millis(100)),
            ))
        }

        async fn pre_start(
            &mut self,
            _ctx: &mut ActorContext<Self>,
        ) -> Result<(), Error> {
            if self.failures > 0 {
                self.failures -= 1;
                Err(Error::Start("PreStart failed".to_owned()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Handler<TestActor> for TestActor {
        async fn handle_message(
            &mut self,
            _sender: ActorPath,
            msg: TestMessage,
            ctx: &mut ActorContext<Self>,
        ) -> Result<(), Error> {
            match msg {
                TestMessage::Ping => Ok(()),
                TestMessage::Fail => {
                    let error = Error::Functional("broken".to_owned());
                    ctx.emit_fail(error.clone()).await?;
                    Err(error)
                }
                TestMessage::Stop => {
                    ctx.stop(None).await;
                    Ok(())
                }
            }
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_actor_root_restarted() {
        let (event_sender, _) = mpsc::channel(100);
        let system = SystemRef::new(event_sender, CancellationToken::new());

        let actor = TestActor { failures: 2 };
        let actor_ref = system.create_root_actor("test", actor).await.unwrap();

        assert!(logs_contain("Actor /user/test failed to start"));
        assert!(logs_contain("Restarting actor with retry strategy"));
        assert!(logs_contain("Actor /user/test is started"));

        actor_ref.tell(TestMessage::Stop).await.unwrap();
        actor_ref.closed().await;
        assert!(logs_contain("Actor /user/test is terminated"));
        assert!(
            system
                .get_actor::<TestActor>(&ActorPath::from("/user/test"))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_actor_root_gives_up() {
        let (event_sender, _) = mpsc::channel(100);
        let system = SystemRef::new(event_sender, CancellationToken::new());

        let actor = TestActor { failures: 10 };
        let result = system.create_root_actor("test", actor).await;

        assert!(matches!(result, Err(Error::Start(_))));
        assert!(logs_contain("Actor /user/test is terminated"));
        assert!(
            system
                .get_actor::<TestActor>(&ActorPath::from("/user/test"))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fault_after_start_stops_root_actor() {
        let (event_sender, _) = mpsc::channel(100);
        let system = SystemRef::new(event_sender, CancellationToken::new());

        // Retry covers start failures only; a fault while running is final.
        let actor = TestActor { failures: 0 };
        let actor_ref = system.create_root_actor("test", actor).await.unwrap();
        actor_ref.ask(TestMessage::Ping).await.unwrap();

        let result = actor_ref.ask(TestMessage::Fail).await;
        assert!(matches!(result, Err(Error::Functional(_))));

        tokio::time::timeout(Duration::from_secs(3), actor_ref.closed())
            .await
            .unwrap();
        assert!(actor_ref.ask(TestMessage::Ping).await.is_err());
        assert!(
            system
                .get_actor::<TestActor>(&ActorPath::from("/user/test"))
                .await
                .is_none()
        );
        assert!(logs_contain("Actor /user/test is faulty"));
        assert!(!logs_contain("Restarting actor with retry strategy"));

        let actor_ref = system
            .create_root_actor("test", TestActor { failures: 0 })
            .await
            .unwrap();
        actor_ref.ask(TestMessage::Ping).await.unwrap();
    }
}
