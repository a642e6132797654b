// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Device manager: routes requests to the group named in them, creating groups on first
//! registration.
//!

use crate::{
    group::{DEFAULT_QUERY_TIMEOUT, DeviceGroup},
    message::{ManagerCommand, ReplyDeviceList, RespondAllTemperatures},
};

use actor::{Actor, ActorContext, ActorPath, ActorRef, Error, Handler};

use async_trait::async_trait;

use tracing::{debug, info};

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

pub struct DeviceManager {
    groups: HashMap<String, ActorRef<DeviceGroup>>,
    query_timeout: Duration,
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            groups: HashMap::new(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Query deadline handed to the groups this manager creates.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    async fn group(
        &mut self,
        group_id: &str,
        ctx: &mut ActorContext<DeviceManager>,
    ) -> Result<ActorRef<DeviceGroup>, Error> {
        if let Some(group) = self.groups.get(group_id) {
            return Ok(group.clone());
        }
        info!("Creating device group actor for {}", group_id);
        let group = ctx
            .create_child(
                &format!("group-{}", group_id),
                DeviceGroup::new(group_id)
                    .with_query_timeout(self.query_timeout),
            )
            .await?;
        ctx.watch(&group);
        self.groups.insert(group_id.to_owned(), group.clone());
        Ok(group)
    }
}

#[async_trait]
impl Actor for DeviceManager {
    type Message = ManagerCommand;
    type Event = ();
    type Response = ();

    async fn pre_start(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        info!("DeviceManager started");
        Ok(())
    }

    async fn post_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        info!("DeviceManager stopped");
        Ok(())
    }
}

#[async_trait]
impl Handler<DeviceManager> for DeviceManager {
    async fn handle_message(
        &mut self,
        _sender: ActorPath,
        msg: ManagerCommand,
        ctx: &mut ActorContext<DeviceManager>,
    ) -> Result<(), Error> {
        let group_id = msg.group_id().to_owned();
        if matches!(msg, ManagerCommand::RequestTrackDevice { .. }) {
            let group = self.group(&group_id, ctx).await?;
            return group.tell(msg).await;
        }
        if let Some(group) = self.groups.get(&group_id) {
            return group.tell(msg).await;
        }

        // Queries for a group that was never registered.
        match msg {
            ManagerCommand::RequestDeviceList {
                request_id,
                reply_to,
                ..
            } => {
                let reply = ReplyDeviceList {
                    request_id,
                    ids: HashSet::new(),
                };
                if reply_to.send(reply).is_err() {
                    debug!("Device list reply dropped, requester is gone");
                }
            }
            ManagerCommand::RequestAllTemperatures {
                request_id,
                reply_to,
                ..
            } => {
                let reply = RespondAllTemperatures {
                    request_id,
                    temperatures: HashMap::new(),
                };
                if reply_to.send(reply).is_err() {
                    debug!("Temperatures reply dropped, requester is gone");
                }
            }
            ManagerCommand::RequestTrackDevice { .. } => {}
        }
        Ok(())
    }

    async fn on_terminated(
        &mut self,
        path: ActorPath,
        _ctx: &mut ActorContext<DeviceManager>,
    ) {
        let before = self.groups.len();
        self.groups.retain(|_, group| group.path() != path);
        if self.groups.len() < before {
            info!("Device group actor {} has been terminated", path);
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::message::{DeviceCommand, TemperatureReading};

    use actor::ActorSystem;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_groups_created_on_registration() {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let manager = system
            .create_root_actor("manager", DeviceManager::new())
            .await
            .unwrap();

        let (reply_to, mut replies) = mpsc::unbounded_channel();
        for (group_id, device_id) in [("a", "1"), ("b", "1"), ("a", "2")] {
            manager
                .tell(ManagerCommand::RequestTrackDevice {
                    group_id: group_id.to_owned(),
                    device_id: device_id.to_owned(),
                    reply_to: reply_to.clone(),
                })
                .await
                .unwrap();
        }
        let mut paths = vec![];
        for _ in 0..3 {
            paths.push(replies.recv().await.unwrap().device.path());
        }
        paths.sort();
        assert_eq!(
            paths,
            vec![
                ActorPath::from("/user/manager/group-a/device-1"),
                ActorPath::from("/user/manager/group-a/device-2"),
                ActorPath::from("/user/manager/group-b/device-1"),
            ]
        );
        assert_eq!(
            system.children(&manager.path()).await,
            vec![
                ActorPath::from("/user/manager/group-a"),
                ActorPath::from("/user/manager/group-b"),
            ]
        );
        assert!(logs_contain("Creating device group actor for a"));
    }

    #[tokio::test]
    async fn test_unknown_group_answers_empty() {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let manager = system
            .create_root_actor("manager", DeviceManager::new())
            .await
            .unwrap();

        let (list_to, mut list) = mpsc::unbounded_channel();
        manager
            .tell(ManagerCommand::RequestDeviceList {
                request_id: 3,
                group_id: "missing".to_owned(),
                reply_to: list_to,
            })
            .await
            .unwrap();
        let reply = list.recv().await.unwrap();
        assert_eq!(reply.request_id, 3);
        assert!(reply.ids.is_empty());

        let (temperatures_to, mut temperatures) = mpsc::unbounded_channel();
        manager
            .tell(ManagerCommand::RequestAllTemperatures {
                request_id: 4,
                group_id: "missing".to_owned(),
                reply_to: temperatures_to,
            })
            .await
            .unwrap();
        let reply = temperatures.recv().await.unwrap();
        assert_eq!(reply.request_id, 4);
        assert!(reply.temperatures.is_empty());
    }

    #[tokio::test]
    async fn test_routes_queries_to_group() {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let manager = system
            .create_root_actor(
                "manager",
                DeviceManager::new()
                    .with_query_timeout(Duration::from_millis(500)),
            )
            .await
            .unwrap();

        let (reply_to, mut replies) = mpsc::unbounded_channel();
        manager
            .tell(ManagerCommand::RequestTrackDevice {
                group_id: "home".to_owned(),
                device_id: "kitchen".to_owned(),
                reply_to,
            })
            .await
            .unwrap();
        let kitchen = replies.recv().await.unwrap().device;
        kitchen
            .ask(DeviceCommand::RecordTemperature {
                request_id: 1,
                value: 19.5,
            })
            .await
            .unwrap();

        let (temperatures_to, mut temperatures) = mpsc::unbounded_channel();
        manager
            .tell(ManagerCommand::RequestAllTemperatures {
                request_id: 2,
                group_id: "home".to_owned(),
                reply_to: temperatures_to,
            })
            .await
            .unwrap();
        let reply = temperatures.recv().await.unwrap();
        assert_eq!(
            reply.temperatures,
            HashMap::from([(
                "kitchen".to_owned(),
                TemperatureReading::Temperature(19.5)
            )])
        );
    }
}
