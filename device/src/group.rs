// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Device group
//!
//! A group owns the devices registered under its id. Devices are children named
//! `device-<id>` and are watched, so a device that stops is dropped from the group and a later
//! registration with the same id creates a fresh one. Temperature requests are delegated to a
//! short-lived [`DeviceGroupQuery`] child.
//!

use crate::{
    device::Device,
    message::{DeviceRegistered, GroupCommand, ReplyDeviceList},
    query::DeviceGroupQuery,
};

use actor::{Actor, ActorContext, ActorPath, ActorRef, Error, Handler};

use async_trait::async_trait;

use tracing::{debug, info, warn};

use std::{collections::HashMap, time::Duration};

/// Deadline of a temperature query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

pub struct DeviceGroup {
    group_id: String,
    devices: HashMap<String, ActorRef<Device>>,
    query_timeout: Duration,
    query_counter: u64,
}

impl DeviceGroup {
    pub fn new(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_owned(),
            devices: HashMap::new(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            query_counter: 0,
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    async fn track_device(
        &mut self,
        device_id: String,
        ctx: &mut ActorContext<DeviceGroup>,
    ) -> Result<ActorRef<Device>, Error> {
        if let Some(device) = self.devices.get(&device_id) {
            return Ok(device.clone());
        }
        info!("Creating device actor for {}", device_id);
        let device = ctx
            .create_child(
                &format!("device-{}", device_id),
                Device::new(&self.group_id, &device_id),
            )
            .await?;
        ctx.watch(&device);
        self.devices.insert(device_id, device.clone());
        Ok(device)
    }
}

#[async_trait]
impl Actor for DeviceGroup {
    type Message = GroupCommand;
    type Event = ();
    type Response = ();

    async fn pre_start(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        info!("DeviceGroup {} started", self.group_id);
        Ok(())
    }

    async fn post_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        info!("DeviceGroup {} stopped", self.group_id);
        Ok(())
    }
}

#[async_trait]
impl Handler<DeviceGroup> for DeviceGroup {
    async fn handle_message(
        &mut self,
        _sender: ActorPath,
        msg: GroupCommand,
        ctx: &mut ActorContext<DeviceGroup>,
    ) -> Result<(), Error> {
        if msg.group_id() != self.group_id {
            warn!(
                "Ignoring {:?} request for {}. This actor is responsible for {}.",
                msg,
                msg.group_id(),
                self.group_id
            );
            return Ok(());
        }

        match msg {
            GroupCommand::RequestTrackDevice {
                device_id,
                reply_to,
                ..
            } => {
                let device = self.track_device(device_id, ctx).await?;
                if reply_to.send(DeviceRegistered { device }).is_err() {
                    debug!("Registration reply dropped, requester is gone");
                }
            }
            GroupCommand::RequestDeviceList {
                request_id,
                reply_to,
                ..
            } => {
                let ids = self.devices.keys().cloned().collect();
                if reply_to.send(ReplyDeviceList { request_id, ids }).is_err() {
                    debug!("Device list reply dropped, requester is gone");
                }
            }
            GroupCommand::RequestAllTemperatures {
                request_id,
                reply_to,
                ..
            } => {
                self.query_counter += 1;
                let query = DeviceGroupQuery::new(
                    self.devices.clone(),
                    request_id,
                    reply_to,
                    self.query_timeout,
                );
                ctx.create_child(
                    &format!("query-{}", self.query_counter),
                    query,
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn on_terminated(
        &mut self,
        path: ActorPath,
        _ctx: &mut ActorContext<DeviceGroup>,
    ) {
        let before = self.devices.len();
        self.devices.retain(|_, device| device.path() != path);
        if self.devices.len() < before {
            info!("Device actor {} has been terminated", path);
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::message::{
        DeviceCommand, DeviceResponse, RespondAllTemperatures,
        TemperatureReading,
    };

    use actor::ActorSystem;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    use std::collections::HashSet;

    #[tokio::test]
    #[traced_test]
    async fn test_ignore_wrong_group() {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let group = system
            .create_root_actor("group", DeviceGroup::new("group"))
            .await
            .unwrap();

        let (reply_to, mut replies) = mpsc::unbounded_channel();
        group
            .tell(GroupCommand::RequestTrackDevice {
                group_id: "wrongGroup".to_owned(),
                device_id: "device1".to_owned(),
                reply_to,
            })
            .await
            .unwrap();

        let (list_to, mut list) = mpsc::unbounded_channel();
        group
            .tell(GroupCommand::RequestDeviceList {
                request_id: 0,
                group_id: "group".to_owned(),
                reply_to: list_to,
            })
            .await
            .unwrap();
        let reply = list.recv().await.unwrap();
        assert!(reply.ids.is_empty());
        assert!(replies.try_recv().is_err());
        assert!(logs_contain(
            "for wrongGroup. This actor is responsible for group."
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_ignore_wrong_group_queries() {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let group = system
            .create_root_actor("group", DeviceGroup::new("group"))
            .await
            .unwrap();
        let (reply_to, mut replies) = mpsc::unbounded_channel();
        group
            .tell(GroupCommand::RequestTrackDevice {
                group_id: "group".to_owned(),
                device_id: "device1".to_owned(),
                reply_to,
            })
            .await
            .unwrap();
        replies.recv().await.unwrap();

        let (list_to, mut list) = mpsc::unbounded_channel();
        group
            .tell(GroupCommand::RequestDeviceList {
                request_id: 1,
                group_id: "wrongGroup".to_owned(),
                reply_to: list_to,
            })
            .await
            .unwrap();
        let (temperatures_to, mut temperatures) = mpsc::unbounded_channel();
        group
            .tell(GroupCommand::RequestAllTemperatures {
                request_id: 2,
                group_id: "wrongGroup".to_owned(),
                reply_to: temperatures_to,
            })
            .await
            .unwrap();

        let wait = Duration::from_millis(100);
        assert!(tokio::time::timeout(wait, list.recv()).await.is_err());
        assert!(tokio::time::timeout(wait, temperatures.recv()).await.is_err());

        // No query was started for the foreign request.
        assert_eq!(
            system.children(&group.path()).await,
            vec![ActorPath::from("/user/group/device-device1")]
        );
        assert!(logs_contain("RequestDeviceList"));
        assert!(logs_contain("RequestAllTemperatures"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_devices_are_children() {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let group = system
            .create_root_actor("group", DeviceGroup::new("group"))
            .await
            .unwrap();

        let (reply_to, mut replies) = mpsc::unbounded_channel();
        group
            .tell(GroupCommand::RequestTrackDevice {
                group_id: "group".to_owned(),
                device_id: "device1".to_owned(),
                reply_to,
            })
            .await
            .unwrap();
        let registered = replies.recv().await.unwrap();
        assert_eq!(
            registered.device.path(),
            ActorPath::from("/user/group/device-device1")
        );
        assert!(logs_contain("Creating device actor for device1"));
    }

    #[tokio::test]
    async fn test_device_reregistered_after_passivate() {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let group = system
            .create_root_actor("group", DeviceGroup::new("group"))
            .await
            .unwrap();

        let (reply_to, mut replies) = mpsc::unbounded_channel();
        let track = GroupCommand::RequestTrackDevice {
            group_id: "group".to_owned(),
            device_id: "device1".to_owned(),
            reply_to,
        };
        group.tell(track.clone()).await.unwrap();
        let first = replies.recv().await.unwrap().device;
        first
            .ask(DeviceCommand::RecordTemperature {
                request_id: 0,
                value: 1.0,
            })
            .await
            .unwrap();

        first.tell(DeviceCommand::Passivate).await.unwrap();
        first.closed().await;

        // The group forgets the device once the termination is delivered.
        let second = loop {
            group.tell(track.clone()).await.unwrap();
            let device = replies.recv().await.unwrap().device;
            if device != first {
                break device;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };

        let response = second
            .ask(DeviceCommand::ReadTemperature { request_id: 1 })
            .await
            .unwrap();
        assert_eq!(
            response,
            DeviceResponse::RespondTemperature {
                request_id: 1,
                device_id: "device1".to_owned(),
                value: None
            }
        );
    }

    #[tokio::test]
    async fn test_queries_are_independent() {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let group = system
            .create_root_actor("group", DeviceGroup::new("group"))
            .await
            .unwrap();

        let (reply_to, mut replies) = mpsc::unbounded_channel();
        group
            .tell(GroupCommand::RequestTrackDevice {
                group_id: "group".to_owned(),
                device_id: "device1".to_owned(),
                reply_to,
            })
            .await
            .unwrap();
        let device = replies.recv().await.unwrap().device;
        device
            .ask(DeviceCommand::RecordTemperature {
                request_id: 0,
                value: 21.5,
            })
            .await
            .unwrap();

        let (reply_to, mut temperatures) = mpsc::unbounded_channel();
        for request_id in [7, 8] {
            group
                .tell(GroupCommand::RequestAllTemperatures {
                    request_id,
                    group_id: "group".to_owned(),
                    reply_to: reply_to.clone(),
                })
                .await
                .unwrap();
        }

        let mut ids = HashSet::new();
        for _ in 0..2 {
            let RespondAllTemperatures {
                request_id,
                temperatures,
            } = temperatures.recv().await.unwrap();
            assert_eq!(
                temperatures.get("device1"),
                Some(&TemperatureReading::Temperature(21.5))
            );
            ids.insert(request_id);
        }
        assert_eq!(ids, HashSet::from([7, 8]));
    }
}
