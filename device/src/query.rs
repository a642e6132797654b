// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Group temperature query
//!
//! One query collects a reading from every device of a snapshot and answers the requester
//! once. Each device ends up in exactly one state: it replied, it stopped first, or the
//! deadline passed. The query stops itself after answering and ignores anything that arrives
//! later.
//!

use crate::{
    device::Device,
    message::{
        DeviceCommand, DeviceResponse, ReplyTo, RespondAllTemperatures,
        TemperatureReading,
    },
};

use actor::{
    Actor, ActorContext, ActorPath, ActorRef, CancellationToken, Error,
    Handler, Message,
};

use async_trait::async_trait;

use tokio::select;
use tracing::{debug, warn};

use std::{collections::HashMap, mem, time::Duration};

/// Messages of the query actor.
#[derive(Debug, Clone)]
pub enum QueryCommand {
    DeviceResponded {
        device_id: String,
        reading: TemperatureReading,
    },
    CollectionTimeout,
}

impl Message for QueryCommand {}

/// Aggregates the readings of a set of devices.
///
/// Generic over the device actor so that any actor speaking the device protocol can be
/// queried.
pub struct DeviceGroupQuery<D = Device>
where
    D: Actor<Message = DeviceCommand, Response = DeviceResponse> + Handler<D>,
{
    pending: HashMap<String, ActorRef<D>>,
    replies: HashMap<String, TemperatureReading>,
    request_id: u64,
    reply_to: ReplyTo<RespondAllTemperatures>,
    timeout: Duration,
    timer: Option<CancellationToken>,
    finished: bool,
}

impl<D> DeviceGroupQuery<D>
where
    D: Actor<Message = DeviceCommand, Response = DeviceResponse> + Handler<D>,
{
    pub fn new(
        devices: HashMap<String, ActorRef<D>>,
        request_id: u64,
        reply_to: ReplyTo<RespondAllTemperatures>,
        timeout: Duration,
    ) -> Self {
        Self {
            pending: devices,
            replies: HashMap::new(),
            request_id,
            reply_to,
            timeout,
            timer: None,
            finished: false,
        }
    }

    fn record(&mut self, device_id: String, reading: TemperatureReading) {
        if self.pending.remove(&device_id).is_some() {
            self.replies.insert(device_id, reading);
        }
    }

    /// Answers and stops once nothing is pending.
    async fn respond_when_all_collected(
        &mut self,
        ctx: &mut ActorContext<DeviceGroupQuery<D>>,
    ) {
        if !self.pending.is_empty() || self.finished {
            return;
        }
        self.finished = true;
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        let response = RespondAllTemperatures {
            request_id: self.request_id,
            temperatures: mem::take(&mut self.replies),
        };
        if self.reply_to.send(response).is_err() {
            debug!(
                "Temperatures for request {} dropped, requester is gone",
                self.request_id
            );
        }
        ctx.stop(None).await;
    }
}

/// Asks one device and reports the outcome to the query. Gives up when the query terminates.
async fn read_device<D>(
    device_id: String,
    device: ActorRef<D>,
    request_id: u64,
    query: ActorRef<DeviceGroupQuery<D>>,
) where
    D: Actor<Message = DeviceCommand, Response = DeviceResponse> + Handler<D>,
{
    let reading = select! {
        _ = query.closed() => return,
        response = device.ask(DeviceCommand::ReadTemperature { request_id }) => {
            match response {
                Ok(DeviceResponse::RespondTemperature { value: Some(value), .. }) => {
                    TemperatureReading::Temperature(value)
                }
                Ok(DeviceResponse::RespondTemperature { value: None, .. }) => {
                    TemperatureReading::TemperatureNotAvailable
                }
                Ok(response) => {
                    warn!("Unexpected reply from device {}: {:?}", device_id, response);
                    TemperatureReading::DeviceNotAvailable
                }
                Err(_) => TemperatureReading::DeviceNotAvailable,
            }
        }
    };
    let message = QueryCommand::DeviceResponded {
        device_id: device_id.clone(),
        reading,
    };
    if query.tell(message).await.is_err() {
        debug!("Reading of {} dropped, query is gone", device_id);
    }
}

#[async_trait]
impl<D> Actor for DeviceGroupQuery<D>
where
    D: Actor<Message = DeviceCommand, Response = DeviceResponse> + Handler<D>,
{
    type Message = QueryCommand;
    type Event = ();
    type Response = ();

    async fn pre_start(
        &mut self,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        if self.pending.is_empty() {
            self.respond_when_all_collected(ctx).await;
            return Ok(());
        }

        let Some(myself) = ctx.reference().await else {
            return Err(Error::Start(format!(
                "Query {} is not registered",
                ctx.path()
            )));
        };
        for (device_id, device) in &self.pending {
            ctx.watch(device);
            tokio::spawn(read_device(
                device_id.clone(),
                device.clone(),
                self.request_id,
                myself.clone(),
            ));
        }
        self.timer = Some(
            ctx.schedule_once(self.timeout, QueryCommand::CollectionTimeout)
                .await?,
        );
        Ok(())
    }
}

#[async_trait]
impl<D> Handler<DeviceGroupQuery<D>> for DeviceGroupQuery<D>
where
    D: Actor<Message = DeviceCommand, Response = DeviceResponse> + Handler<D>,
{
    async fn handle_message(
        &mut self,
        _sender: ActorPath,
        msg: QueryCommand,
        ctx: &mut ActorContext<DeviceGroupQuery<D>>,
    ) -> Result<(), Error> {
        if self.finished {
            debug!("Query {} already answered, ignoring {:?}", self.request_id, msg);
            return Ok(());
        }
        match msg {
            QueryCommand::DeviceResponded { device_id, reading } => {
                self.record(device_id, reading);
            }
            QueryCommand::CollectionTimeout => {
                for (device_id, _) in self.pending.drain() {
                    self.replies
                        .insert(device_id, TemperatureReading::DeviceTimedOut);
                }
            }
        }
        self.respond_when_all_collected(ctx).await;
        Ok(())
    }

    async fn on_terminated(
        &mut self,
        path: ActorPath,
        ctx: &mut ActorContext<DeviceGroupQuery<D>>,
    ) {
        if self.finished {
            return;
        }
        let device_id = self
            .pending
            .iter()
            .find(|(_, device)| device.path() == path)
            .map(|(device_id, _)| device_id.clone());
        if let Some(device_id) = device_id {
            self.record(device_id, TemperatureReading::DeviceNotAvailable);
            self.respond_when_all_collected(ctx).await;
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use actor::{ActorSystem, SystemRef};
    use tokio::sync::mpsc;

    /// Answers reads only after a long pause.
    struct SlowDevice;

    #[async_trait]
    impl Actor for SlowDevice {
        type Message = DeviceCommand;
        type Event = ();
        type Response = DeviceResponse;
    }

    #[async_trait]
    impl Handler<SlowDevice> for SlowDevice {
        async fn handle_message(
            &mut self,
            _sender: ActorPath,
            msg: DeviceCommand,
            _ctx: &mut ActorContext<SlowDevice>,
        ) -> Result<DeviceResponse, Error> {
            match msg {
                DeviceCommand::ReadTemperature { request_id } => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(DeviceResponse::RespondTemperature {
                        request_id,
                        device_id: "slow".to_owned(),
                        value: None,
                    })
                }
                _ => Ok(DeviceResponse::None),
            }
        }
    }

    /// Answers reads with a fixed value after `delay`.
    struct LateDevice {
        delay: Duration,
        value: f64,
    }

    #[async_trait]
    impl Actor for LateDevice {
        type Message = DeviceCommand;
        type Event = ();
        type Response = DeviceResponse;
    }

    #[async_trait]
    impl Handler<LateDevice> for LateDevice {
        async fn handle_message(
            &mut self,
            _sender: ActorPath,
            msg: DeviceCommand,
            _ctx: &mut ActorContext<LateDevice>,
        ) -> Result<DeviceResponse, Error> {
            match msg {
                DeviceCommand::ReadTemperature { request_id } => {
                    tokio::time::sleep(self.delay).await;
                    Ok(DeviceResponse::RespondTemperature {
                        request_id,
                        device_id: "late".to_owned(),
                        value: Some(self.value),
                    })
                }
                _ => Ok(DeviceResponse::None),
            }
        }
    }

    async fn device(
        system: &SystemRef,
        id: &str,
        value: Option<f64>,
    ) -> ActorRef<Device> {
        let device = system
            .create_root_actor(id, Device::new("group", id))
            .await
            .unwrap();
        if let Some(value) = value {
            device
                .ask(DeviceCommand::RecordTemperature {
                    request_id: 0,
                    value,
                })
                .await
                .unwrap();
        }
        device
    }

    #[tokio::test]
    async fn test_return_temperature_for_working_devices() {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let devices = HashMap::from([
            ("device1".to_owned(), device(&system, "device1", Some(1.0)).await),
            ("device2".to_owned(), device(&system, "device2", Some(2.0)).await),
        ]);

        let (reply_to, mut replies) = mpsc::unbounded_channel();
        let query = system
            .create_root_actor(
                "query",
                DeviceGroupQuery::new(devices, 1, reply_to, Duration::from_secs(3)),
            )
            .await
            .unwrap();

        let response = replies.recv().await.unwrap();
        assert_eq!(response.request_id, 1);
        assert_eq!(
            response.temperatures,
            HashMap::from([
                ("device1".to_owned(), TemperatureReading::Temperature(1.0)),
                ("device2".to_owned(), TemperatureReading::Temperature(2.0)),
            ])
        );
        query.closed().await;
    }

    #[tokio::test]
    async fn test_return_not_available_for_devices_without_readings() {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let devices = HashMap::from([
            ("device1".to_owned(), device(&system, "device1", None).await),
            ("device2".to_owned(), device(&system, "device2", Some(2.0)).await),
        ]);

        let (reply_to, mut replies) = mpsc::unbounded_channel();
        system
            .create_root_actor(
                "query",
                DeviceGroupQuery::new(devices, 1, reply_to, Duration::from_secs(3)),
            )
            .await
            .unwrap();

        let response = replies.recv().await.unwrap();
        assert_eq!(
            response.temperatures,
            HashMap::from([
                (
                    "device1".to_owned(),
                    TemperatureReading::TemperatureNotAvailable
                ),
                ("device2".to_owned(), TemperatureReading::Temperature(2.0)),
            ])
        );
    }

    #[tokio::test]
    async fn test_return_device_not_available_if_device_stops() {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let device1 = device(&system, "device1", Some(1.0)).await;
        let device2 = device(&system, "device2", Some(2.0)).await;
        device2.ask_stop().await.unwrap();

        let devices = HashMap::from([
            ("device1".to_owned(), device1),
            ("device2".to_owned(), device2),
        ]);
        let (reply_to, mut replies) = mpsc::unbounded_channel();
        system
            .create_root_actor(
                "query",
                DeviceGroupQuery::new(devices, 1, reply_to, Duration::from_secs(3)),
            )
            .await
            .unwrap();

        let response = replies.recv().await.unwrap();
        assert_eq!(
            response.temperatures,
            HashMap::from([
                ("device1".to_owned(), TemperatureReading::Temperature(1.0)),
                ("device2".to_owned(), TemperatureReading::DeviceNotAvailable),
            ])
        );
    }

    #[tokio::test]
    async fn test_return_timed_out_if_device_does_not_answer() {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let slow = system.create_root_actor("slow", SlowDevice).await.unwrap();
        let devices = HashMap::from([("slow".to_owned(), slow)]);

        let (reply_to, mut replies) = mpsc::unbounded_channel();
        let query = system
            .create_root_actor(
                "query",
                DeviceGroupQuery::new(
                    devices,
                    1,
                    reply_to,
                    Duration::from_millis(200),
                ),
            )
            .await
            .unwrap();

        let response = replies.recv().await.unwrap();
        assert_eq!(
            response.temperatures,
            HashMap::from([(
                "slow".to_owned(),
                TemperatureReading::DeviceTimedOut
            )])
        );
        query.closed().await;
        assert!(replies.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_answer_after_deadline_is_ignored() {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let late = system
            .create_root_actor(
                "late",
                LateDevice {
                    delay: Duration::from_millis(300),
                    value: 3.0,
                },
            )
            .await
            .unwrap();
        let devices = HashMap::from([("late".to_owned(), late)]);

        let (reply_to, mut replies) = mpsc::unbounded_channel();
        let query = system
            .create_root_actor(
                "query",
                DeviceGroupQuery::new(
                    devices,
                    5,
                    reply_to,
                    Duration::from_millis(100),
                ),
            )
            .await
            .unwrap();

        let response = replies.recv().await.unwrap();
        assert_eq!(response.request_id, 5);
        assert_eq!(
            response.temperatures,
            HashMap::from([(
                "late".to_owned(),
                TemperatureReading::DeviceTimedOut
            )])
        );
        query.closed().await;

        // The device answers well after the deadline.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(replies.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_snapshot_replies_immediately() {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let (reply_to, mut replies) = mpsc::unbounded_channel();
        let query = system
            .create_root_actor(
                "query",
                DeviceGroupQuery::<Device>::new(
                    HashMap::new(),
                    9,
                    reply_to,
                    Duration::from_secs(3),
                ),
            )
            .await
            .unwrap();

        let response = replies.recv().await.unwrap();
        assert_eq!(response.request_id, 9);
        assert!(response.temperatures.is_empty());
        query.closed().await;
    }
}
