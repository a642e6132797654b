// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Device actor.
//!

use crate::message::{DeviceCommand, DeviceResponse};

use actor::{Actor, ActorContext, ActorPath, Error, Handler};

use async_trait::async_trait;

use tracing::{debug, info};

/// Keeps the last temperature recorded by one device.
#[derive(Debug, Clone)]
pub struct Device {
    group_id: String,
    device_id: String,
    last_temperature_reading: Option<f64>,
}

impl Device {
    pub fn new(group_id: &str, device_id: &str) -> Self {
        Self {
            group_id: group_id.to_owned(),
            device_id: device_id.to_owned(),
            last_temperature_reading: None,
        }
    }
}

#[async_trait]
impl Actor for Device {
    type Message = DeviceCommand;
    type Event = ();
    type Response = DeviceResponse;

    async fn pre_start(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        info!("Device actor {}-{} started", self.group_id, self.device_id);
        Ok(())
    }

    async fn post_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        info!("Device actor {}-{} stopped", self.group_id, self.device_id);
        Ok(())
    }
}

#[async_trait]
impl Handler<Device> for Device {
    async fn handle_message(
        &mut self,
        _sender: ActorPath,
        msg: DeviceCommand,
        ctx: &mut ActorContext<Device>,
    ) -> Result<DeviceResponse, Error> {
        match msg {
            DeviceCommand::RecordTemperature { request_id, value } => {
                debug!(
                    "Recorded temperature reading {} with {}",
                    value, request_id
                );
                self.last_temperature_reading = Some(value);
                Ok(DeviceResponse::TemperatureRecorded { request_id })
            }
            DeviceCommand::ReadTemperature { request_id } => {
                Ok(DeviceResponse::RespondTemperature {
                    request_id,
                    device_id: self.device_id.clone(),
                    value: self.last_temperature_reading,
                })
            }
            DeviceCommand::Passivate => {
                ctx.stop(None).await;
                Ok(DeviceResponse::None)
            }
        }
    }
}
