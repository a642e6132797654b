// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Message contracts
//!
//! Requests carry the channel their reply goes to. A group answers on it directly, or hands it
//! to the query that will answer in its place. A request addressed to another group is dropped
//! without touching the channel.
//!

use crate::device::Device;

use actor::{ActorRef, Message, Response};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use std::collections::{HashMap, HashSet};

/// Where a reply is sent.
pub type ReplyTo<T> = mpsc::UnboundedSender<T>;

/// Reading of one device in a group query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemperatureReading {
    Temperature(f64),
    /// The device is alive but has not recorded anything yet.
    TemperatureNotAvailable,
    /// The device stopped before answering.
    DeviceNotAvailable,
    /// The device did not answer before the query deadline.
    DeviceTimedOut,
}

impl TemperatureReading {
    pub fn is_available(&self) -> bool {
        matches!(self, TemperatureReading::Temperature(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRegistered {
    pub device: ActorRef<Device>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplyDeviceList {
    pub request_id: u64,
    pub ids: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RespondAllTemperatures {
    pub request_id: u64,
    pub temperatures: HashMap<String, TemperatureReading>,
}

/// Requests handled by a device group.
#[derive(Debug, Clone)]
pub enum GroupCommand {
    RequestTrackDevice {
        group_id: String,
        device_id: String,
        reply_to: ReplyTo<DeviceRegistered>,
    },
    RequestDeviceList {
        request_id: u64,
        group_id: String,
        reply_to: ReplyTo<ReplyDeviceList>,
    },
    RequestAllTemperatures {
        request_id: u64,
        group_id: String,
        reply_to: ReplyTo<RespondAllTemperatures>,
    },
}

impl GroupCommand {
    /// Group the request is addressed to.
    pub fn group_id(&self) -> &str {
        match self {
            GroupCommand::RequestTrackDevice { group_id, .. }
            | GroupCommand::RequestDeviceList { group_id, .. }
            | GroupCommand::RequestAllTemperatures { group_id, .. } => group_id,
        }
    }
}

impl Message for GroupCommand {}

/// The manager accepts the group requests and routes them by group id.
pub type ManagerCommand = GroupCommand;

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    RecordTemperature { request_id: u64, value: f64 },
    ReadTemperature { request_id: u64 },
    Passivate,
}

impl Message for DeviceCommand {}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceResponse {
    TemperatureRecorded {
        request_id: u64,
    },
    RespondTemperature {
        request_id: u64,
        device_id: String,
        value: Option<f64>,
    },
    None,
}

impl Response for DeviceResponse {}
