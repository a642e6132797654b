// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Device registry
//!
//! IoT style registry built on the actor runtime. A [`DeviceManager`] owns one
//! [`DeviceGroup`] per group id, each group owns its [`Device`] actors, and temperature
//! requests over a whole group are answered by a [`DeviceGroupQuery`] spawned per request.
//!
//! ```text
//! /user/manager
//!   /group-<group_id>
//!     /device-<device_id>
//!     /query-<n>
//! ```
//!

mod device;
mod group;
mod manager;
mod message;
mod query;

pub use device::Device;
pub use group::{DEFAULT_QUERY_TIMEOUT, DeviceGroup};
pub use manager::DeviceManager;
pub use message::{
    DeviceCommand, DeviceRegistered, DeviceResponse, GroupCommand,
    ManagerCommand, ReplyDeviceList, ReplyTo, RespondAllTemperatures,
    TemperatureReading,
};
pub use query::{DeviceGroupQuery, QueryCommand};
