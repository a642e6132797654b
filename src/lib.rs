// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Actor runtime, event-sourced persistence and the device registry built on them.
//!

pub use actor::{
    Actor, ActorContext, ActorPath, ActorRef, ActorSystem, CancellationToken,
    ChildAction, Error as ActorError, Event, ExponentialBackoffStrategy,
    FixedIntervalStrategy, Handler, Message, NoIntervalStrategy, Response,
    RetryStrategy, Sink, Strategy, Subscriber, SupervisionStrategy,
    SystemEvent, SystemRef, SystemRunner,
};

pub use store::{
    Effect, Error as StoreError, EventSourced, EventSourcedActor, Journal,
    JournalCommand, JournalResponse, PersistenceId, Signal,
    database::{Collection, DbManager},
    memory::{MemoryManager, MemoryStore},
};

pub use device::{
    DEFAULT_QUERY_TIMEOUT, Device, DeviceCommand, DeviceGroup,
    DeviceGroupQuery, DeviceManager, DeviceRegistered, DeviceResponse,
    GroupCommand, ManagerCommand, QueryCommand, ReplyDeviceList, ReplyTo,
    RespondAllTemperatures, TemperatureReading,
};
