// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!

use crate::ActorPath;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the actor system.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// An error occurred while sending a message to an actor.
    #[error("An error occurred while sending a message to actor: {0}.")]
    Send(String),
    /// An actor already lives at the requested path.
    #[error("Actor {0} exist.")]
    Exists(ActorPath),
    /// An error occurred while stopping an actor.
    #[error("An error occurred while stopping an actor.")]
    Stop,
    /// The actor could not reach the started state.
    #[error("An error occurred while starting the actor: {0}")]
    Start(String),
    /// An error occurred while sending an envent to event bus.
    #[error("An error occurred while sending an event to event bus: {0}")]
    SendEvent(String),
    /// Store  Error.
    #[error("Store error: {0}")]
    Store(String),
    /// State could not be rebuilt from the persisted events.
    #[error("Recovery error: {0}")]
    Recovery(String),
    /// Error that does not compromise the operation of the system.
    #[error("Error: {0}")]
    Functional(String),
}
