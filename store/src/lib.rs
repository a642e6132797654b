// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Store module.
//!
//! Storage backends, the per-entity event journal and the event-sourced actor built on it.
//!

pub mod database;
pub mod error;
pub mod event_sourced;
pub mod journal;
pub mod memory;

pub use error::Error;
pub use event_sourced::{
    Effect, EventSourced, EventSourcedActor, PersistenceId, Signal,
};
pub use journal::{Journal, JournalCommand, JournalResponse};
