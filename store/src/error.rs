// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Store errors
//!
//! Errors raised by storage backends and by the journal. Backend failures are reported as
//! `CreateStore`, `Get` or `Store`; a missing key is `EntryNotFound`, which callers may treat as
//! a normal condition. The journal adds the errors of its own invariants: events that can not
//! be (de)serialised or (de)ciphered, and a log whose sequence numbers are not contiguous or
//! were advanced by another writer.
//!

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the store crate.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq)]
pub enum Error {
    /// The backend could not create or open a collection.
    #[error("Can't create store: {0}")]
    CreateStore(String),
    /// The backend failed while reading.
    #[error("Get error: {0}")]
    Get(String),
    /// The key is not in the collection.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),
    /// The backend failed while writing.
    #[error("Store error: {0}")]
    Store(String),
    /// An event could not be serialised or deserialised.
    #[error("Serialization error: {0}")]
    Serialize(String),
    /// An event could not be encrypted or decrypted.
    #[error("Crypto error: {0}")]
    Crypto(String),
    /// Replay found a hole in the sequence numbers.
    #[error("Sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },
    /// A key of the log is not a sequence number.
    #[error("Corrupted journal: {0}")]
    Corrupted(String),
    /// The log moved since this journal last wrote to it.
    #[error("Journal conflict: expected sequence {expected}, found {found}")]
    Conflict { expected: u64, found: u64 },
}
