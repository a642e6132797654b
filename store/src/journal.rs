// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Journal
//!
//! The append-only event log of one persistence id, run as a child actor of the persistent
//! actor that owns it. Every event gets the next sequence number, starting at 1, and is stored
//! under that number zero-padded, so the key order of the collection is the sequence order.
//!
//! Events are serialised with `bincode`. When the journal is given a password they are
//! encrypted with ChaCha20-Poly1305 before reaching the collection; the key is kept in an
//! `EncryptedMem` and only decrypted for the duration of one operation.
//!

use crate::{database::Collection, error::Error};

use actor::{
    Actor, ActorContext, ActorPath, Error as ActorError, Event, Handler,
    Message, Response,
};

use async_trait::async_trait;

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use memsecurity::EncryptedMem;

use tracing::{debug, error};

use std::marker::PhantomData;

const NONCE_SIZE: usize = 12;

/// Name of the journal child under its persistent actor.
pub const JOURNAL: &str = "journal";

/// Storage key of a sequence number.
pub fn sequence_key(sequence_nr: u64) -> String {
    format!("{:020}", sequence_nr)
}

fn parse_sequence_key(key: &str) -> Result<u64, Error> {
    key.parse::<u64>()
        .map_err(|e| Error::Corrupted(format!("Invalid key {}: {}", key, e)))
}

/// Event log actor.
pub struct Journal<E: Event> {
    events: Box<dyn Collection>,
    key_box: Option<EncryptedMem>,
    highest_sequence_nr: u64,
    _phantom_event: PhantomData<E>,
}

impl<E: Event> Journal<E> {
    /// Opens the journal over `events`, continuing after the last stored sequence number.
    ///
    /// # Errors
    ///
    /// `Error::Crypto` if the password can not be protected in memory, `Error::Corrupted` if
    /// the last key of the collection is not a sequence number.
    ///
    pub fn new(
        events: Box<dyn Collection>,
        password: Option<[u8; 32]>,
    ) -> Result<Self, Error> {
        let key_box = match password {
            Some(key) => {
                let mut key_box = EncryptedMem::new();
                key_box.encrypt(&key).map_err(|_| {
                    Error::Crypto("Can't encrypt password.".to_owned())
                })?;
                Some(key_box)
            }
            None => None,
        };
        let mut journal = Self {
            events,
            key_box,
            highest_sequence_nr: 0,
            _phantom_event: PhantomData,
        };
        journal.highest_sequence_nr = journal.stored_sequence_nr()?;
        Ok(journal)
    }

    /// Highest sequence number currently in the collection.
    fn stored_sequence_nr(&self) -> Result<u64, Error> {
        match self.events.last() {
            Some((key, _)) => parse_sequence_key(&key),
            None => Ok(0),
        }
    }

    /// Appends `events` as one batch and returns the sequence number of the last one.
    fn append(&mut self, events: &[E]) -> Result<u64, Error> {
        if events.is_empty() {
            return Ok(self.highest_sequence_nr);
        }
        let stored = self.stored_sequence_nr()?;
        if stored != self.highest_sequence_nr {
            error!(
                "Journal {} moved to {} behind our back, expected {}",
                self.events.name(),
                stored,
                self.highest_sequence_nr
            );
            return Err(Error::Conflict {
                expected: self.highest_sequence_nr,
                found: stored,
            });
        }

        let mut items = Vec::with_capacity(events.len());
        let mut sequence_nr = self.highest_sequence_nr;
        for event in events {
            sequence_nr += 1;
            debug!("Persisting event {}: {:?}", sequence_nr, event);
            items.push((sequence_key(sequence_nr), self.encode(event)?));
        }
        self.events.put_batch(&items)?;
        self.highest_sequence_nr = sequence_nr;
        Ok(sequence_nr)
    }

    /// Every stored event in sequence order.
    fn replay(&mut self) -> Result<Vec<(u64, E)>, Error> {
        let mut events = Vec::new();
        let mut expected = 1;
        for (key, data) in self.events.iter(false) {
            let sequence_nr = parse_sequence_key(&key)?;
            if sequence_nr != expected {
                error!(
                    "Gap in journal {}: expected {}, found {}",
                    self.events.name(),
                    expected,
                    sequence_nr
                );
                return Err(Error::SequenceGap {
                    expected,
                    found: sequence_nr,
                });
            }
            events.push((sequence_nr, self.decode(&data)?));
            expected += 1;
        }
        self.highest_sequence_nr = expected - 1;
        debug!(
            "Replayed {} events from {}",
            events.len(),
            self.events.name()
        );
        Ok(events)
    }

    fn purge(&mut self) -> Result<(), Error> {
        self.events.purge()?;
        self.highest_sequence_nr = 0;
        Ok(())
    }

    fn encode(&self, event: &E) -> Result<Vec<u8>, Error> {
        let bytes = bincode::serialize(event).map_err(|e| {
            error!("Can't serialize event: {}", e);
            Error::Serialize(format!("Can't serialize event: {}", e))
        })?;
        match &self.key_box {
            Some(key_box) => {
                let key = key_box.decrypt().map_err(|_| {
                    Error::Crypto("Can't decrypt key".to_owned())
                })?;
                encrypt(key.as_ref(), &bytes)
            }
            None => Ok(bytes),
        }
    }

    fn decode(&self, data: &[u8]) -> Result<E, Error> {
        let bytes = match &self.key_box {
            Some(key_box) => {
                let key = key_box.decrypt().map_err(|_| {
                    Error::Crypto("Can't decrypt key".to_owned())
                })?;
                decrypt(key.as_ref(), data)?
            }
            None => data.to_vec(),
        };
        bincode::deserialize(&bytes).map_err(|e| {
            error!("Can't deserialize event: {}", e);
            Error::Serialize(format!("Can't deserialize event: {}", e))
        })
    }
}

fn encrypt(key: &[u8], bytes: &[u8]) -> Result<Vec<u8>, Error> {
    let cipher = ChaCha20Poly1305::new(key.into());
    // 96 bits, unique per message.
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext: Vec<u8> = cipher
        .encrypt(&nonce, bytes)
        .map_err(|e| Error::Crypto(format!("Encrypt error: {}", e)))?;

    Ok([nonce.to_vec(), ciphertext].concat())
}

fn decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    let cipher = ChaCha20Poly1305::new(key.into());
    let (Some(nonce), Some(ciphertext)) =
        (ciphertext.get(..NONCE_SIZE), ciphertext.get(NONCE_SIZE..))
    else {
        return Err(Error::Crypto("Ciphertext too short".to_owned()));
    };
    let nonce = Nonce::from_slice(nonce);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| Error::Crypto(format!("Decrypt error: {}", e)))
}

/// Journal commands.
#[derive(Debug, Clone)]
pub enum JournalCommand<E> {
    /// Append the events as one batch.
    Append(Vec<E>),
    /// Read back every event.
    Replay,
    HighestSequenceNr,
    /// Erase the log.
    Purge,
}

impl<E: Event> Message for JournalCommand<E> {}

/// Journal responses. Storage failures are answered as `Error`, the journal keeps running.
#[derive(Debug, Clone)]
pub enum JournalResponse<E> {
    Appended(u64),
    Events(Vec<(u64, E)>),
    SequenceNr(u64),
    None,
    Error(Error),
}

impl<E: Event> Response for JournalResponse<E> {}

#[async_trait]
impl<E: Event> Actor for Journal<E> {
    type Message = JournalCommand<E>;
    type Response = JournalResponse<E>;
    type Event = ();
}

#[async_trait]
impl<E: Event> Handler<Journal<E>> for Journal<E> {
    async fn handle_message(
        &mut self,
        _sender: ActorPath,
        msg: JournalCommand<E>,
        _ctx: &mut ActorContext<Journal<E>>,
    ) -> Result<JournalResponse<E>, ActorError> {
        let response = match msg {
            JournalCommand::Append(events) => match self.append(&events) {
                Ok(sequence_nr) => JournalResponse::Appended(sequence_nr),
                Err(e) => JournalResponse::Error(e),
            },
            JournalCommand::Replay => match self.replay() {
                Ok(events) => JournalResponse::Events(events),
                Err(e) => JournalResponse::Error(e),
            },
            JournalCommand::HighestSequenceNr => {
                JournalResponse::SequenceNr(self.highest_sequence_nr)
            }
            JournalCommand::Purge => match self.purge() {
                Ok(_) => {
                    debug!("Purged journal {}", self.events.name());
                    JournalResponse::None
                }
                Err(e) => JournalResponse::Error(e),
            },
        };
        Ok(response)
    }
}
