// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Memory store implementation.
//!

use crate::{
    database::{Collection, DbManager},
    error::Error,
};

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
};

type Entries = Arc<RwLock<BTreeMap<String, Vec<u8>>>>;

type MemoryData = Arc<RwLock<HashMap<(String, String), Entries>>>;

/// In-memory backend. Clones share the same data, so a collection reopened through any clone
/// sees what was written before.
#[derive(Default, Clone)]
pub struct MemoryManager {
    data: MemoryData,
}

impl DbManager<MemoryStore> for MemoryManager {
    fn create_collection(
        &self,
        name: &str,
        prefix: &str,
    ) -> Result<MemoryStore, Error> {
        let mut data_lock = self.data.write().map_err(|e| {
            Error::CreateStore(format!("Can not lock manager data: {}", e))
        })?;
        let data = data_lock
            .entry((name.to_owned(), prefix.to_owned()))
            .or_default()
            .clone();

        Ok(MemoryStore {
            name: name.to_owned(),
            data,
        })
    }
}

/// A collection stored in memory.
///
#[derive(Default, Clone)]
pub struct MemoryStore {
    name: String,
    data: Entries,
}

impl Collection for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, Error> {
        let lock = self
            .data
            .read()
            .map_err(|e| Error::Get(format!("Can not lock data: {}", e)))?;

        match lock.get(key) {
            Some(value) => Ok(value.clone()),
            None => Err(Error::EntryNotFound(key.to_owned())),
        }
    }

    fn put(&mut self, key: &str, data: &[u8]) -> Result<(), Error> {
        let mut lock = self
            .data
            .write()
            .map_err(|e| Error::Store(format!("Can not lock data: {}", e)))?;
        lock.insert(key.to_owned(), data.to_vec());

        Ok(())
    }

    // One write lock for the whole batch.
    fn put_batch(&mut self, items: &[(String, Vec<u8>)]) -> Result<(), Error> {
        let mut lock = self
            .data
            .write()
            .map_err(|e| Error::Store(format!("Can not lock data: {}", e)))?;
        for (key, data) in items {
            lock.insert(key.clone(), data.clone());
        }
        Ok(())
    }

    fn del(&mut self, key: &str) -> Result<(), Error> {
        let mut lock = self
            .data
            .write()
            .map_err(|e| Error::Store(format!("Can not lock data: {}", e)))?;
        match lock.remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::EntryNotFound(key.to_owned())),
        }
    }

    fn purge(&mut self) -> Result<(), Error> {
        let mut lock = self
            .data
            .write()
            .map_err(|e| Error::Store(format!("Can not lock data: {}", e)))?;
        lock.clear();
        Ok(())
    }

    fn iter<'a>(
        &'a self,
        reverse: bool,
    ) -> Box<dyn Iterator<Item = (String, Vec<u8>)> + 'a> {
        let Ok(lock) = self.data.read() else {
            return Box::new(std::iter::empty());
        };

        // Snapshot, so the lock is not held while the caller iterates.
        let items: Vec<(String, Vec<u8>)> = if reverse {
            lock.iter()
                .rev()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        } else {
            lock.iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        };

        Box::new(items.into_iter())
    }
}
