// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Storage seam
//!
//! A `DbManager` opens `Collection`s: ordered maps of string keys to raw bytes, identified by a
//! name and a prefix. The journal keeps one collection per persistence id, so a backend only
//! needs ordered iteration and single-key reads and writes. `put_batch` has a default
//! implementation on top of `put` and `del`; backends able to write several keys atomically
//! should override it.
//!

use crate::error::Error;

use tracing::{debug, error};

/// Opens collections on one storage backend.
pub trait DbManager<C>: Sync + Send + Clone
where
    C: Collection + 'static,
{
    /// Opens, creating it if needed, the collection `name` for `prefix`. Collections opened
    /// twice with the same name and prefix see the same data.
    fn create_collection(&self, name: &str, prefix: &str) -> Result<C, Error>;
}

/// Ordered key-value collection.
///
/// Keys are compared lexicographically; iteration follows that order.
pub trait Collection: Sync + Send + 'static {
    fn name(&self) -> &str;

    /// Value stored under `key`, `Error::EntryNotFound` if there is none.
    fn get(&self, key: &str) -> Result<Vec<u8>, Error>;

    /// Stores `data` under `key`, replacing any previous value.
    fn put(&mut self, key: &str, data: &[u8]) -> Result<(), Error>;

    /// Stores every pair or none of them.
    ///
    /// The default implementation writes one key at a time and, when a write fails, restores
    /// the keys it already wrote before returning the error.
    fn put_batch(&mut self, items: &[(String, Vec<u8>)]) -> Result<(), Error> {
        let mut written: Vec<(String, Option<Vec<u8>>)> = Vec::new();
        for (key, data) in items {
            let previous = match self.get(key) {
                Ok(previous) => Some(previous),
                Err(Error::EntryNotFound(_)) => None,
                Err(e) => {
                    self.rollback(written);
                    return Err(e);
                }
            };
            if let Err(e) = self.put(key, data) {
                error!("Batch write failed at key {}: {}", key, e);
                self.rollback(written);
                return Err(e);
            }
            written.push((key.clone(), previous));
        }
        Ok(())
    }

    /// Undoes the writes of a failed `put_batch`, newest first.
    #[doc(hidden)]
    fn rollback(&mut self, written: Vec<(String, Option<Vec<u8>>)>) {
        for (key, previous) in written.into_iter().rev() {
            let result = match previous {
                Some(data) => self.put(&key, &data),
                None => self.del(&key),
            };
            if let Err(e) = result {
                error!("Can't roll back key {}: {}", key, e);
            }
        }
    }

    /// Removes `key`, `Error::EntryNotFound` if there is none.
    fn del(&mut self, key: &str) -> Result<(), Error>;

    /// Entry with the greatest key.
    fn last(&self) -> Option<(String, Vec<u8>)> {
        let mut iter = self.iter(true);
        let value = iter.next();
        debug!("Last value: {:?}", value.as_ref().map(|(key, _)| key));
        value
    }

    /// Removes every entry of the collection.
    fn purge(&mut self) -> Result<(), Error>;

    /// Iterates in key order, or reverse key order.
    fn iter<'a>(
        &'a self,
        reverse: bool,
    ) -> Box<dyn Iterator<Item = (String, Vec<u8>)> + 'a>;
}

/// Generates the conformance tests every `DbManager`/`Collection` pair must pass.
#[macro_export]
macro_rules! test_store_trait {
    ($name:ident: $type:ty: $type2:ty) => {
        #[cfg(test)]
        mod $name {
            use super::*;
            use $crate::error::Error;

            #[test]
            fn test_create_collection() {
                let manager = <$type>::default();
                let store: $type2 =
                    manager.create_collection("test", "test").unwrap();
                assert_eq!(Collection::name(&store), "test");
            }

            #[test]
            fn test_put_get_del() {
                let manager = <$type>::default();
                let mut store: $type2 =
                    manager.create_collection("test", "test").unwrap();
                Collection::put(&mut store, "key", b"value").unwrap();
                assert_eq!(Collection::get(&store, "key").unwrap(), b"value");
                Collection::del(&mut store, "key").unwrap();
                assert!(matches!(
                    Collection::get(&store, "key"),
                    Err(Error::EntryNotFound(_))
                ));
                assert!(matches!(
                    Collection::del(&mut store, "key"),
                    Err(Error::EntryNotFound(_))
                ));
            }

            #[test]
            fn test_prefixes_are_isolated() {
                let manager = <$type>::default();
                let mut first: $type2 =
                    manager.create_collection("test", "device-1").unwrap();
                let second: $type2 =
                    manager.create_collection("test", "device-10").unwrap();
                Collection::put(&mut first, "1", b"a").unwrap();
                assert_eq!(second.iter(false).count(), 0);

                let reopened: $type2 =
                    manager.create_collection("test", "device-1").unwrap();
                assert_eq!(Collection::get(&reopened, "1").unwrap(), b"a");
            }

            #[test]
            fn test_iter_and_last() {
                let manager = <$type>::default();
                let mut store: $type2 =
                    manager.create_collection("test", "test").unwrap();
                Collection::put(&mut store, "key2", b"value2").unwrap();
                Collection::put(&mut store, "key1", b"value1").unwrap();
                Collection::put(&mut store, "key3", b"value3").unwrap();
                let keys: Vec<String> =
                    store.iter(false).map(|(key, _)| key).collect();
                assert_eq!(keys, vec!["key1", "key2", "key3"]);
                let keys: Vec<String> =
                    store.iter(true).map(|(key, _)| key).collect();
                assert_eq!(keys, vec!["key3", "key2", "key1"]);
                assert_eq!(
                    store.last(),
                    Some(("key3".to_string(), b"value3".to_vec()))
                );
            }

            #[test]
            fn test_put_batch() {
                let manager = <$type>::default();
                let mut store: $type2 =
                    manager.create_collection("test", "test").unwrap();
                let items = vec![
                    ("a".to_owned(), b"1".to_vec()),
                    ("b".to_owned(), b"2".to_vec()),
                ];
                store.put_batch(&items).unwrap();
                assert_eq!(store.iter(false).count(), 2);
            }

            #[test]
            fn test_purge() {
                let manager = <$type>::default();
                let mut store: $type2 =
                    manager.create_collection("test", "test").unwrap();
                Collection::put(&mut store, "key1", b"value1").unwrap();
                Collection::put(&mut store, "key2", b"value2").unwrap();
                store.purge().unwrap();
                assert_eq!(store.iter(false).count(), 0);
            }
        }
    };
}
