use std::collections::HashMap;
use std::sync::RwLock;

use futures::future::{BoxFuture, FutureExt};

use crate::errors::BackendError;
use crate::store::Store;

/// A store that keeps everything in memory. Useful for tests and local
/// development.
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<HashMap<String, StoredObject>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredObject {
    pub content_type: String,
    pub raw: Vec<u8>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.map
            .read()
            .expect("memory store lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.map.read().expect("memory store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemoryStore {
    fn save(
        &self,
        key: &str,
        content_type: String,
        raw: Vec<u8>,
    ) -> BoxFuture<Result<(), BackendError>> {
        self.map
            .write()
            .expect("memory store lock poisoned")
            .insert(key.to_owned(), StoredObject { content_type, raw });

        futures::future::ready(Ok(())).boxed()
    }

    fn retrieve(&self, key: &str) -> BoxFuture<Result<Vec<u8>, BackendError>> {
        let result = self
            .get(key)
            .map(|object| object.raw)
            .ok_or_else(|| BackendError::FileNotFound(key.to_owned()));

        futures::future::ready(result).boxed()
    }

    fn delete(&self, key: &str) -> BoxFuture<Result<(), BackendError>> {
        self.map
            .write()
            .expect("memory store lock poisoned")
            .remove(key);

        futures::future::ready(Ok(())).boxed()
    }
}
