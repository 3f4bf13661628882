use std::collections::HashMap;
use std::sync::RwLock;

use futures::future::{BoxFuture, FutureExt};

use crate::errors::BackendError;
use crate::store::Store;

/// An in-memory store for tests: lets them assert exactly which files
/// are left staged after a request.
#[derive(Default)]
pub struct MockStore {
    map: RwLock<HashMap<String, Vec<u8>>>,
}

impl MockStore {
    pub fn new() -> Self {
        MockStore::default()
    }

    pub fn staged_count(&self) -> usize {
        self.map.read().unwrap().len()
    }

    pub fn contains(&self, stored_name: &str) -> bool {
        self.map.read().unwrap().contains_key(stored_name)
    }
}

impl Store for MockStore {
    fn save(&self, stored_name: &str, raw: Vec<u8>) -> BoxFuture<Result<(), BackendError>> {
        self.map.write().unwrap().insert(stored_name.to_owned(), raw);

        async { Ok(()) }.boxed()
    }

    fn delete(&self, stored_name: &str) -> BoxFuture<Result<(), BackendError>> {
        self.map.write().unwrap().remove(stored_name);

        async { Ok(()) }.boxed()
    }
}
