//! Last seen object per resource key.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::model::{Application, ResourceKey};

#[derive(Debug, Default)]
pub struct ObjectCache {
    objects: RwLock<HashMap<ResourceKey, Arc<Application>>>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the object and returns the one it replaced.
    pub fn insert(&self, app: Application) -> Option<Arc<Application>> {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(app.key(), Arc::new(app))
    }

    pub fn get(&self, key: &ResourceKey) -> Option<Arc<Application>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn remove(&self, key: &ResourceKey) -> Option<Arc<Application>> {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }
}
