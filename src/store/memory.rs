// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-process [`ObjectStore`] with resource-version checks.
//!
//! Used by the test suite and by the CLI dry-run mode. Objects are kept as JSON so any
//! [`StoredObject`] kind can share the same map. Every successful write bumps a
//! store-wide resource version, mirroring the optimistic concurrency of the API server.

use super::{object_name, ObjectStore, StoredObject};
use crate::errors::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

type ObjectKey = (String, String, String);

#[derive(Default)]
struct Inner {
    objects: BTreeMap<ObjectKey, serde_json::Value>,
    resource_version: u64,
    writes: u64,
}

/// Thread-safe in-memory object store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn key<K: StoredObject>(namespace: &str, name: &str) -> ObjectKey {
    (
        format!("{}/{}", K::api_version(&()), K::kind(&())),
        namespace.to_string(),
        name.to_string(),
    )
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of successful create and replace calls so far
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.lock().writes
    }

    /// Number of objects currently stored
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    /// True when no object is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }

    /// Every stored object as JSON, ordered by kind, namespace and name.
    #[must_use]
    pub fn objects(&self) -> Vec<serde_json::Value> {
        self.lock().objects.values().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: StoredObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        let value = self.lock().objects.get(&key::<K>(namespace, name)).cloned();
        match value {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn create<K: StoredObject>(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let name = object_name(object)?;
        let key = key::<K>(namespace, &name);
        let mut inner = self.lock();

        if inner.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: K::kind(&()).to_string(),
                namespace: namespace.to_string(),
                name,
            });
        }

        inner.resource_version += 1;
        inner.writes += 1;
        let mut stored = object.clone();
        let meta = stored.meta_mut();
        meta.namespace = Some(namespace.to_string());
        meta.resource_version = Some(inner.resource_version.to_string());
        meta.uid = Some(format!("uid-{}", inner.resource_version));

        inner.objects.insert(key, serde_json::to_value(&stored)?);
        Ok(stored)
    }

    async fn replace<K: StoredObject>(
        &self,
        namespace: &str,
        object: &K,
    ) -> Result<K, StoreError> {
        let name = object_name(object)?;
        let key = key::<K>(namespace, &name);
        let mut inner = self.lock();

        let Some(current) = inner.objects.get(&key) else {
            return Err(StoreError::NotFound {
                kind: K::kind(&()).to_string(),
                namespace: namespace.to_string(),
                name,
            });
        };
        let current: K = serde_json::from_value(current.clone())?;

        // Like the API server, a replace without a resource version is unconditional
        if let Some(sent) = object.meta().resource_version.as_deref() {
            if current.meta().resource_version.as_deref() != Some(sent) {
                return Err(StoreError::Conflict {
                    kind: K::kind(&()).to_string(),
                    namespace: namespace.to_string(),
                    name,
                    resource_version: sent.to_string(),
                });
            }
        }

        inner.resource_version += 1;
        inner.writes += 1;
        let mut stored = object.clone();
        let meta = stored.meta_mut();
        meta.namespace = Some(namespace.to_string());
        meta.resource_version = Some(inner.resource_version.to_string());
        meta.uid.clone_from(&current.meta().uid);

        inner.objects.insert(key, serde_json::to_value(&stored)?);
        Ok(stored)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
