// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Object store abstraction.
//!
//! Reconciliation only needs three round-trips: read an object by name, create it, and
//! replace it conditionally on the resource version it was read at. [`ObjectStore`]
//! captures exactly that, so the same reconciliation code runs against the Kubernetes
//! API ([`KubeStore`]) and against an in-process map ([`MemoryStore`]) used for tests
//! and dry runs.
//!
//! Concurrency safety is delegated to the store: a replace carrying a stale resource
//! version fails with [`StoreError::Conflict`] and is not retried here.

use crate::errors::StoreError;
use async_trait::async_trait;
use kube::core::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

pub mod kube_store;
pub mod memory;

pub use kube_store::KubeStore;
pub use memory::MemoryStore;

/// Namespaced Kubernetes object that can be kept in an [`ObjectStore`].
pub trait StoredObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Default
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> StoredObject for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Default
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Get/create/replace access to namespaced objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object by name, `None` if it does not exist.
    async fn get<K: StoredObject>(&self, namespace: &str, name: &str)
        -> Result<Option<K>, StoreError>;

    /// Create an object; fails with [`StoreError::AlreadyExists`] if the name is taken.
    async fn create<K: StoredObject>(&self, namespace: &str, object: &K) -> Result<K, StoreError>;

    /// Replace an object; fails with [`StoreError::Conflict`] if its resource version is stale.
    async fn replace<K: StoredObject>(&self, namespace: &str, object: &K)
        -> Result<K, StoreError>;
}

/// Name of an object, or [`StoreError::MissingName`].
pub(crate) fn object_name<K: StoredObject>(object: &K) -> Result<String, StoreError> {
    object
        .meta()
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| StoreError::MissingName {
            kind: K::kind(&()).to_string(),
        })
}
