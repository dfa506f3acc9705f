// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! [`ObjectStore`] backed by the Kubernetes API server.

use super::{object_name, ObjectStore, StoredObject};
use crate::constants::FIELD_MANAGER;
use crate::errors::StoreError;
use async_trait::async_trait;
use kube::api::PostParams;
use kube::{Api, Client};
use tracing::debug;

/// Object store talking to a live cluster through a kube client.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    /// Wrap a client; writes are recorded under the `pvc-transfer` field manager.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: FIELD_MANAGER.to_string(),
        }
    }

    /// Override the field manager recorded on writes.
    #[must_use]
    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

/// Translate API status codes the reconcilers care about into typed store errors.
pub(crate) fn map_write_error(
    error: kube::Error,
    kind: &str,
    namespace: &str,
    name: &str,
    resource_version: Option<&str>,
) -> StoreError {
    match error {
        kube::Error::Api(ref response) if response.code == 409 => {
            match resource_version {
                // A create only conflicts when the name is already taken
                None => StoreError::AlreadyExists {
                    kind: kind.to_string(),
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                },
                Some(rv) => StoreError::Conflict {
                    kind: kind.to_string(),
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    resource_version: rv.to_string(),
                },
            }
        }
        kube::Error::Api(ref response) if response.code == 404 => StoreError::NotFound {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        other => StoreError::Kube(other),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoredObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);

        debug!(
            namespace = %namespace,
            name = %name,
            kind = %K::kind(&()),
            "Fetching resource"
        );

        Ok(api.get_opt(name).await?)
    }

    async fn create<K: StoredObject>(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let name = object_name(object)?;
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);

        api.create(&self.post_params(), object)
            .await
            .map_err(|e| map_write_error(e, &K::kind(&()), namespace, &name, None))
    }

    async fn replace<K: StoredObject>(
        &self,
        namespace: &str,
        object: &K,
    ) -> Result<K, StoreError> {
        let name = object_name(object)?;
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let resource_version = object.meta().resource_version.clone().unwrap_or_default();

        api.replace(&name, &self.post_params(), object)
            .await
            .map_err(|e| {
                map_write_error(
                    e,
                    &K::kind(&()),
                    namespace,
                    &name,
                    Some(&resource_version),
                )
            })
    }
}

#[cfg(test)]
#[path = "kube_store_tests.rs"]
mod kube_store_tests;
