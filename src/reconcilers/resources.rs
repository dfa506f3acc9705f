// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic get-or-create-then-mutate helpers for owned objects.
//!
//! Every object this crate owns (config maps, secrets, pods, service accounts, roles,
//! role bindings, services) is reconciled the same way: fetch it by name, apply the
//! desired labels, owner references and spec fields inside one mutate step, then let
//! the store decide between create and update. Unchanged objects are not written, so a
//! second call with the same inputs performs no writes at all.
//!
//! # Example
//!
//! ```rust,no_run
//! use pvc_transfer::reconcilers::resources::create_or_update;
//! use pvc_transfer::store::MemoryStore;
//! use k8s_openapi::api::core::v1::ServiceAccount;
//!
//! async fn example(store: &MemoryStore) -> Result<(), pvc_transfer::errors::TransferError> {
//!     let (_sa, result) = create_or_update(store, "apps", "mover", |sa: &mut ServiceAccount| {
//!         sa.automount_service_account_token = Some(false);
//!         Ok(())
//!     })
//!     .await?;
//!     println!("service account {}", result.as_str());
//!     Ok(())
//! }
//! ```

use crate::context::ReconcileContext;
use crate::errors::TransferError;
use crate::metrics::{record_error, record_resource_operation};
use crate::store::{ObjectStore, StoredObject};
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// What a create-or-update call did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// Object did not exist and was created
    Created,
    /// Object existed and the mutation changed it
    Updated,
    /// Object existed and already matched
    Unchanged,
}

impl OperationResult {
    /// Lower-case name used in logs and metric labels
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Create or update an object through a single mutate step.
///
/// The mutate closure receives either the stored object or, when none exists, a
/// default object carrying only `name` and `namespace`. A new object can be told apart
/// by its missing `resourceVersion`.
///
/// # Errors
///
/// Returns an error if:
/// - the mutate closure fails
/// - any store round-trip fails, including a lost optimistic-concurrency race
pub async fn create_or_update<S, K, F>(
    store: &S,
    namespace: &str,
    name: &str,
    mutate: F,
) -> Result<(K, OperationResult), TransferError>
where
    S: ObjectStore,
    K: StoredObject + PartialEq,
    F: FnOnce(&mut K) -> Result<(), TransferError> + Send,
{
    let kind = K::kind(&()).to_string();

    debug!(
        namespace = %namespace,
        name = %name,
        kind = %kind,
        "Creating or updating resource"
    );

    let result = create_or_update_inner(store, namespace, name, mutate).await;
    match &result {
        Ok((_, operation)) => record_resource_operation(&kind, operation.as_str()),
        Err(e) => record_error(&kind, e.error_type()),
    }
    result
}

async fn create_or_update_inner<S, K, F>(
    store: &S,
    namespace: &str,
    name: &str,
    mutate: F,
) -> Result<(K, OperationResult), TransferError>
where
    S: ObjectStore,
    K: StoredObject + PartialEq,
    F: FnOnce(&mut K) -> Result<(), TransferError> + Send,
{
    let kind = K::kind(&());

    match store.get::<K>(namespace, name).await? {
        None => {
            let mut object = K::default();
            let meta = object.meta_mut();
            meta.name = Some(name.to_string());
            meta.namespace = Some(namespace.to_string());
            mutate(&mut object)?;

            let created = store.create(namespace, &object).await?;
            info!("Created {} {}/{}", kind, namespace, name);
            Ok((created, OperationResult::Created))
        }
        Some(current) => {
            let mut desired = current.clone();
            mutate(&mut desired)?;

            if desired == current {
                debug!("{} {}/{} is up to date", kind, namespace, name);
                return Ok((current, OperationResult::Unchanged));
            }

            let updated = store.replace(namespace, &desired).await?;
            info!("Updated {} {}/{}", kind, namespace, name);
            Ok((updated, OperationResult::Updated))
        }
    }
}

/// Create a pod, or refresh only the metadata of an existing one.
///
/// Once a pod has been observed in the store its spec is never touched again, so a
/// running transfer cannot be restarted by a later reconciliation pass. Labels,
/// annotations and owner references are merged on every call.
///
/// # Errors
///
/// Returns an error if any store round-trip fails.
pub async fn create_or_update_pod<S: ObjectStore>(
    store: &S,
    namespace: &str,
    name: &str,
    context: &ReconcileContext,
    labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
    spec: PodSpec,
) -> Result<(Pod, OperationResult), TransferError> {
    create_or_update(store, namespace, name, |pod: &mut Pod| {
        context.apply_labels_to(&mut pod.metadata, labels);
        if !annotations.is_empty() {
            let current = pod.metadata.annotations.get_or_insert_with(BTreeMap::new);
            for (key, value) in annotations {
                current.insert(key.clone(), value.clone());
            }
        }

        if pod.metadata.resource_version.is_none() {
            pod.spec = Some(spec);
        } else {
            debug!(
                namespace = %namespace,
                name = %name,
                "Pod already exists, leaving its spec untouched"
            );
        }
        Ok(())
    })
    .await
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
