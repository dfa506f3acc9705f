// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Mark-for-cleanup: the first phase of a two-phase teardown.
//!
//! Marking only writes a caller-chosen label onto every owned object. Nothing is
//! deleted here; an external garbage-collection pass keyed on that label removes the
//! objects later, which keeps "this transfer is logically done" apart from "these
//! objects may now be reclaimed".

use crate::errors::TransferError;
use crate::metrics::{record_cleanup_mark, record_error};
use crate::store::{ObjectStore, StoredObject};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Kinds of objects owned by transports, endpoints and transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OwnedKind {
    ConfigMap,
    Secret,
    Pod,
    ServiceAccount,
    Role,
    RoleBinding,
    Service,
}

impl fmt::Display for OwnedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::ConfigMap => "ConfigMap",
            Self::Secret => "Secret",
            Self::Pod => "Pod",
            Self::ServiceAccount => "ServiceAccount",
            Self::Role => "Role",
            Self::RoleBinding => "RoleBinding",
            Self::Service => "Service",
        };
        f.write_str(kind)
    }
}

/// Reference to one owned object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OwnedObject {
    pub kind: OwnedKind,
    pub namespace: String,
    pub name: String,
}

impl OwnedObject {
    #[must_use]
    pub fn new(kind: OwnedKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for OwnedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Set `key=value` on one object.
///
/// Returns `true` when the label was written, `false` when it was already present or
/// the object does not exist.
///
/// # Errors
///
/// Returns an error if a store round-trip fails.
pub async fn mark_for_cleanup<S, K>(
    store: &S,
    namespace: &str,
    name: &str,
    key: &str,
    value: &str,
) -> Result<bool, TransferError>
where
    S: ObjectStore,
    K: StoredObject,
{
    let kind = K::kind(&());

    let Some(mut object) = store.get::<K>(namespace, name).await? else {
        debug!(
            namespace = %namespace,
            name = %name,
            kind = %kind,
            "Object not found, nothing to mark for cleanup"
        );
        return Ok(false);
    };

    let labels = object.meta_mut().labels.get_or_insert_with(BTreeMap::new);
    if labels.get(key).map(String::as_str) == Some(value) {
        debug!("{} {}/{} already marked for cleanup", kind, namespace, name);
        return Ok(false);
    }
    labels.insert(key.to_string(), value.to_string());

    store.replace(namespace, &object).await?;
    record_cleanup_mark(&kind);
    info!(
        "Marked {} {}/{} for cleanup with {}={}",
        kind, namespace, name, key, value
    );
    Ok(true)
}

/// Mark every object in `objects`, continuing past failures.
///
/// # Errors
///
/// Returns the collected errors (see [`TransferError::from_errors`]).
pub async fn mark_all_for_cleanup<S: ObjectStore>(
    store: &S,
    objects: &[OwnedObject],
    key: &str,
    value: &str,
) -> Result<(), TransferError> {
    let mut errors = Vec::new();

    for object in objects {
        let ns = object.namespace.as_str();
        let name = object.name.as_str();
        let result = match object.kind {
            OwnedKind::ConfigMap => mark_for_cleanup::<S, ConfigMap>(store, ns, name, key, value).await,
            OwnedKind::Secret => mark_for_cleanup::<S, Secret>(store, ns, name, key, value).await,
            OwnedKind::Pod => mark_for_cleanup::<S, Pod>(store, ns, name, key, value).await,
            OwnedKind::ServiceAccount => {
                mark_for_cleanup::<S, ServiceAccount>(store, ns, name, key, value).await
            }
            OwnedKind::Role => mark_for_cleanup::<S, Role>(store, ns, name, key, value).await,
            OwnedKind::RoleBinding => {
                mark_for_cleanup::<S, RoleBinding>(store, ns, name, key, value).await
            }
            OwnedKind::Service => mark_for_cleanup::<S, Service>(store, ns, name, key, value).await,
        };

        if let Err(e) = result {
            record_error(&object.kind.to_string(), e.error_type());
            errors.push(e);
        }
    }

    TransferError::from_errors(errors)
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod cleanup_tests;
