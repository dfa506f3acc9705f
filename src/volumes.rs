// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Volume sets: the claims moved by one transfer.
//!
//! A [`VolumeSet`] is built once per reconciliation call from caller-supplied claims,
//! is immutable afterwards and is never persisted. All claims belong to one namespace.

use crate::constants::SINGLETON_LABEL_SAFE_NAME;
use crate::errors::TransferError;
use crate::naming::{identity_suffix, label_safe_name, TransferIdentity};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::ResourceExt;
use std::collections::BTreeSet;

/// One claim of a volume set together with its label-safe name.
#[derive(Clone, Debug)]
pub struct TransferVolume {
    claim: PersistentVolumeClaim,
    label_safe_name: String,
}

impl TransferVolume {
    /// The underlying claim
    #[must_use]
    pub fn claim(&self) -> &PersistentVolumeClaim {
        &self.claim
    }

    /// Name of the claim
    #[must_use]
    pub fn name(&self) -> String {
        self.claim.name_any()
    }

    /// Namespace of the claim
    #[must_use]
    pub fn namespace(&self) -> String {
        self.claim.namespace().unwrap_or_default()
    }

    /// Hash-derived name usable as module name, volume name and label value
    #[must_use]
    pub fn label_safe_name(&self) -> &str {
        &self.label_safe_name
    }

    /// Directory the claim is mounted at inside mover pods
    #[must_use]
    pub fn mount_path(&self) -> String {
        format!(
            "{}/{}/{}",
            crate::constants::VOLUME_MOUNT_ROOT,
            self.namespace(),
            self.label_safe_name
        )
    }
}

/// Ordered, single-namespace collection of claims.
#[derive(Clone, Debug)]
pub struct VolumeSet {
    namespace: String,
    volumes: Vec<TransferVolume>,
}

impl VolumeSet {
    /// Build a volume set, sorted by `namespace/name`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `claims` is empty
    /// - any claim has no namespace
    /// - the claims span more than one namespace
    pub fn new(claims: Vec<PersistentVolumeClaim>) -> Result<Self, TransferError> {
        let namespace = validate_namespace(&claims)?;

        let mut volumes: Vec<TransferVolume> = claims
            .into_iter()
            .map(|claim| {
                let label_safe_name = label_safe_name(&claim.name_any());
                TransferVolume {
                    claim,
                    label_safe_name,
                }
            })
            .collect();
        volumes.sort_by_key(|v| format!("{}/{}", v.namespace(), v.name()));

        Ok(Self { namespace, volumes })
    }

    /// Build a volume set holding one claim, with the fixed label-safe name `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim has no namespace.
    pub fn singleton(claim: PersistentVolumeClaim) -> Result<Self, TransferError> {
        let namespace = validate_namespace(std::slice::from_ref(&claim))?;

        Ok(Self {
            namespace,
            volumes: vec![TransferVolume {
                claim,
                label_safe_name: SINGLETON_LABEL_SAFE_NAME.to_string(),
            }],
        })
    }

    /// Namespace shared by every claim in the set
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Identity of the set: namespace plus a hash of every `(namespace, name)` pair.
    #[must_use]
    pub fn identity(&self) -> TransferIdentity {
        let pairs: Vec<(String, String)> = self
            .volumes
            .iter()
            .map(|v| (v.namespace(), v.name()))
            .collect();
        let suffix = identity_suffix(pairs.iter().map(|(ns, n)| (ns.as_str(), n.as_str())));
        TransferIdentity::new(self.namespace.clone(), suffix)
    }

    /// Iterate over the volumes in `namespace/name` order
    pub fn iter(&self) -> impl Iterator<Item = &TransferVolume> {
        self.volumes.iter()
    }

    /// Number of volumes in the set
    #[must_use]
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    /// Always false; empty sets cannot be constructed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

fn validate_namespace(claims: &[PersistentVolumeClaim]) -> Result<String, TransferError> {
    if claims.is_empty() {
        return Err(TransferError::EmptyVolumeSet);
    }

    let mut namespaces = BTreeSet::new();
    for claim in claims {
        match claim.namespace() {
            Some(ns) if !ns.is_empty() => {
                namespaces.insert(ns);
            }
            _ => {
                return Err(TransferError::MissingNamespace {
                    claim: claim.name_any(),
                })
            }
        }
    }

    if namespaces.len() > 1 {
        return Err(TransferError::MixedNamespaces {
            namespaces: namespaces.into_iter().collect(),
        });
    }

    namespaces
        .into_iter()
        .next()
        .ok_or(TransferError::EmptyVolumeSet)
}

#[cfg(test)]
#[path = "volumes_tests.rs"]
mod volumes_tests;
