// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Caller context threaded through every constructor.
//!
//! The embedding controller decides which labels and owner references every owned
//! object carries. Instead of package-level state, that choice travels as a
//! [`ReconcileContext`] value into the transport, endpoint and transfer constructors.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;

/// Labels and owner references applied to every owned object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileContext {
    /// Labels propagated verbatim to every owned object
    pub labels: BTreeMap<String, String>,

    /// Owner references propagated verbatim to every owned object
    pub owner_references: Vec<OwnerReference>,
}

impl ReconcileContext {
    /// Create a context from caller labels and owner references.
    #[must_use]
    pub fn new(labels: BTreeMap<String, String>, owner_references: Vec<OwnerReference>) -> Self {
        Self {
            labels,
            owner_references,
        }
    }

    /// Return a copy of the caller labels with `extra` merged on top.
    #[must_use]
    pub fn labels_with(&self, extra: &[(&str, &str)]) -> BTreeMap<String, String> {
        let mut labels = self.labels.clone();
        for (key, value) in extra {
            labels.insert((*key).to_string(), (*value).to_string());
        }
        labels
    }

    /// Merge caller labels and owner references into existing metadata.
    ///
    /// Labels already present on the object (for example a cleanup mark written by an
    /// earlier call) are kept; caller labels win on key clashes. Owner references are
    /// added when no reference with the same UID exists yet.
    pub fn apply_to(&self, meta: &mut ObjectMeta) {
        self.apply_labels_to(meta, &self.labels);
    }

    /// Same as [`ReconcileContext::apply_to`] with an explicit label set.
    pub fn apply_labels_to(&self, meta: &mut ObjectMeta, labels: &BTreeMap<String, String>) {
        if !labels.is_empty() {
            let current = meta.labels.get_or_insert_with(BTreeMap::new);
            for (key, value) in labels {
                current.insert(key.clone(), value.clone());
            }
        }

        if !self.owner_references.is_empty() {
            let current = meta.owner_references.get_or_insert_with(Vec::new);
            for owner in &self.owner_references {
                if !current.iter().any(|existing| existing.uid == owner.uid) {
                    current.push(owner.clone());
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
