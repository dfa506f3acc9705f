// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deterministic identity and resource naming.
//!
//! The backing store has no memory of which objects a previous call created, so every
//! owned object is named from a hash of the caller's input. Re-invoking with the same
//! volume set reconciles the same objects; different volume sets get different names.
//!
//! Names follow `<role>-<component>-<suffix>` and are truncated from the right to
//! [`RESOURCE_NAME_MAX_LEN`]. Truncation does not re-hash, so two identities can only
//! collide when their role and component tags alone exceed the limit.

use crate::constants::{IDENTITY_SUFFIX_LEN, LABEL_SAFE_NAME_LEN, RESOURCE_NAME_MAX_LEN};
use sha2::{Digest, Sha256};
use std::fmt;

/// Namespace and identity suffix shared by every object of one transfer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransferIdentity {
    namespace: String,
    suffix: String,
}

impl TransferIdentity {
    /// Create an identity from an already computed suffix.
    #[must_use]
    pub fn new(namespace: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            suffix: suffix.into(),
        }
    }

    /// Namespace every owned object lives in
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Short deterministic hash derived from the volume set
    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Build the name of an owned object for this identity.
    #[must_use]
    pub fn resource_name(&self, role: &str, component: &str) -> String {
        resource_name(role, component, &self.suffix)
    }
}

impl fmt::Display for TransferIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.suffix)
    }
}

fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    format!("{:x}", hasher.finalize())
}

/// Compute the identity suffix for a collection of `(namespace, name)` pairs.
///
/// The pairs are sorted before hashing so the result depends only on the multiset
/// of pairs, not on the order the caller supplied them in. Each pair is framed with
/// separators that cannot appear in Kubernetes names, so `("a", "bc")` and
/// `("ab", "c")` hash differently.
///
/// # Example
///
/// ```rust
/// use pvc_transfer::naming::identity_suffix;
///
/// let a = identity_suffix([("apps", "data-0"), ("apps", "data-1")]);
/// let b = identity_suffix([("apps", "data-1"), ("apps", "data-0")]);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 10);
/// ```
#[must_use]
pub fn identity_suffix<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut keys: Vec<String> = pairs
        .into_iter()
        .map(|(namespace, name)| format!("{namespace}/{name}\n"))
        .collect();
    keys.sort();

    let mut hex = sha256_hex(keys.concat().as_bytes());
    hex.truncate(IDENTITY_SUFFIX_LEN);
    hex
}

/// Derive a name that satisfies both label-value and DNS-label constraints.
///
/// Claim names can be up to 253 characters and contain dots, neither of which is
/// allowed in module names, volume names or label values.
#[must_use]
pub fn label_safe_name(name: &str) -> String {
    let mut hex = sha256_hex(name.as_bytes());
    hex.truncate(LABEL_SAFE_NAME_LEN);
    hex
}

/// Build `<role>-<component>-<suffix>`, truncated to the resource name limit.
///
/// Empty parts are skipped. A trailing `-` left behind by truncation is removed so
/// the result remains a valid DNS label.
#[must_use]
pub fn resource_name(role: &str, component: &str, suffix: &str) -> String {
    let mut name = [role, component, suffix]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("-");

    if name.len() > RESOURCE_NAME_MAX_LEN {
        name.truncate(RESOURCE_NAME_MAX_LEN);
    }
    while name.ends_with('-') {
        name.pop();
    }
    name
}

#[cfg(test)]
#[path = "naming_tests.rs"]
mod naming_tests;
