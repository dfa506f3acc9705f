// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for PVC transfer.
//!
//! This module provides the error taxonomy shared by every layer:
//! - [`TransferError`] - caller-input errors, construction errors and wrapped lower-level failures
//! - [`StoreError`] - failures reading or writing objects in the backing store
//! - [`CertificateError`] - failures generating or parsing certificate bundles
//!
//! Invalid or missing credentials are not errors: they are reported as "not valid"
//! and trigger regeneration. Failures inside the managed workloads are never
//! surfaced here; they are only visible as container exit codes.

use thiserror::Error;

/// Errors returned by the object store abstraction.
///
/// These errors represent failures talking to the backing object store (the
/// Kubernetes API server, or the in-memory store used for tests and dry runs).
/// They are propagated to the caller unchanged.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Object does not exist in the store
    ///
    /// Returned by operations that require an existing object, such as a
    /// conditional replace of an object that was deleted concurrently.
    #[error("{kind} '{namespace}/{name}' not found")]
    NotFound {
        /// Kind of the object (e.g., `Pod`, `Secret`)
        kind: String,
        /// Namespace of the object
        namespace: String,
        /// Name of the object
        name: String,
    },

    /// Object already exists when attempting to create it
    ///
    /// Returned when another writer created the object between our read and our create.
    /// The caller is expected to retry the whole reconciliation.
    #[error("{kind} '{namespace}/{name}' already exists")]
    AlreadyExists {
        /// Kind of the object
        kind: String,
        /// Namespace of the object
        namespace: String,
        /// Name of the object
        name: String,
    },

    /// Conditional update lost an optimistic-concurrency race
    ///
    /// Returned when the resource version sent with an update no longer matches the
    /// stored object. This core never retries on conflict; the caller does.
    #[error("conflict updating {kind} '{namespace}/{name}': resource version {resource_version} is stale")]
    Conflict {
        /// Kind of the object
        kind: String,
        /// Namespace of the object
        namespace: String,
        /// Name of the object
        name: String,
        /// The stale resource version that was sent
        resource_version: String,
    },

    /// Object carries no name in its metadata
    #[error("{kind} object has no name in its metadata")]
    MissingName {
        /// Kind of the object
        kind: String,
    },

    /// Kubernetes API error
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Object could not be converted to or from its stored representation
    #[error("failed to serialize object: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur while generating or parsing certificate material.
#[derive(Error, Debug, Clone)]
pub enum CertificateError {
    /// Key pair generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Certificate generation or signing failed
    #[error("certificate generation failed: {0}")]
    Generation(String),

    /// PEM or DER data could not be parsed
    #[error("certificate parsing error: {0}")]
    Parse(String),
}

/// Errors returned by transport and transfer reconciliation.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Volume set contains no claims
    ///
    /// Returned when a transfer is requested without any volume claims. There is
    /// nothing to derive an identity from, so no object is created.
    #[error("volume set is empty")]
    EmptyVolumeSet,

    /// Volume claim has no namespace
    ///
    /// Every claim must carry its namespace so the identity suffix and the owned
    /// objects can be placed.
    #[error("volume claim '{claim}' has no namespace")]
    MissingNamespace {
        /// Name of the offending claim
        claim: String,
    },

    /// Volume set spans more than one namespace
    ///
    /// One reconciliation call serves exactly one namespace; mixed sets are rejected
    /// before any object is touched.
    #[error("volume set spans multiple namespaces ({}), which is not supported", .namespaces.join(", "))]
    MixedNamespaces {
        /// The distinct namespaces found in the set
        namespaces: Vec<String>,
    },

    /// A required secret value was empty
    ///
    /// Returned for example when rsync authentication is requested with an empty password.
    #[error("{what} must not be empty")]
    EmptySecret {
        /// Description of the missing value
        what: String,
    },

    /// Credentials type is not supported by the tunnel
    #[error("unsupported credentials type '{0}', expected one of: tls, psk")]
    UnsupportedCredentialsType(String),

    /// Transport type is not known
    #[error("unsupported transport type '{0}', expected one of: stunnel, null")]
    UnsupportedTransportType(String),

    /// Service type cannot be used as a transfer endpoint
    #[error("unsupported service type '{0}', expected one of: ClusterIP, NodePort, LoadBalancer")]
    UnsupportedServiceType(String),

    /// Externally supplied credentials are invalid
    ///
    /// Credentials referenced by the caller are never regenerated; when they fail
    /// validation the caller has to fix or replace them.
    #[error("credentials secret '{namespace}/{name}' is invalid: {reason}")]
    InvalidCredentials {
        /// Namespace of the referenced secret
        namespace: String,
        /// Name of the referenced secret
        name: String,
        /// What failed validation
        reason: String,
    },

    /// Rsync command options failed validation
    #[error("invalid rsync command options: {}", .0.join("; "))]
    InvalidCommandOptions(Vec<String>),

    /// Rsync user name or daemon host cannot be embedded in the mover configuration
    ///
    /// Both end up in `rsyncd.conf` and in shell scripts, so only plain user names,
    /// DNS names and IPv4 addresses are accepted.
    #[error("invalid rsync {field} '{value}'")]
    InvalidDaemonAddress {
        /// Which value was rejected (`user` or `host`)
        field: String,
        /// The value as supplied
        value: String,
    },

    /// Proxy URL could not be parsed
    #[error("invalid proxy URL '{url}': {reason}")]
    InvalidProxyUrl {
        /// The URL as supplied
        url: String,
        /// Parser message
        reason: String,
    },

    /// Pod options request something the mover cannot run with
    #[error("invalid pod options: {0}")]
    InvalidPodOptions(String),

    /// Rendering a configuration document or script left placeholders behind
    ///
    /// Fatal construction error; indicates a template and its field set disagree.
    #[error("failed to render {template}: unresolved placeholder {placeholder}")]
    Template {
        /// Name of the template
        template: String,
        /// First placeholder that was not substituted
        placeholder: String,
    },

    /// Certificate bundle generation failed
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// Backing store operation failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Several independent operations failed
    ///
    /// Collected from per-volume loops so a failure on one volume does not hide
    /// failures on the others.
    #[error("{} errors occurred: [{}]", .0.len(), format_aggregate(.0))]
    Aggregate(Vec<TransferError>),
}

fn format_aggregate(errors: &[TransferError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl TransferError {
    /// Collapse a list of errors collected in a loop.
    ///
    /// Returns `Ok(())` when the list is empty, the sole error when it holds one,
    /// and [`TransferError::Aggregate`] otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error whenever `errors` is not empty.
    pub fn from_errors(mut errors: Vec<TransferError>) -> Result<(), TransferError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(TransferError::Aggregate(errors)),
        }
    }

    /// Short machine-friendly name of the error, used as a metric label.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::EmptyVolumeSet
            | Self::MissingNamespace { .. }
            | Self::MixedNamespaces { .. }
            | Self::EmptySecret { .. }
            | Self::UnsupportedCredentialsType(_)
            | Self::UnsupportedTransportType(_)
            | Self::UnsupportedServiceType(_)
            | Self::InvalidCredentials { .. }
            | Self::InvalidCommandOptions(_)
            | Self::InvalidDaemonAddress { .. }
            | Self::InvalidProxyUrl { .. }
            | Self::InvalidPodOptions(_) => "invalid_input",
            Self::Template { .. } => "template",
            Self::Certificate(_) => "certificate",
            Self::Store(StoreError::Conflict { .. }) => "conflict",
            Self::Store(_) => "store",
            Self::Aggregate(_) => "aggregate",
        }
    }
}
