// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Stunnel transport shared by the server and client tunnel ends.
//!
//! Both ends need the same credentials: one secret per transfer identity holding
//! either a TLS [`CertificateBundle`](crate::transport::certs::CertificateBundle) or a
//! pre-shared key. Each end additionally renders its own configuration document
//! into a `ConfigMap` keyed by `(identity, role)`.
//!
//! ## Credential lifecycle
//!
//! - generated secret missing or invalid: the whole bundle is regenerated in place
//! - generated secret valid: reused untouched
//! - caller-supplied secret: validated only; an invalid one is a caller error

use crate::constants::{
    CA_CRT_KEY, CLIENT_CRT_KEY, CLIENT_KEY_KEY, PSK_IDENTITY, PSK_KEY, PSK_SECRET_LEN,
    SERVER_CRT_KEY, SERVER_KEY_KEY, STUNNEL_CERTS_DIR, STUNNEL_CERTS_VOLUME,
    STUNNEL_CONFIG_COMPONENT, STUNNEL_CONFIG_KEY, STUNNEL_CONFIG_PATH, STUNNEL_CONFIG_VOLUME,
    STUNNEL_CONTAINER, STUNNEL_CREDENTIALS_COMPONENT,
};
use crate::context::ReconcileContext;
use crate::errors::TransferError;
use crate::metrics::record_credentials_generated;
use crate::naming::TransferIdentity;
use crate::reconcilers::create_or_update;
use crate::store::ObjectStore;
use crate::transport::certs::{is_bundle_data_valid, CertificateBundle};
use crate::transport::{Credentials, CredentialsType, SecretRef};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, KeyToPath, Secret, SecretVolumeSource, Volume,
    VolumeMount,
};
use k8s_openapi::ByteString;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub mod client;
pub mod config;
pub mod server;

pub use client::StunnelClient;
pub use server::StunnelServer;

/// Which end of the tunnel an object belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TunnelRole {
    Server,
    Client,
}

impl TunnelRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
        }
    }
}

/// Name of the generated credentials secret; identical on both ends.
#[must_use]
pub fn credentials_secret_name(identity: &TransferIdentity) -> String {
    identity.resource_name("certs", STUNNEL_CREDENTIALS_COMPONENT)
}

/// Name of the configuration map for one tunnel end.
#[must_use]
pub fn config_map_name(identity: &TransferIdentity, role: TunnelRole) -> String {
    identity.resource_name(role.as_str(), STUNNEL_CONFIG_COMPONENT)
}

/// Check whether `data` holds usable credentials of the given type.
#[must_use]
pub fn credentials_data_valid(
    credentials_type: CredentialsType,
    data: &BTreeMap<String, ByteString>,
) -> bool {
    match credentials_type {
        CredentialsType::Tls => is_bundle_data_valid(data),
        CredentialsType::Psk => data.get(PSK_KEY).is_some_and(|value| !value.0.is_empty()),
    }
}

/// Generate a pre-shared key in the `identity:base64(secret)` form stunnel reads.
#[must_use]
pub fn generate_psk() -> String {
    let secret: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PSK_SECRET_LEN)
        .map(char::from)
        .collect();
    format!("{PSK_IDENTITY}:{}", BASE64.encode(secret))
}

fn generate_credentials(
    credentials_type: CredentialsType,
) -> Result<BTreeMap<String, ByteString>, TransferError> {
    match credentials_type {
        CredentialsType::Tls => Ok(CertificateBundle::generate()?.to_secret_data()),
        CredentialsType::Psk => Ok(BTreeMap::from([(
            PSK_KEY.to_string(),
            ByteString(generate_psk().into_bytes()),
        )])),
    }
}

/// Ensure the tunnel credentials exist and are valid.
///
/// Returns the reference of the secret both tunnel ends mount.
///
/// # Errors
///
/// Returns an error if:
/// - a caller-supplied secret is missing, in another namespace, or invalid
/// - certificate generation fails
/// - a store round-trip fails
pub async fn reconcile_credentials<S: ObjectStore>(
    store: &S,
    identity: &TransferIdentity,
    context: &ReconcileContext,
    credentials: &Credentials,
) -> Result<SecretRef, TransferError> {
    if let Some(secret_ref) = &credentials.secret_ref {
        validate_external_credentials(store, identity, credentials.credentials_type, secret_ref)
            .await?;
        return Ok(secret_ref.clone());
    }

    let namespace = identity.namespace();
    let name = credentials_secret_name(identity);
    let credentials_type = credentials.credentials_type;
    let mut generated = false;

    create_or_update(store, namespace, &name, |secret: &mut Secret| {
        context.apply_to(&mut secret.metadata);
        let current = secret.data.clone().unwrap_or_default();
        if !credentials_data_valid(credentials_type, &current) {
            secret.data = Some(generate_credentials(credentials_type)?);
            generated = true;
        }
        Ok(())
    })
    .await?;

    if generated {
        record_credentials_generated(credentials_type.as_str());
        info!(
            namespace = %namespace,
            name = %name,
            credentials_type = %credentials_type,
            "Generated tunnel credentials"
        );
    } else {
        debug!(
            namespace = %namespace,
            name = %name,
            "Existing tunnel credentials are valid"
        );
    }

    Ok(SecretRef {
        namespace: namespace.to_string(),
        name,
    })
}

async fn validate_external_credentials<S: ObjectStore>(
    store: &S,
    identity: &TransferIdentity,
    credentials_type: CredentialsType,
    secret_ref: &SecretRef,
) -> Result<(), TransferError> {
    let invalid = |reason: String| TransferError::InvalidCredentials {
        namespace: secret_ref.namespace.clone(),
        name: secret_ref.name.clone(),
        reason,
    };

    if secret_ref.namespace != identity.namespace() {
        return Err(invalid(format!(
            "must live in namespace '{}' to be mounted by the tunnel",
            identity.namespace()
        )));
    }

    let secret = store
        .get::<Secret>(&secret_ref.namespace, &secret_ref.name)
        .await?
        .ok_or_else(|| invalid("not found".to_string()))?;

    let data = secret.data.unwrap_or_default();
    if !credentials_data_valid(credentials_type, &data) {
        return Err(invalid(format!("does not hold valid {credentials_type} credentials")));
    }

    debug!(
        namespace = %secret_ref.namespace,
        name = %secret_ref.name,
        "Caller-supplied tunnel credentials are valid"
    );
    Ok(())
}

/// Reconcile the configuration map of one tunnel end.
///
/// # Errors
///
/// Returns an error if a store round-trip fails.
pub async fn reconcile_config_map<S: ObjectStore>(
    store: &S,
    identity: &TransferIdentity,
    context: &ReconcileContext,
    role: TunnelRole,
    config: String,
) -> Result<String, TransferError> {
    let name = config_map_name(identity, role);
    create_or_update(store, identity.namespace(), &name, |cm: &mut ConfigMap| {
        context.apply_to(&mut cm.metadata);
        cm.data = Some(BTreeMap::from([(STUNNEL_CONFIG_KEY.to_string(), config)]));
        Ok(())
    })
    .await?;
    Ok(name)
}

fn key_to_path(key: &str) -> KeyToPath {
    KeyToPath {
        key: key.to_string(),
        path: key.to_string(),
        ..Default::default()
    }
}

/// Volumes of one tunnel end: its configuration and the credential files it needs.
#[must_use]
pub fn tunnel_volumes(
    config_map: &str,
    secret: &SecretRef,
    credentials_type: CredentialsType,
    role: TunnelRole,
) -> Vec<Volume> {
    let keys: Vec<&str> = match (credentials_type, role) {
        (CredentialsType::Psk, _) => vec![PSK_KEY],
        (CredentialsType::Tls, TunnelRole::Server) => {
            vec![CA_CRT_KEY, SERVER_CRT_KEY, SERVER_KEY_KEY]
        }
        (CredentialsType::Tls, TunnelRole::Client) => {
            vec![CA_CRT_KEY, CLIENT_CRT_KEY, CLIENT_KEY_KEY]
        }
    };

    vec![
        Volume {
            name: STUNNEL_CONFIG_VOLUME.into(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: STUNNEL_CERTS_VOLUME.into(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret.name.clone()),
                items: Some(keys.into_iter().map(key_to_path).collect()),
                ..Default::default()
            }),
            ..Default::default()
        },
    ]
}

/// Tunnel sidecar running `command`, with configuration and credentials mounted.
#[must_use]
pub fn tunnel_container(image: &str, command: Vec<String>) -> Container {
    Container {
        name: STUNNEL_CONTAINER.into(),
        image: Some(image.to_string()),
        image_pull_policy: Some("IfNotPresent".into()),
        command: Some(command),
        volume_mounts: Some(vec![
            VolumeMount {
                name: STUNNEL_CONFIG_VOLUME.into(),
                mount_path: STUNNEL_CONFIG_PATH.into(),
                sub_path: Some(STUNNEL_CONFIG_KEY.into()),
                ..Default::default()
            },
            VolumeMount {
                name: STUNNEL_CERTS_VOLUME.into(),
                mount_path: STUNNEL_CERTS_DIR.into(),
                read_only: Some(true),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
