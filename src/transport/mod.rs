// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Transports: the secure channel the mover protocol runs through.
//!
//! A transport is set up on both sides of a transfer. The server side terminates the
//! tunnel next to the mover daemon, the client side opens it next to each mover
//! client. Transfers consume a transport only through the [`Transport`] trait: the
//! ports to use, the hostname to dial and the container/volume fragments to splice
//! into their own pods.
//!
//! # Variants
//!
//! - [`stunnel`] - mutual-TLS or PSK tunnel built on `stunnel`
//! - [`null`] - no tunnel; the mover talks to the endpoint directly

use crate::constants::{
    DEFAULT_TRANSFER_IMAGE, NULL_TRANSPORT_TYPE, STUNNEL_DEFAULT_VERIFY_LEVEL,
    STUNNEL_TRANSPORT_TYPE,
};
use crate::errors::TransferError;
use crate::naming::TransferIdentity;
use crate::reconcilers::{mark_all_for_cleanup, OwnedObject};
use crate::store::ObjectStore;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Volume};
use std::fmt;
use std::str::FromStr;

pub mod certs;
pub mod null;
pub mod stunnel;

pub use null::NullTransport;
pub use stunnel::{StunnelClient, StunnelServer};

/// Kind of tunnel in front of the mover.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportType {
    Stunnel,
    Null,
}

impl TransportType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stunnel => STUNNEL_TRANSPORT_TYPE,
            Self::Null => NULL_TRANSPORT_TYPE,
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            STUNNEL_TRANSPORT_TYPE => Ok(Self::Stunnel),
            NULL_TRANSPORT_TYPE | "none" => Ok(Self::Null),
            _ => Err(TransferError::UnsupportedTransportType(s.to_string())),
        }
    }
}

/// How the two tunnel ends authenticate each other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CredentialsType {
    /// CA plus client and server certificates
    #[default]
    Tls,
    /// Pre-shared key
    Psk,
}

impl CredentialsType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tls => "tls",
            Self::Psk => "psk",
        }
    }
}

impl fmt::Display for CredentialsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialsType {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tls" => Ok(Self::Tls),
            "psk" => Ok(Self::Psk),
            _ => Err(TransferError::UnsupportedCredentialsType(s.to_string())),
        }
    }
}

/// Reference to a caller-owned secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretRef {
    pub namespace: String,
    pub name: String,
}

/// Credential settings of a tunnel.
///
/// Without a `secret_ref` the credentials are generated and stored under a name
/// derived from the transfer identity; with one, the referenced secret is only
/// validated and never modified.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    pub credentials_type: CredentialsType,
    pub secret_ref: Option<SecretRef>,
}

/// HTTP CONNECT proxy the client tunnel goes through.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProxyOptions {
    /// `host:port` or a URL such as `http://proxy.example.com:3128`
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyOptions {
    /// Normalise the proxy address to `host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidProxyUrl`] if the URL does not parse or has no host.
    pub fn host_port(&self) -> Result<String, TransferError> {
        let raw = self.url.trim();
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        };

        let invalid = |reason: &str| TransferError::InvalidProxyUrl {
            url: self.url.clone(),
            reason: reason.to_string(),
        };

        let parsed = url::Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;

        Ok(format!("{host}:{port}"))
    }
}

/// Caller configuration for a tunnel end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportOptions {
    /// Image providing the tunnel binary
    pub image: String,
    pub credentials: Credentials,
    /// Only used by the client side
    pub proxy: Option<ProxyOptions>,
    /// Peer verification level (`verify =` in stunnel)
    pub ca_verify_level: u8,
    /// Skip CA verification on the client side
    pub no_verify_ca: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            image: DEFAULT_TRANSFER_IMAGE.to_string(),
            credentials: Credentials::default(),
            proxy: None,
            ca_verify_level: STUNNEL_DEFAULT_VERIFY_LEVEL,
            no_verify_ca: false,
        }
    }
}

/// One end of a tunnel, as seen by a transfer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Identity the transport objects are named after
    fn identity(&self) -> &TransferIdentity;

    fn transport_type(&self) -> TransportType;

    /// Port this end accepts connections on
    fn listen_port(&self) -> i32;

    /// Port this end forwards connections to
    fn connect_port(&self) -> i32;

    /// Hostname the co-located mover dials
    fn hostname(&self) -> String;

    /// Secret holding the tunnel credentials, if any
    fn credentials(&self) -> Option<&SecretRef>;

    /// Containers to add to the mover pod
    fn containers(&self) -> Vec<Container>;

    /// Volumes the containers need
    fn volumes(&self) -> Vec<Volume>;

    /// Objects owned by this transport
    fn owned_objects(&self) -> Vec<OwnedObject>;

    /// Label every owned object with `key=value`.
    async fn mark_for_cleanup<S: ObjectStore>(
        &self,
        store: &S,
        key: &str,
        value: &str,
    ) -> Result<(), TransferError> {
        mark_all_for_cleanup(store, &self.owned_objects(), key, value).await
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
