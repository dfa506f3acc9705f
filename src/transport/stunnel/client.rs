// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Client end of the stunnel transport.
//!
//! Listens on a fixed local port inside each mover client pod and forwards to the
//! remote server end, directly or through an HTTP CONNECT proxy.

use super::config::{render_client_config, ClientConfigFields};
use super::{
    config_map_name, reconcile_config_map, reconcile_credentials, tunnel_container,
    tunnel_volumes, TunnelRole,
};
use crate::constants::{STUNNEL_CLIENT_LISTEN_PORT, STUNNEL_CONFIG_PATH, STUNNEL_LOCAL_HOSTNAME};
use crate::context::ReconcileContext;
use crate::errors::TransferError;
use crate::metrics::record_reconciliation;
use crate::naming::TransferIdentity;
use crate::reconcilers::{OwnedKind, OwnedObject};
use crate::store::ObjectStore;
use crate::transport::{SecretRef, Transport, TransportOptions, TransportType};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Volume};
use std::time::Instant;
use tracing::info;

/// Reconciled client end of a tunnel.
#[derive(Clone, Debug)]
pub struct StunnelClient {
    identity: TransferIdentity,
    options: TransportOptions,
    remote_hostname: String,
    remote_port: i32,
    config_map: String,
    secret: SecretRef,
}

impl StunnelClient {
    /// Reconcile the credentials and configuration of the client end.
    ///
    /// `hostname` and `port` address the server end, usually the endpoint's
    /// hostname and ingress port.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy URL or the credentials are unusable, a
    /// template fails to render, or a store round-trip fails.
    pub async fn reconcile<S: ObjectStore>(
        store: &S,
        identity: TransferIdentity,
        hostname: &str,
        port: i32,
        context: &ReconcileContext,
        options: TransportOptions,
    ) -> Result<Self, TransferError> {
        let start = Instant::now();
        let result = Self::reconcile_inner(store, identity, hostname, port, context, options).await;
        record_reconciliation("StunnelClient", start.elapsed(), result.is_ok());
        result
    }

    async fn reconcile_inner<S: ObjectStore>(
        store: &S,
        identity: TransferIdentity,
        hostname: &str,
        port: i32,
        context: &ReconcileContext,
        options: TransportOptions,
    ) -> Result<Self, TransferError> {
        let proxy = options.proxy.as_ref().map(|p| p.host_port()).transpose()?;

        let secret = reconcile_credentials(store, &identity, context, &options.credentials).await?;

        let config = render_client_config(&ClientConfigFields {
            accept_port: STUNNEL_CLIENT_LISTEN_PORT,
            hostname: hostname.to_string(),
            connect_port: port,
            credentials_type: options.credentials.credentials_type,
            verify_level: options.ca_verify_level,
            no_verify_ca: options.no_verify_ca,
            proxy,
            proxy_username: options.proxy.as_ref().and_then(|p| p.username.clone()),
            proxy_password: options.proxy.as_ref().and_then(|p| p.password.clone()),
        })?;
        let config_map =
            reconcile_config_map(store, &identity, context, TunnelRole::Client, config).await?;

        info!(
            identity = %identity,
            remote = %format!("{hostname}:{port}"),
            proxied = options.proxy.is_some(),
            "Reconciled stunnel client"
        );

        Ok(Self {
            identity,
            options,
            remote_hostname: hostname.to_string(),
            remote_port: port,
            config_map,
            secret,
        })
    }

    /// Remote hostname the tunnel forwards to
    #[must_use]
    pub fn remote_hostname(&self) -> &str {
        &self.remote_hostname
    }

    /// Remote port the tunnel forwards to
    #[must_use]
    pub fn remote_port(&self) -> i32 {
        self.remote_port
    }
}

#[async_trait]
impl Transport for StunnelClient {
    fn identity(&self) -> &TransferIdentity {
        &self.identity
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Stunnel
    }

    fn listen_port(&self) -> i32 {
        STUNNEL_CLIENT_LISTEN_PORT
    }

    fn connect_port(&self) -> i32 {
        self.remote_port
    }

    fn hostname(&self) -> String {
        STUNNEL_LOCAL_HOSTNAME.to_string()
    }

    fn credentials(&self) -> Option<&SecretRef> {
        Some(&self.secret)
    }

    fn containers(&self) -> Vec<Container> {
        vec![tunnel_container(
            &self.options.image,
            vec!["/bin/stunnel".into(), STUNNEL_CONFIG_PATH.into()],
        )]
    }

    fn volumes(&self) -> Vec<Volume> {
        tunnel_volumes(
            &self.config_map,
            &self.secret,
            self.options.credentials.credentials_type,
            TunnelRole::Client,
        )
    }

    fn owned_objects(&self) -> Vec<OwnedObject> {
        let namespace = self.identity.namespace();
        let mut objects = vec![OwnedObject::new(
            OwnedKind::ConfigMap,
            namespace,
            config_map_name(&self.identity, TunnelRole::Client),
        )];
        if self.options.credentials.secret_ref.is_none() {
            objects.push(OwnedObject::new(
                OwnedKind::Secret,
                namespace,
                self.secret.name.clone(),
            ));
        }
        objects
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
