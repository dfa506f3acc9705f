// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Server end of the stunnel transport.
//!
//! Terminates the tunnel on the endpoint's backend port and relays plaintext to
//! the mover daemon listening on a fixed local port in the same pod.

use super::config::{render_server_config, render_server_script, ServerConfigFields};
use super::{
    config_map_name, reconcile_config_map, reconcile_credentials, tunnel_container,
    tunnel_volumes, TunnelRole,
};
use crate::constants::{STUNNEL_LOCAL_HOSTNAME, STUNNEL_SERVER_CONNECT_PORT};
use crate::context::ReconcileContext;
use crate::endpoint::Endpoint;
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

/// Reconciled server end of a tunnel.
#[derive(Clone, Debug)]
pub struct StunnelServer {
    identity: TransferIdentity,
    options: TransportOptions,
    listen_port: i32,
    config_map: String,
    secret: SecretRef,
    script: String,
}

impl StunnelServer {
    /// Reconcile the credentials and configuration of the server end.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are unusable, a template fails to render,
    /// or a store round-trip fails.
    pub async fn reconcile<S: ObjectStore, E: Endpoint>(
        store: &S,
        identity: TransferIdentity,
        endpoint: &E,
        context: &ReconcileContext,
        options: TransportOptions,
    ) -> Result<Self, TransferError> {
        let start = Instant::now();
        let result = Self::reconcile_inner(store, identity, endpoint, context, options).await;
        record_reconciliation("StunnelServer", start.elapsed(), result.is_ok());
        result
    }

    async fn reconcile_inner<S: ObjectStore, E: Endpoint>(
        store: &S,
        identity: TransferIdentity,
        endpoint: &E,
        context: &ReconcileContext,
        options: TransportOptions,
    ) -> Result<Self, TransferError> {
        let listen_port = endpoint.backend_port();
        let connect_port = STUNNEL_SERVER_CONNECT_PORT;

        let secret = reconcile_credentials(store, &identity, context, &options.credentials).await?;

        let config = render_server_config(&ServerConfigFields {
            accept_port: listen_port,
            connect_port,
            credentials_type: options.credentials.credentials_type,
            verify_level: options.ca_verify_level,
        })?;
        let script = render_server_script(connect_port)?;
        let config_map =
            reconcile_config_map(store, &identity, context, TunnelRole::Server, config).await?;

        info!(
            identity = %identity,
            listen_port = listen_port,
            connect_port = connect_port,
            "Reconciled stunnel server"
        );

        Ok(Self {
            identity,
            options,
            listen_port,
            config_map,
            secret,
            script,
        })
    }
}

#[async_trait]
impl Transport for StunnelServer {
    fn identity(&self) -> &TransferIdentity {
        &self.identity
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Stunnel
    }

    fn listen_port(&self) -> i32 {
        self.listen_port
    }

    fn connect_port(&self) -> i32 {
        STUNNEL_SERVER_CONNECT_PORT
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
            vec!["/bin/bash".into(), "-c".into(), self.script.clone()],
        )]
    }

    fn volumes(&self) -> Vec<Volume> {
        tunnel_volumes(
            &self.config_map,
            &self.secret,
            self.options.credentials.credentials_type,
            TunnelRole::Server,
        )
    }

    fn owned_objects(&self) -> Vec<OwnedObject> {
        let namespace = self.identity.namespace();
        let mut objects = vec![OwnedObject::new(
            OwnedKind::ConfigMap,
            namespace,
            config_map_name(&self.identity, TunnelRole::Server),
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
#[path = "server_tests.rs"]
mod server_tests;
