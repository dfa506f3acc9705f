// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Transport without a tunnel.
//!
//! The mover talks to the endpoint directly: the server daemon listens on the
//! endpoint's backend port and the client dials the remote address as given. Nothing
//! is added to the mover pods and nothing is owned.

use crate::constants::STUNNEL_LOCAL_HOSTNAME;
use crate::endpoint::Endpoint;
use crate::naming::TransferIdentity;
use crate::reconcilers::OwnedObject;
use crate::transport::{SecretRef, Transport, TransportType};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Volume};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NullTransport {
    identity: TransferIdentity,
    hostname: String,
    port: i32,
}

impl NullTransport {
    /// Server side: the mover listens on the endpoint's backend port.
    #[must_use]
    pub fn server<E: Endpoint>(identity: TransferIdentity, endpoint: &E) -> Self {
        Self {
            identity,
            hostname: STUNNEL_LOCAL_HOSTNAME.to_string(),
            port: endpoint.backend_port(),
        }
    }

    /// Client side: the mover dials `hostname:port` directly.
    #[must_use]
    pub fn client(identity: TransferIdentity, hostname: impl Into<String>, port: i32) -> Self {
        Self {
            identity,
            hostname: hostname.into(),
            port,
        }
    }
}

#[async_trait]
impl Transport for NullTransport {
    fn identity(&self) -> &TransferIdentity {
        &self.identity
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Null
    }

    fn listen_port(&self) -> i32 {
        self.port
    }

    fn connect_port(&self) -> i32 {
        self.port
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn credentials(&self) -> Option<&SecretRef> {
        None
    }

    fn containers(&self) -> Vec<Container> {
        Vec::new()
    }

    fn volumes(&self) -> Vec<Volume> {
        Vec::new()
    }

    fn owned_objects(&self) -> Vec<OwnedObject> {
        Vec::new()
    }
}
