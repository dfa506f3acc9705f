// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Endpoints: how the server side of a transfer is reached from the client side.
//!
//! An endpoint only has to answer where it is (`hostname`, `ingress_port`), where it
//! delivers traffic inside the server pod (`backend_port`), whether it is usable yet,
//! and how to mark its objects for cleanup. Transports consume it to learn which
//! port to terminate the tunnel on.

use crate::errors::TransferError;
use crate::store::ObjectStore;
use async_trait::async_trait;

pub mod service;

pub use service::{ServiceEndpoint, ServiceEndpointOptions, ServiceType};

/// Reachable address of the server side of a transfer.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Hostname clients dial
    fn hostname(&self) -> String;

    /// Port traffic is delivered to inside the server pod
    fn backend_port(&self) -> i32;

    /// Port clients dial
    fn ingress_port(&self) -> i32;

    /// Whether the endpoint can route traffic yet.
    async fn is_healthy<S: ObjectStore>(&self, store: &S) -> Result<bool, TransferError>;

    /// Label every object the endpoint owns with `key=value`.
    async fn mark_for_cleanup<S: ObjectStore>(
        &self,
        store: &S,
        key: &str,
        value: &str,
    ) -> Result<(), TransferError>;
}

/// Endpoint managed outside this crate, known only by its address.
///
/// Always healthy; marking it for cleanup is a no-op.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticEndpoint {
    pub hostname: String,
    pub backend_port: i32,
    pub ingress_port: i32,
}

impl StaticEndpoint {
    #[must_use]
    pub fn new(hostname: impl Into<String>, backend_port: i32, ingress_port: i32) -> Self {
        Self {
            hostname: hostname.into(),
            backend_port,
            ingress_port,
        }
    }
}

#[async_trait]
impl Endpoint for StaticEndpoint {
    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn backend_port(&self) -> i32 {
        self.backend_port
    }

    fn ingress_port(&self) -> i32 {
        self.ingress_port
    }

    async fn is_healthy<S: ObjectStore>(&self, _store: &S) -> Result<bool, TransferError> {
        Ok(true)
    }

    async fn mark_for_cleanup<S: ObjectStore>(
        &self,
        _store: &S,
        _key: &str,
        _value: &str,
    ) -> Result<(), TransferError> {
        Ok(())
    }
}
