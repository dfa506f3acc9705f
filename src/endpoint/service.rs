// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Endpoint backed by a Kubernetes `Service`.

use crate::context::ReconcileContext;
use crate::endpoint::Endpoint;
use crate::errors::{StoreError, TransferError};
use crate::reconcilers::{create_or_update, mark_for_cleanup};
use crate::store::ObjectStore;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Name of the single port exposed by the service
const SERVICE_PORT_NAME: &str = "transfer";

/// Service types the endpoint can be backed by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ServiceType {
    #[default]
    ClusterIp,
    NodePort,
    LoadBalancer,
}

impl ServiceType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClusterIp => "ClusterIP",
            Self::NodePort => "NodePort",
            Self::LoadBalancer => "LoadBalancer",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ClusterIP" => Ok(Self::ClusterIp),
            "NodePort" => Ok(Self::NodePort),
            "LoadBalancer" => Ok(Self::LoadBalancer),
            _ => Err(TransferError::UnsupportedServiceType(s.to_string())),
        }
    }
}

/// Desired state of the service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceEndpointOptions {
    pub name: String,
    pub service_type: ServiceType,
    /// Port the server tunnel (or mover) listens on
    pub backend_port: i32,
    /// Port the service exposes
    pub ingress_port: i32,
    /// Labels selecting the server pod
    pub selector: BTreeMap<String, String>,
}

/// Service-backed endpoint.
#[derive(Debug)]
pub struct ServiceEndpoint {
    namespace: String,
    options: ServiceEndpointOptions,
    load_balancer_address: Mutex<Option<String>>,
}

impl ServiceEndpoint {
    /// Create or update the service.
    ///
    /// Server-assigned fields (cluster IP, node port) survive updates. A load balancer
    /// address already published on the service is picked up here; one assigned later
    /// is picked up by [`Endpoint::is_healthy`].
    ///
    /// # Errors
    ///
    /// Returns an error if the service name is empty or a store round-trip fails.
    pub async fn reconcile<S: ObjectStore>(
        store: &S,
        namespace: &str,
        context: &ReconcileContext,
        options: ServiceEndpointOptions,
    ) -> Result<Self, TransferError> {
        if options.name.is_empty() {
            return Err(StoreError::MissingName {
                kind: "Service".to_string(),
            }
            .into());
        }

        let desired_type = options.service_type;
        let selector = options.selector.clone();
        let backend_port = options.backend_port;
        let ingress_port = options.ingress_port;

        let (service, _) = create_or_update(store, namespace, &options.name, |svc: &mut Service| {
            context.apply_to(&mut svc.metadata);
            let spec = svc.spec.get_or_insert_with(ServiceSpec::default);

            let node_port = spec
                .ports
                .as_ref()
                .and_then(|ports| ports.iter().find(|p| p.name.as_deref() == Some(SERVICE_PORT_NAME)))
                .and_then(|p| p.node_port)
                .filter(|_| desired_type != ServiceType::ClusterIp);

            spec.type_ = Some(desired_type.as_str().to_string());
            spec.selector = Some(selector);
            spec.ports = Some(vec![ServicePort {
                name: Some(SERVICE_PORT_NAME.into()),
                port: ingress_port,
                target_port: Some(IntOrString::Int(backend_port)),
                protocol: Some("TCP".into()),
                node_port,
                ..Default::default()
            }]);
            Ok(())
        })
        .await?;

        let address = (desired_type == ServiceType::LoadBalancer)
            .then(|| load_balancer_address(&service))
            .flatten();

        Ok(Self {
            namespace: namespace.to_string(),
            options,
            load_balancer_address: Mutex::new(address),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.options.name
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn service_type(&self) -> ServiceType {
        self.options.service_type
    }

    fn cached_address(&self) -> Option<String> {
        self.load_balancer_address
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn cache_address(&self, address: String) {
        *self
            .load_balancer_address
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(address);
    }
}

fn load_balancer_address(service: &Service) -> Option<String> {
    service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .iter()
        .find_map(|ingress| {
            ingress
                .hostname
                .clone()
                .filter(|h| !h.is_empty())
                .or_else(|| ingress.ip.clone().filter(|ip| !ip.is_empty()))
        })
}

#[async_trait]
impl Endpoint for ServiceEndpoint {
    fn hostname(&self) -> String {
        if self.options.service_type == ServiceType::LoadBalancer {
            if let Some(address) = self.cached_address() {
                return address;
            }
        }
        format!("{}.{}.svc.cluster.local", self.options.name, self.namespace)
    }

    fn backend_port(&self) -> i32 {
        self.options.backend_port
    }

    fn ingress_port(&self) -> i32 {
        self.options.ingress_port
    }

    async fn is_healthy<S: ObjectStore>(&self, store: &S) -> Result<bool, TransferError> {
        let Some(service) = store
            .get::<Service>(&self.namespace, &self.options.name)
            .await?
        else {
            debug!(
                namespace = %self.namespace,
                name = %self.options.name,
                "Service not found"
            );
            return Ok(false);
        };

        let spec = service.spec.clone().unwrap_or_default();
        let healthy = match self.options.service_type {
            ServiceType::ClusterIp => spec
                .cluster_ip
                .as_deref()
                .is_some_and(|ip| !ip.is_empty() && ip != "None"),
            ServiceType::NodePort => spec
                .ports
                .unwrap_or_default()
                .iter()
                .any(|port| port.node_port.is_some()),
            ServiceType::LoadBalancer => match load_balancer_address(&service) {
                Some(address) => {
                    self.cache_address(address);
                    true
                }
                None => false,
            },
        };
        Ok(healthy)
    }

    async fn mark_for_cleanup<S: ObjectStore>(
        &self,
        store: &S,
        key: &str,
        value: &str,
    ) -> Result<(), TransferError> {
        mark_for_cleanup::<S, Service>(store, &self.namespace, &self.options.name, key, value)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod service_tests;
