// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Transfers: the data movers running on either side of a tunnel.
//!
//! A transfer owns the mover workloads of one side of the copy. The server side
//! hosts one long-lived daemon serving every volume of the set; the client side
//! runs one pod per volume, each completing independently. Both only observe
//! their pods: health and completion are point-in-time reads of container status.
//!
//! # Variants
//!
//! - [`rsync`] - rsync daemon and rsync client pods

use crate::constants::{DEFAULT_SCC_NAME, DEFAULT_TRANSFER_IMAGE};
use crate::errors::TransferError;
use crate::naming::TransferIdentity;
use crate::reconcilers::OwnedObject;
use crate::store::ObjectStore;
use crate::volumes::VolumeSet;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Pod, PodSecurityContext, PodSpec, ResourceRequirements, SecurityContext,
};
use std::collections::BTreeMap;

pub mod rsync;

pub use rsync::{RsyncClient, RsyncClientOptions, RsyncServer, RsyncServerOptions};

/// Scheduling, security and sizing knobs applied to every mover pod.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PodOptions {
    /// Mover image; defaults to [`DEFAULT_TRANSFER_IMAGE`]
    pub image: Option<String>,
    /// SecurityContextConstraints the mover service account may `use`
    pub scc_name: Option<String>,
    pub node_name: Option<String>,
    pub node_selector: BTreeMap<String, String>,
    pub resources: Option<ResourceRequirements>,
    pub pod_security_context: Option<PodSecurityContext>,
    /// Applied to every container of the pod
    pub container_security_context: Option<SecurityContext>,
}

impl PodOptions {
    /// Image the mover container runs
    #[must_use]
    pub fn image(&self) -> String {
        self.image
            .clone()
            .filter(|image| !image.is_empty())
            .unwrap_or_else(|| DEFAULT_TRANSFER_IMAGE.to_string())
    }

    /// SecurityContextConstraints granted to the mover service account
    #[must_use]
    pub fn scc_name(&self) -> String {
        self.scc_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_SCC_NAME.to_string())
    }

    /// Reject settings the mover cannot run with.
    ///
    /// The rsync daemon switches to `uid = root` for every module, so a non-root
    /// `runAsUser` would make it fail at startup.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidPodOptions`] if a non-root user is requested.
    pub fn validate(&self) -> Result<(), TransferError> {
        let container_uid = self
            .container_security_context
            .as_ref()
            .and_then(|ctx| ctx.run_as_user);
        let pod_uid = self
            .pod_security_context
            .as_ref()
            .and_then(|ctx| ctx.run_as_user);

        for uid in [container_uid, pod_uid].into_iter().flatten() {
            if uid != 0 {
                return Err(TransferError::InvalidPodOptions(format!(
                    "running as non-root user {uid} is not supported"
                )));
            }
        }
        Ok(())
    }

    /// Apply scheduling, security contexts and resources to a pod spec.
    pub fn apply_to(&self, spec: &mut PodSpec) {
        if self.node_name.is_some() {
            spec.node_name.clone_from(&self.node_name);
        }
        if !self.node_selector.is_empty() {
            spec.node_selector = Some(self.node_selector.clone());
        }
        if self.pod_security_context.is_some() {
            spec.security_context.clone_from(&self.pod_security_context);
        }

        for container in &mut spec.containers {
            if self.container_security_context.is_some() {
                container
                    .security_context
                    .clone_from(&self.container_security_context);
            }
            if self.resources.is_some() {
                container.resources.clone_from(&self.resources);
            }
        }
    }
}

/// Observed state of a mover container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferStatus {
    /// Pod or container not started yet
    Pending,
    Running,
    /// Container terminated
    Completed { successful: bool, exit_code: i32 },
}

impl TransferStatus {
    #[must_use]
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    #[must_use]
    pub fn is_successful(self) -> bool {
        matches!(self, Self::Completed { successful: true, .. })
    }
}

/// Read the status of `container` from a pod.
#[must_use]
pub fn container_status(pod: &Pod, container: &str) -> TransferStatus {
    let Some(state) = pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref())
        .and_then(|statuses| statuses.iter().find(|s| s.name == container))
        .and_then(|status| status.state.as_ref())
    else {
        return TransferStatus::Pending;
    };

    if let Some(terminated) = &state.terminated {
        return TransferStatus::Completed {
            successful: terminated.exit_code == 0,
            exit_code: terminated.exit_code,
        };
    }
    if state.running.is_some() {
        return TransferStatus::Running;
    }
    TransferStatus::Pending
}

/// True when the pod reports `expected` container statuses, all of them ready.
#[must_use]
pub fn pod_ready(pod: &Pod, expected: usize) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref())
        .is_some_and(|statuses| statuses.len() == expected && statuses.iter().all(|s| s.ready))
}

/// One side of a data copy, as seen by the embedding controller.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Identity every owned object is named after
    fn identity(&self) -> &TransferIdentity;

    /// Volumes this side moves
    fn volumes(&self) -> &VolumeSet;

    /// Objects owned by the transfer itself, excluding transport and endpoint
    fn owned_objects(&self) -> Vec<OwnedObject>;

    /// Whether the mover workloads are up.
    async fn is_healthy<S: ObjectStore>(&self, store: &S) -> Result<bool, TransferError>;

    /// Whether every mover workload has terminated.
    async fn is_completed<S: ObjectStore>(&self, store: &S) -> Result<bool, TransferError>;

    /// Label every object of this side, transport and endpoint included, with `key=value`.
    async fn mark_for_cleanup<S: ObjectStore>(
        &self,
        store: &S,
        key: &str,
        value: &str,
    ) -> Result<(), TransferError>;
}
