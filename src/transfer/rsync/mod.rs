// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rsync transfer: an rsync daemon on the server side and one rsync client pod per
//! volume on the client side.
//!
//! Both sides run under a dedicated service account that is allowed to `use` the
//! SecurityContextConstraints named in the pod options, since the daemon needs root.

use crate::constants::RSYNC_COMPONENT;
use crate::context::ReconcileContext;
use crate::errors::TransferError;
use crate::naming::TransferIdentity;
use crate::reconcilers::{create_or_update, OwnedKind, OwnedObject};
use crate::store::ObjectStore;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use tracing::debug;

pub mod client;
pub mod config;
pub mod options;
pub mod server;

pub use client::{RsyncClient, RsyncClientOptions};
pub use options::{Applier, CommandOptions};
pub use server::{RsyncServer, RsyncServerOptions};

const SCC_API_GROUP: &str = "security.openshift.io";
const SCC_RESOURCE: &str = "securitycontextconstraints";
const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Side of the copy an rsync object belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoverRole {
    Server,
    Client,
}

impl MoverRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
        }
    }
}

/// `<role>-rsync-<component>-<suffix>`, or `<role>-rsync-<suffix>` for an empty component.
#[must_use]
pub fn object_name(identity: &TransferIdentity, role: MoverRole, component: &str) -> String {
    if component.is_empty() {
        identity.resource_name(role.as_str(), RSYNC_COMPONENT)
    } else {
        identity.resource_name(role.as_str(), &format!("{RSYNC_COMPONENT}-{component}"))
    }
}

/// Names of the service account, role and role binding of one side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RbacNames {
    pub service_account: String,
    pub role: String,
    pub role_binding: String,
}

impl RbacNames {
    #[must_use]
    pub fn new(identity: &TransferIdentity, role: MoverRole) -> Self {
        Self {
            service_account: object_name(identity, role, "sa"),
            role: object_name(identity, role, "role"),
            role_binding: object_name(identity, role, "rolebinding"),
        }
    }

    #[must_use]
    pub fn owned_objects(&self, namespace: &str) -> Vec<OwnedObject> {
        vec![
            OwnedObject::new(OwnedKind::ServiceAccount, namespace, &self.service_account),
            OwnedObject::new(OwnedKind::Role, namespace, &self.role),
            OwnedObject::new(OwnedKind::RoleBinding, namespace, &self.role_binding),
        ]
    }
}

/// Reconcile the service account of one side and bind it to `scc_name`.
///
/// # Errors
///
/// Returns an error if a store round-trip fails.
pub async fn reconcile_rbac<S: ObjectStore>(
    store: &S,
    identity: &TransferIdentity,
    context: &ReconcileContext,
    role: MoverRole,
    scc_name: &str,
) -> Result<RbacNames, TransferError> {
    let names = RbacNames::new(identity, role);
    let namespace = identity.namespace();

    create_or_update(
        store,
        namespace,
        &names.service_account,
        |sa: &mut ServiceAccount| {
            context.apply_to(&mut sa.metadata);
            Ok(())
        },
    )
    .await?;

    create_or_update(store, namespace, &names.role, |r: &mut Role| {
        context.apply_to(&mut r.metadata);
        r.rules = Some(vec![PolicyRule {
            api_groups: Some(vec![SCC_API_GROUP.to_string()]),
            resources: Some(vec![SCC_RESOURCE.to_string()]),
            resource_names: Some(vec![scc_name.to_string()]),
            verbs: vec!["use".to_string()],
            ..Default::default()
        }]);
        Ok(())
    })
    .await?;

    create_or_update(store, namespace, &names.role_binding, |rb: &mut RoleBinding| {
        context.apply_to(&mut rb.metadata);
        rb.role_ref = RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: names.role.clone(),
        };
        rb.subjects = Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: names.service_account.clone(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]);
        Ok(())
    })
    .await?;

    debug!(
        namespace = %namespace,
        service_account = %names.service_account,
        scc = %scc_name,
        "Reconciled mover RBAC"
    );
    Ok(names)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
