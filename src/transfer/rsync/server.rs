// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Server side of the rsync transfer.
//!
//! One pod per volume set runs the rsync daemon with one module per volume, next to
//! the server end of the transport. The daemon only accepts connections from
//! localhost when a tunnel terminates in the same pod.
//!
//! ## Owned objects
//!
//! - `server-rsync-config-<suffix>` - `rsyncd.conf`
//! - `server-rsync-credentials-<suffix>` - daemon secrets file, only with a password
//! - `server-rsync-{sa,role,rolebinding}-<suffix>` - service account and SCC grant
//! - `server-rsync-<suffix>` - the daemon pod

use super::config::{render_rsyncd_conf, render_server_script};
use super::{object_name, reconcile_rbac, MoverRole, RbacNames};
use crate::constants::{
    COMMUNICATION_DIR, COMMUNICATION_VOLUME, DEFAULT_SENTINEL_DEADLINE_SECS, RSYNCD_CONFIG_KEY, RSYNCD_CONFIG_PATH,
    RSYNCD_LOG_DIR, RSYNCD_LOG_VOLUME, RSYNCD_SECRETS_DIR, RSYNCD_SECRETS_FILE,
    RSYNCD_SECRETS_KEY, RSYNCD_SECRETS_MODE, RSYNC_CONTAINER, RSYNC_DEFAULT_USER,
};
use crate::context::ReconcileContext;
use crate::endpoint::Endpoint;
use crate::errors::TransferError;
use crate::labels::{COMPONENT_RSYNC_SERVER, K8S_COMPONENT, K8S_PART_OF, PART_OF_PVC_TRANSFER};
use crate::metrics::record_reconciliation;
use crate::naming::TransferIdentity;
use crate::reconcilers::{
    create_or_update, create_or_update_pod, mark_all_for_cleanup, OwnedKind, OwnedObject,
};
use crate::store::ObjectStore;
use crate::transfer::{container_status, pod_ready, PodOptions, Transfer, TransferStatus};
use crate::transport::{Transport, TransportType};
use crate::volumes::VolumeSet;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, KeyToPath,
    PersistentVolumeClaimVolumeSource, Pod, PodSpec, Secret, SecretVolumeSource, Volume,
    VolumeMount,
};
use k8s_openapi::ByteString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

const CONFIG_VOLUME: &str = "rsync-config";
const SECRET_VOLUME: &str = "rsync-credentials";
const DAEMON_PORT_NAME: &str = "rsyncd";

/// Caller configuration of the daemon.
#[derive(Clone, Debug, PartialEq)]
pub struct RsyncServerOptions {
    /// User clients authenticate as
    pub username: String,
    /// Enables daemon authentication when set; must not be empty
    pub password: Option<String>,
    pub pod: PodOptions,
    /// Seconds the daemon waits for every volume's termination sentinel before
    /// exiting with a failure
    pub sentinel_deadline_secs: u32,
}

impl Default for RsyncServerOptions {
    fn default() -> Self {
        Self {
            username: RSYNC_DEFAULT_USER.to_string(),
            password: None,
            pod: PodOptions::default(),
            sentinel_deadline_secs: DEFAULT_SENTINEL_DEADLINE_SECS,
        }
    }
}

/// Reconciled server side of an rsync transfer.
#[derive(Clone, Debug)]
pub struct RsyncServer<T: Transport, E: Endpoint> {
    identity: TransferIdentity,
    volumes: VolumeSet,
    transport: T,
    endpoint: E,
    authenticated: bool,
    rbac: RbacNames,
}

impl<T: Transport, E: Endpoint> RsyncServer<T, E> {
    /// Reconcile every object of the server side.
    ///
    /// `transport` must be the server end of a tunnel (or the null transport)
    /// already reconciled against `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the password is empty, the user name is unsafe to embed or the pod options
    ///   are unsupported (nothing is written)
    /// - a template fails to render
    /// - a store round-trip fails
    pub async fn reconcile<S: ObjectStore>(
        store: &S,
        volumes: VolumeSet,
        endpoint: E,
        transport: T,
        context: &ReconcileContext,
        options: RsyncServerOptions,
    ) -> Result<Self, TransferError> {
        let start = Instant::now();
        let result =
            Self::reconcile_inner(store, volumes, endpoint, transport, context, options).await;
        record_reconciliation("RsyncServer", start.elapsed(), result.is_ok());
        result
    }

    async fn reconcile_inner<S: ObjectStore>(
        store: &S,
        volumes: VolumeSet,
        endpoint: E,
        transport: T,
        context: &ReconcileContext,
        options: RsyncServerOptions,
    ) -> Result<Self, TransferError> {
        if options.password.as_deref() == Some("") {
            return Err(TransferError::EmptySecret {
                what: "rsync server password".to_string(),
            });
        }
        options.pod.validate()?;

        let identity = volumes.identity();
        let namespace = identity.namespace().to_string();
        let authenticated = options.password.is_some();
        let username = authenticated.then_some(options.username.as_str());
        let port = transport.connect_port();

        let rsyncd_conf = render_rsyncd_conf(
            &volumes,
            transport.transport_type() == TransportType::Stunnel,
            username,
        )?;
        let script = render_server_script(&volumes, port, options.sentinel_deadline_secs)?;

        let config_map = object_name(&identity, MoverRole::Server, "config");
        create_or_update(store, &namespace, &config_map, |cm: &mut ConfigMap| {
            context.apply_to(&mut cm.metadata);
            cm.data = Some(BTreeMap::from([(
                RSYNCD_CONFIG_KEY.to_string(),
                rsyncd_conf,
            )]));
            Ok(())
        })
        .await?;

        if let Some(password) = &options.password {
            let secret = object_name(&identity, MoverRole::Server, "credentials");
            let entry = format!("{}:{password}", options.username);
            create_or_update(store, &namespace, &secret, |s: &mut Secret| {
                context.apply_to(&mut s.metadata);
                s.data = Some(BTreeMap::from([(
                    RSYNCD_SECRETS_KEY.to_string(),
                    ByteString(entry.into_bytes()),
                )]));
                Ok(())
            })
            .await?;
        }

        let rbac = reconcile_rbac(
            store,
            &identity,
            context,
            MoverRole::Server,
            &options.pod.scc_name(),
        )
        .await?;

        let server = Self {
            identity,
            volumes,
            transport,
            endpoint,
            authenticated,
            rbac,
        };

        let spec = server.pod_spec(&options.pod, &config_map, script, port);
        let labels = context.labels_with(&[
            (K8S_COMPONENT, COMPONENT_RSYNC_SERVER),
            (K8S_PART_OF, PART_OF_PVC_TRANSFER),
        ]);
        let (_, operation) = create_or_update_pod(
            store,
            &namespace,
            &server.pod_name(),
            context,
            &labels,
            &BTreeMap::new(),
            spec,
        )
        .await?;

        info!(
            identity = %server.identity,
            volumes = server.volumes.len(),
            transport = %server.transport.transport_type(),
            pod = operation.as_str(),
            "Reconciled rsync server"
        );
        Ok(server)
    }

    /// Name of the daemon pod
    #[must_use]
    pub fn pod_name(&self) -> String {
        object_name(&self.identity, MoverRole::Server, "")
    }

    /// Port clients reach the server on from outside the pod
    #[must_use]
    pub fn listen_port(&self) -> i32 {
        self.transport.listen_port()
    }

    #[must_use]
    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Observed state of the daemon container; `Pending` while the pod does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn status<S: ObjectStore>(&self, store: &S) -> Result<TransferStatus, TransferError> {
        let pod = store
            .get::<Pod>(self.identity.namespace(), &self.pod_name())
            .await?;
        Ok(pod.map_or(TransferStatus::Pending, |pod| {
            container_status(&pod, RSYNC_CONTAINER)
        }))
    }

    fn pod_spec(
        &self,
        pod_options: &PodOptions,
        config_map: &str,
        script: String,
        port: i32,
    ) -> PodSpec {
        let mut mounts = vec![
            VolumeMount {
                name: CONFIG_VOLUME.into(),
                mount_path: RSYNCD_CONFIG_PATH.into(),
                sub_path: Some(RSYNCD_CONFIG_KEY.into()),
                ..Default::default()
            },
            VolumeMount {
                name: RSYNCD_LOG_VOLUME.into(),
                mount_path: RSYNCD_LOG_DIR.into(),
                ..Default::default()
            },
            VolumeMount {
                name: COMMUNICATION_VOLUME.into(),
                mount_path: COMMUNICATION_DIR.into(),
                ..Default::default()
            },
        ];
        let mut volumes = vec![
            Volume {
                name: CONFIG_VOLUME.into(),
                config_map: Some(ConfigMapVolumeSource {
                    name: config_map.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            Volume {
                name: RSYNCD_LOG_VOLUME.into(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            },
            Volume {
                name: COMMUNICATION_VOLUME.into(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            },
        ];

        if self.authenticated {
            mounts.push(VolumeMount {
                name: SECRET_VOLUME.into(),
                mount_path: RSYNCD_SECRETS_DIR.into(),
                read_only: Some(true),
                ..Default::default()
            });
            volumes.push(Volume {
                name: SECRET_VOLUME.into(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(object_name(&self.identity, MoverRole::Server, "credentials")),
                    items: Some(vec![KeyToPath {
                        key: RSYNCD_SECRETS_KEY.into(),
                        path: RSYNCD_SECRETS_FILE.into(),
                        mode: Some(RSYNCD_SECRETS_MODE),
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        for volume in self.volumes.iter() {
            mounts.push(VolumeMount {
                name: volume.label_safe_name().to_string(),
                mount_path: volume.mount_path(),
                ..Default::default()
            });
            volumes.push(Volume {
                name: volume.label_safe_name().to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: volume.claim().name_any(),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }
        volumes.extend(self.transport.volumes());

        let rsync = Container {
            name: RSYNC_CONTAINER.into(),
            image: Some(pod_options.image()),
            image_pull_policy: Some("IfNotPresent".into()),
            command: Some(vec!["/bin/bash".into(), "-c".into(), script]),
            ports: Some(vec![ContainerPort {
                name: Some(DAEMON_PORT_NAME.into()),
                container_port: port,
                protocol: Some("TCP".into()),
                ..Default::default()
            }]),
            volume_mounts: Some(mounts),
            ..Default::default()
        };

        let mut containers = vec![rsync];
        containers.extend(self.transport.containers());

        let mut spec = PodSpec {
            containers,
            volumes: Some(volumes),
            restart_policy: Some("Never".into()),
            service_account_name: Some(self.rbac.service_account.clone()),
            ..Default::default()
        };
        pod_options.apply_to(&mut spec);
        spec
    }
}

#[async_trait]
impl<T: Transport, E: Endpoint> Transfer for RsyncServer<T, E> {
    fn identity(&self) -> &TransferIdentity {
        &self.identity
    }

    fn volumes(&self) -> &VolumeSet {
        &self.volumes
    }

    fn owned_objects(&self) -> Vec<OwnedObject> {
        let namespace = self.identity.namespace();
        let mut objects = vec![OwnedObject::new(
            OwnedKind::ConfigMap,
            namespace,
            object_name(&self.identity, MoverRole::Server, "config"),
        )];
        if self.authenticated {
            objects.push(OwnedObject::new(
                OwnedKind::Secret,
                namespace,
                object_name(&self.identity, MoverRole::Server, "credentials"),
            ));
        }
        objects.extend(self.rbac.owned_objects(namespace));
        objects.push(OwnedObject::new(OwnedKind::Pod, namespace, self.pod_name()));
        objects
    }

    /// Healthy once the endpoint routes traffic and every container of the daemon
    /// pod, tunnel included, is ready.
    async fn is_healthy<S: ObjectStore>(&self, store: &S) -> Result<bool, TransferError> {
        if !self.endpoint.is_healthy(store).await? {
            debug!(identity = %self.identity, "Endpoint is not healthy yet");
            return Ok(false);
        }

        let expected = 1 + self.transport.containers().len();
        let pod = store
            .get::<Pod>(self.identity.namespace(), &self.pod_name())
            .await?;
        Ok(pod.is_some_and(|pod| pod_ready(&pod, expected)))
    }

    async fn is_completed<S: ObjectStore>(&self, store: &S) -> Result<bool, TransferError> {
        Ok(self.status(store).await?.is_completed())
    }

    async fn mark_for_cleanup<S: ObjectStore>(
        &self,
        store: &S,
        key: &str,
        value: &str,
    ) -> Result<(), TransferError> {
        let mut errors = Vec::new();
        if let Err(e) = self.endpoint.mark_for_cleanup(store, key, value).await {
            errors.push(e);
        }
        if let Err(e) = self.transport.mark_for_cleanup(store, key, value).await {
            errors.push(e);
        }
        if let Err(e) = mark_all_for_cleanup(store, &self.owned_objects(), key, value).await {
            errors.push(e);
        }
        TransferError::from_errors(errors)
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod server_tests;
