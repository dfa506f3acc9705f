// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Client side of the rsync transfer.
//!
//! Every volume gets its own pod running the rsync client next to the client end of
//! the transport. Pods complete independently; a failed sync on one volume does not
//! affect its siblings.
//!
//! The rsync client and the tunnel share an in-memory directory. When the client
//! exits it drops a sentinel file there, which stops the tunnel container so the pod
//! can terminate. The tunnel also gives up after a bounded deadline so a pod never
//! hangs on a client that died without leaving the sentinel.

use super::config::{
    render_client_script, render_tunnel_wait_script, validate_daemon_host, validate_daemon_user,
    ClientScriptFields,
};
use super::options::CommandOptions;
use super::{object_name, reconcile_rbac, MoverRole, RbacNames};
use crate::constants::{
    COMMUNICATION_DIR, COMMUNICATION_VOLUME, DEFAULT_SENTINEL_DEADLINE_SECS, RSYNC_CONTAINER,
    RSYNC_DEFAULT_USER, RSYNC_PASSWORD_ENV, RSYNC_PASSWORD_KEY, STUNNEL_CONTAINER,
};
use crate::context::ReconcileContext;
use crate::errors::TransferError;
use crate::labels::{
    COMPONENT_RSYNC_CLIENT, K8S_COMPONENT, K8S_PART_OF, PART_OF_PVC_TRANSFER, PVC_ANNOTATION,
};
use crate::metrics::record_reconciliation;
use crate::naming::TransferIdentity;
use crate::reconcilers::{
    create_or_update, create_or_update_pod, mark_all_for_cleanup, OwnedKind, OwnedObject,
};
use crate::store::ObjectStore;
use crate::transfer::{container_status, PodOptions, Transfer, TransferStatus};
use crate::transport::{Transport, TransportType};
use crate::volumes::{TransferVolume, VolumeSet};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, PersistentVolumeClaimVolumeSource, Pod,
    PodSpec, Secret, SecretKeySelector, Volume, VolumeMount,
};
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

/// Caller configuration of the client pods.
#[derive(Clone, Debug, PartialEq)]
pub struct RsyncClientOptions {
    /// User to authenticate as against the daemon
    pub username: String,
    /// Password for the daemon; must not be empty when set
    pub password: Option<String>,
    pub command_options: CommandOptions,
    pub pod: PodOptions,
    /// Seconds the tunnel waits for the client sentinel before exiting anyway
    pub sentinel_deadline_secs: u32,
}

impl Default for RsyncClientOptions {
    fn default() -> Self {
        Self {
            username: RSYNC_DEFAULT_USER.to_string(),
            password: None,
            command_options: CommandOptions::with_defaults(&[]),
            pod: PodOptions::default(),
            sentinel_deadline_secs: DEFAULT_SENTINEL_DEADLINE_SECS,
        }
    }
}

/// Reconciled client side of an rsync transfer.
#[derive(Clone, Debug)]
pub struct RsyncClient<T: Transport> {
    identity: TransferIdentity,
    volumes: VolumeSet,
    transport: T,
    has_password: bool,
    rbac: RbacNames,
}

impl<T: Transport> RsyncClient<T> {
    /// Reconcile every object of the client side, one pod per volume.
    ///
    /// `transport` must be the client end of a tunnel (or the null transport)
    /// pointing at the server side.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the password is empty, or the command options, user name, remote host or
    ///   pod options are invalid (nothing is written)
    /// - a shared object cannot be reconciled
    /// - one or more volume pods cannot be reconciled; every volume is attempted
    pub async fn reconcile<S: ObjectStore>(
        store: &S,
        volumes: VolumeSet,
        transport: T,
        context: &ReconcileContext,
        options: RsyncClientOptions,
    ) -> Result<Self, TransferError> {
        let start = Instant::now();
        let result = Self::reconcile_inner(store, volumes, transport, context, options).await;
        record_reconciliation("RsyncClient", start.elapsed(), result.is_ok());
        result
    }

    async fn reconcile_inner<S: ObjectStore>(
        store: &S,
        volumes: VolumeSet,
        transport: T,
        context: &ReconcileContext,
        options: RsyncClientOptions,
    ) -> Result<Self, TransferError> {
        if options.password.as_deref() == Some("") {
            return Err(TransferError::EmptySecret {
                what: "rsync client password".to_string(),
            });
        }
        let args = options.command_options.to_args()?;
        validate_daemon_user(&options.username)?;
        validate_daemon_host(&transport.hostname())?;
        options.pod.validate()?;

        let identity = volumes.identity();
        let namespace = identity.namespace().to_string();

        if let Some(password) = &options.password {
            let name = object_name(&identity, MoverRole::Client, "password");
            let password = password.clone();
            create_or_update(store, &namespace, &name, |s: &mut Secret| {
                context.apply_to(&mut s.metadata);
                s.data = Some(BTreeMap::from([(
                    RSYNC_PASSWORD_KEY.to_string(),
                    ByteString(password.into_bytes()),
                )]));
                Ok(())
            })
            .await?;
        }

        let rbac = reconcile_rbac(
            store,
            &identity,
            context,
            MoverRole::Client,
            &options.pod.scc_name(),
        )
        .await?;

        let client = Self {
            identity,
            volumes,
            transport,
            has_password: options.password.is_some(),
            rbac,
        };

        let labels = context.labels_with(&[
            (K8S_COMPONENT, COMPONENT_RSYNC_CLIENT),
            (K8S_PART_OF, PART_OF_PVC_TRANSFER),
        ]);
        let mut errors = Vec::new();
        for volume in client.volumes.iter() {
            let result = client
                .reconcile_volume_pod(store, context, &labels, &options, &args, volume)
                .await;
            if let Err(e) = result {
                warn!(
                    namespace = %namespace,
                    claim = %volume.name(),
                    error = %e,
                    "Failed to reconcile rsync client pod"
                );
                errors.push(e);
            }
        }
        TransferError::from_errors(errors)?;

        info!(
            identity = %client.identity,
            volumes = client.volumes.len(),
            transport = %client.transport.transport_type(),
            "Reconciled rsync client"
        );
        Ok(client)
    }

    async fn reconcile_volume_pod<S: ObjectStore>(
        &self,
        store: &S,
        context: &ReconcileContext,
        labels: &BTreeMap<String, String>,
        options: &RsyncClientOptions,
        args: &[String],
        volume: &TransferVolume,
    ) -> Result<(), TransferError> {
        let host = self.transport.hostname();
        let script = render_client_script(&ClientScriptFields {
            volume,
            options: args,
            username: &options.username,
            host: &host,
            port: self.transport.listen_port(),
        })?;
        let spec = self.pod_spec(options, volume, script)?;
        let annotations = BTreeMap::from([(PVC_ANNOTATION.to_string(), volume.name())]);

        create_or_update_pod(
            store,
            self.identity.namespace(),
            &self.pod_name(volume),
            context,
            labels,
            &annotations,
            spec,
        )
        .await?;
        Ok(())
    }

    /// Name of the client pod moving `volume`
    #[must_use]
    pub fn pod_name(&self, volume: &TransferVolume) -> String {
        object_name(&self.identity, MoverRole::Client, volume.label_safe_name())
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Observed state of every volume's client container, keyed by claim name.
    ///
    /// # Errors
    ///
    /// Returns an error if a store read fails.
    pub async fn status<S: ObjectStore>(
        &self,
        store: &S,
    ) -> Result<BTreeMap<String, TransferStatus>, TransferError> {
        let mut statuses = BTreeMap::new();
        for volume in self.volumes.iter() {
            let pod = store
                .get::<Pod>(self.identity.namespace(), &self.pod_name(volume))
                .await?;
            let status = pod.map_or(TransferStatus::Pending, |pod| {
                container_status(&pod, RSYNC_CONTAINER)
            });
            statuses.insert(volume.name(), status);
        }
        Ok(statuses)
    }

    fn pod_spec(
        &self,
        options: &RsyncClientOptions,
        volume: &TransferVolume,
        script: String,
    ) -> Result<PodSpec, TransferError> {
        let communication_mount = VolumeMount {
            name: COMMUNICATION_VOLUME.into(),
            mount_path: COMMUNICATION_DIR.into(),
            ..Default::default()
        };

        let env = self.has_password.then(|| {
            vec![EnvVar {
                name: RSYNC_PASSWORD_ENV.into(),
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name: object_name(&self.identity, MoverRole::Client, "password"),
                        key: RSYNC_PASSWORD_KEY.into(),
                        optional: Some(true),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]
        });

        let rsync = Container {
            name: RSYNC_CONTAINER.into(),
            image: Some(options.pod.image()),
            image_pull_policy: Some("IfNotPresent".into()),
            command: Some(vec!["/bin/bash".into(), "-c".into(), script]),
            env,
            volume_mounts: Some(vec![
                VolumeMount {
                    name: volume.label_safe_name().to_string(),
                    mount_path: volume.mount_path(),
                    ..Default::default()
                },
                communication_mount.clone(),
            ]),
            ..Default::default()
        };

        let mut containers = vec![rsync];
        for mut container in self.transport.containers() {
            if self.transport.transport_type() == TransportType::Stunnel
                && container.name == STUNNEL_CONTAINER
            {
                let wait = render_tunnel_wait_script(options.sentinel_deadline_secs)?;
                container.command = Some(vec!["/bin/bash".into(), "-c".into(), wait]);
                container
                    .volume_mounts
                    .get_or_insert_with(Vec::new)
                    .push(communication_mount.clone());
            }
            containers.push(container);
        }

        let mut volumes = vec![
            Volume {
                name: volume.label_safe_name().to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: volume.name(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            Volume {
                name: COMMUNICATION_VOLUME.into(),
                empty_dir: Some(EmptyDirVolumeSource {
                    medium: Some("Memory".into()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ];
        volumes.extend(self.transport.volumes());

        let mut spec = PodSpec {
            containers,
            volumes: Some(volumes),
            restart_policy: Some("Never".into()),
            service_account_name: Some(self.rbac.service_account.clone()),
            ..Default::default()
        };
        options.pod.apply_to(&mut spec);
        Ok(spec)
    }
}

#[async_trait]
impl<T: Transport> Transfer for RsyncClient<T> {
    fn identity(&self) -> &TransferIdentity {
        &self.identity
    }

    fn volumes(&self) -> &VolumeSet {
        &self.volumes
    }

    fn owned_objects(&self) -> Vec<OwnedObject> {
        let namespace = self.identity.namespace();
        let mut objects = Vec::new();
        if self.has_password {
            objects.push(OwnedObject::new(
                OwnedKind::Secret,
                namespace,
                object_name(&self.identity, MoverRole::Client, "password"),
            ));
        }
        objects.extend(self.rbac.owned_objects(namespace));
        for volume in self.volumes.iter() {
            objects.push(OwnedObject::new(
                OwnedKind::Pod,
                namespace,
                self.pod_name(volume),
            ));
        }
        objects
    }

    /// Healthy while every volume pod exists and none of them has failed.
    async fn is_healthy<S: ObjectStore>(&self, store: &S) -> Result<bool, TransferError> {
        for volume in self.volumes.iter() {
            let pod = store
                .get::<Pod>(self.identity.namespace(), &self.pod_name(volume))
                .await?;
            let Some(pod) = pod else {
                return Ok(false);
            };
            if let TransferStatus::Completed {
                successful: false, ..
            } = container_status(&pod, RSYNC_CONTAINER)
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn is_completed<S: ObjectStore>(&self, store: &S) -> Result<bool, TransferError> {
        Ok(self
            .status(store)
            .await?
            .values()
            .all(|status| status.is_completed()))
    }

    async fn mark_for_cleanup<S: ObjectStore>(
        &self,
        store: &S,
        key: &str,
        value: &str,
    ) -> Result<(), TransferError> {
        let mut errors = Vec::new();
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
#[path = "client_tests.rs"]
mod client_tests;
