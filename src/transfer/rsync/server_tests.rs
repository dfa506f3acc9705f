// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `server.rs`

#[cfg(test)]
mod tests {
    use super::super::{RsyncServer, RsyncServerOptions};
    use crate::context::ReconcileContext;
    use crate::endpoint::StaticEndpoint;
    use crate::errors::TransferError;
    use crate::store::{MemoryStore, ObjectStore};
    use crate::transfer::{PodOptions, Transfer, TransferStatus};
    use crate::transport::{NullTransport, StunnelServer, TransportOptions};
    use crate::volumes::VolumeSet;
    use k8s_openapi::api::core::v1::{
        ConfigMap, ContainerState, ContainerStateRunning, ContainerStateTerminated,
        ContainerStatus, PersistentVolumeClaim, Pod, PodStatus, Secret, SecurityContext,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    const NS: &str = "apps";

    fn claim(name: &str) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(NS.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn volumes() -> VolumeSet {
        VolumeSet::new(vec![claim("data-0"), claim("data-1")]).unwrap()
    }

    fn endpoint() -> StaticEndpoint {
        StaticEndpoint::new("rsync.apps.svc.cluster.local", 6443, 443)
    }

    async fn stunnel_server(
        store: &MemoryStore,
        options: RsyncServerOptions,
    ) -> RsyncServer<StunnelServer, StaticEndpoint> {
        let volumes = volumes();
        let context = ReconcileContext::default();
        let transport = StunnelServer::reconcile(
            store,
            volumes.identity(),
            &endpoint(),
            &context,
            TransportOptions::default(),
        )
        .await
        .unwrap();

        RsyncServer::reconcile(store, volumes, endpoint(), transport, &context, options)
            .await
            .unwrap()
    }

    async fn daemon_pod<T, E>(store: &MemoryStore, server: &RsyncServer<T, E>) -> Pod
    where
        T: crate::transport::Transport,
        E: crate::endpoint::Endpoint,
    {
        store.get(NS, &server.pod_name()).await.unwrap().unwrap()
    }

    async fn set_statuses(store: &MemoryStore, name: &str, statuses: Vec<ContainerStatus>) {
        let mut pod: Pod = store.get(NS, name).await.unwrap().unwrap();
        pod.status = Some(PodStatus {
            container_statuses: Some(statuses),
            ..Default::default()
        });
        store.replace(NS, &pod).await.unwrap();
    }

    fn container(name: &str, ready: bool, state: ContainerState) -> ContainerStatus {
        ContainerStatus {
            name: name.to_string(),
            ready,
            state: Some(state),
            ..Default::default()
        }
    }

    fn running() -> ContainerState {
        ContainerState {
            running: Some(ContainerStateRunning::default()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_daemon_pod_layout() {
        let store = MemoryStore::new();
        let server = stunnel_server(&store, RsyncServerOptions::default()).await;

        let pod = daemon_pod(&store, &server).await;
        let spec = pod.spec.unwrap();
        let names: Vec<&str> = spec.containers.iter().map(|c| c.name.as_str()).collect();

        assert_eq!(server.pod_name(), format!("server-rsync-{}", volumes().identity().suffix()));
        assert_eq!(names, vec!["rsync", "stunnel"]);
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
        assert_eq!(
            spec.containers[0].ports.clone().unwrap()[0].container_port,
            8080
        );
        let claims: Vec<String> = spec
            .volumes
            .unwrap()
            .into_iter()
            .filter_map(|v| v.persistent_volume_claim)
            .map(|pvc| pvc.claim_name)
            .collect();
        assert_eq!(claims, vec!["data-0", "data-1"]);
        assert_eq!(
            pod.metadata
                .labels
                .unwrap()
                .get("app.kubernetes.io/component")
                .map(String::as_str),
            Some("rsync-server")
        );
    }

    #[tokio::test]
    async fn test_daemon_restricted_to_localhost_behind_tunnel() {
        let store = MemoryStore::new();
        let server = stunnel_server(&store, RsyncServerOptions::default()).await;

        let cm: ConfigMap = store
            .get(NS, &format!("server-rsync-config-{}", server.identity().suffix()))
            .await
            .unwrap()
            .unwrap();
        let conf = cm.data.unwrap().remove("rsyncd.conf").unwrap();

        assert!(conf.contains("hosts allow = ::1, 127.0.0.1, localhost"));
        assert!(!conf.contains("auth users"));
    }

    #[tokio::test]
    async fn test_null_transport_listens_on_backend_port() {
        let store = MemoryStore::new();
        let volumes = volumes();
        let transport = NullTransport::server(volumes.identity(), &endpoint());

        let server = RsyncServer::reconcile(
            &store,
            volumes,
            endpoint(),
            transport,
            &ReconcileContext::default(),
            RsyncServerOptions::default(),
        )
        .await
        .unwrap();

        let spec = daemon_pod(&store, &server).await.spec.unwrap();
        assert_eq!(spec.containers.len(), 1);
        assert_eq!(
            spec.containers[0].ports.clone().unwrap()[0].container_port,
            6443
        );
    }

    #[tokio::test]
    async fn test_password_creates_secrets_file() {
        let store = MemoryStore::new();
        let options = RsyncServerOptions {
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let server = stunnel_server(&store, options).await;

        let secret: Secret = store
            .get(
                NS,
                &format!("server-rsync-credentials-{}", server.identity().suffix()),
            )
            .await
            .unwrap()
            .unwrap();
        let entry = secret.data.unwrap().remove("credentials").unwrap();
        assert_eq!(entry.0, b"root:hunter2");

        let spec = daemon_pod(&store, &server).await.spec.unwrap();
        let secret_volume = spec
            .volumes
            .unwrap()
            .into_iter()
            .find(|v| v.name == "rsync-credentials")
            .and_then(|v| v.secret)
            .unwrap();
        assert_eq!(secret_volume.items.unwrap()[0].mode, Some(0o600));
    }

    #[tokio::test]
    async fn test_empty_password_creates_nothing() {
        let store = MemoryStore::new();
        let volumes = volumes();
        let transport = NullTransport::server(volumes.identity(), &endpoint());

        let err = RsyncServer::reconcile(
            &store,
            volumes,
            endpoint(),
            transport,
            &ReconcileContext::default(),
            RsyncServerOptions {
                password: Some(String::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::EmptySecret { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unsafe_username_creates_nothing() {
        let store = MemoryStore::new();
        let volumes = volumes();
        let transport = NullTransport::server(volumes.identity(), &endpoint());

        let err = RsyncServer::reconcile(
            &store,
            volumes,
            endpoint(),
            transport,
            &ReconcileContext::default(),
            RsyncServerOptions {
                username: "root\n[all]".to_string(),
                password: Some("changeme".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::InvalidDaemonAddress { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_non_root_pod_options_create_nothing() {
        let store = MemoryStore::new();
        let volumes = volumes();
        let transport = NullTransport::server(volumes.identity(), &endpoint());
        let options = RsyncServerOptions {
            pod: PodOptions {
                container_security_context: Some(SecurityContext {
                    run_as_user: Some(1001),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        let err = RsyncServer::reconcile(
            &store,
            volumes,
            endpoint(),
            transport,
            &ReconcileContext::default(),
            options,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::InvalidPodOptions(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let store = MemoryStore::new();
        stunnel_server(&store, RsyncServerOptions::default()).await;
        let writes = store.write_count();
        let objects = store.len();

        stunnel_server(&store, RsyncServerOptions::default()).await;

        assert_eq!(store.write_count(), writes);
        assert_eq!(store.len(), objects);
    }

    #[tokio::test]
    async fn test_health_and_completion() {
        let store = MemoryStore::new();
        let server = stunnel_server(&store, RsyncServerOptions::default()).await;
        let pod_name = server.pod_name();

        assert!(!server.is_healthy(&store).await.unwrap());
        assert_eq!(server.status(&store).await.unwrap(), TransferStatus::Pending);

        set_statuses(
            &store,
            &pod_name,
            vec![
                container("rsync", true, running()),
                container("stunnel", true, running()),
            ],
        )
        .await;
        assert!(server.is_healthy(&store).await.unwrap());
        assert!(!server.is_completed(&store).await.unwrap());

        set_statuses(
            &store,
            &pod_name,
            vec![
                container(
                    "rsync",
                    false,
                    ContainerState {
                        terminated: Some(ContainerStateTerminated {
                            exit_code: 0,
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                ),
                container("stunnel", true, running()),
            ],
        )
        .await;
        assert!(server.is_completed(&store).await.unwrap());
        assert!(server.status(&store).await.unwrap().is_successful());
    }

    #[tokio::test]
    async fn test_mark_for_cleanup_labels_everything() {
        let store = MemoryStore::new();
        let server = stunnel_server(&store, RsyncServerOptions::default()).await;
        let objects = store.len();

        server
            .mark_for_cleanup(&store, "migration-complete", "true")
            .await
            .unwrap();

        assert_eq!(store.len(), objects);
        for object in store.objects() {
            assert_eq!(
                object["metadata"]["labels"]["migration-complete"], "true",
                "{} not marked",
                object["metadata"]["name"]
            );
        }
    }
}
