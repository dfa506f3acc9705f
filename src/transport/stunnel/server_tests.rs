// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `server.rs`

#[cfg(test)]
mod tests {
    use super::super::StunnelServer;
    use crate::context::ReconcileContext;
    use crate::endpoint::StaticEndpoint;
    use crate::naming::TransferIdentity;
    use crate::reconcilers::OwnedKind;
    use crate::store::{MemoryStore, ObjectStore};
    use crate::transport::{Transport, TransportOptions, TransportType};
    use k8s_openapi::api::core::v1::{ConfigMap, Secret};

    const NS: &str = "apps";

    fn identity() -> TransferIdentity {
        TransferIdentity::new(NS, "a1b2c3d4e5")
    }

    fn endpoint() -> StaticEndpoint {
        StaticEndpoint::new("rsync.apps.svc.cluster.local", 6443, 443)
    }

    async fn server(store: &MemoryStore) -> StunnelServer {
        StunnelServer::reconcile(
            store,
            identity(),
            &endpoint(),
            &ReconcileContext::default(),
            TransportOptions::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_ports_follow_endpoint() {
        let store = MemoryStore::new();
        let transport = server(&store).await;

        assert_eq!(transport.listen_port(), 6443);
        assert_eq!(transport.connect_port(), 8080);
        assert_eq!(transport.hostname(), "localhost");
        assert_eq!(transport.transport_type(), TransportType::Stunnel);
    }

    #[tokio::test]
    async fn test_config_map_rendered() {
        let store = MemoryStore::new();
        server(&store).await;

        let cm: ConfigMap = store
            .get(NS, "server-stunnel-config-a1b2c3d4e5")
            .await
            .unwrap()
            .unwrap();
        let config = cm.data.unwrap().remove("stunnel.conf").unwrap();

        assert!(config.contains("accept = 6443"));
        assert!(config.contains("connect = 8080"));
        assert!(config.contains("cert = /etc/stunnel/certs/server.crt"));
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let store = MemoryStore::new();
        server(&store).await;
        let writes = store.write_count();

        server(&store).await;

        assert_eq!(store.write_count(), writes);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_container_fragment() {
        let store = MemoryStore::new();
        let transport = server(&store).await;

        let containers = transport.containers();
        let command = containers[0].command.clone().unwrap();

        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "stunnel");
        assert_eq!(command[0], "/bin/bash");
        assert!(command[2].contains("nc -z localhost 8080"));
        assert_eq!(transport.volumes().len(), 2);
    }

    #[tokio::test]
    async fn test_mark_for_cleanup_labels_owned_objects() {
        let store = MemoryStore::new();
        let transport = server(&store).await;

        transport
            .mark_for_cleanup(&store, "migration-complete", "true")
            .await
            .unwrap();

        let kinds: Vec<OwnedKind> = transport.owned_objects().iter().map(|o| o.kind).collect();
        assert_eq!(kinds, vec![OwnedKind::ConfigMap, OwnedKind::Secret]);

        let cm: ConfigMap = store
            .get(NS, "server-stunnel-config-a1b2c3d4e5")
            .await
            .unwrap()
            .unwrap();
        let secret: Secret = store
            .get(NS, "certs-stunnel-credentials-a1b2c3d4e5")
            .await
            .unwrap()
            .unwrap();
        for labels in [cm.metadata.labels, secret.metadata.labels] {
            assert_eq!(
                labels.unwrap().get("migration-complete").map(String::as_str),
                Some("true")
            );
        }
        assert_eq!(store.len(), 2);
    }
}
