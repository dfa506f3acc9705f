// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `stunnel/mod.rs`

#[cfg(test)]
mod tests {
    use super::super::{
        config_map_name, credentials_data_valid, credentials_secret_name, generate_psk,
        reconcile_credentials, tunnel_volumes, TunnelRole,
    };
    use crate::constants::{PSK_KEY, SERVER_CRT_KEY};
    use crate::context::ReconcileContext;
    use crate::errors::TransferError;
    use crate::naming::TransferIdentity;
    use crate::store::{MemoryStore, ObjectStore};
    use crate::transport::certs::CertificateBundle;
    use crate::transport::{Credentials, CredentialsType, SecretRef};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    const NS: &str = "apps";

    fn identity() -> TransferIdentity {
        TransferIdentity::new(NS, "a1b2c3d4e5")
    }

    fn tls() -> Credentials {
        Credentials::default()
    }

    fn psk() -> Credentials {
        Credentials {
            credentials_type: CredentialsType::Psk,
            secret_ref: None,
        }
    }

    async fn stored_secret(store: &MemoryStore) -> Secret {
        store
            .get(NS, &credentials_secret_name(&identity()))
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_object_names() {
        assert_eq!(
            credentials_secret_name(&identity()),
            "certs-stunnel-credentials-a1b2c3d4e5"
        );
        assert_eq!(
            config_map_name(&identity(), TunnelRole::Server),
            "server-stunnel-config-a1b2c3d4e5"
        );
        assert_eq!(
            config_map_name(&identity(), TunnelRole::Client),
            "client-stunnel-config-a1b2c3d4e5"
        );
    }

    #[test]
    fn test_generate_psk_format() {
        let key = generate_psk();
        let (user, encoded) = key.split_once(':').unwrap();
        let secret = BASE64.decode(encoded).unwrap();

        assert_eq!(user, "transfer");
        assert_eq!(secret.len(), 32);
        assert!(secret.iter().all(u8::is_ascii_alphanumeric));
    }

    #[test]
    fn test_psk_validation() {
        let mut data = BTreeMap::new();
        assert!(!credentials_data_valid(CredentialsType::Psk, &data));

        data.insert(PSK_KEY.to_string(), ByteString(Vec::new()));
        assert!(!credentials_data_valid(CredentialsType::Psk, &data));

        data.insert(PSK_KEY.to_string(), ByteString(generate_psk().into_bytes()));
        assert!(credentials_data_valid(CredentialsType::Psk, &data));
        assert!(!credentials_data_valid(CredentialsType::Tls, &data));
    }

    #[tokio::test]
    async fn test_tls_credentials_generated_once() {
        let store = MemoryStore::new();
        let context = ReconcileContext::default();

        let first = reconcile_credentials(&store, &identity(), &context, &tls())
            .await
            .unwrap();
        let generated = stored_secret(&store).await;
        let writes = store.write_count();

        let second = reconcile_credentials(&store, &identity(), &context, &tls())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.write_count(), writes);
        assert_eq!(stored_secret(&store).await.data, generated.data);
        assert!(credentials_data_valid(
            CredentialsType::Tls,
            &generated.data.unwrap()
        ));
    }

    #[tokio::test]
    async fn test_invalid_bundle_is_regenerated_whole() {
        let store = MemoryStore::new();
        let context = ReconcileContext::default();
        reconcile_credentials(&store, &identity(), &context, &tls())
            .await
            .unwrap();

        // Swap in a server leaf signed by a different CA.
        let mut secret = stored_secret(&store).await;
        let other = CertificateBundle::generate().unwrap();
        let original_ca = secret.data.as_ref().unwrap().get("ca.crt").cloned();
        secret
            .data
            .as_mut()
            .unwrap()
            .insert(SERVER_CRT_KEY.to_string(), ByteString(other.server_crt.into_bytes()));
        store.replace(NS, &secret).await.unwrap();

        reconcile_credentials(&store, &identity(), &context, &tls())
            .await
            .unwrap();

        let data = stored_secret(&store).await.data.unwrap();
        assert!(credentials_data_valid(CredentialsType::Tls, &data));
        assert_ne!(data.get("ca.crt").cloned(), original_ca);
    }

    #[tokio::test]
    async fn test_psk_credentials_generated() {
        let store = MemoryStore::new();

        reconcile_credentials(&store, &identity(), &ReconcileContext::default(), &psk())
            .await
            .unwrap();

        let data = stored_secret(&store).await.data.unwrap();
        assert_eq!(data.len(), 1);
        assert!(credentials_data_valid(CredentialsType::Psk, &data));
    }

    #[tokio::test]
    async fn test_context_labels_applied_to_secret() {
        let store = MemoryStore::new();
        let context = ReconcileContext::new(
            BTreeMap::from([("owner".to_string(), "migration-1".to_string())]),
            Vec::new(),
        );

        reconcile_credentials(&store, &identity(), &context, &psk())
            .await
            .unwrap();

        let labels = stored_secret(&store).await.metadata.labels.unwrap();
        assert_eq!(labels.get("owner").map(String::as_str), Some("migration-1"));
    }

    #[tokio::test]
    async fn test_external_secret_is_validated_not_modified() {
        let store = MemoryStore::new();
        let bundle = CertificateBundle::generate().unwrap();
        store
            .create(
                NS,
                &Secret {
                    metadata: ObjectMeta {
                        name: Some("my-certs".to_string()),
                        ..Default::default()
                    },
                    data: Some(bundle.to_secret_data()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let writes = store.write_count();
        let credentials = Credentials {
            credentials_type: CredentialsType::Tls,
            secret_ref: Some(SecretRef {
                namespace: NS.to_string(),
                name: "my-certs".to_string(),
            }),
        };

        let secret_ref =
            reconcile_credentials(&store, &identity(), &ReconcileContext::default(), &credentials)
                .await
                .unwrap();

        assert_eq!(secret_ref.name, "my-certs");
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_external_secret_errors() {
        let store = MemoryStore::new();
        store
            .create(
                NS,
                &Secret {
                    metadata: ObjectMeta {
                        name: Some("broken".to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let external = |namespace: &str, name: &str| Credentials {
            credentials_type: CredentialsType::Tls,
            secret_ref: Some(SecretRef {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        };
        let context = ReconcileContext::default();

        for credentials in [
            external(NS, "missing"),
            external(NS, "broken"),
            external("elsewhere", "broken"),
        ] {
            let err = reconcile_credentials(&store, &identity(), &context, &credentials)
                .await
                .unwrap_err();
            assert!(matches!(err, TransferError::InvalidCredentials { .. }), "{err}");
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_tunnel_volumes_mount_role_keys() {
        let secret = SecretRef {
            namespace: NS.to_string(),
            name: "certs".to_string(),
        };

        let volumes = tunnel_volumes("cfg", &secret, CredentialsType::Tls, TunnelRole::Client);
        let items: Vec<String> = volumes[1]
            .secret
            .as_ref()
            .unwrap()
            .items
            .as_ref()
            .unwrap()
            .iter()
            .map(|item| item.key.clone())
            .collect();

        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[0].config_map.as_ref().unwrap().name, "cfg");
        assert_eq!(items, vec!["ca.crt", "client.crt", "client.key"]);

        let psk_volumes = tunnel_volumes("cfg", &secret, CredentialsType::Psk, TunnelRole::Server);
        let psk_items = psk_volumes[1].secret.as_ref().unwrap().items.as_ref().unwrap();
        assert_eq!(psk_items.len(), 1);
        assert_eq!(psk_items[0].key, "key");
    }
}
