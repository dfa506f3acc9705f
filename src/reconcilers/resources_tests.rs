// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `resources.rs`

#[cfg(test)]
mod tests {
    use super::super::{create_or_update, create_or_update_pod, OperationResult};
    use crate::context::ReconcileContext;
    use crate::errors::TransferError;
    use crate::store::{MemoryStore, ObjectStore};
    use k8s_openapi::api::core::v1::{ConfigMap, Container, Pod, PodSpec};
    use std::collections::BTreeMap;

    const TEST_NAMESPACE: &str = "test-namespace";
    const TEST_NAME: &str = "test-resource";

    fn data(value: &str) -> Option<BTreeMap<String, String>> {
        let mut data = BTreeMap::new();
        data.insert("key".to_string(), value.to_string());
        Some(data)
    }

    fn pod_spec(image: &str) -> PodSpec {
        PodSpec {
            containers: vec![Container {
                name: "rsync".to_string(),
                image: Some(image.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_unchanged() {
        let store = MemoryStore::new();

        let (created, first) = create_or_update(&store, TEST_NAMESPACE, TEST_NAME, |cm: &mut ConfigMap| {
            cm.data = data("v1");
            Ok(())
        })
        .await
        .unwrap();
        let (_, second) = create_or_update(&store, TEST_NAMESPACE, TEST_NAME, |cm: &mut ConfigMap| {
            cm.data = data("v1");
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(first, OperationResult::Created);
        assert_eq!(second, OperationResult::Unchanged);
        assert_eq!(created.metadata.name.as_deref(), Some(TEST_NAME));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_changed_object_is_updated() {
        let store = MemoryStore::new();
        create_or_update(&store, TEST_NAMESPACE, TEST_NAME, |cm: &mut ConfigMap| {
            cm.data = data("v1");
            Ok(())
        })
        .await
        .unwrap();

        let (updated, result) = create_or_update(&store, TEST_NAMESPACE, TEST_NAME, |cm: &mut ConfigMap| {
            cm.data = data("v2");
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(result, OperationResult::Updated);
        assert_eq!(updated.data, data("v2"));
    }

    #[tokio::test]
    async fn test_mutate_error_creates_nothing() {
        let store = MemoryStore::new();

        let result = create_or_update(&store, TEST_NAMESPACE, TEST_NAME, |_: &mut ConfigMap| {
            Err(TransferError::EmptySecret {
                what: "password".to_string(),
            })
        })
        .await;

        assert!(matches!(result, Err(TransferError::EmptySecret { .. })));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_existing_pod_spec_is_left_untouched() {
        let store = MemoryStore::new();
        let ctx = ReconcileContext::default();
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "mover".to_string());
        let annotations = BTreeMap::new();

        create_or_update_pod(&store, TEST_NAMESPACE, TEST_NAME, &ctx, &labels, &annotations, pod_spec("image:v1"))
            .await
            .unwrap();

        labels.insert("round".to_string(), "two".to_string());
        let (pod, result) = create_or_update_pod(
            &store,
            TEST_NAMESPACE,
            TEST_NAME,
            &ctx,
            &labels,
            &annotations,
            pod_spec("image:v2"),
        )
        .await
        .unwrap();

        assert_eq!(result, OperationResult::Updated);
        let image = pod.spec.unwrap().containers[0].image.clone();
        assert_eq!(image.as_deref(), Some("image:v1"));
        assert_eq!(
            pod.metadata.labels.unwrap().get("round"),
            Some(&"two".to_string())
        );
    }

    #[tokio::test]
    async fn test_pod_reconcile_is_idempotent() {
        let store = MemoryStore::new();
        let ctx = ReconcileContext::default();
        let labels = BTreeMap::new();
        let mut annotations = BTreeMap::new();
        annotations.insert("pvc".to_string(), "data-0".to_string());

        for _ in 0..3 {
            create_or_update_pod(&store, TEST_NAMESPACE, TEST_NAME, &ctx, &labels, &annotations, pod_spec("image:v1"))
                .await
                .unwrap();
        }

        assert_eq!(store.write_count(), 1);
        let pod: Pod = store.get(TEST_NAMESPACE, TEST_NAME).await.unwrap().unwrap();
        assert_eq!(
            pod.metadata.annotations.unwrap().get("pvc"),
            Some(&"data-0".to_string())
        );
    }
}
