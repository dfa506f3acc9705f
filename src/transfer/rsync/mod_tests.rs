// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `rsync/mod.rs`

#[cfg(test)]
mod tests {
    use super::super::{object_name, reconcile_rbac, MoverRole};
    use crate::context::ReconcileContext;
    use crate::naming::TransferIdentity;
    use crate::store::{MemoryStore, ObjectStore};
    use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
    use std::collections::BTreeMap;

    fn identity() -> TransferIdentity {
        TransferIdentity::new("apps", "a1b2c3d4e5")
    }

    #[test]
    fn test_object_names() {
        assert_eq!(
            object_name(&identity(), MoverRole::Server, ""),
            "server-rsync-a1b2c3d4e5"
        );
        assert_eq!(
            object_name(&identity(), MoverRole::Client, "password"),
            "client-rsync-password-a1b2c3d4e5"
        );
    }

    #[tokio::test]
    async fn test_rbac_grants_scc_use() {
        let store = MemoryStore::new();
        let context = ReconcileContext::new(
            BTreeMap::from([("app".to_string(), "migration".to_string())]),
            vec![],
        );

        let names = reconcile_rbac(&store, &identity(), &context, MoverRole::Server, "anyuid")
            .await
            .unwrap();

        let role: Role = store.get("apps", &names.role).await.unwrap().unwrap();
        let rule = &role.rules.unwrap()[0];
        assert_eq!(rule.verbs, vec!["use"]);
        assert_eq!(rule.resource_names.clone().unwrap(), vec!["anyuid"]);
        assert_eq!(
            role.metadata.labels.unwrap().get("app").map(String::as_str),
            Some("migration")
        );

        let binding: RoleBinding = store
            .get("apps", &names.role_binding)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(binding.role_ref.name, names.role);
        assert_eq!(
            binding.subjects.unwrap()[0].name,
            "server-rsync-sa-a1b2c3d4e5"
        );
        assert_eq!(store.len(), 3);
    }
}
