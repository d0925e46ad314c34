// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the provider registry.

#[cfg(test)]
mod tests {
    use crate::crd::ObjectKey;
    use crate::dns::{RecordType, ZoneId};
    use crate::dns_errors::ProviderError;
    use crate::provider::inmemory::{InMemoryAccountFactory, PROVIDER_TYPE_IN_MEMORY};
    use crate::provider::registry::*;
    use crate::provider::selection::SelectionResult;
    use crate::provider::AccountFactory;
    use serde_json::json;

    async fn state(name: &str, domain: &str) -> ProviderState {
        let account = InMemoryAccountFactory::new()
            .create(
                PROVIDER_TYPE_IN_MEMORY,
                Some(&json!({"zones": [{"dnsName": domain}]})),
            )
            .unwrap();
        let zones = account.get_zones().await.unwrap();
        ProviderState {
            key: ObjectKey::new("default", name),
            provider_type: PROVIDER_TYPE_IN_MEMORY.to_string(),
            account,
            all_zones: zones.clone(),
            selection: SelectionResult {
                zones,
                ..Default::default()
            },
            default_ttl: 300,
        }
    }

    #[tokio::test]
    async fn test_upsert_get_delete() {
        let registry = ProviderRegistry::new();
        let key = ObjectKey::new("default", "p1");
        assert!(registry.get(&key).await.is_none());

        registry.upsert(state("p1", "a.b").await).await;
        let stored = registry.get(&key).await.unwrap();
        assert_eq!(stored.default_ttl, 300);
        assert!(stored.find_zone(&ZoneId::new(PROVIDER_TYPE_IN_MEMORY, "a.b")).is_some());
        assert_eq!(stored.zones().len(), 1);

        registry.delete(&key).await;
        assert!(registry.get(&key).await.is_none());
        registry.delete(&key).await;
    }

    #[tokio::test]
    async fn test_find_account_for_zone() {
        let registry = ProviderRegistry::new();
        registry.upsert(state("p1", "a.b").await).await;
        registry.upsert(state("p2", "o.p").await).await;

        let (account, zone) = registry
            .find_account_for_zone(&ZoneId::new(PROVIDER_TYPE_IN_MEMORY, "o.p"))
            .await
            .unwrap();
        assert_eq!(account.provider_type(), PROVIDER_TYPE_IN_MEMORY);
        assert_eq!(zone.domain, "o.p");

        let missing = registry
            .find_account_for_zone(&ZoneId::new(PROVIDER_TYPE_IN_MEMORY, "x.y"))
            .await;
        assert!(matches!(missing, Err(ProviderError::NoAccountForZone(_))));
    }

    #[tokio::test]
    async fn test_query_handler_for_zone() {
        let registry = ProviderRegistry::new();
        registry.upsert(state("p1", "a.b").await).await;

        let handler = registry
            .query_handler_for_zone(&ZoneId::new(PROVIDER_TYPE_IN_MEMORY, "a.b"))
            .await
            .unwrap();
        let (targets, policy) = handler.query("www.a.b", "", RecordType::A).await.unwrap();
        assert!(targets.is_empty());
        assert!(policy.is_none());
    }

    #[test]
    fn test_dns_name_locks() {
        let registry = ProviderRegistry::new();
        let names = vec!["www.a.b".to_string(), "old.a.b".to_string()];

        let guard = registry.try_lock_dns_names(&names).unwrap();
        assert_eq!(guard.names(), names.as_slice());
        assert!(registry.try_lock_dns_names(&["www.a.b".to_string()]).is_none());
        assert!(registry.try_lock_dns_names(&["other.a.b".to_string()]).is_some());

        drop(guard);
        assert!(registry.try_lock_dns_names(&names).is_some());
    }

    #[test]
    fn test_dns_name_lock_with_duplicate_names() {
        let registry = ProviderRegistry::new();
        let names = vec!["www.a.b".to_string(), "www.a.b".to_string()];
        let guard = registry.try_lock_dns_names(&names).unwrap();
        assert_eq!(guard.names().len(), 1);
        drop(guard);
        assert!(registry.try_lock_dns_names(&names).is_some());
    }
}
