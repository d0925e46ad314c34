// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the provider reconciler.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::crd::{DNSProviderSpec, DNSSelection};
    use crate::provider::inmemory::{InMemoryAccountFactory, PROVIDER_TYPE_IN_MEMORY};
    use crate::provider::CompoundAccountFactory;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use serde_json::json;
    use std::sync::Mutex;

    const RECHECK: Duration = Duration::from_secs(300);

    #[derive(Default)]
    struct MockProviderClient {
        finalizer_calls: Mutex<Vec<&'static str>>,
        statuses: Mutex<Vec<DNSProviderStatus>>,
    }

    impl MockProviderClient {
        fn last_status(&self) -> DNSProviderStatus {
            self.statuses.lock().unwrap().last().cloned().unwrap()
        }

        fn calls(&self) -> Vec<&'static str> {
            self.finalizer_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProviderClient for MockProviderClient {
        async fn add_finalizer(&self, _provider: &DNSProvider) -> Result<()> {
            self.finalizer_calls.lock().unwrap().push("add");
            Ok(())
        }

        async fn remove_finalizer(&self, _provider: &DNSProvider) -> Result<()> {
            self.finalizer_calls.lock().unwrap().push("remove");
            Ok(())
        }

        async fn update_status(&self, _provider: &DNSProvider, status: &DNSProviderStatus) -> Result<()> {
            self.statuses.lock().unwrap().push(status.clone());
            Ok(())
        }
    }

    struct Fixture {
        client: Arc<MockProviderClient>,
        registry: Arc<ProviderRegistry>,
        reconciler: ProviderReconciler,
    }

    fn fixture(disabled_types: &[&str]) -> Fixture {
        let client = Arc::new(MockProviderClient::default());
        let registry = Arc::new(ProviderRegistry::new());
        let factory = CompoundAccountFactory::new(
            Vec::new(),
            disabled_types.iter().map(ToString::to_string).collect(),
        )
        .with_factory(Box::new(InMemoryAccountFactory::new()));
        let reconciler = ProviderReconciler::new(
            client.clone(),
            Arc::clone(&registry),
            Arc::new(factory),
            360,
            RECHECK,
        );
        Fixture {
            client,
            registry,
            reconciler,
        }
    }

    fn provider(provider_type: &str, config: serde_json::Value) -> DNSProvider {
        let mut provider = DNSProvider::new(
            "memory",
            DNSProviderSpec {
                provider_type: provider_type.to_string(),
                provider_config: Some(config),
                ..Default::default()
            },
        );
        provider.metadata.namespace = Some("default".to_string());
        provider.metadata.generation = Some(2);
        provider
    }

    fn two_zones() -> serde_json::Value {
        json!({"zones": [{"dnsName": "example.com"}, {"dnsName": "example.org"}]})
    }

    fn key() -> ObjectKey {
        ObjectKey::new("default", "memory")
    }

    #[tokio::test]
    async fn test_provider_becomes_ready() {
        let f = fixture(&[]);
        let action = f
            .reconciler
            .reconcile(&provider(PROVIDER_TYPE_IN_MEMORY, two_zones()))
            .await
            .unwrap();

        assert_eq!(action, Action::requeue(RECHECK));
        assert_eq!(f.client.calls(), vec!["add"]);

        let status = f.client.last_status();
        assert_eq!(status.state, STATE_READY);
        assert_eq!(status.message.as_deref(), Some(MESSAGE_OPERATIONAL));
        assert_eq!(status.observed_generation, Some(2));
        assert_eq!(status.default_ttl, Some(360));
        assert_eq!(status.domains.included, vec!["example.com", "example.org"]);
        assert_eq!(status.zones.included, vec!["example.com", "example.org"]);

        let state = f.registry.get(&key()).await.unwrap();
        assert_eq!(state.zones().len(), 2);
        assert_eq!(state.default_ttl, 360);
    }

    #[tokio::test]
    async fn test_spec_default_ttl_and_domain_filter() {
        let f = fixture(&[]);
        let mut p = provider(PROVIDER_TYPE_IN_MEMORY, two_zones());
        p.spec.default_ttl = Some(60);
        p.spec.domains = Some(DNSSelection {
            include: vec!["example.org".to_string()],
            exclude: Vec::new(),
        });
        f.reconciler.reconcile(&p).await.unwrap();

        let status = f.client.last_status();
        assert_eq!(status.default_ttl, Some(60));
        assert_eq!(status.domains.included, vec!["example.org"]);
        assert_eq!(f.registry.get(&key()).await.unwrap().default_ttl, 60);
    }

    #[tokio::test]
    async fn test_unchanged_provider_skips_status_write() {
        let f = fixture(&[]);
        let mut p = provider(PROVIDER_TYPE_IN_MEMORY, two_zones());
        f.reconciler.reconcile(&p).await.unwrap();

        p.status = Some(f.client.last_status());
        p.metadata.finalizers = Some(vec![FINALIZER_DNSMAN.to_string()]);
        f.reconciler.reconcile(&p).await.unwrap();

        assert_eq!(f.client.statuses.lock().unwrap().len(), 1);
        assert_eq!(f.client.calls(), vec!["add"]);
    }

    #[tokio::test]
    async fn test_unsupported_type_is_invalid() {
        let f = fixture(&[]);
        let action = f
            .reconciler
            .reconcile(&provider("aws-route53", json!({})))
            .await
            .unwrap();

        assert_eq!(action, Action::await_change());
        let status = f.client.last_status();
        assert_eq!(status.state, STATE_INVALID);
        assert_eq!(
            status.message.as_deref(),
            Some(r#"provider type "aws-route53" is not supported"#)
        );
        assert!(f.client.calls().is_empty());
        assert!(f.registry.get(&key()).await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_type_is_invalid() {
        let f = fixture(&[PROVIDER_TYPE_IN_MEMORY]);
        f.reconciler
            .reconcile(&provider(PROVIDER_TYPE_IN_MEMORY, two_zones()))
            .await
            .unwrap();

        let status = f.client.last_status();
        assert_eq!(status.state, STATE_INVALID);
        assert_eq!(
            status.message.as_deref(),
            Some(r#"provider type "in-memory" is not enabled"#)
        );
    }

    #[tokio::test]
    async fn test_bad_config_is_error() {
        let f = fixture(&[]);
        let action = f
            .reconciler
            .reconcile(&provider(PROVIDER_TYPE_IN_MEMORY, json!({"zones": "nope"})))
            .await
            .unwrap();

        assert_eq!(action, Action::requeue(RECHECK));
        let status = f.client.last_status();
        assert_eq!(status.state, STATE_ERROR);
        assert!(status
            .message
            .unwrap()
            .starts_with(r#"invalid provider config for type "in-memory""#));
        assert_eq!(f.client.calls(), vec!["add"]);
    }

    #[tokio::test]
    async fn test_account_without_zones_fails() {
        let f = fixture(&[]);
        let err = f
            .reconciler
            .reconcile(&provider(PROVIDER_TYPE_IN_MEMORY, json!({"zones": []})))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "no hosted zones available in account");
        assert_eq!(f.client.last_status().state, STATE_ERROR);
    }

    #[tokio::test]
    async fn test_get_zones_failure_drops_registered_state() {
        let f = fixture(&[]);
        f.reconciler
            .reconcile(&provider(PROVIDER_TYPE_IN_MEMORY, two_zones()))
            .await
            .unwrap();
        assert!(f.registry.get(&key()).await.is_some());

        let failing = provider(
            PROVIDER_TYPE_IN_MEMORY,
            json!({"zones": [{"dnsName": "example.com"}], "failGetZones": true}),
        );
        f.reconciler.reconcile(&failing).await.unwrap_err();

        assert!(f.registry.get(&key()).await.is_none());
        assert_eq!(
            f.client.last_status().message.as_deref(),
            Some("failed to get hosted zones: forced failure (failGetZones)")
        );
    }

    #[tokio::test]
    async fn test_selection_error_sets_error() {
        let f = fixture(&[]);
        let mut p = provider(PROVIDER_TYPE_IN_MEMORY, two_zones());
        p.spec.domains = Some(DNSSelection {
            include: vec!["example.net".to_string()],
            exclude: Vec::new(),
        });
        let action = f.reconciler.reconcile(&p).await.unwrap();

        assert_eq!(action, Action::requeue(RECHECK));
        let status = f.client.last_status();
        assert_eq!(status.state, STATE_ERROR);
        assert!(status
            .message
            .unwrap()
            .starts_with("no domain matching hosting zones"));
        assert!(f.registry.get(&key()).await.is_none());
    }

    #[tokio::test]
    async fn test_deletion_unregisters_and_releases_finalizer() {
        let f = fixture(&[]);
        let mut p = provider(PROVIDER_TYPE_IN_MEMORY, two_zones());
        f.reconciler.reconcile(&p).await.unwrap();

        p.metadata.finalizers = Some(vec![FINALIZER_DNSMAN.to_string()]);
        p.metadata.deletion_timestamp = Some(Time(k8s_openapi::jiff::Timestamp::now()));
        let action = f.reconciler.reconcile(&p).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(f.client.calls(), vec!["add", "remove"]);
        assert!(f.registry.get(&key()).await.is_none());
    }
}
