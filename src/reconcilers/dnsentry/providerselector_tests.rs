// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for provider and zone selection.

#[cfg(test)]
mod tests {
    use super::super::providerselector::*;
    use crate::constants::{STATE_ERROR, STATE_READY};
    use crate::crd::{DNSProvider, DNSProviderSpec, DNSProviderStatus, DNSSelectionStatus, ObjectKey};
    use crate::provider::inmemory::{
        InMemoryAccountFactory, InMemoryConfig, InMemoryZoneConfig, PROVIDER_TYPE_IN_MEMORY,
    };
    use crate::provider::registry::{ProviderRegistry, ProviderState};
    use crate::provider::selection::calc_zone_and_domain_selection;
    use crate::provider::DnsAccount;
    use kube::ResourceExt;
    use std::sync::Arc;
    use std::time::Duration;

    fn provider(name: &str, state: &str, included: &[&str], excluded: &[&str]) -> DNSProvider {
        let mut provider = DNSProvider::new(
            name,
            DNSProviderSpec {
                provider_type: PROVIDER_TYPE_IN_MEMORY.to_string(),
                ..Default::default()
            },
        );
        provider.metadata.namespace = Some("default".to_string());
        provider.status = Some(DNSProviderStatus {
            state: state.to_string(),
            domains: DNSSelectionStatus {
                included: included.iter().map(ToString::to_string).collect(),
                excluded: excluded.iter().map(ToString::to_string).collect(),
            },
            ..Default::default()
        });
        provider
    }

    fn names(found: Option<&DNSProvider>) -> Option<String> {
        found.map(ResourceExt::name_any)
    }

    async fn state_for(provider: &DNSProvider, zone_names: &[&str]) -> ProviderState {
        let account = InMemoryAccountFactory::new().create_account(
            InMemoryConfig {
                zones: zone_names
                    .iter()
                    .map(|name| InMemoryZoneConfig {
                        dns_name: (*name).to_string(),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            },
            provider.name_any(),
        );
        let zones = account.get_zones().await.unwrap();
        ProviderState {
            key: ObjectKey::from_resource(provider),
            provider_type: PROVIDER_TYPE_IN_MEMORY.to_string(),
            account: Arc::new(account),
            selection: calc_zone_and_domain_selection(&provider.spec, &zones),
            all_zones: zones,
            default_ttl: 120,
        }
    }

    #[test]
    fn test_longest_domain_match_wins() {
        let providers = vec![
            provider("a", STATE_READY, &["example.com"], &[]),
            provider("b", STATE_READY, &["sub.example.com"], &[]),
        ];
        assert_eq!(
            names(find_best_matching_provider(&providers, "www.sub.example.com", None)),
            Some("b".to_string())
        );
        assert_eq!(
            names(find_best_matching_provider(&providers, "www.example.com", None)),
            Some("a".to_string())
        );
    }

    #[test]
    fn test_ready_provider_preferred() {
        let providers = vec![
            provider("a", STATE_ERROR, &["sub.example.com"], &[]),
            provider("b", STATE_READY, &["example.com"], &[]),
        ];
        assert_eq!(
            names(find_best_matching_provider(&providers, "www.sub.example.com", None)),
            Some("b".to_string())
        );
    }

    #[test]
    fn test_not_ready_provider_used_as_fallback() {
        let providers = vec![provider("a", STATE_ERROR, &["example.com"], &[])];
        assert_eq!(
            names(find_best_matching_provider(&providers, "www.example.com", None)),
            Some("a".to_string())
        );
    }

    #[test]
    fn test_tie_keeps_current_provider() {
        let providers = vec![
            provider("b", STATE_READY, &["example.com"], &[]),
            provider("a", STATE_READY, &["example.com"], &[]),
        ];
        assert_eq!(
            names(find_best_matching_provider(&providers, "www.example.com", None)),
            Some("a".to_string())
        );
        assert_eq!(
            names(find_best_matching_provider(
                &providers,
                "www.example.com",
                Some("default/b")
            )),
            Some("b".to_string())
        );
    }

    #[test]
    fn test_excluded_domain_vetoes() {
        let providers = vec![provider(
            "a",
            STATE_READY,
            &["example.com"],
            &["internal.example.com"],
        )];
        assert!(find_best_matching_provider(&providers, "db.internal.example.com", None).is_none());
        assert!(find_best_matching_provider(&providers, "www.example.org", None).is_none());
    }

    #[test]
    fn test_provider_without_status_is_skipped() {
        let mut without_status = provider("a", STATE_READY, &["example.com"], &[]);
        without_status.status = None;
        assert!(find_best_matching_provider(&[without_status], "www.example.com", None).is_none());
    }

    #[tokio::test]
    async fn test_find_best_zone_prefers_longest_domain() {
        let p = provider("a", STATE_READY, &["example.com"], &[]);
        let state = state_for(&p, &["example.com", "sub.example.com"]).await;
        let zone = find_best_zone(&state, "www.sub.example.com").unwrap();
        assert_eq!(zone.domain, "sub.example.com");
        let zone = find_best_zone(&state, "www.example.com").unwrap();
        assert_eq!(zone.domain, "example.com");
        assert!(find_best_zone(&state, "www.example.org").is_none());
    }

    #[tokio::test]
    async fn test_calc_new_provider_found() {
        let p = provider("a", STATE_READY, &["example.com"], &[]);
        let registry = ProviderRegistry::new();
        registry.upsert(state_for(&p, &["example.com"]).await).await;

        let selection = calc_new_provider(&[p], "www.example.com", None, &registry)
            .await
            .unwrap();
        let ProviderSelection::Found(data) = selection else {
            panic!("expected a provider");
        };
        assert_eq!(data.provider_key, ObjectKey::new("default", "a"));
        assert_eq!(data.zone_id.id, "example.com");
        assert_eq!(data.default_ttl, 120);
    }

    #[tokio::test]
    async fn test_calc_new_provider_no_provider() {
        let registry = ProviderRegistry::new();
        let selection = calc_new_provider(&[], "www.example.com", None, &registry)
            .await
            .unwrap();
        assert!(matches!(selection, ProviderSelection::NoProvider));
    }

    #[tokio::test]
    async fn test_calc_new_provider_not_ready() {
        let registry = ProviderRegistry::new();

        let mut failed = provider("a", STATE_ERROR, &["example.com"], &[]);
        if let Some(status) = failed.status.as_mut() {
            status.message = Some("no hosted zones available in account".to_string());
        }
        let selection = calc_new_provider(&[failed], "www.example.com", None, &registry)
            .await
            .unwrap();
        let ProviderSelection::NotReady { message, .. } = selection else {
            panic!("expected not ready");
        };
        assert_eq!(
            message,
            "provider default/a has status Error: no hosted zones available in account"
        );

        let pending = provider("a", "", &["example.com"], &[]);
        let selection = calc_new_provider(&[pending], "www.example.com", None, &registry)
            .await
            .unwrap();
        let ProviderSelection::NotReady { message, .. } = selection else {
            panic!("expected not ready");
        };
        assert_eq!(message, "provider default/a is not ready yet");
    }

    #[tokio::test]
    async fn test_calc_new_provider_requeues_without_state() {
        let registry = ProviderRegistry::new();
        let p = provider("a", STATE_READY, &["example.com"], &[]);
        let selection = calc_new_provider(&[p], "www.example.com", None, &registry)
            .await
            .unwrap();
        assert!(matches!(
            selection,
            ProviderSelection::Requeue(d) if d == Duration::from_secs(3)
        ));
    }

    #[tokio::test]
    async fn test_calc_new_provider_without_zone_fails() {
        // status claims a domain the account has no zone for
        let p = provider("a", STATE_READY, &["example.org"], &[]);
        let registry = ProviderRegistry::new();
        registry.upsert(state_for(&p, &["example.com"]).await).await;

        let err = calc_new_provider(&[p], "www.example.org", None, &registry)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"no matching zone found for DNS name "www.example.org" in provider "default/a""#
        );
    }
}
