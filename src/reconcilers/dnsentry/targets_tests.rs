// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the targets producer.

#[cfg(test)]
mod tests {
    use super::super::targets::*;
    use crate::crd::{DNSEntrySpec, DNSEntryStatus, EntryReference, ObjectKey};
    use crate::dns::{IpStack, RecordType, Target};
    use crate::dns_errors::{LookupError, TargetsError};
    use crate::lookup::processor::{EntryTrigger, LookupProcessor};
    use crate::lookup::{HostLookup, HostResolver};
    use crate::metrics::PrometheusLookupMetrics;
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashMap};
    use std::net::IpAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct StaticLookup {
        hosts: HashMap<String, Vec<IpAddr>>,
        fail_with_timeout: bool,
    }

    #[async_trait]
    impl HostLookup for StaticLookup {
        async fn lookup_ip(&self, hostname: &str) -> Result<Vec<IpAddr>, LookupError> {
            if self.fail_with_timeout {
                return Err(LookupError::Timeout {
                    hostname: hostname.to_string(),
                });
            }
            self.hosts
                .get(hostname)
                .cloned()
                .ok_or_else(|| LookupError::NotFound {
                    hostname: hostname.to_string(),
                })
        }
    }

    struct NoopTrigger;

    #[async_trait]
    impl EntryTrigger for NoopTrigger {
        async fn trigger_reconciliation(&self, _key: &ObjectKey) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn processor(hosts: &[(&str, &[&str])], fail_with_timeout: bool) -> Arc<LookupProcessor> {
        let hosts = hosts
            .iter()
            .map(|(host, ips)| {
                (
                    (*host).to_string(),
                    ips.iter().map(|ip| ip.parse().unwrap()).collect(),
                )
            })
            .collect();
        let resolver = HostResolver::new(Arc::new(StaticLookup {
            hosts,
            fail_with_timeout,
        }))
        .with_retries(1, Duration::ZERO);
        Arc::new(LookupProcessor::new(
            resolver,
            Arc::new(NoopTrigger),
            Arc::new(PrometheusLookupMetrics),
            2,
            Duration::from_secs(60),
        ))
    }

    fn producer(processor: &Arc<LookupProcessor>) -> TargetsProducer {
        TargetsProducer::new(300, 600, Arc::clone(processor), CancellationToken::new())
    }

    fn key() -> ObjectKey {
        ObjectKey::new("default", "www")
    }

    fn spec(targets: &[&str], text: &[&str]) -> DNSEntrySpec {
        DNSEntrySpec {
            dns_name: "www.example.com".to_string(),
            targets: targets.iter().map(ToString::to_string).collect(),
            text: text.iter().map(ToString::to_string).collect(),
            ..Default::default()
        }
    }

    async fn produce(spec: &DNSEntrySpec) -> Result<TargetsResult, TargetsError> {
        let processor = processor(&[], false);
        producer(&processor)
            .from_spec(&key(), spec, IpStack::default())
            .await
    }

    #[tokio::test]
    async fn test_address_targets_use_default_ttl() {
        let result = produce(&spec(&["10.0.0.1", "fd00::1"], &[])).await.unwrap();
        assert_eq!(result.targets.len(), 2);
        assert_eq!(result.targets[0].record_type, RecordType::A);
        assert_eq!(result.targets[1].record_type, RecordType::Aaaa);
        assert!(result.targets.iter().all(|t| t.ttl == 300));
        assert!(!result.has_warnings());
    }

    #[tokio::test]
    async fn test_spec_ttl_overrides_default() {
        let mut spec = spec(&["10.0.0.1"], &[]);
        spec.ttl = Some(120);
        let result = produce(&spec).await.unwrap();
        assert_eq!(result.targets[0].ttl, 120);
    }

    #[tokio::test]
    async fn test_duplicate_targets_give_warning() {
        let result = produce(&spec(&["10.0.0.1", "10.0.0.1"], &[])).await.unwrap();
        assert_eq!(result.targets.len(), 1);
        assert_eq!(
            result.warnings,
            vec![r#"dns Entry "default/www" has duplicate target "10.0.0.1""#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_empty_text_gives_warning() {
        let result = produce(&spec(&[], &["hello", ""])).await.unwrap();
        assert_eq!(result.targets, vec![Target::text("hello", 300)]);
        assert_eq!(
            result.warnings,
            vec![r#"dns Entry "default/www" has empty text"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let mut with_reference = spec(&["10.0.0.1"], &[]);
        with_reference.reference = Some(EntryReference::default());
        let mut zero_ttl = spec(&["10.0.0.1"], &[]);
        zero_ttl.ttl = Some(0);
        let mut bad_name = spec(&["10.0.0.1"], &[]);
        bad_name.dns_name = "bad..name".to_string();

        let cases = [
            (with_reference, TargetsError::ReferenceNotSupported),
            (spec(&["10.0.0.1"], &["text"]), TargetsError::TargetsAndText),
            (zero_ttl, TargetsError::InvalidTtl),
            (spec(&["10.0.0.1", " "], &[]), TargetsError::EmptyTarget(2)),
            (spec(&[], &["", ""]), TargetsError::OnlyEmptyText),
            (spec(&[], &[]), TargetsError::NoTargets),
            (
                spec(&["10.0.0.1", "lb.example.org"], &[]),
                TargetsError::MixedRecordTypes,
            ),
        ];
        for (spec, expected) in cases {
            let err = produce(&spec).await.unwrap_err();
            assert_eq!(err, expected);
            assert!(err.is_validation_error());
        }

        let err = produce(&bad_name).await.unwrap_err();
        assert!(matches!(err, TargetsError::InvalidDomainName(_)));
    }

    #[tokio::test]
    async fn test_too_many_cname_targets() {
        let hosts: Vec<String> = (0..26).map(|i| format!("lb{i}.example.org")).collect();
        let hosts: Vec<&str> = hosts.iter().map(String::as_str).collect();
        let err = produce(&spec(&hosts, &[])).await.unwrap_err();
        assert_eq!(
            err,
            TargetsError::TooManyCnameTargets { count: 26, max: 25 }
        );
    }

    #[tokio::test]
    async fn test_single_cname_is_kept() {
        let processor = processor(&[], false);
        let result = producer(&processor)
            .from_spec(&key(), &spec(&["lb.example.org"], &[]), IpStack::default())
            .await
            .unwrap();
        assert_eq!(result.targets.len(), 1);
        assert_eq!(result.targets[0].record_type, RecordType::Cname);
        assert!(!processor.has_job(&key()));
    }

    #[tokio::test]
    async fn test_multiple_cnames_are_resolved() {
        let processor = processor(
            &[
                ("a.example.org", &["10.0.0.2", "fd00::2"]),
                ("b.example.org", &["10.0.0.1", "10.0.0.2"]),
            ],
            false,
        );
        let result = producer(&processor)
            .from_spec(
                &key(),
                &spec(&["a.example.org", "b.example.org"], &[]),
                IpStack::default(),
            )
            .await
            .unwrap();

        let values: Vec<(RecordType, &str)> = result
            .targets
            .iter()
            .map(|t| (t.record_type, t.value.as_str()))
            .collect();
        assert_eq!(
            values,
            vec![
                (RecordType::A, "10.0.0.1"),
                (RecordType::A, "10.0.0.2"),
                (RecordType::Aaaa, "fd00::2"),
            ]
        );
        assert!(processor.has_job(&key()));
    }

    #[tokio::test]
    async fn test_resolve_single_cname_on_request() {
        let processor = processor(&[("lb.example.org", &["10.0.0.9"])], false);
        let mut spec = spec(&["lb.example.org"], &[]);
        spec.resolve_targets_to_addresses = Some(true);
        let result = producer(&processor)
            .from_spec(&key(), &spec, IpStack::default())
            .await
            .unwrap();
        assert_eq!(result.targets, vec![Target::new(RecordType::A, "10.0.0.9", 300)]);
    }

    #[tokio::test]
    async fn test_unknown_hosts_are_skipped() {
        let processor = processor(&[("a.example.org", &["10.0.0.1"])], false);
        let result = producer(&processor)
            .from_spec(
                &key(),
                &spec(&["a.example.org", "missing.example.org"], &[]),
                IpStack::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.targets, vec![Target::new(RecordType::A, "10.0.0.1", 300)]);
    }

    #[tokio::test]
    async fn test_lookup_timeout_fails() {
        let processor = processor(&[], true);
        let err = producer(&processor)
            .from_spec(
                &key(),
                &spec(&["a.example.org", "b.example.org"], &[]),
                IpStack::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TargetsError::LookupFailed(_)));
        assert!(!err.is_validation_error());
        // the job is kept so the lookup is retried in the background
        assert!(processor.has_job(&key()));
    }

    #[tokio::test]
    async fn test_lookup_job_removed_when_no_longer_needed() {
        let processor = processor(
            &[("a.example.org", &["10.0.0.1"]), ("b.example.org", &["10.0.0.2"])],
            false,
        );
        let producer = producer(&processor);
        producer
            .from_spec(
                &key(),
                &spec(&["a.example.org", "b.example.org"], &[]),
                IpStack::default(),
            )
            .await
            .unwrap();
        assert!(processor.has_job(&key()));

        producer
            .from_spec(&key(), &spec(&["10.0.0.3"], &[]), IpStack::default())
            .await
            .unwrap();
        assert!(!processor.has_job(&key()));
    }

    #[test]
    fn test_lookup_interval() {
        assert_eq!(lookup_interval(None, 600, 300), 600);
        assert_eq!(lookup_interval(Some(0), 600, 300), 600);
        assert_eq!(lookup_interval(Some(10), 600, 0), 30);
        assert_eq!(lookup_interval(Some(60), 600, 300), 100);
        assert_eq!(lookup_interval(Some(200), 600, 300), 200);
    }

    #[test]
    fn test_spec_record_types_without_lookup() {
        let spec = |targets: &[&str], text: &[&str], resolve: Option<bool>| DNSEntrySpec {
            dns_name: "www.example.com".into(),
            targets: targets.iter().map(ToString::to_string).collect(),
            text: text.iter().map(ToString::to_string).collect(),
            resolve_targets_to_addresses: resolve,
            ..Default::default()
        };

        assert_eq!(
            spec_record_types(&spec(&["1.2.3.4", "::1"], &[], None)),
            BTreeSet::from([RecordType::A, RecordType::Aaaa])
        );
        assert_eq!(
            spec_record_types(&spec(&["lb.example.net"], &[], None)),
            BTreeSet::from([RecordType::Cname])
        );
        assert_eq!(
            spec_record_types(&spec(&["lb.example.net"], &[], Some(true))),
            BTreeSet::from([RecordType::A, RecordType::Aaaa])
        );
        assert_eq!(
            spec_record_types(&spec(&["a.example.net", "b.example.net"], &[], None)),
            BTreeSet::from([RecordType::A, RecordType::Aaaa])
        );
        assert_eq!(
            spec_record_types(&spec(&[], &["hello", ""], None)),
            BTreeSet::from([RecordType::Txt])
        );
        assert!(spec_record_types(&spec(&[" "], &[""], None)).is_empty());
    }

    #[test]
    fn test_status_to_targets() {
        let status = DNSEntryStatus {
            zone: Some("example.com".to_string()),
            ttl: Some(120),
            targets: vec![
                "10.0.0.1".to_string(),
                "\"some text\"".to_string(),
                "lb.example.org".to_string(),
            ],
            ..Default::default()
        };
        let targets = status_to_targets(&status, IpStack::default()).unwrap();
        assert_eq!(
            targets,
            vec![
                Target::new(RecordType::A, "10.0.0.1", 120),
                Target::text("some text", 120),
                Target::new(RecordType::Cname, "lb.example.org", 120),
            ]
        );
    }

    #[test]
    fn test_status_without_zone_has_no_targets() {
        let status = DNSEntryStatus {
            targets: vec!["10.0.0.1".to_string()],
            ..Default::default()
        };
        assert!(status_to_targets(&status, IpStack::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_targets_to_strings_quotes_text() {
        let targets = vec![
            Target::text("hello", 60),
            Target::text("hello", 60),
            Target::new(RecordType::A, "10.0.0.1", 60),
        ];
        assert_eq!(
            targets_to_strings(&targets),
            vec![
                "\"hello\"".to_string(),
                "\"hello\"".to_string(),
                "10.0.0.1".to_string(),
            ]
        );
    }
}
