//! # Import Flows
//!
//! Complete runs against both deployment shapes.
//!
//! ## Monolith
//!
//! ```text
//! snapshot → filters → [begin → (reset) → batches → commit] → names → deferred
//! ```
//!
//! ## Region
//!
//! ```text
//! snapshot → filters → batches ──(control kinds)──→ loopback → control store
//!                         └─→ local replica
//!          → drain outbox → commit names → deferred tokens
//! ```

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::*;
    use relocation_import::{
        CollectingPrinter, ImportConfig, ImportingError, JournalEntry, NoopPrinter, OutboxError,
        SnapshotImportApi, StoreOperation, TransportError,
    };
    use relocation_telemetry::{encode_metrics, init_test_logging, register_metrics};
    use shared_types::{
        DeploymentMode, Filter, ImportFlags, ImportScope, KindName, Provenance, Record,
        RpcImportErrorKind,
    };
    use std::collections::BTreeSet;

    fn kind(name: &str) -> KindName {
        KindName::new(name)
    }

    fn names(values: &[&str]) -> Option<BTreeSet<String>> {
        Some(values.iter().map(|v| v.to_string()).collect())
    }

    fn users(n: i64) -> Vec<Record> {
        (1..=n).map(|pk| user(pk, &format!("u{pk}"))).collect()
    }

    /// Kinds of imported batches, consecutive duplicates collapsed.
    fn imported_kinds(harness: &Harness) -> Vec<String> {
        let mut kinds: Vec<String> = Vec::new();
        for entry in harness.journal.entries() {
            if let JournalEntry::Imported { kind, .. } = entry {
                if kinds.last().map(String::as_str) != Some(kind.as_str()) {
                    kinds.push(kind.as_str().to_string());
                }
            }
        }
        kinds
    }

    // =========================================================================
    // MONOLITH
    // =========================================================================

    #[tokio::test]
    async fn test_global_round_trip_rewrites_references() {
        init_test_logging();
        let harness = Harness::monolith(ImportConfig::for_testing());

        let report = harness
            .service
            .import_in_global_scope(&encode(&standard_records()), ImportFlags::default(), &NoopPrinter)
            .await
            .unwrap();

        for (name, expected) in [
            (USER, 2),
            (EMAIL, 2),
            (OPTION, 1),
            (ORGANIZATION, 2),
            (MEMBER, 2),
            (PROJECT, 2),
            (TOKEN, 2),
            (SETTING, 1),
        ] {
            assert_eq!(harness.rows(name).len(), expected, "{name}");
        }

        let pk_map = &report.pk_map;
        for row in harness.rows(MEMBER) {
            let org = row.int_field("organization").unwrap();
            let user = row.int_field("user").unwrap();
            assert!(pk_map.entries(&kind(ORGANIZATION)).any(|(_, e)| e.new_id == org));
            assert!(pk_map.entries(&kind(USER)).any(|(_, e)| e.new_id == user));
        }

        let ada = pk_map.get_new_id(&kind(USER), 10).unwrap();
        let acme = pk_map.get_new_id(&kind(ORGANIZATION), 1).unwrap();
        let ada_membership = harness
            .rows(MEMBER)
            .into_iter()
            .find(|m| m.int_field("user") == Some(ada))
            .unwrap();
        assert_eq!(ada_membership.int_field("organization"), Some(acme));

        assert_eq!(report.stats.deferred_replayed, 1);
        assert_eq!(report.stats.tenants_reconciled, 2);
        assert_eq!(report.stats.replicas_written, 0);
    }

    #[tokio::test]
    async fn test_batches_follow_dependency_order() {
        let harness = Harness::monolith(ImportConfig::for_testing());
        harness
            .service
            .import_in_global_scope(&encode(&standard_records()), ImportFlags::default(), &NoopPrinter)
            .await
            .unwrap();

        assert_eq!(
            imported_kinds(&harness),
            [USER, EMAIL, OPTION, ORGANIZATION, MEMBER, PROJECT, SETTING, TOKEN]
        );
    }

    #[tokio::test]
    async fn test_deferred_tokens_wait_for_names() {
        let harness = Harness::monolith(ImportConfig::for_testing());
        harness
            .service
            .import_in_global_scope(&encode(&standard_records()), ImportFlags::default(), &NoopPrinter)
            .await
            .unwrap();

        let committed = harness
            .journal
            .position(|e| matches!(e, JournalEntry::NamesCommitted(_)))
            .unwrap();
        let first_token = harness
            .journal
            .position(|e| matches!(e, JournalEntry::Imported { kind, .. } if kind.as_str() == TOKEN))
            .unwrap();
        let last_drain = harness
            .journal
            .entries()
            .iter()
            .rposition(|e| matches!(e, JournalEntry::Drained(_)))
            .unwrap();

        assert!(last_drain < committed);
        assert!(committed < first_token);
        // The deferred batch keeps its own source ordinal
        assert_eq!(harness.journal.imported(TOKEN), vec![1]);
    }

    #[tokio::test]
    async fn test_organization_filter_follows_membership() {
        let harness = Harness::monolith(ImportConfig::for_testing());
        let report = harness
            .service
            .import_in_organization_scope(
                &encode(&standard_records()),
                names(&["acme"]),
                ImportFlags::default(),
                &NoopPrinter,
            )
            .await
            .unwrap();

        let orgs = harness.rows(ORGANIZATION);
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].str_field("slug"), Some("acme"));

        let users = harness.rows(USER);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].str_field("username"), Some("ada"));

        let emails = harness.rows(EMAIL);
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].str_field("email"), Some("ada@example.com"));

        assert_eq!(harness.rows(MEMBER).len(), 1);
        assert_eq!(harness.rows(PROJECT).len(), 1);
        assert_eq!(harness.rows(TOKEN).len(), 1);
        // Config and global kinds are out of scope
        assert!(harness.rows(OPTION).is_empty());
        assert!(harness.rows(SETTING).is_empty());

        assert!(report.pk_map.get_new_id(&kind(USER), 20).is_none());
        assert!(report.stats.batches_skipped >= 2);
    }

    #[tokio::test]
    async fn test_user_filter_keeps_only_requested_users() {
        let harness = Harness::monolith(ImportConfig::for_testing());
        harness
            .service
            .import_in_user_scope(
                &encode(&standard_records()),
                names(&["bob"]),
                ImportFlags::default(),
                &NoopPrinter,
            )
            .await
            .unwrap();

        let users = harness.rows(USER);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].str_field("username"), Some("bob"));
        let emails = harness.rows(EMAIL);
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].str_field("email"), Some("bob@example.com"));
        assert!(harness.rows(ORGANIZATION).is_empty());
        assert!(harness.rows(TOKEN).is_empty());
    }

    #[tokio::test]
    async fn test_config_scope_overwrites_when_flagged() {
        let harness = Harness::monolith(ImportConfig::for_testing());
        harness.store.seed(
            Record::new(OPTION, 4)
                .with_field("key", "mail.from")
                .with_field("value", "old@example.com"),
        );
        let flags = ImportFlags {
            overwrite_configs: true,
            ..ImportFlags::default()
        };

        let report = harness
            .service
            .import_in_config_scope(&encode(&standard_records()), names(&["ada"]), flags, &NoopPrinter)
            .await
            .unwrap();

        assert_eq!(
            report.pk_map.get_provenance(&kind(OPTION), 1),
            Some(Provenance::Overwritten)
        );
        assert_eq!(
            harness.store.get(OPTION, 4).unwrap().str_field("value"),
            Some("root@example.com")
        );
        assert_eq!(harness.rows(USER).len(), 1);
        assert!(harness.rows(ORGANIZATION).is_empty());
    }

    #[tokio::test]
    async fn test_flags_reach_every_importer() {
        let harness = Harness::monolith(ImportConfig::for_testing());
        harness.store.seed(user(7, "ada"));
        let flags = ImportFlags {
            merge_users: true,
            hide_organizations: true,
            ..ImportFlags::default()
        };

        let report = harness
            .service
            .import_in_user_scope(&encode(&standard_records()), None, flags, &NoopPrinter)
            .await
            .unwrap();

        assert_eq!(report.pk_map.get_new_id(&kind(USER), 10), Some(7));
        assert_eq!(
            report.pk_map.get_provenance(&kind(USER), 10),
            Some(Provenance::Existing)
        );
        for name in [USER, EMAIL] {
            for request in harness.importer(name).requests() {
                assert!(request.flags.merge_users);
                assert!(request.flags.hide_organizations);
                assert_eq!(request.flags.import_uuid.as_deref(), Some(report.import_uuid.as_str()));
                assert_eq!(request.scope, ImportScope::User);
            }
        }
    }

    #[tokio::test]
    async fn test_batch_boundaries() {
        let harness = Harness::monolith(ImportConfig::for_testing());
        harness
            .service
            .import_in_user_scope(&encode(&users(4)), None, ImportFlags::default(), &NoopPrinter)
            .await
            .unwrap();
        assert_eq!(harness.journal.imported(USER), vec![1, 3]);

        let harness = Harness::monolith(ImportConfig::for_testing());
        harness
            .service
            .import_in_user_scope(&encode(&users(3)), None, ImportFlags::default(), &NoopPrinter)
            .await
            .unwrap();
        let requests = harness.importer(USER).requests();
        assert_eq!(harness.journal.imported(USER), vec![1, 3]);
        assert_eq!(requests[0].records.len(), 2);
        assert_eq!(requests[1].records.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_stops_run_and_rolls_back() {
        let harness = Harness::monolith(ImportConfig::for_testing());
        harness.importer(USER).fail_on(5);
        let printer = CollectingPrinter::new();

        let err = harness
            .service
            .import_in_user_scope(&encode(&users(10)), None, ImportFlags::default(), &printer)
            .await
            .unwrap_err();

        let rpc = err.rpc_error().unwrap();
        assert_eq!(rpc.kind, RpcImportErrorKind::IntegrityError);
        assert_eq!(rpc.on.ordinal, Some(5));

        // Batches after the failing one are never sent
        assert_eq!(harness.journal.imported(USER), vec![1, 3, 5]);
        let reports: Vec<_> = printer
            .errors()
            .into_iter()
            .filter(|line| line.starts_with("ImportingError"))
            .collect();
        assert_eq!(reports.len(), 1);

        assert!(harness.rows(USER).is_empty());
        assert_eq!(harness.store.operations().last(), Some(&StoreOperation::Rollback));
        assert!(harness.naming.commits().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_restores_previous_state() {
        let harness = Harness::monolith(ImportConfig::for_testing());
        harness.store.seed(organization(50, "legacy"));
        harness.importer(PROJECT).fail_on(1);

        let result = harness
            .service
            .import_in_global_scope(&encode(&standard_records()), ImportFlags::default(), &NoopPrinter)
            .await;

        assert!(matches!(result, Err(ImportingError::Importer(_))));
        let orgs = harness.rows(ORGANIZATION);
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].str_field("slug"), Some("legacy"));
        assert!(harness.rows(USER).is_empty());
        assert!(harness.journal.imported(TOKEN).is_empty());
    }

    #[tokio::test]
    async fn test_global_import_clears_in_reverse_order() {
        let harness = Harness::monolith(ImportConfig::for_testing());
        harness.store.seed(organization(50, "legacy"));
        harness.store.seed(Record::new(SETTING, 9).with_field("name", "stale"));

        harness
            .service
            .import_in_global_scope(&encode(&standard_records()), ImportFlags::default(), &NoopPrinter)
            .await
            .unwrap();

        let operations = harness.store.operations();
        let cleared: Vec<&str> = operations
            .iter()
            .filter_map(|op| match op {
                StoreOperation::Clear(kind) => Some(kind.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            cleared,
            [SETTING, TOKEN, PROJECT, MEMBER, ORGANIZATION, OPTION, EMAIL, USER]
        );
        assert!(!operations.contains(&StoreOperation::ResetSequence(kind(SETTING))));
        assert_eq!(operations.first(), Some(&StoreOperation::Begin));
        assert_eq!(operations.last(), Some(&StoreOperation::Commit));

        let orgs = harness.rows(ORGANIZATION);
        assert!(orgs.iter().all(|o| o.str_field("slug") != Some("legacy")));
        // Sequence restarted after the reset
        assert_eq!(orgs[0].pk, 1);
        assert_eq!(harness.rows(SETTING).len(), 1);
    }

    #[tokio::test]
    async fn test_reset_failure_aborts_before_import() {
        let harness = Harness::monolith(ImportConfig::for_testing());
        harness.store.fail_clear_of(PROJECT);
        let printer = CollectingPrinter::new();

        let err = harness
            .service
            .import_in_global_scope(&encode(&standard_records()), ImportFlags::default(), &printer)
            .await
            .unwrap_err();

        assert!(matches!(err, ImportingError::StoreReset(_)));
        assert!(printer.errors().iter().any(|line| line.contains("could not be reset")));
        assert!(harness.journal.imported(USER).is_empty());
        assert_eq!(harness.store.operations().last(), Some(&StoreOperation::Rollback));
    }

    #[tokio::test]
    async fn test_split_store_runs_without_transaction() {
        let config = ImportConfig {
            split_store: true,
            ..ImportConfig::for_testing()
        };
        let harness = Harness::monolith(config);
        harness.store.seed(organization(50, "legacy"));

        harness
            .service
            .import_in_global_scope(&encode(&standard_records()), ImportFlags::default(), &NoopPrinter)
            .await
            .unwrap();

        assert!(harness.store.operations().is_empty());
        assert_eq!(harness.rows(ORGANIZATION).len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_kinds_and_fields_dropped() {
        let harness = Harness::monolith(ImportConfig::for_testing());
        let mut records = standard_records();
        records.insert(4, Record::new("platform.widget", 1));
        records.insert(5, Record::new("platform.widget", 2));
        records[2] = user(10, "ada").with_field("legacy_flag", true);

        let report = harness
            .service
            .import_in_global_scope(&encode(&records), ImportFlags::default(), &NoopPrinter)
            .await
            .unwrap();

        assert_eq!(report.stats.records_dropped, 2);
        assert_eq!(report.stats.fields_dropped, 1);
        assert_eq!(harness.rows(USER).len(), 2);
        assert!(harness.rows(USER).iter().all(|u| u.field("legacy_flag").is_none()));
    }

    #[tokio::test]
    async fn test_control_deployment_refused() {
        let config = ImportConfig {
            deployment: DeploymentMode::Control,
            ..ImportConfig::for_testing()
        };
        let harness = Harness::monolith(config);

        let result = harness
            .service
            .import_in_global_scope(&encode(&standard_records()), ImportFlags::default(), &NoopPrinter)
            .await;

        assert!(matches!(result, Err(ImportingError::WrongDomain)));
        assert!(harness.journal.entries().is_empty());
    }

    #[tokio::test]
    async fn test_filter_misuse_touches_nothing() {
        let harness = Harness::monolith(ImportConfig::for_testing());

        let result = harness
            .service
            .import_snapshot(
                &encode(&standard_records()),
                ImportScope::Organization,
                Some(Filter::new(USER, "username", ["ada"])),
                ImportFlags::default(),
                &NoopPrinter,
            )
            .await;

        assert!(matches!(result, Err(ImportingError::FilterMisuse(_))));
        assert!(harness.store.operations().is_empty());
        assert!(harness.journal.entries().is_empty());
    }

    // =========================================================================
    // REGION
    // =========================================================================

    #[tokio::test]
    async fn test_region_routes_control_kinds_remotely() {
        let harness = Harness::region(ImportConfig::for_testing());
        let report = harness
            .service
            .import_in_global_scope(&encode(&standard_records()), ImportFlags::default(), &NoopPrinter)
            .await
            .unwrap();

        assert_eq!(harness.control_store.count(USER), 2);
        assert_eq!(harness.control_store.count(TOKEN), 2);
        assert_eq!(harness.store.count(USER), 0);
        assert_eq!(harness.store.count(ORGANIZATION), 2);

        // One replica per control-owned batch, kept on the regional side
        let replicas = harness.store.replicas();
        assert_eq!(replicas.len(), 4);
        assert!(harness.control_store.replicas().is_empty());
        assert_eq!(report.stats.replicas_written, 4);

        let user_replica = replicas.iter().find(|r| r.kind.as_str() == USER).unwrap();
        assert_eq!(user_replica.import_uuid, report.import_uuid);
        assert_eq!(user_replica.inserted_map.len(), 2);
        assert_eq!(user_replica.min_source_pk, 10);
        assert_eq!(user_replica.max_source_pk, 20);

        // No enclosing transaction across domains
        assert!(harness.store.operations().is_empty());
    }

    #[tokio::test]
    async fn test_region_replicas_idempotent_per_run() {
        let harness = Harness::region(ImportConfig::for_testing());
        let snapshot = encode(&standard_records());
        let flags = ImportFlags::default().with_import_uuid("6f1c2a");

        let first = harness
            .service
            .import_in_global_scope(&snapshot, flags.clone(), &NoopPrinter)
            .await
            .unwrap();
        let second = harness
            .service
            .import_in_global_scope(&snapshot, flags, &NoopPrinter)
            .await
            .unwrap();

        assert_eq!(first.stats.replicas_written, 4);
        assert_eq!(second.stats.replicas_written, 0);
        assert_eq!(harness.store.replicas().len(), 4);
        assert!(harness
            .store
            .replicas()
            .iter()
            .all(|r| r.import_uuid == "6f1c2a"));
    }

    #[tokio::test]
    async fn test_region_reconciles_names_after_draining() {
        let harness = Harness::region(ImportConfig::for_testing());
        harness.outbox.enqueue(1, 3);
        harness.outbox.fail_next(OutboxError::Flush("replica lag".into()));

        let report = harness
            .service
            .import_in_global_scope(&encode(&standard_records()), ImportFlags::default(), &NoopPrinter)
            .await
            .unwrap();

        let acme = report.pk_map.get_new_id(&kind(ORGANIZATION), 1).unwrap();
        let other = report.pk_map.get_new_id(&kind(ORGANIZATION), 2).unwrap();
        assert_eq!(harness.outbox.drain_calls(), vec![acme, acme, other]);
        assert_eq!(harness.outbox.pending_for(1), 0);

        let commits = harness.naming.commits();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].get(&acme).map(String::as_str), Some("acme"));
        assert_eq!(commits[0].get(&other).map(String::as_str), Some("other"));
        assert_eq!(report.stats.tenants_reconciled, 2);
    }

    #[tokio::test]
    async fn test_region_renamed_tenant_committed_under_new_name() {
        let harness = Harness::region(ImportConfig::for_testing());
        harness.store.seed(organization(30, "acme"));

        let report = harness
            .service
            .import_in_organization_scope(
                &encode(&standard_records()),
                names(&["acme"]),
                ImportFlags::default(),
                &NoopPrinter,
            )
            .await
            .unwrap();

        let acme = report.pk_map.get_new_id(&kind(ORGANIZATION), 1).unwrap();
        assert_eq!(acme, 31);
        assert_eq!(
            harness.naming.commits()[0].get(&acme).map(String::as_str),
            Some("acme-1")
        );
    }

    #[tokio::test]
    async fn test_region_drain_exhaustion_holds_back_tokens() {
        let harness = Harness::region(ImportConfig::for_testing());
        for _ in 0..3 {
            harness.outbox.fail_next(OutboxError::Database("deadlock".into()));
        }

        let err = harness
            .service
            .import_in_global_scope(&encode(&standard_records()), ImportFlags::default(), &NoopPrinter)
            .await
            .unwrap_err();

        assert!(matches!(err, ImportingError::OutboxDrain { attempts: 3, .. }));
        assert!(harness.naming.commits().is_empty());
        assert_eq!(harness.control_store.count(TOKEN), 0);
    }

    #[tokio::test]
    async fn test_region_failure_keeps_committed_kinds() {
        let harness = Harness::region(ImportConfig::for_testing());
        harness.importer(PROJECT).fail_on(2);

        let result = harness
            .service
            .import_in_global_scope(&encode(&standard_records()), ImportFlags::default(), &NoopPrinter)
            .await;

        assert!(matches!(result, Err(ImportingError::Importer(_))));
        assert_eq!(harness.control_store.count(USER), 2);
        assert_eq!(harness.store.count(ORGANIZATION), 2);
        assert!(harness.outbox.drain_calls().is_empty());
        assert!(harness.naming.commits().is_empty());
    }

    #[tokio::test]
    async fn test_region_transport_failure_reported() {
        let harness = Harness::region(ImportConfig::for_testing());
        if let Some(transport) = &harness.transport {
            transport.fail_next(TransportError::Unavailable("connection reset".into()));
        }
        let printer = CollectingPrinter::new();

        let err = harness
            .service
            .import_in_global_scope(&encode(&standard_records()), ImportFlags::default(), &printer)
            .await
            .unwrap_err();

        let rpc = err.rpc_error().unwrap();
        assert_eq!(rpc.kind, RpcImportErrorKind::Transport);
        assert_eq!(rpc.on.model.as_str(), USER);
        assert_eq!(printer.errors().len(), 1);
        assert_eq!(harness.control_store.count(USER), 0);
    }

    #[tokio::test]
    async fn test_run_shows_up_in_metrics() {
        let _ = register_metrics();
        let harness = Harness::region(ImportConfig::for_testing());
        harness
            .service
            .import_in_global_scope(&encode(&standard_records()), ImportFlags::default(), &NoopPrinter)
            .await
            .unwrap();

        let text = encode_metrics().unwrap();
        assert!(text.contains("relocation_import_batches_total"));
        assert!(text.contains("relocation_control_replicas_total"));
        assert!(text.contains("relocation_naming_commits_total"));
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(24))]

            #[test]
            fn every_record_mapped_once(count in 1i64..40, batch in 1usize..8) {
                let runtime = tokio::runtime::Runtime::new().unwrap();
                let config = ImportConfig { max_batch_size: batch, ..ImportConfig::for_testing() };
                let harness = Harness::monolith(config);

                let report = runtime
                    .block_on(harness.service.import_in_user_scope(
                        &encode(&users(count)),
                        None,
                        ImportFlags::default(),
                        &NoopPrinter,
                    ))
                    .unwrap();

                let expected_batches = (count as usize).div_ceil(batch);
                prop_assert_eq!(report.pk_map.len_for(&kind(USER)), count as usize);
                prop_assert_eq!(report.stats.batches_dispatched, expected_batches);

                let ordinals = harness.journal.imported(USER);
                prop_assert_eq!(ordinals.len(), expected_batches);
                prop_assert!(ordinals.windows(2).all(|w| w[1] - w[0] == batch as u64));
            }
        }
    }
}
