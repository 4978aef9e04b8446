//! # Integration Fixtures
//!
//! A small platform schema, a matching snapshot and two deployment
//! harnesses: a monolith with one store, and a region that reaches
//! control-owned kinds through a loopback transport.

use relocation_import::{
    CollisionPolicy, DependencyGraph, ImportConfig, ImporterRegistry, InMemoryRegionOutbox,
    InMemoryStore, Journal, KindDescriptor, LoopbackTransport, RecordingNamingService,
    RemoteImporter, SnapshotImportService, TableImporter,
};
use shared_types::{Domain, Record, RelocationScope};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const USER: &str = "platform.user";
pub const EMAIL: &str = "platform.email";
pub const OPTION: &str = "platform.option";
pub const ORGANIZATION: &str = "platform.organization";
pub const MEMBER: &str = "platform.organizationmember";
pub const PROJECT: &str = "platform.project";
pub const TOKEN: &str = "platform.orgauthtoken";
pub const SETTING: &str = "platform.globalsetting";

/// Kinds in dependency order.
pub fn descriptors() -> Vec<KindDescriptor> {
    vec![
        KindDescriptor::new(USER, RelocationScope::User)
            .owned_by([Domain::Control])
            .known_fields(["username", "email", "is_active"]),
        KindDescriptor::new(EMAIL, RelocationScope::User)
            .owned_by([Domain::Control])
            .foreign_key("user", USER),
        KindDescriptor::new(OPTION, RelocationScope::Config).owned_by([Domain::Control]),
        KindDescriptor::new(ORGANIZATION, RelocationScope::Organization),
        KindDescriptor::new(MEMBER, RelocationScope::Organization)
            .foreign_key("organization", ORGANIZATION)
            .foreign_key("user", USER),
        KindDescriptor::new(PROJECT, RelocationScope::Organization)
            .foreign_key("organization", ORGANIZATION),
        KindDescriptor::new(TOKEN, RelocationScope::Organization)
            .owned_by([Domain::Control])
            .foreign_key("organization", ORGANIZATION),
        KindDescriptor::new(SETTING, RelocationScope::Global).without_sequence(),
    ]
}

fn natural_key(kind: &str) -> Option<(&'static str, CollisionPolicy)> {
    match kind {
        USER => Some(("username", CollisionPolicy::MergeWhenFlagged)),
        OPTION => Some(("key", CollisionPolicy::OverwriteWhenFlagged)),
        ORGANIZATION => Some(("slug", CollisionPolicy::Rename)),
        _ => None,
    }
}

pub fn user(pk: i64, username: &str) -> Record {
    Record::new(USER, pk)
        .with_field("username", username)
        .with_field("email", format!("{username}@example.com"))
        .with_field("is_active", true)
}

pub fn email(pk: i64, user: i64, address: &str) -> Record {
    Record::new(EMAIL, pk)
        .with_field("user", user)
        .with_field("email", address)
}

pub fn organization(pk: i64, slug: &str) -> Record {
    Record::new(ORGANIZATION, pk).with_field("slug", slug)
}

pub fn member(pk: i64, organization: i64, user: i64) -> Record {
    Record::new(MEMBER, pk)
        .with_field("organization", organization)
        .with_field("user", user)
}

pub fn project(pk: i64, organization: i64, slug: &str) -> Record {
    Record::new(PROJECT, pk)
        .with_field("organization", organization)
        .with_field("slug", slug)
}

pub fn token(pk: i64, organization: i64) -> Record {
    Record::new(TOKEN, pk).with_field("organization", organization)
}

/// Two organizations (`acme` with ada, `other` with bob) and their data.
/// Tokens come first to exercise deferral.
pub fn standard_records() -> Vec<Record> {
    vec![
        token(1, 1),
        token(2, 2),
        user(10, "ada"),
        user(20, "bob"),
        email(1, 10, "ada@example.com"),
        email(2, 20, "bob@example.com"),
        Record::new(OPTION, 1)
            .with_field("key", "mail.from")
            .with_field("value", "root@example.com"),
        organization(1, "acme"),
        organization(2, "other"),
        member(100, 1, 10),
        member(101, 2, 20),
        project(1, 1, "web"),
        project(2, 2, "api"),
        Record::new(SETTING, 1).with_field("name", "beacon"),
    ]
}

pub fn encode(records: &[Record]) -> Vec<u8> {
    serde_json::to_vec(records).expect("records serialize")
}

/// Services and collaborators of one deployment.
pub struct Harness {
    pub journal: Arc<Journal>,
    /// Store of the domain running the import.
    pub store: Arc<InMemoryStore>,
    /// Store of the control domain. Same as `store` in a monolith.
    pub control_store: Arc<InMemoryStore>,
    pub outbox: Arc<InMemoryRegionOutbox>,
    pub naming: Arc<RecordingNamingService>,
    pub transport: Option<Arc<LoopbackTransport>>,
    pub importers: BTreeMap<&'static str, Arc<TableImporter>>,
    pub service: SnapshotImportService,
}

impl Harness {
    /// Everything in one process and one store.
    pub fn monolith(config: ImportConfig) -> Self {
        let store = InMemoryStore::shared();
        Self::build(config, store.clone(), store, false)
    }

    /// A regional deployment with a separate control domain.
    pub fn region(config: ImportConfig) -> Self {
        Self::build(
            config.in_region(),
            InMemoryStore::shared(),
            InMemoryStore::shared(),
            true,
        )
    }

    fn build(
        config: ImportConfig,
        store: Arc<InMemoryStore>,
        control_store: Arc<InMemoryStore>,
        remote_control: bool,
    ) -> Self {
        let journal = Journal::shared();
        let outbox = Arc::new(InMemoryRegionOutbox::new().with_journal(journal.clone()));
        let naming = Arc::new(RecordingNamingService::new().with_journal(journal.clone()));

        let kinds = descriptors();
        let names: Vec<&'static str> =
            vec![USER, EMAIL, OPTION, ORGANIZATION, MEMBER, PROJECT, TOKEN, SETTING];

        let mut importers = BTreeMap::new();
        let mut local = ImporterRegistry::new();
        let mut control = ImporterRegistry::new();

        for (name, descriptor) in names.into_iter().zip(kinds.iter().cloned()) {
            let remote = remote_control && descriptor.is_control_owned();
            let target = if remote { &control_store } else { &store };
            let serving = if remote { Domain::Control } else { Domain::Region };

            let mut importer = TableImporter::new(target.clone(), descriptor.clone())
                .with_journal(journal.clone());
            if remote_control {
                importer = importer.serving(serving);
            }
            if let Some((field, policy)) = natural_key(name) {
                importer = importer.natural_key(field, policy);
            }
            let importer = Arc::new(importer);
            importers.insert(name, importer.clone());

            if remote {
                control.register(name, importer);
            } else {
                local.register(name, importer);
            }
        }

        let transport = if remote_control {
            let transport = Arc::new(LoopbackTransport::new(control));
            for descriptor in kinds.iter().filter(|d| d.is_control_owned()) {
                local.register(
                    descriptor.kind.clone(),
                    Arc::new(RemoteImporter::new(transport.clone())),
                );
            }
            Some(transport)
        } else {
            None
        };

        let graph = DependencyGraph::from_ordered(kinds).expect("fixture graph is ordered");
        let service = SnapshotImportService::new(
            config,
            Arc::new(graph),
            local,
            store.clone(),
            outbox.clone(),
            naming.clone(),
        );

        Self {
            journal,
            store,
            control_store,
            outbox,
            naming,
            transport,
            importers,
            service,
        }
    }

    /// Importer serving `kind`, wherever it runs.
    pub fn importer(&self, kind: &str) -> &Arc<TableImporter> {
        &self.importers[kind]
    }

    /// Rows of `kind` in the store owning it.
    pub fn rows(&self, kind: &str) -> Vec<Record> {
        let owner = descriptors()
            .into_iter()
            .find(|d| d.kind.as_str() == kind)
            .map_or(false, |d| d.is_control_owned());
        if owner && self.transport.is_some() {
            self.control_store.rows(kind)
        } else {
            self.store.rows(kind)
        }
    }
}
