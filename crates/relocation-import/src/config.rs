//! # Import Configuration
//!
//! Configuration for the snapshot import service.

use serde::{Deserialize, Serialize};
use shared_types::{DeploymentMode, KindName};
use std::env;

use crate::domain::ImportingError;

/// Records per importer call.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 20;

/// Attempts made to drain one tenant's outbox shard.
pub const DEFAULT_MAX_SHARD_DRAIN_ATTEMPTS: u32 = 3;

/// Kinds the engine treats specially.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellKnownKinds {
    /// Target of username filters.
    pub user: KindName,
    /// Target of slug filters, and the kind whose names are reconciled.
    pub organization: KindName,
    /// Links users to organizations.
    pub organization_member: KindName,
    /// Contact addresses, filtered by address rather than user id.
    pub email: KindName,
    /// Kind held back until naming reconciliation completes.
    pub deferred: KindName,
}

impl Default for WellKnownKinds {
    fn default() -> Self {
        Self {
            user: KindName::new("platform.user"),
            organization: KindName::new("platform.organization"),
            organization_member: KindName::new("platform.organizationmember"),
            email: KindName::new("platform.email"),
            deferred: KindName::new("platform.orgauthtoken"),
        }
    }
}

/// Import service configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Maximum records per batch.
    pub max_batch_size: usize,

    /// Attempts per tenant when draining outbox shards.
    pub max_shard_drain_attempts: u32,

    /// Where this process runs.
    pub deployment: DeploymentMode,

    /// Whether a monolith spreads its kinds over several stores. A split
    /// store cannot host one enclosing transaction.
    pub split_store: bool,

    /// Specially treated kinds.
    pub well_known: WellKnownKinds,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_shard_drain_attempts: DEFAULT_MAX_SHARD_DRAIN_ATTEMPTS,
            deployment: DeploymentMode::Monolith,
            split_store: false,
            well_known: WellKnownKinds::default(),
        }
    }
}

impl ImportConfig {
    /// Create a config for testing (small batches).
    pub fn for_testing() -> Self {
        Self {
            max_batch_size: 2,
            ..Self::default()
        }
    }

    /// Same config running as a regional deployment.
    pub fn in_region(mut self) -> Self {
        self.deployment = DeploymentMode::Region;
        self
    }

    /// Read overrides from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RELOCATION_MAX_BATCH_SIZE`: Records per batch (default: 20)
    /// - `RELOCATION_MAX_SHARD_DRAIN_ATTEMPTS`: Drain attempts (default: 3)
    /// - `RELOCATION_DEPLOYMENT`: monolith, region or control (default: monolith)
    /// - `RELOCATION_SPLIT_STORE`: Monolith spread over several stores (default: false)
    pub fn from_env() -> Result<Self, ImportingError> {
        let mut config = Self::default();

        if let Ok(value) = env::var("RELOCATION_MAX_BATCH_SIZE") {
            config.max_batch_size = value.parse().map_err(|_| {
                ImportingError::InvalidConfig(format!("RELOCATION_MAX_BATCH_SIZE={value}"))
            })?;
        }
        if let Ok(value) = env::var("RELOCATION_MAX_SHARD_DRAIN_ATTEMPTS") {
            config.max_shard_drain_attempts = value.parse().map_err(|_| {
                ImportingError::InvalidConfig(format!("RELOCATION_MAX_SHARD_DRAIN_ATTEMPTS={value}"))
            })?;
        }
        if let Ok(value) = env::var("RELOCATION_DEPLOYMENT") {
            config.deployment = value.parse().map_err(ImportingError::InvalidConfig)?;
        }
        if let Ok(value) = env::var("RELOCATION_SPLIT_STORE") {
            config.split_store = matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ImportingError> {
        if self.max_batch_size == 0 {
            return Err(ImportingError::InvalidConfig(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_shard_drain_attempts == 0 {
            return Err(ImportingError::InvalidConfig(
                "max_shard_drain_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the main pass runs inside one store transaction.
    pub fn single_transaction(&self) -> bool {
        self.deployment == DeploymentMode::Monolith && !self.split_store
    }
}
