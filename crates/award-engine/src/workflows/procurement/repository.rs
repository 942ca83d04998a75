use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ProcurementConfig;

use super::domain::{RequisitionAggregate, RequisitionId, RoleName, UserId, VendorId};
use super::transition::Action;

/// Identifier attached to every committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

/// Audit trail entry; exactly one is written per transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub transaction_id: TransactionId,
    pub actor_id: UserId,
    pub action: Action,
    pub entity_id: RequisitionId,
    pub details: String,
    pub recorded_at: DateTime<Utc>,
}

/// Next aggregate state plus its audit record, persisted together or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionCommit {
    pub aggregate: RequisitionAggregate,
    pub expected_version: u64,
    pub audit: AuditRecord,
}

/// Storage abstraction for requisition aggregates.
pub trait RequisitionStore: Send + Sync {
    fn load(&self, id: &RequisitionId) -> Result<Option<RequisitionAggregate>, RepositoryError>;
    /// Store a brand new requisition; fails with `AlreadyExists` if the id is taken.
    fn insert(&self, aggregate: RequisitionAggregate) -> Result<(), RepositoryError>;
    /// Persist atomically, failing with `Conflict` when the stored version moved on.
    fn commit(&self, commit: TransitionCommit) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("requisition changed concurrently (expected version {expected}, found {found})")]
    Conflict { expected: u64, found: u64 },
    #[error("record not found")]
    NotFound,
    #[error("requisition {0} already exists")]
    AlreadyExists(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Organizational lookups backed by the identity system.
pub trait Directory: Send + Sync {
    fn role_holders(&self, role: &RoleName) -> Result<Vec<UserId>, DirectoryError>;
    fn user_roles(&self, user: &UserId) -> Result<Vec<RoleName>, DirectoryError>;
    fn department_head(&self, department: &str) -> Result<Option<UserId>, DirectoryError>;
    fn vendor_for_user(&self, user: &UserId) -> Result<Option<VendorId>, DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Source of the ordered post-bid review roles.
pub trait ReviewChainSource: Send + Sync {
    fn review_chain(&self) -> Result<Vec<RoleName>, DirectoryError>;
}

/// Review chain fixed at startup from configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredReviewChain {
    roles: Vec<RoleName>,
}

impl ConfiguredReviewChain {
    pub fn new(roles: Vec<RoleName>) -> Self {
        Self { roles }
    }

    pub fn from_config(config: &ProcurementConfig) -> Self {
        Self::new(config.review_chain.iter().map(RoleName::new).collect())
    }
}

impl ReviewChainSource for ConfiguredReviewChain {
    fn review_chain(&self) -> Result<Vec<RoleName>, DirectoryError> {
        Ok(self.roles.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    User(UserId),
    Vendor(VendorId),
}

/// Who should hear about a transition; dispatch happens outside the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub recipients: Vec<Recipient>,
    pub template: String,
    pub data: BTreeMap<String, String>,
}

impl NotificationIntent {
    pub fn new(template: &str, recipients: Vec<Recipient>) -> Self {
        Self {
            recipients,
            template: template.to_string(),
            data: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

/// Outbound notification hook (e-mail or chat adapters).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: NotificationIntent) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
