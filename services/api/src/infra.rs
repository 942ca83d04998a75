use award_engine::error::AppError;
use award_engine::workflows::procurement::{
    AuditRecord, AwardStrategy, Clock, Directory, DirectoryError, NotificationError,
    NotificationIntent, NotificationPublisher, ProcurementService, RepositoryError,
    RequisitionAggregate, RequisitionId, RequisitionStore, RoleName, TransitionCommit, UserId,
    VendorId,
};
use chrono::{DateTime, Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

pub(crate) type ApiService =
    ProcurementService<InMemoryRequisitionStore, StaticDirectory, InMemoryNotificationPublisher>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryRequisitionStore {
    records: Arc<Mutex<HashMap<RequisitionId, RequisitionAggregate>>>,
    audit: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryRequisitionStore {
    pub(crate) fn audit_log(&self) -> Vec<AuditRecord> {
        self.audit.lock().expect("audit mutex poisoned").clone()
    }
}

impl RequisitionStore for InMemoryRequisitionStore {
    fn load(&self, id: &RequisitionId) -> Result<Option<RequisitionAggregate>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn insert(&self, aggregate: RequisitionAggregate) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let id = aggregate.requisition.id.clone();
        if guard.contains_key(&id) {
            return Err(RepositoryError::AlreadyExists(id.0));
        }
        guard.insert(id, aggregate);
        Ok(())
    }

    fn commit(&self, commit: TransitionCommit) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let id = commit.aggregate.requisition.id.clone();
        let found = guard
            .get(&id)
            .map(|stored| stored.requisition.version)
            .ok_or(RepositoryError::NotFound)?;
        if found != commit.expected_version {
            return Err(RepositoryError::Conflict {
                expected: commit.expected_version,
                found,
            });
        }

        // Audit lock is taken while the record lock is held so both land together.
        let mut audit = self.audit.lock().expect("audit mutex poisoned");
        guard.insert(id, commit.aggregate);
        audit.push(commit.audit);
        Ok(())
    }
}

/// Directory snapshot as loaded from JSON.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct DirectorySnapshot {
    #[serde(default)]
    pub(crate) roles: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub(crate) department_heads: BTreeMap<String, String>,
    #[serde(default)]
    pub(crate) vendor_contacts: BTreeMap<String, String>,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct StaticDirectory {
    roles: BTreeMap<RoleName, Vec<UserId>>,
    department_heads: BTreeMap<String, UserId>,
    vendor_contacts: BTreeMap<UserId, VendorId>,
}

impl StaticDirectory {
    pub(crate) fn from_path(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        let snapshot: DirectorySnapshot = serde_json::from_str(&raw)?;
        Ok(Self::from(snapshot))
    }

    pub(crate) fn with_role(mut self, role: &str, users: &[&str]) -> Self {
        self.roles.insert(
            RoleName::new(role),
            users.iter().map(|user| UserId(user.to_string())).collect(),
        );
        self
    }

    pub(crate) fn with_department_head(mut self, department: &str, user: &str) -> Self {
        self.department_heads
            .insert(department.to_string(), UserId(user.to_string()));
        self
    }

    pub(crate) fn with_vendor_contact(mut self, user: &str, vendor: &str) -> Self {
        self.vendor_contacts
            .insert(UserId(user.to_string()), VendorId(vendor.to_string()));
        self
    }
}

impl From<DirectorySnapshot> for StaticDirectory {
    fn from(snapshot: DirectorySnapshot) -> Self {
        Self {
            roles: snapshot
                .roles
                .into_iter()
                .map(|(role, users)| (RoleName(role), users.into_iter().map(UserId).collect()))
                .collect(),
            department_heads: snapshot
                .department_heads
                .into_iter()
                .map(|(department, user)| (department, UserId(user)))
                .collect(),
            vendor_contacts: snapshot
                .vendor_contacts
                .into_iter()
                .map(|(user, vendor)| (UserId(user), VendorId(vendor)))
                .collect(),
        }
    }
}

impl Directory for StaticDirectory {
    fn role_holders(&self, role: &RoleName) -> Result<Vec<UserId>, DirectoryError> {
        Ok(self.roles.get(role).cloned().unwrap_or_default())
    }

    fn user_roles(&self, user: &UserId) -> Result<Vec<RoleName>, DirectoryError> {
        Ok(self
            .roles
            .iter()
            .filter(|(_, holders)| holders.contains(user))
            .map(|(role, _)| role.clone())
            .collect())
    }

    fn department_head(&self, department: &str) -> Result<Option<UserId>, DirectoryError> {
        Ok(self.department_heads.get(department).cloned())
    }

    fn vendor_for_user(&self, user: &UserId) -> Result<Option<VendorId>, DirectoryError> {
        Ok(self.vendor_contacts.get(user).cloned())
    }
}

/// Staff and vendor contacts used by `demo` and by `serve` when no directory file is given.
pub(crate) fn sample_directory() -> StaticDirectory {
    StaticDirectory::default()
        .with_role("Committee", &["lin.committee", "omar.committee"])
        .with_role("Director", &["dana.director"])
        .with_role("President", &["paul.president"])
        .with_role("Administrator", &["root.admin"])
        .with_department_head("Facilities", "ivy.head")
        .with_vendor_contact("sales@northwind", "northwind")
        .with_vendor_contact("bids@contoso", "contoso")
        .with_vendor_contact("tenders@fabrikam", "fabrikam")
}

/// Logs every intent; delivery adapters are wired outside this binary.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationPublisher {
    events: Arc<Mutex<Vec<NotificationIntent>>>,
}

impl NotificationPublisher for InMemoryNotificationPublisher {
    fn publish(&self, notification: NotificationIntent) -> Result<(), NotificationError> {
        info!(
            template = %notification.template,
            recipients = notification.recipients.len(),
            "notification queued"
        );
        let mut guard = self.events.lock().expect("notification mutex poisoned");
        guard.push(notification);
        Ok(())
    }
}

impl InMemoryNotificationPublisher {
    pub(crate) fn events(&self) -> Vec<NotificationIntent> {
        self.events.lock().expect("notification mutex poisoned").clone()
    }
}

/// Clock the demo moves forward between scripted steps.
pub(crate) struct ScriptedClock {
    now: Mutex<DateTime<Utc>>,
}

impl ScriptedClock {
    pub(crate) fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.now.lock().expect("clock mutex poisoned") += by;
    }
}

impl Clock for ScriptedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

pub(crate) fn parse_strategy(raw: &str) -> Result<AwardStrategy, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "single-vendor" | "single" => Ok(AwardStrategy::SingleVendor),
        "per-item" | "item" => Ok(AwardStrategy::PerItem),
        other => Err(format!(
            "unknown award strategy '{other}' (expected single-vendor or per-item)"
        )),
    }
}
