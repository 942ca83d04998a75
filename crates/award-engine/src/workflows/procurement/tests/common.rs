use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::config::ProcurementConfig;
use crate::workflows::procurement::approval::ReviewChain;
use crate::workflows::procurement::domain::{
    CommitteeScoreSet, CriterionId, ItemScore, Quotation, QuotationId, QuotationStatus, QuoteItem,
    QuoteItemId, Requisition, RequisitionAggregate, RequisitionId, RequisitionItem,
    RequisitionItemId, RequisitionStatus, RoleName, Score, UserId, VendorId,
};
use crate::workflows::procurement::evaluation::{Criterion, EvaluationCriteria};
use crate::workflows::procurement::repository::{
    AuditRecord, Directory, DirectoryError, NotificationError, NotificationIntent,
    NotificationPublisher, RepositoryError, RequisitionStore, TransitionCommit,
};
use crate::workflows::procurement::service::{Clock, ProcurementService};

pub(super) type TestService = ProcurementService<MemoryStore, StaticDirectory, MemoryNotifications>;

pub(super) const REQUISITION: &str = "req-100";
pub(super) const FINANCIAL_SCORER: &str = "fin-1";
pub(super) const TECHNICAL_SCORER: &str = "tech-1";

pub(super) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn user(id: &str) -> UserId {
    UserId(id.to_string())
}

pub(super) fn vendor(id: &str) -> VendorId {
    VendorId(id.to_string())
}

pub(super) fn role(name: &str) -> RoleName {
    RoleName::new(name)
}

pub(super) fn req_item(id: &str) -> RequisitionItemId {
    RequisitionItemId(id.to_string())
}

pub(super) fn quote_item(id: &str) -> QuoteItemId {
    QuoteItemId(id.to_string())
}

pub(super) fn requisition_id() -> RequisitionId {
    RequisitionId(REQUISITION.to_string())
}

pub(super) fn chain(roles: &[&str]) -> ReviewChain {
    ReviewChain::new(roles.iter().map(|name| role(name)).collect())
}

pub(super) fn approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

fn criterion(id: &str, weight: f64) -> Criterion {
    Criterion {
        id: CriterionId(id.to_string()),
        name: id.to_string(),
        weight,
    }
}

/// Financial 40 / technical 60; price carries all financial weight, quality and support split
/// the technical half and half.
pub(super) fn criteria() -> EvaluationCriteria {
    EvaluationCriteria {
        financial_weight: 40.0,
        technical_weight: 60.0,
        financial_criteria: vec![criterion("price", 100.0)],
        technical_criteria: vec![criterion("quality", 50.0), criterion("support", 50.0)],
    }
}

pub(super) fn requisition(items: &[&str]) -> Requisition {
    Requisition {
        id: requisition_id(),
        title: "Field laptops".to_string(),
        requester_id: user("requester-1"),
        department: "Operations".to_string(),
        procurement_officer_id: Some(user("officer-1")),
        status: RequisitionStatus::Draft,
        current_approver_id: None,
        approver_comment: None,
        items: items
            .iter()
            .map(|id| RequisitionItem {
                id: req_item(id),
                name: format!("Item {id}"),
                quantity: 10,
                unit_price: 1200.0,
            })
            .collect(),
        evaluation_criteria: None,
        award_strategy: Default::default(),
        deadline: None,
        scoring_deadline: None,
        award_response_deadline: None,
        financial_committee_member_ids: BTreeSet::new(),
        technical_committee_member_ids: BTreeSet::new(),
        awarded_quote_item_ids: Vec::new(),
        version: 0,
    }
}

/// Requisition with criteria and committees whose scoring has just completed.
pub(super) fn scored_requisition(items: &[&str]) -> Requisition {
    let mut requisition = requisition(items);
    requisition.status = RequisitionStatus::ScoringComplete;
    requisition.evaluation_criteria = Some(criteria());
    requisition.deadline = Some(t0() - Duration::days(3));
    requisition.financial_committee_member_ids = BTreeSet::from([user(FINANCIAL_SCORER)]);
    requisition.technical_committee_member_ids = BTreeSet::from([user(TECHNICAL_SCORER)]);
    requisition.version = 7;
    requisition
}

/// One quote item and the marks it receives: `financial` for price, `technical` for both
/// quality and support.
#[derive(Debug, Clone, Copy)]
pub(super) struct Bid {
    pub(super) quote_item: &'static str,
    pub(super) item: &'static str,
    pub(super) financial: f64,
    pub(super) technical: f64,
}

pub(super) fn bid(quote_item: &'static str, item: &'static str, financial: f64, technical: f64) -> Bid {
    Bid {
        quote_item,
        item,
        financial,
        technical,
    }
}

/// Bid whose final item score equals `score` (both categories marked the same).
pub(super) fn flat_bid(quote_item: &'static str, item: &'static str, score: f64) -> Bid {
    bid(quote_item, item, score, score)
}

pub(super) fn score_set(scorer: &str, marks: Vec<(QuoteItemId, Vec<(&str, f64)>)>) -> CommitteeScoreSet {
    CommitteeScoreSet {
        scorer_id: user(scorer),
        committee_comment: None,
        item_scores: marks
            .into_iter()
            .map(|(quote_item_id, scores)| ItemScore {
                quote_item_id,
                scores: scores
                    .into_iter()
                    .map(|(criterion_id, score)| Score {
                        criterion_id: CriterionId(criterion_id.to_string()),
                        score,
                        comment: None,
                    })
                    .collect(),
            })
            .collect(),
        submitted_at: t0() - Duration::days(2),
        locked: false,
    }
}

/// Quotation from `vendor_id` submitted `minute` minutes into the bidding window, scored by
/// one financial and one technical scorer.
pub(super) fn scored_quotation(vendor_id: &str, minute: i64, bids: &[Bid]) -> Quotation {
    let items = bids
        .iter()
        .map(|bid| QuoteItem {
            id: quote_item(bid.quote_item),
            requisition_item_id: req_item(bid.item),
            name: format!("{} offer", bid.item),
            quantity: 10,
            unit_price: 1100.0,
        })
        .collect();

    let financial = score_set(
        FINANCIAL_SCORER,
        bids.iter()
            .map(|bid| (quote_item(bid.quote_item), vec![("price", bid.financial)]))
            .collect(),
    );
    let technical = score_set(
        TECHNICAL_SCORER,
        bids.iter()
            .map(|bid| {
                (
                    quote_item(bid.quote_item),
                    vec![("quality", bid.technical), ("support", bid.technical)],
                )
            })
            .collect(),
    );

    Quotation {
        id: QuotationId(format!("q-{vendor_id}")),
        vendor_id: vendor(vendor_id),
        status: QuotationStatus::Submitted,
        items,
        rank: None,
        final_average_score: None,
        scores: vec![financial, technical],
        submitted_at: t0() - Duration::days(10) + Duration::minutes(minute),
        decline_reason: None,
    }
}

pub(super) fn scored_aggregate(items: &[&str], quotations: Vec<Quotation>) -> RequisitionAggregate {
    let mut aggregate = RequisitionAggregate::new(scored_requisition(items));
    aggregate.quotations = quotations;
    aggregate
}

/// Four vendors bidding on one item with final scores 90, 80, 70 and 60.
pub(super) fn four_way_aggregate() -> RequisitionAggregate {
    scored_aggregate(
        &["item-1"],
        vec![
            scored_quotation("vendor-a", 1, &[flat_bid("qi-a1", "item-1", 90.0)]),
            scored_quotation("vendor-b", 2, &[flat_bid("qi-b1", "item-1", 80.0)]),
            scored_quotation("vendor-c", 3, &[flat_bid("qi-c1", "item-1", 70.0)]),
            scored_quotation("vendor-d", 4, &[flat_bid("qi-d1", "item-1", 60.0)]),
        ],
    )
}

pub(super) fn directory() -> StaticDirectory {
    StaticDirectory::default()
        .with_role("Committee", &["committee-1", "committee-2"])
        .with_role("Director", &["director-1"])
        .with_role("President", &["president-1"])
        .with_role("Administrator", &["admin-1"])
        .with_role("ProcurementOfficer", &["officer-1"])
        .with_department_head("Operations", "head-1")
        .with_vendor_contact("contact-a", "vendor-a")
        .with_vendor_contact("contact-b", "vendor-b")
        .with_vendor_contact("contact-c", "vendor-c")
        .with_vendor_contact("contact-d", "vendor-d")
}

pub(super) fn procurement_config(roles: &[&str]) -> ProcurementConfig {
    ProcurementConfig {
        review_chain: roles.iter().map(|name| name.to_string()).collect(),
        admin_roles: vec!["Administrator".to_string()],
        award_response_hours: 72,
    }
}

pub(super) fn build_service(
    roles: &[&str],
) -> (
    TestService,
    Arc<MemoryStore>,
    Arc<MemoryNotifications>,
    Arc<FixedClock>,
) {
    let store = Arc::new(MemoryStore::default());
    let notifications = Arc::new(MemoryNotifications::default());
    let clock = Arc::new(FixedClock::new(t0()));
    let service = ProcurementService::new(
        store.clone(),
        Arc::new(directory()),
        notifications.clone(),
        &procurement_config(roles),
    )
    .with_clock(clock.clone());
    (service, store, notifications, clock)
}

#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    aggregates: Arc<Mutex<HashMap<RequisitionId, RequisitionAggregate>>>,
    audit: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryStore {
    pub(super) fn seed(&self, aggregate: RequisitionAggregate) {
        self.aggregates
            .lock()
            .expect("store mutex poisoned")
            .insert(aggregate.requisition.id.clone(), aggregate);
    }

    pub(super) fn stored(&self, id: &RequisitionId) -> RequisitionAggregate {
        self.aggregates
            .lock()
            .expect("store mutex poisoned")
            .get(id)
            .cloned()
            .expect("aggregate stored")
    }

    pub(super) fn audit(&self) -> Vec<AuditRecord> {
        self.audit.lock().expect("audit mutex poisoned").clone()
    }
}

impl RequisitionStore for MemoryStore {
    fn load(&self, id: &RequisitionId) -> Result<Option<RequisitionAggregate>, RepositoryError> {
        let guard = self.aggregates.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn insert(&self, aggregate: RequisitionAggregate) -> Result<(), RepositoryError> {
        let mut guard = self.aggregates.lock().expect("store mutex poisoned");
        if guard.contains_key(&aggregate.requisition.id) {
            return Err(RepositoryError::AlreadyExists(aggregate.requisition.id.0.clone()));
        }
        guard.insert(aggregate.requisition.id.clone(), aggregate);
        Ok(())
    }

    fn commit(&self, commit: TransitionCommit) -> Result<(), RepositoryError> {
        let mut guard = self.aggregates.lock().expect("store mutex poisoned");
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
        guard.insert(id, commit.aggregate);
        self.audit
            .lock()
            .expect("audit mutex poisoned")
            .push(commit.audit);
        Ok(())
    }
}

/// Store whose row always moved on between load and commit.
pub(super) struct RacingStore {
    pub(super) aggregate: RequisitionAggregate,
}

impl RequisitionStore for RacingStore {
    fn load(&self, _id: &RequisitionId) -> Result<Option<RequisitionAggregate>, RepositoryError> {
        Ok(Some(self.aggregate.clone()))
    }

    fn insert(&self, _aggregate: RequisitionAggregate) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("read only".to_string()))
    }

    fn commit(&self, commit: TransitionCommit) -> Result<(), RepositoryError> {
        Err(RepositoryError::Conflict {
            expected: commit.expected_version,
            found: commit.expected_version + 1,
        })
    }
}

#[derive(Default, Clone)]
pub(super) struct StaticDirectory {
    roles: BTreeMap<RoleName, Vec<UserId>>,
    heads: BTreeMap<String, UserId>,
    vendors: BTreeMap<UserId, VendorId>,
}

impl StaticDirectory {
    pub(super) fn with_role(mut self, name: &str, users: &[&str]) -> Self {
        self.roles
            .insert(role(name), users.iter().map(|id| user(id)).collect());
        self
    }

    pub(super) fn with_department_head(mut self, department: &str, head: &str) -> Self {
        self.heads.insert(department.to_string(), user(head));
        self
    }

    pub(super) fn with_vendor_contact(mut self, contact: &str, vendor_id: &str) -> Self {
        self.vendors.insert(user(contact), vendor(vendor_id));
        self
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
        Ok(self.heads.get(department).cloned())
    }

    fn vendor_for_user(&self, user: &UserId) -> Result<Option<VendorId>, DirectoryError> {
        Ok(self.vendors.get(user).cloned())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifications {
    events: Arc<Mutex<Vec<NotificationIntent>>>,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<NotificationIntent> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }

    pub(super) fn templates(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.template)
            .collect()
    }
}

impl NotificationPublisher for MemoryNotifications {
    fn publish(&self, notification: NotificationIntent) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct OfflineNotifications;

impl NotificationPublisher for OfflineNotifications {
    fn publish(&self, _notification: NotificationIntent) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay offline".to_string()))
    }
}

pub(super) struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub(super) fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
