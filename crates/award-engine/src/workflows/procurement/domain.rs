use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::evaluation::{CriterionCategory, EvaluationCriteria};

/// Identifier wrapper for requisitions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequisitionId(pub String);

/// Identifier of a line on the requisition that vendors quote against.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequisitionItemId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuotationId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuoteItemId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CriterionId(pub String);

/// Platform user (requester, approver, committee member or vendor contact).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VendorId(pub String);

/// Organizational role name as configured in the directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleName(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl RoleName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Status label used while a requisition waits on this role.
    pub fn pending_label(&self) -> String {
        format!("Pending_{}", self.0)
    }
}

/// Position of a requisition in the approval and award pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RequisitionStatus {
    Draft,
    PendingApproval,
    Rejected,
    PreApproved,
    AcceptingQuotes,
    ScoringInProgress,
    ScoringComplete,
    /// Waiting on `role`, the `step`-th entry of the post-bid review chain.
    PendingReview {
        step: usize,
        role: RoleName,
    },
    PostApproved,
    Awarded,
    AwardDeclined,
    PartiallyClosed,
    ProcurementReview,
    Closed,
}

impl RequisitionStatus {
    pub fn label(&self) -> String {
        match self {
            Self::Draft => "Draft".to_string(),
            Self::PendingApproval => "Pending_Approval".to_string(),
            Self::Rejected => "Rejected".to_string(),
            Self::PreApproved => "PreApproved".to_string(),
            Self::AcceptingQuotes => "Accepting_Quotes".to_string(),
            Self::ScoringInProgress => "Scoring_In_Progress".to_string(),
            Self::ScoringComplete => "Scoring_Complete".to_string(),
            Self::PendingReview { role, .. } => role.pending_label(),
            Self::PostApproved => "PostApproved".to_string(),
            Self::Awarded => "Awarded".to_string(),
            Self::AwardDeclined => "Award_Declined".to_string(),
            Self::PartiallyClosed => "Partially_Closed".to_string(),
            Self::ProcurementReview => "Procurement_Review".to_string(),
            Self::Closed => "Closed".to_string(),
        }
    }

    /// Pending states are the only ones that may carry a current approver.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::PendingApproval | Self::PendingReview { .. } | Self::ProcurementReview
        )
    }

    pub fn pending_role(&self) -> Option<&RoleName> {
        match self {
            Self::PendingReview { role, .. } => Some(role),
            _ => None,
        }
    }
}

impl fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AwardStrategy {
    #[default]
    SingleVendor,
    PerItem,
}

impl AwardStrategy {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SingleVendor => "single-vendor",
            Self::PerItem => "per-item",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequisitionItem {
    pub id: RequisitionItemId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

/// A procurement request and its approval/award bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requisition {
    pub id: RequisitionId,
    pub title: String,
    pub requester_id: UserId,
    pub department: String,
    #[serde(default)]
    pub procurement_officer_id: Option<UserId>,
    pub status: RequisitionStatus,
    #[serde(default)]
    pub current_approver_id: Option<UserId>,
    #[serde(default)]
    pub approver_comment: Option<String>,
    pub items: Vec<RequisitionItem>,
    #[serde(default)]
    pub evaluation_criteria: Option<EvaluationCriteria>,
    #[serde(default)]
    pub award_strategy: AwardStrategy,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scoring_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub award_response_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub financial_committee_member_ids: BTreeSet<UserId>,
    #[serde(default)]
    pub technical_committee_member_ids: BTreeSet<UserId>,
    #[serde(default)]
    pub awarded_quote_item_ids: Vec<QuoteItemId>,
    #[serde(default)]
    pub version: u64,
}

impl Requisition {
    pub fn item(&self, id: &RequisitionItemId) -> Option<&RequisitionItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Committee the user scores for, if any.
    pub fn committee_of(&self, user: &UserId) -> Option<CriterionCategory> {
        if self.financial_committee_member_ids.contains(user) {
            Some(CriterionCategory::Financial)
        } else if self.technical_committee_member_ids.contains(user) {
            Some(CriterionCategory::Technical)
        } else {
            None
        }
    }

    pub fn committee_members(&self) -> impl Iterator<Item = &UserId> {
        self.financial_committee_member_ids
            .iter()
            .chain(self.technical_committee_member_ids.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Submitted,
    Standby,
    Awarded,
    PartiallyAwarded,
    Accepted,
    Declined,
    Rejected,
    Failed,
    InvoiceSubmitted,
}

impl QuotationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Standby => "standby",
            Self::Awarded => "awarded",
            Self::PartiallyAwarded => "partially_awarded",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::InvoiceSubmitted => "invoice_submitted",
        }
    }

    /// Statuses the award controller is allowed to rewrite.
    pub(crate) const fn in_award_play(self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::Standby | Self::Awarded | Self::PartiallyAwarded | Self::Accepted
        )
    }
}

/// Priced proposal for one requisition item. Alternates share `requisition_item_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteItem {
    pub id: QuoteItemId,
    pub requisition_item_id: RequisitionItemId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub criterion_id: CriterionId,
    pub score: f64,
    #[serde(default)]
    pub comment: Option<String>,
}

/// One scorer's criterion scores for one quote item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemScore {
    pub quote_item_id: QuoteItemId,
    pub scores: Vec<Score>,
}

/// One scorer's complete evaluation of one quotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeScoreSet {
    pub scorer_id: UserId,
    #[serde(default)]
    pub committee_comment: Option<String>,
    pub item_scores: Vec<ItemScore>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub locked: bool,
}

impl CommitteeScoreSet {
    pub fn scores_for<'a>(
        &'a self,
        quote_item_id: &'a QuoteItemId,
    ) -> impl Iterator<Item = &'a Score> + 'a {
        self.item_scores
            .iter()
            .filter(move |item| &item.quote_item_id == quote_item_id)
            .flat_map(|item| item.scores.iter())
    }
}

/// A vendor's bid against a requisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    pub id: QuotationId,
    pub vendor_id: VendorId,
    pub status: QuotationStatus,
    pub items: Vec<QuoteItem>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub final_average_score: Option<f64>,
    #[serde(default)]
    pub scores: Vec<CommitteeScoreSet>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub decline_reason: Option<String>,
}

impl Quotation {
    pub fn item(&self, id: &QuoteItemId) -> Option<&QuoteItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn score_set(&self, scorer: &UserId) -> Option<&CommitteeScoreSet> {
        self.scores.iter().find(|set| &set.scorer_id == scorer)
    }

    /// Distinct requisition items this quotation bids on.
    pub fn requisition_item_ids(&self) -> BTreeSet<&RequisitionItemId> {
        self.items
            .iter()
            .map(|item| &item.requisition_item_id)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerItemAwardStatus {
    Awarded,
    Accepted,
    Declined,
    Standby,
    FailedToAward,
}

impl PerItemAwardStatus {
    /// The vendor turned this item down; the pair stays out of every later ranking.
    pub const fn is_declined(self) -> bool {
        matches!(self, Self::Declined | Self::FailedToAward)
    }
}

/// Materialized per-item award outcome (winner or standby row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerItemAwardDetail {
    pub requisition_item_id: RequisitionItemId,
    pub vendor_id: VendorId,
    pub quote_item_id: QuoteItemId,
    pub status: PerItemAwardStatus,
    pub rank: u32,
    #[serde(default)]
    pub decline_reason: Option<String>,
    #[serde(default)]
    pub response_deadline: Option<DateTime<Utc>>,
}

/// Requisition plus everything a transition may rewrite; loaded and committed as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequisitionAggregate {
    pub requisition: Requisition,
    #[serde(default)]
    pub quotations: Vec<Quotation>,
    #[serde(default)]
    pub award_details: Vec<PerItemAwardDetail>,
}

impl RequisitionAggregate {
    pub fn new(requisition: Requisition) -> Self {
        Self {
            requisition,
            quotations: Vec::new(),
            award_details: Vec::new(),
        }
    }

    pub fn quotation(&self, id: &QuotationId) -> Option<&Quotation> {
        self.quotations.iter().find(|quotation| &quotation.id == id)
    }

    pub fn quotation_by_vendor(&self, vendor: &VendorId) -> Option<&Quotation> {
        self.quotations
            .iter()
            .find(|quotation| &quotation.vendor_id == vendor)
    }

    pub(crate) fn quotation_by_vendor_mut(&mut self, vendor: &VendorId) -> Option<&mut Quotation> {
        self.quotations
            .iter_mut()
            .find(|quotation| &quotation.vendor_id == vendor)
    }

    pub fn details_for_item(
        &self,
        item: &RequisitionItemId,
    ) -> impl Iterator<Item = &PerItemAwardDetail> + '_ {
        let item = item.clone();
        self.award_details
            .iter()
            .filter(move |detail| detail.requisition_item_id == item)
    }

    pub fn status_view(&self) -> RequisitionStatusView {
        let requisition = &self.requisition;
        RequisitionStatusView {
            requisition_id: requisition.id.clone(),
            status: requisition.status.label(),
            current_approver_id: requisition.current_approver_id.clone(),
            approver_comment: requisition.approver_comment.clone(),
            award_strategy: requisition.award_strategy,
            awarded_quote_item_ids: requisition.awarded_quote_item_ids.clone(),
            award_response_deadline: requisition.award_response_deadline,
            quotation_count: self.quotations.len(),
            version: requisition.version,
        }
    }
}

/// Public status payload for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct RequisitionStatusView {
    pub requisition_id: RequisitionId,
    pub status: String,
    pub current_approver_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver_comment: Option<String>,
    pub award_strategy: AwardStrategy,
    pub awarded_quote_item_ids: Vec<QuoteItemId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub award_response_deadline: Option<DateTime<Utc>>,
    pub quotation_count: usize,
    pub version: u64,
}
