//! Requisition approval chains, bid ranking and award resolution.
//!
//! Core operations are pure: they take the current [`RequisitionAggregate`] and return a
//! [`TransitionPlan`]. The [`ProcurementService`] authorizes the caller, commits the plan with
//! its audit record and dispatches notifications.

pub mod approval;
pub mod award;
pub mod domain;
pub mod evaluation;
pub mod intake;
pub mod repository;
pub mod router;
pub mod scoresheet;
pub mod service;
pub mod transition;

#[cfg(test)]
mod tests;

pub use approval::{
    accepting_statuses, authorize, ensure_applicable, ActorContext, ApprovalChainResolver,
    ApprovalStep, ReviewChain,
};
pub use award::{
    current_eligibility, AwardLifecycleController, AwardResponse, FinalizeRequest,
    PromotionOutcome, VendorResponse, EXPIRED_REASON,
};
pub use domain::{
    AwardStrategy, CommitteeScoreSet, CriterionId, ItemScore, PerItemAwardDetail,
    PerItemAwardStatus, Quotation, QuotationId, QuotationStatus, QuoteItem, QuoteItemId,
    Requisition, RequisitionAggregate, RequisitionId, RequisitionItem, RequisitionItemId,
    RequisitionStatus, RequisitionStatusView, RoleName, Score, UserId, VendorId,
};
pub use evaluation::{
    determine_award, AwardDetermination, Criterion, CriterionCategory, CriteriaError,
    Eligibility, EvaluationCriteria, ItemRanking, RankingOutcome, ScoreAggregator,
};
pub use intake::{BiddingTerms, QuotationSubmission, ScoreSubmission};
pub use repository::{
    AuditRecord, ConfiguredReviewChain, Directory, DirectoryError, NotificationError,
    NotificationIntent, NotificationPublisher, Recipient, RepositoryError, RequisitionStore,
    ReviewChainSource, TransactionId, TransitionCommit,
};
pub use router::procurement_router;
pub use scoresheet::{
    apply_score_sheet, parse_score_sheet, parse_score_sheet_path, ScoreSheetEntry,
    ScoreSheetError,
};
pub use service::{
    Clock, ProcurementService, ProcurementServiceError, SystemClock, TransitionReceipt,
    TransitionRequest,
};
pub use transition::{Action, TransitionError, TransitionPlan};
