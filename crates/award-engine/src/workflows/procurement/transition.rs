use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::award::PromotionOutcome;
use super::domain::{
    QuoteItemId, RequisitionAggregate, RequisitionStatus, RoleName, UserId, VendorId,
};
use super::evaluation::CriteriaError;
use super::repository::{DirectoryError, NotificationIntent};

/// Every state-changing operation the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Submit,
    Resubmit,
    Approve,
    Reject,
    OpenBidding,
    SubmitQuotation,
    StartScoring,
    SubmitScores,
    CompleteScoring,
    Finalize,
    ReleaseAward,
    AcceptAward,
    DeclineAward,
    ExpireResponses,
    ReopenForReview,
    RestartScoring,
}

impl Action {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Resubmit => "resubmit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::OpenBidding => "open_bidding",
            Self::SubmitQuotation => "submit_quotation",
            Self::StartScoring => "start_scoring",
            Self::SubmitScores => "submit_scores",
            Self::CompleteScoring => "complete_scoring",
            Self::Finalize => "finalize",
            Self::ReleaseAward => "release_award",
            Self::AcceptAward => "accept_award",
            Self::DeclineAward => "decline_award",
            Self::ExpireResponses => "expire_responses",
            Self::ReopenForReview => "reopen_for_review",
            Self::RestartScoring => "restart_scoring",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a transition was refused. Nothing is mutated when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {action} while requisition is {current} (requires {})", .required.join(" or "))]
    InvalidTransition {
        action: Action,
        current: String,
        required: Vec<String>,
    },
    #[error("{actor} may not {action} while requisition is {current}")]
    Unauthorized {
        actor: UserId,
        action: Action,
        current: String,
        required_role: Option<RoleName>,
    },
    #[error("incomplete evaluation data: {0}")]
    IncompleteEvaluationData(String),
    #[error("no eligible bids remain to award")]
    NoEligibleBids,
    #[error("{action} window closed at {deadline}")]
    DeadlinePassed {
        action: Action,
        deadline: DateTime<Utc>,
    },
    #[error("{action} is not allowed before {deadline}")]
    DeadlineNotReached {
        action: Action,
        deadline: DateTime<Utc>,
    },
    #[error("vendor {0} already submitted a quotation")]
    DuplicateQuotation(VendorId),
    #[error("unknown {kind} {id}")]
    UnknownEntity { kind: &'static str, id: String },
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl TransitionError {
    pub fn invalid(action: Action, current: &RequisitionStatus, required: Vec<String>) -> Self {
        Self::InvalidTransition {
            action,
            current: current.label(),
            required,
        }
    }

    pub fn unknown(kind: &'static str, id: impl Into<String>) -> Self {
        Self::UnknownEntity {
            kind,
            id: id.into(),
        }
    }
}

impl From<CriteriaError> for TransitionError {
    fn from(value: CriteriaError) -> Self {
        Self::IncompleteEvaluationData(value.to_string())
    }
}

/// Fail with `InvalidTransition` unless the status is one of `allowed`.
pub(crate) fn require_status(
    action: Action,
    current: &RequisitionStatus,
    allowed: &[RequisitionStatus],
) -> Result<(), TransitionError> {
    if allowed.contains(current) {
        Ok(())
    } else {
        Err(TransitionError::invalid(
            action,
            current,
            allowed.iter().map(RequisitionStatus::label).collect(),
        ))
    }
}

/// Pure output of a core operation, ready for the caller to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub aggregate: RequisitionAggregate,
    pub details: String,
    pub notifications: Vec<NotificationIntent>,
    pub promotions: Vec<PromotionOutcome>,
}

impl TransitionPlan {
    pub fn new(aggregate: RequisitionAggregate, details: impl Into<String>) -> Self {
        Self {
            aggregate,
            details: details.into(),
            notifications: Vec::new(),
            promotions: Vec::new(),
        }
    }

    pub fn notify(mut self, notification: NotificationIntent) -> Self {
        self.notifications.push(notification);
        self
    }
}

/// Move the requisition to `status`, clearing the approver outside pending states.
pub(crate) fn set_status(
    aggregate: &mut RequisitionAggregate,
    status: RequisitionStatus,
    approver: Option<UserId>,
) {
    let requisition = &mut aggregate.requisition;
    requisition.current_approver_id = if status.is_pending() { approver } else { None };
    requisition.status = status;
}

pub(crate) fn join_quote_items(ids: &[QuoteItemId]) -> String {
    ids.iter()
        .map(|id| id.0.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
