use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ProcurementConfig;

use super::approval::{self, authorize, ActorContext, ApprovalChainResolver, ReviewChain};
use super::award::{
    current_eligibility, AwardLifecycleController, AwardResponse, FinalizeRequest,
    PromotionOutcome, VendorResponse,
};
use super::domain::{
    ItemScore, QuotationId, QuoteItemId, Requisition, RequisitionAggregate, RequisitionId,
    RequisitionStatus, RoleName, UserId, VendorId,
};
use super::evaluation::{determine_award, AwardDetermination};
use super::intake::{self, BiddingTerms, QuotationSubmission, ScoreSubmission};
use super::repository::{
    AuditRecord, ConfiguredReviewChain, Directory, DirectoryError, NotificationIntent,
    NotificationPublisher, RepositoryError, RequisitionStore, ReviewChainSource, TransactionId,
    TransitionCommit,
};
use super::transition::{Action, TransitionError, TransitionPlan};

/// Source of the current time, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One mutex per requisition so transitions on the same aggregate never interleave.
#[derive(Debug, Default)]
pub struct RequisitionLocks {
    locks: Mutex<HashMap<RequisitionId, Arc<Mutex<()>>>>,
}

impl RequisitionLocks {
    pub(crate) fn handle(&self, id: &RequisitionId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(id.clone()).or_default().clone()
    }

    /// Give a handle back, dropping the entry once no caller holds it.
    pub(crate) fn release(&self, id: &RequisitionId, handle: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(handle);
        if locks
            .get(id)
            .map_or(false, |entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(id);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

static TRANSACTION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static QUOTATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_transaction_id() -> TransactionId {
    let id = TRANSACTION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    TransactionId(format!("txn-{id:08}"))
}

fn next_quotation_id() -> QuotationId {
    let id = QUOTATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    QuotationId(format!("quo-{id:06}"))
}

/// A state-changing request against one requisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TransitionRequest {
    Submit,
    Resubmit,
    Approve {
        #[serde(default)]
        comment: Option<String>,
    },
    Reject {
        #[serde(default)]
        comment: Option<String>,
    },
    OpenBidding(BiddingTerms),
    SubmitQuotation(QuotationSubmission),
    StartScoring,
    SubmitScores {
        quotation_id: QuotationId,
        #[serde(default)]
        committee_comment: Option<String>,
        item_scores: Vec<ItemScore>,
    },
    CompleteScoring,
    Finalize(FinalizeRequest),
    ReleaseAward,
    AcceptAward {
        vendor_id: VendorId,
        #[serde(default)]
        quote_item_id: Option<QuoteItemId>,
    },
    DeclineAward {
        vendor_id: VendorId,
        #[serde(default)]
        quote_item_id: Option<QuoteItemId>,
        reason: String,
    },
    ExpireResponses,
    ReopenForReview,
    RestartScoring,
}

impl TransitionRequest {
    pub fn action(&self) -> Action {
        match self {
            Self::Submit => Action::Submit,
            Self::Resubmit => Action::Resubmit,
            Self::Approve { .. } => Action::Approve,
            Self::Reject { .. } => Action::Reject,
            Self::OpenBidding(_) => Action::OpenBidding,
            Self::SubmitQuotation(_) => Action::SubmitQuotation,
            Self::StartScoring => Action::StartScoring,
            Self::SubmitScores { .. } => Action::SubmitScores,
            Self::CompleteScoring => Action::CompleteScoring,
            Self::Finalize(_) => Action::Finalize,
            Self::ReleaseAward => Action::ReleaseAward,
            Self::AcceptAward { .. } => Action::AcceptAward,
            Self::DeclineAward { .. } => Action::DeclineAward,
            Self::ExpireResponses => Action::ExpireResponses,
            Self::ReopenForReview => Action::ReopenForReview,
            Self::RestartScoring => Action::RestartScoring,
        }
    }

    /// Vendor on whose behalf the request is made, if any.
    pub fn vendor(&self) -> Option<&VendorId> {
        match self {
            Self::SubmitQuotation(submission) => Some(&submission.vendor_id),
            Self::AcceptAward { vendor_id, .. } | Self::DeclineAward { vendor_id, .. } => {
                Some(vendor_id)
            }
            _ => None,
        }
    }
}

/// Result of a committed transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionReceipt {
    pub transaction_id: TransactionId,
    pub requisition_id: RequisitionId,
    pub action: Action,
    pub from: String,
    pub to: String,
    pub current_approver_id: Option<UserId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub promotions: Vec<PromotionOutcome>,
    pub notifications: Vec<NotificationIntent>,
}

/// Service wiring the approval resolver and award controller to storage and notifications.
pub struct ProcurementService<S, D, N> {
    store: Arc<S>,
    directory: Arc<D>,
    notifications: Arc<N>,
    chain: Arc<dyn ReviewChainSource>,
    admin_roles: Vec<RoleName>,
    response_window: Duration,
    clock: Arc<dyn Clock>,
    locks: RequisitionLocks,
}

impl<S, D, N> ProcurementService<S, D, N>
where
    S: RequisitionStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        notifications: Arc<N>,
        config: &ProcurementConfig,
    ) -> Self {
        Self {
            store,
            directory,
            notifications,
            chain: Arc::new(ConfiguredReviewChain::from_config(config)),
            admin_roles: config.admin_roles.iter().map(RoleName::new).collect(),
            response_window: Duration::hours(config.award_response_hours),
            clock: Arc::new(SystemClock),
            locks: RequisitionLocks::default(),
        }
    }

    pub fn with_chain_source(mut self, chain: Arc<dyn ReviewChainSource>) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a new draft requisition.
    pub fn create(&self, requisition: Requisition) -> Result<RequisitionAggregate, ProcurementServiceError> {
        if requisition.status != RequisitionStatus::Draft {
            return Err(TransitionError::invalid(
                Action::Submit,
                &requisition.status,
                vec![RequisitionStatus::Draft.label()],
            )
            .into());
        }

        let mut aggregate = RequisitionAggregate::new(requisition);
        aggregate.requisition.version = 0;
        aggregate.requisition.current_approver_id = None;
        self.store.insert(aggregate.clone())?;
        debug!(requisition_id = %aggregate.requisition.id.0, "draft requisition created");
        Ok(aggregate)
    }

    /// Fetch the full aggregate for API responses.
    pub fn get(&self, id: &RequisitionId) -> Result<RequisitionAggregate, ProcurementServiceError> {
        let aggregate = self.store.load(id)?.ok_or(RepositoryError::NotFound)?;
        Ok(aggregate)
    }

    /// Current ranking of the requisition's bids, honoring declines recorded so far.
    pub fn ranking(&self, id: &RequisitionId) -> Result<AwardDetermination, ProcurementServiceError> {
        let aggregate = self.get(id)?;
        let determination = determine_award(
            &aggregate.requisition,
            &aggregate.quotations,
            &current_eligibility(&aggregate),
        )
        .map_err(TransitionError::from)?;
        Ok(determination)
    }

    /// Check the status, authorize, plan and atomically commit one transition.
    pub fn apply(
        &self,
        id: &RequisitionId,
        actor_id: &UserId,
        request: TransitionRequest,
    ) -> Result<TransitionReceipt, ProcurementServiceError> {
        let handle = self.locks.handle(id);
        let result = {
            let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
            self.apply_locked(id, actor_id, request)
        };
        self.locks.release(id, handle);
        result
    }

    fn apply_locked(
        &self,
        id: &RequisitionId,
        actor_id: &UserId,
        request: TransitionRequest,
    ) -> Result<TransitionReceipt, ProcurementServiceError> {
        let action = request.action();
        let current = self.store.load(id)?.ok_or(RepositoryError::NotFound)?;
        let chain = ReviewChain::new(self.chain.review_chain()?);
        approval::ensure_applicable(action, &current.requisition, &chain)?;
        let actor = self.actor(actor_id)?;
        authorize(action, &current.requisition, &actor, request.vendor())?;

        let resolver = ApprovalChainResolver::new(&chain, self.directory.as_ref());
        let now = self.clock.now();

        let mut plan = self.plan(resolver, &current, &actor, request, now)?;
        plan.aggregate.requisition.version = current.requisition.version + 1;

        let audit = AuditRecord {
            transaction_id: next_transaction_id(),
            actor_id: actor_id.clone(),
            action,
            entity_id: id.clone(),
            details: plan.details.clone(),
            recorded_at: now,
        };
        let receipt = TransitionReceipt {
            transaction_id: audit.transaction_id.clone(),
            requisition_id: id.clone(),
            action,
            from: current.requisition.status.label(),
            to: plan.aggregate.requisition.status.label(),
            current_approver_id: plan.aggregate.requisition.current_approver_id.clone(),
            promotions: plan.promotions.clone(),
            notifications: plan.notifications.clone(),
        };

        self.store.commit(TransitionCommit {
            aggregate: plan.aggregate,
            expected_version: current.requisition.version,
            audit,
        })?;

        info!(
            requisition_id = %id.0,
            action = %action,
            from = %receipt.from,
            to = %receipt.to,
            transaction_id = %receipt.transaction_id.0,
            "requisition transition committed"
        );

        self.dispatch(&receipt);
        Ok(receipt)
    }

    fn plan(
        &self,
        resolver: ApprovalChainResolver<'_, D>,
        aggregate: &RequisitionAggregate,
        actor: &ActorContext,
        request: TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<TransitionPlan, TransitionError> {
        match request {
            TransitionRequest::Submit => approval::submit(&resolver, aggregate, Action::Submit),
            TransitionRequest::Resubmit => approval::submit(&resolver, aggregate, Action::Resubmit),
            TransitionRequest::Approve { comment } => approval::approve(&resolver, aggregate, comment),
            TransitionRequest::Reject { comment } => approval::reject(&resolver, aggregate, comment),
            TransitionRequest::OpenBidding(terms) => intake::open_bidding(aggregate, &terms, now),
            TransitionRequest::SubmitQuotation(submission) => {
                intake::submit_quotation(aggregate, next_quotation_id(), &submission, now)
            }
            TransitionRequest::StartScoring => intake::start_scoring(aggregate, now),
            TransitionRequest::SubmitScores {
                quotation_id,
                committee_comment,
                item_scores,
            } => intake::submit_scores(
                aggregate,
                &actor.user_id,
                &quotation_id,
                &ScoreSubmission {
                    committee_comment,
                    item_scores,
                },
                now,
            ),
            TransitionRequest::CompleteScoring => intake::complete_scoring(aggregate),
            TransitionRequest::Finalize(request) => {
                self.controller(resolver).finalize(aggregate, &request, now)
            }
            TransitionRequest::ReleaseAward => self.controller(resolver).release(aggregate, now),
            TransitionRequest::AcceptAward {
                vendor_id,
                quote_item_id,
            } => self.controller(resolver).respond(
                aggregate,
                &VendorResponse {
                    vendor_id,
                    quote_item_id,
                    response: AwardResponse::Accept,
                },
                now,
            ),
            TransitionRequest::DeclineAward {
                vendor_id,
                quote_item_id,
                reason,
            } => self.controller(resolver).respond(
                aggregate,
                &VendorResponse {
                    vendor_id,
                    quote_item_id,
                    response: AwardResponse::Decline { reason },
                },
                now,
            ),
            TransitionRequest::ExpireResponses => {
                self.controller(resolver).expire_responses(aggregate, now)
            }
            TransitionRequest::ReopenForReview => {
                self.controller(resolver).reopen_for_review(aggregate)
            }
            TransitionRequest::RestartScoring => self.controller(resolver).restart_scoring(aggregate),
        }
    }

    #[cfg(test)]
    pub(crate) fn open_locks(&self) -> usize {
        self.locks.len()
    }

    fn controller<'a>(
        &self,
        resolver: ApprovalChainResolver<'a, D>,
    ) -> AwardLifecycleController<'a, D> {
        AwardLifecycleController::new(resolver, self.response_window)
    }

    fn actor(&self, user_id: &UserId) -> Result<ActorContext, DirectoryError> {
        let roles = self.directory.user_roles(user_id)?;
        let vendor = self.directory.vendor_for_user(user_id)?;
        Ok(ActorContext::new(user_id.clone(), roles, &self.admin_roles).with_vendor(vendor))
    }

    fn dispatch(&self, receipt: &TransitionReceipt) {
        for notification in &receipt.notifications {
            if let Err(error) = self.notifications.publish(notification.clone()) {
                warn!(
                    requisition_id = %receipt.requisition_id.0,
                    template = %notification.template,
                    error = %error,
                    "notification dispatch failed"
                );
            }
        }
    }
}

/// Error raised by the procurement service.
#[derive(Debug, thiserror::Error)]
pub enum ProcurementServiceError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}
