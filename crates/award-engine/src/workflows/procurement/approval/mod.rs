//! Pre-bid department approval and the configurable post-bid review chain.

mod access;

pub use access::{authorize, is_current_reviewer, ActorContext};

use super::domain::{
    AwardStrategy, Requisition, RequisitionAggregate, RequisitionStatus, RoleName, UserId,
};
use super::repository::{Directory, NotificationIntent, Recipient};
use super::transition::{require_status, set_status, Action, TransitionError, TransitionPlan};

/// Ordered roles that must sign off an award recommendation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewChain {
    roles: Vec<RoleName>,
}

impl ReviewChain {
    pub fn new(roles: Vec<RoleName>) -> Self {
        let roles = roles
            .into_iter()
            .map(|role| RoleName::new(role.0.trim()))
            .filter(|role| !role.0.is_empty())
            .collect();
        Self { roles }
    }

    pub fn roles(&self) -> &[RoleName] {
        &self.roles
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn status_at(&self, step: usize) -> Option<RequisitionStatus> {
        self.roles
            .get(step)
            .map(|role| RequisitionStatus::PendingReview {
                step,
                role: role.clone(),
            })
    }

    /// Position of a pending-review status, or `None` if it no longer matches the chain.
    fn position(&self, status: &RequisitionStatus) -> Option<usize> {
        match status {
            RequisitionStatus::PendingReview { step, role } if self.roles.get(*step) == Some(role) => {
                Some(*step)
            }
            _ => None,
        }
    }

    fn labels(&self) -> Vec<String> {
        self.roles.iter().map(RoleName::pending_label).collect()
    }
}

/// Where a requisition lands after an approval decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalStep {
    pub status: RequisitionStatus,
    pub approver_id: Option<UserId>,
    pub notify: Vec<UserId>,
}

impl ApprovalStep {
    fn settled(status: RequisitionStatus, notify: Option<&UserId>) -> Self {
        Self {
            status,
            approver_id: None,
            notify: notify.into_iter().cloned().collect(),
        }
    }
}

/// Computes the next and previous approval step from the current status.
pub struct ApprovalChainResolver<'a, D: ?Sized> {
    chain: &'a ReviewChain,
    directory: &'a D,
}

impl<'a, D> ApprovalChainResolver<'a, D>
where
    D: Directory + ?Sized,
{
    pub fn new(chain: &'a ReviewChain, directory: &'a D) -> Self {
        Self { chain, directory }
    }

    pub fn chain(&self) -> &'a ReviewChain {
        self.chain
    }

    /// First review step for a fresh award recommendation; `PostApproved` when nobody reviews.
    pub fn entry_step(&self) -> Result<ApprovalStep, TransitionError> {
        match self.chain.status_at(0) {
            Some(status) => self.pending_step(status),
            None => Ok(ApprovalStep::settled(RequisitionStatus::PostApproved, None)),
        }
    }

    /// Route a submitted requisition to its department head, or straight to `PreApproved`.
    pub fn submission_step(
        &self,
        aggregate: &RequisitionAggregate,
    ) -> Result<ApprovalStep, TransitionError> {
        let requisition = &aggregate.requisition;
        match self.directory.department_head(&requisition.department)? {
            Some(head) => Ok(ApprovalStep {
                status: RequisitionStatus::PendingApproval,
                approver_id: Some(head.clone()),
                notify: vec![head],
            }),
            None => Ok(ApprovalStep::settled(
                RequisitionStatus::PreApproved,
                requisition.procurement_officer_id.as_ref(),
            )),
        }
    }

    pub fn advance(&self, aggregate: &RequisitionAggregate) -> Result<ApprovalStep, TransitionError> {
        let requisition = &aggregate.requisition;
        match &requisition.status {
            RequisitionStatus::PendingApproval => Ok(ApprovalStep::settled(
                RequisitionStatus::PreApproved,
                requisition
                    .procurement_officer_id
                    .as_ref()
                    .or(Some(&requisition.requester_id)),
            )),
            status @ RequisitionStatus::PendingReview { .. } => {
                let position = self.position(status, Action::Approve)?;
                match self.chain.status_at(position + 1) {
                    Some(next) => self.pending_step(next),
                    None => Ok(ApprovalStep::settled(
                        RequisitionStatus::PostApproved,
                        requisition.procurement_officer_id.as_ref(),
                    )),
                }
            }
            other => Err(TransitionError::invalid(
                Action::Approve,
                other,
                self.reviewable_labels(false),
            )),
        }
    }

    pub fn rewind(&self, aggregate: &RequisitionAggregate) -> Result<ApprovalStep, TransitionError> {
        let requisition = &aggregate.requisition;
        match &requisition.status {
            RequisitionStatus::PendingApproval => Ok(ApprovalStep::settled(
                RequisitionStatus::Rejected,
                Some(&requisition.requester_id),
            )),
            status @ RequisitionStatus::PendingReview { .. } => {
                let position = self.position(status, Action::Reject)?;
                match position.checked_sub(1).and_then(|step| self.chain.status_at(step)) {
                    Some(previous) => self.pending_step(previous),
                    None => Ok(ApprovalStep::settled(
                        RequisitionStatus::AwardDeclined,
                        requisition.procurement_officer_id.as_ref(),
                    )),
                }
            }
            RequisitionStatus::PartiallyClosed => Ok(ApprovalStep {
                status: RequisitionStatus::ProcurementReview,
                approver_id: requisition.procurement_officer_id.clone(),
                notify: requisition.procurement_officer_id.iter().cloned().collect(),
            }),
            other => Err(TransitionError::invalid(
                Action::Reject,
                other,
                self.reviewable_labels(true),
            )),
        }
    }

    fn position(&self, status: &RequisitionStatus, action: Action) -> Result<usize, TransitionError> {
        self.chain
            .position(status)
            .ok_or_else(|| TransitionError::invalid(action, status, self.chain.labels()))
    }

    fn pending_step(&self, status: RequisitionStatus) -> Result<ApprovalStep, TransitionError> {
        let holders = match status.pending_role() {
            Some(role) => self.directory.role_holders(role)?,
            None => Vec::new(),
        };
        // A shared or unstaffed role leaves the step open to every holder.
        let approver_id = match holders.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        };
        Ok(ApprovalStep {
            status,
            approver_id,
            notify: holders,
        })
    }

    fn reviewable_labels(&self, rewind: bool) -> Vec<String> {
        let mut labels = vec![RequisitionStatus::PendingApproval.label()];
        labels.extend(self.chain.labels());
        if rewind {
            labels.push(RequisitionStatus::PartiallyClosed.label());
        }
        labels
    }
}

/// Submit a draft, or resubmit a rejected requisition, for department approval.
pub fn submit<D>(
    resolver: &ApprovalChainResolver<'_, D>,
    aggregate: &RequisitionAggregate,
    action: Action,
) -> Result<TransitionPlan, TransitionError>
where
    D: Directory + ?Sized,
{
    let required = match action {
        Action::Resubmit => RequisitionStatus::Rejected,
        _ => RequisitionStatus::Draft,
    };
    if aggregate.requisition.status != required {
        return Err(TransitionError::invalid(
            action,
            &aggregate.requisition.status,
            vec![required.label()],
        ));
    }

    let step = resolver.submission_step(aggregate)?;
    let mut next = aggregate.clone();
    let status = step.status.clone();
    set_status(&mut next, step.status, step.approver_id);
    next.requisition.approver_comment = None;

    let template = match status {
        RequisitionStatus::PendingApproval => "requisition_pending_approval",
        _ => "requisition_preapproved",
    };
    let details = format!("{action} requisition; now {status}");
    Ok(plan_with_notice(next, details, template, step.notify))
}

/// Approve the current step and move one step forward.
pub fn approve<D>(
    resolver: &ApprovalChainResolver<'_, D>,
    aggregate: &RequisitionAggregate,
    comment: Option<String>,
) -> Result<TransitionPlan, TransitionError>
where
    D: Directory + ?Sized,
{
    let step = resolver.advance(aggregate)?;
    let acting = acting_role(&aggregate.requisition.status);
    let mut next = aggregate.clone();
    let status = step.status.clone();
    set_status(&mut next, step.status, step.approver_id);
    next.requisition.approver_comment = comment;

    let template = match status {
        RequisitionStatus::PendingReview { .. } => "award_review_requested",
        RequisitionStatus::PostApproved => "award_review_complete",
        _ => "requisition_preapproved",
    };
    let details = format!("{acting} approved; now {status}");
    Ok(plan_with_notice(next, details, template, step.notify))
}

/// Reject the current step and move one step back.
pub fn reject<D>(
    resolver: &ApprovalChainResolver<'_, D>,
    aggregate: &RequisitionAggregate,
    comment: Option<String>,
) -> Result<TransitionPlan, TransitionError>
where
    D: Directory + ?Sized,
{
    let step = resolver.rewind(aggregate)?;
    let acting = acting_role(&aggregate.requisition.status);
    let mut next = aggregate.clone();
    let status = step.status.clone();
    set_status(&mut next, step.status, step.approver_id);
    next.requisition.approver_comment = comment;

    let template = match status {
        RequisitionStatus::Rejected => "requisition_rejected",
        RequisitionStatus::AwardDeclined => "award_recommendation_rejected",
        RequisitionStatus::ProcurementReview => "award_procurement_review",
        _ => "award_review_returned",
    };
    let details = format!("{acting} rejected; returned to {status}");
    Ok(plan_with_notice(next, details, template, step.notify))
}

/// Statuses from which `action` can be taken under `chain`, whoever asks.
pub fn accepting_statuses(
    action: Action,
    requisition: &Requisition,
    chain: &ReviewChain,
) -> Vec<RequisitionStatus> {
    let reviews = || (0..chain.roles().len()).filter_map(|step| chain.status_at(step));
    match action {
        Action::Submit => vec![RequisitionStatus::Draft],
        Action::Resubmit => vec![RequisitionStatus::Rejected],
        Action::Approve => std::iter::once(RequisitionStatus::PendingApproval)
            .chain(reviews())
            .collect(),
        Action::Reject => std::iter::once(RequisitionStatus::PendingApproval)
            .chain(reviews())
            .chain(std::iter::once(RequisitionStatus::PartiallyClosed))
            .collect(),
        Action::OpenBidding => vec![RequisitionStatus::PreApproved],
        Action::SubmitQuotation | Action::StartScoring => vec![RequisitionStatus::AcceptingQuotes],
        Action::SubmitScores | Action::CompleteScoring => vec![RequisitionStatus::ScoringInProgress],
        Action::Finalize => vec![RequisitionStatus::ScoringComplete],
        Action::ReleaseAward => vec![RequisitionStatus::PostApproved],
        Action::AcceptAward | Action::DeclineAward | Action::ExpireResponses => {
            match requisition.award_strategy {
                AwardStrategy::SingleVendor => vec![RequisitionStatus::Awarded],
                AwardStrategy::PerItem => {
                    vec![RequisitionStatus::Awarded, RequisitionStatus::PartiallyClosed]
                }
            }
        }
        Action::ReopenForReview | Action::RestartScoring => vec![
            RequisitionStatus::AwardDeclined,
            RequisitionStatus::ProcurementReview,
        ],
    }
}

/// Fail with `InvalidTransition` when `action` does not apply to the current status.
pub fn ensure_applicable(
    action: Action,
    requisition: &Requisition,
    chain: &ReviewChain,
) -> Result<(), TransitionError> {
    require_status(
        action,
        &requisition.status,
        &accepting_statuses(action, requisition, chain),
    )
}

fn acting_role(status: &RequisitionStatus) -> String {
    match status {
        RequisitionStatus::PendingReview { role, .. } => role.0.clone(),
        RequisitionStatus::PendingApproval => "Department head".to_string(),
        other => other.label(),
    }
}

fn plan_with_notice(
    aggregate: RequisitionAggregate,
    details: String,
    template: &str,
    recipients: Vec<UserId>,
) -> TransitionPlan {
    let requisition_id = aggregate.requisition.id.0.clone();
    let status = aggregate.requisition.status.label();
    let plan = TransitionPlan::new(aggregate, details);
    if recipients.is_empty() {
        return plan;
    }

    plan.notify(
        NotificationIntent::new(template, recipients.into_iter().map(Recipient::User).collect())
            .with("requisition_id", requisition_id)
            .with("status", status),
    )
}
