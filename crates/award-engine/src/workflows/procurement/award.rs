//! Award finalization, vendor responses and standby promotion.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::approval::ApprovalChainResolver;
use super::domain::{
    AwardStrategy, PerItemAwardDetail, PerItemAwardStatus, QuotationStatus, QuoteItemId,
    Requisition, RequisitionAggregate, RequisitionItemId, RequisitionStatus, UserId, VendorId,
};
use super::evaluation::{
    determine_award, AwardDetermination, Eligibility, ItemRanking, RankingOutcome,
    LAST_STANDBY_RANK,
};
use super::repository::{Directory, NotificationIntent, Recipient};
use super::transition::{
    join_quote_items, require_status, set_status, Action, TransitionError, TransitionPlan,
};

/// Decline reason recorded when a vendor lets the response window lapse.
pub const EXPIRED_REASON: &str = "response deadline expired";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeRequest {
    #[serde(default)]
    pub strategy: AwardStrategy,
    #[serde(default)]
    pub award_response_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum AwardResponse {
    Accept,
    Decline { reason: String },
}

impl AwardResponse {
    pub const fn action(&self) -> Action {
        match self {
            Self::Accept => Action::AcceptAward,
            Self::Decline { .. } => Action::DeclineAward,
        }
    }
}

/// A vendor's answer to an award offer. Without `quote_item_id` it covers every
/// item currently offered to the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorResponse {
    pub vendor_id: VendorId,
    #[serde(default)]
    pub quote_item_id: Option<QuoteItemId>,
    pub response: AwardResponse,
}

/// What happened to an award slot after a decline or expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PromotionOutcome {
    Promoted {
        /// `None` for a single-vendor award.
        requisition_item_id: Option<RequisitionItemId>,
        vendor_id: VendorId,
        quote_item_ids: Vec<QuoteItemId>,
        response_deadline: DateTime<Utc>,
    },
    ExhaustedStandbys {
        requisition_item_id: Option<RequisitionItemId>,
    },
}

pub struct AwardLifecycleController<'a, D: ?Sized> {
    resolver: ApprovalChainResolver<'a, D>,
    response_window: Duration,
}

impl<'a, D> AwardLifecycleController<'a, D>
where
    D: Directory + ?Sized,
{
    pub fn new(resolver: ApprovalChainResolver<'a, D>, response_window: Duration) -> Self {
        Self {
            resolver,
            response_window,
        }
    }

    /// Turn the ranking into an award recommendation and send it into review.
    pub fn finalize(
        &self,
        aggregate: &RequisitionAggregate,
        request: &FinalizeRequest,
        now: DateTime<Utc>,
    ) -> Result<TransitionPlan, TransitionError> {
        require_status(
            Action::Finalize,
            &aggregate.requisition.status,
            &[RequisitionStatus::ScoringComplete],
        )?;
        if let Some(deadline) = request.award_response_deadline.filter(|deadline| *deadline <= now) {
            return Err(TransitionError::DeadlinePassed {
                action: Action::Finalize,
                deadline,
            });
        }

        let outcome = rank(aggregate, &current_eligibility(aggregate))?;
        let mut next = aggregate.clone();
        next.award_details.retain(|detail| detail.status.is_declined());

        for quotation in next.quotations.iter_mut() {
            for set in quotation.scores.iter_mut() {
                set.locked = true;
            }
            let standing = outcome.single_vendor.standing(&quotation.vendor_id);
            quotation.rank = standing.map(|standing| standing.rank);
            quotation.final_average_score = standing.map(|standing| standing.final_vendor_score);
        }

        match request.strategy {
            AwardStrategy::SingleVendor => {
                let winner = outcome
                    .single_vendor
                    .recommended()
                    .ok_or(TransitionError::NoEligibleBids)?;
                for quotation in next
                    .quotations
                    .iter_mut()
                    .filter(|quotation| quotation.status.in_award_play())
                {
                    quotation.status = status_for_rank(quotation.rank);
                }
                next.requisition.awarded_quote_item_ids = winner.champion_quote_item_ids.clone();
            }
            AwardStrategy::PerItem => {
                if outcome.per_item.items.iter().all(|item| item.winner().is_none()) {
                    return Err(TransitionError::NoEligibleBids);
                }
                next.award_details.extend(
                    outcome
                        .per_item
                        .items
                        .iter()
                        .flat_map(|item| detail_rows(item, None)),
                );
                refresh_quotation_statuses(&mut next);
                sync_awarded_items(&mut next);
            }
        }

        next.requisition.award_strategy = request.strategy;
        next.requisition.award_response_deadline = request.award_response_deadline;

        let step = self.resolver.entry_step()?;
        set_status(&mut next, step.status, step.approver_id);

        let details = format!(
            "finalized {} award recommending {}; now {}",
            request.strategy.label(),
            join_quote_items(&next.requisition.awarded_quote_item_ids),
            next.requisition.status
        );
        let mut plan = TransitionPlan::new(next, details);
        if !step.notify.is_empty() {
            let review = notice(&plan.aggregate.requisition, "award_review_requested", users(step.notify));
            plan = plan.notify(review);
        }
        Ok(plan)
    }

    /// Publish the approved award to the winning vendors and start their response window.
    pub fn release(
        &self,
        aggregate: &RequisitionAggregate,
        now: DateTime<Utc>,
    ) -> Result<TransitionPlan, TransitionError> {
        require_status(
            Action::ReleaseAward,
            &aggregate.requisition.status,
            &[RequisitionStatus::PostApproved],
        )?;

        let deadline = match aggregate.requisition.award_response_deadline {
            Some(deadline) if deadline > now => deadline,
            _ => now + self.response_window,
        };

        let mut next = aggregate.clone();
        let vendors: Vec<VendorId> = match next.requisition.award_strategy {
            AwardStrategy::SingleVendor => next
                .quotations
                .iter()
                .filter(|quotation| quotation.status == QuotationStatus::Awarded)
                .map(|quotation| quotation.vendor_id.clone())
                .collect(),
            AwardStrategy::PerItem => {
                let mut vendors = BTreeSet::new();
                for detail in next
                    .award_details
                    .iter_mut()
                    .filter(|detail| detail.status == PerItemAwardStatus::Awarded)
                {
                    detail.response_deadline = Some(deadline);
                    vendors.insert(detail.vendor_id.clone());
                }
                vendors.into_iter().collect()
            }
        };
        if vendors.is_empty() {
            return Err(TransitionError::NoEligibleBids);
        }

        next.requisition.award_response_deadline = Some(deadline);
        set_status(&mut next, RequisitionStatus::Awarded, None);

        let details = format!(
            "released award to {}; responses due {}",
            vendors.iter().map(|vendor| vendor.0.as_str()).collect::<Vec<_>>().join(","),
            deadline.to_rfc3339()
        );
        let offer = notice(
            &next.requisition,
            "award_offered",
            vendors.into_iter().map(Recipient::Vendor).collect(),
        )
        .with("response_deadline", deadline.to_rfc3339());
        Ok(TransitionPlan::new(next, details).notify(offer))
    }

    /// Record a vendor's accept or decline, promoting standbys on a decline.
    pub fn respond(
        &self,
        aggregate: &RequisitionAggregate,
        response: &VendorResponse,
        now: DateTime<Utc>,
    ) -> Result<TransitionPlan, TransitionError> {
        match aggregate.requisition.award_strategy {
            AwardStrategy::SingleVendor => self.respond_single(aggregate, response, now),
            AwardStrategy::PerItem => self.respond_per_item(aggregate, response, now),
        }
    }

    /// Treat every award whose response window lapsed as declined.
    pub fn expire_responses(
        &self,
        aggregate: &RequisitionAggregate,
        now: DateTime<Utc>,
    ) -> Result<TransitionPlan, TransitionError> {
        let status = &aggregate.requisition.status;
        match aggregate.requisition.award_strategy {
            AwardStrategy::SingleVendor => {
                require_status(Action::ExpireResponses, status, &[RequisitionStatus::Awarded])?;
                let vendor = aggregate
                    .quotations
                    .iter()
                    .find(|quotation| quotation.status == QuotationStatus::Awarded)
                    .map(|quotation| quotation.vendor_id.clone());
                let (Some(vendor), Some(deadline)) =
                    (vendor, aggregate.requisition.award_response_deadline)
                else {
                    return Err(no_open_offer(Action::ExpireResponses, status));
                };
                if now <= deadline {
                    return Err(TransitionError::DeadlineNotReached {
                        action: Action::ExpireResponses,
                        deadline,
                    });
                }

                let mut next = aggregate.clone();
                let promotions = self.decline_single(&mut next, &vendor, EXPIRED_REASON, now)?;
                let details = format!("award to {vendor} expired at {}", deadline.to_rfc3339());
                Ok(self.decline_plan(next, details, vec![vendor], promotions))
            }
            AwardStrategy::PerItem => {
                require_status(
                    Action::ExpireResponses,
                    status,
                    &[RequisitionStatus::Awarded, RequisitionStatus::PartiallyClosed],
                )?;
                let expired: Vec<usize> = aggregate
                    .award_details
                    .iter()
                    .enumerate()
                    .filter(|(_, detail)| {
                        detail.status == PerItemAwardStatus::Awarded
                            && detail.response_deadline.map_or(false, |deadline| now > deadline)
                    })
                    .map(|(index, _)| index)
                    .collect();

                if expired.is_empty() {
                    let earliest = aggregate
                        .award_details
                        .iter()
                        .filter(|detail| detail.status == PerItemAwardStatus::Awarded)
                        .filter_map(|detail| detail.response_deadline)
                        .min();
                    return Err(match earliest {
                        Some(deadline) => TransitionError::DeadlineNotReached {
                            action: Action::ExpireResponses,
                            deadline,
                        },
                        None => no_open_offer(Action::ExpireResponses, status),
                    });
                }

                let mut next = aggregate.clone();
                let vendors = expired
                    .iter()
                    .map(|index| next.award_details[*index].vendor_id.clone())
                    .collect::<BTreeSet<_>>();
                let promotions = self.decline_rows(&mut next, &expired, EXPIRED_REASON, now)?;
                settle_per_item(&mut next);
                let details = format!(
                    "{} per-item award(s) expired; now {}",
                    expired.len(),
                    next.requisition.status
                );
                Ok(self.decline_plan(next, details, vendors.into_iter().collect(), promotions))
            }
        }
    }

    /// Send the standing award back through the review chain unchanged.
    pub fn reopen_for_review(
        &self,
        aggregate: &RequisitionAggregate,
    ) -> Result<TransitionPlan, TransitionError> {
        require_status(
            Action::ReopenForReview,
            &aggregate.requisition.status,
            &[RequisitionStatus::AwardDeclined, RequisitionStatus::ProcurementReview],
        )?;

        let standing = match aggregate.requisition.award_strategy {
            AwardStrategy::SingleVendor => aggregate.quotations.iter().any(|quotation| {
                matches!(
                    quotation.status,
                    QuotationStatus::Awarded | QuotationStatus::Accepted
                )
            }),
            AwardStrategy::PerItem => aggregate.award_details.iter().any(|detail| {
                matches!(
                    detail.status,
                    PerItemAwardStatus::Awarded | PerItemAwardStatus::Accepted
                )
            }),
        };
        if !standing {
            return Err(TransitionError::NoEligibleBids);
        }

        let step = self.resolver.entry_step()?;
        let mut next = aggregate.clone();
        set_status(&mut next, step.status, step.approver_id);

        let details = format!(
            "reopened award {} for review; now {}",
            join_quote_items(&next.requisition.awarded_quote_item_ids),
            next.requisition.status
        );
        let mut plan = TransitionPlan::new(next, details);
        if !step.notify.is_empty() {
            let review = notice(&plan.aggregate.requisition, "award_review_requested", users(step.notify));
            plan = plan.notify(review);
        }
        Ok(plan)
    }

    /// Discard the award outcome and reopen committee scoring.
    pub fn restart_scoring(
        &self,
        aggregate: &RequisitionAggregate,
    ) -> Result<TransitionPlan, TransitionError> {
        require_status(
            Action::RestartScoring,
            &aggregate.requisition.status,
            &[RequisitionStatus::AwardDeclined, RequisitionStatus::ProcurementReview],
        )?;

        let mut next = aggregate.clone();
        // Declined (item, vendor) pairs survive so the next ranking still skips them.
        next.award_details.retain(|detail| detail.status.is_declined());
        next.requisition.awarded_quote_item_ids.clear();
        next.requisition.award_response_deadline = None;
        for quotation in next.quotations.iter_mut() {
            if quotation.status.in_award_play() {
                quotation.status = QuotationStatus::Submitted;
            }
            quotation.rank = None;
            quotation.final_average_score = None;
            for set in quotation.scores.iter_mut() {
                set.locked = false;
            }
        }
        set_status(&mut next, RequisitionStatus::ScoringInProgress, None);

        let committee: Vec<UserId> = next.requisition.committee_members().cloned().collect();
        let details = format!(
            "cleared award outcome; scoring reopened for {} quotation(s)",
            next.quotations.len()
        );
        let mut plan = TransitionPlan::new(next, details);
        if !committee.is_empty() {
            let reopened = notice(&plan.aggregate.requisition, "scoring_reopened", users(committee));
            plan = plan.notify(reopened);
        }
        Ok(plan)
    }

    fn respond_single(
        &self,
        aggregate: &RequisitionAggregate,
        response: &VendorResponse,
        now: DateTime<Utc>,
    ) -> Result<TransitionPlan, TransitionError> {
        let action = response.response.action();
        require_status(action, &aggregate.requisition.status, &[RequisitionStatus::Awarded])?;

        let vendor = &response.vendor_id;
        let offered = aggregate
            .quotation_by_vendor(vendor)
            .map_or(false, |quotation| quotation.status == QuotationStatus::Awarded);
        if !offered {
            return Err(TransitionError::unknown("award offer", vendor.0.clone()));
        }

        let mut next = aggregate.clone();
        match &response.response {
            AwardResponse::Accept => {
                if let Some(deadline) = aggregate
                    .requisition
                    .award_response_deadline
                    .filter(|deadline| now > *deadline)
                {
                    return Err(TransitionError::DeadlinePassed { action, deadline });
                }
                if let Some(quotation) = next.quotation_by_vendor_mut(vendor) {
                    quotation.status = QuotationStatus::Accepted;
                }
                set_status(&mut next, RequisitionStatus::Closed, None);

                let details = format!(
                    "{vendor} accepted award {}; now {}",
                    join_quote_items(&next.requisition.awarded_quote_item_ids),
                    next.requisition.status
                );
                let accepted = notice(&next.requisition, "award_accepted", officer(&next.requisition))
                    .with("vendor_id", vendor.0.clone());
                Ok(TransitionPlan::new(next, details).notify(accepted))
            }
            AwardResponse::Decline { reason } => {
                let promotions = self.decline_single(&mut next, vendor, reason, now)?;
                let details = format!("{vendor} declined award: {reason}");
                Ok(self.decline_plan(next, details, vec![vendor.clone()], promotions))
            }
        }
    }

    fn respond_per_item(
        &self,
        aggregate: &RequisitionAggregate,
        response: &VendorResponse,
        now: DateTime<Utc>,
    ) -> Result<TransitionPlan, TransitionError> {
        let action = response.response.action();
        require_status(
            action,
            &aggregate.requisition.status,
            &[RequisitionStatus::Awarded, RequisitionStatus::PartiallyClosed],
        )?;

        let vendor = &response.vendor_id;
        let targets: Vec<usize> = aggregate
            .award_details
            .iter()
            .enumerate()
            .filter(|(_, detail)| {
                &detail.vendor_id == vendor
                    && detail.status == PerItemAwardStatus::Awarded
                    && response
                        .quote_item_id
                        .as_ref()
                        .map_or(true, |id| id == &detail.quote_item_id)
            })
            .map(|(index, _)| index)
            .collect();
        if targets.is_empty() {
            let id = response
                .quote_item_id
                .as_ref()
                .map_or_else(|| vendor.0.clone(), |id| id.0.clone());
            return Err(TransitionError::unknown("award offer", id));
        }

        let mut next = aggregate.clone();
        let quote_items: Vec<QuoteItemId> = targets
            .iter()
            .map(|index| next.award_details[*index].quote_item_id.clone())
            .collect();

        match &response.response {
            AwardResponse::Accept => {
                for index in &targets {
                    let detail = &mut next.award_details[*index];
                    if let Some(deadline) = detail.response_deadline.filter(|deadline| now > *deadline) {
                        return Err(TransitionError::DeadlinePassed { action, deadline });
                    }
                    detail.status = PerItemAwardStatus::Accepted;
                }
                refresh_quotation_statuses(&mut next);
                settle_per_item(&mut next);

                let details = format!(
                    "{vendor} accepted {}; now {}",
                    join_quote_items(&quote_items),
                    next.requisition.status
                );
                let accepted = notice(&next.requisition, "award_accepted", officer(&next.requisition))
                    .with("vendor_id", vendor.0.clone())
                    .with("quote_item_ids", join_quote_items(&quote_items));
                Ok(TransitionPlan::new(next, details).notify(accepted))
            }
            AwardResponse::Decline { reason } => {
                let promotions = self.decline_rows(&mut next, &targets, reason, now)?;
                settle_per_item(&mut next);
                let details = format!(
                    "{vendor} declined {}: {reason}; now {}",
                    join_quote_items(&quote_items),
                    next.requisition.status
                );
                Ok(self.decline_plan(next, details, vec![vendor.clone()], promotions))
            }
        }
    }

    /// Decline the vendor's whole quotation and award the next best eligible vendor.
    fn decline_single(
        &self,
        next: &mut RequisitionAggregate,
        vendor: &VendorId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<PromotionOutcome>, TransitionError> {
        if let Some(quotation) = next.quotation_by_vendor_mut(vendor) {
            quotation.status = QuotationStatus::Declined;
            quotation.decline_reason = Some(reason.to_string());
            quotation.rank = None;
        }

        let outcome = rank(next, &current_eligibility(next))?;
        let Some(winner) = outcome.single_vendor.recommended() else {
            next.requisition.awarded_quote_item_ids.clear();
            next.requisition.award_response_deadline = None;
            set_status(next, RequisitionStatus::AwardDeclined, None);
            return Ok(vec![PromotionOutcome::ExhaustedStandbys {
                requisition_item_id: None,
            }]);
        };

        let deadline = now + self.response_window;
        for quotation in next
            .quotations
            .iter_mut()
            .filter(|quotation| quotation.status.in_award_play())
        {
            let standing = outcome.single_vendor.standing(&quotation.vendor_id);
            quotation.rank = standing.map(|standing| standing.rank);
            quotation.final_average_score = standing.map(|standing| standing.final_vendor_score);
            quotation.status = status_for_rank(quotation.rank);
        }
        next.requisition.awarded_quote_item_ids = winner.champion_quote_item_ids.clone();
        next.requisition.award_response_deadline = Some(deadline);
        set_status(next, RequisitionStatus::Awarded, None);

        Ok(vec![PromotionOutcome::Promoted {
            requisition_item_id: None,
            vendor_id: winner.vendor_id.clone(),
            quote_item_ids: winner.champion_quote_item_ids.clone(),
            response_deadline: deadline,
        }])
    }

    /// Decline the given per-item rows and re-rank each affected item.
    fn decline_rows(
        &self,
        next: &mut RequisitionAggregate,
        rows: &[usize],
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<PromotionOutcome>, TransitionError> {
        let mut items = BTreeSet::new();
        for index in rows {
            let detail = &mut next.award_details[*index];
            detail.status = PerItemAwardStatus::Declined;
            detail.decline_reason = Some(reason.to_string());
            items.insert(detail.requisition_item_id.clone());
        }
        let declined: Vec<(RequisitionItemId, VendorId)> = rows
            .iter()
            .map(|index| {
                let detail = &next.award_details[*index];
                (detail.requisition_item_id.clone(), detail.vendor_id.clone())
            })
            .collect();

        let outcome = rank(next, &current_eligibility(next))?;
        let deadline = now + self.response_window;

        let mut promotions = Vec::new();
        for item in items {
            next.award_details.retain(|detail| {
                !(detail.requisition_item_id == item && detail.status == PerItemAwardStatus::Standby)
            });

            let ranking = outcome.per_item.item(&item);
            match ranking.and_then(ItemRanking::winner) {
                Some(winner) => {
                    promotions.push(PromotionOutcome::Promoted {
                        requisition_item_id: Some(item.clone()),
                        vendor_id: winner.vendor_id.clone(),
                        quote_item_ids: vec![winner.quote_item_id.clone()],
                        response_deadline: deadline,
                    });
                    if let Some(ranking) = ranking {
                        next.award_details.extend(detail_rows(ranking, Some(deadline)));
                    }
                }
                None => {
                    for detail in next.award_details.iter_mut().filter(|detail| {
                        detail.status == PerItemAwardStatus::Declined
                            && declined.contains(&(
                                detail.requisition_item_id.clone(),
                                detail.vendor_id.clone(),
                            ))
                            && detail.requisition_item_id == item
                    }) {
                        detail.status = PerItemAwardStatus::FailedToAward;
                    }
                    promotions.push(PromotionOutcome::ExhaustedStandbys {
                        requisition_item_id: Some(item),
                    });
                }
            }
        }

        refresh_quotation_statuses(next);
        Ok(promotions)
    }

    fn decline_plan(
        &self,
        next: RequisitionAggregate,
        details: String,
        declined_by: Vec<VendorId>,
        promotions: Vec<PromotionOutcome>,
    ) -> TransitionPlan {
        let declined = notice(&next.requisition, "award_declined", officer(&next.requisition)).with(
            "vendor_ids",
            declined_by.iter().map(|vendor| vendor.0.as_str()).collect::<Vec<_>>().join(","),
        );
        let mut notifications = vec![declined];

        for promotion in &promotions {
            match promotion {
                PromotionOutcome::Promoted {
                    vendor_id,
                    quote_item_ids,
                    response_deadline,
                    ..
                } => notifications.push(
                    notice(&next.requisition, "award_offered", vec![Recipient::Vendor(vendor_id.clone())])
                        .with("quote_item_ids", join_quote_items(quote_item_ids))
                        .with("response_deadline", response_deadline.to_rfc3339()),
                ),
                PromotionOutcome::ExhaustedStandbys { requisition_item_id } => notifications.push(
                    notice(&next.requisition, "award_standbys_exhausted", officer(&next.requisition))
                        .with(
                            "requisition_item_id",
                            requisition_item_id
                                .as_ref()
                                .map_or_else(String::new, |item| item.0.clone()),
                        ),
                ),
            }
        }

        let mut plan = TransitionPlan::new(next, details);
        plan.notifications = notifications;
        plan.promotions = promotions;
        plan
    }
}

/// Bids still in the running: declined quotations and declined per-item offers are out.
pub fn current_eligibility(aggregate: &RequisitionAggregate) -> Eligibility {
    let mut eligibility = Eligibility::default();
    for detail in aggregate
        .award_details
        .iter()
        .filter(|detail| detail.status.is_declined())
    {
        eligibility.exclude_item_bid(detail.requisition_item_id.clone(), detail.vendor_id.clone());
    }
    eligibility
}

fn rank(
    aggregate: &RequisitionAggregate,
    eligibility: &Eligibility,
) -> Result<RankingOutcome, TransitionError> {
    match determine_award(&aggregate.requisition, &aggregate.quotations, eligibility)? {
        AwardDetermination::Ranked(outcome) => Ok(outcome),
        AwardDetermination::Unavailable => Err(TransitionError::IncompleteEvaluationData(
            "requisition has no evaluation criteria".to_string(),
        )),
    }
}

fn status_for_rank(rank: Option<u32>) -> QuotationStatus {
    match rank {
        Some(1) => QuotationStatus::Awarded,
        Some(rank) if rank <= LAST_STANDBY_RANK => QuotationStatus::Standby,
        _ => QuotationStatus::Submitted,
    }
}

/// Winner and standby rows for one item; ranks past the standby cut-off are not materialized.
fn detail_rows(ranking: &ItemRanking, deadline: Option<DateTime<Utc>>) -> Vec<PerItemAwardDetail> {
    ranking
        .bids()
        .iter()
        .take(LAST_STANDBY_RANK as usize)
        .map(|bid| {
            let winner = bid.rank == 1;
            PerItemAwardDetail {
                requisition_item_id: ranking.requisition_item_id().clone(),
                vendor_id: bid.vendor_id.clone(),
                quote_item_id: bid.quote_item_id.clone(),
                status: if winner {
                    PerItemAwardStatus::Awarded
                } else {
                    PerItemAwardStatus::Standby
                },
                rank: bid.rank,
                decline_reason: None,
                response_deadline: if winner { deadline } else { None },
            }
        })
        .collect()
}

/// Derive each quotation's status from its per-item rows.
fn refresh_quotation_statuses(aggregate: &mut RequisitionAggregate) {
    let RequisitionAggregate {
        quotations,
        award_details,
        ..
    } = aggregate;

    for quotation in quotations
        .iter_mut()
        .filter(|quotation| quotation.status.in_award_play())
    {
        let rows: Vec<&PerItemAwardDetail> = award_details
            .iter()
            .filter(|detail| detail.vendor_id == quotation.vendor_id)
            .collect();
        let with_status = |status: PerItemAwardStatus| {
            rows.iter()
                .filter(move |detail| detail.status == status)
                .map(|detail| &detail.requisition_item_id)
                .collect::<BTreeSet<_>>()
        };
        let awarded = with_status(PerItemAwardStatus::Awarded);
        let accepted = with_status(PerItemAwardStatus::Accepted);
        let standby = !with_status(PerItemAwardStatus::Standby).is_empty();

        let status = if awarded.is_empty() && !accepted.is_empty() {
            QuotationStatus::Accepted
        } else if !awarded.is_empty() {
            let won: BTreeSet<&RequisitionItemId> = awarded.union(&accepted).copied().collect();
            if quotation.requisition_item_ids().is_subset(&won) {
                QuotationStatus::Awarded
            } else {
                QuotationStatus::PartiallyAwarded
            }
        } else if standby {
            QuotationStatus::Standby
        } else {
            QuotationStatus::Submitted
        };
        quotation.status = status;
    }
}

fn sync_awarded_items(aggregate: &mut RequisitionAggregate) {
    aggregate.requisition.awarded_quote_item_ids = aggregate
        .award_details
        .iter()
        .filter(|detail| {
            matches!(
                detail.status,
                PerItemAwardStatus::Awarded | PerItemAwardStatus::Accepted
            )
        })
        .map(|detail| detail.quote_item_id.clone())
        .collect();
}

/// Requisition status after per-item responses: closed once every item is resolved.
fn settle_per_item(aggregate: &mut RequisitionAggregate) {
    sync_awarded_items(aggregate);

    let mut any_accepted = false;
    let mut outstanding = false;
    for item in &aggregate.requisition.items {
        let rows: Vec<&PerItemAwardDetail> = aggregate.details_for_item(&item.id).collect();
        if rows.iter().any(|detail| detail.status == PerItemAwardStatus::Accepted) {
            any_accepted = true;
        } else if rows.iter().any(|detail| detail.status == PerItemAwardStatus::Awarded) {
            outstanding = true;
        }
    }

    aggregate.requisition.award_response_deadline = aggregate
        .award_details
        .iter()
        .filter(|detail| detail.status == PerItemAwardStatus::Awarded)
        .filter_map(|detail| detail.response_deadline)
        .min();

    let status = match (outstanding, any_accepted) {
        (false, true) => RequisitionStatus::Closed,
        (false, false) => RequisitionStatus::AwardDeclined,
        (true, true) => RequisitionStatus::PartiallyClosed,
        (true, false) => RequisitionStatus::Awarded,
    };
    set_status(aggregate, status, None);
}

fn no_open_offer(action: Action, status: &RequisitionStatus) -> TransitionError {
    TransitionError::InvalidTransition {
        action,
        current: format!("{status} without an open award offer"),
        required: vec![RequisitionStatus::Awarded.label()],
    }
}

fn users(ids: Vec<UserId>) -> Vec<Recipient> {
    ids.into_iter().map(Recipient::User).collect()
}

fn officer(requisition: &Requisition) -> Vec<Recipient> {
    requisition
        .procurement_officer_id
        .iter()
        .cloned()
        .map(Recipient::User)
        .collect()
}

fn notice(requisition: &Requisition, template: &str, recipients: Vec<Recipient>) -> NotificationIntent {
    NotificationIntent::new(template, recipients)
        .with("requisition_id", requisition.id.0.clone())
        .with("status", requisition.status.label())
}
