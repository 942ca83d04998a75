//! Bidding and committee scoring steps that lead up to an award.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    CommitteeScoreSet, CriterionId, ItemScore, Quotation, QuotationId, QuotationStatus, QuoteItem,
    QuoteItemId, Requisition, RequisitionAggregate, RequisitionStatus, UserId, VendorId,
};
use super::evaluation::{CriterionCategory, EvaluationCriteria};
use super::repository::{NotificationIntent, Recipient};
use super::transition::{require_status, set_status, Action, TransitionError, TransitionPlan};

/// Rubric, committees and bidding window fixed when quotations open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiddingTerms {
    pub evaluation_criteria: EvaluationCriteria,
    #[serde(default)]
    pub financial_committee_member_ids: BTreeSet<UserId>,
    #[serde(default)]
    pub technical_committee_member_ids: BTreeSet<UserId>,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub scoring_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotationSubmission {
    pub vendor_id: VendorId,
    pub items: Vec<QuoteItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSubmission {
    #[serde(default)]
    pub committee_comment: Option<String>,
    pub item_scores: Vec<ItemScore>,
}

pub fn open_bidding(
    aggregate: &RequisitionAggregate,
    terms: &BiddingTerms,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, TransitionError> {
    require_status(
        Action::OpenBidding,
        &aggregate.requisition.status,
        &[RequisitionStatus::PreApproved],
    )?;
    terms.evaluation_criteria.validate()?;

    if terms.deadline <= now {
        return Err(TransitionError::DeadlinePassed {
            action: Action::OpenBidding,
            deadline: terms.deadline,
        });
    }
    if terms
        .scoring_deadline
        .map_or(false, |scoring| scoring <= terms.deadline)
    {
        return Err(TransitionError::IncompleteEvaluationData(
            "scoring deadline must fall after the bidding deadline".to_string(),
        ));
    }

    if let Some(member) = terms
        .financial_committee_member_ids
        .intersection(&terms.technical_committee_member_ids)
        .next()
    {
        return Err(TransitionError::IncompleteEvaluationData(format!(
            "{member} cannot sit on both committees"
        )));
    }
    for category in CriterionCategory::ordered() {
        let members = match category {
            CriterionCategory::Financial => &terms.financial_committee_member_ids,
            CriterionCategory::Technical => &terms.technical_committee_member_ids,
        };
        if terms.evaluation_criteria.category_weight(category) > 0.0 && members.is_empty() {
            return Err(TransitionError::IncompleteEvaluationData(format!(
                "{} criteria carry weight but no committee is assigned",
                category.label()
            )));
        }
    }

    let mut next = aggregate.clone();
    let requisition = &mut next.requisition;
    requisition.evaluation_criteria = Some(terms.evaluation_criteria.clone());
    requisition.financial_committee_member_ids = terms.financial_committee_member_ids.clone();
    requisition.technical_committee_member_ids = terms.technical_committee_member_ids.clone();
    requisition.deadline = Some(terms.deadline);
    requisition.scoring_deadline = terms.scoring_deadline;
    set_status(&mut next, RequisitionStatus::AcceptingQuotes, None);

    let details = format!(
        "opened bidding until {} with {} committee member(s)",
        terms.deadline.to_rfc3339(),
        next.requisition.committee_members().count()
    );
    let notice = committee_notice(&next.requisition, "bidding_opened")
        .with("deadline", terms.deadline.to_rfc3339());
    Ok(TransitionPlan::new(next, details).notify(notice))
}

pub fn submit_quotation(
    aggregate: &RequisitionAggregate,
    quotation_id: QuotationId,
    submission: &QuotationSubmission,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, TransitionError> {
    let requisition = &aggregate.requisition;
    require_status(
        Action::SubmitQuotation,
        &requisition.status,
        &[RequisitionStatus::AcceptingQuotes],
    )?;
    if let Some(deadline) = requisition.deadline.filter(|deadline| now >= *deadline) {
        return Err(TransitionError::DeadlinePassed {
            action: Action::SubmitQuotation,
            deadline,
        });
    }
    if aggregate.quotation_by_vendor(&submission.vendor_id).is_some() {
        return Err(TransitionError::DuplicateQuotation(
            submission.vendor_id.clone(),
        ));
    }
    if submission.items.is_empty() {
        return Err(TransitionError::IncompleteEvaluationData(
            "quotation prices no items".to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    for item in &submission.items {
        if requisition.item(&item.requisition_item_id).is_none() {
            return Err(TransitionError::unknown(
                "requisition item",
                item.requisition_item_id.0.clone(),
            ));
        }
        if !seen.insert(&item.id) {
            return Err(TransitionError::IncompleteEvaluationData(format!(
                "quote item {} appears more than once",
                item.id.0
            )));
        }
    }

    let mut next = aggregate.clone();
    next.quotations.push(Quotation {
        id: quotation_id.clone(),
        vendor_id: submission.vendor_id.clone(),
        status: QuotationStatus::Submitted,
        items: submission.items.clone(),
        rank: None,
        final_average_score: None,
        scores: Vec::new(),
        submitted_at: now,
        decline_reason: None,
    });

    let details = format!(
        "{} submitted quotation {} with {} item(s)",
        submission.vendor_id,
        quotation_id.0,
        submission.items.len()
    );
    let recipients = officer(&next.requisition);
    let mut plan = TransitionPlan::new(next, details);
    if !recipients.is_empty() {
        let received = NotificationIntent::new("quotation_received", recipients)
            .with("requisition_id", plan.aggregate.requisition.id.0.clone())
            .with("quotation_id", quotation_id.0);
        plan = plan.notify(received);
    }
    Ok(plan)
}

pub fn start_scoring(
    aggregate: &RequisitionAggregate,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, TransitionError> {
    let requisition = &aggregate.requisition;
    require_status(
        Action::StartScoring,
        &requisition.status,
        &[RequisitionStatus::AcceptingQuotes],
    )?;
    if let Some(deadline) = requisition.deadline.filter(|deadline| now < *deadline) {
        return Err(TransitionError::DeadlineNotReached {
            action: Action::StartScoring,
            deadline,
        });
    }
    if aggregate.quotations.is_empty() {
        return Err(TransitionError::NoEligibleBids);
    }

    let mut next = aggregate.clone();
    set_status(&mut next, RequisitionStatus::ScoringInProgress, None);

    let details = format!("scoring opened for {} quotation(s)", next.quotations.len());
    let notice = committee_notice(&next.requisition, "scoring_started");
    Ok(TransitionPlan::new(next, details).notify(notice))
}

/// Record one committee member's scores for one quotation, replacing an earlier unlocked set.
pub fn submit_scores(
    aggregate: &RequisitionAggregate,
    scorer: &UserId,
    quotation_id: &QuotationId,
    submission: &ScoreSubmission,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, TransitionError> {
    let requisition = &aggregate.requisition;
    require_status(
        Action::SubmitScores,
        &requisition.status,
        &[RequisitionStatus::ScoringInProgress],
    )?;
    if let Some(deadline) = requisition.scoring_deadline.filter(|deadline| now >= *deadline) {
        return Err(TransitionError::DeadlinePassed {
            action: Action::SubmitScores,
            deadline,
        });
    }

    let Some(committee) = requisition.committee_of(scorer) else {
        return Err(TransitionError::Unauthorized {
            actor: scorer.clone(),
            action: Action::SubmitScores,
            current: requisition.status.label(),
            required_role: None,
        });
    };
    let criteria = requisition
        .evaluation_criteria
        .as_ref()
        .ok_or_else(|| {
            TransitionError::IncompleteEvaluationData(
                "requisition has no evaluation criteria".to_string(),
            )
        })?;
    let quotation = aggregate
        .quotation(quotation_id)
        .ok_or_else(|| TransitionError::unknown("quotation", quotation_id.0.clone()))?;

    if quotation.status == QuotationStatus::Declined {
        return Err(quotation_closed(quotation_id, "declined"));
    }
    if quotation.score_set(scorer).map_or(false, |set| set.locked) {
        return Err(quotation_closed(quotation_id, "locked"));
    }

    check_coverage(criteria, committee, quotation, submission)?;

    let score_set = CommitteeScoreSet {
        scorer_id: scorer.clone(),
        committee_comment: submission.committee_comment.clone(),
        item_scores: submission.item_scores.clone(),
        submitted_at: now,
        locked: false,
    };

    let mut next = aggregate.clone();
    if let Some(quotation) = next
        .quotations
        .iter_mut()
        .find(|quotation| &quotation.id == quotation_id)
    {
        match quotation
            .scores
            .iter_mut()
            .find(|set| &set.scorer_id == scorer)
        {
            Some(existing) => *existing = score_set,
            None => quotation.scores.push(score_set),
        }
    }

    let details = format!(
        "{} committee member {scorer} scored quotation {}",
        committee.label(),
        quotation_id.0
    );
    Ok(TransitionPlan::new(next, details))
}

pub fn complete_scoring(aggregate: &RequisitionAggregate) -> Result<TransitionPlan, TransitionError> {
    let requisition = &aggregate.requisition;
    require_status(
        Action::CompleteScoring,
        &requisition.status,
        &[RequisitionStatus::ScoringInProgress],
    )?;
    if requisition.evaluation_criteria.is_none() {
        return Err(TransitionError::IncompleteEvaluationData(
            "requisition has no evaluation criteria".to_string(),
        ));
    }

    let open: Vec<&Quotation> = aggregate
        .quotations
        .iter()
        .filter(|quotation| quotation.status != QuotationStatus::Declined)
        .collect();
    for member in requisition.committee_members() {
        if let Some(missing) = open.iter().find(|quotation| quotation.score_set(member).is_none()) {
            return Err(TransitionError::IncompleteEvaluationData(format!(
                "{member} has not scored quotation {}",
                missing.id.0
            )));
        }
    }

    let mut next = aggregate.clone();
    set_status(&mut next, RequisitionStatus::ScoringComplete, None);

    let details = format!("scoring complete for {} quotation(s)", open.len());
    let recipients = officer(&next.requisition);
    let mut plan = TransitionPlan::new(next, details);
    if !recipients.is_empty() {
        let complete = NotificationIntent::new("scoring_complete", recipients)
            .with("requisition_id", plan.aggregate.requisition.id.0.clone());
        plan = plan.notify(complete);
    }
    Ok(plan)
}

/// Every quote item must carry exactly one in-range score per criterion of the scorer's committee.
fn check_coverage(
    criteria: &EvaluationCriteria,
    committee: CriterionCategory,
    quotation: &Quotation,
    submission: &ScoreSubmission,
) -> Result<(), TransitionError> {
    let expected: BTreeSet<&CriterionId> = criteria
        .criteria(committee)
        .iter()
        .map(|criterion| &criterion.id)
        .collect();
    let mut covered: BTreeMap<&QuoteItemId, BTreeSet<&CriterionId>> = BTreeMap::new();

    for item_score in &submission.item_scores {
        if quotation.item(&item_score.quote_item_id).is_none() {
            return Err(TransitionError::unknown(
                "quote item",
                item_score.quote_item_id.0.clone(),
            ));
        }
        let seen = covered.entry(&item_score.quote_item_id).or_default();

        for score in &item_score.scores {
            if !expected.contains(&score.criterion_id) {
                return Err(TransitionError::IncompleteEvaluationData(format!(
                    "criterion {} is not scored by the {} committee",
                    score.criterion_id.0,
                    committee.label()
                )));
            }
            if !score.score.is_finite() || !(0.0..=100.0).contains(&score.score) {
                return Err(TransitionError::IncompleteEvaluationData(format!(
                    "score {} for criterion {} must lie within 0..=100",
                    score.score, score.criterion_id.0
                )));
            }
            if !seen.insert(&score.criterion_id) {
                return Err(TransitionError::IncompleteEvaluationData(format!(
                    "criterion {} scored twice for quote item {}",
                    score.criterion_id.0, item_score.quote_item_id.0
                )));
            }
        }
    }

    for item in &quotation.items {
        let scored = covered.get(&item.id).map_or(0, BTreeSet::len);
        if scored != expected.len() {
            return Err(TransitionError::IncompleteEvaluationData(format!(
                "quote item {} has {scored} of {} {} scores",
                item.id.0,
                expected.len(),
                committee.label()
            )));
        }
    }

    Ok(())
}

fn quotation_closed(quotation_id: &QuotationId, reason: &str) -> TransitionError {
    TransitionError::InvalidTransition {
        action: Action::SubmitScores,
        current: format!("quotation {} {reason}", quotation_id.0),
        required: vec![QuotationStatus::Submitted.label().to_string()],
    }
}

fn officer(requisition: &Requisition) -> Vec<Recipient> {
    requisition
        .procurement_officer_id
        .iter()
        .cloned()
        .map(Recipient::User)
        .collect()
}

fn committee_notice(requisition: &Requisition, template: &str) -> NotificationIntent {
    NotificationIntent::new(
        template,
        requisition
            .committee_members()
            .cloned()
            .map(Recipient::User)
            .collect(),
    )
    .with("requisition_id", requisition.id.0.clone())
}
