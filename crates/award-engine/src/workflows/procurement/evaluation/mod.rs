//! Committee scoring and bid ranking.
//!
//! Raw per-criterion scores are reduced into weighted item scores by the [`ScoreAggregator`];
//! [`determine_award`] feeds those into the ranking engine to produce both award views.

mod aggregate;
mod criteria;
mod ranking;

pub use aggregate::{aggregate_criterion, CriterionScore, ItemScoreBreakdown, RawScore};
pub use criteria::{Criterion, CriterionCategory, CriteriaError, EvaluationCriteria, WEIGHT_TOLERANCE};
pub use ranking::{
    ChampionBid, Eligibility, ItemChampions, ItemRanking, PerItemView, RankedBid, RankingOutcome,
    SingleVendorView, VendorStanding, LAST_STANDBY_RANK,
};

use serde::Serialize;

use super::domain::{CommitteeScoreSet, Quotation, QuoteItemId, Requisition};

/// Scores quote items against a rubric that has already passed validation.
#[derive(Debug, Clone, Copy)]
pub struct ScoreAggregator<'a> {
    criteria: &'a EvaluationCriteria,
}

impl<'a> ScoreAggregator<'a> {
    pub fn new(criteria: &'a EvaluationCriteria) -> Result<Self, CriteriaError> {
        criteria.validate()?;
        Ok(Self { criteria })
    }

    pub fn criteria(&self) -> &'a EvaluationCriteria {
        self.criteria
    }

    pub fn score_item(
        &self,
        quote_item_id: &QuoteItemId,
        score_sets: &[CommitteeScoreSet],
    ) -> ItemScoreBreakdown {
        aggregate::score_item(self.criteria, quote_item_id, score_sets)
    }
}

/// Result of asking for an award recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "determination", content = "outcome", rename_all = "snake_case")]
pub enum AwardDetermination {
    /// The requisition carries no evaluation criteria, so nothing was calculated.
    Unavailable,
    Ranked(RankingOutcome),
}

impl AwardDetermination {
    pub fn ranked(self) -> Option<RankingOutcome> {
        match self {
            Self::Ranked(outcome) => Some(outcome),
            Self::Unavailable => None,
        }
    }
}

/// Rank every eligible bid on the requisition under both award strategies.
pub fn determine_award(
    requisition: &Requisition,
    quotations: &[Quotation],
    eligibility: &Eligibility,
) -> Result<AwardDetermination, CriteriaError> {
    let Some(criteria) = requisition.evaluation_criteria.as_ref() else {
        return Ok(AwardDetermination::Unavailable);
    };

    let aggregator = ScoreAggregator::new(criteria)?;
    Ok(AwardDetermination::Ranked(ranking::rank_bids(
        &aggregator,
        requisition,
        quotations,
        eligibility,
    )))
}
