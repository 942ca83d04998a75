use serde::{Deserialize, Serialize};

use super::super::domain::{CommitteeScoreSet, CriterionId, QuoteItemId, UserId};
use super::criteria::{Criterion, CriterionCategory, EvaluationCriteria};

/// A single scorer's raw mark, kept for audit trails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawScore {
    pub scorer_id: UserId,
    pub score: f64,
    pub comment: Option<String>,
}

/// Averaged and weighted result for one criterion on one quote item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion_id: CriterionId,
    pub name: String,
    pub category: CriterionCategory,
    pub weight: f64,
    pub average_score: f64,
    pub weighted_score: f64,
    pub raw_scores: Vec<RawScore>,
}

/// Full scoring trail for one quote item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemScoreBreakdown {
    pub quote_item_id: QuoteItemId,
    pub financial: Vec<CriterionScore>,
    pub technical: Vec<CriterionScore>,
    pub total_financial: f64,
    pub total_technical: f64,
    pub final_item_score: f64,
}

pub fn aggregate_criterion(
    criterion: &Criterion,
    category: CriterionCategory,
    raw_scores: Vec<RawScore>,
) -> CriterionScore {
    let average_score = if raw_scores.is_empty() {
        0.0
    } else {
        raw_scores.iter().map(|raw| raw.score).sum::<f64>() / raw_scores.len() as f64
    };

    CriterionScore {
        criterion_id: criterion.id.clone(),
        name: criterion.name.clone(),
        category,
        weight: criterion.weight,
        average_score,
        weighted_score: apply_weight(average_score, criterion.weight),
        raw_scores,
    }
}

pub(crate) fn score_item(
    criteria: &EvaluationCriteria,
    quote_item_id: &QuoteItemId,
    score_sets: &[CommitteeScoreSet],
) -> ItemScoreBreakdown {
    let financial = score_category(
        criteria,
        CriterionCategory::Financial,
        quote_item_id,
        score_sets,
    );
    let technical = score_category(
        criteria,
        CriterionCategory::Technical,
        quote_item_id,
        score_sets,
    );

    let total_financial: f64 = financial.iter().map(|score| score.weighted_score).sum();
    let total_technical: f64 = technical.iter().map(|score| score.weighted_score).sum();
    let final_item_score = apply_weight(total_financial, criteria.financial_weight)
        + apply_weight(total_technical, criteria.technical_weight);

    ItemScoreBreakdown {
        quote_item_id: quote_item_id.clone(),
        financial,
        technical,
        total_financial,
        total_technical,
        final_item_score,
    }
}

fn score_category(
    criteria: &EvaluationCriteria,
    category: CriterionCategory,
    quote_item_id: &QuoteItemId,
    score_sets: &[CommitteeScoreSet],
) -> Vec<CriterionScore> {
    criteria
        .criteria(category)
        .iter()
        .map(|criterion| {
            let raw_scores = collect_raw_scores(&criterion.id, quote_item_id, score_sets);
            aggregate_criterion(criterion, category, raw_scores)
        })
        .collect()
}

fn collect_raw_scores(
    criterion_id: &CriterionId,
    quote_item_id: &QuoteItemId,
    score_sets: &[CommitteeScoreSet],
) -> Vec<RawScore> {
    score_sets
        .iter()
        .flat_map(|set| {
            set.scores_for(quote_item_id)
                .filter(move |score| &score.criterion_id == criterion_id)
                .map(move |score| RawScore {
                    scorer_id: set.scorer_id.clone(),
                    score: score.score,
                    comment: score.comment.clone(),
                })
        })
        .collect()
}

// Multiply before dividing so whole-number inputs stay exact.
fn apply_weight(value: f64, weight: f64) -> f64 {
    value * weight / 100.0
}
