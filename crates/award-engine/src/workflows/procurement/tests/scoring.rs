use super::common::*;

use crate::workflows::procurement::domain::UserId;
use crate::workflows::procurement::evaluation::{
    aggregate_criterion, CriteriaError, CriterionCategory, RawScore, ScoreAggregator,
};

#[test]
fn weighted_item_score_combines_category_averages() {
    let rubric = criteria();
    let aggregator = ScoreAggregator::new(&rubric).expect("rubric is valid");
    let item = quote_item("qi-a1");

    // Financial scorers average 90, technical scorers average 80 on both criteria.
    let sets = vec![
        score_set("fin-1", vec![(item.clone(), vec![("price", 85.0)])]),
        score_set("fin-2", vec![(item.clone(), vec![("price", 95.0)])]),
        score_set(
            "tech-1",
            vec![(item.clone(), vec![("quality", 70.0), ("support", 80.0)])],
        ),
        score_set(
            "tech-2",
            vec![(item.clone(), vec![("quality", 90.0), ("support", 80.0)])],
        ),
    ];

    let breakdown = aggregator.score_item(&item, &sets);

    approx(breakdown.total_financial, 90.0);
    approx(breakdown.total_technical, 80.0);
    approx(breakdown.final_item_score, 84.0);
    assert_eq!(breakdown.financial.len(), 1);
    assert_eq!(breakdown.financial[0].raw_scores.len(), 2);
    approx(breakdown.technical[0].average_score, 80.0);
    approx(breakdown.technical[0].weighted_score, 40.0);
}

#[test]
fn criterion_nobody_scored_counts_as_zero() {
    let rubric = criteria();
    let aggregator = ScoreAggregator::new(&rubric).expect("rubric is valid");
    let item = quote_item("qi-a1");
    let sets = vec![score_set("fin-1", vec![(item.clone(), vec![("price", 100.0)])])];

    let breakdown = aggregator.score_item(&item, &sets);

    approx(breakdown.total_technical, 0.0);
    approx(breakdown.final_item_score, 40.0);
    assert!(breakdown
        .technical
        .iter()
        .all(|criterion| criterion.raw_scores.is_empty()));
}

#[test]
fn scores_for_other_quote_items_are_ignored() {
    let rubric = criteria();
    let aggregator = ScoreAggregator::new(&rubric).expect("rubric is valid");
    let sets = vec![score_set(
        "fin-1",
        vec![
            (quote_item("qi-a1"), vec![("price", 20.0)]),
            (quote_item("qi-a2"), vec![("price", 100.0)]),
        ],
    )];

    let breakdown = aggregator.score_item(&quote_item("qi-a1"), &sets);

    approx(breakdown.total_financial, 20.0);
}

#[test]
fn item_scores_stay_within_bounds() {
    let rubric = criteria();
    let aggregator = ScoreAggregator::new(&rubric).expect("rubric is valid");
    let item = quote_item("qi-a1");
    let marks = [0.0, 12.5, 50.0, 99.9, 100.0];

    for price in marks {
        for quality in marks {
            for support in marks {
                let sets = vec![
                    score_set("fin-1", vec![(item.clone(), vec![("price", price)])]),
                    score_set(
                        "tech-1",
                        vec![(item.clone(), vec![("quality", quality), ("support", support)])],
                    ),
                ];
                let breakdown = aggregator.score_item(&item, &sets);
                assert!(
                    (0.0..=100.0).contains(&breakdown.final_item_score),
                    "score {} escaped bounds for {price}/{quality}/{support}",
                    breakdown.final_item_score
                );
            }
        }
    }
}

#[test]
fn aggregate_criterion_averages_raw_scores() {
    let rubric = criteria();
    let quality = &rubric.technical_criteria[0];
    let raw = vec![
        RawScore {
            scorer_id: UserId("tech-1".to_string()),
            score: 60.0,
            comment: None,
        },
        RawScore {
            scorer_id: UserId("tech-2".to_string()),
            score: 90.0,
            comment: Some("responsive".to_string()),
        },
    ];

    let score = aggregate_criterion(quality, CriterionCategory::Technical, raw);

    approx(score.average_score, 75.0);
    approx(score.weighted_score, 37.5);
    assert_eq!(score.raw_scores.len(), 2);
}

#[test]
fn aggregator_refuses_unbalanced_rubric() {
    let mut rubric = criteria();
    rubric.technical_weight = 50.0;

    match ScoreAggregator::new(&rubric) {
        Err(CriteriaError::CategoryWeights { .. }) => {}
        other => panic!("expected category weight error, got {other:?}"),
    }
}
