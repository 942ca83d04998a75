use super::common::*;

use crate::workflows::procurement::domain::{QuotationStatus, RequisitionAggregate};
use crate::workflows::procurement::evaluation::{
    determine_award, AwardDetermination, Eligibility, ItemRanking, RankingOutcome,
};

fn ranked(aggregate: &RequisitionAggregate, eligibility: &Eligibility) -> RankingOutcome {
    match determine_award(&aggregate.requisition, &aggregate.quotations, eligibility) {
        Ok(AwardDetermination::Ranked(outcome)) => outcome,
        other => panic!("expected ranking, got {other:?}"),
    }
}

#[test]
fn single_vendor_view_ranks_by_mean_item_score() {
    // A: one item at 84. B: 70 and 90, averaging 80.
    let aggregate = scored_aggregate(
        &["item-1", "item-2"],
        vec![
            scored_quotation("vendor-a", 1, &[bid("qi-a1", "item-1", 90.0, 80.0)]),
            scored_quotation(
                "vendor-b",
                2,
                &[
                    flat_bid("qi-b1", "item-1", 70.0),
                    flat_bid("qi-b2", "item-2", 90.0),
                ],
            ),
        ],
    );

    let outcome = ranked(&aggregate, &Eligibility::default());
    let standings = &outcome.single_vendor.standings;

    assert_eq!(standings.len(), 2);
    assert_eq!(standings[0].vendor_id, vendor("vendor-a"));
    assert_eq!(standings[0].rank, 1);
    approx(standings[0].final_vendor_score, 84.0);
    assert_eq!(standings[1].vendor_id, vendor("vendor-b"));
    assert_eq!(standings[1].rank, 2);
    approx(standings[1].final_vendor_score, 80.0);
    assert_eq!(standings[1].items_bid, 2);
    assert_eq!(
        standings[1].champion_quote_item_ids,
        vec![quote_item("qi-b1"), quote_item("qi-b2")]
    );
}

#[test]
fn per_item_view_ranks_each_item_independently() {
    let aggregate = scored_aggregate(
        &["item-1", "item-2"],
        vec![
            scored_quotation("vendor-a", 1, &[bid("qi-a1", "item-1", 90.0, 80.0)]),
            scored_quotation(
                "vendor-b",
                2,
                &[
                    flat_bid("qi-b1", "item-1", 70.0),
                    flat_bid("qi-b2", "item-2", 90.0),
                ],
            ),
        ],
    );

    let outcome = ranked(&aggregate, &Eligibility::default());

    let first = outcome.per_item.item(&req_item("item-1")).expect("item-1 ranked");
    let winner = first.winner().expect("item-1 has a winner");
    assert_eq!(winner.vendor_id, vendor("vendor-a"));
    approx(winner.final_item_score, 84.0);
    assert_eq!(first.standbys().len(), 1);
    assert_eq!(first.standbys()[0].vendor_id, vendor("vendor-b"));
    assert_eq!(first.standbys()[0].rank, 2);

    let second = outcome.per_item.item(&req_item("item-2")).expect("item-2 ranked");
    assert_eq!(
        second.winner().map(|bid| bid.quote_item_id.clone()),
        Some(quote_item("qi-b2"))
    );
    assert!(second.standbys().is_empty());
}

#[test]
fn standbys_stop_at_third_rank() {
    let outcome = ranked(&four_way_aggregate(), &Eligibility::default());
    let item = outcome.per_item.item(&req_item("item-1")).expect("item ranked");

    assert_eq!(item.bids().len(), 4);
    let standby_ranks: Vec<u32> = item.standbys().iter().map(|bid| bid.rank).collect();
    assert_eq!(standby_ranks, vec![2, 3]);
    assert_eq!(item.bids()[3].vendor_id, vendor("vendor-d"));
}

#[test]
fn best_alternate_represents_the_vendor() {
    let aggregate = scored_aggregate(
        &["item-1"],
        vec![scored_quotation(
            "vendor-a",
            1,
            &[
                flat_bid("qi-a1", "item-1", 60.0),
                flat_bid("qi-a1-alt", "item-1", 80.0),
            ],
        )],
    );

    let outcome = ranked(&aggregate, &Eligibility::default());
    let champion = &outcome.champions[0].champions[0];

    assert_eq!(champion.quote_item_id, quote_item("qi-a1-alt"));
    assert_eq!(champion.alternates_considered, 2);
    approx(champion.final_item_score, 80.0);
}

#[test]
fn tied_alternates_keep_the_first_listed() {
    let aggregate = scored_aggregate(
        &["item-1"],
        vec![scored_quotation(
            "vendor-a",
            1,
            &[
                flat_bid("qi-a1", "item-1", 75.0),
                flat_bid("qi-a1-alt", "item-1", 75.0),
            ],
        )],
    );

    for _ in 0..5 {
        let outcome = ranked(&aggregate, &Eligibility::default());
        assert_eq!(
            outcome.champions[0].champions[0].quote_item_id,
            quote_item("qi-a1")
        );
    }
}

#[test]
fn tied_vendors_favor_the_earlier_submission() {
    // Listed out of submission order on purpose.
    let aggregate = scored_aggregate(
        &["item-1"],
        vec![
            scored_quotation("vendor-a", 30, &[flat_bid("qi-a1", "item-1", 75.0)]),
            scored_quotation("vendor-b", 5, &[flat_bid("qi-b1", "item-1", 75.0)]),
        ],
    );

    for _ in 0..5 {
        let outcome = ranked(&aggregate, &Eligibility::default());
        let recommended = outcome.single_vendor.recommended().expect("someone wins");
        assert_eq!(recommended.vendor_id, vendor("vendor-b"));
        let winner = outcome.per_item.items[0].winner().expect("item won");
        assert_eq!(winner.vendor_id, vendor("vendor-b"));
    }
}

#[test]
fn declined_vendors_never_appear_in_rankings() {
    let mut aggregate = four_way_aggregate();
    aggregate.quotations[0].status = QuotationStatus::Declined;

    let mut eligibility = Eligibility::default();
    eligibility.exclude_vendor(vendor("vendor-c"));
    let outcome = ranked(&aggregate, &eligibility);

    let declined = [vendor("vendor-a"), vendor("vendor-c")];
    assert!(outcome
        .single_vendor
        .standings
        .iter()
        .all(|standing| !declined.contains(&standing.vendor_id)));
    assert!(outcome
        .per_item
        .items
        .iter()
        .flat_map(|item| item.bids())
        .all(|bid| !declined.contains(&bid.vendor_id)));
    assert_eq!(
        outcome.single_vendor.recommended().map(|s| s.vendor_id.clone()),
        Some(vendor("vendor-b"))
    );
}

#[test]
fn item_level_exclusion_leaves_other_items_alone() {
    let aggregate = scored_aggregate(
        &["item-1", "item-2"],
        vec![
            scored_quotation(
                "vendor-a",
                1,
                &[
                    flat_bid("qi-a1", "item-1", 90.0),
                    flat_bid("qi-a2", "item-2", 90.0),
                ],
            ),
            scored_quotation("vendor-b", 2, &[flat_bid("qi-b1", "item-1", 50.0)]),
        ],
    );
    let mut eligibility = Eligibility::default();
    eligibility.exclude_item_bid(req_item("item-1"), vendor("vendor-a"));

    let outcome = ranked(&aggregate, &eligibility);

    let first = outcome.per_item.item(&req_item("item-1")).expect("item-1");
    assert_eq!(first.winner().map(|bid| bid.vendor_id.clone()), Some(vendor("vendor-b")));
    let second = outcome.per_item.item(&req_item("item-2")).expect("item-2");
    assert_eq!(second.winner().map(|bid| bid.vendor_id.clone()), Some(vendor("vendor-a")));
}

#[test]
fn item_without_bids_is_reported() {
    let aggregate = scored_aggregate(
        &["item-1", "item-2"],
        vec![scored_quotation("vendor-a", 1, &[flat_bid("qi-a1", "item-1", 70.0)])],
    );

    let outcome = ranked(&aggregate, &Eligibility::default());

    match outcome.per_item.item(&req_item("item-2")) {
        Some(ItemRanking::NoEligibleBids { requisition_item_id }) => {
            assert_eq!(requisition_item_id, &req_item("item-2"))
        }
        other => panic!("expected no eligible bids, got {other:?}"),
    }
}

#[test]
fn missing_criteria_leaves_ranking_unavailable() {
    let mut aggregate = four_way_aggregate();
    aggregate.requisition.evaluation_criteria = None;

    let determination = determine_award(
        &aggregate.requisition,
        &aggregate.quotations,
        &Eligibility::default(),
    )
    .expect("no criteria is not an error");

    assert_eq!(determination, AwardDetermination::Unavailable);
}
