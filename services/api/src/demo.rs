use crate::infra::{
    parse_strategy, sample_directory, ApiService, InMemoryNotificationPublisher,
    InMemoryRequisitionStore, ScriptedClock,
};
use award_engine::config::ProcurementConfig;
use award_engine::error::AppError;
use award_engine::workflows::procurement::{
    apply_score_sheet, current_eligibility, determine_award, parse_score_sheet_path,
    AwardDetermination, AwardStrategy, BiddingTerms, Criterion, CriterionId, EvaluationCriteria,
    FinalizeRequest, ItemRanking, ItemScore, PerItemAwardStatus, ProcurementServiceError,
    PromotionOutcome, QuotationStatus, QuotationSubmission, QuoteItem, QuoteItemId, RankingOutcome,
    Requisition, RequisitionAggregate, RequisitionId, RequisitionItem, RequisitionItemId,
    RequisitionStatus, Score, TransitionError, TransitionReceipt, TransitionRequest, UserId,
    VendorId,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::Args;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

const OFFICER: &str = "pat.officer";
const FINANCE_SCORER: &str = "fran.finance";
const TECHNICAL_SCORER: &str = "tariq.tech";
const VENDOR_CONTACTS: [(&str, &str); 3] = [
    ("northwind", "sales@northwind"),
    ("contoso", "bids@contoso"),
    ("fabrikam", "tenders@fabrikam"),
];

/// (vendor, quote item, requisition item, unit price, cost score, compliance, warranty)
type BidLine = (&'static str, &'static str, &'static str, f64, f64, f64, f64);

const BIDS: [BidLine; 6] = [
    ("northwind", "nw-chair-std", "chairs", 189.0, 70.0, 80.0, 75.0),
    ("northwind", "nw-chair-pro", "chairs", 245.0, 65.0, 92.0, 90.0),
    ("northwind", "nw-desk", "desks", 610.0, 85.0, 70.0, 70.0),
    ("contoso", "ct-chair", "chairs", 172.0, 88.0, 72.0, 70.0),
    ("contoso", "ct-desk", "desks", 655.0, 78.0, 85.0, 82.0),
    ("fabrikam", "fb-chair", "chairs", 158.0, 90.0, 60.0, 65.0),
];

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Award strategy to finalize with (single-vendor or per-item).
    #[arg(long, value_parser = parse_strategy)]
    pub(crate) strategy: Option<AwardStrategy>,
    /// Have the first awarded vendor decline so a standby is promoted.
    #[arg(long)]
    pub(crate) decline_first: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RankArgs {
    /// Requisition snapshot (requisition, quotations, award details) as JSON
    #[arg(long)]
    pub(crate) scenario: PathBuf,
    /// Committee score sheet CSV merged into the snapshot before ranking
    #[arg(long)]
    pub(crate) scores: Option<PathBuf>,
    /// Print the ranking as JSON instead of tables
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_rank(args: RankArgs) -> Result<(), AppError> {
    let RankArgs {
        scenario,
        scores,
        json,
    } = args;

    let raw = std::fs::read_to_string(&scenario)?;
    let mut aggregate: RequisitionAggregate = serde_json::from_str(&raw)?;
    if let Some(path) = scores {
        let entries = parse_score_sheet_path(path, Utc::now())?;
        apply_score_sheet(&mut aggregate.quotations, entries)?;
    }

    let determination = determine_award(
        &aggregate.requisition,
        &aggregate.quotations,
        &current_eligibility(&aggregate),
    )
    .map_err(|err| ProcurementServiceError::from(TransitionError::from(err)))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&determination)?);
        return Ok(());
    }

    println!(
        "Bid ranking for {} ({})",
        aggregate.requisition.id.0, aggregate.requisition.title
    );
    match determination {
        AwardDetermination::Unavailable => {
            println!("- No evaluation criteria on this requisition; nothing to rank");
        }
        AwardDetermination::Ranked(outcome) => render_ranking(&outcome),
    }
    Ok(())
}

fn render_ranking(outcome: &RankingOutcome) {
    println!("\nSingle-vendor view");
    if outcome.single_vendor.standings.is_empty() {
        println!("  (no eligible vendors)");
    }
    for standing in &outcome.single_vendor.standings {
        println!(
            "  {}. {} | {:.2} across {} item(s) | champions {}",
            standing.rank,
            standing.vendor_id,
            standing.final_vendor_score,
            standing.items_bid,
            join_ids(&standing.champion_quote_item_ids)
        );
    }

    println!("\nPer-item view");
    for item in &outcome.per_item.items {
        match item {
            ItemRanking::NoEligibleBids {
                requisition_item_id,
            } => println!("  {}: no eligible bids, re-solicit", requisition_item_id.0),
            ItemRanking::Ranked {
                requisition_item_id,
                bids,
            } => {
                println!("  {}:", requisition_item_id.0);
                for bid in bids {
                    let role = match bid.rank {
                        1 => "award",
                        2 | 3 => "standby",
                        _ => "recorded",
                    };
                    println!(
                        "    {}. {} {} | {:.2} ({role})",
                        bid.rank, bid.vendor_id, bid.quote_item_id.0, bid.final_item_score
                    );
                }
            }
        }
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    println!("Requisition award demo");
    let summary = play_demo(&args)?;

    println!("\nFinal status payload:");
    println!("{}", serde_json::to_string_pretty(&summary.aggregate.status_view())?);
    println!(
        "Audit trail: {} transition(s); notifications queued: {}",
        summary.audit_entries, summary.notifications
    );
    Ok(())
}

pub(crate) struct DemoSummary {
    pub(crate) aggregate: RequisitionAggregate,
    pub(crate) audit_entries: usize,
    pub(crate) notifications: usize,
    pub(crate) promotions: Vec<PromotionOutcome>,
}

pub(crate) fn play_demo(args: &DemoArgs) -> Result<DemoSummary, AppError> {
    let strategy = args.strategy.unwrap_or_default();
    let start = demo_start();
    let clock = Arc::new(ScriptedClock::starting_at(start));
    let store = Arc::new(InMemoryRequisitionStore::default());
    let notifications = Arc::new(InMemoryNotificationPublisher::default());
    let config = ProcurementConfig {
        review_chain: vec!["Committee".to_string(), "Director".to_string()],
        ..ProcurementConfig::default()
    };
    let service = ApiService::new(
        store.clone(),
        Arc::new(sample_directory()),
        notifications.clone(),
        &config,
    )
    .with_clock(clock.clone());

    let draft = demo_requisition();
    let id = draft.id.clone();
    service.create(draft)?;
    println!("- Draft {} created (strategy {})", id.0, strategy.label());

    step(&service, &id, "amara.requester", TransitionRequest::Submit)?;
    step(&service, &id, "ivy.head", TransitionRequest::Approve { comment: None })?;
    step(
        &service,
        &id,
        OFFICER,
        TransitionRequest::OpenBidding(BiddingTerms {
            evaluation_criteria: demo_criteria(),
            financial_committee_member_ids: BTreeSet::from([user(FINANCE_SCORER)]),
            technical_committee_member_ids: BTreeSet::from([user(TECHNICAL_SCORER)]),
            deadline: start + Duration::days(7),
            scoring_deadline: Some(start + Duration::days(14)),
        }),
    )?;

    for (vendor, contact) in VENDOR_CONTACTS {
        clock.advance(Duration::days(1));
        step(&service, &id, contact, quotation_for(vendor))?;
    }

    clock.advance(Duration::days(5));
    step(&service, &id, OFFICER, TransitionRequest::StartScoring)?;

    let aggregate = service.get(&id)?;
    for quotation in &aggregate.quotations {
        for scorer in [FINANCE_SCORER, TECHNICAL_SCORER] {
            step(
                &service,
                &id,
                scorer,
                TransitionRequest::SubmitScores {
                    quotation_id: quotation.id.clone(),
                    committee_comment: None,
                    item_scores: scores_for(scorer, &quotation.items),
                },
            )?;
        }
    }
    step(&service, &id, OFFICER, TransitionRequest::CompleteScoring)?;

    if let AwardDetermination::Ranked(outcome) = service.ranking(&id)? {
        render_ranking(&outcome);
        println!();
    }

    step(
        &service,
        &id,
        OFFICER,
        TransitionRequest::Finalize(FinalizeRequest {
            strategy,
            award_response_deadline: None,
        }),
    )?;
    step(&service, &id, "lin.committee", TransitionRequest::Approve { comment: None })?;
    step(&service, &id, "dana.director", TransitionRequest::Approve { comment: None })?;
    step(&service, &id, OFFICER, TransitionRequest::ReleaseAward)?;

    let mut promotions = Vec::new();
    if args.decline_first {
        if let Some(vendor) = awarded_vendors(&service.get(&id)?).into_iter().next() {
            clock.advance(Duration::hours(6));
            let receipt = step(
                &service,
                &id,
                contact_for(&vendor),
                TransitionRequest::DeclineAward {
                    vendor_id: vendor.clone(),
                    quote_item_id: None,
                    reason: "production capacity committed elsewhere".to_string(),
                },
            )?;
            promotions = receipt.promotions;
        }
    }

    clock.advance(Duration::hours(2));
    for vendor in awarded_vendors(&service.get(&id)?) {
        step(
            &service,
            &id,
            contact_for(&vendor),
            TransitionRequest::AcceptAward {
                vendor_id: vendor.clone(),
                quote_item_id: None,
            },
        )?;
    }

    Ok(DemoSummary {
        aggregate: service.get(&id)?,
        audit_entries: store.audit_log().len(),
        notifications: notifications.events().len(),
        promotions,
    })
}

fn step(
    service: &ApiService,
    id: &RequisitionId,
    actor: &str,
    request: TransitionRequest,
) -> Result<TransitionReceipt, AppError> {
    let receipt = service.apply(id, &user(actor), request)?;
    let approver = receipt
        .current_approver_id
        .as_ref()
        .map(|approver| format!(" (approver {approver})"))
        .unwrap_or_default();
    println!(
        "- {actor}: {} {} -> {}{approver}",
        receipt.action, receipt.from, receipt.to
    );
    for promotion in &receipt.promotions {
        match promotion {
            PromotionOutcome::Promoted {
                vendor_id,
                quote_item_ids,
                response_deadline,
                ..
            } => println!(
                "  Standby {vendor_id} promoted for {} (respond by {})",
                join_ids(quote_item_ids),
                response_deadline.to_rfc3339()
            ),
            PromotionOutcome::ExhaustedStandbys {
                requisition_item_id,
            } => println!(
                "  No standby left{}",
                requisition_item_id
                    .as_ref()
                    .map(|item| format!(" for {}", item.0))
                    .unwrap_or_default()
            ),
        }
    }
    Ok(receipt)
}

/// Vendors holding an unanswered award offer, in quotation order.
fn awarded_vendors(aggregate: &RequisitionAggregate) -> Vec<VendorId> {
    match aggregate.requisition.award_strategy {
        AwardStrategy::SingleVendor => aggregate
            .quotations
            .iter()
            .filter(|quotation| quotation.status == QuotationStatus::Awarded)
            .map(|quotation| quotation.vendor_id.clone())
            .collect(),
        AwardStrategy::PerItem => {
            let mut vendors: Vec<VendorId> = Vec::new();
            for detail in aggregate
                .award_details
                .iter()
                .filter(|detail| detail.status == PerItemAwardStatus::Awarded)
            {
                if !vendors.contains(&detail.vendor_id) {
                    vendors.push(detail.vendor_id.clone());
                }
            }
            vendors
        }
    }
}

fn contact_for(vendor: &VendorId) -> &'static str {
    VENDOR_CONTACTS
        .iter()
        .find(|(name, _)| *name == vendor.0)
        .map_or("unknown-contact", |(_, contact)| *contact)
}

fn quotation_for(vendor: &str) -> TransitionRequest {
    TransitionRequest::SubmitQuotation(QuotationSubmission {
        vendor_id: VendorId(vendor.to_string()),
        items: BIDS
            .iter()
            .filter(|bid| bid.0 == vendor)
            .map(|(_, quote_item, item, price, ..)| QuoteItem {
                id: QuoteItemId(quote_item.to_string()),
                requisition_item_id: RequisitionItemId(item.to_string()),
                name: format!("{vendor} {quote_item}"),
                quantity: if *item == "chairs" { 40 } else { 20 },
                unit_price: *price,
            })
            .collect(),
    })
}

fn scores_for(scorer: &str, items: &[QuoteItem]) -> Vec<ItemScore> {
    items
        .iter()
        .filter_map(|item| {
            let (.., cost, compliance, warranty) =
                BIDS.iter().find(|bid| bid.1 == item.id.0)?;
            let scores = if scorer == FINANCE_SCORER {
                vec![score("unit_cost", *cost)]
            } else {
                vec![score("compliance", *compliance), score("warranty", *warranty)]
            };
            Some(ItemScore {
                quote_item_id: item.id.clone(),
                scores,
            })
        })
        .collect()
}

fn score(criterion: &str, value: f64) -> Score {
    Score {
        criterion_id: CriterionId(criterion.to_string()),
        score: value,
        comment: None,
    }
}

fn demo_criteria() -> EvaluationCriteria {
    let criterion = |id: &str, name: &str, weight: f64| Criterion {
        id: CriterionId(id.to_string()),
        name: name.to_string(),
        weight,
    };
    EvaluationCriteria {
        financial_weight: 40.0,
        technical_weight: 60.0,
        financial_criteria: vec![criterion("unit_cost", "Unit cost", 100.0)],
        technical_criteria: vec![
            criterion("compliance", "Specification compliance", 50.0),
            criterion("warranty", "Warranty and support", 50.0),
        ],
    }
}

fn demo_requisition() -> Requisition {
    Requisition {
        id: RequisitionId("REQ-DEMO-001".to_string()),
        title: "Office refit furniture".to_string(),
        requester_id: user("amara.requester"),
        department: "Facilities".to_string(),
        procurement_officer_id: Some(user(OFFICER)),
        status: RequisitionStatus::Draft,
        current_approver_id: None,
        approver_comment: None,
        items: vec![
            RequisitionItem {
                id: RequisitionItemId("chairs".to_string()),
                name: "Ergonomic task chair".to_string(),
                quantity: 40,
                unit_price: 200.0,
            },
            RequisitionItem {
                id: RequisitionItemId("desks".to_string()),
                name: "Sit-stand desk".to_string(),
                quantity: 20,
                unit_price: 650.0,
            },
        ],
        evaluation_criteria: None,
        award_strategy: AwardStrategy::default(),
        deadline: None,
        scoring_deadline: None,
        award_response_deadline: None,
        financial_committee_member_ids: BTreeSet::new(),
        technical_committee_member_ids: BTreeSet::new(),
        awarded_quote_item_ids: Vec::new(),
        version: 0,
    }
}

fn demo_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn user(id: &str) -> UserId {
    UserId(id.to_string())
}

fn join_ids(ids: &[QuoteItemId]) -> String {
    ids.iter()
        .map(|id| id.0.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
