use std::collections::BTreeSet;

use serde::Serialize;

use super::super::domain::{
    Quotation, QuotationId, QuotationStatus, QuoteItemId, Requisition, RequisitionItem,
    RequisitionItemId, VendorId,
};
use super::aggregate::ItemScoreBreakdown;
use super::ScoreAggregator;

/// Highest rank that is still offered as a standby in the per-item view.
pub const LAST_STANDBY_RANK: u32 = 3;

/// Bids that may take part in a ranking run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eligibility {
    excluded_vendors: BTreeSet<VendorId>,
    excluded_item_bids: BTreeSet<(RequisitionItemId, VendorId)>,
}

impl Eligibility {
    pub fn exclude_vendor(&mut self, vendor: VendorId) {
        self.excluded_vendors.insert(vendor);
    }

    /// Drop one vendor from one item only (a per-item decline).
    pub fn exclude_item_bid(&mut self, item: RequisitionItemId, vendor: VendorId) {
        self.excluded_item_bids.insert((item, vendor));
    }

    pub fn admits(&self, quotation: &Quotation) -> bool {
        quotation.status != QuotationStatus::Declined
            && !self.excluded_vendors.contains(&quotation.vendor_id)
    }

    fn admits_item(&self, item: &RequisitionItemId, vendor: &VendorId) -> bool {
        !self
            .excluded_item_bids
            .contains(&(item.clone(), vendor.clone()))
    }
}

/// A vendor's best alternate for one requisition item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChampionBid {
    pub requisition_item_id: RequisitionItemId,
    pub vendor_id: VendorId,
    pub quotation_id: QuotationId,
    pub quote_item_id: QuoteItemId,
    pub final_item_score: f64,
    pub alternates_considered: usize,
    pub breakdown: ItemScoreBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemChampions {
    pub requisition_item_id: RequisitionItemId,
    pub champions: Vec<ChampionBid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedBid {
    pub rank: u32,
    pub vendor_id: VendorId,
    pub quotation_id: QuotationId,
    pub quote_item_id: QuoteItemId,
    pub final_item_score: f64,
}

/// Per-item ordering of champion bids.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemRanking {
    Ranked {
        requisition_item_id: RequisitionItemId,
        bids: Vec<RankedBid>,
    },
    /// Nobody eligible bid on this item; it must be re-solicited.
    NoEligibleBids {
        requisition_item_id: RequisitionItemId,
    },
}

impl ItemRanking {
    pub fn requisition_item_id(&self) -> &RequisitionItemId {
        match self {
            Self::Ranked {
                requisition_item_id,
                ..
            }
            | Self::NoEligibleBids {
                requisition_item_id,
            } => requisition_item_id,
        }
    }

    pub fn bids(&self) -> &[RankedBid] {
        match self {
            Self::Ranked { bids, .. } => bids,
            Self::NoEligibleBids { .. } => &[],
        }
    }

    pub fn winner(&self) -> Option<&RankedBid> {
        self.bids().first()
    }

    pub fn standbys(&self) -> &[RankedBid] {
        let bids = self.bids();
        let end = bids.len().min(LAST_STANDBY_RANK as usize);
        if end <= 1 {
            &[]
        } else {
            &bids[1..end]
        }
    }
}

/// Composite score for one vendor across the items it bid on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorStanding {
    pub rank: u32,
    pub vendor_id: VendorId,
    pub quotation_id: QuotationId,
    pub final_vendor_score: f64,
    pub items_bid: usize,
    pub champion_quote_item_ids: Vec<QuoteItemId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SingleVendorView {
    pub standings: Vec<VendorStanding>,
}

impl SingleVendorView {
    pub fn recommended(&self) -> Option<&VendorStanding> {
        self.standings.first()
    }

    pub fn standing(&self, vendor: &VendorId) -> Option<&VendorStanding> {
        self.standings
            .iter()
            .find(|standing| &standing.vendor_id == vendor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerItemView {
    pub items: Vec<ItemRanking>,
}

impl PerItemView {
    pub fn item(&self, id: &RequisitionItemId) -> Option<&ItemRanking> {
        self.items
            .iter()
            .find(|ranking| ranking.requisition_item_id() == id)
    }
}

/// Both award views computed from the same champion table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingOutcome {
    pub champions: Vec<ItemChampions>,
    pub single_vendor: SingleVendorView,
    pub per_item: PerItemView,
}

pub(crate) fn rank_bids(
    aggregator: &ScoreAggregator<'_>,
    requisition: &Requisition,
    quotations: &[Quotation],
    eligibility: &Eligibility,
) -> RankingOutcome {
    let mut eligible: Vec<&Quotation> = quotations
        .iter()
        .filter(|quotation| eligibility.admits(quotation))
        .collect();
    // Stable: equal timestamps keep their input order.
    eligible.sort_by_key(|quotation| quotation.submitted_at);

    let champions: Vec<ItemChampions> = requisition
        .items
        .iter()
        .map(|item| ItemChampions {
            requisition_item_id: item.id.clone(),
            champions: eligible
                .iter()
                .filter(|quotation| eligibility.admits_item(&item.id, &quotation.vendor_id))
                .filter_map(|quotation| champion_for(aggregator, item, quotation))
                .collect(),
        })
        .collect();

    let single_vendor = single_vendor_view(&eligible, &champions);
    let per_item = per_item_view(&champions);

    RankingOutcome {
        champions,
        single_vendor,
        per_item,
    }
}

fn champion_for(
    aggregator: &ScoreAggregator<'_>,
    item: &RequisitionItem,
    quotation: &Quotation,
) -> Option<ChampionBid> {
    let mut champion: Option<ChampionBid> = None;
    let mut considered = 0;

    for quote_item in quotation
        .items
        .iter()
        .filter(|quote_item| quote_item.requisition_item_id == item.id)
    {
        considered += 1;
        let breakdown = aggregator.score_item(&quote_item.id, &quotation.scores);
        // Strictly greater: on an exact tie the earlier alternate stays champion.
        let replaces = champion
            .as_ref()
            .map_or(true, |current| breakdown.final_item_score > current.final_item_score);

        if replaces {
            champion = Some(ChampionBid {
                requisition_item_id: item.id.clone(),
                vendor_id: quotation.vendor_id.clone(),
                quotation_id: quotation.id.clone(),
                quote_item_id: quote_item.id.clone(),
                final_item_score: breakdown.final_item_score,
                alternates_considered: 0,
                breakdown,
            });
        }
    }

    champion.map(|mut bid| {
        bid.alternates_considered = considered;
        bid
    })
}

fn single_vendor_view(eligible: &[&Quotation], champions: &[ItemChampions]) -> SingleVendorView {
    let mut standings: Vec<VendorStanding> = eligible
        .iter()
        .filter_map(|quotation| {
            let bids: Vec<&ChampionBid> = champions
                .iter()
                .flat_map(|item| item.champions.iter())
                .filter(|bid| bid.vendor_id == quotation.vendor_id)
                .collect();

            if bids.is_empty() {
                return None;
            }

            // Mean over the items actually bid on; missing items are not zero-filled.
            let total: f64 = bids.iter().map(|bid| bid.final_item_score).sum();
            Some(VendorStanding {
                rank: 0,
                vendor_id: quotation.vendor_id.clone(),
                quotation_id: quotation.id.clone(),
                final_vendor_score: total / bids.len() as f64,
                items_bid: bids.len(),
                champion_quote_item_ids: bids.iter().map(|bid| bid.quote_item_id.clone()).collect(),
            })
        })
        .collect();

    standings.sort_by(|a, b| b.final_vendor_score.total_cmp(&a.final_vendor_score));
    for (index, standing) in standings.iter_mut().enumerate() {
        standing.rank = index as u32 + 1;
    }

    SingleVendorView { standings }
}

fn per_item_view(champions: &[ItemChampions]) -> PerItemView {
    let items = champions
        .iter()
        .map(|item| {
            if item.champions.is_empty() {
                return ItemRanking::NoEligibleBids {
                    requisition_item_id: item.requisition_item_id.clone(),
                };
            }

            let mut bids: Vec<RankedBid> = item
                .champions
                .iter()
                .map(|bid| RankedBid {
                    rank: 0,
                    vendor_id: bid.vendor_id.clone(),
                    quotation_id: bid.quotation_id.clone(),
                    quote_item_id: bid.quote_item_id.clone(),
                    final_item_score: bid.final_item_score,
                })
                .collect();
            bids.sort_by(|a, b| b.final_item_score.total_cmp(&a.final_item_score));
            for (index, bid) in bids.iter_mut().enumerate() {
                bid.rank = index as u32 + 1;
            }

            ItemRanking::Ranked {
                requisition_item_id: item.requisition_item_id.clone(),
                bids,
            }
        })
        .collect();

    PerItemView { items }
}
