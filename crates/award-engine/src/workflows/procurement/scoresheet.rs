//! Committee score sheets exported as CSV.
//!
//! Columns: `scorer_id,quotation_id,quote_item_id,criterion_id,score,comment`. The header row
//! is required and `comment` may be left blank.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use super::domain::{
    CommitteeScoreSet, CriterionId, ItemScore, Quotation, QuotationId, QuoteItemId, Score, UserId,
};

/// One scorer's sheet for one quotation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSheetEntry {
    pub quotation_id: QuotationId,
    pub score_set: CommitteeScoreSet,
}

#[derive(Debug, thiserror::Error)]
pub enum ScoreSheetError {
    #[error("failed to read score sheet: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid score sheet data on line {line}: {source}")]
    Csv { line: u64, source: csv::Error },
    #[error("score {score} on line {line} must lie within 0..=100")]
    ScoreOutOfRange { line: u64, score: f64 },
    #[error("score sheet references unknown quotation {0}")]
    UnknownQuotation(String),
}

#[derive(Debug, Deserialize)]
struct ScoreRow {
    scorer_id: String,
    quotation_id: String,
    quote_item_id: String,
    criterion_id: String,
    score: f64,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    comment: Option<String>,
}

pub fn parse_score_sheet_path<P: AsRef<Path>>(
    path: P,
    submitted_at: DateTime<Utc>,
) -> Result<Vec<ScoreSheetEntry>, ScoreSheetError> {
    let file = std::fs::File::open(path)?;
    parse_score_sheet(file, submitted_at)
}

/// Group rows into score sets by (quotation, scorer) in first-seen order.
pub fn parse_score_sheet<R: Read>(
    reader: R,
    submitted_at: DateTime<Utc>,
) -> Result<Vec<ScoreSheetEntry>, ScoreSheetError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut entries: Vec<ScoreSheetEntry> = Vec::new();

    for (index, record) in csv_reader.deserialize::<ScoreRow>().enumerate() {
        // Line 1 is the header.
        let line = index as u64 + 2;
        let row = record.map_err(|source| ScoreSheetError::Csv { line, source })?;
        if !row.score.is_finite() || !(0.0..=100.0).contains(&row.score) {
            return Err(ScoreSheetError::ScoreOutOfRange {
                line,
                score: row.score,
            });
        }

        let quotation_id = QuotationId(row.quotation_id);
        let scorer_id = UserId(row.scorer_id);
        let position = entries.iter().position(|entry| {
            entry.quotation_id == quotation_id && entry.score_set.scorer_id == scorer_id
        });
        let entry = match position {
            Some(position) => &mut entries[position],
            None => {
                entries.push(ScoreSheetEntry {
                    quotation_id,
                    score_set: CommitteeScoreSet {
                        scorer_id,
                        committee_comment: None,
                        item_scores: Vec::new(),
                        submitted_at,
                        locked: false,
                    },
                });
                let last = entries.len() - 1;
                &mut entries[last]
            }
        };

        let quote_item_id = QuoteItemId(row.quote_item_id);
        let score = Score {
            criterion_id: CriterionId(row.criterion_id),
            score: row.score,
            comment: row.comment,
        };
        let item_scores = &mut entry.score_set.item_scores;
        match item_scores
            .iter_mut()
            .find(|item| item.quote_item_id == quote_item_id)
        {
            Some(item) => item.scores.push(score),
            None => item_scores.push(ItemScore {
                quote_item_id,
                scores: vec![score],
            }),
        }
    }

    Ok(entries)
}

/// Attach parsed sheets to their quotations, replacing any earlier set from the same scorer.
pub fn apply_score_sheet(
    quotations: &mut [Quotation],
    entries: Vec<ScoreSheetEntry>,
) -> Result<(), ScoreSheetError> {
    for entry in entries {
        let quotation = quotations
            .iter_mut()
            .find(|quotation| quotation.id == entry.quotation_id)
            .ok_or_else(|| ScoreSheetError::UnknownQuotation(entry.quotation_id.0.clone()))?;

        match quotation
            .scores
            .iter_mut()
            .find(|set| set.scorer_id == entry.score_set.scorer_id)
        {
            Some(existing) => *existing = entry.score_set,
            None => quotation.scores.push(entry.score_set),
        }
    }
    Ok(())
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|value| !value.trim().is_empty()))
}
