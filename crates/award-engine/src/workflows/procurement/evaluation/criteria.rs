use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::super::domain::CriterionId;

/// Allowed drift when comparing weight sums against 100.
pub const WEIGHT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionCategory {
    Financial,
    Technical,
}

impl CriterionCategory {
    pub const fn ordered() -> [Self; 2] {
        [Self::Financial, Self::Technical]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Financial => "financial",
            Self::Technical => "technical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: CriterionId,
    pub name: String,
    pub weight: f64,
}

/// Weighted rubric attached to a requisition before bidding opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCriteria {
    pub financial_weight: f64,
    pub technical_weight: f64,
    #[serde(default)]
    pub financial_criteria: Vec<Criterion>,
    #[serde(default)]
    pub technical_criteria: Vec<Criterion>,
}

impl EvaluationCriteria {
    pub fn criteria(&self, category: CriterionCategory) -> &[Criterion] {
        match category {
            CriterionCategory::Financial => &self.financial_criteria,
            CriterionCategory::Technical => &self.technical_criteria,
        }
    }

    pub fn category_weight(&self, category: CriterionCategory) -> f64 {
        match category {
            CriterionCategory::Financial => self.financial_weight,
            CriterionCategory::Technical => self.technical_weight,
        }
    }

    pub fn category_of(&self, id: &CriterionId) -> Option<CriterionCategory> {
        CriterionCategory::ordered()
            .into_iter()
            .find(|category| self.criteria(*category).iter().any(|c| &c.id == id))
    }

    /// Check every weight invariant; nothing should be scored against criteria that fail this.
    pub fn validate(&self) -> Result<(), CriteriaError> {
        for category in CriterionCategory::ordered() {
            let weight = self.category_weight(category);
            if !weight.is_finite() || !(0.0..=100.0).contains(&weight) {
                return Err(CriteriaError::WeightOutOfRange {
                    subject: category.label().to_string(),
                    weight,
                });
            }
        }

        let total = self.financial_weight + self.technical_weight;
        if (total - 100.0).abs() > WEIGHT_TOLERANCE {
            return Err(CriteriaError::CategoryWeights {
                financial: self.financial_weight,
                technical: self.technical_weight,
            });
        }

        let mut seen = BTreeSet::new();
        for category in CriterionCategory::ordered() {
            let criteria = self.criteria(category);

            for criterion in criteria {
                if !criterion.weight.is_finite() || !(0.0..=100.0).contains(&criterion.weight) {
                    return Err(CriteriaError::WeightOutOfRange {
                        subject: criterion.id.0.clone(),
                        weight: criterion.weight,
                    });
                }
                if !seen.insert(&criterion.id) {
                    return Err(CriteriaError::DuplicateCriterion(criterion.id.0.clone()));
                }
            }

            // A category that carries no weight may be left empty.
            if criteria.is_empty() && self.category_weight(category) == 0.0 {
                continue;
            }

            let sum: f64 = criteria.iter().map(|criterion| criterion.weight).sum();
            if (sum - 100.0).abs() > WEIGHT_TOLERANCE {
                return Err(CriteriaError::CriterionWeights {
                    category,
                    total: sum,
                });
            }
        }

        Ok(())
    }
}

/// Reasons a rubric cannot be used for scoring.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CriteriaError {
    #[error("financial ({financial}) and technical ({technical}) weights must sum to 100")]
    CategoryWeights { financial: f64, technical: f64 },
    #[error("{} criteria weights must sum to 100, found {total}", .category.label())]
    CriterionWeights {
        category: CriterionCategory,
        total: f64,
    },
    #[error("weight {weight} for {subject} must lie within 0..=100")]
    WeightOutOfRange { subject: String, weight: f64 },
    #[error("criterion {0} is defined more than once")]
    DuplicateCriterion(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion(id: &str, weight: f64) -> Criterion {
        Criterion {
            id: CriterionId(id.to_string()),
            name: id.to_string(),
            weight,
        }
    }

    fn rubric() -> EvaluationCriteria {
        EvaluationCriteria {
            financial_weight: 40.0,
            technical_weight: 60.0,
            financial_criteria: vec![criterion("price", 100.0)],
            technical_criteria: vec![criterion("quality", 50.0), criterion("support", 50.0)],
        }
    }

    #[test]
    fn well_formed_rubric_validates() {
        rubric().validate().expect("rubric is well formed");
    }

    #[test]
    fn category_weights_must_sum_to_one_hundred() {
        let mut criteria = rubric();
        criteria.technical_weight = 50.0;

        match criteria.validate() {
            Err(CriteriaError::CategoryWeights {
                financial,
                technical,
            }) => {
                assert_eq!(financial, 40.0);
                assert_eq!(technical, 50.0);
            }
            other => panic!("expected category weight error, got {other:?}"),
        }
    }

    #[test]
    fn criterion_weights_must_sum_within_category() {
        let mut criteria = rubric();
        criteria.technical_criteria[1].weight = 40.0;

        match criteria.validate() {
            Err(CriteriaError::CriterionWeights { category, total }) => {
                assert_eq!(category, CriterionCategory::Technical);
                assert!((total - 90.0).abs() < f64::EPSILON);
            }
            other => panic!("expected criterion weight error, got {other:?}"),
        }
    }

    #[test]
    fn unweighted_category_may_be_empty() {
        let criteria = EvaluationCriteria {
            financial_weight: 100.0,
            technical_weight: 0.0,
            financial_criteria: vec![criterion("price", 100.0)],
            technical_criteria: Vec::new(),
        };

        criteria.validate().expect("technical category is unweighted");
    }

    #[test]
    fn duplicate_ids_are_rejected_across_categories() {
        let mut criteria = rubric();
        criteria.technical_criteria[0].id = CriterionId("price".to_string());

        assert_eq!(
            criteria.validate(),
            Err(CriteriaError::DuplicateCriterion("price".to_string()))
        );
    }

    #[test]
    fn category_lookup_finds_owner() {
        let criteria = rubric();
        assert_eq!(
            criteria.category_of(&CriterionId("support".to_string())),
            Some(CriterionCategory::Technical)
        );
        assert_eq!(
            criteria.category_of(&CriterionId("delivery".to_string())),
            None
        );
    }
}
