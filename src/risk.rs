//! Risk assessment engine
//!
//! Turns questionnaire responses into a named risk profile and a
//! risk-aversion coefficient. Three scoring families are supported and are
//! selected by an engine-type tag at construction time.

use crate::config::{IntervalTable, RiskConfig, RiskProfile, SectionTable, WeightedPolicy};
use crate::error::{AdvisorError, Result};
use crate::questionnaire::{checked_total, Responses};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Reference total of the 16-question inverted scale
const INVERTED_SCALE_BASE: f64 = 96.0;

/// Lower band edges of the inverted scale, highest first
const INVERTED_BANDS: [(f64, &str, f64); 5] = [
    (76.0, "Aggressive", 1.5),
    (61.0, "Growth-Oriented", 2.5),
    (46.0, "Moderate", 3.5),
    (31.0, "Conservative", 6.0),
    (0.0, "Very Conservative", 12.0),
];

/// Risk scoring family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskEngineType {
    Simple,
    Weighted,
    Section,
}

impl RiskEngineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskEngineType::Simple => "simple",
            RiskEngineType::Weighted => "weighted",
            RiskEngineType::Section => "section",
        }
    }
}

impl fmt::Display for RiskEngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskEngineType {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simple" => Ok(RiskEngineType::Simple),
            "weighted" => Ok(RiskEngineType::Weighted),
            "section" => Ok(RiskEngineType::Section),
            other => Err(AdvisorError::Configuration(format!(
                "Unknown risk engine type: {}",
                other
            ))),
        }
    }
}

/// Outcome of a risk assessment
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RiskAssessment {
    /// Profile name, e.g. "Moderate"
    pub profile: String,

    /// Risk-aversion coefficient of the profile (> 0)
    pub risk_aversion: f64,

    /// Final score the profile was banded from
    pub score: f64,
}

/// Configured risk scorer
#[derive(Debug, Clone, PartialEq)]
pub enum RiskScorer {
    /// Sum of responses banded through an interval table
    SimpleScore(IntervalTable),

    /// Weighted sum, or the fixed inverted scale
    WeightedScore(WeightedPolicy),

    /// Weighted section sums banded through an interval table
    SectionBased(SectionTable),
}

impl RiskScorer {
    /// Build the scorer registered for `engine_type`
    pub fn from_config(config: &RiskConfig, engine_type: RiskEngineType) -> Result<Self> {
        let missing = || {
            AdvisorError::Configuration(format!(
                "No risk table configured for engine type: {}",
                engine_type
            ))
        };

        match engine_type {
            RiskEngineType::Simple => config
                .simple
                .clone()
                .map(RiskScorer::SimpleScore)
                .ok_or_else(missing),
            RiskEngineType::Weighted => config
                .weighted
                .clone()
                .map(RiskScorer::WeightedScore)
                .ok_or_else(missing),
            RiskEngineType::Section => config
                .section
                .clone()
                .map(RiskScorer::SectionBased)
                .ok_or_else(missing),
        }
    }

    pub fn engine_type(&self) -> RiskEngineType {
        match self {
            RiskScorer::SimpleScore(_) => RiskEngineType::Simple,
            RiskScorer::WeightedScore(_) => RiskEngineType::Weighted,
            RiskScorer::SectionBased(_) => RiskEngineType::Section,
        }
    }

    /// Profiles this scorer bands into, in scan order
    ///
    /// The inverted scale lists its fixed bands over the nominal range
    /// `[0, 96]`.
    pub fn profiles(&self) -> Vec<RiskProfile> {
        match self {
            RiskScorer::SimpleScore(table) => table.profiles.clone(),
            RiskScorer::WeightedScore(WeightedPolicy::Weights { profiles, .. }) => profiles.clone(),
            RiskScorer::WeightedScore(WeightedPolicy::InvertedBands) => {
                let mut upper = INVERTED_SCALE_BASE;
                INVERTED_BANDS
                    .iter()
                    .map(|(lower, name, risk_aversion)| {
                        let profile = RiskProfile {
                            name: name.to_string(),
                            min_score: *lower,
                            max_score: upper,
                            risk_aversion: *risk_aversion,
                        };
                        upper = lower - 1.0;
                        profile
                    })
                    .collect()
            }
            RiskScorer::SectionBased(table) => table.profiles.clone(),
        }
    }

    /// Assess a set of responses
    pub fn assess(&self, responses: &Responses) -> Result<RiskAssessment> {
        self.assess_scores(&responses.scores())
    }

    /// Assess responses already in question order
    pub fn assess_scores(&self, scores: &[i64]) -> Result<RiskAssessment> {
        if scores.is_empty() {
            return Err(AdvisorError::InvalidInput(
                "No responses provided".to_string(),
            ));
        }

        let assessment = match self {
            RiskScorer::SimpleScore(table) => {
                let score = checked_total(scores)? as f64;
                band(&table.profiles, score)?
            }
            RiskScorer::WeightedScore(WeightedPolicy::Weights { weights, profiles }) => {
                if scores.len() < weights.len() {
                    return Err(AdvisorError::InvalidInput(format!(
                        "Expected at least {} responses, got {}",
                        weights.len(),
                        scores.len()
                    )));
                }
                let score = weights
                    .iter()
                    .zip(scores)
                    .map(|(w, s)| w * *s as f64)
                    .sum();
                band(profiles, score)?
            }
            RiskScorer::WeightedScore(WeightedPolicy::InvertedBands) => {
                let score = INVERTED_SCALE_BASE - checked_total(scores)? as f64;
                inverted_band(score)
            }
            RiskScorer::SectionBased(table) => {
                let mut score = 0.0;
                for section in &table.sections {
                    let mut section_sum = 0.0;
                    for &index in &section.question_indices {
                        let value = scores.get(index).ok_or_else(|| {
                            AdvisorError::InvalidInput(format!(
                                "Section {} references question {} but only {} responses were given",
                                section.name,
                                index,
                                scores.len()
                            ))
                        })?;
                        section_sum += *value as f64;
                    }
                    score += section_sum * section.weight;
                }
                band(&table.profiles, score)?
            }
        };

        debug!(
            engine = %self.engine_type(),
            score = assessment.score,
            profile = %assessment.profile,
            "Risk assessed"
        );

        Ok(assessment)
    }
}

/// First profile whose interval contains `score`, else the first profile
fn band(profiles: &[RiskProfile], score: f64) -> Result<RiskAssessment> {
    let fallback = profiles.first().ok_or_else(|| {
        AdvisorError::Configuration("Risk profile table is empty".to_string())
    })?;

    let profile = match profiles.iter().find(|p| p.contains(score)) {
        Some(profile) => profile,
        None => {
            warn!(
                score,
                fallback = %fallback.name,
                "Score outside every configured interval, using first profile"
            );
            fallback
        }
    };

    Ok(RiskAssessment {
        profile: profile.name.clone(),
        risk_aversion: profile.risk_aversion,
        score,
    })
}

fn inverted_band(score: f64) -> RiskAssessment {
    let (name, risk_aversion) = INVERTED_BANDS
        .iter()
        .find(|(lower, _, _)| score >= *lower)
        .map(|(_, name, risk_aversion)| (*name, *risk_aversion))
        .unwrap_or(("Very Conservative", 12.0));

    RiskAssessment {
        profile: name.to_string(),
        risk_aversion,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SectionWeight;
    use crate::error::ErrorKind;
    use std::collections::BTreeMap;

    fn profile(name: &str, min: f64, max: f64, risk_aversion: f64) -> RiskProfile {
        RiskProfile {
            name: name.to_string(),
            min_score: min,
            max_score: max,
            risk_aversion,
        }
    }

    fn table() -> Vec<RiskProfile> {
        vec![
            profile("Conservative", 10.0, 19.0, 6.0),
            profile("Moderate", 20.0, 29.0, 3.5),
            profile("Aggressive", 30.0, 40.0, 1.5),
        ]
    }

    fn simple() -> RiskScorer {
        RiskScorer::SimpleScore(IntervalTable { profiles: table() })
    }

    #[test]
    fn test_simple_score() {
        let assessment = simple().assess(&vec![5, 5, 5, 5, 4].into()).unwrap();
        assert_eq!(assessment.profile, "Moderate");
        assert_eq!(assessment.risk_aversion, 3.5);
        assert_eq!(assessment.score, 24.0);
    }

    #[test]
    fn test_interval_bounds_inclusive() {
        let scorer = simple();
        assert_eq!(scorer.assess(&vec![19].into()).unwrap().profile, "Conservative");
        assert_eq!(scorer.assess(&vec![20].into()).unwrap().profile, "Moderate");
        assert_eq!(scorer.assess(&vec![40].into()).unwrap().profile, "Aggressive");
    }

    #[test]
    fn test_out_of_range_falls_back_to_first_profile() {
        let assessment = simple().assess(&vec![50, 50].into()).unwrap();
        assert_eq!(assessment.profile, "Conservative");
        assert_eq!(assessment.risk_aversion, 6.0);
    }

    #[test]
    fn test_keyed_responses() {
        let mut keyed = BTreeMap::new();
        keyed.insert("q1".to_string(), 10);
        keyed.insert("q2".to_string(), 12);
        let assessment = simple().assess(&keyed.into()).unwrap();
        assert_eq!(assessment.score, 22.0);
    }

    #[test]
    fn test_empty_responses_rejected() {
        let err = simple().assess(&Vec::<i64>::new().into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_overflowing_scores_rejected() {
        let err = simple().assess(&vec![i64::MAX, i64::MAX].into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let inverted = RiskScorer::WeightedScore(WeightedPolicy::InvertedBands);
        let err = inverted.assess_scores(&[i64::MAX, 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_weighted_score() {
        let scorer = RiskScorer::WeightedScore(WeightedPolicy::Weights {
            weights: vec![2.0, 1.0, 0.5],
            profiles: table(),
        });

        let assessment = scorer.assess(&vec![5, 10, 4].into()).unwrap();
        assert_eq!(assessment.score, 22.0);
        assert_eq!(assessment.profile, "Moderate");

        let err = scorer.assess(&vec![5, 10].into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_inverted_bands_moderate() {
        let scorer = RiskScorer::WeightedScore(WeightedPolicy::InvertedBands);
        let assessment = scorer.assess(&vec![3; 16].into()).unwrap();

        assert_eq!(assessment.profile, "Moderate");
        assert_eq!(assessment.risk_aversion, 3.5);
        assert_eq!(assessment.score, 48.0);
    }

    #[test]
    fn test_inverted_band_edges() {
        let scorer = RiskScorer::WeightedScore(WeightedPolicy::InvertedBands);
        let cases = [
            (20, "Aggressive", 1.5),
            (21, "Growth-Oriented", 2.5),
            (35, "Growth-Oriented", 2.5),
            (50, "Moderate", 3.5),
            (65, "Conservative", 6.0),
            (66, "Very Conservative", 12.0),
        ];

        for (total, name, risk_aversion) in cases {
            let assessment = scorer.assess(&vec![total].into()).unwrap();
            assert_eq!(assessment.profile, name, "total {}", total);
            assert_eq!(assessment.risk_aversion, risk_aversion);
        }
    }

    #[test]
    fn test_section_based() {
        let scorer = RiskScorer::SectionBased(SectionTable {
            sections: vec![
                SectionWeight {
                    name: "goals".to_string(),
                    question_indices: vec![0, 1],
                    weight: 1.5,
                },
                SectionWeight {
                    name: "attitude".to_string(),
                    question_indices: vec![2],
                    weight: 2.0,
                },
            ],
            profiles: table(),
        });

        // (4 + 4) * 1.5 + 5 * 2.0
        let assessment = scorer.assess(&vec![4, 4, 5].into()).unwrap();
        assert_eq!(assessment.score, 22.0);
        assert_eq!(assessment.profile, "Moderate");

        let err = scorer.assess(&vec![4, 4].into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_engine_type_parsing() {
        assert_eq!("simple".parse::<RiskEngineType>().unwrap(), RiskEngineType::Simple);
        assert_eq!("section".parse::<RiskEngineType>().unwrap(), RiskEngineType::Section);

        let err = "fuzzy".parse::<RiskEngineType>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_unconfigured_engine_type() {
        let config = RiskConfig {
            simple: Some(IntervalTable { profiles: table() }),
            ..Default::default()
        };

        assert!(RiskScorer::from_config(&config, RiskEngineType::Simple).is_ok());
        let err = RiskScorer::from_config(&config, RiskEngineType::Weighted).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_inverted_band_listing() {
        let profiles = RiskScorer::WeightedScore(WeightedPolicy::InvertedBands).profiles();
        assert_eq!(profiles.len(), 5);
        assert_eq!(profiles[0].max_score, 96.0);
        assert_eq!(profiles[1].max_score, 75.0);
        assert_eq!(profiles[4].name, "Very Conservative");
    }
}
