//! Questionnaire model and response containers
//!
//! A questionnaire is a read-only document of sections and questions whose
//! answer options carry integer scores. Responses arrive either as an ordered
//! score sequence or keyed by question id.

use crate::error::{AdvisorError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

/// One selectable answer and its score
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnswerOption {
    pub text: String,
    pub score: i64,
}

/// A single questionnaire question
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Question {
    /// Unique question identifier (e.g. "q1")
    pub id: String,

    /// Question text shown to the user
    pub text: String,

    /// Selectable answers
    pub options: Vec<AnswerOption>,

    /// Section this question belongs to
    #[serde(default)]
    pub section: Option<String>,
}

impl Question {
    /// Check whether a score is one of this question's option scores
    pub fn accepts(&self, score: i64) -> bool {
        self.options.iter().any(|option| option.score == score)
    }
}

/// A group of questions with a scoring weight
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Section {
    pub id: String,
    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_section_weight")]
    pub weight: f64,
}

fn default_section_weight() -> f64 {
    1.0
}

/// A complete risk assessment questionnaire
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Questionnaire {
    pub id: String,
    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub sections: Vec<Section>,

    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Questionnaire {
    /// Canonical record form of this questionnaire
    pub fn to_record(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild a questionnaire from its canonical record form
    pub fn from_record(record: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(record)?)
    }

    /// Load a questionnaire from a JSON file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save this questionnaire as pretty-printed JSON
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// All questions assigned to a section, in questionnaire order
    pub fn questions_by_section(&self, section_id: &str) -> Vec<&Question> {
        self.questions
            .iter()
            .filter(|q| q.section.as_deref() == Some(section_id))
            .collect()
    }

    pub fn section_by_id(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    pub fn question_by_id(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// Zero-based position of a question
    pub fn question_index(&self, question_id: &str) -> Option<usize> {
        self.questions.iter().position(|q| q.id == question_id)
    }

    /// Resolve responses into an ordered score vector following question order
    ///
    /// Keyed responses must answer every question with one of its option
    /// scores and must not reference unknown question ids. Ordered responses
    /// must have one score per question.
    pub fn ordered_scores(&self, responses: &Responses) -> Result<Vec<i64>> {
        let scores = match responses {
            Responses::Ordered(scores) => {
                if scores.len() != self.questions.len() {
                    return Err(AdvisorError::InvalidInput(format!(
                        "Questionnaire '{}' has {} questions, got {} responses",
                        self.id,
                        self.questions.len(),
                        scores.len()
                    )));
                }
                scores.clone()
            }
            Responses::Keyed(map) => {
                if let Some(unknown) = map.keys().find(|id| self.question_by_id(id).is_none()) {
                    return Err(AdvisorError::InvalidInput(format!(
                        "Unknown question id '{}' for questionnaire '{}'",
                        unknown, self.id
                    )));
                }
                self.questions
                    .iter()
                    .map(|q| {
                        map.get(&q.id).copied().ok_or_else(|| {
                            AdvisorError::InvalidInput(format!("Missing response for '{}'", q.id))
                        })
                    })
                    .collect::<Result<Vec<i64>>>()?
            }
        };

        for (question, score) in self.questions.iter().zip(&scores) {
            if !question.accepts(*score) {
                return Err(AdvisorError::InvalidInput(format!(
                    "Score {} is not an option of question '{}'",
                    score, question.id
                )));
            }
        }

        Ok(scores)
    }
}

/// Questionnaire responses
///
/// Deserializes from either a JSON/YAML sequence of integers or a mapping
/// of question id to integer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Responses {
    Ordered(Vec<i64>),
    Keyed(BTreeMap<String, i64>),
}

impl Responses {
    pub fn len(&self) -> usize {
        match self {
            Responses::Ordered(scores) => scores.len(),
            Responses::Keyed(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scores as an ordered vector
    ///
    /// Keyed responses are ordered by question id with embedded numbers
    /// compared numerically, so "q2" precedes "q10".
    pub fn scores(&self) -> Vec<i64> {
        match self {
            Responses::Ordered(scores) => scores.clone(),
            Responses::Keyed(map) => {
                let mut entries: Vec<(&String, &i64)> = map.iter().collect();
                entries.sort_by(|a, b| natural_cmp(a.0, b.0));
                entries.into_iter().map(|(_, score)| *score).collect()
            }
        }
    }

    /// Sum of all scores, rejecting totals that overflow `i64`
    pub fn total(&self) -> Result<i64> {
        match self {
            Responses::Ordered(scores) => checked_total(scores),
            Responses::Keyed(map) => checked_total(map.values()),
        }
    }
}

/// Overflow-checked sum of response scores
pub(crate) fn checked_total<'a>(scores: impl IntoIterator<Item = &'a i64>) -> Result<i64> {
    scores
        .into_iter()
        .try_fold(0i64, |acc, score| acc.checked_add(*score))
        .ok_or_else(|| AdvisorError::InvalidInput("Response scores overflow the total".to_string()))
}

impl From<Vec<i64>> for Responses {
    fn from(scores: Vec<i64>) -> Self {
        Responses::Ordered(scores)
    }
}

impl From<BTreeMap<String, i64>> for Responses {
    fn from(map: BTreeMap<String, i64>) -> Self {
        Responses::Keyed(map)
    }
}

/// Compare identifiers treating runs of ASCII digits as numbers
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let mut l_digits = String::new();
                while let Some(c) = left.peek().copied().filter(char::is_ascii_digit) {
                    l_digits.push(c);
                    left.next();
                }
                let mut r_digits = String::new();
                while let Some(c) = right.peek().copied().filter(char::is_ascii_digit) {
                    r_digits.push(c);
                    right.next();
                }

                let l_trimmed = l_digits.trim_start_matches('0');
                let r_trimmed = r_digits.trim_start_matches('0');
                let ordering = l_trimmed
                    .len()
                    .cmp(&r_trimmed.len())
                    .then_with(|| l_trimmed.cmp(r_trimmed));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left.next();
                right.next();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn three_point(id: &str, section: &str) -> Question {
        Question {
            id: id.to_string(),
            text: format!("Question {}", id),
            options: (1..=3)
                .map(|score| AnswerOption {
                    text: format!("Option {}", score),
                    score,
                })
                .collect(),
            section: Some(section.to_string()),
        }
    }

    fn sample_questionnaire() -> Questionnaire {
        Questionnaire {
            id: "sample".to_string(),
            title: "Risk Tolerance Assessment".to_string(),
            description: Some("Sample".to_string()),
            sections: vec![
                Section {
                    id: "goals".to_string(),
                    title: "Financial Goals".to_string(),
                    description: None,
                    weight: 1.2,
                },
                Section {
                    id: "attitude".to_string(),
                    title: "Risk Attitude".to_string(),
                    description: Some("How you feel about losses".to_string()),
                    weight: 1.8,
                },
            ],
            questions: vec![
                three_point("q1", "goals"),
                three_point("q2", "goals"),
                three_point("q10", "attitude"),
            ],
        }
    }

    #[test]
    fn test_record_round_trip() {
        let questionnaire = sample_questionnaire();
        let record = questionnaire.to_record().unwrap();
        let restored = Questionnaire::from_record(record).unwrap();

        assert_eq!(restored, questionnaire);
        assert_eq!(restored.sections[1].weight, 1.8);
    }

    #[test]
    fn test_section_weight_defaults_to_one() {
        let json = r#"{"id": "s", "title": "Section"}"#;
        let section: Section = serde_json::from_str(json).unwrap();
        assert_eq!(section.weight, 1.0);
        assert!(section.description.is_none());
    }

    #[test]
    fn test_lookups() {
        let questionnaire = sample_questionnaire();

        assert_eq!(questionnaire.questions_by_section("goals").len(), 2);
        assert_eq!(questionnaire.section_by_id("attitude").unwrap().weight, 1.8);
        assert!(questionnaire.section_by_id("missing").is_none());
        assert_eq!(questionnaire.question_by_id("q10").unwrap().options.len(), 3);
        assert_eq!(questionnaire.question_index("q10"), Some(2));
    }

    #[test]
    fn test_ordered_scores_from_keyed_responses() {
        let questionnaire = sample_questionnaire();
        let mut map = BTreeMap::new();
        map.insert("q10".to_string(), 3);
        map.insert("q1".to_string(), 1);
        map.insert("q2".to_string(), 2);

        let scores = questionnaire.ordered_scores(&Responses::Keyed(map)).unwrap();
        assert_eq!(scores, vec![1, 2, 3]);
    }

    #[test]
    fn test_ordered_scores_rejects_bad_responses() {
        let questionnaire = sample_questionnaire();

        let short = Responses::Ordered(vec![1, 2]);
        assert!(questionnaire.ordered_scores(&short).is_err());

        let out_of_range = Responses::Ordered(vec![1, 2, 7]);
        assert!(questionnaire.ordered_scores(&out_of_range).is_err());

        let mut map = BTreeMap::new();
        map.insert("q1".to_string(), 1);
        map.insert("q2".to_string(), 1);
        map.insert("q99".to_string(), 1);
        assert!(questionnaire.ordered_scores(&Responses::Keyed(map)).is_err());
    }

    #[test]
    fn test_responses_deserialize_both_shapes() {
        let ordered: Responses = serde_json::from_str("[1, 2, 3]").unwrap();
        assert_eq!(ordered, Responses::Ordered(vec![1, 2, 3]));

        let keyed: Responses = serde_json::from_str(r#"{"q1": 2, "q2": 3}"#).unwrap();
        assert_eq!(keyed.total().unwrap(), 5);
        assert_eq!(keyed.len(), 2);
    }

    #[test]
    fn test_total_overflow_rejected() {
        let responses = Responses::Ordered(vec![i64::MAX, 1]);
        assert_eq!(responses.total().unwrap_err().kind(), ErrorKind::InvalidInput);

        let responses = Responses::Ordered(vec![i64::MIN, -1]);
        assert!(responses.total().is_err());
    }

    #[test]
    fn test_keyed_scores_use_natural_order() {
        let mut map = BTreeMap::new();
        map.insert("q10".to_string(), 10);
        map.insert("q2".to_string(), 2);
        map.insert("q1".to_string(), 1);

        assert_eq!(Responses::Keyed(map).scores(), vec![1, 2, 10]);
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("q2", "q10"), Ordering::Less);
        assert_eq!(natural_cmp("q10", "q10"), Ordering::Equal);
        assert_eq!(natural_cmp("a", "b"), Ordering::Less);
        assert_eq!(natural_cmp("q02", "q2"), Ordering::Equal);
    }
}
