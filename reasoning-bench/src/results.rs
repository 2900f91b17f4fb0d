//! Result records and score collections

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{aggregate, ConfidenceInterval, Z_95};
use crate::error::BenchResult;
use crate::tasks::{Validation, Variant};

/// Outcome of scoring one model against one test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestScore {
    pub test: Variant,
    pub model: String,
    /// Per-question matches, in question order
    pub individual_scores: Vec<bool>,
    /// Fraction of `individual_scores` that are true
    pub total_score: f64,
    #[serde(default)]
    pub full_answers: Vec<String>,
    /// Judge output per question, where a judge was used
    #[serde(default)]
    pub full_validations: Vec<Option<Validation>>,
    /// Matching strategy the answers were scored with
    #[serde(default)]
    pub strategy: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TestScore {
    /// Build a score from per-question matches; fails if there are none
    pub fn new(test: Variant, model: impl Into<String>, individual_scores: Vec<bool>) -> BenchResult<Self> {
        let model = model.into();
        let total_score = aggregate(test, &model, &individual_scores)?;
        Ok(Self {
            test,
            model,
            individual_scores,
            total_score,
            full_answers: Vec::new(),
            full_validations: Vec::new(),
            strategy: None,
            created_at: Utc::now(),
        })
    }

    pub fn with_answers(mut self, answers: Vec<String>) -> Self {
        self.full_answers = answers;
        self
    }

    pub fn with_validations(mut self, validations: Vec<Option<Validation>>) -> Self {
        self.full_validations = validations;
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn question_count(&self) -> usize {
        self.individual_scores.len()
    }

    /// 95% Wald interval over the question count
    pub fn confidence_interval(&self) -> Option<ConfidenceInterval> {
        ConfidenceInterval::wald(self.total_score, self.question_count(), Z_95)
    }

    fn is_for(&self, model: &str, test: Variant) -> bool {
        self.model == model && self.test == test
    }
}

/// Append-only set of test scores.
///
/// Operations return a new collection and leave the receiver untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreCollection {
    scores: Vec<TestScore>,
}

impl ScoreCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a score. No dedup; delete first to replace a run.
    pub fn record_score(&self, score: TestScore) -> Self {
        let mut scores = self.scores.clone();
        scores.push(score);
        Self { scores }
    }

    /// Remove every record for (model, test) and report how many went
    pub fn delete_score(&self, model: &str, test: Variant) -> (Self, usize) {
        let scores: Vec<TestScore> = self
            .scores
            .iter()
            .filter(|s| !s.is_for(model, test))
            .cloned()
            .collect();
        let removed = self.scores.len() - scores.len();
        tracing::info!("Deleted {} {} scores for {}", removed, test, model);
        (Self { scores }, removed)
    }

    pub fn scores(&self) -> &[TestScore] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Records for (model, test), oldest first
    pub fn find(&self, model: &str, test: Variant) -> Vec<&TestScore> {
        self.scores.iter().filter(|s| s.is_for(model, test)).collect()
    }

    pub fn for_test(&self, test: Variant) -> impl Iterator<Item = &TestScore> {
        self.scores.iter().filter(move |s| s.test == test)
    }

    /// Load from a JSON file; a missing file is an empty collection
    pub fn load(path: impl AsRef<Path>) -> BenchResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> BenchResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

impl FromIterator<TestScore> for ScoreCollection {
    fn from_iter<I: IntoIterator<Item = TestScore>>(iter: I) -> Self {
        Self {
            scores: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;

    fn score(test: Variant, model: &str, matches: &[bool]) -> TestScore {
        TestScore::new(test, model, matches.to_vec()).unwrap()
    }

    #[test]
    fn test_score_requires_questions() {
        let err = TestScore::new(Variant::SpatialReasoning, "phi-2", vec![]).unwrap_err();
        assert!(matches!(err, BenchError::EmptyQuestionSet { .. }));
    }

    #[test]
    fn test_total_is_mean() {
        let s = score(Variant::SpatialReasoning, "phi-2", &[true, false, false, true]);
        assert_eq!(s.total_score, 0.5);
        let ci = s.confidence_interval().unwrap();
        assert!((ci.half_width() - 1.96 * (0.25f64 / 4.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_record_is_pure_and_appends_duplicates() {
        let empty = ScoreCollection::new();
        let one = empty.record_score(score(Variant::SpatialReasoning, "a", &[true]));
        let two = one.record_score(score(Variant::SpatialReasoning, "a", &[false]));
        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(two.find("a", Variant::SpatialReasoning).len(), 2);
    }

    #[test]
    fn test_delete_then_record_leaves_one() {
        let collection: ScoreCollection = vec![
            score(Variant::SpatialReasoning, "a", &[true]),
            score(Variant::SpatialReasoning, "a", &[false]),
            score(Variant::ContextualDissonance, "a", &[true]),
            score(Variant::SpatialReasoning, "b", &[true]),
        ]
        .into_iter()
        .collect();

        let (trimmed, removed) = collection.delete_score("a", Variant::SpatialReasoning);
        assert_eq!(removed, 2);
        assert_eq!(collection.len(), 4);

        let rerun = trimmed.record_score(score(Variant::SpatialReasoning, "a", &[true, true]));
        assert_eq!(rerun.find("a", Variant::SpatialReasoning).len(), 1);
        assert_eq!(rerun.len(), 3);
    }

    #[test]
    fn test_delete_missing_pair_removes_nothing() {
        let collection = ScoreCollection::new().record_score(score(Variant::SpatialReasoning, "a", &[true]));
        let (same, removed) = collection.delete_score("z", Variant::SpatialReasoning);
        assert_eq!(removed, 0);
        assert_eq!(same, collection);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.json");
        assert!(ScoreCollection::load(&path).unwrap().is_empty());

        let collection = ScoreCollection::new().record_score(
            score(Variant::SequenceLogicPuzzle, "gpt-4-1106-preview", &[true, false])
                .with_answers(vec!["🐶, 🍖".to_string(), "🍖".to_string()])
                .with_strategy("symbol_sequence"),
        );
        collection.save(&path).unwrap();

        let loaded = ScoreCollection::load(&path).unwrap();
        assert_eq!(loaded, collection);
    }
}
