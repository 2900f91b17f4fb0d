//! Score tables for reporting

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::analysis::ConfidenceInterval;
use crate::results::{ScoreCollection, TestScore};
use crate::tasks::Variant;

/// Parameter-count breakpoints, in billions, between size buckets
pub const SIZE_BREAKPOINTS: [f64; 3] = [13.5, 70.5, 1000.0];

/// Coarse model size class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeBucket {
    Small,
    Medium,
    Large,
    Unknown,
}

impl SizeBucket {
    /// Models at or above the last breakpoint still count as large
    pub fn for_size(size_billions: Option<f64>) -> Self {
        let Some(size) = size_billions else {
            return SizeBucket::Unknown;
        };
        match SIZE_BREAKPOINTS.iter().filter(|bp| size >= **bp).count() {
            0 => SizeBucket::Small,
            1 => SizeBucket::Medium,
            _ => SizeBucket::Large,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeBucket::Small => "small",
            SizeBucket::Medium => "medium",
            SizeBucket::Large => "large",
            SizeBucket::Unknown => "unknown",
        }
    }
}

/// One model's line in a score table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRow {
    pub model: String,
    pub score: f64,
    pub questions: usize,
    /// 95% Wald interval, unclamped
    pub interval: Option<ConfidenceInterval>,
    pub size_billions: Option<f64>,
    pub bucket: SizeBucket,
}

/// Scores of every model on one test, lowest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreTable {
    pub test: Variant,
    pub title: String,
    pub rows: Vec<ScoreRow>,
}

impl ScoreTable {
    /// Build the table for `test`, skipping `bad_models`.
    ///
    /// When a model has several records the most recent one is used.
    pub fn build(
        scores: &ScoreCollection,
        test: Variant,
        model_sizes: &HashMap<String, f64>,
        bad_models: &[String],
    ) -> Self {
        let mut latest: IndexMap<&str, &TestScore> = IndexMap::new();
        for score in scores.for_test(test) {
            if bad_models.iter().any(|m| m == &score.model) {
                continue;
            }
            match latest.get(score.model.as_str()) {
                Some(existing) if existing.created_at > score.created_at => {}
                _ => {
                    latest.insert(score.model.as_str(), score);
                }
            }
        }

        let mut rows: Vec<ScoreRow> = latest
            .into_values()
            .map(|score| {
                let size = model_sizes.get(&score.model).copied();
                ScoreRow {
                    model: score.model.clone(),
                    score: score.total_score,
                    questions: score.question_count(),
                    interval: score.confidence_interval(),
                    size_billions: size,
                    bucket: SizeBucket::for_size(size),
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Self {
            test,
            title: test.title().to_string(),
            rows,
        }
    }

    /// Write to JSON file
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

/// Print a score table to stdout
pub fn print_console_report(table: &ScoreTable) {
    println!("\n=== {} ===\n", table.title);

    if table.rows.is_empty() {
        println!("  No scores recorded.");
        return;
    }

    println!(
        "  {:<40} {:>7} {:>17} {:>5} {:>8}",
        "Model", "Score", "95% CI", "n", "Size"
    );
    println!("{:-<84}", "");

    for row in &table.rows {
        let interval = row
            .interval
            .map(|ci| {
                let ci = ci.clamped();
                format!("[{:.3}, {:.3}]", ci.lower, ci.upper)
            })
            .unwrap_or_else(|| "-".to_string());
        let size = row
            .size_billions
            .map(|s| format!("{}B", s))
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  {:<40} {:>7.3} {:>17} {:>5} {:>8}",
            row.model, row.score, interval, row.questions, size
        );
    }

    println!("\n{:=<84}", "");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_buckets() {
        assert_eq!(SizeBucket::for_size(Some(7.0)), SizeBucket::Small);
        assert_eq!(SizeBucket::for_size(Some(13.5)), SizeBucket::Medium);
        assert_eq!(SizeBucket::for_size(Some(70.0)), SizeBucket::Medium);
        assert_eq!(SizeBucket::for_size(Some(170.0)), SizeBucket::Large);
        assert_eq!(SizeBucket::for_size(Some(1500.0)), SizeBucket::Large);
        assert_eq!(SizeBucket::for_size(None), SizeBucket::Unknown);
    }

    #[test]
    fn test_table_filters_sorts_and_annotates() {
        let scores: ScoreCollection = vec![
            TestScore::new(Variant::SpatialReasoning, "gpt-4-1106-preview", vec![true, true, true, false]).unwrap(),
            TestScore::new(Variant::SpatialReasoning, "phi-2", vec![false, false, true, false]).unwrap(),
            TestScore::new(Variant::SpatialReasoning, "broken-model", vec![false]).unwrap(),
            TestScore::new(Variant::ContextualDissonance, "phi-2", vec![true]).unwrap(),
        ]
        .into_iter()
        .collect();

        let sizes: HashMap<String, f64> = [("gpt-4-1106-preview".to_string(), 400.0)].into_iter().collect();
        let table = ScoreTable::build(&scores, Variant::SpatialReasoning, &sizes, &["broken-model".to_string()]);

        let models: Vec<&str> = table.rows.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(models, vec!["phi-2", "gpt-4-1106-preview"]);
        assert_eq!(table.rows[0].bucket, SizeBucket::Unknown);
        assert_eq!(table.rows[1].bucket, SizeBucket::Large);
        assert_eq!(table.rows[1].questions, 4);
        assert!(table.rows[1].interval.is_some());
        assert_eq!(table.title, "Spatial Reasoning");
    }

    #[test]
    fn test_table_uses_latest_record() {
        let mut older = TestScore::new(Variant::SequenceLogicPuzzle, "phi-2", vec![false]).unwrap();
        older.created_at = older.created_at - chrono::Duration::hours(1);
        let newer = TestScore::new(Variant::SequenceLogicPuzzle, "phi-2", vec![true]).unwrap();
        let scores = ScoreCollection::new().record_score(newer).record_score(older);

        let table = ScoreTable::build(&scores, Variant::SequenceLogicPuzzle, &HashMap::new(), &[]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].score, 1.0);
    }
}
