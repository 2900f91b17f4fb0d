//! Answer matching strategies, per-question scoring and aggregation

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::embedding::{semantic_similarity, Embedder};
use super::similarity::{sentences_match, subword_similarity, symbols_match, tfidf_similarity};
use crate::config::ScoringConfig;
use crate::error::{BenchError, BenchResult};
use crate::query::{QueryClient, QuerySpec};
use crate::tasks::{Question, TestItem, Validation, Variant};

/// z-score for a two-sided 95% interval
pub const Z_95: f64 = 1.96;

/// How a candidate answer is compared to the reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Word sets within `tolerance` in size, one a subset of the other
    TokenSet { tolerance: usize },
    /// TF-IDF cosine at or above `threshold`
    Lexical { threshold: f64 },
    /// Character n-gram cosine at or above `threshold`
    Subword { threshold: f64 },
    /// Embedding cosine at or above `threshold`
    Semantic { threshold: f64 },
    /// Same symbols in the same order
    SymbolSequence,
    /// A judge model decides
    Judge,
}

impl MatchStrategy {
    /// Strategy used for a variant when config has no override
    pub fn default_for(variant: Variant, config: &ScoringConfig) -> Self {
        match variant {
            Variant::SequenceLogicPuzzle => MatchStrategy::SymbolSequence,
            Variant::SpatialReasoning => MatchStrategy::Subword {
                threshold: config.subword_threshold,
            },
            Variant::ContextualDissonance => MatchStrategy::TokenSet {
                tolerance: config.tolerance,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MatchStrategy::TokenSet { .. } => "token_set",
            MatchStrategy::Lexical { .. } => "lexical",
            MatchStrategy::Subword { .. } => "subword",
            MatchStrategy::Semantic { .. } => "semantic",
            MatchStrategy::SymbolSequence => "symbol_sequence",
            MatchStrategy::Judge => "judge",
        }
    }
}

/// Outcome of matching one answer
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionVerdict {
    pub matched: bool,
    /// Raw similarity for vector strategies
    pub similarity: Option<f64>,
    /// Judge output for the judge strategy
    pub validation: Option<Validation>,
}

impl QuestionVerdict {
    fn from_bool(matched: bool) -> Self {
        Self {
            matched,
            similarity: None,
            validation: None,
        }
    }

    fn from_similarity(similarity: f64, threshold: f64) -> Self {
        Self {
            matched: similarity >= threshold,
            similarity: Some(similarity),
            validation: None,
        }
    }
}

struct Judge {
    client: QueryClient,
    model: String,
}

/// Decides whether candidate answers match references
pub struct AnswerScorer {
    config: ScoringConfig,
    embedder: Option<Arc<dyn Embedder>>,
    judge: Option<Judge>,
}

impl AnswerScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            embedder: None,
            judge: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Model and client used by [`MatchStrategy::Judge`]
    pub fn with_judge(mut self, client: QueryClient, model: impl Into<String>) -> Self {
        self.judge = Some(Judge {
            client,
            model: model.into(),
        });
        self
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn strategy_for(&self, variant: Variant) -> MatchStrategy {
        self.config.strategy_for(variant)
    }

    /// Compare two strings under a text strategy. The judge needs an item; use [`Self::score`].
    pub async fn compare(&self, strategy: &MatchStrategy, reference: &str, candidate: &str) -> BenchResult<QuestionVerdict> {
        let verdict = match strategy {
            MatchStrategy::TokenSet { tolerance } => {
                QuestionVerdict::from_bool(sentences_match(reference, candidate, *tolerance))
            }
            MatchStrategy::Lexical { threshold } => {
                QuestionVerdict::from_similarity(tfidf_similarity(reference, candidate), *threshold)
            }
            MatchStrategy::Subword { threshold } => {
                QuestionVerdict::from_similarity(subword_similarity(reference, candidate), *threshold)
            }
            MatchStrategy::Semantic { threshold } => {
                let embedder = self.embedder.as_deref().ok_or_else(|| {
                    BenchError::EmbeddingModelUnavailable {
                        model: self.config.embedding_model.clone(),
                        message: "no embedder configured".to_string(),
                    }
                })?;
                let similarity = semantic_similarity(embedder, reference, candidate).await?;
                QuestionVerdict::from_similarity(similarity, *threshold)
            }
            MatchStrategy::SymbolSequence => {
                QuestionVerdict::from_bool(symbols_match(reference, candidate))
            }
            MatchStrategy::Judge => {
                return Err(BenchError::InvalidQuery {
                    model: self.judge_model().to_string(),
                    message: "judge matching needs the test item".to_string(),
                })
            }
        };
        Ok(verdict)
    }

    /// Score one question's candidate answer
    pub async fn score(
        &self,
        strategy: &MatchStrategy,
        item: &TestItem,
        question: &Question,
        candidate: &str,
    ) -> BenchResult<QuestionVerdict> {
        if *strategy != MatchStrategy::Judge {
            return self.compare(strategy, &question.reference, candidate).await;
        }

        let judge = self.judge.as_ref().ok_or_else(|| BenchError::InvalidQuery {
            model: self.judge_model().to_string(),
            message: "judge strategy selected but no judge model configured".to_string(),
        })?;
        let prompt = item
            .validation_prompt(question.index, candidate)
            .ok_or_else(|| BenchError::InvalidQuery {
                model: judge.model.clone(),
                message: format!("{} item has no question {}", item.variant(), question.index),
            })?;

        let validation: Validation = judge
            .client
            .query_structured(&judge.model, &QuerySpec::user(prompt))
            .await?;

        Ok(QuestionVerdict {
            matched: validation.valid,
            similarity: None,
            validation: Some(validation),
        })
    }

    fn judge_model(&self) -> &str {
        self.judge
            .as_ref()
            .map(|j| j.model.as_str())
            .or(self.config.judge_model.as_deref())
            .unwrap_or("(none)")
    }
}

/// Fraction of true matches. Fails on an empty sequence.
pub fn aggregate(test: Variant, model: &str, matches: &[bool]) -> BenchResult<f64> {
    if matches.is_empty() {
        return Err(BenchError::EmptyQuestionSet {
            test,
            model: model.to_string(),
        });
    }
    let correct = matches.iter().filter(|m| **m).count();
    Ok(correct as f64 / matches.len() as f64)
}

/// Normal-approximation interval for a binomial proportion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    /// Wald interval `p ± z·sqrt(p(1-p)/n)`, unclamped. `None` when `n == 0`.
    pub fn wald(p: f64, n: usize, z: f64) -> Option<Self> {
        if n == 0 {
            return None;
        }
        let margin = z * (p * (1.0 - p) / n as f64).sqrt();
        Some(Self {
            lower: p - margin,
            upper: p + margin,
        })
    }

    /// Interval cut to [0, 1], for display
    pub fn clamped(&self) -> Self {
        Self {
            lower: self.lower.clamp(0.0, 1.0),
            upper: self.upper.clamp(0.0, 1.0),
        }
    }

    pub fn half_width(&self) -> f64 {
        (self.upper - self.lower) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::embedding::tests::{BrokenEmbedder, LetterEmbedder};

    #[test]
    fn test_seven_of_ten() {
        let matches = [true, true, true, true, true, true, true, false, false, false];
        let p = aggregate(Variant::SpatialReasoning, "m", &matches).unwrap();
        assert!((p - 0.7).abs() < 1e-12);

        let ci = ConfidenceInterval::wald(p, matches.len(), Z_95).unwrap();
        let margin = 1.96 * (0.7f64 * 0.3 / 10.0).sqrt();
        assert!((ci.lower - (0.7 - margin)).abs() < 1e-12);
        assert!((ci.upper - (0.7 + margin)).abs() < 1e-12);
        assert!((ci.lower - 0.416).abs() < 1e-3);
        assert!((ci.upper - 0.984).abs() < 1e-3);
    }

    #[test]
    fn test_empty_question_set() {
        let err = aggregate(Variant::SequenceLogicPuzzle, "phi-2", &[]).unwrap_err();
        assert!(matches!(
            err,
            BenchError::EmptyQuestionSet { test: Variant::SequenceLogicPuzzle, ref model } if model == "phi-2"
        ));
    }

    #[test]
    fn test_wald_reported_unclamped() {
        let ci = ConfidenceInterval::wald(0.9, 3, Z_95).unwrap();
        assert!(ci.upper > 1.0);
        assert_eq!(ci.clamped().upper, 1.0);
        assert!(ConfidenceInterval::wald(0.5, 0, Z_95).is_none());
        // p at the extremes has zero width
        let ci = ConfidenceInterval::wald(1.0, 5, Z_95).unwrap();
        assert_eq!(ci.half_width(), 0.0);
    }

    #[test]
    fn test_default_strategies() {
        let config = ScoringConfig::default();
        assert_eq!(
            MatchStrategy::default_for(Variant::SequenceLogicPuzzle, &config),
            MatchStrategy::SymbolSequence
        );
        assert_eq!(
            MatchStrategy::default_for(Variant::SpatialReasoning, &config),
            MatchStrategy::Subword { threshold: 0.9 }
        );
        assert_eq!(
            MatchStrategy::default_for(Variant::ContextualDissonance, &config),
            MatchStrategy::TokenSet { tolerance: 2 }
        );
    }

    #[tokio::test]
    async fn test_compare_thresholds() {
        let scorer = AnswerScorer::new(ScoringConfig::default());
        let verdict = scorer
            .compare(&MatchStrategy::Lexical { threshold: 0.8 }, "cat dog", "cat fish")
            .await
            .unwrap();
        assert!(!verdict.matched);
        assert!(verdict.similarity.unwrap() > 0.0);

        let verdict = scorer
            .compare(&MatchStrategy::TokenSet { tolerance: 2 }, "the cat sat on the mat", "the cat sat on a mat")
            .await
            .unwrap();
        assert!(verdict.matched);
        assert!(verdict.similarity.is_none());
    }

    #[tokio::test]
    async fn test_semantic_requires_embedder() {
        let scorer = AnswerScorer::new(ScoringConfig::default());
        let err = scorer
            .compare(&MatchStrategy::Semantic { threshold: 0.85 }, "a", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::EmbeddingModelUnavailable { ref model, .. } if model == "TaylorAI/gte-tiny"));

        let scorer = AnswerScorer::new(ScoringConfig::default()).with_embedder(Arc::new(BrokenEmbedder));
        assert!(scorer
            .compare(&MatchStrategy::Semantic { threshold: 0.85 }, "a", "a")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_semantic_with_embedder() {
        let scorer = AnswerScorer::new(ScoringConfig::default()).with_embedder(Arc::new(LetterEmbedder));
        let verdict = scorer
            .compare(&MatchStrategy::Semantic { threshold: 0.85 }, "stressed", "desserts")
            .await
            .unwrap();
        assert!(verdict.matched);
    }

    #[tokio::test]
    async fn test_judge_without_client_fails() {
        let scorer = AnswerScorer::new(ScoringConfig::default());
        let item = TestItem::SequenceLogicPuzzle(crate::tasks::Puzzle {
            rules: "r".to_string(),
            answer: "🐢".to_string(),
            validation: None,
        });
        let question = &item.questions()[0];
        let err = scorer.score(&MatchStrategy::Judge, &item, question, "🐢").await.unwrap_err();
        assert!(matches!(err, BenchError::InvalidQuery { .. }));
    }

    #[test]
    fn test_strategy_toml_shape() {
        let s: MatchStrategy = toml::from_str("type = \"token_set\"\ntolerance = 3").unwrap();
        assert_eq!(s, MatchStrategy::TokenSet { tolerance: 3 });
        let s: MatchStrategy = toml::from_str("type = \"symbol_sequence\"").unwrap();
        assert_eq!(s, MatchStrategy::SymbolSequence);
    }
}
