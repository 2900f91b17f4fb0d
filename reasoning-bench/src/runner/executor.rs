//! Async evaluator for running item sets against models under test

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::analysis::AnswerScorer;
use crate::config::BenchmarkConfig;
use crate::error::{BenchError, BenchResult};
use crate::query::{QueryClient, QuerySpec};
use crate::results::TestScore;
use crate::tasks::{ItemSet, Variant};

/// Configuration for the executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum (test, model) evaluations in flight
    pub parallel_requests: usize,
    pub answer_max_tokens: u32,
    pub answer_temperature: f32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from(&BenchmarkConfig::default())
    }
}

impl From<&BenchmarkConfig> for ExecutorConfig {
    fn from(config: &BenchmarkConfig) -> Self {
        Self {
            parallel_requests: config.parallel_requests.max(1),
            answer_max_tokens: config.answer_max_tokens,
            answer_temperature: config.answer_temperature,
        }
    }
}

/// Puts every question of an item set to a model and scores the answers
#[derive(Clone)]
pub struct Executor {
    config: ExecutorConfig,
    client: QueryClient,
    scorer: Arc<AnswerScorer>,
    semaphore: Arc<Semaphore>,
    progress: Arc<dyn ProgressCallback>,
}

impl Executor {
    pub fn new(client: QueryClient, scorer: AnswerScorer, config: ExecutorConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.parallel_requests));
        Self {
            config,
            client,
            scorer: Arc::new(scorer),
            semaphore,
            progress: Arc::new(NoOpProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Evaluate one model against one item set.
    ///
    /// Any failed query or scoring step fails the whole evaluation; no
    /// answer is ever recorded as a miss because its request failed.
    pub async fn evaluate(&self, set: &ItemSet, model: &str) -> BenchResult<TestScore> {
        // The semaphore is never closed, so acquire cannot fail
        let _permit = self.semaphore.acquire().await.ok();

        let strategy = self.scorer.strategy_for(set.variant);
        let total = set.question_count();
        self.progress.on_evaluation_start(set.variant, model, total);

        let mut matches = Vec::with_capacity(total);
        let mut answers = Vec::with_capacity(total);
        let mut validations = Vec::with_capacity(total);

        for item in &set.items {
            for question in item.questions() {
                let spec = QuerySpec::user(question.prompt.as_str())
                    .with_temperature(self.config.answer_temperature)
                    .with_max_tokens(self.config.answer_max_tokens);
                let answer = self.client.query_text(model, &spec).await?;
                let answer = answer.trim().to_string();

                let verdict = self.scorer.score(&strategy, item, &question, &answer).await?;
                tracing::debug!(
                    "{} {} q{}: matched={} similarity={:?}",
                    model,
                    set.variant,
                    question.index,
                    verdict.matched,
                    verdict.similarity
                );

                matches.push(verdict.matched);
                answers.push(answer);
                validations.push(verdict.validation);
                self.progress.on_question(model, matches.len(), total);
            }
        }

        let score = TestScore::new(set.variant, model, matches)?
            .with_answers(answers)
            .with_validations(validations)
            .with_strategy(strategy.name());

        tracing::info!(
            "{} on {}: {:.3} over {} questions",
            model,
            set.variant,
            score.total_score,
            score.question_count()
        );
        self.progress
            .on_evaluation_complete(set.variant, model, Some(score.total_score));
        Ok(score)
    }

    /// Evaluate several models in parallel, bounded by `parallel_requests`.
    ///
    /// Results come back in `models` order, each with its own outcome.
    pub async fn evaluate_models(&self, set: Arc<ItemSet>, models: &[String]) -> Vec<(String, BenchResult<TestScore>)> {
        let mut handles = Vec::new();

        for model in models {
            let executor = self.clone();
            let set = set.clone();
            let task_model = model.clone();

            let handle = tokio::spawn(async move {
                let model = task_model;
                let result = executor.evaluate(&set, &model).await;
                if let Err(e) = &result {
                    tracing::error!("Evaluation of {} on {} failed: {}", model, set.variant, e);
                    executor.progress.on_evaluation_complete(set.variant, &model, None);
                }
                (model, result)
            });

            handles.push((model.clone(), handle));
        }

        let mut results = Vec::new();
        for (model, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!("Evaluation task for {} panicked: {}", model, e);
                    self.progress.on_evaluation_complete(set.variant, &model, None);
                    let error = BenchError::EvaluationAborted {
                        model: model.clone(),
                        message: e.to_string(),
                    };
                    results.push((model, Err(error)));
                }
            }
        }

        results
    }
}

/// Progress callback for tracking evaluations
pub trait ProgressCallback: Send + Sync {
    fn on_evaluation_start(&self, test: Variant, model: &str, questions: usize);
    fn on_question(&self, model: &str, answered: usize, total: usize);
    fn on_evaluation_complete(&self, test: Variant, model: &str, score: Option<f64>);
}

/// Default no-op progress callback
pub struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_evaluation_start(&self, _test: Variant, _model: &str, _questions: usize) {}
    fn on_question(&self, _model: &str, _answered: usize, _total: usize) {}
    fn on_evaluation_complete(&self, _test: Variant, _model: &str, _score: Option<f64>) {}
}

/// Console progress callback
pub struct ConsoleProgress;

impl ProgressCallback for ConsoleProgress {
    fn on_evaluation_start(&self, test: Variant, model: &str, questions: usize) {
        println!("  Starting {} on {} ({} questions)...", test, model, questions);
    }

    fn on_question(&self, _model: &str, _answered: usize, _total: usize) {}

    fn on_evaluation_complete(&self, test: Variant, model: &str, score: Option<f64>) {
        match score {
            Some(score) => println!("  OK {} on {}: {:.1}%", test, model, score * 100.0),
            None => println!("  FAILED {} on {}", test, model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::analysis::MatchStrategy;
    use crate::config::ScoringConfig;
    use crate::error::BenchError;
    use crate::providers::{
        ConnectionParams, ProviderError, ProviderKind, ProviderMap, ProviderRegistry, ScriptedProvider,
    };
    use crate::tasks::{ContextualPassage, Puzzle, TestItem};

    fn client_with(provider: Arc<ScriptedProvider>, models: &[&str]) -> QueryClient {
        let mut builder = ProviderRegistry::builder()
            .connection(ProviderKind::Local, ConnectionParams::new("http://localhost:1234/v1", None));
        for model in models {
            builder = builder.model(*model, ProviderKind::Local, None).unwrap();
        }
        let mut providers: ProviderMap = HashMap::new();
        providers.insert(ProviderKind::Local, provider);
        QueryClient::new(Arc::new(builder.build()), providers)
    }

    fn puzzle_set(answers: &[&str]) -> ItemSet {
        let mut set = ItemSet::new(Variant::SequenceLogicPuzzle, "gen", "val");
        for answer in answers {
            set.items.push(TestItem::SequenceLogicPuzzle(Puzzle {
                rules: format!("The only valid order is {}", answer),
                answer: answer.to_string(),
                validation: None,
            }));
        }
        set
    }

    #[tokio::test]
    async fn test_evaluate_scores_each_question() {
        // The model always answers with the first puzzle's sequence
        let provider = Arc::new(ScriptedProvider::fixed(ProviderKind::Local, "  🐶, 🍖, 🐾\n"));
        let client = client_with(provider.clone(), &["phi-2"]);
        let executor = Executor::new(client, AnswerScorer::new(ScoringConfig::default()), ExecutorConfig::default());

        let set = puzzle_set(&["🐶, 🍖, 🐾", "🍖, 🐶, 🐾", "🐶 🍖 🐾", "🐾, 🍖, 🐶"]);
        let score = executor.evaluate(&set, "phi-2").await.unwrap();

        assert_eq!(score.individual_scores, vec![true, false, true, false]);
        assert_eq!(score.total_score, 0.5);
        assert_eq!(score.full_answers[0], "🐶, 🍖, 🐾");
        assert_eq!(score.full_validations.len(), 4);
        assert_eq!(score.strategy.as_deref(), Some("symbol_sequence"));
        assert_eq!(provider.call_count(), 4);
        // Answers are free text, never schema-constrained
        assert!(provider.requests().iter().all(|r| r.response_format.is_none()));
    }

    #[tokio::test]
    async fn test_failed_query_is_not_a_miss() {
        let provider = Arc::new(ScriptedProvider::new(ProviderKind::Local, |_| {
            Err(ProviderError::Api {
                status: 500,
                message: "model crashed".to_string(),
            })
        }));
        let client = client_with(provider, &["phi-2"]);
        let executor = Executor::new(client, AnswerScorer::new(ScoringConfig::default()), ExecutorConfig::default());

        let err = executor.evaluate(&puzzle_set(&["🐶"]), "phi-2").await.unwrap_err();
        assert!(matches!(err, BenchError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_empty_set_fails() {
        let provider = Arc::new(ScriptedProvider::fixed(ProviderKind::Local, "x"));
        let client = client_with(provider, &["phi-2"]);
        let executor = Executor::new(client, AnswerScorer::new(ScoringConfig::default()), ExecutorConfig::default());

        let err = executor.evaluate(&puzzle_set(&[]), "phi-2").await.unwrap_err();
        assert!(matches!(err, BenchError::EmptyQuestionSet { .. }));
    }

    #[tokio::test]
    async fn test_judge_strategy_records_validations() {
        let provider = Arc::new(ScriptedProvider::new(ProviderKind::Local, |req| {
            if req.model == "judge" {
                Ok(r#"{"analysis": "this is the planted sentence", "valid": true}"#.to_string())
            } else {
                Ok("Volcanoes are popular with tourists.".to_string())
            }
        }));
        let client = client_with(provider.clone(), &["phi-2", "judge"]);

        let mut scoring = ScoringConfig::default();
        scoring
            .strategies
            .insert(Variant::ContextualDissonance, MatchStrategy::Judge);
        let scorer = AnswerScorer::new(scoring).with_judge(client.clone(), "judge");
        let executor = Executor::new(client, scorer, ExecutorConfig::default());

        let mut set = ItemSet::new(Variant::ContextualDissonance, "gen", "val");
        set.items.push(TestItem::ContextualDissonance(ContextualPassage {
            topic: "Volcanoes".to_string(),
            irrelevant_topic: "Tourism".to_string(),
            passage: "Magma rises. Volcanoes are popular with tourists. Lava cools.".to_string(),
            irrelevant_sentence: "Volcanoes are popular with tourists.".to_string(),
            validation: None,
        }));

        let score = executor.evaluate(&set, "phi-2").await.unwrap();
        assert_eq!(score.individual_scores, vec![true]);
        assert!(score.full_validations[0].as_ref().unwrap().valid);
        assert_eq!(score.strategy.as_deref(), Some("judge"));

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].model, "judge");
        assert!(requests[1].response_format.is_some());
    }

    #[tokio::test]
    async fn test_evaluate_models_keeps_per_model_outcomes() {
        let provider = Arc::new(ScriptedProvider::fixed(ProviderKind::Local, "🐶"));
        let client = client_with(provider, &["phi-2", "una-cybertron-7b-v2-bf16"]);
        let config = ExecutorConfig {
            parallel_requests: 1,
            ..ExecutorConfig::default()
        };
        let executor = Executor::new(client, AnswerScorer::new(ScoringConfig::default()), config);

        let models = vec![
            "phi-2".to_string(),
            "unregistered".to_string(),
            "una-cybertron-7b-v2-bf16".to_string(),
        ];
        let results = executor.evaluate_models(Arc::new(puzzle_set(&["🐶"])), &models).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, "phi-2");
        assert_eq!(results[0].1.as_ref().unwrap().total_score, 1.0);
        assert!(matches!(results[1].1, Err(BenchError::UnknownModel { .. })));
        assert!(results[2].1.is_ok());
    }

    #[tokio::test]
    async fn test_panicked_evaluation_keeps_its_slot() {
        let provider = Arc::new(ScriptedProvider::new(ProviderKind::Local, |req| {
            if req.model == "crashy" {
                panic!("backend blew up");
            }
            Ok("🐶".to_string())
        }));
        let client = client_with(provider, &["phi-2", "crashy", "una-cybertron-7b-v2-bf16"]);
        let executor = Executor::new(client, AnswerScorer::new(ScoringConfig::default()), ExecutorConfig::default());

        let models = vec![
            "phi-2".to_string(),
            "crashy".to_string(),
            "una-cybertron-7b-v2-bf16".to_string(),
        ];
        let results = executor.evaluate_models(Arc::new(puzzle_set(&["🐶"])), &models).await;

        assert_eq!(results.len(), models.len());
        let names: Vec<&str> = results.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(names, vec!["phi-2", "crashy", "una-cybertron-7b-v2-bf16"]);
        assert!(results[0].1.is_ok());
        match &results[1].1 {
            Err(e @ BenchError::EvaluationAborted { .. }) => assert_eq!(e.model(), Some("crashy")),
            other => panic!("unexpected outcome: {:?}", other.as_ref().map(|s| s.total_score)),
        }
        assert!(results[2].1.is_ok());
    }
}
