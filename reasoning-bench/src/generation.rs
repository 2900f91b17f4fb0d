//! Item Generator: generate a candidate item, then have a model validate it
//!
//! Each attempt is strictly ordered: the validation request is only built
//! from the generator's decoded output. A rejected or malformed candidate
//! is discarded and regenerated, up to `max_attempts` times. Provider and
//! registry failures are not retried here.

use crate::config::GenerationConfig;
use crate::error::{BenchError, BenchResult};
use crate::query::{QueryClient, QuerySpec, StructuredOutput};
use crate::tasks::{
    City, CityNameList, ContextualPassage, ItemSet, PassageTopicList, Puzzle, TestItem, Validation,
    Variant,
};

/// Result of one generate-then-validate attempt
enum Attempt {
    Accepted(TestItem),
    Rejected(String),
}

/// Produces validated test items
pub struct ItemGenerator {
    client: QueryClient,
    generator_model: String,
    validator_model: String,
    max_attempts: u32,
    temperature: f32,
    max_tokens: u32,
}

impl ItemGenerator {
    pub fn new(client: QueryClient, config: &GenerationConfig) -> Self {
        Self {
            client,
            generator_model: config.generator_model.clone(),
            validator_model: config.validator_model.clone(),
            max_attempts: config.max_attempts.max(1),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn generator_model(&self) -> &str {
        &self.generator_model
    }

    pub fn validator_model(&self) -> &str {
        &self.validator_model
    }

    fn generation_spec(&self, prompt: String) -> QuerySpec {
        QuerySpec::user(prompt)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }

    async fn generate_payload<T: StructuredOutput>(&self, prompt: String) -> BenchResult<T> {
        self.client
            .query_structured(&self.generator_model, &self.generation_spec(prompt))
            .await
    }

    async fn validate(&self, prompt: String) -> BenchResult<Validation> {
        let spec = QuerySpec::user(prompt)
            .with_temperature(0.0)
            .with_max_tokens(self.max_tokens);
        self.client
            .query_structured(&self.validator_model, &spec)
            .await
    }

    /// Seed topics for contextual dissonance passages
    pub async fn topics(&self) -> BenchResult<Vec<String>> {
        let list: PassageTopicList = self
            .generate_payload(PassageTopicList::generation_prompt())
            .await?;
        tracing::info!("Generated {} passage topics", list.topics.len());
        Ok(list.topics)
    }

    /// Seed names for spatial reasoning cities
    pub async fn city_names(&self) -> BenchResult<Vec<String>> {
        let list: CityNameList = self
            .generate_payload(CityNameList::generation_prompt())
            .await?;
        tracing::info!("Generated {} city names", list.city_names.len());
        Ok(list.city_names)
    }

    /// Generate one accepted item.
    ///
    /// `seed` is the passage topic or city name; puzzles ignore it.
    pub async fn generate(&self, variant: Variant, seed: Option<&str>) -> BenchResult<TestItem> {
        let mut last_reason = String::new();

        for attempt in 1..=self.max_attempts {
            let outcome = match self.attempt(variant, seed).await {
                Ok(outcome) => outcome,
                Err(BenchError::SchemaViolation { model, detail, .. }) => {
                    Attempt::Rejected(format!("{} returned a malformed item: {}", model, detail))
                }
                Err(e) => return Err(e),
            };

            match outcome {
                Attempt::Accepted(item) => {
                    tracing::info!("Accepted {} item on attempt {}/{}", variant, attempt, self.max_attempts);
                    return Ok(item);
                }
                Attempt::Rejected(reason) => {
                    tracing::warn!(
                        "Rejected {} item on attempt {}/{}: {}",
                        variant,
                        attempt,
                        self.max_attempts,
                        reason
                    );
                    last_reason = reason;
                }
            }
        }

        Err(BenchError::ItemGenerationExhausted {
            variant,
            attempts: self.max_attempts,
            last_reason,
        })
    }

    async fn attempt(&self, variant: Variant, seed: Option<&str>) -> BenchResult<Attempt> {
        match variant {
            Variant::SequenceLogicPuzzle => {
                let mut puzzle: Puzzle = self.generate_payload(Puzzle::generation_prompt()).await?;
                let validation = self.validate(puzzle.validation_prompt(&puzzle.answer)).await?;
                if !validation.valid {
                    return Ok(Attempt::Rejected(validation.analysis));
                }
                puzzle.validation = Some(validation);
                Ok(Attempt::Accepted(TestItem::SequenceLogicPuzzle(puzzle)))
            }
            Variant::ContextualDissonance => {
                let topic = self.require_seed(variant, seed)?;
                let mut passage: ContextualPassage = self
                    .generate_payload(ContextualPassage::generation_prompt(topic))
                    .await?;
                let validation = self
                    .validate(passage.validation_prompt(&passage.irrelevant_sentence))
                    .await?;
                if !validation.valid {
                    return Ok(Attempt::Rejected(validation.analysis));
                }
                passage.validation = Some(validation);
                Ok(Attempt::Accepted(TestItem::ContextualDissonance(passage)))
            }
            Variant::SpatialReasoning => {
                let city_name = self.require_seed(variant, seed)?;
                let City { name, description, qna } = self
                    .generate_payload::<City>(City::generation_prompt(city_name))
                    .await?;

                // Each question is judged on its own; failed ones are dropped
                let mut accepted = Vec::with_capacity(qna.len());
                let mut last_analysis = String::new();
                for mut qna in qna {
                    let validation = self
                        .validate(qna.validation_prompt(&description, &qna.answer))
                        .await?;
                    if validation.valid {
                        qna.validation = Some(validation);
                        accepted.push(qna);
                    } else {
                        last_analysis = validation.analysis;
                    }
                }

                if accepted.is_empty() {
                    return Ok(Attempt::Rejected(format!(
                        "no question about {} passed validation: {}",
                        name, last_analysis
                    )));
                }
                Ok(Attempt::Accepted(TestItem::SpatialReasoning(City {
                    name,
                    description,
                    qna: accepted,
                })))
            }
        }
    }

    fn require_seed<'a>(&self, variant: Variant, seed: Option<&'a str>) -> BenchResult<&'a str> {
        seed.filter(|s| !s.trim().is_empty())
            .ok_or_else(|| BenchError::InvalidQuery {
                model: self.generator_model.clone(),
                message: format!("{} items need a seed", variant),
            })
    }

    /// Generate up to `count` items; items that exhaust their attempts are skipped
    pub async fn generate_set(&self, variant: Variant, count: usize) -> BenchResult<ItemSet> {
        let seeds: Vec<Option<String>> = match variant {
            Variant::SequenceLogicPuzzle => vec![None; count],
            Variant::ContextualDissonance => self.topics().await?.into_iter().map(Some).collect(),
            Variant::SpatialReasoning => self.city_names().await?.into_iter().map(Some).collect(),
        };

        let mut set = ItemSet::new(variant, &self.generator_model, &self.validator_model);
        for seed in seeds.iter().take(count) {
            match self.generate(variant, seed.as_deref()).await {
                Ok(item) => set.items.push(item),
                Err(e @ BenchError::ItemGenerationExhausted { .. }) => {
                    tracing::warn!("Abandoned item: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            "Generated {} of {} requested {} items",
            set.items.len(),
            count,
            variant
        );
        Ok(set)
    }
}
