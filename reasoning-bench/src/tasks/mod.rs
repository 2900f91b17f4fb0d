//! Test variants, item payloads and item sets

pub mod loader;
pub mod variants;

pub use loader::{load_item_set, save_item_set, ItemSet, LoadError};
pub use variants::{City, CityNameList, CityQnA, ContextualPassage, PassageTopicList, Puzzle};

use serde::{Deserialize, Serialize};

use crate::query::{FieldKind, ResponseSchema, StructuredOutput};

/// One category of benchmark item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    SequenceLogicPuzzle,
    SpatialReasoning,
    ContextualDissonance,
}

impl Variant {
    pub fn all() -> Vec<Variant> {
        vec![
            Variant::SequenceLogicPuzzle,
            Variant::SpatialReasoning,
            Variant::ContextualDissonance,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::SequenceLogicPuzzle => "sequence_logic_puzzle",
            Variant::SpatialReasoning => "spatial_reasoning",
            Variant::ContextualDissonance => "contextual_dissonance",
        }
    }

    /// Human-readable title for tables
    pub fn title(&self) -> &'static str {
        match self {
            Variant::SequenceLogicPuzzle => "Sequence Logic Puzzle",
            Variant::SpatialReasoning => "Spatial Reasoning",
            Variant::ContextualDissonance => "Contextual Dissonance",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "sequence_logic_puzzle" | "puzzle" => Ok(Variant::SequenceLogicPuzzle),
            "spatial_reasoning" | "spatial" => Ok(Variant::SpatialReasoning),
            "contextual_dissonance" | "dissonance" => Ok(Variant::ContextualDissonance),
            _ => Err(format!("Unknown test variant: {}", s)),
        }
    }
}

/// A model's judgment of a proposed answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub analysis: String,
    pub valid: bool,
}

impl StructuredOutput for Validation {
    fn response_schema() -> ResponseSchema {
        ResponseSchema::new("Validation", "Analysis of a proposed answer and a verdict on it.")
            .field("analysis", "Detailed analysis of the proposed answer.", FieldKind::Text)
            .field("valid", "Whether the proposed answer is correct.", FieldKind::Boolean)
    }
}

/// One question put to a model under test
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    /// Position within the owning item
    pub index: usize,
    pub prompt: String,
    pub reference: String,
}

/// An accepted benchmark item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum TestItem {
    SequenceLogicPuzzle(Puzzle),
    SpatialReasoning(City),
    ContextualDissonance(ContextualPassage),
}

impl TestItem {
    pub fn variant(&self) -> Variant {
        match self {
            TestItem::SequenceLogicPuzzle(_) => Variant::SequenceLogicPuzzle,
            TestItem::SpatialReasoning(_) => Variant::SpatialReasoning,
            TestItem::ContextualDissonance(_) => Variant::ContextualDissonance,
        }
    }

    /// Questions this item asks, in order
    pub fn questions(&self) -> Vec<Question> {
        match self {
            TestItem::SequenceLogicPuzzle(puzzle) => vec![Question {
                index: 0,
                prompt: puzzle.question_prompt(),
                reference: puzzle.answer.clone(),
            }],
            TestItem::SpatialReasoning(city) => city
                .qna
                .iter()
                .enumerate()
                .map(|(index, qna)| Question {
                    index,
                    prompt: qna.question_prompt(&city.description),
                    reference: qna.answer.clone(),
                })
                .collect(),
            TestItem::ContextualDissonance(passage) => vec![Question {
                index: 0,
                prompt: passage.question_prompt(),
                reference: passage.irrelevant_sentence.clone(),
            }],
        }
    }

    /// Prompt asking a validator to judge `answer` for question `index`
    pub fn validation_prompt(&self, index: usize, answer: &str) -> Option<String> {
        match self {
            TestItem::SequenceLogicPuzzle(puzzle) => Some(puzzle.validation_prompt(answer)),
            TestItem::SpatialReasoning(city) => city
                .qna
                .get(index)
                .map(|qna| qna.validation_prompt(&city.description, answer)),
            TestItem::ContextualDissonance(passage) => Some(passage.validation_prompt(answer)),
        }
    }
}
