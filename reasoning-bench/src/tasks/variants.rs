//! Payload shapes and prompts for each variant

use serde::{Deserialize, Serialize};

use super::Validation;
use crate::query::{FieldKind, ResponseSchema, StructuredOutput};

const ROUTE_SYNTAX: &str = "Write the route as a sequence of steps in the form ACTION (detail), \
joined by ' -> '. The actions are WALK (street or area), TURN (direction at a landmark) and \
REACH (destination). If no route exists, the answer is exactly 'NOT POSSIBLE'.";

// ============================================================================
// Sequence logic puzzle
// ============================================================================

/// Emoji sequence puzzle with a single claimed solution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Puzzle {
    pub rules: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
}

impl StructuredOutput for Puzzle {
    fn response_schema() -> ResponseSchema {
        ResponseSchema::new("Puzzle", "Rules for building an emoji sequence and its only solution.")
            .field(
                "rules",
                "Numbered rules for building a sequence of emoji symbols.",
                FieldKind::Text,
            )
            .field(
                "answer",
                "The unique sequence satisfying every rule, symbols separated by commas.",
                FieldKind::Text,
            )
    }
}

impl Puzzle {
    pub fn generation_prompt() -> String {
        "Invent a logic puzzle about ordering between five and seven emoji symbols. \
Name each symbol once with a short label, then give numbered rules about which symbols \
come before, after or next to each other. The rules must admit exactly one valid sequence. \
Return the rules and that sequence, with the symbols separated by commas."
            .to_string()
    }

    pub fn question_prompt(&self) -> String {
        format!(
            "Solve the ordering puzzle below. Here is a worked example first.

EXAMPLE RULES:
Use the symbols 🚂 (Train), 🎫 (Ticket), 🧳 (Suitcase), 🕰️ (Clock) and 🏁 (Flag).
1. 🎫 comes directly after 🧳.
2. 🕰️ is the first symbol.
3. 🚂 is not next to 🕰️.
4. 🏁 is the last symbol.
5. Every symbol appears exactly once.

EXAMPLE ANSWER: 🕰️, 🧳, 🎫, 🚂, 🏁

Now read the following rules carefully. Reply ONLY with the sequence of symbols, nothing else.
RULES:
{}

ANSWER:",
            self.rules
        )
    }

    /// Ask whether `answer` is the one sequence the rules allow
    pub fn validation_prompt(&self, answer: &str) -> String {
        format!(
            "Below are the rules of a sequence puzzle and a proposed answer. Check the answer \
against every rule, one by one, and then decide whether it is valid. The answer is only valid \
if it satisfies all rules AND no other sequence satisfies them too.
RULES: {}
PROPOSED ANSWER: {}",
            self.rules, answer
        )
    }
}

// ============================================================================
// Contextual dissonance
// ============================================================================

/// Seed list of passage topics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageTopicList {
    pub topics: Vec<String>,
}

impl StructuredOutput for PassageTopicList {
    fn response_schema() -> ResponseSchema {
        ResponseSchema::new("PassageTopicList", "Topics for short expository passages.").field(
            "topics",
            "Between 30 and 70 distinct topics.",
            FieldKind::TextList { min: Some(30), max: Some(70) },
        )
    }
}

impl PassageTopicList {
    pub fn generation_prompt() -> String {
        "List 50 distinct topics, each a few words long, that a short encyclopedic passage \
could be written about. Cover history, science, culture, economics and everyday life."
            .to_string()
    }
}

/// Passage on a topic with one planted off-topic sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualPassage {
    pub topic: String,
    pub irrelevant_topic: String,
    pub passage: String,
    pub irrelevant_sentence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
}

impl StructuredOutput for ContextualPassage {
    fn response_schema() -> ResponseSchema {
        ResponseSchema::new("ContextualPassage", "A passage with one sentence that drifts off topic.")
            .field("topic", "Topic of the passage.", FieldKind::Text)
            .field(
                "irrelevant_topic",
                "A topic that sounds related to the main one but is not about it.",
                FieldKind::Text,
            )
            .field(
                "passage",
                "Five to eight sentences on the topic, including the irrelevant sentence.",
                FieldKind::Text,
            )
            .field(
                "irrelevant_sentence",
                "The one sentence of the passage that is about the irrelevant topic, copied verbatim.",
                FieldKind::Text,
            )
    }
}

impl ContextualPassage {
    pub fn generation_prompt(topic: &str) -> String {
        format!(
            "Write a passage of five to eight sentences about '{}'. Choose a second topic that \
sounds close to it but is actually about something else, and work exactly one sentence about \
that second topic into the passage so it blends in. Return the topic, the second topic, the full \
passage and the planted sentence copied verbatim.",
            topic
        )
    }

    pub fn question_prompt(&self) -> String {
        format!(
            "Read the passage below about '{}'. Exactly one of its sentences is not about that \
topic. Here is a worked example first.

EXAMPLE PASSAGE:
Coral reefs grow where warm, shallow water lets reef-building polyps thrive. The polyps host \
algae that supply them with most of their energy through photosynthesis. Coastal tourism brings \
millions of visitors to tropical beaches every year. When water temperatures rise, the polyps \
expel their algae and the reef bleaches. Healthy reefs shelter roughly a quarter of all marine \
species.

EXAMPLE ANSWER: Coastal tourism brings millions of visitors to tropical beaches every year.

Now read the following passage carefully.

PASSAGE:
{}

Reply ONLY with the irrelevant sentence, with no comment or explanation.
ANSWER:",
            self.topic, self.passage
        )
    }

    /// Ask whether `sentence` is the one off-topic sentence of the passage
    pub fn validation_prompt(&self, sentence: &str) -> String {
        format!(
            "Below is a passage about '{}' and a sentence proposed as the only one in it that is \
not about that topic. Check that the sentence appears in the passage, that it is off topic, and \
that every other sentence is on topic. Then decide whether the proposal is valid.
PASSAGE: {}
PROPOSED SENTENCE: {}",
            self.topic, self.passage, sentence
        )
    }
}

// ============================================================================
// Spatial reasoning
// ============================================================================

/// Seed list of imaginary city names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityNameList {
    pub city_names: Vec<String>,
}

impl StructuredOutput for CityNameList {
    fn response_schema() -> ResponseSchema {
        ResponseSchema::new("CityNameList", "Names for imaginary themed cities.").field(
            "city_names",
            "Between 80 and 150 distinct city names.",
            FieldKind::TextList { min: Some(80), max: Some(150) },
        )
    }
}

impl CityNameList {
    pub fn generation_prompt() -> String {
        "List 100 distinct names for imaginary cities. Give each name a theme that hints at \
its layout, such as canals, terraces, markets or bridges."
            .to_string()
    }
}

/// Navigation question about a city with its reference route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityQnA {
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
}

impl CityQnA {
    fn response_schema() -> ResponseSchema {
        ResponseSchema::new("CityQnA", "A navigation question and its route.")
            .field("question", "How to get from one place in the city to another.", FieldKind::Text)
            .field("answer", "The route, in the required route syntax.", FieldKind::Text)
    }

    pub fn question_prompt(&self, layout: &str) -> String {
        format!(
            "Read the city layout below and answer the navigation question. {} Reply only with \
the route and no comment or explanation.

EXAMPLE ANSWER: WALK (Harbor Lane) -> TURN (left at the lighthouse) -> WALK (the fish market) -> REACH (the customs house)

CITY LAYOUT:
{}

QUESTION: {}

ANSWER:",
            ROUTE_SYNTAX, layout, self.question
        )
    }

    /// Ask whether `answer` is a correct route for this question
    pub fn validation_prompt(&self, layout: &str, answer: &str) -> String {
        format!(
            "Below are a city layout, a question about moving through it and a proposed answer. \
Decide whether the answer is a correct route given the layout. {}
CITY LAYOUT: {}

QUESTION: {}

ANSWER: {}",
            ROUTE_SYNTAX, layout, self.question, answer
        )
    }
}

/// Imaginary city with navigation questions about its layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub description: String,
    pub qna: Vec<CityQnA>,
}

impl StructuredOutput for City {
    fn response_schema() -> ResponseSchema {
        ResponseSchema::new("City", "An imaginary city layout with navigation questions.")
            .field("name", "Name of the city.", FieldKind::Text)
            .field(
                "description",
                "Detailed description of streets, landmarks and how they connect.",
                FieldKind::Text,
            )
            .field(
                "qna",
                "Between 1 and 10 navigation questions with their routes.",
                FieldKind::RecordList {
                    schema: Box::new(CityQnA::response_schema()),
                    min: Some(1),
                    max: Some(10),
                },
            )
    }
}

impl City {
    pub fn generation_prompt(name: &str) -> String {
        format!(
            "Describe the layout of an imaginary city called '{}': its streets, squares, \
landmarks and how they connect, in enough detail to plan walking routes. Then write up to ten \
questions asking how to get from one place to another, each with its answer. {} Include at least \
one question whose answer is 'NOT POSSIBLE'.",
            name, ROUTE_SYNTAX
        )
    }
}
