//! Answer Scorer: similarity strategies, embeddings and aggregation

pub mod embedding;
pub mod scoring;
pub mod similarity;

pub use embedding::{semantic_similarity, Embedder, HttpEmbedder};
pub use scoring::{
    aggregate, AnswerScorer, ConfidenceInterval, MatchStrategy, QuestionVerdict, Z_95,
};
pub use similarity::{
    char_wb_ngrams, cosine_similarity, normalize, sentences_match, subword_similarity,
    symbol_sequence, symbols_match, tfidf_similarity, tokenize,
};
