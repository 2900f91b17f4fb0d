//! Item set persistence as JSON files

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TestItem, Variant};

/// Error type for item set loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Item {index} is a {found} item in a {expected} set")]
    VariantMismatch {
        index: usize,
        expected: Variant,
        found: Variant,
    },
}

/// Accepted items of one variant, as generated together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSet {
    pub variant: Variant,
    pub generator_model: String,
    pub validator_model: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<TestItem>,
}

impl ItemSet {
    pub fn new(variant: Variant, generator_model: impl Into<String>, validator_model: impl Into<String>) -> Self {
        Self {
            variant,
            generator_model: generator_model.into(),
            validator_model: validator_model.into(),
            created_at: Utc::now(),
            items: Vec::new(),
        }
    }

    /// Total questions across all items
    pub fn question_count(&self) -> usize {
        self.items.iter().map(|item| item.questions().len()).sum()
    }

    fn check_variants(&self) -> Result<(), LoadError> {
        for (index, item) in self.items.iter().enumerate() {
            if item.variant() != self.variant {
                return Err(LoadError::VariantMismatch {
                    index,
                    expected: self.variant,
                    found: item.variant(),
                });
            }
        }
        Ok(())
    }
}

/// Load an item set from a JSON file
pub fn load_item_set(path: impl AsRef<Path>) -> Result<ItemSet, LoadError> {
    let content = std::fs::read_to_string(path)?;
    load_item_set_from_str(&content)
}

/// Parse an item set from a JSON string
pub fn load_item_set_from_str(content: &str) -> Result<ItemSet, LoadError> {
    let set: ItemSet = serde_json::from_str(content)?;
    set.check_variants()?;
    Ok(set)
}

/// Write an item set as pretty JSON, creating parent directories
pub fn save_item_set(set: &ItemSet, path: impl AsRef<Path>) -> Result<(), LoadError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(set)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{ContextualPassage, Puzzle, Validation};

    fn passage() -> TestItem {
        TestItem::ContextualDissonance(ContextualPassage {
            topic: "Bridges".to_string(),
            irrelevant_topic: "Card games".to_string(),
            passage: "Arches spread load. Bridge is played with 52 cards.".to_string(),
            irrelevant_sentence: "Bridge is played with 52 cards.".to_string(),
            validation: Some(Validation {
                analysis: "Only the second sentence drifts.".to_string(),
                valid: true,
            }),
        })
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sets").join("dissonance.json");

        let mut set = ItemSet::new(Variant::ContextualDissonance, "gen", "val");
        set.items.push(passage());
        save_item_set(&set, &path).unwrap();

        let loaded = load_item_set(&path).unwrap();
        assert_eq!(loaded.variant, Variant::ContextualDissonance);
        assert_eq!(loaded.items, set.items);
        assert_eq!(loaded.question_count(), 1);
    }

    #[test]
    fn test_mixed_variants_rejected() {
        let mut set = ItemSet::new(Variant::ContextualDissonance, "gen", "val");
        set.items.push(passage());
        set.items.push(TestItem::SequenceLogicPuzzle(Puzzle {
            rules: "r".to_string(),
            answer: "a".to_string(),
            validation: None,
        }));
        let json = serde_json::to_string(&set).unwrap();

        let err = load_item_set_from_str(&json).unwrap_err();
        assert!(matches!(err, LoadError::VariantMismatch { index: 1, .. }));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(load_item_set("/nonexistent/set.json"), Err(LoadError::Io(_))));
    }
}
