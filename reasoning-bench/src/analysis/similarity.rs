//! Text similarity measures for comparing answers
//!
//! All measures are symmetric and score a string against itself at the
//! maximum value. Vector measures return a cosine in `[0, 1]`.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;

fn word_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w+\b").expect("word pattern compiles"))
}

fn term_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("term pattern compiles"))
}

fn punctuation_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").expect("punctuation pattern compiles"))
}

/// Lowercase word tokens with punctuation dropped
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    word_pattern()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Lowercase and strip everything that is neither a word character nor whitespace
pub fn normalize(text: &str) -> String {
    punctuation_pattern()
        .replace_all(&text.to_lowercase(), "")
        .into_owned()
}

/// Token-set match: the word sets differ in size by at most `tolerance` and
/// one is a subset of the other. Both conditions must hold.
pub fn sentences_match(reference: &str, candidate: &str, tolerance: usize) -> bool {
    let a: BTreeSet<String> = tokenize(reference).into_iter().collect();
    let b: BTreeSet<String> = tokenize(candidate).into_iter().collect();

    a.len().abs_diff(b.len()) <= tolerance && (a.is_subset(&b) || b.is_subset(&a))
}

/// Cosine similarity of two dense vectors; 0.0 for mismatched lengths or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).min(1.0)
}

/// Sparse term vector keyed by term
type TermVector = HashMap<String, f64>;

fn sparse_cosine(a: &TermVector, b: &TermVector) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| x * y))
        .sum();
    let norm_a = a.values().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.values().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

fn counts<I: IntoIterator<Item = String>>(terms: I) -> IndexMap<String, f64> {
    let mut counts = IndexMap::new();
    for term in terms {
        *counts.entry(term).or_insert(0.0) += 1.0;
    }
    counts
}

/// TF-IDF cosine with the vocabulary and IDF fit on exactly these two strings.
///
/// Terms are lowercase runs of two or more word characters. IDF is smoothed,
/// `ln((1 + n) / (1 + df)) + 1` with `n = 2`, applied to raw term counts.
pub fn tfidf_similarity(reference: &str, candidate: &str) -> f64 {
    if reference.to_lowercase() == candidate.to_lowercase() {
        return 1.0;
    }

    let terms = |text: &str| -> Vec<String> {
        let lower = text.to_lowercase();
        term_pattern()
            .find_iter(&lower)
            .map(|m| m.as_str().to_string())
            .collect()
    };
    let docs = [counts(terms(reference)), counts(terms(candidate))];

    let n_docs = docs.len() as f64;
    let idf = |term: &str| -> f64 {
        let df = docs.iter().filter(|d| d.contains_key(term)).count() as f64;
        ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
    };

    let weigh = |doc: &IndexMap<String, f64>| -> TermVector {
        doc.iter()
            .map(|(term, tf)| (term.clone(), tf * idf(term)))
            .collect()
    };

    sparse_cosine(&weigh(&docs[0]), &weigh(&docs[1]))
}

/// Character n-grams of each whitespace-separated word, padded with one space
/// on each side. A word shorter than `n` yields its padded form once.
pub fn char_wb_ngrams(text: &str, min_n: usize, max_n: usize) -> Vec<String> {
    let mut grams = Vec::new();

    for word in text.split_whitespace() {
        let padded: Vec<char> = std::iter::once(' ')
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        let len = padded.len();

        for n in min_n..=max_n {
            let mut offset = 0;
            grams.push(padded[offset..(offset + n).min(len)].iter().collect());
            while offset + n < len {
                offset += 1;
                grams.push(padded[offset..offset + n].iter().collect());
            }
            if offset == 0 {
                break;
            }
        }
    }

    grams
}

/// Cosine of character 2- and 3-gram counts after [`normalize`]
pub fn subword_similarity(reference: &str, candidate: &str) -> f64 {
    let a = normalize(reference);
    let b = normalize(candidate);
    if a == b {
        return 1.0;
    }

    let vector = |text: &str| -> TermVector { counts(char_wb_ngrams(text, 2, 3)).into_iter().collect() };
    sparse_cosine(&vector(&a), &vector(&b))
}

// Characters that attach to the preceding symbol rather than start a new one
fn is_joiner(c: char) -> bool {
    matches!(c,
        '\u{200D}'
        | '\u{FE0E}'
        | '\u{FE0F}'
        | '\u{20E3}'
        | '\u{1F3FB}'..='\u{1F3FF}'
        | '\u{E0020}'..='\u{E007F}'
    )
}

// Digits, '#' and '*' start a keycap emoji when a keycap mark follows
fn is_keycap_base(c: char, next: Option<&char>) -> bool {
    (c.is_ascii_digit() || c == '#' || c == '*') && matches!(next, Some('\u{FE0F}' | '\u{20E3}'))
}

fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || c.is_alphanumeric()
        || c.is_ascii_punctuation()
        || matches!(c, '→' | '⇒' | '–' | '—' | '…' | '•' | '·')
}

/// Symbols of a sequence answer in order, with words and separators dropped.
///
/// Zero-width joiners, variation selectors and skin-tone modifiers stay with
/// the symbol they modify, so multi-codepoint emoji count as one symbol.
/// Keycaps such as `1️⃣` keep their digit base.
pub fn symbol_sequence(text: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    let mut join_next = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if join_next {
            if let Some(last) = symbols.last_mut() {
                last.push(c);
            }
            join_next = false;
            continue;
        }
        if is_joiner(c) {
            if let Some(last) = symbols.last_mut() {
                last.push(c);
                join_next = c == '\u{200D}';
            }
            continue;
        }
        if is_keycap_base(c, chars.peek()) {
            symbols.push(c.to_string());
            continue;
        }
        if is_separator(c) {
            continue;
        }
        symbols.push(c.to_string());
    }

    // Variation selectors are presentation only
    symbols
        .into_iter()
        .map(|s| s.chars().filter(|c| !matches!(c, '\u{FE0E}' | '\u{FE0F}')).collect())
        .collect()
}

/// Ordered symbol match. Answers without symbols compare by normalized text.
pub fn symbols_match(reference: &str, candidate: &str) -> bool {
    let a = symbol_sequence(reference);
    let b = symbol_sequence(candidate);
    if a.is_empty() && b.is_empty() {
        return normalize(reference).split_whitespace().eq(normalize(candidate).split_whitespace());
    }
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_and_normalize() {
        assert_eq!(tokenize("The cat, sat!"), vec!["the", "cat", "sat"]);
        assert_eq!(normalize("WALK (Main St.) -> REACH"), "walk main st  reach");
    }

    #[test]
    fn test_cat_on_mat_matches() {
        // {the,cat,sat,on,mat} is a subset of {the,cat,sat,on,a,mat}
        assert!(sentences_match("the cat sat on the mat", "the cat sat on a mat", 2));
        assert!(sentences_match("the cat sat on a mat", "the cat sat on the mat", 2));
    }

    #[test]
    fn test_tolerance_does_not_rescue_non_subset() {
        assert!(!sentences_match("the cat sat", "the dog sat", 2));
    }

    #[test]
    fn test_subset_outside_tolerance_fails() {
        assert!(!sentences_match("one", "one two three four", 2));
        assert!(sentences_match("one", "one two three", 2));
    }

    #[test]
    fn test_tfidf_known_value() {
        // Shared "cat" gets idf 1.0, the others ln(1.5) + 1
        let w = (1.5f64).ln() + 1.0;
        let expected = 1.0 / (1.0 + w * w);
        let sim = tfidf_similarity("cat dog", "cat fish");
        assert!((sim - expected).abs() < 1e-9, "{} vs {}", sim, expected);
    }

    #[test]
    fn test_tfidf_ignores_single_characters() {
        assert!((tfidf_similarity("a cat", "I cat") - 1.0).abs() < 1e-9);
        assert_eq!(tfidf_similarity("x", "y"), 0.0);
    }

    #[test]
    fn test_char_wb_ngrams() {
        assert_eq!(char_wb_ngrams("ab", 2, 3), vec![" a", "ab", "b ", " ab", "ab "]);
        // Single character: bigrams, then the padded word once
        assert_eq!(char_wb_ngrams("a", 2, 3), vec![" a", "a ", " a "]);
    }

    #[test]
    fn test_subword_tolerates_formatting() {
        let a = "WALK (Main Street) -> TURN (left at the fountain) -> REACH (library)";
        let b = "walk main street -> turn left at the fountain -> reach library";
        assert_eq!(subword_similarity(a, b), 1.0);

        let c = "WALK (Main Stret) -> TURN (left at the fountain) -> REACH (library)";
        let sim = subword_similarity(a, c);
        assert!(sim > 0.9 && sim < 1.0);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_symbol_sequence() {
        assert_eq!(symbol_sequence("🐶, 🍖, 🐾"), vec!["🐶", "🍖", "🐾"]);
        assert_eq!(symbol_sequence("🐶 (Dog) -> 🍖 (Bone)"), vec!["🐶", "🍖"]);
        assert_eq!(symbol_sequence("🕰️🧳"), vec!["🕰", "🧳"]);
        assert_eq!(symbol_sequence("👩‍🚀 then 👍🏽"), vec!["👩\u{200D}🚀", "👍🏽"]);
    }

    #[test]
    fn test_symbols_match_is_ordered() {
        assert!(symbols_match("🐶, 🍖, 🐾", "🐶 🍖 🐾"));
        assert!(!symbols_match("🐶, 🍖, 🐾", "🍖, 🐶, 🐾"));
        assert!(!symbols_match("🐶, 🍖, 🐾", "🐶, 🍖"));
        assert!(symbols_match("no symbols here", "No symbols, here."));
    }

    #[test]
    fn test_keycaps_are_distinct_symbols() {
        assert_eq!(symbol_sequence("🐶, 1️⃣, 🍖"), vec!["🐶", "1\u{20E3}", "🍖"]);
        assert_eq!(symbol_sequence("#️⃣ *\u{20E3}"), vec!["#\u{20E3}", "*\u{20E3}"]);
        assert!(!symbols_match("🐶, 1️⃣, 🍖", "🐶, 2️⃣, 🍖"));
        assert!(symbols_match("🐶, 1️⃣, 🍖", "🐶 1\u{20E3} 🍖"));
        // Bare digits are still words
        assert_eq!(symbol_sequence("🐶 1 🍖"), vec!["🐶", "🍖"]);
    }
}
