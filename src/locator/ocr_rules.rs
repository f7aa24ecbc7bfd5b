//! Clean-up functions and match predicates for recognised text

use crate::error::{RecogError, RecogResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A text clean-up step. Chains run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrCleanUp {
    None,
    Trim,
    RemoveAllDigits,
    RemoveAllNonDigits,
    RemoveAllSpaces,
    RemoveAllWordChars,
    RemoveAllNonWordChars,
}

fn class_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    // Patterns are fixed ASCII classes, compilation cannot fail
    cell.get_or_init(|| Regex::new(pattern).unwrap_or_else(|_| unreachable!("{pattern}")))
}

impl OcrCleanUp {
    pub fn apply(&self, text: &str) -> String {
        static DIGITS: OnceLock<Regex> = OnceLock::new();
        static NON_DIGITS: OnceLock<Regex> = OnceLock::new();
        static SPACES: OnceLock<Regex> = OnceLock::new();
        static WORD: OnceLock<Regex> = OnceLock::new();
        static NON_WORD: OnceLock<Regex> = OnceLock::new();

        let regex = match self {
            OcrCleanUp::None => return text.to_string(),
            OcrCleanUp::Trim => return text.trim().to_string(),
            OcrCleanUp::RemoveAllDigits => class_regex(&DIGITS, "[0-9]"),
            OcrCleanUp::RemoveAllNonDigits => class_regex(&NON_DIGITS, "[^0-9]"),
            OcrCleanUp::RemoveAllSpaces => class_regex(&SPACES, r"[ \t\n\x0B\f\r]"),
            OcrCleanUp::RemoveAllWordChars => class_regex(&WORD, "[a-zA-Z_0-9]"),
            OcrCleanUp::RemoveAllNonWordChars => class_regex(&NON_WORD, "[^a-zA-Z_0-9]"),
        };
        regex.replace_all(text, "").into_owned()
    }
}

/// Run a clean-up chain over `text`.
pub fn clean_up(text: &str, chain: &[OcrCleanUp]) -> String {
    chain
        .iter()
        .fold(text.to_string(), |acc, step| step.apply(&acc))
}

/// How recognised text is compared against the search term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrTest {
    /// Trimmed text equals the term
    #[default]
    Equals,
    EqualsIgnoreCase,
    Contains,
    ContainsIgnoreCase,
    /// The whole text matches the term as a regular expression
    Regex,
}

/// A compiled [`OcrTest`] bound to its search term.
#[derive(Debug, Clone)]
pub enum TextPredicate {
    Equals(String),
    EqualsIgnoreCase(String),
    Contains(String),
    ContainsIgnoreCase(String),
    Regex(Regex),
}

impl OcrTest {
    pub fn compile(&self, search_term: &str) -> RecogResult<TextPredicate> {
        Ok(match self {
            OcrTest::Equals => TextPredicate::Equals(search_term.to_string()),
            OcrTest::EqualsIgnoreCase => {
                TextPredicate::EqualsIgnoreCase(search_term.to_lowercase())
            }
            OcrTest::Contains => TextPredicate::Contains(search_term.to_string()),
            OcrTest::ContainsIgnoreCase => {
                TextPredicate::ContainsIgnoreCase(search_term.to_lowercase())
            }
            OcrTest::Regex => {
                let anchored = format!("^(?:{search_term})$");
                let regex = Regex::new(&anchored)
                    .map_err(|e| RecogError::config("search_term", e.to_string()))?;
                TextPredicate::Regex(regex)
            }
        })
    }
}

impl TextPredicate {
    pub fn test(&self, text: &str) -> bool {
        match self {
            TextPredicate::Equals(term) => text.trim() == term,
            TextPredicate::EqualsIgnoreCase(term) => text.trim().to_lowercase() == *term,
            TextPredicate::Contains(term) => text.contains(term.as_str()),
            TextPredicate::ContainsIgnoreCase(term) => text.to_lowercase().contains(term.as_str()),
            TextPredicate::Regex(regex) => regex.is_match(text),
        }
    }
}
