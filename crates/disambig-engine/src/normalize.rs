//! Name and text normalization.
//!
//! Pure, total functions over strings. Blocking keys, similarity comparisons
//! and trace redaction all go through these, so the rules live in exactly
//! one place.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{P}+").expect("punctuation pattern"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static UNIVERSITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\buniversity\b").expect("university pattern"));
static INSTITUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\binstitute\b").expect("institute pattern"));
static DEPARTMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdepartment\b").expect("department pattern"));

/// Lowercase, strip punctuation (Unicode category P), collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, "");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// Lowercase and collapse whitespace. Used for set elements (co-author ids,
/// journal names) where punctuation is meaningful enough to keep.
pub fn normalize_term(text: &str) -> String {
    WHITESPACE
        .replace_all(text.to_lowercase().trim(), " ")
        .into_owned()
}

/// Affiliation normalization: on top of the name rules, collapse the common
/// institution tokens so "Harvard University" and "Harvard Univ" compare close.
pub fn normalize_affiliation(affiliation: &str) -> String {
    let lowered = affiliation.to_lowercase();
    let collapsed = UNIVERSITY.replace_all(&lowered, "univ");
    let collapsed = INSTITUTE.replace_all(&collapsed, "inst");
    let collapsed = DEPARTMENT.replace_all(&collapsed, "dept");
    let stripped = PUNCTUATION.replace_all(&collapsed, "");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// Extract the surname: the last whitespace-separated token, normalized.
/// Returns `None` when nothing survives normalization.
pub fn surname(name: &str) -> Option<String> {
    let token = name.split_whitespace().last()?;
    let normalized = normalize_name(token);
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// First initial: the first letter of the first token, uppercased.
/// A single-token name has a surname but no initial.
pub fn first_initial(name: &str) -> Option<char> {
    let mut tokens = name.split_whitespace();
    let first = tokens.next()?;
    tokens.next()?;
    first.chars().next().map(|c| c.to_ascii_uppercase())
}

/// `<surname>_<initial>` in lowercase, e.g. "John Smith" -> "smith_j".
pub fn surname_initial(name: &str) -> Option<String> {
    let surname = surname(name)?;
    let initial = first_initial(name)?;
    Some(format!("{}_{}", surname, initial.to_ascii_lowercase()))
}

/// Canonicalize an ORCID: strip the `orcid.org` URL prefix and surrounding
/// whitespace, uppercase a trailing `x` checksum digit.
pub fn canonicalize_orcid(orcid: &str) -> String {
    let trimmed = orcid.trim();
    let stripped = trimmed
        .strip_prefix("https://orcid.org/")
        .or_else(|| trimmed.strip_prefix("http://orcid.org/"))
        .unwrap_or(trimmed)
        .trim();
    let mut canonical = stripped.to_string();
    if canonical.ends_with('x') {
        canonical.pop();
        canonical.push('X');
    }
    canonical
}

/// Dominant script of a piece of text, by character-range counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    Latin,
    Cyrillic,
    Cjk,
    Mixed,
    Other,
    Empty,
}

impl Script {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Script::Latin => "latin",
            Script::Cyrillic => "cyrillic",
            Script::Cjk => "cjk",
            Script::Mixed => "mixed",
            Script::Other => "other",
            Script::Empty => "empty",
        }
    }
}

/// Detect the dominant script: a script wins when it covers more than 70% of
/// the alphabetic characters; otherwise the text is `Mixed`. Text with no
/// alphabetic characters at all is `Other`.
pub fn detect_script(text: &str) -> Script {
    if text.is_empty() {
        return Script::Empty;
    }

    let mut latin = 0usize;
    let mut cyrillic = 0usize;
    let mut cjk = 0usize;
    for c in text.chars() {
        if c.is_ascii_alphabetic() {
            latin += 1;
        } else if ('\u{0400}'..='\u{04FF}').contains(&c) {
            cyrillic += 1;
        } else if ('\u{4E00}'..='\u{9FFF}').contains(&c) {
            cjk += 1;
        }
    }

    let total = latin + cyrillic + cjk;
    if total == 0 {
        return Script::Other;
    }

    #[allow(clippy::cast_precision_loss)]
    let ratio = |count: usize| count as f64 / total as f64;
    if ratio(latin) > 0.7 {
        Script::Latin
    } else if ratio(cyrillic) > 0.7 {
        Script::Cyrillic
    } else if ratio(cjk) > 0.7 {
        Script::Cjk
    } else {
        Script::Mixed
    }
}

/// Result of a pluggable name normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedName {
    pub normalized_name: String,
    /// Normalizer confidence in [0, 1]; binned into the `chinese_name` feature.
    pub confidence: f64,
}

/// Single-method capability for an external name normalizer (e.g. a
/// Chinese-name transliteration module). Passed to the engine by the caller;
/// the core ships only the seam.
pub trait NameNormalizer: Send + Sync {
    fn normalize(&self, name: &str) -> NormalizedName;
}
