//! Comparison layer: raw similarities and discrete bins.
//!
//! For a (mention, candidate) pair this module produces a [`ComparisonVector`]
//! of per-feature raw similarities plus coarse bin labels. All functions here
//! are pure; bins stabilize the input to the Fellegi–Sunter scorer while the
//! raw values feed the baseline scorer and the audit trace.

use crate::normalize::{
    canonicalize_orcid, normalize_affiliation, normalize_name, normalize_term, NameNormalizer,
};
use crate::types::{Author, Mention};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Discrete label for a similarity range.
///
/// One shared vocabulary across features; each feature draws from its own
/// subset (`match`/`missing` for ORCID, `unknown` for the plug-in feature).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bin {
    Exact,
    High,
    Medium,
    Low,
    None,
    Match,
    Missing,
    Unknown,
}

impl Bin {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Bin::Exact => "exact",
            Bin::High => "high",
            Bin::Medium => "medium",
            Bin::Low => "low",
            Bin::None => "none",
            Bin::Match => "match",
            Bin::Missing => "missing",
            Bin::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Levenshtein distance, iterative two-row DP. O(|a|·|b|) time,
/// O(min(|a|,|b|)) space, computed over chars rather than bytes.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (longer, shorter) = if a.len() >= b.len() { (&a, &b) } else { (&b, &a) };
    if shorter.is_empty() {
        return longer.len();
    }

    let mut previous: Vec<usize> = (0..=shorter.len()).collect();
    let mut current: Vec<usize> = vec![0; shorter.len() + 1];
    for (i, &c1) in longer.iter().enumerate() {
        current[0] = i + 1;
        for (j, &c2) in shorter.iter().enumerate() {
            let insertion = previous[j + 1] + 1;
            let deletion = current[j] + 1;
            let substitution = previous[j] + usize::from(c1 != c2);
            current[j + 1] = insertion.min(deletion).min(substitution);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[shorter.len()]
}

/// Edit-distance name similarity on normalized names, clamped to [0, 1].
/// Equal normalized strings short-circuit to 1.0; empty inputs yield 0.0.
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let na = normalize_name(a);
    let nb = normalize_name(b);
    if na == nb {
        return if na.is_empty() { 0.0 } else { 1.0 };
    }
    let max_len = na.chars().count().max(nb.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let similarity = 1.0 - levenshtein(&na, &nb) as f64 / max_len as f64;
    similarity.clamp(0.0, 1.0)
}

/// Jaccard similarity over normalized string sets.
///
/// Two empty sets are identical (1.0); an empty set against a non-empty one
/// shares nothing (0.0).
#[must_use]
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let na: BTreeSet<String> = a.iter().map(|s| normalize_term(s)).collect();
    let nb: BTreeSet<String> = b.iter().map(|s| normalize_term(s)).collect();
    let intersection = na.intersection(&nb).count();
    let union = na.union(&nb).count();
    if union == 0 {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let similarity = intersection as f64 / union as f64;
    similarity
}

/// Max pairwise edit-distance similarity over normalized affiliations.
/// Returns 0.0 when either side is empty.
#[must_use]
pub fn affiliation_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut best: f64 = 0.0;
    for left in a {
        let nl = normalize_affiliation(left);
        for right in b {
            let nr = normalize_affiliation(right);
            if nl == nr {
                return 1.0;
            }
            let max_len = nl.chars().count().max(nr.chars().count());
            if max_len == 0 {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let similarity = 1.0 - levenshtein(&nl, &nr) as f64 / max_len as f64;
            best = best.max(similarity.clamp(0.0, 1.0));
        }
    }
    best
}

/// Bin a name similarity. Boundaries are half-open on the lower side.
#[must_use]
pub fn bin_name(similarity: f64) -> Bin {
    if similarity >= 0.95 {
        Bin::Exact
    } else if similarity >= 0.75 {
        Bin::High
    } else if similarity >= 0.50 {
        Bin::Medium
    } else if similarity > 0.0 {
        Bin::Low
    } else {
        Bin::None
    }
}

/// Bin a set-overlap similarity (co-authors, journals).
#[must_use]
pub fn bin_set(similarity: f64) -> Bin {
    if similarity >= 0.50 {
        Bin::High
    } else if similarity >= 0.20 {
        Bin::Medium
    } else if similarity > 0.0 {
        Bin::Low
    } else {
        Bin::None
    }
}

/// Bin an affiliation similarity.
#[must_use]
pub fn bin_affiliation(similarity: f64) -> Bin {
    if similarity >= 0.90 {
        Bin::Exact
    } else if similarity >= 0.70 {
        Bin::High
    } else if similarity >= 0.40 {
        Bin::Medium
    } else if similarity > 0.0 {
        Bin::Low
    } else {
        Bin::None
    }
}

/// Bin a name-normalizer plug-in confidence.
#[must_use]
pub fn bin_confidence(confidence: f64) -> Bin {
    if confidence >= 0.8 {
        Bin::High
    } else if confidence >= 0.5 {
        Bin::Medium
    } else if confidence > 0.0 {
        Bin::Low
    } else {
        Bin::Unknown
    }
}

/// Per-feature raw similarities and bins for one (mention, candidate) pair.
///
/// A feature with data missing on either side compares as 0.0 / `none`
/// (`missing` for ORCID): absent evidence never scores as agreement. The
/// serialized form is the flat `<feature>_sim` / `<feature>_bin` map that
/// lands in trace records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonVector {
    pub name_sim: f64,
    pub name_bin: Bin,
    pub orcid_match: bool,
    pub orcid_bin: Bin,
    pub coauthor_sim: f64,
    pub coauthor_bin: Bin,
    pub journal_sim: f64,
    pub journal_bin: Bin,
    pub affiliation_sim: f64,
    pub affiliation_bin: Bin,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub chinese_name_bin: Option<Bin>,
}

impl Default for ComparisonVector {
    fn default() -> Self {
        Self {
            name_sim: 0.0,
            name_bin: Bin::None,
            orcid_match: false,
            orcid_bin: Bin::Missing,
            coauthor_sim: 0.0,
            coauthor_bin: Bin::None,
            journal_sim: 0.0,
            journal_bin: Bin::None,
            affiliation_sim: 0.0,
            affiliation_bin: Bin::None,
            chinese_name_bin: None,
        }
    }
}

impl ComparisonVector {
    /// (feature, bin) pairs in fixed lexicographic feature order, as consumed
    /// by the Fellegi–Sunter scorer. The plug-in feature appears only when a
    /// normalizer ran.
    #[must_use]
    pub fn bins(&self) -> Vec<(&'static str, Bin)> {
        let mut bins = vec![("affiliation", self.affiliation_bin)];
        if let Some(bin) = self.chinese_name_bin {
            bins.push(("chinese_name", bin));
        }
        bins.extend([
            ("coauthor", self.coauthor_bin),
            ("journal", self.journal_bin),
            ("name", self.name_bin),
            ("orcid", self.orcid_bin),
        ]);
        bins
    }

    /// Raw similarity of a baseline-scorable feature. ORCID contributes 1.0
    /// on a match and 0.0 otherwise.
    #[must_use]
    pub fn raw(&self, feature: &str) -> Option<f64> {
        match feature {
            "affiliation" => Some(self.affiliation_sim),
            "coauthor" => Some(self.coauthor_sim),
            "journal" => Some(self.journal_sim),
            "name" => Some(self.name_sim),
            "orcid" => Some(if self.orcid_match { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

/// Compare a mention against a candidate author.
///
/// Name similarity takes the max over the candidate's canonical and alternate
/// names. When a name normalizer plug-in is supplied, its normalized form is
/// compared instead of the raw mention name and its confidence becomes the
/// `chinese_name` feature.
#[must_use]
pub fn compare(
    mention: &Mention,
    author: &Author,
    normalizer: Option<&dyn NameNormalizer>,
) -> ComparisonVector {
    let mut vector = ComparisonVector::default();

    if !mention.name.trim().is_empty() && !author.canonical_name.trim().is_empty() {
        let (name_for_comparison, plugin_bin) = match normalizer {
            Some(plugin) => {
                let normalized = plugin.normalize(&mention.name);
                let bin = bin_confidence(normalized.confidence);
                (normalized.normalized_name, Some(bin))
            }
            None => (mention.name.clone(), None),
        };
        let mut similarity = name_similarity(&name_for_comparison, &author.canonical_name);
        for alternate in &author.alternate_names {
            similarity = similarity.max(name_similarity(&name_for_comparison, alternate));
        }
        vector.name_sim = similarity;
        vector.name_bin = bin_name(similarity);
        vector.chinese_name_bin = plugin_bin;
    }

    if let (Some(mention_orcid), Some(author_orcid)) = (mention.orcid.as_deref(), author.orcid.as_deref())
    {
        let matched = canonicalize_orcid(mention_orcid) == canonicalize_orcid(author_orcid);
        vector.orcid_match = matched;
        vector.orcid_bin = if matched { Bin::Match } else { Bin::Missing };
    }

    if !mention.coauthor_ids.is_empty() && !author.coauthor_ids.is_empty() {
        let similarity = jaccard(&mention.coauthor_ids, &author.coauthor_ids);
        vector.coauthor_sim = similarity;
        vector.coauthor_bin = bin_set(similarity);
    }

    if !mention.journals.is_empty() && !author.journals.is_empty() {
        let similarity = jaccard(&mention.journals, &author.journals);
        vector.journal_sim = similarity;
        vector.journal_bin = bin_set(similarity);
    }

    if !mention.affiliations.is_empty() && !author.affiliations.is_empty() {
        let similarity = affiliation_similarity(&mention.affiliations, &author.affiliations);
        vector.affiliation_sim = similarity;
        vector.affiliation_bin = bin_affiliation(similarity);
    }

    vector
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn test_author(name: &str) -> Author {
        Author {
            author_id: "au_test".to_string(),
            canonical_name: name.to_string(),
            alternate_names: [name.to_string()].into_iter().collect(),
            orcid: None,
            coauthor_ids: BTreeSet::new(),
            journals: BTreeSet::new(),
            affiliations: BTreeSet::new(),
            publication_count: 1,
            confidence: 1.0,
            last_updated: 0,
        }
    }

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("smith", "smyth"), 1);
        assert_eq!(levenshtein("ab", "ab"), 0);
    }

    #[test]
    fn test_levenshtein_symmetry() {
        assert_eq!(levenshtein("john smith", "j a smith"), levenshtein("j a smith", "john smith"));
    }

    #[test]
    fn test_name_similarity_identity_and_empties() {
        assert_eq!(name_similarity("John Smith", "john smith"), 1.0);
        assert_eq!(name_similarity("J. Smith", "J Smith"), 1.0);
        assert_eq!(name_similarity("", "John"), 0.0);
        assert_eq!(name_similarity("John", ""), 0.0);
    }

    #[test]
    fn test_name_similarity_edit_distance() {
        // "smith" vs "smyth": 1 edit over 5 chars.
        let sim = name_similarity("Smith", "Smyth");
        assert!((sim - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_jaccard_laws() {
        let a = set(&["x", "y"]);
        let empty = BTreeSet::new();
        assert_eq!(jaccard(&a, &a), 1.0);
        assert_eq!(jaccard(&a, &empty), 0.0);
        assert_eq!(jaccard(&empty, &a), 0.0);
        assert_eq!(jaccard(&empty, &empty), 1.0);
    }

    #[test]
    fn test_jaccard_overlap() {
        let a = set(&["au_1"]);
        let b = set(&["au_1", "au_2"]);
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_jaccard_normalizes_elements() {
        let a = set(&["Nature"]);
        let b = set(&["nature "]);
        assert_eq!(jaccard(&a, &b), 1.0);
    }

    #[test]
    fn test_affiliation_similarity_token_collapse() {
        let a = set(&["Harvard University"]);
        let b = set(&["Harvard Univ."]);
        assert_eq!(affiliation_similarity(&a, &b), 1.0);
        assert_eq!(affiliation_similarity(&a, &BTreeSet::new()), 0.0);
    }

    #[test]
    fn test_bin_boundaries_name() {
        assert_eq!(bin_name(0.95), Bin::Exact);
        assert_eq!(bin_name(0.9499), Bin::High);
        assert_eq!(bin_name(0.75), Bin::High);
        assert_eq!(bin_name(0.50), Bin::Medium);
        assert_eq!(bin_name(0.01), Bin::Low);
        assert_eq!(bin_name(0.0), Bin::None);
    }

    #[test]
    fn test_bin_boundaries_set_and_affiliation() {
        assert_eq!(bin_set(0.50), Bin::High);
        assert_eq!(bin_set(0.20), Bin::Medium);
        assert_eq!(bin_set(0.1999), Bin::Low);
        assert_eq!(bin_set(0.0), Bin::None);

        assert_eq!(bin_affiliation(0.90), Bin::Exact);
        assert_eq!(bin_affiliation(0.70), Bin::High);
        assert_eq!(bin_affiliation(0.40), Bin::Medium);
        assert_eq!(bin_affiliation(0.39), Bin::Low);
        assert_eq!(bin_affiliation(0.0), Bin::None);
    }

    #[test]
    fn test_compare_full_match() {
        let mut author = test_author("John Smith");
        author.orcid = Some("0000-0001-2345-6789".to_string());
        author.coauthor_ids = set(&["au_1", "au_2"]);
        author.journals = set(&["Nature"]);

        let mention = Mention::new("John Smith")
            .with_orcid("0000-0001-2345-6789")
            .with_coauthors(["au_1", "au_2"])
            .with_journals(["Nature"]);

        let vector = compare(&mention, &author, None);
        assert_eq!(vector.name_sim, 1.0);
        assert_eq!(vector.name_bin, Bin::Exact);
        assert!(vector.orcid_match);
        assert_eq!(vector.orcid_bin, Bin::Match);
        assert_eq!(vector.coauthor_sim, 1.0);
        assert_eq!(vector.coauthor_bin, Bin::High);
        assert_eq!(vector.journal_sim, 1.0);
        assert_eq!(vector.journal_bin, Bin::High);
        // Neither side has affiliations: no evidence, not agreement.
        assert_eq!(vector.affiliation_sim, 0.0);
        assert_eq!(vector.affiliation_bin, Bin::None);
        assert_eq!(vector.chinese_name_bin, None);
    }

    #[test]
    fn test_compare_uses_alternate_names() {
        let mut author = test_author("John Smith");
        author.alternate_names.insert("J. Smith".to_string());

        let mention = Mention::new("J. Smith");
        let vector = compare(&mention, &author, None);
        assert_eq!(vector.name_sim, 1.0);
        assert_eq!(vector.name_bin, Bin::Exact);
    }

    #[test]
    fn test_compare_missing_orcid_bins_missing() {
        let author = test_author("John Smith");
        let mention = Mention::new("John Smith").with_orcid("0000-0001-2345-6789");
        let vector = compare(&mention, &author, None);
        assert!(!vector.orcid_match);
        assert_eq!(vector.orcid_bin, Bin::Missing);
    }

    #[test]
    fn test_compare_differing_orcid_bins_missing() {
        let mut author = test_author("John Smith");
        author.orcid = Some("0000-0002-0000-0000".to_string());
        let mention = Mention::new("John Smith").with_orcid("0000-0001-2345-6789");
        let vector = compare(&mention, &author, None);
        assert!(!vector.orcid_match);
        assert_eq!(vector.orcid_bin, Bin::Missing);
    }

    struct FixedNormalizer;

    impl NameNormalizer for FixedNormalizer {
        fn normalize(&self, _name: &str) -> crate::normalize::NormalizedName {
            crate::normalize::NormalizedName {
                normalized_name: "Zhang Wei".to_string(),
                confidence: 0.9,
            }
        }
    }

    #[test]
    fn test_compare_with_plugin_sets_chinese_name_bin() {
        let author = test_author("Zhang Wei");
        let mention = Mention::new("张伟");
        let vector = compare(&mention, &author, Some(&FixedNormalizer));
        assert_eq!(vector.name_sim, 1.0);
        assert_eq!(vector.chinese_name_bin, Some(Bin::High));
    }

    #[test]
    fn test_bins_iteration_order_is_lexicographic() {
        let vector = ComparisonVector::default();
        let features: Vec<&str> = vector.bins().into_iter().map(|(f, _)| f).collect();
        assert_eq!(features, vec!["affiliation", "coauthor", "journal", "name", "orcid"]);

        let mut with_plugin = ComparisonVector::default();
        with_plugin.chinese_name_bin = Some(Bin::Unknown);
        let features: Vec<&str> = with_plugin.bins().into_iter().map(|(f, _)| f).collect();
        assert_eq!(
            features,
            vec!["affiliation", "chinese_name", "coauthor", "journal", "name", "orcid"]
        );
    }

    #[test]
    fn test_serialized_shape_is_flat() {
        let vector = ComparisonVector::default();
        let json = serde_json::to_value(&vector).unwrap();
        assert_eq!(json["name_bin"], "none");
        assert_eq!(json["orcid_bin"], "missing");
        assert!(json.get("chinese_name_bin").is_none());
    }
}
