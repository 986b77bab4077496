//! Randomized laws for the pure layers: normalization, string similarity,
//! set similarity and rounding.

use disambig_engine::{
    canonicalize_orcid, detect_script, jaccard, levenshtein, name_similarity, normalize_affiliation,
    normalize_name, round6, Bin, ComparisonVector, Scorer, Weights,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn string_set(items: Vec<String>) -> BTreeSet<String> {
    items.into_iter().collect()
}

proptest! {
    #[test]
    fn normalize_name_is_total_and_idempotent(name in "\\PC{0,60}") {
        let once = normalize_name(&name);
        let twice = normalize_name(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn normalize_affiliation_is_total(affiliation in "\\PC{0,60}") {
        let normalized = normalize_affiliation(&affiliation);
        prop_assert!(!normalized.starts_with(' ') && !normalized.ends_with(' '));
    }

    #[test]
    fn canonicalize_orcid_is_idempotent(orcid in "[0-9Xx\\- ]{0,24}") {
        let once = canonicalize_orcid(&orcid);
        prop_assert_eq!(once.clone(), canonicalize_orcid(&once));
    }

    #[test]
    fn levenshtein_is_symmetric_with_zero_diagonal(a in "[a-z ]{0,24}", b in "[a-z ]{0,24}") {
        prop_assert_eq!(levenshtein(&a, &b), levenshtein(&b, &a));
        prop_assert_eq!(levenshtein(&a, &a), 0);
        let bound = a.chars().count().max(b.chars().count());
        prop_assert!(levenshtein(&a, &b) <= bound);
    }

    #[test]
    fn name_similarity_reflexive_and_bounded(a in "[A-Za-z. ]{1,30}", b in "[A-Za-z. ]{1,30}") {
        let sim = name_similarity(&a, &b);
        prop_assert!((0.0..=1.0).contains(&sim));
        if !normalize_name(&a).is_empty() {
            prop_assert_eq!(name_similarity(&a, &a), 1.0);
        }
    }

    #[test]
    fn jaccard_laws_hold(
        items_a in proptest::collection::vec("[a-z]{1,8}", 0..8),
        items_b in proptest::collection::vec("[a-z]{1,8}", 0..8),
    ) {
        let a = string_set(items_a);
        let b = string_set(items_b);
        let sim = jaccard(&a, &b);
        prop_assert!((0.0..=1.0).contains(&sim));
        prop_assert_eq!(jaccard(&a, &a), 1.0);
        prop_assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
        if a.is_empty() && b.is_empty() {
            prop_assert_eq!(sim, 1.0);
        } else if a.is_empty() || b.is_empty() {
            prop_assert_eq!(sim, 0.0);
        }
    }

    #[test]
    fn round6_is_idempotent_and_close(value in -1.0e6f64..1.0e6f64) {
        let rounded = round6(value);
        prop_assert_eq!(round6(rounded), rounded);
        prop_assert!((rounded - value).abs() <= 1.0e-6);
    }

    #[test]
    fn detect_script_is_total(text in "\\PC{0,40}") {
        // Must never panic, whatever the input.
        let _ = detect_script(&text);
    }

    #[test]
    fn baseline_score_stays_in_unit_interval(
        name_sim in 0.0f64..=1.0,
        coauthor_sim in 0.0f64..=1.0,
        journal_sim in 0.0f64..=1.0,
        affiliation_sim in 0.0f64..=1.0,
        orcid_match in proptest::bool::ANY,
    ) {
        let vector = ComparisonVector {
            name_sim,
            name_bin: Bin::Low,
            orcid_match,
            orcid_bin: if orcid_match { Bin::Match } else { Bin::Missing },
            coauthor_sim,
            coauthor_bin: Bin::Low,
            journal_sim,
            journal_bin: Bin::Low,
            affiliation_sim,
            affiliation_bin: Bin::Low,
            chinese_name_bin: None,
        };
        let weights: Weights = [
            ("name", 0.3),
            ("coauthor", 0.25),
            ("journal", 0.2),
            ("affiliation", 0.15),
            ("orcid", 0.1),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let (total, components) = Scorer::Baseline(weights).score(&vector);
        prop_assert!((0.0..=1.0 + 1e-12).contains(&total));
        let component_sum: f64 = components.values().sum();
        prop_assert!((total - component_sum).abs() < 1e-12);
    }
}
