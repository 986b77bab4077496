//! Scoring: weighted-sum baseline and Fellegi–Sunter log-likelihood.
//!
//! Both modes consume the same [`ComparisonVector`] and reduce it to
//! `(score_total, per-feature components)`. Feature iteration order is fixed
//! (lexicographic) so summation order, and therefore the decision hash, is
//! platform-independent.

use crate::compare::ComparisonVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Per-feature weights for the baseline scorer. Non-negative, sum 1.0,
/// validated at configuration load.
pub type Weights = BTreeMap<String, f64>;

/// Fellegi–Sunter parameters for one (feature, bin) cell:
/// `m = P(bin | same person)`, `u = P(bin | different people)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MuEntry {
    pub m: f64,
    pub u: f64,
}

/// `feature -> bin -> {m, u}`.
pub type MuTable = BTreeMap<String, BTreeMap<String, MuEntry>>;

/// Floor substituted for a zero m or u before taking the log.
pub const MU_FLOOR: f64 = 1e-10;

/// Features the baseline scorer can weight, in the fixed iteration order.
pub const BASELINE_FEATURES: [&str; 5] = ["affiliation", "coauthor", "journal", "name", "orcid"];

/// Score aggregator. The two modes are a closed set, so a tagged variant with
/// a single `score` operation covers dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Scorer {
    Baseline(Weights),
    FellegiSunter(MuTable),
}

impl Scorer {
    /// Reduce a comparison vector to `(score_total, components)`.
    ///
    /// Baseline totals lie in [0, 1]. Fellegi–Sunter totals are unbounded
    /// sums of `ln(m/u)` terms, typically within roughly [-10, +20].
    #[must_use]
    pub fn score(&self, comparisons: &ComparisonVector) -> (f64, BTreeMap<String, f64>) {
        match self {
            Scorer::Baseline(weights) => score_baseline(weights, comparisons),
            Scorer::FellegiSunter(table) => score_fellegi_sunter(table, comparisons),
        }
    }
}

fn score_baseline(weights: &Weights, comparisons: &ComparisonVector) -> (f64, BTreeMap<String, f64>) {
    let mut components = BTreeMap::new();
    let mut total = 0.0;
    for feature in BASELINE_FEATURES {
        let Some(weight) = weights.get(feature).copied().filter(|w| *w > 0.0) else {
            continue;
        };
        let Some(raw) = comparisons.raw(feature) else {
            continue;
        };
        let contribution = weight * raw;
        components.insert(feature.to_string(), contribution);
        total += contribution;
    }
    (total, components)
}

fn score_fellegi_sunter(table: &MuTable, comparisons: &ComparisonVector) -> (f64, BTreeMap<String, f64>) {
    let mut components = BTreeMap::new();
    let mut total = 0.0;
    for (feature, bin) in comparisons.bins() {
        let Some(entry) = table.get(feature).and_then(|bins| bins.get(bin.as_str())) else {
            debug!(feature, bin = bin.as_str(), "feature or bin not in m/u table, skipping");
            continue;
        };
        let llr = if entry.m <= 0.0 && entry.u <= 0.0 {
            warn!(feature, bin = bin.as_str(), "m and u are both zero, contributing 0");
            0.0
        } else if entry.u <= 0.0 {
            warn!(
                feature,
                bin = bin.as_str(),
                "u is zero, substituting floor {MU_FLOOR:e}"
            );
            (entry.m / MU_FLOOR).ln()
        } else if entry.m <= 0.0 {
            warn!(
                feature,
                bin = bin.as_str(),
                "m is zero, substituting floor {MU_FLOOR:e}"
            );
            (MU_FLOOR / entry.u).ln()
        } else {
            (entry.m / entry.u).ln()
        };
        components.insert(feature.to_string(), llr);
        total += llr;
    }
    (total, components)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::Bin;
    use pretty_assertions::assert_eq;

    fn weights(entries: &[(&str, f64)]) -> Weights {
        entries.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    fn full_match_vector() -> ComparisonVector {
        ComparisonVector {
            name_sim: 1.0,
            name_bin: Bin::Exact,
            orcid_match: true,
            orcid_bin: Bin::Match,
            coauthor_sim: 1.0,
            coauthor_bin: Bin::High,
            journal_sim: 1.0,
            journal_bin: Bin::High,
            affiliation_sim: 0.0,
            affiliation_bin: Bin::None,
            chinese_name_bin: None,
        }
    }

    #[test]
    fn test_baseline_full_match() {
        let scorer = Scorer::Baseline(weights(&[("name", 0.5), ("coauthor", 0.3), ("journal", 0.2)]));
        let (total, components) = scorer.score(&full_match_vector());
        assert!((total - 1.0).abs() < 1e-9);
        assert!((components["name"] - 0.5).abs() < 1e-9);
        assert!((components["coauthor"] - 0.3).abs() < 1e-9);
        assert!((components["journal"] - 0.2).abs() < 1e-9);
        assert!(!components.contains_key("orcid"));
    }

    #[test]
    fn test_baseline_partial_raw_values() {
        let mut vector = full_match_vector();
        vector.name_sim = 0.7;
        vector.coauthor_sim = 0.5;
        vector.journal_sim = 0.0;
        let scorer = Scorer::Baseline(weights(&[("name", 0.5), ("coauthor", 0.3), ("journal", 0.2)]));
        let (total, components) = scorer.score(&vector);
        assert!((total - 0.5).abs() < 1e-9);
        assert!((components["name"] - 0.35).abs() < 1e-9);
        assert!((components["coauthor"] - 0.15).abs() < 1e-9);
        assert!((components["journal"] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_baseline_orcid_feature_is_binary() {
        let scorer = Scorer::Baseline(weights(&[("orcid", 1.0)]));
        let (matched, _) = scorer.score(&full_match_vector());
        assert!((matched - 1.0).abs() < 1e-9);

        let (unmatched, _) = scorer.score(&ComparisonVector::default());
        assert!(unmatched.abs() < 1e-9);
    }

    #[test]
    fn test_baseline_zero_weight_features_ignored() {
        let scorer = Scorer::Baseline(weights(&[("name", 1.0), ("coauthor", 0.0)]));
        let (_, components) = scorer.score(&full_match_vector());
        assert!(components.contains_key("name"));
        assert!(!components.contains_key("coauthor"));
    }

    #[test]
    fn test_fellegi_sunter_additivity() {
        let mut table = MuTable::new();
        table.insert(
            "name".to_string(),
            [("exact".to_string(), MuEntry { m: 0.95, u: 0.01 })].into_iter().collect(),
        );
        table.insert(
            "orcid".to_string(),
            [("match".to_string(), MuEntry { m: 0.99, u: 0.001 })].into_iter().collect(),
        );

        let scorer = Scorer::FellegiSunter(table);
        let (total, components) = scorer.score(&full_match_vector());

        let expected = (0.95f64 / 0.01).ln() + (0.99f64 / 0.001).ln();
        assert!((total - expected).abs() < 1e-9);
        assert!((components["name"] - (0.95f64 / 0.01).ln()).abs() < 1e-9);
        assert!((components["orcid"] - (0.99f64 / 0.001).ln()).abs() < 1e-9);
        // Bins absent from the table are skipped silently.
        assert!(!components.contains_key("coauthor"));
        assert!(!components.contains_key("journal"));
    }

    #[test]
    fn test_fellegi_sunter_zero_u_floor() {
        let mut table = MuTable::new();
        table.insert(
            "name".to_string(),
            [("exact".to_string(), MuEntry { m: 0.9, u: 0.0 })].into_iter().collect(),
        );
        let scorer = Scorer::FellegiSunter(table);
        let (total, _) = scorer.score(&full_match_vector());
        assert!((total - (0.9f64 / MU_FLOOR).ln()).abs() < 1e-9);
    }

    #[test]
    fn test_fellegi_sunter_zero_m_floor() {
        let mut table = MuTable::new();
        table.insert(
            "name".to_string(),
            [("exact".to_string(), MuEntry { m: 0.0, u: 0.5 })].into_iter().collect(),
        );
        let scorer = Scorer::FellegiSunter(table);
        let (total, components) = scorer.score(&full_match_vector());
        assert!((total - (MU_FLOOR / 0.5).ln()).abs() < 1e-9);
        assert!(components["name"] < 0.0);
    }

    #[test]
    fn test_fellegi_sunter_both_zero_contributes_nothing() {
        let mut table = MuTable::new();
        table.insert(
            "name".to_string(),
            [("exact".to_string(), MuEntry { m: 0.0, u: 0.0 })].into_iter().collect(),
        );
        let scorer = Scorer::FellegiSunter(table);
        let (total, components) = scorer.score(&full_match_vector());
        assert_eq!(total, 0.0);
        assert_eq!(components["name"], 0.0);
    }

    #[test]
    fn test_fellegi_sunter_disagreement_negative() {
        let mut table = MuTable::new();
        table.insert(
            "name".to_string(),
            [
                ("exact".to_string(), MuEntry { m: 0.95, u: 0.01 }),
                ("none".to_string(), MuEntry { m: 0.01, u: 0.60 }),
            ]
            .into_iter()
            .collect(),
        );
        let scorer = Scorer::FellegiSunter(table);
        let (total, _) = scorer.score(&ComparisonVector::default());
        assert!(total < 0.0, "disagreement should push the score down, got {total}");
    }
}
