//! Engine configuration: loaded once, validated at construction, immutable
//! afterwards. Invalid combinations are rejected up front, so scoring never
//! sees a bad weight vector or m/u table.

use crate::score::{MuTable, Scorer, Weights, BASELINE_FEATURES};
use crate::types::ScoreMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Fatal configuration errors, surfaced at engine construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("similarity weights must sum to 1.0, got {sum}")]
    WeightSum { sum: f64 },
    #[error("weight for feature '{feature}' must be non-negative, got {value}")]
    NegativeWeight { feature: String, value: f64 },
    #[error("unknown feature '{feature}' in {context}")]
    UnknownFeature { feature: String, context: &'static str },
    #[error("thresholds must satisfy reject < accept, got reject={reject}, accept={accept}")]
    ThresholdOrder { accept: f64, reject: f64 },
    #[error("baseline thresholds must lie in [0, 1], got reject={reject}, accept={accept}")]
    ThresholdRange { accept: f64, reject: f64 },
    #[error("m/u for {feature}/{bin} must lie in (0, 1], got m={m}, u={u}")]
    MuRange { feature: String, bin: String, m: f64, u: f64 },
    #[error("bin '{bin}' for feature '{feature}' is not in the configured vocabulary")]
    UnknownBin { feature: String, bin: String },
    #[error("top_k must be >= 1")]
    TopK,
    #[error("max_candidates must be >= 1")]
    MaxCandidates,
    #[error("trace_salt must be non-empty when tracing is enabled")]
    EmptySalt,
}

fn default_top_k() -> usize {
    5
}

fn default_max_candidates() -> usize {
    100
}

/// The per-feature bin vocabularies of the comparison layer.
#[must_use]
pub fn default_comparison_bins() -> BTreeMap<String, Vec<String>> {
    let graded = |labels: &[&str]| labels.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
    let mut bins = BTreeMap::new();
    bins.insert("name".to_string(), graded(&["exact", "high", "medium", "low", "none"]));
    bins.insert("orcid".to_string(), graded(&["match", "missing"]));
    bins.insert("coauthor".to_string(), graded(&["high", "medium", "low", "none"]));
    bins.insert("journal".to_string(), graded(&["high", "medium", "low", "none"]));
    bins.insert(
        "affiliation".to_string(),
        graded(&["exact", "high", "medium", "low", "none"]),
    );
    bins.insert(
        "chinese_name".to_string(),
        graded(&["high", "medium", "low", "unknown"]),
    );
    bins
}

/// Everything the engine needs, in one immutable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub mode: ScoreMode,
    pub accept_threshold: f64,
    pub reject_threshold: f64,
    /// Baseline-mode weights. Ignored in Fellegi–Sunter mode.
    #[serde(default)]
    pub similarity_weights: Weights,
    /// Feature → bin vocabulary; m/u entries must reference these bins.
    #[serde(default = "default_comparison_bins")]
    pub comparison_bins: BTreeMap<String, Vec<String>>,
    /// Fellegi–Sunter parameters. Ignored in baseline mode.
    #[serde(default)]
    pub mu_table: MuTable,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// Process-wide redaction salt; sourced from the environment in
    /// deployment. Must be non-empty when tracing is enabled.
    #[serde(default)]
    pub trace_salt: String,
    /// Main trace sink; tracing is disabled when unset.
    #[serde(default)]
    pub trace_path: Option<PathBuf>,
    /// Review-queue sink for UNKNOWN decisions.
    #[serde(default)]
    pub review_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Baseline configuration with the given thresholds and weights, tracing
    /// disabled.
    #[must_use]
    pub fn baseline(accept_threshold: f64, reject_threshold: f64, weights: Weights) -> Self {
        Self {
            mode: ScoreMode::Baseline,
            accept_threshold,
            reject_threshold,
            similarity_weights: weights,
            comparison_bins: default_comparison_bins(),
            mu_table: MuTable::new(),
            top_k: default_top_k(),
            max_candidates: default_max_candidates(),
            trace_salt: String::new(),
            trace_path: None,
            review_path: None,
        }
    }

    /// Fellegi–Sunter configuration with the given thresholds and m/u table,
    /// tracing disabled.
    #[must_use]
    pub fn fellegi_sunter(accept_threshold: f64, reject_threshold: f64, mu_table: MuTable) -> Self {
        Self {
            mode: ScoreMode::Fs,
            accept_threshold,
            reject_threshold,
            similarity_weights: Weights::new(),
            comparison_bins: default_comparison_bins(),
            mu_table,
            top_k: default_top_k(),
            max_candidates: default_max_candidates(),
            trace_salt: String::new(),
            trace_path: None,
            review_path: None,
        }
    }

    /// Check every invariant a configuration must satisfy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reject_threshold >= self.accept_threshold {
            return Err(ConfigError::ThresholdOrder {
                accept: self.accept_threshold,
                reject: self.reject_threshold,
            });
        }
        if self.mode == ScoreMode::Baseline
            && (self.reject_threshold < 0.0 || self.accept_threshold > 1.0)
        {
            return Err(ConfigError::ThresholdRange {
                accept: self.accept_threshold,
                reject: self.reject_threshold,
            });
        }

        if self.mode == ScoreMode::Baseline {
            let mut sum = 0.0;
            for (feature, weight) in &self.similarity_weights {
                if !BASELINE_FEATURES.contains(&feature.as_str()) {
                    return Err(ConfigError::UnknownFeature {
                        feature: feature.clone(),
                        context: "similarity_weights",
                    });
                }
                if *weight < 0.0 {
                    return Err(ConfigError::NegativeWeight {
                        feature: feature.clone(),
                        value: *weight,
                    });
                }
                sum += weight;
            }
            if (sum - 1.0).abs() > 1e-6 {
                return Err(ConfigError::WeightSum { sum });
            }
        }

        if self.mode == ScoreMode::Fs {
            for (feature, bins) in &self.mu_table {
                let Some(vocabulary) = self.comparison_bins.get(feature) else {
                    return Err(ConfigError::UnknownFeature {
                        feature: feature.clone(),
                        context: "mu_table",
                    });
                };
                for (bin, entry) in bins {
                    if !vocabulary.contains(bin) {
                        return Err(ConfigError::UnknownBin {
                            feature: feature.clone(),
                            bin: bin.clone(),
                        });
                    }
                    let in_range = |v: f64| v > 0.0 && v <= 1.0;
                    if !in_range(entry.m) || !in_range(entry.u) {
                        return Err(ConfigError::MuRange {
                            feature: feature.clone(),
                            bin: bin.clone(),
                            m: entry.m,
                            u: entry.u,
                        });
                    }
                }
            }
        }

        if self.top_k < 1 {
            return Err(ConfigError::TopK);
        }
        if self.max_candidates < 1 {
            return Err(ConfigError::MaxCandidates);
        }
        if (self.trace_path.is_some() || self.review_path.is_some()) && self.trace_salt.is_empty() {
            return Err(ConfigError::EmptySalt);
        }
        Ok(())
    }

    /// Build the scorer for this configuration. Call after [`validate`].
    ///
    /// [`validate`]: EngineConfig::validate
    #[must_use]
    pub fn scorer(&self) -> Scorer {
        match self.mode {
            ScoreMode::Baseline => Scorer::Baseline(self.similarity_weights.clone()),
            ScoreMode::Fs => Scorer::FellegiSunter(self.mu_table.clone()),
        }
    }
}
