//! # Disambig Engine
//!
//! Incremental author disambiguation: given a stream of author *mentions*
//! (a name as printed on one publication, plus contextual evidence), assign
//! each mention to an existing canonical author, a freshly created one, or a
//! manual-review queue. The engine is online (one mention at a time, no
//! re-clustering of the past) and auditable: every decision carries a
//! reproducible score trace with the evidence that produced it.
//!
//! The pipeline per mention: a multi-key blocking index retrieves candidate
//! authors, the comparison layer produces per-feature similarities and bins,
//! a scorer (weighted-sum baseline or Fellegi–Sunter log-likelihood) reduces
//! them to a scalar, and a dual-threshold rule makes the three-way call.
//!
//! ## Determinism Guarantees
//!
//! - Candidate lists are deduplicated and sorted by author id.
//! - Ties in score break lexicographically by author id.
//! - Scores are rounded to 6 decimals before hashing; feature summation
//!   order is fixed.
//! - Every decision carries a 12-hex SHA-256 prefix over its canonicalized
//!   fields, recomputable from the decision itself.
//!
//! ## Example
//!
//! ```rust
//! use disambig_engine::{Decision, DecisionEngine, EngineConfig, InMemoryAuthorRepository, Mention};
//!
//! let weights = [("name", 0.5), ("coauthor", 0.3), ("journal", 0.2)]
//!     .into_iter()
//!     .map(|(feature, weight)| (feature.to_string(), weight))
//!     .collect();
//! let config = EngineConfig::baseline(0.70, 0.20, weights);
//! let mut engine = DecisionEngine::new(config, InMemoryAuthorRepository::new()).unwrap();
//!
//! let first = Mention::new("John Smith")
//!     .with_orcid("0000-0001-2345-6789")
//!     .with_coauthors(["au_1", "au_2"])
//!     .with_journals(["Nature"]);
//! let result = engine.decide(&first).unwrap();
//! assert_eq!(result.decision, Decision::New);
//!
//! let second = engine.decide(&first).unwrap();
//! assert_eq!(second.decision, Decision::Merge);
//! assert_eq!(second.deterministic_hash, second.recompute_hash());
//! ```

pub mod compare;
pub mod config;
pub mod determinism;
pub mod engine;
pub mod normalize;
pub mod repository;
pub mod score;
pub mod trace;
pub mod types;

// Re-export the main types and functions for convenience.
pub use compare::{
    affiliation_similarity, bin_affiliation, bin_confidence, bin_name, bin_set, compare, jaccard,
    levenshtein, name_similarity, Bin, ComparisonVector,
};
pub use config::{default_comparison_bins, ConfigError, EngineConfig};
pub use determinism::{canonical_json, fingerprint12, hash_hex, round6, salted_hash};
pub use engine::{DecisionEngine, EngineError};
pub use normalize::{
    canonicalize_orcid, detect_script, first_initial, normalize_affiliation, normalize_name,
    normalize_term, surname, surname_initial, NameNormalizer, NormalizedName, Script,
};
pub use repository::{
    author_blocking_keys, mention_blocking_keys, retrieval_keys, AuthorRepository,
    InMemoryAuthorRepository, RepositoryError,
};
pub use score::{MuEntry, MuTable, Scorer, Weights, MU_FLOOR};
pub use trace::{redact_name, RedactedName, TraceLogger};
pub use types::{
    decision_hash, Author, AuthorUpdate, Decision, DecisionResult, Mention, NewAuthor, ScoreMode,
    Thresholds, TopCandidate,
};
