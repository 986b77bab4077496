//! Core types for the disambiguation engine.
//!
//! All types are designed for deterministic serialization and stable hashing:
//! set fields are `BTreeSet`, maps are `BTreeMap`, and every emitted score is
//! rounded before it reaches a hash or a trace line.

use crate::determinism::{fingerprint12, round6};
use crate::normalize::canonicalize_orcid;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One observation of an author on one publication.
///
/// Mentions are immutable inputs: they live for the duration of a single
/// decision and are never stored. Provenance metadata (DOI, title, year) is
/// carried through to the trace but never scored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mention {
    /// The author name as printed on the publication. Required, non-empty.
    pub name: String,
    /// Canonicalized ORCID, when the upstream source supplied one.
    pub orcid: Option<String>,
    pub affiliations: BTreeSet<String>,
    /// Stable external ids of co-authors on the same publication.
    pub coauthor_ids: BTreeSet<String>,
    pub journals: BTreeSet<String>,
    /// Opaque provenance carried into the trace, never scored.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Mention {
    /// A mention with the given name and no other evidence.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            orcid: None,
            affiliations: BTreeSet::new(),
            coauthor_ids: BTreeSet::new(),
            journals: BTreeSet::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Set the ORCID, canonicalizing it on the way in.
    #[must_use]
    pub fn with_orcid(mut self, orcid: impl AsRef<str>) -> Self {
        let canonical = canonicalize_orcid(orcid.as_ref());
        self.orcid = if canonical.is_empty() { None } else { Some(canonical) };
        self
    }

    #[must_use]
    pub fn with_coauthors<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.coauthor_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_journals<I, S>(mut self, journals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.journals = journals.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_affiliations<I, S>(mut self, affiliations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affiliations = affiliations.into_iter().map(Into::into).collect();
        self
    }

    /// The mention's ORCID in canonical form, if any.
    #[must_use]
    pub fn canonical_orcid(&self) -> Option<String> {
        self.orcid
            .as_deref()
            .map(canonicalize_orcid)
            .filter(|o| !o.is_empty())
    }
}

/// Wire shape accepted from upstream producers: `affiliation` may be a single
/// string or an array, and the ORCID is canonicalized at ingest.
#[derive(Deserialize)]
struct MentionWire {
    name: String,
    #[serde(default)]
    orcid: Option<String>,
    #[serde(default)]
    affiliation: Option<OneOrMany>,
    #[serde(default)]
    coauthors: Vec<String>,
    #[serde(default)]
    journals: Vec<String>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<MentionWire> for Mention {
    fn from(wire: MentionWire) -> Self {
        let affiliations = match wire.affiliation {
            Some(OneOrMany::One(s)) => [s].into_iter().filter(|s| !s.is_empty()).collect(),
            Some(OneOrMany::Many(list)) => list.into_iter().filter(|s| !s.is_empty()).collect(),
            None => BTreeSet::new(),
        };
        let orcid = wire
            .orcid
            .as_deref()
            .map(canonicalize_orcid)
            .filter(|o| !o.is_empty());
        Self {
            name: wire.name,
            orcid,
            affiliations,
            coauthor_ids: wire.coauthors.into_iter().collect(),
            journals: wire.journals.into_iter().collect(),
            metadata: wire.metadata,
        }
    }
}

impl<'de> Deserialize<'de> for Mention {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        MentionWire::deserialize(deserializer).map(Mention::from)
    }
}

/// The canonical author entity a mention may resolve to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    /// Opaque unique id, assigned on creation, never reused.
    pub author_id: String,
    pub canonical_name: String,
    /// Every name this author has been observed under. Always contains
    /// `canonical_name`.
    pub alternate_names: BTreeSet<String>,
    /// At most one author owns a given ORCID.
    pub orcid: Option<String>,
    pub coauthor_ids: BTreeSet<String>,
    pub journals: BTreeSet<String>,
    pub affiliations: BTreeSet<String>,
    pub publication_count: u64,
    /// Disambiguation confidence in [0, 1]; capped downward on every merge.
    pub confidence: f64,
    /// Repository-monotonic tick of the last mutation.
    pub last_updated: u64,
}

/// Payload for inserting a fresh author.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewAuthor {
    pub name: String,
    pub orcid: Option<String>,
    pub affiliations: BTreeSet<String>,
    pub coauthor_ids: BTreeSet<String>,
    pub journals: BTreeSet<String>,
}

impl NewAuthor {
    pub fn from_mention(mention: &Mention) -> Self {
        Self {
            name: mention.name.clone(),
            orcid: mention.canonical_orcid(),
            affiliations: mention.affiliations.clone(),
            coauthor_ids: mention.coauthor_ids.clone(),
            journals: mention.journals.clone(),
        }
    }
}

/// Union-style delta applied to an existing author on merge.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthorUpdate {
    pub alternate_names: BTreeSet<String>,
    pub orcid: Option<String>,
    pub affiliations: BTreeSet<String>,
    pub coauthor_ids: BTreeSet<String>,
    pub journals: BTreeSet<String>,
}

impl AuthorUpdate {
    pub fn from_mention(mention: &Mention) -> Self {
        Self {
            alternate_names: [mention.name.clone()].into_iter().collect(),
            orcid: mention.canonical_orcid(),
            affiliations: mention.affiliations.clone(),
            coauthor_ids: mention.coauthor_ids.clone(),
            journals: mention.journals.clone(),
        }
    }
}

/// Three-way decision over a scored mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// `score >= accept_threshold`: merge into the best candidate.
    Merge,
    /// `score <= reject_threshold`: create a fresh author.
    New,
    /// Between the thresholds: queue for manual review.
    Unknown,
}

impl Decision {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Merge => "merge",
            Decision::New => "new",
            Decision::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scoring mode for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreMode {
    /// Weighted sum of raw similarities.
    Baseline,
    /// Fellegi–Sunter log-likelihood aggregation.
    Fs,
}

impl ScoreMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ScoreMode::Baseline => "baseline",
            ScoreMode::Fs => "fs",
        }
    }
}

impl std::str::FromStr for ScoreMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(ScoreMode::Baseline),
            "fs" => Ok(ScoreMode::Fs),
            other => Err(format!("invalid mode '{other}', expected 'baseline' or 'fs'")),
        }
    }
}

/// The dual thresholds a decision was made against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub accept: f64,
    pub reject: f64,
}

/// One entry of the ranked candidate list, scores rounded to 6 decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCandidate {
    pub author_id: String,
    pub score: f64,
    pub components: BTreeMap<String, f64>,
}

/// The full, auditable outcome of one decision. A value object: once emitted
/// it is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub decision: Decision,
    /// Set iff `decision == Merge`.
    pub best_author_id: Option<String>,
    pub score_total: f64,
    /// Per-feature contribution to `score_total`.
    pub score_components: BTreeMap<String, f64>,
    /// Raw similarities and bins for the best candidate.
    pub comparisons: crate::compare::ComparisonVector,
    pub thresholds: Thresholds,
    pub mode: ScoreMode,
    /// Ranked candidates, best first, at most `top_k` entries.
    pub top_k: Vec<TopCandidate>,
    /// Blocking keys walked during candidate retrieval.
    pub blocking_keys: Vec<String>,
    pub candidate_count: usize,
    pub run_id: Option<String>,
    /// 12-hex prefix of the SHA-256 over the canonicalized decision fields.
    pub deterministic_hash: String,
    /// Short human-readable rationale.
    pub reason: String,
}

impl DecisionResult {
    /// Recompute the deterministic hash from this result's own fields.
    ///
    /// Holds by construction: `result.deterministic_hash ==
    /// result.recompute_hash()` for every emitted result.
    #[must_use]
    pub fn recompute_hash(&self) -> String {
        decision_hash(
            self.decision,
            self.score_total,
            &self.score_components,
            self.best_author_id.as_deref(),
            self.mode,
            self.thresholds,
        )
    }
}

impl fmt::Display for DecisionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DecisionResult(decision={}, score={:.3}, best_author={}, mode={}, hash={})",
            self.decision,
            self.score_total,
            self.best_author_id.as_deref().unwrap_or("-"),
            self.mode.as_str(),
            self.deterministic_hash
        )
    }
}

/// Deterministic hash over the canonicalized decision field subset: decision,
/// rounded total, rounded components, best author, mode and thresholds, with
/// sorted keys. 12 hex characters.
#[must_use]
pub fn decision_hash(
    decision: Decision,
    score_total: f64,
    score_components: &BTreeMap<String, f64>,
    best_author_id: Option<&str>,
    mode: ScoreMode,
    thresholds: Thresholds,
) -> String {
    let components: BTreeMap<&str, f64> = score_components
        .iter()
        .map(|(k, v)| (k.as_str(), round6(*v)))
        .collect();
    let payload = serde_json::json!({
        "decision": decision.as_str(),
        "score_total": round6(score_total),
        "score_components": components,
        "best_author_id": best_author_id,
        "mode": mode.as_str(),
        "thresholds": {
            "accept": round6(thresholds.accept),
            "reject": round6(thresholds.reject),
        },
    });
    fingerprint12(&payload)
}
