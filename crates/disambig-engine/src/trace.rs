//! Append-only decision trace with privacy-preserving redaction.
//!
//! Two line-delimited JSON sinks: the main trace receives every decision,
//! the review queue additionally receives UNKNOWN decisions with a pending
//! status. Personally identifying fields are replaced by salted hashes and
//! structural features before anything touches disk; scores, bins,
//! thresholds and the deterministic hash stay in the clear. Write failures
//! are logged and swallowed: the audit path never fails a decision.

use crate::compare::ComparisonVector;
use crate::config::EngineConfig;
use crate::determinism::{round6, salted_hash};
use crate::normalize::{detect_script, Script};
use crate::types::{Decision, DecisionResult, Mention, ScoreMode, Thresholds, TopCandidate};
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::error;

static TRAILING_INITIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]\.$").expect("initial pattern"));

const NAME_HASH_LEN: usize = 16;
const AFFILIATION_HASH_LEN: usize = 16;
const JOURNAL_HASH_LEN: usize = 12;
const JOURNAL_SAMPLES: usize = 2;

/// Redacted view of a mention name: salted hash plus structural features
/// that support manual review without exposing the name itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedactedName {
    pub hash: String,
    pub tokens: usize,
    pub length: usize,
    pub script: Script,
    pub has_initial: bool,
}

/// Redact a name under the given salt. Pure and deterministic.
#[must_use]
pub fn redact_name(name: &str, salt: &str) -> RedactedName {
    let mut hash = salted_hash(name, salt);
    hash.truncate(NAME_HASH_LEN);
    RedactedName {
        hash,
        tokens: name.split_whitespace().count(),
        length: name.chars().count(),
        script: detect_script(name),
        has_initial: TRAILING_INITIAL.is_match(name),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct RedactedMention {
    name: RedactedName,
    #[serde(skip_serializing_if = "Option::is_none")]
    orcid: Option<String>,
    affiliation: Vec<String>,
    coauthor_count: usize,
    journal_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    journal_samples: Vec<String>,
}

fn redact_mention(mention: &Mention, salt: &str) -> RedactedMention {
    let affiliation = mention
        .affiliations
        .iter()
        .map(|aff| {
            let mut hash = salted_hash(aff, salt);
            hash.truncate(AFFILIATION_HASH_LEN);
            hash
        })
        .collect();
    let journal_samples = mention
        .journals
        .iter()
        .take(JOURNAL_SAMPLES)
        .map(|journal| {
            let mut hash = salted_hash(journal, salt);
            hash.truncate(JOURNAL_HASH_LEN);
            hash
        })
        .collect();
    RedactedMention {
        name: redact_name(&mention.name, salt),
        // ORCID is a public identifier and passes through in cleartext.
        orcid: mention.orcid.clone(),
        affiliation,
        coauthor_count: mention.coauthor_ids.len(),
        journal_count: mention.journals.len(),
        journal_samples,
    }
}

#[derive(Serialize)]
struct TraceRecord<'a> {
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<&'a str>,
    mode: ScoreMode,
    decision: Decision,
    score_total: f64,
    score_components: BTreeMap<&'a str, f64>,
    comparisons: &'a ComparisonVector,
    thresholds: Thresholds,
    #[serde(skip_serializing_if = "Option::is_none")]
    best_author_id: Option<&'a str>,
    top_k: &'a [TopCandidate],
    blocking_keys: &'a [String],
    candidate_count: usize,
    deterministic_hash: &'a str,
    reason: &'a str,
    mention: RedactedMention,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a BTreeMap<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    review_status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    review_timestamp: Option<String>,
}

/// Append-only sink for redacted decision records.
///
/// Writes on one logger instance are strictly sequenced; concurrent writers
/// must be serialized by the host.
#[derive(Debug, Clone)]
pub struct TraceLogger {
    trace_path: Option<PathBuf>,
    review_path: Option<PathBuf>,
    salt: String,
}

impl TraceLogger {
    /// Build a logger over the given sinks. Parent directories are created
    /// eagerly; failures there are logged and the affected sink stays dark.
    #[must_use]
    pub fn new(
        trace_path: Option<PathBuf>,
        review_path: Option<PathBuf>,
        salt: impl Into<String>,
    ) -> Self {
        for path in [&trace_path, &review_path].into_iter().flatten() {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(err) = std::fs::create_dir_all(parent) {
                        error!(path = %parent.display(), %err, "failed to create trace directory");
                    }
                }
            }
        }
        Self {
            trace_path,
            review_path,
            salt: salt.into(),
        }
    }

    /// Logger for a validated configuration; `None` when tracing is disabled.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Option<Self> {
        if config.trace_path.is_none() && config.review_path.is_none() {
            return None;
        }
        Some(Self::new(
            config.trace_path.clone(),
            config.review_path.clone(),
            config.trace_salt.clone(),
        ))
    }

    /// Append a redacted record to the main trace; UNKNOWN decisions are
    /// duplicated into the review queue with a pending status.
    pub fn append(&mut self, result: &DecisionResult, mention: &Mention) {
        if let Some(path) = &self.trace_path {
            let record = self.build_record(result, mention, false);
            Self::write_line(path, &record);
        }
        if result.decision == Decision::Unknown {
            if let Some(path) = &self.review_path {
                let record = self.build_record(result, mention, true);
                Self::write_line(path, &record);
            }
        }
    }

    fn build_record<'a>(
        &self,
        result: &'a DecisionResult,
        mention: &'a Mention,
        review: bool,
    ) -> TraceRecord<'a> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        TraceRecord {
            timestamp: now.clone(),
            run_id: result.run_id.as_deref(),
            mode: result.mode,
            decision: result.decision,
            score_total: round6(result.score_total),
            score_components: result
                .score_components
                .iter()
                .map(|(feature, value)| (feature.as_str(), round6(*value)))
                .collect(),
            comparisons: &result.comparisons,
            thresholds: result.thresholds,
            best_author_id: result.best_author_id.as_deref(),
            top_k: &result.top_k,
            blocking_keys: &result.blocking_keys,
            candidate_count: result.candidate_count,
            deterministic_hash: &result.deterministic_hash,
            reason: &result.reason,
            mention: redact_mention(mention, &self.salt),
            metadata: (!mention.metadata.is_empty()).then_some(&mention.metadata),
            review_status: review.then_some("pending"),
            review_timestamp: review.then_some(now),
        }
    }

    fn write_line<T: Serialize>(path: &Path, record: &T) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(err) => {
                error!(%err, "failed to serialize trace record");
                return;
            }
        };
        let appended = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(err) = appended {
            error!(path = %path.display(), %err, "failed to write trace record");
        }
    }
}
