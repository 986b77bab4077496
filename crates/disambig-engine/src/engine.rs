//! The decision engine: retrieval → comparison → scoring → dual-threshold
//! decision → repository apply → trace.
//!
//! One engine instance processes mentions strictly in submission order and is
//! single-threaded with respect to mutation. Run several engines over
//! disjoint partitions of the stream for parallelism, or serialize access to
//! a shared repository externally.

use crate::compare::{compare, ComparisonVector};
use crate::config::{ConfigError, EngineConfig};
use crate::determinism::round6;
use crate::normalize::NameNormalizer;
use crate::repository::{retrieval_keys, AuthorRepository, RepositoryError};
use crate::score::Scorer;
use crate::trace::TraceLogger;
use crate::types::{
    decision_hash, AuthorUpdate, Decision, DecisionResult, Mention, NewAuthor, Thresholds,
    TopCandidate,
};
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Per-mention errors. Configuration problems are caught at construction;
/// at decision time only the mention itself can be at fault.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid mention: {0}")]
    InvalidMention(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

struct ScoredCandidate {
    author_id: String,
    score: f64,
    components: BTreeMap<String, f64>,
    comparisons: ComparisonVector,
}

/// Orchestrates one decision per mention over an author repository.
pub struct DecisionEngine<R: AuthorRepository> {
    repository: R,
    config: EngineConfig,
    scorer: Scorer,
    thresholds: Thresholds,
    trace: Option<TraceLogger>,
    name_normalizer: Option<Box<dyn NameNormalizer>>,
    run_id: Option<String>,
}

impl<R: AuthorRepository> DecisionEngine<R> {
    /// Validate the configuration and build an engine over the repository.
    /// Configuration errors are fatal here, never at decision time.
    pub fn new(config: EngineConfig, repository: R) -> Result<Self, ConfigError> {
        config.validate()?;
        let scorer = config.scorer();
        let thresholds = Thresholds {
            accept: config.accept_threshold,
            reject: config.reject_threshold,
        };
        let trace = TraceLogger::from_config(&config);
        Ok(Self {
            repository,
            config,
            scorer,
            thresholds,
            trace,
            name_normalizer: None,
            run_id: None,
        })
    }

    /// Tag every decision of this engine with a run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Attach a pluggable name normalizer; its confidence feeds the
    /// `chinese_name` feature.
    #[must_use]
    pub fn with_name_normalizer(mut self, normalizer: Box<dyn NameNormalizer>) -> Self {
        self.name_normalizer = Some(normalizer);
        self
    }

    #[must_use]
    pub fn repository(&self) -> &R {
        &self.repository
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decide one mention: MERGE into an existing author, create a NEW one,
    /// or mark it UNKNOWN for review. MERGE and NEW mutate the repository;
    /// UNKNOWN leaves it untouched. The returned result is final and carries
    /// its own reproducibility hash.
    pub fn decide(&mut self, mention: &Mention) -> Result<DecisionResult, EngineError> {
        if mention.name.trim().is_empty() {
            return Err(EngineError::InvalidMention(
                "mention name must be non-empty".to_string(),
            ));
        }

        let blocking_keys = retrieval_keys(mention);
        let candidates = self.repository.candidates(mention, self.config.max_candidates);
        debug!(
            candidates = candidates.len(),
            keys = blocking_keys.len(),
            "retrieved candidates via blocking"
        );

        let result = if candidates.is_empty() {
            self.assemble(
                Decision::New,
                None,
                0.0,
                BTreeMap::new(),
                ComparisonVector::default(),
                Vec::new(),
                blocking_keys,
                0,
                "no candidates retrieved, created new author".to_string(),
            )
        } else {
            let mut scored: Vec<ScoredCandidate> = candidates
                .iter()
                .map(|author| {
                    let comparisons = compare(mention, author, self.name_normalizer.as_deref());
                    let (score, components) = self.scorer.score(&comparisons);
                    ScoredCandidate {
                        author_id: author.author_id.clone(),
                        score,
                        components,
                        comparisons,
                    }
                })
                .collect();
            scored.sort_by(|a, b| {
                OrderedFloat(b.score)
                    .cmp(&OrderedFloat(a.score))
                    .then_with(|| a.author_id.cmp(&b.author_id))
            });

            let best = &scored[0];
            let decision = if best.score >= self.thresholds.accept {
                Decision::Merge
            } else if best.score <= self.thresholds.reject {
                Decision::New
            } else {
                Decision::Unknown
            };

            let top_k: Vec<TopCandidate> = scored
                .iter()
                .take(self.config.top_k)
                .map(|candidate| TopCandidate {
                    author_id: candidate.author_id.clone(),
                    score: round6(candidate.score),
                    components: candidate
                        .components
                        .iter()
                        .map(|(feature, value)| (feature.clone(), round6(*value)))
                        .collect(),
                })
                .collect();

            let best_author_id =
                (decision == Decision::Merge).then(|| best.author_id.clone());
            let reason = self.reason_for(decision, best.score, &best.author_id);
            self.assemble(
                decision,
                best_author_id,
                best.score,
                best.components.clone(),
                best.comparisons.clone(),
                top_k,
                blocking_keys,
                candidates.len(),
                reason,
            )
        };

        let result = self.apply(mention, result)?;

        if let Some(trace) = &mut self.trace {
            trace.append(&result, mention);
        }
        info!(
            decision = result.decision.as_str(),
            score = result.score_total,
            hash = %result.deterministic_hash,
            "decision made"
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        decision: Decision,
        best_author_id: Option<String>,
        score_total: f64,
        score_components: BTreeMap<String, f64>,
        comparisons: ComparisonVector,
        top_k: Vec<TopCandidate>,
        blocking_keys: Vec<String>,
        candidate_count: usize,
        reason: String,
    ) -> DecisionResult {
        let deterministic_hash = decision_hash(
            decision,
            score_total,
            &score_components,
            best_author_id.as_deref(),
            self.config.mode,
            self.thresholds,
        );
        DecisionResult {
            decision,
            best_author_id,
            score_total,
            score_components,
            comparisons,
            thresholds: self.thresholds,
            mode: self.config.mode,
            top_k,
            blocking_keys,
            candidate_count,
            run_id: self.run_id.clone(),
            deterministic_hash,
            reason,
        }
    }

    fn reason_for(&self, decision: Decision, score: f64, best_author_id: &str) -> String {
        match decision {
            Decision::Merge => format!(
                "score {score:.3} >= accept threshold {}, merged with author {best_author_id}",
                self.thresholds.accept
            ),
            Decision::New => format!(
                "score {score:.3} <= reject threshold {}, created new author",
                self.thresholds.reject
            ),
            Decision::Unknown => format!(
                "score {score:.3} in uncertain range ({} < score < {}), requires manual review",
                self.thresholds.reject, self.thresholds.accept
            ),
        }
    }

    /// Apply the decision to the repository. A NEW that collides on ORCID is
    /// converted into a MERGE with the ORCID's owner: ownership outranks the
    /// score, and the result is rewritten so its hash stays self-consistent.
    fn apply(
        &mut self,
        mention: &Mention,
        mut result: DecisionResult,
    ) -> Result<DecisionResult, EngineError> {
        match result.decision {
            Decision::Merge => {
                if let Some(best) = result.best_author_id.clone() {
                    self.repository.update(&best, AuthorUpdate::from_mention(mention))?;
                }
            }
            Decision::New => match self.repository.add(NewAuthor::from_mention(mention)) {
                Ok(_) => {}
                Err(RepositoryError::DuplicateOrcid { orcid, owner }) => {
                    self.repository.update(&owner, AuthorUpdate::from_mention(mention))?;
                    result.decision = Decision::Merge;
                    result.best_author_id = Some(owner.clone());
                    result.reason = format!(
                        "orcid {orcid} already belongs to author {owner}, merged despite score {:.3}",
                        result.score_total
                    );
                    result.deterministic_hash = decision_hash(
                        result.decision,
                        result.score_total,
                        &result.score_components,
                        result.best_author_id.as_deref(),
                        result.mode,
                        result.thresholds,
                    );
                }
                Err(err) => return Err(err.into()),
            },
            Decision::Unknown => {}
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::repository::InMemoryAuthorRepository;
    use crate::score::Weights;
    use pretty_assertions::assert_eq;

    fn weights(entries: &[(&str, f64)]) -> Weights {
        entries.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    fn engine_with(
        accept: f64,
        reject: f64,
        weights_spec: &[(&str, f64)],
    ) -> DecisionEngine<InMemoryAuthorRepository> {
        let config = EngineConfig::baseline(accept, reject, weights(weights_spec));
        DecisionEngine::new(config, InMemoryAuthorRepository::new()).unwrap()
    }

    #[test]
    fn test_invalid_mention_rejected_before_retrieval() {
        let mut engine = engine_with(0.7, 0.2, &[("name", 1.0)]);
        let err = engine.decide(&Mention::new("   ")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidMention(_)));
        assert_eq!(engine.repository().count(), 0);
    }

    #[test]
    fn test_empty_repository_yields_new() {
        let mut engine = engine_with(0.7, 0.2, &[("name", 1.0)]);
        let result = engine.decide(&Mention::new("Alice Wang")).unwrap();
        assert_eq!(result.decision, Decision::New);
        assert_eq!(result.best_author_id, None);
        assert_eq!(result.score_total, 0.0);
        assert!(result.score_components.is_empty());
        assert!(result.top_k.is_empty());
        assert_eq!(result.candidate_count, 0);
        assert_eq!(engine.repository().count(), 1);
    }

    #[test]
    fn test_score_equal_to_accept_merges() {
        let mut engine = engine_with(1.0, 0.2, &[("name", 1.0)]);
        engine.decide(&Mention::new("John Smith")).unwrap();
        let result = engine.decide(&Mention::new("John Smith")).unwrap();
        assert_eq!(result.decision, Decision::Merge);
        assert!(result.best_author_id.is_some());
        assert_eq!(engine.repository().count(), 1);
    }

    #[test]
    fn test_score_equal_to_reject_creates_new() {
        // "aaa zz" vs "bbb zz": 3 edits over 6 chars, similarity exactly 0.5;
        // the shared surname "zz" makes the first author a candidate.
        let mut engine = engine_with(0.9, 0.5, &[("name", 1.0)]);
        engine.decide(&Mention::new("aaa zz")).unwrap();
        let result = engine.decide(&Mention::new("bbb zz")).unwrap();
        assert!((result.score_total - 0.5).abs() < 1e-9);
        assert_eq!(result.decision, Decision::New);
        assert_eq!(engine.repository().count(), 2);
    }

    #[test]
    fn test_score_between_thresholds_is_unknown_and_does_not_mutate() {
        let mut engine = engine_with(0.9, 0.2, &[("name", 1.0)]);
        engine.decide(&Mention::new("aaa zz")).unwrap();
        let result = engine.decide(&Mention::new("bbb zz")).unwrap();
        assert!((result.score_total - 0.5).abs() < 1e-9);
        assert_eq!(result.decision, Decision::Unknown);
        assert_eq!(result.best_author_id, None);
        assert_eq!(result.top_k.len(), 1);
        // UNKNOWN leaves the repository untouched.
        assert_eq!(engine.repository().count(), 1);
    }

    #[test]
    fn test_merge_applies_mention_into_author() {
        let mut engine = engine_with(0.9, 0.2, &[("name", 1.0)]);
        engine.decide(&Mention::new("John Smith")).unwrap();
        let result = engine
            .decide(
                &Mention::new("John Smith")
                    .with_journals(["Nature"])
                    .with_coauthors(["au_9"]),
            )
            .unwrap();
        assert_eq!(result.decision, Decision::Merge);

        let author = engine
            .repository()
            .get(result.best_author_id.as_deref().unwrap())
            .unwrap();
        assert!(author.journals.contains("Nature"));
        assert!(author.coauthor_ids.contains("au_9"));
        assert_eq!(author.publication_count, 2);
        assert!((author.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_orcid_overrides_low_score() {
        // Name weight 0.5 keeps the weak name similarity safely under the
        // reject threshold, so the second mention lands in the NEW branch.
        let mut engine = engine_with(0.7, 0.2, &[("name", 0.5), ("coauthor", 0.3), ("journal", 0.2)]);
        let first = engine
            .decide(&Mention::new("Bob Jones").with_orcid("0000-0001-2345-6789"))
            .unwrap();
        assert_eq!(first.decision, Decision::New);
        let owner_id = engine.repository().orcid_owner("0000-0001-2345-6789").unwrap();

        let result = engine
            .decide(&Mention::new("Totally Different").with_orcid("0000-0001-2345-6789"))
            .unwrap();
        assert_eq!(result.decision, Decision::Merge);
        assert_eq!(result.best_author_id.as_deref(), Some(owner_id.as_str()));
        assert!(result.reason.contains("orcid"));
        assert_eq!(result.deterministic_hash, result.recompute_hash());
        assert_eq!(engine.repository().count(), 1);
    }

    #[test]
    fn test_tie_break_by_author_id() {
        let config = EngineConfig::baseline(0.9, 0.2, weights(&[("name", 1.0)]));
        let mut repo = InMemoryAuthorRepository::new();
        for id in ["au_b", "au_a"] {
            repo.insert(crate::types::Author {
                author_id: id.to_string(),
                canonical_name: "John Smith".to_string(),
                alternate_names: std::collections::BTreeSet::new(),
                orcid: None,
                coauthor_ids: std::collections::BTreeSet::new(),
                journals: std::collections::BTreeSet::new(),
                affiliations: std::collections::BTreeSet::new(),
                publication_count: 1,
                confidence: 1.0,
                last_updated: 0,
            })
            .unwrap();
        }
        let mut engine = DecisionEngine::new(config, repo).unwrap();
        let result = engine.decide(&Mention::new("John Smith")).unwrap();
        assert_eq!(result.decision, Decision::Merge);
        assert_eq!(result.best_author_id.as_deref(), Some("au_a"));
        assert_eq!(result.top_k[0].author_id, "au_a");
        assert_eq!(result.top_k[1].author_id, "au_b");
    }

    #[test]
    fn test_hash_self_consistency() {
        let mut engine = engine_with(0.7, 0.2, &[("name", 1.0)]);
        engine.decide(&Mention::new("John Smith")).unwrap();
        let result = engine.decide(&Mention::new("J. Smith")).unwrap();
        assert_eq!(result.deterministic_hash, result.recompute_hash());
    }

    #[test]
    fn test_run_id_propagates() {
        let mut engine = engine_with(0.7, 0.2, &[("name", 1.0)]).with_run_id("run_42");
        let result = engine.decide(&Mention::new("John Smith")).unwrap();
        assert_eq!(result.run_id.as_deref(), Some("run_42"));
    }
}
