//! Author repository and multi-key blocking index.
//!
//! The repository stores canonical authors and answers candidate queries via
//! blocking keys, so a decision never scans the whole author set. The
//! in-memory implementation here is the reference; storage backends implement
//! [`AuthorRepository`] to persist.

use crate::normalize::{canonicalize_orcid, surname, surname_initial};
use crate::types::{Author, AuthorUpdate, Mention, NewAuthor};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};
use uuid::Uuid;

/// Domain errors of the repository. In-memory storage has no I/O failures;
/// ORCID ownership is the one integrity rule that can reject an insert.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("orcid {orcid} is already registered to author {owner}")]
    DuplicateOrcid { orcid: String, owner: String },
    #[error("no author with id {author_id}")]
    UnknownAuthor { author_id: String },
    #[error("author id {author_id} already exists")]
    DuplicateAuthorId { author_id: String },
}

/// Max affiliations indexed per author.
const MAX_AFFILIATION_KEYS: usize = 2;
/// Max journals indexed per author.
const MAX_JOURNAL_KEYS: usize = 3;
/// Max chars kept of an affiliation/journal key value.
const KEY_PREFIX_LEN: usize = 30;

fn prefix_key(value: &str) -> String {
    value
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .take(KEY_PREFIX_LEN)
        .collect()
}

fn push_unique(keys: &mut Vec<String>, key: String) {
    if !key.is_empty() && !keys.iter().any(|k| k == &key) {
        keys.push(key);
    }
}

fn name_keys(keys: &mut Vec<String>, name: &str) {
    if let Some(surname) = surname(name) {
        push_unique(keys, format!("surname:{surname}"));
    }
    if let Some(surname_initial) = surname_initial(name) {
        push_unique(keys, format!("surname_initial:{surname_initial}"));
    }
}

/// Every blocking key an author is indexed under: ORCID, surname and
/// surname+initial for each of its names, plus affiliation and journal
/// prefixes.
#[must_use]
pub fn author_blocking_keys(author: &Author) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(orcid) = &author.orcid {
        push_unique(&mut keys, format!("orcid:{}", canonicalize_orcid(orcid)));
    }
    name_keys(&mut keys, &author.canonical_name);
    for alternate in &author.alternate_names {
        name_keys(&mut keys, alternate);
    }
    for affiliation in author.affiliations.iter().take(MAX_AFFILIATION_KEYS) {
        push_unique(&mut keys, format!("affil:{}", prefix_key(affiliation)));
    }
    for journal in author.journals.iter().take(MAX_JOURNAL_KEYS) {
        push_unique(&mut keys, format!("journal:{}", prefix_key(journal)));
    }
    keys
}

/// Every blocking key a mention generates, same rules as for authors.
#[must_use]
pub fn mention_blocking_keys(mention: &Mention) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(orcid) = mention.canonical_orcid() {
        push_unique(&mut keys, format!("orcid:{orcid}"));
    }
    name_keys(&mut keys, &mention.name);
    for affiliation in mention.affiliations.iter().take(MAX_AFFILIATION_KEYS) {
        push_unique(&mut keys, format!("affil:{}", prefix_key(affiliation)));
    }
    for journal in mention.journals.iter().take(MAX_JOURNAL_KEYS) {
        push_unique(&mut keys, format!("journal:{}", prefix_key(journal)));
    }
    keys
}

/// The keys walked during candidate retrieval, in priority order: ORCID,
/// surname, surname+initial, then the first affiliation. Journals recall too
/// broadly to retrieve by.
#[must_use]
pub fn retrieval_keys(mention: &Mention) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(orcid) = mention.canonical_orcid() {
        push_unique(&mut keys, format!("orcid:{orcid}"));
    }
    name_keys(&mut keys, &mention.name);
    if let Some(affiliation) = mention.affiliations.iter().next() {
        push_unique(&mut keys, format!("affil:{}", prefix_key(affiliation)));
    }
    keys
}

/// Storage interface consumed by the decision engine. Implementations must
/// keep the blocking index exact: an author is reachable under every key
/// [`author_blocking_keys`] derives from its current fields.
pub trait AuthorRepository {
    /// Insert a fresh author. Fails with [`RepositoryError::DuplicateOrcid`]
    /// when another author already owns the ORCID.
    fn add(&mut self, author: NewAuthor) -> Result<Author, RepositoryError>;

    fn get(&self, author_id: &str) -> Option<Author>;

    /// Union the delta into the author, bump `publication_count`, cap
    /// confidence at 0.95, and re-index any new blocking keys.
    fn update(&mut self, author_id: &str, delta: AuthorUpdate) -> Result<Author, RepositoryError>;

    /// At most `max` distinct candidates for the mention, deduplicated and
    /// sorted by `author_id`.
    fn candidates(&self, mention: &Mention, max: usize) -> Vec<Author>;

    fn count(&self) -> usize;

    /// The author owning the given ORCID, if any.
    fn orcid_owner(&self, orcid: &str) -> Option<String>;

    /// Index introspection for tests: author ids under one blocking key.
    fn authors_for_key(&self, key: &str) -> Vec<String>;
}

/// In-memory repository: author map plus blocking-key multimap, everything
/// in sorted containers so retrieval is byte-reproducible.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuthorRepository {
    authors: BTreeMap<String, Author>,
    index: BTreeMap<String, BTreeSet<String>>,
    orcid_owners: BTreeMap<String, String>,
    tick: u64,
}

impl InMemoryAuthorRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed author, e.g. when restoring repository state.
    /// The id must be unused and the ORCID unowned.
    pub fn insert(&mut self, mut author: Author) -> Result<Author, RepositoryError> {
        if self.authors.contains_key(&author.author_id) {
            return Err(RepositoryError::DuplicateAuthorId {
                author_id: author.author_id,
            });
        }
        author.orcid = author
            .orcid
            .as_deref()
            .map(canonicalize_orcid)
            .filter(|o| !o.is_empty());
        if let Some(orcid) = &author.orcid {
            if let Some(owner) = self.orcid_owners.get(orcid) {
                return Err(RepositoryError::DuplicateOrcid {
                    orcid: orcid.clone(),
                    owner: owner.clone(),
                });
            }
        }
        author.alternate_names.insert(author.canonical_name.clone());
        self.tick += 1;
        author.last_updated = self.tick;

        if let Some(orcid) = &author.orcid {
            self.orcid_owners.insert(orcid.clone(), author.author_id.clone());
        }
        for key in author_blocking_keys(&author) {
            self.index.entry(key).or_default().insert(author.author_id.clone());
        }
        self.authors.insert(author.author_id.clone(), author.clone());
        Ok(author)
    }

    /// Remove an author and every index entry pointing at it.
    pub fn remove(&mut self, author_id: &str) -> bool {
        let Some(author) = self.authors.remove(author_id) else {
            return false;
        };
        for key in author_blocking_keys(&author) {
            if let Some(ids) = self.index.get_mut(&key) {
                ids.remove(author_id);
                if ids.is_empty() {
                    self.index.remove(&key);
                }
            }
        }
        if let Some(orcid) = &author.orcid {
            self.orcid_owners.remove(orcid);
        }
        true
    }

    fn fresh_id(&self) -> String {
        loop {
            let candidate = format!("au_{}", &Uuid::new_v4().simple().to_string()[..8]);
            if !self.authors.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

impl AuthorRepository for InMemoryAuthorRepository {
    fn add(&mut self, author: NewAuthor) -> Result<Author, RepositoryError> {
        let orcid = author
            .orcid
            .as_deref()
            .map(canonicalize_orcid)
            .filter(|o| !o.is_empty());
        if let Some(orcid) = &orcid {
            if let Some(owner) = self.orcid_owners.get(orcid) {
                return Err(RepositoryError::DuplicateOrcid {
                    orcid: orcid.clone(),
                    owner: owner.clone(),
                });
            }
        }

        let entity = Author {
            author_id: self.fresh_id(),
            canonical_name: author.name.clone(),
            alternate_names: [author.name].into_iter().collect(),
            orcid,
            coauthor_ids: author.coauthor_ids,
            journals: author.journals,
            affiliations: author.affiliations,
            publication_count: 1,
            confidence: 1.0,
            last_updated: 0,
        };
        self.insert(entity)
    }

    fn get(&self, author_id: &str) -> Option<Author> {
        self.authors.get(author_id).cloned()
    }

    fn update(&mut self, author_id: &str, delta: AuthorUpdate) -> Result<Author, RepositoryError> {
        let Some(author) = self.authors.get_mut(author_id) else {
            return Err(RepositoryError::UnknownAuthor {
                author_id: author_id.to_string(),
            });
        };

        author.alternate_names.extend(delta.alternate_names);
        author.coauthor_ids.extend(delta.coauthor_ids);
        author.journals.extend(delta.journals);
        author.affiliations.extend(delta.affiliations);
        author.publication_count += 1;
        author.confidence = author.confidence.min(0.95);
        self.tick += 1;
        author.last_updated = self.tick;

        if let Some(orcid) = delta.orcid.as_deref().map(canonicalize_orcid).filter(|o| !o.is_empty())
        {
            let owner = self.orcid_owners.get(&orcid).cloned();
            match owner {
                None if author.orcid.is_none() => {
                    author.orcid = Some(orcid.clone());
                    self.orcid_owners.insert(orcid, author_id.to_string());
                }
                Some(owner) if owner != author_id => {
                    debug!(orcid = %orcid, owner = %owner, author_id, "orcid already owned elsewhere, not reassigned");
                }
                _ => {}
            }
        }

        let updated = author.clone();
        // Existing keys are idempotent; only genuinely new keys extend the index.
        for key in author_blocking_keys(&updated) {
            self.index.entry(key).or_default().insert(author_id.to_string());
        }
        Ok(updated)
    }

    fn candidates(&self, mention: &Mention, max: usize) -> Vec<Author> {
        let mut ids: BTreeSet<String> = BTreeSet::new();
        for key in retrieval_keys(mention) {
            // Key order only budgets the walk; the result order is by id.
            if ids.len() >= max {
                break;
            }
            if let Some(found) = self.index.get(&key) {
                ids.extend(found.iter().cloned());
            }
        }

        let mut sorted: Vec<String> = ids.into_iter().collect();
        if sorted.len() > max {
            warn!(
                candidates = sorted.len(),
                max, "candidate set exceeds max_candidates, truncating"
            );
            let owner = mention
                .canonical_orcid()
                .and_then(|orcid| self.orcid_owners.get(&orcid).cloned())
                .filter(|owner| sorted.binary_search(owner).is_ok());
            sorted.truncate(max);
            if let Some(owner) = owner {
                // ORCID inclusion outranks the cut: the owner must survive.
                if sorted.binary_search(&owner).is_err() {
                    sorted.pop();
                    sorted.push(owner);
                }
            }
        }

        sorted
            .iter()
            .filter_map(|id| self.authors.get(id).cloned())
            .collect()
    }

    fn count(&self) -> usize {
        self.authors.len()
    }

    fn orcid_owner(&self, orcid: &str) -> Option<String> {
        self.orcid_owners.get(&canonicalize_orcid(orcid)).cloned()
    }

    fn authors_for_key(&self, key: &str) -> Vec<String> {
        self.index
            .get(key)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}
