//! refs::inventory
//!
//! One-shot scan of all refs producing an indexed in-memory catalogue.
//!
//! # Architecture
//!
//! On first query the inventory issues a single `git for-each-ref` whose
//! format string packs every required field, separated by the byte
//! sequence `\x01\x01\x01` with records terminated by `\x00\x00\x00`.
//! Parsing yields a [`RefEntry`] per ref and a [`CommitRecord`] per
//! distinct commit id. The two entity sets reference each other only by
//! stable identifiers (refname, object id) so the ref↔commit cycle never
//! materializes as pointers.
//!
//! Lookups that miss the index fall back to one-off git invocations and
//! are cached for the rest of the process.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::git::{GitError, GitRunner};

const FIELD_SEP: &str = "\u{1}\u{1}\u{1}";
const RECORD_SEP: &str = "\u{0}\u{0}\u{0}";

/// Pattern extracting a date key from a tag name: a `20\d{6}` date that
/// must not be preceded by a digit, optionally followed by a serial.
fn date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\D(20\d{6})[_-]?(\d+)?").expect("date pattern"))
}

/// Errors from inventory operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// A `for-each-ref` record did not match any known ref namespace.
    #[error("malformed ref record: {refname}")]
    MalformedRef {
        /// The unclassifiable refname
        refname: String,
    },

    /// A record had fewer fields than the format string requests.
    #[error("truncated for-each-ref record ({got} fields): {head}")]
    TruncatedRecord {
        /// Number of fields present
        got: usize,
        /// First field of the record, for context
        head: String,
    },

    /// The underlying git invocation failed.
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Top-level classification of a ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefCategory {
    Branch,
    Tag,
    Stash,
    Bisect,
}

/// Fine-grained type of a ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Local branch under `refs/heads/`.
    Local,
    /// Remote-tracking branch under `refs/remotes/`.
    Remote,
    /// Annotated tag (its own git object).
    Object,
    /// Lightweight tag (points directly at a commit).
    Symbolic,
    Stash,
    Bisect,
}

/// The `refs/<dir>/` namespace a ref lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefsDir {
    Heads,
    Remotes,
    Tags,
    Stash,
    Bisect,
}

impl RefsDir {
    fn as_str(&self) -> &'static str {
        match self {
            RefsDir::Heads => "heads",
            RefsDir::Remotes => "remotes",
            RefsDir::Tags => "tags",
            RefsDir::Stash => "stash",
            RefsDir::Bisect => "bisect",
        }
    }
}

/// An author or committer identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub date: String,
}

/// Subject/body/contents of a commit or annotated-tag message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
    pub contents: String,
}

/// One catalogued ref.
#[derive(Debug, Clone)]
pub struct RefEntry {
    /// Canonical refname, e.g. `refs/tags/foo`.
    pub refname: String,
    pub category: RefCategory,
    pub kind: RefKind,
    pub refsdir: RefsDir,
    /// Trailing component after stripping the category prefix.
    pub barename: String,
    /// Resolved commit id. For an annotated tag this is the *target*
    /// commit, not the tag object.
    pub commit: String,
    /// Raw object id of the ref itself; differs from `commit` only for
    /// annotated tags.
    pub sha1: String,
    /// Tag message, present for annotated tags only.
    pub message: Option<Message>,
}

/// One catalogued commit, deduplicated by id.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub id: String,
    pub author: Identity,
    pub committer: Identity,
    pub parents: Vec<String>,
    pub tree: String,
    pub message: Message,
    /// Back-list of refnames pointing here. Names, never pointers.
    pub refs: Vec<String>,
}

/// Whether a HEAD-match query wants the first hit or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    First,
    All,
}

/// The materialized index.
#[derive(Debug, Default)]
struct RefIndex {
    /// refname → entry.
    refs: BTreeMap<String, RefEntry>,
    /// commit id → record.
    commits: HashMap<String, CommitRecord>,
    /// Lookup aliases: `<refsdir>/<barename>` and the full refname.
    by_name: HashMap<String, String>,
}

/// The ref inventory.
///
/// Lazily materialized on first query; [`RefDb::clear`] drops all cached
/// state (used after any tag-creating operation).
#[derive(Debug)]
pub struct RefDb {
    git: GitRunner,
    index: RefCell<Option<RefIndex>>,
    commit_cache: RefCell<HashMap<String, String>>,
    sha1_cache: RefCell<HashMap<String, String>>,
}

impl RefDb {
    pub fn new(git: GitRunner) -> Self {
        Self {
            git,
            index: RefCell::new(None),
            commit_cache: RefCell::new(HashMap::new()),
            sha1_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Drop all cached state. The next query rescans the repository.
    pub fn clear(&self) {
        *self.index.borrow_mut() = None;
        self.commit_cache.borrow_mut().clear();
        self.sha1_cache.borrow_mut().clear();
    }

    /// The format string for the batched scan.
    ///
    /// The `%(*...)` fields resolve, for annotated tags, to the pointed-to
    /// commit's fields; they are empty for everything else.
    fn format_string() -> String {
        let fields = [
            "%(refname)",
            "%(objectname)",
            "%(tag)",
            "%(authorname)",
            "%(authoremail)",
            "%(authordate)",
            "%(committername)",
            "%(committeremail)",
            "%(committerdate)",
            "%(subject)",
            "%(body)",
            "%(contents)",
            "%(parent)",
            "%(tree)",
            "%(*objectname)",
            "%(*authorname)",
            "%(*authoremail)",
            "%(*authordate)",
            "%(*committername)",
            "%(*committeremail)",
            "%(*committerdate)",
            "%(*subject)",
            "%(*body)",
            "%(*contents)",
            "%(*parent)",
            "%(*tree)",
        ];
        format!("{}%00%00%00", fields.join("%01%01%01"))
    }

    fn ensure_loaded(&self) -> Result<(), RefError> {
        if self.index.borrow().is_some() {
            return Ok(());
        }
        let format = Self::format_string();
        let raw = self
            .git
            .result(&["for-each-ref", "--format", &format], &[0])?;
        let index = Self::parse(&raw)?;
        *self.index.borrow_mut() = Some(index);
        Ok(())
    }

    fn parse(raw: &str) -> Result<RefIndex, RefError> {
        let mut index = RefIndex::default();

        for record in raw.split(RECORD_SEP) {
            // Records are terminated (not separated) by the record marker,
            // so the final split element is newline noise.
            let record = record.trim_start_matches('\n');
            if record.is_empty() {
                continue;
            }
            let fields: Vec<&str> = record.split(FIELD_SEP).collect();
            if fields.len() < 26 {
                return Err(RefError::TruncatedRecord {
                    got: fields.len(),
                    head: fields.first().unwrap_or(&"").to_string(),
                });
            }

            let refname = fields[0].to_string();
            let objectname = fields[1].to_string();
            let tagname = fields[2];
            let starred_objectname = fields[14];

            let (category, kind, refsdir, barename) = Self::classify(&refname, tagname)?;

            let annotated = kind == RefKind::Object;
            let commit = if annotated {
                starred_objectname.to_string()
            } else {
                objectname.clone()
            };

            // For annotated tags the unstarred message fields describe the
            // tag object itself.
            let message = annotated.then(|| Message {
                subject: fields[9].to_string(),
                body: fields[10].to_string(),
                contents: fields[11].to_string(),
            });

            let commit_record = if annotated {
                CommitRecord {
                    id: commit.clone(),
                    author: Identity {
                        name: fields[15].to_string(),
                        email: fields[16].to_string(),
                        date: fields[17].to_string(),
                    },
                    committer: Identity {
                        name: fields[18].to_string(),
                        email: fields[19].to_string(),
                        date: fields[20].to_string(),
                    },
                    message: Message {
                        subject: fields[21].to_string(),
                        body: fields[22].to_string(),
                        contents: fields[23].to_string(),
                    },
                    parents: fields[24].split_whitespace().map(String::from).collect(),
                    tree: fields[25].to_string(),
                    refs: Vec::new(),
                }
            } else {
                CommitRecord {
                    id: commit.clone(),
                    author: Identity {
                        name: fields[3].to_string(),
                        email: fields[4].to_string(),
                        date: fields[5].to_string(),
                    },
                    committer: Identity {
                        name: fields[6].to_string(),
                        email: fields[7].to_string(),
                        date: fields[8].to_string(),
                    },
                    message: Message {
                        subject: fields[9].to_string(),
                        body: fields[10].to_string(),
                        contents: fields[11].to_string(),
                    },
                    parents: fields[12].split_whitespace().map(String::from).collect(),
                    tree: fields[13].to_string(),
                    refs: Vec::new(),
                }
            };

            let entry = RefEntry {
                refname: refname.clone(),
                category,
                kind,
                refsdir,
                barename: barename.clone(),
                commit: commit.clone(),
                sha1: objectname,
                message,
            };

            index
                .commits
                .entry(commit.clone())
                .or_insert(commit_record)
                .refs
                .push(refname.clone());

            index
                .by_name
                .insert(format!("{}/{}", refsdir.as_str(), barename), refname.clone());
            index.by_name.insert(refname.clone(), refname.clone());
            index.refs.insert(refname, entry);
        }

        Ok(index)
    }

    /// Classify a refname, in the fixed namespace order.
    fn classify(
        refname: &str,
        tagname: &str,
    ) -> Result<(RefCategory, RefKind, RefsDir, String), RefError> {
        if let Some(rest) = refname.strip_prefix("refs/heads/") {
            return Ok((
                RefCategory::Branch,
                RefKind::Local,
                RefsDir::Heads,
                rest.to_string(),
            ));
        }
        if let Some(rest) = refname.strip_prefix("refs/remotes/") {
            return Ok((
                RefCategory::Branch,
                RefKind::Remote,
                RefsDir::Remotes,
                rest.to_string(),
            ));
        }
        if let Some(rest) = refname.strip_prefix("refs/tags/") {
            return if tagname.is_empty() {
                Ok((
                    RefCategory::Tag,
                    RefKind::Symbolic,
                    RefsDir::Tags,
                    rest.to_string(),
                ))
            } else {
                Ok((
                    RefCategory::Tag,
                    RefKind::Object,
                    RefsDir::Tags,
                    tagname.to_string(),
                ))
            };
        }
        if refname == "refs/stash" {
            return Ok((
                RefCategory::Stash,
                RefKind::Stash,
                RefsDir::Stash,
                "stash".to_string(),
            ));
        }
        if let Some(rest) = refname.strip_prefix("refs/bisect/") {
            return Ok((
                RefCategory::Bisect,
                RefKind::Bisect,
                RefsDir::Bisect,
                rest.to_string(),
            ));
        }
        Err(RefError::MalformedRef {
            refname: refname.to_string(),
        })
    }

    fn indexed_entry(&self, name: &str) -> Result<Option<RefEntry>, RefError> {
        self.ensure_loaded()?;
        let borrow = self.index.borrow();
        let index = borrow.as_ref().expect("index loaded");
        for candidate in [
            format!("tags/{}", name),
            format!("heads/{}", name),
            format!("remotes/{}", name),
            name.to_string(),
        ] {
            if let Some(refname) = index.by_name.get(&candidate) {
                return Ok(index.refs.get(refname).cloned());
            }
        }
        Ok(None)
    }

    /// Resolve a name to its commit id.
    ///
    /// `HEAD` always shells out (`git log -1 --pretty=%H HEAD`); everything
    /// else is answered from the index with a cached `git log` fallback.
    pub fn name_to_commit(&self, name: &str) -> Result<Option<String>, RefError> {
        if name == "HEAD" {
            let (output, code) = self.git.run(&["log", "-1", "--pretty=%H", "HEAD"])?;
            return Ok((code == 0 && !output.is_empty()).then_some(output));
        }
        if let Some(entry) = self.indexed_entry(name)? {
            return Ok(Some(entry.commit));
        }
        if let Some(hit) = self.commit_cache.borrow().get(name) {
            return Ok(Some(hit.clone()));
        }
        let (output, code) = self.git.run(&["log", "-1", "--pretty=%H", name])?;
        if code == 0 && !output.is_empty() {
            self.commit_cache
                .borrow_mut()
                .insert(name.to_string(), output.clone());
            Ok(Some(output))
        } else {
            Ok(None)
        }
    }

    /// Resolve a name to its raw object id.
    ///
    /// Same lookup as [`name_to_commit`](Self::name_to_commit) but the
    /// fallback is `git rev-parse`, cached in the sha1 cache.
    pub fn name_to_sha1(&self, name: &str) -> Result<Option<String>, RefError> {
        if let Some(entry) = self.indexed_entry(name)? {
            return Ok(Some(entry.sha1));
        }
        if let Some(hit) = self.sha1_cache.borrow().get(name) {
            return Ok(Some(hit.clone()));
        }
        let (output, code) = self.git.run(&["rev-parse", name])?;
        if code == 0 && !output.is_empty() {
            self.sha1_cache
                .borrow_mut()
                .insert(name.to_string(), output.clone());
            Ok(Some(output))
        } else {
            Ok(None)
        }
    }

    /// `(commit, sha1)` iff `name` is an annotated tag.
    pub fn is_annotated_tag(&self, name: &str) -> Result<Option<(String, String)>, RefError> {
        match self.indexed_entry(name)? {
            Some(entry) if entry.category == RefCategory::Tag && entry.kind == RefKind::Object => {
                Ok(Some((entry.commit, entry.sha1)))
            }
            _ => Ok(None),
        }
    }

    /// A cloned view of a catalogued entry, by lookup name.
    pub fn entry(&self, name: &str) -> Result<Option<RefEntry>, RefError> {
        self.indexed_entry(name)
    }

    /// A cloned view of a catalogued commit, by id.
    pub fn commit_record(&self, id: &str) -> Result<Option<CommitRecord>, RefError> {
        self.ensure_loaded()?;
        let borrow = self.index.borrow();
        Ok(borrow.as_ref().expect("index loaded").commits.get(id).cloned())
    }

    /// Extract the sortable date key from a tag name.
    ///
    /// Returns `(date, serial)`, e.g. `sheep-20240131-2` → `("20240131", "2")`.
    pub fn date_key(name: &str) -> Option<(String, String)> {
        let caps = date_pattern().captures(name)?;
        let date = caps.get(1)?.as_str().to_string();
        let serial = caps.get(2).map(|m| m.as_str()).unwrap_or("").to_string();
        Some((date, serial))
    }

    /// All tag barenames, sorted for rollout matching.
    ///
    /// Dated tags come first, descending by date key so matches against
    /// HEAD are found as early as possible; ties preserve alphabetical
    /// order of the original names. Undated tags sort last, alphabetical.
    pub fn sorted_tags(&self) -> Result<Vec<String>, RefError> {
        self.ensure_loaded()?;
        let borrow = self.index.borrow();
        let index = borrow.as_ref().expect("index loaded");

        let mut dated: Vec<(String, String)> = Vec::new();
        let mut undated: Vec<String> = Vec::new();
        for entry in index.refs.values() {
            if entry.category != RefCategory::Tag {
                continue;
            }
            match Self::date_key(&entry.barename) {
                Some((date, serial)) => {
                    dated.push((format!("{}{}", date, serial), entry.barename.clone()))
                }
                None => undated.push(entry.barename.clone()),
            }
        }
        // BTreeMap iteration is already alphabetical, so a stable sort on
        // the key alone preserves name order within equal keys.
        dated.sort_by(|a, b| b.0.cmp(&a.0));
        undated.sort();

        let mut names: Vec<String> = dated.into_iter().map(|(_, name)| name).collect();
        names.extend(undated);
        Ok(names)
    }

    /// Retain names whose extracted date is at or after `cutoff`
    /// (`YYYYMMDD`); names without a parseable date are kept.
    pub fn filter_by_date(cutoff: &str, names: Vec<String>) -> Vec<String> {
        names
            .into_iter()
            .filter(|name| match Self::date_key(name) {
                Some((date, _)) => date.as_str() >= cutoff,
                None => true,
            })
            .collect()
    }

    /// The subset of `names` whose commit equals HEAD's commit.
    pub fn names_matching_head(
        &self,
        mode: MatchMode,
        names: &[String],
    ) -> Result<Vec<String>, RefError> {
        let head = match self.name_to_commit("HEAD")? {
            Some(head) => head,
            None => return Ok(Vec::new()),
        };
        let mut matches = Vec::new();
        for name in names {
            if self.name_to_commit(name)?.as_deref() == Some(head.as_str()) {
                matches.push(name.clone());
                if mode == MatchMode::First {
                    break;
                }
            }
        }
        Ok(matches)
    }

    /// Branches whose history contains HEAD, in display priority order.
    ///
    /// The trunk names come first; everything else is alphabetical.
    pub fn branches_reaching_head(&self) -> Result<Vec<String>, RefError> {
        const PRIORITY: [&str; 4] = ["trunk", "master", "origin/trunk", "origin/master"];

        let output = self
            .git
            .result(&["branch", "-a", "--contains", "HEAD"], &[0])?;
        let mut branches: Vec<String> = output
            .lines()
            .map(|line| line.trim_start_matches('*').trim())
            .filter(|line| !line.is_empty() && !line.contains("->") && !line.starts_with('('))
            .map(|line| line.strip_prefix("remotes/").unwrap_or(line).to_string())
            .collect();

        branches.sort_by(|a, b| {
            let pa = PRIORITY.iter().position(|p| p == a).unwrap_or(PRIORITY.len());
            let pb = PRIORITY.iter().position(|p| p == b).unwrap_or(PRIORITY.len());
            pa.cmp(&pb).then_with(|| a.cmp(b))
        });
        Ok(branches)
    }
}
