//! config::store
//!
//! Typed, memoizing accessors over `git config`.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use thiserror::Error;

use super::keys;
use crate::git::{GitError, GitRunner};

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A mandatory key has no value in any consulted source.
    #[error("missing config value for '{key}' (set it with `git config --add {key} <value>`)")]
    Missing {
        /// The fully-qualified key
        key: String,
    },

    /// `git config` exited with code 2: multiple values match.
    #[error("config key '{key}' has multiple values; refusing to pick one")]
    Ambiguous {
        /// The fully-qualified key
        key: String,
    },

    /// The stored value does not parse under the requested type.
    #[error("config key '{key}' has unparseable value '{value}'")]
    BadValue {
        /// The fully-qualified key
        key: String,
        /// The raw value
        value: String,
    },

    /// The underlying git invocation failed.
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Typed accessor variants, mirroring `git config --get` flags.
///
/// The accessor is part of the memoization key: `--int` and raw reads of
/// the same key are cached independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessor {
    /// Raw string value.
    Raw,
    /// `--path`: tilde-expanded by git.
    Path,
    /// `--int`: canonicalized integer (git understands `1k`, `1m`, ...).
    Int,
    /// `--bool`: canonicalized to `true`/`false`.
    Bool,
}

impl Accessor {
    fn flag(&self) -> Option<&'static str> {
        match self {
            Accessor::Raw => None,
            Accessor::Path => Some("--path"),
            Accessor::Int => Some("--int"),
            Accessor::Bool => Some("--bool"),
        }
    }
}

/// A nested view of a `git config --list -z` dump.
///
/// Dot-separated keys fan out into nested maps; used for diagnostic
/// dumps only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigTree {
    /// A terminal value.
    Leaf(String),
    /// A nested section.
    Node(BTreeMap<String, ConfigTree>),
}

impl ConfigTree {
    fn insert(&mut self, path: &[&str], value: &str) {
        let ConfigTree::Node(map) = self else {
            // A leaf is being extended into a section; the dump listed a
            // key that is both a value and a prefix. Last writer wins.
            *self = ConfigTree::Node(BTreeMap::new());
            return self.insert(path, value);
        };
        match path {
            [] => {}
            [last] => {
                map.insert((*last).to_string(), ConfigTree::Leaf(value.to_string()));
            }
            [head, rest @ ..] => {
                map.entry((*head).to_string())
                    .or_insert_with(|| ConfigTree::Node(BTreeMap::new()))
                    .insert(rest, value);
            }
        }
    }

    /// Look up a nested entry by dotted path.
    pub fn get(&self, dotted: &str) -> Option<&ConfigTree> {
        let mut node = self;
        for part in dotted.split('.') {
            match node {
                ConfigTree::Node(map) => node = map.get(part)?,
                ConfigTree::Leaf(_) => return None,
            }
        }
        Some(node)
    }
}

/// The configuration store.
///
/// Resolution shells out to `git config`; results (including misses) are
/// memoized per `(key, accessor)` so repeated lookups inside one
/// invocation cost one subprocess at most.
#[derive(Debug)]
pub struct ConfigStore {
    git: GitRunner,
    cache: RefCell<HashMap<(String, Accessor), Option<String>>>,
    /// Memoized `deploy.config-file` resolution. Outer `None` = not yet
    /// resolved; inner `None` = no override file configured.
    override_file: RefCell<Option<Option<PathBuf>>>,
}

impl ConfigStore {
    /// Create a store backed by the given runner.
    pub fn new(git: GitRunner) -> Self {
        Self {
            git,
            cache: RefCell::new(HashMap::new()),
            override_file: RefCell::new(None),
        }
    }

    /// Canonicalize a key name.
    ///
    /// A bare name without a dot is resolved under the `deploy.` prefix;
    /// a leading dot is equivalent.
    pub fn canonical_key(name: &str) -> String {
        if let Some(stripped) = name.strip_prefix('.') {
            format!("deploy.{}", stripped)
        } else if name.contains('.') {
            name.to_string()
        } else {
            format!("deploy.{}", name)
        }
    }

    /// Resolve the override file configured via `deploy.config-file`.
    ///
    /// The override file itself is always resolved from the standard
    /// chain (consulting it for its own location would not terminate).
    fn override_file(&self) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(resolved) = self.override_file.borrow().clone() {
            return Ok(resolved);
        }
        let key = Self::canonical_key(keys::CONFIG_FILE);
        let value = self.query(&["config", "--get", "--path", &key], &key)?;
        let resolved = value.map(PathBuf::from);
        *self.override_file.borrow_mut() = Some(resolved.clone());
        Ok(resolved)
    }

    /// Run one `git config --get` variant, mapping the exit-code contract.
    fn query(&self, args: &[&str], key: &str) -> Result<Option<String>, ConfigError> {
        let (output, code) = self.git.run(args)?;
        match code {
            0 => Ok(Some(output)),
            1 => Ok(None),
            2 => Err(ConfigError::Ambiguous {
                key: key.to_string(),
            }),
            _ => Err(GitError::UnexpectedExit {
                cmd: args.join(" "),
                code,
                output,
            }
            .into()),
        }
    }

    /// Resolve a key under the precedence chain, without a default.
    pub fn get_opt(&self, name: &str, accessor: Accessor) -> Result<Option<String>, ConfigError> {
        let key = Self::canonical_key(name);
        let cache_key = (key.clone(), accessor);
        if let Some(hit) = self.cache.borrow().get(&cache_key) {
            return Ok(hit.clone());
        }

        let mut value = None;

        // Override file first, but only for deploy.* keys.
        if key.starts_with("deploy.") {
            if let Some(file) = self.override_file()? {
                let file = file.display().to_string();
                let mut args = vec!["config", "--file", file.as_str(), "--get"];
                if let Some(flag) = accessor.flag() {
                    args.push(flag);
                }
                args.push(&key);
                value = self.query(&args, &key)?;
            }
        }

        if value.is_none() {
            let mut args = vec!["config"];
            // user.* identity comes from the global config only.
            if key.starts_with("user.") {
                args.push("--global");
            }
            args.push("--get");
            if let Some(flag) = accessor.flag() {
                args.push(flag);
            }
            args.push(&key);
            value = self.query(&args, &key)?;
        }

        self.cache.borrow_mut().insert(cache_key, value.clone());
        Ok(value)
    }

    /// Resolve a mandatory key; missing values are an error.
    pub fn get(&self, name: &str) -> Result<String, ConfigError> {
        self.get_opt(name, Accessor::Raw)?
            .ok_or_else(|| ConfigError::Missing {
                key: Self::canonical_key(name),
            })
    }

    /// Resolve a key with a default for the missing case.
    pub fn get_or(&self, name: &str, default: &str) -> Result<String, ConfigError> {
        Ok(self
            .get_opt(name, Accessor::Raw)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// Resolve a key as a tilde-expanded path.
    pub fn get_path(&self, name: &str) -> Result<Option<PathBuf>, ConfigError> {
        Ok(self.get_opt(name, Accessor::Path)?.map(PathBuf::from))
    }

    /// Resolve a key as an integer.
    pub fn get_int(&self, name: &str) -> Result<Option<i64>, ConfigError> {
        match self.get_opt(name, Accessor::Int)? {
            None => Ok(None),
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|_| ConfigError::BadValue {
                    key: Self::canonical_key(name),
                    value: raw,
                }),
        }
    }

    /// Resolve a key as a bool, with a default for the missing case.
    pub fn get_bool(&self, name: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get_opt(name, Accessor::Bool)? {
            None => Ok(default),
            Some(raw) => match raw.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(ConfigError::BadValue {
                    key: Self::canonical_key(name),
                    value: raw,
                }),
            },
        }
    }

    /// Produce a nested mapping of the full config.
    ///
    /// Reads `git config --list -z` (against the override file when one is
    /// configured, the standard chain otherwise). Diagnostic use only.
    pub fn dump(&self) -> Result<ConfigTree, ConfigError> {
        let file = self.override_file()?.map(|p| p.display().to_string());
        let mut args = vec!["config"];
        if let Some(file) = file.as_deref() {
            args.push("--file");
            args.push(file);
        }
        args.push("--list");
        args.push("-z");

        let raw = self.git.result(&args, &[0])?;
        let mut tree = ConfigTree::Node(BTreeMap::new());
        for record in raw.split('\0').filter(|r| !r.is_empty()) {
            // -z records are `key\nvalue`; a key with no value has no newline.
            let (key, value) = match record.split_once('\n') {
                Some((key, value)) => (key, value),
                None => (record, ""),
            };
            let parts: Vec<&str> = key.split('.').collect();
            tree.insert(&parts, value);
        }
        Ok(tree)
    }
}
