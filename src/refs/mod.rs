//! refs
//!
//! Ref/tag inventory and tag creation service.
//!
//! # Architecture
//!
//! [`RefDb`] materializes a denormalized index of every ref and commit in
//! the repository from a single batched `git for-each-ref` scan, then
//! answers name→commit, name→object-id, HEAD-match, and sort/filter
//! queries from memory. [`make_tag`] creates rollout/rollback markers and
//! invalidates the index.
//!
//! # Invariants
//!
//! - Every ref entry has a non-empty commit id
//! - For annotated tags `sha1 != commit`; for everything else they match
//! - The index is immutable once loaded; tag creation calls `clear()`
//! - Refs reference commits by id and commits reference refs by name,
//!   never by pointer

mod inventory;
mod tags;

pub use inventory::{
    CommitRecord, Identity, MatchMode, Message, RefCategory, RefDb, RefEntry, RefError, RefKind,
    RefsDir,
};
pub use tags::{make_dated_tag, make_tag, next_suffix, TagError};
