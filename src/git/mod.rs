//! git
//!
//! Single doorway for all git subprocess invocations.
//!
//! # Architecture
//!
//! This module is the **ONLY** way the tool talks to git. It does not parse
//! `.git` internals and it does not link a git library; it invokes the `git`
//! binary with an explicit argument vector (never through a shell) and
//! normalizes the result. All repository reads and writes flow through
//! [`GitRunner`].
//!
//! # Responsibilities
//!
//! - Run git subprocesses and capture their merged output
//! - Classify expected vs. unexpected exit codes
//! - Classify spawn failures and signal deaths
//! - Repository discovery (git dir, worktree root)
//!
//! # Invariants
//!
//! - stderr is captured together with stdout
//! - The trailing newline is stripped from captured output
//! - Exit-code semantics of specific subcommands (`git config`, `git fetch`)
//!   are decided by callers via the accepted-codes parameter

mod runner;

pub use runner::{GitError, GitRunner};
