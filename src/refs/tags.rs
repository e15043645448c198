//! refs::tags
//!
//! Tag creation with message templating and collision-free naming.

use chrono::Local;
use thiserror::Error;

use super::inventory::{RefDb, RefError};
use crate::git::{GitError, GitRunner};

/// Errors from tag creation.
#[derive(Debug, Error)]
pub enum TagError {
    /// `git tag` produced output or a non-zero exit; it is silent on
    /// success, so either means the tag was not created.
    #[error("failed to create tag '{name}':\n{output}")]
    CreationFailed {
        /// The tag name that was attempted
        name: String,
        /// Whatever git printed
        output: String,
    },

    /// Inventory lookup failed while probing for collisions.
    #[error(transparent)]
    Ref(#[from] RefError),

    /// The underlying git invocation failed.
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Next collision suffix: increment the last alphabetic character with
/// carry; past all-`Z` an `A` is prepended.
///
/// `A` → `B`, ... `Z` → `AA`, `AZ` → `BA`, `ZZ` → `AAA`.
pub fn next_suffix(current: &str) -> String {
    let mut chars: Vec<char> = current.chars().collect();
    for ch in chars.iter_mut().rev() {
        if *ch < 'Z' {
            *ch = ((*ch as u8) + 1) as char;
            return chars.into_iter().collect();
        }
        *ch = 'A';
    }
    let mut bumped = String::with_capacity(chars.len() + 1);
    bumped.push('A');
    bumped.extend(chars);
    bumped
}

/// Create an annotated tag at HEAD, probing for a free name.
///
/// If `name` already resolves to a commit, `_A`, `_B`, ... suffixes are
/// tried until a free name is found. Every occurrence of `%TAG` in the
/// message lines is replaced with the final chosen name. On success the
/// inventory is invalidated and the final name returned.
pub fn make_tag(
    git: &GitRunner,
    db: &RefDb,
    name: &str,
    message_lines: &[String],
) -> Result<String, TagError> {
    let mut candidate = name.to_string();
    let mut suffix: Option<String> = None;
    while db.name_to_commit(&candidate)?.is_some() {
        let next = match suffix {
            None => "A".to_string(),
            Some(current) => next_suffix(&current),
        };
        candidate = format!("{}_{}", name, next);
        suffix = Some(next);
    }

    let messages: Vec<String> = message_lines
        .iter()
        .map(|line| line.replace("%TAG", &candidate))
        .collect();

    let mut args: Vec<&str> = vec!["tag"];
    for message in &messages {
        args.push("-m");
        args.push(message);
    }
    args.push(&candidate);

    let (output, code) = git.run(&args)?;
    if code != 0 || !output.is_empty() {
        return Err(TagError::CreationFailed {
            name: candidate,
            output,
        });
    }

    db.clear();
    Ok(candidate)
}

/// Create a tag named `<prefix>-<now>` with `now` rendered by the given
/// strftime format.
pub fn make_dated_tag(
    git: &GitRunner,
    db: &RefDb,
    prefix: &str,
    date_fmt: &str,
    message_lines: &[String],
) -> Result<String, TagError> {
    let name = format!("{}-{}", prefix, Local::now().format(date_fmt));
    make_tag(git, db, &name, message_lines)
}
