//! config
//!
//! git-config backed configuration store.
//!
//! # Overview
//!
//! All tool settings live in git config under the `deploy.` prefix, plus
//! the mandatory `user.name` / `user.email` identity keys. A bare key name
//! (or one with a leading dot) is resolved under `deploy.`.
//!
//! # Precedence
//!
//! 1. If `deploy.config-file` is set *and* the requested key is under the
//!    `deploy.` prefix, that file is consulted first.
//! 2. Otherwise the standard git config chain applies.
//! 3. `user.*` keys are read from the global config only.
//!
//! # Exit-code contract
//!
//! `git config --get` exits 1 when the key is missing and 2 when multiple
//! values match; both are part of the interface and are mapped to
//! `Ok(None)` and [`ConfigError::Ambiguous`] respectively.
//!
//! # Caching
//!
//! Every resolution is memoized per `(key, accessor)` for the lifetime of
//! the process.

mod store;

pub use store::{Accessor, ConfigError, ConfigStore, ConfigTree};

/// Recognized `deploy.*` keys.
///
/// The mail-related keys are recognized here so that operators get a
/// consistent vocabulary, but mail transports live outside this tool.
pub mod keys {
    /// Path to a file whose existence blocks new rollouts.
    pub const BLOCK_FILE: &str = "block-file";
    /// Whether this host may create rollout tags.
    pub const CAN_MAKE_TAGS: &str = "can-make-tags";
    /// Override config file consulted first for `deploy.*` keys.
    pub const CONFIG_FILE: &str = "config-file";
    /// Path of the deploy file; defaults to `.deploy` in the worktree.
    pub const DEPLOY_FILE: &str = "deploy-file";
    /// Root directory of the lifecycle hooks.
    pub const HOOK_DIR: &str = "hook-dir";
    /// Mail tool used by site-specific wrappers (not by this tool).
    pub const MAIL_TOOL: &str = "mail-tool";
    /// Name of the remote to fetch from and push to.
    pub const REMOTE_SITE: &str = "remote-site";
    /// Prefix of the per-action mail switches (`send-mail-on-finish`, ...).
    pub const SEND_MAIL_ON_PREFIX: &str = "send-mail-on-";
    /// The `send-mail-on-<action>` switch for one action.
    pub fn send_mail_on(action: &str) -> String {
        format!("{}{}", SEND_MAIL_ON_PREFIX, action)
    }
    /// Octal umask applied while a rollout action runs.
    pub const RESTRICT_UMASK: &str = "restrict-umask";
    /// Address appended to fatal session errors as a point of contact.
    pub const SUPPORT_EMAIL: &str = "support-email";
    /// Leading token of rollout tags; selects app-specific hooks.
    pub const TAG_PREFIX: &str = "tag-prefix";

}
