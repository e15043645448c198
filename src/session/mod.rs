//! session
//!
//! Persisted rollout session: a cross-invocation state machine whose
//! transitions are gated by on-disk predicates.
//!
//! # Architecture
//!
//! All state lives under `<gitdir>/deploy/`:
//!
//! - `lock` - the step log, one [`StatusLine`] per line
//! - `rollout` / `rollback` - tag sidecars, `<sha1> <tagname>`
//!
//! Two exclusion mechanisms are stacked:
//!
//! 1. Exclusive creation of `lock` (`O_EXCL`) guards against two
//!    invocations racing to start a session.
//! 2. A non-blocking advisory flock on `lock`, held only across each
//!    read-modify-write, guards concurrent step updates within a session.
//!
//! Both are released when the owning process exits, so an orphaned
//! session leaves a stale file but no OS-held lock; the state-machine
//! validator diagnoses it on the next action.
//!
//! # States
//!
//! Encoded by the line count and first-field prefix of `lock`:
//!
//! ```text
//! ABSENT  --start-->     STARTED
//! STARTED --sync-->      SYNCED
//! STARTED --release-->   SYNCED
//! STARTED --manual-sync->SYNCED
//! STARTED --abort-->     ABSENT
//! SYNCED  --finish-->    FINISHING -> ABSENT
//! SYNCED  --rollback-->  ABSENT
//! ```

mod sidecar;
mod status;

pub use sidecar::{SidecarKind, TagSidecar};
pub use status::{Session, SessionError, SessionState, StatusLine};
