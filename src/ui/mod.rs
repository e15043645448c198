//! ui
//!
//! User-facing output utilities.
//!
//! # Design
//!
//! The core never prints directly; it calls into this module so that
//! verbosity is applied consistently. Warnings and errors go to stderr,
//! everything else to stdout.

pub mod output;

pub use output::{debug, error, print, warn, Verbosity};
