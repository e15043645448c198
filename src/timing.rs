//! timing
//!
//! Step-duration ledger for post-mortem analysis.
//!
//! # Design
//!
//! An in-memory ordered list of `(tag, timestamp, Δ-since-prev,
//! Δ-since-matching-start)` records. The first record is synthetic
//! (`gdt_start`, taken at ledger construction). A tag ending in `_end`
//! resolves its Δ-since-matching-start by scanning earlier records for
//! the corresponding `_start` tag; `-1` denotes not-applicable.
//!
//! The ledger is flushed at process exit by an explicit top-level call,
//! never by a destructor, and only if flushing was enabled while the run
//! performed real work. Flush failures warn and are otherwise ignored.

use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;

use crate::ui;

/// Directory the timing dump is written into.
const TIMING_DIR: &str = "/var/log/deploy";

fn sanitize_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_]+").expect("sanitize pattern"))
}

fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// One timing record.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingRecord {
    /// Sanitized tag.
    pub tag: String,
    /// Absolute wall-clock seconds since the epoch.
    pub seconds: f64,
    /// Seconds since the previous record.
    pub delta_prev: f64,
    /// Seconds since the matching `_start` record; -1 when not applicable.
    pub delta_start: f64,
}

/// The process-wide timing ledger.
#[derive(Debug)]
pub struct TimingLedger {
    records: Vec<TimingRecord>,
    flush_enabled: bool,
}

impl TimingLedger {
    /// Create the ledger, stamping the synthetic process-start record.
    pub fn new() -> Self {
        Self {
            records: vec![TimingRecord {
                tag: "gdt_start".to_string(),
                seconds: now_seconds(),
                delta_prev: 0.0,
                delta_start: -1.0,
            }],
            flush_enabled: false,
        }
    }

    /// Record a tag now.
    pub fn push(&mut self, tag: &str) {
        let tag = sanitize_pattern().replace_all(tag, "_").into_owned();
        let seconds = now_seconds();
        let delta_prev = self
            .records
            .last()
            .map(|prev| seconds - prev.seconds)
            .unwrap_or(0.0);
        let delta_start = match tag.strip_suffix("_end") {
            Some(stem) => {
                let start_tag = format!("{}_start", stem);
                self.records
                    .iter()
                    .rev()
                    .find(|rec| rec.tag == start_tag)
                    .map(|rec| seconds - rec.seconds)
                    .unwrap_or(-1.0)
            }
            None => -1.0,
        };
        self.records.push(TimingRecord {
            tag,
            seconds,
            delta_prev,
            delta_start,
        });
    }

    /// Mark that this run did real work and deserves a timing dump.
    pub fn enable_flush(&mut self) {
        self.flush_enabled = true;
    }

    /// The records collected so far.
    pub fn records(&self) -> &[TimingRecord] {
        &self.records
    }

    /// The dump path for this run, keyed by the process-start timestamp.
    pub fn dump_path(&self) -> PathBuf {
        PathBuf::from(TIMING_DIR).join(format!(
            "timing_gdt-{}.txt",
            self.records[0].seconds as u64
        ))
    }

    /// Write the dump if flushing was enabled. Failures warn, never fail:
    /// timing is diagnostics, not part of the rollout.
    pub fn flush(&self, invocation_args: &[String]) {
        if !self.flush_enabled {
            return;
        }
        let path = self.dump_path();
        let result = (|| -> std::io::Result<()> {
            let mut file = std::fs::File::create(&path)?;
            writeln!(file, "# {}", invocation_args.join(" "))?;
            for rec in &self.records {
                writeln!(
                    file,
                    "{}\t{:.6}\t{:.6}\t{:.6}",
                    rec.tag, rec.seconds, rec.delta_prev, rec.delta_start
                )?;
            }
            Ok(())
        })();
        if let Err(err) = result {
            ui::warn(format!(
                "could not write timing file {}: {}",
                path.display(),
                err
            ));
        }
    }
}

impl Default for TimingLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_synthetic_record() {
        let ledger = TimingLedger::new();
        assert_eq!(ledger.records().len(), 1);
        assert_eq!(ledger.records()[0].tag, "gdt_start");
        assert_eq!(ledger.records()[0].delta_start, -1.0);
    }

    #[test]
    fn tags_are_sanitized() {
        let mut ledger = TimingLedger::new();
        ledger.push("action start/begin!");
        assert_eq!(ledger.records()[1].tag, "action_start_begin_");
    }

    #[test]
    fn end_tag_matches_most_recent_start() {
        let mut ledger = TimingLedger::new();
        ledger.push("sync_start");
        std::thread::sleep(std::time::Duration::from_millis(10));
        ledger.push("sync_end");

        let end = &ledger.records()[2];
        assert!(end.delta_start >= 0.010);
        // Matching-start delta spans further back than the previous record
        // only when other records intervene; here they coincide.
        assert!((end.delta_start - end.delta_prev).abs() < 0.001);
    }

    #[test]
    fn end_tag_skips_intervening_records() {
        let mut ledger = TimingLedger::new();
        ledger.push("action_start");
        ledger.push("substep");
        ledger.push("action_end");

        let end = &ledger.records()[3];
        assert!(end.delta_start >= end.delta_prev);
    }

    #[test]
    fn end_without_start_is_not_applicable() {
        let mut ledger = TimingLedger::new();
        ledger.push("orphan_end");
        assert_eq!(ledger.records()[1].delta_start, -1.0);
    }

    #[test]
    fn dump_path_is_keyed_by_start_timestamp() {
        let ledger = TimingLedger::new();
        let path = ledger.dump_path().display().to_string();
        assert!(path.starts_with("/var/log/deploy/timing_gdt-"));
        assert!(path.ends_with(".txt"));
        // Disabled flush must not attempt the write at all.
        ledger.flush(&["git-deploy".to_string()]);
    }
}
