//! Run accounting: per-type counters and the ordered warning list.
//!
//! The report is append-only. Counters only ever increase and warnings are
//! never removed, so whatever a run managed to do is always visible in the
//! final summary.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use wpmig_core::record::RecordType;

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// What happened to one record (or one destination entity) in a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
  Created,
  Reused,
  Skipped,
  /// A collaborator error prevented the record from being applied.
  Failed,
  /// Deleted by `reset`.
  Removed,
}

// ─── Counters ────────────────────────────────────────────────────────────────

/// Counters for one record type.
///
/// `failed` records are also counted as `skipped`, so for import and migrate
/// runs `created + reused + skipped == attempted` always holds. For reset
/// runs `removed + failed == attempted`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
  pub attempted: usize,
  pub created:   usize,
  pub reused:    usize,
  pub skipped:   usize,
  pub failed:    usize,
  pub removed:   usize,
}

impl TypeCounts {
  fn record(&mut self, outcome: Outcome) {
    self.attempted += 1;
    match outcome {
      Outcome::Created => self.created += 1,
      Outcome::Reused => self.reused += 1,
      Outcome::Skipped => self.skipped += 1,
      Outcome::Failed => {
        self.failed += 1;
        self.skipped += 1;
      }
      Outcome::Removed => self.removed += 1,
    }
  }
}

// ─── Warnings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
  pub record_type: RecordType,
  /// The record or entity the warning is about, when there is one.
  pub subject:     Option<String>,
  pub message:     String,
}

impl fmt::Display for Warning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.subject {
      Some(subject) => write!(f, "[{}] {subject}: {}", self.record_type, self.message),
      None => write!(f, "[{}] {}", self.record_type, self.message),
    }
  }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// Final counts for one record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
  pub record_type: RecordType,
  pub counts:      TypeCounts,
}

impl fmt::Display for Summary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let c = &self.counts;
    write!(
      f,
      "{}: attempted {}, created {}, reused {}, skipped {}, failed {}",
      self.record_type.plural(),
      c.attempted,
      c.created,
      c.reused,
      c.skipped,
      c.failed,
    )?;
    if c.removed > 0 {
      write!(f, ", removed {}", c.removed)?;
    }
    Ok(())
  }
}

// ─── RunReport ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub run_id:     Uuid,
  pub started_at: DateTime<Utc>,
  counts:         BTreeMap<RecordType, TypeCounts>,
  warnings:       Vec<Warning>,
}

impl Default for RunReport {
  fn default() -> Self { Self::new() }
}

impl RunReport {
  pub fn new() -> Self {
    Self {
      run_id:     Uuid::new_v4(),
      started_at: Utc::now(),
      counts:     BTreeMap::new(),
      warnings:   Vec::new(),
    }
  }

  /// Count one record of `record_type` with its outcome.
  pub fn tick(&mut self, record_type: RecordType, outcome: Outcome) {
    self.counts.entry(record_type).or_default().record(outcome);
  }

  /// Append a warning and log it.
  pub fn warn(
    &mut self,
    record_type: RecordType,
    subject: Option<String>,
    message: impl Into<String>,
  ) {
    let warning = Warning { record_type, subject, message: message.into() };
    tracing::warn!(run_id = %self.run_id, "{warning}");
    self.warnings.push(warning);
  }

  /// Current counts for one type; zero if nothing was counted.
  pub fn counts(&self, record_type: RecordType) -> TypeCounts {
    self.counts.get(&record_type).copied().unwrap_or_default()
  }

  /// Summarise one type and log the result. A finished type is listed by
  /// [`summaries`](Self::summaries) even when nothing of it was counted.
  pub fn finish(&mut self, record_type: RecordType) -> Summary {
    let counts = *self.counts.entry(record_type).or_default();
    let summary = Summary { record_type, counts };
    tracing::info!(run_id = %self.run_id, "{summary}");
    summary
  }

  /// Summaries of every type that was counted or finished, in declaration
  /// order.
  pub fn summaries(&self) -> Vec<Summary> {
    self
      .counts
      .iter()
      .map(|(&record_type, &counts)| Summary { record_type, counts })
      .collect()
  }

  pub fn warnings(&self) -> &[Warning] { &self.warnings }

  /// Total of `failed` across all types.
  pub fn failures(&self) -> usize { self.counts.values().map(|c| c.failed).sum() }
}
