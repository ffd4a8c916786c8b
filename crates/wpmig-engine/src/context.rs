//! `PipelineContext`: the state one run threads from stage to stage.

use std::collections::BTreeMap;

use wpmig_core::record::RecordType;

use crate::{
  apply::MediaCache,
  classify::TypedBuckets,
  index::ReferenceIndex,
  report::RunReport,
  resolve::StageState,
};

/// Everything a run accumulates. Stages take it by `&mut` and hand it on;
/// nothing here outlives the run except the report.
#[derive(Debug, Default)]
pub struct PipelineContext {
  pub buckets: TypedBuckets,
  pub index:   ReferenceIndex,
  pub media:   MediaCache,
  pub report:  RunReport,
  stages:      BTreeMap<RecordType, StageState>,
}

impl PipelineContext {
  pub fn new(report: RunReport) -> Self {
    Self { report, ..Self::default() }
  }

  pub fn stage(&self, record_type: RecordType) -> StageState {
    self.stages.get(&record_type).copied().unwrap_or_default()
  }

  pub fn set_stage(&mut self, record_type: RecordType, state: StageState) {
    tracing::debug!(stage = %record_type, ?state, "stage transition");
    self.stages.insert(record_type, state);
  }

  pub fn into_report(self) -> RunReport { self.report }
}
