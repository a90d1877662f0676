//! Multi-request operations: per-school bulk submission and promotion.

use chrono::NaiveDate;
use lencana_core::{
  promotion::{self, PromotionRequest},
  record::SubmissionRecord,
  registration::{LeaderInfo, RegistrationBatch},
  snapshot::Snapshot,
};
use serde_json::Value;

use crate::{ApiClient, Result};

/// What happened to one school's batch.
#[derive(Debug)]
pub struct GroupOutcome {
  pub school:       String,
  pub school_code:  Option<String>,
  pub participants: usize,
  pub result:       Result<Value>,
}

impl GroupOutcome {
  pub fn is_ok(&self) -> bool { self.result.is_ok() }
}

impl ApiClient {
  /// Submit `batches` one after another, pre-flighting each against
  /// `snapshot`.
  ///
  /// Every batch is attempted; a failure is recorded in its outcome and the
  /// loop moves on. Outcomes come back in input order.
  pub async fn submit_batches(
    &self,
    batches: &[RegistrationBatch],
    snapshot: &Snapshot,
    today: NaiveDate,
  ) -> Vec<GroupOutcome> {
    let mut outcomes = Vec::with_capacity(batches.len());
    for batch in batches {
      let result = self.submit_checked(batch, snapshot, today).await;
      match &result {
        Ok(_) => tracing::info!(
          school = batch.school(),
          participants = batch.participants.len(),
          "group submitted"
        ),
        Err(e) => tracing::warn!(school = batch.school(), error = %e, "group failed"),
      }
      outcomes.push(GroupOutcome {
        school: batch.school().to_owned(),
        school_code: batch.leader.school_code.clone(),
        participants: batch.participants.len(),
        result,
      });
    }
    outcomes
  }

  /// Carry `selected` holders of `request.source_badge` into the next tier.
  ///
  /// Planning and pre-flight run first; a closed target badge or a batch
  /// that would clash is refused without any request being sent.
  pub async fn promote(
    &self,
    snapshot: &Snapshot,
    request: &PromotionRequest,
    selected: &[SubmissionRecord],
    leader: LeaderInfo,
    today: NaiveDate,
  ) -> Result<Value> {
    let batch = promotion::plan_promotion(request, selected, leader, &snapshot.badges, today)?;
    tracing::info!(
      school = %request.school,
      from = %request.source_badge,
      to = %batch.badge,
      count = batch.participants.len(),
      "promoting"
    );
    self.submit_checked(&batch, snapshot, today).await
  }
}
