//! Grouping imported rows into one registration batch per school.

use chrono::NaiveDate;
use lencana_core::{
  registration::{LeaderInfo, Participant, RegistrationBatch},
  role::Role,
};

use crate::rows::ImportRow;

/// Split `rows` into per-school batches for `badge`, dated `date`.
///
/// Groups are keyed by (school, code) and come out in the order their first
/// row appears. The first `PEMIMPIN` row in a group supplies the leader
/// details; without one the placeholder leader is used. Groups with nobody
/// to submit are dropped.
pub fn group_batches(rows: &[ImportRow], badge: &str, date: NaiveDate) -> Vec<RegistrationBatch> {
  let mut groups: Vec<((&str, Option<&str>), Vec<&ImportRow>)> = Vec::new();
  for row in rows {
    let key = (row.school.as_str(), row.code.as_deref());
    match groups.iter_mut().find(|(k, _)| *k == key) {
      Some((_, members)) => members.push(row),
      None => groups.push((key, vec![row])),
    }
  }

  groups
    .into_iter()
    .filter_map(|((school, code), members)| {
      let leader = members
        .iter()
        .find(|r| r.role == Role::Pemimpin)
        .map_or_else(
          || LeaderInfo::placeholder(school, code.map(str::to_owned)),
          |r| LeaderInfo {
            name:        r.name.clone(),
            phone:       r.phone.clone(),
            race:        r.race.clone(),
            school:      school.to_owned(),
            school_code: code.map(str::to_owned),
          },
        );

      let participants: Vec<Participant> = members
        .iter()
        .filter(|r| r.role.category().is_some())
        .map(|r| Participant {
          name:          r.name.clone(),
          ic:            r.ic.clone(),
          gender:        r.gender.clone(),
          race:          r.race.clone(),
          role:          r.role.clone(),
          membership_id: r.membership_id.clone(),
          phone:         r.phone.clone(),
          remarks:       String::new(),
        })
        .collect();

      if participants.is_empty() {
        tracing::info!(school, "skipping import group with no participants");
        return None;
      }
      Some(RegistrationBatch { date, badge: badge.to_owned(), leader, participants })
    })
    .collect()
}
