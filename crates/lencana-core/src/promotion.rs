//! Promotion of last year's holders into the next badge tier.
//!
//! Only two progressions exist: Gangsa → Perak and Perak → Emas. The
//! candidate list is computed from the full snapshot; the user then picks
//! who to carry forward, and [`plan_promotion`] turns that pick into a
//! registration batch for the next year.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::{
  Error,
  Result,
  badge::{self, Badge, BadgeTier},
  record::{IdentityKey, SubmissionRecord},
  registration::{LeaderInfo, Participant, RegistrationBatch},
  role::RoleCategory,
};

/// Who to look for, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionRequest {
  /// The acting school.
  pub school:       String,
  pub source_year:  i32,
  /// Exact badge name, e.g. `"Keris Gangsa"`.
  pub source_badge: String,
  pub category:     RoleCategory,
}

impl PromotionRequest {
  pub fn target_tier(&self) -> Option<BadgeTier> {
    BadgeTier::from_name(&self.source_badge)?.next_tier()
  }

  /// Tiers run in consecutive years.
  pub fn target_year(&self) -> Result<i32> {
    self
      .source_year
      .checked_add(1)
      .ok_or_else(|| Error::InvalidDate(format!("{} + 1", self.source_year)))
  }

  /// Remarks marker attached to every promoted participant.
  pub fn provenance(&self) -> String {
    format!("IMPORT: {} {}", self.source_badge, self.source_year)
  }
}

/// How a candidate already under the target tier is recognised.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Presence {
  Ic(String),
  Key(IdentityKey),
}

fn presence(record: &SubmissionRecord) -> Presence {
  match record.normalized_ic() {
    Some(ic) => Presence::Ic(ic),
    None => Presence::Key(record.identity_key()),
  }
}

/// Records eligible for promotion under `request`.
///
/// Empty when the source badge has no next tier. Candidates already holding
/// any record under the target tier at the acting school are excluded, as
/// are repeat rows for the same person.
pub fn promotion_candidates<'a, I>(
  records: I,
  request: &PromotionRequest,
) -> Vec<SubmissionRecord>
where
  I: IntoIterator<Item = &'a SubmissionRecord>,
  I::IntoIter: Clone,
{
  let Some(target) = request.target_tier() else {
    return Vec::new();
  };
  let target_name = target.to_string();
  let records = records.into_iter();

  let at_school = |r: &&SubmissionRecord| {
    r.school.trim().eq_ignore_ascii_case(request.school.trim())
  };

  let promoted: HashSet<Presence> = records
    .clone()
    .filter(at_school)
    .filter(|r| r.badge == target_name)
    .map(presence)
    .collect();

  let mut seen = HashSet::new();
  records
    .filter(at_school)
    .filter(|r| !r.is_session_marker() && r.has_name())
    .filter(|r| r.award_year().get() == Some(request.source_year))
    .filter(|r| r.badge == request.source_badge)
    .filter(|r| request.category.contains(&r.role))
    .filter(|r| !promoted.contains(&presence(r)))
    .filter(|r| seen.insert(r.identity_key()))
    .cloned()
    .collect()
}

/// Build the batch that carries `selected` candidates into the next tier.
///
/// Refused before any network call if there is no next tier or the target
/// badge is not accepting submissions. The batch is dated 1 January of the
/// target year; membership IDs are cleared because the new tier issues new
/// ones.
pub fn plan_promotion<'a, I>(
  request: &PromotionRequest,
  selected: I,
  leader: LeaderInfo,
  badges: &[Badge],
  today: NaiveDate,
) -> Result<RegistrationBatch>
where
  I: IntoIterator<Item = &'a SubmissionRecord>,
{
  let target = request
    .target_tier()
    .ok_or_else(|| Error::NoProgression(request.source_badge.clone()))?;
  let target_name = target.to_string();

  if let Some(b) = badge::find(badges, &target_name)
    && !b.accepts_submissions(today)
  {
    return Err(Error::BadgeClosed(target_name));
  }

  let year = request.target_year()?;
  let date = NaiveDate::from_ymd_opt(year, 1, 1)
    .ok_or_else(|| Error::InvalidDate(format!("{year}-01-01")))?;
  let remarks = request.provenance();

  let participants: Vec<Participant> = selected
    .into_iter()
    .map(|r| Participant {
      name:          r.name.trim().to_owned(),
      ic:            r.ic.clone(),
      gender:        r.gender.clone(),
      race:          r.race.clone(),
      role:          r.role.clone(),
      membership_id: None,
      phone:         r.phone.clone(),
      remarks:       remarks.clone(),
    })
    .collect();

  if participants.is_empty() {
    return Err(Error::EmptyBatch);
  }

  Ok(RegistrationBatch { date, badge: target_name, leader, participants })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::role::Role;

  fn rec(
    name: &str,
    ic: Option<&str>,
    badge: &str,
    year: i32,
    role: Role,
  ) -> SubmissionRecord {
    let mut r = SubmissionRecord::new(
      "SK Bukit",
      badge,
      name,
      NaiveDate::from_ymd_opt(year, 5, 1),
    );
    r.ic = ic.map(str::to_owned);
    r.role = role;
    r.membership_id = Some("OLD-1".into());
    r
  }

  fn request(badge: &str, category: RoleCategory) -> PromotionRequest {
    PromotionRequest {
      school: "SK Bukit".into(),
      source_year: 2023,
      source_badge: badge.into(),
      category,
    }
  }

  #[test]
  fn gold_and_rambu_have_no_candidates() {
    let records = vec![
      rec("ALI", None, "Keris Emas", 2023, Role::Peserta),
      rec("ABU", None, "Anugerah Rambu", 2023, Role::PenerimaRambu),
    ];
    for badge in ["Keris Emas", "Anugerah Rambu", "Lencana Lain"] {
      let req = request(badge, RoleCategory::Participant);
      assert!(promotion_candidates(&records, &req).is_empty(), "{badge}");
    }
  }

  #[test]
  fn filters_by_year_badge_school_and_category() {
    let mut elsewhere = rec("SITI", None, "Keris Gangsa", 2023, Role::Peserta);
    elsewhere.school = "SK Lain".into();
    let records = vec![
      rec("ALI", Some("900101011234"), "Keris Gangsa", 2023, Role::Peserta),
      rec("RAMBU", None, "Keris Gangsa", 2023, Role::PenerimaRambu),
      rec("CIKGU", None, "Keris Gangsa", 2023, Role::Penguji),
      rec("LAMA", None, "Keris Gangsa", 2022, Role::Peserta),
      rec("PERAK", None, "Keris Perak", 2023, Role::Peserta),
      elsewhere,
    ];
    let out = promotion_candidates(
      &records,
      &request("Keris Gangsa", RoleCategory::Participant),
    );
    let names: Vec<_> = out.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["ALI", "RAMBU"]);
  }

  #[test]
  fn assistant_category_matches_penolong_variants_and_pemimpin() {
    let records = vec![
      rec("A", None, "Keris Perak", 2023, Role::Pemimpin),
      rec("B", None, "Keris Perak", 2023, Role::PenolongPemimpin),
      rec("C", None, "Keris Perak", 2023, Role::Other("PENOLONG PEMIMPIN II".into())),
      rec("D", None, "Keris Perak", 2023, Role::Peserta),
    ];
    let out =
      promotion_candidates(&records, &request("Keris Perak", RoleCategory::Assistant));
    assert_eq!(out.len(), 3);
  }

  #[test]
  fn already_promoted_students_are_excluded() {
    let records = vec![
      rec("ALI", Some("900101-01-1234"), "Keris Gangsa", 2023, Role::Peserta),
      rec("ALI", Some("900101011234"), "Keris Perak", 2024, Role::Peserta),
      rec("ABU", None, "Keris Gangsa", 2023, Role::Peserta),
      rec("ABU", None, "Keris Perak", 2024, Role::Peserta),
      rec("SITI", None, "Keris Gangsa", 2023, Role::Peserta),
    ];
    let out = promotion_candidates(
      &records,
      &request("Keris Gangsa", RoleCategory::Participant),
    );
    let names: Vec<_> = out.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["SITI"]);
  }

  #[test]
  fn plan_dates_batch_and_clears_ids() {
    let records =
      vec![rec("ALI", Some("900101011234"), "Keris Gangsa", 2023, Role::Peserta)];
    let req = request("Keris Gangsa", RoleCategory::Participant);
    let batch = plan_promotion(
      &req,
      &records,
      LeaderInfo::placeholder("SK Bukit", None),
      &[Badge::new("Keris Perak")],
      NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
    )
    .unwrap();

    assert_eq!(batch.badge, "Keris Perak");
    assert_eq!(batch.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    assert_eq!(batch.participants[0].membership_id, None);
    assert_eq!(batch.participants[0].remarks, "IMPORT: Keris Gangsa 2023");
  }

  #[test]
  fn plan_refuses_closed_target_badge() {
    let records = vec![rec("ALI", None, "Keris Gangsa", 2023, Role::Peserta)];
    let mut perak = Badge::new("Keris Perak");
    perak.is_open = false;
    let err = plan_promotion(
      &request("Keris Gangsa", RoleCategory::Participant),
      &records,
      LeaderInfo::placeholder("SK Bukit", None),
      &[perak],
      NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
    );
    assert!(matches!(err, Err(Error::BadgeClosed(name)) if name == "Keris Perak"));
  }

  #[test]
  fn plan_refuses_year_past_calendar_range() {
    let records = vec![rec("ALI", None, "Keris Gangsa", 2023, Role::Peserta)];
    for source_year in [i32::MAX, 300_000] {
      let req = PromotionRequest {
        source_year,
        ..request("Keris Gangsa", RoleCategory::Participant)
      };
      let err = plan_promotion(
        &req,
        &records,
        LeaderInfo::placeholder("SK Bukit", None),
        &[],
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
      );
      assert!(matches!(err, Err(Error::InvalidDate(_))), "{source_year}");
    }
  }

  #[test]
  fn plan_refuses_gold() {
    let err = plan_promotion(
      &request("Keris Emas", RoleCategory::Participant),
      &[],
      LeaderInfo::placeholder("SK Bukit", None),
      &[],
      NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
    );
    assert!(matches!(err, Err(Error::NoProgression(_))));
  }
}
