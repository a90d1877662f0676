//! The `action` discriminator understood by the backend script.

use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
  GetData,
  GetCsrf,
  LoginUser,
  LoginAdmin,
  SubmitForm,
  /// Membership ID correction.
  UpdateData,
  DeleteRecord,
  LockSchoolBadge,
  UnlockSchoolBadge,
  ApproveSchoolBadge,
  ToggleRegistration,
  ToggleBadge,
  UpdateSchoolPermissions,
  ChangePassword,
  MigrateYear,
  RegisterSchool,
  SetupDatabase,
  ClearSheetData,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wire_names() {
    assert_eq!(Action::GetCsrf.as_ref(), "get_csrf");
    assert_eq!(Action::UpdateSchoolPermissions.to_string(), "update_school_permissions");
    assert_eq!("clear_sheet_data".parse::<Action>().unwrap(), Action::ClearSheetData);
    assert_eq!(serde_json::to_value(Action::LoginUser).unwrap(), "login_user");
  }
}
