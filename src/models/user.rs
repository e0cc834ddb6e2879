use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Default avatar served when a user has no uploaded or provider photo.
pub const DEFAULT_PROFILE_PHOTO: &str = "/profiles/default-profile.jpg";

/// One account row, keyed by the identity verifier's stable uid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub username: String,
    pub email: String,
    /// Local credential; None for provider-only accounts.
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub photo_url: String,
    pub birthdate: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
}

/// Closed set of profile fields a user may update. Each field is
/// independently optional; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfileUpdate {
    pub username: Option<String>,
    pub birthdate: Option<NaiveDate>,
}

impl UserProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.birthdate.is_none()
    }
}
