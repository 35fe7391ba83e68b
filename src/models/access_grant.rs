use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Permission flags on a grant. Viewing is always allowed while the
/// grant is live and is not independently revocable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantPermissions {
    pub allow_download: bool,
    pub allow_chat: bool,
    pub allow_notebook: bool,
}

/// One shareable link: a time-boxed token granting an unauthenticated
/// third party scoped access to one patient's record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrant {
    pub token: String,
    pub patient_id: Uuid,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub permissions: GrantPermissions,
    pub access_count: u32,
}
