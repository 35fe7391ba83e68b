use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AuditAccessType;

/// One record of a professional or guest touching a patient's data.
/// Written at point of access, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessAuditEntry {
    pub id: i64,
    pub actor_id: Uuid,
    pub patient_id: Uuid,
    pub clinic_id: Option<Uuid>,
    pub access_type: AuditAccessType,
    /// True when the access crossed clinic boundaries (platform-wide or
    /// external resolution) - the "who accessed my data" views key on this.
    pub auditable_for_patient: bool,
    pub detail: Option<String>,
    pub created_at: NaiveDateTime,
}
