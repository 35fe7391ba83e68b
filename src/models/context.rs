use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A professional's "currently selected patient" pointer. At most one
/// row per professional, overwritten wholesale on each new selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfessionalPatientContext {
    pub professional_id: Uuid,
    pub patient_id: Uuid,
    pub clinic_id: Option<Uuid>,
    pub updated_at: NaiveDateTime,
}
