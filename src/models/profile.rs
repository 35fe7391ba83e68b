use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::DocumentIdType;

/// Canonical identity + demographic record for one patient-role user.
///
/// `registry_payload` holds the raw national identity registry response;
/// `clinical_payload` is an optional later enrichment from the clinical
/// registry. Both are opaque JSON here - typed access goes through
/// `registry::payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientProfile {
    pub user_id: Uuid,
    pub document_type: DocumentIdType,
    pub document_number: String,
    pub full_name: String,
    pub age: Option<u32>,
    pub insurer_code: Option<String>,
    pub phone: Option<String>,
    pub registry_payload: Option<String>,
    pub clinical_payload: Option<String>,
    pub created_at: NaiveDateTime,
}
