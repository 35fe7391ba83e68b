use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A clinical document owned by one patient. Binary content lives in the
/// external object store; `content` is the extracted text used for
/// assistant context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalDocument {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub title: String,
    pub category: Option<String>,
    pub content: Option<String>,
    pub storage_url: Option<String>,
    pub uploaded_at: NaiveDateTime,
}
