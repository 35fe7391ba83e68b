use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ClinicMemberRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clinic {
    pub id: Uuid,
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicMember {
    pub clinic_id: Uuid,
    pub user_id: Uuid,
    pub member_role: ClinicMemberRole,
    pub added_at: NaiveDateTime,
}
