//! Cascading patient resolution for clinical staff.
//!
//! A professional types a document number; the resolver checks four
//! escalating scopes strictly in order and stops at the first match:
//!
//! 1. Patients linked to a clinic the professional belongs to.
//! 2. Any patient profile on the platform (crosses clinic boundaries -
//!    the selection must be audited as visible to the patient).
//! 3. The external identity registry - only once a document type is
//!    supplied, because the registry needs a typed identity. A hit
//!    either attaches to an existing profile (level-2 semantics) or
//!    creates a new patient from the registry response.
//! 4. Not found. Registry failures land here too: an unreachable
//!    registry and an absent patient call for the same next action.
//!
//! Narrower scopes always win, which keeps cross-clinic audit exposure
//! and external calls to the minimum.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::enums::{AuditAccessType, DocumentIdType, UserRole};
use crate::models::{PatientProfile, ProfessionalPatientContext, User};
use crate::registry::{IdentityRegistry, RegistryIdentity};

/// Outcome of one cascade run.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// Level 1: found inside the professional's own clinic relationship.
    Local {
        patient: PatientProfile,
        clinic_id: Uuid,
    },
    /// Level 2: found platform-wide (or attached during a level-3 race).
    Platform { patient: PatientProfile },
    /// Level-3 gate: the caller must supply a document type before the
    /// external registry can be consulted.
    RequiresDocumentType,
    /// Level 3: created from the external registry response.
    External { patient: PatientProfile },
    /// Level 4: nowhere to be found.
    NotFound,
}

impl Resolution {
    pub fn level(&self) -> u8 {
        match self {
            Resolution::Local { .. } => 1,
            Resolution::Platform { .. } => 2,
            Resolution::RequiresDocumentType => 3,
            Resolution::External { .. } => 3,
            Resolution::NotFound => 4,
        }
    }

    /// Whether this resolution was newly created from the registry.
    pub fn is_new(&self) -> bool {
        matches!(self, Resolution::External { .. })
    }

    /// Audit classification for a selection made from this resolution.
    /// `None` for outcomes that resolve no patient.
    pub fn audit_class(&self) -> Option<(AuditAccessType, bool)> {
        match self {
            Resolution::Local { .. } => Some((AuditAccessType::ClinicLocal, false)),
            Resolution::Platform { .. } | Resolution::External { .. } => {
                Some((AuditAccessType::GlobalOrExternal, true))
            }
            Resolution::RequiresDocumentType | Resolution::NotFound => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("Document number must not be empty")]
    EmptyDocumentNumber,
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Run the cascade. Levels are checked strictly sequentially; the
/// registry is consulted only at level 3 and only with a typed identity.
pub async fn resolve(
    conn: &mut Connection,
    registry: &IdentityRegistry,
    professional_id: Uuid,
    document_number: &str,
    document_type: Option<DocumentIdType>,
    now: NaiveDateTime,
) -> Result<Resolution, ResolverError> {
    let number = document_number.trim();
    if number.is_empty() {
        return Err(ResolverError::EmptyDocumentNumber);
    }

    // Level 1: the professional's own clinics.
    if let Some((patient, clinic_id)) = db::find_clinic_local_patient(conn, &professional_id, number)?
    {
        tracing::debug!(%professional_id, level = 1, "Resolved patient in own clinic");
        return Ok(Resolution::Local { patient, clinic_id });
    }

    // Level 2: anywhere on the platform.
    if let Some(patient) = db::find_profile_by_number(conn, number)? {
        tracing::debug!(%professional_id, level = 2, "Resolved patient platform-wide");
        return Ok(Resolution::Platform { patient });
    }

    // Level 3 needs a typed identity; without one, stop before the
    // registry and ask the caller.
    let Some(document_type) = document_type else {
        return Ok(Resolution::RequiresDocumentType);
    };

    match registry.lookup(document_type, number).await {
        Ok(Some(identity)) => create_from_registry(conn, &identity, document_type, number, now),
        Ok(None) => {
            tracing::debug!(%professional_id, level = 4, "Registry knows no such identity");
            Ok(Resolution::NotFound)
        }
        Err(e) => {
            // An unreachable registry and an absent patient require the
            // same next action from the professional.
            tracing::warn!(error = %e, "Registry lookup failed, treating as not found");
            Ok(Resolution::NotFound)
        }
    }
}

/// Create a patient user + profile from a registry identity.
///
/// The natural-key UNIQUE constraint guards concurrent creation: on a
/// conflict the winner's profile is re-read and returned with level-2
/// semantics, so both professionals get a definitive outcome and exactly
/// one profile exists.
pub fn create_from_registry(
    conn: &Connection,
    identity: &RegistryIdentity,
    document_type: DocumentIdType,
    document_number: &str,
    now: NaiveDateTime,
) -> Result<Resolution, ResolverError> {
    let full_name = identity
        .display_name()
        .unwrap_or_else(|| document_number.to_string());

    let user = User {
        id: Uuid::new_v4(),
        role: UserRole::Patient,
        email: None,
        full_name: full_name.clone(),
        created_at: now,
    };

    let profile = PatientProfile {
        user_id: user.id,
        document_type,
        document_number: document_number.to_string(),
        full_name,
        age: identity.age_at(now.date()),
        insurer_code: identity.insurer_code.clone(),
        phone: None,
        registry_payload: serde_json::to_string(&identity.raw).ok(),
        clinical_payload: None,
        created_at: now,
    };

    db::insert_user(conn, &user)?;
    match db::insert_profile(conn, &profile) {
        Ok(()) => {
            tracing::info!(patient = %user.id, level = 3, "Created patient from registry");
            Ok(Resolution::External { patient: profile })
        }
        Err(e) if e.is_unique_violation() => {
            // Lost the creation race; the existing profile wins.
            let existing = db::find_profile_by_document(conn, document_type, document_number)?;
            match existing {
                Some(patient) => {
                    tracing::info!(level = 2, "Concurrent creation detected, attaching to existing profile");
                    Ok(Resolution::Platform { patient })
                }
                None => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Persist a professional's patient selection: overwrite the single
/// context row and write the audit entry classified by the resolution
/// level. The auditable flag is what the patient-facing "who accessed
/// my data" view keys on.
#[allow(clippy::too_many_arguments)]
pub fn select_patient(
    conn: &Connection,
    professional_id: Uuid,
    patient_id: Uuid,
    clinic_id: Option<Uuid>,
    access_type: AuditAccessType,
    auditable_for_patient: bool,
    detail: Option<&str>,
    now: NaiveDateTime,
) -> Result<ProfessionalPatientContext, ResolverError> {
    let context = ProfessionalPatientContext {
        professional_id,
        patient_id,
        clinic_id,
        updated_at: now,
    };
    db::upsert_professional_context(conn, &context)?;
    db::append_audit(
        conn,
        &professional_id,
        &patient_id,
        clinic_id.as_ref(),
        access_type,
        auditable_for_patient,
        detail,
        now,
    )?;
    Ok(context)
}
