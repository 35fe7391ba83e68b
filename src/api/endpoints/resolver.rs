//! Patient resolution endpoints (clinical staff).

use std::str::FromStr;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PatientView;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db;
use crate::models::enums::{AuditAccessType, DocumentIdType, UserRole};
use crate::models::ProfessionalPatientContext;
use crate::registry::{walk_payload, PayloadNode, MAX_WALK_DEPTH};
use crate::resolver::{self, Resolution};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub document_number: String,
    pub document_type: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub level: u8,
    pub require_document_type: bool,
    pub is_new: bool,
    pub auditable: bool,
    pub patient: Option<PatientView>,
}

/// `POST /api/patients/resolve` - run the cascade for a document number.
pub async fn resolve(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, ApiError> {
    user.require_role(UserRole::Professional)?;

    let document_type = match req.document_type.as_deref() {
        None => None,
        Some(raw) => Some(DocumentIdType::from_str(&raw.to_uppercase()).map_err(|_| {
            ApiError::BadRequest(format!("Unsupported document type '{raw}'"))
        })?),
    };

    let mut conn = ctx.open_db()?;
    let resolution = resolver::resolve(
        &mut conn,
        &ctx.registry,
        user.user_id,
        &req.document_number,
        document_type,
        Utc::now().naive_utc(),
    )
    .await?;

    // A freshly created profile gets a best-effort clinical enrichment,
    // detached so its failure never reaches the professional.
    if let Resolution::External { patient } = &resolution {
        spawn_enrichment(&ctx, patient.user_id, patient.document_type, patient.document_number.clone());
    }

    let auditable = resolution
        .audit_class()
        .map(|(_, auditable)| auditable)
        .unwrap_or(false);
    let response = ResolveResponse {
        level: resolution.level(),
        require_document_type: matches!(resolution, Resolution::RequiresDocumentType),
        is_new: resolution.is_new(),
        auditable,
        patient: match &resolution {
            Resolution::Local { patient, .. }
            | Resolution::Platform { patient }
            | Resolution::External { patient } => Some(PatientView::from(patient)),
            _ => None,
        },
    };
    Ok(Json(response))
}

fn spawn_enrichment(
    ctx: &ApiContext,
    patient_id: Uuid,
    document_type: DocumentIdType,
    document_number: String,
) {
    let Some(clinical) = ctx.clinical_registry.clone() else {
        return;
    };
    let ctx = ctx.clone();
    tokio::spawn(async move {
        match clinical.fetch(document_type, &document_number).await {
            Ok(Some(payload)) => {
                let serialized = match serde_json::to_string(&payload) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!(error = %e, "Clinical payload not serializable");
                        return;
                    }
                };
                match ctx.open_db() {
                    Ok(conn) => {
                        if let Err(e) = db::update_clinical_payload(&conn, &patient_id, &serialized)
                        {
                            tracing::warn!(error = %e, %patient_id, "Clinical enrichment not stored");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Clinical enrichment skipped"),
                }
            }
            Ok(None) => tracing::debug!(%patient_id, "No clinical registry record"),
            Err(e) => tracing::debug!(error = %e, "Clinical registry unavailable"),
        }
    });
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectRequest {
    pub patient_id: Uuid,
    pub clinic_id: Option<Uuid>,
    /// Cascade level the selection came from (1..=3).
    pub level: u8,
}

/// `POST /api/patients/select` - persist the professional's selection
/// and write the audit entry classified by resolution level.
pub async fn select(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<ProfessionalPatientContext>, ApiError> {
    user.require_role(UserRole::Professional)?;

    let (access_type, auditable) = match req.level {
        1 => (AuditAccessType::ClinicLocal, false),
        2 | 3 => (AuditAccessType::GlobalOrExternal, true),
        other => {
            return Err(ApiError::BadRequest(format!(
                "Invalid resolution level {other}"
            )))
        }
    };

    let conn = ctx.open_db()?;
    if db::get_profile(&conn, &req.patient_id)?.is_none() {
        return Err(ApiError::NotFound("Patient not found".into()));
    }

    let context = resolver::select_patient(
        &conn,
        user.user_id,
        req.patient_id,
        req.clinic_id,
        access_type,
        auditable,
        Some(&format!("cascade level {}", req.level)),
        Utc::now().naive_utc(),
    )?;
    Ok(Json(context))
}

#[derive(Serialize)]
pub struct ContextResponse {
    pub context: Option<ProfessionalPatientContext>,
}

/// `GET /api/patients/context` - the professional's current pointer.
/// The client mirrors this, but this row is authoritative.
pub async fn context(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<ContextResponse>, ApiError> {
    user.require_role(UserRole::Professional)?;
    let conn = ctx.open_db()?;
    let context = db::get_professional_context(&conn, &user.user_id)?;
    Ok(Json(ContextResponse { context }))
}

#[derive(Serialize)]
pub struct RegistryPayloadResponse {
    pub payload: PayloadNode,
}

/// `GET /api/patients/:id/registry-payload` - the raw registry blob
/// rendered as a tagged-variant tree. Professionals and the patient
/// themself may view it.
pub async fn registry_payload(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<RegistryPayloadResponse>, ApiError> {
    if user.role != UserRole::Professional && user.user_id != patient_id {
        return Err(ApiError::Forbidden);
    }

    let conn = ctx.open_db()?;
    let profile = db::get_profile(&conn, &patient_id)?
        .ok_or_else(|| ApiError::NotFound("Patient not found".into()))?;
    let raw = profile
        .registry_payload
        .ok_or_else(|| ApiError::NotFound("No registry payload on file".into()))?;

    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| ApiError::Internal(format!("stored payload unreadable: {e}")))?;

    Ok(Json(RegistryPayloadResponse {
        payload: walk_payload(&value, MAX_WALK_DEPTH),
    }))
}
