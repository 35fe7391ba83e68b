//! Access grants - time-boxed guest links into one patient's record.
//!
//! A grant is an opaque unguessable token with an expiry and a permission
//! set. Guests present the token on every request; validation is always
//! server-side against the stored row. Revocation is deletion. The
//! client-side countdown is advisory only.

use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::enums::GrantAction;
use crate::models::{AccessGrant, ClinicalDocument, GrantPermissions, PatientProfile};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// The enumerated durations a patient can pick. Arbitrary durations are
/// rejected at the edge; nothing else ever reaches storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantDuration {
    Minutes5,
    Minutes15,
    Minutes30,
    Minutes60,
    Minutes180,
}

impl GrantDuration {
    pub const ALL: [GrantDuration; 5] = [
        GrantDuration::Minutes5,
        GrantDuration::Minutes15,
        GrantDuration::Minutes30,
        GrantDuration::Minutes60,
        GrantDuration::Minutes180,
    ];

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        match minutes {
            5 => Some(Self::Minutes5),
            15 => Some(Self::Minutes15),
            30 => Some(Self::Minutes30),
            60 => Some(Self::Minutes60),
            180 => Some(Self::Minutes180),
            _ => None,
        }
    }

    pub fn minutes(self) -> i64 {
        match self {
            Self::Minutes5 => 5,
            Self::Minutes15 => 15,
            Self::Minutes30 => 30,
            Self::Minutes60 => 60,
            Self::Minutes180 => 180,
        }
    }
}

/// What a successful validation hands back to the guest view: the grant
/// (with the counter already incremented), the patient's profile, and the
/// document list with whatever URLs the storage layer currently resolves.
#[derive(Debug, Clone, Serialize)]
pub struct GuestAccess {
    pub grant: AccessGrant,
    pub profile: PatientProfile,
    pub documents: Vec<ClinicalDocument>,
}

/// Share payload returned on grant creation, also QR-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharePayload {
    pub token: String,
    pub share_url: String,
    pub expires_at: NaiveDateTime,
    pub permissions: GrantPermissions,
    pub access_count: u32,
    pub qr_svg: String,
}

/// A grant as listed in the owner's "active links" panel.
#[derive(Debug, Clone, Serialize)]
pub struct GrantSummary {
    #[serde(flatten)]
    pub grant: AccessGrant,
    pub live: bool,
}

/// Errors from grant operations. `NotFound` / `Expired` / `Forbidden`
/// are deliberately distinct - the guest page shows different states
/// for each.
#[derive(Debug, thiserror::Error)]
pub enum GrantError {
    #[error("Grant not found")]
    NotFound,
    #[error("Grant expired")]
    Expired,
    #[error("Grant does not permit {0}")]
    Forbidden(&'static str),
    #[error("Patient profile missing for grant")]
    ProfileMissing,
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Token + QR helpers
// ---------------------------------------------------------------------------

/// Generate a random share token (URL-safe base64, 32 bytes of entropy).
pub fn generate_share_token() -> String {
    use base64::Engine;
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Render a share URL as an SVG QR code.
pub fn share_qr_svg(url: &str) -> Result<String, String> {
    use qrcode::render::svg;
    use qrcode::QrCode;

    let code = QrCode::new(url.as_bytes()).map_err(|e| format!("QR generation failed: {e}"))?;
    let svg_string = code
        .render::<svg::Color>()
        .min_dimensions(240, 240)
        .dark_color(svg::Color("#1c1917"))
        .light_color(svg::Color("#ffffff"))
        .build();
    Ok(svg_string)
}

/// Advisory countdown for the guest UI, recomputed client-side every
/// second. Authoritative expiry stays server-side at next validation.
pub fn remaining_seconds(expires_at: NaiveDateTime, now: NaiveDateTime) -> i64 {
    (expires_at - now).num_seconds().max(0)
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Create a grant for the given patient. Atomic: a persistence failure
/// surfaces as an error and no token is issued.
pub fn create_grant(
    conn: &Connection,
    patient_id: Uuid,
    duration: GrantDuration,
    permissions: GrantPermissions,
    now: NaiveDateTime,
) -> Result<AccessGrant, GrantError> {
    let grant = AccessGrant {
        token: generate_share_token(),
        patient_id,
        created_at: now,
        expires_at: now + Duration::minutes(duration.minutes()),
        permissions,
        access_count: 0,
    };
    db::insert_grant(conn, &grant)?;
    tracing::info!(patient = %patient_id, expires_at = %grant.expires_at, "Access grant created");
    Ok(grant)
}

/// Build the share payload (URL + QR) for a freshly created or listed grant.
pub fn build_share_payload(grant: &AccessGrant, share_url: String) -> SharePayload {
    let qr_svg = share_qr_svg(&share_url).unwrap_or_default();
    SharePayload {
        token: grant.token.clone(),
        share_url,
        expires_at: grant.expires_at,
        permissions: grant.permissions,
        access_count: grant.access_count,
        qr_svg,
    }
}

fn required_permission(
    permissions: &GrantPermissions,
    action: GrantAction,
) -> Result<(), GrantError> {
    let allowed = match action {
        GrantAction::View => true,
        GrantAction::DownloadDocument => permissions.allow_download,
        GrantAction::ChatMessage => permissions.allow_chat,
        GrantAction::Notebook => permissions.allow_notebook,
    };
    if allowed {
        Ok(())
    } else {
        Err(GrantError::Forbidden(action.as_str()))
    }
}

/// Validate a token for an action and consume one access.
///
/// Order matters: lookup, then expiry, then permission. The permission
/// check is independent of expiry - a forbidden action on a live grant
/// fails `Forbidden`, not `Expired`. Every successful call increments
/// the access counter and appends an access-detail row; callers must
/// expect the counter to grow on every page reload.
pub fn validate_grant(
    conn: &Connection,
    token: &str,
    action: GrantAction,
    detail: Option<&str>,
    now: NaiveDateTime,
) -> Result<GuestAccess, GrantError> {
    let grant = db::get_grant(conn, token)?.ok_or(GrantError::NotFound)?;

    if now >= grant.expires_at {
        // The row stays in storage for audit; it is permanently unusable.
        return Err(GrantError::Expired);
    }

    required_permission(&grant.permissions, action)?;

    let access_count = db::increment_grant_access(conn, token)?;
    db::append_grant_detail(conn, token, action, detail, now)?;

    let profile =
        db::get_profile(conn, &grant.patient_id)?.ok_or(GrantError::ProfileMissing)?;
    let documents = db::list_documents(conn, &grant.patient_id)?;

    Ok(GuestAccess {
        grant: AccessGrant {
            access_count,
            ..grant
        },
        profile,
        documents,
    })
}

/// Revoke (delete) a grant owned by the given patient. Irreversible;
/// subsequent validations fail `NotFound`.
pub fn revoke_grant(
    conn: &Connection,
    patient_id: Uuid,
    token: &str,
) -> Result<(), GrantError> {
    if db::delete_grant(conn, &patient_id, token)? {
        tracing::info!(patient = %patient_id, "Access grant revoked");
        Ok(())
    } else {
        Err(GrantError::NotFound)
    }
}

/// The owner's grant list, each annotated with whether it is still live.
pub fn list_grants_with_status(
    conn: &Connection,
    patient_id: Uuid,
    now: NaiveDateTime,
) -> Result<Vec<GrantSummary>, GrantError> {
    let grants = db::list_grants(conn, &patient_id)?;
    Ok(grants
        .into_iter()
        .map(|grant| GrantSummary {
            live: now < grant.expires_at,
            grant,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
