use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

/// Timestamp storage format. All timestamps are UTC.
pub fn format_ts(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn parse_ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .unwrap_or_default()
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

// ═══════════════════════════════════════════
// User Repository
// ═══════════════════════════════════════════

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, role, email, full_name, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id.to_string(),
            user.role.as_str(),
            user.email,
            user.full_name,
            format_ts(user.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, role, email, full_name, created_at FROM users WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    });

    match result {
        Ok((id, role, email, full_name, created_at)) => Ok(Some(User {
            id: parse_uuid(&id)?,
            role: UserRole::from_str(&role)?,
            email,
            full_name,
            created_at: parse_ts(&created_at),
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ═══════════════════════════════════════════
// Patient Profile Repository
// ═══════════════════════════════════════════

const PROFILE_COLUMNS: &str = "user_id, document_type, document_number, full_name, age,
     insurer_code, phone, registry_payload, clinical_payload, created_at";

struct ProfileRow {
    user_id: String,
    document_type: String,
    document_number: String,
    full_name: String,
    age: Option<u32>,
    insurer_code: Option<String>,
    phone: Option<String>,
    registry_payload: Option<String>,
    clinical_payload: Option<String>,
    created_at: String,
}

fn read_profile_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        user_id: row.get(0)?,
        document_type: row.get(1)?,
        document_number: row.get(2)?,
        full_name: row.get(3)?,
        age: row.get(4)?,
        insurer_code: row.get(5)?,
        phone: row.get(6)?,
        registry_payload: row.get(7)?,
        clinical_payload: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn profile_from_row(row: ProfileRow) -> Result<PatientProfile, DatabaseError> {
    Ok(PatientProfile {
        user_id: parse_uuid(&row.user_id)?,
        document_type: DocumentIdType::from_str(&row.document_type)?,
        document_number: row.document_number,
        full_name: row.full_name,
        age: row.age,
        insurer_code: row.insurer_code,
        phone: row.phone,
        registry_payload: row.registry_payload,
        clinical_payload: row.clinical_payload,
        created_at: parse_ts(&row.created_at),
    })
}

pub fn insert_profile(conn: &Connection, profile: &PatientProfile) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patient_profiles (user_id, document_type, document_number, full_name,
         age, insurer_code, phone, registry_payload, clinical_payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            profile.user_id.to_string(),
            profile.document_type.as_str(),
            profile.document_number,
            profile.full_name,
            profile.age,
            profile.insurer_code,
            profile.phone,
            profile.registry_payload,
            profile.clinical_payload,
            format_ts(profile.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_profile(conn: &Connection, user_id: &Uuid) -> Result<Option<PatientProfile>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROFILE_COLUMNS} FROM patient_profiles WHERE user_id = ?1"
    ))?;

    let result = stmt.query_row(params![user_id.to_string()], read_profile_row);

    match result {
        Ok(row) => Ok(Some(profile_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Exact match on the natural key (document type + number).
pub fn find_profile_by_document(
    conn: &Connection,
    document_type: DocumentIdType,
    document_number: &str,
) -> Result<Option<PatientProfile>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROFILE_COLUMNS} FROM patient_profiles
         WHERE document_type = ?1 AND document_number = ?2"
    ))?;

    let result = stmt.query_row(
        params![document_type.as_str(), document_number],
        read_profile_row,
    );

    match result {
        Ok(row) => Ok(Some(profile_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Platform-wide match on document number alone, oldest profile first.
pub fn find_profile_by_number(
    conn: &Connection,
    document_number: &str,
) -> Result<Option<PatientProfile>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROFILE_COLUMNS} FROM patient_profiles
         WHERE document_number = ?1 ORDER BY created_at ASC LIMIT 1"
    ))?;

    let result = stmt.query_row(params![document_number], read_profile_row);

    match result {
        Ok(row) => Ok(Some(profile_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Match on document number among patients linked to any clinic the
/// requesting professional belongs to. Returns the profile and the
/// shared clinic id.
pub fn find_clinic_local_patient(
    conn: &Connection,
    professional_id: &Uuid,
    document_number: &str,
) -> Result<Option<(PatientProfile, Uuid)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT p.user_id, p.document_type, p.document_number, p.full_name, p.age,
                p.insurer_code, p.phone, p.registry_payload, p.clinical_payload, p.created_at,
                pm.clinic_id
         FROM patient_profiles p
         JOIN clinic_members pm ON pm.user_id = p.user_id
         JOIN clinic_members prof ON prof.clinic_id = pm.clinic_id
         WHERE prof.user_id = ?1 AND p.document_number = ?2
         LIMIT 1",
    )?;

    let result = stmt.query_row(
        params![professional_id.to_string(), document_number],
        |row| {
            let profile = read_profile_row(row)?;
            let clinic_id: String = row.get(10)?;
            Ok((profile, clinic_id))
        },
    );

    match result {
        Ok((row, clinic)) => Ok(Some((profile_from_row(row)?, parse_uuid(&clinic)?))),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_profile_phone(
    conn: &Connection,
    user_id: &Uuid,
    phone: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE patient_profiles SET phone = ?1 WHERE user_id = ?2",
        params![phone, user_id.to_string()],
    )?;
    Ok(())
}

/// Attach the clinical registry enrichment payload (best-effort path).
pub fn update_clinical_payload(
    conn: &Connection,
    user_id: &Uuid,
    payload: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE patient_profiles SET clinical_payload = ?1 WHERE user_id = ?2",
        params![payload, user_id.to_string()],
    )?;
    Ok(())
}

// ═══════════════════════════════════════════
// Clinic Repository
// ═══════════════════════════════════════════

pub fn insert_clinic(conn: &Connection, clinic: &Clinic) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO clinics (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![
            clinic.id.to_string(),
            clinic.name,
            format_ts(clinic.created_at)
        ],
    )?;
    Ok(())
}

pub fn add_clinic_member(conn: &Connection, member: &ClinicMember) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO clinic_members (clinic_id, user_id, member_role, added_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            member.clinic_id.to_string(),
            member.user_id.to_string(),
            member.member_role.as_str(),
            format_ts(member.added_at),
        ],
    )?;
    Ok(())
}

/// Link a user to a clinic, ignoring an already-present membership.
pub fn ensure_clinic_member(conn: &Connection, member: &ClinicMember) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO clinic_members (clinic_id, user_id, member_role, added_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            member.clinic_id.to_string(),
            member.user_id.to_string(),
            member.member_role.as_str(),
            format_ts(member.added_at),
        ],
    )?;
    Ok(())
}

pub fn clinics_for_user(conn: &Connection, user_id: &Uuid) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT clinic_id FROM clinic_members WHERE user_id = ?1")?;
    let rows = stmt.query_map(params![user_id.to_string()], |row| {
        row.get::<_, String>(0)
    })?;

    let mut clinics = Vec::new();
    for row in rows {
        clinics.push(parse_uuid(&row?)?);
    }
    Ok(clinics)
}

// ═══════════════════════════════════════════
// Document Repository
// ═══════════════════════════════════════════

const DOCUMENT_COLUMNS: &str =
    "id, patient_id, title, category, content, storage_url, uploaded_at";

struct DocumentRow {
    id: String,
    patient_id: String,
    title: String,
    category: Option<String>,
    content: Option<String>,
    storage_url: Option<String>,
    uploaded_at: String,
}

fn read_document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        title: row.get(2)?,
        category: row.get(3)?,
        content: row.get(4)?,
        storage_url: row.get(5)?,
        uploaded_at: row.get(6)?,
    })
}

fn document_from_row(row: DocumentRow) -> Result<ClinicalDocument, DatabaseError> {
    Ok(ClinicalDocument {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        title: row.title,
        category: row.category,
        content: row.content,
        storage_url: row.storage_url,
        uploaded_at: parse_ts(&row.uploaded_at),
    })
}

pub fn insert_document(conn: &Connection, doc: &ClinicalDocument) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO documents (id, patient_id, title, category, content, storage_url, uploaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            doc.id.to_string(),
            doc.patient_id.to_string(),
            doc.title,
            doc.category,
            doc.content,
            doc.storage_url,
            format_ts(doc.uploaded_at),
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Option<ClinicalDocument>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"
    ))?;

    let result = stmt.query_row(params![id.to_string()], read_document_row);

    match result {
        Ok(row) => Ok(Some(document_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All documents for one patient, newest first.
pub fn list_documents(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<ClinicalDocument>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents
         WHERE patient_id = ?1 ORDER BY uploaded_at DESC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], |row| read_document_row(row))?;

    let mut documents = Vec::new();
    for row in rows {
        documents.push(document_from_row(row?)?);
    }
    Ok(documents)
}

/// The most recent `limit` documents, newest first.
pub fn recent_documents(
    conn: &Connection,
    patient_id: &Uuid,
    limit: usize,
) -> Result<Vec<ClinicalDocument>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents
         WHERE patient_id = ?1 ORDER BY uploaded_at DESC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(
        params![patient_id.to_string(), limit as i64],
        read_document_row,
    )?;

    let mut documents = Vec::new();
    for row in rows {
        documents.push(document_from_row(row?)?);
    }
    Ok(documents)
}

// ═══════════════════════════════════════════
// Access Grant Repository
// ═══════════════════════════════════════════

struct GrantRow {
    token: String,
    patient_id: String,
    created_at: String,
    expires_at: String,
    allow_download: i32,
    allow_chat: i32,
    allow_notebook: i32,
    access_count: i64,
}

fn read_grant_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GrantRow> {
    Ok(GrantRow {
        token: row.get(0)?,
        patient_id: row.get(1)?,
        created_at: row.get(2)?,
        expires_at: row.get(3)?,
        allow_download: row.get(4)?,
        allow_chat: row.get(5)?,
        allow_notebook: row.get(6)?,
        access_count: row.get(7)?,
    })
}

fn grant_from_row(row: GrantRow) -> Result<AccessGrant, DatabaseError> {
    Ok(AccessGrant {
        token: row.token,
        patient_id: parse_uuid(&row.patient_id)?,
        created_at: parse_ts(&row.created_at),
        expires_at: parse_ts(&row.expires_at),
        permissions: GrantPermissions {
            allow_download: row.allow_download != 0,
            allow_chat: row.allow_chat != 0,
            allow_notebook: row.allow_notebook != 0,
        },
        access_count: row.access_count as u32,
    })
}

const GRANT_COLUMNS: &str = "token, patient_id, created_at, expires_at,
     allow_download, allow_chat, allow_notebook, access_count";

pub fn insert_grant(conn: &Connection, grant: &AccessGrant) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO access_grants (token, patient_id, created_at, expires_at,
         allow_download, allow_chat, allow_notebook, access_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            grant.token,
            grant.patient_id.to_string(),
            format_ts(grant.created_at),
            format_ts(grant.expires_at),
            grant.permissions.allow_download as i32,
            grant.permissions.allow_chat as i32,
            grant.permissions.allow_notebook as i32,
            grant.access_count,
        ],
    )?;
    Ok(())
}

pub fn get_grant(conn: &Connection, token: &str) -> Result<Option<AccessGrant>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GRANT_COLUMNS} FROM access_grants WHERE token = ?1"
    ))?;

    let result = stmt.query_row(params![token], read_grant_row);

    match result {
        Ok(row) => Ok(Some(grant_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_grants(conn: &Connection, patient_id: &Uuid) -> Result<Vec<AccessGrant>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GRANT_COLUMNS} FROM access_grants
         WHERE patient_id = ?1 ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], read_grant_row)?;

    let mut grants = Vec::new();
    for row in rows {
        grants.push(grant_from_row(row?)?);
    }
    Ok(grants)
}

/// Delete a grant iff it belongs to the given patient. Returns whether
/// a row was removed. Irreversible.
pub fn delete_grant(
    conn: &Connection,
    patient_id: &Uuid,
    token: &str,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "DELETE FROM access_grants WHERE token = ?1 AND patient_id = ?2",
        params![token, patient_id.to_string()],
    )?;
    Ok(rows > 0)
}

/// Increment the access counter in place. The relative-update form keeps
/// concurrent validations from losing increments. Returns the new count.
pub fn increment_grant_access(conn: &Connection, token: &str) -> Result<u32, DatabaseError> {
    conn.execute(
        "UPDATE access_grants SET access_count = access_count + 1 WHERE token = ?1",
        params![token],
    )?;
    let count: i64 = conn.query_row(
        "SELECT access_count FROM access_grants WHERE token = ?1",
        params![token],
        |row| row.get(0),
    )?;
    Ok(count as u32)
}

pub fn append_grant_detail(
    conn: &Connection,
    token: &str,
    action: GrantAction,
    detail: Option<&str>,
    accessed_at: NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO grant_access_details (token, action, detail, accessed_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![token, action.as_str(), detail, format_ts(accessed_at)],
    )?;
    Ok(())
}

pub fn count_grant_details(conn: &Connection, token: &str) -> Result<u32, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM grant_access_details WHERE token = ?1",
        params![token],
        |row| row.get(0),
    )?;
    Ok(count as u32)
}

// ═══════════════════════════════════════════
// Access Audit Repository
// ═══════════════════════════════════════════

#[allow(clippy::too_many_arguments)]
pub fn append_audit(
    conn: &Connection,
    actor_id: &Uuid,
    patient_id: &Uuid,
    clinic_id: Option<&Uuid>,
    access_type: AuditAccessType,
    auditable_for_patient: bool,
    detail: Option<&str>,
    created_at: NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO access_audit (actor_id, patient_id, clinic_id, access_type,
         auditable_for_patient, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            actor_id.to_string(),
            patient_id.to_string(),
            clinic_id.map(|id| id.to_string()),
            access_type.as_str(),
            auditable_for_patient as i32,
            detail,
            format_ts(created_at),
        ],
    )?;
    Ok(())
}

/// Accesses visible to the patient ("who accessed my data"): only rows
/// flagged auditable, newest first.
pub fn list_patient_accesses(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<AccessAuditEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, actor_id, patient_id, clinic_id, access_type,
                auditable_for_patient, detail, created_at
         FROM access_audit
         WHERE patient_id = ?1 AND auditable_for_patient = 1
         ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, i32>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, actor, patient, clinic, access_type, auditable, detail, created_at) = row?;
        entries.push(AccessAuditEntry {
            id,
            actor_id: parse_uuid(&actor)?,
            patient_id: parse_uuid(&patient)?,
            clinic_id: clinic.map(|c| parse_uuid(&c)).transpose()?,
            access_type: AuditAccessType::from_str(&access_type)?,
            auditable_for_patient: auditable != 0,
            detail,
            created_at: parse_ts(&created_at),
        });
    }
    Ok(entries)
}

// ═══════════════════════════════════════════
// Conversation Repository
// ═══════════════════════════════════════════

pub fn insert_conversation(conn: &Connection, conv: &Conversation) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO conversations (id, owner_id, title, started_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            conv.id.to_string(),
            conv.owner_id.to_string(),
            conv.title,
            format_ts(conv.started_at),
            format_ts(conv.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_conversation(conn: &Connection, id: &Uuid) -> Result<Option<Conversation>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, title, started_at, updated_at FROM conversations WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    });

    match result {
        Ok((id, owner, title, started_at, updated_at)) => Ok(Some(Conversation {
            id: parse_uuid(&id)?,
            owner_id: parse_uuid(&owner)?,
            title,
            started_at: parse_ts(&started_at),
            updated_at: parse_ts(&updated_at),
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Delete a conversation and its messages (CASCADE). Returns whether a
/// row was removed.
pub fn delete_conversation(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "DELETE FROM conversations WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(rows > 0)
}

pub fn update_conversation_title(
    conn: &Connection,
    id: &Uuid,
    title: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE conversations SET title = ?1 WHERE id = ?2",
        params![title, id.to_string()],
    )?;
    Ok(())
}

pub fn touch_conversation(
    conn: &Connection,
    id: &Uuid,
    at: NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
        params![format_ts(at), id.to_string()],
    )?;
    Ok(())
}

pub fn insert_message(conn: &Connection, msg: &ChatMessage) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO messages (id, conversation_id, role, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            msg.id.to_string(),
            msg.conversation_id.to_string(),
            msg.role.as_str(),
            msg.content,
            format_ts(msg.created_at),
        ],
    )?;
    Ok(())
}

/// Remove a single message (rollback of a failed exchange).
pub fn delete_message(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM messages WHERE id = ?1", params![id.to_string()])?;
    Ok(())
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn finish_message(
    parts: (String, String, String, String, String),
) -> Result<ChatMessage, DatabaseError> {
    let (id, conversation_id, role, content, created_at) = parts;
    Ok(ChatMessage {
        id: parse_uuid(&id)?,
        conversation_id: parse_uuid(&conversation_id)?,
        role: MessageRole::from_str(&role)?,
        content,
        created_at: parse_ts(&created_at),
    })
}

/// All messages in a conversation, oldest first.
pub fn get_messages(
    conn: &Connection,
    conversation_id: &Uuid,
) -> Result<Vec<ChatMessage>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, role, content, created_at FROM messages
         WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![conversation_id.to_string()], message_from_row)?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(finish_message(row?)?);
    }
    Ok(messages)
}

/// The last `limit` messages, returned in chronological order.
pub fn recent_messages(
    conn: &Connection,
    conversation_id: &Uuid,
    limit: usize,
) -> Result<Vec<ChatMessage>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, role, content, created_at FROM (
             SELECT id, conversation_id, role, content, created_at, rowid AS rid
             FROM messages WHERE conversation_id = ?1
             ORDER BY created_at DESC, rid DESC LIMIT ?2
         ) ORDER BY created_at ASC, rid ASC",
    )?;
    let rows = stmt.query_map(
        params![conversation_id.to_string(), limit as i64],
        message_from_row,
    )?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(finish_message(row?)?);
    }
    Ok(messages)
}

pub fn count_messages(conn: &Connection, conversation_id: &Uuid) -> Result<u32, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
        params![conversation_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count as u32)
}

// ═══════════════════════════════════════════
// Professional Patient Context Repository
// ═══════════════════════════════════════════

/// Overwrite the professional's single context row wholesale.
pub fn upsert_professional_context(
    conn: &Connection,
    ctx: &ProfessionalPatientContext,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO professional_patient_context
         (professional_id, patient_id, clinic_id, updated_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            ctx.professional_id.to_string(),
            ctx.patient_id.to_string(),
            ctx.clinic_id.map(|id| id.to_string()),
            format_ts(ctx.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_professional_context(
    conn: &Connection,
    professional_id: &Uuid,
) -> Result<Option<ProfessionalPatientContext>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT professional_id, patient_id, clinic_id, updated_at
         FROM professional_patient_context WHERE professional_id = ?1",
    )?;

    let result = stmt.query_row(params![professional_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
        ))
    });

    match result {
        Ok((professional, patient, clinic, updated_at)) => Ok(Some(ProfessionalPatientContext {
            professional_id: parse_uuid(&professional)?,
            patient_id: parse_uuid(&patient)?,
            clinic_id: clinic.map(|c| parse_uuid(&c)).transpose()?,
            updated_at: parse_ts(&updated_at),
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ═══════════════════════════════════════════
// Session Repository (rows written by the auth provider)
// ═══════════════════════════════════════════

pub struct SessionRow {
    pub user_id: Uuid,
    pub role: UserRole,
    pub expires_at: NaiveDateTime,
}

pub fn insert_session(
    conn: &Connection,
    token_hash: &str,
    user_id: &Uuid,
    role: UserRole,
    expires_at: NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO sessions (token_hash, user_id, role, expires_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            token_hash,
            user_id.to_string(),
            role.as_str(),
            format_ts(expires_at)
        ],
    )?;
    Ok(())
}

pub fn get_session(conn: &Connection, token_hash: &str) -> Result<Option<SessionRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT user_id, role, expires_at FROM sessions WHERE token_hash = ?1",
    )?;

    let result = stmt.query_row(params![token_hash], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    });

    match result {
        Ok((user_id, role, expires_at)) => Ok(Some(SessionRow {
            user_id: parse_uuid(&user_id)?,
            role: UserRole::from_str(&role)?,
            expires_at: parse_ts(&expires_at),
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
