//! Bulk roster upload for clinic administrators.
//!
//! Line-oriented records, whitespace/comma delimited:
//!   patients:       `DOC_TYPE DOC_NUMBER [FULL_NAME...]`
//!   professionals:  `DOC_TYPE DOC_NUMBER EMAIL [FULL_NAME...]`
//!
//! Rows are processed strictly sequentially with a fixed inter-row
//! delay so each outcome can render live. One row's failure never
//! aborts the rest; the result always has exactly one entry per input
//! row plus a success/failure summary.

use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::NaiveDateTime;
use regex::Regex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db;
use crate::models::enums::{ClinicMemberRole, DocumentIdType, UserRole};
use crate::models::{ClinicMember, PatientProfile, User};

/// Pause between rows so the admin UI can render each outcome live.
pub const INTER_ROW_DELAY: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RosterKind {
    Patients,
    Professionals,
}

/// One parsed roster record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterRecord {
    Patient {
        document_type: DocumentIdType,
        document_number: String,
        full_name: Option<String>,
    },
    Professional {
        document_type: DocumentIdType,
        document_number: String,
        email: String,
        full_name: Option<String>,
    },
}

/// Outcome of one row.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    Success { user_id: Uuid, created: bool },
    Error { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RowResult {
    pub line: usize,
    pub input: String,
    pub outcome: RowOutcome,
}

/// Full batch result with the summary counts the UI always shows.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub results: Vec<RowResult>,
    pub succeeded: usize,
    pub failed: usize,
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"))
}

/// Parse one roster line. Commas and whitespace both delimit; anything
/// after the fixed fields is the person's full name.
pub fn parse_row(kind: RosterKind, line: &str) -> Result<RosterRecord, String> {
    let normalized = line.replace(',', " ");
    let mut fields = normalized.split_whitespace();

    let doc_type_field = fields.next().ok_or_else(|| "empty row".to_string())?;
    let document_type = DocumentIdType::from_str(&doc_type_field.to_uppercase())
        .map_err(|_| format!("unsupported document type '{doc_type_field}'"))?;

    let document_number = fields
        .next()
        .ok_or_else(|| "missing document number".to_string())?
        .to_string();
    if !document_number.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("invalid document number '{document_number}'"));
    }

    match kind {
        RosterKind::Patients => {
            let rest: Vec<&str> = fields.collect();
            Ok(RosterRecord::Patient {
                document_type,
                document_number,
                full_name: if rest.is_empty() {
                    None
                } else {
                    Some(rest.join(" "))
                },
            })
        }
        RosterKind::Professionals => {
            let email = fields
                .next()
                .ok_or_else(|| "missing email".to_string())?
                .to_string();
            if !email_regex().is_match(&email) {
                return Err(format!("invalid email '{email}'"));
            }
            let rest: Vec<&str> = fields.collect();
            Ok(RosterRecord::Professional {
                document_type,
                document_number,
                email,
                full_name: if rest.is_empty() {
                    None
                } else {
                    Some(rest.join(" "))
                },
            })
        }
    }
}

/// Process a whole roster text sequentially. `delay` is `INTER_ROW_DELAY`
/// in production and zero in tests.
pub async fn process_roster(
    conn: &mut Connection,
    clinic_id: Uuid,
    kind: RosterKind,
    text: &str,
    delay: Duration,
    now: NaiveDateTime,
) -> BatchSummary {
    let mut results = Vec::new();

    let rows: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .collect();

    for (index, (line_number, line)) in rows.iter().enumerate() {
        let outcome = match parse_row(kind, line) {
            Ok(record) => apply_record(conn, clinic_id, record, now)
                .unwrap_or_else(|reason| RowOutcome::Error { reason }),
            Err(reason) => RowOutcome::Error { reason },
        };

        if matches!(outcome, RowOutcome::Error { .. }) {
            tracing::debug!(line = line_number, "Roster row rejected");
        }
        results.push(RowResult {
            line: *line_number,
            input: (*line).to_string(),
            outcome,
        });

        if !delay.is_zero() && index + 1 < rows.len() {
            tokio::time::sleep(delay).await;
        }
    }

    let succeeded = results
        .iter()
        .filter(|r| matches!(r.outcome, RowOutcome::Success { .. }))
        .count();
    let failed = results.len() - succeeded;
    BatchSummary {
        results,
        succeeded,
        failed,
    }
}

/// Create-or-link one record. An existing profile with the same natural
/// key is linked to the clinic instead of duplicated.
fn apply_record(
    conn: &Connection,
    clinic_id: Uuid,
    record: RosterRecord,
    now: NaiveDateTime,
) -> Result<RowOutcome, String> {
    match record {
        RosterRecord::Patient {
            document_type,
            document_number,
            full_name,
        } => {
            let existing = db::find_profile_by_document(conn, document_type, &document_number)
                .map_err(|e| e.to_string())?;

            let (user_id, created) = match existing {
                Some(profile) => (profile.user_id, false),
                None => {
                    let name = full_name.unwrap_or_else(|| document_number.clone());
                    let user = User {
                        id: Uuid::new_v4(),
                        role: UserRole::Patient,
                        email: None,
                        full_name: name.clone(),
                        created_at: now,
                    };
                    db::insert_user(conn, &user).map_err(|e| e.to_string())?;
                    db::insert_profile(
                        conn,
                        &PatientProfile {
                            user_id: user.id,
                            document_type,
                            document_number,
                            full_name: name,
                            age: None,
                            insurer_code: None,
                            phone: None,
                            registry_payload: None,
                            clinical_payload: None,
                            created_at: now,
                        },
                    )
                    .map_err(|e| e.to_string())?;
                    (user.id, true)
                }
            };

            db::ensure_clinic_member(
                conn,
                &ClinicMember {
                    clinic_id,
                    user_id,
                    member_role: ClinicMemberRole::Patient,
                    added_at: now,
                },
            )
            .map_err(|e| e.to_string())?;
            Ok(RowOutcome::Success { user_id, created })
        }
        RosterRecord::Professional {
            email, full_name, ..
        } => {
            let user = User {
                id: Uuid::new_v4(),
                role: UserRole::Professional,
                email: Some(email.clone()),
                full_name: full_name.unwrap_or(email),
                created_at: now,
            };
            db::insert_user(conn, &user).map_err(|e| e.to_string())?;
            db::ensure_clinic_member(
                conn,
                &ClinicMember {
                    clinic_id,
                    user_id: user.id,
                    member_role: ClinicMemberRole::Professional,
                    added_at: now,
                },
            )
            .map_err(|e| e.to_string())?;
            Ok(RowOutcome::Success {
                user_id: user.id,
                created: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::Clinic;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn seed_clinic(conn: &Connection) -> Uuid {
        let clinic = Clinic {
            id: Uuid::new_v4(),
            name: "Clinic One".into(),
            created_at: ts("2026-01-01 00:00:00"),
        };
        db::insert_clinic(conn, &clinic).unwrap();
        clinic.id
    }

    #[test]
    fn parse_patient_row_variants() {
        let record = parse_row(RosterKind::Patients, "CC 123456 Ana María Torres").unwrap();
        assert_eq!(
            record,
            RosterRecord::Patient {
                document_type: DocumentIdType::Cc,
                document_number: "123456".into(),
                full_name: Some("Ana María Torres".into()),
            }
        );

        // Comma-delimited and nameless rows parse too.
        let bare = parse_row(RosterKind::Patients, "TI,987").unwrap();
        assert_eq!(
            bare,
            RosterRecord::Patient {
                document_type: DocumentIdType::Ti,
                document_number: "987".into(),
                full_name: None,
            }
        );
    }

    #[test]
    fn parse_professional_requires_email() {
        let record =
            parse_row(RosterKind::Professionals, "CE 555 doc@clinic.example Dr. Rueda").unwrap();
        let RosterRecord::Professional { email, full_name, .. } = record else {
            panic!("expected professional record");
        };
        assert_eq!(email, "doc@clinic.example");
        assert_eq!(full_name.as_deref(), Some("Dr. Rueda"));

        assert!(parse_row(RosterKind::Professionals, "CE 555").is_err());
        assert!(parse_row(RosterKind::Professionals, "CE 555 not-an-email").is_err());
    }

    #[test]
    fn unsupported_document_type_rejected_per_row() {
        let err = parse_row(RosterKind::Patients, "XX 123").unwrap_err();
        assert!(err.contains("unsupported document type"));
    }

    #[tokio::test]
    async fn bad_row_does_not_abort_batch() {
        let mut conn = open_memory_database().unwrap();
        let clinic = seed_clinic(&conn);

        let text = "CC 111 Ana Torres\nXX 222 Broken Row\nTI 333 Luis Mora\n";
        let summary = process_roster(
            &mut conn,
            clinic,
            RosterKind::Patients,
            text,
            Duration::ZERO,
            ts("2026-03-01 12:00:00"),
        )
        .await;

        assert_eq!(summary.results.len(), 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(matches!(summary.results[0].outcome, RowOutcome::Success { .. }));
        assert!(matches!(summary.results[1].outcome, RowOutcome::Error { .. }));
        assert!(matches!(summary.results[2].outcome, RowOutcome::Success { .. }));

        // Both valid patients exist and are linked to the clinic.
        assert!(db::find_profile_by_document(&conn, DocumentIdType::Cc, "111")
            .unwrap()
            .is_some());
        assert!(db::find_profile_by_document(&conn, DocumentIdType::Ti, "333")
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn existing_patient_linked_not_duplicated() {
        let mut conn = open_memory_database().unwrap();
        let clinic = seed_clinic(&conn);
        let now = ts("2026-03-01 12:00:00");

        let first = process_roster(
            &mut conn,
            clinic,
            RosterKind::Patients,
            "CC 111 Ana Torres",
            Duration::ZERO,
            now,
        )
        .await;
        let RowOutcome::Success { user_id, created } = &first.results[0].outcome else {
            panic!("expected success");
        };
        assert!(*created);
        let user_id = *user_id;

        // Second upload of the same person: linked, not recreated.
        let second = process_roster(
            &mut conn,
            clinic,
            RosterKind::Patients,
            "CC 111 Ana Torres",
            Duration::ZERO,
            now,
        )
        .await;
        let RowOutcome::Success {
            user_id: again,
            created,
        } = &second.results[0].outcome
        else {
            panic!("expected success");
        };
        assert!(!*created);
        assert_eq!(*again, user_id);
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let mut conn = open_memory_database().unwrap();
        let clinic = seed_clinic(&conn);

        let summary = process_roster(
            &mut conn,
            clinic,
            RosterKind::Patients,
            "\nCC 111\n\n   \nTI 222\n",
            Duration::ZERO,
            ts("2026-03-01 12:00:00"),
        )
        .await;
        assert_eq!(summary.results.len(), 2);
        // Line numbers refer to the original text.
        assert_eq!(summary.results[0].line, 2);
        assert_eq!(summary.results[1].line, 5);
    }

    #[tokio::test]
    async fn professionals_created_with_clinic_membership() {
        let mut conn = open_memory_database().unwrap();
        let clinic = seed_clinic(&conn);

        let summary = process_roster(
            &conn,
            clinic,
            RosterKind::Professionals,
            "CC 900 dr@clinic.example Dr. Rueda",
            Duration::ZERO,
            ts("2026-03-01 12:00:00"),
        )
        .await;
        assert_eq!(summary.succeeded, 1);
        let RowOutcome::Success { user_id, .. } = &summary.results[0].outcome else {
            panic!("expected success");
        };
        let clinics = db::clinics_for_user(&conn, user_id).unwrap();
        assert_eq!(clinics, vec![clinic]);
    }
}
