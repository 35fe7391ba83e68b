use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(UserRole {
    Patient => "patient",
    Professional => "professional",
    ClinicAdmin => "clinic_admin",
});

str_enum!(MessageRole {
    User => "user",
    Assistant => "assistant",
});

str_enum!(ClinicMemberRole {
    Patient => "patient",
    Professional => "professional",
    Admin => "admin",
});

// National identity document types. Closed set; anything else is
// rejected at the edge before touching the registry or the database.
str_enum!(DocumentIdType {
    Cc => "CC",
    Ti => "TI",
    Ce => "CE",
    Pa => "PA",
    Rc => "RC",
    Nu => "NU",
    Cd => "CD",
    Cn => "CN",
    Sc => "SC",
    Pe => "PE",
    Pt => "PT",
});

str_enum!(AuditAccessType {
    ClinicLocal => "clinic_local",
    GlobalOrExternal => "global_or_external",
});

/// Action a guest performs against an access grant.
str_enum!(GrantAction {
    View => "view",
    DownloadDocument => "download_document",
    ChatMessage => "chat_message",
    Notebook => "notebook",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn document_id_type_roundtrip() {
        for s in ["CC", "TI", "CE", "PA", "RC", "NU", "CD", "CN", "SC", "PE", "PT"] {
            let parsed = DocumentIdType::from_str(s).unwrap();
            assert_eq!(parsed.as_str(), s);
        }
    }

    #[test]
    fn unknown_document_id_type_rejected() {
        let err = DocumentIdType::from_str("XX").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn lowercase_document_id_type_rejected() {
        assert!(DocumentIdType::from_str("cc").is_err());
    }

    #[test]
    fn grant_action_strings() {
        assert_eq!(GrantAction::View.as_str(), "view");
        assert_eq!(GrantAction::DownloadDocument.as_str(), "download_document");
        assert_eq!(GrantAction::ChatMessage.as_str(), "chat_message");
    }

    #[test]
    fn audit_access_type_roundtrip() {
        assert_eq!(
            AuditAccessType::from_str("clinic_local").unwrap(),
            AuditAccessType::ClinicLocal
        );
        assert_eq!(
            AuditAccessType::from_str("global_or_external").unwrap(),
            AuditAccessType::GlobalOrExternal
        );
    }
}
