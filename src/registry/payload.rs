//! Typed access to registry payloads.
//!
//! The identity registry returns an open-ended JSON blob. Instead of
//! dynamic string-path traversal, a partial schema is deserialized with
//! every field explicitly nullable, and the raw value is kept alongside
//! for storage and rendering.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Partial schema of the national identity registry response. The
/// registry speaks Spanish field names; aliases keep both spellings
/// readable. Any field may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryIdentity {
    #[serde(alias = "nombre")]
    pub first_name: Option<String>,
    #[serde(alias = "s_nombre")]
    pub middle_name: Option<String>,
    #[serde(alias = "apellido")]
    pub first_surname: Option<String>,
    #[serde(alias = "s_apellido")]
    pub second_surname: Option<String>,
    #[serde(alias = "nombre_completo")]
    pub full_name: Option<String>,
    #[serde(alias = "fecha_nacimiento")]
    pub birth_date: Option<NaiveDate>,
    #[serde(alias = "codigo_eps")]
    pub insurer_code: Option<String>,
    #[serde(skip)]
    pub raw: Value,
}

impl RegistryIdentity {
    /// Parse a raw registry value, keeping the original alongside the
    /// typed fields. Returns `None` when the value is not an object or
    /// carries no usable name at all (the registries signal "no match"
    /// with empty objects as often as with errors).
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let mut identity: RegistryIdentity =
            serde_json::from_value(value.clone()).unwrap_or_default();
        identity.raw = value;
        if identity.display_name().is_none() {
            return None;
        }
        Some(identity)
    }

    /// Assembled display name: the registry's own full name when present,
    /// else the non-empty name parts joined in order.
    pub fn display_name(&self) -> Option<String> {
        if let Some(full) = self.full_name.as_deref() {
            let full = full.trim();
            if !full.is_empty() {
                return Some(full.to_string());
            }
        }
        let parts: Vec<&str> = [
            self.first_name.as_deref(),
            self.middle_name.as_deref(),
            self.first_surname.as_deref(),
            self.second_surname.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// Age in whole years at the given date, when a birth date is known.
    pub fn age_at(&self, today: NaiveDate) -> Option<u32> {
        self.birth_date.and_then(|born| today.years_since(born))
    }
}

// ---------------------------------------------------------------------------
// Tagged-variant payload walker
// ---------------------------------------------------------------------------

/// Structural rendering of an untrusted registry payload for the
/// record-viewer. A tagged-variant walk instead of raw JSON so the
/// client renders by node kind, and a depth guard so that deeply nested
/// (or hostile) payloads cannot recurse unboundedly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadNode {
    Object { entries: Vec<(String, PayloadNode)> },
    Array { items: Vec<PayloadNode> },
    Text { value: String },
    Number { value: f64 },
    Bool { value: bool },
    Null,
    /// Subtree beyond the depth guard.
    Truncated,
}

/// Default depth guard for the record viewer.
pub const MAX_WALK_DEPTH: usize = 16;

/// Walk a JSON value into a `PayloadNode` tree, cutting off below
/// `max_depth` levels.
pub fn walk_payload(value: &Value, max_depth: usize) -> PayloadNode {
    if max_depth == 0 {
        return PayloadNode::Truncated;
    }
    match value {
        Value::Null => PayloadNode::Null,
        Value::Bool(b) => PayloadNode::Bool { value: *b },
        Value::Number(n) => PayloadNode::Number {
            value: n.as_f64().unwrap_or(0.0),
        },
        Value::String(s) => PayloadNode::Text { value: s.clone() },
        Value::Array(items) => PayloadNode::Array {
            items: items
                .iter()
                .map(|item| walk_payload(item, max_depth - 1))
                .collect(),
        },
        Value::Object(map) => PayloadNode::Object {
            entries: map
                .iter()
                .map(|(key, val)| (key.clone(), walk_payload(val, max_depth - 1)))
                .collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn spanish_field_names_map_to_typed_fields() {
        let identity = RegistryIdentity::from_value(json!({
            "nombre": "Ana",
            "s_nombre": "María",
            "apellido": "Torres",
            "s_apellido": "Vega",
            "codigo_eps": "EPS-01"
        }))
        .unwrap();

        assert_eq!(identity.first_name.as_deref(), Some("Ana"));
        assert_eq!(identity.second_surname.as_deref(), Some("Vega"));
        assert_eq!(identity.insurer_code.as_deref(), Some("EPS-01"));
        assert_eq!(identity.display_name().as_deref(), Some("Ana María Torres Vega"));
    }

    #[test]
    fn full_name_takes_precedence_over_parts() {
        let identity = RegistryIdentity::from_value(json!({
            "nombre_completo": "Ana Torres",
            "nombre": "IGNORED"
        }))
        .unwrap();
        assert_eq!(identity.display_name().as_deref(), Some("Ana Torres"));
    }

    #[test]
    fn nameless_payload_is_no_identity() {
        assert!(RegistryIdentity::from_value(json!({})).is_none());
        assert!(RegistryIdentity::from_value(json!({"codigo_eps": "X"})).is_none());
        assert!(RegistryIdentity::from_value(json!("just a string")).is_none());
        assert!(RegistryIdentity::from_value(json!(null)).is_none());
    }

    #[test]
    fn unknown_fields_are_preserved_in_raw() {
        let identity = RegistryIdentity::from_value(json!({
            "nombre": "Ana",
            "campo_desconocido": {"nested": [1, 2, 3]}
        }))
        .unwrap();
        assert!(identity.raw.get("campo_desconocido").is_some());
    }

    #[test]
    fn age_from_birth_date() {
        let identity = RegistryIdentity::from_value(json!({
            "nombre": "Ana",
            "fecha_nacimiento": "1985-06-15"
        }))
        .unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 6, 14).unwrap();
        assert_eq!(identity.age_at(today), Some(40));
        let birthday = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        assert_eq!(identity.age_at(birthday), Some(41));
    }

    #[test]
    fn walker_tags_every_variant() {
        let node = walk_payload(
            &json!({
                "name": "Ana",
                "age": 41,
                "active": true,
                "notes": null,
                "codes": ["A", "B"]
            }),
            MAX_WALK_DEPTH,
        );

        let PayloadNode::Object { entries } = node else {
            panic!("expected object root");
        };
        let get = |k: &str| entries.iter().find(|(key, _)| key == k).map(|(_, v)| v);
        assert_eq!(get("name"), Some(&PayloadNode::Text { value: "Ana".into() }));
        assert_eq!(get("age"), Some(&PayloadNode::Number { value: 41.0 }));
        assert_eq!(get("active"), Some(&PayloadNode::Bool { value: true }));
        assert_eq!(get("notes"), Some(&PayloadNode::Null));
        assert!(matches!(get("codes"), Some(PayloadNode::Array { .. })));
    }

    #[test]
    fn walker_truncates_beyond_depth_guard() {
        // Build a 20-deep nesting; guard at 3 must cut it off.
        let mut value = json!("leaf");
        for _ in 0..20 {
            value = json!({ "inner": value });
        }

        let node = walk_payload(&value, 3);
        let PayloadNode::Object { entries } = node else {
            panic!("expected object root");
        };
        let PayloadNode::Object { entries: inner } = &entries[0].1 else {
            panic!("expected nested object");
        };
        assert_eq!(inner[0].1, PayloadNode::Truncated);
    }
}
