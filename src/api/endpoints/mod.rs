pub mod bulk;
pub mod chat;
pub mod documents;
pub mod grants;
pub mod guest;
pub mod health;
pub mod profiles;
pub mod resolver;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use chrono::NaiveDateTime;
use futures_util::TryStreamExt;
use serde::Serialize;

use crate::assistant::DeltaByteStream;
use crate::models::{ClinicalDocument, PatientProfile};

/// Patient profile as shown to callers (registry blobs omitted).
/// Document type travels as its wire code ("CC", "TI", ...).
#[derive(Debug, Serialize)]
pub struct PatientView {
    pub user_id: String,
    pub document_type: &'static str,
    pub document_number: String,
    pub full_name: String,
    pub age: Option<u32>,
    pub insurer_code: Option<String>,
    pub phone: Option<String>,
}

impl From<&PatientProfile> for PatientView {
    fn from(profile: &PatientProfile) -> Self {
        Self {
            user_id: profile.user_id.to_string(),
            document_type: profile.document_type.as_str(),
            document_number: profile.document_number.clone(),
            full_name: profile.full_name.clone(),
            age: profile.age,
            insurer_code: profile.insurer_code.clone(),
            phone: profile.phone.clone(),
        }
    }
}

/// Document list entry (extracted text omitted).
#[derive(Debug, Serialize)]
pub struct DocumentView {
    pub id: String,
    pub title: String,
    pub category: Option<String>,
    pub storage_url: Option<String>,
    pub uploaded_at: NaiveDateTime,
}

impl From<&ClinicalDocument> for DocumentView {
    fn from(doc: &ClinicalDocument) -> Self {
        Self {
            id: doc.id.to_string(),
            title: doc.title.clone(),
            category: doc.category.clone(),
            storage_url: doc.storage_url.clone(),
            uploaded_at: doc.uploaded_at,
        }
    }
}

/// Wrap a delta stream as a `text/event-stream` response, passing the
/// gateway's bytes through untouched.
pub(crate) fn sse_response(
    stream: DeltaByteStream,
    conversation_id: Option<&str>,
) -> Response {
    let body = Body::from_stream(stream.map_err(axum::Error::new));

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-store");
    if let Some(id) = conversation_id {
        builder = builder.header("X-Conversation-Id", id);
    }
    builder.body(body).unwrap_or_else(|_| {
        Response::new(Body::from("data: [DONE]\n\n"))
    })
}
