//! HTTP clients for the two national registries, plus a scripted mock
//! for tests and offline development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use serde_json::Value;

use super::{payload::RegistryIdentity, RegistryError};
use crate::models::enums::DocumentIdType;

/// Identity registry handle. Enum dispatch keeps the resolver free of
/// generic plumbing while tests swap in scripted responses.
pub enum IdentityRegistry {
    Http(HttpIdentityRegistry),
    Mock(MockIdentityRegistry),
}

impl IdentityRegistry {
    /// Resolve a typed identity (document type + number). `Ok(None)`
    /// means the registry answered and knows no such person.
    pub async fn lookup(
        &self,
        document_type: DocumentIdType,
        document_number: &str,
    ) -> Result<Option<RegistryIdentity>, RegistryError> {
        match self {
            Self::Http(client) => client.lookup(document_type, document_number).await,
            Self::Mock(mock) => mock.lookup(document_type, document_number),
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Client for the national identity registry.
pub struct HttpIdentityRegistry {
    base_url: String,
    client: reqwest::Client,
}

impl HttpIdentityRegistry {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn lookup(
        &self,
        document_type: DocumentIdType,
        document_number: &str,
    ) -> Result<Option<RegistryIdentity>, RegistryError> {
        let url = format!(
            "{}/lookup/{}/{}",
            self.base_url,
            document_type.as_str(),
            document_number
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_connect() {
                RegistryError::Connection(self.base_url.clone())
            } else {
                RegistryError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| RegistryError::Malformed(e.to_string()))?;

        Ok(RegistryIdentity::from_value(value))
    }
}

/// Client for the clinical registry. Enrichment only: the raw payload is
/// attached to an existing profile, never used to create one.
pub struct ClinicalRegistry {
    base_url: String,
    client: reqwest::Client,
}

impl ClinicalRegistry {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub async fn fetch(
        &self,
        document_type: DocumentIdType,
        document_number: &str,
    ) -> Result<Option<Value>, RegistryError> {
        let url = format!(
            "{}/affiliation/{}/{}",
            self.base_url,
            document_type.as_str(),
            document_number
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RegistryError::Connection(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| RegistryError::Malformed(e.to_string()))?;
        Ok(Some(value))
    }
}

// ---------------------------------------------------------------------------
// Mock
// ---------------------------------------------------------------------------

/// Scripted identity registry for tests. Records every lookup so tests
/// can assert the registry was (or was not) consulted.
#[derive(Default)]
pub struct MockIdentityRegistry {
    identities: Mutex<HashMap<(String, String), Value>>,
    fail_connection: bool,
    calls: AtomicU32,
}

impl MockIdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose every lookup fails with a connection error.
    pub fn unreachable() -> Self {
        Self {
            fail_connection: true,
            ..Self::default()
        }
    }

    /// Script an identity for a document type + number.
    pub fn with_identity(
        self,
        document_type: DocumentIdType,
        document_number: &str,
        payload: Value,
    ) -> Self {
        self.identities.lock().unwrap().insert(
            (document_type.as_str().to_string(), document_number.to_string()),
            payload,
        );
        self
    }

    /// How many lookups have been issued.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn lookup(
        &self,
        document_type: DocumentIdType,
        document_number: &str,
    ) -> Result<Option<RegistryIdentity>, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connection {
            return Err(RegistryError::Connection("mock".to_string()));
        }
        let identities = self.identities.lock().unwrap();
        let value = identities
            .get(&(
                document_type.as_str().to_string(),
                document_number.to_string(),
            ))
            .cloned();
        Ok(value.and_then(RegistryIdentity::from_value))
    }
}
