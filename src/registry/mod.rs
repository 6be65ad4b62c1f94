//! Proxy registry access
//!
//! The registry is a remote key-value store (REST + JSON) holding the latest
//! health record for every probed proxy.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::config::RegistryConfig;
use crate::error::{HubError, Result};
use crate::models::ProxyRecord;

/// Read/write access to the proxy registry
#[async_trait]
pub trait ProxyRegistry: Send + Sync {
    /// Fetch every record in the collection
    async fn list(&self) -> Result<Vec<ProxyRecord>>;

    /// Create or overwrite one record
    async fn upsert(&self, key: &str, record: &ProxyRecord) -> Result<()>;
}

/// Registry over the `<base>/<collection>.json` REST convention
#[derive(Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    auth_token: Option<String>,
}

impl HttpRegistry {
    pub fn new(base_url: &str, collection: &str, auth_token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| HubError::Internal(format!("failed to build registry client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.trim_matches('/').to_string(),
            auth_token,
        })
    }

    /// Build from configuration; `None` when no registry is configured
    pub fn from_config(config: &RegistryConfig) -> Result<Option<Self>> {
        config
            .base_url
            .as_deref()
            .map(|base| Self::new(base, &config.collection, config.auth_token.clone()))
            .transpose()
    }

    fn endpoint(&self, key: Option<&str>) -> Result<Url> {
        let raw = match key {
            Some(key) => format!("{}/{}/{}.json", self.base_url, self.collection, key),
            None => format!("{}/{}.json", self.base_url, self.collection),
        };

        let mut url = Url::parse(&raw)?;
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }
}

#[async_trait]
impl ProxyRegistry for HttpRegistry {
    #[instrument(skip(self), fields(collection = %self.collection))]
    async fn list(&self) -> Result<Vec<ProxyRecord>> {
        let url = self.endpoint(None)?;

        let listing: Value = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| HubError::RegistryUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| HubError::RegistryUnavailable(format!("invalid body: {}", e)))?;

        parse_listing(listing)
    }

    #[instrument(skip(self, record), fields(alive = record.alive))]
    async fn upsert(&self, key: &str, record: &ProxyRecord) -> Result<()> {
        let url = self.endpoint(Some(key))?;

        self.client
            .put(url)
            .json(record)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| HubError::RegistryUnavailable(e.to_string()))?;

        Ok(())
    }
}

/// Decode a collection listing, skipping records that do not parse
fn parse_listing(listing: Value) -> Result<Vec<ProxyRecord>> {
    let entries = match listing {
        Value::Null => return Ok(Vec::new()),
        Value::Object(entries) => entries,
        other => {
            return Err(HubError::RegistryUnavailable(format!(
                "expected an object listing, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut records = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        match serde_json::from_value::<ProxyRecord>(value) {
            Ok(record) => records.push(record),
            Err(e) => debug!(key = %key, error = %e, "Skipping malformed registry record"),
        }
    }

    Ok(records)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Stand-in used when no registry is configured
pub struct DisabledRegistry;

#[async_trait]
impl ProxyRegistry for DisabledRegistry {
    async fn list(&self) -> Result<Vec<ProxyRecord>> {
        Err(HubError::RegistryUnavailable(
            "no registry configured".to_string(),
        ))
    }

    async fn upsert(&self, _key: &str, _record: &ProxyRecord) -> Result<()> {
        Err(HubError::RegistryUnavailable(
            "no registry configured".to_string(),
        ))
    }
}
