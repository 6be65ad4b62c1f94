use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HubError;

/// Upstream catalog identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Dramabox,
    Netshort,
    Melolo,
}

impl SourceId {
    pub const ALL: [SourceId; 3] = [SourceId::Dramabox, SourceId::Netshort, SourceId::Melolo];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Dramabox => "dramabox",
            SourceId::Netshort => "netshort",
            SourceId::Melolo => "melolo",
        }
    }
}

impl FromStr for SourceId {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dramabox" => Ok(SourceId::Dramabox),
            "netshort" => Ok(SourceId::Netshort),
            "melolo" => Ok(SourceId::Melolo),
            other => Err(HubError::Validation(format!("unknown source: {}", other))),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-source failure flags (`true` = the source failed)
pub type SourceFailures = BTreeMap<SourceId, bool>;

/// A catalog entry normalized from any source
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    #[serde(rename = "source")]
    pub source_id: SourceId,
    #[serde(rename = "id")]
    pub external_id: String,
    pub title: String,
    pub cover: Option<String>,
    pub tags: Vec<String>,
    #[serde(rename = "episodes", skip_serializing_if = "Option::is_none")]
    pub episode_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vip: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_count: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_hot: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_gate: Option<Value>,
}

impl ContentItem {
    pub fn new(source_id: SourceId, external_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_id,
            external_id: external_id.into(),
            title: title.into(),
            cover: None,
            tags: Vec::new(),
            episode_count: None,
            vip: None,
            description: None,
            author: None,
            play_count: None,
            is_new: None,
            is_hot: None,
            status: None,
            age_gate: None,
        }
    }

    /// Identity key used for deduplication
    pub fn identity(&self) -> (SourceId, &str) {
        (self.source_id, self.external_id.as_str())
    }
}

/// One titled group of items in a listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub items: Vec<ContentItem>,
}

/// Merged listing across all sources
#[derive(Debug, Clone, Default)]
pub struct AggregationResult {
    pub sections: Vec<Section>,
    pub source_failed: SourceFailures,
}

/// Listing response envelope
#[derive(Debug, Clone, Serialize)]
pub struct ListingResponse {
    pub sections: Vec<Section>,
}

impl From<AggregationResult> for ListingResponse {
    fn from(result: AggregationResult) -> Self {
        Self {
            sections: result.sections,
        }
    }
}

/// Search response envelope
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub query: String,
    pub total: usize,
    pub results: Vec<ContentItem>,
    pub source_failed: SourceFailures,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_parsing() {
        assert_eq!("DramaBox".parse::<SourceId>().unwrap(), SourceId::Dramabox);
        assert_eq!(" melolo ".parse::<SourceId>().unwrap(), SourceId::Melolo);
        assert!(matches!("unknown".parse::<SourceId>(), Err(HubError::Validation(_))));
        assert_eq!(SourceId::Netshort.to_string(), "netshort");
    }

    #[test]
    fn test_content_item_serialization_skips_empty_optionals() {
        let mut item = ContentItem::new(SourceId::Dramabox, "41000102", "Cinta Kedua");
        item.episode_count = Some(80);
        item.tags = vec!["Romance".to_string()];

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["source"], "dramabox");
        assert_eq!(value["id"], "41000102");
        assert_eq!(value["episodes"], 80);
        assert!(value["cover"].is_null());
        assert!(value.get("vip").is_none());
        assert!(value.get("playCount").is_none());
    }

    #[test]
    fn test_source_failures_serialize_by_name() {
        let mut failed = SourceFailures::new();
        failed.insert(SourceId::Netshort, true);
        failed.insert(SourceId::Dramabox, false);

        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value, serde_json::json!({"dramabox": false, "netshort": true}));
    }
}
