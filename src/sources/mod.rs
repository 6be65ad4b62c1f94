//! Upstream catalog adapters
//!
//! Each adapter describes the requests for its upstream and normalizes the
//! raw JSON into the unified model. The aggregation pipeline performs the
//! actual fetching.

pub mod de;
pub mod dramabox;
pub mod melolo;
pub mod netshort;

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::config::SourcesConfig;
use crate::error::{HubError, Result};
use crate::models::{ContentItem, EpisodeList, Section, SourceId, StreamInfo};
use crate::proxy::browser_headers;

pub use dramabox::DramaboxSource;
pub use melolo::MeloloSource;
pub use netshort::NetshortSource;

/// A fully described upstream GET
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub headers: HeaderMap,
}

/// One listing endpoint of a source
#[derive(Debug, Clone)]
pub struct Feed {
    /// Stable key, used as section type and fallback section id
    pub key: &'static str,
    /// Fallback section title
    pub title: &'static str,
    pub request: UpstreamRequest,
}

/// Request building and normalization for one upstream catalog
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> SourceId;

    /// Whether requests should go through the proxy pool
    fn via_proxy(&self) -> bool;

    fn listing_feeds(&self) -> Result<Vec<Feed>>;

    fn normalize_listing(&self, feed: &Feed, raw: Value) -> Result<Vec<Section>>;

    fn search_request(&self, query: &str) -> Result<UpstreamRequest>;

    fn normalize_search(&self, raw: Value) -> Result<Vec<ContentItem>>;

    fn episodes_request(&self, id: &str) -> Result<UpstreamRequest>;

    /// `None` when the source answered but has no episodes for `id`
    fn normalize_episodes(&self, id: &str, raw: Value) -> Result<Option<EpisodeList>>;

    /// Request resolving a per-episode stream id; `None` if unsupported
    fn stream_request(&self, _vid: &str) -> Result<Option<UpstreamRequest>> {
        Ok(None)
    }

    fn normalize_stream(&self, _vid: &str, _raw: Value) -> Result<Option<StreamInfo>> {
        Ok(None)
    }
}

/// The configured adapters
#[derive(Clone)]
pub struct SourceSet {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceSet {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn from_config(config: &SourcesConfig) -> Result<Self> {
        let gated = |id: SourceId| config.proxy_gated.contains(&id);

        Ok(Self::new(vec![
            Arc::new(DramaboxSource::new(
                Url::parse(&config.dramabox_base_url)?,
                gated(SourceId::Dramabox),
            )),
            Arc::new(NetshortSource::new(
                Url::parse(&config.netshort_base_url)?,
                gated(SourceId::Netshort),
            )?),
            Arc::new(MeloloSource::new(
                Url::parse(&config.melolo_base_url)?,
                gated(SourceId::Melolo),
            )),
        ]))
    }

    pub fn get(&self, id: SourceId) -> Option<&Arc<dyn SourceAdapter>> {
        self.adapters.iter().find(|adapter| adapter.id() == id)
    }

    /// Adapters in the given order, skipping unknown and repeated ids
    pub fn ordered(&self, order: &[SourceId]) -> Vec<Arc<dyn SourceAdapter>> {
        let mut picked: Vec<Arc<dyn SourceAdapter>> = Vec::with_capacity(order.len());
        for id in order {
            if picked.iter().any(|adapter| adapter.id() == *id) {
                continue;
            }
            if let Some(adapter) = self.get(*id) {
                picked.push(adapter.clone());
            }
        }
        picked
    }
}

/// `base` with extra path segments and query pairs
pub(crate) fn endpoint(base: &Url, segments: &[&str], query: &[(&str, &str)]) -> Result<String> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| HubError::InvalidConfig(format!("{} cannot be used as a base URL", base)))?
        .pop_if_empty()
        .extend(segments);

    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url.into())
}

/// Browser headers asking for JSON
pub(crate) fn json_headers() -> HeaderMap {
    let mut headers = browser_headers();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

/// Browser headers for endpoints that sniff document navigations
pub(crate) fn document_headers() -> HeaderMap {
    let mut headers = browser_headers();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers
}

/// Typed view of a payload that must be a JSON object
pub(crate) fn decode_object<T: DeserializeOwned>(source: SourceId, raw: Value) -> Result<T> {
    if !raw.is_object() {
        return Err(HubError::SourceNormalization {
            source_id: source,
            reason: format!("expected an object, found {}", de::kind(&raw)),
        });
    }
    decode(source, raw)
}

/// One-based number for the item at `position`
pub(crate) fn ordinal(position: usize) -> u32 {
    u32::try_from(position).unwrap_or(u32::MAX).saturating_add(1)
}

/// Typed view of a payload that must be a JSON array
pub(crate) fn decode_array<T: DeserializeOwned>(source: SourceId, raw: Value) -> Result<Vec<T>> {
    match raw {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()),
        other => Err(HubError::SourceNormalization {
            source_id: source,
            reason: format!("expected an array, found {}", de::kind(&other)),
        }),
    }
}

fn decode<T: DeserializeOwned>(source: SourceId, raw: Value) -> Result<T> {
    serde_json::from_value(raw).map_err(|e| HubError::SourceNormalization {
        source_id: source,
        reason: e.to_string(),
    })
}
