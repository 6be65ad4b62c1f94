//! Multi-source aggregation
//!
//! Fans requests out to the configured sources, isolates per-source
//! failures, normalizes payloads and deduplicates by identity across the
//! whole response.

pub mod dedup;

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::SourceOrder;
use crate::error::{HubError, Result};
use crate::models::{
    AggregationResult, ContentItem, EpisodeList, SearchResult, Section, SourceFailures, StreamInfo,
    VideoSource,
};
use crate::proxy::ResilientFetcher;
use crate::sources::{Feed, SourceAdapter, SourceSet, UpstreamRequest};

pub use dedup::IdentitySet;

pub struct Aggregator {
    fetcher: Arc<ResilientFetcher>,
    sources: SourceSet,
    order: SourceOrder,
}

impl Aggregator {
    pub fn new(fetcher: Arc<ResilientFetcher>, sources: SourceSet, order: SourceOrder) -> Self {
        Self {
            fetcher,
            sources,
            order,
        }
    }

    /// Home listing: every feed of every source, fetched concurrently
    #[instrument(skip(self))]
    pub async fn listing(&self) -> AggregationResult {
        let adapters = self.sources.ordered(&self.order.listing);
        let mut result = AggregationResult::default();

        let mut jobs: Vec<(Arc<dyn SourceAdapter>, Feed)> = Vec::new();
        for adapter in &adapters {
            result.source_failed.insert(adapter.id(), false);
            match adapter.listing_feeds() {
                Ok(feeds) => jobs.extend(feeds.into_iter().map(|feed| (adapter.clone(), feed))),
                Err(e) => {
                    warn!(source = %adapter.id(), error = %e, "Could not build listing feeds");
                    result.source_failed.insert(adapter.id(), true);
                }
            }
        }

        let fetched = join_all(jobs.iter().map(|(adapter, feed)| async move {
            let raw = self.fetch(adapter.as_ref(), &feed.request).await?;
            adapter.normalize_listing(feed, raw)
        }))
        .await;

        let mut seen = IdentitySet::default();
        for ((adapter, feed), outcome) in jobs.iter().zip(fetched) {
            match outcome {
                Ok(sections) => result.sections.extend(dedup_sections(&mut seen, sections)),
                Err(e) => {
                    warn!(source = %adapter.id(), feed = feed.key, error = %e, "Listing feed failed");
                    result.source_failed.insert(adapter.id(), true);
                }
            }
        }

        info!(
            sections = result.sections.len(),
            items = seen.len(),
            "Listing aggregated"
        );
        result
    }

    /// Search every source concurrently and flatten into one list
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(HubError::Validation("query (q) is required".to_string()));
        }

        let adapters = self.sources.ordered(&self.order.search);
        let fetched = join_all(adapters.iter().map(|adapter| async move {
            let request = adapter.search_request(query)?;
            let raw = self.fetch(adapter.as_ref(), &request).await?;
            adapter.normalize_search(raw)
        }))
        .await;

        let mut seen = IdentitySet::default();
        let mut results: Vec<ContentItem> = Vec::new();
        let mut source_failed = SourceFailures::new();
        for (adapter, outcome) in adapters.iter().zip(fetched) {
            match outcome {
                Ok(items) => {
                    source_failed.insert(adapter.id(), false);
                    results.extend(seen.retain_unseen(items));
                }
                Err(e) => {
                    warn!(source = %adapter.id(), error = %e, "Search failed");
                    source_failed.insert(adapter.id(), true);
                }
            }
        }

        info!(results = results.len(), "Search aggregated");
        Ok(SearchResult {
            query: query.to_string(),
            total: results.len(),
            results,
            source_failed,
        })
    }

    /// Episode list from the first source that knows `id`
    ///
    /// Sources are tried one after another in the configured order.
    #[instrument(skip(self))]
    pub async fn episodes(&self, id: &str) -> Result<EpisodeList> {
        let id = id.trim();
        if id.is_empty() {
            return Err(HubError::Validation("id is required".to_string()));
        }

        let mut source_failed = SourceFailures::new();
        let mut answered = false;

        for adapter in self.sources.ordered(&self.order.episodes) {
            match self.lookup_episodes(adapter.as_ref(), id).await {
                Ok(Some(list)) => {
                    info!(source = %adapter.id(), episodes = list.episodes.len(), "Episodes found");
                    return Ok(self.resolve_episode_streams(adapter.as_ref(), list).await);
                }
                Ok(None) => {
                    debug!(source = %adapter.id(), "No episodes for id");
                    source_failed.insert(adapter.id(), false);
                    answered = true;
                }
                Err(e) => {
                    warn!(source = %adapter.id(), error = %e, "Episode lookup failed");
                    source_failed.insert(adapter.id(), true);
                }
            }
        }

        if answered {
            Err(HubError::NotFound {
                message: format!("No source has episodes for id {}", id),
                source_failed,
            })
        } else {
            Err(HubError::SourcesExhausted { source_failed })
        }
    }

    /// Playback URLs for a per-episode stream id
    #[instrument(skip(self))]
    pub async fn resolve_stream(&self, vid: &str) -> Result<StreamInfo> {
        let vid = vid.trim();
        if vid.is_empty() {
            return Err(HubError::Validation("vid is required".to_string()));
        }

        let mut source_failed = SourceFailures::new();
        for adapter in self.sources.ordered(&self.order.episodes) {
            let Some(request) = adapter.stream_request(vid)? else {
                continue;
            };

            let raw = self.fetch(adapter.as_ref(), &request).await?;
            if let Some(info) = adapter.normalize_stream(vid, raw)? {
                return Ok(info);
            }
            source_failed.insert(adapter.id(), false);
        }

        Err(HubError::NotFound {
            message: "Video not available".to_string(),
            source_failed,
        })
    }

    async fn lookup_episodes(
        &self,
        adapter: &dyn SourceAdapter,
        id: &str,
    ) -> Result<Option<EpisodeList>> {
        let request = adapter.episodes_request(id)?;
        let raw = self.fetch(adapter, &request).await?;
        adapter.normalize_episodes(id, raw)
    }

    /// Fill in videos for episodes that only carry a stream id
    async fn resolve_episode_streams(
        &self,
        adapter: &dyn SourceAdapter,
        mut list: EpisodeList,
    ) -> EpisodeList {
        let resolved = join_all(list.episodes.iter().map(|episode| async move {
            if !episode.videos.is_empty() {
                return None;
            }
            let request = adapter.stream_request(&episode.id).ok().flatten()?;
            let raw = match self.fetch(adapter, &request).await {
                Ok(raw) => raw,
                Err(e) => {
                    debug!(vid = %episode.id, error = %e, "Stream resolution failed");
                    return None;
                }
            };
            adapter.normalize_stream(&episode.id, raw).ok().flatten()
        }))
        .await;

        for (episode, stream) in list.episodes.iter_mut().zip(resolved) {
            if let Some(stream) = stream {
                episode.videos.push(VideoSource {
                    quality: "auto".to_string(),
                    url: stream.main_url,
                    vip: episode.vip,
                });
            }
        }
        list
    }

    /// Proxy-gated sources go through the resilient fetcher, open ones direct
    async fn fetch(&self, adapter: &dyn SourceAdapter, request: &UpstreamRequest) -> Result<Value> {
        let outcome = if adapter.via_proxy() {
            self.fetcher.fetch(&request.url, &request.headers).await
        } else {
            self.fetcher.fetch_direct(&request.url, &request.headers).await
        };

        debug!(
            source = %adapter.id(),
            mode = ?outcome.mode,
            proxy = ?outcome.proxy_address,
            "Upstream fetch finished"
        );
        outcome.into_payload()
    }
}

/// Apply the response-wide identity set and drop sections left empty
fn dedup_sections(seen: &mut IdentitySet, sections: Vec<Section>) -> Vec<Section> {
    sections
        .into_iter()
        .filter_map(|mut section| {
            section.items = seen.retain_unseen(section.items);
            (!section.items.is_empty()).then_some(section)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyPoolConfig;
    use crate::models::SourceId;
    use crate::proxy::ProxyPool;
    use crate::testing::{
        direct_aggregator, proxy_record, test_sources_config, FakeClock, FakeRegistry, Reply,
        ScriptedTransport, DRAMABOX_BASE, MELOLO_BASE, NETSHORT_BASE,
    };
    use serde_json::json;

    fn url(base: &str, rest: &str) -> String {
        format!("{}/{}", base, rest)
    }

    fn melolo_book(id: &str) -> Value {
        json!({"book_id": id, "book_name": format!("Melolo {}", id)})
    }

    #[tokio::test]
    async fn listing_dedups_globally_and_flags_failed_sources() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on_direct(
            &url(NETSHORT_BASE, "theaters"),
            Reply::json(json!([{"groupId": "g1", "contentName": "Hot", "contentInfos": [
                {"shortPlayId": "n1", "shortPlayName": "Net One"}
            ]}])),
        );
        transport.on_direct(
            &url(DRAMABOX_BASE, "vip"),
            Reply::json(json!({"columnVoList": [{"columnId": 1, "title": "VIP", "bookList": [
                {"bookId": "b1", "bookName": "Box One"}
            ]}]})),
        );
        transport.on_direct(
            &url(DRAMABOX_BASE, "latest"),
            Reply::json(json!([
                {"bookId": "b1", "bookName": "Box One again"},
                {"bookId": "b2", "bookName": "Box Two"}
            ])),
        );
        transport.on_direct(
            &url(MELOLO_BASE, "latest"),
            Reply::json(json!({"books": [melolo_book("m1")]})),
        );
        transport.on_direct(
            &url(MELOLO_BASE, "trending"),
            Reply::json(json!({"books": [melolo_book("m1")]})),
        );

        let result = direct_aggregator(transport).listing().await;

        let ids: Vec<&str> = result.sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["g1", "1", "latest", "melolo_latest"]);

        let latest = &result.sections[2];
        assert_eq!(latest.items.len(), 1);
        assert_eq!(latest.items[0].external_id, "b2");

        assert_eq!(result.source_failed.get(&SourceId::Netshort), Some(&false));
        assert_eq!(result.source_failed.get(&SourceId::Dramabox), Some(&true));
        assert_eq!(result.source_failed.get(&SourceId::Melolo), Some(&false));
    }

    #[tokio::test]
    async fn listing_with_every_source_down_is_empty_not_an_error() {
        let result = direct_aggregator(Arc::new(ScriptedTransport::new()))
            .listing()
            .await;

        assert!(result.sections.is_empty());
        assert!(result.source_failed.values().all(|failed| *failed));
        assert_eq!(result.source_failed.len(), 3);
    }

    #[tokio::test]
    async fn search_survives_one_failing_source() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on_direct(
            &url(DRAMABOX_BASE, "search?query=love+story"),
            Reply::json(json!([{"bookId": "b1", "bookName": "Love Story"}])),
        );
        transport.on_direct(
            &url(MELOLO_BASE, "search?query=love+story&limit=10&offset=0"),
            Reply::json(json!({"data": {"search_data": [{"books": [melolo_book("m1"), melolo_book("m1")]}]}})),
        );

        let result = direct_aggregator(transport)
            .search("  love story ")
            .await
            .unwrap();

        assert_eq!(result.query, "love story");
        assert_eq!(result.total, 2);
        let sources: Vec<SourceId> = result.results.iter().map(|i| i.source_id).collect();
        assert_eq!(sources, vec![SourceId::Dramabox, SourceId::Melolo]);

        assert_eq!(result.source_failed.get(&SourceId::Dramabox), Some(&false));
        assert_eq!(result.source_failed.get(&SourceId::Netshort), Some(&true));
        assert_eq!(result.source_failed.get(&SourceId::Melolo), Some(&false));
    }

    #[tokio::test]
    async fn search_requires_a_query() {
        let aggregator = direct_aggregator(Arc::new(ScriptedTransport::new()));
        assert!(matches!(
            aggregator.search("   ").await,
            Err(HubError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn episodes_fall_through_to_the_next_source() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on_direct(&url(MELOLO_BASE, "detail/1866"), Reply::json(json!({"data": {}})));
        transport.on_direct(
            &url(NETSHORT_BASE, "allepisode?shortPlayId=1866"),
            Reply::json(json!({"shortPlayName": "Revenge", "shortPlayEpisodeInfos": [
                {"episodeId": "e1", "episodeNo": 1, "playVoucher": "https://v/e1.m3u8"}
            ]})),
        );

        let list = direct_aggregator(transport.clone())
            .episodes("1866")
            .await
            .unwrap();

        assert_eq!(list.source, SourceId::Netshort);
        assert_eq!(list.episodes[0].videos[0].url, "https://v/e1.m3u8");
        // Dramabox is never asked once netshort matched.
        assert!(!transport
            .calls()
            .iter()
            .any(|c| c.url.starts_with(DRAMABOX_BASE)));
    }

    #[tokio::test]
    async fn melolo_episodes_get_resolved_streams() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on_direct(
            &url(MELOLO_BASE, "detail/7001"),
            Reply::json(json!({"data": {"video_data": {"series_title": "Book", "video_list": [
                {"vid": "v1", "vid_index": 1},
                {"vid": "v2", "vid_index": 2, "disable_play": true}
            ]}}})),
        );
        transport.on_direct(
            &url(MELOLO_BASE, "stream/v1"),
            Reply::json(json!({"data": {"main_url": "https://cdn/v1.mp4"}})),
        );

        let list = direct_aggregator(transport).episodes("7001").await.unwrap();

        assert_eq!(list.source, SourceId::Melolo);
        assert_eq!(list.episodes[0].videos[0].url, "https://cdn/v1.mp4");
        assert_eq!(list.episodes[0].videos[0].quality, "auto");
        assert!(list.episodes[1].videos.is_empty());
    }

    #[tokio::test]
    async fn unknown_episode_id_is_a_structured_not_found() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on_direct(&url(MELOLO_BASE, "detail/nope"), Reply::json(json!({"data": {}})));
        transport.on_direct(&url(DRAMABOX_BASE, "allepisode?bookId=nope"), Reply::json(json!([])));

        let err = direct_aggregator(transport).episodes("nope").await.unwrap_err();

        let HubError::NotFound { source_failed, .. } = &err else {
            panic!("expected NotFound, got {:?}", err);
        };
        assert_eq!(source_failed.get(&SourceId::Melolo), Some(&false));
        assert_eq!(source_failed.get(&SourceId::Netshort), Some(&true));
        assert_eq!(source_failed.get(&SourceId::Dramabox), Some(&false));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn episodes_with_every_source_down_are_exhausted() {
        let err = direct_aggregator(Arc::new(ScriptedTransport::new()))
            .episodes("1")
            .await
            .unwrap_err();

        assert!(matches!(&err, HubError::SourcesExhausted { source_failed } if source_failed.len() == 3));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn stream_resolution_found_and_missing() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on_direct(
            &url(MELOLO_BASE, "stream/v1"),
            Reply::json(json!({"data": {"main_url": "https://cdn/v1.mp4", "video_duration": 61}})),
        );
        transport.on_direct(&url(MELOLO_BASE, "stream/v2"), Reply::json(json!({"data": {}})));
        let aggregator = direct_aggregator(transport);

        let info = aggregator.resolve_stream("v1").await.unwrap();
        assert_eq!(info.main_url, "https://cdn/v1.mp4");
        assert_eq!(info.duration, 61.0);

        assert!(matches!(
            aggregator.resolve_stream("v2").await,
            Err(HubError::NotFound { .. })
        ));
        assert!(matches!(
            aggregator.resolve_stream("").await,
            Err(HubError::Validation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_resolution_timeout_is_a_gateway_timeout() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on_direct(&url(MELOLO_BASE, "stream/slow"), Reply::Hang);

        let err = direct_aggregator(transport)
            .resolve_stream("slow")
            .await
            .unwrap_err();

        assert!(matches!(err, HubError::Timeout));
        assert_eq!(err.status_code(), 504);
    }

    #[tokio::test]
    async fn gated_sources_use_the_proxy_pool() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on_proxy(
            "9.9.9.9:1080",
            Reply::json(json!({"searchCodeSearchResult": [{"shortPlayId": "n1", "shortPlayName": "Via proxy"}]})),
        );

        let registry = Arc::new(FakeRegistry::with_records(vec![proxy_record("9.9.9.9:1080", true, 5)]));
        let config = ProxyPoolConfig::default();
        let pool = Arc::new(ProxyPool::new(registry, Arc::new(FakeClock::default()), &config));
        let fetcher = Arc::new(ResilientFetcher::new(pool, transport.clone(), &config));
        let sources_config = test_sources_config(vec![SourceId::Netshort]);
        let aggregator = Aggregator::new(
            fetcher,
            SourceSet::from_config(&sources_config).unwrap(),
            sources_config.order,
        );

        let result = aggregator.search("proxy").await.unwrap();

        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].source_id, SourceId::Netshort);
        // Only netshort went through the tunnel.
        let tunnelled: Vec<String> = transport
            .calls()
            .into_iter()
            .filter(|c| c.proxy.is_some())
            .map(|c| c.url)
            .collect();
        assert_eq!(tunnelled.len(), 1);
        assert!(tunnelled[0].starts_with(NETSHORT_BASE));
    }
}
