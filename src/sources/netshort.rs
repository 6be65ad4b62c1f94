//! NetShort catalog

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{
    de, decode_array, decode_object, endpoint, json_headers, ordinal, Feed, SourceAdapter,
    UpstreamRequest,
};
use crate::error::{HubError, Result};
use crate::models::{ContentItem, Episode, EpisodeList, Section, SourceId, Subtitle, VideoSource};
use crate::proxy::browser_headers;

pub struct NetshortSource {
    base: Url,
    via_proxy: bool,
    /// Search titles come back with `<em>` highlight markup
    markup: Regex,
}

impl NetshortSource {
    pub fn new(base: Url, via_proxy: bool) -> Result<Self> {
        let markup = Regex::new(r"<[^>]+>")
            .map_err(|e| HubError::Internal(format!("invalid markup pattern: {}", e)))?;
        Ok(Self {
            base,
            via_proxy,
            markup,
        })
    }

    fn request(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<UpstreamRequest> {
        Ok(UpstreamRequest {
            url: endpoint(&self.base, segments, query)?,
            headers: browser_headers(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TheaterGroup {
    #[serde(default, deserialize_with = "de::opt_string")]
    group_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    content_name: Option<String>,
    #[serde(default, deserialize_with = "de::list")]
    content_infos: Vec<ShortPlay>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortPlay {
    #[serde(default, deserialize_with = "de::opt_string")]
    short_play_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    short_play_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    short_play_cover: Option<String>,
    #[serde(default, deserialize_with = "de::string_list")]
    label_array: Vec<String>,
    #[serde(default, deserialize_with = "de::string_list")]
    label_name_list: Vec<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    heat_score_show: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    format_heat_score: Option<String>,
    #[serde(default, deserialize_with = "de::opt_flag")]
    is_new_label: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_string")]
    shot_introduce: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default, deserialize_with = "de::list")]
    search_code_search_result: Vec<ShortPlay>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpisodePage {
    #[serde(default, deserialize_with = "de::opt_string")]
    short_play_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    short_play_cover: Option<String>,
    #[serde(default, deserialize_with = "de::opt_u32")]
    total_episode: Option<u32>,
    #[serde(default, deserialize_with = "de::list")]
    short_play_episode_infos: Vec<EpisodeInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpisodeInfo {
    #[serde(default, deserialize_with = "de::opt_string")]
    episode_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_u32")]
    episode_no: Option<u32>,
    #[serde(default, deserialize_with = "de::opt_string")]
    episode_cover: Option<String>,
    #[serde(default, deserialize_with = "de::flag")]
    is_vip: bool,
    #[serde(default, deserialize_with = "de::flag")]
    is_lock: bool,
    #[serde(default, deserialize_with = "de::list")]
    subtitle_list: Vec<SubtitleInfo>,
    #[serde(default, deserialize_with = "de::opt_string")]
    play_clarity: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    play_voucher: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubtitleInfo {
    #[serde(default, deserialize_with = "de::opt_string")]
    subtitle_language: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    url: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    format: Option<String>,
}

impl EpisodeInfo {
    fn into_episode(self, position: usize) -> Option<Episode> {
        let number = self.episode_no.unwrap_or_else(|| ordinal(position));
        let subtitle = self
            .subtitle_list
            .into_iter()
            .filter_map(|s| {
                Some(Subtitle {
                    lang: s.subtitle_language.unwrap_or_else(|| "auto".to_string()),
                    url: s.url?,
                    format: s.format.unwrap_or_else(|| "srt".to_string()),
                })
            })
            .collect();
        let videos = self
            .play_voucher
            .map(|url| VideoSource {
                quality: self.play_clarity.unwrap_or_else(|| "auto".to_string()),
                url,
                vip: self.is_vip,
            })
            .into_iter()
            .collect();

        Some(Episode {
            id: self.episode_id?,
            episode: number,
            title: format!("EP {}", number),
            thumbnail: self.episode_cover,
            vip: self.is_vip || self.is_lock,
            subtitle,
            videos,
        })
    }
}

impl SourceAdapter for NetshortSource {
    fn id(&self) -> SourceId {
        SourceId::Netshort
    }

    fn via_proxy(&self) -> bool {
        self.via_proxy
    }

    fn listing_feeds(&self) -> Result<Vec<Feed>> {
        Ok(vec![Feed {
            key: "theater",
            title: "NetShort",
            request: self.request(&["theaters"], &[])?,
        }])
    }

    fn normalize_listing(&self, feed: &Feed, raw: Value) -> Result<Vec<Section>> {
        Ok(decode_array::<TheaterGroup>(self.id(), raw)?
            .into_iter()
            .enumerate()
            .map(|(position, group)| Section {
                id: group
                    .group_id
                    .unwrap_or_else(|| format!("{}_{}", feed.key, position)),
                title: group.content_name.unwrap_or_else(|| feed.title.to_string()),
                kind: feed.key.to_string(),
                items: group
                    .content_infos
                    .into_iter()
                    .filter_map(|play| {
                        let mut item = ContentItem::new(
                            SourceId::Netshort,
                            play.short_play_id?,
                            play.short_play_name.unwrap_or_default(),
                        );
                        item.cover = play.short_play_cover;
                        item.tags = play.label_array;
                        item.play_count = play.heat_score_show;
                        item.is_new = play.is_new_label;
                        Some(item)
                    })
                    .collect(),
            })
            .collect())
    }

    fn search_request(&self, query: &str) -> Result<UpstreamRequest> {
        self.request(&["search"], &[("query", query)])
    }

    fn normalize_search(&self, raw: Value) -> Result<Vec<ContentItem>> {
        let page: SearchPage = decode_object(self.id(), raw)?;
        Ok(page
            .search_code_search_result
            .into_iter()
            .filter_map(|play| {
                let title = play.short_play_name.unwrap_or_default();
                let mut item = ContentItem::new(
                    SourceId::Netshort,
                    play.short_play_id?,
                    self.markup.replace_all(&title, "").into_owned(),
                );
                item.description = play.shot_introduce;
                item.cover = play.short_play_cover;
                item.tags = play.label_name_list;
                item.play_count = play.format_heat_score;
                Some(item)
            })
            .collect())
    }

    fn episodes_request(&self, id: &str) -> Result<UpstreamRequest> {
        let mut request = self.request(&["allepisode"], &[("shortPlayId", id)])?;
        request.headers = json_headers();
        Ok(request)
    }

    fn normalize_episodes(&self, id: &str, raw: Value) -> Result<Option<EpisodeList>> {
        if raw.is_null() {
            return Ok(None);
        }

        let page: EpisodePage = decode_object(self.id(), raw)?;
        let episodes: Vec<Episode> = page
            .short_play_episode_infos
            .into_iter()
            .enumerate()
            .filter_map(|(position, info)| info.into_episode(position))
            .collect();
        if episodes.is_empty() {
            return Ok(None);
        }

        Ok(Some(EpisodeList {
            source: self.id(),
            id: id.to_string(),
            title: page.short_play_name,
            cover: page.short_play_cover,
            total_episode: page.total_episode.unwrap_or(episodes.len() as u32),
            episodes,
        }))
    }
}
