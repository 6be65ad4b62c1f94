//! Melolo catalog
//!
//! Episode lists carry only per-episode stream ids; playable URLs are
//! resolved through the `stream/<vid>` endpoint.

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{
    de, decode_object, document_headers, endpoint, json_headers, ordinal, Feed, SourceAdapter,
    UpstreamRequest,
};
use crate::error::Result;
use crate::models::{ContentItem, Episode, EpisodeList, Section, SourceId, StreamInfo};

const FEEDS: &[(&str, &str, &str)] = &[
    ("melolo_latest", "latest", "🆕 Melolo Terbaru"),
    ("melolo_trending", "trending", "🔥 Melolo Trending"),
];

const SECTION_KIND: &str = "melolo";
const SEARCH_LIMIT: &str = "10";

pub struct MeloloSource {
    base: Url,
    via_proxy: bool,
}

impl MeloloSource {
    pub fn new(base: Url, via_proxy: bool) -> Self {
        Self { base, via_proxy }
    }
}

#[derive(Debug, Deserialize)]
struct BookPage {
    #[serde(default, deserialize_with = "de::list")]
    books: Vec<MeloloBook>,
}

#[derive(Debug, Deserialize)]
struct MeloloBook {
    #[serde(default, deserialize_with = "de::opt_string")]
    book_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    book_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    thumb_url: Option<String>,
    #[serde(rename = "abstract", default, deserialize_with = "de::opt_string")]
    summary: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    author: Option<String>,
    #[serde(default, deserialize_with = "de::opt_u32")]
    serial_count: Option<u32>,
    #[serde(default, deserialize_with = "de::opt_flag")]
    is_new_book: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_flag")]
    is_hot: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_string")]
    show_creation_status: Option<String>,
    #[serde(default)]
    age_gate: Option<Value>,
    #[serde(default, deserialize_with = "de::string_list")]
    stat_infos: Vec<String>,
}

impl MeloloBook {
    fn into_item(self) -> Option<ContentItem> {
        let mut item = ContentItem::new(SourceId::Melolo, self.book_id?, self.book_name.unwrap_or_default());
        item.cover = self.thumb_url;
        item.description = self.summary;
        item.author = self.author;
        item.tags = self.stat_infos;
        item.episode_count = self.serial_count;
        item.is_new = Some(self.is_new_book.unwrap_or(false));
        item.is_hot = Some(self.is_hot.unwrap_or(false));
        item.status = self.show_creation_status;
        item.age_gate = self.age_gate.filter(|v| !v.is_null());
        Some(item)
    }
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    data: Option<SearchData>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default, deserialize_with = "de::list")]
    search_data: Vec<BookPage>,
}

#[derive(Debug, Deserialize)]
struct DetailPage {
    #[serde(default)]
    data: Option<DetailData>,
}

#[derive(Debug, Deserialize)]
struct DetailData {
    #[serde(default)]
    video_data: Option<VideoData>,
}

#[derive(Debug, Deserialize)]
struct VideoData {
    #[serde(default, deserialize_with = "de::opt_string")]
    series_title: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    series_cover: Option<String>,
    #[serde(default, deserialize_with = "de::opt_u32")]
    episode_cnt: Option<u32>,
    #[serde(default, deserialize_with = "de::list")]
    video_list: Vec<VideoEntry>,
}

#[derive(Debug, Deserialize)]
struct VideoEntry {
    #[serde(default, deserialize_with = "de::opt_string")]
    vid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_u32")]
    vid_index: Option<u32>,
    #[serde(default, deserialize_with = "de::opt_string")]
    episode_cover: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    cover: Option<String>,
    #[serde(default, deserialize_with = "de::flag")]
    disable_play: bool,
}

#[derive(Debug, Deserialize)]
struct StreamPage {
    #[serde(default)]
    data: Option<StreamData>,
}

#[derive(Debug, Deserialize)]
struct StreamData {
    #[serde(default, deserialize_with = "de::opt_string")]
    main_url: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    backup_url: Option<String>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    video_duration: Option<f64>,
}

impl SourceAdapter for MeloloSource {
    fn id(&self) -> SourceId {
        SourceId::Melolo
    }

    fn via_proxy(&self) -> bool {
        self.via_proxy
    }

    fn listing_feeds(&self) -> Result<Vec<Feed>> {
        FEEDS
            .iter()
            .map(|&(key, path, title)| -> Result<Feed> {
                Ok(Feed {
                    key,
                    title,
                    request: UpstreamRequest {
                        url: endpoint(&self.base, &[path], &[])?,
                        headers: document_headers(),
                    },
                })
            })
            .collect()
    }

    fn normalize_listing(&self, feed: &Feed, raw: Value) -> Result<Vec<Section>> {
        let page: BookPage = decode_object(self.id(), raw)?;
        Ok(vec![Section {
            id: feed.key.to_string(),
            title: feed.title.to_string(),
            kind: SECTION_KIND.to_string(),
            items: page.books.into_iter().filter_map(MeloloBook::into_item).collect(),
        }])
    }

    fn search_request(&self, query: &str) -> Result<UpstreamRequest> {
        Ok(UpstreamRequest {
            url: endpoint(
                &self.base,
                &["search"],
                &[("query", query), ("limit", SEARCH_LIMIT), ("offset", "0")],
            )?,
            headers: document_headers(),
        })
    }

    fn normalize_search(&self, raw: Value) -> Result<Vec<ContentItem>> {
        let page: SearchPage = decode_object(self.id(), raw)?;
        Ok(page
            .data
            .map(|data| data.search_data)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|group| group.books)
            .filter_map(MeloloBook::into_item)
            .collect())
    }

    fn episodes_request(&self, id: &str) -> Result<UpstreamRequest> {
        Ok(UpstreamRequest {
            url: endpoint(&self.base, &["detail", id], &[])?,
            headers: json_headers(),
        })
    }

    fn normalize_episodes(&self, id: &str, raw: Value) -> Result<Option<EpisodeList>> {
        if raw.is_null() {
            return Ok(None);
        }

        let page: DetailPage = decode_object(self.id(), raw)?;
        let video_data = match page.data.and_then(|d| d.video_data) {
            Some(video_data) => video_data,
            None => return Ok(None),
        };

        let episodes: Vec<Episode> = video_data
            .video_list
            .into_iter()
            .enumerate()
            .filter_map(|(position, entry)| {
                let number = entry.vid_index.unwrap_or_else(|| ordinal(position));
                Some(Episode {
                    id: entry.vid?,
                    episode: number,
                    title: format!("EP {}", number),
                    thumbnail: entry.episode_cover.or(entry.cover),
                    vip: entry.disable_play,
                    subtitle: Vec::new(),
                    videos: Vec::new(),
                })
            })
            .collect();
        if episodes.is_empty() {
            return Ok(None);
        }

        Ok(Some(EpisodeList {
            source: self.id(),
            id: id.to_string(),
            title: video_data.series_title,
            cover: video_data.series_cover,
            total_episode: video_data.episode_cnt.unwrap_or(episodes.len() as u32),
            episodes,
        }))
    }

    fn stream_request(&self, vid: &str) -> Result<Option<UpstreamRequest>> {
        Ok(Some(UpstreamRequest {
            url: endpoint(&self.base, &["stream", vid], &[])?,
            headers: json_headers(),
        }))
    }

    fn normalize_stream(&self, vid: &str, raw: Value) -> Result<Option<StreamInfo>> {
        if raw.is_null() {
            return Ok(None);
        }

        let page: StreamPage = decode_object(self.id(), raw)?;
        Ok(page.data.and_then(|data| {
            Some(StreamInfo {
                vid: vid.to_string(),
                main_url: data.main_url?,
                backup_url: data.backup_url,
                duration: data.video_duration.unwrap_or(0.0),
            })
        }))
    }
}
