//! DramaBox catalog

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{
    de, decode_array, decode_object, endpoint, json_headers, ordinal, Feed, SourceAdapter,
    UpstreamRequest,
};
use crate::error::Result;
use crate::models::{ContentItem, Episode, EpisodeList, Section, SourceId, Subtitle, VideoSource};
use crate::proxy::browser_headers;

/// `(key, path, query, title)` of every listing feed
const FEEDS: &[(&str, &str, &[(&str, &str)], &str)] = &[
    ("vip", "vip", &[], "VIP Eksklusif"),
    ("dubindo", "dubindo", &[("classify", "terpopuler")], "Dub Indo Terpopuler"),
    ("random", "randomdrama", &[], "Rekomendasi Acak"),
    ("latest", "latest", &[], "Drama Terbaru"),
    ("trending", "trending", &[], "🔥 Trending"),
    ("populersearch", "populersearch", &[], "🔍 Pencarian Populer"),
];

/// Corner badge type marking members-only titles in search results
const VIP_CORNER_TYPE: i64 = 4;

pub struct DramaboxSource {
    base: Url,
    via_proxy: bool,
}

impl DramaboxSource {
    pub fn new(base: Url, via_proxy: bool) -> Self {
        Self { base, via_proxy }
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
struct ColumnPage {
    #[serde(default, deserialize_with = "de::list")]
    column_vo_list: Vec<Column>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Column {
    #[serde(default, deserialize_with = "de::opt_string")]
    column_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "de::list")]
    book_list: Vec<Book>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Book {
    #[serde(default, deserialize_with = "de::opt_string")]
    book_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    book_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    cover_wap: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    cover: Option<String>,
    #[serde(default, deserialize_with = "de::string_list")]
    tags: Vec<String>,
    #[serde(default, deserialize_with = "de::string_list")]
    tag_names: Vec<String>,
    #[serde(default, deserialize_with = "de::opt_u32")]
    chapter_count: Option<u32>,
    #[serde(default, deserialize_with = "de::opt_string")]
    play_count: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    introduction: Option<String>,
    #[serde(default)]
    corner: Option<Value>,
}

impl Book {
    fn into_listing_item(self) -> Option<ContentItem> {
        let mut item = ContentItem::new(SourceId::Dramabox, self.book_id?, self.book_name.unwrap_or_default());
        item.vip = Some(self.corner.as_ref().is_some_and(is_truthy));
        item.cover = self.cover_wap.or(self.cover);
        item.tags = if self.tags.is_empty() { self.tag_names } else { self.tags };
        item.episode_count = self.chapter_count;
        item.play_count = self.play_count;
        Some(item)
    }

    fn into_search_item(self) -> Option<ContentItem> {
        let vip = self
            .corner
            .as_ref()
            .and_then(|corner| corner.get("cornerType"))
            .and_then(Value::as_i64)
            == Some(VIP_CORNER_TYPE);

        let mut item = ContentItem::new(SourceId::Dramabox, self.book_id?, self.book_name.unwrap_or_default());
        item.vip = Some(vip);
        item.cover = self.cover.or(self.cover_wap);
        item.tags = if self.tag_names.is_empty() { self.tags } else { self.tag_names };
        item.description = self.introduction;
        item.episode_count = self.chapter_count;
        Some(item)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Chapter {
    #[serde(default, deserialize_with = "de::opt_string")]
    chapter_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_u32")]
    chapter_index: Option<u32>,
    #[serde(default, deserialize_with = "de::opt_string")]
    chapter_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    chapter_img: Option<String>,
    #[serde(default, deserialize_with = "de::flag")]
    is_charge: bool,
    #[serde(default, deserialize_with = "de::opt_string")]
    sprite_snapshot_url: Option<String>,
    #[serde(default, deserialize_with = "de::list")]
    cdn_list: Vec<Cdn>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Cdn {
    #[serde(default, deserialize_with = "de::flag")]
    is_default: bool,
    #[serde(default, deserialize_with = "de::list")]
    video_path_list: Vec<VideoPath>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoPath {
    #[serde(default, deserialize_with = "de::opt_string")]
    quality: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    video_path: Option<String>,
    #[serde(default, deserialize_with = "de::flag")]
    is_vip_equity: bool,
}

impl Chapter {
    fn into_episode(self, position: usize) -> Option<Episode> {
        // Chapter indexes are zero-based upstream.
        let number = self
            .chapter_index
            .map(|i| i.saturating_add(1))
            .unwrap_or_else(|| ordinal(position));

        let cdn = match self.cdn_list.iter().position(|c| c.is_default) {
            Some(i) => self.cdn_list.into_iter().nth(i),
            None => self.cdn_list.into_iter().next(),
        };
        let videos = cdn
            .map(|cdn| {
                cdn.video_path_list
                    .into_iter()
                    .filter_map(|v| {
                        Some(VideoSource {
                            quality: v.quality.unwrap_or_else(|| "auto".to_string()),
                            url: v.video_path?,
                            vip: v.is_vip_equity,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let subtitle = self
            .sprite_snapshot_url
            .map(|url| Subtitle {
                lang: "auto".to_string(),
                url,
                format: "webvtt".to_string(),
            })
            .into_iter()
            .collect();

        Some(Episode {
            id: self.chapter_id?,
            episode: number,
            title: self
                .chapter_name
                .unwrap_or_else(|| format!("EP {}", number)),
            thumbnail: self.chapter_img,
            vip: self.is_charge,
            subtitle,
            videos,
        })
    }
}

impl SourceAdapter for DramaboxSource {
    fn id(&self) -> SourceId {
        SourceId::Dramabox
    }

    fn via_proxy(&self) -> bool {
        self.via_proxy
    }

    fn listing_feeds(&self) -> Result<Vec<Feed>> {
        FEEDS
            .iter()
            .map(|&(key, path, query, title)| -> Result<Feed> {
                Ok(Feed {
                    key,
                    title,
                    request: self.request(&[path], query)?,
                })
            })
            .collect()
    }

    fn normalize_listing(&self, feed: &Feed, raw: Value) -> Result<Vec<Section>> {
        // Column pages are the common shape; a few feeds return a bare book list.
        if raw.is_array() {
            let items = decode_array::<Book>(self.id(), raw)?
                .into_iter()
                .filter_map(Book::into_listing_item)
                .collect();
            return Ok(vec![Section {
                id: feed.key.to_string(),
                title: feed.title.to_string(),
                kind: feed.key.to_string(),
                items,
            }]);
        }

        let page: ColumnPage = decode_object(self.id(), raw)?;
        Ok(page
            .column_vo_list
            .into_iter()
            .map(|column| Section {
                id: column.column_id.unwrap_or_else(|| feed.key.to_string()),
                title: column.title.unwrap_or_else(|| feed.title.to_string()),
                kind: feed.key.to_string(),
                items: column
                    .book_list
                    .into_iter()
                    .filter_map(Book::into_listing_item)
                    .collect(),
            })
            .collect())
    }

    fn search_request(&self, query: &str) -> Result<UpstreamRequest> {
        self.request(&["search"], &[("query", query)])
    }

    fn normalize_search(&self, raw: Value) -> Result<Vec<ContentItem>> {
        Ok(decode_array::<Book>(self.id(), raw)?
            .into_iter()
            .filter_map(Book::into_search_item)
            .collect())
    }

    fn episodes_request(&self, id: &str) -> Result<UpstreamRequest> {
        let mut request = self.request(&["allepisode"], &[("bookId", id)])?;
        request.headers = json_headers();
        Ok(request)
    }

    fn normalize_episodes(&self, id: &str, raw: Value) -> Result<Option<EpisodeList>> {
        let chapters = match raw {
            Value::Null => return Ok(None),
            // Unknown ids come back as an error object rather than a list.
            Value::Object(_) => return Ok(None),
            other => decode_array::<Chapter>(self.id(), other)?,
        };

        let episodes: Vec<Episode> = chapters
            .into_iter()
            .enumerate()
            .filter_map(|(position, chapter)| chapter.into_episode(position))
            .collect();
        if episodes.is_empty() {
            return Ok(None);
        }

        Ok(Some(EpisodeList {
            source: self.id(),
            id: id.to_string(),
            title: None,
            cover: None,
            total_episode: episodes.len() as u32,
            episodes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HubError;
    use serde_json::json;

    fn source() -> DramaboxSource {
        DramaboxSource::new(Url::parse("https://dramabox.example/api/dramabox").unwrap(), true)
    }

    #[test]
    fn listing_feeds_cover_every_endpoint() {
        let feeds = source().listing_feeds().unwrap();
        let keys: Vec<&str> = feeds.iter().map(|f| f.key).collect();
        assert_eq!(keys, vec!["vip", "dubindo", "random", "latest", "trending", "populersearch"]);
        assert_eq!(
            feeds[1].request.url,
            "https://dramabox.example/api/dramabox/dubindo?classify=terpopuler"
        );
        assert_eq!(feeds[2].request.url, "https://dramabox.example/api/dramabox/randomdrama");
    }

    #[test]
    fn listing_maps_columns_into_sections() {
        let src = source();
        let feed = src.listing_feeds().unwrap().remove(0);
        let sections = src
            .normalize_listing(
                &feed,
                json!({"columnVoList": [
                    {"columnId": 101, "title": "", "bookList": [
                        {"bookId": "4100", "bookName": "CEO's Secret", "coverWap": "https://img/a.jpg",
                         "tags": ["Romance"], "chapterCount": 80, "playCount": "1.2M", "corner": {"cornerType": 4}},
                        {"bookName": "no id"},
                        {"bookId": 4101, "bookName": "Second Chance", "corner": null}
                    ]}
                ]}),
            )
            .unwrap();

        assert_eq!(sections.len(), 1);
        let section = &sections[0];
        assert_eq!(section.id, "101");
        assert_eq!(section.title, "VIP Eksklusif");
        assert_eq!(section.kind, "vip");
        assert_eq!(section.items.len(), 2);

        let first = &section.items[0];
        assert_eq!(first.external_id, "4100");
        assert_eq!(first.cover.as_deref(), Some("https://img/a.jpg"));
        assert_eq!(first.episode_count, Some(80));
        assert_eq!(first.vip, Some(true));
        assert_eq!(section.items[1].external_id, "4101");
        assert_eq!(section.items[1].vip, Some(false));
    }

    #[test]
    fn listing_accepts_bare_book_lists() {
        let src = source();
        let feed = src.listing_feeds().unwrap().remove(3);
        let sections = src
            .normalize_listing(&feed, json!([{"bookId": "9", "bookName": "Latest"}]))
            .unwrap();

        assert_eq!(sections[0].id, "latest");
        assert_eq!(sections[0].title, "Drama Terbaru");
        assert_eq!(sections[0].items[0].external_id, "9");
    }

    #[test]
    fn listing_rejects_scalar_payloads() {
        let src = source();
        let feed = src.listing_feeds().unwrap().remove(0);
        assert!(matches!(
            src.normalize_listing(&feed, json!("maintenance")),
            Err(HubError::SourceNormalization { source_id: SourceId::Dramabox, .. })
        ));
    }

    #[test]
    fn search_uses_corner_type_for_vip() {
        let items = source()
            .normalize_search(json!([
                {"bookId": "1", "bookName": "A", "cover": "c1", "tagNames": ["Drama"],
                 "introduction": "intro", "corner": {"cornerType": 4}},
                {"bookId": "2", "bookName": "B", "corner": {"cornerType": 1}},
                {"bookId": null, "bookName": "C"}
            ]))
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].vip, Some(true));
        assert_eq!(items[0].tags, vec!["Drama"]);
        assert_eq!(items[0].description.as_deref(), Some("intro"));
        assert_eq!(items[1].vip, Some(false));
    }

    #[test]
    fn episodes_pick_default_cdn_and_one_based_numbers() {
        let list = source()
            .normalize_episodes(
                "4100",
                json!([{
                    "chapterId": "c0", "chapterIndex": 0, "chapterName": "EP 1", "chapterImg": "t.jpg",
                    "isCharge": 0, "spriteSnapshotUrl": "https://sprite.vtt",
                    "cdnList": [
                        {"isDefault": 0, "videoPathList": [{"quality": 540, "videoPath": "https://slow/540.mp4"}]},
                        {"isDefault": 1, "videoPathList": [
                            {"quality": 720, "videoPath": "https://fast/720.mp4", "isVipEquity": 0},
                            {"quality": 1080, "videoPath": "https://fast/1080.mp4", "isVipEquity": 1}
                        ]}
                    ]
                }, {"chapterId": "c1", "chapterIndex": 1, "isCharge": 1}]),
            )
            .unwrap()
            .unwrap();

        assert_eq!(list.source, SourceId::Dramabox);
        assert_eq!(list.total_episode, 2);

        let first = &list.episodes[0];
        assert_eq!(first.episode, 1);
        assert_eq!(first.videos.len(), 2);
        assert_eq!(first.videos[0].url, "https://fast/720.mp4");
        assert_eq!(first.videos[0].quality, "720");
        assert!(first.videos[1].vip);
        assert_eq!(first.subtitle[0].format, "webvtt");

        let second = &list.episodes[1];
        assert_eq!(second.episode, 2);
        assert_eq!(second.title, "EP 2");
        assert!(second.vip);
        assert!(second.videos.is_empty());
    }

    #[test]
    fn episodes_with_maximal_chapter_index_saturate() {
        let list = source()
            .normalize_episodes("x", json!([{"chapterId": "c", "chapterIndex": 4294967295u32}]))
            .unwrap()
            .unwrap();

        assert_eq!(list.episodes[0].episode, u32::MAX);
    }

    #[test]
    fn episodes_for_unknown_ids_are_none() {
        let src = source();
        assert_eq!(src.normalize_episodes("x", json!([])).unwrap(), None);
        assert_eq!(src.normalize_episodes("x", Value::Null).unwrap(), None);
        assert_eq!(
            src.normalize_episodes("x", json!({"error": "not found"})).unwrap(),
            None
        );
    }
}
