use serde::Serialize;

use super::SourceId;

/// All episodes of one title, from the first source that knows it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeList {
    pub source: SourceId,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    pub total_episode: u32,
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Episode {
    pub id: String,
    pub episode: u32,
    pub title: String,
    pub thumbnail: Option<String>,
    pub vip: bool,
    pub subtitle: Vec<Subtitle>,
    pub videos: Vec<VideoSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subtitle {
    pub lang: String,
    pub url: String,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoSource {
    pub quality: String,
    pub url: String,
    pub vip: bool,
}

/// Resolved playback URLs for one episode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub vid: String,
    pub main_url: String,
    pub backup_url: Option<String>,
    pub duration: f64,
}
