// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Live,
    Movies,
    Series,
}

impl ContentType {
    pub fn all() -> [ContentType; 3] {
        [ContentType::Live, ContentType::Movies, ContentType::Series]
    }

    /// Path segment used when constructing playback URLs.
    pub fn stream_path(&self) -> &'static str {
        match self {
            ContentType::Live => "live",
            ContentType::Movies => "movie",
            ContentType::Series => "series",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Live => write!(f, "Live TV"),
            ContentType::Movies => write!(f, "Movies"),
            ContentType::Series => write!(f, "TV Series"),
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" => Ok(ContentType::Live),
            "movies" | "movie" | "vod" => Ok(ContentType::Movies),
            "series" => Ok(ContentType::Series),
            other => Err(crate::error::Error::Validation(format!(
                "unknown content type: {other}"
            ))),
        }
    }
}

// Servers are inconsistent about numeric fields: the same id arrives as a
// JSON number from one provider and a string from the next.
fn deserialize_number_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value: Value = Deserialize::deserialize(deserializer)?;

    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(D::Error::custom("Expected string or number")),
    }
}

// Guide channel ids are matched case-insensitively everywhere, so they are
// normalized once at the deserialization boundary. Empty means absent.
fn deserialize_guide_channel_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Deserialize::deserialize(deserializer)?;

    let id = match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => return Ok(None),
    };

    let id = id.trim().to_lowercase();
    if id.is_empty() { Ok(None) } else { Ok(Some(id)) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    #[serde(deserialize_with = "deserialize_number_as_string")]
    pub category_id: String,
    pub category_name: String,
    #[serde(default)]
    pub parent_id: Option<u32>,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.category_name)
    }
}

/// A playable catalog entry: a live channel or a movie, depending on which
/// action fetched it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub name: String,
    pub stream_id: u32,
    #[serde(default, deserialize_with = "deserialize_guide_channel_id")]
    pub epg_channel_id: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub container_extension: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub name: String,
    pub series_id: u32,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub plot: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub episode_num: u32,
    pub title: String,
    #[serde(default)]
    pub container_extension: Option<String>,
    #[serde(default)]
    pub season: u32,
}

/// `get_series_info` response. Seasons are derived from the keys of the
/// episodes map rather than the `seasons` array, which many servers leave
/// empty or inconsistent with the episodes actually present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesInfoResponse {
    #[serde(default)]
    pub episodes: Option<std::collections::HashMap<String, Vec<Episode>>>,
}

impl SeriesInfoResponse {
    /// Season numbers present in the episodes map, sorted numerically.
    pub fn season_numbers(&self) -> Vec<u32> {
        let mut seasons: Vec<u32> = self
            .episodes
            .as_ref()
            .map(|map| map.keys().filter_map(|k| k.parse().ok()).collect())
            .unwrap_or_default();
        seasons.sort_unstable();
        seasons
    }

    /// Episodes for one season, sorted by episode number.
    pub fn episodes_for_season(&self, season: u32) -> Vec<Episode> {
        let mut episodes = self
            .episodes
            .as_ref()
            .and_then(|map| map.get(&season.to_string()))
            .cloned()
            .unwrap_or_default();
        episodes.sort_by_key(|e| e.episode_num);
        episodes
    }
}

/// Borrowed tagged view over any browsable item, used when rendering and
/// filtering lists without cloning the underlying catalog data.
#[derive(Debug, Clone, Copy)]
pub enum CatalogEntry<'a> {
    Category(&'a Category),
    Channel(&'a Stream),
    Movie(&'a Stream),
    Series(&'a SeriesSummary),
    Season(&'a SeriesSummary, u32),
    Episode { series: &'a str, episode: &'a Episode },
}

impl CatalogEntry<'_> {
    pub fn id(&self) -> String {
        match self {
            CatalogEntry::Category(c) => c.category_id.clone(),
            CatalogEntry::Channel(s) | CatalogEntry::Movie(s) => s.stream_id.to_string(),
            CatalogEntry::Series(s) => s.series_id.to_string(),
            CatalogEntry::Season(_, number) => number.to_string(),
            CatalogEntry::Episode { episode, .. } => episode.id.clone(),
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            CatalogEntry::Category(c) => c.category_name.clone(),
            CatalogEntry::Channel(s) | CatalogEntry::Movie(s) => s.name.clone(),
            CatalogEntry::Series(s) => s.name.clone(),
            CatalogEntry::Season(_, number) => format!("Season {number}"),
            CatalogEntry::Episode { series, episode } => episode_display_text(series, episode),
        }
    }

    pub fn parent_category_id(&self) -> Option<&str> {
        match self {
            CatalogEntry::Category(_) => None,
            CatalogEntry::Channel(s) | CatalogEntry::Movie(s) => s.category_id.as_deref(),
            CatalogEntry::Series(s) => s.category_id.as_deref(),
            CatalogEntry::Season(series, _) => series.category_id.as_deref(),
            CatalogEntry::Episode { .. } => None,
        }
    }
}

/// Per-tab top-level category list, refreshed on demand. Drill-down data
/// lives on the navigation stack, not here.
#[derive(Debug, Clone, Default)]
pub struct CatalogStore {
    categories: Vec<Category>,
}

impl CatalogStore {
    pub fn set_categories(&mut self, mut categories: Vec<Category>) {
        categories.sort_by(|a, b| a.category_name.cmp(&b.category_name));
        self.categories = categories;
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn find_category(&self, category_id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.category_id == category_id)
    }
}

pub fn episode_code(season: u32, episode_num: u32) -> String {
    format!("S{season:02}E{episode_num:02}")
}

/// Display text for an episode row: `{series} - SxxEyy - {title}`, with the
/// series title and episode code stripped out of the raw title when servers
/// bake them in.
pub fn episode_display_text(series_title: &str, episode: &Episode) -> String {
    let code = episode_code(episode.season, episode.episode_num);

    let mut title = episode.title.trim().to_string();
    if !series_title.is_empty() && title.contains(series_title) {
        title = title.replace(series_title, "").trim_matches([' ', '-']).to_string();
    }
    if title.contains(&code) {
        title = title.replace(&code, "").trim_matches([' ', '-']).to_string();
    }

    if title.is_empty() {
        format!("{series_title} - {code}")
    } else {
        format!("{series_title} - {code} - {title}")
    }
}
