// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::error::{Error, Result};
use crate::normalize::normalize_name;
use chrono::{DateTime, FixedOffset};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// One scheduled program from the guide feed. Rebuilt wholesale on every
/// successful fetch, never mutated field-by-field.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramEntry {
    pub channel: String,
    pub start: DateTime<FixedOffset>,
    pub stop: DateTime<FixedOffset>,
    pub title: String,
    pub description: String,
}

/// Parsed guide data: programs per guide channel id, and the set of
/// normalized display names per id for fuzzy matching.
///
/// Program lists are sorted by start time at parse time, so "first entry
/// starting after now" means the chronological next program.
#[derive(Debug, Clone, Default)]
pub struct GuideIndex {
    pub programs: HashMap<String, Vec<ProgramEntry>>,
    pub names: BTreeMap<String, BTreeSet<String>>,
}

impl GuideIndex {
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty() && self.names.is_empty()
    }

    pub fn programs_for(&self, channel_id: &str) -> Option<&[ProgramEntry]> {
        self.programs.get(channel_id).map(|v| v.as_slice())
    }

    pub fn program_count(&self) -> usize {
        self.programs.values().map(|v| v.len()).sum()
    }

    /// Normalized display names paired with their guide channel id, the
    /// candidate set for name-based matching.
    pub fn name_candidates(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .flat_map(|(id, names)| names.iter().map(move |n| (n.as_str(), id.as_str())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParserState {
    Root,
    Channel,
    Programme,
    DisplayName,
    Title,
    Desc,
}

/// Parse an XMLTV document into a [`GuideIndex`].
///
/// Channel ids are trimmed and lowercased; display names are normalized into
/// the per-id name set. Programmes with unparseable timestamps are skipped.
/// Any XML-level error fails the whole parse so callers fall back to an
/// empty index instead of rendering partial data.
pub fn parse_guide(xml: &[u8]) -> Result<GuideIndex> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut index = GuideIndex::default();
    let mut buf = Vec::with_capacity(8192);

    let mut state = ParserState::Root;
    let mut channel_id = String::new();
    let mut programme: Option<(String, Option<DateTime<FixedOffset>>, Option<DateTime<FixedOffset>>)> =
        None;
    let mut title = String::new();
    let mut description = String::new();
    let mut text_buf = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"channel" => {
                    state = ParserState::Channel;
                    channel_id = get_attribute(e, b"id")
                        .map(|id| id.trim().to_lowercase())
                        .unwrap_or_default();
                    if !channel_id.is_empty() {
                        index.names.entry(channel_id.clone()).or_default();
                    }
                }
                b"programme" => {
                    state = ParserState::Programme;
                    let id = get_attribute(e, b"channel")
                        .map(|id| id.trim().to_lowercase())
                        .unwrap_or_default();
                    let start = get_attribute(e, b"start").and_then(|s| parse_xmltv_time(&s));
                    let stop = get_attribute(e, b"stop").and_then(|s| parse_xmltv_time(&s));
                    programme = Some((id, start, stop));
                    title.clear();
                    description.clear();
                }
                b"display-name" if state == ParserState::Channel => {
                    state = ParserState::DisplayName;
                    text_buf.clear();
                }
                b"title" if state == ParserState::Programme => {
                    state = ParserState::Title;
                    text_buf.clear();
                }
                b"desc" if state == ParserState::Programme => {
                    state = ParserState::Desc;
                    text_buf.clear();
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                let raw = String::from_utf8_lossy(e.as_ref()).to_string();
                match state {
                    ParserState::DisplayName | ParserState::Title | ParserState::Desc => {
                        text_buf.push_str(&decode_xml_entities(&raw));
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"channel" => {
                    state = ParserState::Root;
                    channel_id.clear();
                }
                b"programme" => {
                    if let Some((id, Some(start), Some(stop))) = programme.take() {
                        if !id.is_empty() {
                            index.programs.entry(id.clone()).or_default().push(ProgramEntry {
                                channel: id,
                                start,
                                stop,
                                title: title.trim().to_string(),
                                description: description.trim().to_string(),
                            });
                        }
                    }
                    state = ParserState::Root;
                }
                b"display-name" => {
                    if !channel_id.is_empty() {
                        let normalized = normalize_name(text_buf.trim());
                        if !normalized.is_empty() {
                            index
                                .names
                                .entry(channel_id.clone())
                                .or_default()
                                .insert(normalized);
                        }
                    }
                    state = ParserState::Channel;
                }
                b"title" => {
                    title = text_buf.clone();
                    state = ParserState::Programme;
                }
                b"desc" => {
                    description = text_buf.clone();
                    state = ParserState::Programme;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Decode(format!("guide feed XML: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    for programs in index.programs.values_mut() {
        programs.sort_by_key(|p| p.start);
    }

    debug!(
        channels = index.names.len(),
        programs = index.program_count(),
        "parsed guide feed"
    );

    Ok(index)
}

fn get_attribute(e: &BytesStart, name: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name {
            let raw = String::from_utf8(attr.value.as_ref().to_vec()).ok()?;
            return Some(decode_xml_entities(&raw));
        }
    }
    None
}

fn decode_xml_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

/// XMLTV timestamp: `YYYYMMDDHHMMSS ±HHMM`. A missing offset is read as
/// UTC; anything else unparseable yields `None` and the programme is
/// skipped.
fn parse_xmltv_time(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y%m%d%H%M%S %z") {
        return Some(dt);
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
}

/// On-disk cache of the last raw guide-feed response. One file, shared
/// process-wide, no locking: concurrent logins racing the refresh is an
/// accepted risk since logins are user-paced.
#[derive(Debug, Clone)]
pub struct GuideCache {
    path: PathBuf,
    ttl: Duration,
}

impl GuideCache {
    pub fn new(ttl_secs: u64) -> Result<Self> {
        let dir = dirs::cache_dir()
            .ok_or_else(|| Error::Validation("could not determine cache directory".into()))?
            .join("teleguide");
        Ok(Self::at(dir.join("epg.xml"), ttl_secs))
    }

    pub fn at(path: PathBuf, ttl_secs: u64) -> Self {
        Self {
            path,
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Raw cached bytes, only while the file's age is inside the freshness
    /// window.
    pub fn load_fresh(&self) -> Option<Vec<u8>> {
        let modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok()?;
        let age = modified.elapsed().ok()?;
        if age < self.ttl {
            fs::read(&self.path).ok()
        } else {
            None
        }
    }

    /// Persist the raw feed response verbatim.
    pub fn store(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, bytes)?;
        Ok(())
    }

    /// Delete the cache file. Used on re-login so the next fetch cannot
    /// serve the previous session's guide.
    pub fn invalidate(&self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("failed to delete guide cache {}: {e}", self.path.display());
            }
        }
    }
}

/// Owns the fetch-or-cache lifecycle for guide data.
#[derive(Debug, Clone)]
pub struct GuideStore {
    cache: GuideCache,
}

impl GuideStore {
    pub fn new(cache: GuideCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &GuideCache {
        &self.cache
    }

    /// Cached-or-fetched guide index. Transport errors propagate; a feed
    /// that fetches but does not parse degrades to an empty index so
    /// correlation reports "no data" instead of corrupted results.
    pub async fn fetch(&self, api: &crate::api::XtreamClient) -> Result<GuideIndex> {
        if let Some(bytes) = self.cache.load_fresh() {
            debug!("guide cache is fresh, skipping fetch");
            return Ok(parse_or_empty(&bytes));
        }

        let bytes = api.fetch_guide().await?;
        if let Err(e) = self.cache.store(&bytes) {
            warn!("failed to write guide cache: {e}");
        }
        Ok(parse_or_empty(&bytes))
    }
}

fn parse_or_empty(bytes: &[u8]) -> GuideIndex {
    parse_guide(bytes).unwrap_or_else(|e| {
        warn!("guide parse failed, using empty index: {e}");
        GuideIndex::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id=" CNN.us ">
    <display-name>CNN</display-name>
    <display-name>CNN HD</display-name>
  </channel>
  <channel id="bbc1.uk">
    <display-name>BBC One</display-name>
  </channel>
  <programme start="20260115110000 +0000" stop="20260115120000 +0000" channel="CNN.us">
    <title>Talk</title>
  </programme>
  <programme start="20260115100000 +0000" stop="20260115110000 +0000" channel="cnn.us">
    <title>News</title>
    <desc>Morning news &amp; weather</desc>
  </programme>
</tv>"#;

    #[test]
    fn parses_channels_and_programmes() {
        let index = parse_guide(SAMPLE.as_bytes()).unwrap();

        // ids trimmed and lowercased, both spellings collapse to one key
        let programs = index.programs_for("cnn.us").unwrap();
        assert_eq!(programs.len(), 2);

        // both display names normalize to "cnn"
        let names = &index.names["cnn.us"];
        assert_eq!(names.len(), 1);
        assert!(names.contains("cnn"));
        assert!(index.names["bbc1.uk"].contains("bbc one"));
    }

    #[test]
    fn programs_sorted_by_start_time() {
        let index = parse_guide(SAMPLE.as_bytes()).unwrap();
        let programs = index.programs_for("cnn.us").unwrap();
        assert_eq!(programs[0].title, "News");
        assert_eq!(programs[1].title, "Talk");
        assert_eq!(programs[0].description, "Morning news & weather");
        assert_eq!(programs[1].description, "");
    }

    #[test]
    fn malformed_timestamps_skip_the_programme() {
        let xml = r#"<tv>
  <programme start="not-a-time" stop="20260115120000 +0000" channel="c1"><title>Bad</title></programme>
  <programme start="20260115110000 +0000" stop="20260115120000 +0000" channel="c1"><title>Good</title></programme>
</tv>"#;
        let index = parse_guide(xml.as_bytes()).unwrap();
        let programs = index.programs_for("c1").unwrap();
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].title, "Good");
    }

    #[test]
    fn offsetless_timestamps_read_as_utc() {
        let dt = parse_xmltv_time("20260115110000").unwrap();
        assert_eq!(dt.timestamp(), parse_xmltv_time("20260115110000 +0000").unwrap().timestamp());

        let plus_one = parse_xmltv_time("20260115110000 +0100").unwrap();
        assert_eq!(dt.timestamp() - plus_one.timestamp(), 3600);
    }

    #[test]
    fn broken_xml_is_an_error_not_partial_data() {
        let xml = r#"<tv><programme start="20260115110000 +0000" stop="20260115120000 +0000" channel="c1"><title>Ok</title></programme><unclosed"#;
        assert!(parse_guide(xml.as_bytes()).is_err());
        assert!(parse_or_empty(xml.as_bytes()).is_empty());
    }

    #[test]
    fn cache_roundtrip_and_invalidate() {
        let path = std::env::temp_dir().join(format!("teleguide-test-{}.xml", std::process::id()));
        let cache = GuideCache::at(path.clone(), 3600);

        assert!(cache.load_fresh().is_none());
        cache.store(b"<tv/>").unwrap();
        assert_eq!(cache.load_fresh().unwrap(), b"<tv/>");

        cache.invalidate();
        assert!(cache.load_fresh().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn stale_cache_is_not_served() {
        let path = std::env::temp_dir().join(format!("teleguide-stale-{}.xml", std::process::id()));
        let cache = GuideCache::at(path.clone(), 0);
        cache.store(b"<tv/>").unwrap();
        // ttl of zero: anything already written is stale
        assert!(cache.load_fresh().is_none());
        cache.invalidate();
    }
}
