// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::catalog::Stream;
use crate::epg::{GuideIndex, ProgramEntry};
use crate::normalize::normalize_name;
use chrono::{DateTime, FixedOffset, Local};
use std::collections::HashMap;

/// String-similarity seam, so the algorithm and acceptance threshold are
/// swappable and testable independently of the resolver.
pub trait NameMatcher {
    /// Similarity ratio in `[0, 1]`.
    fn ratio(&self, a: &str, b: &str) -> f64;
}

/// Longest-common-block ratio: `2 * matches / (len(a) + len(b))`, where
/// `matches` is the total length of the recursively-found longest common
/// blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockMatcher;

impl NameMatcher for BlockMatcher {
    fn ratio(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let total = a.len() + b.len();
        if total == 0 {
            return 1.0;
        }
        2.0 * matching_total(&a, &b) as f64 / total as f64
    }
}

fn matching_total(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (ai, bi, len) = longest_match(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_total(&a[..ai], &b[..bi]) + matching_total(&a[ai + len..], &b[bi + len..])
}

// Earliest-position longest common block, found by walking `a` and keeping
// run lengths per position of `b`.
fn longest_match(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut b_positions: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, ch) in b.iter().enumerate() {
        b_positions.entry(*ch).or_default().push(j);
    }

    let mut best = (0, 0, 0);
    let mut run_lengths: HashMap<usize, usize> = HashMap::new();
    for (i, ch) in a.iter().enumerate() {
        let mut next_runs = HashMap::new();
        if let Some(positions) = b_positions.get(ch) {
            for &j in positions {
                let len = if j == 0 {
                    1
                } else {
                    run_lengths.get(&(j - 1)).copied().unwrap_or(0) + 1
                };
                next_runs.insert(j, len);
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            }
        }
        run_lengths = next_runs;
    }
    best
}

/// The program to show for a channel at a given instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NowPlaying<'a> {
    /// `now` falls inside this program's interval.
    Current(&'a ProgramEntry),
    /// Nothing airing; this is the next program to start.
    Upcoming(&'a ProgramEntry),
    None,
}

/// Annotation text for a channel row, plus an optional tooltip carrying the
/// program description.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub label: String,
    pub tooltip: Option<String>,
}

pub const NO_DATA_LABEL: &str = "No program data";

impl Annotation {
    fn no_data() -> Self {
        Annotation {
            label: NO_DATA_LABEL.to_string(),
            tooltip: None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.label != NO_DATA_LABEL
    }
}

/// Maps catalog channels to guide channels and resolves what is airing.
///
/// Resolution order: exact guide-channel-id lookup, then the configured id
/// override map, then fuzzy name matching above the acceptance threshold.
pub struct CorrelationResolver<M = BlockMatcher> {
    matcher: M,
    threshold: f64,
    id_overrides: HashMap<String, String>,
}

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.6;

impl CorrelationResolver<BlockMatcher> {
    pub fn new(threshold: f64) -> Self {
        Self::with_matcher(BlockMatcher, threshold)
    }
}

impl Default for CorrelationResolver<BlockMatcher> {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl<M: NameMatcher> CorrelationResolver<M> {
    pub fn with_matcher(matcher: M, threshold: f64) -> Self {
        Self {
            matcher,
            threshold,
            id_overrides: HashMap::new(),
        }
    }

    /// Explicit catalog-id to guide-id mappings, consulted when the exact
    /// lookup misses but before falling back to name matching.
    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.id_overrides = overrides
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_lowercase()))
            .collect();
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The program list for a catalog channel, if any guide channel
    /// correlates with it.
    pub fn resolve_channel<'a>(
        &self,
        channel: &Stream,
        index: &'a GuideIndex,
    ) -> Option<&'a [ProgramEntry]> {
        if let Some(id) = channel.epg_channel_id.as_deref() {
            if let Some(programs) = index.programs_for(id) {
                return Some(programs);
            }
            if let Some(mapped) = self.id_overrides.get(id) {
                if let Some(programs) = index.programs_for(mapped) {
                    return Some(programs);
                }
            }
        }

        let name = normalize_name(&channel.name);
        let id = self.best_name_match(&name, index)?;
        index.programs_for(id)
    }

    /// Best-scoring guide channel for a normalized name, accepted only
    /// above the threshold.
    pub fn best_name_match<'a>(&self, name: &str, index: &'a GuideIndex) -> Option<&'a str> {
        if name.is_empty() {
            return None;
        }

        let mut best: Option<(&str, f64)> = None;
        for (candidate, id) in index.name_candidates() {
            let ratio = self.matcher.ratio(name, candidate);
            if best.map_or(true, |(_, r)| ratio > r) {
                best = Some((id, ratio));
            }
        }

        best.and_then(|(id, ratio)| (ratio > self.threshold).then_some(id))
    }

    /// Scan a (start-sorted) program list: the program containing `now`,
    /// else the first one starting after `now`.
    pub fn now_playing<'a>(
        &self,
        programs: &'a [ProgramEntry],
        now: DateTime<FixedOffset>,
    ) -> NowPlaying<'a> {
        let mut upcoming = None;
        for program in programs {
            if program.start <= now && now <= program.stop {
                return NowPlaying::Current(program);
            }
            if upcoming.is_none() && program.start > now {
                upcoming = Some(program);
            }
        }
        match upcoming {
            Some(program) => NowPlaying::Upcoming(program),
            None => NowPlaying::None,
        }
    }

    /// Full correlation for one channel row: label plus tooltip, or the
    /// fixed no-data annotation when nothing correlates.
    pub fn annotate(
        &self,
        channel: &Stream,
        index: &GuideIndex,
        now: DateTime<FixedOffset>,
    ) -> Annotation {
        let Some(programs) = self.resolve_channel(channel, index) else {
            return Annotation::no_data();
        };

        let (program, prefix) = match self.now_playing(programs, now) {
            NowPlaying::Current(p) => (p, ""),
            NowPlaying::Upcoming(p) => (p, "Next: "),
            NowPlaying::None => return Annotation::no_data(),
        };

        Annotation {
            label: format!(
                "{prefix}{} ({} - {})",
                program.title,
                local_clock(program.start),
                local_clock(program.stop),
            ),
            tooltip: (!program.description.is_empty()).then(|| program.description.clone()),
        }
    }
}

// Feed timestamps carry their own offsets; display always happens in the
// viewer's local zone.
fn local_clock(t: DateTime<FixedOffset>) -> String {
    t.with_timezone(&Local).format("%I:%M %p").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::{BTreeMap, BTreeSet};

    fn dt(hour: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 1, 15, hour, min, 0)
            .unwrap()
    }

    fn program(channel: &str, start: DateTime<FixedOffset>, stop: DateTime<FixedOffset>, title: &str) -> ProgramEntry {
        ProgramEntry {
            channel: channel.into(),
            start,
            stop,
            title: title.into(),
            description: String::new(),
        }
    }

    fn cnn_index() -> GuideIndex {
        let mut index = GuideIndex::default();
        index.programs.insert(
            "cnn.us".into(),
            vec![
                program("cnn.us", dt(10, 0), dt(11, 0), "News"),
                program("cnn.us", dt(11, 0), dt(12, 0), "Talk"),
            ],
        );
        let mut names = BTreeMap::new();
        names.insert("cnn.us".to_string(), BTreeSet::from(["cnn".to_string()]));
        index.names = names;
        index
    }

    fn channel(name: &str, guide_id: Option<&str>) -> Stream {
        Stream {
            name: name.into(),
            stream_id: 1,
            epg_channel_id: guide_id.map(|s| s.to_string()),
            category_id: None,
            container_extension: None,
        }
    }

    #[test]
    fn ratio_bounds() {
        let m = BlockMatcher;
        assert_eq!(m.ratio("cnn", "cnn"), 1.0);
        assert_eq!(m.ratio("", ""), 1.0);
        assert_eq!(m.ratio("abc", "xyz"), 0.0);
        let r = m.ratio("fox sports 1", "cnn");
        assert!(r > 0.0 && r < 0.6, "ratio was {r}");
    }

    #[test]
    fn ratio_counts_all_common_blocks() {
        // blocks "ab" and "cd" both match: 2 * 4 / 10
        assert_eq!(BlockMatcher.ratio("abxcd", "abycd"), 0.8);
        assert_eq!(BlockMatcher.ratio("abcd", "abcd"), 1.0);
    }

    #[test]
    fn exact_id_match_wins_over_name() {
        let index = cnn_index();
        let resolver = CorrelationResolver::default();
        let entry = channel("Something Else Entirely", Some("cnn.us"));
        let programs = resolver.resolve_channel(&entry, &index).unwrap();
        assert_eq!(programs[0].title, "News");
    }

    #[test]
    fn override_map_is_consulted_before_fuzzy_fallback() {
        let index = cnn_index();
        let resolver = CorrelationResolver::default()
            .with_overrides(HashMap::from([("CNN".to_string(), "cnn.us".to_string())]));
        let entry = channel("Totally Unrelated", Some("cnn"));
        assert!(resolver.resolve_channel(&entry, &index).is_some());
    }

    #[test]
    fn fuzzy_name_fallback_matches_cnn() {
        // entry has no guide id; "CNN" normalizes to "cnn", similarity 1.0
        let index = cnn_index();
        let resolver = CorrelationResolver::default();
        let entry = channel("CNN", None);

        let programs = resolver.resolve_channel(&entry, &index).unwrap();
        let playing = resolver.now_playing(programs, dt(10, 30));
        match playing {
            NowPlaying::Current(p) => assert_eq!(p.title, "News"),
            other => panic!("expected current program, got {other:?}"),
        }
    }

    #[test]
    fn before_all_intervals_reports_first_upcoming() {
        let index = cnn_index();
        let resolver = CorrelationResolver::default();
        let programs = resolver.resolve_channel(&channel("CNN", None), &index).unwrap();
        match resolver.now_playing(programs, dt(9, 0)) {
            NowPlaying::Upcoming(p) => assert_eq!(p.title, "News"),
            other => panic!("expected upcoming program, got {other:?}"),
        }
        let annotation = resolver.annotate(&channel("CNN", None), &index, dt(9, 0));
        assert!(annotation.label.starts_with("Next: News"));
    }

    #[test]
    fn after_all_intervals_reports_none() {
        let index = cnn_index();
        let resolver = CorrelationResolver::default();
        let programs = resolver.resolve_channel(&channel("CNN", None), &index).unwrap();
        assert_eq!(resolver.now_playing(programs, dt(13, 0)), NowPlaying::None);
    }

    #[test]
    fn below_threshold_is_no_data_with_no_tooltip() {
        let index = cnn_index();
        let resolver = CorrelationResolver::default();
        let entry = channel("Fox Sports 1", None);

        assert!(resolver.resolve_channel(&entry, &index).is_none());
        let annotation = resolver.annotate(&entry, &index, dt(10, 30));
        assert_eq!(annotation.label, NO_DATA_LABEL);
        assert_eq!(annotation.tooltip, None);
        assert!(!annotation.has_data());
    }

    #[test]
    fn raising_threshold_never_accepts_more() {
        let index = cnn_index();
        let names = ["CNN", "CNN HD", "CN", "Fox Sports 1", "BBC One"];

        let accepted_at = |threshold: f64| -> usize {
            let resolver = CorrelationResolver::new(threshold);
            names
                .iter()
                .filter(|n| resolver.best_name_match(&normalize_name(n), &index).is_some())
                .count()
        };

        let mut previous = usize::MAX;
        for threshold in [0.0, 0.3, 0.6, 0.9, 1.0] {
            let count = accepted_at(threshold);
            assert!(count <= previous, "threshold {threshold} accepted more matches");
            previous = count;
        }
    }

    #[test]
    fn resolution_is_deterministic() {
        let index = cnn_index();
        let resolver = CorrelationResolver::default();
        let entry = channel("CNN", None);
        let first = resolver.annotate(&entry, &index, dt(10, 30));
        for _ in 0..10 {
            assert_eq!(resolver.annotate(&entry, &index, dt(10, 30)), first);
        }
    }

    #[test]
    fn tooltip_carries_the_description() {
        let mut index = cnn_index();
        index.programs.get_mut("cnn.us").unwrap()[0].description = "Morning news".into();
        let resolver = CorrelationResolver::default();
        let annotation = resolver.annotate(&channel("CNN", None), &index, dt(10, 30));
        assert_eq!(annotation.tooltip.as_deref(), Some("Morning news"));
    }
}
