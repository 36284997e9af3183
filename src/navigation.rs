// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::catalog::{Category, CatalogEntry, ContentType, Episode, SeriesSummary, Stream};
use std::collections::HashMap;

/// Drill-down level currently visible in a tab. `Categories` is the
/// top level and never sits on the stack; it is what an empty stack renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Categories,
    Channels,
    SeriesList,
    Seasons,
    Episodes,
}

/// Everything a level needs to re-render itself when it becomes the top of
/// the stack again. Popping never re-fetches.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Live channels or movies inside one category.
    Channels { entries: Vec<Stream> },
    /// Series inside one category.
    SeriesList { entries: Vec<SeriesSummary> },
    /// Season numbers of one series, with every season's episodes kept so
    /// drilling further needs no fetch.
    Seasons {
        series: SeriesSummary,
        seasons: Vec<u32>,
        episodes: HashMap<u32, Vec<Episode>>,
    },
    /// Episodes of one season.
    Episodes {
        series_name: String,
        entries: Vec<Episode>,
    },
}

impl Payload {
    pub fn level(&self) -> Level {
        match self {
            Payload::Channels { .. } => Level::Channels,
            Payload::SeriesList { .. } => Level::SeriesList,
            Payload::Seasons { .. } => Level::Seasons,
            Payload::Episodes { .. } => Level::Episodes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub level: Level,
    pub payload: Payload,
    pub scroll: usize,
}

/// What a tab should render right now: either the top-level category list
/// or the payload of the top frame, each with its remembered scroll
/// position.
#[derive(Debug)]
pub enum View<'a> {
    TopLevel { scroll: usize },
    Frame(&'a Frame),
}

impl View<'_> {
    pub fn level(&self) -> Level {
        match self {
            View::TopLevel { .. } => Level::Categories,
            View::Frame(frame) => frame.level,
        }
    }

    pub fn scroll(&self) -> usize {
        match self {
            View::TopLevel { scroll } => *scroll,
            View::Frame(frame) => frame.scroll,
        }
    }
}

/// One list row. "Go Back" is a navigation action in its own right, not a
/// magic item mixed into catalog data.
#[derive(Debug, Clone, Copy)]
pub enum Row<'a> {
    GoBack,
    Item(CatalogEntry<'a>),
    Placeholder(&'static str),
}

impl Row<'_> {
    pub fn display_text(&self) -> String {
        match self {
            Row::GoBack => "Go Back".to_string(),
            Row::Item(entry) => entry.display_name(),
            Row::Placeholder(text) => (*text).to_string(),
        }
    }

    pub fn is_selectable(&self) -> bool {
        !matches!(self, Row::Placeholder(_))
    }
}

/// Per-tab drill-down stack. The stack itself is level-agnostic; how deep a
/// tab goes is a property of what its caller pushes.
///
/// The top-level scroll position is tracked separately because the category
/// list has no frame of its own.
#[derive(Debug, Clone, Default)]
pub struct NavigationStack {
    frames: Vec<Frame>,
    top_level_scroll: usize,
}

impl NavigationStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record where the user currently is, then enter the next level. The
    /// new frame starts at the top of its list.
    pub fn push(&mut self, payload: Payload, current_scroll: usize) {
        self.record_scroll(current_scroll);
        let level = payload.level();
        self.frames.push(Frame {
            level,
            payload,
            scroll: 0,
        });
    }

    /// Leave the current level. Returns what to render next; popping with
    /// nothing stacked just re-renders the top level.
    pub fn pop(&mut self) -> View<'_> {
        self.frames.pop();
        self.current()
    }

    pub fn current(&self) -> View<'_> {
        match self.frames.last() {
            Some(frame) => View::Frame(frame),
            None => View::TopLevel {
                scroll: self.top_level_scroll,
            },
        }
    }

    pub fn peek(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Update the remembered scroll position of whatever is visible.
    pub fn record_scroll(&mut self, position: usize) {
        match self.frames.last_mut() {
            Some(frame) => frame.scroll = position,
            None => self.top_level_scroll = position,
        }
    }

    /// Drop all frames and forget scroll positions. Used on logout,
    /// re-login, and explicit category refresh.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.top_level_scroll = 0;
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn level(&self) -> Level {
        self.current().level()
    }

    /// The rows the tab renders right now: categories when the stack is
    /// empty, otherwise a Go Back action followed by the top frame's items.
    pub fn visible_rows<'a>(
        &'a self,
        categories: &'a [Category],
        tab: ContentType,
    ) -> Vec<Row<'a>> {
        match self.frames.last() {
            None => categories.iter().map(|c| Row::Item(CatalogEntry::Category(c))).collect(),
            Some(frame) => {
                let mut rows = vec![Row::GoBack];
                rows.extend(payload_rows(&frame.payload, tab));
                rows
            }
        }
    }
}

fn payload_rows<'a>(payload: &'a Payload, tab: ContentType) -> Vec<Row<'a>> {
    match payload {
        Payload::Channels { entries } => entries
            .iter()
            .map(|s| {
                Row::Item(match tab {
                    ContentType::Live => CatalogEntry::Channel(s),
                    _ => CatalogEntry::Movie(s),
                })
            })
            .collect(),
        Payload::SeriesList { entries } => entries
            .iter()
            .map(|s| Row::Item(CatalogEntry::Series(s)))
            .collect(),
        Payload::Seasons { series, seasons, .. } => seasons
            .iter()
            .map(|n| Row::Item(CatalogEntry::Season(series, *n)))
            .collect(),
        Payload::Episodes { series_name, entries } => entries
            .iter()
            .map(|e| {
                Row::Item(CatalogEntry::Episode {
                    series: series_name,
                    episode: e,
                })
            })
            .collect(),
    }
}
