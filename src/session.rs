// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::api::XtreamClient;
use crate::catalog::{CatalogStore, ContentType, SeriesSummary, Stream};
use crate::config::GuideConfig;
use crate::correlate::CorrelationResolver;
use crate::epg::{GuideIndex, GuideStore};
use crate::error::{Error, Result};
use crate::navigation::{NavigationStack, Payload, Row, View};
use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginType {
    Xtream,
    M3uPlus,
}

/// Credentials of the active login. Never partially updated: a new login
/// builds a new session.
#[derive(Debug, Clone)]
pub struct Session {
    pub server: String,
    pub username: String,
    pub password: String,
    pub login_type: LoginType,
}

/// Extract credentials from an M3U playlist URL of the form
/// `{server}/get.php?username=..&password=..&type=m3u_plus`.
pub fn credentials_from_m3u_url(input: &str) -> Result<Session> {
    let url = url::Url::parse(input.trim())
        .map_err(|e| Error::Validation(format!("invalid M3U URL: {e}")))?;

    if !url.path().ends_with("/get.php") {
        return Err(Error::Validation("not a get.php playlist URL".into()));
    }

    let mut username = None;
    let mut password = None;
    let mut kind = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "username" => username = Some(value.into_owned()),
            "password" => password = Some(value.into_owned()),
            "type" => kind = Some(value.into_owned()),
            _ => {}
        }
    }

    match kind.as_deref() {
        Some("m3u_plus" | "m3u" | "m3u8") => {}
        _ => return Err(Error::Validation("unsupported playlist type".into())),
    }

    let host = url
        .host_str()
        .ok_or_else(|| Error::Validation("M3U URL has no host".into()))?;
    let server = match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    };

    Ok(Session {
        server,
        username: username.ok_or_else(|| Error::Validation("M3U URL has no username".into()))?,
        password: password.ok_or_else(|| Error::Validation("M3U URL has no password".into()))?,
        login_type: LoginType::M3uPlus,
    })
}

/// Navigation stack and top-level catalog of one tab.
#[derive(Debug, Default)]
pub struct TabState {
    pub nav: NavigationStack,
    pub catalog: CatalogStore,
}

/// All state belonging to one login: per-tab navigation and catalogs, the
/// shared guide index, and the generation stamp that fences off results
/// from earlier logins.
///
/// The guide index has one writer (the background fetch, via
/// [`SessionContext::apply_guide_update`]) and many readers; it is replaced
/// wholesale behind an `Arc`, never edited in place.
pub struct SessionContext {
    pub session: Session,
    pub generation: u64,
    live: TabState,
    movies: TabState,
    series: TabState,
    guide: Option<Arc<GuideIndex>>,
    resolver: CorrelationResolver,
}

impl SessionContext {
    /// Empty context for a session; `login` is the populated variant.
    pub fn new(session: Session, generation: u64) -> Self {
        Self::with_guide_config(session, generation, &GuideConfig::default())
    }

    pub fn with_guide_config(session: Session, generation: u64, guide: &GuideConfig) -> Self {
        Self {
            session,
            generation,
            live: TabState::default(),
            movies: TabState::default(),
            series: TabState::default(),
            guide: None,
            resolver: CorrelationResolver::new(guide.match_threshold)
                .with_overrides(guide.id_overrides.clone()),
        }
    }

    /// Fetch all three top-level category lists and build a fresh context.
    /// Nothing is mutated on failure; the caller keeps its old context.
    pub async fn login(
        api: &XtreamClient,
        session: Session,
        generation: u64,
        guide: &GuideConfig,
    ) -> Result<Self> {
        let live = api.get_live_categories().await?;
        let movies = api.get_vod_categories().await?;
        let series = api.get_series_categories().await?;

        let mut ctx = Self::with_guide_config(session, generation, guide);
        ctx.live.catalog.set_categories(live);
        ctx.movies.catalog.set_categories(movies);
        ctx.series.catalog.set_categories(series);
        Ok(ctx)
    }

    pub fn tab(&self, tab: ContentType) -> &TabState {
        match tab {
            ContentType::Live => &self.live,
            ContentType::Movies => &self.movies,
            ContentType::Series => &self.series,
        }
    }

    pub fn tab_mut(&mut self, tab: ContentType) -> &mut TabState {
        match tab {
            ContentType::Live => &mut self.live,
            ContentType::Movies => &mut self.movies,
            ContentType::Series => &mut self.series,
        }
    }

    pub fn resolver(&self) -> &CorrelationResolver {
        &self.resolver
    }

    pub fn guide(&self) -> Option<&Arc<GuideIndex>> {
        self.guide.as_ref()
    }

    /// Install a freshly fetched guide index if it belongs to this login.
    /// Stale updates are dropped, not merged.
    pub fn apply_guide_update(&mut self, update: GuideUpdate) -> bool {
        if update.generation != self.generation {
            debug!(
                "discarding guide update for generation {} (current {})",
                update.generation, self.generation
            );
            return false;
        }
        match update.result {
            Ok(index) => {
                self.guide = Some(Arc::new(index));
                true
            }
            Err(e) => {
                warn!("guide fetch failed: {e}");
                false
            }
        }
    }

    /// Drill from the category list into one category. Fetches the next
    /// level, then pushes a frame; a failed fetch leaves the tab exactly
    /// where it was.
    pub async fn open_category(
        &mut self,
        api: &XtreamClient,
        tab: ContentType,
        category_id: &str,
        current_scroll: usize,
    ) -> Result<()> {
        if self.tab(tab).catalog.find_category(category_id).is_none() {
            return Err(Error::NotFound(format!("category {category_id}")));
        }

        let payload = match tab {
            ContentType::Live => {
                let mut entries = api.get_live_streams(category_id).await?;
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                Payload::Channels { entries }
            }
            ContentType::Movies => {
                let mut entries = api.get_vod_streams(category_id).await?;
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                Payload::Channels { entries }
            }
            ContentType::Series => {
                let mut entries = api.get_series(category_id).await?;
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                Payload::SeriesList { entries }
            }
        };

        self.tab_mut(tab).nav.push(payload, current_scroll);
        Ok(())
    }

    /// Drill from the series list into one series: fetch its seasons and
    /// episodes, keeping every season's episodes on the frame so the next
    /// level needs no fetch.
    pub async fn open_series(
        &mut self,
        api: &XtreamClient,
        series_id: u32,
        current_scroll: usize,
    ) -> Result<()> {
        let series = self.series_at_top(series_id)?;

        let info = api.get_series_info(series_id).await?;
        let seasons = info.season_numbers();
        let episodes: HashMap<u32, Vec<_>> = seasons
            .iter()
            .map(|&n| (n, info.episodes_for_season(n)))
            .collect();

        self.series.nav.push(
            Payload::Seasons {
                series,
                seasons,
                episodes,
            },
            current_scroll,
        );
        Ok(())
    }

    fn series_at_top(&self, series_id: u32) -> Result<SeriesSummary> {
        match self.series.nav.peek().map(|f| &f.payload) {
            Some(Payload::SeriesList { entries }) => entries
                .iter()
                .find(|s| s.series_id == series_id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("series {series_id}"))),
            _ => Err(Error::Validation(
                "not currently at a series list".into(),
            )),
        }
    }

    /// Drill from the season list into one season. Pure state transition:
    /// the episodes were fetched with the seasons.
    pub fn open_season(&mut self, season: u32, current_scroll: usize) -> Result<()> {
        let (series_name, entries) = match self.series.nav.peek().map(|f| &f.payload) {
            Some(Payload::Seasons {
                series,
                seasons,
                episodes,
            }) => {
                if !seasons.contains(&season) {
                    return Err(Error::NotFound(format!("season {season}")));
                }
                (
                    series.name.clone(),
                    episodes.get(&season).cloned().unwrap_or_default(),
                )
            }
            _ => return Err(Error::Validation("not currently at a season list".into())),
        };

        self.series.nav.push(
            Payload::Episodes {
                series_name,
                entries,
            },
            current_scroll,
        );
        Ok(())
    }

    /// The only way a level is ever left: back out exactly one step.
    pub fn go_back(&mut self, tab: ContentType) -> View<'_> {
        self.tab_mut(tab).nav.pop()
    }

    /// Re-fetch a tab's top-level categories and drop its drill-down state.
    /// The old categories survive a failed fetch.
    pub async fn refresh_categories(&mut self, api: &XtreamClient, tab: ContentType) -> Result<()> {
        let categories = api.get_categories(tab).await?;
        let state = self.tab_mut(tab);
        state.nav.reset();
        state.catalog.set_categories(categories);
        Ok(())
    }

    pub fn visible_rows(&self, tab: ContentType) -> Vec<Row<'_>> {
        let state = self.tab(tab);
        state.nav.visible_rows(state.catalog.categories(), tab)
    }

    /// Display label for a live channel row, with the guide annotation
    /// appended once guide data is available. Returns the label and the
    /// tooltip, if any.
    pub fn channel_label(
        &self,
        channel: &Stream,
        now: DateTime<FixedOffset>,
    ) -> (String, Option<String>) {
        match &self.guide {
            Some(index) => {
                let annotation = self.resolver.annotate(channel, index, now);
                (
                    format!("{} - {}", channel.name, annotation.label),
                    annotation.tooltip,
                )
            }
            None => (channel.name.clone(), None),
        }
    }
}

/// Replace one login with the next. The old session's guide fetch is
/// aborted and the cache file dropped before anything new is fetched, so a
/// result from the previous login can never surface in the new one; its
/// generation stamp would be rejected anyway.
pub async fn relogin(
    api: &XtreamClient,
    session: Session,
    previous_generation: u64,
    fetcher: &mut GuideFetcher,
    store: &GuideStore,
    guide: &GuideConfig,
) -> Result<SessionContext> {
    fetcher.cancel();
    store.cache().invalidate();
    SessionContext::login(api, session, previous_generation + 1, guide).await
}

/// Completion message of a background guide fetch, stamped with the
/// generation of the login that started it.
#[derive(Debug)]
pub struct GuideUpdate {
    pub generation: u64,
    pub result: Result<GuideIndex>,
}

/// Runs guide fetches off the interactive path. At most one fetch is live
/// at a time; starting a new one (or logging in again) aborts the previous
/// task, and the generation stamp lets receivers drop anything that still
/// slips through.
pub struct GuideFetcher {
    permits: Arc<Semaphore>,
    handle: Option<JoinHandle<()>>,
}

impl GuideFetcher {
    pub fn new(pool_size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
            handle: None,
        }
    }

    pub fn spawn(
        &mut self,
        api: XtreamClient,
        store: GuideStore,
        generation: u64,
        tx: mpsc::Sender<GuideUpdate>,
    ) {
        self.cancel();
        let permits = Arc::clone(&self.permits);
        self.handle = Some(tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let result = store.fetch(&api).await;
            let _ = tx.send(GuideUpdate { generation, result }).await;
        }));
    }

    /// Abort the in-flight fetch, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for GuideFetcher {
    fn drop(&mut self) {
        self.cancel();
    }
}
