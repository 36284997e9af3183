// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::catalog::{Category, ContentType, SeriesInfoResponse, SeriesSummary, Stream};
use crate::config::HttpConfig;
use crate::error::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP verb used against the catalog API, selectable per provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Client for the catalog API and the guide feed of one provider.
#[derive(Debug, Clone)]
pub struct XtreamClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    method: HttpMethod,
    show_progress: bool,
}

impl XtreamClient {
    pub fn new(
        server_url: &str,
        username: String,
        password: String,
        method: HttpMethod,
        http: &HttpConfig,
    ) -> Result<Self> {
        let url = reqwest::Url::parse(server_url)
            .map_err(|e| Error::Validation(format!("invalid server URL {server_url}: {e}")))?;

        let host = url
            .host_str()
            .ok_or_else(|| Error::Validation(format!("server URL {server_url} has no host")))?;
        let base_url = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .user_agent(http.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url,
            username,
            password,
            method,
            show_progress: false,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn enable_progress(&mut self) {
        self.show_progress = true;
    }

    pub fn disable_progress(&mut self) {
        self.show_progress = false;
    }

    fn spinner(&self, message: &'static str) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed_precise}] {bytes}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    }

    /// One catalog API call, retried with doubling backoff on transport
    /// errors only. Decode and shape errors are never replayed.
    async fn fetch_action(&self, action: &str, extra: Option<(&str, &str)>) -> Result<Value> {
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;
        loop {
            match self.fetch_action_once(action, extra).await {
                Err(e) if e.is_transport() && attempt < RETRY_ATTEMPTS => {
                    warn!("attempt {attempt} for {action} failed ({e}), retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn fetch_action_once(&self, action: &str, extra: Option<(&str, &str)>) -> Result<Value> {
        let url = format!("{}/player_api.php", self.base_url);
        debug!("requesting {action} via {:?}", self.method);

        let pb = self.spinner("Fetching catalog data...");

        let request = match self.method {
            HttpMethod::Get => {
                let mut query = format!(
                    "username={}&password={}&action={}",
                    urlencoding::encode(&self.username),
                    urlencoding::encode(&self.password),
                    urlencoding::encode(action),
                );
                if let Some((key, value)) = extra {
                    query.push_str(&format!("&{key}={}", urlencoding::encode(value)));
                }
                self.client.get(format!("{url}?{query}"))
            }
            HttpMethod::Post => {
                let mut form: Vec<(&str, &str)> = vec![
                    ("username", self.username.as_str()),
                    ("password", self.password.as_str()),
                    ("action", action),
                ];
                if let Some(pair) = extra {
                    form.push(pair);
                }
                self.client.post(url).form(&form)
            }
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            return Err(Error::Transport(format!(
                "{action} failed with status {}",
                response.status()
            )));
        }

        let text = response.text().await?;
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        if text.trim().is_empty() {
            return Err(Error::Decode(format!("empty response for {action}")));
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// Catalog list endpoints must return a JSON array; anything else is a
    /// shape error, not a decode error.
    async fn fetch_list<T>(&self, action: &str, category_id: Option<&str>) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let extra = category_id.map(|id| ("category_id", id));
        let value = self.fetch_action(action, extra).await?;

        if !value.is_array() {
            return Err(Error::Validation(format!(
                "{action}: expected a list, got {}",
                json_kind(&value)
            )));
        }

        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_live_categories(&self) -> Result<Vec<Category>> {
        self.fetch_list("get_live_categories", None).await
    }

    pub async fn get_vod_categories(&self) -> Result<Vec<Category>> {
        self.fetch_list("get_vod_categories", None).await
    }

    pub async fn get_series_categories(&self) -> Result<Vec<Category>> {
        self.fetch_list("get_series_categories", None).await
    }

    pub async fn get_categories(&self, tab: ContentType) -> Result<Vec<Category>> {
        match tab {
            ContentType::Live => self.get_live_categories().await,
            ContentType::Movies => self.get_vod_categories().await,
            ContentType::Series => self.get_series_categories().await,
        }
    }

    pub async fn get_live_streams(&self, category_id: &str) -> Result<Vec<Stream>> {
        self.fetch_list("get_live_streams", Some(category_id)).await
    }

    pub async fn get_vod_streams(&self, category_id: &str) -> Result<Vec<Stream>> {
        self.fetch_list("get_vod_streams", Some(category_id)).await
    }

    pub async fn get_series(&self, category_id: &str) -> Result<Vec<SeriesSummary>> {
        self.fetch_list("get_series", Some(category_id)).await
    }

    pub async fn get_series_info(&self, series_id: u32) -> Result<SeriesInfoResponse> {
        let id = series_id.to_string();
        let value = self
            .fetch_action("get_series_info", Some(("series_id", &id)))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Raw guide feed bytes from `xmltv.php`, streamed so the spinner can
    /// report progress on what is often the largest response a provider
    /// serves.
    pub async fn fetch_guide(&self) -> Result<Vec<u8>> {
        let url = format!(
            "{}/xmltv.php?username={}&password={}",
            self.base_url,
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
        );

        let pb = self.spinner("Downloading guide feed...");

        let request = match self.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            if let Some(pb) = &pb {
                pb.finish_and_clear();
            }
            return Err(Error::Transport(format!(
                "guide feed failed with status {}",
                response.status()
            )));
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = futures_util::StreamExt::next(&mut stream).await {
            let chunk = chunk?;
            bytes.extend_from_slice(&chunk);
            if let Some(pb) = &pb {
                pb.set_position(bytes.len() as u64);
            }
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        debug!("guide feed: {} bytes", bytes.len());
        Ok(bytes)
    }

    /// Playback URL for a live channel or movie:
    /// `{server}/{live|movie}/{user}/{pass}/{id}.{ext}`.
    pub fn stream_url(&self, tab: ContentType, stream_id: u32, extension: Option<&str>) -> String {
        let ext = extension.unwrap_or("m3u8");
        format!(
            "{}/{}/{}/{}/{}.{}",
            self.base_url,
            tab.stream_path(),
            self.username,
            self.password,
            stream_id,
            ext
        )
    }

    /// Playback URL for a series episode.
    pub fn episode_url(&self, episode_id: &str, extension: Option<&str>) -> String {
        let ext = extension.unwrap_or("m3u8");
        format!(
            "{}/series/{}/{}/{}.{}",
            self.base_url, self.username, self.password, episode_id, ext
        )
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> XtreamClient {
        XtreamClient::new(
            "http://example.com:8080",
            "user".into(),
            "pass".into(),
            HttpMethod::Get,
            &HttpConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn base_url_keeps_scheme_host_and_port() {
        assert_eq!(client().base_url(), "http://example.com:8080");

        let no_port = XtreamClient::new(
            "https://example.com/some/path",
            "u".into(),
            "p".into(),
            HttpMethod::Get,
            &HttpConfig::default(),
        )
        .unwrap();
        assert_eq!(no_port.base_url(), "https://example.com");
    }

    #[test]
    fn invalid_server_url_is_a_validation_error() {
        let err = XtreamClient::new(
            "not a url",
            "u".into(),
            "p".into(),
            HttpMethod::Get,
            &HttpConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn stream_urls_default_to_m3u8() {
        let c = client();
        assert_eq!(
            c.stream_url(ContentType::Live, 42, None),
            "http://example.com:8080/live/user/pass/42.m3u8"
        );
        assert_eq!(
            c.stream_url(ContentType::Movies, 7, Some("mkv")),
            "http://example.com:8080/movie/user/pass/7.mkv"
        );
        assert_eq!(
            c.episode_url("9913", Some("mp4")),
            "http://example.com:8080/series/user/pass/9913.mp4"
        );
        assert_eq!(
            c.episode_url("9913", None),
            "http://example.com:8080/series/user/pass/9913.m3u8"
        );
    }
}
