use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::config::{Config, GAME_ID};
use crate::error::{AppError, Result};

/// The FACEIT calls the resolver and the stats aggregator depend on.
/// `Ok(None)` means the upstream answered 404.
#[async_trait]
pub trait FaceitApi: Send + Sync {
    async fn player_by_nickname(&self, nickname: &str) -> Result<Option<Value>>;

    async fn player(&self, player_id: &str) -> Result<Option<Value>>;

    /// `payload` of the web API's `groupByState` listing.
    async fn match_groups(&self, player_id: &str) -> Result<Value>;

    async fn match_details(&self, match_id: &str) -> Result<Option<Value>>;

    async fn recent_match_stats(&self, player_id: &str, limit: u32) -> Result<Option<Value>>;
}

/// reqwest-backed client. Every call is bounded by the configured upstream
/// timeout and attempted once.
pub struct HttpFaceitApi {
    client: reqwest::Client,
    api_key: String,
    data_api_url: String,
    web_api_url: String,
}

impl HttpFaceitApi {
    pub fn new(cfg: &Config) -> Result<Self> {
        let api_key = cfg.require_api_key()?.to_string();
        let client = reqwest::Client::builder()
            .timeout(cfg.upstream_timeout)
            .connect_timeout(cfg.upstream_timeout)
            .user_agent(concat!("faceit-winprob/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_key,
            data_api_url: cfg.data_api_url.trim_end_matches('/').to_string(),
            web_api_url: cfg.web_api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_data(&self, path: &str, query: &[(&str, String)]) -> Result<Option<Value>> {
        let url = format!("{}{}", self.data_api_url, path);
        let req = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query);
        send_json(req, &url).await
    }
}

async fn send_json(req: reqwest::RequestBuilder, url: &str) -> Result<Option<Value>> {
    let resp = req.send().await.map_err(|e| upstream(url, e))?;
    let status = resp.status();
    debug!(url, status = status.as_u16(), "upstream response");

    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AppError::UpstreamUnavailable(format!("{url}: rate limited (429)")));
    }
    if !status.is_success() {
        return Err(AppError::UpstreamUnavailable(format!("{url}: HTTP {status}")));
    }
    let body = resp.json::<Value>().await.map_err(|e| upstream(url, e))?;
    Ok(Some(body))
}

fn upstream(url: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::UpstreamUnavailable(format!("{url}: timed out"))
    } else {
        AppError::UpstreamUnavailable(format!("{url}: {e}"))
    }
}

#[async_trait]
impl FaceitApi for HttpFaceitApi {
    async fn player_by_nickname(&self, nickname: &str) -> Result<Option<Value>> {
        self.get_data(
            "/players",
            &[("nickname", nickname.to_string()), ("game", GAME_ID.to_string())],
        )
        .await
    }

    async fn player(&self, player_id: &str) -> Result<Option<Value>> {
        self.get_data(&format!("/players/{player_id}"), &[]).await
    }

    async fn match_groups(&self, player_id: &str) -> Result<Value> {
        let url = format!("{}/api/match/v1/matches/groupByState", self.web_api_url);
        let req = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("userId", player_id)]);
        let body = send_json(req, &url).await?.unwrap_or(Value::Null);
        Ok(body.get("payload").cloned().unwrap_or(Value::Null))
    }

    async fn match_details(&self, match_id: &str) -> Result<Option<Value>> {
        self.get_data(&format!("/matches/{match_id}"), &[]).await
    }

    async fn recent_match_stats(&self, player_id: &str, limit: u32) -> Result<Option<Value>> {
        self.get_data(
            &format!("/players/{player_id}/games/{GAME_ID}/stats"),
            &[("limit", limit.to_string()), ("offset", "0".to_string())],
        )
        .await
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory upstream used by resolver, aggregator and compute tests.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    pub struct FakeFaceit {
        pub players_by_nickname: HashMap<String, Value>,
        pub players: HashMap<String, Value>,
        pub groups: HashMap<String, Value>,
        pub matches: HashMap<String, Value>,
        pub stats: HashMap<String, Value>,
        /// Player ids whose stats call fails.
        pub failing_stats: Vec<String>,
        pub delay: Option<Duration>,
        pub calls: AtomicUsize,
    }

    impl FakeFaceit {
        async fn enter(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
        }
    }

    #[async_trait]
    impl FaceitApi for FakeFaceit {
        async fn player_by_nickname(&self, nickname: &str) -> Result<Option<Value>> {
            self.enter().await;
            Ok(self.players_by_nickname.get(nickname).cloned())
        }

        async fn player(&self, player_id: &str) -> Result<Option<Value>> {
            self.enter().await;
            Ok(self.players.get(player_id).cloned())
        }

        async fn match_groups(&self, player_id: &str) -> Result<Value> {
            self.enter().await;
            self.groups
                .get(player_id)
                .cloned()
                .ok_or_else(|| AppError::UpstreamUnavailable("groupByState: HTTP 503".into()))
        }

        async fn match_details(&self, match_id: &str) -> Result<Option<Value>> {
            self.enter().await;
            Ok(self.matches.get(match_id).cloned())
        }

        async fn recent_match_stats(&self, player_id: &str, _limit: u32) -> Result<Option<Value>> {
            self.enter().await;
            if self.failing_stats.iter().any(|p| p == player_id) {
                return Err(AppError::UpstreamUnavailable(format!("stats {player_id}: HTTP 500")));
            }
            Ok(self.stats.get(player_id).cloned())
        }
    }
}
