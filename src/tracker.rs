use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::TREND_DEAD_BAND_PCT;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Up => write!(f, "up"),
            Trend::Down => write!(f, "down"),
            Trend::Flat => write!(f, "flat"),
        }
    }
}

/// Classify a change in percentage points; moves inside the dead-band are flat.
pub fn trend(delta_pct: f64) -> Trend {
    if delta_pct > TREND_DEAD_BAND_PCT {
        Trend::Up
    } else if delta_pct < -TREND_DEAD_BAND_PCT {
        Trend::Down
    } else {
        Trend::Flat
    }
}

/// What one poll returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Active { match_id: String, win_probability_pct: f64 },
    NoActiveMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveWinProbSample {
    pub captured_at: DateTime<Utc>,
    pub match_id: String,
    pub win_probability_pct: f64,
    /// `None` on the first sample of a match.
    pub delta_pct: Option<f64>,
    pub trend: Option<Trend>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    Sample(LiveWinProbSample),
    NoActiveMatch,
    /// The poll failed; the previous sample is kept.
    Failed(String),
}

/// One tracking session. Holds at most one previous sample.
#[derive(Debug, Default)]
pub struct TrackerSession {
    previous: Option<LiveWinProbSample>,
}

impl TrackerSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> Option<&LiveWinProbSample> {
        self.previous.as_ref()
    }

    pub fn observe(&mut self, polled: Result<Observation>, now: DateTime<Utc>) -> TickReport {
        match polled {
            Err(e) => TickReport::Failed(e.to_string()),
            Ok(Observation::NoActiveMatch) => {
                self.previous = None;
                TickReport::NoActiveMatch
            }
            Ok(Observation::Active { match_id, win_probability_pct }) => {
                // A different match starts a fresh trend.
                let delta_pct = self
                    .previous
                    .as_ref()
                    .filter(|p| p.match_id == match_id)
                    .map(|p| win_probability_pct - p.win_probability_pct);
                let sample = LiveWinProbSample {
                    captured_at: now,
                    match_id,
                    win_probability_pct,
                    delta_pct,
                    trend: delta_pct.map(trend),
                };
                self.previous = Some(sample.clone());
                TickReport::Sample(sample)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Polling the HTTP API
// ---------------------------------------------------------------------------

pub struct Tracker {
    client: reqwest::Client,
    api_url: String,
    nickname: String,
    period: Duration,
}

impl Tracker {
    /// `request_timeout` should cover a full computation on the server side.
    pub fn new(api_url: &str, nickname: &str, period: Duration, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            nickname: nickname.to_string(),
            period,
        })
    }

    pub async fn poll_once(&self) -> Result<Observation> {
        let url = format!("{}/win-probability", self.api_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("nickname", self.nickname.as_str())])
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("{url}: {e}")))?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        parse_observation(status, &body)
    }

    /// Poll until `ticks` samples were taken (forever when `None`).
    pub async fn run(&self, ticks: Option<u64>) -> TrackerSession {
        drive(&self.nickname, self.period, ticks, || self.poll_once()).await
    }
}

/// The tick loop. Ticks are sequential; a poll that overruns the period
/// swallows the ticks it missed instead of firing them back to back.
async fn drive<F, Fut>(nickname: &str, period: Duration, ticks: Option<u64>, mut poll: F) -> TrackerSession
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation>>,
{
    let mut session = TrackerSession::new();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut taken = 0u64;

    loop {
        if ticks.is_some_and(|n| taken >= n) {
            return session;
        }
        ticker.tick().await;
        taken += 1;
        let report = session.observe(poll().await, Utc::now());
        log_report(nickname, &report);
    }
}

fn parse_observation(status: reqwest::StatusCode, body: &Value) -> Result<Observation> {
    let active = body.get("active").and_then(Value::as_bool);
    if status.is_success() && active == Some(false) {
        return Ok(Observation::NoActiveMatch);
    }
    let ok = body.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if !status.is_success() || !ok {
        let kind = body.get("error_kind").and_then(Value::as_str).unwrap_or("unknown");
        let msg = body.get("error").and_then(Value::as_str).unwrap_or("no error message");
        return Err(AppError::UpstreamUnavailable(format!("HTTP {status} ({kind}): {msg}")));
    }

    let match_id = body
        .get("match_id")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::UpstreamUnavailable("response has no match_id".to_string()))?;
    let pct = body
        .get("win_probability_pct")
        .and_then(Value::as_f64)
        .ok_or_else(|| AppError::UpstreamUnavailable("response has no win_probability_pct".to_string()))?;
    Ok(Observation::Active { match_id: match_id.to_string(), win_probability_pct: pct })
}

fn log_report(nickname: &str, report: &TickReport) {
    match report {
        TickReport::Sample(s) => {
            let delta = s.delta_pct.map(|d| format!("{d:+.2}")).unwrap_or_else(|| "n/a".to_string());
            let trend = s.trend.map(|t| t.to_string()).unwrap_or_else(|| "first".to_string());
            info!(
                nickname,
                match_id = %s.match_id,
                pct = s.win_probability_pct,
                delta_pct = ?s.delta_pct,
                "WINPROB | {:.2}% | delta: {delta} | trend: {trend}",
                s.win_probability_pct,
            );
        }
        TickReport::NoActiveMatch => info!(nickname, "no active match, trend reset"),
        TickReport::Failed(e) => warn!(nickname, error = %e, "tick failed, keeping previous sample"),
    }
}
