use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FACEIT_ROOM_URL;

// ---------------------------------------------------------------------------
// Player metrics
// ---------------------------------------------------------------------------

/// Raw historical metrics for one participant, built once per computation.
/// Percentages are on a 0–100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMetricRecord {
    pub player_id: String,
    pub nickname: String,
    pub elo: i64,
    pub skill_level: i64,
    pub kd_ratio: f64,
    pub winrate_global: f64,
    /// `None` when the player has no recorded matches on the current map.
    pub winrate_map: Option<f64>,
    pub headshot_pct: f64,
    pub avg_kills_per_match: f64,
    pub matches_analyzed: u32,
    pub map_matches: u32,
}

impl PlayerMetricRecord {
    /// Map winrate used by the model, falling back to the global winrate.
    pub fn effective_map_winrate(&self) -> f64 {
        self.winrate_map.unwrap_or(self.winrate_global)
    }

    pub fn map_stat_is_fallback(&self) -> bool {
        self.winrate_map.is_none()
    }
}

/// Metrics feeding the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Elo,
    KdRatio,
    WinrateGlobal,
    WinrateMap,
    HeadshotPct,
    AvgKillsPerMatch,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Elo,
        Metric::KdRatio,
        Metric::WinrateGlobal,
        Metric::WinrateMap,
        Metric::HeadshotPct,
        Metric::AvgKillsPerMatch,
    ];

    /// Raw value of this metric for a player, after the map fallback.
    pub fn raw(self, p: &PlayerMetricRecord) -> f64 {
        match self {
            Metric::Elo => p.elo as f64,
            Metric::KdRatio => p.kd_ratio,
            Metric::WinrateGlobal => p.winrate_global,
            Metric::WinrateMap => p.effective_map_winrate(),
            Metric::HeadshotPct => p.headshot_pct,
            Metric::AvgKillsPerMatch => p.avg_kills_per_match,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Metric::Elo => "elo",
            Metric::KdRatio => "kd_ratio",
            Metric::WinrateGlobal => "winrate_global",
            Metric::WinrateMap => "winrate_map",
            Metric::HeadshotPct => "headshot_pct",
            Metric::AvgKillsPerMatch => "avg_kills_per_match",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Scored output
// ---------------------------------------------------------------------------

/// Per-player line of the result, with the fallback flag kept for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPlayer {
    pub player_id: String,
    pub nickname: String,
    pub elo: i64,
    pub level_label: String,
    pub kd_ratio: f64,
    pub winrate_global: f64,
    pub winrate_map: f64,
    pub map_stat_is_fallback: bool,
    pub headshot_pct: f64,
    pub avg_kills_per_match: f64,
    pub matches_analyzed: u32,
    pub normalized: BTreeMap<Metric, f64>,
    pub composite_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamAggregate {
    pub faction: String,
    pub name: String,
    /// Player ids in roster order.
    pub roster: Vec<String>,
    pub average_score: f64,
    pub players: Vec<ScoredPlayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EloGap {
    pub avg_elo_team_a: Option<f64>,
    pub avg_elo_team_b: Option<f64>,
    pub avg_elo_gap: Option<f64>,
    pub avg_elo_gap_abs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleQuality {
    pub avg_matches: Option<f64>,
    pub ratio: Option<f64>,
    pub pct: Option<f64>,
    pub label: SampleLabel,
    pub target_matches: u32,
    pub player_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleLabel {
    High,
    Medium,
    Low,
    Unknown,
}

// ---------------------------------------------------------------------------
// Match resolution
// ---------------------------------------------------------------------------

/// Outcome of looking up a player's current match. Absence of a match is an
/// ordinary outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchResolution {
    Found { match_id: String, state: String },
    NotActive,
}

/// Resolver output plus the identity it resolved along the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPlayer {
    pub nickname: String,
    pub player_id: String,
    pub steam_id_64: Option<String>,
    pub resolution: MatchResolution,
}

/// Flat view of a resolution, as reported by `/resolve-match` and the
/// resolve worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveMatchReport {
    pub nickname: String,
    pub player_id: String,
    #[serde(default)]
    pub steam_id_64: Option<String>,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_url: Option<String>,
}

impl From<ResolvedPlayer> for ActiveMatchReport {
    fn from(r: ResolvedPlayer) -> Self {
        let (active, match_id, state) = match r.resolution {
            MatchResolution::Found { match_id, state } => (true, Some(match_id), Some(state)),
            MatchResolution::NotActive => (false, None, None),
        };
        Self {
            nickname: r.nickname,
            player_id: r.player_id,
            steam_id_64: r.steam_id_64,
            active,
            room_url: match_id.as_ref().map(|id| format!("{FACEIT_ROOM_URL}/{id}")),
            match_id,
            state,
        }
    }
}

/// How the match id of a computation was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Provided,
    Resolved,
}

// ---------------------------------------------------------------------------
// Probability result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchProbabilityResult {
    pub nickname: String,
    pub player_id: String,
    pub match_id: String,
    pub map_name: String,
    pub team_a_name: String,
    pub team_b_name: String,
    /// Probability that the player's team (team A) wins, in [0.05, 0.95].
    pub win_probability: f64,
    pub win_probability_pct: f64,
    pub computed_at: DateTime<Utc>,
    pub team_a: TeamAggregate,
    pub team_b: TeamAggregate,
    pub elo_gap: EloGap,
    pub sample_quality: SampleQuality,
}

/// Result of a computation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbabilityOutcome {
    Computed(Box<MatchProbabilityResult>),
    NoActiveMatch { nickname: String, player_id: String },
}

#[cfg(test)]
pub(crate) fn record(player_id: &str) -> PlayerMetricRecord {
    PlayerMetricRecord {
        player_id: player_id.to_string(),
        nickname: player_id.to_string(),
        elo: 2000,
        skill_level: 8,
        kd_ratio: 1.1,
        winrate_global: 52.0,
        winrate_map: Some(55.0),
        headshot_pct: 48.0,
        avg_kills_per_match: 18.0,
        matches_analyzed: 30,
        map_matches: 6,
    }
}
