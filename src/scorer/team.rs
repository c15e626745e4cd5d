use crate::config::{ELO_LEVELS, LOGISTIC_K, PROBABILITY_CEIL, PROBABILITY_FLOOR, STATS_LIMIT};
use crate::error::{AppError, Result};
use crate::scorer::composite::{normalized_set, weighted_sum};
use crate::types::{
    EloGap, PlayerMetricRecord, SampleLabel, SampleQuality, ScoredPlayer, TeamAggregate,
};

/// FACEIT skill level label ("Level 1".."Level 10") for an elo.
pub fn level_label(elo: i64) -> String {
    let level = ELO_LEVELS
        .iter()
        .position(|&t| elo < t)
        .map(|i| i + 1)
        .unwrap_or(ELO_LEVELS.len());
    format!("Level {level}")
}

pub fn score_player(p: &PlayerMetricRecord) -> ScoredPlayer {
    let normalized = normalized_set(p);
    let composite_score = weighted_sum(&normalized);
    ScoredPlayer {
        player_id: p.player_id.clone(),
        nickname: p.nickname.clone(),
        elo: p.elo,
        level_label: level_label(p.elo),
        kd_ratio: p.kd_ratio,
        winrate_global: p.winrate_global,
        winrate_map: p.effective_map_winrate(),
        map_stat_is_fallback: p.map_stat_is_fallback(),
        headshot_pct: p.headshot_pct,
        avg_kills_per_match: p.avg_kills_per_match,
        matches_analyzed: p.matches_analyzed,
        normalized,
        composite_score,
    }
}

/// Mean composite score over whatever part of the roster resolved.
/// An empty roster is an error rather than a degenerate average.
pub fn aggregate_team(faction: &str, name: &str, players: &[PlayerMetricRecord]) -> Result<TeamAggregate> {
    if players.is_empty() {
        return Err(AppError::InsufficientRosterData(format!(
            "no players resolved for team '{name}' ({faction})"
        )));
    }
    let scored: Vec<ScoredPlayer> = players.iter().map(score_player).collect();
    let average_score = scored.iter().map(|p| p.composite_score).sum::<f64>() / scored.len() as f64;

    Ok(TeamAggregate {
        faction: faction.to_string(),
        name: name.to_string(),
        roster: players.iter().map(|p| p.player_id.clone()).collect(),
        average_score,
        players: scored,
    })
}

/// Team A's win probability from the two team averages. Never certain.
pub fn win_probability(team_a_avg: f64, team_b_avg: f64) -> f64 {
    let diff = team_a_avg - team_b_avg;
    let p = 1.0 / (1.0 + (-LOGISTIC_K * diff).exp());
    if p.is_nan() {
        return 0.5;
    }
    p.clamp(PROBABILITY_FLOOR, PROBABILITY_CEIL)
}

pub(crate) fn round_to(v: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (v * f).round() / f
}

fn mean_elo(players: &[PlayerMetricRecord]) -> Option<f64> {
    if players.is_empty() {
        return None;
    }
    Some(players.iter().map(|p| p.elo as f64).sum::<f64>() / players.len() as f64)
}

pub fn elo_gap(team_a: &[PlayerMetricRecord], team_b: &[PlayerMetricRecord]) -> EloGap {
    match (mean_elo(team_a), mean_elo(team_b)) {
        (Some(a), Some(b)) => {
            let gap = a - b;
            EloGap {
                avg_elo_team_a: Some(round_to(a, 2)),
                avg_elo_team_b: Some(round_to(b, 2)),
                avg_elo_gap: Some(round_to(gap, 2)),
                avg_elo_gap_abs: Some(round_to(gap.abs(), 2)),
            }
        }
        _ => EloGap {
            avg_elo_team_a: None,
            avg_elo_team_b: None,
            avg_elo_gap: None,
            avg_elo_gap_abs: None,
        },
    }
}

/// How much history backs the estimate, against the per-player target.
pub fn sample_quality<'a>(players: impl IntoIterator<Item = &'a PlayerMetricRecord>) -> SampleQuality {
    let samples: Vec<f64> = players.into_iter().map(|p| p.matches_analyzed as f64).collect();
    if samples.is_empty() {
        return SampleQuality {
            avg_matches: None,
            ratio: None,
            pct: None,
            label: SampleLabel::Unknown,
            target_matches: STATS_LIMIT,
            player_count: 0,
        };
    }

    let avg = samples.iter().sum::<f64>() / samples.len() as f64;
    let ratio = (avg / STATS_LIMIT as f64).clamp(0.0, 1.0);
    let label = if ratio >= 0.8 {
        SampleLabel::High
    } else if ratio >= 0.5 {
        SampleLabel::Medium
    } else {
        SampleLabel::Low
    };

    SampleQuality {
        avg_matches: Some(round_to(avg, 2)),
        ratio: Some(round_to(ratio, 4)),
        pct: Some(round_to(ratio * 100.0, 1)),
        label,
        target_matches: STATS_LIMIT,
        player_count: samples.len(),
    }
}
