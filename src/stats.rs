use futures_util::future::try_join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::STATS_LIMIT;
use crate::error::Result;
use crate::faceit::parse::{is_same_map, parse_player_identity, parse_stat_line, MatchStatLine, RosterMember};
use crate::faceit::FaceitApi;
use crate::types::PlayerMetricRecord;

const DEFAULT_ELO: i64 = 1000;
const DEFAULT_SKILL_LEVEL: i64 = 5;

// Neutral values for a player with no usable history.
const DEFAULT_KD: f64 = 1.0;
const DEFAULT_WINRATE_PCT: f64 = 50.0;
const DEFAULT_HS_PCT: f64 = 0.0;
const DEFAULT_AVG_KILLS: f64 = 15.0;

/// Totals over a player's recent matches.
#[derive(Debug, Default)]
struct Tally {
    n: u32,
    kills: f64,
    deaths: f64,
    headshots: f64,
    wins: u32,
    map_n: u32,
    map_wins: u32,
}

impl Tally {
    fn add(&mut self, line: &MatchStatLine, current_map: &str) {
        self.n += 1;
        self.kills += line.kills;
        self.deaths += line.deaths;
        self.headshots += line.headshots;
        if line.won {
            self.wins += 1;
        }
        if is_same_map(current_map, &line.map) {
            self.map_n += 1;
            if line.won {
                self.map_wins += 1;
            }
        }
    }
}

/// Build a metric record from the raw stats listing. `stats` is `None` when
/// the player has no history at all.
pub fn metrics_from_history(
    member: &RosterMember,
    elo: i64,
    skill_level: i64,
    stats: Option<&Value>,
    current_map: &str,
) -> PlayerMetricRecord {
    let mut tally = Tally::default();
    if let Some(items) = stats.and_then(|s| s.get("items")).and_then(|i| i.as_array()) {
        for item in items {
            match parse_stat_line(item) {
                Some(line) => tally.add(&line, current_map),
                None => debug!(player_id = %member.player_id, "skipping unparsable stats item"),
            }
        }
    }

    let mut rec = PlayerMetricRecord {
        player_id: member.player_id.clone(),
        nickname: member.nickname.clone(),
        elo,
        skill_level,
        kd_ratio: DEFAULT_KD,
        winrate_global: DEFAULT_WINRATE_PCT,
        winrate_map: None,
        headshot_pct: DEFAULT_HS_PCT,
        avg_kills_per_match: DEFAULT_AVG_KILLS,
        // Parsed items, not the raw listing length.
        matches_analyzed: tally.n,
        map_matches: tally.map_n,
    };

    if tally.n > 0 {
        let n = tally.n as f64;
        rec.kd_ratio = tally.kills / tally.deaths.max(1.0);
        rec.winrate_global = tally.wins as f64 / n * 100.0;
        rec.avg_kills_per_match = tally.kills / n;
        rec.headshot_pct = tally.headshots / tally.kills.max(1.0) * 100.0;
    }
    if tally.map_n > 0 {
        rec.winrate_map = Some(tally.map_wins as f64 / tally.map_n as f64 * 100.0);
    }
    rec
}

/// Fetch profile and recent stats for one roster member. Any upstream error
/// fails the whole computation.
pub async fn player_metrics(api: &dyn FaceitApi, member: &RosterMember, current_map: &str) -> Result<PlayerMetricRecord> {
    let (profile, stats) = futures_util::try_join!(
        api.player(&member.player_id),
        api.recent_match_stats(&member.player_id, STATS_LIMIT),
    )?;

    let identity = profile.as_ref().and_then(parse_player_identity);
    let elo = identity
        .as_ref()
        .and_then(|i| i.elo)
        .or(member.elo)
        .unwrap_or(DEFAULT_ELO);
    let skill_level = identity
        .as_ref()
        .and_then(|i| i.skill_level)
        .or(member.skill_level)
        .unwrap_or(DEFAULT_SKILL_LEVEL);

    let rec = metrics_from_history(member, elo, skill_level, stats.as_ref(), current_map);
    if rec.matches_analyzed == 0 {
        warn!(player_id = %rec.player_id, nickname = %rec.nickname, "no usable match history, using neutral metrics");
    }
    debug!(
        player_id = %rec.player_id,
        matches = rec.matches_analyzed,
        map_matches = rec.map_matches,
        map_fallback = rec.map_stat_is_fallback(),
        "player metrics built"
    );
    Ok(rec)
}

/// Metrics for a whole roster, fetched concurrently, in roster order.
pub async fn roster_metrics(
    api: &dyn FaceitApi,
    roster: &[RosterMember],
    current_map: &str,
) -> Result<Vec<PlayerMetricRecord>> {
    try_join_all(roster.iter().map(|m| player_metrics(api, m, current_map))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::faceit::client::fake::FakeFaceit;
    use serde_json::json;

    fn member(id: &str) -> RosterMember {
        RosterMember { player_id: id.into(), nickname: format!("nick-{id}"), elo: Some(1800), skill_level: Some(8) }
    }

    fn item(kills: u32, deaths: u32, hs: u32, won: bool, map: &str) -> Value {
        json!({"stats": {
            "Kills": kills.to_string(),
            "Deaths": deaths.to_string(),
            "Headshots": hs.to_string(),
            "Result": if won { "1" } else { "0" },
            "Map": map,
        }})
    }

    #[test]
    fn history_formulas() {
        let stats = json!({"items": [
            item(20, 10, 10, true, "de_mirage"),
            item(10, 10, 5, false, "de_nuke"),
        ]});
        let rec = metrics_from_history(&member("p1"), 2000, 9, Some(&stats), "de_mirage");
        assert_eq!(rec.matches_analyzed, 2);
        assert!((rec.kd_ratio - 1.5).abs() < 1e-12);
        assert!((rec.winrate_global - 50.0).abs() < 1e-12);
        assert!((rec.avg_kills_per_match - 15.0).abs() < 1e-12);
        assert!((rec.headshot_pct - 50.0).abs() < 1e-12);
        assert_eq!(rec.winrate_map, Some(100.0));
        assert_eq!(rec.map_matches, 1);
    }

    #[test]
    fn no_map_history_sets_fallback() {
        let stats = json!({"items": [item(20, 10, 10, true, "de_nuke")]});
        let rec = metrics_from_history(&member("p1"), 2000, 9, Some(&stats), "de_ancient");
        assert!(rec.map_stat_is_fallback());
        assert_eq!(rec.effective_map_winrate(), rec.winrate_global);
    }

    #[test]
    fn no_history_uses_neutral_metrics() {
        let rec = metrics_from_history(&member("p1"), 1500, 6, None, "de_mirage");
        assert_eq!(rec.matches_analyzed, 0);
        assert_eq!(rec.kd_ratio, DEFAULT_KD);
        assert_eq!(rec.winrate_global, DEFAULT_WINRATE_PCT);
        assert_eq!(rec.avg_kills_per_match, DEFAULT_AVG_KILLS);
        assert!(rec.map_stat_is_fallback());
    }

    #[test]
    fn unparsable_items_are_skipped() {
        let stats = json!({"items": [
            {"stats": {"Kills": "lots"}},
            item(12, 12, 6, true, "de_inferno"),
        ]});
        let rec = metrics_from_history(&member("p1"), 2000, 9, Some(&stats), "de_inferno");
        assert_eq!(rec.matches_analyzed, 1);
        assert_eq!(rec.winrate_global, 100.0);
    }

    #[tokio::test]
    async fn profile_elo_wins_over_roster_then_defaults() {
        let mut api = FakeFaceit::default();
        api.players.insert(
            "p1".into(),
            json!({"player_id": "p1", "games": {"cs2": {"faceit_elo": 2450, "skill_level": 10}}}),
        );
        let from_profile = player_metrics(&api, &member("p1"), "de_mirage").await.unwrap();
        assert_eq!(from_profile.elo, 2450);
        assert_eq!(from_profile.skill_level, 10);

        let from_roster = player_metrics(&api, &member("p2"), "de_mirage").await.unwrap();
        assert_eq!(from_roster.elo, 1800);

        let bare = RosterMember { player_id: "p3".into(), nickname: "bare".into(), elo: None, skill_level: None };
        let defaulted = player_metrics(&api, &bare, "de_mirage").await.unwrap();
        assert_eq!(defaulted.elo, DEFAULT_ELO);
        assert_eq!(defaulted.skill_level, DEFAULT_SKILL_LEVEL);
    }

    #[tokio::test]
    async fn one_failing_player_fails_the_roster() {
        let mut api = FakeFaceit::default();
        api.failing_stats.push("p3".into());
        let roster: Vec<_> = ["p1", "p2", "p3"].into_iter().map(member).collect();
        let err = roster_metrics(&api, &roster, "de_mirage").await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn roster_order_is_preserved() {
        let api = FakeFaceit::default();
        let roster: Vec<_> = ["p1", "p2", "p3"].into_iter().map(member).collect();
        let recs = roster_metrics(&api, &roster, "de_mirage").await.unwrap();
        let ids: Vec<_> = recs.iter().map(|r| r.player_id.as_str()).collect();
        assert_eq!(ids, ["p1", "p2", "p3"]);
    }
}
