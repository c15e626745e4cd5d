use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::faceit::parse::{faction_of, is_plausible_match_id, parse_match_details, MatchDetails};
use crate::faceit::FaceitApi;
use crate::resolver::{resolve_identity, resolve_match};
use crate::scorer::team::{aggregate_team, elo_gap, round_to, sample_quality, win_probability};
use crate::stats::roster_metrics;
use crate::types::{MatchProbabilityResult, MatchResolution, MatchSource, ProbabilityOutcome};

/// Which match to compute for.
#[derive(Debug, Clone)]
pub struct ComputeRequest {
    pub nickname: String,
    /// Explicit match id; resolved from the nickname when absent.
    pub match_id: Option<String>,
    /// `match_id` came out of an earlier resolution rather than from the caller.
    pub resolved: bool,
}

impl ComputeRequest {
    /// Resolve the active match as part of the computation.
    pub fn resolving(nickname: impl Into<String>) -> Self {
        Self { nickname: nickname.into(), match_id: None, resolved: false }
    }

    /// Compute for a match the caller named.
    pub fn provided(nickname: impl Into<String>, match_id: impl Into<String>) -> Self {
        Self { nickname: nickname.into(), match_id: Some(match_id.into()), resolved: false }
    }

    /// Compute for a match found by a previous resolve run.
    pub fn resolved(nickname: impl Into<String>, match_id: impl Into<String>) -> Self {
        Self { nickname: nickname.into(), match_id: Some(match_id.into()), resolved: true }
    }

    fn source(&self) -> MatchSource {
        if self.resolved {
            MatchSource::Resolved
        } else {
            MatchSource::Provided
        }
    }
}

/// Keep a caller-supplied match id only if it looks like a FACEIT id. Anything
/// else is dropped with a warning and the match gets resolved instead.
pub fn usable_match_id(nickname: &str, raw: Option<&str>) -> Option<String> {
    let id = raw.map(str::trim).filter(|id| !id.is_empty())?;
    if is_plausible_match_id(id) {
        Some(id.to_string())
    } else {
        warn!(nickname, match_id = id, "ignoring implausible match id, resolving instead");
        None
    }
}

/// Full pipeline: identity → match → rosters → metrics → scores → probability.
pub async fn compute_probability(
    api: &dyn FaceitApi,
    req: &ComputeRequest,
    resolve_budget: Duration,
) -> Result<ProbabilityOutcome> {
    let (nickname, player_id, match_id, source) = match usable_match_id(&req.nickname, req.match_id.as_deref()) {
        Some(id) => {
            let identity = tokio::time::timeout(resolve_budget, resolve_identity(api, &req.nickname))
                .await
                .map_err(|_| AppError::ResolutionTimeout(resolve_budget))??;
            (identity.nickname, identity.player_id, id, req.source())
        }
        None => {
            let resolved = resolve_match(api, &req.nickname, resolve_budget).await?;
            match resolved.resolution {
                MatchResolution::Found { match_id, .. } => {
                    (resolved.nickname, resolved.player_id, match_id, MatchSource::Resolved)
                }
                MatchResolution::NotActive => {
                    return Ok(ProbabilityOutcome::NoActiveMatch {
                        nickname: resolved.nickname,
                        player_id: resolved.player_id,
                    })
                }
            }
        }
    };

    let details = fetch_details(api, &match_id, source).await?;
    let result = score_match(api, &details, &nickname, &player_id).await?;
    info!(
        nickname = %result.nickname,
        match_id = %result.match_id,
        map = %result.map_name,
        win_probability = result.win_probability,
        "win probability computed"
    );
    Ok(ProbabilityOutcome::Computed(Box::new(result)))
}

async fn fetch_details(api: &dyn FaceitApi, match_id: &str, source: MatchSource) -> Result<MatchDetails> {
    let raw = api.match_details(match_id).await?;
    match raw.as_ref().and_then(parse_match_details) {
        Some(d) => Ok(d),
        // A caller-supplied id that does not exist is the caller's problem.
        None if source == MatchSource::Provided => {
            Err(AppError::BadRequest(format!("match '{match_id}' not found")))
        }
        None => Err(AppError::UpstreamUnavailable(format!(
            "resolved match '{match_id}' has no details"
        ))),
    }
}

async fn score_match(
    api: &dyn FaceitApi,
    details: &MatchDetails,
    nickname: &str,
    player_id: &str,
) -> Result<MatchProbabilityResult> {
    if details.factions.len() < 2 {
        return Err(AppError::InsufficientRosterData(format!(
            "match '{}' lists {} team(s)",
            details.match_id,
            details.factions.len()
        )));
    }

    let ours = match faction_of(&details.factions, player_id, &[nickname]) {
        Some(i) => i,
        None => {
            warn!(nickname, match_id = %details.match_id, "player not found in either roster, using first team");
            0
        }
    };
    let theirs = if ours == 0 { 1 } else { 0 };
    let (team_a, team_b) = (&details.factions[ours], &details.factions[theirs]);

    let (a_metrics, b_metrics) = futures_util::try_join!(
        roster_metrics(api, &team_a.roster, &details.map_name),
        roster_metrics(api, &team_b.roster, &details.map_name),
    )?;

    let a = aggregate_team(&team_a.key, &team_a.name, &a_metrics)?;
    let b = aggregate_team(&team_b.key, &team_b.name, &b_metrics)?;
    let p = win_probability(a.average_score, b.average_score);

    Ok(MatchProbabilityResult {
        nickname: nickname.to_string(),
        player_id: player_id.to_string(),
        match_id: details.match_id.clone(),
        map_name: details.map_name.clone(),
        team_a_name: a.name.clone(),
        team_b_name: b.name.clone(),
        win_probability: round_to(p, 6),
        win_probability_pct: round_to(p * 100.0, 2),
        computed_at: Utc::now(),
        elo_gap: elo_gap(&a_metrics, &b_metrics),
        sample_quality: sample_quality(a_metrics.iter().chain(b_metrics.iter())),
        team_a: a,
        team_b: b,
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::{live_match, MATCH_ID};
    use super::*;
    use serde_json::json;

    fn req(match_id: Option<&str>) -> ComputeRequest {
        match match_id {
            Some(id) => ComputeRequest::provided("Kerler", id),
            None => ComputeRequest::resolving("Kerler"),
        }
    }

    #[tokio::test]
    async fn player_team_is_team_a() {
        let api = live_match();
        let out = compute_probability(&api, &req(None), Duration::from_secs(1)).await.unwrap();
        let ProbabilityOutcome::Computed(r) = out else { panic!("expected a computed result") };
        assert_eq!(r.team_a_name, "team_Kerler");
        assert_eq!(r.team_b_name, "team_enemy");
        assert_eq!(r.map_name, "de_mirage");
        assert!(r.win_probability > 0.5 && r.win_probability <= 0.95);
        assert_eq!(r.team_a.players.len(), 5);
        assert_eq!(r.elo_gap.avg_elo_gap, Some(600.0));
    }

    #[tokio::test]
    async fn provided_match_id_skips_resolution() {
        let mut api = live_match();
        api.groups.clear();
        let out = compute_probability(&api, &req(Some(MATCH_ID)), Duration::from_secs(1)).await.unwrap();
        assert!(matches!(out, ProbabilityOutcome::Computed(_)));
    }

    #[tokio::test]
    async fn no_active_match_is_not_an_error() {
        let mut api = live_match();
        api.groups.insert("a0".into(), json!({}));
        let out = compute_probability(&api, &req(None), Duration::from_secs(1)).await.unwrap();
        assert_eq!(
            out,
            ProbabilityOutcome::NoActiveMatch { nickname: "Kerler".into(), player_id: "a0".into() }
        );
    }

    #[tokio::test]
    async fn unknown_provided_match_is_a_bad_request() {
        let api = live_match();
        let err = compute_probability(&api, &req(Some("1-ffffffffffffffffffffffff")), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn resolved_match_without_details_is_upstream_failure() {
        let mut api = live_match();
        api.matches.clear();
        let err = compute_probability(&api, &ComputeRequest::resolved("Kerler", MATCH_ID), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)));

        let err = compute_probability(&api, &req(None), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn implausible_match_id_falls_back_to_resolution() {
        let api = live_match();
        for bogus in ["lol", "  ", "-1234567890abcdef1234"] {
            let out = compute_probability(&api, &req(Some(bogus)), Duration::from_secs(1)).await.unwrap();
            let ProbabilityOutcome::Computed(r) = out else { panic!("expected a computed result for {bogus:?}") };
            assert_eq!(r.match_id, MATCH_ID);
        }
    }

    #[test]
    fn usable_match_id_trims_and_filters() {
        assert_eq!(usable_match_id("k", Some(&format!(" {MATCH_ID} "))), Some(MATCH_ID.to_string()));
        assert_eq!(usable_match_id("k", Some("lol")), None);
        assert_eq!(usable_match_id("k", None), None);
    }

    #[tokio::test]
    async fn empty_enemy_roster_is_insufficient() {
        let mut api = live_match();
        api.matches.insert(
            MATCH_ID.into(),
            json!({
                "match_id": MATCH_ID,
                "teams": {
                    "faction1": {"name": "team_enemy", "roster": []},
                    "faction2": {"name": "team_Kerler", "roster": [{"player_id": "a0", "nickname": "Kerler"}]},
                }
            }),
        );
        let err = compute_probability(&api, &req(None), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientRosterData(_)));
    }

    #[tokio::test]
    async fn stats_outage_fails_the_computation() {
        let mut api = live_match();
        api.failing_stats.push("b2".into());
        let err = compute_probability(&api, &req(None), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn same_inputs_same_probability() {
        let api = live_match();
        let a = compute_probability(&api, &req(None), Duration::from_secs(1)).await.unwrap();
        let b = compute_probability(&api, &req(None), Duration::from_secs(1)).await.unwrap();
        match (a, b) {
            (ProbabilityOutcome::Computed(a), ProbabilityOutcome::Computed(b)) => {
                assert_eq!(a.win_probability.to_bits(), b.win_probability.to_bits())
            }
            other => panic!("unexpected outcomes: {other:?}"),
        }
    }
}
