use std::time::Duration;

use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::faceit::parse::{parse_player_identity, pick_match_from_groups, PlayerIdentity};
use crate::faceit::FaceitApi;
use crate::types::{MatchResolution, ResolvedPlayer};

/// Steps of the nickname → active match chain.
#[derive(Debug)]
enum Step {
    ResolveIdentity,
    QueryActiveMatches(PlayerIdentity),
    Done(PlayerIdentity, MatchResolution),
}

/// Map a nickname to a FACEIT player. A 404 or a profile without an id is
/// `PlayerNotFound`.
pub async fn resolve_identity(api: &dyn FaceitApi, nickname: &str) -> Result<PlayerIdentity> {
    let nickname = nickname.trim();
    if nickname.is_empty() {
        return Err(AppError::BadRequest("nickname must not be empty".to_string()));
    }
    let profile = api
        .player_by_nickname(nickname)
        .await?
        .ok_or_else(|| AppError::PlayerNotFound(nickname.to_string()))?;
    let mut identity =
        parse_player_identity(&profile).ok_or_else(|| AppError::PlayerNotFound(nickname.to_string()))?;
    if identity.nickname.is_empty() {
        identity.nickname = nickname.to_string();
    }
    Ok(identity)
}

async fn run_chain(api: &dyn FaceitApi, nickname: &str) -> Result<ResolvedPlayer> {
    let mut step = Step::ResolveIdentity;
    loop {
        step = match step {
            Step::ResolveIdentity => {
                let identity = resolve_identity(api, nickname).await?;
                debug!(nickname, player_id = %identity.player_id, "identity resolved");
                Step::QueryActiveMatches(identity)
            }
            Step::QueryActiveMatches(identity) => {
                let groups = api.match_groups(&identity.player_id).await?;
                let resolution = match pick_match_from_groups(&groups) {
                    Some((match_id, state)) => MatchResolution::Found { match_id, state },
                    None => MatchResolution::NotActive,
                };
                Step::Done(identity, resolution)
            }
            Step::Done(identity, resolution) => {
                match &resolution {
                    MatchResolution::Found { match_id, state } => {
                        info!(nickname, match_id = %match_id, state = %state, "active match found")
                    }
                    MatchResolution::NotActive => info!(nickname, "no active match"),
                }
                return Ok(ResolvedPlayer {
                    nickname: identity.nickname,
                    player_id: identity.player_id,
                    steam_id_64: identity.steam_id_64,
                    resolution,
                });
            }
        };
    }
}

/// Resolve a nickname to its current match, if any, within `budget`.
/// Single attempt per upstream call; no state is kept between calls.
pub async fn resolve_match(api: &dyn FaceitApi, nickname: &str, budget: Duration) -> Result<ResolvedPlayer> {
    tokio::time::timeout(budget, run_chain(api, nickname))
        .await
        .map_err(|_| AppError::ResolutionTimeout(budget))?
}
