use serde_json::Value;

use crate::config::{GAME_ID, STATE_PRIORITY};
use crate::faceit::aliases::{lookup, StatField};

/// Identity fields pulled from a `/players` profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub player_id: String,
    pub nickname: String,
    pub steam_id_64: Option<String>,
    pub elo: Option<i64>,
    pub skill_level: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterMember {
    pub player_id: String,
    pub nickname: String,
    pub elo: Option<i64>,
    pub skill_level: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Faction {
    pub key: String,
    pub name: String,
    pub roster: Vec<RosterMember>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDetails {
    pub match_id: String,
    pub status: Option<String>,
    pub map_name: String,
    pub factions: Vec<Faction>,
}

/// One line of a player's recent per-match stats.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchStatLine {
    pub kills: f64,
    pub deaths: f64,
    pub headshots: f64,
    pub won: bool,
    pub map: String,
}

pub const UNKNOWN_MAP: &str = "unknown";

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(|x| x.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn int_field(v: &Value, key: &str) -> Option<i64> {
    v.get(key).and_then(|x| {
        x.as_i64()
            .or_else(|| x.as_f64().map(|f| f.round() as i64))
            .or_else(|| x.as_str().and_then(|s| s.trim().parse().ok()))
    })
}

fn num(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

pub fn parse_player_identity(v: &Value) -> Option<PlayerIdentity> {
    let player_id = str_field(v, "player_id")?;
    let nickname = str_field(v, "nickname").unwrap_or_default();

    let steam_id_64 = str_field(v, "steam_id_64")
        .or_else(|| v.get("platforms").and_then(|p| str_field(p, "steam")))
        .or_else(|| str_field(v, "new_steam_id"));

    let game = v.get("games").and_then(|g| g.get(GAME_ID));
    let elo = game.and_then(|g| int_field(g, "faceit_elo"));
    let skill_level = game.and_then(|g| int_field(g, "skill_level"));

    Some(PlayerIdentity { player_id, nickname, steam_id_64, elo, skill_level })
}

/// Pick the current match from a `groupByState` payload: preferred states
/// first, then any other non-empty group. Returns `(match_id, state)`.
pub fn pick_match_from_groups(groups: &Value) -> Option<(String, String)> {
    let groups = groups.as_object()?;

    let first_id = |items: &Value| -> Option<String> {
        let first = items.as_array()?.first()?;
        str_field(first, "id").or_else(|| str_field(first, "match_id"))
    };

    for state in STATE_PRIORITY {
        if let Some(id) = groups.get(*state).and_then(first_id) {
            return Some((id, state.to_string()));
        }
    }
    groups
        .iter()
        .find_map(|(state, items)| first_id(items).map(|id| (id, state.clone())))
}

/// FACEIT match ids are UUID-like, optionally prefixed with `<digits>-`.
/// A leading `-` is never accepted, so an id can't pass for a CLI flag.
pub fn is_plausible_match_id(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return false;
    }
    let is_body = |t: &str| {
        t.len() >= 20
            && t.starts_with(|c: char| c.is_ascii_hexdigit())
            && t.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
    };
    if is_body(s) {
        return true;
    }
    match s.split_once('-') {
        Some((prefix, rest)) => {
            !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) && is_body(rest)
        }
        None => false,
    }
}

fn parse_member(v: &Value) -> Option<RosterMember> {
    let player_id = str_field(v, "player_id")
        .or_else(|| str_field(v, "id"))
        .or_else(|| str_field(v, "user_id"))?;
    let nickname = str_field(v, "nickname")
        .or_else(|| str_field(v, "name"))
        .unwrap_or_default();
    Some(RosterMember {
        player_id,
        nickname,
        elo: int_field(v, "faceit_elo").or_else(|| int_field(v, "elo")),
        skill_level: int_field(v, "game_skill_level").or_else(|| int_field(v, "skill_level")),
    })
}

pub fn parse_match_details(v: &Value) -> Option<MatchDetails> {
    let match_id = str_field(v, "match_id").or_else(|| str_field(v, "id"))?;

    let map_name = v
        .get("voting")
        .and_then(|vt| vt.get("map"))
        .and_then(|m| m.get("pick"))
        .and_then(|p| p.as_array())
        .and_then(|a| a.first())
        .and_then(|x| x.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| UNKNOWN_MAP.to_string());

    let factions = v
        .get("teams")
        .and_then(|t| t.as_object())
        .map(|teams| {
            teams
                .iter()
                .map(|(key, team)| {
                    let members = team
                        .get("roster")
                        .or_else(|| team.get("players"))
                        .and_then(|r| r.as_array());
                    Faction {
                        key: key.clone(),
                        name: str_field(team, "name").unwrap_or_else(|| key.clone()),
                        roster: members
                            .map(|a| a.iter().filter_map(parse_member).collect())
                            .unwrap_or_default(),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    Some(MatchDetails {
        match_id,
        status: str_field(v, "status"),
        map_name,
        factions,
    })
}

/// Index of the faction containing the player, by id first, then by nickname.
pub fn faction_of(factions: &[Faction], player_id: &str, nicknames: &[&str]) -> Option<usize> {
    factions
        .iter()
        .position(|f| f.roster.iter().any(|m| m.player_id == player_id))
        .or_else(|| {
            factions.iter().position(|f| {
                f.roster.iter().any(|m| {
                    nicknames
                        .iter()
                        .any(|n| !n.is_empty() && m.nickname.eq_ignore_ascii_case(n.trim()))
                })
            })
        })
}

fn clean_map(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    lower.strip_prefix("de_").map(str::to_string).unwrap_or(lower)
}

/// Whether a stat line's map is the current map (`de_` prefix ignored).
pub fn is_same_map(current: &str, item_map: &str) -> bool {
    let current = clean_map(current);
    !current.is_empty() && clean_map(item_map).contains(&current)
}

/// Parse one per-match stats item. Missing keys take neutral defaults; a
/// present but unparsable number drops the item.
pub fn parse_stat_line(item: &Value) -> Option<MatchStatLine> {
    let empty = Value::Null;
    let stats = item.get("stats").unwrap_or(&empty);

    let number = |field: StatField, default: f64| -> Option<f64> {
        match lookup(stats, field) {
            Some(v) => num(v),
            None => Some(default),
        }
    };

    let kills = number(StatField::Kills, 0.0)?;
    let deaths = number(StatField::Deaths, 1.0)?;
    let headshots = number(StatField::Headshots, 0.0)?;

    let won = match lookup(stats, StatField::Result) {
        Some(Value::String(s)) => s.trim() == "1",
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    };
    let map = lookup(stats, StatField::Map)
        .and_then(|m| m.as_str())
        .unwrap_or("")
        .to_string();

    Some(MatchStatLine { kills, deaths, headshots, won, map })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_reads_steam_fallbacks_and_game_block() {
        let v = json!({
            "player_id": "p-1",
            "nickname": "Kerler",
            "platforms": {"steam": "7656119"},
            "games": {"cs2": {"faceit_elo": 2314, "skill_level": 10}}
        });
        let id = parse_player_identity(&v).unwrap();
        assert_eq!(id.player_id, "p-1");
        assert_eq!(id.steam_id_64.as_deref(), Some("7656119"));
        assert_eq!(id.elo, Some(2314));
        assert_eq!(id.skill_level, Some(10));
    }

    #[test]
    fn identity_without_player_id_is_none() {
        assert!(parse_player_identity(&json!({"player_id": "  ", "nickname": "x"})).is_none());
    }

    #[test]
    fn groups_follow_state_priority() {
        let groups = json!({
            "VOTING": [{"id": "1-voting"}],
            "ONGOING": [{"match_id": "1-ongoing"}],
        });
        assert_eq!(
            pick_match_from_groups(&groups),
            Some(("1-ongoing".to_string(), "ONGOING".to_string()))
        );
    }

    #[test]
    fn groups_fall_back_to_unknown_states() {
        let groups = json!({"ONGOING": [], "CHECK_IN": [{"id": "1-check"}]});
        assert_eq!(
            pick_match_from_groups(&groups),
            Some(("1-check".to_string(), "CHECK_IN".to_string()))
        );
        assert!(pick_match_from_groups(&json!({"ONGOING": []})).is_none());

        // Unknown states are tried in the order the upstream listed them.
        let groups: Value = serde_json::from_str(r#"{"WAITING": [{"id": "1-w"}], "CHECK_IN": [{"id": "1-c"}]}"#).unwrap();
        assert_eq!(pick_match_from_groups(&groups), Some(("1-w".to_string(), "WAITING".to_string())));
        assert!(pick_match_from_groups(&json!([])).is_none());
    }

    #[test]
    fn plausible_match_ids() {
        assert!(is_plausible_match_id("1-3f2a9c4e-7b1d-4e2a-9f3c-0a1b2c3d4e5f"));
        assert!(is_plausible_match_id("3f2a9c4e-7b1d-4e2a-9f3c-0a1b2c3d4e5f"));
        assert!(!is_plausible_match_id("1-short"));
        assert!(!is_plausible_match_id("not-a-match-id-zzzzzzzzzzzzzz"));
        assert!(!is_plausible_match_id(""));
        assert!(!is_plausible_match_id("-1234567890abcdef1234"));
        assert!(!is_plausible_match_id("1--234567890abcdef1234"));
    }

    #[test]
    fn match_details_read_map_and_rosters() {
        let v = json!({
            "match_id": "1-abc",
            "status": "ONGOING",
            "voting": {"map": {"pick": ["de_mirage"]}},
            "teams": {
                "faction1": {"name": "team_Kerler", "roster": [{"player_id": "p1", "nickname": "Kerler", "game_skill_level": 9}]},
                "faction2": {"roster": [{"player_id": "p6", "nickname": "Other"}]}
            }
        });
        let d = parse_match_details(&v).unwrap();
        assert_eq!(d.map_name, "de_mirage");
        assert_eq!(d.factions.len(), 2);
        assert_eq!(d.factions[0].name, "team_Kerler");
        assert_eq!(d.factions[1].name, "faction2");
        assert_eq!(d.factions[0].roster[0].skill_level, Some(9));
    }

    #[test]
    fn missing_vote_means_unknown_map() {
        let d = parse_match_details(&json!({"match_id": "1-abc"})).unwrap();
        assert_eq!(d.map_name, UNKNOWN_MAP);
        assert!(d.factions.is_empty());
    }

    #[test]
    fn faction_lookup_by_id_then_nickname() {
        let member = |id: &str, nick: &str| RosterMember {
            player_id: id.into(),
            nickname: nick.into(),
            elo: None,
            skill_level: None,
        };
        let factions = vec![
            Faction { key: "faction1".into(), name: "a".into(), roster: vec![member("p1", "Alpha")] },
            Faction { key: "faction2".into(), name: "b".into(), roster: vec![member("p2", "Kerler")] },
        ];
        assert_eq!(faction_of(&factions, "p1", &[]), Some(0));
        assert_eq!(faction_of(&factions, "zz", &["kerler"]), Some(1));
        assert_eq!(faction_of(&factions, "zz", &["nobody"]), None);
    }

    #[test]
    fn map_matching_ignores_prefix_and_case() {
        assert!(is_same_map("de_Mirage", "mirage"));
        assert!(is_same_map("mirage", "de_mirage"));
        assert!(!is_same_map("de_nuke", "de_mirage"));
        assert!(!is_same_map("", "de_mirage"));
    }

    #[test]
    fn stat_line_defaults_and_rejects() {
        let line = parse_stat_line(&json!({"stats": {"Kills": "20", "Result": "1", "Map": "de_inferno"}})).unwrap();
        assert_eq!(line.kills, 20.0);
        assert_eq!(line.deaths, 1.0);
        assert!(line.won);
        assert_eq!(line.map, "de_inferno");

        assert!(parse_stat_line(&json!({"stats": {"Kills": "twenty"}})).is_none());
        let empty = parse_stat_line(&json!({})).unwrap();
        assert!(!empty.won);
    }
}
