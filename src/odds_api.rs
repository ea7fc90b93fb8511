use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use reqwest::blocking::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::events::{
    ClassifiedEvents, TournamentGroup, classify_events, group_by_tournament, sort_by_kickoff,
};
use crate::http_cache::{HttpCache, default_cache_path};
use crate::http_client::build_http_client;
use crate::model::{Game, OddsSport};
use crate::odds::{AggregatedOdds, BookmakerOddsRow, aggregate, bookmaker_rows};

pub const DEFAULT_BASE_URL: &str = "https://api.the-odds-api.com/v4";
pub const DEFAULT_REGIONS: &str = "us";
pub const DEFAULT_MARKETS: &str = "h2h,spreads,totals";
pub const EVENTS_REGIONS: &str = "eu,us,uk";
pub const EVENTS_MARKETS: &str = "h2h";
pub const POPULAR_SPORTS_LIMIT: usize = 6;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RETRIES: u32 = 2;
const DEFAULT_STALE_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct OddsApiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub regions: String,
    pub markets: String,
    pub timeout: Duration,
    pub retries: u32,
    pub stale_after: Duration,
    pub cache_path: Option<PathBuf>,
}

impl Default for OddsApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            regions: DEFAULT_REGIONS.to_string(),
            markets: DEFAULT_MARKETS.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
            stale_after: Duration::from_secs(DEFAULT_STALE_SECS),
            cache_path: None,
        }
    }
}

impl OddsApiConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let api_key = get("ODDS_API_KEY")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let base_url = get("ODDS_API_BASE_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let regions = var_list(&get, "ODDS_REGIONS", DEFAULT_REGIONS);
        let markets = var_list(&get, "ODDS_MARKETS", DEFAULT_MARKETS);
        let timeout_secs =
            var_parse(&get, "ODDS_HTTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS).clamp(1, 120);
        let retries = var_parse(&get, "ODDS_HTTP_RETRIES", DEFAULT_RETRIES).min(5);
        let stale_secs = var_parse(&get, "ODDS_CACHE_STALE_SECS", DEFAULT_STALE_SECS).min(86_400);
        let cache_path = if var_bool(&get, "ODDS_CACHE_PERSIST", true) {
            default_cache_path()
        } else {
            None
        };

        Self {
            api_key,
            base_url,
            regions,
            markets,
            timeout: Duration::from_secs(timeout_secs),
            retries,
            stale_after: Duration::from_secs(stale_secs),
            cache_path,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EventsConfig {
    pub sport_limit: usize,
    pub event_limit: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            sport_limit: 3,
            event_limit: crate::events::DEFAULT_EVENT_LIMIT,
        }
    }
}

/// Everything the sport listing page needs.
#[derive(Debug, Clone, Serialize)]
pub struct SportBoard {
    pub sport: Option<OddsSport>,
    pub games: Vec<Game>,
    pub groups: Vec<TournamentGroup>,
}

impl SportBoard {
    pub fn from_games(sport: Option<OddsSport>, mut games: Vec<Game>) -> Self {
        sort_by_kickoff(&mut games);
        let groups = group_by_tournament(&games);
        Self {
            sport,
            games,
            groups,
        }
    }
}

/// Everything the match page needs.
#[derive(Debug, Clone, Serialize)]
pub struct MatchDetail {
    pub game: Game,
    pub averages: AggregatedOdds,
    pub rows: Vec<BookmakerOddsRow>,
    pub show_draw: bool,
}

impl MatchDetail {
    pub fn from_game(game: Game) -> Self {
        let averages = aggregate(&game);
        let rows = bookmaker_rows(&game);
        Self {
            show_draw: averages.draw.is_some(),
            game,
            averages,
            rows,
        }
    }
}

/// Client for The Odds API v4.
///
/// Built once with [`OddsApiClient::new`], shared by reference, and closed
/// with [`OddsApiClient::dispose`] so the response cache gets persisted.
#[derive(Debug)]
pub struct OddsApiClient {
    cfg: OddsApiConfig,
    http: Client,
    cache: HttpCache,
}

impl OddsApiClient {
    pub fn new(cfg: OddsApiConfig) -> Result<Self> {
        let http = build_http_client(cfg.timeout)?;
        let cache = HttpCache::new(cfg.stale_after, cfg.retries, cfg.cache_path.clone());
        Ok(Self { cfg, http, cache })
    }

    pub fn config(&self) -> &OddsApiConfig {
        &self.cfg
    }

    pub fn cache(&self) -> &HttpCache {
        &self.cache
    }

    pub fn dispose(self) -> Result<()> {
        self.cache.flush().context("flush http cache")
    }

    pub fn sports(&self) -> Result<Vec<OddsSport>> {
        let body = self.get("/sports", &[])?;
        parse_sports_json(&body)
    }

    pub fn active_sports(&self) -> Result<Vec<OddsSport>> {
        Ok(active_only(self.sports()?))
    }

    pub fn popular_sports(&self, limit: usize) -> Result<Vec<OddsSport>> {
        Ok(popular_only(self.sports()?, limit))
    }

    pub fn find_sport(&self, sport_key: &str) -> Result<Option<OddsSport>> {
        Ok(self.sports()?.into_iter().find(|s| s.key == sport_key))
    }

    pub fn odds_by_sport(&self, sport_key: &str, regions: &str, markets: &str) -> Result<Vec<Game>> {
        let sport_key = sport_key.trim();
        if sport_key.is_empty() {
            return Ok(Vec::new());
        }
        let path = format!("/sports/{sport_key}/odds");
        let body = self
            .get(
                &path,
                &[
                    ("regions", regions),
                    ("markets", markets),
                    ("oddsFormat", "american"),
                    ("dateFormat", "iso"),
                ],
            )
            .with_context(|| format!("odds request for {sport_key} failed"))?;
        parse_games_json(&body)
    }

    /// Scans every listed sport in order and returns the first game with `game_id`.
    pub fn game_by_id(&self, game_id: &str, regions: &str, markets: &str) -> Result<Option<Game>> {
        let game_id = game_id.trim();
        if game_id.is_empty() {
            return Ok(None);
        }
        for sport in self.sports()? {
            let games = self.odds_by_sport(&sport.key, regions, markets)?;
            if let Some(game) = games.into_iter().find(|g| g.id == game_id) {
                debug!(game = game_id, sport = %sport.key, "game located");
                return Ok(Some(game));
            }
        }
        Ok(None)
    }

    pub fn events(&self, cfg: EventsConfig, now: DateTime<Utc>) -> Result<ClassifiedEvents> {
        let sport_keys: Vec<String> = popular_only(self.sports()?, cfg.sport_limit)
            .into_iter()
            .map(|s| s.key)
            .collect();
        info!(sports = sport_keys.len(), "fetching events");

        let per_sport: Vec<Vec<Game>> = sport_keys
            .par_iter()
            .map(|key| self.odds_by_sport(key, EVENTS_REGIONS, EVENTS_MARKETS))
            .collect::<Result<_>>()?;
        let all_games: Vec<Game> = per_sport.into_iter().flatten().collect();

        Ok(classify_events(&all_games, now, cfg.event_limit))
    }

    pub fn sport_board(&self, sport_key: &str) -> Result<SportBoard> {
        let sport = self.find_sport(sport_key)?;
        let games = self.odds_by_sport(sport_key, EVENTS_REGIONS, DEFAULT_MARKETS)?;
        Ok(SportBoard::from_games(sport, games))
    }

    pub fn match_detail(&self, game_id: &str) -> Result<Option<MatchDetail>> {
        let game = self.game_by_id(game_id, &self.cfg.regions, &self.cfg.markets)?;
        Ok(game.map(MatchDetail::from_game))
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<String> {
        let Some(api_key) = self.cfg.api_key.as_deref() else {
            return Err(anyhow!("ODDS_API_KEY missing"));
        };
        let url = format!("{}{}", self.cfg.base_url, path);
        self.cache
            .fetch_text(&self.http, &url, query, &[("apiKey", api_key)])
    }
}

pub fn parse_sports_json(raw: &str) -> Result<Vec<OddsSport>> {
    let parsed: Option<Vec<OddsSport>> = serde_json::from_str(raw).context("invalid sports json")?;
    Ok(parsed.unwrap_or_default())
}

pub fn parse_games_json(raw: &str) -> Result<Vec<Game>> {
    let parsed: Option<Vec<Game>> = serde_json::from_str(raw).context("invalid odds json")?;
    Ok(parsed.unwrap_or_default())
}

pub fn active_only(sports: Vec<OddsSport>) -> Vec<OddsSport> {
    sports.into_iter().filter(|s| s.active).collect()
}

pub fn popular_only(sports: Vec<OddsSport>, limit: usize) -> Vec<OddsSport> {
    sports.into_iter().filter(|s| s.active).take(limit).collect()
}

fn var_bool(get: impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    get(key)
        .map(|v| {
            let t = v.trim().to_ascii_lowercase();
            !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}

fn var_parse<T: std::str::FromStr>(
    get: impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    get(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn var_list(get: impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    get(key)
        .map(|v| v.trim().to_ascii_lowercase().replace(' ', ""))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::{
        MatchDetail, OddsApiClient, OddsApiConfig, SportBoard, active_only, parse_games_json,
        parse_sports_json, popular_only,
    };
    use crate::model::OddsSport;

    fn sport(key: &str, active: bool) -> OddsSport {
        OddsSport {
            key: key.to_string(),
            group: "Soccer".to_string(),
            title: key.to_uppercase(),
            description: String::new(),
            active,
            has_outrights: false,
        }
    }

    #[test]
    fn popular_takes_first_active_in_listing_order() {
        let sports = vec![
            sport("a", true),
            sport("b", false),
            sport("c", true),
            sport("d", true),
        ];
        let keys: Vec<String> = popular_only(sports.clone(), 2).into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert_eq!(active_only(sports).len(), 3);
    }

    fn config_from(pairs: &[(&str, &str)]) -> OddsApiConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        OddsApiConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn config_clamps_and_normalizes_values() {
        let cfg = config_from(&[
            ("ODDS_API_KEY", "  k3y \n"),
            ("ODDS_API_BASE_URL", " http://127.0.0.1:9000/v4/ "),
            ("ODDS_REGIONS", " EU, US "),
            ("ODDS_HTTP_TIMEOUT_SECS", "0"),
            ("ODDS_HTTP_RETRIES", "50"),
            ("ODDS_CACHE_STALE_SECS", "999999"),
            ("ODDS_CACHE_PERSIST", "off"),
        ]);
        assert_eq!(cfg.api_key.as_deref(), Some("k3y"));
        assert_eq!(cfg.base_url, "http://127.0.0.1:9000/v4");
        assert_eq!(cfg.regions, "eu,us");
        assert_eq!(cfg.markets, "h2h,spreads,totals");
        assert_eq!(cfg.timeout, Duration::from_secs(1));
        assert_eq!(cfg.retries, 5);
        assert_eq!(cfg.stale_after, Duration::from_secs(86_400));
        assert_eq!(cfg.cache_path, None);

        let cfg = config_from(&[("ODDS_HTTP_TIMEOUT_SECS", "900"), ("ODDS_API_KEY", "   ")]);
        assert_eq!(cfg.timeout, Duration::from_secs(120));
        assert_eq!(cfg.api_key, None);
    }

    #[test]
    fn unparsable_config_values_fall_back_to_defaults() {
        let cfg = config_from(&[
            ("ODDS_HTTP_TIMEOUT_SECS", "soon"),
            ("ODDS_HTTP_RETRIES", "-1"),
            ("ODDS_CACHE_STALE_SECS", ""),
            ("ODDS_MARKETS", "  "),
            ("ODDS_CACHE_PERSIST", "false"),
        ]);
        let defaults = OddsApiConfig::default();
        assert_eq!(cfg.base_url, defaults.base_url);
        assert_eq!(cfg.markets, defaults.markets);
        assert_eq!(cfg.timeout, defaults.timeout);
        assert_eq!(cfg.retries, defaults.retries);
        assert_eq!(cfg.stale_after, defaults.stale_after);
        assert_eq!(cfg.cache_path, None);
    }

    #[test]
    fn null_payloads_parse_as_empty() {
        assert!(parse_sports_json("null").expect("null").is_empty());
        assert!(parse_games_json("null").expect("null").is_empty());
        assert!(parse_games_json("{\"message\":\"quota\"}").is_err());
    }

    #[test]
    fn requests_without_api_key_fail_before_network() {
        let client = OddsApiClient::new(OddsApiConfig::default()).expect("client");
        let err = client.sports().expect_err("no key");
        assert!(err.to_string().contains("ODDS_API_KEY"));
        assert!(client.cache().is_empty());
        client.dispose().expect("dispose");
    }

    #[test]
    fn empty_lookups_skip_the_network() {
        let client = OddsApiClient::new(OddsApiConfig::default()).expect("client");
        assert!(client.odds_by_sport("  ", "us", "h2h").expect("empty key").is_empty());
        assert!(client.game_by_id("", "us", "h2h").expect("empty id").is_none());
    }

    #[test]
    fn board_and_detail_views_from_fixture_payload() {
        let raw = r#"[
            {"id":"g2","sport_key":"soccer_epl","sport_title":"EPL","commence_time":"2026-10-21T15:00:00Z",
             "home_team":"Arsenal","away_team":"Chelsea","bookmakers":[]},
            {"id":"g1","sport_key":"soccer_epl","sport_title":"EPL","commence_time":"2026-10-20T15:00:00Z",
             "home_team":"Spurs","away_team":"Everton","bookmakers":[
                {"key":"bk","title":"Book","last_update":"2026-10-19T10:00:00Z",
                 "markets":[{"key":"h2h","outcomes":[{"name":"Spurs","price":-150},{"name":"Everton","price":130}]}]}
             ]}
        ]"#;
        let games = parse_games_json(raw).expect("valid");
        let board = SportBoard::from_games(Some(sport("soccer_epl", true)), games.clone());
        assert_eq!(board.games[0].id, "g1");
        assert_eq!(board.groups.len(), 1);
        assert_eq!(board.groups[0].games.len(), 2);

        let detail = MatchDetail::from_game(games[1].clone());
        assert!(!detail.show_draw);
        assert_eq!(detail.rows.len(), 1);
        assert_eq!(detail.averages.home.to_string(), "1.67");
    }
}
