use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, FixedOffset, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;

use oddsboard::demo_feed::{self, DEFAULT_SEED};
use oddsboard::events::{ClassifiedEvents, DEFAULT_EVENT_LIMIT, classify_events};
use oddsboard::format::{format_kickoff, format_price, format_update, parse_offset};
use oddsboard::logging::LoggingConfig;
use oddsboard::model::{Game, OddsSport};
use oddsboard::odds::aggregate;
use oddsboard::odds_api::{
    EventsConfig, MatchDetail, OddsApiClient, OddsApiConfig, POPULAR_SPORTS_LIMIT, SportBoard,
    active_only, popular_only,
};

const DEMO_GAMES_PER_SPORT: usize = 8;

#[derive(Debug, Parser)]
#[command(name = "oddsboard", version, about = "Compare head-to-head odds across bookmakers")]
struct Cli {
    /// Use a synthetic offline feed instead of The Odds API.
    #[arg(long, global = true)]
    demo: bool,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// UTC offset used for displayed times, e.g. `-03:00`.
    #[arg(long, global = true, default_value = "Z")]
    tz: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List sports (active only unless --all).
    Sports {
        #[arg(long)]
        all: bool,
        /// Only the first N active sports.
        #[arg(long, value_name = "N")]
        popular: Option<Option<usize>>,
    },
    /// Featured and next-24h events across the first active sports.
    Events {
        #[arg(long, default_value_t = 3)]
        sports: usize,
        #[arg(long, default_value_t = DEFAULT_EVENT_LIMIT)]
        limit: usize,
    },
    /// Games of one sport grouped by tournament.
    Sport { key: String },
    /// Averaged odds and bookmaker comparison for one game.
    Game { id: String },
}

enum Source {
    Live(OddsApiClient),
    Demo {
        sports: Vec<OddsSport>,
        games: Vec<Game>,
    },
}

impl Source {
    fn open(demo: bool, now: DateTime<Utc>) -> Result<Self> {
        if demo {
            return Ok(Source::Demo {
                sports: demo_feed::demo_sports(),
                games: demo_feed::demo_games(now, DEMO_GAMES_PER_SPORT, DEFAULT_SEED),
            });
        }
        let cfg = OddsApiConfig::from_env();
        if cfg.api_key.is_none() {
            return Err(anyhow!("ODDS_API_KEY missing (set it or pass --demo)"));
        }
        Ok(Source::Live(OddsApiClient::new(cfg)?))
    }

    fn close(self) -> Result<()> {
        match self {
            Source::Live(client) => client.dispose(),
            Source::Demo { .. } => Ok(()),
        }
    }

    fn sports(&self) -> Result<Vec<OddsSport>> {
        match self {
            Source::Live(client) => client.sports(),
            Source::Demo { sports, .. } => Ok(sports.clone()),
        }
    }

    fn events(&self, cfg: EventsConfig, now: DateTime<Utc>) -> Result<ClassifiedEvents> {
        match self {
            Source::Live(client) => client.events(cfg, now),
            Source::Demo { sports, games } => {
                let keys: Vec<String> = popular_only(sports.clone(), cfg.sport_limit)
                    .into_iter()
                    .map(|s| s.key)
                    .collect();
                let picked: Vec<Game> = keys
                    .iter()
                    .flat_map(|k| games.iter().filter(move |g| &g.sport_key == k))
                    .cloned()
                    .collect();
                Ok(classify_events(&picked, now, cfg.event_limit))
            }
        }
    }

    fn sport_board(&self, key: &str) -> Result<SportBoard> {
        match self {
            Source::Live(client) => client.sport_board(key),
            Source::Demo { sports, games } => {
                let sport = sports.iter().find(|s| s.key == key).cloned();
                let games = games.iter().filter(|g| g.sport_key == key).cloned().collect();
                Ok(SportBoard::from_games(sport, games))
            }
        }
    }

    fn match_detail(&self, id: &str) -> Result<Option<MatchDetail>> {
        match self {
            Source::Live(client) => client.match_detail(id),
            Source::Demo { games, .. } => Ok(games
                .iter()
                .find(|g| g.id == id)
                .cloned()
                .map(MatchDetail::from_game)),
        }
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    LoggingConfig::from_env().init();

    let cli = Cli::parse();
    let offset = parse_offset(&cli.tz).with_context(|| format!("invalid --tz {}", cli.tz))?;
    let now = Utc::now();
    let source = Source::open(cli.demo, now)?;

    let res = run(&cli, &source, now, offset);
    let closed = source.close();
    res?;
    closed
}

fn run(cli: &Cli, source: &Source, now: DateTime<Utc>, offset: FixedOffset) -> Result<()> {
    match &cli.command {
        Command::Sports { all, popular } => {
            let sports = source.sports()?;
            let sports = match (all, popular) {
                (_, Some(limit)) => popular_only(sports, limit.unwrap_or(POPULAR_SPORTS_LIMIT)),
                (true, None) => sports,
                (false, None) => active_only(sports),
            };
            if cli.json {
                return print_json(&sports);
            }
            print_sports(&sports);
        }
        Command::Events { sports, limit } => {
            let cfg = EventsConfig {
                sport_limit: *sports,
                event_limit: *limit,
            };
            let events = source.events(cfg, now)?;
            if cli.json {
                return print_json(&events);
            }
            print_game_list("Featured", &events.featured, offset);
            println!();
            print_game_list("Next 24h", &events.live, offset);
        }
        Command::Sport { key } => {
            let board = source.sport_board(key)?;
            if cli.json {
                return print_json(&board);
            }
            print_board(&board, offset);
        }
        Command::Game { id } => {
            let Some(detail) = source.match_detail(id)? else {
                return Err(anyhow!("game {id} not found"));
            };
            if cli.json {
                return print_json(&detail);
            }
            print_detail(&detail, offset);
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{out}");
    Ok(())
}

fn print_sports(sports: &[OddsSport]) {
    if sports.is_empty() {
        println!("No sports available.");
        return;
    }
    for sport in sports {
        let flag = if sport.active { ' ' } else { '*' };
        println!("{flag} {:<36} {:<20} {}", sport.key, sport.group, sport.title);
    }
}

fn print_game_list(label: &str, games: &[Game], offset: FixedOffset) {
    println!("{label} ({})", games.len());
    for game in games {
        let odds = aggregate(game);
        println!(
            "  {}  {:<22} {} vs {}  [{} / {} / {}]  {}",
            format_kickoff(game.commence_time, offset),
            game.sport_title,
            game.home_team,
            game.away_team,
            format_price(Some(odds.home)),
            format_price(odds.draw),
            format_price(Some(odds.away)),
            game.id,
        );
    }
}

fn print_board(board: &SportBoard, offset: FixedOffset) {
    match board.sport.as_ref() {
        Some(sport) => println!("{}", sport.title),
        None => println!("Sport not found"),
    }
    if board.games.is_empty() {
        println!("No games available for this sport right now.");
        return;
    }
    for group in &board.groups {
        println!();
        println!("{} ({} games)", group.name, group.games.len());
        for game in &group.games {
            println!(
                "  {}  {} vs {}  {}",
                format_kickoff(game.commence_time, offset),
                game.home_team,
                game.away_team,
                game.id
            );
        }
    }
}

fn print_detail(detail: &MatchDetail, offset: FixedOffset) {
    let game = &detail.game;
    println!("{}", game.sport_title);
    println!(
        "{} vs {}  {}",
        game.home_team,
        game.away_team,
        format_kickoff(game.commence_time, offset)
    );
    println!();
    println!("  {:<24} {}", game.home_team, format_price(Some(detail.averages.home)));
    if detail.show_draw {
        println!("  {:<24} {}", "Draw", format_price(detail.averages.draw));
    }
    println!("  {:<24} {}", game.away_team, format_price(Some(detail.averages.away)));
    println!();

    for row in &detail.rows {
        let draw = if detail.show_draw {
            format!("{:>7}", format_price(row.draw))
        } else {
            String::new()
        };
        println!(
            "  {:<24} {:>7}{} {:>7}  {}",
            row.title,
            format_price(row.home),
            draw,
            format_price(row.away),
            format_update(row.last_update, offset)
        );
    }
}
