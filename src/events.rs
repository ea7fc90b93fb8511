use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::model::Game;

pub const DEFAULT_EVENT_LIMIT: usize = 5;

/// Featured and "live" selections of a game list.
///
/// `live` is the rolling window `[now, now + 1 day]`, not in-play detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassifiedEvents {
    pub featured: Vec<Game>,
    pub live: Vec<Game>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TournamentGroup {
    pub name: String,
    pub games: Vec<Game>,
}

/// Stable ascending sort on kickoff time.
pub fn sort_by_kickoff(games: &mut [Game]) {
    games.sort_by_key(|g| g.commence_time);
}

pub fn classify_events(games: &[Game], now: DateTime<Utc>, limit: usize) -> ClassifiedEvents {
    let mut sorted = games.to_vec();
    sort_by_kickoff(&mut sorted);

    let window_end = now + Duration::days(1);

    let featured = sorted
        .iter()
        .filter(|g| g.commence_time > now)
        .take(limit)
        .cloned()
        .collect();
    let live = sorted
        .iter()
        .filter(|g| g.commence_time >= now && g.commence_time <= window_end)
        .take(limit)
        .cloned()
        .collect();

    ClassifiedEvents { featured, live }
}

/// Buckets games by `sport_title`, in first-seen order. Games keep input order.
pub fn group_by_tournament(games: &[Game]) -> Vec<TournamentGroup> {
    let mut groups: Vec<TournamentGroup> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for game in games {
        let slot = *index.entry(game.sport_title.as_str()).or_insert_with(|| {
            groups.push(TournamentGroup {
                name: game.sport_title.clone(),
                games: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].games.push(game.clone());
    }

    groups
}
