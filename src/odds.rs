use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::model::{Bookmaker, Game, H2H_MARKET, Outcome};

const PRICE_DP: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum PriceError {
    #[error("american price of 0 has no decimal equivalent")]
    Zero,
    #[error("american price {0} is not a finite number")]
    NonFinite(f64),
    #[error("american price {0} is out of range")]
    OutOfRange(f64),
}

/// Converts an American price to decimal odds, rounded half-up to cents.
///
/// Positive prices pay `price` per 100 staked, negative prices need `|price|`
/// staked to win 100. Zero (including prices too small to represent) is
/// rejected instead of producing an infinity.
pub fn american_to_decimal(price: f64) -> Result<Decimal, PriceError> {
    if !price.is_finite() {
        return Err(PriceError::NonFinite(price));
    }
    let american = Decimal::from_f64(price).ok_or(PriceError::OutOfRange(price))?;
    if american.is_zero() {
        return Err(PriceError::Zero);
    }
    let raw = if american > Decimal::ZERO {
        american
            .checked_div(Decimal::ONE_HUNDRED)
            .and_then(|v| v.checked_add(Decimal::ONE))
    } else {
        Decimal::ONE_HUNDRED
            .checked_div(american.abs())
            .and_then(|v| v.checked_add(Decimal::ONE))
    };
    raw.map(round_cents).ok_or(PriceError::OutOfRange(price))
}

fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRICE_DP, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeRole {
    Home,
    Away,
    /// Anything that is neither team. Multi-runner markets fold here too.
    Draw,
}

pub fn outcome_role(game: &Game, outcome_name: &str) -> OutcomeRole {
    if outcome_name == game.home_team {
        OutcomeRole::Home
    } else if outcome_name == game.away_team {
        OutcomeRole::Away
    } else {
        OutcomeRole::Draw
    }
}

/// Mean decimal h2h price per side across every bookmaker quoting the game.
///
/// `home` and `away` report `0` when nobody priced them; `draw` is `None`
/// unless at least one bookmaker priced a draw-role outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AggregatedOdds {
    pub home: Decimal,
    pub away: Decimal,
    pub draw: Option<Decimal>,
}

#[derive(Debug, Default)]
struct RolePrices {
    home: Vec<Decimal>,
    away: Vec<Decimal>,
    draw: Vec<Decimal>,
}

pub fn aggregate(game: &Game) -> AggregatedOdds {
    let prices = collect_h2h_prices(game);
    AggregatedOdds {
        home: mean_cents(&prices.home).unwrap_or(Decimal::ZERO),
        away: mean_cents(&prices.away).unwrap_or(Decimal::ZERO),
        draw: mean_cents(&prices.draw),
    }
}

fn collect_h2h_prices(game: &Game) -> RolePrices {
    let mut out = RolePrices::default();
    for bookmaker in &game.bookmakers {
        let Some(market) = bookmaker.market(H2H_MARKET) else {
            continue;
        };
        for outcome in &market.outcomes {
            let decimal = match american_to_decimal(outcome.price) {
                Ok(v) => v,
                Err(err) => {
                    debug!(
                        game = %game.id,
                        bookmaker = %bookmaker.key,
                        outcome = %outcome.name,
                        "skipping outcome: {err}"
                    );
                    continue;
                }
            };
            match outcome_role(game, &outcome.name) {
                OutcomeRole::Home => out.home.push(decimal),
                OutcomeRole::Away => out.away.push(decimal),
                OutcomeRole::Draw => out.draw.push(decimal),
            }
        }
    }
    out
}

fn mean_cents(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum: Decimal = values.iter().sum();
    Some(round_cents(sum / Decimal::from(values.len())))
}

/// One line of the per-bookmaker comparison table. `None` renders as `-`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookmakerOddsRow {
    pub key: String,
    pub title: String,
    pub last_update: DateTime<Utc>,
    pub home: Option<Decimal>,
    pub draw: Option<Decimal>,
    pub away: Option<Decimal>,
}

pub fn bookmaker_rows(game: &Game) -> Vec<BookmakerOddsRow> {
    game.bookmakers
        .iter()
        .map(|bookmaker| bookmaker_row(game, bookmaker))
        .collect()
}

fn bookmaker_row(game: &Game, bookmaker: &Bookmaker) -> BookmakerOddsRow {
    let outcomes = bookmaker
        .market(H2H_MARKET)
        .map(|m| m.outcomes.as_slice())
        .unwrap_or_default();
    let price_for = |role: OutcomeRole| {
        outcomes
            .iter()
            .find(|o| outcome_role(game, &o.name) == role)
            .and_then(|o: &Outcome| american_to_decimal(o.price).ok())
    };

    BookmakerOddsRow {
        key: bookmaker.key.clone(),
        title: bookmaker.title.clone(),
        last_update: bookmaker.last_update,
        home: price_for(OutcomeRole::Home),
        draw: price_for(OutcomeRole::Draw),
        away: price_for(OutcomeRole::Away),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::{
        AggregatedOdds, OutcomeRole, PriceError, aggregate, american_to_decimal, bookmaker_rows,
        outcome_role,
    };
    use crate::model::{Bookmaker, Game, Market, Outcome};

    fn outcome(name: &str, price: f64) -> Outcome {
        Outcome {
            name: name.to_string(),
            price,
        }
    }

    fn bookmaker(key: &str, markets: Vec<Market>) -> Bookmaker {
        Bookmaker {
            key: key.to_string(),
            title: key.to_uppercase(),
            last_update: Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap(),
            markets,
        }
    }

    fn h2h(outcomes: Vec<Outcome>) -> Market {
        Market {
            key: "h2h".to_string(),
            outcomes,
        }
    }

    fn game(bookmakers: Vec<Bookmaker>) -> Game {
        Game {
            id: "g1".to_string(),
            sport_key: "soccer_epl".to_string(),
            sport_title: "EPL".to_string(),
            commence_time: Utc.with_ymd_and_hms(2026, 10, 20, 15, 0, 0).unwrap(),
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            bookmakers,
        }
    }

    #[test]
    fn even_money_is_two_from_both_sides() {
        assert_eq!(american_to_decimal(100.0), Ok(dec!(2.00)));
        assert_eq!(american_to_decimal(-100.0), Ok(dec!(2.00)));
    }

    #[test]
    fn converts_favourites_and_underdogs() {
        assert_eq!(american_to_decimal(-150.0), Ok(dec!(1.67)));
        assert_eq!(american_to_decimal(130.0), Ok(dec!(2.30)));
        assert_eq!(american_to_decimal(220.0), Ok(dec!(3.20)));
        assert_eq!(american_to_decimal(-200.0), Ok(dec!(1.50)));
        assert_eq!(american_to_decimal(-110.0), Ok(dec!(1.91)));
    }

    #[test]
    fn positive_prices_never_drop_below_one_cent_profit() {
        for p in (1..=5000).step_by(7) {
            let d = american_to_decimal(p as f64).expect("valid");
            assert!(d >= dec!(1.01), "price {p} -> {d}");
        }
    }

    #[test]
    fn long_favourites_stay_between_one_and_two() {
        for p in (101..=10_000).step_by(13) {
            let d = american_to_decimal(-(p as f64)).expect("valid");
            assert!(d > Decimal::ONE && d < dec!(2), "price -{p} -> {d}");
        }
    }

    #[test]
    fn zero_and_non_finite_prices_are_rejected() {
        assert_eq!(american_to_decimal(0.0), Err(PriceError::Zero));
        assert_eq!(american_to_decimal(-0.0), Err(PriceError::Zero));
        assert!(matches!(
            american_to_decimal(f64::NAN),
            Err(PriceError::NonFinite(_))
        ));
        assert!(matches!(
            american_to_decimal(f64::INFINITY),
            Err(PriceError::NonFinite(_))
        ));
        assert!(matches!(
            american_to_decimal(1e40),
            Err(PriceError::OutOfRange(_))
        ));
    }

    #[test]
    fn vanishing_prices_are_rejected_without_panicking() {
        assert_eq!(american_to_decimal(1e-30), Err(PriceError::Zero));
        assert_eq!(american_to_decimal(-1e-30), Err(PriceError::Zero));
        assert_eq!(
            american_to_decimal(-1e-27),
            Err(PriceError::OutOfRange(-1e-27))
        );
    }

    #[test]
    fn empty_game_aggregates_to_zero_without_draw() {
        let agg = aggregate(&game(Vec::new()));
        assert_eq!(
            agg,
            AggregatedOdds {
                home: Decimal::ZERO,
                away: Decimal::ZERO,
                draw: None,
            }
        );
    }

    #[test]
    fn outcomes_are_classified_by_team_name() {
        let g = game(vec![bookmaker(
            "fanduel",
            vec![h2h(vec![
                outcome("Arsenal", -150.0),
                outcome("Chelsea", 130.0),
                outcome("Draw", 220.0),
            ])],
        )]);
        let agg = aggregate(&g);
        assert_eq!(agg.home, dec!(1.67));
        assert_eq!(agg.away, dec!(2.3));
        assert_eq!(agg.draw, Some(dec!(3.2)));
    }

    #[test]
    fn mean_rounds_half_up_to_cents() {
        let g = game(vec![
            bookmaker("a", vec![h2h(vec![outcome("Arsenal", -150.0)])]),
            bookmaker("b", vec![h2h(vec![outcome("Arsenal", -200.0)])]),
        ]);
        let agg = aggregate(&g);
        assert_eq!(agg.home, dec!(1.59));
        assert_eq!(agg.away, Decimal::ZERO);
        assert_eq!(agg.draw, None);
    }

    #[test]
    fn bookmakers_without_h2h_are_skipped() {
        let spreads = Market {
            key: "spreads".to_string(),
            outcomes: vec![outcome("Arsenal", -500.0), outcome("Chelsea", 400.0)],
        };
        let g = game(vec![
            bookmaker("spreads_only", vec![spreads]),
            bookmaker("empty", Vec::new()),
            bookmaker(
                "full",
                vec![h2h(vec![outcome("Arsenal", 120.0), outcome("Chelsea", -140.0)])],
            ),
        ]);
        let agg = aggregate(&g);
        assert_eq!(agg.home, dec!(2.2));
        assert_eq!(agg.away, dec!(1.71));
        assert_eq!(agg.draw, None);
    }

    #[test]
    fn zero_price_outcome_does_not_poison_the_mean() {
        let g = game(vec![
            bookmaker("bad", vec![h2h(vec![outcome("Arsenal", 0.0)])]),
            bookmaker("good", vec![h2h(vec![outcome("Arsenal", 150.0)])]),
        ]);
        assert_eq!(aggregate(&g).home, dec!(2.5));
    }

    #[test]
    fn vanishing_prices_are_skipped_by_aggregate_and_rows() {
        let g = game(vec![
            bookmaker(
                "tiny",
                vec![h2h(vec![outcome("Arsenal", -1e-30), outcome("Chelsea", -1e-27)])],
            ),
            bookmaker("good", vec![h2h(vec![outcome("Chelsea", 200.0)])]),
        ]);
        let agg = aggregate(&g);
        assert_eq!(agg.home, Decimal::ZERO);
        assert_eq!(agg.away, dec!(3.0));

        let rows = bookmaker_rows(&g);
        assert_eq!(rows[0].home, None);
        assert_eq!(rows[0].away, None);
    }

    #[test]
    fn unknown_names_fold_into_draw() {
        let g = game(vec![bookmaker(
            "a",
            vec![h2h(vec![outcome("Tie", 300.0), outcome("Other", 100.0)])],
        )]);
        assert_eq!(outcome_role(&g, "Tie"), OutcomeRole::Draw);
        assert_eq!(aggregate(&g).draw, Some(dec!(3.0)));
    }

    #[test]
    fn aggregation_is_repeatable() {
        let g = game(vec![bookmaker(
            "a",
            vec![h2h(vec![outcome("Arsenal", -120.0), outcome("Draw", 250.0)])],
        )]);
        assert_eq!(aggregate(&g), aggregate(&g));
    }

    #[test]
    fn rows_mark_missing_prices_as_none() {
        let g = game(vec![
            bookmaker(
                "a",
                vec![h2h(vec![
                    outcome("Chelsea", 110.0),
                    outcome("Arsenal", -130.0),
                    outcome("Draw", 240.0),
                ])],
            ),
            bookmaker("b", Vec::new()),
        ]);
        let rows = bookmaker_rows(&g);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "A");
        assert_eq!(rows[0].home, Some(dec!(1.77)));
        assert_eq!(rows[0].away, Some(dec!(2.1)));
        assert_eq!(rows[0].draw, Some(dec!(3.4)));
        assert_eq!(rows[1].home, None);
        assert_eq!(rows[1].draw, None);
        assert_eq!(rows[1].away, None);
    }
}
