use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;

pub const MISSING: &str = "-";

/// `dd/MM, HH:mm` in the given offset.
pub fn format_kickoff(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).format("%d/%m, %H:%M").to_string()
}

/// `dd/MM/yyyy, HH:mm:ss` in the given offset.
pub fn format_update(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset)
        .format("%d/%m/%Y, %H:%M:%S")
        .to_string()
}

pub fn format_price(price: Option<Decimal>) -> String {
    match price {
        Some(p) => format!("{:.2}", p),
        None => MISSING.to_string(),
    }
}

/// Parses `+HH:MM`, `-HH:MM` or `Z`. Anything else is rejected.
pub fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let (h, m) = rest.split_once(':').unwrap_or((rest, "0"));
    let h: i32 = h.parse().ok()?;
    let m: i32 = m.parse().ok()?;
    if h > 14 || m > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (h * 3600 + m * 60))
}
