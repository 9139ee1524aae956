//! `pubDate` parsing for the RFC-822-like formats found in real feeds.
//!
//! Feeds disagree on field order and on how the zone is written, so a small
//! closed set of layouts is tried in a fixed order. The first layout that
//! matches wins, which keeps ambiguous strings deterministic.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc, Weekday};

/// Where the zone token sits in a layout.
#[derive(Debug, Clone, Copy)]
enum ZoneSlot {
    /// `... 2016 EST`
    Last,
    /// `... EST 2016`
    BeforeYear,
}

#[derive(Debug, Clone, Copy)]
struct Layout {
    /// Day name is followed by a comma (`Tue, 03 May ...`).
    weekday_comma: bool,
    /// chrono pattern for the remaining tokens once the zone is removed.
    pattern: &'static str,
    zone: ZoneSlot,
}

/// Tried top to bottom.
///
/// 1. `EEE, dd MMM yyyy HH:mm:ss zzz`
/// 2. `EEE, dd MMM yyyy HH:mm zzz`
/// 3. `EEE MMM dd HH:mm:ss yyyy zzz`
/// 4. `EEE MMM dd HH:mm yyyy zzz`
/// 5. `EEE MMM dd HH:mm:ss zzz yyyy`
/// 6. `EEE MMM dd HH:mm zzz yyyy`
const LAYOUTS: [Layout; 6] = [
    Layout {
        weekday_comma: true,
        pattern: "%d %b %Y %H:%M:%S",
        zone: ZoneSlot::Last,
    },
    Layout {
        weekday_comma: true,
        pattern: "%d %b %Y %H:%M",
        zone: ZoneSlot::Last,
    },
    Layout {
        weekday_comma: false,
        pattern: "%b %d %H:%M:%S %Y",
        zone: ZoneSlot::Last,
    },
    Layout {
        weekday_comma: false,
        pattern: "%b %d %H:%M %Y",
        zone: ZoneSlot::Last,
    },
    Layout {
        weekday_comma: false,
        pattern: "%b %d %H:%M:%S %Y",
        zone: ZoneSlot::BeforeYear,
    },
    Layout {
        weekday_comma: false,
        pattern: "%b %d %H:%M %Y",
        zone: ZoneSlot::BeforeYear,
    },
];

/// Every layout is a day name followed by this many tokens. Anything after
/// them, such as a `(UTC)` comment, is ignored.
const TOKENS_AFTER_WEEKDAY: usize = 5;

/// Named zones with fixed offsets, in minutes east of UTC.
const NAMED_ZONES: &[(&str, i32)] = &[
    ("UT", 0),
    ("UTC", 0),
    ("GMT", 0),
    ("Z", 0),
    ("WET", 0),
    ("WEST", 60),
    ("BST", 60),
    ("CET", 60),
    ("CEST", 120),
    ("EET", 120),
    ("EEST", 180),
    ("MSK", 180),
    ("IST", 330),
    ("JST", 540),
    ("KST", 540),
    ("AEST", 600),
    ("AEDT", 660),
    ("EST", -300),
    ("EDT", -240),
    ("CST", -360),
    ("CDT", -300),
    ("MST", -420),
    ("MDT", -360),
    ("PST", -480),
    ("PDT", -420),
    ("AKST", -540),
    ("AKDT", -480),
    ("HST", -600),
];

/// Parses a feed date such as `Tue, 03 May 2016 11:46:11 EST`.
///
/// Returns `None` when no layout matches; a bad date is an expected outcome
/// for feeds, not an error. The day name must be a real weekday but is not
/// checked against the calendar date. Text after the date is ignored.
pub fn parse_pub_date(text: &str) -> Option<DateTime<Utc>> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let (weekday, rest) = tokens.split_first()?;
    let rest = rest.get(..TOKENS_AFTER_WEEKDAY)?;

    LAYOUTS
        .iter()
        .find_map(|layout| parse_with_layout(layout, weekday, rest))
}

fn parse_with_layout(layout: &Layout, weekday: &str, rest: &[&str]) -> Option<DateTime<Utc>> {
    let day_name = if layout.weekday_comma {
        weekday.strip_suffix(',')?
    } else {
        weekday
    };
    day_name.parse::<Weekday>().ok()?;

    let zone_index = match layout.zone {
        ZoneSlot::Last => rest.len() - 1,
        ZoneSlot::BeforeYear => rest.len() - 2,
    };
    let offset = zone_offset(rest[zone_index])?;

    let fields: Vec<&str> = rest
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != zone_index)
        .map(|(_, token)| *token)
        .collect();
    let naive = NaiveDateTime::parse_from_str(&fields.join(" "), layout.pattern).ok()?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Resolves `+0200`, `-05:00`, `GMT+2`, `EST` and friends to a fixed offset.
fn zone_offset(token: &str) -> Option<FixedOffset> {
    let upper = token.to_ascii_uppercase();

    if let Some((_, minutes)) = NAMED_ZONES.iter().find(|(name, _)| *name == upper) {
        return FixedOffset::east_opt(minutes * 60);
    }

    let numeric = upper
        .strip_prefix("GMT")
        .or_else(|| upper.strip_prefix("UTC"))
        .unwrap_or(&upper);
    numeric_offset(numeric)
}

fn numeric_offset(token: &str) -> Option<FixedOffset> {
    let (sign, digits) = match token.as_bytes().first()? {
        b'+' => (1, &token[1..]),
        b'-' => (-1, &token[1..]),
        _ => return None,
    };
    let digits: String = match digits.split_once(':') {
        Some((hours, minutes)) if minutes.len() == 2 => format!("{hours:0>2}{minutes}"),
        Some(_) => return None,
        None if digits.len() <= 2 => format!("{digits:0>2}00"),
        None => digits.to_string(),
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
