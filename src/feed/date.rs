//! Best-effort normalization of feed date text.
//!
//! Feeds disagree wildly on date syntax. Two families are recognized, chosen
//! by the tag the text came from rather than by feed type:
//!
//! - [`DateDialect::PubDate`]: RFC-822-like text from RSS `<pubDate>`
//!   (`Mon, 1 Jan 2024 10:00:00 +0200`), frequently carrying timezone
//!   abbreviations that standard grammars reject.
//! - [`DateDialect::Updated`]: ISO-8601 variants from Atom `<updated>` and
//!   Dublin Core `<dc:date>`.
//!
//! Unparseable text is never an error: it yields `None`, which callers treat
//! as "no date known".

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

/// Date syntax family, determined by the tag that carried the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateDialect {
    /// `<pubDate>`: RFC-822-like.
    PubDate,
    /// `<updated>` / `<date>`: ISO-8601-like.
    Updated,
}

impl DateDialect {
    /// Maps a local tag name to its date dialect, if it is a date tag.
    pub fn from_tag(name: &str) -> Option<Self> {
        match name {
            "pubDate" => Some(Self::PubDate),
            "updated" | "date" => Some(Self::Updated),
            _ => None,
        }
    }
}

/// One attempt in an ordered format list.
#[derive(Debug, Clone, Copy)]
enum Pattern {
    /// The pattern itself carries a numeric offset (`%z`).
    Offset(&'static str),
    /// The pattern ends in a literal `Z`; the time is UTC.
    Utc(&'static str),
}

const PUB_DATE_PATTERNS: &[Pattern] = &[
    Pattern::Offset("%a, %d %b %Y %H:%M:%S %z"),
    Pattern::Offset("%d %b %Y %H:%M:%S %z"),
];

/// Weekday-prefixed pubDate layout without the zone, used for named zones.
const PUB_DATE_NAMED_ZONE: &str = "%a, %d %b %Y %H:%M:%S";

const UPDATED_PATTERNS: &[Pattern] = &[
    Pattern::Offset("%Y-%m-%dT%H:%M:%S%z"),
    Pattern::Utc("%Y-%m-%dT%H:%M:%SZ"),
    Pattern::Offset("%Y-%m-%dT%H:%M:%S%.f%z"),
    Pattern::Utc("%Y-%m-%dT%H:%M:%S%.fZ"),
];

/// Non-standard zone abbreviations seen in the wild, with their numeric offsets.
const ZONE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("MEST", "+0200"),
    ("CEST", "+0200"),
    ("CET", "+0100"),
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
];

/// Zone names meaning UTC, accepted by the named-zone pubDate pattern.
const UTC_ZONE_NAMES: &[&str] = &["GMT", "UT", "UTC", "Z"];

/// Parses `raw` according to `dialect`, returning the first pattern that matches.
///
/// # Examples
///
/// ```
/// use feedsync::feed::{normalize_date, DateDialect};
///
/// let date = normalize_date("Mon, 1 Jan 2024 10:00:00 MEST", DateDialect::PubDate).unwrap();
/// assert_eq!(date.to_rfc3339(), "2024-01-01T08:00:00+00:00");
///
/// assert!(normalize_date("yesterday-ish", DateDialect::Updated).is_none());
/// ```
pub fn normalize_date(raw: &str, dialect: DateDialect) -> Option<DateTime<Utc>> {
    match dialect {
        DateDialect::PubDate => normalize_pub_date(raw),
        DateDialect::Updated => try_patterns(raw.trim(), UPDATED_PATTERNS),
    }
}

fn normalize_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let text = substitute_zone_abbreviation(&collapse_double_spaces(raw.trim()));

    try_patterns(&text, PUB_DATE_PATTERNS)
        .or_else(|| parse_named_zone(&text))
        // Weekday that contradicts the date: retry without it
        .or_else(|| {
            let (_, rest) = text.split_once(", ")?;
            try_patterns(rest, &PUB_DATE_PATTERNS[1..])
        })
}

fn try_patterns(text: &str, patterns: &[Pattern]) -> Option<DateTime<Utc>> {
    patterns.iter().find_map(|pattern| match *pattern {
        Pattern::Offset(fmt) => DateTime::<FixedOffset>::parse_from_str(text, fmt)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Pattern::Utc(fmt) => NaiveDateTime::parse_from_str(text, fmt)
            .ok()
            .map(|naive| naive.and_utc()),
    })
}

/// `Weekday, D Mon YYYY HH:MM:SS <zone name>` where the name means UTC.
fn parse_named_zone(text: &str) -> Option<DateTime<Utc>> {
    let (head, zone) = text.rsplit_once(' ')?;
    if !UTC_ZONE_NAMES.contains(&zone) {
        return None;
    }
    NaiveDateTime::parse_from_str(head, PUB_DATE_NAMED_ZONE)
        .ok()
        .map(|naive| naive.and_utc())
}

fn collapse_double_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_space = false;
    for c in s.chars() {
        if c == ' ' && previous_space {
            continue;
        }
        previous_space = c == ' ';
        out.push(c);
    }
    out
}

/// Replaces a trailing zone abbreviation token with its numeric offset.
fn substitute_zone_abbreviation(text: &str) -> String {
    if let Some((head, zone)) = text.rsplit_once(' ') {
        if let Some((_, offset)) = ZONE_ABBREVIATIONS.iter().find(|(name, _)| *name == zone) {
            return format!("{head} {offset}");
        }
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate, TimeZone};
    use proptest::prelude::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_dialect_from_tag() {
        assert_eq!(DateDialect::from_tag("pubDate"), Some(DateDialect::PubDate));
        assert_eq!(DateDialect::from_tag("updated"), Some(DateDialect::Updated));
        assert_eq!(DateDialect::from_tag("date"), Some(DateDialect::Updated));
        assert_eq!(DateDialect::from_tag("pubdate"), None);
        assert_eq!(DateDialect::from_tag("published"), None);
    }

    #[test]
    fn test_pub_date_numeric_offset() {
        assert_eq!(
            normalize_date("Tue, 02 Jan 2024 10:00:00 +0100", DateDialect::PubDate),
            Some(utc(2024, 1, 2, 9, 0, 0))
        );
    }

    #[test]
    fn test_pub_date_without_weekday() {
        assert_eq!(
            normalize_date("2 Jan 2024 10:00:00 -0000", DateDialect::PubDate),
            Some(utc(2024, 1, 2, 10, 0, 0))
        );
    }

    #[test]
    fn test_pub_date_zone_abbreviations() {
        assert_eq!(
            normalize_date("Mon, 1 Jan 2024 10:00:00 MEST", DateDialect::PubDate),
            Some(utc(2024, 1, 1, 8, 0, 0))
        );
        assert_eq!(
            normalize_date("Mon, 1 Jan 2024 10:00:00 EST", DateDialect::PubDate),
            Some(utc(2024, 1, 1, 15, 0, 0))
        );
        assert_eq!(
            normalize_date("Mon, 1 Jan 2024 10:00:00 PST", DateDialect::PubDate),
            Some(utc(2024, 1, 1, 18, 0, 0))
        );
    }

    #[test]
    fn test_substitution_only_touches_trailing_token() {
        assert_eq!(
            substitute_zone_abbreviation("Mon, 1 Jan 2024 10:00:00 MEST"),
            "Mon, 1 Jan 2024 10:00:00 +0200"
        );
        assert_eq!(
            substitute_zone_abbreviation("Mon, 1 Jan 2024 10:00:00 WEST"),
            "Mon, 1 Jan 2024 10:00:00 WEST"
        );
    }

    #[test]
    fn test_pub_date_named_utc_zone() {
        assert_eq!(
            normalize_date("Mon, 01 Jan 2024 10:00:00 GMT", DateDialect::PubDate),
            Some(utc(2024, 1, 1, 10, 0, 0))
        );
        assert_eq!(
            normalize_date("Mon, 01 Jan 2024 10:00:00 UT", DateDialect::PubDate),
            Some(utc(2024, 1, 1, 10, 0, 0))
        );
    }

    #[test]
    fn test_pub_date_unknown_zone_name() {
        assert_eq!(
            normalize_date("Mon, 01 Jan 2024 10:00:00 XYZ", DateDialect::PubDate),
            None
        );
    }

    #[test]
    fn test_pub_date_double_spaces_collapsed() {
        assert_eq!(
            normalize_date("Mon,  1 Jan 2024  10:00:00   +0000", DateDialect::PubDate),
            Some(utc(2024, 1, 1, 10, 0, 0))
        );
    }

    #[test]
    fn test_pub_date_surrounding_whitespace() {
        assert_eq!(
            normalize_date("\n   Mon, 1 Jan 2024 10:00:00 +0000\n  ", DateDialect::PubDate),
            Some(utc(2024, 1, 1, 10, 0, 0))
        );
    }

    #[test]
    fn test_pub_date_wrong_weekday_falls_back() {
        // 1 Jan 2024 was a Monday
        assert_eq!(
            normalize_date("Fri, 1 Jan 2024 10:00:00 +0000", DateDialect::PubDate),
            Some(utc(2024, 1, 1, 10, 0, 0))
        );
    }

    #[test]
    fn test_updated_variants() {
        let expected = Some(utc(2024, 5, 6, 7, 8, 9));
        for text in [
            "2024-05-06T07:08:09+0000",
            "2024-05-06T09:08:09+02:00",
            "2024-05-06T07:08:09Z",
            "2024-05-06T07:08:09.000Z",
            "2024-05-06T02:08:09.000-05:00",
            "  2024-05-06T07:08:09Z\n",
        ] {
            assert_eq!(normalize_date(text, DateDialect::Updated), expected, "{text}");
        }
    }

    #[test]
    fn test_dialects_do_not_cross() {
        assert_eq!(
            normalize_date("2024-05-06T07:08:09Z", DateDialect::PubDate),
            None
        );
        assert_eq!(
            normalize_date("Mon, 1 Jan 2024 10:00:00 +0000", DateDialect::Updated),
            None
        );
    }

    #[test]
    fn test_garbage_is_none() {
        for text in ["", "   ", "soon", "2024-13-45T99:99:99Z", "Mon, 32 Foo 2024"] {
            assert_eq!(normalize_date(text, DateDialect::PubDate), None);
            assert_eq!(normalize_date(text, DateDialect::Updated), None);
        }
    }

    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    proptest! {
        #[test]
        fn prop_zone_abbreviations_resolve(
            year in 1990i32..2100,
            month in 1u32..=12,
            day in 1u32..=28,
            hour in 0u32..24,
            minute in 0u32..60,
            second in 0u32..60,
            zone_idx in 0usize..ZONE_ABBREVIATIONS.len(),
        ) {
            let (zone, offset) = ZONE_ABBREVIATIONS[zone_idx];
            let date = NaiveDate::from_ymd_opt(year, month, day).unwrap();
            let text = format!(
                "{}, {} {} {} {:02}:{:02}:{:02} {}",
                date.weekday(),
                day,
                MONTHS[month as usize - 1],
                year,
                hour,
                minute,
                second,
                zone
            );

            let parsed = normalize_date(&text, DateDialect::PubDate);
            prop_assert!(parsed.is_some(), "failed to parse {}", text);

            let with_offset = text.replace(zone, offset);
            let expected = DateTime::parse_from_str(&with_offset, "%a, %d %b %Y %H:%M:%S %z")
                .unwrap()
                .with_timezone(&Utc);
            prop_assert_eq!(parsed, Some(expected));
        }

        #[test]
        fn prop_arbitrary_text_never_panics(text in ".{0,64}") {
            let _ = normalize_date(&text, DateDialect::PubDate);
            let _ = normalize_date(&text, DateDialect::Updated);
        }

        #[test]
        fn prop_non_date_words_are_none(text in "[a-z ]{0,40}") {
            prop_assert_eq!(normalize_date(&text, DateDialect::PubDate), None);
            prop_assert_eq!(normalize_date(&text, DateDialect::Updated), None);
        }
    }
}
