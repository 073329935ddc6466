use crate::constants::NO_DETAILS;
use crate::types::EventSource;
use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::ops::RangeInclusive;

/// Canonical category assigned when a provider value has no mapping
pub const DEFAULT_CATEGORY: &str = "other";

/// Hangul syllable block, preserved verbatim in dedup keys
const HANGUL_SYLLABLES: RangeInclusive<char> = '\u{AC00}'..='\u{D7A3}';

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})\s*[.\-/]\s*(\d{1,2})\s*[.\-/]\s*(\d{1,2})").unwrap());

static PARAGRAPH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n\s*\r?\n").unwrap());

/// Provider category strings to canonical tags. Values the providers are
/// known to emit today; anything else maps to [`DEFAULT_CATEGORY`].
static CATEGORY_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        // culture portal genre names
        ("연극", "theater"),
        ("뮤지컬", "musical"),
        ("무용", "dance"),
        ("클래식", "classical"),
        ("콘서트", "concert"),
        ("국악", "traditional"),
        ("전시", "exhibition"),
        ("전시/미술", "exhibition"),
        ("축제", "festival"),
        ("영화", "film"),
        ("교육/체험", "education"),
        ("어린이/가족", "family"),
        // tour api category codes
        ("A0207", "festival"),
        ("A0208", "performance"),
        ("A02070100", "festival"),
        ("A02080100", "performance"),
    ])
});

/// Map a provider category value to its canonical tag, falling back to the
/// default rather than erroring on unknown values.
pub fn map_category(raw: &str) -> &'static str {
    CATEGORY_MAP
        .get(raw.trim())
        .copied()
        .unwrap_or(DEFAULT_CATEGORY)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let caps = DATE_RE.captures(raw)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a provider period string (`"2024.03.01~2024.03.10"`, a single
/// date, dash or slash separated) into a start/end pair.
///
/// A missing or unparsable period resolves to today for both bounds, and a
/// single date resolves to itself for both. Reversed bounds are swapped so
/// the start <= end invariant always holds on the way out.
pub fn parse_period(raw: &str) -> (NaiveDate, NaiveDate) {
    let today = Utc::now().date_naive();
    let mut parts = raw.splitn(2, '~');
    let start = parts.next().and_then(parse_date);
    let end = parts.next().and_then(parse_date);

    match (start, end) {
        (Some(s), Some(e)) => {
            if s <= e {
                (s, e)
            } else {
                (e, s)
            }
        }
        (Some(s), None) => (s, s),
        _ => (today, today),
    }
}

/// Format a date in the `YYYYMMDD` form canonical events carry
pub fn format_yyyymmdd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

pub fn parse_yyyymmdd(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y%m%d").ok()
}

/// Title normalization for identity hashing: all whitespace stripped,
/// lowercased, non-Latin scripts preserved as-is.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Grouping key for cross-source dedup: only ASCII alphanumerics and Hangul
/// syllables survive, lowercased. Punctuation and spacing differences
/// between providers describing the same event fall away.
pub fn title_key(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || HANGUL_SYLLABLES.contains(c))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Stable event identity: source prefix + abs of a 32-bit rolling
/// polynomial hash over the normalized title and resolved start date.
/// Deterministic across runs so re-syncs upsert instead of duplicating.
pub fn event_id(source: EventSource, title: &str, start_date: &str) -> String {
    let seed = format!("{}{}", normalize_title(title), start_date);
    let mut h: i32 = 0;
    for unit in seed.encode_utf16() {
        h = h.wrapping_mul(31).wrapping_add(i32::from(unit));
    }
    format!("{}{}", source.id_prefix(), h.unsigned_abs())
}

/// Split long-form source text on blank-line boundaries, dropping empty
/// segments. An all-empty result becomes a single sentinel paragraph so the
/// sequence is never empty downstream.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let paragraphs: Vec<String> = PARAGRAPH_RE
        .split(text)
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect();

    if paragraphs.is_empty() {
        vec![NO_DETAILS.to_string()]
    } else {
        paragraphs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_period_range() {
        let (start, end) = parse_period("2024.03.01~2024.03.10");
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }

    #[test]
    fn parses_single_date_as_both_bounds() {
        let (start, end) = parse_period("2024.06.01");
        assert_eq!(start, end);
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    }

    #[test]
    fn unparsable_period_defaults_to_today() {
        let today = Utc::now().date_naive();
        assert_eq!(parse_period("상시 공연"), (today, today));
        assert_eq!(parse_period(""), (today, today));
    }

    #[test]
    fn reversed_period_is_swapped() {
        let (start, end) = parse_period("2024.03.10 ~ 2024.03.01");
        assert!(start <= end);
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn dash_and_slash_separators_parse() {
        let (start, _) = parse_period("2024-03-01~2024-03-10");
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let (start, _) = parse_period("2024/3/1");
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn event_id_is_deterministic() {
        let a = event_id(EventSource::CulturePortal, "봄 재즈의 밤", "20240301");
        let b = event_id(EventSource::CulturePortal, "봄 재즈의 밤", "20240301");
        assert_eq!(a, b);
        assert!(a.starts_with("cp"));
    }

    #[test]
    fn event_id_ignores_spacing_and_case() {
        let a = event_id(EventSource::CulturePortal, "Spring Jazz Night", "20240301");
        let b = event_id(EventSource::CulturePortal, "spring  jazz night ", "20240301");
        assert_eq!(a, b);
    }

    #[test]
    fn event_id_varies_with_start_date() {
        let a = event_id(EventSource::TourApi, "봄 재즈의 밤", "20240301");
        let b = event_id(EventSource::TourApi, "봄 재즈의 밤", "20240601");
        assert_ne!(a, b);
    }

    #[test]
    fn title_key_keeps_hangul_and_alphanumerics() {
        assert_eq!(title_key("봄 재즈의 밤!"), "봄재즈의밤");
        assert_eq!(title_key("Jazz Night 2024 (Live)"), "jazznight2024live");
    }

    #[test]
    fn category_mapping_with_fallback() {
        assert_eq!(map_category("연극"), "theater");
        assert_eq!(map_category("A0207"), "festival");
        assert_eq!(map_category("듣도 보도 못한 장르"), DEFAULT_CATEGORY);
    }

    #[test]
    fn paragraph_split_drops_blanks() {
        let text = "첫 문단입니다.\n\n  \n둘째 문단입니다.\r\n\r\n셋째.";
        let paragraphs = split_paragraphs(text);
        assert_eq!(paragraphs.len(), 3);
        assert_eq!(paragraphs[0], "첫 문단입니다.");
    }

    #[test]
    fn empty_text_becomes_sentinel_paragraph() {
        assert_eq!(split_paragraphs("  \n\n "), vec![NO_DETAILS.to_string()]);
    }
}
