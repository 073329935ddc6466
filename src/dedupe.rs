use crate::constants::{NO_DETAILS, PRICE_UNSPECIFIED, TIME_UNSPECIFIED};
use crate::normalize::title_key;
use crate::types::CanonicalEvent;
use std::collections::HashMap;
use tracing::debug;

/// Heuristic ranking of how much usable detail a record carries. Used to
/// pick a winner when two sources describe the same real-world event.
pub fn completeness_score(event: &CanonicalEvent) -> i32 {
    let mut score = 0;
    if event.description.trim().len() > 10 {
        score += 2;
    }
    if event.long_description.len() > 1 {
        score += 2;
    }
    if !(event.long_description.len() == 1 && event.long_description[0] == NO_DETAILS) {
        score += 1;
    }
    if !event.tips.is_empty() {
        score += 1;
    }
    if !event.image_url.is_empty() {
        score += 2;
    }
    if event.time != TIME_UNSPECIFIED {
        score += 1;
    }
    if event.price != PRICE_UNSPECIFIED {
        score += 1;
    }
    score
}

/// `YYYYMMDD` strings compare lexicographically in date order, so the
/// classic interval test works directly on the canonical fields.
fn ranges_overlap(a: &CanonicalEvent, b: &CanonicalEvent) -> bool {
    a.start_date <= b.end_date && b.start_date <= a.end_date
}

/// True when `candidate` should displace the retained `current` entry:
/// higher completeness wins, a score tie goes to the primary source, and
/// everything else keeps the first-seen record.
fn displaces(current: &CanonicalEvent, candidate: &CanonicalEvent) -> bool {
    let current_score = completeness_score(current);
    let candidate_score = completeness_score(candidate);
    if candidate_score != current_score {
        return candidate_score > current_score;
    }
    candidate.source.is_primary() && !current.source.is_primary()
}

/// Merge canonical events from all sources into a list with at most one
/// entry per distinct real-world event.
///
/// Events group by normalized title key. Within a group, overlapping date
/// ranges mean the same real event and only the more complete record
/// survives; disjoint ranges mean a recurring show, so both survive under a
/// start-date-disambiguated key. Each incoming record is compared against
/// the single currently-retained representative for its key, in input
/// order.
pub fn dedupe_events(events: Vec<CanonicalEvent>) -> Vec<CanonicalEvent> {
    let mut kept: Vec<CanonicalEvent> = Vec::new();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();

    for event in events {
        let key = title_key(&event.title);
        merge_at_key(&mut kept, &mut index_by_key, key, event, true);
    }

    kept
}

fn merge_at_key(
    kept: &mut Vec<CanonicalEvent>,
    index_by_key: &mut HashMap<String, usize>,
    key: String,
    event: CanonicalEvent,
    allow_disambiguation: bool,
) {
    match index_by_key.get(&key).copied() {
        None => {
            index_by_key.insert(key, kept.len());
            kept.push(event);
        }
        Some(i) => {
            if ranges_overlap(&kept[i], &event) {
                if displaces(&kept[i], &event) {
                    debug!(
                        "Duplicate '{}': replacing {} (score {}) with {} (score {})",
                        event.title,
                        kept[i].id,
                        completeness_score(&kept[i]),
                        event.id,
                        completeness_score(&event)
                    );
                    kept[i] = event;
                } else {
                    debug!(
                        "Duplicate '{}': keeping {} over {}",
                        event.title, kept[i].id, event.id
                    );
                }
            } else if allow_disambiguation {
                // Same title, disjoint dates: a separate real event, e.g. a
                // recurring show. Retain it under a date-qualified key.
                let date_key = format!("{}-{}", key, event.start_date);
                merge_at_key(kept, index_by_key, date_key, event, false);
            } else {
                debug!(
                    "Duplicate disambiguated key for '{}': keeping first-seen {}",
                    event.title, kept[i].id
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventSource;

    fn event(
        id: &str,
        source: EventSource,
        title: &str,
        start: &str,
        end: &str,
    ) -> CanonicalEvent {
        CanonicalEvent {
            id: id.to_string(),
            source,
            source_ref: id.to_string(),
            category: "performance".to_string(),
            title: title.to_string(),
            description: String::new(),
            start_date: start.to_string(),
            end_date: end.to_string(),
            time: TIME_UNSPECIFIED.to_string(),
            price: PRICE_UNSPECIFIED.to_string(),
            location: "서울".to_string(),
            image_url: String::new(),
            long_description: vec![NO_DETAILS.to_string()],
            tips: Vec::new(),
        }
    }

    fn enrich(mut e: CanonicalEvent, score_points: i32) -> CanonicalEvent {
        // Bump completeness in the same increments the scorer counts
        if score_points >= 2 {
            e.description = "자세한 공연 소개 문구입니다".to_string();
        }
        if score_points >= 4 {
            e.long_description = vec!["첫 문단".to_string(), "둘째 문단".to_string()];
        }
        if score_points >= 5 {
            e.image_url = "https://img.example/poster.jpg".to_string();
        }
        e
    }

    #[test]
    fn overlapping_duplicates_keep_higher_score() {
        // The documented scenario: same title, overlapping ranges, scores 5 vs 3
        let a = enrich(
            event("cp1", EventSource::CulturePortal, "봄 재즈의 밤", "20240301", "20240310"),
            5,
        );
        let b = enrich(
            event("ta1", EventSource::TourApi, "봄 재즈의 밤", "20240305", "20240305"),
            2,
        );
        assert!(completeness_score(&a) > completeness_score(&b));

        let out = dedupe_events(vec![b, a]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "cp1");
    }

    #[test]
    fn score_tie_prefers_primary_source() {
        let a = event("ta1", EventSource::TourApi, "여름 축제", "20240701", "20240710");
        let b = event("cp1", EventSource::CulturePortal, "여름 축제", "20240705", "20240712");
        assert_eq!(completeness_score(&a), completeness_score(&b));

        let out = dedupe_events(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, EventSource::CulturePortal);
    }

    #[test]
    fn score_tie_same_source_keeps_first_seen() {
        let a = event("cp1", EventSource::CulturePortal, "겨울 콘서트", "20241201", "20241210");
        let b = event("cp2", EventSource::CulturePortal, "겨울 콘서트", "20241205", "20241215");

        let out = dedupe_events(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "cp1");
    }

    #[test]
    fn disjoint_ranges_survive_as_separate_events() {
        let spring = event("cp1", EventSource::CulturePortal, "봄 재즈의 밤", "20240301", "20240310");
        let summer = event("cp2", EventSource::CulturePortal, "봄 재즈의 밤", "20240601", "20240605");

        let out = dedupe_events(vec![spring, summer]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn title_variants_normalize_to_one_key() {
        let a = enrich(
            event("cp1", EventSource::CulturePortal, "봄 재즈의 밤!", "20240301", "20240310"),
            5,
        );
        let b = event("ta1", EventSource::TourApi, "봄 재즈의 밤", "20240305", "20240308");

        let out = dedupe_events(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "cp1");
    }

    #[test]
    fn three_way_mix_matches_documented_example() {
        let a = enrich(
            event("cp1", EventSource::CulturePortal, "봄 재즈의 밤", "20240301", "20240310"),
            5,
        );
        let b = enrich(
            event("ta1", EventSource::TourApi, "봄 재즈의 밤", "20240305", "20240305"),
            2,
        );
        let c = event("cp3", EventSource::CulturePortal, "봄 재즈의 밤", "20240601", "20240605");

        let out = dedupe_events(vec![a, b, c]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().any(|e| e.id == "cp1"));
        assert!(out.iter().any(|e| e.id == "cp3"));
    }

    #[test]
    fn scoring_weights_are_pinned() {
        let bare = event("cp1", EventSource::CulturePortal, "x", "20240101", "20240102");
        assert_eq!(completeness_score(&bare), 0);

        let mut full = bare.clone();
        full.description = "충분히 길고 자세한 설명".to_string(); // +2
        full.long_description = vec!["하나".to_string(), "둘".to_string()]; // +2 +1
        full.tips = vec!["예매 필수".to_string()]; // +1
        full.image_url = "https://img.example/p.jpg".to_string(); // +2
        full.time = "19:30".to_string(); // +1
        full.price = "전석 20,000원".to_string(); // +1
        assert_eq!(completeness_score(&full), 10);
    }
}
