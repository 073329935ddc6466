/// Source and sentinel constants shared across the pipeline.
/// These keep adapter, dedup, and persistence code agreeing on the same
/// literal values.

// Source tags (used in logs, metrics, and document fields)
pub const CULTURE_PORTAL_API: &str = "culture_portal";
pub const TOUR_API: &str = "tour_api";

// Prefixes for generated event ids, one per source
pub const CULTURE_PORTAL_ID_PREFIX: &str = "cp";
pub const TOUR_API_ID_PREFIX: &str = "ta";

// Sentinel values for fields a provider did not supply. Scoring and
// translation both check against these, so they must not drift.
pub const TIME_UNSPECIFIED: &str = "Time unspecified";
pub const PRICE_UNSPECIFIED: &str = "Price unspecified";
pub const LOCATION_UNSPECIFIED: &str = "Location unspecified";
pub const NO_DETAILS: &str = "No details available.";

/// Language the providers publish in. Localizing into it is a passthrough.
pub const SOURCE_LANGUAGE: &str = "ko";

/// Closed set of supported target languages.
pub const SUPPORTED_LANGUAGES: [&str; 4] = ["ko", "en", "ja", "zh"];

/// Hard cap on a single listing page. Every event fetched fans out into
/// detail, media, and translation calls, so the cap bounds external cost.
pub const MAX_PAGE_SIZE: usize = 200;

/// Returns true if `lang` is one of the supported language codes.
pub fn is_supported_language(lang: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&lang)
}
