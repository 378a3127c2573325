// Opening-hours schedule parsing + wall-clock range matching
// Pure functions: no I/O, no store access

use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ============================================================================
// DAY OF WEEK
// ============================================================================

/// Day-of-week enumeration as persisted in the store.
///
/// The symbols are fixed by the existing datasets: Thursday is the 4-letter
/// `Thur`, not the ISO `Thu`, and must round-trip verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thur,
    Fri,
    Sat,
    Sun,
}

/// Weekly order, used for range expansion ("Mon - Fri").
pub const ALL_DAYS: [DayOfWeek; 7] = [
    DayOfWeek::Mon,
    DayOfWeek::Tue,
    DayOfWeek::Wed,
    DayOfWeek::Thur,
    DayOfWeek::Fri,
    DayOfWeek::Sat,
    DayOfWeek::Sun,
];

impl DayOfWeek {
    /// Persisted symbol for this day.
    pub fn as_str(&self) -> &'static str {
        match self {
            DayOfWeek::Mon => "Mon",
            DayOfWeek::Tue => "Tue",
            DayOfWeek::Wed => "Wed",
            DayOfWeek::Thur => "Thur",
            DayOfWeek::Fri => "Fri",
            DayOfWeek::Sat => "Sat",
            DayOfWeek::Sun => "Sun",
        }
    }

    /// Look up a day by its persisted symbol. Exact match only.
    pub fn from_symbol(symbol: &str) -> Option<DayOfWeek> {
        ALL_DAYS.iter().copied().find(|d| d.as_str() == symbol)
    }

    /// Position in the weekly order (Mon = 0 .. Sun = 6).
    pub fn index(&self) -> usize {
        ALL_DAYS.iter().position(|d| d == self).unwrap_or(0)
    }
}

impl std::fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SCHEDULE ENTRY
// ============================================================================

/// One normalized (day, open, close) row produced by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub day: DayOfWeek,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
}

// ============================================================================
// TIME-RANGE MATCHER
// ============================================================================

/// True iff `open_time <= probe <= close_time`, inclusive at both ends.
///
/// No wraparound: an entry with `open_time > close_time` describes an empty
/// interval and never matches. Source data can contain such rows; they are
/// kept as-is rather than reinterpreted as overnight spans.
pub fn is_open(open_time: NaiveTime, close_time: NaiveTime, probe: NaiveTime) -> bool {
    open_time <= probe && probe <= close_time
}

// ============================================================================
// OPENING-HOURS PARSER
// ============================================================================

// One `/`-delimited clause: a day group followed by "HH:MM - HH:MM".
static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z,\s-]+)\s+(\d{2}:\d{2})\s*-\s*(\d{2}:\d{2})")
        .expect("segment pattern is valid")
});

/// Parse a free-text schedule like
/// `"Mon - Fri 08:00 - 17:00 / Sat, Sun 08:00 - 12:00"` into normalized
/// schedule entries.
///
/// Behavior preserved from the existing datasets:
/// - segments that do not match the pattern are silently dropped;
/// - day ranges expand by weekly position, no Sun-to-Mon wraparound;
/// - an unknown day symbol is logged and dropped, processing continues;
/// - duplicate entries across segments are all retained, in segment order;
/// - a completely unparsable input yields an empty vec, not an error.
pub fn parse_opening_hours(text: &str) -> Vec<ScheduleEntry> {
    let mut entries = Vec::new();

    for segment in text.split('/') {
        let segment = segment.trim();
        let Some(caps) = SEGMENT_RE.captures(segment) else {
            continue;
        };

        let (Some(open_time), Some(close_time)) =
            (parse_hh_mm(&caps[2]), parse_hh_mm(&caps[3]))
        else {
            continue;
        };

        for symbol in expand_day_group(caps[1].trim()) {
            match DayOfWeek::from_symbol(&symbol) {
                Some(day) => entries.push(ScheduleEntry {
                    day,
                    open_time,
                    close_time,
                }),
                None => {
                    warn!(symbol = %symbol, segment = %segment, "unknown day symbol, entry dropped");
                }
            }
        }
    }

    entries
}

/// Expand a day-group token into its individual day symbols.
///
/// `"Mon - Fri"` expands by position in the weekly order; `"Sat, Sun"` splits
/// on commas. Symbols are returned unvalidated so the caller can report each
/// unknown day individually.
fn expand_day_group(token: &str) -> Vec<String> {
    if token.contains('-') {
        let mut parts = token.splitn(2, '-').map(str::trim);
        let start = parts.next().unwrap_or("");
        let end = parts.next().unwrap_or("");

        match (DayOfWeek::from_symbol(start), DayOfWeek::from_symbol(end)) {
            (Some(s), Some(e)) if s.index() <= e.index() => ALL_DAYS[s.index()..=e.index()]
                .iter()
                .map(|d| d.as_str().to_string())
                .collect(),
            // Backwards range ("Fri - Mon"): no wraparound, expands to nothing
            (Some(_), Some(_)) => Vec::new(),
            _ => {
                warn!(token = %token, "unknown day in range, segment dropped");
                Vec::new()
            }
        }
    } else {
        token.split(',').map(|d| d.trim().to_string()).collect()
    }
}

/// Parse `"HH:MM"` into a wall-clock time (seconds normalized to zero).
fn parse_hh_mm(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M").ok()
}

/// Parse a query-string time like `"14"` or `"14:30"`; minutes default to 0.
pub fn parse_query_time(text: &str) -> Option<NaiveTime> {
    let mut parts = text.splitn(2, ':');
    let hour: u32 = parts.next()?.trim().parse().ok()?;
    let minute: u32 = match parts.next() {
        Some(m) => m.trim().parse().ok()?,
        None => 0,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_is_open_inclusive_boundaries() {
        let open = t(8, 0);
        let close = t(17, 0);

        assert!(is_open(open, close, t(8, 0)), "open boundary is inclusive");
        assert!(is_open(open, close, t(17, 0)), "close boundary is inclusive");
        assert!(is_open(open, close, t(12, 30)));
        assert!(!is_open(open, close, t(7, 59)));
        assert!(!is_open(open, close, t(17, 1)));
    }

    #[test]
    fn test_is_open_inverted_range_never_matches() {
        // open > close describes an empty interval, not an overnight span
        let open = t(22, 0);
        let close = t(2, 0);

        assert!(!is_open(open, close, t(23, 0)));
        assert!(!is_open(open, close, t(1, 0)));
        assert!(!is_open(open, close, t(22, 0)));
    }

    #[test]
    fn test_parse_day_range_and_list() {
        let entries = parse_opening_hours("Mon - Fri 08:00 - 17:00 / Sat, Sun 08:00 - 12:00");

        assert_eq!(entries.len(), 7);

        let weekdays = [
            DayOfWeek::Mon,
            DayOfWeek::Tue,
            DayOfWeek::Wed,
            DayOfWeek::Thur,
            DayOfWeek::Fri,
        ];
        for (entry, day) in entries.iter().zip(weekdays) {
            assert_eq!(entry.day, day);
            assert_eq!(entry.open_time, t(8, 0));
            assert_eq!(entry.close_time, t(17, 0));
        }

        assert_eq!(entries[5].day, DayOfWeek::Sat);
        assert_eq!(entries[6].day, DayOfWeek::Sun);
        assert_eq!(entries[5].open_time, t(8, 0));
        assert_eq!(entries[5].close_time, t(12, 0));
    }

    #[test]
    fn test_parse_split_day_lists() {
        let entries = parse_opening_hours("Mon, Wed, Fri 08:00 - 12:00 / Tue, Thur 14:00 - 18:00");

        assert_eq!(entries.len(), 5);

        let days: Vec<DayOfWeek> = entries.iter().map(|e| e.day).collect();
        assert_eq!(
            days,
            vec![
                DayOfWeek::Mon,
                DayOfWeek::Wed,
                DayOfWeek::Fri,
                DayOfWeek::Tue,
                DayOfWeek::Thur,
            ]
        );

        assert_eq!(entries[3].open_time, t(14, 0));
        assert_eq!(entries[3].close_time, t(18, 0));
        assert!(!days.contains(&DayOfWeek::Sat));
        assert!(!days.contains(&DayOfWeek::Sun));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let text = "Mon - Fri 08:00 - 17:00 / Sat, Sun 08:00 - 12:00";
        assert_eq!(parse_opening_hours(text), parse_opening_hours(text));
    }

    #[test]
    fn test_parse_unparsable_input_yields_empty() {
        assert!(parse_opening_hours("always open").is_empty());
        assert!(parse_opening_hours("").is_empty());
        assert!(parse_opening_hours("08:00 - 17:00").is_empty());
    }

    #[test]
    fn test_parse_drops_unknown_day_symbol() {
        // "Thu" is not in the enumeration (the datasets use "Thur")
        let entries = parse_opening_hours("Tue, Thu 14:00 - 18:00");

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].day, DayOfWeek::Tue);
    }

    #[test]
    fn test_parse_unknown_range_endpoint_drops_segment() {
        let entries = parse_opening_hours("Mon - Funday 08:00 - 17:00 / Sat 09:00 - 12:00");

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].day, DayOfWeek::Sat);
    }

    #[test]
    fn test_parse_keeps_duplicate_days_across_segments() {
        // Overlapping segments both contribute; downstream first-match wins
        let entries = parse_opening_hours("Mon 08:00 - 12:00 / Mon 14:00 - 18:00");

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].day, DayOfWeek::Mon);
        assert_eq!(entries[1].day, DayOfWeek::Mon);
        assert_eq!(entries[0].open_time, t(8, 0));
        assert_eq!(entries[1].open_time, t(14, 0));
    }

    #[test]
    fn test_parse_single_day_segment() {
        let entries = parse_opening_hours("Wed 10:00 - 16:00");

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].day, DayOfWeek::Wed);
        assert_eq!(entries[0].open_time, t(10, 0));
        assert_eq!(entries[0].close_time, t(16, 0));
    }

    #[test]
    fn test_day_symbol_round_trip() {
        for day in ALL_DAYS {
            assert_eq!(DayOfWeek::from_symbol(day.as_str()), Some(day));
        }
        assert_eq!(DayOfWeek::Thur.as_str(), "Thur");
        assert_eq!(DayOfWeek::from_symbol("Thu"), None);
    }

    #[test]
    fn test_parse_query_time_minutes_optional() {
        assert_eq!(parse_query_time("14"), Some(t(14, 0)));
        assert_eq!(parse_query_time("14:30"), Some(t(14, 30)));
        assert_eq!(parse_query_time("08:05"), Some(t(8, 5)));
        assert_eq!(parse_query_time("25:00"), None);
        assert_eq!(parse_query_time("noon"), None);
    }
}
