//! Recording candidate selection.
//!
//! The carrier does not know which campaign call a recording belongs to;
//! the resolver searches a time window around the best-known call time and
//! picks the closest call that actually has a recording.

use chrono::Duration;
use serde::Serialize;

use crate::types::Timestamp;

/// A carrier call that may carry a recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingCandidate {
    pub call_id: String,
    pub start_time: Option<Timestamp>,
    pub recording_url: Option<String>,
}

impl RecordingCandidate {
    pub fn has_recording(&self) -> bool {
        self.recording_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }
}

/// Symmetric search window `[approx - half_width, approx + half_width]`.
pub fn search_window(approx: Timestamp, half_width: Duration) -> (Timestamp, Timestamp) {
    (approx - half_width, approx + half_width)
}

/// Among candidates with a recording and a start time, the one whose start
/// time is closest to `approx`. Ties go to the earlier candidate in input order.
pub fn select_closest(
    candidates: &[RecordingCandidate],
    approx: Timestamp,
) -> Option<&RecordingCandidate> {
    candidates
        .iter()
        .filter(|c| c.has_recording())
        .filter_map(|c| {
            c.start_time
                .map(|start| ((start - approx).num_milliseconds().unsigned_abs(), c))
        })
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(minutes_from_t: i64) -> Option<Timestamp> {
        Some(t() + Duration::minutes(minutes_from_t))
    }

    fn t() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn candidate(id: &str, start: Option<Timestamp>, url: Option<&str>) -> RecordingCandidate {
        RecordingCandidate {
            call_id: id.to_string(),
            start_time: start,
            recording_url: url.map(str::to_string),
        }
    }

    #[test]
    fn picks_closest_with_recording() {
        let candidates = vec![
            candidate("late", at(10), Some("https://r/late.mp3")),
            candidate("early", at(-2), Some("https://r/early.mp3")),
        ];
        assert_eq!(select_closest(&candidates, t()).unwrap().call_id, "early");
    }

    #[test]
    fn ignores_candidates_without_recording() {
        let candidates = vec![
            candidate("exact", at(0), None),
            candidate("blank", at(0), Some("  ")),
            candidate("far", at(7), Some("https://r/far.mp3")),
        ];
        assert_eq!(select_closest(&candidates, t()).unwrap().call_id, "far");
    }

    #[test]
    fn ignores_candidates_without_start_time() {
        let candidates = vec![candidate("untimed", None, Some("https://r/x.mp3"))];
        assert!(select_closest(&candidates, t()).is_none());
    }

    #[test]
    fn tie_goes_to_first() {
        let candidates = vec![
            candidate("before", at(-3), Some("https://r/a.mp3")),
            candidate("after", at(3), Some("https://r/b.mp3")),
        ];
        assert_eq!(select_closest(&candidates, t()).unwrap().call_id, "before");
    }

    #[test]
    fn window_is_symmetric() {
        let (from, to) = search_window(t(), Duration::minutes(15));
        assert_eq!(t() - from, Duration::minutes(15));
        assert_eq!(to - t(), Duration::minutes(15));
    }
}
