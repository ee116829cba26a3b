//! Check-in window classification.
//!
//! A pure function of the current instant, the session schedule and the
//! policy. It keeps no state, so callers evaluate it fresh on every
//! admission check.
//!
//! Boundaries are compared at full timestamp precision and are closed on
//! the on-time side:
//!
//! ```text
//!   too_early  |        on_time        |  late_window  |  expired
//! -------------[-----------------------]---------------]----------->
//!          start - on_time      start + on_time   start + late
//! ```
//!
//! So `start - on_time` and `start + on_time` are both on time, one
//! millisecond past `start + on_time` is late, `start + late` is still late,
//! and anything after it is expired.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::AttendancePolicy;
use crate::types::SessionInfo;

/// Where "now" falls relative to a session's start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceTimeWindow {
    /// Before the on-time window opens.
    TooEarly,
    /// Normal GPS check-in is allowed.
    OnTime,
    /// Past on time; a late reason may be filed.
    LateWindow,
    /// Past the late threshold; only an absence reason may be filed.
    Expired,
}

impl AttendanceTimeWindow {
    /// Classify `now` against the session start.
    #[must_use]
    pub fn evaluate(
        now: DateTime<Utc>,
        session: &SessionInfo,
        policy: &AttendancePolicy,
    ) -> Self {
        let start = session.starts_at;
        let on_time = policy.on_time_threshold();
        // A bound past the representable range never closes.
        let opens = start.checked_sub_signed(on_time);
        let closes = start.checked_add_signed(on_time);
        let late_closes = start.checked_add_signed(policy.late_threshold());

        if opens.is_some_and(|opens| now < opens) {
            Self::TooEarly
        } else if closes.map_or(true, |closes| now <= closes) {
            Self::OnTime
        } else if late_closes.map_or(true, |late_closes| now <= late_closes) {
            Self::LateWindow
        } else {
            Self::Expired
        }
    }

    /// Whether a late or absence reason may be filed.
    #[must_use]
    pub const fn accepts_reason(self) -> bool {
        matches!(self, Self::LateWindow | Self::Expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coordinate;
    use chrono::{Duration, TimeZone};

    fn session_at(start: DateTime<Utc>) -> SessionInfo {
        SessionInfo {
            id: "s1".to_string(),
            title: "Kickoff".to_string(),
            week: 1,
            starts_at: start,
            ends_at: start + Duration::hours(2),
            location: Coordinate::new(37.5, 127.0),
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 14, 0, 0).unwrap()
    }

    fn classify(offset: Duration) -> AttendanceTimeWindow {
        AttendanceTimeWindow::evaluate(
            start() + offset,
            &session_at(start()),
            &AttendancePolicy::default(),
        )
    }

    #[test]
    fn test_too_early_before_window() {
        assert_eq!(classify(Duration::hours(-3)), AttendanceTimeWindow::TooEarly);
        assert_eq!(
            classify(Duration::minutes(-10) - Duration::milliseconds(1)),
            AttendanceTimeWindow::TooEarly
        );
    }

    #[test]
    fn test_on_time_window_is_closed_on_both_ends() {
        assert_eq!(classify(Duration::minutes(-10)), AttendanceTimeWindow::OnTime);
        assert_eq!(classify(Duration::zero()), AttendanceTimeWindow::OnTime);
        assert_eq!(classify(Duration::minutes(10)), AttendanceTimeWindow::OnTime);
    }

    #[test]
    fn test_late_window_is_half_open() {
        assert_eq!(
            classify(Duration::minutes(10) + Duration::milliseconds(1)),
            AttendanceTimeWindow::LateWindow
        );
        assert_eq!(classify(Duration::minutes(25)), AttendanceTimeWindow::LateWindow);
        assert_eq!(classify(Duration::minutes(30)), AttendanceTimeWindow::LateWindow);
    }

    #[test]
    fn test_expired_after_late_threshold() {
        assert_eq!(
            classify(Duration::minutes(30) + Duration::milliseconds(1)),
            AttendanceTimeWindow::Expired
        );
        assert_eq!(classify(Duration::days(1)), AttendanceTimeWindow::Expired);
    }

    #[test]
    fn test_every_minute_maps_to_exactly_one_window() {
        for minute in -60..=60 {
            let expected = match minute {
                m if m < -10 => AttendanceTimeWindow::TooEarly,
                m if m <= 10 => AttendanceTimeWindow::OnTime,
                m if m <= 30 => AttendanceTimeWindow::LateWindow,
                _ => AttendanceTimeWindow::Expired,
            };
            assert_eq!(classify(Duration::minutes(minute)), expected, "minute {minute}");
        }
    }

    #[test]
    fn test_custom_policy() {
        let policy = AttendancePolicy {
            on_time_threshold_minutes: 5,
            late_threshold_minutes: 15,
            ..AttendancePolicy::default()
        };
        let session = session_at(start());
        let at = |m| AttendanceTimeWindow::evaluate(start() + Duration::minutes(m), &session, &policy);

        assert_eq!(at(-6), AttendanceTimeWindow::TooEarly);
        assert_eq!(at(6), AttendanceTimeWindow::LateWindow);
        assert_eq!(at(16), AttendanceTimeWindow::Expired);
    }

    #[test]
    fn test_thresholds_past_the_calendar_never_close() {
        let session = session_at(start());
        let wide = AttendancePolicy {
            on_time_threshold_minutes: i64::MAX / 2,
            late_threshold_minutes: i64::MAX / 2,
            ..AttendancePolicy::default()
        };
        for now in [DateTime::<Utc>::MIN_UTC, start(), DateTime::<Utc>::MAX_UTC] {
            assert_eq!(
                AttendanceTimeWindow::evaluate(now, &session, &wide),
                AttendanceTimeWindow::OnTime
            );
        }

        let late_only = AttendancePolicy {
            late_threshold_minutes: i64::MAX / 2,
            ..AttendancePolicy::default()
        };
        assert_eq!(
            AttendanceTimeWindow::evaluate(DateTime::<Utc>::MAX_UTC, &session, &late_only),
            AttendanceTimeWindow::LateWindow
        );
    }

    #[test]
    fn test_accepts_reason() {
        assert!(!AttendanceTimeWindow::TooEarly.accepts_reason());
        assert!(!AttendanceTimeWindow::OnTime.accepts_reason());
        assert!(AttendanceTimeWindow::LateWindow.accepts_reason());
        assert!(AttendanceTimeWindow::Expired.accepts_reason());
    }
}
