//! Shared domain types.
//!
//! Sessions, coordinates and attendance records are plain values: they are
//! created once (when a session list is fetched or a submission succeeds) and
//! never mutated in place. The mutable aggregate lives in [`crate::session`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinate {
    /// Latitude in degrees, positive north.
    #[schema(example = 37.5)]
    pub latitude: f64,

    /// Longitude in degrees, positive east.
    #[schema(example = 127.0)]
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and inside their valid ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A location fix delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Position {
    /// Where the device was.
    pub coordinate: Coordinate,

    /// Horizontal accuracy radius in meters, when the platform reports one.
    #[schema(example = 12.5)]
    pub accuracy_meters: Option<f64>,

    /// When the fix was taken (UTC).
    pub recorded_at: DateTime<Utc>,
}

impl Position {
    /// A fix taken right now with unknown accuracy.
    #[must_use]
    pub fn now(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            accuracy_meters: None,
            recorded_at: Utc::now(),
        }
    }

    /// Age of the fix relative to `now`. Fixes from the future count as fresh.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.recorded_at).max(chrono::Duration::zero())
    }
}

/// Immutable description of one schedulable club event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionInfo {
    /// Server-side identifier of the session.
    #[schema(example = "session-42")]
    pub id: String,

    /// Display title.
    #[schema(example = "Week 3 - Ownership and borrowing")]
    pub title: String,

    /// Index of the week inside the curriculum, starting at 1.
    #[schema(example = 3)]
    pub week: u32,

    /// Scheduled start (UTC).
    pub starts_at: DateTime<Utc>,

    /// Scheduled end (UTC).
    pub ends_at: DateTime<Utc>,

    /// Where participants must be to check in.
    pub location: Coordinate,
}

/// Server-side attendance status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    /// Submitted (or never submitted) and awaiting an operator decision.
    Pending,
    /// Checked in on time.
    Present,
    /// Checked in late or excused with a reason.
    Late,
    /// Marked absent.
    Absent,
}

impl AttendanceStatus {
    /// Whether an operator has decided this record.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Proof that the device was at the venue when the request was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocationProof {
    /// Coordinate sent with the request.
    pub coordinate: Coordinate,

    /// Whether the server accepted the coordinate as inside the venue.
    pub verified: bool,

    /// Reverse-geocoded address, if the server resolved one.
    #[schema(example = "123 Teheran-ro, Seoul")]
    pub address: Option<String>,

    /// When the proof was recorded (UTC).
    pub recorded_at: DateTime<Utc>,
}

/// An attendance record returned by the club backend.
///
/// Corrections are new records; an `Attendance` is never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Attendance {
    /// Session this record belongs to.
    #[schema(example = "session-42")]
    pub session_id: String,

    /// Current status.
    pub status: AttendanceStatus,

    /// Location proof for GPS check-ins.
    pub location: Option<LocationProof>,

    /// Free-text reason for late/absent submissions.
    #[schema(example = "Train delayed by 20 minutes")]
    pub reason: Option<String>,

    /// When the record was created (UTC).
    pub created_at: DateTime<Utc>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    #[schema(example = "ok")]
    pub status: String,

    /// Service version.
    #[schema(example = "0.1.0")]
    pub version: String,
}
