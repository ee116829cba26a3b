//! Per-session attendance state.
//!
//! An [`AttendanceSession`] is the mutable aggregate a screen binds to. It is
//! created when a session list is loaded, mutated only by the
//! [`SubmissionCoordinator`](crate::coordinator::SubmissionCoordinator), and
//! dropped with the list.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::api::DomainError;
use crate::types::{Attendance, AttendanceStatus, SessionInfo};

/// An asynchronously loaded value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Loadable<T, E> {
    /// Nothing requested yet.
    Idle,
    /// A request is in flight.
    Loading,
    /// The request produced a value.
    Loaded(T),
    /// The request was rejected.
    Failed(E),
}

impl<T, E> Loadable<T, E> {
    /// Whether a request is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// The loaded value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Loaded(value) => Some(value),
            Self::Idle | Self::Loading | Self::Failed(_) => None,
        }
    }

    /// The failure, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&E> {
        match self {
            Self::Failed(error) => Some(error),
            Self::Idle | Self::Loading | Self::Loaded(_) => None,
        }
    }

    /// Short name of the variant, for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Loaded(_) => "loaded",
            Self::Failed(_) => "failed",
        }
    }

    /// Whether moving from `self` to `next` follows the lifecycle
    /// `idle -> loading -> {loaded | failed} -> loading -> ...`.
    ///
    /// `loading -> idle` and `loading -> loaded` are also the rollback moves
    /// for a transport failure.
    #[must_use]
    pub const fn can_transition_to(&self, next: &Self) -> bool {
        match (self, next) {
            (Self::Idle | Self::Loaded(_) | Self::Failed(_), Self::Loading)
            | (Self::Loading, Self::Idle | Self::Loaded(_) | Self::Failed(_))
            | (Self::Idle, Self::Loaded(_)) => true,
            (Self::Idle, Self::Idle | Self::Failed(_))
            | (Self::Loading, Self::Loading)
            | (Self::Loaded(_) | Self::Failed(_), Self::Idle | Self::Loaded(_) | Self::Failed(_)) => {
                false
            }
        }
    }
}

/// Attendance slot of a session.
pub type AttendanceSlot = Loadable<Attendance, DomainError>;

/// Status shown to the participant.
///
/// `PendingApproval` is synthetic: the backend still says `pending`, but the
/// participant submitted during this run and is waiting for an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    /// Not submitted during this run and not decided.
    Pending,
    /// Submitted during this run; awaiting an operator.
    PendingApproval,
    /// Present.
    Present,
    /// Late.
    Late,
    /// Absent.
    Absent,
}

impl From<AttendanceStatus> for DisplayStatus {
    fn from(status: AttendanceStatus) -> Self {
        match status {
            AttendanceStatus::Pending => Self::Pending,
            AttendanceStatus::Present => Self::Present,
            AttendanceStatus::Late => Self::Late,
            AttendanceStatus::Absent => Self::Absent,
        }
    }
}

/// Mutable attendance state of one session instance.
#[derive(Debug, Clone)]
pub struct AttendanceSession {
    info: Arc<SessionInfo>,
    slot: AttendanceSlot,
    has_submitted_this_run: bool,
}

/// A session shared between the coordinator and the screen.
///
/// The lock is only ever held for synchronous reads and transitions, never
/// across an await.
pub type SessionHandle = Arc<Mutex<AttendanceSession>>;

/// Lock a session handle, recovering from poisoning.
pub fn lock_session(handle: &SessionHandle) -> MutexGuard<'_, AttendanceSession> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AttendanceSession {
    /// A session with nothing loaded.
    #[must_use]
    pub fn new(info: impl Into<Arc<SessionInfo>>) -> Self {
        Self {
            info: info.into(),
            slot: Loadable::Idle,
            has_submitted_this_run: false,
        }
    }

    /// A session pre-seeded with a previously fetched record.
    #[must_use]
    pub fn with_attendance(info: impl Into<Arc<SessionInfo>>, attendance: Attendance) -> Self {
        Self {
            info: info.into(),
            slot: Loadable::Loaded(attendance),
            has_submitted_this_run: false,
        }
    }

    /// Wrap in a shareable handle.
    #[must_use]
    pub fn into_handle(self) -> SessionHandle {
        Arc::new(Mutex::new(self))
    }

    /// The schedule this session was created from.
    #[must_use]
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// The attendance slot.
    #[must_use]
    pub const fn state(&self) -> &AttendanceSlot {
        &self.slot
    }

    /// Whether a submission is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.slot.is_loading()
    }

    /// Whether a submission succeeded during this run.
    #[must_use]
    pub const fn has_submitted_this_run(&self) -> bool {
        self.has_submitted_this_run
    }

    /// Replace the slot, returning the previous value.
    ///
    /// The caller sequences transitions; out-of-order moves are logged but
    /// still applied.
    pub fn update_state(&mut self, next: AttendanceSlot) -> AttendanceSlot {
        if !self.slot.can_transition_to(&next) {
            warn!(
                session_id = %self.info.id,
                from = self.slot.name(),
                to = next.name(),
                "Unexpected attendance state transition"
            );
        }
        std::mem::replace(&mut self.slot, next)
    }

    /// Record that a submission succeeded. Irreversible.
    pub fn mark_submitted(&mut self) {
        self.has_submitted_this_run = true;
    }

    /// Status to show.
    #[must_use]
    pub fn attendance_status(&self) -> DisplayStatus {
        let loaded = self.slot.value().map(|attendance| attendance.status);
        let still_pending = loaded.map_or(true, |status| status == AttendanceStatus::Pending);

        if self.has_submitted_this_run && still_pending {
            return DisplayStatus::PendingApproval;
        }
        loaded.map_or(DisplayStatus::Pending, DisplayStatus::from)
    }

    /// Whether the participant can still act on this session.
    #[must_use]
    pub fn is_attendance_available(&self) -> bool {
        matches!(
            self.attendance_status(),
            DisplayStatus::Pending | DisplayStatus::PendingApproval
        )
    }
}
