//! Device location state.
//!
//! The platform reports fixes, failures and permission changes through
//! callbacks. [`LocationProvider`] is the single state holder those callbacks
//! write into: it caches the authorization state and the last known
//! position, publishes accepted fixes on a watch channel, and backs one-shot
//! requests with a single pending slot.
//!
//! At most one one-shot request is outstanding per provider. Concurrent
//! callers join the pending request and all receive the same result. The
//! slot is emptied with `Option::take` before any waiter is resolved, so each
//! request is answered exactly once. Waiters that are still pending when the
//! provider is torn down observe [`LocationError::Cancelled`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::types::Position;

/// Whether the user allowed location access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    /// Access granted.
    Granted,
    /// Access refused or restricted.
    Denied,
    /// The user has not been asked yet.
    NotDetermined,
}

impl AuthorizationState {
    /// Whether fixes may be requested.
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Errors raised by location requests.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    /// The user has not granted location access.
    #[error("Location access has not been granted")]
    AuthorizationDenied,

    /// The platform cannot produce fixes right now.
    #[error("Location services are unavailable: {0}")]
    Unavailable(String),

    /// The platform reported a failure for the request.
    #[error("Location request failed: {0}")]
    RequestFailed(String),

    /// The request was abandoned before a fix arrived.
    #[error("Location request was cancelled")]
    Cancelled,
}

/// Result alias for location operations.
pub type LocationResult<T> = std::result::Result<T, LocationError>;

/// Platform location primitive.
///
/// `request_location` only starts a fix; the outcome is delivered later
/// through [`LocationProvider::handle_update`] or
/// [`LocationProvider::handle_error`]. Implementations must not call back
/// into the provider from inside `request_location`.
pub trait LocationSource: Send + Sync {
    /// Authorization state at startup.
    fn authorization(&self) -> AuthorizationState;

    /// Ask the platform for a single fix.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be started.
    fn request_location(&self) -> LocationResult<()>;
}

type FixSender = oneshot::Sender<LocationResult<Position>>;

#[derive(Default)]
struct PendingFix {
    waiters: Vec<FixSender>,
}

struct ProviderState {
    authorization: AuthorizationState,
    pending: Option<PendingFix>,
}

struct ProviderInner {
    source: Arc<dyn LocationSource>,
    state: Mutex<ProviderState>,
    positions: watch::Sender<Option<Position>>,
}

/// Owns the cached location state for one attendance screen.
#[derive(Clone)]
pub struct LocationProvider {
    inner: Arc<ProviderInner>,
}

impl std::fmt::Debug for LocationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationProvider")
            .field("authorization", &self.authorization_state())
            .field("last_known", &self.last_known_position())
            .field("pending", &self.has_pending_request())
            .finish()
    }
}

impl LocationProvider {
    /// Create a provider over a platform source.
    pub fn new(source: Arc<dyn LocationSource>) -> Self {
        let authorization = source.authorization();
        let (positions, _) = watch::channel(None);

        Self {
            inner: Arc::new(ProviderInner {
                source,
                state: Mutex::new(ProviderState {
                    authorization,
                    pending: None,
                }),
                positions,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current authorization state.
    #[must_use]
    pub fn authorization_state(&self) -> AuthorizationState {
        self.lock().authorization
    }

    /// The most recent accepted fix.
    #[must_use]
    pub fn last_known_position(&self) -> Option<Position> {
        *self.inner.positions.borrow()
    }

    /// Whether a one-shot request is waiting for the platform.
    #[must_use]
    pub fn has_pending_request(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Subscribe to accepted fixes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Position>> {
        self.inner.positions.subscribe()
    }

    /// Request a single fix, joining the pending request if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::AuthorizationDenied`] without contacting the
    /// platform when access is denied, the platform's error if the request
    /// fails, or [`LocationError::Cancelled`] if the request is abandoned.
    pub async fn request_one_shot(&self) -> LocationResult<Position> {
        let (tx, rx) = oneshot::channel();

        let starts_request = {
            let mut state = self.lock();
            if state.authorization == AuthorizationState::Denied {
                return Err(LocationError::AuthorizationDenied);
            }
            match state.pending.as_mut() {
                Some(pending) => {
                    pending.waiters.push(tx);
                    false
                }
                None => {
                    state.pending = Some(PendingFix { waiters: vec![tx] });
                    true
                }
            }
        };

        if starts_request {
            debug!("Requesting one-shot location fix");
            if let Err(e) = self.inner.source.request_location() {
                self.resolve_pending(Err(e));
            }
        } else {
            debug!("Joining pending one-shot location request");
        }

        rx.await.unwrap_or(Err(LocationError::Cancelled))
    }

    /// Return the cached fix if it is at most `max_age` old, otherwise
    /// request a fresh one.
    ///
    /// # Errors
    ///
    /// Same as [`Self::request_one_shot`].
    pub async fn current_position(
        &self,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> LocationResult<Position> {
        if let Some(position) = self.last_known_position() {
            let fresh = position
                .age(now)
                .to_std()
                .map_or(true, |age| age <= max_age);
            if fresh {
                return Ok(position);
            }
        }
        self.request_one_shot().await
    }

    /// Platform callback: a new fix arrived.
    ///
    /// Fixes with out-of-range coordinates are dropped.
    pub fn handle_update(&self, position: Position) {
        if !position.coordinate.is_valid() {
            warn!(
                latitude = position.coordinate.latitude,
                longitude = position.coordinate.longitude,
                "Ignoring invalid location fix"
            );
            return;
        }

        self.inner.positions.send_replace(Some(position));
        self.resolve_pending(Ok(position));
    }

    /// Platform callback: the location manager reported a failure.
    pub fn handle_error(&self, error: LocationError) {
        warn!(error = %error, "Location update failed");
        self.resolve_pending(Err(error));
    }

    /// Platform callback: the user changed location permission.
    pub fn handle_authorization_change(&self, authorization: AuthorizationState) {
        let previous = {
            let mut state = self.lock();
            std::mem::replace(&mut state.authorization, authorization)
        };

        if previous != authorization {
            info!(?previous, current = ?authorization, "Location authorization changed");
        }
        if authorization == AuthorizationState::Denied {
            self.resolve_pending(Err(LocationError::AuthorizationDenied));
        }
    }

    /// Abandon the pending one-shot request, if any.
    pub fn cancel_pending(&self) {
        self.resolve_pending(Err(LocationError::Cancelled));
    }

    fn resolve_pending(&self, result: LocationResult<Position>) {
        let Some(pending) = self.lock().pending.take() else {
            return;
        };

        debug!(
            waiters = pending.waiters.len(),
            ok = result.is_ok(),
            "Resolving one-shot location request"
        );
        for waiter in pending.waiters {
            // A waiter whose future was dropped is fine to skip.
            let _ = waiter.send(result.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLocationSource;
    use crate::types::Coordinate;
    use tokio_test::{assert_pending, assert_ready, task};

    fn provider(authorization: AuthorizationState) -> (Arc<MockLocationSource>, LocationProvider) {
        let source = Arc::new(MockLocationSource::new(authorization));
        let provider = LocationProvider::new(source.clone());
        (source, provider)
    }

    fn fix(lat: f64, lon: f64) -> Position {
        Position::now(Coordinate::new(lat, lon))
    }

    #[test]
    fn test_concurrent_requests_share_one_platform_request() {
        let (source, provider) = provider(AuthorizationState::Granted);

        let mut first = task::spawn(provider.request_one_shot());
        let mut second = task::spawn(provider.request_one_shot());
        assert_pending!(first.poll());
        assert_pending!(second.poll());
        assert_eq!(source.request_count(), 1);
        assert!(provider.has_pending_request());

        let position = fix(37.5, 127.0);
        provider.handle_update(position);

        assert!(first.is_woken());
        assert_eq!(assert_ready!(first.poll()), Ok(position));
        assert_eq!(assert_ready!(second.poll()), Ok(position));
        assert!(!provider.has_pending_request());
        assert_eq!(provider.last_known_position(), Some(position));
    }

    #[test]
    fn test_next_request_after_resolution_starts_fresh() {
        let (source, provider) = provider(AuthorizationState::Granted);

        let mut first = task::spawn(provider.request_one_shot());
        assert_pending!(first.poll());
        provider.handle_update(fix(37.5, 127.0));
        assert!(assert_ready!(first.poll()).is_ok());

        let mut second = task::spawn(provider.request_one_shot());
        assert_pending!(second.poll());
        assert_eq!(source.request_count(), 2);
    }

    #[tokio::test]
    async fn test_denied_authorization_fails_immediately() {
        let (source, provider) = provider(AuthorizationState::Denied);

        let result = provider.request_one_shot().await;
        assert_eq!(result, Err(LocationError::AuthorizationDenied));
        assert_eq!(source.request_count(), 0);
    }

    #[tokio::test]
    async fn test_source_start_failure_resolves_request() {
        let (source, provider) = provider(AuthorizationState::Granted);
        source.fail_next_request(LocationError::Unavailable("gps off".into()));

        let result = provider.request_one_shot().await;
        assert_eq!(result, Err(LocationError::Unavailable("gps off".into())));
        assert!(!provider.has_pending_request());
    }

    #[test]
    fn test_error_callback_resolves_all_waiters() {
        let (_, provider) = provider(AuthorizationState::NotDetermined);

        let mut first = task::spawn(provider.request_one_shot());
        let mut second = task::spawn(provider.request_one_shot());
        assert_pending!(first.poll());
        assert_pending!(second.poll());

        provider.handle_error(LocationError::RequestFailed("timeout".into()));

        let expected = Err(LocationError::RequestFailed("timeout".into()));
        assert_eq!(assert_ready!(first.poll()), expected);
        assert_eq!(assert_ready!(second.poll()), expected);
    }

    #[test]
    fn test_cancel_resumes_with_cancelled() {
        let (_, provider) = provider(AuthorizationState::Granted);

        let mut request = task::spawn(provider.request_one_shot());
        assert_pending!(request.poll());

        provider.cancel_pending();
        assert_eq!(assert_ready!(request.poll()), Err(LocationError::Cancelled));

        // A late fix after cancellation has nobody to resolve.
        provider.handle_update(fix(37.5, 127.0));
        assert!(!provider.has_pending_request());
    }

    #[test]
    fn test_revoking_permission_fails_pending_request() {
        let (_, provider) = provider(AuthorizationState::Granted);

        let mut request = task::spawn(provider.request_one_shot());
        assert_pending!(request.poll());

        provider.handle_authorization_change(AuthorizationState::Denied);
        assert_eq!(
            assert_ready!(request.poll()),
            Err(LocationError::AuthorizationDenied)
        );
        assert_eq!(provider.authorization_state(), AuthorizationState::Denied);
    }

    #[tokio::test]
    async fn test_current_position_prefers_fresh_cache() {
        let (source, provider) = provider(AuthorizationState::Granted);
        let position = fix(37.5, 127.0);
        provider.handle_update(position);

        let got = provider
            .current_position(Duration::from_secs(30), Utc::now())
            .await;
        assert_eq!(got, Ok(position));
        assert_eq!(source.request_count(), 0);
    }

    #[test]
    fn test_current_position_refreshes_stale_cache() {
        let (source, provider) = provider(AuthorizationState::Granted);
        provider.handle_update(fix(37.5, 127.0));

        let later = Utc::now() + chrono::Duration::minutes(5);
        let mut request = task::spawn(provider.current_position(Duration::from_secs(30), later));
        assert_pending!(request.poll());
        assert_eq!(source.request_count(), 1);

        let fresh = fix(37.6, 127.1);
        provider.handle_update(fresh);
        assert_eq!(assert_ready!(request.poll()), Ok(fresh));
    }

    #[test]
    fn test_invalid_fix_is_ignored() {
        let (_, provider) = provider(AuthorizationState::Granted);
        provider.handle_update(fix(123.0, 0.0));
        assert_eq!(provider.last_known_position(), None);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let (_, provider) = provider(AuthorizationState::Granted);
        let mut rx = provider.subscribe();

        let position = fix(37.5, 127.0);
        provider.handle_update(position);

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Some(position));
    }
}
