//! Platform adapters fed over HTTP.
//!
//! The native shell owns the real location and region-monitoring APIs. It
//! forwards their callbacks to the bridge endpoints, and reads back which
//! region to monitor and whether a one-shot fix was requested.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rollcall_core::{
    AuthorizationState, GeofenceError, GeofencePrimitive, GeofenceRegion, GeofenceResult,
    LocationResult, LocationSource, RegionEvent, RegionEventStream,
};
use tokio::sync::mpsc;
use tracing::debug;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Location source whose fixes arrive through `POST /api/location`.
#[derive(Debug)]
pub struct BridgeLocationSource {
    initial: AuthorizationState,
    requests: Mutex<u64>,
}

impl BridgeLocationSource {
    /// A source reporting `initial` authorization at startup.
    #[must_use]
    pub const fn new(initial: AuthorizationState) -> Self {
        Self {
            initial,
            requests: Mutex::new(0),
        }
    }

    /// One-shot requests started since startup.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        *lock(&self.requests)
    }
}

impl LocationSource for BridgeLocationSource {
    fn authorization(&self) -> AuthorizationState {
        self.initial
    }

    fn request_location(&self) -> LocationResult<()> {
        *lock(&self.requests) += 1;
        debug!("One-shot fix requested from the shell");
        Ok(())
    }
}

type EventSender = mpsc::UnboundedSender<GeofenceResult<RegionEvent>>;

/// Region monitor whose events arrive through `POST /api/geofence/events`.
#[derive(Debug, Default)]
pub struct BridgeGeofence {
    regions: Mutex<HashMap<String, (GeofenceRegion, EventSender)>>,
}

impl BridgeGeofence {
    /// An empty monitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Regions the shell should be monitoring.
    #[must_use]
    pub fn registered(&self) -> Vec<GeofenceRegion> {
        let mut regions: Vec<GeofenceRegion> = lock(&self.regions)
            .values()
            .map(|(region, _)| region.clone())
            .collect();
        regions.sort_by(|a, b| a.id.cmp(&b.id));
        regions
    }

    fn sender(&self, region_id: &str) -> Option<EventSender> {
        lock(&self.regions)
            .get(region_id)
            .map(|(_, sender)| sender.clone())
    }

    /// Forward a platform event. Returns `false` if the region is not
    /// registered or nobody is listening.
    pub fn deliver(&self, event: RegionEvent) -> bool {
        self.sender(&event.region_id)
            .is_some_and(|sender| sender.send(Ok(event)).is_ok())
    }

    /// Forward a platform monitoring failure for a region.
    pub fn fail(&self, region_id: &str, message: String) -> bool {
        self.sender(region_id).is_some_and(|sender| {
            sender
                .send(Err(GeofenceError::StreamFailed(message)))
                .is_ok()
        })
    }
}

impl GeofencePrimitive for BridgeGeofence {
    fn add_region(&self, region: &GeofenceRegion) -> GeofenceResult<RegionEventStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.regions).insert(region.id.clone(), (region.clone(), tx));
        debug!(region_id = %region.id, "Region handed to the shell");
        Ok(rx)
    }

    fn remove_region(&self, region_id: &str) {
        lock(&self.regions).remove(region_id);
        debug!(region_id, "Region withdrawn from the shell");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{Coordinate, RegionState};

    fn region(id: &str) -> GeofenceRegion {
        GeofenceRegion {
            id: id.to_string(),
            center: Coordinate::new(37.5, 127.0),
            radius_meters: 50.0,
        }
    }

    #[test]
    fn test_deliver_reaches_registered_region() {
        let bridge = BridgeGeofence::new();
        let mut rx = bridge.add_region(&region("s1")).unwrap();

        assert!(bridge.deliver(RegionEvent {
            region_id: "s1".to_string(),
            state: RegionState::Satisfied,
        }));
        let event = rx.try_recv().unwrap().unwrap();
        assert_eq!(event.state, RegionState::Satisfied);
    }

    #[test]
    fn test_deliver_to_unknown_region_fails() {
        let bridge = BridgeGeofence::new();
        assert!(!bridge.deliver(RegionEvent {
            region_id: "s1".to_string(),
            state: RegionState::Satisfied,
        }));
    }

    #[test]
    fn test_removed_region_is_not_registered() {
        let bridge = BridgeGeofence::new();
        let _rx = bridge.add_region(&region("s1")).unwrap();
        assert_eq!(bridge.registered().len(), 1);

        bridge.remove_region("s1");
        assert!(bridge.registered().is_empty());
        assert!(!bridge.fail("s1", "gone".to_string()));
    }

    #[test]
    fn test_location_requests_are_counted() {
        let source = BridgeLocationSource::new(AuthorizationState::NotDetermined);
        assert_eq!(source.authorization(), AuthorizationState::NotDetermined);
        source.request_location().unwrap();
        assert_eq!(source.request_count(), 1);
    }
}
