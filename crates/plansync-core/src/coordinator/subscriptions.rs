//! Completion subscriptions held against the manager vehicle.

use crate::section::SectionKind;
use crate::vehicle::{EventSink, Subscription, Vehicle, VehicleId};

/// One subscription per section on a single vehicle. Dropping the set
/// cancels all three.
#[derive(Debug)]
pub(crate) struct SubscriptionSet {
    vehicle: VehicleId,
    mission: Subscription,
    geo_fence: Subscription,
    rally_points: Subscription,
}

impl SubscriptionSet {
    pub(crate) fn subscribe(vehicle: &dyn Vehicle, sink: &EventSink) -> Self {
        tracing::debug!(vehicle_id = %vehicle.id(), "subscribing to section completions");
        Self {
            vehicle: vehicle.id(),
            mission: vehicle.subscribe(SectionKind::Mission, sink.clone()),
            geo_fence: vehicle.subscribe(SectionKind::GeoFence, sink.clone()),
            rally_points: vehicle.subscribe(SectionKind::RallyPoints, sink.clone()),
        }
    }

    pub(crate) fn vehicle(&self) -> VehicleId {
        self.vehicle
    }

    pub(crate) fn is_active(&self) -> bool {
        self.mission.is_active() && self.geo_fence.is_active() && self.rally_points.is_active()
    }
}
