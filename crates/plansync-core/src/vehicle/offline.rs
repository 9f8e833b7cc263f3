//! The offline placeholder vehicle.

use super::{EventSink, FirmwareType, Subscription, Vehicle, VehicleId, VehicleType};
use crate::config::OfflineDefaults;
use crate::section::{SectionKind, SectionPayload};

/// Stand-in manager vehicle used while nothing is connected.
///
/// Plans edited offline are shaped for the firmware and airframe recorded in
/// the offline-editing defaults. It supports every section and has no link,
/// so transfer requests are dropped and no completion is ever published.
#[derive(Debug)]
pub struct OfflineVehicle {
    firmware: FirmwareType,
    vehicle_type: VehicleType,
}

impl OfflineVehicle {
    pub fn new(defaults: OfflineDefaults) -> Self {
        Self {
            firmware: defaults.firmware,
            vehicle_type: defaults.vehicle_type,
        }
    }
}

impl Vehicle for OfflineVehicle {
    fn id(&self) -> VehicleId {
        VehicleId::OFFLINE
    }

    fn firmware(&self) -> FirmwareType {
        self.firmware
    }

    fn vehicle_type(&self) -> VehicleType {
        self.vehicle_type
    }

    fn high_latency_link(&self) -> bool {
        false
    }

    fn supports(&self, _section: SectionKind) -> bool {
        true
    }

    fn initial_plan_request_complete(&self) -> bool {
        true
    }

    fn force_initial_plan_request_complete(&self) {}

    fn request_download(&self, section: SectionKind) {
        tracing::warn!(section = %section, "download requested from offline vehicle, ignoring");
    }

    fn request_upload(&self, section: SectionKind, _payload: SectionPayload) {
        tracing::warn!(section = %section, "upload requested to offline vehicle, ignoring");
    }

    fn request_clear(&self, section: SectionKind) {
        tracing::warn!(section = %section, "clear requested on offline vehicle, ignoring");
    }

    fn subscribe(&self, _section: SectionKind, _sink: EventSink) -> Subscription {
        Subscription::inert()
    }
}
