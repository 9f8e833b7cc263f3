//! Vehicle link abstraction.
//!
//! A [`Vehicle`] is the coordinator's view of a connected autopilot (or of
//! the offline placeholder): its identity, link quality, which plan sections
//! it supports, and request primitives for section transfers. Completion of
//! a transfer is published as a [`TransferEvent`] to subscribers registered
//! with [`Vehicle::subscribe`].

pub mod context;
pub mod events;
pub mod offline;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::section::{SectionKind, SectionPayload};

pub use context::VehicleContext;
pub use events::{
    EventSink, Subscription, TransferDirection, TransferEvent, TransferHub, TransferOutcome,
};
pub use offline::OfflineVehicle;

/// Identity of a vehicle. Real vehicles never use [`VehicleId::OFFLINE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub u32);

impl VehicleId {
    /// Identity of the offline placeholder vehicle.
    pub const OFFLINE: VehicleId = VehicleId(0);
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::OFFLINE {
            f.write_str("offline")
        } else {
            write!(f, "vehicle-{}", self.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Platform enums
// ---------------------------------------------------------------------------

/// Autopilot firmware family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirmwareType {
    #[default]
    Px4,
    ArduPilot,
    Generic,
}

impl fmt::Display for FirmwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Px4 => "px4",
            Self::ArduPilot => "ardu_pilot",
            Self::Generic => "generic",
        };
        f.write_str(s)
    }
}

impl FromStr for FirmwareType {
    type Err = PlatformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "px4" => Ok(Self::Px4),
            "ardu_pilot" | "ardupilot" => Ok(Self::ArduPilot),
            "generic" => Ok(Self::Generic),
            other => Err(PlatformParseError::Firmware(other.to_owned())),
        }
    }
}

/// Airframe class of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    #[default]
    MultiRotor,
    FixedWing,
    Vtol,
    Rover,
    Submarine,
    Generic,
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MultiRotor => "multi_rotor",
            Self::FixedWing => "fixed_wing",
            Self::Vtol => "vtol",
            Self::Rover => "rover",
            Self::Submarine => "submarine",
            Self::Generic => "generic",
        };
        f.write_str(s)
    }
}

impl FromStr for VehicleType {
    type Err = PlatformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multi_rotor" => Ok(Self::MultiRotor),
            "fixed_wing" => Ok(Self::FixedWing),
            "vtol" => Ok(Self::Vtol),
            "rover" => Ok(Self::Rover),
            "submarine" => Ok(Self::Submarine),
            "generic" => Ok(Self::Generic),
            other => Err(PlatformParseError::VehicleType(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid firmware or vehicle type string.
#[derive(Debug, Clone, Error)]
pub enum PlatformParseError {
    #[error("invalid firmware type: {0:?}")]
    Firmware(String),

    #[error("invalid vehicle type: {0:?}")]
    VehicleType(String),
}

// ---------------------------------------------------------------------------
// Vehicle trait
// ---------------------------------------------------------------------------

/// A vehicle as seen by the plan coordinator.
///
/// Request methods never block: they hand the request to the link and
/// return. The outcome is published later to every live subscription for
/// that section.
pub trait Vehicle: Send + Sync {
    fn id(&self) -> VehicleId;

    /// True only for the offline placeholder.
    fn is_offline_placeholder(&self) -> bool {
        self.id() == VehicleId::OFFLINE
    }

    fn firmware(&self) -> FirmwareType;

    fn vehicle_type(&self) -> VehicleType;

    /// The link cannot carry bulk plan transfers.
    fn high_latency_link(&self) -> bool;

    /// Whether the vehicle offers the given plan section.
    fn supports(&self, section: SectionKind) -> bool;

    /// The plan download issued when the vehicle connected has finished.
    fn initial_plan_request_complete(&self) -> bool;

    /// Mark the initial plan request finished (used when it got stuck).
    fn force_initial_plan_request_complete(&self);

    fn request_download(&self, section: SectionKind);

    fn request_upload(&self, section: SectionKind, payload: SectionPayload);

    fn request_clear(&self, section: SectionKind);

    /// Deliver completion events for `section` to `sink` until the returned
    /// subscription is dropped.
    fn subscribe(&self, section: SectionKind, sink: EventSink) -> Subscription;
}

// Compile-time assertion: Vehicle must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Vehicle) {}
};
