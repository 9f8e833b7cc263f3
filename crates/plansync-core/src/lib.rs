//! Flight plan synchronization core.
//!
//! A plan is made of three independently synchronized sections (mission,
//! geofence, rally points). [`PlanCoordinator`] drives the three section
//! synchronizers through ordered download and upload sequences against the
//! current manager vehicle, follows active-vehicle changes, and persists the
//! combined plan file.

pub mod config;
pub mod coordinator;
pub mod plan;
pub mod section;
pub mod state;
pub mod vehicle;

pub use config::{
    ConfigFile, FileSettingsStore, MemorySettingsStore, OfflineDefaults, SettingsStore, SyncPolicy,
};
pub use coordinator::{CoordinatorError, Dispatch, PlanCoordinator, PlanEvent, Rejection};
pub use plan::{PlanDocument, PlanFileError, PlanFileFormat};
pub use section::{
    DocumentMission, DocumentSection, MissionSection, PlanSections, SectionError, SectionKind,
    SectionPayload, SectionSynchronizer, SyncState, ViewMode,
};
pub use state::{Sequence, Stage, StageStep};
pub use vehicle::{
    FirmwareType, OfflineVehicle, Subscription, TransferDirection, TransferEvent, TransferHub,
    TransferOutcome, Vehicle, VehicleContext, VehicleId, VehicleType,
};
