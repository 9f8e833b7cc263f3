//! Section synchronizer interface.
//!
//! A plan has three sections, each owned by a [`SectionSynchronizer`]. The
//! coordinator never looks inside a section payload; it only drives the
//! synchronizers and observes their [`SyncState`].
//!
//! ```text
//! PlanCoordinator
//!     |
//!     v
//! PlanSections { mission, geo_fence, rally_points }
//!     |   load_from_vehicle / send_to_vehicle / remove_all ...
//!     v
//! Arc<dyn Vehicle> --request_download(kind)--> link
//!     |
//!     +--publish(TransferEvent)--> coordinator channel --> transfer_complete
//! ```

pub mod document;
pub mod kml;
pub mod mission;
pub mod waypoints;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vehicle::{TransferEvent, Vehicle};

pub use document::DocumentSection;
pub use mission::DocumentMission;

/// Opaque JSON payload of one plan section.
pub type SectionPayload = serde_json::Map<String, serde_json::Value>;

/// The three sections of a plan, in their fixed transfer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Mission,
    GeoFence,
    RallyPoints,
}

impl SectionKind {
    /// All sections in transfer order.
    pub const ALL: [SectionKind; 3] = [Self::Mission, Self::GeoFence, Self::RallyPoints];

    /// Key holding this section in the combined plan file.
    pub fn json_key(self) -> &'static str {
        match self {
            Self::Mission => "mission",
            Self::GeoFence => "geoFence",
            Self::RallyPoints => "rallyPoints",
        }
    }

    /// Array-valued payload keys whose entries count as section content.
    pub fn item_keys(self) -> &'static [&'static str] {
        match self {
            Self::Mission => &["items"],
            Self::GeoFence => &["polygons", "circles"],
            Self::RallyPoints => &["points"],
        }
    }

    /// The section transferred after this one, if any.
    pub fn next(self) -> Option<SectionKind> {
        match self {
            Self::Mission => Some(Self::GeoFence),
            Self::GeoFence => Some(Self::RallyPoints),
            Self::RallyPoints => None,
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mission => "mission",
            Self::GeoFence => "geofence",
            Self::RallyPoints => "rally points",
        };
        f.write_str(s)
    }
}

/// Operating mode chosen when the coordinator starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Plan editing. Local edits survive a vehicle connecting.
    Edit,
    /// Flight monitoring. The plan always mirrors the connected vehicle.
    #[default]
    Monitor,
}

impl ViewMode {
    pub fn is_monitor(self) -> bool {
        self == Self::Monitor
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Edit => f.write_str("edit"),
            Self::Monitor => f.write_str("monitor"),
        }
    }
}

/// Observable synchronization flags of one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncState {
    /// Local changes not yet saved or sent.
    pub dirty: bool,
    /// The section has at least one item.
    pub contains_items: bool,
    /// A transfer with the vehicle is outstanding.
    pub sync_in_progress: bool,
    /// The bound vehicle offers this section at all.
    pub supported: bool,
}

/// Errors reported by a section when it rejects content.
#[derive(Debug, Error)]
pub enum SectionError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("required key {0:?} is missing")]
    MissingKey(&'static str),

    #[error("key {key:?} must be {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("line {line}: {message}")]
    Line { line: usize, message: String },

    #[error("{0}")]
    Format(String),

    #[error("KML export failed: {0}")]
    Kml(String),
}

/// Contract every section synchronizer satisfies to take part in plan
/// sequencing.
///
/// Transfers are asynchronous: `load_from_vehicle`, `send_to_vehicle` and
/// `remove_all_from_vehicle` only start them. Completion arrives later as a
/// [`TransferEvent`] that the coordinator routes back through
/// [`SectionSynchronizer::transfer_complete`].
pub trait SectionSynchronizer: Send {
    /// Which section this synchronizer owns.
    fn kind(&self) -> SectionKind;

    /// One-time initialization with the coordinator's mode.
    fn start(&mut self, mode: ViewMode);

    /// Rebind to a new manager vehicle. Any transfer state against the
    /// previous vehicle is discarded.
    fn bind_vehicle(&mut self, vehicle: Arc<dyn Vehicle>);

    /// Whether the bound vehicle offers this section.
    fn supported(&self) -> bool;

    /// Begin downloading this section from the vehicle.
    fn load_from_vehicle(&mut self);

    /// Begin uploading this section to the vehicle.
    fn send_to_vehicle(&mut self);

    /// Clear local content.
    fn remove_all(&mut self);

    /// Clear local content and begin clearing it on the vehicle.
    fn remove_all_from_vehicle(&mut self);

    /// Replace local content with a payload from a plan file.
    fn load(&mut self, payload: &SectionPayload) -> Result<(), SectionError>;

    /// Serialize local content for a plan file.
    fn save(&self) -> SectionPayload;

    /// Current synchronization flags.
    fn state(&self) -> SyncState;

    fn set_dirty(&mut self, dirty: bool);

    /// A transfer for this section finished (successfully or not).
    fn transfer_complete(&mut self, event: &TransferEvent);
}

/// The mission section additionally reads legacy single-section formats
/// and exports KML.
pub trait MissionSection: SectionSynchronizer {
    /// Load a legacy `.mission` JSON file.
    fn load_legacy_file(&mut self, contents: &str) -> Result<(), SectionError>;

    /// Load a `QGC WPL 110` waypoint text file.
    fn load_text_file(&mut self, contents: &str) -> Result<(), SectionError>;

    /// Render the mission as a KML document.
    fn kml_document(&self) -> Result<String, SectionError>;

    /// False while the mission is still waiting on data it needs before it
    /// can be saved or sent.
    fn ready_for_save_send(&self) -> bool {
        true
    }
}

/// The three synchronizers of a plan.
pub struct PlanSections {
    pub mission: Box<dyn MissionSection>,
    pub geo_fence: Box<dyn SectionSynchronizer>,
    pub rally_points: Box<dyn SectionSynchronizer>,
}

impl PlanSections {
    pub fn new(
        mission: Box<dyn MissionSection>,
        geo_fence: Box<dyn SectionSynchronizer>,
        rally_points: Box<dyn SectionSynchronizer>,
    ) -> Self {
        Self {
            mission,
            geo_fence,
            rally_points,
        }
    }

    /// Sections backed by in-memory JSON documents.
    pub fn documents() -> Self {
        Self::new(
            Box::new(DocumentMission::new()),
            Box::new(DocumentSection::new(SectionKind::GeoFence)),
            Box::new(DocumentSection::new(SectionKind::RallyPoints)),
        )
    }

    pub fn get(&self, kind: SectionKind) -> &dyn SectionSynchronizer {
        match kind {
            SectionKind::Mission => self.mission.as_ref(),
            SectionKind::GeoFence => self.geo_fence.as_ref(),
            SectionKind::RallyPoints => self.rally_points.as_ref(),
        }
    }

    pub fn get_mut(&mut self, kind: SectionKind) -> &mut dyn SectionSynchronizer {
        match kind {
            SectionKind::Mission => self.mission.as_mut(),
            SectionKind::GeoFence => self.geo_fence.as_mut(),
            SectionKind::RallyPoints => self.rally_points.as_mut(),
        }
    }

    /// Apply `f` to every section in transfer order.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut dyn SectionSynchronizer)) {
        for kind in SectionKind::ALL {
            f(self.get_mut(kind));
        }
    }

    /// True if `pred` holds for any section's state.
    pub fn any(&self, pred: impl Fn(&SyncState) -> bool) -> bool {
        SectionKind::ALL
            .iter()
            .any(|kind| pred(&self.get(*kind).state()))
    }
}

impl fmt::Debug for PlanSections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanSections")
            .field("mission", &self.mission.state())
            .field("geo_fence", &self.geo_fence.state())
            .field("rally_points", &self.rally_points.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_order_is_mission_fence_rally() {
        assert_eq!(SectionKind::Mission.next(), Some(SectionKind::GeoFence));
        assert_eq!(SectionKind::GeoFence.next(), Some(SectionKind::RallyPoints));
        assert_eq!(SectionKind::RallyPoints.next(), None);
        assert_eq!(SectionKind::ALL[0], SectionKind::Mission);
    }

    #[test]
    fn json_keys_match_plan_file_layout() {
        assert_eq!(SectionKind::Mission.json_key(), "mission");
        assert_eq!(SectionKind::GeoFence.json_key(), "geoFence");
        assert_eq!(SectionKind::RallyPoints.json_key(), "rallyPoints");
    }

    #[test]
    fn document_sections_start_empty_and_clean() {
        let sections = PlanSections::documents();
        assert!(!sections.any(|s| s.contains_items));
        assert!(!sections.any(|s| s.dirty));
        assert!(!sections.any(|s| s.sync_in_progress));
        assert_eq!(sections.get(SectionKind::GeoFence).kind(), SectionKind::GeoFence);
    }

    #[test]
    fn get_mut_routes_to_matching_section() {
        let mut sections = PlanSections::documents();
        sections.get_mut(SectionKind::RallyPoints).set_dirty(true);
        assert!(sections.rally_points.state().dirty);
        assert!(!sections.mission.state().dirty);
        assert!(!sections.geo_fence.state().dirty);
    }
}
