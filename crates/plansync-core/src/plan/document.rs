//! In-memory form of a combined plan file.
//!
//! On disk a plan is a single JSON object:
//!
//! ```json
//! {
//!   "fileType": "Plan",
//!   "groundStation": "plansync",
//!   "version": 1,
//!   "mission": { ... },
//!   "geoFence": { ... },
//!   "rallyPoints": { ... }
//! }
//! ```
//!
//! Section payloads are opaque here; each section validates its own.

use serde::Serialize;

use super::files::{GROUND_STATION, PLAN_FILE_TYPE, PLAN_FILE_VERSION};
use crate::section::{SectionKind, SectionPayload};

/// The three section payloads of a plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanDocument {
    pub mission: SectionPayload,
    pub geo_fence: SectionPayload,
    pub rally_points: SectionPayload,
}

impl PlanDocument {
    pub fn section(&self, kind: SectionKind) -> &SectionPayload {
        match kind {
            SectionKind::Mission => &self.mission,
            SectionKind::GeoFence => &self.geo_fence,
            SectionKind::RallyPoints => &self.rally_points,
        }
    }

    pub fn section_mut(&mut self, kind: SectionKind) -> &mut SectionPayload {
        match kind {
            SectionKind::Mission => &mut self.mission,
            SectionKind::GeoFence => &mut self.geo_fence,
            SectionKind::RallyPoints => &mut self.rally_points,
        }
    }

    /// Serializable view with the file header in front of the sections.
    pub(crate) fn as_file(&self) -> PlanFile<'_> {
        PlanFile {
            file_type: PLAN_FILE_TYPE,
            ground_station: GROUND_STATION,
            version: PLAN_FILE_VERSION,
            mission: &self.mission,
            geo_fence: &self.geo_fence,
            rally_points: &self.rally_points,
        }
    }
}

/// Field order here is the key order written to disk.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlanFile<'a> {
    file_type: &'static str,
    ground_station: &'static str,
    version: i64,
    mission: &'a SectionPayload,
    geo_fence: &'a SectionPayload,
    rally_points: &'a SectionPayload,
}
