//! Mission section over an in-memory JSON document.

use std::sync::Arc;

use serde_json::Value;

use super::document::{DocumentSection, SECTION_DOCUMENT_VERSION};
use super::kml::mission_kml;
use super::waypoints::parse_waypoints;
use super::{
    MissionSection, SectionError, SectionKind, SectionPayload, SectionSynchronizer, SyncState,
    ViewMode,
};
use crate::vehicle::{TransferEvent, Vehicle};

/// [`DocumentSection`] for the mission, plus the legacy file loaders and
/// KML export.
#[derive(Debug)]
pub struct DocumentMission {
    inner: DocumentSection,
}

impl DocumentMission {
    pub fn new() -> Self {
        Self {
            inner: DocumentSection::new(SectionKind::Mission),
        }
    }

    pub fn document(&self) -> &DocumentSection {
        &self.inner
    }

    pub fn document_mut(&mut self) -> &mut DocumentSection {
        &mut self.inner
    }
}

impl Default for DocumentMission {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionSynchronizer for DocumentMission {
    fn kind(&self) -> SectionKind {
        SectionKind::Mission
    }

    fn start(&mut self, mode: ViewMode) {
        self.inner.start(mode);
    }

    fn bind_vehicle(&mut self, vehicle: Arc<dyn Vehicle>) {
        self.inner.bind_vehicle(vehicle);
    }

    fn supported(&self) -> bool {
        self.inner.supported()
    }

    fn load_from_vehicle(&mut self) {
        self.inner.load_from_vehicle();
    }

    fn send_to_vehicle(&mut self) {
        self.inner.send_to_vehicle();
    }

    fn remove_all(&mut self) {
        self.inner.remove_all();
    }

    fn remove_all_from_vehicle(&mut self) {
        self.inner.remove_all_from_vehicle();
    }

    fn load(&mut self, payload: &SectionPayload) -> Result<(), SectionError> {
        self.inner.load(payload)
    }

    fn save(&self) -> SectionPayload {
        self.inner.save()
    }

    fn state(&self) -> SyncState {
        self.inner.state()
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.inner.set_dirty(dirty);
    }

    fn transfer_complete(&mut self, event: &TransferEvent) {
        self.inner.transfer_complete(event);
    }
}

impl MissionSection for DocumentMission {
    fn load_legacy_file(&mut self, contents: &str) -> Result<(), SectionError> {
        let root: Value = serde_json::from_str(contents)?;
        let Value::Object(root) = root else {
            return Err(SectionError::Format("mission file must be a JSON object".into()));
        };

        let items = match root.get("items") {
            Some(Value::Array(items)) => items.clone(),
            Some(_) => {
                return Err(SectionError::WrongType {
                    key: "items".into(),
                    expected: "an array",
                });
            }
            None => return Err(SectionError::MissingKey("items")),
        };

        let mut payload = SectionPayload::new();
        payload.insert("version".into(), Value::from(SECTION_DOCUMENT_VERSION));
        payload.insert("items".into(), Value::Array(items));
        if let Some(home) = root.get("plannedHomePosition") {
            payload.insert("plannedHomePosition".into(), home.clone());
        }
        self.inner.load(&payload)
    }

    fn load_text_file(&mut self, contents: &str) -> Result<(), SectionError> {
        let parsed = parse_waypoints(contents)?;

        let mut payload = SectionPayload::new();
        payload.insert("version".into(), Value::from(SECTION_DOCUMENT_VERSION));
        payload.insert("items".into(), Value::Array(parsed.items));
        if let Some(home) = parsed.planned_home {
            payload.insert("plannedHomePosition".into(), Value::from(home.to_vec()));
        }
        self.inner.load(&payload)
    }

    fn kml_document(&self) -> Result<String, SectionError> {
        mission_kml(self.inner.payload())
    }
}
