//! Section synchronizer over an in-memory JSON document.

use std::sync::Arc;

use serde_json::Value;

use super::{SectionError, SectionKind, SectionPayload, SectionSynchronizer, SyncState, ViewMode};
use crate::vehicle::{TransferDirection, TransferEvent, TransferOutcome, Vehicle};

/// Payload format version written into every section document.
pub const SECTION_DOCUMENT_VERSION: i64 = 2;

/// A section whose content is the JSON payload itself.
///
/// The payload is kept as-is apart from the array-valued item keys of its
/// [`SectionKind`], which decide whether the section has content.
pub struct DocumentSection {
    kind: SectionKind,
    payload: SectionPayload,
    dirty: bool,
    sync_in_progress: bool,
    mode: ViewMode,
    vehicle: Option<Arc<dyn Vehicle>>,
}

impl DocumentSection {
    pub fn new(kind: SectionKind) -> Self {
        Self {
            kind,
            payload: empty_payload(kind),
            dirty: false,
            sync_in_progress: false,
            mode: ViewMode::default(),
            vehicle: None,
        }
    }

    pub fn payload(&self) -> &SectionPayload {
        &self.payload
    }

    /// Replace the content as a local edit would. Marks the section dirty.
    pub fn replace_payload(&mut self, payload: SectionPayload) -> Result<(), SectionError> {
        validate(self.kind, &payload)?;
        self.payload = normalize(self.kind, payload);
        self.dirty = true;
        Ok(())
    }

    /// Total number of entries across the item keys.
    pub fn item_count(&self) -> usize {
        self.kind
            .item_keys()
            .iter()
            .filter_map(|key| self.payload.get(*key).and_then(Value::as_array))
            .map(Vec::len)
            .sum()
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    fn clear_local(&mut self) {
        if self.item_count() > 0 {
            self.dirty = true;
        }
        self.payload = empty_payload(self.kind);
    }
}

impl SectionSynchronizer for DocumentSection {
    fn kind(&self) -> SectionKind {
        self.kind
    }

    fn start(&mut self, mode: ViewMode) {
        self.mode = mode;
    }

    fn bind_vehicle(&mut self, vehicle: Arc<dyn Vehicle>) {
        tracing::debug!(section = %self.kind, vehicle_id = %vehicle.id(), "section bound");
        self.sync_in_progress = false;
        self.vehicle = Some(vehicle);
    }

    fn supported(&self) -> bool {
        self.vehicle
            .as_ref()
            .is_some_and(|v| v.supports(self.kind))
    }

    fn load_from_vehicle(&mut self) {
        let Some(vehicle) = &self.vehicle else {
            tracing::warn!(section = %self.kind, "download requested with no vehicle bound");
            return;
        };
        self.sync_in_progress = true;
        vehicle.request_download(self.kind);
    }

    fn send_to_vehicle(&mut self) {
        let Some(vehicle) = &self.vehicle else {
            tracing::warn!(section = %self.kind, "upload requested with no vehicle bound");
            return;
        };
        self.sync_in_progress = true;
        vehicle.request_upload(self.kind, self.payload.clone());
    }

    fn remove_all(&mut self) {
        self.clear_local();
    }

    fn remove_all_from_vehicle(&mut self) {
        self.clear_local();
        let Some(vehicle) = &self.vehicle else {
            return;
        };
        self.sync_in_progress = true;
        vehicle.request_clear(self.kind);
    }

    fn load(&mut self, payload: &SectionPayload) -> Result<(), SectionError> {
        validate(self.kind, payload)?;
        self.payload = normalize(self.kind, payload.clone());
        self.dirty = false;
        Ok(())
    }

    fn save(&self) -> SectionPayload {
        self.payload.clone()
    }

    fn state(&self) -> SyncState {
        SyncState {
            dirty: self.dirty,
            contains_items: self.item_count() > 0,
            sync_in_progress: self.sync_in_progress,
            supported: self.supported(),
        }
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    fn transfer_complete(&mut self, event: &TransferEvent) {
        let outstanding = std::mem::replace(&mut self.sync_in_progress, false);
        if !event.is_success() {
            tracing::debug!(
                section = %self.kind,
                direction = ?event.direction,
                "keeping local content after failed transfer"
            );
            return;
        }
        // Edit mode only takes what it asked for; local edits win otherwise.
        if !outstanding && !self.mode().is_monitor() {
            tracing::debug!(
                section = %self.kind,
                direction = ?event.direction,
                "ignoring unrequested completion in edit mode"
            );
            return;
        }

        match (&event.direction, &event.outcome) {
            (TransferDirection::Download, TransferOutcome::Completed { payload: Some(p) }) => {
                match validate(self.kind, p) {
                    Ok(()) => {
                        self.payload = normalize(self.kind, p.clone());
                        self.dirty = false;
                    }
                    Err(e) => {
                        tracing::warn!(section = %self.kind, error = %e, "discarding malformed download");
                    }
                }
            }
            (TransferDirection::Upload, _) => self.dirty = false,
            _ => {}
        }
    }
}

impl std::fmt::Debug for DocumentSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSection")
            .field("kind", &self.kind)
            .field("items", &self.item_count())
            .field("dirty", &self.dirty)
            .field("sync_in_progress", &self.sync_in_progress)
            .field("vehicle", &self.vehicle.as_ref().map(|v| v.id()))
            .finish()
    }
}

/// A document with every item key present and empty.
pub fn empty_payload(kind: SectionKind) -> SectionPayload {
    let mut payload = SectionPayload::new();
    payload.insert("version".into(), Value::from(SECTION_DOCUMENT_VERSION));
    for key in kind.item_keys() {
        payload.insert((*key).into(), Value::Array(Vec::new()));
    }
    payload
}

fn validate(kind: SectionKind, payload: &SectionPayload) -> Result<(), SectionError> {
    if let Some(version) = payload.get("version") {
        if !version.is_i64() && !version.is_u64() {
            return Err(SectionError::WrongType {
                key: "version".into(),
                expected: "an integer",
            });
        }
    }
    for key in kind.item_keys() {
        match payload.get(*key) {
            None | Some(Value::Array(_)) => {}
            Some(_) => {
                return Err(SectionError::WrongType {
                    key: (*key).into(),
                    expected: "an array",
                });
            }
        }
    }
    Ok(())
}

/// Fill in missing item keys so the saved document always has them.
fn normalize(kind: SectionKind, mut payload: SectionPayload) -> SectionPayload {
    payload
        .entry("version")
        .or_insert_with(|| Value::from(SECTION_DOCUMENT_VERSION));
    for key in kind.item_keys() {
        payload
            .entry(*key)
            .or_insert_with(|| Value::Array(Vec::new()));
    }
    payload
}
