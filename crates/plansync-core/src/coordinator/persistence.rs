//! Loading and saving plan files.

use std::path::{Path, PathBuf};

use super::{CoordinatorError, PlanCoordinator, PlanEvent};
use crate::plan::files::{KML_EXTENSION, PLAN_EXTENSION};
use crate::plan::{
    PlanDocument, PlanFileError, PlanFileFormat, canonical_plan_path, decode_plan, encode_plan,
    with_default_extension, write_atomic,
};
use crate::section::{SectionKind, SectionPayload};

impl PlanCoordinator {
    /// Load a plan file, choosing the format by extension.
    ///
    /// On success the current plan file becomes the `.plan` file next to
    /// `path`; on failure it is cleared. An empty path does nothing.
    pub fn load_from_file(&mut self, path: &Path) -> Result<(), CoordinatorError> {
        if path.as_os_str().is_empty() {
            return Ok(());
        }

        match self.load_file_contents(path) {
            Ok(format) => {
                tracing::info!(path = %path.display(), format = ?format, "plan file loaded");
                self.set_current_plan_file(Some(canonical_plan_path(path)));
                if !self.offline() {
                    // Loaded content has not been sent to the vehicle.
                    self.set_dirty(true);
                }
                self.emit(PlanEvent::ContainsItemsChanged(self.contains_items()));
                Ok(())
            }
            Err(source) => {
                tracing::warn!(path = %path.display(), error = %source, "plan file load failed");
                self.set_current_plan_file(None);
                Err(CoordinatorError::LoadFailed {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    fn load_file_contents(&mut self, path: &Path) -> Result<PlanFileFormat, PlanFileError> {
        let format = PlanFileFormat::from_path(path).ok_or_else(|| {
            PlanFileError::UnsupportedFileType {
                extension: path
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            }
        })?;
        let contents = std::fs::read_to_string(path)?;

        match format {
            PlanFileFormat::Plan => {
                let document = decode_plan(&contents)?;
                self.apply_document(&document)?;
            }
            PlanFileFormat::LegacyMission => {
                self.sections
                    .mission
                    .load_legacy_file(&contents)
                    .map_err(|source| PlanFileError::Section {
                        section: SectionKind::Mission,
                        source,
                    })?;
                self.clear_non_mission_sections();
            }
            PlanFileFormat::Waypoints => {
                self.sections
                    .mission
                    .load_text_file(&contents)
                    .map_err(|source| PlanFileError::Section {
                        section: SectionKind::Mission,
                        source,
                    })?;
                self.clear_non_mission_sections();
            }
        }
        Ok(format)
    }

    /// Load every section from `document`. If one rejects its payload the
    /// sections are put back the way they were.
    fn apply_document(&mut self, document: &PlanDocument) -> Result<(), PlanFileError> {
        let snapshot: Vec<(SectionKind, SectionPayload, bool)> = SectionKind::ALL
            .iter()
            .map(|kind| {
                let section = self.sections.get(*kind);
                (*kind, section.save(), section.state().dirty)
            })
            .collect();

        for kind in SectionKind::ALL {
            if let Err(source) = self.sections.get_mut(kind).load(document.section(kind)) {
                for (restore, payload, dirty) in &snapshot {
                    let section = self.sections.get_mut(*restore);
                    if let Err(e) = section.load(payload) {
                        tracing::error!(section = %restore, error = %e, "failed to restore section");
                    }
                    section.set_dirty(*dirty);
                }
                return Err(PlanFileError::Section {
                    section: kind,
                    source,
                });
            }
        }
        Ok(())
    }

    fn clear_non_mission_sections(&mut self) {
        self.sections.geo_fence.remove_all();
        self.sections.rally_points.remove_all();
    }

    /// The combined plan document, without writing it anywhere.
    pub fn save_to_json(&self) -> PlanDocument {
        PlanDocument {
            mission: self.sections.mission.save(),
            geo_fence: self.sections.geo_fence.save(),
            rally_points: self.sections.rally_points.save(),
        }
    }

    /// Save the plan, appending `.plan` when the file name has no
    /// extension. Returns the path written. An empty path does nothing.
    pub fn save_to_file(&mut self, path: &Path) -> Result<Option<PathBuf>, CoordinatorError> {
        if path.as_os_str().is_empty() {
            return Ok(None);
        }
        let target = with_default_extension(path, PLAN_EXTENSION);

        let written = encode_plan(&self.save_to_json())
            .and_then(|text| write_atomic(&target, text.as_bytes()).map_err(PlanFileError::from));

        if let Err(source) = written {
            tracing::warn!(path = %target.display(), error = %source, "plan save failed");
            self.set_current_plan_file(None);
            return Err(CoordinatorError::SaveFailed {
                path: target,
                source,
            });
        }

        tracing::info!(path = %target.display(), "plan saved");
        if self.current_plan_file.as_deref() != Some(target.as_path()) {
            self.set_current_plan_file(Some(target.clone()));
        }
        // Online, the vehicle still lacks the changes.
        if self.offline() {
            self.set_dirty(false);
        }
        Ok(Some(target))
    }

    /// Save back to the current plan file, if there is one.
    pub fn save_to_current_file(&mut self) -> Result<Option<PathBuf>, CoordinatorError> {
        match self.current_plan_file.clone() {
            Some(path) => self.save_to_file(&path),
            None => Ok(None),
        }
    }

    /// Export the mission as KML, appending `.kml` when the file name has
    /// no extension. Does not change the current plan file.
    pub fn save_to_kml(&self, path: &Path) -> Result<Option<PathBuf>, CoordinatorError> {
        if path.as_os_str().is_empty() {
            return Ok(None);
        }
        let target = with_default_extension(path, KML_EXTENSION);

        let written = self
            .sections
            .mission
            .kml_document()
            .map_err(|source| PlanFileError::Section {
                section: SectionKind::Mission,
                source,
            })
            .and_then(|kml| write_atomic(&target, kml.as_bytes()).map_err(PlanFileError::from));

        match written {
            Ok(()) => {
                tracing::info!(path = %target.display(), "KML exported");
                Ok(Some(target))
            }
            Err(source) => Err(CoordinatorError::KmlSaveFailed {
                path: target,
                source,
            }),
        }
    }
}
