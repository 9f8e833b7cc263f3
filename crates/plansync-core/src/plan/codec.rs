//! Plan file encoding and validation.
//!
//! Decoding validates the whole header and every section key before a
//! [`PlanDocument`] is produced, so a rejected file never reaches a section.

use serde_json::Value;
use thiserror::Error;

use super::document::PlanDocument;
use super::files::{PLAN_FILE_TYPE, PLAN_FILE_VERSION};
use crate::section::{SectionError, SectionKind, SectionPayload};

/// Errors from reading or writing plan files.
#[derive(Debug, Error)]
pub enum PlanFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plan file root must be a JSON object")]
    NotAnObject,

    #[error("not a plan file: fileType is {found}, expected {expected:?}")]
    FileType { found: String, expected: &'static str },

    #[error("plan file has no integer version")]
    MissingVersion,

    #[error("plan file version {found} is not supported (expected {expected})")]
    Version { found: i64, expected: i64 },

    #[error("plan file is missing the {0:?} section")]
    MissingKey(&'static str),

    #[error("plan file key {key:?} must be {expected}")]
    WrongKeyType { key: &'static str, expected: &'static str },

    #[error("{section} section rejected: {source}")]
    Section {
        section: SectionKind,
        #[source]
        source: SectionError,
    },

    #[error("unsupported file type {extension:?}")]
    UnsupportedFileType { extension: String },
}

/// Parse and validate a combined plan file.
pub fn decode_plan(contents: &str) -> Result<PlanDocument, PlanFileError> {
    let root: Value = serde_json::from_str(contents)?;
    let Value::Object(mut root) = root else {
        return Err(PlanFileError::NotAnObject);
    };

    match root.get("fileType") {
        Some(Value::String(ft)) if ft == PLAN_FILE_TYPE => {}
        Some(other) => {
            return Err(PlanFileError::FileType {
                found: other.to_string(),
                expected: PLAN_FILE_TYPE,
            });
        }
        None => {
            return Err(PlanFileError::FileType {
                found: "missing".into(),
                expected: PLAN_FILE_TYPE,
            });
        }
    }

    let version = root
        .get("version")
        .and_then(Value::as_i64)
        .ok_or(PlanFileError::MissingVersion)?;
    if version != PLAN_FILE_VERSION {
        return Err(PlanFileError::Version {
            found: version,
            expected: PLAN_FILE_VERSION,
        });
    }

    // Check every key before moving any out.
    for kind in SectionKind::ALL {
        let key = kind.json_key();
        match root.get(key) {
            Some(Value::Object(_)) => {}
            Some(_) => {
                return Err(PlanFileError::WrongKeyType {
                    key,
                    expected: "an object",
                });
            }
            None => return Err(PlanFileError::MissingKey(key)),
        }
    }

    let mut take = |kind: SectionKind| -> SectionPayload {
        match root.remove(kind.json_key()) {
            Some(Value::Object(map)) => map,
            _ => SectionPayload::new(),
        }
    };

    Ok(PlanDocument {
        mission: take(SectionKind::Mission),
        geo_fence: take(SectionKind::GeoFence),
        rally_points: take(SectionKind::RallyPoints),
    })
}

/// Render a plan document as pretty-printed JSON.
pub fn encode_plan(document: &PlanDocument) -> Result<String, PlanFileError> {
    Ok(serde_json::to_string_pretty(&document.as_file())?)
}
