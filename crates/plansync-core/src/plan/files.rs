//! Plan file names, extensions and atomic writes.

use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const PLAN_FILE_TYPE: &str = "Plan";
pub const PLAN_FILE_VERSION: i64 = 1;
pub const GROUND_STATION: &str = "plansync";

pub const PLAN_EXTENSION: &str = "plan";
pub const MISSION_EXTENSION: &str = "mission";
pub const WAYPOINTS_EXTENSION: &str = "waypoints";
pub const TEXT_EXTENSION: &str = "txt";
pub const KML_EXTENSION: &str = "kml";

/// Formats a plan can be loaded from, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFileFormat {
    /// Combined `.plan` JSON.
    Plan,
    /// Legacy mission-only `.mission` JSON.
    LegacyMission,
    /// `QGC WPL 110` text (`.waypoints` or `.txt`).
    Waypoints,
}

impl PlanFileFormat {
    /// Format for `path`, by exact (case-sensitive) extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(OsStr::to_str)? {
            PLAN_EXTENSION => Some(Self::Plan),
            MISSION_EXTENSION => Some(Self::LegacyMission),
            WAYPOINTS_EXTENSION | TEXT_EXTENSION => Some(Self::Waypoints),
            _ => None,
        }
    }
}

/// Append `.{extension}` when the file name has no dot at all.
pub fn with_default_extension(path: &Path, extension: &str) -> PathBuf {
    let has_dot = path
        .file_name()
        .map(|name| name.to_string_lossy().contains('.'))
        .unwrap_or(false);
    if has_dot {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// The `.plan` file a loaded file is saved back to: same directory and
/// stem, plan extension.
pub fn canonical_plan_path(loaded: &Path) -> PathBuf {
    loaded.with_extension(PLAN_EXTENSION)
}

/// Write `contents` to `path` through a temp file in the same directory, so
/// readers never see a partial file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// File dialog filters for opening a plan.
pub fn load_name_filters() -> Vec<String> {
    vec![
        format!(
            "Supported types (*.{PLAN_EXTENSION} *.{MISSION_EXTENSION} *.{WAYPOINTS_EXTENSION} *.{TEXT_EXTENSION})"
        ),
        "All Files (*.*)".to_owned(),
    ]
}

/// File dialog filters for saving a plan.
pub fn save_name_filters() -> Vec<String> {
    vec![
        format!("Plan Files (*.{PLAN_EXTENSION})"),
        "All Files (*.*)".to_owned(),
    ]
}

/// File dialog filters for KML export.
pub fn kml_name_filters() -> Vec<String> {
    vec![
        format!("KML Files (*.{KML_EXTENSION})"),
        "All Files (*.*)".to_owned(),
    ]
}
