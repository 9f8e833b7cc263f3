//! `QGC WPL 110` waypoint text import.
//!
//! Header line `QGC WPL 110`, then one tab or space separated row per item:
//!
//! ```text
//! seq current frame command p1 p2 p3 p4 lat lon alt autocontinue
//! ```
//!
//! Row 0 is the home position; the remaining rows become simple mission
//! items.

use serde_json::{Value, json};

use super::SectionError;

pub const WPL_HEADER: &str = "QGC WPL 110";

const FIELDS_PER_ROW: usize = 12;

/// Mission content parsed from a waypoint file.
#[derive(Debug, Clone, PartialEq)]
pub struct WaypointMission {
    /// `[lat, lon, alt]` of row 0, if present.
    pub planned_home: Option<[f64; 3]>,
    /// Mission items in the plan-file item shape.
    pub items: Vec<Value>,
}

/// Parse a waypoint text file.
pub fn parse_waypoints(contents: &str) -> Result<WaypointMission, SectionError> {
    let mut lines = contents
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    match lines.next() {
        Some((_, header)) if header == WPL_HEADER => {}
        Some((line, header)) => {
            return Err(SectionError::Line {
                line,
                message: format!("expected header {WPL_HEADER:?}, found {header:?}"),
            });
        }
        None => return Err(SectionError::Format("waypoint file is empty".into())),
    }

    let mut mission = WaypointMission {
        planned_home: None,
        items: Vec::new(),
    };

    for (line, text) in lines {
        let row = parse_row(line, text)?;
        if row.seq == 0 {
            mission.planned_home = Some([row.lat, row.lon, row.alt]);
            continue;
        }
        mission.items.push(json!({
            "type": "SimpleItem",
            "autoContinue": row.auto_continue,
            "command": row.command,
            "doJumpId": row.seq,
            "frame": row.frame,
            "params": [row.params[0], row.params[1], row.params[2], row.params[3], row.lat, row.lon, row.alt],
        }));
    }

    Ok(mission)
}

struct Row {
    seq: u32,
    frame: u32,
    command: u32,
    params: [f64; 4],
    lat: f64,
    lon: f64,
    alt: f64,
    auto_continue: bool,
}

fn parse_row(line: usize, text: &str) -> Result<Row, SectionError> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() != FIELDS_PER_ROW {
        return Err(SectionError::Line {
            line,
            message: format!("expected {FIELDS_PER_ROW} fields, found {}", fields.len()),
        });
    }

    let int = |idx: usize, name: &str| -> Result<u32, SectionError> {
        fields[idx].parse::<u32>().map_err(|_| SectionError::Line {
            line,
            message: format!("{name} {:?} is not an unsigned integer", fields[idx]),
        })
    };
    let float = |idx: usize, name: &str| -> Result<f64, SectionError> {
        fields[idx].parse::<f64>().map_err(|_| SectionError::Line {
            line,
            message: format!("{name} {:?} is not a number", fields[idx]),
        })
    };

    Ok(Row {
        seq: int(0, "sequence")?,
        frame: int(2, "frame")?,
        command: int(3, "command")?,
        params: [
            float(4, "param1")?,
            float(5, "param2")?,
            float(6, "param3")?,
            float(7, "param4")?,
        ],
        lat: float(8, "latitude")?,
        lon: float(9, "longitude")?,
        alt: float(10, "altitude")?,
        auto_continue: int(11, "autocontinue")? != 0,
    })
}
