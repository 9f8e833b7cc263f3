//! Handlers for the plan file subcommands.
//!
//! Implements:
//! - `plansync show <file>`           -- summarize a plan file
//! - `plansync convert <in> <out>`    -- rewrite any supported file as `.plan`
//! - `plansync kml <in> <out>`        -- export the mission as KML
//!
//! Every handler runs an offline, edit-mode coordinator backed by the
//! config file.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use plansync_core::{
    FileSettingsStore, PlanCoordinator, PlanDocument, PlanSections, SectionKind, VehicleContext,
    ViewMode,
};

use crate::config::PlansyncConfig;

// -----------------------------------------------------------------------
// Coordinator setup
// -----------------------------------------------------------------------

/// Build an offline edit-mode coordinator using the resolved config.
pub fn open_coordinator(config: &PlansyncConfig) -> Result<PlanCoordinator> {
    tracing::debug!(config = %config.path.display(), "opening offline coordinator");
    let settings = FileSettingsStore::open(&config.path)?;
    let mut coordinator = PlanCoordinator::new(PlanSections::documents(), Arc::new(settings))
        .with_policy(config.policy);
    coordinator.start(ViewMode::Edit, &VehicleContext::new());
    Ok(coordinator)
}

fn load(coordinator: &mut PlanCoordinator, input: &Path) -> Result<()> {
    coordinator
        .load_from_file(input)
        .with_context(|| format!("failed to load {}", input.display()))
}

// -----------------------------------------------------------------------
// Summary
// -----------------------------------------------------------------------

/// Item counts for each section of a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSummary {
    pub mission_items: usize,
    pub planned_home: Option<Vec<f64>>,
    pub fence_polygons: usize,
    pub fence_circles: usize,
    pub rally_points: usize,
}

impl PlanSummary {
    pub fn from_document(document: &PlanDocument) -> Self {
        let count = |kind: SectionKind, key: &str| {
            document
                .section(kind)
                .get(key)
                .and_then(Value::as_array)
                .map_or(0, Vec::len)
        };
        let planned_home = document
            .mission
            .get("plannedHomePosition")
            .and_then(Value::as_array)
            .map(|coords| coords.iter().filter_map(Value::as_f64).collect());

        Self {
            mission_items: count(SectionKind::Mission, "items"),
            planned_home,
            fence_polygons: count(SectionKind::GeoFence, "polygons"),
            fence_circles: count(SectionKind::GeoFence, "circles"),
            rally_points: count(SectionKind::RallyPoints, "points"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mission_items == 0
            && self.fence_polygons == 0
            && self.fence_circles == 0
            && self.rally_points == 0
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Mission:      {} item(s)", self.mission_items)?;
        if let Some(home) = &self.planned_home {
            let coords: Vec<String> = home.iter().map(|c| c.to_string()).collect();
            writeln!(f, "  Home:         {}", coords.join(", "))?;
        }
        writeln!(
            f,
            "  GeoFence:     {} polygon(s), {} circle(s)",
            self.fence_polygons, self.fence_circles
        )?;
        write!(f, "  Rally points: {}", self.rally_points)
    }
}

// -----------------------------------------------------------------------
// plansync show <file>
// -----------------------------------------------------------------------

pub fn cmd_show(config: &PlansyncConfig, input: &Path) -> Result<()> {
    let mut coordinator = open_coordinator(config)?;
    load(&mut coordinator, input)?;

    let summary = PlanSummary::from_document(&coordinator.save_to_json());
    println!("Plan: {}", input.display());
    println!("{summary}");
    if summary.is_empty() {
        println!("(plan is empty)");
    }
    Ok(())
}

// -----------------------------------------------------------------------
// plansync convert <in> <out>
// -----------------------------------------------------------------------

pub fn cmd_convert(config: &PlansyncConfig, input: &Path, output: &Path) -> Result<()> {
    let mut coordinator = open_coordinator(config)?;
    load(&mut coordinator, input)?;

    match coordinator.save_to_file(output)? {
        Some(path) => println!("Saved {}", path.display()),
        None => anyhow::bail!("output path is empty"),
    }
    Ok(())
}

// -----------------------------------------------------------------------
// plansync kml <in> <out>
// -----------------------------------------------------------------------

pub fn cmd_kml(config: &PlansyncConfig, input: &Path, output: &Path) -> Result<()> {
    let mut coordinator = open_coordinator(config)?;
    load(&mut coordinator, input)?;

    match coordinator.save_to_kml(output)? {
        Some(path) => println!("Exported {}", path.display()),
        None => anyhow::bail!("output path is empty"),
    }
    Ok(())
}
