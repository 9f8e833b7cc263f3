//! Integration tests for loading and saving plan files through the
//! coordinator.

use std::path::Path;
use std::sync::Arc;

use plansync_core::{
    CoordinatorError, PlanEvent, PlanFileError, SectionKind, SectionSynchronizer, Vehicle,
    VehicleContext, ViewMode,
};
use plansync_test_utils::{
    MockVehicle, coordinator, drain_status, fence_with_polygon, mission_with_items,
    plan_file_json, rally_with_points,
};

fn empty(kind: SectionKind) -> plansync_core::SectionPayload {
    plansync_core::DocumentSection::new(kind).save()
}

fn offline_edit() -> plansync_core::PlanCoordinator {
    let (mut coordinator, _settings) = coordinator();
    coordinator.start(ViewMode::Edit, &VehicleContext::new());
    coordinator
}

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Combined format
// ---------------------------------------------------------------------------

#[test]
fn save_without_extension_then_reload() {
    let tmp = tempfile::TempDir::new().unwrap();
    let source = write(
        tmp.path(),
        "source.plan",
        &plan_file_json(
            &mission_with_items(1),
            &empty(SectionKind::GeoFence),
            &empty(SectionKind::RallyPoints),
        ),
    );

    let mut coordinator = offline_edit();
    coordinator.load_from_file(&source).unwrap();

    let saved = coordinator
        .save_to_file(&tmp.path().join("mission"))
        .unwrap()
        .expect("path was not empty");
    assert_eq!(saved, tmp.path().join("mission.plan"));
    assert!(saved.exists());
    assert_eq!(coordinator.current_plan_file(), Some(saved.as_path()));

    let mut reloaded = offline_edit();
    reloaded.load_from_file(&saved).unwrap();
    assert!(reloaded.contains_items());
    assert!(reloaded.section_state(SectionKind::Mission).contains_items);
    assert!(!reloaded.section_state(SectionKind::GeoFence).contains_items);
    assert!(!reloaded.section_state(SectionKind::RallyPoints).contains_items);
}

#[test]
fn round_trip_preserves_sections() {
    let tmp = tempfile::TempDir::new().unwrap();
    let source = write(
        tmp.path(),
        "full.plan",
        &plan_file_json(&mission_with_items(4), &fence_with_polygon(), &rally_with_points(3)),
    );

    let mut coordinator = offline_edit();
    coordinator.load_from_file(&source).unwrap();
    let original = coordinator.save_to_json();

    let saved = coordinator
        .save_to_file(&tmp.path().join("copy.plan"))
        .unwrap()
        .unwrap();

    let mut reloaded = offline_edit();
    reloaded.load_from_file(&saved).unwrap();
    assert_eq!(reloaded.save_to_json(), original);
    assert_eq!(original.mission["items"].as_array().unwrap().len(), 4);
}

#[test]
fn saved_file_has_plan_header() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut coordinator = offline_edit();
    let path = coordinator
        .save_to_file(&tmp.path().join("empty"))
        .unwrap()
        .unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["fileType"], "Plan");
    assert_eq!(json["version"], 1);
    assert!(json["mission"].is_object());
    assert!(json["geoFence"].is_object());
    assert!(json["rallyPoints"].is_object());
}

#[test]
fn version_mismatch_fails_without_mutation() {
    let tmp = tempfile::TempDir::new().unwrap();
    let good = write(
        tmp.path(),
        "good.plan",
        &plan_file_json(&mission_with_items(2), &fence_with_polygon(), &rally_with_points(1)),
    );

    let mut coordinator = offline_edit();
    coordinator.load_from_file(&good).unwrap();
    let before = coordinator.save_to_json();

    for version in [0, 2, 7] {
        let mut doc: serde_json::Value = serde_json::from_str(&plan_file_json(
            &mission_with_items(9),
            &empty(SectionKind::GeoFence),
            &empty(SectionKind::RallyPoints),
        ))
        .unwrap();
        doc["version"] = serde_json::json!(version);
        let bad = write(tmp.path(), "bad.plan", &doc.to_string());

        let err = coordinator.load_from_file(&bad).unwrap_err();
        assert!(
            matches!(
                err,
                CoordinatorError::LoadFailed {
                    source: PlanFileError::Version { .. },
                    ..
                }
            ),
            "expected version error, got: {err}"
        );
        assert_eq!(coordinator.save_to_json(), before, "sections must be untouched");
        assert!(coordinator.current_plan_file().is_none());
    }
}

#[test]
fn missing_section_error_names_key() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = write(
        tmp.path(),
        "partial.plan",
        r#"{"fileType": "Plan", "version": 1, "mission": {}, "geoFence": {}}"#,
    );

    let mut coordinator = offline_edit();
    let err = coordinator.load_from_file(&path).unwrap_err();
    assert!(err.to_string().contains("rallyPoints"), "got: {err}");
}

#[test]
fn rejected_section_restores_earlier_sections() {
    let tmp = tempfile::TempDir::new().unwrap();
    let good = write(
        tmp.path(),
        "good.plan",
        &plan_file_json(&mission_with_items(2), &fence_with_polygon(), &rally_with_points(1)),
    );
    let mut coordinator = offline_edit();
    coordinator.load_from_file(&good).unwrap();
    let before = coordinator.save_to_json();

    // Mission and fence are acceptable; rally points are not an array.
    let bad = write(
        tmp.path(),
        "bad.plan",
        &serde_json::json!({
            "fileType": "Plan",
            "version": 1,
            "mission": mission_with_items(6),
            "geoFence": {"polygons": [], "circles": []},
            "rallyPoints": {"points": "nope"},
        })
        .to_string(),
    );

    let err = coordinator.load_from_file(&bad).unwrap_err();
    assert!(
        matches!(
            err,
            CoordinatorError::LoadFailed {
                source: PlanFileError::Section {
                    section: SectionKind::RallyPoints,
                    ..
                },
                ..
            }
        ),
        "got: {err}"
    );
    assert_eq!(coordinator.save_to_json(), before);
}

#[test]
fn io_error_clears_current_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let good = write(
        tmp.path(),
        "good.plan",
        &plan_file_json(&mission_with_items(1), &fence_with_polygon(), &rally_with_points(0)),
    );
    let mut coordinator = offline_edit();
    coordinator.load_from_file(&good).unwrap();
    assert!(coordinator.current_plan_file().is_some());

    let err = coordinator
        .load_from_file(&tmp.path().join("missing.plan"))
        .unwrap_err();
    assert!(
        matches!(
            err,
            CoordinatorError::LoadFailed {
                source: PlanFileError::Io(_),
                ..
            }
        ),
        "got: {err}"
    );
    assert!(coordinator.current_plan_file().is_none());
}

#[test]
fn unsupported_extension_is_an_error() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = write(tmp.path(), "route.gpx", "<gpx/>");

    let mut coordinator = offline_edit();
    let err = coordinator.load_from_file(&path).unwrap_err();
    assert!(
        matches!(
            err,
            CoordinatorError::LoadFailed {
                source: PlanFileError::UnsupportedFileType { ref extension },
                ..
            } if extension == "gpx"
        ),
        "got: {err}"
    );
    assert!(!coordinator.contains_items());
}

#[test]
fn empty_paths_are_no_ops() {
    let mut coordinator = offline_edit();
    let mut status = coordinator.subscribe_status();

    coordinator.load_from_file(Path::new("")).unwrap();
    assert_eq!(coordinator.save_to_file(Path::new("")).unwrap(), None);
    assert_eq!(coordinator.save_to_kml(Path::new("")).unwrap(), None);
    assert_eq!(coordinator.save_to_current_file().unwrap(), None);
    assert!(drain_status(&mut status).is_empty());
}

// ---------------------------------------------------------------------------
// Legacy formats
// ---------------------------------------------------------------------------

#[test]
fn legacy_mission_clears_fence_and_rally() {
    let tmp = tempfile::TempDir::new().unwrap();
    let plan = write(
        tmp.path(),
        "full.plan",
        &plan_file_json(&mission_with_items(1), &fence_with_polygon(), &rally_with_points(2)),
    );
    let legacy = write(
        tmp.path(),
        "old.mission",
        r#"{"version": 1, "items": [{"command": 16}, {"command": 21}]}"#,
    );

    let mut coordinator = offline_edit();
    coordinator.load_from_file(&plan).unwrap();
    coordinator.load_from_file(&legacy).unwrap();

    let doc = coordinator.save_to_json();
    assert_eq!(doc.mission["items"].as_array().unwrap().len(), 2);
    assert!(!coordinator.section_state(SectionKind::GeoFence).contains_items);
    assert!(!coordinator.section_state(SectionKind::RallyPoints).contains_items);
    assert_eq!(coordinator.current_plan_file(), Some(tmp.path().join("old.plan").as_path()));
}

#[test]
fn waypoint_text_file_loads_mission() {
    let tmp = tempfile::TempDir::new().unwrap();
    for name in ["route.waypoints", "route.txt"] {
        let path = write(
            tmp.path(),
            name,
            "QGC WPL 110\n0\t1\t0\t16\t0\t0\t0\t0\t47.1\t8.1\t400\t1\n1\t0\t3\t22\t0\t0\t0\t0\t47.2\t8.2\t30\t1\n",
        );

        let mut coordinator = offline_edit();
        coordinator.load_from_file(&path).unwrap();
        assert!(coordinator.section_state(SectionKind::Mission).contains_items);
        assert_eq!(coordinator.current_plan_file(), Some(tmp.path().join("route.plan").as_path()));
    }
}

#[test]
fn malformed_waypoint_file_reports_line() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = write(tmp.path(), "bad.waypoints", "QGC WPL 110\n1 0 3\n");

    let mut coordinator = offline_edit();
    let err = coordinator.load_from_file(&path).unwrap_err();
    assert!(err.to_string().contains("line 2"), "got: {err}");
}

// ---------------------------------------------------------------------------
// Dirty and current-file bookkeeping
// ---------------------------------------------------------------------------

#[test]
fn online_load_marks_dirty_offline_load_does_not() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = write(
        tmp.path(),
        "p.plan",
        &plan_file_json(&mission_with_items(2), &fence_with_polygon(), &rally_with_points(0)),
    );

    let mut offline = offline_edit();
    offline.load_from_file(&path).unwrap();
    assert!(!offline.dirty());

    let vehicle = MockVehicle::new(1).into_arc();
    let (mut online, _settings) = coordinator();
    online.start(ViewMode::Edit, &VehicleContext::new());
    online.active_vehicle_changed(Some(vehicle.clone() as Arc<dyn Vehicle>));
    vehicle.complete_download(SectionKind::Mission, mission_with_items(0));
    online.process_pending_events();

    online.load_from_file(&path).unwrap();
    assert!(online.dirty());
}

#[test]
fn online_save_keeps_dirty() {
    let tmp = tempfile::TempDir::new().unwrap();
    let vehicle = MockVehicle::new(1).into_arc();
    let (mut coordinator, _settings) = coordinator();
    coordinator.start_with_fixed_vehicle(vehicle.clone());
    coordinator.set_dirty(true);

    coordinator.save_to_file(&tmp.path().join("live")).unwrap();
    assert!(coordinator.dirty(), "the vehicle has not seen the saved plan");

    let mut offline = offline_edit();
    offline.set_dirty(true);
    offline.save_to_file(&tmp.path().join("desk")).unwrap();
    assert!(!offline.dirty());
}

#[test]
fn saving_same_path_twice_emits_file_change_once() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut coordinator = offline_edit();
    let mut status = coordinator.subscribe_status();

    coordinator.save_to_file(&tmp.path().join("a.plan")).unwrap();
    coordinator.save_to_current_file().unwrap();

    let changes: Vec<_> = drain_status(&mut status)
        .into_iter()
        .filter(|e| matches!(e, PlanEvent::CurrentPlanFileChanged(_)))
        .collect();
    assert_eq!(
        changes,
        vec![PlanEvent::CurrentPlanFileChanged(Some(tmp.path().join("a.plan")))]
    );
}

#[test]
fn failed_save_clears_current_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut coordinator = offline_edit();
    coordinator.save_to_file(&tmp.path().join("ok.plan")).unwrap();

    let err = coordinator
        .save_to_file(&tmp.path().join("no-such-dir").join("x.plan"))
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::SaveFailed { .. }), "got: {err}");
    assert!(coordinator.current_plan_file().is_none());
}

// ---------------------------------------------------------------------------
// KML
// ---------------------------------------------------------------------------

#[test]
fn kml_export_appends_extension_and_keeps_current_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let source = write(
        tmp.path(),
        "survey.plan",
        &plan_file_json(&mission_with_items(3), &fence_with_polygon(), &rally_with_points(0)),
    );
    let mut coordinator = offline_edit();
    coordinator.load_from_file(&source).unwrap();

    let kml = coordinator
        .save_to_kml(&tmp.path().join("survey-export"))
        .unwrap()
        .unwrap();
    assert_eq!(kml, tmp.path().join("survey-export.kml"));

    let text = std::fs::read_to_string(&kml).unwrap();
    assert!(text.contains("<kml"), "got: {text}");
    assert!(text.contains("LineString"));
    assert_eq!(coordinator.current_plan_file(), Some(source.as_path()));
}

#[test]
fn mission_section_trait_object_is_a_synchronizer() {
    let coordinator = offline_edit();
    let mission: &dyn SectionSynchronizer = &*coordinator.sections().mission;
    assert_eq!(mission.kind(), SectionKind::Mission);
    assert!(coordinator.ready_for_save_send());
}
