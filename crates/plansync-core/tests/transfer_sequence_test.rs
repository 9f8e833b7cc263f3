//! Integration tests for ordered plan downloads and uploads.

use std::sync::Arc;

use plansync_core::{
    CoordinatorError, Dispatch, MemorySettingsStore, OfflineDefaults, PlanCoordinator,
    PlanSections, Rejection, SectionKind, Stage, SyncPolicy, TransferDirection, Vehicle,
    VehicleContext, ViewMode,
};
use plansync_test_utils::{
    MockVehicle, Request, coordinator, fence_with_polygon, mission_with_items, plan_file_json,
    rally_with_points,
};

/// Edit-mode coordinator connected to `vehicle`, with the connect-time pull
/// already finished (the vehicle had an empty plan).
fn connected(vehicle: &Arc<MockVehicle>) -> PlanCoordinator {
    let (mut coordinator, _settings) = coordinator();
    let context = VehicleContext::new();
    context.set_active(Some(vehicle.clone() as Arc<dyn Vehicle>));
    coordinator.start(ViewMode::Edit, &context);

    finish_download(&mut coordinator, vehicle, 0);
    vehicle.take_requests();
    coordinator
}

/// Answer every download request in order until the sequence goes idle.
fn finish_download(coordinator: &mut PlanCoordinator, vehicle: &MockVehicle, items: usize) {
    while coordinator.load_stage() != Stage::Idle {
        let section = match coordinator.load_stage() {
            Stage::Mission => SectionKind::Mission,
            Stage::GeoFence => SectionKind::GeoFence,
            Stage::RallyPoints => SectionKind::RallyPoints,
            Stage::Idle => unreachable!(),
        };
        let payload = match section {
            SectionKind::Mission => mission_with_items(items),
            SectionKind::GeoFence if items > 0 => fence_with_polygon(),
            SectionKind::GeoFence => serde_json::json!({"polygons": [], "circles": []})
                .as_object()
                .cloned()
                .unwrap(),
            SectionKind::RallyPoints => rally_with_points(items),
        };
        assert_eq!(vehicle.complete_download(section, payload), 1);
        coordinator.process_pending_events();
    }
}

fn load_plan_file(coordinator: &mut PlanCoordinator) -> tempfile::TempDir {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("plan.plan");
    std::fs::write(
        &path,
        plan_file_json(&mission_with_items(2), &fence_with_polygon(), &rally_with_points(2)),
    )
    .unwrap();
    coordinator.load_from_file(&path).unwrap();
    tmp
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

#[test]
fn download_visits_sections_in_order() {
    let vehicle = MockVehicle::new(1).into_arc();
    let mut coordinator = connected(&vehicle);

    assert_eq!(coordinator.load_from_vehicle().unwrap(), Dispatch::Started);
    assert_eq!(vehicle.take_requests(), vec![Request::Download(SectionKind::Mission)]);

    vehicle.complete_download(SectionKind::Mission, mission_with_items(3));
    coordinator.process_pending_events();
    assert_eq!(vehicle.take_requests(), vec![Request::Download(SectionKind::GeoFence)]);
    assert_eq!(coordinator.load_stage(), Stage::GeoFence);

    vehicle.complete_download(SectionKind::GeoFence, fence_with_polygon());
    coordinator.process_pending_events();
    assert_eq!(vehicle.take_requests(), vec![Request::Download(SectionKind::RallyPoints)]);

    vehicle.complete_download(SectionKind::RallyPoints, rally_with_points(2));
    coordinator.process_pending_events();
    assert!(vehicle.take_requests().is_empty());
    assert_eq!(coordinator.load_stage(), Stage::Idle);

    assert!(coordinator.contains_items());
    assert!(!coordinator.dirty());
    assert!(!coordinator.sync_in_progress());
}

#[test]
fn download_without_rally_support_clears_rally_and_finishes() {
    let vehicle = MockVehicle::new(1)
        .without_section(SectionKind::RallyPoints)
        .into_arc();
    let mut coordinator = connected(&vehicle);
    let _tmp = load_plan_file(&mut coordinator);
    assert!(coordinator.section_state(SectionKind::RallyPoints).contains_items);

    assert_eq!(coordinator.load_from_vehicle().unwrap(), Dispatch::Started);
    vehicle.complete_download(SectionKind::Mission, mission_with_items(1));
    coordinator.process_pending_events();
    vehicle.complete_download(SectionKind::GeoFence, fence_with_polygon());
    coordinator.process_pending_events();

    let requests = vehicle.take_requests();
    assert_eq!(
        requests,
        vec![
            Request::Download(SectionKind::Mission),
            Request::Download(SectionKind::GeoFence),
        ]
    );
    assert!(
        requests.iter().all(|r| r.section() != SectionKind::RallyPoints),
        "no rally transfer may be requested"
    );
    assert_eq!(coordinator.load_stage(), Stage::Idle);
    assert!(!coordinator.section_state(SectionKind::RallyPoints).contains_items);
    assert!(coordinator.section_state(SectionKind::GeoFence).contains_items);
    assert!(!coordinator.dirty());
}

#[test]
fn unsupported_fence_is_skipped_and_chain_continues() {
    let vehicle = MockVehicle::new(1)
        .without_section(SectionKind::GeoFence)
        .into_arc();
    let mut coordinator = connected(&vehicle);
    let _tmp = load_plan_file(&mut coordinator);

    coordinator.load_from_vehicle().unwrap();
    vehicle.complete_download(SectionKind::Mission, mission_with_items(1));
    coordinator.process_pending_events();

    assert_eq!(
        vehicle.take_requests(),
        vec![
            Request::Download(SectionKind::Mission),
            Request::Download(SectionKind::RallyPoints),
        ]
    );
    assert_eq!(coordinator.load_stage(), Stage::RallyPoints);
    assert!(!coordinator.section_state(SectionKind::GeoFence).contains_items);
    assert!(!coordinator.dirty(), "skip must not leave the plan dirty");
}

#[test]
fn out_of_turn_completion_does_not_advance() {
    let vehicle = MockVehicle::new(1).into_arc();
    let mut coordinator = connected(&vehicle);

    coordinator.load_from_vehicle().unwrap();
    vehicle.take_requests();

    vehicle.complete_download(SectionKind::RallyPoints, rally_with_points(1));
    coordinator.process_pending_events();
    assert_eq!(coordinator.load_stage(), Stage::Mission);
    assert!(vehicle.requests().is_empty());

    // Completion with no sequence running.
    let mut idle = connected(&MockVehicle::new(2).into_arc());
    idle.handle_transfer_event(plansync_core::TransferEvent::downloaded(
        idle.manager_vehicle().id(),
        SectionKind::Mission,
        mission_with_items(1),
    ));
    assert_eq!(idle.load_stage(), Stage::Idle);
}

#[test]
fn failed_stage_still_advances() {
    let vehicle = MockVehicle::new(1).into_arc();
    let mut coordinator = connected(&vehicle);

    coordinator.load_from_vehicle().unwrap();
    vehicle.take_requests();

    vehicle.fail(SectionKind::Mission, TransferDirection::Download, "timeout");
    coordinator.process_pending_events();
    assert_eq!(vehicle.take_requests(), vec![Request::Download(SectionKind::GeoFence)]);
    assert_eq!(coordinator.load_stage(), Stage::GeoFence);
}

// ---------------------------------------------------------------------------
// Download preconditions
// ---------------------------------------------------------------------------

#[test]
fn download_rejected_while_offline() {
    let (mut coordinator, _settings) = coordinator();
    coordinator.start(ViewMode::Edit, &VehicleContext::new());
    let before = coordinator.save_to_json();
    let dirty = coordinator.dirty();

    let dispatch = coordinator.load_from_vehicle().unwrap();

    assert_eq!(dispatch, Dispatch::Ignored(Rejection::Offline));
    assert_eq!(coordinator.save_to_json(), before);
    assert_eq!(coordinator.dirty(), dirty);
    assert_eq!(coordinator.load_stage(), Stage::Idle);
}

#[test]
fn download_rejected_in_monitor_mode() {
    let vehicle = MockVehicle::new(1).into_arc();
    let (mut coordinator, _settings) = coordinator();
    coordinator.start_with_fixed_vehicle(vehicle.clone());
    finish_download(&mut coordinator, &vehicle, 1);
    vehicle.take_requests();

    let dispatch = coordinator.load_from_vehicle().unwrap();
    assert_eq!(dispatch, Dispatch::Ignored(Rejection::MonitorMode));
    assert!(vehicle.requests().is_empty());
}

#[test]
fn download_rejected_while_syncing_leaves_flags() {
    let vehicle = MockVehicle::new(1).into_arc();
    let mut coordinator = connected(&vehicle);
    let _tmp = load_plan_file(&mut coordinator);
    assert!(coordinator.dirty(), "online file load marks the plan dirty");

    coordinator.send_to_vehicle().unwrap();
    assert!(coordinator.sync_in_progress());
    vehicle.take_requests();

    coordinator.set_dirty(true);
    let flags = (
        coordinator.dirty(),
        coordinator.contains_items(),
        coordinator.sync_in_progress(),
    );

    let dispatch = coordinator.load_from_vehicle().unwrap();
    assert_eq!(dispatch, Dispatch::Ignored(Rejection::SyncInProgress));
    assert_eq!(
        flags,
        (
            coordinator.dirty(),
            coordinator.contains_items(),
            coordinator.sync_in_progress(),
        )
    );
    assert!(vehicle.requests().is_empty());
}

#[test]
fn high_latency_link_is_a_user_visible_error() {
    let vehicle = MockVehicle::new(1).into_arc();
    let mut coordinator = connected(&vehicle);
    vehicle.set_high_latency(true);

    let err = coordinator.load_from_vehicle().unwrap_err();
    assert!(
        matches!(err, CoordinatorError::HighLatencyLink("download")),
        "expected HighLatencyLink, got: {err}"
    );
    assert_eq!(err.to_string(), "download not supported on high latency links");

    let err = coordinator.send_to_vehicle().unwrap_err();
    assert_eq!(err.to_string(), "upload not supported on high latency links");
    assert!(vehicle.requests().is_empty());
}

#[test]
fn high_latency_is_checked_before_mode() {
    let vehicle = MockVehicle::new(1).with_high_latency().into_arc();
    let (mut coordinator, _settings) = coordinator();
    coordinator.start_with_fixed_vehicle(vehicle.clone());

    assert!(matches!(
        coordinator.load_from_vehicle(),
        Err(CoordinatorError::HighLatencyLink(_))
    ));
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

#[test]
fn upload_visits_sections_in_order() {
    let vehicle = MockVehicle::new(1).into_arc();
    let mut coordinator = connected(&vehicle);
    let _tmp = load_plan_file(&mut coordinator);

    assert_eq!(coordinator.send_to_vehicle().unwrap(), Dispatch::Started);
    assert!(!coordinator.dirty());

    let requests = vehicle.take_requests();
    assert!(
        matches!(requests.as_slice(), [Request::Upload(SectionKind::Mission, p)] if p["items"].as_array().unwrap().len() == 2),
        "unexpected requests: {requests:?}"
    );

    vehicle.complete_upload(SectionKind::Mission);
    coordinator.process_pending_events();
    assert!(matches!(
        vehicle.take_requests().as_slice(),
        [Request::Upload(SectionKind::GeoFence, _)]
    ));

    vehicle.complete_upload(SectionKind::GeoFence);
    coordinator.process_pending_events();
    assert!(matches!(
        vehicle.take_requests().as_slice(),
        [Request::Upload(SectionKind::RallyPoints, _)]
    ));

    vehicle.complete_upload(SectionKind::RallyPoints);
    coordinator.process_pending_events();
    assert_eq!(coordinator.send_stage(), Stage::Idle);
    assert!(!coordinator.sync_in_progress());
    assert!(coordinator.contains_items(), "upload keeps local content");
}

#[test]
fn upload_skips_unsupported_section_without_clearing() {
    let vehicle = MockVehicle::new(1)
        .without_section(SectionKind::GeoFence)
        .into_arc();
    let mut coordinator = connected(&vehicle);
    let _tmp = load_plan_file(&mut coordinator);

    coordinator.send_to_vehicle().unwrap();
    vehicle.complete_upload(SectionKind::Mission);
    coordinator.process_pending_events();

    let requests = vehicle.take_requests();
    assert_eq!(requests.len(), 2);
    assert!(matches!(requests[1], Request::Upload(SectionKind::RallyPoints, _)));
    assert!(
        coordinator.section_state(SectionKind::GeoFence).contains_items,
        "uploads never clear local content"
    );
}

#[test]
fn upload_rejected_while_offline() {
    let (mut coordinator, _settings) = coordinator();
    coordinator.start(ViewMode::Edit, &VehicleContext::new());
    assert_eq!(
        coordinator.send_to_vehicle().unwrap(),
        Dispatch::Ignored(Rejection::Offline)
    );
}

#[test]
fn monitor_mode_upload_follows_policy() {
    let vehicle = MockVehicle::new(1).into_arc();
    let (mut coordinator, _settings) = coordinator();
    coordinator.start_with_fixed_vehicle(vehicle.clone());
    finish_download(&mut coordinator, &vehicle, 2);
    vehicle.take_requests();

    assert_eq!(coordinator.send_to_vehicle().unwrap(), Dispatch::Started);

    let other = MockVehicle::new(2).into_arc();
    let (coordinator, _settings) = plansync_test_utils::coordinator();
    let mut coordinator = coordinator.with_policy(SyncPolicy {
        allow_monitor_upload: false,
    });
    coordinator.start_with_fixed_vehicle(other.clone());
    finish_download(&mut coordinator, &other, 2);

    assert_eq!(
        coordinator.send_to_vehicle().unwrap(),
        Dispatch::Ignored(Rejection::MonitorMode)
    );
}

#[test]
fn send_plan_file_uploads_without_refreshing() {
    let vehicle = MockVehicle::new(4).with_initial_plan_pending().into_arc();
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("survey.plan");
    std::fs::write(
        &path,
        plan_file_json(&mission_with_items(3), &fence_with_polygon(), &rally_with_points(1)),
    )
    .unwrap();
    let settings = Arc::new(MemorySettingsStore::new(OfflineDefaults::default()));

    let (mut coordinator, dispatch) = PlanCoordinator::send_plan_to_vehicle(
        PlanSections::documents(),
        vehicle.clone(),
        &path,
        settings,
    )
    .unwrap();

    assert_eq!(dispatch, Dispatch::Started);
    assert_eq!(coordinator.mode(), ViewMode::Monitor);
    assert_eq!(coordinator.load_stage(), Stage::Idle);
    let requests = vehicle.take_requests();
    assert!(
        matches!(requests.as_slice(), [Request::Upload(SectionKind::Mission, p)] if p["items"].as_array().unwrap().len() == 3),
        "unexpected requests: {requests:?}"
    );

    assert_eq!(vehicle.forced_initial_plan_requests(), 0);

    vehicle.complete_upload(SectionKind::Mission);
    coordinator.process_pending_events();
    vehicle.complete_upload(SectionKind::GeoFence);
    coordinator.process_pending_events();
    vehicle.complete_upload(SectionKind::RallyPoints);
    coordinator.process_pending_events();
    assert!(matches!(
        vehicle.requests().as_slice(),
        [Request::Upload(SectionKind::GeoFence, _), Request::Upload(SectionKind::RallyPoints, _)]
    ));
    assert_eq!(coordinator.send_stage(), Stage::Idle);
    assert!(!coordinator.dirty());
}

#[test]
fn send_plan_file_reports_load_failure() {
    let vehicle = MockVehicle::new(4).into_arc();
    let tmp = tempfile::TempDir::new().unwrap();
    let settings = Arc::new(MemorySettingsStore::new(OfflineDefaults::default()));

    let err = PlanCoordinator::send_plan_to_vehicle(
        PlanSections::documents(),
        vehicle.clone(),
        &tmp.path().join("missing.plan"),
        settings,
    )
    .unwrap_err();

    assert!(matches!(err, CoordinatorError::LoadFailed { .. }));
    assert!(vehicle.requests().is_empty());
}

// ---------------------------------------------------------------------------
// Removal
// ---------------------------------------------------------------------------

#[test]
fn remove_all_from_vehicle_respects_support() {
    let vehicle = MockVehicle::new(1)
        .without_section(SectionKind::RallyPoints)
        .into_arc();
    let mut coordinator = connected(&vehicle);
    let _tmp = load_plan_file(&mut coordinator);

    assert_eq!(coordinator.remove_all_from_vehicle(), Dispatch::Started);
    assert_eq!(
        vehicle.take_requests(),
        vec![
            Request::Clear(SectionKind::Mission),
            Request::Clear(SectionKind::GeoFence),
        ]
    );
    assert!(!coordinator.dirty());
    assert!(coordinator.sync_in_progress());

    vehicle.complete_clear(SectionKind::Mission);
    vehicle.complete_clear(SectionKind::GeoFence);
    coordinator.process_pending_events();
    assert!(!coordinator.sync_in_progress());
    assert_eq!(coordinator.load_stage(), Stage::Idle);
}

#[test]
fn remove_all_from_vehicle_offline_is_ignored() {
    let (mut coordinator, _settings) = coordinator();
    coordinator.start(ViewMode::Edit, &VehicleContext::new());
    assert_eq!(
        coordinator.remove_all_from_vehicle(),
        Dispatch::Ignored(Rejection::Offline)
    );
}

#[test]
fn online_remove_all_keeps_file_and_dirty() {
    let vehicle = MockVehicle::new(1).into_arc();
    let mut coordinator = connected(&vehicle);
    let _tmp = load_plan_file(&mut coordinator);
    assert!(coordinator.current_plan_file().is_some());

    coordinator.remove_all();
    assert!(!coordinator.contains_items());
    assert!(coordinator.dirty(), "online removal is a staged edit");
    assert!(coordinator.current_plan_file().is_some());
}

#[test]
fn offline_remove_all_discards() {
    let (mut coordinator, _settings) = coordinator();
    coordinator.start(ViewMode::Edit, &VehicleContext::new());
    let _tmp = load_plan_file(&mut coordinator);
    coordinator.set_dirty(true);

    coordinator.remove_all();
    assert!(!coordinator.contains_items());
    assert!(!coordinator.dirty());
    assert!(coordinator.current_plan_file().is_none());
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

#[test]
fn aggregates_are_ors_of_section_flags() {
    let vehicle = MockVehicle::new(1).into_arc();
    let mut coordinator = connected(&vehicle);
    let _tmp = load_plan_file(&mut coordinator);

    let check = |c: &PlanCoordinator| {
        let states: Vec<_> = SectionKind::ALL.iter().map(|k| c.section_state(*k)).collect();
        assert_eq!(c.dirty(), states.iter().any(|s| s.dirty));
        assert_eq!(c.contains_items(), states.iter().any(|s| s.contains_items));
        assert_eq!(c.sync_in_progress(), states.iter().any(|s| s.sync_in_progress));
    };

    check(&coordinator);
    coordinator.sections_mut().rally_points.set_dirty(false);
    check(&coordinator);
    coordinator.send_to_vehicle().unwrap();
    check(&coordinator);
    vehicle.complete_upload(SectionKind::Mission);
    coordinator.process_pending_events();
    check(&coordinator);
    coordinator.remove_all();
    check(&coordinator);
    coordinator.set_dirty(false);
    check(&coordinator);
}
