//! Shared test utilities for plansync integration tests.
//!
//! Provides a scriptable [`MockVehicle`] that records every transfer request
//! and lets the test publish completions when it chooses, plus payload and
//! coordinator fixtures.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::sync::broadcast;

use plansync_core::vehicle::EventSink;
use plansync_core::{
    FirmwareType, MemorySettingsStore, OfflineDefaults, PlanCoordinator, PlanEvent, PlanSections,
    SectionKind, SectionPayload, Subscription, TransferDirection, TransferEvent, TransferHub,
    Vehicle, VehicleId, VehicleType,
};

// ---------------------------------------------------------------------------
// Mock vehicle
// ---------------------------------------------------------------------------

/// A transfer request issued to a [`MockVehicle`].
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Download(SectionKind),
    Upload(SectionKind, SectionPayload),
    Clear(SectionKind),
}

impl Request {
    pub fn section(&self) -> SectionKind {
        match self {
            Self::Download(k) | Self::Upload(k, _) | Self::Clear(k) => *k,
        }
    }
}

/// Vehicle that never talks to a link. Requests are recorded; completions
/// are published only when the test calls `complete_*` or `fail`.
#[derive(Debug)]
pub struct MockVehicle {
    id: VehicleId,
    firmware: FirmwareType,
    vehicle_type: VehicleType,
    high_latency: AtomicBool,
    unsupported: HashSet<SectionKind>,
    initial_plan_complete: AtomicBool,
    forced_initial_plan: AtomicUsize,
    hub: TransferHub,
    requests: Mutex<Vec<Request>>,
    subscribe_calls: AtomicUsize,
}

impl MockVehicle {
    /// A PX4 multirotor supporting every section.
    pub fn new(id: u32) -> Self {
        Self {
            id: VehicleId(id),
            firmware: FirmwareType::Px4,
            vehicle_type: VehicleType::MultiRotor,
            high_latency: AtomicBool::new(false),
            unsupported: HashSet::new(),
            initial_plan_complete: AtomicBool::new(true),
            forced_initial_plan: AtomicUsize::new(0),
            hub: TransferHub::new(),
            requests: Mutex::new(Vec::new()),
            subscribe_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_platform(mut self, firmware: FirmwareType, vehicle_type: VehicleType) -> Self {
        self.firmware = firmware;
        self.vehicle_type = vehicle_type;
        self
    }

    pub fn with_high_latency(self) -> Self {
        self.high_latency.store(true, Ordering::SeqCst);
        self
    }

    pub fn without_section(mut self, section: SectionKind) -> Self {
        self.unsupported.insert(section);
        self
    }

    /// Leave the initial plan request hanging.
    pub fn with_initial_plan_pending(self) -> Self {
        self.initial_plan_complete.store(false, Ordering::SeqCst);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn set_high_latency(&self, high_latency: bool) {
        self.high_latency.store(high_latency, Ordering::SeqCst);
    }

    /// Requests issued so far.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests issued so far, clearing the log.
    pub fn take_requests(&self) -> Vec<Request> {
        std::mem::take(&mut *self.requests.lock().unwrap())
    }

    /// Number of times `subscribe` was called.
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Live completion subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Times the coordinator forced the initial plan request complete.
    pub fn forced_initial_plan_requests(&self) -> usize {
        self.forced_initial_plan.load(Ordering::SeqCst)
    }

    /// Publish a successful download. Returns the number of sinks reached.
    pub fn complete_download(&self, section: SectionKind, payload: SectionPayload) -> usize {
        self.hub
            .publish(&TransferEvent::downloaded(self.id, section, payload))
    }

    pub fn complete_upload(&self, section: SectionKind) -> usize {
        self.hub.publish(&TransferEvent::uploaded(self.id, section))
    }

    pub fn complete_clear(&self, section: SectionKind) -> usize {
        self.hub.publish(&TransferEvent::cleared(self.id, section))
    }

    pub fn fail(&self, section: SectionKind, direction: TransferDirection, reason: &str) -> usize {
        self.hub
            .publish(&TransferEvent::failed(self.id, section, direction, reason))
    }

    fn record(&self, request: Request) {
        self.requests.lock().unwrap().push(request);
    }
}

impl Vehicle for MockVehicle {
    fn id(&self) -> VehicleId {
        self.id
    }

    fn firmware(&self) -> FirmwareType {
        self.firmware
    }

    fn vehicle_type(&self) -> VehicleType {
        self.vehicle_type
    }

    fn high_latency_link(&self) -> bool {
        self.high_latency.load(Ordering::SeqCst)
    }

    fn supports(&self, section: SectionKind) -> bool {
        !self.unsupported.contains(&section)
    }

    fn initial_plan_request_complete(&self) -> bool {
        self.initial_plan_complete.load(Ordering::SeqCst)
    }

    fn force_initial_plan_request_complete(&self) {
        self.forced_initial_plan.fetch_add(1, Ordering::SeqCst);
        self.initial_plan_complete.store(true, Ordering::SeqCst);
    }

    fn request_download(&self, section: SectionKind) {
        self.record(Request::Download(section));
    }

    fn request_upload(&self, section: SectionKind, payload: SectionPayload) {
        self.record(Request::Upload(section, payload));
    }

    fn request_clear(&self, section: SectionKind) {
        self.record(Request::Clear(section));
    }

    fn subscribe(&self, section: SectionKind, sink: EventSink) -> Subscription {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.hub.subscribe(section, sink)
    }
}

// ---------------------------------------------------------------------------
// Payload fixtures
// ---------------------------------------------------------------------------

fn object(value: serde_json::Value) -> SectionPayload {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("fixture must be an object, got {other}"),
    }
}

/// Mission payload with `count` waypoints.
pub fn mission_with_items(count: usize) -> SectionPayload {
    let items: Vec<_> = (0..count)
        .map(|i| {
            json!({
                "type": "SimpleItem",
                "autoContinue": true,
                "command": 16,
                "doJumpId": i + 1,
                "frame": 3,
                "params": [0, 0, 0, 0, 47.0 + i as f64 * 0.001, 8.0, 50],
            })
        })
        .collect();
    object(json!({
        "version": 2,
        "items": items,
        "plannedHomePosition": [47.0, 8.0, 400.0],
    }))
}

/// Geofence payload with one inclusion polygon.
pub fn fence_with_polygon() -> SectionPayload {
    object(json!({
        "version": 2,
        "polygons": [{
            "inclusion": true,
            "polygon": [[47.0, 8.0], [47.01, 8.0], [47.01, 8.01]],
        }],
        "circles": [],
    }))
}

/// Rally point payload with `count` points.
pub fn rally_with_points(count: usize) -> SectionPayload {
    let points: Vec<_> = (0..count)
        .map(|i| json!([47.0 + i as f64 * 0.01, 8.0, 30.0]))
        .collect();
    object(json!({"version": 2, "points": points}))
}

/// Combined plan file text with the given section payloads.
pub fn plan_file_json(
    mission: &SectionPayload,
    geo_fence: &SectionPayload,
    rally_points: &SectionPayload,
) -> String {
    json!({
        "fileType": "Plan",
        "groundStation": "plansync",
        "version": 1,
        "mission": mission,
        "geoFence": geo_fence,
        "rallyPoints": rally_points,
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Coordinator fixtures
// ---------------------------------------------------------------------------

/// Coordinator over document sections with in-memory settings.
pub fn coordinator() -> (PlanCoordinator, Arc<MemorySettingsStore>) {
    let settings = Arc::new(MemorySettingsStore::new(OfflineDefaults::default()));
    let coordinator = PlanCoordinator::new(PlanSections::documents(), settings.clone());
    (coordinator, settings)
}

/// Drain every status event currently queued on `rx`.
pub fn drain_status(rx: &mut broadcast::Receiver<PlanEvent>) -> Vec<PlanEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
