//! Plan coordinator: keeps the mission, geofence and rally point sections
//! in step with each other and with the active vehicle.
//!
//! The coordinator is driven through `&mut self`. Transfer completions
//! arrive on a single ordered channel and are consumed either by the async
//! [`PlanCoordinator::run`] loop or synchronously via
//! [`PlanCoordinator::process_pending_events`].

mod persistence;
mod runner;
mod subscriptions;
mod transfer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};

use crate::config::{OfflineDefaults, SettingsStore, SyncPolicy};
use crate::plan::PlanFileError;
use crate::section::{PlanSections, SectionKind, SyncState, ViewMode};
use crate::state::{Sequence, Stage};
use crate::vehicle::{
    EventSink, OfflineVehicle, TransferDirection, TransferEvent, Vehicle, VehicleContext,
    VehicleId,
};

use subscriptions::SubscriptionSet;

const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Observable state changes, published on a broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanEvent {
    ContainsItemsChanged(bool),
    SyncInProgressChanged(bool),
    DirtyChanged(bool),
    OfflineChanged(bool),
    CurrentPlanFileChanged(Option<PathBuf>),
}

/// Result of a transfer request that passed the link capability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The first section transfer was requested.
    Started,
    /// A precondition failed; nothing changed.
    Ignored(Rejection),
}

impl Dispatch {
    pub fn is_started(self) -> bool {
        self == Self::Started
    }
}

/// Precondition that blocked a transfer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no vehicle is connected")]
    Offline,

    #[error("not allowed in monitor mode")]
    MonitorMode,

    #[error("a plan transfer is already in progress")]
    SyncInProgress,
}

/// User-visible coordinator errors.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("{0} not supported on high latency links")]
    HighLatencyLink(&'static str),

    #[error("error loading plan file {}: {source}", .path.display())]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: PlanFileError,
    },

    #[error("plan save error {}: {source}", .path.display())]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: PlanFileError,
    },

    #[error("KML save error {}: {source}", .path.display())]
    KmlSaveFailed {
        path: PathBuf,
        #[source]
        source: PlanFileError,
    },
}

/// Coordinates the three plan sections against the manager vehicle.
///
/// The manager vehicle is the active vehicle, or the offline placeholder
/// when nothing is connected. Downloads and uploads run one section at a
/// time in the order mission, geofence, rally points.
pub struct PlanCoordinator {
    mode: ViewMode,
    policy: SyncPolicy,
    settings: Arc<dyn SettingsStore>,
    sections: PlanSections,
    offline_vehicle: Arc<dyn Vehicle>,
    manager: Arc<dyn Vehicle>,
    subscriptions: Option<SubscriptionSet>,
    load: Sequence,
    send: Sequence,
    current_plan_file: Option<PathBuf>,
    events_tx: EventSink,
    events_rx: mpsc::UnboundedReceiver<TransferEvent>,
    status_tx: broadcast::Sender<PlanEvent>,
    vehicle_rx: Option<watch::Receiver<Option<Arc<dyn Vehicle>>>>,
}

impl PlanCoordinator {
    /// Build a coordinator over `sections`. The offline placeholder is
    /// shaped from the stored offline-editing defaults.
    pub fn new(sections: PlanSections, settings: Arc<dyn SettingsStore>) -> Self {
        let offline_vehicle: Arc<dyn Vehicle> =
            Arc::new(OfflineVehicle::new(settings.offline_defaults()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);

        Self {
            mode: ViewMode::default(),
            policy: SyncPolicy::default(),
            settings,
            sections,
            manager: offline_vehicle.clone(),
            offline_vehicle,
            subscriptions: None,
            load: Sequence::new(TransferDirection::Download),
            send: Sequence::new(TransferDirection::Upload),
            current_plan_file: None,
            events_tx,
            events_rx,
            status_tx,
            vehicle_rx: None,
        }
    }

    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Start in `mode`, bound to the context's active vehicle and tracking
    /// later changes to it.
    pub fn start(&mut self, mode: ViewMode, context: &VehicleContext) {
        self.mode = mode;
        self.sections.for_each_mut(|s| s.start(mode));

        let rx = context.subscribe();
        let active = rx.borrow().clone();
        self.vehicle_rx = Some(rx);

        tracing::info!(mode = %mode, "plan coordinator started");
        self.bind(active, true);
    }

    /// Start in monitor mode bound to `vehicle` for good. Active-vehicle
    /// changes are not tracked.
    pub fn start_with_fixed_vehicle(&mut self, vehicle: Arc<dyn Vehicle>) {
        if self.fix_vehicle(vehicle) {
            self.pull_from_vehicle();
        }
    }

    /// Monitor-mode binding to `vehicle` without refreshing from it.
    /// Returns whether the vehicle is online.
    fn fix_vehicle(&mut self, vehicle: Arc<dyn Vehicle>) -> bool {
        self.mode = ViewMode::Monitor;
        self.sections.for_each_mut(|s| s.start(ViewMode::Monitor));
        self.vehicle_rx = None;

        tracing::info!(vehicle_id = %vehicle.id(), "plan coordinator started with fixed vehicle");
        self.attach(Some(vehicle), true) && !self.offline()
    }

    /// Upload the plan file at `path` to `vehicle` through a coordinator
    /// of its own.
    ///
    /// The coordinator is fixed to `vehicle` and skips the usual refresh,
    /// so the upload starts at once regardless of the configured monitor
    /// policy. Keep the returned coordinator and drain its events until
    /// the send stage returns to idle.
    pub fn send_plan_to_vehicle(
        sections: PlanSections,
        vehicle: Arc<dyn Vehicle>,
        path: &Path,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<(Self, Dispatch), CoordinatorError> {
        let mut coordinator = Self::new(sections, settings).with_policy(SyncPolicy {
            allow_monitor_upload: true,
        });
        coordinator.fix_vehicle(vehicle);
        coordinator.load_from_file(path)?;
        let dispatch = coordinator.send_to_vehicle()?;
        Ok((coordinator, dispatch))
    }

    /// React to the active vehicle changing. `None` means no vehicle.
    pub fn active_vehicle_changed(&mut self, active: Option<Arc<dyn Vehicle>>) {
        self.bind(active, false);
    }

    fn bind(&mut self, active: Option<Arc<dyn Vehicle>>, force: bool) {
        if !self.attach(active, force) {
            return;
        }
        match (self.mode, self.offline()) {
            (ViewMode::Edit, false) => {
                if !self.contains_items() {
                    self.pull_from_vehicle();
                }
            }
            (ViewMode::Edit, true) => {}
            (ViewMode::Monitor, true) => self.remove_all(),
            (ViewMode::Monitor, false) => self.pull_from_vehicle(),
        }
    }

    /// Make `active` (or the placeholder) the manager vehicle. Returns
    /// false when the manager was already that vehicle.
    fn attach(&mut self, active: Option<Arc<dyn Vehicle>>, force: bool) -> bool {
        let going_offline = active.is_none();
        let candidate = active.unwrap_or_else(|| self.offline_vehicle.clone());
        if !force && candidate.id() == self.manager.id() {
            tracing::debug!(vehicle_id = %candidate.id(), "manager vehicle unchanged");
            return false;
        }

        // Cancel completions from the old binding before anything else,
        // including any it already queued.
        self.subscriptions = None;
        let stale = self.discard_queued_events();
        if stale > 0 {
            tracing::debug!(count = stale, "discarded transfer events from previous binding");
        }
        self.load.reset();
        self.send.reset();

        self.manager = if going_offline {
            // Pick up defaults recorded from the last real vehicle.
            self.offline_vehicle = Arc::new(OfflineVehicle::new(self.settings.offline_defaults()));
            self.offline_vehicle.clone()
        } else {
            candidate
        };

        let online = !self.offline();
        if online {
            let defaults = OfflineDefaults {
                firmware: self.manager.firmware(),
                vehicle_type: self.manager.vehicle_type(),
            };
            if let Err(e) = self.settings.store_offline_defaults(defaults) {
                tracing::warn!(error = %e, "failed to record offline editing defaults");
            }
            self.subscriptions = Some(SubscriptionSet::subscribe(
                self.manager.as_ref(),
                &self.events_tx,
            ));
        }

        let manager = self.manager.clone();
        self.sections.for_each_mut(|s| s.bind_vehicle(manager.clone()));

        tracing::info!(
            vehicle_id = %self.manager.id(),
            online,
            mode = %self.mode,
            "manager vehicle changed"
        );
        self.emit_status();
        true
    }

    // -----------------------------------------------------------------------
    // Aggregates
    // -----------------------------------------------------------------------

    /// True while the manager vehicle is the offline placeholder.
    pub fn offline(&self) -> bool {
        self.manager.is_offline_placeholder()
    }

    pub fn contains_items(&self) -> bool {
        self.sections.any(|s| s.contains_items)
    }

    pub fn dirty(&self) -> bool {
        self.sections.any(|s| s.dirty)
    }

    pub fn sync_in_progress(&self) -> bool {
        self.sections.any(|s| s.sync_in_progress)
    }

    /// Set the dirty flag of every section.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.sections.for_each_mut(|s| s.set_dirty(dirty));
        self.emit(PlanEvent::DirtyChanged(self.dirty()));
    }

    /// The mission section decides whether the plan can be saved or sent.
    pub fn ready_for_save_send(&self) -> bool {
        self.sections.mission.ready_for_save_send()
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    pub fn manager_vehicle(&self) -> &Arc<dyn Vehicle> {
        &self.manager
    }

    pub fn offline_vehicle(&self) -> &Arc<dyn Vehicle> {
        &self.offline_vehicle
    }

    /// Vehicle whose completion events are currently subscribed, if any.
    pub fn subscribed_vehicle(&self) -> Option<VehicleId> {
        self.subscriptions
            .as_ref()
            .filter(|s| s.is_active())
            .map(SubscriptionSet::vehicle)
    }

    pub fn load_stage(&self) -> Stage {
        self.load.stage()
    }

    pub fn send_stage(&self) -> Stage {
        self.send.stage()
    }

    pub fn current_plan_file(&self) -> Option<&Path> {
        self.current_plan_file.as_deref()
    }

    pub fn sections(&self) -> &PlanSections {
        &self.sections
    }

    pub fn sections_mut(&mut self) -> &mut PlanSections {
        &mut self.sections
    }

    pub fn section_state(&self, kind: SectionKind) -> SyncState {
        self.sections.get(kind).state()
    }

    /// Receiver for [`PlanEvent`]s emitted from now on.
    pub fn subscribe_status(&self) -> broadcast::Receiver<PlanEvent> {
        self.status_tx.subscribe()
    }

    // -----------------------------------------------------------------------
    // Status emission
    // -----------------------------------------------------------------------

    fn emit(&self, event: PlanEvent) {
        // No receivers is fine.
        let _ = self.status_tx.send(event);
    }

    fn emit_status(&self) {
        self.emit(PlanEvent::ContainsItemsChanged(self.contains_items()));
        self.emit(PlanEvent::SyncInProgressChanged(self.sync_in_progress()));
        self.emit(PlanEvent::DirtyChanged(self.dirty()));
        self.emit(PlanEvent::OfflineChanged(self.offline()));
    }

    fn set_current_plan_file(&mut self, path: Option<PathBuf>) {
        self.current_plan_file = path;
        self.emit(PlanEvent::CurrentPlanFileChanged(self.current_plan_file.clone()));
    }
}

impl std::fmt::Debug for PlanCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanCoordinator")
            .field("mode", &self.mode)
            .field("manager", &self.manager.id())
            .field("load", &self.load.stage())
            .field("send", &self.send.stage())
            .field("current_plan_file", &self.current_plan_file)
            .field("sections", &self.sections)
            .finish()
    }
}
