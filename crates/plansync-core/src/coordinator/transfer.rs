//! Vehicle transfers: download and upload sequencing, clearing.

use super::{CoordinatorError, Dispatch, PlanCoordinator, PlanEvent, Rejection};
use crate::section::{SectionKind, ViewMode};
use crate::state::StageStep;
use crate::vehicle::{TransferDirection, TransferEvent, TransferOutcome};

impl PlanCoordinator {
    /// Start downloading the plan from the manager vehicle.
    ///
    /// Fails on a high latency link. Offline, monitor mode and a transfer
    /// already in flight are reported as [`Dispatch::Ignored`].
    pub fn load_from_vehicle(&mut self) -> Result<Dispatch, CoordinatorError> {
        if self.manager.high_latency_link() {
            return Err(CoordinatorError::HighLatencyLink("download"));
        }
        if let Some(reason) = self.transfer_rejection(true) {
            tracing::warn!(reason = %reason, "plan download ignored");
            return Ok(Dispatch::Ignored(reason));
        }

        let first = self.load.begin();
        tracing::info!(vehicle_id = %self.manager.id(), "plan download started");
        self.sections.get_mut(first).load_from_vehicle();
        self.set_dirty(false);
        self.emit(PlanEvent::SyncInProgressChanged(self.sync_in_progress()));
        Ok(Dispatch::Started)
    }

    /// Start uploading the plan to the manager vehicle.
    ///
    /// Monitor mode only blocks the upload when the policy forbids it.
    pub fn send_to_vehicle(&mut self) -> Result<Dispatch, CoordinatorError> {
        if self.manager.high_latency_link() {
            return Err(CoordinatorError::HighLatencyLink("upload"));
        }
        let block_monitor = !self.policy.allow_monitor_upload;
        if let Some(reason) = self.transfer_rejection(block_monitor) {
            tracing::warn!(reason = %reason, "plan upload ignored");
            return Ok(Dispatch::Ignored(reason));
        }

        let first = self.send.begin();
        tracing::info!(vehicle_id = %self.manager.id(), "plan upload started");
        self.sections.get_mut(first).send_to_vehicle();
        self.set_dirty(false);
        self.emit(PlanEvent::SyncInProgressChanged(self.sync_in_progress()));
        Ok(Dispatch::Started)
    }

    fn transfer_rejection(&self, block_monitor: bool) -> Option<Rejection> {
        if self.offline() {
            Some(Rejection::Offline)
        } else if block_monitor && self.mode == ViewMode::Monitor {
            Some(Rejection::MonitorMode)
        } else if self.sync_in_progress() {
            Some(Rejection::SyncInProgress)
        } else {
            None
        }
    }

    /// Refresh the plan from the manager vehicle after it became the
    /// manager. Runs in either mode.
    pub(super) fn pull_from_vehicle(&mut self) {
        if !self.manager.initial_plan_request_complete() && !self.sync_in_progress() {
            tracing::warn!(
                vehicle_id = %self.manager.id(),
                "initial plan request did not complete, forcing it"
            );
            self.manager.force_initial_plan_request_complete();
        }
        if self.sync_in_progress() {
            tracing::warn!(vehicle_id = %self.manager.id(), "plan refresh skipped, transfer in progress");
            return;
        }

        let first = self.load.begin();
        tracing::info!(vehicle_id = %self.manager.id(), "refreshing plan from vehicle");
        self.sections.get_mut(first).load_from_vehicle();
        self.emit(PlanEvent::SyncInProgressChanged(self.sync_in_progress()));
    }

    /// Clear all local content. Offline this also drops the dirty state and
    /// the current plan file.
    pub fn remove_all(&mut self) {
        self.sections.for_each_mut(|s| s.remove_all());
        if self.offline() {
            self.sections.for_each_mut(|s| s.set_dirty(false));
            self.set_current_plan_file(None);
        }
        self.emit(PlanEvent::ContainsItemsChanged(self.contains_items()));
        self.emit(PlanEvent::DirtyChanged(self.dirty()));
    }

    /// Clear the plan locally and on the vehicle. Sections the vehicle does
    /// not support are left alone, except the mission which is always
    /// cleared.
    pub fn remove_all_from_vehicle(&mut self) -> Dispatch {
        if self.offline() {
            tracing::warn!("remove all from vehicle called while offline");
            return Dispatch::Ignored(Rejection::Offline);
        }

        self.sections.mission.remove_all_from_vehicle();
        if self.sections.geo_fence.supported() {
            self.sections.geo_fence.remove_all_from_vehicle();
        }
        if self.sections.rally_points.supported() {
            self.sections.rally_points.remove_all_from_vehicle();
        }
        self.set_dirty(false);
        self.emit(PlanEvent::ContainsItemsChanged(self.contains_items()));
        self.emit(PlanEvent::SyncInProgressChanged(self.sync_in_progress()));
        Dispatch::Started
    }

    /// Consume every queued transfer event. Returns how many were handled.
    pub fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_transfer_event(event);
            handled += 1;
        }
        handled
    }

    /// Drop every queued transfer event without handling it.
    pub(super) fn discard_queued_events(&mut self) -> usize {
        let mut discarded = 0;
        while self.events_rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }

    /// Route one completion to its section and advance the matching
    /// sequence. Events from any vehicle but the manager are dropped.
    pub fn handle_transfer_event(&mut self, event: TransferEvent) {
        if event.vehicle != self.manager.id() {
            tracing::debug!(
                event_vehicle = %event.vehicle,
                manager = %self.manager.id(),
                section = %event.section,
                "dropping stale transfer event"
            );
            return;
        }

        if let TransferOutcome::Failed { reason } = &event.outcome {
            tracing::warn!(
                vehicle_id = %event.vehicle,
                section = %event.section,
                direction = ?event.direction,
                reason = %reason,
                "section transfer failed"
            );
        }

        self.sections
            .get_mut(event.section)
            .transfer_complete(&event);

        match event.direction {
            TransferDirection::Download | TransferDirection::Upload => {
                self.advance(event.direction, event.section);
            }
            TransferDirection::Clear => {}
        }

        self.emit(PlanEvent::SyncInProgressChanged(self.sync_in_progress()));
        self.emit(PlanEvent::ContainsItemsChanged(self.contains_items()));
    }

    /// Drive the download or upload sequence after `completed` finished.
    fn advance(&mut self, direction: TransferDirection, completed: SectionKind) {
        let download = direction == TransferDirection::Download;
        let manager = &self.manager;
        let sequence = if download {
            &mut self.load
        } else {
            &mut self.send
        };

        let mut completed = completed;
        let mut clear_dirty = false;
        loop {
            let step = sequence.complete(completed, |next| manager.supports(next));
            if step != StageStep::Ignored {
                clear_dirty |= match completed {
                    SectionKind::Mission => true,
                    SectionKind::GeoFence => download,
                    SectionKind::RallyPoints => false,
                };
            }

            match step {
                StageStep::Request(next) => {
                    let section = self.sections.get_mut(next);
                    if download {
                        section.load_from_vehicle();
                    } else {
                        section.send_to_vehicle();
                    }
                    break;
                }
                StageStep::Skip(next) => {
                    tracing::debug!(
                        section = %next,
                        direction = ?direction,
                        "section not supported by vehicle, skipping"
                    );
                    if download {
                        self.sections.get_mut(next).remove_all();
                    }
                    completed = next;
                }
                StageStep::Finished => {
                    tracing::info!(
                        vehicle_id = %manager.id(),
                        direction = ?sequence.direction(),
                        "plan transfer complete"
                    );
                    break;
                }
                StageStep::Ignored => {
                    tracing::debug!(
                        section = %completed,
                        direction = ?sequence.direction(),
                        stage = %sequence.stage(),
                        "ignoring out of sequence completion"
                    );
                    break;
                }
            }
        }

        if clear_dirty {
            self.set_dirty(false);
        }
    }
}
