//! Async event loop and synchronous polling of the active vehicle.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::PlanCoordinator;
use crate::vehicle::{TransferEvent, Vehicle};

type VehicleReceiver = watch::Receiver<Option<Arc<dyn Vehicle>>>;

/// Why the loop woke up. Produced inside `select!` and handled after it so
/// no borrow of the coordinator outlives the select.
enum Wake {
    Cancelled,
    Vehicle(Option<Arc<dyn Vehicle>>),
    ContextClosed,
    Transfer(TransferEvent),
}

impl PlanCoordinator {
    /// Process active-vehicle changes and transfer completions until
    /// `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) {
        tracing::debug!("plan coordinator loop running");
        loop {
            let wake = tokio::select! {
                biased;
                _ = cancel.cancelled() => Wake::Cancelled,
                wake = next_vehicle_change(&mut self.vehicle_rx) => wake,
                event = self.events_rx.recv() => match event {
                    Some(event) => Wake::Transfer(event),
                    None => Wake::Cancelled,
                },
            };

            match wake {
                Wake::Cancelled => {
                    tracing::info!("plan coordinator loop stopped");
                    return;
                }
                Wake::Vehicle(active) => self.active_vehicle_changed(active),
                Wake::ContextClosed => {
                    tracing::debug!("vehicle context dropped, no longer tracking active vehicle");
                    self.vehicle_rx = None;
                }
                Wake::Transfer(event) => self.handle_transfer_event(event),
            }
        }
    }

    /// Apply a pending active-vehicle change, if any. Returns whether one
    /// was applied.
    pub fn poll_vehicle_change(&mut self) -> bool {
        let Some(rx) = self.vehicle_rx.as_mut() else {
            return false;
        };
        match rx.has_changed() {
            Ok(true) => {
                let active = rx.borrow_and_update().clone();
                self.active_vehicle_changed(active);
                true
            }
            Ok(false) => false,
            Err(_) => {
                self.vehicle_rx = None;
                false
            }
        }
    }
}

async fn next_vehicle_change(rx: &mut Option<VehicleReceiver>) -> Wake {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Wake::Vehicle(rx.borrow_and_update().clone()),
            Err(_) => Wake::ContextClosed,
        },
        None => std::future::pending().await,
    }
}
