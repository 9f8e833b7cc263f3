//! Tracks which vehicle is currently active.

use std::sync::Arc;

use tokio::sync::watch;

use super::Vehicle;

/// The application-wide active vehicle, observable through a watch channel.
///
/// Connection management code calls [`VehicleContext::set_active`]; every
/// coordinator started against the context sees the change.
pub struct VehicleContext {
    tx: watch::Sender<Option<Arc<dyn Vehicle>>>,
}

impl VehicleContext {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// The active vehicle, or `None` when nothing is connected.
    pub fn active(&self) -> Option<Arc<dyn Vehicle>> {
        self.tx.borrow().clone()
    }

    /// Replace the active vehicle and notify subscribers.
    pub fn set_active(&self, vehicle: Option<Arc<dyn Vehicle>>) {
        match &vehicle {
            Some(v) => tracing::info!(vehicle_id = %v.id(), "active vehicle set"),
            None => tracing::info!("active vehicle cleared"),
        }
        self.tx.send_replace(vehicle);
    }

    /// Receiver for active-vehicle changes. The current value counts as seen.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<dyn Vehicle>>> {
        self.tx.subscribe()
    }
}

impl Default for VehicleContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VehicleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VehicleContext")
            .field("active", &self.tx.borrow().as_ref().map(|v| v.id()))
            .finish()
    }
}
