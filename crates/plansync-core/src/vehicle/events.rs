//! Transfer completion events and subscriptions.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::VehicleId;
use crate::section::{SectionKind, SectionPayload};

/// Channel end a vehicle publishes completion events into.
pub type EventSink = mpsc::UnboundedSender<TransferEvent>;

/// What kind of transfer finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Vehicle to ground station.
    Download,
    /// Ground station to vehicle.
    Upload,
    /// Section removed from the vehicle.
    Clear,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// `payload` carries the downloaded section for downloads.
    Completed { payload: Option<SectionPayload> },
    Failed { reason: String },
}

/// A section transfer finished on a vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferEvent {
    pub vehicle: VehicleId,
    pub section: SectionKind,
    pub direction: TransferDirection,
    pub outcome: TransferOutcome,
}

impl TransferEvent {
    pub fn downloaded(vehicle: VehicleId, section: SectionKind, payload: SectionPayload) -> Self {
        Self {
            vehicle,
            section,
            direction: TransferDirection::Download,
            outcome: TransferOutcome::Completed {
                payload: Some(payload),
            },
        }
    }

    pub fn uploaded(vehicle: VehicleId, section: SectionKind) -> Self {
        Self {
            vehicle,
            section,
            direction: TransferDirection::Upload,
            outcome: TransferOutcome::Completed { payload: None },
        }
    }

    pub fn cleared(vehicle: VehicleId, section: SectionKind) -> Self {
        Self {
            vehicle,
            section,
            direction: TransferDirection::Clear,
            outcome: TransferOutcome::Completed { payload: None },
        }
    }

    pub fn failed(
        vehicle: VehicleId,
        section: SectionKind,
        direction: TransferDirection,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            vehicle,
            section,
            direction,
            outcome: TransferOutcome::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TransferOutcome::Completed { .. })
    }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Live registration of an event sink. Dropping it cancels delivery.
#[derive(Debug)]
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    /// A subscription that is already cancelled and never delivers.
    pub fn inert() -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self { token }
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct Subscriber {
    section: SectionKind,
    token: CancellationToken,
    sink: EventSink,
}

/// Fan-out of transfer events to subscriptions, for use inside [`super::Vehicle`]
/// implementations.
#[derive(Default)]
pub struct TransferHub {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl TransferHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` for events about `section`.
    pub fn subscribe(&self, section: SectionKind, sink: EventSink) -> Subscription {
        let token = CancellationToken::new();
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.push(Subscriber {
            section,
            token: token.clone(),
            sink,
        });
        Subscription { token }
    }

    /// Deliver `event` to every live subscription for its section.
    ///
    /// Returns the number of sinks the event was delivered to.
    pub fn publish(&self, event: &TransferEvent) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|s| !s.token.is_cancelled() && !s.sink.is_closed());

        let mut delivered = 0;
        for subscriber in subscribers.iter().filter(|s| s.section == event.section) {
            if subscriber.sink.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of live subscriptions across all sections.
    pub fn subscriber_count(&self) -> usize {
        let subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers
            .iter()
            .filter(|s| !s.token.is_cancelled() && !s.sink.is_closed())
            .count()
    }
}

impl std::fmt::Debug for TransferHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
