//! Platform access: the `HomePlatform` trait and the in-process state hub

use crate::entity::{EntityId, EntityState};
use crate::service::{Notification, Outbound, ServiceCall};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Read and command access to the home-automation platform.
///
/// Implementations must not block: commands are queued for delivery and
/// state reads come from a local cache.
pub trait HomePlatform {
    /// Current state of an entity, if known
    fn state(&self, entity_id: &EntityId) -> Option<EntityState>;

    /// Queue a service call
    fn call_service(&self, call: ServiceCall);

    /// Queue a user notification
    fn notify(&self, notification: Notification);

    /// Numeric state of an entity (`None` when unknown or unavailable)
    fn state_f64(&self, entity_id: &EntityId) -> Option<f64> {
        self.state(entity_id).and_then(|s| s.as_f64())
    }

    /// Attribute of an entity
    fn attribute(&self, entity_id: &EntityId, name: &str) -> Option<serde_json::Value> {
        self.state(entity_id)
            .and_then(|s| s.attributes.get(name).cloned())
    }

    /// Convenience for `<domain>.turn_on`
    fn turn_on(&self, entity_id: &EntityId) {
        self.call_service(ServiceCall::turn_on(entity_id));
    }

    /// Convenience for `<domain>.turn_off`
    fn turn_off(&self, entity_id: &EntityId) {
        self.call_service(ServiceCall::turn_off(entity_id));
    }
}

/// Events emitted by the hub
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    /// An entity's state string or attributes changed
    StateChanged {
        entity_id: EntityId,
        old: Option<EntityState>,
        new: EntityState,
    },
}

/// In-process view of the platform.
///
/// Holds the latest known state of every entity, broadcasts changes, and
/// queues outbound commands for a bridge task to deliver.
#[derive(Clone)]
pub struct PlatformHub {
    /// Known states (keyed by entity id)
    states: Arc<DashMap<EntityId, EntityState>>,
    /// Event broadcaster
    event_tx: broadcast::Sender<PlatformEvent>,
    /// Outbound command queue
    outbound_tx: mpsc::UnboundedSender<Outbound>,
}

impl PlatformHub {
    /// Create a hub and the receiving end of its outbound queue
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (event_tx, _) = broadcast::channel(256);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let hub = Self {
            states: Arc::new(DashMap::new()),
            event_tx,
            outbound_tx,
        };
        (hub, outbound_rx)
    }

    /// Subscribe to hub events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.event_tx.subscribe()
    }

    /// Record a state reported by the platform.
    ///
    /// Returns the change event when the state string or attributes differ
    /// from what was known; the same event is broadcast to subscribers.
    pub fn update_state(&self, new: EntityState) -> Option<PlatformEvent> {
        let old = self.states.insert(new.entity_id.clone(), new.clone());
        if let Some(previous) = &old {
            if previous.state == new.state && previous.attributes == new.attributes {
                return None;
            }
        }

        tracing::debug!(
            "State changed: {} {:?} -> {}",
            new.entity_id,
            old.as_ref().map(|s| s.state.as_str()),
            new.state
        );

        let event = PlatformEvent::StateChanged {
            entity_id: new.entity_id.clone(),
            old,
            new,
        };
        let _ = self.event_tx.send(event.clone());
        Some(event)
    }

    /// All known states
    #[must_use]
    pub fn states(&self) -> Vec<EntityState> {
        self.states.iter().map(|r| r.value().clone()).collect()
    }

    /// Number of known entities
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.states.len()
    }

    fn enqueue(&self, outbound: Outbound) {
        if self.outbound_tx.send(outbound).is_err() {
            tracing::warn!("Outbound queue closed, dropping platform command");
        }
    }
}

impl HomePlatform for PlatformHub {
    fn state(&self, entity_id: &EntityId) -> Option<EntityState> {
        self.states.get(entity_id).map(|r| r.value().clone())
    }

    fn call_service(&self, call: ServiceCall) {
        tracing::info!("Service call {}.{} {}", call.domain, call.service, call.data);
        self.enqueue(Outbound::Service(call));
    }

    fn notify(&self, notification: Notification) {
        tracing::info!("Notify {:?}: {}", notification.targets, notification.message);
        self.enqueue(Outbound::Notify(notification));
    }
}
