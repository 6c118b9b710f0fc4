//! In-memory platform for unit tests

use crate::scheduler::{Clock, ManualClock};
use chrono::{NaiveDate, NaiveDateTime};
use home_platform::{EntityId, EntityState, HomePlatform, Notification, PlatformEvent, ServiceCall};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// 2024-01-10 12:00, the epoch of every test
pub(crate) fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 10)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

#[derive(Default)]
struct Inner {
    states: HashMap<EntityId, EntityState>,
    calls: Vec<ServiceCall>,
    notifications: Vec<Notification>,
}

/// Platform that records commands and mirrors them into entity state.
///
/// Clones share the same underlying home.
#[derive(Clone)]
pub(crate) struct TestHome {
    inner: Rc<RefCell<Inner>>,
    clock: ManualClock,
}

impl TestHome {
    pub(crate) fn new() -> Self {
        Self::with_clock(ManualClock::new(start()))
    }

    pub(crate) fn with_clock(clock: ManualClock) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::default())),
            clock,
        }
    }

    /// Set an entity's state as of `at`
    pub(crate) fn set_at(&self, entity: &str, value: &str, at: NaiveDateTime) -> EntityState {
        let state = EntityState::new(entity, value, at);
        self.put(state.clone());
        state
    }

    /// Change an entity's state now and return the event the hub would emit
    pub(crate) fn change(&self, entity: &str, value: &str) -> PlatformEvent {
        let id = EntityId::new(entity);
        let old = self.state(&id);
        let mut new = EntityState::new(entity, value, self.clock.now());
        if let Some(previous) = &old {
            new.attributes = previous.attributes.clone();
        }
        self.put(new.clone());
        PlatformEvent::StateChanged {
            entity_id: id,
            old,
            new,
        }
    }

    fn put(&self, state: EntityState) {
        self.inner
            .borrow_mut()
            .states
            .insert(state.entity_id.clone(), state);
    }

    pub(crate) fn state_of(&self, entity: &str) -> Option<String> {
        self.state(&EntityId::new(entity)).map(|s| s.state)
    }

    pub(crate) fn attribute_of(&self, entity: &str, name: &str) -> Option<Value> {
        self.attribute(&EntityId::new(entity), name)
    }

    /// Every service call issued so far
    pub(crate) fn calls(&self) -> Vec<ServiceCall> {
        self.inner.borrow().calls.clone()
    }

    /// Calls targeting one entity
    pub(crate) fn calls_for(&self, entity: &str) -> Vec<ServiceCall> {
        let id = EntityId::new(entity);
        self.calls()
            .into_iter()
            .filter(|c| c.entity_id().as_ref() == Some(&id))
            .collect()
    }

    pub(crate) fn clear_calls(&self) {
        self.inner.borrow_mut().calls.clear();
    }

    pub(crate) fn notifications(&self) -> Vec<Notification> {
        self.inner.borrow().notifications.clone()
    }

    pub(crate) fn clear_notifications(&self) {
        self.inner.borrow_mut().notifications.clear();
    }

    /// Reflect a service call in entity state, as the real platform would
    fn mirror(&self, call: &ServiceCall) {
        let Some(entity) = call.entity_id() else {
            return;
        };
        let now = self.clock.now();
        let mut inner = self.inner.borrow_mut();
        let entry = inner
            .states
            .entry(entity.clone())
            .or_insert_with(|| EntityState::new(entity.clone(), "off", now));
        let data = &call.data;
        match call.service.as_str() {
            "turn_on" => {
                set_state(entry, "on", now);
                if let Some(pct) = data.get("percentage") {
                    entry.attributes.insert("percentage".to_string(), pct.clone());
                }
            }
            "turn_off" => set_state(entry, "off", now),
            "set_hvac_mode" => {
                if let Some(mode) = data.get("hvac_mode").and_then(Value::as_str) {
                    set_state(entry, mode, now);
                }
            }
            "set_fan_mode" => {
                if let Some(mode) = data.get("fan_mode") {
                    entry.attributes.insert("fan_mode".to_string(), mode.clone());
                }
            }
            "set_percentage" => {
                if let Some(pct) = data.get("percentage") {
                    let on = pct.as_u64().is_some_and(|p| p > 0);
                    set_state(entry, if on { "on" } else { "off" }, now);
                    entry.attributes.insert("percentage".to_string(), pct.clone());
                }
            }
            "set_direction" => {
                if let Some(direction) = data.get("direction") {
                    entry.attributes.insert("direction".to_string(), direction.clone());
                }
            }
            _ => {}
        }
    }
}

fn set_state(entry: &mut EntityState, value: &str, now: NaiveDateTime) {
    if entry.state != value {
        entry.state = value.to_string();
        entry.last_changed = now;
    }
}

impl HomePlatform for TestHome {
    fn state(&self, entity_id: &EntityId) -> Option<EntityState> {
        self.inner.borrow().states.get(entity_id).cloned()
    }

    fn call_service(&self, call: ServiceCall) {
        self.mirror(&call);
        self.inner.borrow_mut().calls.push(call);
    }

    fn notify(&self, notification: Notification) {
        self.inner.borrow_mut().notifications.push(notification);
    }
}
