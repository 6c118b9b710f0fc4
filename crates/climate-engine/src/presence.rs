//! Room presence tracking
//!
//! Each room fuses one or more binary sensors into a single
//! vacant/occupied signal. Vacancy is never stored as a flag: it is derived
//! from the most recent `entered`/`vacated` timestamps, so it cannot drift
//! from the committed sensor history.
//!
//! Subscribers register with their own vacating delay. Occupied transitions
//! are delivered immediately; vacated transitions are delivered once the
//! subscriber's delay has lapsed, unless another transition supersedes them
//! first.

use crate::config::RoomConfig;
use crate::error::ClimateError;
use crate::scheduler::{Scheduler, Task, TimerHandle};
use chrono::{Duration, NaiveDateTime};
use home_platform::{EntityId, EntityState, HomePlatform, Notification};
use std::collections::{BTreeMap, HashMap};

/// Room identifier
pub type RoomId = String;

/// Handle of a presence subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle {
    room: RoomId,
    id: u64,
}

impl SubscriptionHandle {
    /// Room this subscription belongs to
    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }
}

/// A callback owed to a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceCallback {
    pub room: RoomId,
    pub subscriber: EntityId,
}

/// A committed room transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomTransition {
    pub room: RoomId,
    pub occupied: bool,
    /// The transition was caused by a person-detection sensor
    pub person_detected: bool,
}

/// Result of feeding one sensor event into the tracker
#[derive(Debug, Default)]
pub struct SensorOutcome {
    /// Transitions committed (one per affected room)
    pub transitions: Vec<RoomTransition>,
    /// Subscribers to invoke now
    pub callbacks: Vec<PresenceCallback>,
}

#[derive(Debug)]
struct Subscription {
    subscriber: EntityId,
    vacating_delay: Duration,
    /// Delayed vacancy callback, if armed
    pending: Option<TimerHandle>,
}

/// Fused presence state of a single room
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    /// Every sensor feeding this room, in registration order
    sensors: Vec<EntityId>,
    /// Sensors that detect people rather than motion
    person_sensors: Vec<EntityId>,
    last_entered: NaiveDateTime,
    last_vacated: NaiveDateTime,
    subscriptions: BTreeMap<u64, Subscription>,
}

impl Room {
    /// Room identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sensors feeding this room
    #[must_use]
    pub fn sensors(&self) -> &[EntityId] {
        &self.sensors
    }

    #[must_use]
    pub fn last_entered(&self) -> NaiveDateTime {
        self.last_entered
    }

    #[must_use]
    pub fn last_vacated(&self) -> NaiveDateTime {
        self.last_vacated
    }

    /// Whether the most recent committed transition was "entered"
    #[must_use]
    pub fn raw_occupied(&self) -> bool {
        self.last_entered >= self.last_vacated
    }

    /// True iff the room was vacated and has stayed empty for at least `delay`
    #[must_use]
    pub fn is_vacant(&self, delay: Duration, now: NaiveDateTime) -> bool {
        !self.raw_occupied() && now - self.last_vacated >= delay
    }

    /// Signed occupancy duration in seconds.
    ///
    /// Positive while occupied (including the vacating-delay window): seconds
    /// since the room was entered. Zero or negative once vacant: minus the
    /// seconds elapsed since `last_vacated + delay`.
    #[must_use]
    pub fn seconds_occupied_or_vacant(&self, delay: Duration, now: NaiveDateTime) -> f64 {
        if self.is_vacant(delay, now) {
            -seconds(now - (self.last_vacated + delay))
        } else {
            seconds(now - self.last_entered)
        }
    }

    /// Number of active subscriptions
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn other_sensor_reports_presence(&self, sensor: &EntityId, platform: &dyn HomePlatform) -> bool {
        self.sensors
            .iter()
            .filter(|s| *s != sensor)
            .any(|s| platform.state(s).is_some_and(|state| state.is_on()))
    }

    /// Record a transition, keeping the two timestamps strictly ordered
    fn commit(&mut self, occupied: bool, now: NaiveDateTime) {
        let nudge = Duration::milliseconds(1);
        if occupied {
            self.last_entered = now.max(self.last_vacated + nudge);
        } else {
            self.last_vacated = now.max(self.last_entered + nudge);
        }
    }
}

fn seconds(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 1000.0
}

/// Presence state of every room
#[derive(Debug, Default)]
pub struct PresenceTracker {
    rooms: BTreeMap<RoomId, Room>,
    /// Rooms fed by each sensor
    sensor_rooms: HashMap<EntityId, Vec<RoomId>>,
    next_subscription: u64,
}

impl PresenceTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a room, seeding its state from the sensors' current readings.
    ///
    /// If no sensor can be read the room starts "vacant, just now" and the
    /// operator is alerted.
    pub fn add_room(
        &mut self,
        config: &RoomConfig,
        platform: &dyn HomePlatform,
        now: NaiveDateTime,
        alert_targets: &[String],
    ) {
        let mut sensors = Vec::new();
        for sensor in config.sensors.iter().chain(config.person_sensors.iter()) {
            if !sensors.contains(sensor) {
                sensors.push(sensor.clone());
            }
        }

        let readings: Vec<(bool, NaiveDateTime)> = sensors
            .iter()
            .filter_map(|s| platform.state(s))
            .filter_map(|state| state.as_binary().map(|on| (on, state.last_changed)))
            .collect();
        let second = Duration::seconds(1);

        let (last_entered, last_vacated) = if readings.is_empty() {
            tracing::warn!(
                "No readable presence sensor for room {}, assuming vacant",
                config.id
            );
            if !alert_targets.is_empty() {
                platform.notify(Notification::new(
                    format!(
                        "Presence sensors for the {} are unavailable; treating it as empty",
                        config.id
                    ),
                    Some("Sensor fault"),
                    alert_targets,
                ));
            }
            (now - second, now)
        } else if let Some(entered) = readings
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, at)| *at)
            .max()
        {
            (entered, entered - second)
        } else {
            let vacated = readings.iter().map(|(_, at)| *at).max().unwrap_or(now);
            (vacated - second, vacated)
        };

        for sensor in &sensors {
            self.index_sensor(sensor, &config.id);
        }

        let room = Room {
            id: config.id.clone(),
            sensors,
            person_sensors: config.person_sensors.clone(),
            last_entered,
            last_vacated,
            subscriptions: BTreeMap::new(),
        };
        tracing::info!(
            "Tracking room {} ({} sensors, {})",
            room.id,
            room.sensors.len(),
            if room.raw_occupied() { "occupied" } else { "vacated" }
        );
        self.rooms.insert(config.id.clone(), room);
    }

    fn index_sensor(&mut self, sensor: &EntityId, room: &str) {
        let rooms = self.sensor_rooms.entry(sensor.clone()).or_default();
        if !rooms.iter().any(|r| r == room) {
            rooms.push(room.to_string());
        }
    }

    /// Extend a room's fused sensor set
    pub fn add_sensor(&mut self, room: &str, sensor: EntityId) -> Result<(), ClimateError> {
        let entry = self
            .rooms
            .get_mut(room)
            .ok_or_else(|| ClimateError::UnknownRoom(room.to_string()))?;
        if !entry.sensors.contains(&sensor) {
            entry.sensors.push(sensor.clone());
        }
        self.index_sensor(&sensor, room);
        Ok(())
    }

    /// Look up a room
    #[must_use]
    pub fn room(&self, room: &str) -> Option<&Room> {
        self.rooms.get(room)
    }

    /// All rooms
    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    /// Whether `sensor` feeds any room
    #[must_use]
    pub fn is_presence_sensor(&self, sensor: &EntityId) -> bool {
        self.sensor_rooms.contains_key(sensor)
    }

    /// See [`Room::is_vacant`]
    pub fn is_vacant(
        &self,
        room: &str,
        delay: Duration,
        now: NaiveDateTime,
    ) -> Result<bool, ClimateError> {
        self.room(room)
            .map(|r| r.is_vacant(delay, now))
            .ok_or_else(|| ClimateError::UnknownRoom(room.to_string()))
    }

    /// See [`Room::seconds_occupied_or_vacant`]
    pub fn seconds_occupied_or_vacant(
        &self,
        room: &str,
        delay: Duration,
        now: NaiveDateTime,
    ) -> Result<f64, ClimateError> {
        self.room(room)
            .map(|r| r.seconds_occupied_or_vacant(delay, now))
            .ok_or_else(|| ClimateError::UnknownRoom(room.to_string()))
    }

    /// True if any room is occupied (raw sensor state)
    #[must_use]
    pub fn anyone_present(&self) -> bool {
        self.rooms.values().any(Room::raw_occupied)
    }

    /// Subscribe `subscriber` to the room's transitions.
    ///
    /// When the room is already inside the vacating window (sensors clear
    /// but `vacating_delay` not yet elapsed) the delayed callback is armed
    /// immediately so it still fires once the window lapses.
    pub fn register_callback(
        &mut self,
        room: &str,
        subscriber: EntityId,
        vacating_delay: Duration,
        scheduler: &mut dyn Scheduler,
    ) -> Result<SubscriptionHandle, ClimateError> {
        let entry = self
            .rooms
            .get_mut(room)
            .ok_or_else(|| ClimateError::UnknownRoom(room.to_string()))?;
        let id = self.next_subscription;
        self.next_subscription += 1;
        let handle = SubscriptionHandle {
            room: room.to_string(),
            id,
        };

        let now = scheduler.now();
        let pending = if !entry.raw_occupied() && !entry.is_vacant(vacating_delay, now) {
            let remaining = entry.last_vacated + vacating_delay - now;
            tracing::debug!(
                "Room {} inside vacating window for {}, arming callback in {}s",
                room,
                subscriber,
                remaining.num_seconds()
            );
            Some(scheduler.run_in(remaining, Task::PresenceTimeout(handle.clone())))
        } else {
            None
        };

        entry.subscriptions.insert(
            id,
            Subscription {
                subscriber,
                vacating_delay,
                pending,
            },
        );
        Ok(handle)
    }

    /// Remove a subscription and any timer it has pending
    pub fn cancel_callback(&mut self, handle: &SubscriptionHandle, scheduler: &mut dyn Scheduler) {
        let removed = self
            .rooms
            .get_mut(&handle.room)
            .and_then(|room| room.subscriptions.remove(&handle.id));
        if let Some(Subscription {
            pending: Some(timer),
            ..
        }) = removed
        {
            scheduler.cancel(timer);
        }
    }

    /// Fuse a raw sensor event into room state.
    ///
    /// Unreadable values are ignored. A "clear" reading is discarded while
    /// another sensor of the same room still reports presence.
    pub fn handle_sensor_event(
        &mut self,
        sensor: &EntityId,
        state: &EntityState,
        platform: &dyn HomePlatform,
        scheduler: &mut dyn Scheduler,
    ) -> SensorOutcome {
        let mut outcome = SensorOutcome::default();
        let Some(rooms) = self.sensor_rooms.get(sensor).cloned() else {
            return outcome;
        };
        let Some(present) = state.as_binary() else {
            tracing::warn!(
                "Ignoring presence sensor {} reporting '{}'",
                sensor,
                state.state
            );
            return outcome;
        };

        let now = scheduler.now();
        for room_id in rooms {
            let Some(room) = self.rooms.get_mut(&room_id) else {
                continue;
            };
            if !present && room.other_sensor_reports_presence(sensor, platform) {
                tracing::debug!(
                    "Room {}: {} cleared but another sensor still reports presence",
                    room_id,
                    sensor
                );
                continue;
            }

            room.commit(present, now);
            tracing::info!(
                "Room {} {} ({})",
                room_id,
                if present { "entered" } else { "vacated" },
                sensor
            );
            outcome.transitions.push(RoomTransition {
                room: room_id.clone(),
                occupied: present,
                person_detected: present && room.person_sensors.contains(sensor),
            });

            let last_vacated = room.last_vacated;
            for (id, sub) in &mut room.subscriptions {
                if let Some(timer) = sub.pending.take() {
                    scheduler.cancel(timer);
                }
                if present || sub.vacating_delay <= Duration::zero() {
                    outcome.callbacks.push(PresenceCallback {
                        room: room_id.clone(),
                        subscriber: sub.subscriber.clone(),
                    });
                } else {
                    let handle = SubscriptionHandle {
                        room: room_id.clone(),
                        id: *id,
                    };
                    let delay = last_vacated + sub.vacating_delay - now;
                    sub.pending = Some(scheduler.run_in(delay, Task::PresenceTimeout(handle)));
                }
            }
        }
        outcome
    }

    /// A delayed vacancy callback fired.
    ///
    /// Returns `None` if the subscription is gone or the timer was superseded.
    pub fn fire_timeout(
        &mut self,
        handle: &SubscriptionHandle,
        timer: TimerHandle,
    ) -> Option<PresenceCallback> {
        let sub = self
            .rooms
            .get_mut(&handle.room)?
            .subscriptions
            .get_mut(&handle.id)?;
        if sub.pending != Some(timer) {
            tracing::debug!("Dropping stale presence timer for room {}", handle.room);
            return None;
        }
        sub.pending = None;
        Some(PresenceCallback {
            room: handle.room.clone(),
            subscriber: sub.subscriber.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Clock, ManualClock, TimerQueue};
    use crate::test_support::{start, TestHome};

    const MOTION: &str = "binary_sensor.lounge_motion";
    const MOTION_2: &str = "binary_sensor.lounge_motion_2";

    struct Fixture {
        home: TestHome,
        clock: ManualClock,
        timers: TimerQueue<ManualClock>,
        tracker: PresenceTracker,
    }

    impl Fixture {
        fn new(initial: &str) -> Self {
            let home = TestHome::new();
            let clock = ManualClock::new(start());
            home.set_at(MOTION, initial, start() - Duration::minutes(30));
            home.set_at(MOTION_2, "off", start() - Duration::minutes(30));
            let mut tracker = PresenceTracker::new();
            tracker.add_room(
                &RoomConfig {
                    id: "lounge".to_string(),
                    sensors: vec![EntityId::new(MOTION), EntityId::new(MOTION_2)],
                    person_sensors: Vec::new(),
                },
                &home,
                start(),
                &[],
            );
            Self {
                home,
                timers: TimerQueue::new(clock.clone()),
                clock,
                tracker,
            }
        }

        fn sensor(&mut self, entity: &str, value: &str) -> SensorOutcome {
            let state = self.home.set_at(entity, value, self.clock.now());
            self.tracker.handle_sensor_event(
                &EntityId::new(entity),
                &state,
                &self.home,
                &mut self.timers,
            )
        }

        fn fire_due(&mut self) -> Vec<PresenceCallback> {
            let mut fired = Vec::new();
            while let Some((timer, task)) = self.timers.pop_due() {
                if let Task::PresenceTimeout(handle) = task {
                    fired.extend(self.tracker.fire_timeout(&handle, timer));
                }
            }
            fired
        }

        fn vacant(&self, delay_secs: i64) -> bool {
            self.tracker
                .is_vacant("lounge", Duration::seconds(delay_secs), self.clock.now())
                .unwrap()
        }
    }

    #[test]
    fn test_initial_snapshot_from_sensors() {
        let occupied = Fixture::new("on");
        assert!(!occupied.vacant(0));
        let empty = Fixture::new("off");
        assert!(empty.vacant(600));
        assert!(!empty.vacant(3600));
    }

    #[test]
    fn test_unreadable_sensors_fall_back_to_vacant_now() {
        let home = TestHome::new();
        let mut tracker = PresenceTracker::new();
        tracker.add_room(
            &RoomConfig {
                id: "study".to_string(),
                sensors: vec![EntityId::new("binary_sensor.study_motion")],
                person_sensors: Vec::new(),
            },
            &home,
            start(),
            &["phone".to_string()],
        );
        assert!(tracker.is_vacant("study", Duration::zero(), start()).unwrap());
        assert!(!tracker.is_vacant("study", Duration::seconds(1), start()).unwrap());
        assert_eq!(home.notifications().len(), 1);
    }

    #[test]
    fn test_vacancy_follows_committed_transitions() {
        let mut fx = Fixture::new("off");
        fx.sensor(MOTION, "on");
        assert!(!fx.vacant(0));
        fx.clock.advance(Duration::seconds(30));
        assert!(!fx.vacant(0));
        fx.sensor(MOTION, "off");
        assert!(fx.vacant(0));
        assert!(!fx.vacant(60));
        fx.clock.advance(Duration::seconds(60));
        assert!(fx.vacant(60));
    }

    #[test]
    fn test_clear_reading_debounced_by_sibling_sensor() {
        let mut fx = Fixture::new("off");
        fx.sensor(MOTION, "on");
        fx.sensor(MOTION_2, "on");
        let entered = fx.tracker.room("lounge").unwrap().last_entered();
        fx.clock.advance(Duration::seconds(10));

        let outcome = fx.sensor(MOTION, "off");
        assert!(outcome.transitions.is_empty());
        assert!(outcome.callbacks.is_empty());
        let room = fx.tracker.room("lounge").unwrap();
        assert!(room.raw_occupied());
        assert_eq!(room.last_entered(), entered);
    }

    #[test]
    fn test_unavailable_reading_ignored() {
        let mut fx = Fixture::new("on");
        let before = fx.tracker.room("lounge").unwrap().last_vacated();
        let outcome = fx.sensor(MOTION, "unavailable");
        assert!(outcome.transitions.is_empty());
        assert_eq!(fx.tracker.room("lounge").unwrap().last_vacated(), before);
        assert!(!fx.vacant(0));
    }

    #[test]
    fn test_per_subscriber_vacating_delay() {
        let mut fx = Fixture::new("on");
        let fast = EntityId::new("fan.lounge");
        let slow = EntityId::new("climate.lounge");
        fx.tracker
            .register_callback("lounge", fast.clone(), Duration::zero(), &mut fx.timers)
            .unwrap();
        fx.tracker
            .register_callback("lounge", slow.clone(), Duration::seconds(300), &mut fx.timers)
            .unwrap();

        let outcome = fx.sensor(MOTION, "off");
        assert_eq!(outcome.callbacks.len(), 1);
        assert_eq!(outcome.callbacks[0].subscriber, fast);

        fx.clock.advance(Duration::seconds(299));
        assert!(fx.fire_due().is_empty());
        fx.clock.advance(Duration::seconds(1));
        let fired = fx.fire_due();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].subscriber, slow);
    }

    #[test]
    fn test_new_event_supersedes_pending_timer() {
        let mut fx = Fixture::new("on");
        let sub = EntityId::new("climate.lounge");
        fx.tracker
            .register_callback("lounge", sub.clone(), Duration::seconds(300), &mut fx.timers)
            .unwrap();
        fx.sensor(MOTION, "off");
        fx.clock.advance(Duration::seconds(100));
        let outcome = fx.sensor(MOTION, "on");
        assert_eq!(outcome.callbacks.len(), 1);
        assert_eq!(fx.timers.active_count(), 0);
        fx.clock.advance(Duration::seconds(400));
        assert!(fx.fire_due().is_empty());
    }

    #[test]
    fn test_register_inside_vacating_window_fires_when_window_lapses() {
        let mut fx = Fixture::new("on");
        fx.sensor(MOTION, "off");
        fx.clock.advance(Duration::seconds(200));

        let sub = EntityId::new("fan.lounge");
        fx.tracker
            .register_callback("lounge", sub.clone(), Duration::seconds(300), &mut fx.timers)
            .unwrap();
        assert_eq!(fx.timers.active_count(), 1);

        fx.clock.advance(Duration::seconds(99));
        assert!(fx.fire_due().is_empty());
        fx.clock.advance(Duration::seconds(1));
        let fired = fx.fire_due();
        assert_eq!(fired, vec![PresenceCallback { room: "lounge".to_string(), subscriber: sub }]);
        assert!(fx.vacant(300));
    }

    #[test]
    fn test_register_outside_window_arms_nothing() {
        let mut fx = Fixture::new("off");
        fx.tracker
            .register_callback(
                "lounge",
                EntityId::new("fan.lounge"),
                Duration::seconds(60),
                &mut fx.timers,
            )
            .unwrap();
        assert_eq!(fx.timers.active_count(), 0);
    }

    #[test]
    fn test_cancel_callback_cancels_timer() {
        let mut fx = Fixture::new("on");
        let handle = fx
            .tracker
            .register_callback(
                "lounge",
                EntityId::new("fan.lounge"),
                Duration::seconds(60),
                &mut fx.timers,
            )
            .unwrap();
        fx.sensor(MOTION, "off");
        assert_eq!(fx.timers.active_count(), 1);
        fx.tracker.cancel_callback(&handle, &mut fx.timers);
        assert_eq!(fx.timers.active_count(), 0);
        assert_eq!(fx.tracker.room("lounge").unwrap().subscription_count(), 0);
    }

    #[test]
    fn test_seconds_occupied_or_vacant_sign() {
        let mut fx = Fixture::new("off");
        fx.sensor(MOTION, "on");
        fx.clock.advance(Duration::seconds(90));
        let occupied = fx
            .tracker
            .seconds_occupied_or_vacant("lounge", Duration::seconds(60), fx.clock.now())
            .unwrap();
        assert!((occupied - 90.0).abs() < 0.01);

        fx.sensor(MOTION, "off");
        fx.clock.advance(Duration::seconds(30));
        // still inside the 60s window: counts as occupied since entry
        let window = fx
            .tracker
            .seconds_occupied_or_vacant("lounge", Duration::seconds(60), fx.clock.now())
            .unwrap();
        assert!(window > 0.0);

        fx.clock.advance(Duration::seconds(75));
        let vacant = fx
            .tracker
            .seconds_occupied_or_vacant("lounge", Duration::seconds(60), fx.clock.now())
            .unwrap();
        assert!((vacant + 45.0).abs() < 0.01);
    }

    #[test]
    fn test_added_sensor_becomes_trigger() {
        let mut fx = Fixture::new("off");
        let extra = EntityId::new("binary_sensor.lounge_presence");
        fx.tracker.add_sensor("lounge", extra.clone()).unwrap();
        assert!(fx.tracker.is_presence_sensor(&extra));
        fx.sensor("binary_sensor.lounge_presence", "on");
        assert!(!fx.vacant(0));
        assert!(fx.tracker.add_sensor("attic", extra).is_err());
    }
}
