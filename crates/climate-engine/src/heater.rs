//! Room heaters with per-heater hysteresis

use crate::config::{HeaterConfig, TimeWindow};
use crate::device::{ClimateDevice, DeviceContext, LastCommand, PresenceGate};
use home_platform::{EntityId, EntityState};

/// A switchable heater
#[derive(Debug)]
pub struct Heater {
    gate: PresenceGate,
    temperature_sensor: Option<EntityId>,
    schedule: Option<TimeWindow>,
    last_command: LastCommand<bool>,
}

impl Heater {
    pub fn new(config: &HeaterConfig) -> Self {
        Self {
            gate: PresenceGate::new(config.entity.clone(), config.rooms.clone(), &config.presence),
            temperature_sensor: config.temperature_sensor.clone(),
            schedule: config.schedule.clone(),
            last_command: LastCommand::default(),
        }
    }

    #[must_use]
    pub fn entity(&self) -> &EntityId {
        self.gate.entity()
    }

    /// Room sensor this heater reads, if it has its own
    #[must_use]
    pub fn temperature_sensor(&self) -> Option<&EntityId> {
        self.temperature_sensor.as_ref()
    }

    /// Scheduled window active, or someone in the heater's rooms
    fn should_heat(&self, ctx: &DeviceContext<'_>) -> bool {
        let now = ctx.now();
        let scheduled = self
            .schedule
            .as_ref()
            .is_some_and(|window| window.contains(now.time()));
        let occupied =
            !self.gate.rooms().is_empty() && !self.gate.vacant_for_control(ctx.presence, now);
        scheduled || occupied
    }

    fn temperature(&self, ctx: &DeviceContext<'_>) -> Option<f64> {
        match &self.temperature_sensor {
            Some(sensor) => ctx.platform.state_f64(sensor),
            None => ctx.conditions.inside,
        }
    }

    fn is_on(&self, ctx: &DeviceContext<'_>) -> Option<bool> {
        ctx.platform
            .state(self.entity())
            .and_then(|s| s.as_binary())
    }

    fn switch(&mut self, on: bool, ctx: &mut DeviceContext<'_>) {
        let entity = self.entity().clone();
        let current = ctx.platform.state(&entity);
        if current.as_ref().and_then(EntityState::as_binary) == Some(on)
            || self.last_command.in_flight(&on, current.as_ref())
        {
            return;
        }
        tracing::info!("Heater {} {}", entity, if on { "on" } else { "off" });
        if on {
            ctx.platform.turn_on(&entity);
        } else {
            ctx.platform.turn_off(&entity);
        }
        self.last_command.record(on, current);
        self.gate.record_adjustment(ctx.now());
    }

    /// Switch the heater off regardless of conditions
    pub fn turn_off(&mut self, ctx: &mut DeviceContext<'_>) {
        self.switch(false, ctx);
    }
}

impl ClimateDevice for Heater {
    fn gate(&self) -> &PresenceGate {
        &self.gate
    }

    fn gate_mut(&mut self) -> &mut PresenceGate {
        &mut self.gate
    }

    fn adjust(&mut self, ctx: &mut DeviceContext<'_>) {
        let conditions = ctx.conditions;
        if conditions.scene.is_away() {
            if self.is_on(ctx) == Some(true) {
                tracing::warn!(
                    "Heater {} was on during {} scene, turning it off",
                    self.entity(),
                    conditions.scene
                );
            }
            self.switch(false, ctx);
            return;
        }

        if !self.should_heat(ctx) {
            self.switch(false, ctx);
            return;
        }
        if !conditions.climate_control {
            return;
        }

        let Some(temperature) = self.temperature(ctx) else {
            tracing::debug!("Heater {} has no temperature reading", self.entity());
            return;
        };
        let target = conditions.targets.heat_target;
        let buffer = conditions.heater_buffer;
        if temperature < target - buffer {
            self.switch(true, ctx);
        } else if temperature > target + buffer {
            self.switch(false, ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::tests::conditions;
    use crate::config::{PresenceSettings, RoomConfig};
    use crate::presence::PresenceTracker;
    use crate::scene::Scene;
    use crate::scheduler::{ManualClock, TimerQueue};
    use crate::test_support::{start, TestHome};
    use chrono::Duration;

    const HEATER: &str = "switch.bedroom_heater";
    const SENSOR: &str = "sensor.bedroom_temperature";

    fn heater(schedule: Option<TimeWindow>) -> Heater {
        Heater::new(&HeaterConfig {
            entity: EntityId::new(HEATER),
            rooms: vec!["bedroom".to_string()],
            temperature_sensor: Some(EntityId::new(SENSOR)),
            schedule,
            presence: PresenceSettings::default(),
        })
    }

    fn tracker(home: &TestHome, motion: &str) -> PresenceTracker {
        home.set_at(
            "binary_sensor.bedroom_motion",
            motion,
            start() - Duration::hours(1),
        );
        let mut presence = PresenceTracker::new();
        presence.add_room(
            &RoomConfig {
                id: "bedroom".to_string(),
                sensors: vec![EntityId::new("binary_sensor.bedroom_motion")],
                person_sensors: Vec::new(),
            },
            home,
            start(),
            &[],
        );
        presence
    }

    #[test]
    fn test_heater_hysteresis_band() {
        let home = TestHome::new();
        home.set_at(HEATER, "off", start());
        let mut presence = tracker(&home, "on");
        let mut timers = TimerQueue::new(ManualClock::new(start()));
        let mut heater = heater(None);
        heater.gate_mut().monitor_presence(&mut presence, &mut timers);

        let mut c = conditions(20.0);
        c.targets.heat_target = 18.0;
        let mut ctx = DeviceContext {
            platform: &home,
            scheduler: &mut timers,
            presence: &mut presence,
            conditions: &c,
        };

        home.set_at(SENSOR, "15", start());
        heater.adjust(&mut ctx);
        assert_eq!(home.state_of(HEATER).as_deref(), Some("on"));

        for reading in ["17", "19.5", "20"] {
            home.set_at(SENSOR, reading, start());
            heater.adjust(&mut ctx);
            assert_eq!(home.state_of(HEATER).as_deref(), Some("on"), "at {reading}");
        }

        home.set_at(SENSOR, "21", start());
        heater.adjust(&mut ctx);
        assert_eq!(home.state_of(HEATER).as_deref(), Some("off"));

        home.set_at(SENSOR, "17", start());
        heater.adjust(&mut ctx);
        assert_eq!(home.state_of(HEATER).as_deref(), Some("off"));
        assert_eq!(home.calls_for(HEATER).len(), 2);
    }

    #[test]
    fn test_vacant_room_turns_heater_off() {
        let home = TestHome::new();
        home.set_at(HEATER, "on", start());
        home.set_at(SENSOR, "12", start());
        let mut presence = tracker(&home, "off");
        let mut timers = TimerQueue::new(ManualClock::new(start()));
        let mut heater = heater(None);
        heater.gate_mut().monitor_presence(&mut presence, &mut timers);

        let c = conditions(12.0);
        let mut ctx = DeviceContext {
            platform: &home,
            scheduler: &mut timers,
            presence: &mut presence,
            conditions: &c,
        };
        heater.adjust(&mut ctx);
        assert_eq!(home.state_of(HEATER).as_deref(), Some("off"));
    }

    #[test]
    fn test_schedule_heats_empty_room() {
        let home = TestHome::new();
        home.set_at(HEATER, "off", start());
        home.set_at(SENSOR, "12", start());
        let mut presence = tracker(&home, "off");
        let mut timers = TimerQueue::new(ManualClock::new(start()));
        let mut heater = heater(Some(TimeWindow::new("11:00", "13:00")));
        heater.gate_mut().monitor_presence(&mut presence, &mut timers);

        let c = conditions(12.0);
        let mut ctx = DeviceContext {
            platform: &home,
            scheduler: &mut timers,
            presence: &mut presence,
            conditions: &c,
        };
        heater.adjust(&mut ctx);
        assert_eq!(home.state_of(HEATER).as_deref(), Some("on"));
    }

    #[test]
    fn test_away_forces_heater_off() {
        let home = TestHome::new();
        home.set_at(HEATER, "on", start());
        home.set_at(SENSOR, "12", start());
        let mut presence = tracker(&home, "on");
        let mut timers = TimerQueue::new(ManualClock::new(start()));
        let mut c = conditions(12.0);
        c.scene = Scene::Away;
        let mut ctx = DeviceContext {
            platform: &home,
            scheduler: &mut timers,
            presence: &mut presence,
            conditions: &c,
        };
        heater(None).adjust(&mut ctx);
        assert_eq!(home.state_of(HEATER).as_deref(), Some("off"));
    }
}
