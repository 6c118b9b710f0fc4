//! Ceiling and pedestal fans

use crate::config::{FanConfig, TimeWindow};
use crate::device::{
    ClimateDevice, DeviceContext, LastCommand, PresenceGate, TransitionPlan, TransitionSettings,
};
use chrono::NaiveDateTime;
use home_platform::{EntityId, ServiceCall};
use serde_json::json;

/// A fan with discrete speed steps and reversible direction
#[derive(Debug)]
pub struct Fan {
    gate: PresenceGate,
    schedule: Option<TimeWindow>,
    /// Percentage and direction, `None` for off
    last_command: LastCommand<Option<(u8, &'static str)>>,
}

impl Fan {
    pub fn new(config: &FanConfig) -> Self {
        Self {
            gate: PresenceGate::new(config.entity.clone(), config.rooms.clone(), &config.presence),
            schedule: config.schedule.clone(),
            last_command: LastCommand::default(),
        }
    }

    #[must_use]
    pub fn entity(&self) -> &EntityId {
        self.gate.entity()
    }

    /// Outside the fan's allowed window
    #[must_use]
    pub fn is_off_schedule(&self, now: NaiveDateTime) -> bool {
        self.schedule
            .as_ref()
            .is_some_and(|window| !window.contains(now.time()))
    }

    /// Speed step to run at right now
    fn desired_step(&self, ctx: &DeviceContext<'_>) -> u8 {
        let now = ctx.now();
        if self.is_off_schedule(now) || self.gate.vacant_for_control(ctx.presence, now) {
            return 0;
        }
        match self.gate.transition() {
            Some(TransitionSettings::FanRamp { target_step }) => {
                let target = *target_step;
                let progress = self.gate.transition_progress(ctx.presence, now);
                ((f64::from(target) * progress).ceil() as u8).clamp(1, target.max(1))
            }
            _ => ctx.conditions.fan_speed_step(),
        }
    }

    /// Set the speed step (0 = off) and airflow direction
    fn set_speed(&mut self, step: u8, ctx: &mut DeviceContext<'_>) {
        let entity = self.entity().clone();
        let current = ctx.platform.state(&entity);
        let direction = if ctx.conditions.is_hot() { "forward" } else { "reverse" };
        let setting = (step > 0).then(|| (ctx.conditions.fan_percentage(step), direction));
        if self.last_command.in_flight(&setting, current.as_ref()) {
            return;
        }
        let is_off = current.as_ref().is_some_and(|s| s.state == "off");
        let mut changed = false;

        if step == 0 {
            if !is_off {
                tracing::info!("Fan {} off", entity);
                ctx.platform.turn_off(&entity);
                changed = true;
            }
        } else {
            let percentage = ctx.conditions.fan_percentage(step);
            let current_pct = current
                .as_ref()
                .and_then(|s| s.attribute("percentage"))
                .and_then(serde_json::Value::as_u64);
            if is_off || current.is_none() || current_pct != Some(u64::from(percentage)) {
                tracing::info!("Fan {} speed {} ({}%)", entity, step, percentage);
                ctx.platform.call_service(ServiceCall::for_entity(
                    &entity,
                    "set_percentage",
                    json!({ "percentage": percentage }),
                ));
                changed = true;
            }

            let current_direction = current
                .as_ref()
                .and_then(|s| s.attribute("direction"))
                .and_then(|v| v.as_str().map(str::to_string));
            if current_direction.as_deref() != Some(direction) {
                tracing::info!("Fan {} direction {}", entity, direction);
                ctx.platform.call_service(ServiceCall::for_entity(
                    &entity,
                    "set_direction",
                    json!({ "direction": direction }),
                ));
                changed = true;
            }
        }

        if changed {
            self.last_command.record(setting, current);
            self.gate.record_adjustment(ctx.now());
        }
    }

    /// Switch the fan off regardless of conditions
    pub fn turn_off(&mut self, ctx: &mut DeviceContext<'_>) {
        self.gate.cancel_transition();
        self.set_speed(0, ctx);
    }
}

impl ClimateDevice for Fan {
    fn gate(&self) -> &PresenceGate {
        &self.gate
    }

    fn gate_mut(&mut self) -> &mut PresenceGate {
        &mut self.gate
    }

    fn adjust(&mut self, ctx: &mut DeviceContext<'_>) {
        if !ctx.conditions.climate_control {
            // manual mode: only presence may switch a fan, and only off
            if self.gate.vacant_for_control(ctx.presence, ctx.now()) {
                self.set_speed(0, ctx);
            }
            return;
        }
        let step = self.desired_step(ctx);
        self.set_speed(step, ctx);
    }

    fn occupied_transition(&self, ctx: &DeviceContext<'_>) -> Option<TransitionPlan> {
        let period = self.gate.transition_period();
        if !ctx.conditions.climate_control || self.is_off_schedule(ctx.now()) {
            return None;
        }
        let target = ctx.conditions.fan_speed_step();
        if target <= 1 || period <= chrono::Duration::zero() {
            return None;
        }
        Some(TransitionPlan {
            step_time: period / i32::from(target),
            steps: u32::from(target),
            settings: TransitionSettings::FanRamp {
                target_step: target,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::tests::conditions;
    use crate::config::{PresenceSettings, RoomConfig};
    use crate::presence::PresenceTracker;
    use crate::scheduler::{ManualClock, TimerQueue};
    use crate::test_support::{start, TestHome};
    use chrono::Duration;

    const FAN: &str = "fan.lounge";

    fn fan(schedule: Option<TimeWindow>, transition_secs: u64) -> Fan {
        Fan::new(&FanConfig {
            entity: EntityId::new(FAN),
            rooms: vec!["lounge".to_string()],
            schedule,
            presence: PresenceSettings {
                vacating_delay_secs: 0,
                adjustment_delay_secs: 0,
                transition_period_secs: transition_secs,
            },
        })
    }

    fn tracker(home: &TestHome, motion: &str) -> PresenceTracker {
        home.set_at("binary_sensor.lounge_motion", motion, start() - Duration::minutes(5));
        let mut presence = PresenceTracker::new();
        presence.add_room(
            &RoomConfig {
                id: "lounge".to_string(),
                sensors: vec![EntityId::new("binary_sensor.lounge_motion")],
                person_sensors: Vec::new(),
            },
            home,
            start(),
            &[],
        );
        presence
    }

    #[test]
    fn test_fan_speed_and_direction() {
        let home = TestHome::new();
        home.set_at(FAN, "off", start());
        let mut presence = tracker(&home, "on");
        let mut timers = TimerQueue::new(ManualClock::new(start()));
        let mut fan = fan(None, 0);
        fan.gate_mut().monitor_presence(&mut presence, &mut timers);

        let hot = conditions(26.5);
        let mut ctx = DeviceContext {
            platform: &home,
            scheduler: &mut timers,
            presence: &mut presence,
            conditions: &hot,
        };
        fan.adjust(&mut ctx);
        assert_eq!(home.state_of(FAN).as_deref(), Some("on"));
        assert_eq!(home.attribute_of(FAN, "percentage"), Some(json!(50)));
        assert_eq!(home.attribute_of(FAN, "direction"), Some(json!("forward")));

        let calls = home.calls().len();
        fan.adjust(&mut ctx);
        assert_eq!(home.calls().len(), calls);

        let mild = conditions(22.0);
        ctx.conditions = &mild;
        fan.adjust(&mut ctx);
        assert_eq!(home.state_of(FAN).as_deref(), Some("off"));
    }

    #[test]
    fn test_vacant_room_turns_fan_off() {
        let home = TestHome::new();
        home.set_at(FAN, "on", start());
        let mut presence = tracker(&home, "off");
        let mut timers = TimerQueue::new(ManualClock::new(start()));
        let mut fan = fan(None, 0);
        fan.gate_mut().monitor_presence(&mut presence, &mut timers);

        let hot = conditions(27.0);
        let mut ctx = DeviceContext {
            platform: &home,
            scheduler: &mut timers,
            presence: &mut presence,
            conditions: &hot,
        };
        fan.adjust(&mut ctx);
        assert_eq!(home.state_of(FAN).as_deref(), Some("off"));
    }

    #[test]
    fn test_off_schedule_fan_stays_off() {
        let home = TestHome::new();
        let mut presence = tracker(&home, "on");
        let mut timers = TimerQueue::new(ManualClock::new(start()));
        let mut fan = fan(Some(TimeWindow::new("18:00", "23:00")), 0);
        assert!(fan.is_off_schedule(start()));

        let hot = conditions(27.0);
        let mut ctx = DeviceContext {
            platform: &home,
            scheduler: &mut timers,
            presence: &mut presence,
            conditions: &hot,
        };
        fan.adjust(&mut ctx);
        assert_eq!(home.state_of(FAN).as_deref(), Some("off"));
    }

    #[test]
    fn test_ramp_plan_splits_period_by_target_step() {
        let home = TestHome::new();
        let mut presence = tracker(&home, "on");
        let mut timers = TimerQueue::new(ManualClock::new(start()));
        let fan = fan(None, 120);
        let hot = conditions(28.0);
        let ctx = DeviceContext {
            platform: &home,
            scheduler: &mut timers,
            presence: &mut presence,
            conditions: &hot,
        };
        let plan = fan.occupied_transition(&ctx).unwrap();
        assert_eq!(plan.steps, 4);
        assert_eq!(plan.step_time, Duration::seconds(30));
        assert_eq!(plan.settings, TransitionSettings::FanRamp { target_step: 4 });
    }

    #[test]
    fn test_ramp_starts_at_lowest_step() {
        let clock = ManualClock::new(start());
        let home = TestHome::with_clock(clock.clone());
        let mut presence = tracker(&home, "off");
        let mut timers = TimerQueue::new(clock.clone());
        let mut fan = fan(None, 120);
        fan.gate_mut().monitor_presence(&mut presence, &mut timers);

        let motion = home.set_at("binary_sensor.lounge_motion", "on", start());
        presence.handle_sensor_event(
            &EntityId::new("binary_sensor.lounge_motion"),
            &motion,
            &home,
            &mut timers,
        );
        clock.advance(Duration::seconds(1));

        // 28 degrees: steady state is step 4 of 6
        let hot = conditions(28.0);
        let mut ctx = DeviceContext {
            platform: &home,
            scheduler: &mut timers,
            presence: &mut presence,
            conditions: &hot,
        };
        fan.on_presence_change(&mut ctx);
        assert!(fan.gate().transition().is_some());
        assert_eq!(home.attribute_of(FAN, "percentage"), Some(json!(17)));

        clock.advance(Duration::seconds(59));
        fan.adjust(&mut ctx);
        assert_eq!(home.attribute_of(FAN, "percentage"), Some(json!(33)));
    }
}
