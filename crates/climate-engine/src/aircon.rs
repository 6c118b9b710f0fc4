//! Aircon zones

use crate::conditions::{AirconMode, ZoneFanSpeed};
use crate::config::ZoneConfig;
use crate::device::{
    ClimateDevice, DeviceContext, LastCommand, PresenceGate, TransitionPlan, TransitionSettings,
};
use home_platform::{EntityId, ServiceCall};
use serde_json::json;

/// One zone of the ducted aircon, driven as a climate entity
#[derive(Debug)]
pub struct AirconZone {
    gate: PresenceGate,
    last_command: LastCommand<Option<(AirconMode, ZoneFanSpeed)>>,
}

impl AirconZone {
    pub fn new(config: &ZoneConfig) -> Self {
        Self {
            gate: PresenceGate::new(config.entity.clone(), config.rooms.clone(), &config.presence),
            last_command: LastCommand::default(),
        }
    }

    #[must_use]
    pub fn entity(&self) -> &EntityId {
        self.gate.entity()
    }

    /// Mode and fan speed this zone should run at, `None` for off
    fn desired(&self, ctx: &DeviceContext<'_>) -> Option<(AirconMode, ZoneFanSpeed)> {
        let conditions = ctx.conditions;
        let mode = conditions.aircon?;
        let speed = conditions.zone_speed(self.entity())?;
        if self.gate.vacant_for_control(ctx.presence, ctx.now()) {
            return None;
        }
        match self.gate.transition() {
            Some(TransitionSettings::SoftStart) => Some((mode, ZoneFanSpeed::Low)),
            _ => Some((mode, speed)),
        }
    }

    /// Drive the zone to `desired`, skipping commands for settings already in effect
    fn apply(&mut self, desired: Option<(AirconMode, ZoneFanSpeed)>, ctx: &mut DeviceContext<'_>) {
        let entity = self.entity().clone();
        let current = ctx.platform.state(&entity);
        if self.last_command.in_flight(&desired, current.as_ref()) {
            return;
        }
        let mut changed = false;

        match desired {
            None => {
                if current.as_ref().map_or(true, |s| s.state != "off") {
                    tracing::info!("Aircon zone {} off", entity);
                    ctx.platform.turn_off(&entity);
                    changed = true;
                }
            }
            Some((mode, speed)) => {
                if current.as_ref().map_or(true, |s| s.state != mode.as_str()) {
                    tracing::info!("Aircon zone {} {}", entity, mode.as_str());
                    ctx.platform.call_service(ServiceCall::for_entity(
                        &entity,
                        "set_hvac_mode",
                        json!({ "hvac_mode": mode.as_str() }),
                    ));
                    changed = true;
                }
                let fan_mode = current
                    .as_ref()
                    .and_then(|s| s.attribute("fan_mode"))
                    .and_then(|v| v.as_str().map(str::to_string));
                if fan_mode.as_deref() != Some(speed.as_str()) {
                    tracing::info!("Aircon zone {} fan {}", entity, speed.as_str());
                    ctx.platform.call_service(ServiceCall::for_entity(
                        &entity,
                        "set_fan_mode",
                        json!({ "fan_mode": speed.as_str() }),
                    ));
                    changed = true;
                }
            }
        }

        if changed {
            self.last_command.record(desired, current);
            self.gate.record_adjustment(ctx.now());
        }
    }

    /// Switch the zone off regardless of conditions
    pub fn turn_off(&mut self, ctx: &mut DeviceContext<'_>) {
        self.gate.cancel_transition();
        self.apply(None, ctx);
    }
}

impl ClimateDevice for AirconZone {
    fn gate(&self) -> &PresenceGate {
        &self.gate
    }

    fn gate_mut(&mut self) -> &mut PresenceGate {
        &mut self.gate
    }

    fn adjust(&mut self, ctx: &mut DeviceContext<'_>) {
        let desired = self.desired(ctx);
        self.apply(desired, ctx);
    }

    fn occupied_transition(&self, ctx: &DeviceContext<'_>) -> Option<TransitionPlan> {
        let period = self.gate.transition_period();
        let speed = ctx.conditions.zone_speed(self.entity());
        (ctx.conditions.aircon.is_some()
            && speed == Some(ZoneFanSpeed::Auto)
            && period > chrono::Duration::zero())
        .then(|| TransitionPlan {
            step_time: period,
            steps: 1,
            settings: TransitionSettings::SoftStart,
        })
    }
}
