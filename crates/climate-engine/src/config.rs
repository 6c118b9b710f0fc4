//! Configuration model for the climate engine
//!
//! Every field has a default so that a partial `climate.json` still yields a
//! working configuration.

use crate::error::ClimateError;
use chrono::{Duration, NaiveTime, Timelike};
use home_platform::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    /// Target and trigger temperatures
    pub temperatures: TemperatureSettings,
    /// Platform entities the engine reads
    pub entities: EntityConfig,
    /// Rooms and their presence sensors
    pub rooms: Vec<RoomConfig>,
    /// Aircon zones
    pub aircon: AirconConfig,
    /// Ceiling/pedestal fans
    pub fans: Vec<FanConfig>,
    /// Room heaters
    pub heaters: Vec<HeaterConfig>,
    /// Number of discrete fan speed steps
    pub fan_speed_steps: u8,
    /// Forecast sample offsets (hours from now)
    pub forecast_offsets_hours: Vec<u32>,
    /// Seconds after which a climate control override is considered stale
    pub override_expiry_secs: u64,
    /// Targets for suggestions and status notifications
    pub notify_targets: Vec<String>,
    /// Targets for security (person detected while away) notifications
    pub security_targets: Vec<String>,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            temperatures: TemperatureSettings::default(),
            entities: EntityConfig::default(),
            rooms: Vec::new(),
            aircon: AirconConfig::default(),
            fans: Vec::new(),
            heaters: Vec::new(),
            fan_speed_steps: 6,
            forecast_offsets_hours: vec![2, 4, 6, 8],
            override_expiry_secs: 4 * 60 * 60,
            notify_targets: Vec::new(),
            security_targets: Vec::new(),
        }
    }
}

impl ClimateConfig {
    /// Check cross references and schedule formats
    pub fn validate(&self) -> Result<(), ClimateError> {
        let rooms: HashSet<&str> = self.rooms.iter().map(|r| r.id.as_str()).collect();
        let device_rooms = self
            .aircon
            .zones
            .iter()
            .flat_map(|z| z.rooms.iter())
            .chain(self.fans.iter().flat_map(|f| f.rooms.iter()))
            .chain(self.heaters.iter().flat_map(|h| h.rooms.iter()));
        for room in device_rooms {
            if !rooms.contains(room.as_str()) {
                return Err(ClimateError::UnknownRoom(room.clone()));
            }
        }

        if let Some(rest) = &self.aircon.rest_zone {
            if !self.aircon.zones.iter().any(|z| &z.entity == rest) {
                return Err(ClimateError::UnknownDevice(rest.to_string()));
            }
        }

        let windows = self
            .fans
            .iter()
            .filter_map(|f| f.schedule.as_ref())
            .chain(self.heaters.iter().filter_map(|h| h.schedule.as_ref()));
        for window in windows {
            window.parse()?;
        }

        if self.fan_speed_steps == 0 {
            return Err(ClimateError::InvalidSetting(
                "fan_speed_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Override expiry as a duration
    #[must_use]
    pub fn override_expiry(&self) -> Duration {
        Duration::seconds(i64::try_from(self.override_expiry_secs).unwrap_or(i64::MAX / 1000))
    }
}

/// Temperature thresholds, with variants used during rest scenes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureSettings {
    pub cool_target: f64,
    pub heat_target: f64,
    pub high_trigger: f64,
    pub low_trigger: f64,
    pub sleep_cool_target: f64,
    pub sleep_heat_target: f64,
    pub sleep_high_trigger: f64,
    pub sleep_low_trigger: f64,
    /// Hysteresis buffer either side of a heater's target
    pub heater_buffer: f64,
}

impl Default for TemperatureSettings {
    fn default() -> Self {
        Self {
            cool_target: 24.0,
            heat_target: 19.0,
            high_trigger: 28.0,
            low_trigger: 15.0,
            sleep_cool_target: 23.0,
            sleep_heat_target: 17.0,
            sleep_high_trigger: 26.0,
            sleep_low_trigger: 13.0,
            heater_buffer: 2.0,
        }
    }
}

/// A single adjustable temperature setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureSetting {
    CoolTarget,
    HeatTarget,
    HighTrigger,
    LowTrigger,
    SleepCoolTarget,
    SleepHeatTarget,
    SleepHighTrigger,
    SleepLowTrigger,
    HeaterBuffer,
}

impl TemperatureSetting {
    fn label(self) -> &'static str {
        match self {
            Self::CoolTarget => "cooling target",
            Self::HeatTarget => "heating target",
            Self::HighTrigger => "high trigger",
            Self::LowTrigger => "low trigger",
            Self::SleepCoolTarget => "sleep cooling target",
            Self::SleepHeatTarget => "sleep heating target",
            Self::SleepHighTrigger => "sleep high trigger",
            Self::SleepLowTrigger => "sleep low trigger",
            Self::HeaterBuffer => "heater buffer",
        }
    }
}

/// Thresholds in effect for the current scene
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Targets {
    pub cool_target: f64,
    pub heat_target: f64,
    pub high_trigger: f64,
    pub low_trigger: f64,
}

impl TemperatureSettings {
    /// Thresholds for normal or rest periods
    #[must_use]
    pub fn targets(&self, rest: bool) -> Targets {
        if rest {
            Targets {
                cool_target: self.sleep_cool_target,
                heat_target: self.sleep_heat_target,
                high_trigger: self.sleep_high_trigger,
                low_trigger: self.sleep_low_trigger,
            }
        } else {
            Targets {
                cool_target: self.cool_target,
                heat_target: self.heat_target,
                high_trigger: self.high_trigger,
                low_trigger: self.low_trigger,
            }
        }
    }

    /// Apply a new value, clamping companion settings so that
    /// `low_trigger <= heat_target <= cool_target <= high_trigger` holds.
    ///
    /// Returns one warning per companion value that had to be moved.
    pub fn apply(
        &mut self,
        setting: TemperatureSetting,
        value: f64,
    ) -> Result<Vec<String>, ClimateError> {
        use TemperatureSetting::*;

        if !value.is_finite() {
            return Err(ClimateError::InvalidSetting(format!(
                "{} must be a number",
                setting.label()
            )));
        }
        if setting == HeaterBuffer {
            if value < 0.0 {
                return Err(ClimateError::InvalidSetting(
                    "heater buffer must not be negative".to_string(),
                ));
            }
            self.heater_buffer = value;
            return Ok(Vec::new());
        }

        let chain = if matches!(setting, LowTrigger | HeatTarget | CoolTarget | HighTrigger) {
            [LowTrigger, HeatTarget, CoolTarget, HighTrigger]
        } else {
            [SleepLowTrigger, SleepHeatTarget, SleepCoolTarget, SleepHighTrigger]
        };
        let position = chain.iter().position(|s| *s == setting).unwrap_or(0);

        self.set(setting, value);
        let mut warnings = Vec::new();
        for (index, companion) in chain.iter().enumerate() {
            let current = self.get(*companion);
            let clamped = if index > position && current < value {
                Some(value)
            } else if index < position && current > value {
                Some(value)
            } else {
                None
            };
            if let Some(new_value) = clamped {
                self.set(*companion, new_value);
                warnings.push(format!(
                    "{} moved from {} to {} to stay consistent with the {}",
                    companion.label(),
                    current,
                    new_value,
                    setting.label()
                ));
            }
        }
        Ok(warnings)
    }

    /// Current value of a setting
    #[must_use]
    pub fn get(&self, setting: TemperatureSetting) -> f64 {
        match setting {
            TemperatureSetting::CoolTarget => self.cool_target,
            TemperatureSetting::HeatTarget => self.heat_target,
            TemperatureSetting::HighTrigger => self.high_trigger,
            TemperatureSetting::LowTrigger => self.low_trigger,
            TemperatureSetting::SleepCoolTarget => self.sleep_cool_target,
            TemperatureSetting::SleepHeatTarget => self.sleep_heat_target,
            TemperatureSetting::SleepHighTrigger => self.sleep_high_trigger,
            TemperatureSetting::SleepLowTrigger => self.sleep_low_trigger,
            TemperatureSetting::HeaterBuffer => self.heater_buffer,
        }
    }

    fn set(&mut self, setting: TemperatureSetting, value: f64) {
        let slot = match setting {
            TemperatureSetting::CoolTarget => &mut self.cool_target,
            TemperatureSetting::HeatTarget => &mut self.heat_target,
            TemperatureSetting::HighTrigger => &mut self.high_trigger,
            TemperatureSetting::LowTrigger => &mut self.low_trigger,
            TemperatureSetting::SleepCoolTarget => &mut self.sleep_cool_target,
            TemperatureSetting::SleepHeatTarget => &mut self.sleep_heat_target,
            TemperatureSetting::SleepHighTrigger => &mut self.sleep_high_trigger,
            TemperatureSetting::SleepLowTrigger => &mut self.sleep_low_trigger,
            TemperatureSetting::HeaterBuffer => &mut self.heater_buffer,
        };
        *slot = value;
    }
}

/// Platform entities read by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    pub inside_temperature: EntityId,
    pub outside_temperature: EntityId,
    /// Door contact sensor ("on" = open)
    pub door: EntityId,
    /// Switch mirroring automatic climate control
    pub climate_control: EntityId,
    /// Switch for the unsupervised-pets mode
    pub pets_home_alone: EntityId,
    /// Scene selector
    pub scene: EntityId,
    /// Forecast sensors are `<prefix><offset>h`
    pub forecast_prefix: String,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            inside_temperature: EntityId::new("sensor.inside_apparent_temperature"),
            outside_temperature: EntityId::new("sensor.outside_apparent_temperature"),
            door: EntityId::new("binary_sensor.front_door"),
            climate_control: EntityId::new("input_boolean.climate_control"),
            pets_home_alone: EntityId::new("input_boolean.pets_home_alone"),
            scene: EntityId::new("input_select.scene"),
            forecast_prefix: "sensor.outside_apparent_temperature_".to_string(),
        }
    }
}

impl EntityConfig {
    /// Forecast sensor for an offset in hours
    #[must_use]
    pub fn forecast(&self, offset_hours: u32) -> EntityId {
        EntityId::new(format!("{}{}h", self.forecast_prefix, offset_hours))
    }
}

/// A logical room fused from one or more binary sensors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub id: String,
    /// Motion/occupancy sensors
    #[serde(default)]
    pub sensors: Vec<EntityId>,
    /// Person-detection sensors (also presence triggers)
    #[serde(default)]
    pub person_sensors: Vec<EntityId>,
}

/// Presence gating parameters shared by every device kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    /// Seconds a room must stay empty before the device reacts
    pub vacating_delay_secs: u64,
    /// Minimum seconds between adjustments
    pub adjustment_delay_secs: u64,
    /// Seconds over which a re-occupied device ramps up (0 = no ramp)
    pub transition_period_secs: u64,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            vacating_delay_secs: 600,
            adjustment_delay_secs: 60,
            transition_period_secs: 0,
        }
    }
}

/// Aircon zones
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AirconConfig {
    pub zones: Vec<ZoneConfig>,
    /// Zone that stays on during rest scenes
    pub rest_zone: Option<EntityId>,
}

/// One aircon zone (a climate entity)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub entity: EntityId,
    #[serde(default)]
    pub rooms: Vec<String>,
    #[serde(flatten)]
    pub presence: PresenceSettings,
}

/// A fan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanConfig {
    pub entity: EntityId,
    #[serde(default)]
    pub rooms: Vec<String>,
    /// Window outside which the fan stays off
    #[serde(default)]
    pub schedule: Option<TimeWindow>,
    #[serde(flatten)]
    pub presence: PresenceSettings,
}

/// A heater
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaterConfig {
    pub entity: EntityId,
    #[serde(default)]
    pub rooms: Vec<String>,
    /// Room temperature sensor (defaults to the inside temperature)
    #[serde(default)]
    pub temperature_sensor: Option<EntityId>,
    /// Window in which the heater runs regardless of occupancy
    #[serde(default)]
    pub schedule: Option<TimeWindow>,
    #[serde(flatten)]
    pub presence: PresenceSettings,
}

/// Daily window in HH:MM format (may wrap past midnight)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

impl TimeWindow {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    fn parse(&self) -> Result<(NaiveTime, NaiveTime), ClimateError> {
        Ok((parse_time(&self.start)?, parse_time(&self.end)?))
    }

    /// Whether `time` falls inside the window (malformed windows never match)
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        let Ok((start, end)) = self.parse() else {
            return false;
        };
        let time = time.with_nanosecond(0).unwrap_or(time);
        if start <= end {
            time >= start && time < end
        } else {
            time >= start || time < end
        }
    }
}

/// Parse a time string in HH:MM format
fn parse_time(s: &str) -> Result<NaiveTime, ClimateError> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| ClimateError::InvalidTimeFormat(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_time_window_wraps_midnight() {
        let window = TimeWindow::new("21:00", "07:00");
        assert!(window.contains(time(23, 30)));
        assert!(window.contains(time(6, 59)));
        assert!(!window.contains(time(7, 0)));
        assert!(!window.contains(time(12, 0)));
    }

    #[test]
    fn test_malformed_window_never_matches() {
        let window = TimeWindow::new("9pm", "07:00");
        assert!(!window.contains(time(23, 0)));
        assert!(window.parse().is_err());
    }

    #[test]
    fn test_heat_target_above_cool_target_clamps_cool_target() {
        let mut settings = TemperatureSettings::default();
        let warnings = settings.apply(TemperatureSetting::HeatTarget, 25.0).unwrap();
        assert_eq!(settings.heat_target, 25.0);
        assert_eq!(settings.cool_target, 25.0);
        assert_eq!(settings.high_trigger, 28.0);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_low_cool_target_pushes_heat_side_down() {
        let mut settings = TemperatureSettings::default();
        let warnings = settings.apply(TemperatureSetting::CoolTarget, 14.0).unwrap();
        assert_eq!(settings.heat_target, 14.0);
        assert_eq!(settings.low_trigger, 14.0);
        assert_eq!(warnings.len(), 2);
        // sleep thresholds are a separate chain
        assert_eq!(settings.sleep_heat_target, 17.0);
    }

    #[test]
    fn test_negative_buffer_rejected() {
        let mut settings = TemperatureSettings::default();
        assert!(settings.apply(TemperatureSetting::HeaterBuffer, -1.0).is_err());
        assert!(settings.apply(TemperatureSetting::CoolTarget, f64::NAN).is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ClimateConfig = serde_json::from_str(
            r#"{
                "rooms": [{"id": "lounge", "sensors": ["binary_sensor.lounge_motion"]}],
                "fans": [{"entity": "fan.lounge", "rooms": ["lounge"], "vacating_delay_secs": 120}]
            }"#,
        )
        .unwrap();
        assert_eq!(config.fan_speed_steps, 6);
        assert_eq!(config.fans[0].presence.vacating_delay_secs, 120);
        assert_eq!(config.fans[0].presence.adjustment_delay_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_room_rejected() {
        let config: ClimateConfig = serde_json::from_str(
            r#"{"heaters": [{"entity": "switch.heater", "rooms": ["attic"]}]}"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ClimateError::UnknownRoom(r)) if r == "attic"));
    }
}
