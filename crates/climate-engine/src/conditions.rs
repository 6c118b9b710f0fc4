//! Snapshot of the inputs a climate decision is based on

use crate::config::Targets;
use crate::scene::Scene;
use chrono::NaiveDateTime;
use home_platform::EntityId;
use serde::{Deserialize, Serialize};

/// Aircon operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirconMode {
    Cool,
    Heat,
}

impl AirconMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cool => "cool",
            Self::Heat => "heat",
        }
    }

    /// Parse a climate entity's hvac state
    #[must_use]
    pub fn from_state(state: &str) -> Option<Self> {
        match state {
            "cool" => Some(Self::Cool),
            "heat" => Some(Self::Heat),
            _ => None,
        }
    }
}

/// Fan speed requested from an aircon zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneFanSpeed {
    Auto,
    Low,
}

impl ZoneFanSpeed {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Low => "low",
        }
    }
}

/// Inputs for one round of decisions
#[derive(Debug, Clone)]
pub struct Conditions {
    pub now: NaiveDateTime,
    pub scene: Scene,
    /// Inside apparent temperature
    pub inside: Option<f64>,
    /// Outside apparent temperature
    pub outside: Option<f64>,
    /// Thresholds for the current scene
    pub targets: Targets,
    pub heater_buffer: f64,
    /// Aircon mode, `None` while off
    pub aircon: Option<AirconMode>,
    pub climate_control: bool,
    pub pets_home_alone: bool,
    pub door_open: bool,
    pub fan_speed_steps: u8,
    /// Zone kept running during rest scenes
    pub rest_zone: Option<EntityId>,
}

impl Conditions {
    /// Inside temperature outside `[low_trigger, high_trigger]`
    #[must_use]
    pub fn too_hot_or_cold(&self) -> bool {
        self.inside
            .is_some_and(|t| t > self.targets.high_trigger || t < self.targets.low_trigger)
    }

    /// Inside temperature within `[heat_target, cool_target]`
    #[must_use]
    pub fn within_target(&self) -> bool {
        self.inside
            .is_some_and(|t| t >= self.targets.heat_target && t <= self.targets.cool_target)
    }

    fn midpoint(&self) -> f64 {
        (self.targets.heat_target + self.targets.cool_target) / 2.0
    }

    /// Warmer than the middle of the target band
    #[must_use]
    pub fn is_hot(&self) -> bool {
        self.inside.is_some_and(|t| t > self.midpoint())
    }

    /// Mode to use when turning the aircon on
    #[must_use]
    pub fn choose_aircon_mode(&self) -> AirconMode {
        match self.inside {
            Some(t) if t > self.targets.cool_target => AirconMode::Cool,
            Some(t) if t < self.targets.heat_target => AirconMode::Heat,
            _ if self.is_hot() => AirconMode::Cool,
            _ => AirconMode::Heat,
        }
    }

    /// Outside air would do a better job than the aircon
    #[must_use]
    pub fn outside_nicer(&self) -> bool {
        let (Some(inside), Some(outside)) = (self.inside, self.outside) else {
            return false;
        };
        match self.aircon {
            Some(AirconMode::Heat) => outside > inside,
            Some(AirconMode::Cool) => outside < inside,
            None => {
                self.too_hot_or_cold()
                    && outside <= self.targets.high_trigger
                    && outside >= self.targets.low_trigger
            }
        }
    }

    /// Fan speed for an aircon zone, `None` if the zone should be off
    #[must_use]
    pub fn zone_speed(&self, zone: &EntityId) -> Option<ZoneFanSpeed> {
        let is_rest_zone = self.rest_zone.as_ref() == Some(zone);
        if self.scene.is_rest() {
            is_rest_zone.then_some(ZoneFanSpeed::Low)
        } else if self.pets_home_alone && self.door_open {
            is_rest_zone.then_some(ZoneFanSpeed::Auto)
        } else if self.scene.is_morning() && is_rest_zone {
            Some(ZoneFanSpeed::Low)
        } else {
            Some(ZoneFanSpeed::Auto)
        }
    }

    /// Discrete fan speed step (0 = off)
    #[must_use]
    pub fn fan_speed_step(&self) -> u8 {
        let Some(inside) = self.inside else {
            return 0;
        };
        let max = self.fan_speed_steps.max(1);
        if inside > self.targets.cool_target {
            let excess = (inside - self.targets.cool_target).ceil();
            excess.min(f64::from(max)) as u8
        } else if inside < self.targets.heat_target
            && self.aircon.is_some()
            && !self.scene.is_rest()
            && !self.scene.is_morning()
        {
            1
        } else {
            0
        }
    }

    /// Percentage for a speed step
    #[must_use]
    pub fn fan_percentage(&self, step: u8) -> u8 {
        let max = u32::from(self.fan_speed_steps.max(1));
        let step = u32::from(step).min(max);
        ((step * 100 + max / 2) / max) as u8
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::TemperatureSettings;
    use crate::test_support::start;

    pub(crate) fn conditions(inside: f64) -> Conditions {
        Conditions {
            now: start(),
            scene: Scene::Day,
            inside: Some(inside),
            outside: None,
            targets: TemperatureSettings::default().targets(false),
            heater_buffer: 2.0,
            aircon: None,
            climate_control: true,
            pets_home_alone: false,
            door_open: false,
            fan_speed_steps: 6,
            rest_zone: Some(EntityId::new("climate.bedroom")),
        }
    }

    #[test]
    fn test_hysteresis_bands() {
        // defaults: low 15, heat 19, cool 24, high 28
        assert!(conditions(29.0).too_hot_or_cold());
        assert!(conditions(14.5).too_hot_or_cold());
        assert!(!conditions(28.0).too_hot_or_cold());
        assert!(conditions(19.0).within_target());
        assert!(conditions(24.0).within_target());
        assert!(!conditions(24.5).within_target());
    }

    #[test]
    fn test_mode_choice() {
        assert_eq!(conditions(29.0).choose_aircon_mode(), AirconMode::Cool);
        assert_eq!(conditions(12.0).choose_aircon_mode(), AirconMode::Heat);
        assert_eq!(conditions(22.0).choose_aircon_mode(), AirconMode::Cool);
        assert_eq!(conditions(21.0).choose_aircon_mode(), AirconMode::Heat);
    }

    #[test]
    fn test_outside_nicer() {
        let mut c = conditions(30.0);
        c.outside = Some(26.0);
        assert!(c.outside_nicer());
        c.outside = Some(33.0);
        assert!(!c.outside_nicer());
        c.aircon = Some(AirconMode::Cool);
        c.outside = Some(29.0);
        assert!(c.outside_nicer());
        c.aircon = Some(AirconMode::Heat);
        assert!(!c.outside_nicer());
    }

    #[test]
    fn test_zone_routing_by_scene() {
        let bedroom = EntityId::new("climate.bedroom");
        let lounge = EntityId::new("climate.lounge");
        let mut c = conditions(29.0);
        assert_eq!(c.zone_speed(&lounge), Some(ZoneFanSpeed::Auto));
        c.scene = Scene::Night;
        assert_eq!(c.zone_speed(&bedroom), Some(ZoneFanSpeed::Low));
        assert_eq!(c.zone_speed(&lounge), None);
        c.scene = Scene::Morning;
        assert_eq!(c.zone_speed(&bedroom), Some(ZoneFanSpeed::Low));
        assert_eq!(c.zone_speed(&lounge), Some(ZoneFanSpeed::Auto));
        c.scene = Scene::Day;
        c.pets_home_alone = true;
        c.door_open = true;
        assert_eq!(c.zone_speed(&lounge), None);
        assert_eq!(c.zone_speed(&bedroom), Some(ZoneFanSpeed::Auto));
    }

    #[test]
    fn test_fan_speed_law() {
        assert_eq!(conditions(22.0).fan_speed_step(), 0);
        assert_eq!(conditions(24.2).fan_speed_step(), 1);
        assert_eq!(conditions(26.5).fan_speed_step(), 3);
        assert_eq!(conditions(40.0).fan_speed_step(), 6);

        let mut cold = conditions(17.0);
        assert_eq!(cold.fan_speed_step(), 0);
        cold.aircon = Some(AirconMode::Heat);
        assert_eq!(cold.fan_speed_step(), 1);
        cold.scene = Scene::Morning;
        assert_eq!(cold.fan_speed_step(), 0);
    }

    #[test]
    fn test_fan_percentage() {
        let c = conditions(22.0);
        assert_eq!(c.fan_percentage(0), 0);
        assert_eq!(c.fan_percentage(3), 50);
        assert_eq!(c.fan_percentage(6), 100);
        assert_eq!(c.fan_percentage(9), 100);
    }
}
