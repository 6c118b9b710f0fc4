//! House scenes

use crate::error::ClimateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scene selected by the scene orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scene {
    #[default]
    Day,
    Evening,
    Night,
    Sleep,
    Morning,
    Away,
    Holiday,
}

impl Scene {
    /// Nobody home: automatic control is suspended
    #[must_use]
    pub fn is_away(self) -> bool {
        matches!(self, Self::Away | Self::Holiday)
    }

    /// Rest period: sleep thresholds, single aircon zone
    #[must_use]
    pub fn is_rest(self) -> bool {
        matches!(self, Self::Night | Self::Sleep)
    }

    /// Transitional scene between rest and day
    #[must_use]
    pub fn is_morning(self) -> bool {
        matches!(self, Self::Morning)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Evening => "evening",
            Self::Night => "night",
            Self::Sleep => "sleep",
            Self::Morning => "morning",
            Self::Away => "away",
            Self::Holiday => "holiday",
        }
    }
}

impl fmt::Display for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scene {
    type Err = ClimateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "evening" => Ok(Self::Evening),
            "night" => Ok(Self::Night),
            "sleep" => Ok(Self::Sleep),
            "morning" => Ok(Self::Morning),
            "away" => Ok(Self::Away),
            "holiday" => Ok(Self::Holiday),
            _ => Err(ClimateError::InvalidScene(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scene() {
        assert_eq!("Night".parse::<Scene>().unwrap(), Scene::Night);
        assert_eq!(" away ".parse::<Scene>().unwrap(), Scene::Away);
        assert!("party".parse::<Scene>().is_err());
    }

    #[test]
    fn test_scene_classes() {
        assert!(Scene::Holiday.is_away());
        assert!(Scene::Sleep.is_rest());
        assert!(!Scene::Morning.is_rest());
        assert!(Scene::Morning.is_morning());
    }
}
