//! Entity and state representation

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// States reported by the platform when a sensor cannot be read
const UNAVAILABLE_STATES: [&str; 3] = ["unavailable", "unknown", ""];

/// Identifier of a platform entity (e.g., "binary_sensor.lounge_motion")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an entity id from a `domain.object_id` string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The domain part (before the first dot)
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(d, _)| d)
    }

    /// The full id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Snapshot of an entity's state as reported by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Entity this state belongs to
    pub entity_id: EntityId,
    /// Raw state string ("on", "off", "23.5", "cool", ...)
    pub state: String,
    /// Free-form attributes
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    /// When the state string last changed (local wall time)
    pub last_changed: NaiveDateTime,
}

impl EntityState {
    /// Create a state with no attributes
    pub fn new(
        entity_id: impl Into<EntityId>,
        state: impl Into<String>,
        last_changed: NaiveDateTime,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: serde_json::Map::new(),
            last_changed,
        }
    }

    /// Builder-style attribute setter
    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// True when the platform could not read the underlying device
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        UNAVAILABLE_STATES.contains(&self.state.as_str())
    }

    /// True for "on"
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.state == "on"
    }

    /// Binary sensor reading: `Some(true)` for on, `Some(false)` for off,
    /// `None` for anything else
    #[must_use]
    pub fn as_binary(&self) -> Option<bool> {
        match self.state.as_str() {
            "on" => Some(true),
            "off" => Some(false),
            _ => None,
        }
    }

    /// Numeric reading, if the state parses as a finite float
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        if self.is_unavailable() {
            return None;
        }
        self.state.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Look up an attribute value
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_entity_domain() {
        assert_eq!(EntityId::new("binary_sensor.lounge").domain(), "binary_sensor");
        assert_eq!(EntityId::new("nodot").domain(), "nodot");
    }

    #[test]
    fn test_numeric_state() {
        assert_eq!(EntityState::new("sensor.t", "23.5", at()).as_f64(), Some(23.5));
        assert_eq!(EntityState::new("sensor.t", "unavailable", at()).as_f64(), None);
        assert_eq!(EntityState::new("sensor.t", "nan", at()).as_f64(), None);
    }

    #[test]
    fn test_binary_state() {
        assert_eq!(EntityState::new("binary_sensor.m", "on", at()).as_binary(), Some(true));
        assert_eq!(EntityState::new("binary_sensor.m", "off", at()).as_binary(), Some(false));
        assert_eq!(EntityState::new("binary_sensor.m", "unknown", at()).as_binary(), None);
        assert!(EntityState::new("binary_sensor.m", "unknown", at()).is_unavailable());
    }
}
