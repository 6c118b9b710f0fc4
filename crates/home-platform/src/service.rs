//! Outbound commands: service calls and notifications

use crate::entity::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A platform service call (e.g., `climate.set_hvac_mode`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    /// Service payload; includes `entity_id` for entity-targeted calls
    pub data: Value,
}

impl ServiceCall {
    /// Build a call targeting a single entity, merging `data` into the payload
    #[must_use]
    pub fn for_entity(entity_id: &EntityId, service: &str, data: Value) -> Self {
        let mut payload = json!({ "entity_id": entity_id.as_str() });
        if let (Value::Object(target), Value::Object(extra)) = (&mut payload, data) {
            target.extend(extra);
        }
        Self {
            domain: entity_id.domain().to_string(),
            service: service.to_string(),
            data: payload,
        }
    }

    /// `<domain>.turn_on` for an entity
    #[must_use]
    pub fn turn_on(entity_id: &EntityId) -> Self {
        Self::for_entity(entity_id, "turn_on", json!({}))
    }

    /// `<domain>.turn_off` for an entity
    #[must_use]
    pub fn turn_off(entity_id: &EntityId) -> Self {
        Self::for_entity(entity_id, "turn_off", json!({}))
    }

    /// Entity id targeted by this call, if any
    #[must_use]
    pub fn entity_id(&self) -> Option<EntityId> {
        self.data
            .get("entity_id")
            .and_then(Value::as_str)
            .map(EntityId::new)
    }
}

/// A user-facing notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Notify service targets (e.g., "mobile_app_phone")
    #[serde(default)]
    pub targets: Vec<String>,
}

impl Notification {
    pub fn new(message: impl Into<String>, title: Option<&str>, targets: &[String]) -> Self {
        Self {
            message: message.into(),
            title: title.map(str::to_string),
            targets: targets.to_vec(),
        }
    }

    /// Expand into one `notify.<target>` call per target
    #[must_use]
    pub fn into_service_calls(self) -> Vec<ServiceCall> {
        self.targets
            .iter()
            .map(|target| {
                let mut data = json!({ "message": self.message });
                if let Some(title) = &self.title {
                    data["title"] = json!(title);
                }
                ServiceCall {
                    domain: "notify".to_string(),
                    service: target.clone(),
                    data,
                }
            })
            .collect()
    }
}

/// Anything queued for delivery to the platform
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Service(ServiceCall),
    Notify(Notification),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_call_merges_payload() {
        let call = ServiceCall::for_entity(
            &EntityId::new("climate.lounge"),
            "set_hvac_mode",
            json!({ "hvac_mode": "cool" }),
        );
        assert_eq!(call.domain, "climate");
        assert_eq!(call.service, "set_hvac_mode");
        assert_eq!(call.data["entity_id"], "climate.lounge");
        assert_eq!(call.data["hvac_mode"], "cool");
        assert_eq!(call.entity_id(), Some(EntityId::new("climate.lounge")));
    }

    #[test]
    fn test_notification_fans_out_per_target() {
        let targets = vec!["phone".to_string(), "tablet".to_string()];
        let calls = Notification::new("hello", Some("Climate"), &targets).into_service_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].domain, "notify");
        assert_eq!(calls[1].service, "tablet");
        assert_eq!(calls[0].data["title"], "Climate");
    }
}
