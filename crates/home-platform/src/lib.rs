//! Home-automation platform abstraction layer
//!
//! This crate provides the entity/state model, service calls and
//! notifications, an in-process state hub, and a Home Assistant REST bridge.

pub mod entity;
pub mod hass;
pub mod platform;
pub mod service;

pub use entity::{EntityId, EntityState};
pub use hass::{HassClient, PlatformError};
pub use platform::{HomePlatform, PlatformEvent, PlatformHub};
pub use service::{Notification, Outbound, ServiceCall};
