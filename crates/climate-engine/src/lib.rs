//! Climate engine for a presence-aware home
//!
//! Fuses room presence sensors, gates aircon zones, fans and heaters on
//! occupancy, and decides when the aircon should run or the household should
//! be nudged instead.

pub mod aircon;
pub mod conditions;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod fan;
pub mod heater;
pub mod persistence;
pub mod presence;
pub mod scene;
pub mod scheduler;

#[cfg(test)]
mod test_support;

pub use conditions::{AirconMode, Conditions, ZoneFanSpeed};
pub use config::{ClimateConfig, TemperatureSetting, TemperatureSettings};
pub use engine::{ClimateControlState, ClimateEngine, ClimateEvent, ClimateStatus};
pub use error::ClimateError;
pub use presence::{PresenceTracker, SubscriptionHandle};
pub use scene::Scene;
pub use scheduler::{Clock, ManualClock, Scheduler, SystemClock, Task, TimerQueue};
