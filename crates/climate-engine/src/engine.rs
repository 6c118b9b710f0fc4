//! Climate decision engine
//!
//! Owns the presence tracker, the timer queue and every aircon zone, fan and
//! heater. All entry points take `&mut self` and run to completion, so the
//! owner drives the engine from a single cooperative loop.

use crate::aircon::AirconZone;
use crate::conditions::{AirconMode, Conditions};
use crate::config::{ClimateConfig, TemperatureSetting};
use crate::device::{ClimateDevice, DeviceContext};
use crate::error::ClimateError;
use crate::fan::Fan;
use crate::heater::Heater;
use crate::presence::{PresenceCallback, PresenceTracker, SubscriptionHandle};
use crate::scene::Scene;
use crate::scheduler::{Clock, Scheduler, Task, TimerQueue};
use chrono::{Duration, NaiveDateTime};
use home_platform::{EntityId, EntityState, HomePlatform, Notification, PlatformEvent};
use serde::Serialize;
use tokio::sync::broadcast;

/// Events emitted by the climate engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClimateEvent {
    /// The aircon was switched on (with a mode) or off
    AirconChanged { mode: Option<AirconMode> },
    /// Automatic climate control was enabled or disabled
    ClimateControlChanged { enabled: bool, overridden: bool },
    /// The house moved to a new scene
    SceneChanged { scene: Scene, previous: Scene },
    /// A suggestion was sent to the household
    Suggestion { message: String },
    /// A room committed an entered/vacated transition
    RoomPresence { room: String, occupied: bool },
    /// A presence subscription that is not a device fired
    PresenceCallback { room: String, subscriber: EntityId },
    /// Someone was detected while the house is empty
    SecurityAlert { room: String },
}

/// Process-wide automatic control state
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClimateControlState {
    /// Automatic mode
    pub climate_control: bool,
    /// Automatic mode was switched off because it would immediately re-trigger
    pub overridden: bool,
    /// A suggestion is outstanding; no further suggestions until cleared
    pub suggested: bool,
    /// Automatic mode before entering an away scene
    pub before_away: Option<bool>,
    /// When automatic mode last changed
    pub changed_at: Option<NaiveDateTime>,
}

/// Snapshot for the control surface
#[derive(Debug, Clone, Serialize)]
pub struct ClimateStatus {
    pub climate_control: bool,
    pub aircon: bool,
    pub aircon_mode: Option<AirconMode>,
    pub scene: Scene,
    pub overridden: bool,
    pub suggested: bool,
    pub pets_home_alone: bool,
    pub door_open: bool,
    pub inside_temperature: Option<f64>,
    pub outside_temperature: Option<f64>,
    pub pending_timers: usize,
}

#[derive(Debug, Default)]
struct Devices {
    zones: Vec<AirconZone>,
    fans: Vec<Fan>,
    heaters: Vec<Heater>,
}

impl Devices {
    fn find(&mut self, entity: &EntityId) -> Option<&mut dyn ClimateDevice> {
        if let Some(zone) = self.zones.iter_mut().find(|z| z.entity() == entity) {
            return Some(zone as &mut dyn ClimateDevice);
        }
        if let Some(fan) = self.fans.iter_mut().find(|f| f.entity() == entity) {
            return Some(fan as &mut dyn ClimateDevice);
        }
        self.heaters
            .iter_mut()
            .find(|h| h.entity() == entity)
            .map(|h| h as &mut dyn ClimateDevice)
    }
}

/// The climate decision engine
pub struct ClimateEngine<P, C> {
    config: ClimateConfig,
    platform: P,
    timers: TimerQueue<C>,
    presence: PresenceTracker,
    devices: Devices,
    state: ClimateControlState,
    scene: Scene,
    /// Aircon mode, `None` while off
    aircon: Option<AirconMode>,
    event_tx: broadcast::Sender<ClimateEvent>,
}

impl<P: HomePlatform, C: Clock> ClimateEngine<P, C> {
    /// Build the engine from configuration and the platform's current state
    pub fn new(config: ClimateConfig, platform: P, clock: C) -> Result<Self, ClimateError> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(64);
        let now = clock.now();

        let mut presence = PresenceTracker::new();
        for room in &config.rooms {
            presence.add_room(room, &platform, now, &config.notify_targets);
        }

        let devices = Devices {
            zones: config.aircon.zones.iter().map(AirconZone::new).collect(),
            fans: config.fans.iter().map(Fan::new).collect(),
            heaters: config.heaters.iter().map(Heater::new).collect(),
        };

        let scene = platform
            .state(&config.entities.scene)
            .and_then(|s| s.state.parse::<Scene>().ok())
            .unwrap_or_default();
        let climate_control = platform
            .state(&config.entities.climate_control)
            .is_some_and(|s| s.is_on());
        let aircon = devices.zones.iter().find_map(|zone| {
            platform
                .state(zone.entity())
                .and_then(|s| AirconMode::from_state(&s.state))
        });

        tracing::info!(
            "Climate engine: {} rooms, {} zones, {} fans, {} heaters (scene {}, climate control {})",
            config.rooms.len(),
            devices.zones.len(),
            devices.fans.len(),
            devices.heaters.len(),
            scene,
            if climate_control { "on" } else { "off" }
        );

        let mut engine = Self {
            config,
            platform,
            timers: TimerQueue::new(clock),
            presence,
            devices,
            state: ClimateControlState {
                climate_control,
                changed_at: Some(now),
                ..ClimateControlState::default()
            },
            scene,
            aircon,
            event_tx,
        };
        engine.monitor_all();
        Ok(engine)
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<ClimateEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: ClimateEvent) {
        // nobody listening is fine
        let _ = self.event_tx.send(event);
    }

    #[must_use]
    pub fn config(&self) -> &ClimateConfig {
        &self.config
    }

    #[must_use]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    #[must_use]
    pub fn scene(&self) -> Scene {
        self.scene
    }

    #[must_use]
    pub fn control_state(&self) -> &ClimateControlState {
        &self.state
    }

    #[must_use]
    pub fn status(&self) -> ClimateStatus {
        let conditions = self.conditions();
        ClimateStatus {
            climate_control: self.state.climate_control,
            aircon: self.aircon.is_some(),
            aircon_mode: self.aircon,
            scene: self.scene,
            overridden: self.state.overridden,
            suggested: self.state.suggested,
            pets_home_alone: conditions.pets_home_alone,
            door_open: conditions.door_open,
            inside_temperature: conditions.inside,
            outside_temperature: conditions.outside,
            pending_timers: self.timers.active_count(),
        }
    }

    /// When the next scheduled task is due
    #[must_use]
    pub fn next_due(&self) -> Option<NaiveDateTime> {
        self.timers.next_due()
    }

    /// How long until the next scheduled task is due
    #[must_use]
    pub fn time_until_next(&self) -> Option<std::time::Duration> {
        self.timers.time_until_next()
    }

    fn pets_home_alone(&self) -> bool {
        self.platform
            .state(&self.config.entities.pets_home_alone)
            .is_some_and(|s| s.is_on())
    }

    fn door_open(&self) -> bool {
        self.platform
            .state(&self.config.entities.door)
            .is_some_and(|s| s.is_on())
    }

    fn rest_zone(&self) -> Option<EntityId> {
        self.config
            .aircon
            .rest_zone
            .clone()
            .or_else(|| self.config.aircon.zones.first().map(|z| z.entity.clone()))
    }

    /// Current decision inputs
    #[must_use]
    pub fn conditions(&self) -> Conditions {
        let entities = &self.config.entities;
        Conditions {
            now: self.timers.now(),
            scene: self.scene,
            inside: self.platform.state_f64(&entities.inside_temperature),
            outside: self.platform.state_f64(&entities.outside_temperature),
            targets: self.config.temperatures.targets(self.scene.is_rest()),
            heater_buffer: self.config.temperatures.heater_buffer,
            aircon: self.aircon,
            climate_control: self.state.climate_control,
            pets_home_alone: self.pets_home_alone(),
            door_open: self.door_open(),
            fan_speed_steps: self.config.fan_speed_steps,
            rest_zone: self.rest_zone(),
        }
    }

    /// Devices plus a context borrowing the rest of the engine
    fn parts<'a>(&'a mut self, conditions: &'a Conditions) -> (&'a mut Devices, DeviceContext<'a>) {
        (
            &mut self.devices,
            DeviceContext {
                platform: &self.platform,
                scheduler: &mut self.timers,
                presence: &mut self.presence,
                conditions,
            },
        )
    }

    /// (Re)subscribe every device to its rooms
    fn monitor_all(&mut self) {
        for zone in &mut self.devices.zones {
            zone.gate_mut()
                .monitor_presence(&mut self.presence, &mut self.timers);
        }
        for heater in &mut self.devices.heaters {
            heater
                .gate_mut()
                .monitor_presence(&mut self.presence, &mut self.timers);
        }
        for fan in &mut self.devices.fans {
            fan.gate_mut()
                .monitor_presence(&mut self.presence, &mut self.timers);
        }
        self.update_fan_vacancy_mode();
    }

    /// Fans ignore vacancy while the aircon runs, during rest scenes and
    /// while pets are home alone
    fn update_fan_vacancy_mode(&mut self) {
        let ignore = self.aircon.is_some() || self.scene.is_rest() || self.pets_home_alone();
        for fan in &mut self.devices.fans {
            fan.gate_mut()
                .ignore_vacancy(ignore, &mut self.presence, &mut self.timers);
        }
    }

    fn adjust_zones(&mut self) {
        let conditions = self.conditions();
        let (devices, mut ctx) = self.parts(&conditions);
        for zone in &mut devices.zones {
            zone.adjust(&mut ctx);
        }
    }

    fn adjust_fans(&mut self) {
        let conditions = self.conditions();
        let (devices, mut ctx) = self.parts(&conditions);
        for fan in &mut devices.fans {
            fan.adjust(&mut ctx);
        }
    }

    fn adjust_all(&mut self) {
        let conditions = self.conditions();
        let (devices, mut ctx) = self.parts(&conditions);
        for zone in &mut devices.zones {
            zone.adjust(&mut ctx);
        }
        for fan in &mut devices.fans {
            fan.adjust(&mut ctx);
        }
        for heater in &mut devices.heaters {
            heater.adjust(&mut ctx);
        }
    }

    // Platform events

    /// Feed a platform state change into the engine
    pub fn handle_state_change(&mut self, event: &PlatformEvent) {
        let PlatformEvent::StateChanged { entity_id, old, new } = event;

        if self.presence.is_presence_sensor(entity_id) {
            // attribute-only updates are not sensor transitions
            if old.as_ref().map_or(true, |o| o.state != new.state) {
                self.handle_presence_event(entity_id, new);
            } else {
                tracing::trace!("Ignoring attribute update from {}", entity_id);
            }
        }

        let entities = &self.config.entities;
        if *entity_id == entities.inside_temperature
            || *entity_id == entities.outside_temperature
            || self
                .devices
                .heaters
                .iter()
                .any(|h| h.temperature_sensor() == Some(entity_id))
        {
            self.handle_temperatures();
        } else if *entity_id == entities.scene {
            match new.state.parse::<Scene>() {
                Ok(scene) if scene != self.scene => {
                    let previous = self.scene;
                    self.transition_between_scenes(scene, previous);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Ignoring scene selector value: {}", e),
            }
        } else if *entity_id == entities.climate_control {
            if let Some(enabled) = new.as_binary() {
                if enabled != self.state.climate_control {
                    tracing::info!(
                        "Climate control switched {} on the platform",
                        if enabled { "on" } else { "off" }
                    );
                    self.set_climate_control(enabled);
                }
            }
        } else if *entity_id == entities.pets_home_alone {
            tracing::info!("Pets home alone: {}", new.state);
            self.update_fan_vacancy_mode();
            self.handle_temperatures();
        } else if *entity_id == entities.door {
            tracing::debug!("Door {}", if new.is_on() { "opened" } else { "closed" });
            self.handle_temperatures();
        }
    }

    fn handle_presence_event(&mut self, sensor: &EntityId, state: &EntityState) {
        let outcome =
            self.presence
                .handle_sensor_event(sensor, state, &self.platform, &mut self.timers);

        for transition in &outcome.transitions {
            self.emit(ClimateEvent::RoomPresence {
                room: transition.room.clone(),
                occupied: transition.occupied,
            });
            if transition.person_detected && self.scene.is_away() {
                self.security_alert(&transition.room);
            }
        }
        self.dispatch(outcome.callbacks);
    }

    fn security_alert(&self, room: &str) {
        tracing::warn!("Person detected in {} during {} scene", room, self.scene);
        if !self.config.security_targets.is_empty() {
            self.platform.notify(Notification::new(
                format!("Person detected in the {} while the house is empty", room),
                Some("Security"),
                &self.config.security_targets,
            ));
        }
        self.emit(ClimateEvent::SecurityAlert {
            room: room.to_string(),
        });
    }

    /// Deliver presence callbacks to their subscribers
    fn dispatch(&mut self, callbacks: Vec<PresenceCallback>) {
        if callbacks.is_empty() {
            return;
        }
        let conditions = self.conditions();
        let mut external = Vec::new();
        {
            let (devices, mut ctx) = self.parts(&conditions);
            for callback in callbacks {
                match devices.find(&callback.subscriber) {
                    Some(device) => device.on_presence_change(&mut ctx),
                    None => external.push(callback),
                }
            }
        }
        for callback in external {
            self.emit(ClimateEvent::PresenceCallback {
                room: callback.room,
                subscriber: callback.subscriber,
            });
        }
    }

    /// Run every scheduled task that is due; returns how many ran
    pub fn run_due_tasks(&mut self) -> usize {
        let mut ran = 0;
        while let Some((timer, task)) = self.timers.pop_due() {
            ran += 1;
            match task {
                Task::PresenceTimeout(handle) => {
                    if let Some(callback) = self.presence.fire_timeout(&handle, timer) {
                        self.dispatch(vec![callback]);
                    }
                }
                Task::TransitionStep {
                    device,
                    generation,
                    steps_remaining,
                    step_time,
                    settings,
                } => {
                    let conditions = self.conditions();
                    let (devices, mut ctx) = self.parts(&conditions);
                    if let Some(target) = devices.find(&device) {
                        target.transition_step(
                            generation,
                            steps_remaining,
                            step_time,
                            settings,
                            &mut ctx,
                        );
                    }
                }
                Task::Readjust(device) => {
                    let conditions = self.conditions();
                    let (devices, mut ctx) = self.parts(&conditions);
                    if let Some(target) = devices.find(&device) {
                        target.readjust(timer, &mut ctx);
                    }
                }
            }
        }
        ran
    }

    // Climate control and aircon

    #[must_use]
    pub fn climate_control(&self) -> bool {
        self.state.climate_control
    }

    /// Enable or disable automatic mode
    pub fn set_climate_control(&mut self, enabled: bool) {
        self.state.suggested = false;
        if enabled {
            self.state.overridden = false;
        }
        self.mirror_climate_control(enabled);
        if enabled == self.state.climate_control {
            return;
        }

        self.state.climate_control = enabled;
        self.state.changed_at = Some(self.timers.now());
        tracing::info!("Climate control {}", if enabled { "enabled" } else { "disabled" });
        self.emit(ClimateEvent::ClimateControlChanged {
            enabled,
            overridden: self.state.overridden,
        });

        if enabled {
            self.handle_temperatures();
        } else if self.pets_home_alone() {
            tracing::info!("Pets home alone relies on climate control, disabling it");
            self.platform.turn_off(&self.config.entities.pets_home_alone);
        }
    }

    fn mirror_climate_control(&self, enabled: bool) {
        let entity = &self.config.entities.climate_control;
        let current = self.platform.state(entity).and_then(|s| s.as_binary());
        if current != Some(enabled) {
            if enabled {
                self.platform.turn_on(entity);
            } else {
                self.platform.turn_off(entity);
            }
        }
    }

    #[must_use]
    pub fn aircon(&self) -> bool {
        self.aircon.is_some()
    }

    #[must_use]
    pub fn aircon_mode(&self) -> Option<AirconMode> {
        self.aircon
    }

    /// Switch the aircon on or off at the household's request.
    ///
    /// Switching it off while automatic mode would immediately switch it
    /// back on disables automatic mode and marks it overridden; the next
    /// manual switch restores automatic mode.
    pub fn set_aircon(&mut self, on: bool) {
        let overriding =
            !on && self.state.climate_control && self.conditions().too_hot_or_cold();
        self.switch_aircon(on);

        if overriding {
            tracing::info!("Aircon switched off by hand, overriding climate control");
            self.state.overridden = true;
            self.set_climate_control(false);
        } else if self.state.overridden {
            tracing::info!("Aircon switched by hand, restoring climate control");
            self.set_climate_control(true);
        }
    }

    /// Turn the aircon on (choosing a mode) or off and re-route the zones.
    ///
    /// Any real transition ends an override of automatic mode.
    fn switch_aircon(&mut self, on: bool) {
        let mode = if on {
            self.aircon
                .or_else(|| Some(self.conditions().choose_aircon_mode()))
        } else {
            None
        };
        let toggled = mode.is_some() != self.aircon.is_some();
        if mode != self.aircon {
            tracing::info!(
                "Aircon {}",
                mode.map_or("off", AirconMode::as_str)
            );
            self.aircon = mode;
            self.state.suggested = false;
            self.emit(ClimateEvent::AirconChanged { mode });
        }
        self.update_fan_vacancy_mode();
        self.adjust_zones();
        if self.state.climate_control {
            self.adjust_fans();
        }

        if toggled && self.state.overridden {
            tracing::info!("Aircon switched, restoring overridden climate control");
            self.set_climate_control(true);
        }
    }

    // Temperature decisions

    /// React to changed temperatures
    pub fn handle_temperatures(&mut self) {
        self.check_override_expired();
        if self.state.climate_control {
            self.adjust_all();
        }

        let conditions = self.conditions();
        match conditions.aircon {
            None if conditions.too_hot_or_cold() => self.handle_too_hot_or_cold(&conditions),
            Some(_) if conditions.within_target() => {
                if conditions.climate_control {
                    tracing::info!("Inside temperature back within targets");
                    self.switch_aircon(false);
                } else {
                    self.suggest(&format!(
                        "It's {} inside now, the aircon can be turned off",
                        degrees(conditions.inside)
                    ));
                }
            }
            _ => {}
        }
    }

    fn handle_too_hot_or_cold(&mut self, conditions: &Conditions) {
        let inside = degrees(conditions.inside);

        if conditions.pets_home_alone {
            self.switch_aircon(true);
            self.notify(&format!(
                "It's {} inside with the pets home alone, the aircon has been turned on",
                inside
            ));
            return;
        }

        if conditions.outside_nicer() {
            let outside = degrees(conditions.outside);
            if conditions.climate_control {
                if !conditions.door_open {
                    self.switch_aircon(true);
                    self.suggest(&format!(
                        "It's {} outside and {} inside, consider opening up the house",
                        outside, inside
                    ));
                }
            } else if !self.presence.anyone_present() {
                self.suggest(&format!(
                    "It's {} inside, enable climate control?",
                    inside
                ));
            } else if !conditions.door_open {
                self.suggest(&format!(
                    "It's {} outside and {} inside, consider opening up the house",
                    outside, inside
                ));
            }
            return;
        }

        if conditions.climate_control {
            if conditions.door_open {
                self.suggest(&format!(
                    "It's {} inside, close the door so the aircon can run",
                    inside
                ));
            } else {
                self.switch_aircon(true);
            }
        } else if conditions.door_open {
            self.suggest(&format!(
                "It's {} inside, close the door and enable climate control?",
                inside
            ));
        } else {
            self.suggest(&format!("It's {} inside, enable climate control?", inside));
        }
    }

    /// Send a suggestion unless one is already outstanding
    fn suggest(&mut self, message: &str) {
        if self.state.suggested {
            tracing::debug!("Suggestion already outstanding, skipping: {}", message);
            return;
        }
        self.state.suggested = true;
        tracing::info!("Suggesting: {}", message);
        self.notify(message);
        self.emit(ClimateEvent::Suggestion {
            message: message.to_string(),
        });
    }

    fn notify(&self, message: &str) {
        if self.config.notify_targets.is_empty() {
            return;
        }
        self.platform.notify(Notification::new(
            message,
            Some("Climate"),
            &self.config.notify_targets,
        ));
    }

    /// Clear a stale override once the climate control setting has been
    /// left alone long enough
    fn check_override_expired(&mut self) {
        if !self.state.overridden {
            return;
        }
        let changed = self
            .platform
            .state(&self.config.entities.climate_control)
            .map(|s| s.last_changed)
            .or(self.state.changed_at);
        let Some(changed) = changed else {
            return;
        };
        if self.timers.now() - changed > self.config.override_expiry() {
            tracing::info!("Climate control override expired");
            self.state.overridden = false;
        }
    }

    /// Suggest automatic mode when the forecast looks extreme
    pub fn check_extreme_forecast(&mut self) {
        if self.state.climate_control {
            return;
        }
        let forecast: Vec<f64> = self
            .config
            .forecast_offsets_hours
            .iter()
            .filter_map(|hours| {
                self.platform
                    .state_f64(&self.config.entities.forecast(*hours))
            })
            .collect();
        if forecast.is_empty() {
            tracing::debug!("No forecast available");
            return;
        }

        let targets = self.config.temperatures.targets(false);
        let max = forecast.iter().copied().fold(f64::MIN, f64::max);
        let min = forecast.iter().copied().fold(f64::MAX, f64::min);
        if max >= targets.high_trigger {
            self.suggest(&format!(
                "It's forecast to reach {} today, enable climate control?",
                degrees(Some(max))
            ));
        } else if min <= targets.low_trigger {
            self.suggest(&format!(
                "It's forecast to drop to {} today, enable climate control?",
                degrees(Some(min))
            ));
        }
    }

    // Scenes

    /// React to a scene change
    pub fn transition_between_scenes(&mut self, scene: Scene, previous: Scene) {
        tracing::info!("Scene {} -> {}", previous, scene);
        let outstanding = self.state.suggested && !self.state.climate_control;
        self.state.suggested = false;
        self.scene = scene;
        self.emit(ClimateEvent::SceneChanged { scene, previous });

        if scene.is_away() && !previous.is_away() {
            self.enter_away();
        } else if previous.is_away() && !scene.is_away() {
            self.leave_away();
        }

        self.update_fan_vacancy_mode();
        self.adjust_zones();
        if !outstanding {
            self.handle_temperatures();
        }

        let morning = previous.is_rest() && scene.is_morning();
        if morning || (previous.is_away() && !scene.is_away()) {
            self.check_extreme_forecast();
        }
    }

    fn enter_away(&mut self) {
        self.state.before_away = Some(self.state.climate_control);
        let conditions = self.conditions();

        if conditions.pets_home_alone {
            tracing::info!("Away with pets home alone, keeping climate control");
            let now = conditions.now;
            let (devices, mut ctx) = self.parts(&conditions);
            for fan in devices.fans.iter_mut().filter(|f| f.is_off_schedule(now)) {
                fan.turn_off(&mut ctx);
            }
            for heater in &mut devices.heaters {
                heater.turn_off(&mut ctx);
            }
            return;
        }

        self.set_climate_control(false);
        self.switch_aircon(false);
        let conditions = self.conditions();
        let (devices, mut ctx) = self.parts(&conditions);
        for fan in &mut devices.fans {
            fan.turn_off(&mut ctx);
        }
        for heater in &mut devices.heaters {
            heater.turn_off(&mut ctx);
        }
    }

    fn leave_away(&mut self) {
        if self.aircon.is_some() && self.door_open() {
            tracing::info!("Door open on return, turning the aircon off");
            self.switch_aircon(false);
        }
        if let Some(previous) = self.state.before_away.take() {
            self.set_climate_control(previous);
        }
    }

    /// Re-derive everything from the platform's current state
    pub fn reset(&mut self) {
        tracing::info!("Resetting climate engine");
        if let Some(scene) = self
            .platform
            .state(&self.config.entities.scene)
            .and_then(|s| s.state.parse::<Scene>().ok())
        {
            self.scene = scene;
        }
        if let Some(enabled) = self
            .platform
            .state(&self.config.entities.climate_control)
            .and_then(|s| s.as_binary())
        {
            self.state.climate_control = enabled;
        }
        self.state.suggested = false;

        self.monitor_all();
        self.adjust_zones();
        self.handle_temperatures();
    }

    /// Change a temperature setting, clamping companions as needed.
    ///
    /// Returns the warnings produced by clamping (also sent as notifications).
    pub fn update_temperature_setting(
        &mut self,
        setting: TemperatureSetting,
        value: f64,
    ) -> Result<Vec<String>, ClimateError> {
        let warnings = self.config.temperatures.apply(setting, value)?;
        for warning in &warnings {
            tracing::warn!("Temperature settings corrected: {}", warning);
            if !self.config.notify_targets.is_empty() {
                self.platform.notify(Notification::new(
                    warning.as_str(),
                    Some("Climate settings"),
                    &self.config.notify_targets,
                ));
            }
        }
        self.reset();
        Ok(warnings)
    }

    // Room presence queries

    /// See [`crate::presence::Room::is_vacant`]
    pub fn is_vacant(&self, room: &str, delay: Duration) -> Result<bool, ClimateError> {
        self.presence.is_vacant(room, delay, self.timers.now())
    }

    /// See [`crate::presence::Room::seconds_occupied_or_vacant`]
    pub fn seconds_occupied_or_vacant(
        &self,
        room: &str,
        delay: Duration,
    ) -> Result<f64, ClimateError> {
        self.presence
            .seconds_occupied_or_vacant(room, delay, self.timers.now())
    }

    /// Subscribe an external listener to a room; callbacks surface as
    /// [`ClimateEvent::PresenceCallback`]
    pub fn register_callback(
        &mut self,
        room: &str,
        subscriber: EntityId,
        delay: Duration,
    ) -> Result<SubscriptionHandle, ClimateError> {
        self.presence
            .register_callback(room, subscriber, delay, &mut self.timers)
    }

    pub fn cancel_callback(&mut self, handle: &SubscriptionHandle) {
        self.presence.cancel_callback(handle, &mut self.timers);
    }

    /// The room presence tracker
    #[must_use]
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }
}

fn degrees(value: Option<f64>) -> String {
    value.map_or_else(|| "unknown".to_string(), |v| format!("{:.1}°", v))
}
