//! Cooperative loop that owns the climate engine
//!
//! Platform events, control commands, due timers and the periodic
//! re-evaluation are all handled on one task, so engine callbacks never
//! interleave.

use chrono::Duration;
use climate_engine::persistence::save_config;
use climate_engine::{
    ClimateConfig, ClimateEngine, ClimateError, ClimateEvent, ClimateStatus, Clock, Scene,
    TemperatureSetting,
};
use home_platform::{PlatformEvent, PlatformHub};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc, oneshot};

/// How long to sleep when no timer is pending
const IDLE_WAIT: std::time::Duration = std::time::Duration::from_secs(60);

/// Room presence as seen by the control surface
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatus {
    pub room: String,
    pub vacant: bool,
    pub seconds: f64,
}

/// Outcome of a temperature setting change
#[derive(Debug, Clone, Serialize)]
pub struct SettingUpdate {
    pub warnings: Vec<String>,
    pub temperatures: climate_engine::TemperatureSettings,
}

/// Requests handled by the runtime task
pub enum Command {
    Status(oneshot::Sender<ClimateStatus>),
    Config(oneshot::Sender<ClimateConfig>),
    SetClimateControl {
        enabled: bool,
        reply: oneshot::Sender<ClimateStatus>,
    },
    SetAircon {
        on: bool,
        reply: oneshot::Sender<ClimateStatus>,
    },
    Scene {
        scene: Scene,
        previous: Option<Scene>,
        reply: oneshot::Sender<ClimateStatus>,
    },
    Reset(oneshot::Sender<ClimateStatus>),
    Room {
        room: String,
        delay_secs: i64,
        reply: oneshot::Sender<Result<RoomStatus, ClimateError>>,
    },
    UpdateTemperature {
        setting: TemperatureSetting,
        value: f64,
        reply: oneshot::Sender<Result<SettingUpdate, ClimateError>>,
    },
    Subscribe(oneshot::Sender<broadcast::Receiver<ClimateEvent>>),
}

/// Cloneable handle for talking to the runtime task
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> anyhow::Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| anyhow::anyhow!("climate engine is not running"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("climate engine dropped the request"))
    }

    pub async fn status(&self) -> anyhow::Result<ClimateStatus> {
        self.request(Command::Status).await
    }

    pub async fn config(&self) -> anyhow::Result<ClimateConfig> {
        self.request(Command::Config).await
    }

    pub async fn set_climate_control(&self, enabled: bool) -> anyhow::Result<ClimateStatus> {
        self.request(|reply| Command::SetClimateControl { enabled, reply })
            .await
    }

    pub async fn set_aircon(&self, on: bool) -> anyhow::Result<ClimateStatus> {
        self.request(|reply| Command::SetAircon { on, reply }).await
    }

    pub async fn transition_scene(
        &self,
        scene: Scene,
        previous: Option<Scene>,
    ) -> anyhow::Result<ClimateStatus> {
        self.request(|reply| Command::Scene {
            scene,
            previous,
            reply,
        })
        .await
    }

    pub async fn reset(&self) -> anyhow::Result<ClimateStatus> {
        self.request(Command::Reset).await
    }

    pub async fn room(
        &self,
        room: String,
        delay_secs: i64,
    ) -> anyhow::Result<Result<RoomStatus, ClimateError>> {
        self.request(|reply| Command::Room {
            room,
            delay_secs,
            reply,
        })
        .await
    }

    pub async fn update_temperature(
        &self,
        setting: TemperatureSetting,
        value: f64,
    ) -> anyhow::Result<Result<SettingUpdate, ClimateError>> {
        self.request(|reply| Command::UpdateTemperature {
            setting,
            value,
            reply,
        })
        .await
    }

    pub async fn subscribe(&self) -> anyhow::Result<broadcast::Receiver<ClimateEvent>> {
        self.request(Command::Subscribe).await
    }
}

/// The runtime task's state
pub struct Runtime<C> {
    engine: ClimateEngine<PlatformHub, C>,
    config_path: PathBuf,
    evaluate_every: std::time::Duration,
}

impl<C: Clock + Send + 'static> Runtime<C> {
    pub fn new(
        engine: ClimateEngine<PlatformHub, C>,
        config_path: PathBuf,
        evaluate_every: std::time::Duration,
    ) -> Self {
        Self {
            engine,
            config_path,
            evaluate_every,
        }
    }

    /// Spawn the loop; it stops once every handle is dropped or the hub closes
    pub fn spawn(
        self,
        events: broadcast::Receiver<PlatformEvent>,
    ) -> (EngineHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(32);
        let task = tokio::spawn(self.run(events, rx));
        (EngineHandle { tx }, task)
    }

    async fn run(
        mut self,
        mut events: broadcast::Receiver<PlatformEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        let mut evaluate = tokio::time::interval(self.evaluate_every);
        // the first tick completes immediately
        evaluate.tick().await;
        tracing::info!("Climate runtime started");

        loop {
            let wait = self.engine.time_until_next().unwrap_or(IDLE_WAIT);
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => self.engine.handle_state_change(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("Missed {} platform events, resetting", missed);
                        self.engine.reset();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                () = tokio::time::sleep(wait) => {}
                _ = evaluate.tick() => {
                    tracing::debug!("Periodic temperature evaluation");
                    self.engine.handle_temperatures();
                }
            }

            let ran = self.engine.run_due_tasks();
            if ran > 0 {
                tracing::trace!("Ran {} scheduled tasks", ran);
            }
        }
        tracing::info!("Climate runtime stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        // a dropped receiver just means the caller went away
        match command {
            Command::Status(reply) => {
                let _ = reply.send(self.engine.status());
            }
            Command::Config(reply) => {
                let _ = reply.send(self.engine.config().clone());
            }
            Command::SetClimateControl { enabled, reply } => {
                self.engine.set_climate_control(enabled);
                let _ = reply.send(self.engine.status());
            }
            Command::SetAircon { on, reply } => {
                self.engine.set_aircon(on);
                let _ = reply.send(self.engine.status());
            }
            Command::Scene {
                scene,
                previous,
                reply,
            } => {
                let previous = previous.unwrap_or_else(|| self.engine.scene());
                self.engine.transition_between_scenes(scene, previous);
                let _ = reply.send(self.engine.status());
            }
            Command::Reset(reply) => {
                self.engine.reset();
                let _ = reply.send(self.engine.status());
            }
            Command::Room {
                room,
                delay_secs,
                reply,
            } => {
                let delay = Duration::seconds(delay_secs);
                let result = self.engine.is_vacant(&room, delay).and_then(|vacant| {
                    let seconds = self.engine.seconds_occupied_or_vacant(&room, delay)?;
                    Ok(RoomStatus {
                        room: room.clone(),
                        vacant,
                        seconds,
                    })
                });
                let _ = reply.send(result);
            }
            Command::UpdateTemperature {
                setting,
                value,
                reply,
            } => {
                let result = self.update_temperature(setting, value).await;
                let _ = reply.send(result);
            }
            Command::Subscribe(reply) => {
                let _ = reply.send(self.engine.subscribe());
            }
        }
    }

    async fn update_temperature(
        &mut self,
        setting: TemperatureSetting,
        value: f64,
    ) -> Result<SettingUpdate, ClimateError> {
        let warnings = self.engine.update_temperature_setting(setting, value)?;
        save_config(&self.config_path, self.engine.config()).await?;
        Ok(SettingUpdate {
            warnings,
            temperatures: self.engine.config().temperatures.clone(),
        })
    }
}
