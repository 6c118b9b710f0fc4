//! Presence-gated devices
//!
//! [`PresenceGate`] holds the machinery every actuator shares: room
//! subscriptions, the combined vacancy signal, the anti-thrash window and
//! the multi-step transition toward occupied. Device kinds implement
//! [`ClimateDevice`] and only decide what "adjust" means for them.
//!
//! Transition steps are scheduled as [`Task::TransitionStep`] values tagged
//! with a generation number. Starting or cancelling a transition bumps the
//! device's generation, so steps from a superseded chain are dropped when
//! they come due instead of relying on timer cancellation.

use crate::conditions::Conditions;
use crate::config::PresenceSettings;
use crate::presence::{PresenceTracker, RoomId, SubscriptionHandle};
use crate::scheduler::{Scheduler, Task, TimerHandle};
use chrono::{Duration, NaiveDateTime};
use home_platform::{EntityId, EntityState, HomePlatform};

/// Device-specific parameters carried by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionSettings {
    /// Ramp a fan one speed step at a time up to `target_step`
    FanRamp { target_step: u8 },
    /// Hold an aircon zone at low fan speed before settling on auto
    SoftStart,
}

/// A transition to run when a device's rooms become occupied
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub step_time: Duration,
    pub steps: u32,
    pub settings: TransitionSettings,
}

/// What happened to a transition step that came due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The chain was superseded; nothing to do
    Stale,
    /// An intermediate step; the next one is scheduled
    Continued,
    /// The last step; the device should settle on steady-state settings
    Finished,
}

/// Everything a device needs to make a decision
pub struct DeviceContext<'a> {
    pub platform: &'a dyn HomePlatform,
    pub scheduler: &'a mut dyn Scheduler,
    pub presence: &'a mut PresenceTracker,
    pub conditions: &'a Conditions,
}

impl DeviceContext<'_> {
    #[must_use]
    pub fn now(&self) -> NaiveDateTime {
        self.scheduler.now()
    }
}

/// The last setting commanded to an actuator and the platform state it was
/// commanded against.
///
/// Commands reach the platform asynchronously, so until the platform reports
/// something new for the entity the commanded setting is taken as in effect.
#[derive(Debug)]
pub struct LastCommand<T> {
    sent: Option<(T, Option<EntityState>)>,
}

impl<T> Default for LastCommand<T> {
    fn default() -> Self {
        Self { sent: None }
    }
}

impl<T: PartialEq> LastCommand<T> {
    /// `setting` was already commanded and the platform has not reported since
    #[must_use]
    pub fn in_flight(&self, setting: &T, current: Option<&EntityState>) -> bool {
        matches!(&self.sent, Some((sent, seen)) if sent == setting && seen.as_ref() == current)
    }

    pub fn record(&mut self, setting: T, current: Option<EntityState>) {
        self.sent = Some((setting, current));
    }
}

#[derive(Debug)]
struct ActiveTransition {
    generation: u64,
    settings: TransitionSettings,
}

/// Shared presence, anti-thrash and transition state of one actuator
#[derive(Debug)]
pub struct PresenceGate {
    entity: EntityId,
    /// Primary room first, then linked rooms
    rooms: Vec<RoomId>,
    vacating_delay: Duration,
    adjustment_delay: Duration,
    transition_period: Duration,
    subscriptions: Vec<SubscriptionHandle>,
    /// Vacancy seen at the last presence check
    was_vacant: bool,
    generation: u64,
    transition: Option<ActiveTransition>,
    last_adjustment: Option<NaiveDateTime>,
    readjust_pending: Option<TimerHandle>,
}

fn secs(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1000))
}

impl PresenceGate {
    pub fn new(entity: EntityId, rooms: Vec<RoomId>, settings: &PresenceSettings) -> Self {
        Self {
            entity,
            rooms,
            vacating_delay: secs(settings.vacating_delay_secs),
            adjustment_delay: secs(settings.adjustment_delay_secs),
            transition_period: secs(settings.transition_period_secs),
            subscriptions: Vec::new(),
            was_vacant: false,
            generation: 0,
            transition: None,
            last_adjustment: None,
            readjust_pending: None,
        }
    }

    #[must_use]
    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    #[must_use]
    pub fn rooms(&self) -> &[RoomId] {
        &self.rooms
    }

    #[must_use]
    pub fn vacating_delay(&self) -> Duration {
        self.vacating_delay
    }

    #[must_use]
    pub fn transition_period(&self) -> Duration {
        self.transition_period
    }

    /// Vacant only when every owned room is vacant; a device without rooms
    /// is never vacant
    #[must_use]
    pub fn is_vacant(&self, presence: &PresenceTracker, now: NaiveDateTime) -> bool {
        !self.rooms.is_empty()
            && self.rooms.iter().all(|room| {
                presence
                    .is_vacant(room, self.vacating_delay, now)
                    .unwrap_or(false)
            })
    }

    /// Vacancy as far as control decisions go: a device ignoring vacancy
    /// behaves as occupied
    #[must_use]
    pub fn vacant_for_control(&self, presence: &PresenceTracker, now: NaiveDateTime) -> bool {
        !self.is_ignoring_vacancy() && self.is_vacant(presence, now)
    }

    /// True when no room subscriptions are registered
    #[must_use]
    pub fn is_ignoring_vacancy(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// (Re)subscribe to every owned room
    pub fn monitor_presence(&mut self, presence: &mut PresenceTracker, scheduler: &mut dyn Scheduler) {
        self.unsubscribe(presence, scheduler);
        for room in &self.rooms {
            match presence.register_callback(
                room,
                self.entity.clone(),
                self.vacating_delay,
                scheduler,
            ) {
                Ok(handle) => self.subscriptions.push(handle),
                Err(e) => tracing::warn!("{} cannot watch room {}: {}", self.entity, room, e),
            }
        }
        self.was_vacant = self.is_vacant(presence, scheduler.now());
    }

    /// Stop (or resume) reacting to presence
    pub fn ignore_vacancy(
        &mut self,
        ignore: bool,
        presence: &mut PresenceTracker,
        scheduler: &mut dyn Scheduler,
    ) {
        if ignore {
            if !self.is_ignoring_vacancy() {
                tracing::debug!("{} ignoring vacancy", self.entity);
            }
            self.unsubscribe(presence, scheduler);
            self.cancel_transition();
        } else if self.is_ignoring_vacancy() && !self.rooms.is_empty() {
            tracing::debug!("{} monitoring presence", self.entity);
            self.monitor_presence(presence, scheduler);
        }
    }

    fn unsubscribe(&mut self, presence: &mut PresenceTracker, scheduler: &mut dyn Scheduler) {
        for handle in self.subscriptions.drain(..) {
            presence.cancel_callback(&handle, scheduler);
        }
    }

    /// Fraction of the transition period elapsed since the primary room was
    /// entered, in `[0, 1]`
    #[must_use]
    pub fn transition_progress(&self, presence: &PresenceTracker, now: NaiveDateTime) -> f64 {
        if self.transition_period <= Duration::zero() {
            return 1.0;
        }
        let Some(room) = self.rooms.first() else {
            return 1.0;
        };
        let occupied = presence
            .seconds_occupied_or_vacant(room, self.vacating_delay, now)
            .unwrap_or(0.0);
        if occupied <= 0.0 {
            return 1.0;
        }
        let period = self.transition_period.num_milliseconds() as f64 / 1000.0;
        (occupied / period).clamp(0.0, 1.0)
    }

    /// Settings of the transition in flight, if any
    #[must_use]
    pub fn transition(&self) -> Option<&TransitionSettings> {
        self.transition.as_ref().map(|t| &t.settings)
    }

    /// Current generation token
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a transition, superseding any chain in flight.
    ///
    /// Returns false (and does nothing) for a zero step time or step count.
    pub fn start_transition(&mut self, plan: TransitionPlan, scheduler: &mut dyn Scheduler) -> bool {
        if plan.step_time <= Duration::zero() || plan.steps == 0 {
            return false;
        }
        self.generation += 1;
        tracing::debug!(
            "{} starting transition {} ({} steps of {}s)",
            self.entity,
            self.generation,
            plan.steps,
            plan.step_time.num_seconds()
        );
        self.transition = Some(ActiveTransition {
            generation: self.generation,
            settings: plan.settings.clone(),
        });
        scheduler.run_in(
            plan.step_time,
            Task::TransitionStep {
                device: self.entity.clone(),
                generation: self.generation,
                steps_remaining: plan.steps,
                step_time: plan.step_time,
                settings: plan.settings,
            },
        );
        true
    }

    /// Abandon the transition in flight; its pending step becomes stale
    pub fn cancel_transition(&mut self) {
        if self.transition.take().is_some() {
            self.generation += 1;
            tracing::debug!("{} transition cancelled", self.entity);
        }
    }

    /// Handle a transition step that came due
    pub fn advance_transition(
        &mut self,
        generation: u64,
        steps_remaining: u32,
        step_time: Duration,
        settings: TransitionSettings,
        scheduler: &mut dyn Scheduler,
    ) -> StepOutcome {
        let current = self.transition.as_ref().map(|t| t.generation);
        if current != Some(generation) {
            tracing::debug!(
                "{} dropping stale transition step (generation {}, current {})",
                self.entity,
                generation,
                self.generation
            );
            return StepOutcome::Stale;
        }

        let remaining = steps_remaining.saturating_sub(1);
        if remaining == 0 {
            self.transition = None;
            return StepOutcome::Finished;
        }
        scheduler.run_in(
            step_time,
            Task::TransitionStep {
                device: self.entity.clone(),
                generation,
                steps_remaining: remaining,
                step_time,
                settings,
            },
        );
        StepOutcome::Continued
    }

    /// Note that the actuator was just changed
    pub fn record_adjustment(&mut self, now: NaiveDateTime) {
        self.last_adjustment = Some(now);
    }

    /// Time left in the anti-thrash window, if inside it
    #[must_use]
    pub fn adjustment_cooldown(&self, now: NaiveDateTime) -> Option<Duration> {
        let last = self.last_adjustment?;
        let remaining = last + self.adjustment_delay - now;
        (remaining > Duration::zero()).then_some(remaining)
    }

    #[must_use]
    pub fn readjust_pending(&self) -> bool {
        self.readjust_pending.is_some()
    }
}

/// An actuator driven by presence and climate conditions
pub trait ClimateDevice {
    fn gate(&self) -> &PresenceGate;

    fn gate_mut(&mut self) -> &mut PresenceGate;

    /// Bring the actuator in line with current conditions
    fn adjust(&mut self, ctx: &mut DeviceContext<'_>);

    /// Transition to run when the device's rooms become occupied
    fn occupied_transition(&self, _ctx: &DeviceContext<'_>) -> Option<TransitionPlan> {
        None
    }

    /// Presence callback from any owned room
    fn on_presence_change(&mut self, ctx: &mut DeviceContext<'_>) {
        let now = ctx.now();
        let vacant = self.gate().is_vacant(ctx.presence, now);
        if vacant == self.gate().was_vacant {
            tracing::trace!("{} presence unchanged", self.gate().entity());
            return;
        }

        if let Some(remaining) = self.gate().adjustment_cooldown(now) {
            if self.gate().readjust_pending.is_none() {
                tracing::debug!(
                    "{} adjusted recently, re-adjusting in {}s",
                    self.gate().entity(),
                    remaining.num_seconds()
                );
                let task = Task::Readjust(self.gate().entity().clone());
                let timer = ctx.scheduler.run_in(remaining, task);
                self.gate_mut().readjust_pending = Some(timer);
            }
            return;
        }
        self.react_to_presence(ctx);
    }

    /// A deferred re-adjustment came due
    fn readjust(&mut self, timer: TimerHandle, ctx: &mut DeviceContext<'_>) {
        if self.gate().readjust_pending != Some(timer) {
            tracing::debug!("{} dropping stale re-adjustment", self.gate().entity());
            return;
        }
        self.gate_mut().readjust_pending = None;
        self.react_to_presence(ctx);
    }

    /// Act on the current vacancy: restart the transition and adjust
    fn react_to_presence(&mut self, ctx: &mut DeviceContext<'_>) {
        let vacant = self.gate().is_vacant(ctx.presence, ctx.now());
        let became_occupied = self.gate().was_vacant && !vacant;
        self.gate_mut().was_vacant = vacant;
        tracing::info!(
            "{} {}",
            self.gate().entity(),
            if vacant { "vacant" } else { "occupied" }
        );

        self.gate_mut().cancel_transition();
        if became_occupied {
            if let Some(plan) = self.occupied_transition(ctx) {
                self.gate_mut().start_transition(plan, ctx.scheduler);
            }
        }
        self.adjust(ctx);
    }

    /// A transition step came due
    fn transition_step(
        &mut self,
        generation: u64,
        steps_remaining: u32,
        step_time: Duration,
        settings: TransitionSettings,
        ctx: &mut DeviceContext<'_>,
    ) {
        let outcome = self.gate_mut().advance_transition(
            generation,
            steps_remaining,
            step_time,
            settings,
            ctx.scheduler,
        );
        if outcome != StepOutcome::Stale {
            self.adjust(ctx);
        }
    }
}
