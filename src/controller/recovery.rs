//! Interruption recovery for an active charge session.
//!
//! When a scheduled charge stops unexpectedly the session runs a bounded
//! sequence of recovery attempts. Each attempt wakes the vehicle with a
//! climate on/off pulse (to coax the charge-pilot signal back) before
//! reissuing the charge-start command. Attempts back off (2, 5, 10
//! minutes) and give up for good after three failures. Manual sessions are
//! never auto-retried.
//!
//! The machine is deliberately side-effect free: transitions return
//! [`RecoveryAction`]s for the caller to execute, and all waiting goes
//! through the shared [`DeferredQueue`], so nothing here ever blocks the
//! control loop and the whole thing is testable with a synthetic clock.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use super::deferred::DeferredQueue;
use crate::domain::notify::NotifyLevel;
use crate::domain::vehicle::VehicleCommand;

const NOTIFY_CATEGORY: &str = "charging";

/// Recovery session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SessionState {
    /// No supervised session
    Idle,
    /// A charge is running and being watched
    Active,
    /// Charging stopped unexpectedly; a wake retry is pending
    Interrupted,
    /// The climate on/off wake pulse is in flight
    WakeInProgress,
    /// Recovery attempts exhausted; terminal until the next plug cycle
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Active => write!(f, "active"),
            SessionState::Interrupted => write!(f, "interrupted"),
            SessionState::WakeInProgress => write!(f, "wake-in-progress"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// Deferred transitions the session schedules for itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryEvent {
    /// Backoff elapsed; begin the wake pulse
    BeginWake,
    /// Climate-on settle elapsed; switch climate back off
    ClimateOff,
    /// Climate-off settle elapsed; re-check and retry the charge
    WakeSettled,
}

/// Side effects the caller must execute after a transition.
///
/// Command outcomes are never trusted: a failed or ignored command simply
/// shows up as unchanged telemetry on a later tick.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    Command(VehicleCommand),
    Notify {
        level: NotifyLevel,
        category: &'static str,
        message: String,
    },
}

/// Recovery timing knobs
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub max_attempts: u32,
    /// Delay before each wake attempt, indexed by attempt number
    pub backoff: Vec<Duration>,
    /// How long climate stays on during the wake pulse
    pub climate_on_settle: Duration,
    /// Pause between climate-off and the retried charge-start
    pub climate_off_settle: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![
                Duration::minutes(2),
                Duration::minutes(5),
                Duration::minutes(10),
            ],
            climate_on_settle: Duration::seconds(10),
            climate_off_settle: Duration::seconds(5),
        }
    }
}

/// Telemetry snapshot with defaults already applied, consistent within one
/// tick
#[derive(Debug, Clone, Copy)]
pub struct VehicleSnapshot {
    pub soc_percent: f64,
    pub charging: bool,
    pub plugged_in: bool,
}

/// State for one supervised charge session.
///
/// Created when a charge starts, torn down on unplug, on reaching the
/// target, or when retries are exhausted. `Failed` is terminal for the
/// session; the next plug cycle resets it to `Idle`.
#[derive(Debug)]
pub struct RetrySession {
    pub session_id: Uuid,
    pub state: SessionState,
    pub attempt_count: u32,
    pub manual_override: bool,
    target_soc_percent: f64,
    config: RecoveryConfig,
}

impl RetrySession {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            session_id: Uuid::nil(),
            state: SessionState::Idle,
            attempt_count: 0,
            manual_override: false,
            target_soc_percent: 100.0,
            config,
        }
    }

    /// Begin supervising a freshly started charge
    pub fn activate(&mut self, target_soc_percent: f64, manual: bool) {
        self.session_id = Uuid::new_v4();
        self.state = SessionState::Active;
        self.attempt_count = 0;
        self.manual_override = manual;
        self.target_soc_percent = target_soc_percent;
    }

    /// Tear the session down and cancel everything it scheduled.
    ///
    /// Must be called synchronously on unplug or manual stop so a stale
    /// wake or retry cannot fire into a later, unrelated session.
    pub fn reset(&mut self, queue: &mut DeferredQueue<RecoveryEvent>) {
        queue.clear();
        self.state = SessionState::Idle;
        self.attempt_count = 0;
        self.manual_override = false;
    }

    pub fn is_supervising(&self) -> bool {
        matches!(
            self.state,
            SessionState::Active | SessionState::Interrupted | SessionState::WakeInProgress
        )
    }

    /// Periodic telemetry check while a session exists
    pub fn on_tick(
        &mut self,
        now: DateTime<Utc>,
        snapshot: VehicleSnapshot,
        queue: &mut DeferredQueue<RecoveryEvent>,
    ) -> Vec<RecoveryAction> {
        if self.state != SessionState::Active {
            return Vec::new();
        }

        if snapshot.soc_percent >= self.target_soc_percent {
            let actions = vec![
                RecoveryAction::Command(VehicleCommand::ChargeStop),
                notify(
                    NotifyLevel::Info,
                    format!(
                        "Target charge reached ({:.0}%); charging complete",
                        snapshot.soc_percent
                    ),
                ),
            ];
            self.reset(queue);
            return actions;
        }

        if snapshot.plugged_in && !snapshot.charging {
            return self.interrupted(now, snapshot, queue);
        }

        Vec::new()
    }

    /// Handle a deferred event drained from the queue
    pub fn on_event(
        &mut self,
        now: DateTime<Utc>,
        event: RecoveryEvent,
        snapshot: VehicleSnapshot,
        queue: &mut DeferredQueue<RecoveryEvent>,
    ) -> Vec<RecoveryAction> {
        match (event, self.state) {
            (RecoveryEvent::BeginWake, SessionState::Interrupted) => {
                self.state = SessionState::WakeInProgress;
                queue.schedule(now, self.config.climate_on_settle, RecoveryEvent::ClimateOff);
                vec![RecoveryAction::Command(VehicleCommand::ClimateOn)]
            }
            (RecoveryEvent::ClimateOff, SessionState::WakeInProgress) => {
                queue.schedule(now, self.config.climate_off_settle, RecoveryEvent::WakeSettled);
                vec![RecoveryAction::Command(VehicleCommand::ClimateOff)]
            }
            (RecoveryEvent::WakeSettled, SessionState::WakeInProgress) => {
                self.finish_wake(snapshot, queue)
            }
            (event, state) => {
                debug!(?event, %state, "ignoring stale recovery event");
                Vec::new()
            }
        }
    }

    fn interrupted(
        &mut self,
        now: DateTime<Utc>,
        snapshot: VehicleSnapshot,
        queue: &mut DeferredQueue<RecoveryEvent>,
    ) -> Vec<RecoveryAction> {
        if self.manual_override {
            // Manual sessions are the user's call; never auto-retry.
            let action = notify(
                NotifyLevel::Warning,
                format!(
                    "Manual charging stopped at {:.0}%; no automatic retry",
                    snapshot.soc_percent
                ),
            );
            self.reset(queue);
            return vec![action];
        }

        if self.attempt_count >= self.config.max_attempts {
            queue.clear();
            self.state = SessionState::Failed;
            return vec![notify(
                NotifyLevel::Alert,
                format!(
                    "Charging failed after {} recovery attempts; last known charge {:.0}%. \
                     Please inspect the vehicle and charging cable.",
                    self.config.max_attempts, snapshot.soc_percent
                ),
            )];
        }

        self.attempt_count += 1;
        let delay = self
            .config
            .backoff
            .get(self.attempt_count as usize - 1)
            .copied()
            .unwrap_or_else(|| Duration::minutes(10));
        queue.schedule(now, delay, RecoveryEvent::BeginWake);
        self.state = SessionState::Interrupted;

        vec![notify(
            NotifyLevel::Warning,
            format!(
                "Charging stopped unexpectedly at {:.0}%; waking vehicle in {} min \
                 (attempt {}/{})",
                snapshot.soc_percent,
                delay.num_minutes(),
                self.attempt_count,
                self.config.max_attempts
            ),
        )]
    }

    fn finish_wake(
        &mut self,
        snapshot: VehicleSnapshot,
        queue: &mut DeferredQueue<RecoveryEvent>,
    ) -> Vec<RecoveryAction> {
        if !snapshot.plugged_in {
            let action = notify(
                NotifyLevel::Warning,
                "Vehicle was unplugged during recovery; giving up".to_string(),
            );
            self.reset(queue);
            return vec![action];
        }

        if snapshot.soc_percent >= self.target_soc_percent {
            let action = notify(
                NotifyLevel::Info,
                format!(
                    "Target charge reached ({:.0}%) while recovering; charging complete",
                    snapshot.soc_percent
                ),
            );
            self.reset(queue);
            return vec![action];
        }

        // Back to Active; whether the restart actually took hold is
        // confirmed by telemetry on the following ticks.
        self.state = SessionState::Active;
        vec![RecoveryAction::Command(VehicleCommand::ChargeStart)]
    }
}

fn notify(level: NotifyLevel, message: String) -> RecoveryAction {
    RecoveryAction::Notify {
        level,
        category: NOTIFY_CATEGORY,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        "2026-01-15T23:30:00Z".parse().unwrap()
    }

    fn snapshot(soc: f64, charging: bool, plugged_in: bool) -> VehicleSnapshot {
        VehicleSnapshot {
            soc_percent: soc,
            charging,
            plugged_in,
        }
    }

    fn active_session() -> (RetrySession, DeferredQueue<RecoveryEvent>) {
        let mut session = RetrySession::new(RecoveryConfig::default());
        session.activate(80.0, false);
        (session, DeferredQueue::new())
    }

    fn commands(actions: &[RecoveryAction]) -> Vec<VehicleCommand> {
        actions
            .iter()
            .filter_map(|a| match a {
                RecoveryAction::Command(c) => Some(*c),
                RecoveryAction::Notify { .. } => None,
            })
            .collect()
    }

    fn notifications(actions: &[RecoveryAction]) -> Vec<(NotifyLevel, String)> {
        actions
            .iter()
            .filter_map(|a| match a {
                RecoveryAction::Notify { level, message, .. } => {
                    Some((*level, message.clone()))
                }
                RecoveryAction::Command(_) => None,
            })
            .collect()
    }

    /// Drive one complete wake pulse, firing each deferred stage as it
    /// comes due, and return all actions it produced.
    fn run_wake(
        session: &mut RetrySession,
        queue: &mut DeferredQueue<RecoveryEvent>,
        mut now: DateTime<Utc>,
        snap: VehicleSnapshot,
    ) -> Vec<RecoveryAction> {
        let mut actions = Vec::new();
        for _ in 0..4 {
            now += Duration::minutes(11);
            for event in queue.drain_due(now) {
                actions.extend(session.on_event(now, event, snap, queue));
            }
        }
        actions
    }

    #[test]
    fn test_healthy_charging_stays_active() {
        let (mut session, mut queue) = active_session();
        let actions = session.on_tick(t0(), snapshot(60.0, true, true), &mut queue);
        assert!(actions.is_empty());
        assert_eq!(session.state, SessionState::Active);
    }

    #[test]
    fn test_target_reached_stops_and_resets() {
        let (mut session, mut queue) = active_session();
        let actions = session.on_tick(t0(), snapshot(80.5, true, true), &mut queue);
        assert_eq!(commands(&actions), vec![VehicleCommand::ChargeStop]);
        assert_eq!(session.state, SessionState::Idle);
    }

    #[test]
    fn test_interruption_schedules_first_retry() {
        let (mut session, mut queue) = active_session();
        let actions = session.on_tick(t0(), snapshot(57.0, false, true), &mut queue);

        assert_eq!(session.state, SessionState::Interrupted);
        assert_eq!(session.attempt_count, 1);
        assert_eq!(queue.len(), 1);
        let notes = notifications(&actions);
        assert_eq!(notes.len(), 1);
        assert!(notes[0].1.contains("attempt 1/3"));
        assert!(notes[0].1.contains("2 min"));

        // Nothing fires before the backoff elapses.
        assert!(queue.drain_due(t0() + Duration::minutes(1)).is_empty());
        let due = queue.drain_due(t0() + Duration::minutes(2));
        assert_eq!(due, vec![RecoveryEvent::BeginWake]);
    }

    #[test]
    fn test_wake_sequence_chains_climate_commands() {
        let (mut session, mut queue) = active_session();
        session.on_tick(t0(), snapshot(57.0, false, true), &mut queue);

        let now = t0() + Duration::minutes(2);
        let actions = session.on_event(
            now,
            RecoveryEvent::BeginWake,
            snapshot(57.0, false, true),
            &mut queue,
        );
        assert_eq!(commands(&actions), vec![VehicleCommand::ClimateOn]);
        assert_eq!(session.state, SessionState::WakeInProgress);

        let now = now + Duration::seconds(10);
        let due = queue.drain_due(now);
        assert_eq!(due, vec![RecoveryEvent::ClimateOff]);
        let actions =
            session.on_event(now, RecoveryEvent::ClimateOff, snapshot(57.0, false, true), &mut queue);
        assert_eq!(commands(&actions), vec![VehicleCommand::ClimateOff]);

        let now = now + Duration::seconds(5);
        let due = queue.drain_due(now);
        assert_eq!(due, vec![RecoveryEvent::WakeSettled]);
        let actions =
            session.on_event(now, RecoveryEvent::WakeSettled, snapshot(57.0, false, true), &mut queue);
        assert_eq!(commands(&actions), vec![VehicleCommand::ChargeStart]);
        assert_eq!(session.state, SessionState::Active);
        // Attempt count carries over so the next interruption escalates.
        assert_eq!(session.attempt_count, 1);
    }

    #[test]
    fn test_backoff_escalates_per_attempt() {
        let (mut session, mut queue) = active_session();
        let stopped = snapshot(57.0, false, true);
        let mut now = t0();

        for expected in ["2 min", "5 min", "10 min"] {
            let actions = session.on_tick(now, stopped, &mut queue);
            let notes = notifications(&actions);
            assert!(notes[0].1.contains(expected), "wanted {expected} in {}", notes[0].1);
            let wake_actions = run_wake(&mut session, &mut queue, now, stopped);
            assert_eq!(commands(&wake_actions).last(), Some(&VehicleCommand::ChargeStart));
            now += Duration::hours(1);
        }
        assert_eq!(session.attempt_count, 3);
    }

    #[test]
    fn test_retries_exhausted_reaches_failed_once() {
        let (mut session, mut queue) = active_session();
        let stopped = snapshot(57.0, false, true);
        let mut now = t0();
        let mut terminal_notes = 0;

        // Three interrupted-and-retried cycles, then one final stop.
        for _ in 0..4 {
            let actions = session.on_tick(now, stopped, &mut queue);
            terminal_notes += notifications(&actions)
                .iter()
                .filter(|(level, _)| *level == NotifyLevel::Alert)
                .count();
            run_wake(&mut session, &mut queue, now, stopped);
            now += Duration::hours(1);
        }

        assert_eq!(session.state, SessionState::Failed);
        assert_eq!(terminal_notes, 1);
        assert!(session.attempt_count <= 3);
        assert!(queue.is_empty());

        // Subsequent ticks take no further action.
        let actions = session.on_tick(now, stopped, &mut queue);
        assert!(actions.is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_failed_notification_names_last_soc() {
        let (mut session, mut queue) = active_session();
        session.attempt_count = 3;
        let actions = session.on_tick(t0(), snapshot(57.0, false, true), &mut queue);
        let notes = notifications(&actions);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, NotifyLevel::Alert);
        assert!(notes[0].1.contains("57%"));
        assert!(notes[0].1.contains("inspect"));
    }

    #[test]
    fn test_manual_override_never_retries() {
        let mut session = RetrySession::new(RecoveryConfig::default());
        let mut queue = DeferredQueue::new();
        session.activate(80.0, true);

        let actions = session.on_tick(t0(), snapshot(57.0, false, true), &mut queue);

        assert_eq!(session.state, SessionState::Idle);
        assert_eq!(session.attempt_count, 0);
        assert!(queue.is_empty(), "manual interruption must schedule nothing");
        let notes = notifications(&actions);
        assert_eq!(notes.len(), 1);
        assert!(notes[0].1.contains("no automatic retry"));
    }

    #[test]
    fn test_unplug_during_wake_gives_up() {
        let (mut session, mut queue) = active_session();
        session.on_tick(t0(), snapshot(57.0, false, true), &mut queue);
        let now = t0() + Duration::minutes(2);
        session.on_event(now, RecoveryEvent::BeginWake, snapshot(57.0, false, true), &mut queue);
        session.on_event(now, RecoveryEvent::ClimateOff, snapshot(57.0, false, true), &mut queue);

        let actions = session.on_event(
            now,
            RecoveryEvent::WakeSettled,
            snapshot(57.0, false, false),
            &mut queue,
        );
        assert!(commands(&actions).is_empty());
        assert_eq!(session.state, SessionState::Idle);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_target_reached_during_wake_completes() {
        let (mut session, mut queue) = active_session();
        session.on_tick(t0(), snapshot(57.0, false, true), &mut queue);
        let now = t0() + Duration::minutes(2);
        session.on_event(now, RecoveryEvent::BeginWake, snapshot(57.0, false, true), &mut queue);
        session.on_event(now, RecoveryEvent::ClimateOff, snapshot(57.0, false, true), &mut queue);

        let actions = session.on_event(
            now,
            RecoveryEvent::WakeSettled,
            snapshot(81.0, false, true),
            &mut queue,
        );
        assert!(commands(&actions).is_empty());
        let notes = notifications(&actions);
        assert!(notes[0].1.contains("complete"));
        assert_eq!(session.state, SessionState::Idle);
    }

    #[test]
    fn test_reset_clears_pending_events() {
        let (mut session, mut queue) = active_session();
        session.on_tick(t0(), snapshot(57.0, false, true), &mut queue);
        assert_eq!(queue.len(), 1);

        session.reset(&mut queue);
        assert!(queue.is_empty());
        assert_eq!(session.state, SessionState::Idle);
        assert!(queue.drain_due(t0() + Duration::hours(1)).is_empty());
    }

    #[test]
    fn test_stale_event_is_ignored() {
        let (mut session, mut queue) = active_session();
        // BeginWake arriving while Active (e.g. after an external reset
        // raced a drain) must do nothing.
        let actions = session.on_event(
            t0(),
            RecoveryEvent::BeginWake,
            snapshot(57.0, false, true),
            &mut queue,
        );
        assert!(actions.is_empty());
        assert_eq!(session.state, SessionState::Active);
    }
}
