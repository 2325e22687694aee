pub mod deferred;
pub mod recovery;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Local, Timelike, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::{
    BatteryProfile, BatteryProfileCache, ChargeTarget, ClockTime, Notifier, NotifyLevel,
    TariffWindow, TracingNotifier, Vehicle, VehicleCommand, VehicleMetrics,
};
use crate::scheduler::clock::{is_within_window, minute_of_day};
use crate::scheduler::{plan_charge, ChargePlan, PlanMode};
use crate::store::{FileSettingsStore, SettingsStore, UserSettings};
use deferred::DeferredQueue;
use recovery::{
    RecoveryAction, RecoveryConfig, RecoveryEvent, RetrySession, SessionState, VehicleSnapshot,
};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub controller: Arc<ChargeController>,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let vehicle = vehicle_backend(&cfg)?;
        let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
        let store: Arc<dyn SettingsStore> =
            Arc::new(FileSettingsStore::new(cfg.settings.path.clone()));

        let mut settings = ChargeSettings::from_config(&cfg)?;
        if let Some(saved) = store.load().await {
            settings.apply(saved);
            info!("restored persisted user settings");
        }

        let controller = Arc::new(ChargeController::new(
            vehicle,
            notifier,
            store,
            settings,
            BatteryProfile {
                nominal_capacity_kwh: cfg.battery.nominal_capacity_kwh,
                state_of_health_percent: cfg.battery.default_soh_percent,
            },
        ));

        Ok(Self { cfg, controller })
    }
}

#[cfg(feature = "sim")]
fn vehicle_backend(cfg: &Config) -> Result<Arc<dyn Vehicle>> {
    Ok(Arc::new(crate::domain::SimulatedVehicle::new(
        cfg.battery.nominal_capacity_kwh,
        cfg.charger.charge_rate_kw,
        cfg.battery.initial_soc_percent,
    )))
}

#[cfg(not(feature = "sim"))]
fn vehicle_backend(_cfg: &Config) -> Result<Arc<dyn Vehicle>> {
    anyhow::bail!("no vehicle backend available; build with the `sim` feature")
}

pub fn spawn_controller_tasks(state: AppState, cfg: Config) {
    let controller = state.controller.clone();
    tokio::spawn(async move {
        controller.run(cfg.controller.tick_seconds).await;
    });
}

/// User-adjustable charging preferences, seeded from config and overlaid
/// with whatever the settings store has persisted.
#[derive(Debug, Clone)]
pub struct ChargeSettings {
    pub target_soc_percent: f64,
    pub ready_by: Option<ClockTime>,
    pub tariff: TariffWindow,
    pub charge_rate_kw: f64,
}

impl ChargeSettings {
    fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            target_soc_percent: cfg.target.target_soc_percent,
            ready_by: cfg.target.ready_by()?,
            tariff: cfg.tariff.window()?,
            charge_rate_kw: cfg.charger.charge_rate_kw,
        })
    }

    fn apply(&mut self, saved: UserSettings) {
        self.target_soc_percent = saved.target_soc_percent;
        self.ready_by = saved.ready_by;
        self.tariff = saved.tariff;
    }

    fn to_user_settings(&self) -> UserSettings {
        UserSettings {
            target_soc_percent: self.target_soc_percent,
            ready_by: self.ready_by,
            tariff: self.tariff,
        }
    }
}

/// Everything the periodic tick owns. A single lock keeps tick processing
/// logically single-threaded: one tick (or API mutation) runs to completion
/// before the next touches this state.
struct TickState {
    queue: DeferredQueue<RecoveryEvent>,
    session: RetrySession,
    battery: BatteryProfileCache,
    plan: Option<ChargePlan>,
    last_plugged: Option<bool>,
    /// A charge was initiated (or manually stopped) this plug cycle; the
    /// scheduler must not start another until the next plug-in event.
    charge_initiated: bool,
    last_metrics: Option<(DateTime<Utc>, VehicleMetrics)>,
}

pub struct ChargeController {
    vehicle: Arc<dyn Vehicle>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn SettingsStore>,
    settings: RwLock<ChargeSettings>,
    tick_state: Mutex<TickState>,
}

impl ChargeController {
    pub fn new(
        vehicle: Arc<dyn Vehicle>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn SettingsStore>,
        settings: ChargeSettings,
        battery_defaults: BatteryProfile,
    ) -> Self {
        Self {
            vehicle,
            notifier,
            store,
            settings: RwLock::new(settings),
            tick_state: Mutex::new(TickState {
                queue: DeferredQueue::new(),
                session: RetrySession::new(RecoveryConfig::default()),
                battery: BatteryProfileCache::new(battery_defaults),
                plan: None,
                last_plugged: None,
                charge_initiated: false,
                last_metrics: None,
            }),
        }
    }

    /// Periodic tick loop; the sole driver of scheduling and recovery
    pub async fn run(&self, tick_seconds: u64) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(tick_seconds.max(1)));
        loop {
            interval.tick().await;
            if let Err(e) = self.tick(Local::now().fixed_offset()).await {
                warn!(error = %e, "control tick failed");
            }
        }
    }

    /// One control tick at wall-clock time `now`.
    ///
    /// Telemetry is read exactly once; every decision in the tick sees the
    /// same snapshot. Absent plug/charging flags read as `false`; an absent
    /// SoC reads as 0 for session supervision (never "target met") and
    /// defers schedule computation until a reading appears.
    pub async fn tick(&self, now: DateTime<FixedOffset>) -> Result<()> {
        let metrics = match self.vehicle.read_metrics().await {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!(error = %e, "telemetry unavailable; skipping tick");
                return Ok(());
            }
        };

        let now_utc = now.with_timezone(&Utc);
        let now_minute = minute_of_day(now.hour(), now.minute());
        let settings = self.settings.read().await.clone();

        let actions = {
            let mut st = self.tick_state.lock().await;
            st.battery.refresh(now_utc, &metrics);
            st.last_metrics = Some((now_utc, metrics));

            let plugged = metrics.plugged_in.unwrap_or(false);
            let snapshot = VehicleSnapshot {
                soc_percent: metrics.soc_percent.unwrap_or(0.0),
                charging: metrics.charging.unwrap_or(false),
                plugged_in: plugged,
            };

            let mut actions = Vec::new();
            self.observe_plug_edge(&mut st, plugged, &mut actions);
            self.refresh_plan(&mut st, &settings, &metrics, now_minute, plugged);
            let initiated_before = st.charge_initiated;
            self.maybe_start_scheduled(&mut st, &settings, now_minute, plugged, &mut actions);
            let started_this_tick = st.charge_initiated && !initiated_before;

            // Telemetry check before deferred events, and never on the tick
            // that issued the charge-start itself: the command must get a
            // full tick to take effect before the absence of charging can
            // count as an interruption.
            let TickState { queue, session, .. } = &mut *st;
            if !started_this_tick {
                actions.extend(session.on_tick(now_utc, snapshot, queue));
            }
            for event in queue.drain_due(now_utc) {
                actions.extend(session.on_event(now_utc, event, snapshot, queue));
            }

            info!(
                soc_percent = snapshot.soc_percent,
                plugged_in = plugged,
                charging = snapshot.charging,
                session = %st.session.state,
                plan_start = st.plan.map(|p| p.start_minute),
                "control tick"
            );
            actions
        };

        self.run_actions(actions).await;
        Ok(())
    }

    fn observe_plug_edge(&self, st: &mut TickState, plugged: bool, actions: &mut Vec<RecoveryAction>) {
        let was_plugged = st.last_plugged;
        st.last_plugged = Some(plugged);

        if plugged && was_plugged != Some(true) {
            // A fresh plug-in supersedes any prior schedule and session.
            let TickState { queue, session, .. } = &mut *st;
            session.reset(queue);
            st.plan = None;
            st.charge_initiated = false;
            info!("vehicle plugged in; schedule superseded");
        } else if !plugged && was_plugged == Some(true) {
            if st.session.is_supervising() {
                actions.push(RecoveryAction::Notify {
                    level: NotifyLevel::Info,
                    category: "charging",
                    message: "Vehicle unplugged; charge session ended".to_string(),
                });
            }
            let TickState { queue, session, .. } = &mut *st;
            session.reset(queue);
            st.plan = None;
            st.charge_initiated = false;
        }
    }

    /// Recompute the schedule while waiting for the session to begin.
    ///
    /// The plan is a pure function of the inputs, so recomputing it on
    /// every check is idempotent; once a charge has been initiated for this
    /// plug cycle the plan is frozen.
    fn refresh_plan(
        &self,
        st: &mut TickState,
        settings: &ChargeSettings,
        metrics: &VehicleMetrics,
        now_minute: u16,
        plugged: bool,
    ) {
        if !plugged || st.charge_initiated || st.session.state != SessionState::Idle {
            return;
        }
        let Some(soc) = metrics.soc_percent else {
            debug!("SoC unknown; deferring schedule computation");
            return;
        };

        let target = ChargeTarget {
            current_soc_percent: soc,
            target_soc_percent: settings.target_soc_percent,
            ready_by: settings.ready_by,
        };
        let usable = st.battery.profile().usable_capacity_kwh();
        match plan_charge(
            now_minute,
            &target,
            &settings.tariff,
            settings.charge_rate_kw,
            usable,
        ) {
            Ok(plan) => {
                if plan.map(|p| p.mode) != st.plan.map(|p| p.mode) {
                    match plan {
                        Some(p) => info!(
                            mode = ?p.mode,
                            start_minute = p.start_minute,
                            kwh_needed = p.kwh_needed,
                            total_cost = p.total_cost,
                            "charge schedule computed"
                        ),
                        None => debug!("target SoC already met; no charge scheduled"),
                    }
                }
                st.plan = plan;
            }
            Err(e) => warn!(error = %e, "schedule computation failed"),
        }
    }

    fn maybe_start_scheduled(
        &self,
        st: &mut TickState,
        settings: &ChargeSettings,
        now_minute: u16,
        plugged: bool,
        actions: &mut Vec<RecoveryAction>,
    ) {
        if !plugged || st.charge_initiated || st.session.state != SessionState::Idle {
            return;
        }
        let Some(plan) = st.plan else { return };

        let due = match plan.mode {
            PlanMode::Emergency => true,
            _ => {
                now_minute == plan.start_minute
                    || is_within_window(now_minute, plan.start_minute, plan.end_minute)
            }
        };
        if !due {
            return;
        }

        actions.push(RecoveryAction::Command(VehicleCommand::ChargeStart));
        let message = match plan.mode {
            PlanMode::Emergency => format!(
                "Deadline cannot be met; starting immediately ({:.1} kWh needed)",
                plan.kwh_needed
            ),
            _ => format!(
                "Scheduled charging started ({:.1} kWh, estimated cost {:.2})",
                plan.kwh_needed, plan.total_cost
            ),
        };
        actions.push(RecoveryAction::Notify {
            level: NotifyLevel::Info,
            category: "charging",
            message,
        });
        st.session.activate(settings.target_soc_percent, false);
        st.charge_initiated = true;
    }

    async fn run_actions(&self, actions: Vec<RecoveryAction>) {
        for action in actions {
            match action {
                RecoveryAction::Command(command) => {
                    // Fire and forget: failure here only means the next
                    // telemetry snapshot will show nothing changed.
                    if let Err(e) = self.vehicle.execute(command).await {
                        warn!(command = %command, error = %e, "vehicle command failed");
                    }
                }
                RecoveryAction::Notify {
                    level,
                    category,
                    message,
                } => self.notifier.notify(level, category, &message),
            }
        }
    }

    /// Start a manual (user-initiated) charge session. Manual sessions are
    /// never auto-retried after an interruption.
    pub async fn start_manual_charge(&self) -> Result<()> {
        self.vehicle.execute(VehicleCommand::ChargeStart).await?;
        let settings = self.settings.read().await.clone();
        let mut st = self.tick_state.lock().await;
        let TickState { queue, session, .. } = &mut *st;
        session.reset(queue);
        session.activate(settings.target_soc_percent, true);
        st.charge_initiated = true;
        self.notifier
            .notify(NotifyLevel::Info, "charging", "Manual charging started");
        Ok(())
    }

    /// Stop charging on user request; no scheduled restart until the next
    /// plug-in event.
    pub async fn stop_charge(&self) -> Result<()> {
        self.vehicle.execute(VehicleCommand::ChargeStop).await?;
        let mut st = self.tick_state.lock().await;
        let was_supervising = st.session.is_supervising();
        let TickState { queue, session, .. } = &mut *st;
        session.reset(queue);
        st.charge_initiated = true;
        if was_supervising {
            self.notifier
                .notify(NotifyLevel::Info, "charging", "Charging stopped by user");
        }
        Ok(())
    }

    pub async fn set_target_soc(&self, percent: f64) {
        self.settings.write().await.target_soc_percent = percent;
        self.persist_settings().await;
    }

    pub async fn set_ready_by(&self, ready_by: Option<ClockTime>) {
        self.settings.write().await.ready_by = ready_by;
        self.persist_settings().await;
    }

    pub async fn set_tariff_window(&self, tariff: TariffWindow) {
        self.settings.write().await.tariff = tariff;
        self.persist_settings().await;
    }

    async fn persist_settings(&self) {
        let settings = self.settings.read().await.to_user_settings();
        self.store.save(&settings).await;
    }

    pub async fn settings(&self) -> ChargeSettings {
        self.settings.read().await.clone()
    }

    pub async fn current_plan(&self) -> Option<ChargePlan> {
        self.tick_state.lock().await.plan
    }

    pub async fn status(&self) -> ControllerStatus {
        let settings = self.settings.read().await.clone();
        let st = self.tick_state.lock().await;
        let (observed_at, metrics) = match st.last_metrics {
            Some((at, m)) => (Some(at), m),
            None => (None, VehicleMetrics::default()),
        };
        ControllerStatus {
            observed_at,
            plugged_in: metrics.plugged_in,
            charging: metrics.charging,
            soc_percent: metrics.soc_percent,
            session_state: st.session.state,
            attempt_count: st.session.attempt_count,
            manual_override: st.session.manual_override,
            plan: st.plan,
            target_soc_percent: settings.target_soc_percent,
            ready_by: settings.ready_by.map(|t| t.to_string()),
            cheap_window: format!("{}-{}", settings.tariff.cheap_start, settings.tariff.cheap_end),
        }
    }
}

/// Snapshot of the controller for the status endpoint
#[derive(Debug, Serialize)]
pub struct ControllerStatus {
    pub observed_at: Option<DateTime<Utc>>,
    pub plugged_in: Option<bool>,
    pub charging: Option<bool>,
    pub soc_percent: Option<f64>,
    pub session_state: SessionState,
    pub attempt_count: u32,
    pub manual_override: bool,
    pub plan: Option<ChargePlan>,
    pub target_soc_percent: f64,
    pub ready_by: Option<String>,
    pub cheap_window: String,
}
