//! Outer control loop.
//!
//! Each cycle refreshes every village, loads the plan, reconciles every
//! village, checks every village for attacks, then sleeps. Villages are handled
//! one after another in discovery order over the single shared session.
//! Shutdown requests are honoured only between cycles.

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use thiserror::Error;

use crate::config::{BotConfig, ConfigError};
use crate::engine::{self, ReconcileError, ReconcileOutcome};
use crate::gateway::{AuthError, GatewayError, RemoteGateway, Session};
use crate::notify::Notifier;
use crate::plan::{JobPlan, PlanError, PlanSource};
use crate::threat::{AlertOutcome, ThreatMonitor};
use crate::village::{RefreshOutcome, Village};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("could not list villages: {0}")]
    Gateway(#[from] GatewayError),
    #[error("account lists no villages")]
    Empty,
}

/// Failures that end the run before the first cycle.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("village discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    ShuttingDown,
}

pub fn discover_villages<G: RemoteGateway + ?Sized>(
    gateway: &mut G,
) -> Result<Vec<Village>, DiscoveryError> {
    let listed = gateway.list_villages()?;
    if listed.is_empty() {
        return Err(DiscoveryError::Empty);
    }
    for village in &listed {
        tracing::info!(
            target: "village_bot::scheduler",
            village = %village.name,
            locator = %village.locator,
            "village.discovered"
        );
    }
    Ok(listed.into_iter().map(Village::new).collect())
}

/// What happened to one village's build queue this cycle.
#[derive(Debug)]
pub enum ReconcileStatus {
    /// Overview not refreshed this cycle.
    SkippedStale,
    /// Plan failed to load this cycle.
    SkippedNoPlan,
    Done(ReconcileOutcome),
    Failed(ReconcileError),
}

#[derive(Debug)]
pub struct VillageReport {
    pub name: String,
    pub refresh: RefreshOutcome,
    pub reconcile: ReconcileStatus,
    pub alert: AlertOutcome,
}

impl VillageReport {
    pub fn issued_build(&self) -> bool {
        matches!(&self.reconcile, ReconcileStatus::Done(outcome) if outcome.issued().is_some())
    }
}

#[derive(Debug)]
pub struct CycleReport {
    pub cycle: u64,
    pub plan: Result<usize, PlanError>,
    pub villages: Vec<VillageReport>,
}

impl CycleReport {
    pub fn village(&self, name: &str) -> Option<&VillageReport> {
        self.villages.iter().find(|report| report.name == name)
    }

    pub fn builds_issued(&self) -> usize {
        self.villages
            .iter()
            .filter(|report| report.issued_build())
            .count()
    }

    pub fn alerts_raised(&self) -> usize {
        self.villages
            .iter()
            .filter(|report| report.alert.raised())
            .count()
    }
}

pub struct PollScheduler<'a, G: RemoteGateway, P: PlanSource, N: Notifier> {
    config: &'a BotConfig,
    session: Session<G>,
    plan_source: P,
    notifier: N,
    monitor: ThreatMonitor,
    villages: Vec<Village>,
    shutdown: Receiver<()>,
    state: RunState,
    cycles: u64,
}

impl<'a, G: RemoteGateway, P: PlanSource, N: Notifier> PollScheduler<'a, G, P, N> {
    /// Discover the account's villages over an authenticated session. On
    /// failure the session is dropped, which tears it down.
    pub fn start(
        config: &'a BotConfig,
        mut session: Session<G>,
        plan_source: P,
        notifier: N,
        shutdown: Receiver<()>,
    ) -> Result<Self, StartupError> {
        let villages = discover_villages(session.gateway_mut())?;
        tracing::info!(
            target: "village_bot::scheduler",
            villages = villages.len(),
            poll_interval_seconds = config.poll_interval_seconds,
            "scheduler.ready"
        );
        Ok(Self {
            config,
            session,
            plan_source,
            notifier,
            monitor: ThreatMonitor::new(config.auto_evade_attack),
            villages,
            shutdown,
            state: RunState::Running,
            cycles: 0,
        })
    }

    pub fn villages(&self) -> &[Village] {
        &self.villages
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn gateway(&self) -> &G {
        self.session.gateway()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run cycles until shutdown is requested or `max_cycles` is reached, then
    /// log out. Returns the number of completed cycles.
    pub fn run(mut self) -> u64 {
        loop {
            self.poll_shutdown();
            if self.state == RunState::ShuttingDown || self.cycle_budget_spent() {
                break;
            }
            self.run_cycle();
            if self.cycle_budget_spent() {
                break;
            }
            self.wait_for_next_cycle();
        }

        let cycles = self.cycles;
        let PollScheduler { session, .. } = self;
        // A failed logout is logged by the session and does not make the
        // shutdown unclean.
        let _ = session.close();
        tracing::info!(target: "village_bot::scheduler", cycles, "run.stopped");
        cycles
    }

    /// One full refresh -> reconcile -> monitor pass over every village.
    pub fn run_cycle(&mut self) -> CycleReport {
        self.cycles += 1;
        let cycle = self.cycles;
        tracing::info!(target: "village_bot::scheduler", cycle, "cycle.started");

        let gateway = self.session.gateway_mut();

        let mut refreshes = Vec::with_capacity(self.villages.len());
        for village in &mut self.villages {
            let outcome = village.refresh(gateway);
            for err in outcome.errors() {
                tracing::warn!(
                    target: "village_bot::scheduler",
                    village = %village.name(),
                    phase = %err.phase(),
                    error = %err,
                    "refresh.failed"
                );
            }
            refreshes.push(outcome);
        }

        let plan = self.plan_source.load();
        if let Err(err) = &plan {
            tracing::warn!(
                target: "village_bot::scheduler",
                cycle,
                error = %err,
                "job_plan.load_failed"
            );
        }
        self.finish_cycle(cycle, refreshes, plan)
    }

    fn finish_cycle(
        &mut self,
        cycle: u64,
        refreshes: Vec<RefreshOutcome>,
        plan: Result<JobPlan, PlanError>,
    ) -> CycleReport {
        let gateway = self.session.gateway_mut();

        let mut statuses = Vec::with_capacity(self.villages.len());
        for (village, refresh) in self.villages.iter().zip(&refreshes) {
            let status = match (&refresh.overview, &plan) {
                (Err(_), _) => ReconcileStatus::SkippedStale,
                (Ok(()), Err(_)) => ReconcileStatus::SkippedNoPlan,
                (Ok(()), Ok(plan)) => match engine::reconcile(gateway, village, plan) {
                    Ok(outcome) => ReconcileStatus::Done(outcome),
                    Err(err) => {
                        tracing::warn!(
                            target: "village_bot::scheduler",
                            village = %village.name(),
                            phase = %err.phase(),
                            error = %err,
                            "reconcile.failed"
                        );
                        ReconcileStatus::Failed(err)
                    }
                },
            };
            statuses.push(status);
        }

        let mut alerts = Vec::with_capacity(self.villages.len());
        for (village, refresh) in self.villages.iter().zip(&refreshes) {
            let alert = if refresh.defense.is_ok() {
                self.monitor.monitor(village, &mut self.notifier)
            } else {
                AlertOutcome::Unknown
            };
            alerts.push(alert);
        }

        let villages: Vec<VillageReport> = self
            .villages
            .iter()
            .zip(refreshes)
            .zip(statuses)
            .zip(alerts)
            .map(|(((village, refresh), reconcile), alert)| VillageReport {
                name: village.name().to_string(),
                refresh,
                reconcile,
                alert,
            })
            .collect();

        let report = CycleReport {
            cycle,
            plan: plan.map(|plan| plan.len()),
            villages,
        };
        tracing::info!(
            target: "village_bot::scheduler",
            cycle,
            villages = report.villages.len(),
            builds = report.builds_issued(),
            alerts = report.alerts_raised(),
            "cycle.completed"
        );
        report
    }

    /// True once `max_cycles` cycles have run; a bound of zero runs none.
    fn cycle_budget_spent(&self) -> bool {
        let Some(max) = self.config.max_cycles else {
            return false;
        };
        if self.cycles < max {
            return false;
        }
        tracing::info!(
            target: "village_bot::scheduler",
            cycles = self.cycles,
            max_cycles = max,
            "run.max_cycles_reached"
        );
        true
    }

    fn poll_shutdown(&mut self) {
        match self.shutdown.try_recv() {
            Ok(()) => self.request_shutdown("signal"),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => self.request_shutdown("signal_channel_closed"),
        }
    }

    /// Sleep for the poll interval, waking early if shutdown is requested.
    fn wait_for_next_cycle(&mut self) {
        let interval = self.config.poll_interval();
        tracing::info!(
            target: "village_bot::scheduler",
            seconds = interval.as_secs(),
            "cycle.sleeping"
        );
        match self.shutdown.recv_timeout(interval) {
            Ok(()) => self.request_shutdown("signal"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => self.request_shutdown("signal_channel_closed"),
        }
    }

    fn request_shutdown(&mut self, reason: &'static str) {
        if self.state == RunState::Running {
            tracing::info!(target: "village_bot::scheduler", reason, "shutdown.requested");
        }
        self.state = RunState::ShuttingDown;
    }
}
