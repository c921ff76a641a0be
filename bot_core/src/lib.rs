//! Core of the village maintenance bot.
//!
//! Polls a browser game server on a fixed interval, upgrades each village's
//! construction slots in the order a build plan declares, and raises an alert
//! whenever a village has hostile raids incoming. The scheduling core talks to
//! the server only through [`RemoteGateway`]; [`HttpGateway`] is the real
//! transport.

pub mod config;
pub mod engine;
pub mod gateway;
pub mod http;
pub mod markup;
pub mod notify;
pub mod plan;
pub mod scheduler;
pub mod threat;
pub mod village;

pub use config::{load_bot_config, BotConfig, ConfigError};
pub use engine::{reconcile, ReconcileError, ReconcileOutcome, ReconcilePhase};
pub use gateway::{AuthError, GatewayError, RemoteGateway, Session};
pub use http::HttpGateway;
pub use markup::{BlockReason, BuildAction, ParseError, TroopMovements};
pub use notify::{notifier_from_config, Alert, DeliveryError, LogNotifier, Notifier, SmtpNotifier};
pub use plan::{BuildJob, JobPlan, JobPlanStore, PlanError, PlanSource, RowError, TargetKind};
pub use scheduler::{
    discover_villages, CycleReport, DiscoveryError, PollScheduler, ReconcileStatus, RunState,
    StartupError, VillageReport,
};
pub use threat::{AlertDecision, AlertOutcome, ThreatMonitor};
pub use village::{
    Locator, RefreshError, RefreshOutcome, RefreshPhase, ResourceKind, Resources, Village,
    VillageRef,
};
