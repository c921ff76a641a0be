//! Per-village build reconciliation.
//!
//! One pass per village per cycle: walk the village's queue in declared order,
//! skip slots already at their target level, and stop at the first slot that
//! is either built or blocked. The server runs a single construction at a
//! time per village, so at most one build is issued per pass.

use std::fmt;

use thiserror::Error;

use crate::gateway::{GatewayError, RemoteGateway};
use crate::markup::{self, BlockReason, BuildAction, ParseError};
use crate::plan::{BuildJob, JobPlan};
use crate::village::Village;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No fresh overview for this village; nothing is decided on stale data.
    Unknown,
    Busy { remaining_seconds: u64 },
    /// Idle and every queued job is already at or above its target.
    UpToDate { satisfied: usize },
    Issued {
        job: BuildJob,
        from_level: u32,
        satisfied: usize,
    },
    Blocked {
        job: BuildJob,
        reason: BlockReason,
        current_level: u32,
        satisfied: usize,
    },
}

impl ReconcileOutcome {
    pub fn issued(&self) -> Option<&BuildJob> {
        match self {
            ReconcileOutcome::Issued { job, .. } => Some(job),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    CheckingLevel,
    AttemptingBuild,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcilePhase::CheckingLevel => f.write_str("checking_level"),
            ReconcilePhase::AttemptingBuild => f.write_str("attempting_build"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("slot {field_id} could not be fetched: {source}")]
    SlotFetch {
        field_id: u32,
        #[source]
        source: GatewayError,
    },
    #[error("slot {field_id} page unreadable: {source}")]
    SlotParse {
        field_id: u32,
        phase: ReconcilePhase,
        #[source]
        source: ParseError,
    },
    #[error("build of slot {field_id} was not accepted: {source}")]
    BuildAction {
        field_id: u32,
        #[source]
        source: GatewayError,
    },
}

impl ReconcileError {
    pub fn phase(&self) -> ReconcilePhase {
        match self {
            ReconcileError::SlotFetch { .. } => ReconcilePhase::CheckingLevel,
            ReconcileError::SlotParse { phase, .. } => *phase,
            ReconcileError::BuildAction { .. } => ReconcilePhase::AttemptingBuild,
        }
    }
}

/// Decide and, if warranted, issue this cycle's build for one village.
pub fn reconcile<G: RemoteGateway + ?Sized>(
    gateway: &mut G,
    village: &Village,
    plan: &JobPlan,
) -> Result<ReconcileOutcome, ReconcileError> {
    let remaining = match village.work_remaining_seconds() {
        None => return Ok(ReconcileOutcome::Unknown),
        Some(remaining) => remaining,
    };
    if remaining > 0 {
        tracing::info!(
            target: "village_bot::engine",
            village = %village.name(),
            remaining_seconds = remaining,
            "reconcile.skipped=busy"
        );
        return Ok(ReconcileOutcome::Busy {
            remaining_seconds: remaining,
        });
    }

    let queue = plan.queue_for(village.name());
    tracing::info!(
        target: "village_bot::engine",
        village = %village.name(),
        jobs = queue.len(),
        "reconcile.scanning"
    );

    let mut satisfied = 0;
    for job in queue {
        let field_id = job.field_id;
        let page = gateway
            .fetch_slot(village.locator(), field_id)
            .map_err(|source| ReconcileError::SlotFetch { field_id, source })?;
        let current_level =
            markup::parse_current_level(&page).map_err(|source| ReconcileError::SlotParse {
                field_id,
                phase: ReconcilePhase::CheckingLevel,
                source,
            })?;

        if current_level >= job.target_level {
            tracing::info!(
                target: "village_bot::engine",
                village = %village.name(),
                field_id,
                current_level,
                target_level = job.target_level,
                "reconcile.job_satisfied"
            );
            satisfied += 1;
            continue;
        }

        let action =
            markup::parse_build_action(&page).map_err(|source| ReconcileError::SlotParse {
                field_id,
                phase: ReconcilePhase::AttemptingBuild,
                source,
            })?;
        return match action {
            BuildAction::Blocked(reason) => {
                tracing::info!(
                    target: "village_bot::engine",
                    village = %village.name(),
                    field_id,
                    current_level,
                    ?reason,
                    "reconcile.blocked"
                );
                Ok(ReconcileOutcome::Blocked {
                    job: job.clone(),
                    reason,
                    current_level,
                    satisfied,
                })
            }
            BuildAction::Available { url } => {
                gateway
                    .issue_build(&url)
                    .map_err(|source| ReconcileError::BuildAction { field_id, source })?;
                tracing::info!(
                    target: "village_bot::engine",
                    village = %village.name(),
                    field_id,
                    from_level = current_level,
                    target_level = job.target_level,
                    "reconcile.issued"
                );
                Ok(ReconcileOutcome::Issued {
                    job: job.clone(),
                    from_level: current_level,
                    satisfied,
                })
            }
        };
    }

    Ok(ReconcileOutcome::UpToDate { satisfied })
}
