//! Attack detection.
//!
//! Alerts are at-least-once: a village that is still under attack next cycle
//! is reported again. Nothing is remembered between cycles.

use crate::notify::{Alert, Notifier};
use crate::village::Village;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    None,
    Raise { threat_count: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    Clear,
    /// Threat count not observed this cycle.
    Unknown,
    Sent { threat_count: u32 },
    DeliveryFailed { threat_count: u32 },
}

impl AlertOutcome {
    pub fn raised(&self) -> bool {
        matches!(
            self,
            AlertOutcome::Sent { .. } | AlertOutcome::DeliveryFailed { .. }
        )
    }
}

pub fn check(village: &Village) -> AlertDecision {
    match village.incoming_threat_count() {
        Some(count) if count > 0 => AlertDecision::Raise {
            threat_count: count,
        },
        _ => AlertDecision::None,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreatMonitor {
    auto_evade: bool,
}

impl ThreatMonitor {
    pub fn new(auto_evade: bool) -> Self {
        Self { auto_evade }
    }

    /// Check one village and send at most one alert for it.
    pub fn monitor<N: Notifier + ?Sized>(
        &self,
        village: &Village,
        notifier: &mut N,
    ) -> AlertOutcome {
        if village.incoming_threat_count().is_none() {
            tracing::warn!(
                target: "village_bot::threat",
                village = %village.name(),
                "threat.unknown=no_defense_snapshot"
            );
            return AlertOutcome::Unknown;
        }

        let threat_count = match check(village) {
            AlertDecision::None => {
                tracing::info!(
                    target: "village_bot::threat",
                    village = %village.name(),
                    "threat.clear"
                );
                return AlertOutcome::Clear;
            }
            AlertDecision::Raise { threat_count } => threat_count,
        };

        tracing::warn!(
            target: "village_bot::threat",
            village = %village.name(),
            threat_count,
            "threat.under_attack"
        );
        if self.auto_evade {
            tracing::info!(
                target: "village_bot::threat",
                village = %village.name(),
                "threat.evade_skipped=reserved"
            );
        }

        let alert = Alert::under_attack(village.name(), threat_count);
        match notifier.send(&alert) {
            Ok(()) => {
                tracing::info!(
                    target: "village_bot::threat",
                    village = %village.name(),
                    "threat.alert_sent"
                );
                AlertOutcome::Sent { threat_count }
            }
            Err(err) => {
                tracing::warn!(
                    target: "village_bot::threat",
                    village = %village.name(),
                    error = %err,
                    "threat.alert_failed"
                );
                AlertOutcome::DeliveryFailed { threat_count }
            }
        }
    }
}
