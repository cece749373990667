use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Concentration,
    VarLimit,
    SectorExposure,
    Drawdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    /// Only critical alerts block sizing.
    pub fn is_hard(&self) -> bool {
        matches!(self, AlertSeverity::Critical)
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Medium => write!(f, "medium"),
            AlertSeverity::High => write!(f, "high"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    /// What the alert is about: a sector name, or `portfolio`.
    pub subject: String,
    pub value: f64,
    pub limit: f64,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl RiskAlert {
    pub fn new(
        kind: AlertKind,
        severity: AlertSeverity,
        subject: impl Into<String>,
        value: f64,
        limit: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            subject: subject.into(),
            value,
            limit,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }
}

/// Active alerts, one per (kind, subject).
///
/// Re-raising an active alert refreshes its value and keeps its id and time. An alert
/// whose condition is no longer present at the next evaluation is resolved.
#[derive(Debug, Default)]
pub struct AlertStore {
    active: Mutex<BTreeMap<(AlertKind, String), RiskAlert>>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(AlertKind, String), RiskAlert>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the active set with the outcome of one evaluation. Returns newly raised alerts.
    pub fn reconcile(&self, current: Vec<RiskAlert>) -> Vec<RiskAlert> {
        let mut active = self.lock();
        let mut next = BTreeMap::new();
        let mut raised = Vec::new();
        for alert in current {
            let key = (alert.kind, alert.subject.clone());
            let kept = match active.remove(&key) {
                Some(existing) => RiskAlert {
                    id: existing.id,
                    raised_at: existing.raised_at,
                    ..alert
                },
                None => {
                    raised.push(alert.clone());
                    alert
                }
            };
            next.insert(key, kept);
        }
        *active = next;
        raised
    }

    pub fn active(&self) -> Vec<RiskAlert> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) -> usize {
        let mut active = self.lock();
        let n = active.len();
        active.clear();
        n
    }
}
