//! Instance lifecycle status and state machine.
//!
//! Defines the possible states of an instance and valid transitions between them.

use crate::errors::{RootboxError, RootboxResult};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an instance.
///
/// State machine:
/// ```text
/// create()  → Creating (descriptor persisted, artifacts rendered)
/// build()   → Building (image build in flight, never persisted)
/// start()   → Running  (container up, or local process in degraded mode)
/// stop()    → Stopped  (composition down, or local process terminated)
/// failure   → Error    (even the degraded path could not start)
/// ```
///
/// `Running → Running` is a restart. Liveness reconciliation may move any
/// status to `Running` or `Stopped` without going through the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Creating,
    Building,
    Running,
    Stopped,
    Error,
}

impl InstanceStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, InstanceStatus::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, InstanceStatus::Stopped)
    }

    /// Check if transition to target state is valid.
    pub fn can_transition_to(&self, target: InstanceStatus) -> bool {
        use InstanceStatus::*;
        matches!(
            (self, target),
            (Creating, Building) |
            (Creating, Error) |
            (Building, Running) |
            (Building, Error) |
            // Restart keeps the instance Running
            (Running, Running) |
            (Running, Stopped) |
            (Running, Error) |
            (Stopped, Running) |
            (Stopped, Error) |
            // Retrying a failed instance
            (Error, Running) |
            (Error, Stopped)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Creating => "CREATING",
            InstanceStatus::Building => "BUILDING",
            InstanceStatus::Running => "RUNNING",
            InstanceStatus::Stopped => "STOPPED",
            InstanceStatus::Error => "ERROR",
        }
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATING" => Ok(InstanceStatus::Creating),
            "BUILDING" => Ok(InstanceStatus::Building),
            "RUNNING" => Ok(InstanceStatus::Running),
            "STOPPED" => Ok(InstanceStatus::Stopped),
            "ERROR" => Ok(InstanceStatus::Error),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validate a transition, returning the new status.
pub(crate) fn checked_transition(
    current: InstanceStatus,
    target: InstanceStatus,
) -> RootboxResult<InstanceStatus> {
    if !current.can_transition_to(target) {
        return Err(RootboxError::InvalidState(format!(
            "Cannot transition from {} to {}",
            current, target
        )));
    }
    Ok(target)
}

/// Status implied by a liveness probe, given the persisted status.
///
/// The probe is authoritative: a live instance is Running, a dead one that
/// claimed to run (or was still being created) is Stopped. A dead instance
/// in Error keeps its Error status so the failure stays visible.
pub fn reconciled_status(persisted: InstanceStatus, live: bool) -> InstanceStatus {
    if live {
        return InstanceStatus::Running;
    }
    match persisted {
        InstanceStatus::Error => InstanceStatus::Error,
        _ => InstanceStatus::Stopped,
    }
}
