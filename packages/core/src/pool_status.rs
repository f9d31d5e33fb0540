//! Lifecycle status of a pool instance.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Status a pool instance publishes in the status registry.
///
/// ```text
/// ACTIVE --> DEAD --> KILL --> TERMINATED
///    |         |                   ^
///    +---------+-------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    /// Accepting and running jobs.
    Active,
    /// Draining: no new jobs, running children finish.
    Dead,
    /// Children are force-killed.
    Kill,
    /// Exited.
    Terminated,
}

impl PoolStatus {
    pub const ALL: [PoolStatus; 4] = [
        PoolStatus::Active,
        PoolStatus::Dead,
        PoolStatus::Kill,
        PoolStatus::Terminated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStatus::Active => "active",
            PoolStatus::Dead => "dead",
            PoolStatus::Kill => "kill",
            PoolStatus::Terminated => "terminated",
        }
    }

    /// Check whether an operator may move a pool from this status to `next`.
    ///
    /// Writing the current status again is always allowed.
    pub fn can_transition_to(&self, next: PoolStatus) -> bool {
        *self == next
            || matches!(
                (self, next),
                (PoolStatus::Active, PoolStatus::Dead | PoolStatus::Terminated)
                    | (PoolStatus::Dead, PoolStatus::Kill | PoolStatus::Terminated)
                    | (PoolStatus::Kill, PoolStatus::Terminated)
            )
    }
}

impl std::fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PoolStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::InvalidPoolStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        use PoolStatus::*;
        assert!(Active.can_transition_to(Dead));
        assert!(Active.can_transition_to(Terminated));
        assert!(Dead.can_transition_to(Kill));
        assert!(Kill.can_transition_to(Terminated));
        assert!(Dead.can_transition_to(Dead));

        assert!(!Active.can_transition_to(Kill));
        assert!(!Terminated.can_transition_to(Active));
        assert!(!Kill.can_transition_to(Dead));
    }

    #[test]
    fn parses_only_known_statuses() {
        assert_eq!("kill".parse::<PoolStatus>().unwrap(), PoolStatus::Kill);
        assert!(matches!(
            "zombie".parse::<PoolStatus>(),
            Err(CoreError::InvalidPoolStatus(_))
        ));
    }
}
