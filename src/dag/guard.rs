// src/dag/guard.rs

//! Readiness policies evaluated against predecessor (or ancestor) statuses.
//!
//! Guards are pure: the engine collects the relevant statuses under the job
//! lock and asks the guard what to do with the node.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::TaskStatus;

/// Result of evaluating a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// The node may be queued.
    Ready,
    /// Some relevant node is not terminal yet.
    Wait,
    /// The node can never run successfully; mark it skipped.
    Skip,
}

/// Which nodes' statuses a guard looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardScope {
    DirectPredecessors,
    AllAncestors,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskGuard {
    /// Once every predecessor is terminal: ready if all passed, skipped
    /// otherwise.
    #[default]
    AllPredecessorsSucceeded,
    /// Ready when every predecessor is terminal, whatever the outcome.
    AllPredecessorsCompleted,
    /// Like `AllPredecessorsSucceeded`, over every transitive ancestor.
    AllAncestorsSucceeded,
}

impl TaskGuard {
    pub fn scope(self) -> GuardScope {
        match self {
            TaskGuard::AllAncestorsSucceeded => GuardScope::AllAncestors,
            _ => GuardScope::DirectPredecessors,
        }
    }

    pub fn evaluate(self, statuses: &[TaskStatus]) -> GuardOutcome {
        match self {
            TaskGuard::AllPredecessorsSucceeded | TaskGuard::AllAncestorsSucceeded => {
                all_succeeded(statuses)
            }
            TaskGuard::AllPredecessorsCompleted => {
                if statuses.iter().all(|s| s.is_terminal()) {
                    GuardOutcome::Ready
                } else {
                    GuardOutcome::Wait
                }
            }
        }
    }
}

fn all_succeeded(statuses: &[TaskStatus]) -> GuardOutcome {
    // No decision until everything relevant has settled.
    if !statuses.iter().all(|s| s.is_terminal()) {
        return GuardOutcome::Wait;
    }
    if statuses.iter().all(|s| *s == TaskStatus::Passed) {
        GuardOutcome::Ready
    } else {
        GuardOutcome::Skip
    }
}

impl fmt::Display for TaskGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskGuard::AllPredecessorsSucceeded => "all_predecessors_succeeded",
            TaskGuard::AllPredecessorsCompleted => "all_predecessors_completed",
            TaskGuard::AllAncestorsSucceeded => "all_ancestors_succeeded",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskGuard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "all_predecessors_succeeded" => Ok(TaskGuard::AllPredecessorsSucceeded),
            "all_predecessors_completed" => Ok(TaskGuard::AllPredecessorsCompleted),
            "all_ancestors_succeeded" => Ok(TaskGuard::AllAncestorsSucceeded),
            other => Err(format!("unknown task guard: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TaskStatus::*;

    #[test]
    fn succeeded_guard_waits_then_readies() {
        let g = TaskGuard::AllPredecessorsSucceeded;
        assert_eq!(g.evaluate(&[Passed, Running]), GuardOutcome::Wait);
        assert_eq!(g.evaluate(&[Passed, Passed]), GuardOutcome::Ready);
    }

    #[test]
    fn succeeded_guard_skips_only_once_settled() {
        let g = TaskGuard::AllPredecessorsSucceeded;
        assert_eq!(g.evaluate(&[Failed, Running]), GuardOutcome::Wait);
        assert_eq!(g.evaluate(&[Failed, Queued]), GuardOutcome::Wait);
        assert_eq!(g.evaluate(&[Failed, Passed]), GuardOutcome::Skip);
        assert_eq!(g.evaluate(&[Skipped]), GuardOutcome::Skip);
    }

    #[test]
    fn ancestor_guard_waits_for_every_ancestor() {
        let g = TaskGuard::AllAncestorsSucceeded;
        assert_eq!(g.evaluate(&[Failed, Pending, Passed]), GuardOutcome::Wait);
        assert_eq!(g.evaluate(&[Failed, Skipped, Passed]), GuardOutcome::Skip);
    }

    #[test]
    fn completed_guard_never_skips() {
        let g = TaskGuard::AllPredecessorsCompleted;
        assert_eq!(g.evaluate(&[Failed, Skipped, Passed]), GuardOutcome::Ready);
        assert_eq!(g.evaluate(&[Failed, Pending]), GuardOutcome::Wait);
    }

    #[test]
    fn empty_status_list_is_ready() {
        for g in [
            TaskGuard::AllPredecessorsSucceeded,
            TaskGuard::AllPredecessorsCompleted,
            TaskGuard::AllAncestorsSucceeded,
        ] {
            assert_eq!(g.evaluate(&[]), GuardOutcome::Ready);
        }
    }

    #[test]
    fn ancestor_guard_uses_ancestor_scope() {
        assert_eq!(
            TaskGuard::AllAncestorsSucceeded.scope(),
            GuardScope::AllAncestors
        );
        assert_eq!(TaskGuard::default().scope(), GuardScope::DirectPredecessors);
    }

    #[test]
    fn parses_config_spelling() {
        assert_eq!(
            "all-predecessors-completed".parse::<TaskGuard>(),
            Ok(TaskGuard::AllPredecessorsCompleted)
        );
        assert!("whenever".parse::<TaskGuard>().is_err());
    }
}
