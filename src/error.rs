//! Reconciliation error taxonomy

use thiserror::Error;

/// Errors surfaced by a reconciliation pass.
///
/// Every variant is fatal for the current invocation except `Acknowledge`,
/// which the orchestrator logs and drops. A fatal error may leave the
/// security group partially converged; the next invocation re-reads ground
/// truth and heals it.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The autoscaling group does not exist (distinct from a group with
    /// zero in-service instances, which is a valid drain state)
    #[error("autoscaling group '{name}' not found")]
    GroupNotFound { name: String },

    /// Describing the autoscaling group or the security group failed
    #[error("failed to look up group '{group}'")]
    GroupLookup {
        group: String,
        #[source]
        source: anyhow::Error,
    },

    /// Describing a group member instance failed
    #[error("failed to look up instance '{instance_id}'")]
    InstanceLookup {
        instance_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// An authorize or revoke call failed
    #[error("failed to {action} ingress rules on '{group_id}'")]
    Convergence {
        group_id: String,
        action: ConvergeAction,
        #[source]
        source: anyhow::Error,
    },

    /// Completing the lifecycle action failed; the hook will time out into
    /// its configured default action
    #[error("failed to complete lifecycle action")]
    Acknowledge {
        #[source]
        source: anyhow::Error,
    },

    /// Scheduled invocation without a group name from either the event or
    /// the `asgName` option
    #[error("no autoscaling group name: the event carries none and asgName is not set")]
    MissingGroupName,
}

/// Which half of convergence failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergeAction {
    Authorize,
    Revoke,
}

impl std::fmt::Display for ConvergeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConvergeAction::Authorize => write!(f, "authorize"),
            ConvergeAction::Revoke => write!(f, "revoke"),
        }
    }
}
