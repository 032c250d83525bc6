//! Minimal mutation application

use super::diff::RuleDiff;
use crate::config::PortRange;
use crate::error::{ConvergeAction, ReconcileError};
use crate::provider::CloudProvider;
use tracing::info;

/// Apply `diff` to the security group: at most one batched authorize call
/// and at most one batched revoke call. Empty halves are skipped entirely;
/// the provider rejects empty CIDR lists, and a no-op pass must not fail.
///
/// A failed authorize still aborts before the revoke, leaving the group
/// partially converged until the next pass re-reads ground truth.
pub async fn apply<P: CloudProvider>(
    provider: &P,
    security_group_id: &str,
    ports: PortRange,
    diff: &RuleDiff,
) -> Result<(), ReconcileError> {
    if diff.is_empty() {
        info!(sg_id = %security_group_id, "Ingress rules already converged");
        return Ok(());
    }

    if !diff.to_add.is_empty() {
        provider
            .authorize_ingress(
                security_group_id,
                ports,
                diff.to_add.iter().cloned().collect(),
            )
            .await
            .map_err(|source| ReconcileError::Convergence {
                group_id: security_group_id.to_string(),
                action: ConvergeAction::Authorize,
                source,
            })?;
    }

    if !diff.to_remove.is_empty() {
        provider
            .revoke_ingress(
                security_group_id,
                ports,
                diff.to_remove.iter().cloned().collect(),
            )
            .await
            .map_err(|source| ReconcileError::Convergence {
                group_id: security_group_id.to_string(),
                action: ConvergeAction::Revoke,
                source,
            })?;
    }

    Ok(())
}
