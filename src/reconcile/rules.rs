//! Observed-set derivation from security group ingress rules

use crate::error::ReconcileError;
use crate::provider::CloudProvider;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Derive the observed ingress set for `security_group_id`.
///
/// The reconciler manages exactly one rule entry, so only the first
/// entry's CIDR ranges are observed; pre-existing extra entries are left
/// alone and never merged in. A group with no ingress rules yields an
/// empty set.
pub async fn observed_ips<P: CloudProvider>(
    provider: &P,
    security_group_id: &str,
) -> Result<BTreeSet<String>, ReconcileError> {
    let entries = provider
        .ingress_rules(security_group_id)
        .await
        .map_err(|source| ReconcileError::GroupLookup {
            group: security_group_id.to_string(),
            source,
        })?;

    if let Some(entry) = entries.first() {
        debug!(
            sg_id = %security_group_id,
            from_port = ?entry.from_port,
            to_port = ?entry.to_port,
            entries = entries.len(),
            "Reading first ingress rule entry"
        );
    }

    let observed: BTreeSet<String> = entries
        .first()
        .map(|entry| entry.cidr_ips.iter().cloned().collect())
        .unwrap_or_default();

    info!(sg_id = %security_group_id, ips = ?observed, "Computed observed ingress set");

    Ok(observed)
}
