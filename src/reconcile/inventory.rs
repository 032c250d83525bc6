//! Desired-set derivation from autoscaling group membership

use crate::error::ReconcileError;
use crate::provider::CloudProvider;
use futures::future::try_join_all;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Derive the desired ingress set for `group_name`.
///
/// Every member that is not draining, not the excluded instance, and has a
/// public address contributes `{ip}/32`. A group that exists with zero
/// members yields an empty set, which downstream turns into a full revoke;
/// a group that does not exist at all is an error.
pub async fn desired_ips<P: CloudProvider>(
    provider: &P,
    group_name: &str,
    excluded: Option<&str>,
) -> Result<BTreeSet<String>, ReconcileError> {
    let instance_ids = provider
        .group_instance_ids(group_name)
        .await
        .map_err(|source| ReconcileError::GroupLookup {
            group: group_name.to_string(),
            source,
        })?
        .ok_or_else(|| ReconcileError::GroupNotFound {
            name: group_name.to_string(),
        })?;

    // Member describes are independent; issue them concurrently. The first
    // failure aborts the whole read so a partial set never reaches the diff.
    let snapshots = try_join_all(instance_ids.iter().map(|instance_id| async move {
        provider
            .instance_snapshot(instance_id)
            .await
            .map_err(|source| ReconcileError::InstanceLookup {
                instance_id: instance_id.clone(),
                source,
            })
    }))
    .await?;

    let mut desired = BTreeSet::new();
    for snapshot in snapshots {
        if snapshot.state.is_draining() {
            debug!(
                instance_id = %snapshot.instance_id,
                state = ?snapshot.state,
                "Skipping draining instance"
            );
            continue;
        }
        if excluded == Some(snapshot.instance_id.as_str()) {
            debug!(instance_id = %snapshot.instance_id, "Skipping the event's own instance");
            continue;
        }
        let Some(ip) = snapshot.public_ip.as_deref().filter(|ip| !ip.is_empty()) else {
            debug!(
                instance_id = %snapshot.instance_id,
                "Skipping instance without a public address"
            );
            continue;
        };
        desired.insert(format!("{ip}/32"));
    }

    info!(group = %group_name, ips = ?desired, "Computed desired ingress set");

    Ok(desired)
}
