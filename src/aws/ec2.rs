//! EC2 instance and security group access

use crate::aws::context::AwsContext;
use crate::aws::error::{ignore_already_exists, ignore_not_found};
use crate::config::PortRange;
use crate::provider::{IngressRule, InstanceSnapshot, PowerState};
use anyhow::{Context, Result};
use aws_sdk_ec2::Client;
use aws_sdk_ec2::types::{InstanceStateName, IpPermission, IpRange};
use tracing::{debug, info, warn};

/// EC2 client for instance describes and ingress rule management
pub struct Ec2Client {
    client: Client,
}

impl Ec2Client {
    /// Create a new EC2 client (loads AWS config from environment)
    pub async fn new(region: Option<&str>) -> Self {
        let ctx = AwsContext::new(region).await;
        Self::from_context(&ctx)
    }

    /// Create an EC2 client from a pre-loaded AWS context
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ec2_client(),
        }
    }

    /// Describe one instance's public address and power state.
    pub async fn instance_snapshot(&self, instance_id: &str) -> Result<InstanceSnapshot> {
        let response = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .context("Failed to describe instance")?;

        let instance = response
            .reservations()
            .first()
            .and_then(|r| r.instances().first())
            .context("Instance not present in describe response")?;

        let state = power_state(instance.state().and_then(|s| s.name()));
        let public_ip = instance.public_ip_address().map(|s| s.to_string());

        debug!(
            instance_id = %instance_id,
            state = ?state,
            public_ip = ?public_ip,
            "Described instance"
        );

        Ok(InstanceSnapshot {
            instance_id: instance_id.to_string(),
            public_ip,
            state,
        })
    }

    /// Read a security group's ingress rule entries with their CIDR ranges.
    pub async fn ingress_rules(&self, security_group_id: &str) -> Result<Vec<IngressRule>> {
        let response = self
            .client
            .describe_security_groups()
            .group_ids(security_group_id)
            .send()
            .await
            .context("Failed to describe security group")?;

        let group = response
            .security_groups()
            .first()
            .context("Security group not present in describe response")?;

        let rules: Vec<IngressRule> = group
            .ip_permissions()
            .iter()
            .map(|permission| IngressRule {
                from_port: permission.from_port(),
                to_port: permission.to_port(),
                cidr_ips: permission
                    .ip_ranges()
                    .iter()
                    .filter_map(|range| range.cidr_ip())
                    .map(str::to_string)
                    .collect(),
            })
            .collect();

        debug!(
            sg_id = %security_group_id,
            entries = rules.len(),
            "Described security group ingress"
        );

        Ok(rules)
    }

    /// Authorize one ingress rule entry covering every given CIDR.
    ///
    /// A duplicate-rule rejection means another pass already authorized the
    /// entry; the group holds the target state either way, so it is not an
    /// error.
    pub async fn authorize_ingress(
        &self,
        security_group_id: &str,
        ports: PortRange,
        cidr_ips: &[String],
    ) -> Result<()> {
        info!(
            sg_id = %security_group_id,
            from_port = ports.from,
            to_port = ports.to,
            ips = ?cidr_ips,
            "Authorizing ingress CIDRs"
        );

        let result = self
            .client
            .authorize_security_group_ingress()
            .group_id(security_group_id)
            .ip_permissions(ingress_permission(ports, cidr_ips))
            .send()
            .await;

        match ignore_already_exists(result).context("Failed to authorize ingress rules")? {
            Some(_) => debug!(sg_id = %security_group_id, "Ingress rules authorized"),
            None => warn!(
                sg_id = %security_group_id,
                "Ingress rules already present, likely written by a concurrent pass"
            ),
        }
        Ok(())
    }

    /// Revoke one ingress rule entry covering every given CIDR.
    ///
    /// A not-found rejection means the entry is already gone, which is the
    /// target state; it is not an error.
    pub async fn revoke_ingress(
        &self,
        security_group_id: &str,
        ports: PortRange,
        cidr_ips: &[String],
    ) -> Result<()> {
        info!(
            sg_id = %security_group_id,
            from_port = ports.from,
            to_port = ports.to,
            ips = ?cidr_ips,
            "Revoking ingress CIDRs"
        );

        let result = self
            .client
            .revoke_security_group_ingress()
            .group_id(security_group_id)
            .ip_permissions(ingress_permission(ports, cidr_ips))
            .send()
            .await;

        match ignore_not_found(result).context("Failed to revoke ingress rules")? {
            Some(_) => debug!(sg_id = %security_group_id, "Ingress rules revoked"),
            None => warn!(
                sg_id = %security_group_id,
                "Ingress rules already absent, likely removed by a concurrent pass"
            ),
        }
        Ok(())
    }
}

/// Build the single batched permission entry for a set of CIDRs.
fn ingress_permission(ports: PortRange, cidr_ips: &[String]) -> IpPermission {
    let mut builder = IpPermission::builder()
        .ip_protocol("tcp")
        .from_port(ports.from)
        .to_port(ports.to);
    for cidr in cidr_ips {
        builder = builder.ip_ranges(IpRange::builder().cidr_ip(cidr).build());
    }
    builder.build()
}

/// Map the SDK state name to a power state; no state info reads as
/// still-pending.
fn power_state(name: Option<&InstanceStateName>) -> PowerState {
    match name.unwrap_or(&InstanceStateName::Pending) {
        InstanceStateName::Running => PowerState::Running,
        InstanceStateName::ShuttingDown => PowerState::ShuttingDown,
        InstanceStateName::Stopping => PowerState::Stopping,
        InstanceStateName::Stopped => PowerState::Stopped,
        InstanceStateName::Terminated => PowerState::Terminated,
        _ => PowerState::Pending,
    }
}
