//! Cloud capability surface
//!
//! The reconciliation pipeline only ever talks to this narrow trait. The
//! production implementation delegates to the AWS service clients; unit
//! tests drive the pipeline with a mockall mock instead.

use crate::aws::autoscaling::AutoscalingClient;
use crate::aws::context::AwsContext;
use crate::aws::ec2::Ec2Client;
use crate::config::PortRange;
use anyhow::Result;

/// EC2 power state of an instance, as of the most recent describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Pending,
    Running,
    ShuttingDown,
    Stopping,
    Stopped,
    Terminated,
}

impl PowerState {
    /// True while the instance is on its way out and must not hold an
    /// ingress rule.
    pub fn is_draining(&self) -> bool {
        matches!(self, PowerState::ShuttingDown | PowerState::Terminated)
    }
}

/// Point-in-time view of a group member instance.
#[derive(Debug, Clone)]
pub struct InstanceSnapshot {
    pub instance_id: String,
    pub public_ip: Option<String>,
    pub state: PowerState,
}

/// One ingress rule entry of a security group.
#[derive(Debug, Clone, Default)]
pub struct IngressRule {
    pub from_port: Option<i32>,
    pub to_port: Option<i32>,
    pub cidr_ips: Vec<String>,
}

/// Parameters identifying the lifecycle action to complete.
#[derive(Debug, Clone)]
pub struct LifecycleAck {
    pub group_name: String,
    pub hook_name: String,
    pub action_token: String,
    pub instance_id: String,
}

/// Result reported back to the lifecycle hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    Continue,
    Abandon,
}

impl LifecycleOutcome {
    /// Wire value expected by CompleteLifecycleAction.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleOutcome::Continue => "CONTINUE",
            LifecycleOutcome::Abandon => "ABANDON",
        }
    }
}

impl std::fmt::Display for LifecycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for the cloud operations the reconciler needs, mockable in tests.
///
/// Note: CIDR lists and ack parameters are passed by value to work around
/// mockall lifetime limitations with borrowed composite parameters.
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait CloudProvider: Send + Sync {
    /// List the instance ids of an autoscaling group. `None` means the
    /// group does not exist; `Some(vec![])` is a valid zero-member state.
    async fn group_instance_ids(&self, group_name: &str) -> Result<Option<Vec<String>>>;

    /// Describe one instance's public address and power state
    async fn instance_snapshot(&self, instance_id: &str) -> Result<InstanceSnapshot>;

    /// Read a security group's ingress rule entries
    async fn ingress_rules(&self, security_group_id: &str) -> Result<Vec<IngressRule>>;

    /// Authorize one batched ingress entry covering all given CIDRs
    async fn authorize_ingress(
        &self,
        security_group_id: &str,
        ports: PortRange,
        cidr_ips: Vec<String>,
    ) -> Result<()>;

    /// Revoke one batched ingress entry covering all given CIDRs
    async fn revoke_ingress(
        &self,
        security_group_id: &str,
        ports: PortRange,
        cidr_ips: Vec<String>,
    ) -> Result<()>;

    /// Report the lifecycle action outcome back to the hook
    async fn complete_lifecycle_action(
        &self,
        ack: LifecycleAck,
        outcome: LifecycleOutcome,
    ) -> Result<()>;
}

/// Production provider over the AWS service clients.
pub struct AwsProvider {
    ec2: Ec2Client,
    autoscaling: AutoscalingClient,
}

impl AwsProvider {
    /// Create both service clients from a pre-loaded AWS context.
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            ec2: Ec2Client::from_context(ctx),
            autoscaling: AutoscalingClient::from_context(ctx),
        }
    }
}

impl CloudProvider for AwsProvider {
    async fn group_instance_ids(&self, group_name: &str) -> Result<Option<Vec<String>>> {
        self.autoscaling.group_instance_ids(group_name).await
    }

    async fn instance_snapshot(&self, instance_id: &str) -> Result<InstanceSnapshot> {
        self.ec2.instance_snapshot(instance_id).await
    }

    async fn ingress_rules(&self, security_group_id: &str) -> Result<Vec<IngressRule>> {
        self.ec2.ingress_rules(security_group_id).await
    }

    async fn authorize_ingress(
        &self,
        security_group_id: &str,
        ports: PortRange,
        cidr_ips: Vec<String>,
    ) -> Result<()> {
        self.ec2
            .authorize_ingress(security_group_id, ports, &cidr_ips)
            .await
    }

    async fn revoke_ingress(
        &self,
        security_group_id: &str,
        ports: PortRange,
        cidr_ips: Vec<String>,
    ) -> Result<()> {
        self.ec2
            .revoke_ingress(security_group_id, ports, &cidr_ips)
            .await
    }

    async fn complete_lifecycle_action(
        &self,
        ack: LifecycleAck,
        outcome: LifecycleOutcome,
    ) -> Result<()> {
        self.autoscaling
            .complete_lifecycle_action(&ack, outcome)
            .await
    }
}
