//! Auto Scaling group access

use crate::aws::context::AwsContext;
use crate::provider::{LifecycleAck, LifecycleOutcome};
use anyhow::{Context, Result};
use aws_sdk_autoscaling::Client;
use tracing::{debug, info};

/// Auto Scaling client for group membership and lifecycle actions
pub struct AutoscalingClient {
    client: Client,
}

impl AutoscalingClient {
    /// Create a new Auto Scaling client (loads AWS config from environment)
    pub async fn new(region: Option<&str>) -> Self {
        let ctx = AwsContext::new(region).await;
        Self::from_context(&ctx)
    }

    /// Create an Auto Scaling client from a pre-loaded AWS context
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.autoscaling_client(),
        }
    }

    /// List the instance ids attached to a group.
    ///
    /// Returns `None` when the group does not exist (the describe API
    /// reports an unknown name as an empty listing, not an error) and
    /// `Some(vec![])` when the group exists with zero members, which is a
    /// valid drained state.
    pub async fn group_instance_ids(&self, group_name: &str) -> Result<Option<Vec<String>>> {
        let response = self
            .client
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(group_name)
            .send()
            .await
            .context("Failed to describe autoscaling group")?;

        let Some(group) = response.auto_scaling_groups().first() else {
            debug!(group = %group_name, "Autoscaling group not found");
            return Ok(None);
        };

        let instance_ids: Vec<String> = group
            .instances()
            .iter()
            .filter_map(|instance| instance.instance_id())
            .map(str::to_string)
            .collect();

        debug!(
            group = %group_name,
            members = instance_ids.len(),
            "Listed autoscaling group members"
        );

        Ok(Some(instance_ids))
    }

    /// Report the lifecycle action outcome back to the hook.
    pub async fn complete_lifecycle_action(
        &self,
        ack: &LifecycleAck,
        outcome: LifecycleOutcome,
    ) -> Result<()> {
        info!(
            group = %ack.group_name,
            hook = %ack.hook_name,
            instance_id = %ack.instance_id,
            outcome = %outcome,
            "Completing lifecycle action"
        );

        self.client
            .complete_lifecycle_action()
            .auto_scaling_group_name(&ack.group_name)
            .lifecycle_hook_name(&ack.hook_name)
            .lifecycle_action_token(&ack.action_token)
            .instance_id(&ack.instance_id)
            .lifecycle_action_result(outcome.as_str())
            .send()
            .await
            .context("Failed to complete lifecycle action")?;

        Ok(())
    }
}
