//! Reconciliation pipeline
//!
//! One pass per trigger event: read the desired set from live group
//! membership, read the observed set from the security group, diff, apply
//! the minimal mutations, then complete the lifecycle action that fired the
//! hook. No state survives a pass; a failed or raced pass is healed by the
//! next one re-reading ground truth.

pub mod converge;
pub mod diff;
pub mod inventory;
pub mod rules;

use crate::config::{ReconcilerConfig, SelfExclusion};
use crate::error::ReconcileError;
use crate::event::{LifecycleTransition, TriggerEvent};
use crate::provider::{CloudProvider, LifecycleAck, LifecycleOutcome};
use serde::Serialize;
use tracing::{info, warn};

/// Invocation result: the rule entries added and removed this pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileResponse {
    pub added_ips: Vec<String>,
    pub removed_ips: Vec<String>,
}

/// Run one reconciliation pass and complete the triggering lifecycle
/// action: CONTINUE after convergence (including a no-op), ABANDON after
/// any fatal error. Scheduled events carry no hook and get no
/// acknowledgement.
pub async fn reconcile<P: CloudProvider>(
    provider: &P,
    config: &ReconcilerConfig,
    event: &TriggerEvent,
) -> Result<ReconcileResponse, ReconcileError> {
    let ack = lifecycle_ack(event);

    match run(provider, config, event).await {
        Ok(response) => {
            acknowledge(provider, ack.as_ref(), LifecycleOutcome::Continue).await;
            Ok(response)
        }
        Err(err) => {
            acknowledge(provider, ack.as_ref(), LifecycleOutcome::Abandon).await;
            Err(err)
        }
    }
}

async fn run<P: CloudProvider>(
    provider: &P,
    config: &ReconcilerConfig,
    event: &TriggerEvent,
) -> Result<ReconcileResponse, ReconcileError> {
    let group_name = event
        .group_name()
        .or_else(|| config.asg_name.as_deref())
        .ok_or(ReconcileError::MissingGroupName)?;
    let excluded = excluded_instance(config.self_exclusion, event);

    info!(
        group = %group_name,
        sg_id = %config.security_group_id,
        excluded = ?excluded,
        "Starting reconciliation"
    );

    let desired = inventory::desired_ips(provider, group_name, excluded).await?;
    let observed = rules::observed_ips(provider, &config.security_group_id).await?;

    let diff = diff::diff(&desired, &observed);
    info!(to_add = ?diff.to_add, to_remove = ?diff.to_remove, "Computed rule diff");

    converge::apply(provider, &config.security_group_id, config.port_range, &diff).await?;

    Ok(ReconcileResponse {
        added_ips: diff.to_add.into_iter().collect(),
        removed_ips: diff.to_remove.into_iter().collect(),
    })
}

/// The event instance to drop from the desired set, per policy.
///
/// A terminating member can still be listed as in-service with a live
/// public address when its hook fires, so waiting for the power state to
/// flip would briefly re-authorize an address that is about to disappear.
fn excluded_instance(policy: SelfExclusion, event: &TriggerEvent) -> Option<&str> {
    let detail = &event.lifecycle()?.detail;
    let exclude = match policy {
        SelfExclusion::Always => true,
        SelfExclusion::OnTerminating => {
            detail.transition() == Some(LifecycleTransition::Terminating)
        }
    };
    exclude.then_some(detail.ec2_instance_id.as_str())
}

/// Acknowledgement parameters for lifecycle-mode events.
fn lifecycle_ack(event: &TriggerEvent) -> Option<LifecycleAck> {
    let detail = &event.lifecycle()?.detail;
    Some(LifecycleAck {
        group_name: detail.auto_scaling_group_name.clone(),
        hook_name: detail.lifecycle_hook_name.clone(),
        action_token: detail.lifecycle_action_token.clone(),
        instance_id: detail.ec2_instance_id.clone(),
    })
}

/// Best-effort lifecycle completion. An unacknowledged hook times out into
/// its configured default action, so a failure here is logged and dropped
/// rather than allowed to mask the convergence outcome.
async fn acknowledge<P: CloudProvider>(
    provider: &P,
    ack: Option<&LifecycleAck>,
    outcome: LifecycleOutcome,
) {
    let Some(ack) = ack else { return };

    if let Err(source) = provider.complete_lifecycle_action(ack.clone(), outcome).await {
        let err = ReconcileError::Acknowledge { source };
        warn!(
            error = ?err,
            instance_id = %ack.instance_id,
            hook = %ack.hook_name,
            "Lifecycle acknowledgement failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortRange;
    use crate::event::{
        LifecycleDetail, LifecycleEvent, ScheduledEvent, TRANSITION_LAUNCHING,
        TRANSITION_TERMINATING,
    };
    use crate::provider::{InstanceSnapshot, MockCloudProvider, PowerState};
    use mockall::predicate::eq;

    fn lifecycle_event(transition: &str, instance_id: &str) -> TriggerEvent {
        TriggerEvent::Lifecycle(LifecycleEvent {
            version: None,
            id: None,
            detail_type: None,
            source: None,
            account: None,
            time: None,
            region: Some("us-east-2".to_string()),
            resources: vec![],
            detail: LifecycleDetail {
                lifecycle_hook_name: "drain-hook".to_string(),
                auto_scaling_group_name: "web-asg".to_string(),
                lifecycle_action_token: "token-1".to_string(),
                lifecycle_transition: Some(transition.to_string()),
                ec2_instance_id: instance_id.to_string(),
            },
        })
    }

    fn scheduled_event() -> TriggerEvent {
        TriggerEvent::Scheduled(ScheduledEvent::default())
    }

    fn config() -> ReconcilerConfig {
        ReconcilerConfig::new("sg-123")
    }

    fn snapshot(instance_id: &str, public_ip: Option<&str>, state: PowerState) -> InstanceSnapshot {
        InstanceSnapshot {
            instance_id: instance_id.to_string(),
            public_ip: public_ip.map(str::to_string),
            state,
        }
    }

    fn rule_entry(cidrs: &[&str]) -> crate::provider::IngressRule {
        crate::provider::IngressRule {
            from_port: Some(0),
            to_port: Some(65535),
            cidr_ips: cidrs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn launch_event_converges_and_continues() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_group_instance_ids()
            .with(eq("web-asg"))
            .returning(|_| Ok(Some(vec!["i-old".to_string(), "i-new".to_string()])));
        provider
            .expect_instance_snapshot()
            .with(eq("i-old"))
            .returning(|_| Ok(snapshot("i-old", Some("5.6.7.8"), PowerState::Running)));
        provider
            .expect_instance_snapshot()
            .with(eq("i-new"))
            .returning(|_| Ok(snapshot("i-new", Some("9.9.9.9"), PowerState::Running)));
        provider
            .expect_ingress_rules()
            .with(eq("sg-123"))
            .returning(|_| Ok(vec![rule_entry(&["1.2.3.4/32", "5.6.7.8/32"])]));
        provider
            .expect_authorize_ingress()
            .with(
                eq("sg-123"),
                eq(PortRange::default()),
                eq(vec!["9.9.9.9/32".to_string()]),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));
        provider
            .expect_revoke_ingress()
            .with(
                eq("sg-123"),
                eq(PortRange::default()),
                eq(vec!["1.2.3.4/32".to_string()]),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));
        provider
            .expect_complete_lifecycle_action()
            .withf(|ack, outcome| {
                ack.instance_id == "i-new"
                    && ack.hook_name == "drain-hook"
                    && ack.action_token == "token-1"
                    && *outcome == LifecycleOutcome::Continue
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let event = lifecycle_event(TRANSITION_LAUNCHING, "i-new");
        let response = reconcile(&provider, &config(), &event)
            .await
            .expect("should succeed");

        assert_eq!(response.added_ips, vec!["9.9.9.9/32".to_string()]);
        assert_eq!(response.removed_ips, vec!["1.2.3.4/32".to_string()]);
    }

    #[tokio::test]
    async fn terminating_event_excludes_its_own_instance() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_group_instance_ids()
            .returning(|_| Ok(Some(vec!["i-stay".to_string(), "i-gone".to_string()])));
        // The terminating member is still listed as running with a live
        // address; the exclusion policy, not the power state, drops it.
        provider
            .expect_instance_snapshot()
            .with(eq("i-stay"))
            .returning(|_| Ok(snapshot("i-stay", Some("5.6.7.8"), PowerState::Running)));
        provider
            .expect_instance_snapshot()
            .with(eq("i-gone"))
            .returning(|_| Ok(snapshot("i-gone", Some("1.2.3.4"), PowerState::Running)));
        provider
            .expect_ingress_rules()
            .returning(|_| Ok(vec![rule_entry(&["1.2.3.4/32", "5.6.7.8/32"])]));
        provider.expect_authorize_ingress().never();
        provider
            .expect_revoke_ingress()
            .with(
                eq("sg-123"),
                eq(PortRange::default()),
                eq(vec!["1.2.3.4/32".to_string()]),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));
        provider
            .expect_complete_lifecycle_action()
            .withf(|_, outcome| *outcome == LifecycleOutcome::Continue)
            .times(1)
            .returning(|_, _| Ok(()));

        let event = lifecycle_event(TRANSITION_TERMINATING, "i-gone");
        let response = reconcile(&provider, &config(), &event)
            .await
            .expect("should succeed");

        assert!(response.added_ips.is_empty());
        assert_eq!(response.removed_ips, vec!["1.2.3.4/32".to_string()]);
    }

    #[tokio::test]
    async fn launch_event_keeps_its_own_instance_by_default() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_group_instance_ids()
            .returning(|_| Ok(Some(vec!["i-new".to_string()])));
        provider
            .expect_instance_snapshot()
            .returning(|_| Ok(snapshot("i-new", Some("9.9.9.9"), PowerState::Running)));
        provider.expect_ingress_rules().returning(|_| Ok(vec![]));
        provider
            .expect_authorize_ingress()
            .with(
                eq("sg-123"),
                eq(PortRange::default()),
                eq(vec!["9.9.9.9/32".to_string()]),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));
        provider.expect_revoke_ingress().never();
        provider
            .expect_complete_lifecycle_action()
            .times(1)
            .returning(|_, _| Ok(()));

        let event = lifecycle_event(TRANSITION_LAUNCHING, "i-new");
        let response = reconcile(&provider, &config(), &event)
            .await
            .expect("should succeed");

        assert_eq!(response.added_ips, vec!["9.9.9.9/32".to_string()]);
    }

    #[tokio::test]
    async fn always_policy_excludes_on_launch_too() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_group_instance_ids()
            .returning(|_| Ok(Some(vec!["i-new".to_string()])));
        provider
            .expect_instance_snapshot()
            .returning(|_| Ok(snapshot("i-new", Some("9.9.9.9"), PowerState::Running)));
        provider.expect_ingress_rules().returning(|_| Ok(vec![]));
        provider.expect_authorize_ingress().never();
        provider.expect_revoke_ingress().never();
        provider
            .expect_complete_lifecycle_action()
            .times(1)
            .returning(|_, _| Ok(()));

        let config = config().with_self_exclusion(SelfExclusion::Always);
        let event = lifecycle_event(TRANSITION_LAUNCHING, "i-new");
        let response = reconcile(&provider, &config, &event)
            .await
            .expect("should succeed");

        assert!(response.added_ips.is_empty());
    }

    #[tokio::test]
    async fn zero_members_drain_every_rule() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_group_instance_ids()
            .returning(|_| Ok(Some(vec![])));
        provider
            .expect_ingress_rules()
            .returning(|_| Ok(vec![rule_entry(&["1.2.3.4/32", "5.6.7.8/32"])]));
        provider.expect_authorize_ingress().never();
        provider
            .expect_revoke_ingress()
            .with(
                eq("sg-123"),
                eq(PortRange::default()),
                eq(vec!["1.2.3.4/32".to_string(), "5.6.7.8/32".to_string()]),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));

        let event = scheduled_event();
        let config = config().with_asg_name("web-asg");
        let response = reconcile(&provider, &config, &event)
            .await
            .expect("should succeed");

        assert!(response.added_ips.is_empty());
        assert_eq!(
            response.removed_ips,
            vec!["1.2.3.4/32".to_string(), "5.6.7.8/32".to_string()]
        );
    }

    #[tokio::test]
    async fn zero_members_and_zero_rules_is_a_no_op() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_group_instance_ids()
            .returning(|_| Ok(Some(vec![])));
        provider.expect_ingress_rules().returning(|_| Ok(vec![]));
        provider.expect_authorize_ingress().never();
        provider.expect_revoke_ingress().never();

        let event = scheduled_event();
        let config = config().with_asg_name("web-asg");
        let response = reconcile(&provider, &config, &event)
            .await
            .expect("should succeed");

        assert_eq!(response, ReconcileResponse::default());
    }

    #[tokio::test]
    async fn converged_state_issues_no_mutations() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_group_instance_ids()
            .returning(|_| Ok(Some(vec!["i-1".to_string()])));
        provider
            .expect_instance_snapshot()
            .returning(|_| Ok(snapshot("i-1", Some("1.2.3.4"), PowerState::Running)));
        provider
            .expect_ingress_rules()
            .returning(|_| Ok(vec![rule_entry(&["1.2.3.4/32"])]));
        provider.expect_authorize_ingress().never();
        provider.expect_revoke_ingress().never();
        provider
            .expect_complete_lifecycle_action()
            .withf(|_, outcome| *outcome == LifecycleOutcome::Continue)
            .times(1)
            .returning(|_, _| Ok(()));

        let event = lifecycle_event(TRANSITION_LAUNCHING, "i-1");
        let response = reconcile(&provider, &config(), &event)
            .await
            .expect("should succeed");

        assert_eq!(response, ReconcileResponse::default());
    }

    #[tokio::test]
    async fn missing_group_abandons_the_hook() {
        let mut provider = MockCloudProvider::new();
        provider.expect_group_instance_ids().returning(|_| Ok(None));
        provider
            .expect_complete_lifecycle_action()
            .withf(|ack, outcome| {
                ack.instance_id == "i-1" && *outcome == LifecycleOutcome::Abandon
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let event = lifecycle_event(TRANSITION_LAUNCHING, "i-1");
        let err = reconcile(&provider, &config(), &event)
            .await
            .expect_err("should fail");

        assert!(matches!(err, ReconcileError::GroupNotFound { .. }));
    }

    #[tokio::test]
    async fn convergence_failure_abandons_the_hook() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_group_instance_ids()
            .returning(|_| Ok(Some(vec!["i-1".to_string()])));
        provider
            .expect_instance_snapshot()
            .returning(|_| Ok(snapshot("i-1", Some("9.9.9.9"), PowerState::Running)));
        provider.expect_ingress_rules().returning(|_| Ok(vec![]));
        provider
            .expect_authorize_ingress()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("authorize failed")));
        provider
            .expect_complete_lifecycle_action()
            .withf(|_, outcome| *outcome == LifecycleOutcome::Abandon)
            .times(1)
            .returning(|_, _| Ok(()));

        let event = lifecycle_event(TRANSITION_LAUNCHING, "i-1");
        let err = reconcile(&provider, &config(), &event)
            .await
            .expect_err("should fail");

        assert!(matches!(err, ReconcileError::Convergence { .. }));
    }

    #[tokio::test]
    async fn partial_convergence_keeps_additions_and_abandons() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_group_instance_ids()
            .returning(|_| Ok(Some(vec!["i-new".to_string()])));
        provider
            .expect_instance_snapshot()
            .returning(|_| Ok(snapshot("i-new", Some("9.9.9.9"), PowerState::Running)));
        provider
            .expect_ingress_rules()
            .returning(|_| Ok(vec![rule_entry(&["1.2.3.4/32"])]));
        provider
            .expect_authorize_ingress()
            .times(1)
            .returning(|_, _, _| Ok(()));
        // The successful authorize is not rolled back when the revoke fails
        provider
            .expect_revoke_ingress()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("revoke failed")));
        provider
            .expect_complete_lifecycle_action()
            .withf(|_, outcome| *outcome == LifecycleOutcome::Abandon)
            .times(1)
            .returning(|_, _| Ok(()));

        let event = lifecycle_event(TRANSITION_LAUNCHING, "i-new");
        let err = reconcile(&provider, &config(), &event)
            .await
            .expect_err("should fail");

        assert!(matches!(
            err,
            ReconcileError::Convergence {
                action: crate::error::ConvergeAction::Revoke,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn ack_failure_does_not_mask_the_outcome() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_group_instance_ids()
            .returning(|_| Ok(Some(vec![])));
        provider.expect_ingress_rules().returning(|_| Ok(vec![]));
        provider
            .expect_complete_lifecycle_action()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("hook expired")));

        let event = lifecycle_event(TRANSITION_LAUNCHING, "i-1");
        let response = reconcile(&provider, &config(), &event)
            .await
            .expect("ack failure must not fail the pass");

        assert_eq!(response, ReconcileResponse::default());
    }

    #[tokio::test]
    async fn scheduled_event_uses_configured_group_and_skips_the_ack() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_group_instance_ids()
            .with(eq("web-asg"))
            .returning(|_| Ok(Some(vec!["i-1".to_string()])));
        provider
            .expect_instance_snapshot()
            .returning(|_| Ok(snapshot("i-1", Some("1.2.3.4"), PowerState::Running)));
        provider
            .expect_ingress_rules()
            .returning(|_| Ok(vec![rule_entry(&["1.2.3.4/32"])]));
        provider.expect_complete_lifecycle_action().never();

        let config = config().with_asg_name("web-asg");
        reconcile(&provider, &config, &scheduled_event())
            .await
            .expect("should succeed");
    }

    #[tokio::test]
    async fn scheduled_event_without_group_name_is_rejected() {
        let mut provider = MockCloudProvider::new();
        provider.expect_group_instance_ids().never();
        provider.expect_complete_lifecycle_action().never();

        let err = reconcile(&provider, &config(), &scheduled_event())
            .await
            .expect_err("should fail");

        assert!(matches!(err, ReconcileError::MissingGroupName));
    }

    #[tokio::test]
    async fn event_group_name_wins_over_configuration() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_group_instance_ids()
            .with(eq("web-asg"))
            .returning(|_| Ok(Some(vec![])));
        provider.expect_ingress_rules().returning(|_| Ok(vec![]));
        provider
            .expect_complete_lifecycle_action()
            .times(1)
            .returning(|_, _| Ok(()));

        let config = config().with_asg_name("other-asg");
        let event = lifecycle_event(TRANSITION_LAUNCHING, "i-1");
        reconcile(&provider, &config, &event)
            .await
            .expect("should succeed");
    }

    #[test]
    fn response_serializes_with_snake_case_lists() {
        let response = ReconcileResponse {
            added_ips: vec!["9.9.9.9/32".to_string()],
            removed_ips: vec!["1.2.3.4/32".to_string()],
        };

        let value = serde_json::to_value(&response).expect("should serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "added_ips": ["9.9.9.9/32"],
                "removed_ips": ["1.2.3.4/32"]
            })
        );
    }
}
