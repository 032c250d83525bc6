//! Trigger event model
//!
//! Two shapes arrive at the handler: the EventBridge envelope emitted by
//! autoscaling lifecycle hooks, and a minimal `{id, value}` payload used by
//! scheduled or manual invocations. Deserialization is untagged; the
//! presence of a `detail` object selects the lifecycle shape.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Wire value of a launching lifecycle transition.
pub const TRANSITION_LAUNCHING: &str = "autoscaling:EC2_INSTANCE_LAUNCHING";
/// Wire value of a terminating lifecycle transition.
pub const TRANSITION_TERMINATING: &str = "autoscaling:EC2_INSTANCE_TERMINATING";

/// A trigger event in either of the two accepted shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TriggerEvent {
    Lifecycle(LifecycleEvent),
    Scheduled(ScheduledEvent),
}

impl TriggerEvent {
    /// Parse a trigger event from its JSON payload.
    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    /// The lifecycle envelope, if this is a lifecycle event.
    pub fn lifecycle(&self) -> Option<&LifecycleEvent> {
        match self {
            TriggerEvent::Lifecycle(event) => Some(event),
            TriggerEvent::Scheduled(_) => None,
        }
    }

    /// The autoscaling group named by the event, if any.
    pub fn group_name(&self) -> Option<&str> {
        self.lifecycle()
            .map(|event| event.detail.auto_scaling_group_name.as_str())
    }

    /// The region carried in the event envelope, if any.
    pub fn region(&self) -> Option<&str> {
        self.lifecycle().and_then(|event| event.region.as_deref())
    }
}

/// EventBridge envelope for an autoscaling lifecycle action.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleEvent {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "detail-type", default)]
    pub detail_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    pub detail: LifecycleDetail,
}

/// Lifecycle action parameters from the event's `detail` object.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleDetail {
    pub lifecycle_hook_name: String,
    pub auto_scaling_group_name: String,
    pub lifecycle_action_token: String,
    /// Raw transition string; interpret via [`LifecycleDetail::transition`]
    #[serde(default)]
    pub lifecycle_transition: Option<String>,
    #[serde(rename = "EC2InstanceId")]
    pub ec2_instance_id: String,
}

impl LifecycleDetail {
    /// Interpret the transition string. Absent or unrecognized values map
    /// to `None` and are treated like a plain re-sync trigger.
    pub fn transition(&self) -> Option<LifecycleTransition> {
        match self.lifecycle_transition.as_deref() {
            Some(TRANSITION_LAUNCHING) => Some(LifecycleTransition::Launching),
            Some(TRANSITION_TERMINATING) => Some(LifecycleTransition::Terminating),
            _ => None,
        }
    }
}

/// Direction of the lifecycle transition that fired the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleTransition {
    Launching,
    Terminating,
}

impl std::fmt::Display for LifecycleTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleTransition::Launching => write!(f, "launching"),
            LifecycleTransition::Terminating => write!(f, "terminating"),
        }
    }
}

/// Minimal payload of a scheduled or manual invocation. All context comes
/// from process configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduledEvent {
    #[serde(default)]
    pub id: Option<f64>,
    #[serde(default)]
    pub value: Option<String>,
}
