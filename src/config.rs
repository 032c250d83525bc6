//! Runtime configuration for the reconciler

/// Inclusive TCP port range covered by the managed rule entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub from: i32,
    pub to: i32,
}

impl PortRange {
    /// The full TCP port space.
    pub const FULL_TCP: PortRange = PortRange { from: 0, to: 65535 };

    /// A range covering a single port.
    pub fn single(port: i32) -> Self {
        Self {
            from: port,
            to: port,
        }
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::FULL_TCP
    }
}

/// When to drop the event's own instance from the desired set.
///
/// A terminating instance can linger in the group's member listing (still
/// "running" as far as EC2 is concerned) after its hook fires, so waiting
/// for the power state alone would re-authorize an address that is about to
/// disappear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelfExclusion {
    /// Exclude the event's instance only when the transition is terminating.
    #[default]
    OnTerminating,
    /// Exclude the event's instance on every lifecycle event.
    Always,
}

/// Reconciler configuration.
///
/// `security_group_id` is the only required option. `asg_name` and `region`
/// may instead come from the lifecycle event; scheduled events carry
/// neither, so scheduled deployments must set both.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Security group whose inbound rules are managed
    pub security_group_id: String,
    /// Autoscaling group to read when the event names none
    pub asg_name: Option<String>,
    /// AWS region override
    pub region: Option<String>,
    /// Port range written on authorize and matched on revoke
    pub port_range: PortRange,
    /// Self-exclusion policy for the event's instance
    pub self_exclusion: SelfExclusion,
}

impl ReconcilerConfig {
    /// Create a configuration for the given security group with defaults:
    /// full TCP port range, exclusion on terminating events only.
    pub fn new(security_group_id: impl Into<String>) -> Self {
        Self {
            security_group_id: security_group_id.into(),
            asg_name: None,
            region: None,
            port_range: PortRange::default(),
            self_exclusion: SelfExclusion::default(),
        }
    }

    /// Set the fallback autoscaling group name.
    pub fn with_asg_name(mut self, asg_name: impl Into<String>) -> Self {
        self.asg_name = Some(asg_name.into());
        self
    }

    /// Set the AWS region override.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the managed port range.
    pub fn with_port_range(mut self, port_range: PortRange) -> Self {
        self.port_range = port_range;
        self
    }

    /// Set the self-exclusion policy.
    pub fn with_self_exclusion(mut self, policy: SelfExclusion) -> Self {
        self.self_exclusion = policy;
        self
    }
}
