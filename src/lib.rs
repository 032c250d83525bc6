//! asg-ingress-sync - security group rules that follow an autoscaling group
//!
//! Keeps an EC2 security group's inbound `/32` rules in sync with the
//! public IPs of an autoscaling group's healthy instances. Stateless and
//! event-triggered: every lifecycle hook firing (or scheduled run) derives
//! the desired and observed IP sets from live AWS state, applies the
//! minimal authorize/revoke calls, and completes the lifecycle action.

pub mod aws;
pub mod config;
pub mod error;
pub mod event;
pub mod provider;
pub mod reconcile;
