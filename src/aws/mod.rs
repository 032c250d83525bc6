//! AWS service clients

pub mod autoscaling;
pub mod context;
pub mod ec2;
pub mod error;

pub use autoscaling::AutoscalingClient;
pub use context::AwsContext;
pub use ec2::Ec2Client;
pub use error::{AwsError, classify_aws_error, ignore_already_exists, ignore_not_found};
