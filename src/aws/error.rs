//! AWS error classification
//!
//! Classifies SDK failures by error code using `ProvideErrorMetadata`
//! instead of string matching on Debug output. Authorize and revoke use the
//! `ignore_*` helpers so that a rule already being in the target state reads
//! as convergence, not failure.

use anyhow::Result;
use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// AWS error categories relevant to rule convergence.
#[derive(Debug, Error)]
pub enum AwsError {
    /// Resource was not found (a revoke target that is already gone)
    #[error("resource not found: {message}")]
    NotFound { message: String },

    /// Resource already exists (an authorize target that is already present)
    #[error("resource already exists: {message}")]
    AlreadyExists { message: String },

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    /// Check if this is an "already exists" error
    pub fn is_already_exists(&self) -> bool {
        matches!(self, AwsError::AlreadyExists { .. })
    }
}

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidInstanceID.NotFound",
    "InvalidGroup.NotFound",
    "InvalidPermission.NotFound",
];

/// Known AWS error codes for "already exists" conditions
const ALREADY_EXISTS_CODES: &[&str] = &["InvalidPermission.Duplicate", "InvalidGroup.Duplicate"];

/// Classify an AWS SDK error using the error code.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound { message },
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => AwsError::AlreadyExists { message },
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Map a "not found" failure to `Ok(None)`, passing any other failure
/// through. For revoke-style calls where the target rule being absent
/// already satisfies the caller.
pub fn ignore_not_found<T, E>(result: Result<T, SdkError<E>>) -> Result<Option<T>>
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            let classified = classify_aws_error(err.code(), err.message());
            if classified.is_not_found() {
                Ok(None)
            } else {
                Err(anyhow::Error::new(err))
            }
        }
    }
}

/// Map an "already exists" failure to `Ok(None)`, passing any other failure
/// through. For authorize-style calls where the target rule being present
/// already satisfies the caller.
pub fn ignore_already_exists<T, E>(result: Result<T, SdkError<E>>) -> Result<Option<T>>
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            let classified = classify_aws_error(err.code(), err.message());
            if classified.is_already_exists() {
                Ok(None)
            } else {
                Err(anyhow::Error::new(err))
            }
        }
    }
}
