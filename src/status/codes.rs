// src/status/codes.rs

//! Error code taxonomy for failed runs.

use std::error::Error;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::TaskError;

/// Machine-readable classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The credentials were rejected.
    #[serde(rename = "ERR_INFRA_UNAUTHORIZED")]
    InfraUnauthorized,
    /// The credentials lack permissions for an operation.
    #[serde(rename = "ERR_INFRA_INSUFFICIENT_PRIVILEGES")]
    InfraInsufficientPrivileges,
    #[serde(rename = "ERR_INFRA_QUOTA_EXCEEDED")]
    InfraQuotaExceeded,
    #[serde(rename = "ERR_INFRA_RATE_LIMITS_EXCEEDED")]
    InfraRateLimitsExceeded,
    /// A transient problem with a dependent infrastructure object.
    #[serde(rename = "ERR_INFRA_DEPENDENCIES")]
    InfraDependencies,
    /// The provider ran out of the requested resources.
    #[serde(rename = "ERR_INFRA_RESOURCES_DEPLETED")]
    InfraResourcesDepleted,
    /// Resources are still being cleaned up.
    #[serde(rename = "ERR_CLEANUP_CLUSTER_RESOURCES")]
    CleanupClusterResources,
    #[serde(rename = "ERR_CONFIGURATION_PROBLEM")]
    ConfigurationProblem,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InfraUnauthorized => "ERR_INFRA_UNAUTHORIZED",
            ErrorCode::InfraInsufficientPrivileges => "ERR_INFRA_INSUFFICIENT_PRIVILEGES",
            ErrorCode::InfraQuotaExceeded => "ERR_INFRA_QUOTA_EXCEEDED",
            ErrorCode::InfraRateLimitsExceeded => "ERR_INFRA_RATE_LIMITS_EXCEEDED",
            ErrorCode::InfraDependencies => "ERR_INFRA_DEPENDENCIES",
            ErrorCode::InfraResourcesDepleted => "ERR_INFRA_RESOURCES_DEPLETED",
            ErrorCode::CleanupClusterResources => "ERR_CLEANUP_CLUSTER_RESOURCES",
            ErrorCode::ConfigurationProblem => "ERR_CONFIGURATION_PROBLEM",
        }
    }

    /// Whether a failure with this code is worth retrying without user
    /// intervention.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            ErrorCode::InfraUnauthorized
                | ErrorCode::InfraInsufficientPrivileges
                | ErrorCode::ConfigurationProblem
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error that already knows its codes.
///
/// Actions wrap errors in a `CodedError` when they can classify them better
/// than message matching would; typed codes always win over patterns. The
/// wrapped error is its source, so `{:#}` renders as
/// `"ERR_INFRA_QUOTA_EXCEEDED: <message>"`.
#[derive(Debug)]
pub struct CodedError {
    err: anyhow::Error,
    codes: Vec<ErrorCode>,
}

impl CodedError {
    pub fn new(err: impl Into<anyhow::Error>, codes: impl IntoIterator<Item = ErrorCode>) -> Self {
        Self {
            err: err.into(),
            codes: codes.into_iter().collect(),
        }
    }

    pub fn codes(&self) -> &[ErrorCode] {
        &self.codes
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.codes.is_empty() {
            return f.write_str("unclassified error");
        }
        let codes: Vec<&str> = self.codes.iter().map(|code| code.as_str()).collect();
        f.write_str(&codes.join(", "))
    }
}

impl Error for CodedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        let err: &(dyn Error + 'static) = self.err.as_ref();
        Some(err)
    }
}

static UNAUTHORIZED: LazyLock<Regex> = LazyLock::new(|| {
    pattern(
        r"(Unauthorized|InvalidClientTokenId|SignatureDoesNotMatch|Authentication failed|AuthFailure|AuthorizationFailed|invalid_grant|invalid_client|InvalidAccessKeyId|InvalidSecretAccessKey|not authorized)",
    )
});
static INSUFFICIENT_PRIVILEGES: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(AccessDenied|OperationNotAllowed|Error 403|Forbidden|REQUEST_DENIED)")
});
static QUOTA_EXCEEDED: LazyLock<Regex> = LazyLock::new(|| {
    pattern(
        r"(Quotas|Quota.*exceeded|exceeded quota|Quota has been met|QUOTA_EXCEEDED|VcpuLimitExceeded|InstanceLimitExceeded|AddressLimitExceeded|VpcLimitExceeded)",
    )
});
static RATE_LIMITS_EXCEEDED: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(RequestLimitExceeded|Throttling|Too many requests|rate limit)")
});
static DEPENDENCIES: LazyLock<Regex> = LazyLock::new(|| {
    pattern(
        r"(PendingVerification|Access Not Configured|DependencyViolation|OptInRequired|DeleteConflict|Conflict|inactive billing state|is already being used|InUseSubnetCannotBeDeleted|timeout while waiting for state to become|already busy for|InsufficientFreeAddressesInSubnet|internal server error)",
    )
});
static RESOURCES_DEPLETED: LazyLock<Regex> = LazyLock::new(|| {
    pattern(
        r"(not available in the current hardware cluster|InsufficientInstanceCapacity|SkuNotAvailable|ZonalAllocationFailed|out of stock)",
    )
});
static CLEANUP_CLUSTER_RESOURCES: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(still exists|still being deleted|still has resources|remaining resources)")
});
static CONFIGURATION_PROBLEM: LazyLock<Regex> = LazyLock::new(|| {
    pattern(
        r"(InvalidParameterValue|InvalidAMIID\.NotFound|violates constraint|no attached internet gateway found|invalid VPC attributes|unrecognized feature gate|runtime-config invalid key|strict decoder error|duplicate zones|overlapping zones)",
    )
});

fn pattern(expr: &str) -> Regex {
    Regex::new(&format!("(?i){expr}")).expect("error code pattern is valid")
}

/// Classify a message by pattern matching.
///
/// ```
/// # use reconcile_flow::status::{ErrorCode, determine_error_codes};
/// let codes = determine_error_codes("AccessDenied: not allowed to create VPC");
/// assert_eq!(codes, vec![ErrorCode::InfraInsufficientPrivileges]);
/// ```
pub fn determine_error_codes(message: &str) -> Vec<ErrorCode> {
    let table: [(&Regex, ErrorCode); 8] = [
        (&*UNAUTHORIZED, ErrorCode::InfraUnauthorized),
        (&*INSUFFICIENT_PRIVILEGES, ErrorCode::InfraInsufficientPrivileges),
        (&*QUOTA_EXCEEDED, ErrorCode::InfraQuotaExceeded),
        (&*RATE_LIMITS_EXCEEDED, ErrorCode::InfraRateLimitsExceeded),
        (&*DEPENDENCIES, ErrorCode::InfraDependencies),
        (&*RESOURCES_DEPLETED, ErrorCode::InfraResourcesDepleted),
        (&*CLEANUP_CLUSTER_RESOURCES, ErrorCode::CleanupClusterResources),
        (&*CONFIGURATION_PROBLEM, ErrorCode::ConfigurationProblem),
    ];

    table
        .into_iter()
        .filter(|(re, _)| re.is_match(message))
        .map(|(_, code)| code)
        .collect()
}

/// Codes of a single cause: typed [`CodedError`]s anywhere in its chain,
/// otherwise whatever its message matches.
pub fn codes_of(err: &(dyn Error + 'static)) -> Vec<ErrorCode> {
    if let Some(codes) = typed_codes(err) {
        return codes;
    }
    determine_error_codes(&err.to_string())
}

fn typed_codes(err: &(dyn Error + 'static)) -> Option<Vec<ErrorCode>> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(coded) = e.downcast_ref::<CodedError>() {
            return Some(coded.codes().to_vec());
        }
        if let Some(task_err) = e.downcast_ref::<TaskError>() {
            let last = task_err.cause.last_error()?;
            return last
                .chain()
                .find_map(|inner| inner.downcast_ref::<CodedError>())
                .map(|coded| coded.codes().to_vec());
        }
        current = e.source();
    }
    None
}

/// Union of the codes of all `causes`, sorted and without duplicates.
/// Unclassified causes contribute nothing.
pub fn extract_error_codes(causes: &[&(dyn Error + 'static)]) -> Vec<ErrorCode> {
    let mut codes: Vec<ErrorCode> = causes.iter().flat_map(|err| codes_of(*err)).collect();
    codes.sort();
    codes.dedup();
    codes
}

/// Whether any of `codes` means retrying will not help.
pub fn has_non_retryable_code(codes: &[ErrorCode]) -> bool {
    codes.iter().any(|code| !code.is_retryable())
}
