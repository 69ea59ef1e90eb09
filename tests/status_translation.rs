use std::error::Error;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{TimeDelta, TimeZone, Utc};
use reconcile_flow::dag::{Graph, Task, TaskFn};
use reconcile_flow::engine::{Opts, RetryResult, Stats};
use reconcile_flow::errors::{AggregatedError, FlowError, TaskError, TaskFailure};
use reconcile_flow::status::{
    CodedError, ErrorCode, LastError, LastOperation, LastOperationState, LastOperationType,
    causes, determine_error_codes, extract_error_codes, format_last_err_description,
    has_non_retryable_code, will_retry,
};
use reconcile_flow_test_utils::init_tracing;
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn Error>>;

fn fatal(task: &str, message: &str) -> TaskError {
    TaskError {
        task: task.to_string(),
        cause: TaskFailure::Fatal(anyhow!(message.to_string())),
    }
}

fn sample_error() -> AggregatedError {
    AggregatedError::new(
        "Shoot reconciliation",
        vec![
            fatal("Deploying infrastructure", "AccessDenied: not allowed to create VPC"),
            fatal("Deploying DNS record", "Throttling: rate exceeded"),
        ],
    )
}

#[test]
fn test_causes_unpacks_aggregated_error() -> TestResult {
    let err = sample_error();
    let found = causes(&err);
    assert_eq!(found.len(), 2);
    assert_eq!(
        found[0].to_string(),
        "Deploying infrastructure failed: AccessDenied: not allowed to create VPC"
    );
    Ok(())
}

#[test]
fn test_causes_looks_through_flow_error_and_anyhow() -> TestResult {
    let wrapped = FlowError::Execution(sample_error());
    assert_eq!(causes(&wrapped).len(), 2);

    let any: anyhow::Error = anyhow::Error::new(sample_error()).context("reconciling shoot");
    let dyn_err: &(dyn Error + 'static) = any.as_ref();
    assert_eq!(causes(dyn_err).len(), 2);
    Ok(())
}

#[test]
fn test_plain_error_is_its_own_cause() -> TestResult {
    let err = std::io::Error::other("disk full");
    let found = causes(&err);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].to_string(), "disk full");
    Ok(())
}

#[test]
fn test_determine_error_codes_matches_case_insensitively() -> TestResult {
    assert_eq!(
        determine_error_codes("request failed: TOO MANY REQUESTS"),
        vec![ErrorCode::InfraRateLimitsExceeded]
    );
    assert_eq!(
        determine_error_codes("VcpuLimitExceeded while scaling"),
        vec![ErrorCode::InfraQuotaExceeded]
    );
    assert!(determine_error_codes("everything is fine").is_empty());
    Ok(())
}

#[test]
fn test_extract_error_codes_is_sorted_and_deduplicated() -> TestResult {
    let err = AggregatedError::new(
        "flow",
        vec![
            fatal("a", "Throttling"),
            fatal("b", "AccessDenied"),
            fatal("c", "rate limit hit"),
            fatal("d", "unclassified failure"),
        ],
    );
    let codes = extract_error_codes(&causes(&err));
    assert_eq!(
        codes,
        vec![
            ErrorCode::InfraInsufficientPrivileges,
            ErrorCode::InfraRateLimitsExceeded
        ]
    );
    Ok(())
}

#[test]
fn test_typed_codes_take_precedence_over_patterns() -> TestResult {
    let coded = CodedError::new(
        anyhow!("AccessDenied while reading bucket"),
        [ErrorCode::ConfigurationProblem],
    );
    let err = AggregatedError::new(
        "flow",
        vec![TaskError {
            task: "Reading bucket".to_string(),
            cause: TaskFailure::Fatal(anyhow::Error::new(coded).context("step 2")),
        }],
    );
    let codes = extract_error_codes(&causes(&err));
    assert_eq!(codes, vec![ErrorCode::ConfigurationProblem]);
    Ok(())
}

#[tokio::test]
async fn test_coded_error_from_action_reaches_last_error() -> TestResult {
    init_tracing();

    let mut g = Graph::new("Shoot reconciliation");
    g.add(Task::new(
        "Deploying infrastructure",
        TaskFn::new(|_ctx| async {
            RetryResult::severe_error(CodedError::new(
                anyhow!("quota for project exhausted"),
                [ErrorCode::InfraQuotaExceeded],
            ))
        }),
    ));
    let flow = g.compile()?;

    let err = flow
        .execute(CancellationToken::new(), Opts::default())
        .await
        .into_result()
        .expect_err("infrastructure fails");
    let last_error = LastError::from_error(&err);

    assert_eq!(last_error.codes, vec![ErrorCode::InfraQuotaExceeded]);
    assert_eq!(last_error.task_names, vec!["Deploying infrastructure".to_string()]);
    assert!(last_error.is_retryable());
    Ok(())
}

#[test]
fn test_description_is_joined_and_capitalized() -> TestResult {
    let err = AggregatedError::new(
        "flow",
        vec![fatal("deploying namespace", "boom"), fatal("waiting", "bang")],
    );
    assert_eq!(
        format_last_err_description(&causes(&err)),
        "Deploying namespace failed: boom; waiting failed: bang"
    );
    assert_eq!(format_last_err_description(&[]), "");
    Ok(())
}

#[test]
fn test_last_error_collects_failed_tasks_in_order() -> TestResult {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().ok_or("bad time")?;
    let last_error = LastError::from_error_at(&sample_error(), now);

    assert_eq!(
        last_error.task_names,
        vec![
            "Deploying infrastructure".to_string(),
            "Deploying DNS record".to_string()
        ]
    );
    assert_eq!(
        last_error.codes,
        vec![
            ErrorCode::InfraInsufficientPrivileges,
            ErrorCode::InfraRateLimitsExceeded
        ]
    );
    assert_eq!(last_error.last_update_time, now);
    assert!(!last_error.is_retryable());
    Ok(())
}

#[test]
fn test_last_error_serializes_with_wire_names() -> TestResult {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().ok_or("bad time")?;
    let last_error = LastError::from_error_at(&sample_error(), now);

    let rendered = toml::to_string(&last_error)?;
    assert!(rendered.contains("taskNames"));
    assert!(rendered.contains("ERR_INFRA_INSUFFICIENT_PRIVILEGES"));
    assert_eq!(ErrorCode::InfraRateLimitsExceeded.as_str(), "ERR_INFRA_RATE_LIMITS_EXCEEDED");
    assert_eq!(
        ErrorCode::CleanupClusterResources.to_string(),
        "ERR_CLEANUP_CLUSTER_RESOURCES"
    );
    Ok(())
}

#[test]
fn test_non_retryable_codes() -> TestResult {
    assert!(has_non_retryable_code(&[ErrorCode::InfraUnauthorized]));
    assert!(has_non_retryable_code(&[
        ErrorCode::InfraDependencies,
        ErrorCode::ConfigurationProblem
    ]));
    assert!(!has_non_retryable_code(&[ErrorCode::InfraQuotaExceeded]));
    assert!(!has_non_retryable_code(&[]));
    Ok(())
}

#[test]
fn test_will_retry_within_retry_cycle() -> TestResult {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().ok_or("bad time")?;
    let cycle = Duration::from_secs(600);

    assert!(will_retry(Some(start), cycle, start + TimeDelta::seconds(599)));
    assert!(!will_retry(Some(start), cycle, start + TimeDelta::seconds(600)));
    assert!(!will_retry(None, cycle, start));
    assert!(will_retry(Some(start), Duration::MAX, start + TimeDelta::days(365)));
    Ok(())
}

#[test]
fn test_errored_operation_state_follows_retry_cycle() -> TestResult {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().ok_or("bad time")?;
    let last_error = LastError::from_error_at(&sample_error(), start);
    let cycle = Duration::from_secs(600);

    let retrying = LastOperation::errored_at(
        LastOperationType::Reconcile,
        &last_error,
        None,
        Some(start),
        cycle,
        start + TimeDelta::seconds(30),
    );
    assert_eq!(retrying.state, LastOperationState::Error);
    assert!(retrying.description.ends_with(" Operation will be retried."));
    assert_eq!(retrying.progress, 1);

    let mut stats = Stats::new("Shoot reconciliation", ["a", "b", "c", "d"]);
    stats.pending.remove("a");
    stats.succeeded.insert("a".to_string());
    let previous = LastOperation::processing_from_stats(LastOperationType::Reconcile, &stats);
    assert_eq!(previous.progress, 25);

    let failed = LastOperation::errored_at(
        LastOperationType::Reconcile,
        &last_error,
        Some(&previous),
        Some(start),
        cycle,
        start + TimeDelta::seconds(601),
    );
    assert_eq!(failed.state, LastOperationState::Failed);
    assert_eq!(failed.description, last_error.description);
    assert_eq!(failed.progress, 25);
    Ok(())
}

#[test]
fn test_coded_error_keeps_wrapped_error_in_source_chain() -> TestResult {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "bucket is locked");
    let coded = CodedError::new(io, [ErrorCode::InfraInsufficientPrivileges]);

    assert_eq!(coded.to_string(), "ERR_INFRA_INSUFFICIENT_PRIVILEGES");
    let source = coded.source().ok_or("wrapped error must be the source")?;
    let inner = source
        .downcast_ref::<std::io::Error>()
        .ok_or("source must be the wrapped io error")?;
    assert_eq!(inner.kind(), std::io::ErrorKind::PermissionDenied);

    let rendered = format!("{:#}", anyhow::Error::new(coded));
    assert_eq!(rendered, "ERR_INFRA_INSUFFICIENT_PRIVILEGES: bucket is locked");
    Ok(())
}
