use std::time::Duration;

use court_opinion_archiver::fetcher::retry_formatter::{
    extract_error_type, RetryContext, RetryErrorType,
};
use reqwest::StatusCode;

fn sample_context(error_type: RetryErrorType) -> RetryContext {
    RetryContext::new(
        2,
        5,
        error_type,
        Duration::from_secs(4),
        "operation timed out",
        "https://www.courts.wa.gov/opinions/pdf/1025866.pdf",
    )
}

#[test]
fn format_retry_captures_attempt_and_wait() {
    let ctx = sample_context(RetryErrorType::RateLimit);
    let message = ctx.format_retry();
    assert!(message.contains("attempt 2/5"));
    assert!(message.contains("rate limit exceeded"));
    assert!(message.contains("4.0 seconds"));
    assert!(message.ends_with("(https://www.courts.wa.gov/opinions/pdf/1025866.pdf)"));
}

#[test]
fn format_success_names_the_url() {
    let ctx = sample_context(RetryErrorType::NetworkTimeout);
    let message = ctx.format_success();
    assert!(message.contains("Retry attempt 2/5 succeeded"));
    assert!(message.contains("1025866.pdf"));
}

#[test]
fn format_failure_lists_suggestions() {
    let ctx = sample_context(RetryErrorType::ServerError(502));
    let output = ctx.format_failure();
    assert!(output.contains("Request failed after 2 attempt(s)"));
    assert!(output.contains("Last error: operation timed out"));
    assert!(output.contains("court site may be having issues"));
    assert!(output.contains("--max-retries"));
    assert!(output.contains("--retry-failed"));
}

#[test]
fn permanent_failures_do_not_suggest_more_retries() {
    let ctx = sample_context(RetryErrorType::NotFound(404));
    let suggestions = ctx.format_suggestions();
    assert_eq!(suggestions.len(), 1);
    assert!(suggestions[0].contains("withdrawn"));
}

#[test]
fn extract_error_type_classifies_status_codes() {
    let client = extract_error_type(Some(StatusCode::BAD_REQUEST), None);
    assert_eq!(client, RetryErrorType::ClientError(400));

    let auth = extract_error_type(Some(StatusCode::UNAUTHORIZED), None);
    assert!(matches!(auth, RetryErrorType::AuthFailed(401)));

    let rate_limit = extract_error_type(Some(StatusCode::TOO_MANY_REQUESTS), None);
    assert_eq!(rate_limit, RetryErrorType::RateLimit);

    let server = extract_error_type(Some(StatusCode::INTERNAL_SERVER_ERROR), None);
    assert_eq!(server, RetryErrorType::ServerError(500));

    let gone = extract_error_type(Some(StatusCode::GONE), None);
    assert_eq!(gone, RetryErrorType::NotFound(410));

    let ok = extract_error_type(Some(StatusCode::OK), None);
    assert_eq!(ok, RetryErrorType::NetworkGeneric);

    let generic = extract_error_type(None, None);
    assert_eq!(generic, RetryErrorType::NetworkGeneric);
}
