use anyhow::Result;
use feed_service::clients::slack::SlackReporter;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, method, path},
};

/// Test: A dead-lettered event is reported with its subject and reason
#[tokio::test]
async fn test_failure_report_is_posted() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/services/hook"))
        .and(body_json(json!({
            "text": ":warning: feed-service failed to process event evt-1 (audit): No usable recipient address in 'nobody'"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let reporter = SlackReporter::new(&format!("{}/services/hook", server.uri()))?;
    reporter
        .report_failure(
            "event evt-1 (audit)",
            "No usable recipient address in 'nobody'",
        )
        .await?;

    Ok(())
}

/// Test: A webhook rejection is surfaced to the caller
#[tokio::test]
async fn test_rejected_report_is_an_error() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let reporter = SlackReporter::new(&server.uri())?;
    let result = reporter.report_failure("event evt-1 (audit)", "boom").await;

    let err = result.expect_err("500 should fail the report");
    assert!(err.to_string().contains("500"));

    Ok(())
}
