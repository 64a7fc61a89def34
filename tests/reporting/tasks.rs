use crate::support::helpers::{login_results, reporter_with_mock, spec};
use anyhow::Result;
use quollabore::{HookOutcome, SkipReason};
use serde_json::{json, Value};

const SPEC: &str = "cypress/e2e/login.cy.ts";
const TITLE: &str = "Login > rejects bad password";

#[tokio::test]
async fn tasks_resolve_cases_reported_by_spec_finish() -> Result<()> {
    let (reporter, ingest, server) = reporter_with_mock().await?;
    reporter.handle_hook("before:run", Vec::new()).await;
    reporter
        .handle_hook("after:spec", vec![spec(SPEC), login_results()])
        .await;

    let update = reporter
        .handle_task(
            "quollabore:caseUpdate",
            json!({ "specRel": SPEC, "fullTitle": TITLE, "patch": { "flaky": true } }),
        )
        .await;
    let log = reporter
        .handle_task(
            "quollabore:log",
            json!({
                "specRel": SPEC,
                "fullTitle": TITLE,
                "level": "warn",
                "message": "retrying login",
                "data": { "attempt": 2 }
            }),
        )
        .await;
    let artifact = reporter
        .handle_task(
            "quollabore:artifact",
            json!({
                "specRel": SPEC,
                "fullTitle": TITLE,
                "type": "har",
                "localPath": "cypress/har/login.har"
            }),
        )
        .await;

    assert_eq!(update, Value::Bool(true));
    assert_eq!(log, Value::Bool(true));
    assert_eq!(artifact, Value::Bool(true));

    let case_id = reporter
        .store()
        .case_id(&quollabore::SpecKey::from(SPEC), TITLE)
        .expect("case reported");

    let update = &ingest.of_type("case:update")[0];
    assert_eq!(update["case_id"], case_id.as_str());
    assert_eq!(update["patch"], json!({ "flaky": true }));

    let log = &ingest.of_type("log")[0];
    assert_eq!(log["level"], "warn");
    assert_eq!(log["message"], "retrying login");
    assert_eq!(log["data"]["attempt"], 2);

    let artifact = &ingest.of_type("artifact")[0];
    assert_eq!(
        artifact["artifact"],
        json!({ "type": "har", "storage_path": "cypress/har/login.har" })
    );

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn tasks_for_unknown_cases_reply_null() -> Result<()> {
    let (reporter, ingest, server) = reporter_with_mock().await?;
    reporter.handle_hook("before:run", Vec::new()).await;

    let log = reporter
        .handle_task(
            "quollabore:log",
            json!({ "specRel": SPEC, "fullTitle": "Never > ran", "message": "hi" }),
        )
        .await;
    let artifact = reporter
        .handle_task(
            "quollabore:artifact",
            json!({ "specRel": SPEC, "fullTitle": "Never > ran", "localPath": "a.png" }),
        )
        .await;
    let empty = reporter.handle_task("quollabore:caseUpdate", Value::Null).await;

    assert_eq!(log, Value::Null);
    assert_eq!(artifact, Value::Null);
    assert_eq!(empty, Value::Null);
    assert_eq!(ingest.types(), vec!["run:start"]);

    assert_eq!(
        reporter.run_task("quollabore:unknown", json!({})).await,
        HookOutcome::Skipped(SkipReason::UnknownHook)
    );
    assert_eq!(
        reporter
            .run_task("quollabore:log", json!({ "specRel": 5 }))
            .await,
        HookOutcome::Skipped(SkipReason::MalformedPayload)
    );

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn task_outage_replies_null() -> Result<()> {
    let (reporter, ingest, server) = reporter_with_mock().await?;
    reporter.handle_hook("before:run", Vec::new()).await;
    reporter
        .handle_hook("after:spec", vec![spec(SPEC), login_results()])
        .await;
    ingest.fail("log");

    let reply = reporter
        .handle_task(
            "quollabore:log",
            json!({ "specRel": SPEC, "fullTitle": TITLE, "message": "lost" }),
        )
        .await;
    assert_eq!(reply, Value::Null);
    assert_eq!(ingest.count("log"), 1);

    server.shutdown().await;
    Ok(())
}
