use crate::support::helpers::{login_results, reporter_with_mock, spec, TOKEN};
use anyhow::Result;
use quollabore::{HookOutcome, RunPhase, SkipReason, SpecKey};
use serde_json::json;

#[tokio::test]
async fn full_run_reports_every_step_in_order() -> Result<()> {
    let (reporter, ingest, server) = reporter_with_mock().await?;

    assert_eq!(
        reporter.handle_hook("before:run", Vec::new()).await,
        HookOutcome::Reported
    );
    assert_eq!(reporter.phase(), RunPhase::Started);

    let outcome = reporter
        .handle_hook("after:spec", vec![spec("cypress/e2e/login.cy.ts"), login_results()])
        .await;
    assert_eq!(outcome, HookOutcome::Reported);

    let outcome = reporter
        .handle_hook(
            "after:run",
            vec![json!({ "totalFailed": 1, "totalPassed": 1, "totalTests": 2 })],
        )
        .await;
    assert_eq!(outcome, HookOutcome::Reported);
    assert_eq!(reporter.phase(), RunPhase::Finished);

    assert_eq!(
        ingest.types(),
        vec![
            "run:start",
            "suite:start",
            "case:start",
            "case:finish",
            "case:start",
            "case:finish",
            "suite:finish",
            "run:finish"
        ]
    );
    let expected_auth = format!("Bearer {TOKEN}");
    assert!(ingest
        .requests()
        .iter()
        .all(|request| request.authorization.as_deref() == Some(expected_auth.as_str())));

    let run = &ingest.of_type("run:start")[0]["run"];
    assert_eq!(run["provider"], "cypress");
    assert_eq!(run["project_id"], "proj-1");
    assert_eq!(run["environment"], "prod");
    assert_eq!(run["parallel_total"], 1);
    assert_eq!(run["status"], "running");

    let suite = &ingest.of_type("suite:start")[0]["suite"];
    assert_eq!(suite["run_id"], "run-1");
    assert_eq!(suite["name"], "cypress/e2e/login.cy.ts");
    assert_eq!(suite["file_path"], "cypress/e2e/login.cy.ts");
    assert_eq!(suite["shard_index"], 0);

    let starts = ingest.of_type("case:start");
    assert_eq!(starts[0]["test"]["full_title"], "Login > accepts valid credentials");
    assert_eq!(starts[1]["test"]["full_title"], "Login > rejects bad password");
    assert_eq!(starts[1]["test"]["meta"]["browser"], "chrome");

    let finishes = ingest.of_type("case:finish");
    assert_eq!(finishes[0]["status"], "passed");
    assert_eq!(finishes[0]["duration_ms"], 830);
    assert_eq!(finishes[1]["status"], "failed");
    assert!(finishes[1].get("duration_ms").is_none());
    assert_eq!(finishes[1]["error"]["message"], "AssertionError: expected 401");

    let suite_finish = &ingest.of_type("suite:finish")[0];
    assert_eq!(suite_finish["status"], "failed");
    assert_eq!(suite_finish["duration_ms"], 2100);

    let run_finish = &ingest.of_type("run:finish")[0];
    assert_eq!(run_finish["status"], "failed");
    assert_eq!(run_finish["stats"]["totalTests"], 2);

    let snapshot = reporter.telemetry();
    assert_eq!(snapshot.messages_sent, 8);
    assert_eq!(snapshot.messages_failed, 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn screenshot_and_video_attach_to_known_cases() -> Result<()> {
    let (reporter, ingest, server) = reporter_with_mock().await?;
    reporter.handle_hook("before:run", Vec::new()).await;

    let mut results = login_results();
    results["video"] = json!("cypress/videos/login.cy.ts.mp4");
    let outcome = reporter
        .handle_hook("after:spec", vec![spec("login.cy.ts"), results])
        .await;
    assert_eq!(outcome, HookOutcome::Reported);

    let outcome = reporter
        .handle_hook(
            "after:screenshot",
            vec![json!({
                "path": "cypress/screenshots/login.cy.ts/rejects bad password (failed).png",
                "specName": "login.cy.ts",
                "testFailure": { "titlePath": ["Login", "rejects bad password"] }
            })],
        )
        .await;
    assert_eq!(outcome, HookOutcome::Reported);

    let artifacts = ingest.of_type("artifact");
    assert_eq!(artifacts.len(), 2);
    let last_case = reporter
        .store()
        .case_id(&SpecKey::from("login.cy.ts"), "Login > rejects bad password")
        .expect("case id cached during spec finish");

    assert_eq!(artifacts[0]["artifact"]["type"], "video");
    assert_eq!(artifacts[0]["case_id"], last_case.as_str());
    assert_eq!(
        artifacts[0]["artifact"]["storage_path"],
        "cypress/videos/login.cy.ts.mp4"
    );
    assert_eq!(artifacts[1]["artifact"]["type"], "screenshot");
    assert_eq!(artifacts[1]["case_id"], last_case.as_str());

    let custom = reporter
        .handle_hook("after:screenshot", vec![json!({ "path": "custom.png" })])
        .await;
    assert_eq!(custom, HookOutcome::Skipped(SkipReason::MissingTitle));

    let boolean_failure = reporter
        .handle_hook(
            "after:screenshot",
            vec![json!({
                "path": "/tmp/shot.png",
                "specName": "login.cy.ts",
                "testFailure": true
            })],
        )
        .await;
    assert_eq!(
        boolean_failure,
        HookOutcome::Skipped(SkipReason::MissingTitle)
    );
    assert_eq!(ingest.count("artifact"), 2);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn second_spec_finish_reuses_suite() -> Result<()> {
    let (reporter, ingest, server) = reporter_with_mock().await?;
    reporter.handle_hook("before:run", Vec::new()).await;

    for _ in 0..2 {
        reporter
            .handle_hook("after:spec", vec![spec("login.cy.ts"), login_results()])
            .await;
    }

    assert_eq!(ingest.count("suite:start"), 1);
    assert_eq!(ingest.count("suite:finish"), 2);
    assert_eq!(ingest.count("case:start"), 4);
    assert_eq!(reporter.store().suite_count(), 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn concurrent_spec_finishes_open_one_suite() -> Result<()> {
    let (reporter, ingest, server) = reporter_with_mock().await?;
    reporter.handle_hook("before:run", Vec::new()).await;

    let (first, second) = tokio::join!(
        reporter.handle_hook("after:spec", vec![spec("login.cy.ts"), login_results()]),
        reporter.handle_hook("after:spec", vec![spec("login.cy.ts"), login_results()]),
    );
    assert_eq!(first, HookOutcome::Reported);
    assert_eq!(second, HookOutcome::Reported);
    assert_eq!(ingest.count("suite:start"), 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn degraded_spec_metadata_falls_back_to_unknown_spec() -> Result<()> {
    let (reporter, ingest, server) = reporter_with_mock().await?;
    reporter.handle_hook("before:run", Vec::new()).await;

    let outcome = reporter
        .handle_hook("after:spec", vec![json!(null), json!({ "tests": [] })])
        .await;
    assert_eq!(outcome, HookOutcome::Reported);

    let suite = &ingest.of_type("suite:start")[0]["suite"];
    assert_eq!(suite["name"], "unknown.spec");
    assert_eq!(ingest.of_type("suite:finish")[0]["status"], "skipped");

    server.shutdown().await;
    Ok(())
}
