//! Weaver Core Integration Tests
//!
//! End-to-end discovery runs over an in-memory database with a scripted oracle.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::*;
use weaver_core::discovery::DiscoveryOptions;
use weaver_core::domain::{
    DiscoveryEvent, DiscoveryRunRepository, LogLevel, RunStatus, WeaveRepository, WeaveType,
};
use weaver_core::retrieval::{Fragment, VectorIndex};
use weaver_core::Error;

#[tokio::test]
async fn test_full_discovery_run() {
    let harness = Harness::new(&["component-lib", "drift-detector"]).await;
    let oracle = Arc::new(design_system_oracle(assessment(true, 0.8)));
    let service = harness.service(oracle.clone());

    let run = service
        .run_discovery("design-tools", &DiscoveryOptions::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counters.profiles, 2);
    assert_eq!(run.counters.pairs_checked, 2);
    assert_eq!(run.counters.candidates_found, 1);
    assert_eq!(run.counters.candidates_assessed, 1);
    assert_eq!(run.counters.philosophical_profiles, 2);
    assert_eq!(run.counters.weaves_saved, 2);
    assert_eq!(run.counters.oracle_failures, 0);
    assert_eq!(oracle.calls(), 5);

    let weaves = harness.weaves.list(&harness.plexus.id, None, false).await.unwrap();
    assert_eq!(weaves.len(), 2);

    let functional = weaves
        .iter()
        .find(|w| w.weave_type == WeaveType::DetectsDriftIn)
        .expect("functional weave");
    assert_eq!(functional.source_repo_id, "drift-detector");
    assert_eq!(functional.target_repo_id, "component-lib");
    assert_eq!(functional.title, "Drift checks for the component library");
    assert_eq!(functional.score, 0.8);
    assert_eq!(functional.run_id.as_deref(), Some(run.id.as_str()));
    assert_eq!(functional.metadata["rule_id"], "detects_drift");
    assert_eq!(functional.metadata["assessment"]["confidence"], 0.8);
    assert_eq!(functional.metadata["run_id"], run.id.as_str());
    assert!(functional.metadata["initial_confidence"].as_f64().unwrap() < 0.95);
    assert!(
        functional.metadata["matched_evidence"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e == "artifact:components")
    );

    let philosophical = weaves
        .iter()
        .find(|w| w.weave_type == WeaveType::VerticalAlignment)
        .expect("philosophical weave");
    assert!((philosophical.score - 0.72).abs() < 1e-9);
    assert_eq!(philosophical.metadata["source_virtue"], "vigilance");
    assert!(philosophical.metadata["dimensions"]["source"].is_object());

    let stored = harness.runs.get(&run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!(stored.counters, run.counters);
    assert_eq!(stored.config["top_n"], 20);
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn test_second_run_skips_existing_weaves() {
    let harness = Harness::new(&["component-lib", "drift-detector"]).await;
    let service = harness.service(Arc::new(design_system_oracle(assessment(true, 0.8))));
    let options = DiscoveryOptions::default();

    let first = service
        .run_discovery(&harness.plexus.id, &options, CancellationToken::new())
        .await
        .unwrap();
    let second = service
        .run_discovery(&harness.plexus.id, &options, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.counters.weaves_saved, 2);
    assert_eq!(second.counters.weaves_saved, 0);
    assert_eq!(second.counters.weaves_skipped, 2);
    assert_eq!(harness.weaves.count_active(&harness.plexus.id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_dismissed_weave_can_be_rediscovered() {
    let harness = Harness::new(&["component-lib", "drift-detector"]).await;
    let service = harness.service(Arc::new(design_system_oracle(assessment(true, 0.8))));
    let options = DiscoveryOptions {
        philosophical: false,
        ..DiscoveryOptions::default()
    };

    service
        .run_discovery(&harness.plexus.id, &options, CancellationToken::new())
        .await
        .unwrap();
    let weaves = harness.weaves.list(&harness.plexus.id, None, false).await.unwrap();
    assert!(harness.weaves.dismiss(&weaves[0].id).await.unwrap());

    let rerun = service
        .run_discovery(&harness.plexus.id, &options, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(rerun.counters.weaves_saved, 1);
    assert_eq!(harness.weaves.list(&harness.plexus.id, None, true).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_single_repository_completes_with_nothing() {
    let harness = Harness::new(&["component-lib"]).await;
    let oracle = Arc::new(design_system_oracle(assessment(true, 0.8)));
    let service = harness.service(oracle.clone());

    let run = service
        .run_discovery(&harness.plexus.id, &DiscoveryOptions::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counters.weaves_saved, 0);
    assert_eq!(oracle.calls(), 0);
    assert_eq!(run.log.len(), 1);
}

#[tokio::test]
async fn test_rejected_assessment_never_persists() {
    let harness = Harness::new(&["component-lib", "drift-detector"]).await;
    let service = harness.service(Arc::new(design_system_oracle(assessment(false, 0.99))));
    let options = DiscoveryOptions {
        philosophical: false,
        ..DiscoveryOptions::default()
    };

    let run = service
        .run_discovery(&harness.plexus.id, &options, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counters.candidates_assessed, 1);
    assert_eq!(run.counters.weaves_saved, 0);
    assert_eq!(run.counters.philosophical_profiles, 0);
    assert_eq!(harness.weaves.count_active(&harness.plexus.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_low_confidence_assessment_never_persists() {
    let harness = Harness::new(&["component-lib", "drift-detector"]).await;
    let service = harness.service(Arc::new(design_system_oracle(assessment(true, 0.4))));
    let options = DiscoveryOptions {
        philosophical: false,
        ..DiscoveryOptions::default()
    };

    let run = service
        .run_discovery(&harness.plexus.id, &options, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(run.counters.weaves_saved, 0);
}

#[tokio::test]
async fn test_oracle_failures_drop_work_without_failing_run() {
    let harness = Harness::new(&["component-lib", "drift-detector", "unscripted"]).await;
    // No stance replies: every philosophical call fails too
    let oracle = ScriptedOracle::new()
        .reply(PROFILE, "component-lib", component_lib_profile())
        .reply(PROFILE, "drift-detector", drift_detector_profile())
        .reply(ASSESS, "drift-detector->component-lib", assessment(true, 0.8));
    let service = harness.service(Arc::new(oracle));

    let run = service
        .run_discovery(&harness.plexus.id, &DiscoveryOptions::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counters.profiles, 2);
    assert_eq!(run.counters.philosophical_profiles, 0);
    assert_eq!(run.counters.oracle_failures, 3);
    assert_eq!(run.counters.weaves_saved, 1);

    let stored = harness.runs.get(&run.id).await.unwrap().unwrap();
    let warnings = stored.log.iter().filter(|e| e.level == LogLevel::Warn).count();
    assert_eq!(warnings, 3);
    assert!(stored.error.is_none());
}

#[tokio::test]
async fn test_cancellation_fails_run() {
    let harness = Harness::new(&["component-lib", "drift-detector"]).await;
    let service = harness.service(Arc::new(ScriptedOracle::slow(Duration::from_secs(5))));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = service
        .run_discovery(&harness.plexus.id, &DiscoveryOptions::default(), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    let runs = harness.runs.list(&harness.plexus.id, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(runs[0].error.as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn test_storage_failure_fails_run_and_keeps_earlier_weaves() {
    let harness = Harness::new(&["component-lib", "drift-detector"]).await;
    let weaves = Arc::new(FailingWeaves::new(harness.weaves.clone(), 1));
    let service = harness.service_with_weaves(
        Arc::new(design_system_oracle(assessment(true, 0.8))),
        weaves,
    );

    let err = service
        .run_discovery("design-tools", &DiscoveryOptions::default(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Other(ref msg) if msg == "disk I/O error"));
    assert!(!err.is_oracle_failure());

    let runs = harness.runs.list(&harness.plexus.id, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_deref(), Some("disk I/O error"));
    assert!(run.completed_at.is_some());
    assert_eq!(run.counters.weaves_saved, 1);

    let last = run.log.last().expect("failure logged");
    assert_eq!(last.level, LogLevel::Error);
    assert_eq!(last.stage, "philosophical");
    assert_eq!(last.data.as_ref().unwrap()["error"], "disk I/O error");

    let persisted = harness.weaves.list(&harness.plexus.id, None, false).await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].weave_type, WeaveType::DetectsDriftIn);
}

#[tokio::test]
async fn test_unknown_plexus_creates_no_run() {
    let harness = Harness::new(&["component-lib", "drift-detector"]).await;
    let service = harness.service(Arc::new(ScriptedOracle::new()));

    let err = service
        .run_discovery("no-such-plexus", &DiscoveryOptions::default(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ScopeNotFound(_)));
    assert!(harness.runs.list(&harness.plexus.id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_events_bracket_the_run() {
    let harness = Harness::new(&["component-lib", "drift-detector"]).await;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let service = harness
        .service(Arc::new(design_system_oracle(assessment(true, 0.8))))
        .with_events(tx);

    let run = service
        .run_discovery(&harness.plexus.id, &DiscoveryOptions::default(), CancellationToken::new())
        .await
        .unwrap();
    drop(service);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(DiscoveryEvent::RunStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(DiscoveryEvent::RunFinished { status: RunStatus::Completed, .. })
    ));
    let saved = events
        .iter()
        .filter(|e| matches!(e, DiscoveryEvent::WeaveSaved { .. }))
        .count();
    assert_eq!(saved, run.counters.weaves_saved);
    assert!(events.iter().all(|e| e.run_id() == run.id));
}

#[tokio::test]
async fn test_embedding_discovery_groups_file_pairs() {
    let harness = Harness::new(&["alpha", "beta", "gamma"]).await;
    for fragment in [
        Fragment::new("alpha", "src/tokens.rs", "tokens", vec![1.0, 0.0, 0.0]),
        Fragment::new("alpha", "src/tokens.rs", "more tokens", vec![0.95, 0.05, 0.0]),
        Fragment::new("beta", "lib/theme.ts", "theme", vec![0.9, 0.1, 0.0]),
        Fragment::new("gamma", "docs/intro.md", "intro", vec![0.0, 0.0, 1.0]),
    ] {
        harness.fragments.store(&fragment).await.unwrap();
    }
    let service = harness.service(Arc::new(ScriptedOracle::new()));

    let run = service
        .run_embedding_discovery(&harness.plexus.id, &DiscoveryOptions::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counters.pairs_checked, 3);
    assert_eq!(run.counters.weaves_saved, 1);
    assert!(run.log.iter().any(|e| e.message == "No fragment pairs above threshold"));

    let weaves = harness
        .weaves
        .list(&harness.plexus.id, Some(WeaveType::SemanticSimilarity), false)
        .await
        .unwrap();
    assert_eq!(weaves.len(), 1);
    let weave = &weaves[0];
    assert_eq!(weave.source_repo_id, "alpha");
    assert_eq!(weave.target_repo_id, "beta");
    assert_eq!(weave.metadata["fragment_matches"], 2);
    let file_pairs = weave.metadata["file_pairs"].as_array().unwrap();
    assert_eq!(file_pairs.len(), 1);
    assert_eq!(file_pairs[0]["fragment_count"], 2);

    let rerun = service
        .run_embedding_discovery(&harness.plexus.id, &DiscoveryOptions::default(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(rerun.counters.weaves_saved, 0);
    assert_eq!(rerun.counters.weaves_skipped, 1);
}

#[tokio::test]
async fn test_embedding_discovery_needs_two_embedded_repos() {
    let harness = Harness::new(&["alpha", "beta"]).await;
    harness
        .fragments
        .store(&Fragment::new("alpha", "a.rs", "a", vec![1.0, 0.0]))
        .await
        .unwrap();
    let service = harness.service(Arc::new(ScriptedOracle::new()));

    let run = service
        .run_embedding_discovery(&harness.plexus.id, &DiscoveryOptions::default(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counters.pairs_checked, 0);
}
