/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

mod support;

use config_subscription::config::{SubscriptionConfig, TransportEndpoints};
use config_subscription::transport::{
    FileWatchOptions, FileWatchTransport, PollingOptions, PollingTransport,
};
use config_subscription::{
    ConfigurationError, DiscoveryResponse, RawResource, ResourceGroup, StatsSnapshot,
    Subscription, SubscriptionState, VersionInfo,
};
use futures::future::join;
use integration_test_utils::{
    wait_for_stats, AdsSubscriptionTestHarness, FilesystemSubscriptionTestHarness,
    GrpcSubscriptionTestHarness, MockPollingAuthority, RecordingCallbacks,
    SubscriptionTestHarness, EXPECT_TIMEOUT,
};
use json_resource_translator::{ClusterTranslator, RouteConfigurationTranslator};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use support::{cluster_response, INITIAL_NAMES};
use tokio::time::Instant;

async fn eventually<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + EXPECT_TIMEOUT;
    while !condition() {
        if Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn refused_connects_count_as_failures_then_request_is_resent() {
    integration_test_utils::init_logging();
    let mut harness = GrpcSubscriptionTestHarness::new();
    harness.authority().refuse_next(2);

    // The first request is queued during the outage and replaced by the resend.
    harness.start_subscription(&INITIAL_NAMES).await;
    harness.verify_stats(2, 0, 0, 2).await;
    assert_eq!(harness.authority().connect_attempts(), 3);

    harness
        .deliver_config_update(&INITIAL_NAMES, "0", true)
        .await;
    harness.verify_stats(3, 1, 0, 2).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_version_is_dropped_without_counting() {
    integration_test_utils::init_logging();
    let mut harness = GrpcSubscriptionTestHarness::new();
    harness.start_subscription(&INITIAL_NAMES).await;
    harness
        .deliver_config_update(&INITIAL_NAMES, "2", true)
        .await;
    harness.verify_stats(2, 1, 0, 0).await;

    harness
        .respond(cluster_response(&INITIAL_NAMES, "1", "late"))
        .await;
    harness.expect_no_send_message().await;

    harness.verify_stats(2, 1, 0, 0).await;
    assert_eq!(
        harness.subscription().current_version().await,
        Some(VersionInfo::from("2"))
    );
    assert_eq!(harness.callbacks().notification_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn response_for_unknown_group_is_dropped_by_the_mux() {
    integration_test_utils::init_logging();
    let mut harness = AdsSubscriptionTestHarness::new();
    harness.start_subscription(&INITIAL_NAMES).await;

    harness
        .respond(DiscoveryResponse::new(
            ResourceGroup::from("listeners"),
            VersionInfo::from("1"),
            Vec::new(),
        ))
        .await;
    harness.expect_no_send_message().await;

    harness.verify_stats(1, 0, 0, 0).await;
    assert_eq!(harness.callbacks().notification_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn aggregated_stream_multiplexes_groups_and_broadcasts_failures() {
    integration_test_utils::init_logging();
    let mut harness = AdsSubscriptionTestHarness::new();
    harness.start_subscription(&INITIAL_NAMES).await;

    let route_callbacks = Arc::new(RecordingCallbacks::default());
    let routes = Subscription::new(
        "routes",
        harness.stream().transport(),
        RouteConfigurationTranslator,
        route_callbacks.clone(),
    );
    routes.start(["local_routes"]).await.unwrap();
    let initial = harness.next_request().await;
    assert_eq!(initial.group.as_str(), "routes");
    assert_eq!(initial.resource_names, vec!["local_routes".to_string()]);

    harness
        .respond(
            DiscoveryResponse::new(
                ResourceGroup::from("routes"),
                VersionInfo::from("7"),
                vec![RawResource::new(
                    "local_routes",
                    json!({
                        "virtual_hosts": [{
                            "name": "local",
                            "domains": ["*"],
                            "routes": [{ "prefix": "/", "cluster": "cluster0" }],
                        }],
                    }),
                )],
            )
            .with_nonce("routes-1"),
        )
        .await;
    let ack = harness.next_request().await;
    assert_eq!(ack.group.as_str(), "routes");
    assert_eq!(ack.version_info.as_str(), "7");
    assert_eq!(ack.response_nonce, "routes-1");

    wait_for_stats(&routes, StatsSnapshot::new(2, 1, 0, 0)).await;
    harness.verify_stats(1, 0, 0, 0).await;
    assert_eq!(harness.stream().groups().len(), 2);

    harness.fail_transport().await;
    join(
        wait_for_stats(&routes, StatsSnapshot::new(3, 1, 0, 1)),
        harness.verify_stats(2, 0, 0, 1),
    )
    .await;

    let mut resent = vec![harness.next_request().await, harness.next_request().await];
    resent.sort_by(|a, b| a.group.cmp(&b.group));
    assert_eq!(resent[0].group.as_str(), "clusters");
    assert_eq!(resent[0].version_info.as_str(), "");
    assert_eq!(resent[1].group.as_str(), "routes");
    assert_eq!(resent[1].version_info.as_str(), "7");
    assert!(resent.iter().all(|request| request.response_nonce.is_empty()));

    routes.shutdown().await;
    drop(routes);
    assert_eq!(
        harness.stream().groups(),
        vec![ResourceGroup::from("clusters")]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unreadable_document_keeps_accepted_version() {
    integration_test_utils::init_logging();
    let mut harness = FilesystemSubscriptionTestHarness::new();
    harness.start_subscription(&INITIAL_NAMES).await;
    harness
        .deliver_config_update(&INITIAL_NAMES, "3", true)
        .await;

    harness.fail_transport().await;
    harness.verify_stats(2, 1, 0, 1).await;

    assert_eq!(harness.subscription().state().await, SubscriptionState::Failed);
    assert_eq!(
        harness.subscription().current_version().await,
        Some(VersionInfo::from("3"))
    );
    harness.expect_no_send_message().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn document_without_version_gets_a_derived_one() {
    integration_test_utils::init_logging();
    let mut harness = FilesystemSubscriptionTestHarness::new();
    harness.start_subscription(&["cluster0"]).await;

    harness.write_document(
        &json!({ "resources": [{ "name": "cluster0", "body": { "name": "cluster0" } }] })
            .to_string(),
    );
    harness.verify_stats(2, 1, 0, 0).await;

    let version = harness.subscription().current_version().await.unwrap();
    let (nanos, fingerprint) = version.as_str().split_once('.').unwrap();
    assert!(nanos.parse::<u128>().is_ok(), "{version}");
    assert_eq!(fingerprint.len(), 16);
}

fn sequence_of(version: &VersionInfo) -> u128 {
    match version.as_str().split_once('.') {
        Some((sequence, _)) => sequence.parse().unwrap(),
        None => panic!("not a derived version: {version}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn restored_document_with_older_mtime_is_applied() {
    integration_test_utils::init_logging();
    let mut harness = FilesystemSubscriptionTestHarness::new();
    harness.start_subscription(&INITIAL_NAMES).await;

    harness.write_document(
        &json!({ "resources": [{ "name": "cluster0", "body": { "name": "cluster0" } }] })
            .to_string(),
    );
    harness.verify_stats(2, 1, 0, 0).await;
    let first = harness.subscription().current_version().await.unwrap();

    let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);
    harness.write_document_modified_at(
        &json!({ "resources": [
            { "name": "cluster0", "body": { "name": "cluster0" } },
            { "name": "cluster1", "body": { "name": "cluster1" } },
        ] })
        .to_string(),
        an_hour_ago,
    );
    harness.verify_stats(3, 2, 0, 0).await;

    let second = harness.subscription().current_version().await.unwrap();
    assert!(sequence_of(&second) > sequence_of(&first), "{first} then {second}");
    let updates = harness.callbacks().updates();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[1].resource_count, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn start_can_be_retried_once_the_directory_exists() {
    integration_test_utils::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let parent = dir.path().join("config");
    let document = parent.join("clusters.json");
    let subscription = Subscription::new(
        "clusters",
        FileWatchTransport::new(&document, FileWatchOptions::default()),
        ClusterTranslator,
        Arc::new(RecordingCallbacks::default()),
    );

    assert!(matches!(
        subscription.start(["cluster0"]).await,
        Err(ConfigurationError::TransportUnavailable(_))
    ));
    assert_eq!(subscription.stats(), StatsSnapshot::new(0, 0, 0, 0));
    assert!(!subscription.is_started().await);

    std::fs::create_dir_all(&parent).unwrap();
    std::fs::write(
        &document,
        json!({
            "version_info": "1",
            "resources": [{ "name": "cluster0", "body": { "name": "cluster0" } }],
        })
        .to_string(),
    )
    .unwrap();
    subscription.start(["cluster0"]).await.unwrap();

    wait_for_stats(&subscription, StatsSnapshot::new(2, 1, 0, 0)).await;
    assert_eq!(subscription.current_version().await, Some(VersionInfo::from("1")));
    subscription.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn deleted_document_counts_a_failure_under_a_real_watcher() {
    integration_test_utils::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let document = dir.path().join("clusters.json");
    std::fs::write(
        &document,
        json!({
            "version_info": "4",
            "resources": [{ "name": "cluster0", "body": { "name": "cluster0" } }],
        })
        .to_string(),
    )
    .unwrap();

    let callbacks = Arc::new(RecordingCallbacks::default());
    let subscription = Subscription::new(
        "clusters",
        FileWatchTransport::new(&document, FileWatchOptions::default()),
        ClusterTranslator,
        callbacks.clone(),
    );
    subscription.start(["cluster0"]).await.unwrap();
    wait_for_stats(&subscription, StatsSnapshot::new(2, 1, 0, 0)).await;

    std::fs::remove_file(&document).unwrap();
    eventually("the removal to be reported", || subscription.stats().failure >= 1).await;

    assert_eq!(subscription.stats().rejected, 0);
    assert_eq!(subscription.current_version().await, Some(VersionInfo::from("4")));
    assert!(callbacks.failures()[0].starts_with("transport:"));
    subscription.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn config_file_drives_a_watched_document() {
    integration_test_utils::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let document = dir.path().join("clusters.json");
    std::fs::write(
        &document,
        json!({
            "version_info": "5",
            "resources": [{ "name": "cluster0", "body": { "name": "cluster0" } }],
        })
        .to_string(),
    )
    .unwrap();

    let config: SubscriptionConfig = format!(
        r#"{{
            // Watches the document through the filesystem.
            group: "clusters",
            resource_names: ["cluster0"],
            transport: {{ file_watch: {{ path: {:?} }} }},
        }}"#,
        document.display().to_string()
    )
    .parse()
    .unwrap();
    let transport = config
        .transport
        .build(&TransportEndpoints::default())
        .unwrap();

    let subscription = Subscription::new(
        config.group.clone(),
        transport,
        ClusterTranslator,
        Arc::new(RecordingCallbacks::default()),
    );
    subscription
        .start(config.resource_names.clone())
        .await
        .unwrap();

    let target = Some(VersionInfo::from("5"));
    let deadline = Instant::now() + EXPECT_TIMEOUT;
    while subscription.current_version().await != target {
        assert!(Instant::now() < deadline, "document was never accepted");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    std::fs::write(
        &document,
        json!({
            "version_info": "6",
            "resources": [{ "name": "cluster0", "body": { "name": "cluster0" } }],
        })
        .to_string(),
    )
    .unwrap();

    let target = Some(VersionInfo::from("6"));
    while subscription.current_version().await != target {
        assert!(Instant::now() < deadline, "edit was never picked up");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(subscription.stats().rejected, 0);

    subscription.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_abandons_the_poll_in_flight() {
    integration_test_utils::init_logging();
    let (authority, mut exchanges) = MockPollingAuthority::new();
    let callbacks = Arc::new(RecordingCallbacks::default());
    let subscription = Subscription::new(
        "clusters",
        PollingTransport::new(authority, PollingOptions::default()),
        ClusterTranslator,
        callbacks.clone(),
    );
    subscription.start(INITIAL_NAMES).await.unwrap();

    let exchange = tokio::time::timeout(EXPECT_TIMEOUT, exchanges.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(!exchange.is_abandoned());

    subscription.shutdown().await;
    eventually("the exchange to be abandoned", || exchange.is_abandoned()).await;

    assert_eq!(subscription.stats(), StatsSnapshot::new(1, 0, 0, 0));
    assert_eq!(callbacks.notification_count(), 0);
}
