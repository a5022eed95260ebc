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

//! One scripted conversation, four transports.
//!
//! Every harness owns a [`Subscription`] to the `clusters` group translated by
//! [`ClusterTranslator`], plus the authority end of its transport. Scenario tests
//! drive the harness through the same calls regardless of the transport beneath.

use crate::mock_authority::{
    MockPollingAuthority, MockStreamAuthority, PendingExchange, StreamSession, EXPECT_TIMEOUT,
    QUIET_PERIOD,
};
use crate::recording_callbacks::RecordingCallbacks;
use async_trait::async_trait;
use config_subscription::transport::backoff::FixedBackoff;
use config_subscription::transport::{
    AggregatedStream, FileChangeNotifier, FileWatchOptions, FileWatchTransport, PollingOptions,
    PollingTransport, RecordedRequests, StreamingOptions, StreamingTransport,
};
use config_subscription::{
    ConfigurationError, DiscoveryRequest, DiscoveryResponse, RawResource, ResourceGroup,
    ResourceTranslator, StatsSnapshot, Subscription, TransportError, VersionInfo,
};
use json_resource_translator::ClusterTranslator;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tracing::debug;

pub const TEST_GROUP: &str = "clusters";

const RECONNECT_DELAY: Duration = Duration::from_millis(10);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionType {
    Grpc,
    Http,
    Filesystem,
    Ads,
}

impl SubscriptionType {
    pub const ALL: [SubscriptionType; 4] = [
        SubscriptionType::Grpc,
        SubscriptionType::Http,
        SubscriptionType::Filesystem,
        SubscriptionType::Ads,
    ];
}

/// Builds the harness for `kind`. Must be called inside a tokio runtime.
pub fn make_harness(kind: SubscriptionType) -> Box<dyn SubscriptionTestHarness> {
    match kind {
        SubscriptionType::Grpc => Box::new(GrpcSubscriptionTestHarness::new()),
        SubscriptionType::Http => Box::new(HttpSubscriptionTestHarness::new()),
        SubscriptionType::Filesystem => Box::new(FilesystemSubscriptionTestHarness::new()),
        SubscriptionType::Ads => Box::new(AdsSubscriptionTestHarness::new()),
    }
}

/// Cluster payloads named after `names`; invalid ones fail translation.
pub fn cluster_resources(names: &[&str], valid: bool) -> Vec<RawResource> {
    names
        .iter()
        .map(|name| {
            let body = if valid {
                json!({ "name": name, "hosts": [{ "url": "tcp://127.0.0.1:8080" }] })
            } else {
                json!({ "name": name, "lb_type": "no_such_policy" })
            };
            RawResource::new(*name, body)
        })
        .collect()
}

/// Waits until the counters equal `expected`; panics with the last snapshot otherwise.
pub async fn wait_for_stats<T: ResourceTranslator>(
    subscription: &Subscription<T>,
    expected: StatsSnapshot,
) {
    let deadline = Instant::now() + EXPECT_TIMEOUT;
    loop {
        let actual = subscription.stats();
        if actual == expected {
            return;
        }
        if Instant::now() >= deadline {
            panic!("stats never reached {expected}; last seen {actual}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn assert_request(request: &DiscoveryRequest, names: &[&str], version: &str) {
    let mut expected: Vec<String> = names.iter().map(|name| name.to_string()).collect();
    expected.sort();
    assert_eq!(request.group.as_str(), TEST_GROUP);
    assert_eq!(request.resource_names, expected, "requested names");
    assert_eq!(request.version_info.as_str(), version, "requested version");
}

/// Checks the follow-up a delivery provoked.
fn assert_follow_up(
    request: &DiscoveryRequest,
    conversation: &Conversation,
    nonce: &str,
    ack: bool,
) {
    let names: Vec<&str> = conversation.names.iter().map(String::as_str).collect();
    assert_request(request, &names, &conversation.accepted_version);
    assert_eq!(request.response_nonce, nonce, "follow-up nonce");
    assert_eq!(request.is_nack(), !ack, "ACK/NACK kind of {request:?}");
}

/// What the harness believes the client should be asking for next.
#[derive(Default)]
struct Conversation {
    names: Vec<String>,
    accepted_version: String,
    nonces: u64,
}

impl Conversation {
    fn subscribe(&mut self, names: &[&str]) {
        self.names = names.iter().map(|name| name.to_string()).collect();
    }

    fn delivered(&mut self, version: &str, accept: bool) -> String {
        if accept {
            self.accepted_version = version.to_string();
        }
        self.nonces += 1;
        format!("nonce-{}", self.nonces)
    }
}

fn response(names: &[&str], version: &str, accept: bool, nonce: &str) -> DiscoveryResponse {
    DiscoveryResponse::new(
        ResourceGroup::from(TEST_GROUP),
        VersionInfo::from(version),
        cluster_resources(names, accept),
    )
    .with_nonce(nonce)
}

#[async_trait]
pub trait SubscriptionTestHarness: Send + Sync {
    fn kind(&self) -> SubscriptionType;

    fn subscription(&self) -> &Subscription<ClusterTranslator>;

    fn callbacks(&self) -> &RecordingCallbacks;

    /// Starts the subscription and consumes its initial request.
    async fn start_subscription(&mut self, names: &[&str]);

    async fn update_resources(&mut self, names: &[&str]) -> Result<(), ConfigurationError>;

    /// The next request the client puts on the wire asks for `names` at `version`.
    async fn expect_send_message(&mut self, names: &[&str], version: &str);

    /// Nothing reaches the wire for a while.
    async fn expect_no_send_message(&mut self);

    /// Hands the client a response and consumes the ACK or NACK it provokes.
    async fn deliver_config_update(&mut self, names: &[&str], version: &str, accept: bool);

    /// Breaks the channel once. Stream and polling clients then resend their last
    /// request, which is left on the wire for [`expect_send_message`].
    ///
    /// [`expect_send_message`]: SubscriptionTestHarness::expect_send_message
    async fn fail_transport(&mut self);

    async fn verify_stats(&self, attempt: u64, success: u64, rejected: u64, failure: u64) {
        wait_for_stats(
            self.subscription(),
            StatsSnapshot::new(attempt, success, rejected, failure),
        )
        .await;
    }

    async fn shutdown(&mut self) {
        self.subscription().shutdown().await;
    }
}

/// Authority end shared by the dedicated and the aggregated stream harnesses.
struct StreamAuthorityEnd {
    authority: Arc<MockStreamAuthority>,
    sessions: UnboundedReceiver<StreamSession>,
    session: Option<StreamSession>,
}

impl StreamAuthorityEnd {
    fn new() -> Self {
        let (authority, sessions) = MockStreamAuthority::new();
        Self {
            authority,
            sessions,
            session: None,
        }
    }

    async fn session(&mut self) -> &mut StreamSession {
        let session = match self.session.take() {
            Some(session) => session,
            None => tokio::time::timeout(EXPECT_TIMEOUT, self.sessions.recv())
                .await
                .unwrap_or_else(|_| panic!("client did not connect within {EXPECT_TIMEOUT:?}"))
                .unwrap_or_else(|| panic!("mock authority closed")),
        };
        self.session.insert(session)
    }

    async fn next_request(&mut self) -> DiscoveryRequest {
        self.session().await.next_request().await
    }

    async fn is_quiet(&mut self) -> bool {
        match self.session.as_mut() {
            Some(session) => session.is_quiet().await,
            None => tokio::time::timeout(QUIET_PERIOD, self.sessions.recv())
                .await
                .is_err(),
        }
    }

    async fn break_session(&mut self) {
        self.session().await;
        if let Some(session) = self.session.take() {
            session.fail(TransportError::ConnectionLost("reset by mock authority".to_string()));
        }
    }
}

pub struct GrpcSubscriptionTestHarness {
    subscription: Subscription<ClusterTranslator>,
    callbacks: Arc<RecordingCallbacks>,
    authority: StreamAuthorityEnd,
    conversation: Conversation,
}

impl GrpcSubscriptionTestHarness {
    pub fn new() -> Self {
        let authority = StreamAuthorityEnd::new();
        let transport = StreamingTransport::new(
            authority.authority.clone(),
            StreamingOptions::default(),
        )
        .with_backoff(Box::new(FixedBackoff::new(RECONNECT_DELAY)));
        let callbacks = Arc::new(RecordingCallbacks::default());
        Self {
            subscription: Subscription::new(
                TEST_GROUP,
                transport,
                ClusterTranslator,
                callbacks.clone(),
            ),
            callbacks,
            authority,
            conversation: Conversation::default(),
        }
    }

    pub fn authority(&self) -> &MockStreamAuthority {
        &self.authority.authority
    }

    /// Sends `response` as is, without waiting for a follow-up.
    pub async fn respond(&mut self, response: DiscoveryResponse) {
        self.authority.session().await.respond(response);
    }
}

impl Default for GrpcSubscriptionTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionTestHarness for GrpcSubscriptionTestHarness {
    fn kind(&self) -> SubscriptionType {
        SubscriptionType::Grpc
    }

    fn subscription(&self) -> &Subscription<ClusterTranslator> {
        &self.subscription
    }

    fn callbacks(&self) -> &RecordingCallbacks {
        &self.callbacks
    }

    async fn start_subscription(&mut self, names: &[&str]) {
        self.conversation.subscribe(names);
        if let Err(err) = self.subscription.start(names.iter().copied()).await {
            panic!("start failed: {err}");
        }
        self.expect_send_message(names, "").await;
    }

    async fn update_resources(&mut self, names: &[&str]) -> Result<(), ConfigurationError> {
        self.subscription
            .update_resources(names.iter().copied())
            .await?;
        self.conversation.subscribe(names);
        Ok(())
    }

    async fn expect_send_message(&mut self, names: &[&str], version: &str) {
        let request = self.authority.next_request().await;
        assert_request(&request, names, version);
    }

    async fn expect_no_send_message(&mut self) {
        assert!(self.authority.is_quiet().await, "unexpected request on the stream");
    }

    async fn deliver_config_update(&mut self, names: &[&str], version: &str, accept: bool) {
        let nonce = self.conversation.delivered(version, accept);
        self.authority
            .session()
            .await
            .respond(response(names, version, accept, &nonce));

        let follow_up = self.authority.next_request().await;
        assert_follow_up(&follow_up, &self.conversation, &nonce, accept);
    }

    async fn fail_transport(&mut self) {
        self.authority.break_session().await;
    }
}

pub struct AdsSubscriptionTestHarness {
    stream: AggregatedStream,
    subscription: Subscription<ClusterTranslator>,
    callbacks: Arc<RecordingCallbacks>,
    authority: StreamAuthorityEnd,
    conversation: Conversation,
}

impl AdsSubscriptionTestHarness {
    pub fn new() -> Self {
        let authority = StreamAuthorityEnd::new();
        let stream = AggregatedStream::with_backoff(
            authority.authority.clone(),
            Box::new(FixedBackoff::new(RECONNECT_DELAY)),
        );
        let callbacks = Arc::new(RecordingCallbacks::default());
        Self {
            subscription: Subscription::new(
                TEST_GROUP,
                stream.transport(),
                ClusterTranslator,
                callbacks.clone(),
            ),
            stream,
            callbacks,
            authority,
            conversation: Conversation::default(),
        }
    }

    /// The shared stream, for attaching further groups.
    pub fn stream(&self) -> &AggregatedStream {
        &self.stream
    }

    /// Sends `response` as is, without waiting for a follow-up.
    pub async fn respond(&mut self, response: DiscoveryResponse) {
        self.authority.session().await.respond(response);
    }

    /// Next request on the shared stream, whichever group it belongs to.
    pub async fn next_request(&mut self) -> DiscoveryRequest {
        self.authority.next_request().await
    }
}

impl Default for AdsSubscriptionTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionTestHarness for AdsSubscriptionTestHarness {
    fn kind(&self) -> SubscriptionType {
        SubscriptionType::Ads
    }

    fn subscription(&self) -> &Subscription<ClusterTranslator> {
        &self.subscription
    }

    fn callbacks(&self) -> &RecordingCallbacks {
        &self.callbacks
    }

    async fn start_subscription(&mut self, names: &[&str]) {
        self.conversation.subscribe(names);
        if let Err(err) = self.subscription.start(names.iter().copied()).await {
            panic!("start failed: {err}");
        }
        self.expect_send_message(names, "").await;
    }

    async fn update_resources(&mut self, names: &[&str]) -> Result<(), ConfigurationError> {
        self.subscription
            .update_resources(names.iter().copied())
            .await?;
        self.conversation.subscribe(names);
        Ok(())
    }

    async fn expect_send_message(&mut self, names: &[&str], version: &str) {
        let request = self.authority.next_request().await;
        assert_request(&request, names, version);
    }

    async fn expect_no_send_message(&mut self) {
        assert!(self.authority.is_quiet().await, "unexpected request on the stream");
    }

    async fn deliver_config_update(&mut self, names: &[&str], version: &str, accept: bool) {
        let nonce = self.conversation.delivered(version, accept);
        self.authority
            .session()
            .await
            .respond(response(names, version, accept, &nonce));

        let follow_up = self.authority.next_request().await;
        assert_follow_up(&follow_up, &self.conversation, &nonce, accept);
    }

    async fn fail_transport(&mut self) {
        self.authority.break_session().await;
    }

    async fn shutdown(&mut self) {
        self.subscription.shutdown().await;
        self.stream.shutdown();
    }
}

pub struct HttpSubscriptionTestHarness {
    subscription: Subscription<ClusterTranslator>,
    callbacks: Arc<RecordingCallbacks>,
    exchanges: UnboundedReceiver<PendingExchange>,
    pending: Option<PendingExchange>,
    conversation: Conversation,
}

impl HttpSubscriptionTestHarness {
    pub fn new() -> Self {
        let (authority, exchanges) = MockPollingAuthority::new();
        let transport = PollingTransport::new(
            authority,
            PollingOptions {
                poll_interval: POLL_INTERVAL,
                request_timeout: Duration::from_secs(30),
                retry_delay: RECONNECT_DELAY,
            },
        );
        let callbacks = Arc::new(RecordingCallbacks::default());
        Self {
            subscription: Subscription::new(
                TEST_GROUP,
                transport,
                ClusterTranslator,
                callbacks.clone(),
            ),
            callbacks,
            exchanges,
            pending: None,
            conversation: Conversation::default(),
        }
    }

    /// Takes the next exchange; an unanswered earlier one must have been abandoned.
    async fn next_exchange(&mut self) -> &PendingExchange {
        let exchange = tokio::time::timeout(EXPECT_TIMEOUT, self.exchanges.recv())
            .await
            .unwrap_or_else(|_| panic!("no poll within {EXPECT_TIMEOUT:?}"))
            .unwrap_or_else(|| panic!("polling transport stopped"));
        if let Some(previous) = self.pending.take() {
            debug!(request = ?previous.request, "superseded exchange discarded");
        }
        self.pending.insert(exchange)
    }
}

impl Default for HttpSubscriptionTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionTestHarness for HttpSubscriptionTestHarness {
    fn kind(&self) -> SubscriptionType {
        SubscriptionType::Http
    }

    fn subscription(&self) -> &Subscription<ClusterTranslator> {
        &self.subscription
    }

    fn callbacks(&self) -> &RecordingCallbacks {
        &self.callbacks
    }

    async fn start_subscription(&mut self, names: &[&str]) {
        self.conversation.subscribe(names);
        if let Err(err) = self.subscription.start(names.iter().copied()).await {
            panic!("start failed: {err}");
        }
        self.expect_send_message(names, "").await;
    }

    async fn update_resources(&mut self, names: &[&str]) -> Result<(), ConfigurationError> {
        self.subscription
            .update_resources(names.iter().copied())
            .await?;
        self.conversation.subscribe(names);
        Ok(())
    }

    async fn expect_send_message(&mut self, names: &[&str], version: &str) {
        let request = self.next_exchange().await.request.clone();
        assert_request(&request, names, version);
    }

    async fn expect_no_send_message(&mut self) {
        assert!(
            tokio::time::timeout(QUIET_PERIOD, self.exchanges.recv())
                .await
                .is_err(),
            "unexpected poll"
        );
    }

    async fn deliver_config_update(&mut self, names: &[&str], version: &str, accept: bool) {
        let nonce = self.conversation.delivered(version, accept);
        let Some(exchange) = self.pending.take() else {
            panic!("no poll is waiting for an answer");
        };
        exchange.respond(response(names, version, accept, &nonce));

        let follow_up = self.next_exchange().await.request.clone();
        assert_follow_up(&follow_up, &self.conversation, &nonce, accept);
    }

    async fn fail_transport(&mut self) {
        let Some(exchange) = self.pending.take() else {
            panic!("no poll is waiting for an answer");
        };
        exchange.fail(TransportError::ConnectFailed("503 from mock authority".to_string()));
    }
}

pub struct FilesystemSubscriptionTestHarness {
    subscription: Subscription<ClusterTranslator>,
    callbacks: Arc<RecordingCallbacks>,
    _dir: tempfile::TempDir,
    path: PathBuf,
    notifier: FileChangeNotifier,
    recorded: RecordedRequests,
    consumed: usize,
    conversation: Conversation,
}

impl FilesystemSubscriptionTestHarness {
    pub fn new() -> Self {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(err) => panic!("unable to create a temporary directory: {err}"),
        };
        let path = dir.path().join("clusters.json");
        let transport = FileWatchTransport::new(
            &path,
            FileWatchOptions {
                watch_filesystem: false,
            },
        );
        let notifier = transport.notifier();
        let recorded = transport.recorded_requests();
        let callbacks = Arc::new(RecordingCallbacks::default());
        Self {
            subscription: Subscription::new(
                TEST_GROUP,
                transport,
                ClusterTranslator,
                callbacks.clone(),
            ),
            callbacks,
            _dir: dir,
            path,
            notifier,
            recorded,
            consumed: 0,
            conversation: Conversation::default(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Rewrites the watched document and signals the change.
    pub fn write_document(&self, contents: &str) {
        if let Err(err) = std::fs::write(&self.path, contents) {
            panic!("unable to write {}: {err}", self.path.display());
        }
        assert!(self.notifier.notify(), "file watch transport is gone");
    }

    /// Like [`write_document`](Self::write_document), but stamps the file with
    /// `modified` before signalling, as a copy that preserves timestamps would.
    pub fn write_document_modified_at(&self, contents: &str, modified: SystemTime) {
        let written = std::fs::write(&self.path, contents).and_then(|()| {
            std::fs::File::options()
                .write(true)
                .open(&self.path)?
                .set_modified(modified)
        });
        if let Err(err) = written {
            panic!("unable to write {}: {err}", self.path.display());
        }
        assert!(self.notifier.notify(), "file watch transport is gone");
    }

    async fn next_recorded(&mut self) -> DiscoveryRequest {
        let deadline = Instant::now() + EXPECT_TIMEOUT;
        loop {
            if let Some(request) = self.recorded.get(self.consumed) {
                self.consumed += 1;
                return request;
            }
            if Instant::now() >= deadline {
                panic!("no request recorded within {EXPECT_TIMEOUT:?}");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Default for FilesystemSubscriptionTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionTestHarness for FilesystemSubscriptionTestHarness {
    fn kind(&self) -> SubscriptionType {
        SubscriptionType::Filesystem
    }

    fn subscription(&self) -> &Subscription<ClusterTranslator> {
        &self.subscription
    }

    fn callbacks(&self) -> &RecordingCallbacks {
        &self.callbacks
    }

    async fn start_subscription(&mut self, names: &[&str]) {
        self.conversation.subscribe(names);
        if let Err(err) = self.subscription.start(names.iter().copied()).await {
            panic!("start failed: {err}");
        }
        self.expect_send_message(names, "").await;
    }

    async fn update_resources(&mut self, names: &[&str]) -> Result<(), ConfigurationError> {
        self.subscription
            .update_resources(names.iter().copied())
            .await?;
        self.conversation.subscribe(names);
        Ok(())
    }

    async fn expect_send_message(&mut self, names: &[&str], version: &str) {
        let request = self.next_recorded().await;
        assert_request(&request, names, version);
    }

    async fn expect_no_send_message(&mut self) {
        tokio::time::sleep(QUIET_PERIOD).await;
        assert_eq!(self.recorded.len(), self.consumed, "unexpected recorded request");
    }

    async fn deliver_config_update(&mut self, names: &[&str], version: &str, accept: bool) {
        // The document's own version doubles as the nonce of the delivery.
        self.conversation.delivered(version, accept);
        let document = json!({
            "version_info": version,
            "resources": cluster_resources(names, accept),
        });
        self.write_document(&document.to_string());

        let follow_up = self.next_recorded().await;
        assert_follow_up(&follow_up, &self.conversation, version, accept);
    }

    async fn fail_transport(&mut self) {
        self.write_document("{ this is not json");
    }
}
