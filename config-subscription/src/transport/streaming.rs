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

//! Single-group transport over one long-lived bidirectional stream.

use crate::error::TransportError;
use crate::observability::events;
use crate::resource::{DiscoveryRequest, DiscoveryResponse};
use crate::transport::backoff::{BackoffStrategy, JitteredExponentialBackoff};
use crate::transport::{EventSender, TransportEvent};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMPONENT: &str = "streaming_transport";

/// Both halves of an open discovery stream.
///
/// Dropping `outbound` half-closes the stream towards the authority. The inbound
/// half yields `None` or an error once the stream is gone.
pub struct DiscoveryStream {
    outbound: UnboundedSender<DiscoveryRequest>,
    inbound: UnboundedReceiver<Result<DiscoveryResponse, TransportError>>,
}

impl DiscoveryStream {
    pub fn new(
        outbound: UnboundedSender<DiscoveryRequest>,
        inbound: UnboundedReceiver<Result<DiscoveryResponse, TransportError>>,
    ) -> Self {
        Self { outbound, inbound }
    }
}

/// Opens streams towards the authority. Wire framing lives behind this seam.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use config_subscription::transport::{DiscoveryStream, StreamConnector};
/// use config_subscription::TransportError;
///
/// struct Unreachable;
///
/// #[async_trait]
/// impl StreamConnector for Unreachable {
///     async fn connect(&self) -> Result<DiscoveryStream, TransportError> {
///         Err(TransportError::ConnectFailed("connection refused".to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait StreamConnector: Send + Sync + 'static {
    async fn connect(&self) -> Result<DiscoveryStream, TransportError>;
}

/// Reconnect tunables for stream-based transports.
#[derive(Clone, Debug)]
pub struct StreamingOptions {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for StreamingOptions {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl StreamingOptions {
    pub(crate) fn backoff(&self) -> Box<dyn BackoffStrategy> {
        Box::new(JitteredExponentialBackoff::new(
            self.initial_backoff,
            self.max_backoff,
        ))
    }
}

/// Destination of everything a stream pump observes.
pub(crate) trait StreamEventSink: Send + 'static {
    fn deliver(&self, response: DiscoveryResponse);
    fn fail(&self, error: TransportError);
    fn reconnected(&self);
}

impl StreamEventSink for EventSender {
    fn deliver(&self, response: DiscoveryResponse) {
        let _ = self.send(TransportEvent::Response(response));
    }

    fn fail(&self, error: TransportError) {
        let _ = self.send(TransportEvent::Error(error));
    }

    fn reconnected(&self) {
        let _ = self.send(TransportEvent::Reconnected);
    }
}

/// Connects, pumps requests and responses, and reconnects with backoff on failure.
///
/// Requests queued while the stream was down are discarded once it is back: the
/// owning controllers resend their latest request when told about the reconnect.
/// Returns when the request queue is closed.
pub(crate) async fn run_stream<S: StreamEventSink>(
    component: &'static str,
    connector: Arc<dyn StreamConnector>,
    mut backoff: Box<dyn BackoffStrategy>,
    mut requests: UnboundedReceiver<DiscoveryRequest>,
    sink: S,
) {
    let mut recovering = false;

    loop {
        let mut stream = match connector.connect().await {
            Ok(stream) => stream,
            Err(err) => {
                let delay = backoff.next_backoff();
                warn!(
                    event = events::STREAM_CONNECT_FAILED,
                    component,
                    err = %err,
                    backoff_ms = delay.as_millis() as u64,
                    "unable to open discovery stream"
                );
                sink.fail(err);
                recovering = true;
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        backoff.reset();
        info!(event = events::STREAM_CONNECT_OK, component, recovering, "discovery stream open");

        if recovering {
            let mut discarded = 0usize;
            while requests.try_recv().is_ok() {
                discarded += 1;
            }
            if discarded > 0 {
                debug!(
                    event = events::STREAM_STALE_REQUESTS_DISCARDED,
                    component, discarded, "dropped requests queued during outage"
                );
            }
            sink.reconnected();
            recovering = false;
        }

        let failure = loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => {
                        if stream.outbound.send(request).is_err() {
                            break TransportError::ConnectionLost(
                                "outbound half closed".to_string(),
                            );
                        }
                    }
                    None => {
                        debug!(
                            event = events::TRANSPORT_TASK_EXIT,
                            component, "request queue closed; stopping stream"
                        );
                        return;
                    }
                },
                message = stream.inbound.recv() => match message {
                    Some(Ok(response)) => sink.deliver(response),
                    Some(Err(err)) => break err,
                    None => break TransportError::Closed,
                },
            }
        };

        let delay = backoff.next_backoff();
        warn!(
            event = events::STREAM_CLOSED,
            component,
            err = %failure,
            backoff_ms = delay.as_millis() as u64,
            "discovery stream failed"
        );
        sink.fail(failure);
        recovering = true;

        drop(stream);
        debug!(
            event = events::STREAM_BACKOFF,
            component,
            backoff_ms = delay.as_millis() as u64,
            "waiting before reconnect"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Streaming strategy for exactly one resource group.
pub struct StreamingTransport {
    connector: Arc<dyn StreamConnector>,
    backoff: Option<Box<dyn BackoffStrategy>>,
    requests: Option<UnboundedSender<DiscoveryRequest>>,
    task: Option<JoinHandle<()>>,
}

impl StreamingTransport {
    pub fn new(connector: Arc<dyn StreamConnector>, options: StreamingOptions) -> Self {
        Self {
            connector,
            backoff: Some(options.backoff()),
            requests: None,
            task: None,
        }
    }

    /// Replaces the reconnect schedule.
    pub fn with_backoff(mut self, backoff: Box<dyn BackoffStrategy>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub(crate) fn start(&mut self, events: EventSender) -> Result<(), TransportError> {
        let backoff = self.backoff.take().ok_or(TransportError::Closed)?;
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();

        self.requests = Some(requests_tx);
        self.task = Some(tokio::spawn(run_stream(
            COMPONENT,
            self.connector.clone(),
            backoff,
            requests_rx,
            events,
        )));
        Ok(())
    }

    pub(crate) fn send(&self, request: DiscoveryRequest) -> Result<(), TransportError> {
        self.requests
            .as_ref()
            .ok_or(TransportError::Closed)?
            .send(request)
            .map_err(|_| TransportError::Closed)
    }

    pub(crate) fn close(&mut self) {
        self.requests.take();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for StreamingTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::{run_stream, DiscoveryStream, StreamConnector};
    use crate::error::TransportError;
    use crate::resource::{DiscoveryRequest, DiscoveryResponse, ResourceGroup, VersionInfo};
    use crate::transport::backoff::FixedBackoff;
    use crate::transport::TransportEvent;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

    type ServerSide = (
        UnboundedReceiver<DiscoveryRequest>,
        UnboundedSender<Result<DiscoveryResponse, TransportError>>,
    );

    /// Fails the first `failures` connects, then hands the server halves to the test.
    struct ScriptedConnector {
        failures: AtomicUsize,
        accepted: Mutex<UnboundedSender<ServerSide>>,
    }

    #[async_trait]
    impl StreamConnector for ScriptedConnector {
        async fn connect(&self) -> Result<DiscoveryStream, TransportError> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok()
            {
                return Err(TransportError::ConnectFailed("refused".to_string()));
            }
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            self.accepted
                .lock()
                .unwrap()
                .send((outbound_rx, inbound_tx))
                .unwrap();
            Ok(DiscoveryStream::new(outbound_tx, inbound_rx))
        }
    }

    fn connector(failures: usize) -> (Arc<ScriptedConnector>, UnboundedReceiver<ServerSide>) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        (
            Arc::new(ScriptedConnector {
                failures: AtomicUsize::new(failures),
                accepted: Mutex::new(accepted_tx),
            }),
            accepted_rx,
        )
    }

    fn request(version: &str) -> DiscoveryRequest {
        DiscoveryRequest::new(
            ResourceGroup::from("clusters"),
            Some(&VersionInfo::from(version)),
            &BTreeSet::new(),
        )
    }

    #[tokio::test]
    async fn requests_flow_out_and_responses_flow_back() {
        let (connector, mut accepted) = connector(0);
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_stream(
            "test",
            connector,
            Box::new(FixedBackoff::new(Duration::from_millis(1))),
            requests_rx,
            events_tx,
        ));

        requests_tx.send(request("")).unwrap();
        let (mut server_rx, server_tx) = accepted.recv().await.unwrap();
        assert_eq!(server_rx.recv().await.unwrap(), request(""));

        server_tx
            .send(Ok(DiscoveryResponse::new(
                ResourceGroup::from("clusters"),
                VersionInfo::from("0"),
                Vec::new(),
            )))
            .unwrap();

        match events_rx.recv().await {
            Some(TransportEvent::Response(response)) => {
                assert_eq!(response.version_info, VersionInfo::from("0"))
            }
            other => panic!("unexpected event {other:?}"),
        }

        drop(requests_tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn connect_failures_are_reported_then_reconnect_is_announced() {
        let (connector, mut accepted) = connector(2);
        let (_requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_stream(
            "test",
            connector,
            Box::new(FixedBackoff::new(Duration::from_millis(1))),
            requests_rx,
            events_tx,
        ));

        assert!(matches!(
            events_rx.recv().await,
            Some(TransportEvent::Error(TransportError::ConnectFailed(_)))
        ));
        assert!(matches!(
            events_rx.recv().await,
            Some(TransportEvent::Error(TransportError::ConnectFailed(_)))
        ));
        assert!(matches!(
            events_rx.recv().await,
            Some(TransportEvent::Reconnected)
        ));
        assert!(accepted.recv().await.is_some());

        task.abort();
    }

    #[tokio::test]
    async fn stream_close_reports_error_and_discards_stale_requests() {
        let (connector, mut accepted) = connector(0);
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_stream(
            "test",
            connector,
            Box::new(FixedBackoff::new(Duration::from_millis(50))),
            requests_rx,
            events_tx,
        ));

        let (_first_rx, first_tx) = accepted.recv().await.unwrap();
        drop(first_tx);

        assert!(matches!(
            events_rx.recv().await,
            Some(TransportEvent::Error(TransportError::Closed))
        ));
        requests_tx.send(request("stale")).unwrap();

        assert!(matches!(
            events_rx.recv().await,
            Some(TransportEvent::Reconnected)
        ));
        let (mut second_rx, _second_tx) = accepted.recv().await.unwrap();

        requests_tx.send(request("1")).unwrap();
        assert_eq!(second_rx.recv().await.unwrap(), request("1"));

        task.abort();
    }
}
