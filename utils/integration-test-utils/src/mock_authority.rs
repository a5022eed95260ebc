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

use async_trait::async_trait;
use config_subscription::transport::{DiscoveryStream, PollingClient, StreamConnector};
use config_subscription::{DiscoveryRequest, DiscoveryResponse, TransportError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::debug;

/// How long a test waits for the client before declaring it silent.
pub const EXPECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a test watches the wire to conclude nothing was sent.
pub const QUIET_PERIOD: Duration = Duration::from_millis(100);

/// Authority side of one accepted stream.
pub struct StreamSession {
    requests: UnboundedReceiver<DiscoveryRequest>,
    responses: UnboundedSender<Result<DiscoveryResponse, TransportError>>,
}

impl StreamSession {
    /// Next request written by the client; panics after [`EXPECT_TIMEOUT`].
    pub async fn next_request(&mut self) -> DiscoveryRequest {
        match tokio::time::timeout(EXPECT_TIMEOUT, self.requests.recv()).await {
            Ok(Some(request)) => request,
            Ok(None) => panic!("client closed the stream while a request was expected"),
            Err(_) => panic!("no request on the stream within {EXPECT_TIMEOUT:?}"),
        }
    }

    /// `true` when nothing arrives during [`QUIET_PERIOD`].
    pub async fn is_quiet(&mut self) -> bool {
        tokio::time::timeout(QUIET_PERIOD, self.requests.recv())
            .await
            .is_err()
    }

    pub fn respond(&self, response: DiscoveryResponse) {
        let _ = self.responses.send(Ok(response));
    }

    /// Breaks the stream from the authority side with `error`.
    pub fn fail(self, error: TransportError) {
        let _ = self.responses.send(Err(error));
    }
}

/// Accepts streams, optionally refusing a number of connection attempts first.
pub struct MockStreamAuthority {
    refusals: AtomicUsize,
    connects: AtomicUsize,
    accepted: Mutex<UnboundedSender<StreamSession>>,
}

impl MockStreamAuthority {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<StreamSession>) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                refusals: AtomicUsize::new(0),
                connects: AtomicUsize::new(0),
                accepted: Mutex::new(accepted_tx),
            }),
            accepted_rx,
        )
    }

    /// The next `count` connection attempts fail with `ConnectFailed`.
    pub fn refuse_next(&self, count: usize) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    /// Connection attempts seen so far, refused ones included.
    pub fn connect_attempts(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamConnector for MockStreamAuthority {
    async fn connect(&self) -> Result<DiscoveryStream, TransportError> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            debug!(attempt, "mock authority refused stream");
            return Err(TransportError::ConnectFailed("refused by mock authority".to_string()));
        }

        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (responses_tx, responses_rx) = mpsc::unbounded_channel();
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(StreamSession {
                requests: requests_rx,
                responses: responses_tx,
            })
            .map_err(|_| TransportError::ConnectFailed("mock authority is gone".to_string()))?;
        debug!(attempt, "mock authority accepted stream");
        Ok(DiscoveryStream::new(requests_tx, responses_rx))
    }
}

/// One poll waiting for the authority's answer.
pub struct PendingExchange {
    pub request: DiscoveryRequest,
    reply: oneshot::Sender<Result<DiscoveryResponse, TransportError>>,
}

impl PendingExchange {
    pub fn respond(self, response: DiscoveryResponse) {
        let _ = self.reply.send(Ok(response));
    }

    pub fn fail(self, error: TransportError) {
        let _ = self.reply.send(Err(error));
    }

    /// `true` once the client stopped waiting for this exchange.
    pub fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }
}

/// Polling authority that hands every exchange to the test to answer.
pub struct MockPollingAuthority {
    exchanges: Mutex<UnboundedSender<PendingExchange>>,
}

impl MockPollingAuthority {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<PendingExchange>) {
        let (exchanges_tx, exchanges_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                exchanges: Mutex::new(exchanges_tx),
            }),
            exchanges_rx,
        )
    }
}

#[async_trait]
impl PollingClient for MockPollingAuthority {
    async fn fetch(&self, request: DiscoveryRequest) -> Result<DiscoveryResponse, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(PendingExchange {
                request,
                reply: reply_tx,
            })
            .map_err(|_| TransportError::ConnectFailed("mock authority is gone".to_string()))?;

        reply_rx.await.unwrap_or_else(|_| {
            Err(TransportError::ConnectionLost(
                "exchange dropped by mock authority".to_string(),
            ))
        })
    }
}
