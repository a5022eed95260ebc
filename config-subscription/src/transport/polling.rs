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

//! Request/response transport paced by a refresh interval.
//!
//! The first request of a subscription (and any request following an update of the
//! subscribed names) goes out immediately. ACK/NACK follow-ups are held for
//! `poll_interval` and double as the next poll. At most one exchange is in flight;
//! a newer request replaces one that is still waiting, and a caller-initiated
//! request abandons an unanswered exchange instead of queueing behind it.

use crate::error::TransportError;
use crate::observability::{events, fields};
use crate::resource::{DiscoveryRequest, DiscoveryResponse};
use crate::transport::{EventSender, TransportEvent};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const COMPONENT: &str = "polling_transport";

/// Performs one discovery exchange with the authority.
#[async_trait]
pub trait PollingClient: Send + Sync + 'static {
    async fn fetch(&self, request: DiscoveryRequest) -> Result<DiscoveryResponse, TransportError>;
}

#[derive(Clone, Debug)]
pub struct PollingOptions {
    /// Delay between an ACK/NACK and the exchange carrying it.
    pub poll_interval: Duration,
    /// Upper bound on a single exchange.
    pub request_timeout: Duration,
    /// Delay before announcing recovery after a failed exchange.
    pub retry_delay: Duration,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(1),
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Waits out the poll interval for follow-ups, letting newer requests replace the
/// held one. Returns `None` once the request queue is closed.
async fn next_due_request(
    carried: Option<DiscoveryRequest>,
    requests: &mut UnboundedReceiver<DiscoveryRequest>,
    poll_interval: Duration,
) -> Option<DiscoveryRequest> {
    let mut pending = match carried {
        Some(request) => request,
        None => requests.recv().await?,
    };

    if pending.is_follow_up() {
        let deadline = tokio::time::sleep(poll_interval);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                newer = requests.recv() => {
                    let newer = newer?;
                    debug!(
                        event = events::POLL_REQUEST_SUPERSEDED,
                        component = COMPONENT,
                        group = %newer.group,
                        kind = fields::format_request_kind(&newer),
                        "newer request replaces the held one"
                    );
                    pending = newer;
                    if !pending.is_follow_up() {
                        break;
                    }
                }
                _ = &mut deadline => break,
            }
        }
    }

    while let Ok(newer) = requests.try_recv() {
        pending = newer;
    }
    Some(pending)
}

/// Runs one exchange. A caller-initiated request arriving meanwhile abandons it;
/// the superseding request is handed back for immediate sending.
async fn exchange(
    client: &Arc<dyn PollingClient>,
    request: DiscoveryRequest,
    request_timeout: Duration,
    requests: &mut UnboundedReceiver<DiscoveryRequest>,
    carried: &mut Option<DiscoveryRequest>,
) -> Option<Result<DiscoveryResponse, TransportError>> {
    let fetch = tokio::time::timeout(request_timeout, client.fetch(request));
    tokio::pin!(fetch);

    loop {
        tokio::select! {
            biased;
            outcome = &mut fetch => {
                return Some(outcome.unwrap_or(Err(TransportError::Timeout(request_timeout))));
            }
            newer = requests.recv() => {
                let newer = newer?;
                let preempts = !newer.is_follow_up();
                *carried = Some(newer);
                if preempts {
                    debug!(
                        event = events::POLL_EXCHANGE_ABANDONED,
                        component = COMPONENT,
                        "caller request preempts the exchange in flight"
                    );
                    return None;
                }
            }
        }
    }
}

async fn run_polling(
    client: Arc<dyn PollingClient>,
    options: PollingOptions,
    mut requests: UnboundedReceiver<DiscoveryRequest>,
    events: EventSender,
) {
    let mut carried = None;

    while let Some(request) =
        next_due_request(carried.take(), &mut requests, options.poll_interval).await
    {
        debug!(
            event = events::POLL_EXCHANGE_START,
            component = COMPONENT,
            group = %request.group,
            version = %request.version_info,
            kind = fields::format_request_kind(&request),
            "polling authority"
        );

        let outcome = exchange(
            &client,
            request,
            options.request_timeout,
            &mut requests,
            &mut carried,
        )
        .await;

        match outcome {
            None => continue,
            Some(Ok(response)) => {
                debug!(
                    event = events::POLL_EXCHANGE_OK,
                    component = COMPONENT,
                    group = %response.group,
                    version = %response.version_info,
                    "poll answered"
                );
                let _ = events.send(TransportEvent::Response(response));
            }
            Some(Err(err)) => {
                warn!(
                    event = events::POLL_EXCHANGE_FAILED,
                    component = COMPONENT,
                    err = %err,
                    retry_ms = options.retry_delay.as_millis() as u64,
                    "poll failed"
                );
                let _ = events.send(TransportEvent::Error(err));
                tokio::time::sleep(options.retry_delay).await;

                carried = None;
                while requests.try_recv().is_ok() {}
                let _ = events.send(TransportEvent::Reconnected);
            }
        }
    }

    debug!(
        event = events::TRANSPORT_TASK_EXIT,
        component = COMPONENT,
        reason = fields::REASON_QUEUE_CLOSED,
        "polling stopped"
    );
}

pub struct PollingTransport {
    client: Arc<dyn PollingClient>,
    options: PollingOptions,
    requests: Option<UnboundedSender<DiscoveryRequest>>,
    task: Option<JoinHandle<()>>,
}

impl PollingTransport {
    pub fn new(client: Arc<dyn PollingClient>, options: PollingOptions) -> Self {
        Self {
            client,
            options,
            requests: None,
            task: None,
        }
    }

    pub(crate) fn start(&mut self, events: EventSender) -> Result<(), TransportError> {
        if self.task.is_some() {
            return Err(TransportError::ConnectFailed(
                "polling transport already started".to_string(),
            ));
        }
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        self.requests = Some(requests_tx);
        self.task = Some(tokio::spawn(run_polling(
            self.client.clone(),
            self.options.clone(),
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

impl Drop for PollingTransport {
    fn drop(&mut self) {
        self.close();
    }
}
