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

//! Several resource groups multiplexed over one discovery stream.
//!
//! Every group keeps its own subscription (ledger, stats, outstanding request); only
//! the channel is shared. The channel is one failure domain: an error or a reconnect
//! is fanned out to every registered group.

use crate::error::{ProtocolError, TransportError};
use crate::observability::{events, fields};
use crate::resource::{DiscoveryRequest, DiscoveryResponse, ResourceGroup};
use crate::transport::backoff::BackoffStrategy;
use crate::transport::streaming::{
    run_stream, StreamConnector, StreamEventSink, StreamingOptions,
};
use crate::transport::{EventSender, TransportEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const COMPONENT: &str = "aggregated_stream";

type GroupRegistry = Arc<Mutex<HashMap<ResourceGroup, EventSender>>>;

struct MuxSink {
    groups: GroupRegistry,
}

impl MuxSink {
    fn registered(&self) -> Vec<EventSender> {
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl StreamEventSink for MuxSink {
    fn deliver(&self, response: DiscoveryResponse) {
        let target = self
            .groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&response.group)
            .cloned();

        match target {
            Some(events) => {
                let _ = events.send(TransportEvent::Response(response));
            }
            None => {
                let error = ProtocolError::UnknownGroup(response.group.clone());
                warn!(
                    event = events::MUX_UNKNOWN_GROUP,
                    component = COMPONENT,
                    group = %response.group,
                    version = %response.version_info,
                    reason = %error,
                    "dropping response"
                );
            }
        }
    }

    fn fail(&self, error: TransportError) {
        for events in self.registered() {
            let _ = events.send(TransportEvent::Error(error.clone()));
        }
    }

    fn reconnected(&self) {
        for events in self.registered() {
            let _ = events.send(TransportEvent::Reconnected);
        }
    }
}

type PendingPump = (UnboundedReceiver<DiscoveryRequest>, Box<dyn BackoffStrategy>);

struct MuxShared {
    connector: Arc<dyn StreamConnector>,
    groups: GroupRegistry,
    requests: UnboundedSender<DiscoveryRequest>,
    pending: Mutex<Option<PendingPump>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Owner of the shared channel. Cheap to clone; every clone refers to one stream.
///
/// The stream is opened when the first group's subscription starts.
#[derive(Clone)]
pub struct AggregatedStream {
    shared: Arc<MuxShared>,
}

impl AggregatedStream {
    pub fn new(connector: Arc<dyn StreamConnector>, options: StreamingOptions) -> Self {
        Self::with_backoff(connector, options.backoff())
    }

    pub fn with_backoff(
        connector: Arc<dyn StreamConnector>,
        backoff: Box<dyn BackoffStrategy>,
    ) -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(MuxShared {
                connector,
                groups: Arc::new(Mutex::new(HashMap::new())),
                requests: requests_tx,
                pending: Mutex::new(Some((requests_rx, backoff))),
                task: Mutex::new(None),
            }),
        }
    }

    /// Creates a transport handle for one more group on this stream.
    pub fn transport(&self) -> AggregatedTransport {
        AggregatedTransport {
            stream: self.clone(),
            group: None,
        }
    }

    /// Groups currently registered on the stream, sorted.
    pub fn groups(&self) -> Vec<ResourceGroup> {
        let mut groups: Vec<ResourceGroup> = self
            .shared
            .groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        groups.sort();
        groups
    }

    /// Stops the shared stream for every group.
    pub fn shutdown(&self) {
        if let Some(task) = self
            .shared
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
            debug!(
                event = events::TRANSPORT_TASK_EXIT,
                component = COMPONENT,
                reason = fields::REASON_SHUTDOWN,
                "shared stream stopped"
            );
        }
        self.shared
            .groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn register(&self, group: &ResourceGroup, events: EventSender) -> Result<(), TransportError> {
        let mut groups = self
            .shared
            .groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if groups.contains_key(group) {
            return Err(TransportError::ConnectFailed(format!(
                "group '{group}' is already multiplexed on this stream"
            )));
        }
        groups.insert(group.clone(), events);
        debug!(
            event = events::MUX_GROUP_REGISTERED,
            component = COMPONENT,
            group = %group,
            groups = groups.len(),
            "group registered"
        );
        Ok(())
    }

    fn unregister(&self, group: &ResourceGroup) {
        let mut groups = self
            .shared
            .groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if groups.remove(group).is_some() {
            debug!(
                event = events::MUX_GROUP_UNREGISTERED,
                component = COMPONENT,
                group = %group,
                groups = groups.len(),
                "group unregistered"
            );
        }
    }

    fn ensure_running(&self) {
        let pending = self
            .shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some((requests, backoff)) = pending {
            let sink = MuxSink {
                groups: self.shared.groups.clone(),
            };
            let task = tokio::spawn(run_stream(
                COMPONENT,
                self.shared.connector.clone(),
                backoff,
                requests,
                sink,
            ));
            *self
                .shared
                .task
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(task);
        }
    }

    fn send(&self, request: DiscoveryRequest) -> Result<(), TransportError> {
        self.shared
            .requests
            .send(request)
            .map_err(|_| TransportError::Closed)
    }
}

/// One group's view of an [`AggregatedStream`].
pub struct AggregatedTransport {
    stream: AggregatedStream,
    group: Option<ResourceGroup>,
}

impl AggregatedTransport {
    pub(crate) fn start(
        &mut self,
        group: &ResourceGroup,
        events: EventSender,
    ) -> Result<(), TransportError> {
        if self.group.is_some() {
            return Err(TransportError::ConnectFailed(
                "aggregated transport already started".to_string(),
            ));
        }
        self.stream.register(group, events)?;
        self.group = Some(group.clone());
        self.stream.ensure_running();
        Ok(())
    }

    pub(crate) fn send(&self, request: DiscoveryRequest) -> Result<(), TransportError> {
        if self.group.is_none() {
            return Err(TransportError::Closed);
        }
        self.stream.send(request)
    }

    pub(crate) fn close(&mut self) {
        if let Some(group) = self.group.take() {
            self.stream.unregister(&group);
        }
    }
}

impl Drop for AggregatedTransport {
    fn drop(&mut self) {
        self.close();
    }
}
