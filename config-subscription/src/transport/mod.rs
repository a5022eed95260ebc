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

//! Transport layer.
//!
//! Four interchangeable delivery strategies behind one capability set: `start`,
//! `send` and `close`. Every strategy owns its own reconnect, pacing or watch state
//! and reports back exclusively by posting [`TransportEvent`]s onto the owning
//! subscription's single-consumer queue. Transports read requests; they never write
//! to the version ledger.

pub mod aggregated;
pub mod backoff;
pub mod file_watch;
pub mod polling;
pub mod streaming;

use crate::error::TransportError;
use crate::resource::{DiscoveryRequest, DiscoveryResponse, ResourceGroup};
use tokio::sync::mpsc::UnboundedSender;

pub use aggregated::{AggregatedStream, AggregatedTransport};
pub use file_watch::{FileChangeNotifier, FileWatchOptions, FileWatchTransport, RecordedRequests};
pub use polling::{PollingClient, PollingOptions, PollingTransport};
pub use streaming::{DiscoveryStream, StreamConnector, StreamingOptions, StreamingTransport};

/// Notifications a transport posts to its subscription.
#[derive(Debug)]
pub enum TransportEvent {
    Response(DiscoveryResponse),
    Error(TransportError),
    /// The channel is usable again after a failure; the last request must be resent.
    Reconnected,
}

pub(crate) type EventSender = UnboundedSender<TransportEvent>;

/// Closed set of delivery strategies owned by one subscription.
pub enum Transport {
    Streaming(StreamingTransport),
    Aggregated(AggregatedTransport),
    Polling(PollingTransport),
    FileWatch(FileWatchTransport),
}

impl Transport {
    pub fn kind(&self) -> &'static str {
        match self {
            Transport::Streaming(_) => "streaming",
            Transport::Aggregated(_) => "aggregated",
            Transport::Polling(_) => "polling",
            Transport::FileWatch(_) => "file_watch",
        }
    }

    pub(crate) fn start(
        &mut self,
        group: &ResourceGroup,
        events: EventSender,
    ) -> Result<(), TransportError> {
        match self {
            Transport::Streaming(transport) => transport.start(events),
            Transport::Aggregated(transport) => transport.start(group, events),
            Transport::Polling(transport) => transport.start(events),
            Transport::FileWatch(transport) => transport.start(group, events),
        }
    }

    pub(crate) fn send(&self, request: DiscoveryRequest) -> Result<(), TransportError> {
        match self {
            Transport::Streaming(transport) => transport.send(request),
            Transport::Aggregated(transport) => transport.send(request),
            Transport::Polling(transport) => transport.send(request),
            Transport::FileWatch(transport) => transport.send(request),
        }
    }

    /// Cancels outstanding waits, timers and watches. Idempotent.
    pub(crate) fn close(&mut self) {
        match self {
            Transport::Streaming(transport) => transport.close(),
            Transport::Aggregated(transport) => transport.close(),
            Transport::Polling(transport) => transport.close(),
            Transport::FileWatch(transport) => transport.close(),
        }
    }
}

impl From<StreamingTransport> for Transport {
    fn from(transport: StreamingTransport) -> Self {
        Transport::Streaming(transport)
    }
}

impl From<AggregatedTransport> for Transport {
    fn from(transport: AggregatedTransport) -> Self {
        Transport::Aggregated(transport)
    }
}

impl From<PollingTransport> for Transport {
    fn from(transport: PollingTransport) -> Self {
        Transport::Polling(transport)
    }
}

impl From<FileWatchTransport> for Transport {
    fn from(transport: FileWatchTransport) -> Self {
        Transport::FileWatch(transport)
    }
}
