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

//! Accept/reject protocol for one resource group.
//!
//! The controller is a synchronous state machine. It never awaits: every request it
//! builds is handed to a [`RequestSink`] immediately, and every inbound event is fed
//! in by the owning [`Subscription`](crate::Subscription) driver one at a time.

use crate::error::{ConfigurationError, ProtocolError, TransportError};
use crate::observability::{events, fields};
use crate::resource::{DiscoveryRequest, DiscoveryResponse, RawResource, ResourceGroup, VersionInfo};
use crate::stats::SubscriptionStats;
use crate::translation::{ResourceTranslator, SubscriptionCallbacks, SubscriptionFailure};
use crate::transport::Transport;
use crate::version_ledger::VersionLedger;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::{debug, info, warn};

const COMPONENT: &str = "subscription_controller";

/// Lifecycle of one subscription as observed by its controller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubscriptionState {
    Uninitialized,
    AwaitingResponse,
    Synced,
    Failed,
}

impl Display for SubscriptionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SubscriptionState::Uninitialized => "uninitialized",
            SubscriptionState::AwaitingResponse => "awaiting_response",
            SubscriptionState::Synced => "synced",
            SubscriptionState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Where built requests go.
pub(crate) trait RequestSink {
    fn send(&self, request: DiscoveryRequest) -> Result<(), TransportError>;
}

impl RequestSink for Transport {
    fn send(&self, request: DiscoveryRequest) -> Result<(), TransportError> {
        Transport::send(self, request)
    }
}

/// What happened to one delivered response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ResponseOutcome {
    Accepted,
    Reaccepted,
    Rejected,
    Dropped,
}

pub(crate) struct SubscriptionController<T: ResourceTranslator> {
    group: ResourceGroup,
    ledger: VersionLedger,
    stats: Arc<SubscriptionStats>,
    state: SubscriptionState,
    translator: Arc<T>,
    callbacks: Arc<dyn SubscriptionCallbacks<T::Resource>>,
    started: bool,
    shut_down: bool,
    last_request: Option<DiscoveryRequest>,
    accepted_payload: Option<Vec<RawResource>>,
}

impl<T: ResourceTranslator> SubscriptionController<T> {
    pub(crate) fn new(
        group: ResourceGroup,
        translator: Arc<T>,
        callbacks: Arc<dyn SubscriptionCallbacks<T::Resource>>,
    ) -> Self {
        Self {
            group,
            ledger: VersionLedger::new(),
            stats: Arc::new(SubscriptionStats::default()),
            state: SubscriptionState::Uninitialized,
            translator,
            callbacks,
            started: false,
            shut_down: false,
            last_request: None,
            accepted_payload: None,
        }
    }

    pub(crate) fn stats(&self) -> Arc<SubscriptionStats> {
        self.stats.clone()
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        self.state
    }

    pub(crate) fn current_version(&self) -> Option<VersionInfo> {
        self.ledger.current_version(&self.group).cloned()
    }

    pub(crate) fn subscribed_names(&self) -> BTreeSet<String> {
        self.ledger.subscribed_names(&self.group)
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started
    }

    /// Checks lifecycle preconditions shared by `start` and `update_resources`.
    pub(crate) fn ensure_usable(&self, must_be_started: bool) -> Result<(), ConfigurationError> {
        if self.shut_down {
            return Err(ConfigurationError::ShutDown);
        }
        match (must_be_started, self.started) {
            (true, false) => Err(ConfigurationError::NotStarted),
            (false, true) => Err(ConfigurationError::AlreadyStarted),
            _ => Ok(()),
        }
    }

    /// Validates caller-authored names and collapses them into the watched set.
    pub(crate) fn validate_names<I, S>(
        &self,
        names: I,
    ) -> Result<BTreeSet<String>, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut validated = BTreeSet::new();
        for name in names {
            let name = name.into();
            if name.trim().is_empty() {
                return Err(ConfigurationError::EmptyResourceName);
            }
            self.translator.validate_resource_name(&name)?;
            validated.insert(name);
        }
        Ok(validated)
    }

    pub(crate) fn start(
        &mut self,
        names: BTreeSet<String>,
        sink: &impl RequestSink,
    ) -> Result<(), ConfigurationError> {
        self.ensure_usable(false)?;
        self.started = true;
        self.ledger.update_names(&self.group, names);

        let names = self.ledger.subscribed_names(&self.group);
        info!(
            event = events::SUBSCRIPTION_START,
            component = COMPONENT,
            group = %self.group,
            names = %fields::format_names(&names),
            "starting subscription"
        );

        self.state = SubscriptionState::AwaitingResponse;
        let request = DiscoveryRequest::new(self.group.clone(), None, &names);
        self.send(request, sink);
        Ok(())
    }

    /// Returns `true` when a new request went out.
    pub(crate) fn update_resources(
        &mut self,
        names: BTreeSet<String>,
        sink: &impl RequestSink,
    ) -> Result<bool, ConfigurationError> {
        self.ensure_usable(true)?;

        if !self.ledger.update_names(&self.group, names) {
            debug!(
                event = events::SUBSCRIPTION_UPDATE_UNCHANGED,
                component = COMPONENT,
                group = %self.group,
                "watched names unchanged; nothing to send"
            );
            return Ok(false);
        }

        let names = self.ledger.subscribed_names(&self.group);
        let version = self.ledger.current_version(&self.group).cloned();
        info!(
            event = events::SUBSCRIPTION_UPDATE_RESOURCES,
            component = COMPONENT,
            group = %self.group,
            version = %fields::format_version(version.as_ref()),
            names = %fields::format_names(&names),
            "watched names changed"
        );

        self.state = SubscriptionState::AwaitingResponse;
        let request = DiscoveryRequest::new(self.group.clone(), version.as_ref(), &names);
        self.send(request, sink);
        Ok(true)
    }

    pub(crate) fn on_response(
        &mut self,
        response: DiscoveryResponse,
        sink: &impl RequestSink,
    ) -> ResponseOutcome {
        if self.shut_down || !self.started {
            return ResponseOutcome::Dropped;
        }

        if !response.group.as_str().is_empty() && response.group != self.group {
            self.drop_response(&response, ProtocolError::UnknownGroup(response.group.clone()));
            return ResponseOutcome::Dropped;
        }

        let accepted = self.ledger.current_version(&self.group).cloned();
        if let Some(accepted) = accepted.as_ref() {
            if response.version_info.predates(accepted) {
                self.drop_response(
                    &response,
                    ProtocolError::StaleVersion {
                        received: response.version_info.clone(),
                        accepted: accepted.clone(),
                    },
                );
                return ResponseOutcome::Dropped;
            }

            if *accepted == response.version_info
                && self.accepted_payload.as_deref() == Some(response.resources.as_slice())
            {
                debug!(
                    event = events::RESPONSE_REACCEPTED,
                    component = COMPONENT,
                    group = %self.group,
                    version = %response.version_info,
                    "identical snapshot re-delivered"
                );
                self.stats.record_success();
                self.state = SubscriptionState::Synced;
                self.acknowledge(&response, sink);
                return ResponseOutcome::Reaccepted;
            }
        }

        let translated: Result<Vec<T::Resource>, _> = response
            .resources
            .iter()
            .map(|raw| self.translator.translate(raw))
            .collect();

        match translated {
            Ok(resources) => {
                self.ledger
                    .accept(&self.group, response.version_info.clone());
                self.stats.record_success();
                self.state = SubscriptionState::Synced;
                info!(
                    event = events::RESPONSE_ACCEPTED,
                    component = COMPONENT,
                    group = %self.group,
                    version = %response.version_info,
                    resources = resources.len(),
                    "configuration accepted"
                );
                self.callbacks
                    .on_config_update(&resources, &response.version_info);
                self.acknowledge(&response, sink);
                self.accepted_payload = Some(response.resources);
                ResponseOutcome::Accepted
            }
            Err(err) => {
                self.stats.record_rejected();
                self.state = if accepted.is_some() {
                    SubscriptionState::Synced
                } else {
                    SubscriptionState::Uninitialized
                };
                warn!(
                    event = events::RESPONSE_REJECTED,
                    component = COMPONENT,
                    group = %self.group,
                    version = %response.version_info,
                    kept = %fields::format_version(accepted.as_ref()),
                    reason = %err,
                    "configuration rejected"
                );
                self.callbacks
                    .on_config_update_failed(&SubscriptionFailure::Rejected(&err));

                let names = self.ledger.subscribed_names(&self.group);
                let nack = DiscoveryRequest::new(self.group.clone(), accepted.as_ref(), &names)
                    .with_nonce(follow_up_nonce(&response))
                    .with_error_detail(err.to_string());
                self.send(nack, sink);
                ResponseOutcome::Rejected
            }
        }
    }

    pub(crate) fn on_transport_error(&mut self, err: &TransportError) {
        if self.shut_down {
            return;
        }
        self.stats.record_failure();
        self.state = SubscriptionState::Failed;
        warn!(
            event = events::TRANSPORT_FAILURE,
            component = COMPONENT,
            group = %self.group,
            err = %err,
            "transport failure"
        );
        self.callbacks
            .on_config_update_failed(&SubscriptionFailure::Transport(err));
    }

    /// Resends the last request after the transport recovered. The nonce and NACK
    /// detail refer to an exchange the authority no longer remembers, so both go.
    pub(crate) fn on_reconnected(&mut self, sink: &impl RequestSink) {
        if self.shut_down || !self.started {
            return;
        }
        let Some(last) = self.last_request.as_ref() else {
            return;
        };
        let request = DiscoveryRequest {
            response_nonce: String::new(),
            error_detail: None,
            ..last.clone()
        };
        debug!(
            event = events::REQUEST_RESEND,
            component = COMPONENT,
            group = %self.group,
            version = %request.version_info,
            names = %fields::format_names(&request.resource_names),
            "resending after reconnect"
        );
        self.state = SubscriptionState::AwaitingResponse;
        self.send(request, sink);
    }

    pub(crate) fn shut_down(&mut self) {
        if !self.shut_down {
            self.shut_down = true;
            info!(
                event = events::SUBSCRIPTION_SHUTDOWN,
                component = COMPONENT,
                group = %self.group,
                version = %fields::format_version(self.ledger.current_version(&self.group)),
                "subscription shut down"
            );
        }
    }

    fn acknowledge(&mut self, response: &DiscoveryResponse, sink: &impl RequestSink) {
        let names = self.ledger.subscribed_names(&self.group);
        let ack = DiscoveryRequest::new(self.group.clone(), Some(&response.version_info), &names)
            .with_nonce(follow_up_nonce(response));
        self.send(ack, sink);
    }

    fn drop_response(&self, response: &DiscoveryResponse, reason: ProtocolError) {
        warn!(
            event = events::RESPONSE_DROPPED,
            component = COMPONENT,
            group = %self.group,
            version = %response.version_info,
            reason = %reason,
            "dropping response"
        );
    }

    fn send(&mut self, request: DiscoveryRequest, sink: &impl RequestSink) {
        self.stats.record_attempt();
        debug!(
            event = events::REQUEST_SEND,
            component = COMPONENT,
            group = %self.group,
            version = %fields::format_version(Some(&request.version_info)),
            nonce = %request.response_nonce,
            kind = fields::format_request_kind(&request),
            "sending request"
        );
        self.last_request = Some(request.clone());

        if let Err(err) = sink.send(request) {
            warn!(
                event = events::REQUEST_SEND_FAILED,
                component = COMPONENT,
                group = %self.group,
                err = %err,
                "transport refused request"
            );
            self.on_transport_error(&err);
        }
    }
}

/// Nonce carried by the follow-up to `response`; never empty, so that transports can
/// tell follow-ups from fresh requests.
fn follow_up_nonce(response: &DiscoveryResponse) -> &str {
    if !response.nonce.is_empty() {
        &response.nonce
    } else if !response.version_info.is_empty() {
        response.version_info.as_str()
    } else {
        fields::NONE
    }
}
