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

//! Public watch API for one resource group.

use crate::controller::{SubscriptionController, SubscriptionState};
use crate::error::ConfigurationError;
use crate::observability::{events, fields};
use crate::resource::{ResourceGroup, VersionInfo};
use crate::stats::{StatsSnapshot, SubscriptionStats};
use crate::translation::{ResourceTranslator, SubscriptionCallbacks};
use crate::transport::{Transport, TransportEvent};
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const COMPONENT: &str = "subscription";

/// Controller and transport share one critical section so that requests reach the
/// transport in the order the controller built them.
struct SubscriptionCore<T: ResourceTranslator> {
    controller: SubscriptionController<T>,
    transport: Transport,
}

/// Keeps one resource group synchronized with the authority.
///
/// All operations on one instance are serialized; inbound events are drained by a
/// single driver task spawned at [`start`](Subscription::start).
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use config_subscription::transport::{FileWatchOptions, FileWatchTransport};
/// use config_subscription::{
///     ConfigurationError, NoopCallbacks, RawResource, ResourceTranslator, Subscription,
///     TranslationError,
/// };
///
/// struct Passthrough;
///
/// impl ResourceTranslator for Passthrough {
///     type Resource = RawResource;
///
///     fn translate(&self, raw: &RawResource) -> Result<RawResource, TranslationError> {
///         Ok(raw.clone())
///     }
/// }
///
/// # async fn run() -> Result<(), ConfigurationError> {
/// let transport =
///     FileWatchTransport::new("/etc/config/clusters.json", FileWatchOptions::default());
/// let subscription =
///     Subscription::new("clusters", transport, Passthrough, Arc::new(NoopCallbacks));
///
/// subscription.start(["cluster0", "cluster1"]).await?;
/// println!("{}", subscription.stats());
/// # Ok(())
/// # }
/// ```
pub struct Subscription<T: ResourceTranslator> {
    group: ResourceGroup,
    core: Arc<Mutex<SubscriptionCore<T>>>,
    stats: Arc<SubscriptionStats>,
    driver: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<T: ResourceTranslator> Subscription<T> {
    pub fn new(
        group: impl Into<ResourceGroup>,
        transport: impl Into<Transport>,
        translator: T,
        callbacks: Arc<dyn SubscriptionCallbacks<T::Resource>>,
    ) -> Self {
        let group = group.into();
        let controller =
            SubscriptionController::new(group.clone(), Arc::new(translator), callbacks);
        let stats = controller.stats();

        Self {
            group,
            core: Arc::new(Mutex::new(SubscriptionCore {
                controller,
                transport: transport.into(),
            })),
            stats,
            driver: std::sync::Mutex::new(None),
        }
    }

    pub fn group(&self) -> &ResourceGroup {
        &self.group
    }

    /// Starts the transport and sends the first request for `names`.
    pub async fn start<I, S>(&self, names: I) -> Result<(), ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut core = self.core.lock().await;
        let SubscriptionCore {
            controller,
            transport,
        } = &mut *core;

        controller.ensure_usable(false)?;
        let names = controller.validate_names(names)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        if let Err(err) = transport.start(&self.group, events_tx) {
            return Err(ConfigurationError::TransportUnavailable(format!(
                "{} transport: {err}",
                transport.kind()
            )));
        }
        controller.start(names, &*transport)?;

        let driver = tokio::spawn(drive(self.group.clone(), self.core.clone(), events_rx));
        *self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(driver);
        Ok(())
    }

    /// Replaces the watched names; a request goes out only when the set changed.
    pub async fn update_resources<I, S>(&self, names: I) -> Result<(), ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut core = self.core.lock().await;
        let SubscriptionCore {
            controller,
            transport,
        } = &mut *core;

        controller.ensure_usable(true)?;
        let names = controller.validate_names(names)?;
        controller.update_resources(names, &*transport)?;
        Ok(())
    }

    pub async fn current_version(&self) -> Option<VersionInfo> {
        self.core.lock().await.controller.current_version()
    }

    pub async fn state(&self) -> SubscriptionState {
        self.core.lock().await.controller.state()
    }

    pub async fn subscribed_names(&self) -> BTreeSet<String> {
        self.core.lock().await.controller.subscribed_names()
    }

    pub async fn is_started(&self) -> bool {
        self.core.lock().await.controller.is_started()
    }

    /// Counters can be read at any time, including after shutdown.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Tears the subscription down without invoking callbacks.
    ///
    /// Outstanding waits are abandoned, the transport is closed, and the accepted
    /// version and counters stay readable. Idempotent.
    pub async fn shutdown(&self) {
        let mut core = self.core.lock().await;
        if let Some(driver) = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            driver.abort();
        }
        core.controller.shut_down();
        core.transport.close();
    }
}

impl<T: ResourceTranslator> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(driver) = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            driver.abort();
        }
    }
}

async fn drive<T: ResourceTranslator>(
    group: ResourceGroup,
    core: Arc<Mutex<SubscriptionCore<T>>>,
    mut events: UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let mut core = core.lock().await;
        let SubscriptionCore {
            controller,
            transport,
        } = &mut *core;

        match event {
            TransportEvent::Response(response) => {
                let outcome = controller.on_response(response, &*transport);
                debug!(component = COMPONENT, group = %group, ?outcome, "response processed");
            }
            TransportEvent::Error(err) => controller.on_transport_error(&err),
            TransportEvent::Reconnected => controller.on_reconnected(&*transport),
        }
    }

    info!(
        event = events::DRIVER_EVENT_QUEUE_CLOSED,
        component = COMPONENT,
        group = %group,
        reason = fields::REASON_QUEUE_CLOSED,
        "subscription driver stopped"
    );
}
