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

//! # config-subscription
//!
//! `config-subscription` keeps named configuration resources synchronized with a remote
//! authority and applies the version/ACK-NACK protocol before any update takes effect.
//!
//! A [`Subscription`] watches one resource group over one of four transports:
//! a dedicated stream, a stream shared by several groups, request/response polling, or a
//! watched local file. Delivered payloads pass through a [`ResourceTranslator`]; a
//! response is accepted only when every payload translates.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use config_subscription::transport::{FileWatchOptions, FileWatchTransport};
//! use config_subscription::{
//!     NoopCallbacks, RawResource, ResourceTranslator, StatsSnapshot, Subscription,
//!     TranslationError, VersionInfo,
//! };
//!
//! struct Passthrough;
//!
//! impl ResourceTranslator for Passthrough {
//!     type Resource = RawResource;
//!
//!     fn translate(&self, raw: &RawResource) -> Result<RawResource, TranslationError> {
//!         Ok(raw.clone())
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let dir = std::env::temp_dir().join(format!("config-subscription-doc-{}", std::process::id()));
//! std::fs::create_dir_all(&dir).unwrap();
//! let path = dir.join("clusters.json");
//! std::fs::write(
//!     &path,
//!     r#"{"version_info": "1", "resources": [{"name": "cluster0", "body": {}}]}"#,
//! )
//! .unwrap();
//!
//! let transport = FileWatchTransport::new(&path, FileWatchOptions { watch_filesystem: false });
//! let subscription =
//!     Subscription::new("clusters", transport, Passthrough, Arc::new(NoopCallbacks));
//! subscription.start(["cluster0"]).await.unwrap();
//!
//! while subscription.stats().success == 0 {
//!     tokio::time::sleep(Duration::from_millis(5)).await;
//! }
//! assert_eq!(subscription.current_version().await, Some(VersionInfo::from("1")));
//! // The initial request and the ACK of version "1".
//! assert_eq!(subscription.stats(), StatsSnapshot::new(2, 1, 0, 0));
//!
//! subscription.shutdown().await;
//! # std::fs::remove_dir_all(&dir).ok();
//! # });
//! ```
//!
//! ## Internal architecture map
//!
//! - API facade: [`Subscription`] serializes calls and runs one driver task
//! - Controller: accept/reject protocol, version ledger and counters
//! - Transport: streaming, aggregated, polling and file-watch strategies posting
//!   [`transport::TransportEvent`]s onto the subscription's queue
//!
//! ## Observability model
//!
//! Library code emits `tracing` events with the canonical names and field keys found in
//! [`observability`]. It never initializes a global subscriber; binaries and tests do
//! that once at process boundaries.

pub mod config;
mod controller;
mod error;
#[doc(hidden)]
pub mod observability;
mod resource;
mod stats;
mod subscription;
mod translation;
pub mod transport;
mod version_ledger;

pub use controller::SubscriptionState;
pub use error::{ConfigError, ConfigurationError, ProtocolError, TranslationError, TransportError};
pub use resource::{DiscoveryRequest, DiscoveryResponse, RawResource, ResourceGroup, VersionInfo};
pub use stats::StatsSnapshot;
pub use subscription::Subscription;
pub use translation::{
    NoopCallbacks, ResourceTranslator, SubscriptionCallbacks, SubscriptionFailure,
};
