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

//! JSON translators for `config-subscription`.
//!
//! Each translator parses one resource payload against a closed schema (unknown
//! fields are refused) and then checks the cross-field rules the schema cannot
//! express. Any failure becomes a [`TranslationError`] whose text is what the
//! subscription sends back to the authority as its NACK detail.
//!
//! ```
//! use config_subscription::{RawResource, ResourceTranslator};
//! use json_resource_translator::ClusterTranslator;
//! use serde_json::json;
//!
//! let raw = RawResource::new(
//!     "cluster0",
//!     json!({ "name": "cluster0", "hosts": [{ "url": "tcp://127.0.0.1:8080" }] }),
//! );
//! let cluster = ClusterTranslator.translate(&raw).unwrap();
//! assert_eq!(cluster.hosts[0].port, 8080);
//! ```
//!
//! [`TranslationError`]: config_subscription::TranslationError

mod cluster;
mod route;

pub use cluster::{Cluster, ClusterTranslator, HostAddress, LbPolicy};
pub use route::{
    ClusterTarget, ClusterWeight, ForwardAction, HeaderMatcher, HeaderValueOption, HostRewrite,
    PathMatch, RateLimit, RateLimitAction, RedirectAction, RequestMirrorPolicy, RetryPolicy,
    Route, RouteAction, RouteConfiguration, RouteConfigurationTranslator, RouteMatch,
    RoutingPriority, RuntimeFraction, TlsRequirement, VirtualCluster, VirtualHost,
    WeightedClusters,
};

use config_subscription::{RawResource, TranslationError};
use serde::de::DeserializeOwned;

/// Parses the payload body against a wire schema, naming the resource on failure.
pub(crate) fn parse_body<W: DeserializeOwned>(raw: &RawResource) -> Result<W, TranslationError> {
    serde_json::from_value(raw.body.clone())
        .map_err(|err| TranslationError::for_resource(&raw.name, err.to_string()))
}

/// The payload's own name must agree with the name it was delivered under.
pub(crate) fn check_name(raw: &RawResource, declared: &str) -> Result<(), TranslationError> {
    if declared.is_empty() {
        return Err(TranslationError::for_resource(&raw.name, "name must not be empty"));
    }
    if !raw.name.is_empty() && raw.name != declared {
        return Err(TranslationError::for_resource(
            &raw.name,
            format!("payload is named '{declared}'"),
        ));
    }
    Ok(())
}
