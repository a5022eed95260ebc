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

//! Seams towards the translation layer and the consumer of accepted resources.

use crate::error::{ConfigurationError, TranslationError, TransportError};
use crate::resource::{RawResource, VersionInfo};

/// Converts raw payloads into typed resources.
///
/// Implementations must be pure functions of their input. The error reason is sent
/// back to the authority verbatim as the NACK detail.
///
/// # Examples
///
/// ```
/// use config_subscription::{
///     ConfigurationError, RawResource, ResourceTranslator, TranslationError,
/// };
///
/// struct NameOnly;
///
/// impl ResourceTranslator for NameOnly {
///     type Resource = String;
///
///     fn translate(&self, raw: &RawResource) -> Result<String, TranslationError> {
///         raw.body
///             .get("name")
///             .and_then(|name| name.as_str())
///             .map(str::to_string)
///             .ok_or_else(|| TranslationError::for_resource(&raw.name, "missing 'name'"))
///     }
/// }
///
/// let raw = RawResource::new("cluster0", serde_json::json!({"name": "cluster0"}));
/// assert_eq!(NameOnly.translate(&raw).unwrap(), "cluster0");
/// assert!(NameOnly.validate_resource_name(" ").is_err());
/// ```
pub trait ResourceTranslator: Send + Sync + 'static {
    type Resource: Send + Sync + 'static;

    fn translate(&self, raw: &RawResource) -> Result<Self::Resource, TranslationError>;

    /// Checks a locally authored resource name before any round trip.
    fn validate_resource_name(&self, name: &str) -> Result<(), ConfigurationError> {
        if name.trim().is_empty() {
            return Err(ConfigurationError::EmptyResourceName);
        }
        Ok(())
    }
}

/// Why the latest delivery did not take effect.
#[derive(Debug)]
pub enum SubscriptionFailure<'a> {
    Rejected(&'a TranslationError),
    Transport(&'a TransportError),
}

/// Receives the outcome of every processed delivery.
///
/// Invoked from the subscription's driver task while it holds the controller's
/// critical section; implementations must not call back into the same subscription.
pub trait SubscriptionCallbacks<R>: Send + Sync {
    fn on_config_update(&self, resources: &[R], version: &VersionInfo);

    fn on_config_update_failed(&self, _failure: &SubscriptionFailure<'_>) {}
}

/// Callbacks that ignore every notification.
pub struct NoopCallbacks;

impl<R> SubscriptionCallbacks<R> for NoopCallbacks {
    fn on_config_update(&self, _resources: &[R], _version: &VersionInfo) {}
}
