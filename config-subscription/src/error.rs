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

//! Error taxonomy for subscription, transport and translation failures.

use crate::resource::{ResourceGroup, VersionInfo};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// A delivered payload failed to convert into a typed resource.
///
/// Always recoverable: the response is rejected and prior state stays intact.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TranslationError {
    resource: Option<String>,
    reason: String,
}

impl TranslationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            resource: None,
            reason: reason.into(),
        }
    }

    pub fn for_resource(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            resource: Some(resource.into()),
            reason: reason.into(),
        }
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Display for TranslationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.resource {
            Some(resource) if !resource.is_empty() => write!(f, "{resource}: {}", self.reason),
            _ => f.write_str(&self.reason),
        }
    }
}

impl Error for TranslationError {}

/// Connection loss, malformed framing, timeouts and file read failures.
///
/// `Clone` so that one channel failure can be fanned out to every multiplexed group.
#[derive(Clone, Debug)]
pub enum TransportError {
    ConnectFailed(String),
    ConnectionLost(String),
    Closed,
    Timeout(Duration),
    Malformed(String),
    Io(Arc<std::io::Error>),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::ConnectFailed(reason) => write!(f, "failed to connect: {reason}"),
            TransportError::ConnectionLost(reason) => write!(f, "connection lost: {reason}"),
            TransportError::Closed => write!(f, "channel closed by peer"),
            TransportError::Timeout(after) => {
                write!(f, "exchange timed out after {}ms", after.as_millis())
            }
            TransportError::Malformed(reason) => write!(f, "malformed message: {reason}"),
            TransportError::Io(err) => write!(f, "i/o failure: {err}"),
        }
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TransportError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(Arc::new(err))
    }
}

/// A response that belongs to a stale or foreign exchange; dropped, never counted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProtocolError {
    UnknownGroup(ResourceGroup),
    StaleVersion {
        received: VersionInfo,
        accepted: VersionInfo,
    },
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::UnknownGroup(group) => {
                write!(f, "response for unknown resource group '{group}'")
            }
            ProtocolError::StaleVersion { received, accepted } => write!(
                f,
                "response version '{received}' predates accepted version '{accepted}'"
            ),
        }
    }
}

impl Error for ProtocolError {}

/// Locally authored subscription input is malformed; fails only the initiating call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigurationError {
    EmptyResourceName,
    InvalidResourceName { name: String, reason: String },
    AlreadyStarted,
    NotStarted,
    ShutDown,
    TransportUnavailable(String),
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::EmptyResourceName => write!(f, "resource names must not be empty"),
            ConfigurationError::InvalidResourceName { name, reason } => {
                write!(f, "invalid resource name '{name}': {reason}")
            }
            ConfigurationError::AlreadyStarted => write!(f, "subscription already started"),
            ConfigurationError::NotStarted => write!(f, "subscription not started"),
            ConfigurationError::ShutDown => write!(f, "subscription has been shut down"),
            ConfigurationError::TransportUnavailable(reason) => {
                write!(f, "transport unavailable: {reason}")
            }
        }
    }
}

impl Error for ConfigurationError {}

/// Failures while loading a subscription configuration document.
#[derive(Debug)]
pub enum ConfigError {
    Read(std::io::Error),
    Parse(String),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read(err) => write!(f, "unable to read config file: {err}"),
            ConfigError::Parse(reason) => write!(f, "unable to parse config file: {reason}"),
            ConfigError::Invalid(reason) => write!(f, "invalid config: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Read(err) => Some(err),
            _ => None,
        }
    }
}
