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

//! Discovery data model exchanged between the controller and its transport.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Identifies a class of resources subscribed to as a unit, e.g. `"clusters"`.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceGroup(String);

impl ResourceGroup {
    pub fn new(group: impl Into<String>) -> Self {
        Self(group.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResourceGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceGroup {
    fn from(group: &str) -> Self {
        Self::new(group)
    }
}

/// Opaque, authority-assigned snapshot identifier.
///
/// The empty string means "nothing accepted yet" on the wire.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionInfo(String);

impl VersionInfo {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn numeric_prefix(&self) -> Option<u128> {
        let digits: String = self.0.chars().take_while(|ch| ch.is_ascii_digit()).collect();
        if digits.is_empty() {
            None
        } else {
            digits.parse().ok()
        }
    }

    /// Orders two versions when both carry a leading decimal component.
    ///
    /// Versions are opaque tokens, so `None` means "not comparable" and callers must
    /// not treat such a pair as out of order.
    pub fn compare(&self, other: &VersionInfo) -> Option<Ordering> {
        match (self.numeric_prefix(), other.numeric_prefix()) {
            (Some(lhs), Some(rhs)) => Some(lhs.cmp(&rhs)),
            _ => None,
        }
    }

    /// Returns `true` only when `self` is provably older than `other`.
    pub fn predates(&self, other: &VersionInfo) -> bool {
        matches!(self.compare(other), Some(Ordering::Less))
    }
}

impl Display for VersionInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionInfo {
    fn from(version: &str) -> Self {
        Self::new(version)
    }
}

/// One untranslated resource payload as delivered by the authority.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawResource {
    #[serde(default)]
    pub name: String,
    pub body: serde_json::Value,
}

impl RawResource {
    pub fn new(name: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

/// Request built fresh for every send; never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryRequest {
    pub group: ResourceGroup,
    pub version_info: VersionInfo,
    pub resource_names: Vec<String>,
    pub response_nonce: String,
    pub error_detail: Option<String>,
}

impl DiscoveryRequest {
    pub(crate) fn new(
        group: ResourceGroup,
        version_info: Option<&VersionInfo>,
        resource_names: &BTreeSet<String>,
    ) -> Self {
        Self {
            group,
            version_info: version_info.cloned().unwrap_or_default(),
            resource_names: resource_names.iter().cloned().collect(),
            response_nonce: String::new(),
            error_detail: None,
        }
    }

    pub(crate) fn with_nonce(mut self, nonce: &str) -> Self {
        self.response_nonce = nonce.to_string();
        self
    }

    pub(crate) fn with_error_detail(mut self, reason: impl Into<String>) -> Self {
        self.error_detail = Some(reason.into());
        self
    }

    /// ACK or NACK follow-ups answer a specific response.
    pub fn is_follow_up(&self) -> bool {
        !self.response_nonce.is_empty()
    }

    pub fn is_nack(&self) -> bool {
        self.error_detail.is_some()
    }
}

/// Response proposed by the authority for one resource group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    #[serde(default)]
    pub version_info: VersionInfo,
    #[serde(default)]
    pub group: ResourceGroup,
    #[serde(default)]
    pub resources: Vec<RawResource>,
    #[serde(default)]
    pub nonce: String,
}

impl DiscoveryResponse {
    pub fn new(
        group: ResourceGroup,
        version_info: VersionInfo,
        resources: Vec<RawResource>,
    ) -> Self {
        Self {
            version_info,
            group,
            resources,
            nonce: String::new(),
        }
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = nonce.into();
        self
    }
}
