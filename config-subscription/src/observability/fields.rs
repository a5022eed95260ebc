/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
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

//! Canonical structured field values and value-format helpers.

use crate::resource::{DiscoveryRequest, VersionInfo};

pub const NONE: &str = "none";
pub const REASON_QUEUE_CLOSED: &str = "queue_closed";
pub const REASON_SHUTDOWN: &str = "shutdown";

/// Formats a version for logs, using [`NONE`] for "nothing accepted yet".
pub fn format_version(version: Option<&VersionInfo>) -> String {
    match version {
        Some(version) if !version.is_empty() => version.to_string(),
        _ => NONE.to_string(),
    }
}

/// Formats a resource-name list as a compact bracketed list.
pub fn format_names<'a>(names: impl IntoIterator<Item = &'a String>) -> String {
    let joined = names
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",");
    format!("[{joined}]")
}

/// Labels a request as the protocol step it represents.
pub fn format_request_kind(request: &DiscoveryRequest) -> &'static str {
    if request.is_nack() {
        "nack"
    } else if request.is_follow_up() {
        "ack"
    } else {
        "request"
    }
}

#[cfg(test)]
mod tests {
    use super::{format_names, format_request_kind, format_version, NONE};
    use crate::resource::{DiscoveryRequest, ResourceGroup, VersionInfo};
    use std::collections::BTreeSet;

    #[test]
    fn format_version_falls_back_when_absent_or_empty() {
        assert_eq!(format_version(None), NONE);
        assert_eq!(format_version(Some(&VersionInfo::default())), NONE);
        assert_eq!(format_version(Some(&VersionInfo::from("3"))), "3");
    }

    #[test]
    fn format_names_is_compact() {
        let names = vec!["cluster0".to_string(), "cluster1".to_string()];

        assert_eq!(format_names(&names), "[cluster0,cluster1]");
        assert_eq!(format_names(&Vec::new()), "[]");
    }

    #[test]
    fn format_request_kind_distinguishes_protocol_steps() {
        let request =
            DiscoveryRequest::new(ResourceGroup::from("clusters"), None, &BTreeSet::new());

        assert_eq!(format_request_kind(&request), "request");
        assert_eq!(format_request_kind(&request.clone().with_nonce("1")), "ack");
        assert_eq!(
            format_request_kind(&request.with_nonce("1").with_error_detail("bad")),
            "nack"
        );
    }
}
