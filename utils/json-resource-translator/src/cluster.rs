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

use crate::{check_name, parse_body};
use config_subscription::{RawResource, ResourceTranslator, TranslationError};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 250;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireCluster {
    name: String,
    #[serde(default)]
    connect_timeout_ms: Option<u64>,
    #[serde(default)]
    lb_type: Option<String>,
    #[serde(default)]
    hosts: Vec<WireHost>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireHost {
    url: String,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LbPolicy {
    #[default]
    RoundRobin,
    LeastRequest,
    Random,
    RingHash,
}

impl LbPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "round_robin" => Some(LbPolicy::RoundRobin),
            "least_request" => Some(LbPolicy::LeastRequest),
            "random" => Some(LbPolicy::Random),
            "ring_hash" => Some(LbPolicy::RingHash),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostAddress {
    pub host: String,
    pub port: u16,
}

impl HostAddress {
    /// Parses `tcp://host:port`.
    fn parse(url: &str) -> Result<Self, String> {
        let address = url
            .strip_prefix("tcp://")
            .ok_or_else(|| format!("host url '{url}' must use the tcp:// scheme"))?;
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| format!("host url '{url}' has no port"))?;
        if host.is_empty() {
            return Err(format!("host url '{url}' has no host"));
        }
        let port = port
            .parse()
            .map_err(|_| format!("host url '{url}' has an invalid port"))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

/// An upstream cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cluster {
    pub name: String,
    pub connect_timeout: Duration,
    pub lb_policy: LbPolicy,
    pub hosts: Vec<HostAddress>,
}

/// Translates `clusters` payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClusterTranslator;

impl ResourceTranslator for ClusterTranslator {
    type Resource = Cluster;

    fn translate(&self, raw: &RawResource) -> Result<Cluster, TranslationError> {
        let wire: WireCluster = parse_body(raw)?;
        check_name(raw, &wire.name)?;
        let reject = |reason: String| TranslationError::for_resource(&wire.name, reason);

        let lb_policy = match wire.lb_type.as_deref() {
            None => LbPolicy::default(),
            Some(value) => {
                LbPolicy::parse(value).ok_or_else(|| reject(format!("unknown lb_type '{value}'")))?
            }
        };

        let connect_timeout_ms = wire.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS);
        if connect_timeout_ms == 0 {
            return Err(reject("connect_timeout_ms must be positive".to_string()));
        }

        let hosts = wire
            .hosts
            .iter()
            .map(|host| HostAddress::parse(&host.url))
            .collect::<Result<Vec<_>, _>>()
            .map_err(reject)?;

        Ok(Cluster {
            name: wire.name.clone(),
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            lb_policy,
            hosts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ClusterTranslator, LbPolicy};
    use config_subscription::{RawResource, ResourceTranslator};
    use serde_json::json;
    use std::time::Duration;

    fn translate(name: &str, body: serde_json::Value) -> Result<super::Cluster, String> {
        ClusterTranslator
            .translate(&RawResource::new(name, body))
            .map_err(|err| err.to_string())
    }

    #[test]
    fn minimal_cluster_gets_defaults() {
        let cluster = translate("cluster0", json!({ "name": "cluster0" })).unwrap();

        assert_eq!(cluster.connect_timeout, Duration::from_millis(250));
        assert_eq!(cluster.lb_policy, LbPolicy::RoundRobin);
        assert!(cluster.hosts.is_empty());
    }

    #[test]
    fn full_cluster_is_translated() {
        let cluster = translate(
            "backend",
            json!({
                "name": "backend",
                "connect_timeout_ms": 1000,
                "lb_type": "ring_hash",
                "hosts": [{ "url": "tcp://10.0.0.1:443" }, { "url": "tcp://backend.local:80" }],
            }),
        )
        .unwrap();

        assert_eq!(cluster.lb_policy, LbPolicy::RingHash);
        assert_eq!(cluster.hosts[1].host, "backend.local");
        assert_eq!(cluster.hosts[1].port, 80);
    }

    #[test]
    fn missing_name_is_reported_by_the_schema() {
        let err = translate("cluster0", json!({ "lb_type": "random" })).unwrap_err();

        assert!(err.starts_with("cluster0: missing field `name`"), "{err}");
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(translate("c", json!({ "name": "c", "colour": "blue" })).is_err());
    }

    #[test]
    fn mismatched_name_is_rejected() {
        let err = translate("cluster0", json!({ "name": "cluster1" })).unwrap_err();

        assert_eq!(err, "cluster0: payload is named 'cluster1'");
    }

    #[test]
    fn bad_host_url_is_rejected() {
        let err = translate(
            "c",
            json!({ "name": "c", "hosts": [{ "url": "udp://1.2.3.4:53" }] }),
        )
        .unwrap_err();

        assert_eq!(err, "c: host url 'udp://1.2.3.4:53' must use the tcp:// scheme");
    }

    #[test]
    fn unknown_lb_type_is_rejected() {
        assert!(translate("c", json!({ "name": "c", "lb_type": "fastest" })).is_err());
    }
}
