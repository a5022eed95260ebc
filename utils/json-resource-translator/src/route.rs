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

//! Route configurations: virtual hosts, their routes and route actions.

use crate::{check_name, parse_body};
use config_subscription::{RawResource, ResourceTranslator, TranslationError};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const WEIGHTED_CLUSTERS_TOTAL: u32 = 100;

mod wire {
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub(super) struct RouteConfiguration {
        #[serde(default)]
        pub(super) name: String,
        #[serde(default)]
        pub(super) virtual_hosts: Vec<VirtualHost>,
        #[serde(default)]
        pub(super) internal_only_headers: Vec<String>,
        #[serde(default)]
        pub(super) response_headers_to_add: Vec<HeaderValue>,
        #[serde(default)]
        pub(super) response_headers_to_remove: Vec<String>,
        #[serde(default)]
        pub(super) request_headers_to_add: Vec<HeaderValue>,
        #[serde(default)]
        pub(super) validate_clusters: bool,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub(super) struct HeaderValue {
        pub(super) key: String,
        pub(super) value: String,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub(super) struct VirtualHost {
        pub(super) name: String,
        pub(super) domains: Vec<String>,
        #[serde(default)]
        pub(super) routes: Vec<Route>,
        #[serde(default)]
        pub(super) require_ssl: Option<String>,
        #[serde(default)]
        pub(super) virtual_clusters: Vec<VirtualCluster>,
        #[serde(default)]
        pub(super) rate_limits: Vec<RateLimit>,
        #[serde(default)]
        pub(super) request_headers_to_add: Vec<HeaderValue>,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub(super) struct VirtualCluster {
        pub(super) name: String,
        pub(super) pattern: String,
        #[serde(default)]
        pub(super) method: Option<String>,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub(super) struct Route {
        pub(super) prefix: Option<String>,
        pub(super) path: Option<String>,
        pub(super) case_sensitive: Option<bool>,
        pub(super) runtime: Option<Runtime>,
        #[serde(default)]
        pub(super) headers: Vec<HeaderMatcher>,
        pub(super) host_redirect: Option<String>,
        pub(super) path_redirect: Option<String>,
        pub(super) use_websocket: Option<bool>,
        pub(super) cluster: Option<String>,
        pub(super) cluster_header: Option<String>,
        pub(super) weighted_clusters: Option<WeightedClusters>,
        pub(super) prefix_rewrite: Option<String>,
        pub(super) host_rewrite: Option<String>,
        pub(super) auto_host_rewrite: Option<bool>,
        pub(super) timeout_ms: Option<u64>,
        pub(super) retry_policy: Option<RetryPolicy>,
        pub(super) shadow: Option<Shadow>,
        pub(super) priority: Option<String>,
        #[serde(default)]
        pub(super) request_headers_to_add: Vec<HeaderValue>,
        #[serde(default)]
        pub(super) rate_limits: Vec<RateLimit>,
        pub(super) include_vh_rate_limits: Option<bool>,
        pub(super) hash_policy: Option<HashPolicy>,
        pub(super) opaque_config: Option<BTreeMap<String, String>>,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub(super) struct Runtime {
        pub(super) key: String,
        pub(super) default: u32,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub(super) struct HeaderMatcher {
        pub(super) name: String,
        pub(super) value: Option<String>,
        #[serde(default)]
        pub(super) regex: bool,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub(super) struct WeightedClusters {
        pub(super) clusters: Vec<ClusterWeight>,
        pub(super) runtime_key_prefix: Option<String>,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub(super) struct ClusterWeight {
        pub(super) name: String,
        pub(super) weight: u32,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub(super) struct RetryPolicy {
        pub(super) retry_on: String,
        pub(super) num_retries: Option<u32>,
        pub(super) per_try_timeout_ms: Option<u64>,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub(super) struct Shadow {
        pub(super) cluster: String,
        pub(super) runtime_key: Option<String>,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub(super) struct HashPolicy {
        pub(super) header_name: String,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub(super) struct RateLimit {
        #[serde(default)]
        pub(super) stage: u32,
        pub(super) disable_key: Option<String>,
        pub(super) actions: Vec<RateLimitAction>,
    }

    #[derive(Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub(super) enum RateLimitAction {
        SourceCluster,
        DestinationCluster,
        RequestHeaders {
            header_name: String,
            descriptor_key: String,
        },
        RemoteAddress,
        GenericKey {
            descriptor_value: String,
        },
        HeaderValueMatch {
            descriptor_value: String,
            #[serde(default = "expect_match_default")]
            expect_match: bool,
            headers: Vec<HeaderMatcher>,
        },
    }

    fn expect_match_default() -> bool {
        true
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HeaderValueOption {
    pub key: String,
    pub value: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteConfiguration {
    pub name: String,
    pub virtual_hosts: Vec<VirtualHost>,
    pub internal_only_headers: Vec<String>,
    pub response_headers_to_add: Vec<HeaderValueOption>,
    pub response_headers_to_remove: Vec<String>,
    pub request_headers_to_add: Vec<HeaderValueOption>,
    pub validate_clusters: bool,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TlsRequirement {
    #[default]
    None,
    ExternalOnly,
    All,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VirtualHost {
    pub name: String,
    pub domains: Vec<String>,
    pub routes: Vec<Route>,
    pub require_tls: TlsRequirement,
    pub virtual_clusters: Vec<VirtualCluster>,
    pub rate_limits: Vec<RateLimit>,
    pub request_headers_to_add: Vec<HeaderValueOption>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VirtualCluster {
    pub name: String,
    pub pattern: String,
    pub method: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PathMatch {
    Prefix(String),
    Path(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RuntimeFraction {
    pub key: String,
    pub default: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HeaderMatcher {
    pub name: String,
    pub value: Option<String>,
    pub regex: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteMatch {
    pub path: PathMatch,
    pub case_sensitive: bool,
    pub runtime: Option<RuntimeFraction>,
    pub headers: Vec<HeaderMatcher>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RedirectAction {
    pub host_redirect: Option<String>,
    pub path_redirect: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterWeight {
    pub name: String,
    pub weight: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WeightedClusters {
    pub clusters: Vec<ClusterWeight>,
    pub runtime_key_prefix: Option<String>,
}

/// Exactly one way of picking the upstream cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClusterTarget {
    Cluster(String),
    ClusterHeader(String),
    Weighted(WeightedClusters),
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum HostRewrite {
    #[default]
    Keep,
    Literal(String),
    Auto,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    pub retry_on: String,
    pub num_retries: Option<u32>,
    pub per_try_timeout: Option<Duration>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestMirrorPolicy {
    pub cluster: String,
    pub runtime_key: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RoutingPriority {
    #[default]
    Default,
    High,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RateLimitAction {
    SourceCluster,
    DestinationCluster,
    RequestHeaders {
        header_name: String,
        descriptor_key: String,
    },
    RemoteAddress,
    GenericKey {
        descriptor_value: String,
    },
    HeaderValueMatch {
        descriptor_value: String,
        expect_match: bool,
        headers: Vec<HeaderMatcher>,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RateLimit {
    pub stage: u32,
    pub disable_key: Option<String>,
    pub actions: Vec<RateLimitAction>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ForwardAction {
    pub target: ClusterTarget,
    pub prefix_rewrite: Option<String>,
    pub host_rewrite: HostRewrite,
    pub use_websocket: bool,
    pub timeout: Option<Duration>,
    pub retry_policy: Option<RetryPolicy>,
    pub shadow: Option<RequestMirrorPolicy>,
    pub priority: RoutingPriority,
    pub request_headers_to_add: Vec<HeaderValueOption>,
    pub rate_limits: Vec<RateLimit>,
    pub include_vh_rate_limits: bool,
    pub hash_policy: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RouteAction {
    Redirect(RedirectAction),
    Forward(Box<ForwardAction>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Route {
    pub route_match: RouteMatch,
    pub action: RouteAction,
    pub opaque_config: BTreeMap<String, String>,
}

/// Translates `routes` payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct RouteConfigurationTranslator;

impl ResourceTranslator for RouteConfigurationTranslator {
    type Resource = RouteConfiguration;

    fn translate(&self, raw: &RawResource) -> Result<RouteConfiguration, TranslationError> {
        let wire: wire::RouteConfiguration = parse_body(raw)?;
        let name = if wire.name.is_empty() {
            raw.name.clone()
        } else {
            check_name(raw, &wire.name)?;
            wire.name.clone()
        };

        let config = translate_route_configuration(name.clone(), wire)
            .map_err(|reason| TranslationError::for_resource(name, reason))?;
        debug!(
            component = "route_configuration_translator",
            name = %config.name,
            virtual_hosts = config.virtual_hosts.len(),
            "route configuration translated"
        );
        Ok(config)
    }
}

fn header_values(values: Vec<wire::HeaderValue>) -> Vec<HeaderValueOption> {
    values
        .into_iter()
        .map(|header| HeaderValueOption {
            key: header.key,
            value: header.value,
        })
        .collect()
}

fn header_matchers(matchers: Vec<wire::HeaderMatcher>) -> Vec<HeaderMatcher> {
    matchers
        .into_iter()
        .map(|matcher| HeaderMatcher {
            name: matcher.name,
            value: matcher.value,
            regex: matcher.regex,
        })
        .collect()
}

fn translate_route_configuration(
    name: String,
    wire: wire::RouteConfiguration,
) -> Result<RouteConfiguration, String> {
    let virtual_hosts = wire
        .virtual_hosts
        .into_iter()
        .map(translate_virtual_host)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RouteConfiguration {
        name,
        virtual_hosts,
        internal_only_headers: wire.internal_only_headers,
        response_headers_to_add: header_values(wire.response_headers_to_add),
        response_headers_to_remove: wire.response_headers_to_remove,
        request_headers_to_add: header_values(wire.request_headers_to_add),
        validate_clusters: wire.validate_clusters,
    })
}

fn translate_virtual_host(wire: wire::VirtualHost) -> Result<VirtualHost, String> {
    let require_tls = match wire.require_ssl.as_deref() {
        None | Some("") => TlsRequirement::None,
        Some("all") => TlsRequirement::All,
        Some("external_only") => TlsRequirement::ExternalOnly,
        Some(other) => {
            return Err(format!(
                "virtual host '{}' has unknown require_ssl '{other}'",
                wire.name
            ))
        }
    };

    let routes = wire
        .routes
        .into_iter()
        .map(translate_route)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(VirtualHost {
        name: wire.name,
        domains: wire.domains,
        routes,
        require_tls,
        virtual_clusters: wire
            .virtual_clusters
            .into_iter()
            .map(|cluster| VirtualCluster {
                name: cluster.name,
                pattern: cluster.pattern,
                method: cluster.method,
            })
            .collect(),
        rate_limits: rate_limits(wire.rate_limits),
        request_headers_to_add: header_values(wire.request_headers_to_add),
    })
}

fn rate_limits(limits: Vec<wire::RateLimit>) -> Vec<RateLimit> {
    limits
        .into_iter()
        .map(|limit| RateLimit {
            stage: limit.stage,
            disable_key: limit.disable_key,
            actions: limit
                .actions
                .into_iter()
                .map(|action| match action {
                    wire::RateLimitAction::SourceCluster => RateLimitAction::SourceCluster,
                    wire::RateLimitAction::DestinationCluster => {
                        RateLimitAction::DestinationCluster
                    }
                    wire::RateLimitAction::RequestHeaders {
                        header_name,
                        descriptor_key,
                    } => RateLimitAction::RequestHeaders {
                        header_name,
                        descriptor_key,
                    },
                    wire::RateLimitAction::RemoteAddress => RateLimitAction::RemoteAddress,
                    wire::RateLimitAction::GenericKey { descriptor_value } => {
                        RateLimitAction::GenericKey { descriptor_value }
                    }
                    wire::RateLimitAction::HeaderValueMatch {
                        descriptor_value,
                        expect_match,
                        headers,
                    } => RateLimitAction::HeaderValueMatch {
                        descriptor_value,
                        expect_match,
                        headers: header_matchers(headers),
                    },
                })
                .collect(),
        })
        .collect()
}

fn translate_route(wire: wire::Route) -> Result<Route, String> {
    let path = match (wire.prefix, wire.path) {
        (Some(prefix), None) => PathMatch::Prefix(prefix),
        (None, Some(path)) => PathMatch::Path(path),
        _ => return Err("routes must specify either prefix or path".to_string()),
    };
    let route_match = RouteMatch {
        path,
        case_sensitive: wire.case_sensitive.unwrap_or(true),
        runtime: wire.runtime.map(|runtime| RuntimeFraction {
            key: runtime.key,
            default: runtime.default,
        }),
        headers: header_matchers(wire.headers),
    };

    let is_redirect = wire.host_redirect.is_some() || wire.path_redirect.is_some();
    let target = match (wire.cluster, wire.cluster_header, wire.weighted_clusters) {
        (None, None, None) => None,
        (Some(cluster), None, None) => Some(ClusterTarget::Cluster(cluster)),
        (None, Some(header), None) => Some(ClusterTarget::ClusterHeader(header)),
        (None, None, Some(weighted)) => {
            Some(ClusterTarget::Weighted(translate_weighted_clusters(weighted)?))
        }
        _ => {
            return Err(
                "routes must specify one of cluster/cluster_header/weighted_clusters".to_string(),
            )
        }
    };

    let action = if is_redirect {
        if wire.use_websocket.is_some() {
            return Err("Redirect route entries must not have WebSockets set".to_string());
        }
        if target.is_some() {
            return Err("routes must be either redirects or cluster targets".to_string());
        }
        RouteAction::Redirect(RedirectAction {
            host_redirect: wire.host_redirect,
            path_redirect: wire.path_redirect,
        })
    } else {
        let Some(target) = target else {
            return Err(
                "routes must specify one of cluster/cluster_header/weighted_clusters".to_string(),
            );
        };

        let host_rewrite = match (wire.host_rewrite, wire.auto_host_rewrite) {
            (Some(_), Some(_)) => {
                return Err(
                    "routes cannot have both auto_host_rewrite and host_rewrite options set"
                        .to_string(),
                )
            }
            (Some(host), None) => HostRewrite::Literal(host),
            (None, Some(true)) => HostRewrite::Auto,
            (None, _) => HostRewrite::Keep,
        };

        let priority = match wire.priority.as_deref() {
            None | Some("default") => RoutingPriority::Default,
            Some("high") => RoutingPriority::High,
            Some(other) => return Err(format!("unknown route priority '{other}'")),
        };

        RouteAction::Forward(Box::new(ForwardAction {
            target,
            prefix_rewrite: wire.prefix_rewrite,
            host_rewrite,
            use_websocket: wire.use_websocket.unwrap_or(false),
            timeout: wire.timeout_ms.map(Duration::from_millis),
            retry_policy: wire.retry_policy.map(|policy| RetryPolicy {
                retry_on: policy.retry_on,
                num_retries: policy.num_retries,
                per_try_timeout: policy.per_try_timeout_ms.map(Duration::from_millis),
            }),
            shadow: wire.shadow.map(|shadow| RequestMirrorPolicy {
                cluster: shadow.cluster,
                runtime_key: shadow.runtime_key,
            }),
            priority,
            request_headers_to_add: header_values(wire.request_headers_to_add),
            rate_limits: rate_limits(wire.rate_limits),
            include_vh_rate_limits: wire.include_vh_rate_limits.unwrap_or(false),
            hash_policy: wire.hash_policy.map(|policy| policy.header_name),
        }))
    };

    Ok(Route {
        route_match,
        action,
        opaque_config: wire.opaque_config.unwrap_or_default(),
    })
}

fn translate_weighted_clusters(wire: wire::WeightedClusters) -> Result<WeightedClusters, String> {
    if wire.clusters.is_empty() {
        return Err("weighted_clusters must list at least one cluster".to_string());
    }
    let total: u32 = wire.clusters.iter().map(|cluster| cluster.weight).sum();
    if total != WEIGHTED_CLUSTERS_TOTAL {
        return Err(format!(
            "weighted_clusters weights must sum to {WEIGHTED_CLUSTERS_TOTAL}, got {total}"
        ));
    }

    Ok(WeightedClusters {
        clusters: wire
            .clusters
            .into_iter()
            .map(|cluster| ClusterWeight {
                name: cluster.name,
                weight: cluster.weight,
            })
            .collect(),
        runtime_key_prefix: wire.runtime_key_prefix,
    })
}

#[cfg(test)]
mod tests {
    use super::{
        ClusterTarget, HostRewrite, PathMatch, RateLimitAction, RouteAction, RouteConfiguration,
        RouteConfigurationTranslator, RoutingPriority, TlsRequirement,
    };
    use config_subscription::{RawResource, ResourceTranslator};
    use serde_json::{json, Value};
    use std::time::Duration;

    fn single_route(route: Value) -> Value {
        json!({
            "virtual_hosts": [{
                "name": "local",
                "domains": ["*"],
                "routes": [route],
            }]
        })
    }

    fn translate(body: Value) -> Result<RouteConfiguration, String> {
        RouteConfigurationTranslator
            .translate(&RawResource::new("local_routes", body))
            .map_err(|err| err.reason().to_string())
    }

    #[test]
    fn cluster_route_is_translated() {
        let config = translate(json!({
            "virtual_hosts": [{
                "name": "local",
                "domains": ["*"],
                "require_ssl": "all",
                "routes": [{
                    "prefix": "/api",
                    "cluster": "backend",
                    "prefix_rewrite": "/",
                    "auto_host_rewrite": true,
                    "timeout_ms": 1500,
                    "priority": "high",
                    "retry_policy": {
                        "retry_on": "5xx",
                        "num_retries": 3,
                        "per_try_timeout_ms": 200,
                    },
                    "headers": [{ "name": ":method", "value": "GET" }],
                }],
            }],
        }))
        .unwrap();

        assert_eq!(config.name, "local_routes");
        let host = &config.virtual_hosts[0];
        assert_eq!(host.require_tls, TlsRequirement::All);

        let route = &host.routes[0];
        assert_eq!(route.route_match.path, PathMatch::Prefix("/api".to_string()));
        assert!(route.route_match.case_sensitive);
        assert_eq!(route.route_match.headers[0].value.as_deref(), Some("GET"));

        let RouteAction::Forward(action) = &route.action else {
            panic!("expected a forward action");
        };
        assert_eq!(action.target, ClusterTarget::Cluster("backend".to_string()));
        assert_eq!(action.host_rewrite, HostRewrite::Auto);
        assert_eq!(action.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(action.priority, RoutingPriority::High);
        let retry = action.retry_policy.as_ref().unwrap();
        assert_eq!(retry.num_retries, Some(3));
        assert_eq!(retry.per_try_timeout, Some(Duration::from_millis(200)));
    }

    #[test]
    fn redirect_route_is_translated() {
        let config = translate(single_route(json!({
            "path": "/old",
            "path_redirect": "/new",
        })))
        .unwrap();

        assert!(matches!(
            &config.virtual_hosts[0].routes[0].action,
            RouteAction::Redirect(redirect) if redirect.path_redirect.as_deref() == Some("/new")
        ));
    }

    #[test]
    fn prefix_and_path_are_exclusive() {
        assert_eq!(
            translate(single_route(json!({ "prefix": "/", "path": "/a", "cluster": "c" }))),
            Err("routes must specify either prefix or path".to_string())
        );
    }

    #[test]
    fn redirect_with_websocket_is_rejected() {
        assert_eq!(
            translate(single_route(json!({
                "prefix": "/",
                "host_redirect": "example.com",
                "use_websocket": true,
            }))),
            Err("Redirect route entries must not have WebSockets set".to_string())
        );
    }

    #[test]
    fn redirect_with_cluster_is_rejected() {
        assert_eq!(
            translate(single_route(json!({
                "prefix": "/",
                "host_redirect": "example.com",
                "cluster": "c",
            }))),
            Err("routes must be either redirects or cluster targets".to_string())
        );
    }

    #[test]
    fn cluster_targets_are_mutually_exclusive() {
        let expected =
            Err("routes must specify one of cluster/cluster_header/weighted_clusters".to_string());

        assert_eq!(
            translate(single_route(json!({
                "prefix": "/",
                "cluster": "c",
                "cluster_header": "x-cluster",
            }))),
            expected
        );
        assert_eq!(translate(single_route(json!({ "prefix": "/" }))), expected);
    }

    #[test]
    fn host_rewrite_options_are_exclusive() {
        assert_eq!(
            translate(single_route(json!({
                "prefix": "/",
                "cluster": "c",
                "host_rewrite": "example.com",
                "auto_host_rewrite": true,
            }))),
            Err(
                "routes cannot have both auto_host_rewrite and host_rewrite options set"
                    .to_string()
            )
        );
    }

    #[test]
    fn weighted_clusters_keep_runtime_prefix() {
        let config = translate(single_route(json!({
            "prefix": "/",
            "weighted_clusters": {
                "runtime_key_prefix": "routing.traffic_split",
                "clusters": [
                    { "name": "blue", "weight": 80 },
                    { "name": "green", "weight": 20 },
                ],
            },
        })))
        .unwrap();

        let RouteAction::Forward(action) = &config.virtual_hosts[0].routes[0].action else {
            panic!("expected a forward action");
        };
        let ClusterTarget::Weighted(weighted) = &action.target else {
            panic!("expected weighted clusters");
        };
        assert_eq!(weighted.runtime_key_prefix.as_deref(), Some("routing.traffic_split"));
        assert_eq!(weighted.clusters[1].name, "green");
    }

    #[test]
    fn weighted_clusters_must_total_one_hundred() {
        let result = translate(single_route(json!({
            "prefix": "/",
            "weighted_clusters": { "clusters": [{ "name": "blue", "weight": 50 }] },
        })));

        assert!(result.unwrap_err().contains("must sum to 100"));
    }

    #[test]
    fn rate_limit_actions_are_typed() {
        let config = translate(json!({
            "virtual_hosts": [{
                "name": "local",
                "domains": ["*"],
                "rate_limits": [{
                    "actions": [
                        { "type": "remote_address" },
                        { "type": "generic_key", "descriptor_value": "api" },
                    ],
                }],
            }],
        }))
        .unwrap();

        let actions = &config.virtual_hosts[0].rate_limits[0].actions;
        assert_eq!(actions[0], RateLimitAction::RemoteAddress);
        assert_eq!(
            actions[1],
            RateLimitAction::GenericKey {
                descriptor_value: "api".to_string()
            }
        );
    }

    #[test]
    fn unknown_route_field_is_rejected() {
        assert!(translate(single_route(json!({
            "prefix": "/",
            "cluster": "c",
            "retry_budget": 3,
        })))
        .is_err());
    }

    #[test]
    fn reason_is_attributed_to_the_resource() {
        let err = RouteConfigurationTranslator
            .translate(&RawResource::new(
                "local_routes",
                single_route(json!({ "prefix": "/" })),
            ))
            .unwrap_err();

        assert_eq!(err.resource(), Some("local_routes"));
    }
}
