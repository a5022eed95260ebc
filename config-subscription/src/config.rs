/********************************************************************************
 * Copyright (c) 2025 Contributors to the Eclipse Foundation
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

//! JSON5 subscription configuration.
//!
//! ```json5
//! {
//!     group: "clusters",
//!     resource_names: ["cluster0", "cluster1"],
//!     transport: { polling: { poll_interval_ms: 2000 } },
//! }
//! ```

use crate::error::ConfigError;
use crate::resource::ResourceGroup;
use crate::transport::{
    AggregatedStream, FileWatchOptions, FileWatchTransport, PollingClient, PollingOptions,
    PollingTransport, StreamConnector, StreamingOptions, StreamingTransport, Transport,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionConfig {
    pub group: ResourceGroup,
    #[serde(default)]
    pub resource_names: Vec<String>,
    pub transport: TransportConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub enum TransportConfig {
    Streaming(StreamingConfig),
    Aggregated(StreamingConfig),
    Polling(PollingConfig),
    FileWatch(FileWatchConfig),
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct StreamingConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileWatchConfig {
    pub path: PathBuf,
    #[serde(default = "default_watch_filesystem")]
    pub watch_filesystem: bool,
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_request_timeout_ms() -> u64 {
    1_000
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_watch_filesystem() -> bool {
    true
}

impl From<&StreamingConfig> for StreamingOptions {
    fn from(config: &StreamingConfig) -> Self {
        StreamingOptions {
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl From<&PollingConfig> for PollingOptions {
    fn from(config: &PollingConfig) -> Self {
        PollingOptions {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

impl From<&FileWatchConfig> for FileWatchOptions {
    fn from(config: &FileWatchConfig) -> Self {
        FileWatchOptions {
            watch_filesystem: config.watch_filesystem,
        }
    }
}

/// Wire collaborators a configured transport may need.
#[derive(Default, Clone)]
pub struct TransportEndpoints {
    stream_connector: Option<Arc<dyn StreamConnector>>,
    aggregated_stream: Option<AggregatedStream>,
    polling_client: Option<Arc<dyn PollingClient>>,
}

impl TransportEndpoints {
    pub fn with_stream_connector(mut self, connector: Arc<dyn StreamConnector>) -> Self {
        self.stream_connector = Some(connector);
        self
    }

    pub fn with_aggregated_stream(mut self, stream: AggregatedStream) -> Self {
        self.aggregated_stream = Some(stream);
        self
    }

    pub fn with_polling_client(mut self, client: Arc<dyn PollingClient>) -> Self {
        self.polling_client = Some(client);
        self
    }
}

impl TransportConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportConfig::Streaming(_) => "streaming",
            TransportConfig::Aggregated(_) => "aggregated",
            TransportConfig::Polling(_) => "polling",
            TransportConfig::FileWatch(_) => "file_watch",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            TransportConfig::Streaming(config) | TransportConfig::Aggregated(config) => {
                if config.initial_backoff_ms == 0 {
                    return Err(ConfigError::Invalid(
                        "initial_backoff_ms must be positive".to_string(),
                    ));
                }
                if config.max_backoff_ms < config.initial_backoff_ms {
                    return Err(ConfigError::Invalid(
                        "max_backoff_ms must not be below initial_backoff_ms".to_string(),
                    ));
                }
            }
            TransportConfig::Polling(config) => {
                if config.poll_interval_ms == 0 || config.request_timeout_ms == 0 {
                    return Err(ConfigError::Invalid(
                        "poll_interval_ms and request_timeout_ms must be positive".to_string(),
                    ));
                }
            }
            TransportConfig::FileWatch(config) => {
                if config.path.as_os_str().is_empty() {
                    return Err(ConfigError::Invalid("file_watch path is empty".to_string()));
                }
            }
        }
        Ok(())
    }

    /// Builds the configured transport from the supplied collaborators.
    pub fn build(&self, endpoints: &TransportEndpoints) -> Result<Transport, ConfigError> {
        let missing =
            |what: &str| ConfigError::Invalid(format!("{} transport needs a {what}", self.kind()));

        let transport: Transport = match self {
            TransportConfig::Streaming(config) => {
                let connector = endpoints
                    .stream_connector
                    .clone()
                    .ok_or_else(|| missing("stream connector"))?;
                StreamingTransport::new(connector, config.into()).into()
            }
            TransportConfig::Aggregated(_) => endpoints
                .aggregated_stream
                .as_ref()
                .ok_or_else(|| missing("shared aggregated stream"))?
                .transport()
                .into(),
            TransportConfig::Polling(config) => {
                let client = endpoints
                    .polling_client
                    .clone()
                    .ok_or_else(|| missing("polling client"))?;
                PollingTransport::new(client, config.into()).into()
            }
            TransportConfig::FileWatch(config) => {
                FileWatchTransport::new(config.path.clone(), config.into()).into()
            }
        };
        Ok(transport)
    }
}

impl SubscriptionConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Read)?;
        contents.parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.group.as_str().trim().is_empty() {
            return Err(ConfigError::Invalid("group must not be empty".to_string()));
        }
        self.transport.validate()
    }
}

impl FromStr for SubscriptionConfig {
    type Err = ConfigError;

    fn from_str(contents: &str) -> Result<Self, Self::Err> {
        let config: SubscriptionConfig =
            json5::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
