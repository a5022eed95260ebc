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

mod mock_authority;
pub use mock_authority::{
    MockPollingAuthority, MockStreamAuthority, PendingExchange, StreamSession, EXPECT_TIMEOUT,
    QUIET_PERIOD,
};
mod recording_callbacks;
pub use recording_callbacks::{RecordedUpdate, RecordingCallbacks};
mod subscription_harness;
pub use subscription_harness::{
    cluster_resources, make_harness, wait_for_stats, AdsSubscriptionTestHarness,
    FilesystemSubscriptionTestHarness, GrpcSubscriptionTestHarness, HttpSubscriptionTestHarness,
    SubscriptionTestHarness, SubscriptionType, TEST_GROUP,
};

use tracing_subscriber::EnvFilter;

/// Installs a test-friendly `tracing` subscriber once per process.
///
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
