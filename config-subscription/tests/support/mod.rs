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

use config_subscription::{DiscoveryResponse, ResourceGroup, VersionInfo};
use integration_test_utils::{
    cluster_resources, make_harness, SubscriptionTestHarness, SubscriptionType, TEST_GROUP,
};

pub(crate) const INITIAL_NAMES: [&str; 2] = ["cluster0", "cluster1"];

/// A started harness whose initial request has been consumed.
#[allow(dead_code)]
pub(crate) async fn started_harness(kind: SubscriptionType) -> Box<dyn SubscriptionTestHarness> {
    integration_test_utils::init_logging();

    let mut harness = make_harness(kind);
    harness.start_subscription(&INITIAL_NAMES).await;
    harness.verify_stats(1, 0, 0, 0).await;
    harness
}

#[allow(dead_code)]
pub(crate) fn cluster_response(names: &[&str], version: &str, nonce: &str) -> DiscoveryResponse {
    DiscoveryResponse::new(
        ResourceGroup::from(TEST_GROUP),
        VersionInfo::from(version),
        cluster_resources(names, true),
    )
    .with_nonce(nonce)
}
