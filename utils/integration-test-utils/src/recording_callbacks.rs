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

use config_subscription::{SubscriptionCallbacks, SubscriptionFailure, VersionInfo};
use std::sync::{Mutex, PoisonError};

/// An accepted update as seen by the callbacks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedUpdate {
    pub version: VersionInfo,
    pub resource_count: usize,
}

/// Keeps every notification so tests can assert on what the caller observed.
#[derive(Default)]
pub struct RecordingCallbacks {
    updates: Mutex<Vec<RecordedUpdate>>,
    failures: Mutex<Vec<String>>,
}

impl RecordingCallbacks {
    pub fn updates(&self) -> Vec<RecordedUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Display text of every failure notification, oldest first.
    pub fn failures(&self) -> Vec<String> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn notification_count(&self) -> usize {
        self.updates().len() + self.failures().len()
    }
}

impl<R> SubscriptionCallbacks<R> for RecordingCallbacks {
    fn on_config_update(&self, resources: &[R], version: &VersionInfo) {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedUpdate {
                version: version.clone(),
                resource_count: resources.len(),
            });
    }

    fn on_config_update_failed(&self, failure: &SubscriptionFailure<'_>) {
        let text = match failure {
            SubscriptionFailure::Rejected(err) => format!("rejected: {err}"),
            SubscriptionFailure::Transport(err) => format!("transport: {err}"),
        };
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text);
    }
}
