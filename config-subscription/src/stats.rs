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

//! Monotonic subscription counters.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters owned by one controller. Only the controller records into them.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionStats {
    attempt: AtomicU64,
    success: AtomicU64,
    rejected: AtomicU64,
    failure: AtomicU64,
}

impl SubscriptionStats {
    pub(crate) fn record_attempt(&self) {
        self.attempt.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failure.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempt: self.attempt.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failure: self.failure.load(Ordering::Relaxed),
        }
    }
}

/// Read-only copy of the four counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatsSnapshot {
    pub attempt: u64,
    pub success: u64,
    pub rejected: u64,
    pub failure: u64,
}

impl StatsSnapshot {
    pub fn new(attempt: u64, success: u64, rejected: u64, failure: u64) -> Self {
        Self {
            attempt,
            success,
            rejected,
            failure,
        }
    }
}

impl Display for StatsSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "attempt={} success={} rejected={} failure={}",
            self.attempt, self.success, self.rejected, self.failure
        )
    }
}
