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

//! Reconnect schedules for stream-based transports.

use std::time::Duration;

/// Supplies the delay before each reconnect attempt.
pub trait BackoffStrategy: Send {
    fn next_backoff(&mut self) -> Duration;

    /// Called after a successful connect.
    fn reset(&mut self);
}

/// Exponential backoff with equal jitter, capped at `max`.
///
/// The n-th delay is drawn uniformly from `[ceiling / 2, ceiling]` where
/// `ceiling = min(base * 2^n, max)`.
#[derive(Clone, Debug)]
pub struct JitteredExponentialBackoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl JitteredExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            attempt: 0,
        }
    }

    fn ceiling(&self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl BackoffStrategy for JitteredExponentialBackoff {
    fn next_backoff(&mut self) -> Duration {
        let ceiling_ms = self.ceiling().as_millis() as u64;
        self.attempt = self.attempt.saturating_add(1);

        let half = ceiling_ms / 2;
        let jitter = if ceiling_ms > half {
            fastrand::u64(0..=ceiling_ms - half)
        } else {
            0
        };
        Duration::from_millis(half + jitter)
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Constant delay between attempts.
#[derive(Clone, Debug)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffStrategy for FixedBackoff {
    fn next_backoff(&mut self) -> Duration {
        self.delay
    }

    fn reset(&mut self) {}
}
