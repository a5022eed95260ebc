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

//! Structured logging vocabulary.
//!
//! The crate emits `tracing` events keyed by the names in [`events`], with shared
//! field values and formatters in [`fields`]. It never installs a global subscriber;
//! binaries and tests initialize `tracing_subscriber` at process boundaries.

pub mod events;
pub mod fields;
