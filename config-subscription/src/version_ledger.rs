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

//! Per-group bookkeeping of accepted versions and watched names.

use crate::resource::{ResourceGroup, VersionInfo};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
struct LedgerEntry {
    version: Option<VersionInfo>,
    names: BTreeSet<String>,
}

/// Storage owner for accepted versions. Trusts its caller; performs no validation.
#[derive(Debug, Default)]
pub(crate) struct VersionLedger {
    entries: HashMap<ResourceGroup, LedgerEntry>,
}

impl VersionLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn current_version(&self, group: &ResourceGroup) -> Option<&VersionInfo> {
        self.entries
            .get(group)
            .and_then(|entry| entry.version.as_ref())
    }

    /// Replaces the stored version unconditionally.
    pub(crate) fn accept(&mut self, group: &ResourceGroup, version: VersionInfo) {
        self.entries.entry(group.clone()).or_default().version = Some(version);
    }

    pub(crate) fn subscribed_names(&self, group: &ResourceGroup) -> BTreeSet<String> {
        self.entries
            .get(group)
            .map(|entry| entry.names.clone())
            .unwrap_or_default()
    }

    /// Replaces the watched set. Returns `true` when the new set differs.
    pub(crate) fn update_names(&mut self, group: &ResourceGroup, names: BTreeSet<String>) -> bool {
        let entry = self.entries.entry(group.clone()).or_default();
        if entry.names == names {
            return false;
        }
        entry.names = names;
        true
    }
}
