/*
 * usage.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Mailcode, a mailbox verification-code relay.
 *
 * Mailcode is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Mailcode is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Mailcode.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Usage counters keyed by (owner, requester, command).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consumption counter for one (owner, requester, command) triple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub count: u32,
    /// End of the current window. Never set for lifetime budgets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<DateTime<Utc>>,
}

type CommandUsage = BTreeMap<String, UsageRecord>;
type RequesterUsage = BTreeMap<String, CommandUsage>;

/// `owner -> requester -> command -> record`, stored as nested JSON objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageIndex {
    owners: BTreeMap<String, RequesterUsage>,
}

impl UsageIndex {
    pub fn record(&self, owner: &str, requester: &str, command: &str) -> Option<&UsageRecord> {
        self.owners.get(owner)?.get(requester)?.get(command)
    }

    /// The record for the triple, created empty on first access.
    pub fn record_mut(&mut self, owner: &str, requester: &str, command: &str) -> &mut UsageRecord {
        self.owners
            .entry(owner.to_string())
            .or_default()
            .entry(requester.to_string())
            .or_default()
            .entry(command.to_string())
            .or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
