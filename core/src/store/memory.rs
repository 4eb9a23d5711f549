/*
 * memory.rs
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

//! In-memory document store.

use std::sync::{Mutex, PoisonError};

use super::{AccountIndex, AccountStore, StoreError, UsageIndex, UsageStore};

/// Holds both documents in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: Mutex<AccountIndex>,
    usage: Mutex<UsageIndex>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for MemoryStore {
    fn load_accounts(&self) -> Result<AccountIndex, StoreError> {
        Ok(self.accounts.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save_accounts(&self, index: &AccountIndex) -> Result<(), StoreError> {
        *self.accounts.lock().unwrap_or_else(PoisonError::into_inner) = index.clone();
        Ok(())
    }
}

impl UsageStore for MemoryStore {
    fn load_usage(&self) -> Result<UsageIndex, StoreError> {
        Ok(self.usage.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save_usage(&self, index: &UsageIndex) -> Result<(), StoreError> {
        *self.usage.lock().unwrap_or_else(PoisonError::into_inner) = index.clone();
        Ok(())
    }
}
