/*
 * mod.rs
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

//! Persistence: the account index and the usage index, each read and written as a whole
//! document. Callers serialize their load-mutate-save cycles; stores only guarantee that a
//! single save is atomic.

mod account;
mod error;
mod json_file;
mod memory;
mod usage;

pub use account::{Account, AccountIndex};
pub use error::StoreError;
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use usage::{UsageIndex, UsageRecord};

/// Document store for `owner -> ordered accounts`.
pub trait AccountStore: Send + Sync {
    fn load_accounts(&self) -> Result<AccountIndex, StoreError>;
    fn save_accounts(&self, index: &AccountIndex) -> Result<(), StoreError>;
}

/// Document store for `owner -> requester -> command -> usage`.
pub trait UsageStore: Send + Sync {
    fn load_usage(&self) -> Result<UsageIndex, StoreError>;
    fn save_usage(&self, index: &UsageIndex) -> Result<(), StoreError>;
}
