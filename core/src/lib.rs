/*
 * lib.rs
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

//! Mailcode core: owners bind mailboxes to short commands; requesters send a command and
//! receive the latest verification code found in that mailbox, within a usage quota.
//!
//! Layering (leaf first): `net` and `protocol::imap` speak to the mail server; `mail` resolves
//! providers, extracts codes and polls; `store` persists accounts and usage; `registration`,
//! `quota` and `dispatch` implement the dialogue and policy; `coordinator` ties them together
//! behind the `chat::ChatTransport` seam.

pub mod chat;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod mail;
pub mod net;
pub mod protocol;
pub mod quota;
pub mod registration;
pub mod replies;
pub mod store;

pub use chat::{ChatTransport, OutboundText, TextFormat};
pub use config::Config;
pub use coordinator::{Coordinator, OWNER_COMMANDS};
pub use dispatch::DispatchOutcome;
pub use error::{Error, Result};
pub use mail::{CodePoller, FetchOutcome, FoundCode, ImapMailSession, MailError, MailSession};
pub use quota::{QuotaLedger, QuotaOutcome, QuotaPolicy};
pub use store::{Account, AccountIndex, AccountStore, JsonFileStore, MemoryStore, UsageIndex, UsageRecord, UsageStore};
