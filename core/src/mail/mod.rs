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

//! Mailbox side of the relay: which server to talk to, how to read the latest verification
//! message, how to pull a code out of it, and how to keep asking until one turns up.

mod extract;
mod poller;
mod provider;
mod session;

pub use extract::{extract_code, ExtractedCode, MailFilter};
pub use poller::{CodePoller, POLL_INTERVAL, POLL_TIMEOUT};
pub use provider::{resolve, IMAPS_PORT};
pub use session::{ImapMailSession, MailSession};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Why a mailbox interaction did not produce a code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MailError {
    #[error("unsupported mail provider: {0}")]
    UnknownProvider(String),

    #[error("mailbox refused credentials: {0}")]
    Credential(String),

    #[error("mail server unreachable: {0}")]
    Transport(String),

    #[error("malformed message: {0}")]
    Parse(String),
}

/// A verification code read from a specific message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundCode {
    pub code: String,
    /// Send time from the message's Date header.
    pub sent_at: DateTime<Utc>,
    /// IMAP UID of the message; becomes the new cursor.
    pub uid: u32,
}

/// Outcome of one look into the mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(FoundCode),
    /// No message from the sender, the latest one was already delivered, or it is not a
    /// genuine verification message.
    NotFound,
    Failed(MailError),
}
