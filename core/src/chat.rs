/*
 * chat.rs
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

//! Chat transport seam. The relay never talks to a messenger directly; the host supplies one
//! transport for the owners' registration dialogue and one for requesters.

use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    /// Telegram-style HTML subset (`<b>`, `<code>`, ...). Dynamic text is escaped by the sender.
    Html,
}

/// One outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundText {
    pub text: String,
    pub format: TextFormat,
}

impl OutboundText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Plain,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Html,
        }
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, chat_id: &str, message: OutboundText) -> Result<()>;
}
