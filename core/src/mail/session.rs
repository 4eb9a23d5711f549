/*
 * session.rs
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

//! Mail session: one authenticated IMAP conversation per call.

use async_trait::async_trait;

use super::extract::{extract_code, MailFilter};
use super::provider::{resolve, IMAPS_PORT};
use super::{FetchOutcome, FoundCode, MailError};
use crate::net::TlsStream;
use crate::protocol::imap::{ImapClientError, ImapErrorKind, ImapSession};

const INBOX: &str = "INBOX";

/// Access to a mailbox by address and password.
#[async_trait]
pub trait MailSession: Send + Sync {
    /// Open and close an authenticated session.
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<(), MailError>;

    /// Look at the latest message from the configured sender. `last_seen` is the UID already
    /// delivered; when it is still the latest, nothing is fetched.
    async fn fetch_latest_code(&self, email: &str, password: &str, last_seen: Option<u32>) -> FetchOutcome;

    /// `verify_credentials` folded to a boolean; failures are logged, never raised.
    async fn credentials_valid(&self, email: &str, password: &str) -> bool {
        match self.verify_credentials(email, password).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[mail] credential check for {} failed: {}", email, e);
                false
            }
        }
    }
}

/// `MailSession` over the in-tree IMAP client, implicit TLS.
pub struct ImapMailSession {
    filter: MailFilter,
    port: u16,
}

impl ImapMailSession {
    pub fn new(filter: MailFilter) -> Self {
        Self {
            filter,
            port: IMAPS_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    async fn open(&self, email: &str, password: &str) -> Result<ImapSession<TlsStream>, MailError> {
        let host = resolve(email)?;
        let mut session = ImapSession::connect(host, self.port).await.map_err(transport)?;
        session.login(email, password).await.map_err(|e| match e.kind {
            ImapErrorKind::Rejected => MailError::Credential(e.message),
            _ => transport(e),
        })?;
        Ok(session)
    }

    async fn latest_code(
        &self,
        email: &str,
        password: &str,
        last_seen: Option<u32>,
    ) -> Result<Option<FoundCode>, MailError> {
        let mut session = self.open(email, password).await?;
        let result = self.read_latest(&mut session, last_seen).await;
        if let Err(e) = session.logout().await {
            log::debug!("[mail] logout from {} failed: {}", email, e);
        }
        result
    }

    async fn read_latest(
        &self,
        session: &mut ImapSession<TlsStream>,
        last_seen: Option<u32>,
    ) -> Result<Option<FoundCode>, MailError> {
        session.select(INBOX).await.map_err(transport)?;
        let uids = session.uid_search_from(&self.filter.sender).await.map_err(transport)?;
        let Some(&latest) = uids.last() else {
            return Ok(None);
        };
        if Some(latest) == last_seen {
            return Ok(None);
        }
        let raw = session.fetch_body_by_uid(latest).await.map_err(transport)?;
        let extracted = extract_code(&raw, &self.filter)?;
        Ok(extracted.map(|e| FoundCode {
            code: e.code,
            sent_at: e.sent_at,
            uid: latest,
        }))
    }
}

fn transport(e: ImapClientError) -> MailError {
    MailError::Transport(e.message)
}

#[async_trait]
impl MailSession for ImapMailSession {
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<(), MailError> {
        let mut session = self.open(email, password).await?;
        if let Err(e) = session.logout().await {
            log::debug!("[mail] logout from {} failed: {}", email, e);
        }
        Ok(())
    }

    async fn fetch_latest_code(&self, email: &str, password: &str, last_seen: Option<u32>) -> FetchOutcome {
        match self.latest_code(email, password, last_seen).await {
            Ok(Some(found)) => {
                log::info!("[mail] code found in {} (uid {})", email, found.uid);
                FetchOutcome::Found(found)
            }
            Ok(None) => FetchOutcome::NotFound,
            Err(e) => {
                match &e {
                    MailError::Parse(_) => log::warn!("[mail] unreadable message in {}: {}", email, e),
                    _ => log::error!("[mail] fetching from {} failed: {}", email, e),
                }
                FetchOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_provider_fails_before_connecting() {
        let mail = ImapMailSession::new(MailFilter::default());
        assert_eq!(
            mail.verify_credentials("me@example.org", "pw").await,
            Err(MailError::UnknownProvider("example.org".to_string()))
        );
        assert!(!mail.credentials_valid("me@example.org", "pw").await);
        assert_eq!(
            mail.fetch_latest_code("me@example.org", "pw", None).await,
            FetchOutcome::Failed(MailError::UnknownProvider("example.org".to_string()))
        );
    }
}
