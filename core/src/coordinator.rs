/*
 * coordinator.rs
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

//! The relay's long-lived state and its two inbound message streams.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::chat::{ChatTransport, OutboundText};
use crate::config::Config;
use crate::dispatch::{self, DispatchOutcome};
use crate::error::{Error, Result};
use crate::mail::{CodePoller, ImapMailSession, MailSession};
use crate::quota::QuotaLedger;
use crate::registration::{self, Session, Step, Transition};
use crate::replies;
use crate::store::{Account, AccountIndex, AccountStore, JsonFileStore, UsageStore};

/// Owner commands with their menu descriptions, for the host to register.
pub const OWNER_COMMANDS: &[(&str, &str)] = &[
    ("addmail", "Add a mailbox"),
    ("delmail", "Remove a mailbox"),
    ("listmails", "List mailboxes"),
];

/// Owns the dialogue sessions, the poller with its cursors, the quota ledger and the account
/// store. Share behind an `Arc`; every handler takes `&self`.
pub struct Coordinator {
    accounts: Arc<dyn AccountStore>,
    /// Serializes load-mutate-save of the account index.
    accounts_lock: Mutex<()>,
    sessions: Mutex<HashMap<String, Session>>,
    poller: CodePoller,
    ledger: QuotaLedger,
    owners: Arc<dyn ChatTransport>,
    requesters: Arc<dyn ChatTransport>,
    shutdown: CancellationToken,
}

impl Coordinator {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        usage: Arc<dyn UsageStore>,
        mail: Arc<dyn MailSession>,
        owners: Arc<dyn ChatTransport>,
        requesters: Arc<dyn ChatTransport>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        Self {
            accounts,
            accounts_lock: Mutex::new(()),
            sessions: Mutex::new(HashMap::new()),
            poller: CodePoller::new(mail, shutdown.child_token()),
            ledger: QuotaLedger::new(usage),
            owners,
            requesters,
            shutdown,
        }
    }

    /// Production wiring: JSON files in the configured data directory, IMAP over TLS.
    pub fn from_config(
        config: &Config,
        owners: Arc<dyn ChatTransport>,
        requesters: Arc<dyn ChatTransport>,
    ) -> Self {
        let store = Arc::new(JsonFileStore::new(&config.data_dir));
        let mail = Arc::new(ImapMailSession::new(config.mail.clone()).with_port(config.imap_port));
        Self::new(store.clone(), store, mail, owners, requesters)
    }

    /// Stop in-flight polls at their next wait. Requests in progress answer "not found".
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn poller(&self) -> &CodePoller {
        &self.poller
    }

    /// The active dialogue in `chat_id`, if any.
    pub fn session(&self, chat_id: &str) -> Option<Session> {
        self.sessions_guard().get(chat_id).cloned()
    }

    /// Handle one message from an owner. The chat id is the owner id.
    pub async fn handle_owner_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let text = text.trim();
        match command_name(text) {
            Some("addmail") => {
                self.sessions_guard()
                    .insert(chat_id.to_string(), Session::Register(Step::AwaitingEmail));
                return self.reply_owner(chat_id, replies::ask_email()).await;
            }
            Some("delmail") => {
                self.sessions_guard().insert(chat_id.to_string(), Session::Delete);
                return self.reply_owner(chat_id, replies::ask_delete_target()).await;
            }
            _ => {}
        }

        let active = self.sessions_guard().remove(chat_id);
        let Some(session) = active else {
            if command_name(text) == Some("listmails") {
                return self.list_accounts(chat_id).await;
            }
            return Ok(());
        };
        if registration::is_command(text) {
            log::debug!("[register] {} cancelled by {}", chat_id, text);
            return Ok(());
        }

        match session {
            Session::Delete => self.delete_account(chat_id, text).await,
            Session::Register(step) => {
                let index = self.load_accounts()?;
                let transition =
                    registration::advance(step, chat_id, text, &index, self.poller.mail().as_ref()).await;
                match transition {
                    Transition::Continue(next, prompt) | Transition::Retry(next, prompt) => {
                        self.resume(chat_id, Session::Register(next));
                        self.reply_owner(chat_id, prompt).await
                    }
                    Transition::Abort(reply) => self.reply_owner(chat_id, reply).await,
                    Transition::Complete(account) => self.finish_registration(chat_id, account).await,
                }
            }
        }
    }

    /// Handle one message from a requester: deliver a code if `text` is a registered command.
    pub async fn handle_requester_message(
        &self,
        chat_id: &str,
        requester_id: &str,
        text: &str,
    ) -> Result<DispatchOutcome> {
        let index = self.load_accounts()?;
        let Some(account) = dispatch::match_command(&index, text).cloned() else {
            return Ok(DispatchOutcome::Unmatched);
        };
        dispatch::deliver_code(
            &self.ledger,
            &self.poller,
            self.requesters.as_ref(),
            chat_id,
            requester_id,
            &account,
        )
        .await
    }

    /// Put a session back unless the chat started a new one while the step was running.
    fn resume(&self, chat_id: &str, session: Session) {
        self.sessions_guard().entry(chat_id.to_string()).or_insert(session);
    }

    async fn finish_registration(&self, chat_id: &str, account: Account) -> Result<()> {
        let command = account.command.clone();
        let email = account.email.clone();
        let saved = self.update_accounts(|index| index.add(account));
        match saved {
            Ok(()) => {
                log::info!("[register] {} added {} as {}", chat_id, email, command);
                self.reply_owner(chat_id, replies::account_added(&command)).await
            }
            Err(Error::DuplicateRegistration { field, value }) => {
                log::info!("[register] {} lost a race on {} {}", chat_id, field, value);
                let reply = if field == "email" {
                    replies::email_taken()
                } else {
                    replies::command_taken()
                };
                self.reply_owner(chat_id, reply).await
            }
            Err(e) => {
                log::error!("[register] saving {} for {}: {}", email, chat_id, e);
                self.reply_owner(chat_id, replies::storage_failed()).await?;
                Err(e)
            }
        }
    }

    async fn delete_account(&self, chat_id: &str, target: &str) -> Result<()> {
        if self.load_accounts()?.accounts(chat_id).is_empty() {
            return self.reply_owner(chat_id, replies::no_accounts()).await;
        }
        match self.update_accounts(|index| Ok(index.remove(chat_id, target)))? {
            Some(removed) => {
                self.poller.forget(chat_id, &removed.email);
                log::info!("[register] {} removed {} ({})", chat_id, removed.email, removed.command);
                self.reply_owner(chat_id, replies::account_removed()).await
            }
            None => self.reply_owner(chat_id, replies::account_not_found()).await,
        }
    }

    async fn list_accounts(&self, chat_id: &str) -> Result<()> {
        let index = self.load_accounts()?;
        self.reply_owner(chat_id, replies::account_list(index.accounts(chat_id)))
            .await
    }

    fn load_accounts(&self) -> Result<AccountIndex> {
        Ok(self.accounts.load_accounts()?)
    }

    /// Load, apply `f`, and save when `f` succeeds, all under the account lock.
    fn update_accounts<T>(&self, f: impl FnOnce(&mut AccountIndex) -> Result<T>) -> Result<T> {
        let _guard = self.accounts_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut index = self.accounts.load_accounts()?;
        let out = f(&mut index)?;
        self.accounts.save_accounts(&index)?;
        Ok(out)
    }

    async fn reply_owner(&self, chat_id: &str, message: OutboundText) -> Result<()> {
        self.owners.send(chat_id, message).await
    }

    fn sessions_guard(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `"/addmail@bot args"` -> `Some("addmail")`.
fn command_name(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(registration::COMMAND_PREFIX)?;
    let word = rest.split_whitespace().next()?;
    Some(word.split('@').next().unwrap_or(word))
}
