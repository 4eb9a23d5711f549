/*
 * dispatch.rs
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

//! Requester side: map a message to a registered command and run the code delivery for it.

use chrono::Utc;

use crate::chat::ChatTransport;
use crate::error::Result;
use crate::mail::{CodePoller, POLL_TIMEOUT};
use crate::quota::{QuotaLedger, QuotaOutcome};
use crate::replies;
use crate::store::{Account, AccountIndex};

/// First account, across all owners in registration order, whose command equals `text`
/// after trimming and ignoring case.
pub fn match_command<'a>(index: &'a AccountIndex, text: &str) -> Option<&'a Account> {
    let wanted = text.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    index.iter().find(|a| a.command.to_lowercase() == wanted)
}

/// What happened to one requester message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a registered command; nothing was sent.
    Unmatched,
    Denied(QuotaOutcome),
    NotFound,
    /// `remaining` is the allowance left after this delivery, `None` when unmetered.
    Delivered { code: String, remaining: Option<u32> },
}

/// Acknowledge, check the quota, poll, count the use, reply.
pub(crate) async fn deliver_code(
    ledger: &QuotaLedger,
    poller: &CodePoller,
    transport: &dyn ChatTransport,
    chat_id: &str,
    requester_id: &str,
    account: &Account,
) -> Result<DispatchOutcome> {
    let policy = account.policy();
    let owner = account.owner_id.as_str();
    let command = account.command.as_str();
    log::info!("[dispatch] {} asked for {} ({})", requester_id, command, account.email);

    transport.send(chat_id, replies::searching()).await?;

    match ledger.check(owner, requester_id, command, &policy, Utc::now())? {
        QuotaOutcome::Allowed { .. } => {}
        QuotaOutcome::DeniedLifetime => {
            transport.send(chat_id, replies::denied_lifetime()).await?;
            return Ok(DispatchOutcome::Denied(QuotaOutcome::DeniedLifetime));
        }
        QuotaOutcome::DeniedUntil { seconds_remaining } => {
            transport.send(chat_id, replies::denied_until(seconds_remaining)).await?;
            return Ok(DispatchOutcome::Denied(QuotaOutcome::DeniedUntil { seconds_remaining }));
        }
    }

    let Some(found) = poller.poll_account(owner, &account.email, &account.password).await else {
        transport
            .send(chat_id, replies::code_not_found(POLL_TIMEOUT.as_secs()))
            .await?;
        return Ok(DispatchOutcome::NotFound);
    };

    // The code is already out of the mailbox; a failed count must not withhold it.
    let remaining = match ledger.consume(owner, requester_id, command, &policy, Utc::now()) {
        Ok(remaining) => remaining,
        Err(e) => {
            log::error!("[dispatch] could not record use of {} by {}: {}", command, requester_id, e);
            None
        }
    };
    transport
        .send(chat_id, replies::code_found(&found.code, found.sent_at, remaining))
        .await?;
    Ok(DispatchOutcome::Delivered {
        code: found.code,
        remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(owner: &str, email: &str, command: &str) -> Account {
        Account {
            owner_id: owner.to_string(),
            email: email.to_string(),
            password: "pw".to_string(),
            command: command.to_string(),
            limit: None,
            period_hours: None,
        }
    }

    #[test]
    fn first_registered_owner_wins() {
        let mut index = AccountIndex::default();
        index.add(account("20", "b@gmail.com", "steam")).unwrap();
        index.add(account("10", "a@gmail.com", "steam")).unwrap();
        let hit = match_command(&index, "  STEAM\n").unwrap();
        assert_eq!(hit.owner_id, "20");
    }

    #[test]
    fn no_match_and_blank_text() {
        let mut index = AccountIndex::default();
        index.add(account("1", "a@gmail.com", "steam")).unwrap();
        assert!(match_command(&index, "steam please").is_none());
        assert!(match_command(&index, "   ").is_none());
    }
}
