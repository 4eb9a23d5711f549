/*
 * registration.rs
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

//! Owner dialogue: the step-by-step registration of a mailbox and the one-shot deletion prompt.
//!
//! A step owns exactly the answers collected so far. `advance` consumes the current step and
//! the owner's reply and says what happens next; the caller keeps the session map and does the
//! final save.

use std::num::NonZeroU32;

use tokio::time::timeout;

use crate::chat::OutboundText;
use crate::mail::{MailError, MailSession, POLL_TIMEOUT};
use crate::replies::{self, FOREVER_TOKEN, UNLIMITED_TOKEN};
use crate::store::{Account, AccountIndex};

/// Prefix that marks a message as a command rather than an answer.
pub const COMMAND_PREFIX: char = '/';

pub fn is_command(text: &str) -> bool {
    text.trim_start().starts_with(COMMAND_PREFIX)
}

/// Where a registration dialogue stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    AwaitingEmail,
    AwaitingPassword {
        email: String,
    },
    AwaitingCommand {
        email: String,
        password: String,
    },
    AwaitingLimit {
        email: String,
        password: String,
        command: String,
    },
    AwaitingPeriod {
        email: String,
        password: String,
        command: String,
        limit: NonZeroU32,
    },
}

/// Per-chat owner dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Register(Step),
    /// Waiting for the command or address of the account to remove.
    Delete,
}

/// Result of feeding one reply to a registration step.
#[derive(Debug)]
pub enum Transition {
    /// Move on and ask the next question.
    Continue(Step, OutboundText),
    /// The answer was not acceptable; ask again without leaving the step.
    Retry(Step, OutboundText),
    /// The dialogue is over without an account.
    Abort(OutboundText),
    /// All answers collected; the account still has to be saved.
    Complete(Account),
}

/// Feed `text` to `step`. `accounts` is the current index, used for the uniqueness guards;
/// the password step verifies credentials through `mail`.
pub async fn advance(
    step: Step,
    owner: &str,
    text: &str,
    accounts: &AccountIndex,
    mail: &dyn MailSession,
) -> Transition {
    let text = text.trim();
    match step {
        Step::AwaitingEmail => {
            if text.is_empty() {
                return Transition::Retry(Step::AwaitingEmail, replies::ask_email());
            }
            if accounts.email_taken(owner, text) {
                return Transition::Abort(replies::email_taken());
            }
            Transition::Continue(
                Step::AwaitingPassword {
                    email: text.to_string(),
                },
                replies::ask_password(),
            )
        }
        Step::AwaitingPassword { email } => {
            let verified = timeout(POLL_TIMEOUT, mail.verify_credentials(&email, text))
                .await
                .unwrap_or_else(|_| {
                    Err(MailError::Transport(format!(
                        "no answer within {} seconds",
                        POLL_TIMEOUT.as_secs()
                    )))
                });
            if let Err(e) = verified {
                log::warn!("[register] {} could not verify {}: {}", owner, email, e);
                return Transition::Abort(replies::verification_failed(&e));
            }
            Transition::Continue(
                Step::AwaitingCommand {
                    email,
                    password: text.to_string(),
                },
                replies::ask_command(),
            )
        }
        Step::AwaitingCommand { email, password } => {
            let command = text.to_lowercase();
            if command.is_empty() {
                return Transition::Retry(Step::AwaitingCommand { email, password }, replies::ask_command());
            }
            if accounts.command_taken(owner, &command) {
                return Transition::Abort(replies::command_taken());
            }
            Transition::Continue(
                Step::AwaitingLimit {
                    email,
                    password,
                    command,
                },
                replies::ask_limit(),
            )
        }
        Step::AwaitingLimit {
            email,
            password,
            command,
        } => {
            if text.eq_ignore_ascii_case(UNLIMITED_TOKEN) {
                return Transition::Complete(Account {
                    owner_id: owner.to_string(),
                    email,
                    password,
                    command,
                    limit: None,
                    period_hours: None,
                });
            }
            match parse_count(text).and_then(NonZeroU32::new) {
                Some(limit) => Transition::Continue(
                    Step::AwaitingPeriod {
                        email,
                        password,
                        command,
                        limit,
                    },
                    replies::ask_period(),
                ),
                None => Transition::Retry(
                    Step::AwaitingLimit {
                        email,
                        password,
                        command,
                    },
                    replies::invalid_limit(),
                ),
            }
        }
        Step::AwaitingPeriod {
            email,
            password,
            command,
            limit,
        } => {
            let period_hours = if text.eq_ignore_ascii_case(FOREVER_TOKEN) {
                None
            } else if let Some(hours) = parse_count(text) {
                NonZeroU32::new(hours)
            } else {
                return Transition::Retry(
                    Step::AwaitingPeriod {
                        email,
                        password,
                        command,
                        limit,
                    },
                    replies::invalid_period(),
                );
            };
            Transition::Complete(Account {
                owner_id: owner.to_string(),
                email,
                password,
                command,
                limit: Some(limit),
                period_hours,
            })
        }
    }
}

/// Plain decimal digits only; signs, spaces and fractions are not numbers here.
fn parse_count(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
