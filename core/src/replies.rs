/*
 * replies.rs
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

//! Reply texts sent to owners and requesters.

use chrono::{DateTime, Local, Utc};

use crate::chat::OutboundText;
use crate::mail::MailError;
use crate::store::Account;

const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

pub(crate) const UNLIMITED_TOKEN: &str = "unlimited";
pub(crate) const FOREVER_TOKEN: &str = "forever";

/// Escape text for the HTML reply format.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Message send time as shown to requesters, in the host's local time zone.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

/// "2 h 5 min" style rendering of a wait, rounded up to the minute.
pub fn format_wait(seconds: u64) -> String {
    let minutes = seconds.div_ceil(60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    match (hours, minutes) {
        (0, m) => format!("{} min", m.max(1)),
        (h, 0) => format!("{} h", h),
        (h, m) => format!("{} h {} min", h, m),
    }
}

// Owner dialogue

pub fn ask_email() -> OutboundText {
    OutboundText::plain("Enter the mailbox address:")
}

pub fn ask_password() -> OutboundText {
    OutboundText::plain("Enter the mailbox password:")
}

pub fn ask_command() -> OutboundText {
    OutboundText::plain("Enter the command requesters will send to get a code:")
}

pub fn ask_limit() -> OutboundText {
    OutboundText::plain(format!(
        "How many codes may each requester receive? Send a positive number or \"{}\".",
        UNLIMITED_TOKEN
    ))
}

pub fn ask_period() -> OutboundText {
    OutboundText::plain(format!(
        "Over how many hours does the limit apply? Send a positive number of hours, or \"{}\" (or 0) for a lifetime budget.",
        FOREVER_TOKEN
    ))
}

pub fn ask_delete_target() -> OutboundText {
    OutboundText::plain("Enter the command or mailbox address to remove:")
}

pub fn email_taken() -> OutboundText {
    OutboundText::plain("This mailbox is already registered. Start again with /addmail.")
}

pub fn command_taken() -> OutboundText {
    OutboundText::plain("This command is already in use. Start again with /addmail.")
}

pub fn invalid_limit() -> OutboundText {
    OutboundText::plain(format!(
        "Send a positive number or \"{}\".",
        UNLIMITED_TOKEN
    ))
}

pub fn invalid_period() -> OutboundText {
    OutboundText::plain(format!(
        "Send a positive number of hours, or \"{}\" (or 0).",
        FOREVER_TOKEN
    ))
}

/// Why the mailbox could not be verified. Passwords never appear in the text.
pub fn verification_failed(err: &MailError) -> OutboundText {
    let text = match err {
        MailError::UnknownProvider(domain) => format!(
            "Mail provider \"{}\" is not supported. Start again with /addmail.",
            domain
        ),
        MailError::Credential(_) => {
            "The mail server rejected the address or password. Start again with /addmail.".to_string()
        }
        MailError::Transport(_) | MailError::Parse(_) => {
            "Could not connect to the mail server. Start again with /addmail.".to_string()
        }
    };
    OutboundText::plain(text)
}

pub fn account_added(command: &str) -> OutboundText {
    OutboundText::html(format!(
        "Account added. Command: <code>{}</code>",
        escape_html(command)
    ))
}

pub fn account_removed() -> OutboundText {
    OutboundText::plain("Account removed.")
}

pub fn account_not_found() -> OutboundText {
    OutboundText::plain("No account matches that command or address.")
}

pub fn no_accounts() -> OutboundText {
    OutboundText::plain("You have no registered accounts.")
}

pub fn storage_failed() -> OutboundText {
    OutboundText::plain("Could not save the change. Try again later.")
}

fn describe_quota(account: &Account) -> String {
    match (account.limit, account.period_hours) {
        (None, _) => UNLIMITED_TOKEN.to_string(),
        (Some(limit), None) => format!("{} in total", limit),
        (Some(limit), Some(hours)) => format!("{} per {} h", limit, hours),
    }
}

/// The owner's accounts, one per line.
pub fn account_list(accounts: &[Account]) -> OutboundText {
    if accounts.is_empty() {
        return no_accounts();
    }
    let lines: Vec<String> = accounts
        .iter()
        .map(|a| {
            format!(
                "<b>{}</b>: <code>{}</code> ({})",
                escape_html(&a.email),
                escape_html(&a.command),
                describe_quota(a)
            )
        })
        .collect();
    OutboundText::html(format!("Your accounts:\n\n{}", lines.join("\n")))
}

// Requester replies

pub fn searching() -> OutboundText {
    OutboundText::plain("Looking for your code...")
}

/// The code with its send time; `remaining` is the allowance left after this delivery.
pub fn code_found(code: &str, sent_at: DateTime<Utc>, remaining: Option<u32>) -> OutboundText {
    let mut text = format!("Your code: {}\nTime: {}", code, format_timestamp(sent_at));
    if let Some(n) = remaining {
        text.push_str(&format!("\nCodes left: {}", n));
    }
    OutboundText::plain(text)
}

pub fn code_not_found(wait_secs: u64) -> OutboundText {
    OutboundText::plain(format!("No code arrived within {} seconds.", wait_secs))
}

pub fn denied_lifetime() -> OutboundText {
    OutboundText::plain("You have used all codes available for this command.")
}

pub fn denied_until(seconds_remaining: u64) -> OutboundText {
    OutboundText::plain(format!(
        "Code limit reached. Try again in {}.",
        format_wait(seconds_remaining)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::TextFormat;
    use chrono::TimeZone;
    use std::num::NonZeroU32;

    #[test]
    fn wait_rounds_up_to_minutes() {
        assert_eq!(format_wait(0), "1 min");
        assert_eq!(format_wait(59), "1 min");
        assert_eq!(format_wait(61), "2 min");
        assert_eq!(format_wait(3600), "1 h");
        assert_eq!(format_wait(23 * 3600 + 1), "23 h 1 min");
    }

    #[test]
    fn code_reply_uses_local_time_and_remaining() {
        let sent = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let local = sent.with_timezone(&Local).format("%d.%m.%Y %H:%M:%S").to_string();
        let reply = code_found("K7F2Q", sent, Some(2));
        assert_eq!(reply.text, format!("Your code: K7F2Q\nTime: {}\nCodes left: 2", local));
        assert!(!code_found("K7F2Q", sent, None).text.contains("left"));
    }

    #[test]
    fn account_list_escapes_and_describes_quota() {
        let base = Account {
            owner_id: "1".to_string(),
            email: "a<b>@gmail.com".to_string(),
            password: "never shown".to_string(),
            command: "steam".to_string(),
            limit: None,
            period_hours: None,
        };
        let limited = Account {
            limit: NonZeroU32::new(3),
            period_hours: NonZeroU32::new(24),
            command: "other".to_string(),
            ..base.clone()
        };
        let reply = account_list(&[base, limited]);
        assert_eq!(reply.format, TextFormat::Html);
        assert!(reply.text.contains("a&lt;b&gt;@gmail.com"));
        assert!(reply.text.contains("(unlimited)"));
        assert!(reply.text.contains("(3 per 24 h)"));
        assert!(!reply.text.contains("never shown"));
    }

    #[test]
    fn empty_list_is_plain_notice() {
        assert_eq!(account_list(&[]), no_accounts());
    }

    #[test]
    fn unknown_provider_names_domain() {
        let reply = verification_failed(&MailError::UnknownProvider("example.org".to_string()));
        assert!(reply.text.contains("\"example.org\""));
    }
}
