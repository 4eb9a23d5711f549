/*
 * provider.rs
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

//! Provider resolver: email domain to IMAP host.

use super::MailError;

/// Implicit-TLS IMAP port used by every provider in the table.
pub const IMAPS_PORT: u16 = 993;

/// Ordered (domain fragment, host) table; the first fragment contained in the domain wins.
const PROVIDERS: &[(&str, &str)] = &[
    ("mail.ru", "imap.mail.ru"),
    ("gmail", "imap.gmail.com"),
    ("yandex", "imap.yandex.ru"),
    ("outlook", "outlook.office365.com"),
    ("hotmail", "outlook.office365.com"),
];

/// IMAP host for `email`. The domain is whatever follows the last '@', compared lowercase.
pub fn resolve(email: &str) -> Result<&'static str, MailError> {
    let domain = email.rsplit('@').next().unwrap_or(email).trim().to_lowercase();
    PROVIDERS
        .iter()
        .find(|(fragment, _)| domain.contains(fragment))
        .map(|(_, host)| *host)
        .ok_or(MailError::UnknownProvider(domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_providers() {
        assert_eq!(resolve("someone@gmail.com"), Ok("imap.gmail.com"));
        assert_eq!(resolve("someone@mail.ru"), Ok("imap.mail.ru"));
        assert_eq!(resolve("someone@yandex.com"), Ok("imap.yandex.ru"));
        assert_eq!(resolve("someone@outlook.com"), Ok("outlook.office365.com"));
        assert_eq!(resolve("someone@hotmail.co.uk"), Ok("outlook.office365.com"));
    }

    #[test]
    fn domain_is_case_insensitive() {
        assert_eq!(resolve("Someone@GMAIL.COM"), Ok("imap.gmail.com"));
    }

    #[test]
    fn domain_after_last_at() {
        assert_eq!(resolve("odd@name@yandex.ru"), Ok("imap.yandex.ru"));
        // local part mentioning a provider does not count
        assert!(resolve("gmail@example.org").is_err());
    }

    #[test]
    fn unknown_provider() {
        assert_eq!(
            resolve("someone@example.org"),
            Err(MailError::UnknownProvider("example.org".to_string()))
        );
        assert!(resolve("no-at-sign").is_err());
    }
}
