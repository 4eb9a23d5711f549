/*
 * extract.rs
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

//! Pull the verification code out of a raw RFC 822 message.
//!
//! The code is located structurally, by a CSS selector over the HTML body, not by scanning
//! free text. A sentinel phrase must also appear in the HTML text before the message is
//! trusted; sender matching alone lets promotional mail through.

use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use scraper::{Html, Selector};

use super::MailError;

/// Which messages count as verification mail and where their code sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailFilter {
    /// Exact sender address searched for (IMAP SEARCH FROM).
    pub sender: String,
    /// Phrase that must occur in the HTML text, compared case-insensitively.
    pub sentinel: String,
    /// CSS selector of the element whose text is the code.
    pub code_selector: String,
}

impl Default for MailFilter {
    fn default() -> Self {
        Self {
            sender: "noreply@steampowered.com".to_string(),
            sentinel: "Steam Guard".to_string(),
            code_selector: "td.title-48.c-blue1.fw-b.a-center".to_string(),
        }
    }
}

impl MailFilter {
    /// Fails if `code_selector` is not a valid CSS selector.
    pub fn selector(&self) -> Result<Selector, MailError> {
        Selector::parse(&self.code_selector)
            .map_err(|e| MailError::Parse(format!("invalid code selector {:?}: {:?}", self.code_selector, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCode {
    pub code: String,
    pub sent_at: DateTime<Utc>,
}

/// Parse `raw` and return its code, `Ok(None)` when the message is not a confirmed
/// verification message or carries no code element.
pub fn extract_code(raw: &[u8], filter: &MailFilter) -> Result<Option<ExtractedCode>, MailError> {
    let selector = filter.selector()?;
    let parsed = mailparse::parse_mail(raw).map_err(|e| MailError::Parse(e.to_string()))?;
    let sent_at = sent_at(&parsed)?;

    let mut html_parts = Vec::new();
    collect_html(&parsed, &mut html_parts);

    let sentinel = normalize(&filter.sentinel);
    let mut confirmed = false;
    let mut code = None;
    for html in &html_parts {
        let document = Html::parse_document(html);
        if !confirmed {
            let text: String = document.root_element().text().collect::<Vec<_>>().join(" ");
            confirmed = normalize(&text).contains(&sentinel);
        }
        if code.is_none() {
            code = document
                .select(&selector)
                .map(|element| element.text().collect::<String>().trim().to_string())
                .find(|text| !text.is_empty());
        }
    }

    if !confirmed {
        log::debug!("[extract] sentinel {:?} absent, ignoring message", filter.sentinel);
        return Ok(None);
    }
    if code.is_none() {
        log::debug!("[extract] no element matches {:?}", filter.code_selector);
    }
    Ok(code.map(|code| ExtractedCode { code, sent_at }))
}

fn sent_at(parsed: &ParsedMail<'_>) -> Result<DateTime<Utc>, MailError> {
    let value = parsed
        .headers
        .get_first_value("Date")
        .ok_or_else(|| MailError::Parse("missing Date header".to_string()))?;
    let timestamp = mailparse::dateparse(&value)
        .map_err(|e| MailError::Parse(format!("bad Date header {:?}: {}", value, e)))?;
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| MailError::Parse(format!("Date header out of range: {:?}", value)))
}

/// Decoded text/html bodies, depth first, attachments skipped.
fn collect_html(part: &ParsedMail<'_>, out: &mut Vec<String>) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_html(sub, out);
        }
        return;
    }
    if matches!(part.get_content_disposition().disposition, DispositionType::Attachment) {
        return;
    }
    if part.ctype.mimetype.eq_ignore_ascii_case("text/html") {
        match part.get_body() {
            Ok(body) => out.push(body),
            Err(e) => log::debug!("[extract] undecodable html part: {}", e),
        }
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEAM_HTML: &str = "<html><body><table>\
        <tr><td class=\"title-48 c-blue1 fw-b a-center\"> F4K9Q </td></tr>\
        <tr><td>Here is the Steam Guard\n code you need to login</td></tr>\
        </table></body></html>";

    fn message(content_type: &str, body: &str) -> Vec<u8> {
        format!(
            "From: Steam <noreply@steampowered.com>\r\n\
             Date: Tue, 14 Oct 2025 09:30:00 +0300\r\n\
             Subject: Your Steam account: Access from new computer\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: {}\r\n\r\n{}",
            content_type, body
        )
        .into_bytes()
    }

    #[test]
    fn code_and_date_from_html_message() {
        let raw = message("text/html; charset=utf-8", STEAM_HTML);
        let found = extract_code(&raw, &MailFilter::default()).unwrap().unwrap();
        assert_eq!(found.code, "F4K9Q");
        assert_eq!(found.sent_at.to_rfc3339(), "2025-10-14T06:30:00+00:00");
    }

    #[test]
    fn code_from_quoted_printable_alternative() {
        let body = "--b1\r\n\
            Content-Type: text/plain\r\n\r\n\
            Your code is F4K9Q\r\n\
            --b1\r\n\
            Content-Type: text/html; charset=utf-8\r\n\
            Content-Transfer-Encoding: quoted-printable\r\n\r\n\
            <p>Steam Guard code</p><table><tr><td class=3D\"title-48 c-blue1 fw-b a-center\">=\r\n\
            F4K9Q</td></tr></table>\r\n\
            --b1--\r\n";
        let raw = message("multipart/alternative; boundary=b1", body);
        let found = extract_code(&raw, &MailFilter::default()).unwrap().unwrap();
        assert_eq!(found.code, "F4K9Q");
    }

    #[test]
    fn missing_sentinel_is_not_a_code() {
        let html = "<table><tr><td class=\"title-48 c-blue1 fw-b a-center\">SALE50</td></tr></table>\
                    <p>Summer sale starts now</p>";
        let raw = message("text/html", html);
        assert_eq!(extract_code(&raw, &MailFilter::default()).unwrap(), None);
    }

    #[test]
    fn plain_text_code_is_ignored() {
        let raw = message("text/plain", "Steam Guard code: F4K9Q");
        assert_eq!(extract_code(&raw, &MailFilter::default()).unwrap(), None);
    }

    #[test]
    fn bad_date_is_a_parse_error() {
        let raw = format!(
            "From: noreply@steampowered.com\r\nDate: yesterday-ish\r\nContent-Type: text/html\r\n\r\n{}",
            STEAM_HTML
        );
        assert!(matches!(
            extract_code(raw.as_bytes(), &MailFilter::default()),
            Err(MailError::Parse(_))
        ));
    }

    #[test]
    fn invalid_selector_is_reported() {
        let filter = MailFilter {
            code_selector: "td[".to_string(),
            ..MailFilter::default()
        };
        assert!(filter.selector().is_err());
    }
}
