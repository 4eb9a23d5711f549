/*
 * client.rs
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

//! Async IMAP client: greeting, LOGIN, SELECT, UID SEARCH, UID FETCH, LOGOUT.
//! One command in flight at a time; each call reads until its tagged completion.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::net::TlsStream;

/// What went wrong, as far as the caller needs to act on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImapErrorKind {
    /// Socket or TLS failure, including the server closing the connection.
    Io,
    /// Server answered a command with NO or BAD.
    Rejected,
    /// Server said something we could not make sense of.
    Protocol,
}

/// IMAP client error (network, protocol, auth).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ImapClientError {
    pub kind: ImapErrorKind,
    pub message: String,
}

impl ImapClientError {
    pub fn new(kind: ImapErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    fn rejected(line: &ImapLine) -> Self {
        Self::new(ImapErrorKind::Rejected, line.raw.clone())
    }

    fn protocol(msg: impl Into<String>) -> Self {
        Self::new(ImapErrorKind::Protocol, msg)
    }
}

impl From<io::Error> for ImapClientError {
    fn from(e: io::Error) -> Self {
        Self::new(ImapErrorKind::Io, e.to_string())
    }
}

/// One line of IMAP response (untagged * or tagged A001).
#[derive(Debug, Clone)]
pub struct ImapLine {
    pub raw: String,
    pub tag: Option<String>,
    pub untagged: bool,
    pub status: Option<ImapStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImapStatus {
    Ok,
    No,
    Bad,
}

fn parse_status(rest: &str) -> Option<ImapStatus> {
    let word = rest.split_whitespace().next()?;
    if word.eq_ignore_ascii_case("OK") {
        Some(ImapStatus::Ok)
    } else if word.eq_ignore_ascii_case("NO") {
        Some(ImapStatus::No)
    } else if word.eq_ignore_ascii_case("BAD") {
        Some(ImapStatus::Bad)
    } else {
        None
    }
}

/// Parse "* OK ..." or "A001 OK ..." from a line. Literals are handled by the reader.
fn parse_line(s: &str) -> ImapLine {
    let untagged = s.starts_with('*');
    let (tag, status) = if untagged {
        (None, parse_status(s.trim_start_matches('*').trim_start()))
    } else {
        let mut sp = s.splitn(2, ' ');
        let t = sp.next().unwrap_or("").to_string();
        let rest = sp.next().unwrap_or("");
        (Some(t), parse_status(rest))
    };
    ImapLine {
        raw: s.to_string(),
        tag: tag.filter(|t| !t.is_empty() && t != "+"),
        untagged,
        status,
    }
}

/// Literal size announced at the end of a line ("... {1234}"), if any.
fn literal_size(line: &str) -> Option<usize> {
    let open = line.rfind('{')?;
    let rest = line[open + 1..].strip_suffix('}')?;
    rest.trim().parse().ok()
}

/// Read one line; if it announces a literal {N}, read the N bytes as well.
async fn read_imap_line<S>(stream: &mut S, buf: &mut Vec<u8>) -> io::Result<(String, Option<Vec<u8>>)>
where
    S: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = stream.read_until(b'\n', buf).await?;
    if n == 0 || !buf.ends_with(b"\n") {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"));
    }
    let line = String::from_utf8_lossy(buf).trim().to_string();
    match literal_size(&line) {
        Some(size) => {
            let mut literal = vec![0u8; size];
            stream.read_exact(&mut literal).await?;
            Ok((line, Some(literal)))
        }
        None => Ok((line, None)),
    }
}

/// Write a line (no CRLF) then CRLF.
async fn write_line<S>(stream: &mut S, line: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(line).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await?;
    Ok(())
}

/// Untagged line plus optional literal (e.g. FETCH body).
pub struct ImapLineWithLiteral(pub ImapLine, pub Option<Vec<u8>>);

fn quote_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Parse "* SEARCH 3 7 12" into UIDs, in server order. "* SEARCH" alone means no match.
fn parse_search_line(line: &str) -> Option<Vec<u32>> {
    let rest = line.strip_prefix("* ")?.trim_start();
    let (word, rest) = rest.split_at(rest.find(' ').unwrap_or(rest.len()));
    if !word.eq_ignore_ascii_case("SEARCH") {
        return None;
    }
    Some(rest.split_whitespace().filter_map(|n| n.parse().ok()).collect())
}

/// IMAP session over any byte stream. `connect` gives the production TLS flavour; tests drive
/// it over an in-memory duplex.
pub struct ImapSession<S> {
    stream: BufReader<S>,
    read_buf: Vec<u8>,
    tag_counter: u32,
}

impl ImapSession<TlsStream> {
    /// Connect with implicit TLS and consume the server greeting.
    pub async fn connect(host: &str, port: u16) -> Result<Self, ImapClientError> {
        let stream = TlsStream::connect(host, port).await?;
        Self::start(stream).await
    }
}

impl<S> ImapSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an established stream and read the greeting (* OK ...).
    pub async fn start(stream: S) -> Result<Self, ImapClientError> {
        let mut session = Self {
            stream: BufReader::new(stream),
            read_buf: Vec::with_capacity(4096),
            tag_counter: 0,
        };
        let (line, _literal) = read_imap_line(&mut session.stream, &mut session.read_buf).await?;
        if !line.starts_with("* OK") && !line.starts_with("* PREAUTH") {
            return Err(ImapClientError::protocol(format!(
                "expected * OK greeting, got: {}",
                line
            )));
        }
        Ok(session)
    }

    /// Generate next tag (A0001, A0002, ...).
    fn next_tag(&mut self) -> String {
        self.tag_counter = self.tag_counter % 9999 + 1;
        format!("A{:04}", self.tag_counter)
    }

    /// Send command with tag, read until tagged response. Returns (untagged lines with optional literals, final tagged line).
    async fn send_command(
        &mut self,
        command: &str,
    ) -> Result<(Vec<ImapLineWithLiteral>, ImapLine), ImapClientError> {
        let tag = self.next_tag();
        let full = format!("{} {}", tag, command);
        write_line(&mut self.stream, full.as_bytes()).await?;

        let mut untagged = Vec::new();
        loop {
            let (line_str, literal) = read_imap_line(&mut self.stream, &mut self.read_buf).await?;
            let line = parse_line(&line_str);
            if !line.untagged && line.tag.as_deref() == Some(tag.as_str()) {
                return Ok((untagged, line));
            }
            untagged.push(ImapLineWithLiteral(line, literal));
        }
    }

    /// Send a command and fail unless the tagged response is OK.
    async fn command_ok(&mut self, command: &str) -> Result<Vec<ImapLineWithLiteral>, ImapClientError> {
        let (untagged, final_line) = self.send_command(command).await?;
        match final_line.status {
            Some(ImapStatus::Ok) => Ok(untagged),
            _ => Err(ImapClientError::rejected(&final_line)),
        }
    }

    /// LOGIN (user, password). A NO here means the credentials were refused.
    pub async fn login(&mut self, user: &str, pass: &str) -> Result<(), ImapClientError> {
        let cmd = format!("LOGIN {} {}", quote_string(user), quote_string(pass));
        self.command_ok(&cmd).await.map(|_| ())
    }

    /// SELECT mailbox. Later UID commands act on it.
    pub async fn select(&mut self, mailbox: &str) -> Result<(), ImapClientError> {
        let cmd = format!("SELECT {}", quote_string(mailbox));
        self.command_ok(&cmd).await.map(|_| ())
    }

    /// UID SEARCH FROM "sender". UIDs come back in the order the server lists them.
    pub async fn uid_search_from(&mut self, sender: &str) -> Result<Vec<u32>, ImapClientError> {
        let cmd = format!("UID SEARCH FROM {}", quote_string(sender));
        let untagged = self.command_ok(&cmd).await?;
        let mut uids = Vec::new();
        for lwl in untagged {
            if let Some(mut found) = parse_search_line(&lwl.0.raw) {
                uids.append(&mut found);
            }
        }
        Ok(uids)
    }

    /// FETCH one message by UID (full BODY[]). Use after SELECT.
    pub async fn fetch_body_by_uid(&mut self, uid: u32) -> Result<Vec<u8>, ImapClientError> {
        let cmd = format!("UID FETCH {} (BODY[])", uid);
        let untagged = self.command_ok(&cmd).await?;
        untagged
            .into_iter()
            .filter(|lwl| lwl.0.raw.contains(" FETCH ("))
            .find_map(|lwl| lwl.1)
            .ok_or_else(|| ImapClientError::protocol("UID FETCH BODY[] returned no literal"))
    }

    /// LOGOUT. The server closes the connection after its tagged OK.
    pub async fn logout(&mut self) -> Result<(), ImapClientError> {
        self.command_ok("LOGOUT").await.map(|_| ())
    }
}
