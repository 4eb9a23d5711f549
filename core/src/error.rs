/*
 * error.rs
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

//! Crate-level error type.

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by coordinator operations.
///
/// Mailbox failures never reach this type: the poller folds them into "no code" and the
/// registration dialogue turns them into a reply.
#[derive(Error, Debug)]
pub enum Error {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{field} already registered: {value}")]
    DuplicateRegistration { field: &'static str, value: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("chat transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_names_the_field() {
        let err = Error::DuplicateRegistration {
            field: "command",
            value: "steam".to_string(),
        };
        assert_eq!(err.to_string(), "command already registered: steam");
    }

    #[test]
    fn store_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = StoreError::io("/data/accounts.json", io).into();
        assert!(matches!(err, Error::Store(StoreError::Io { .. })));
        assert!(err.to_string().contains("/data/accounts.json"));
    }
}
