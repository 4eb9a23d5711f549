/*
 * account.rs
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

//! Registered accounts and the per-owner index that holds them.

use std::fmt;
use std::num::NonZeroU32;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;
use crate::quota::QuotaPolicy;

/// A mailbox bound to a command by its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Filled from the index key; not repeated inside each stored entry.
    #[serde(skip)]
    pub owner_id: String,
    pub email: String,
    pub password: String,
    /// Stored lowercase.
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<NonZeroU32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_hours: Option<NonZeroU32>,
}

impl Account {
    pub fn policy(&self) -> QuotaPolicy {
        QuotaPolicy {
            limit: self.limit,
            period_hours: self.period_hours,
        }
    }

    /// Case-insensitive match against command or email, as used by deletion.
    pub fn matches_target(&self, target: &str) -> bool {
        same_text(&self.command, target) || same_text(&self.email, target)
    }
}

/// Case-insensitive equality with full Unicode folding; commands and addresses may be Cyrillic.
fn same_text(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Accounts grouped by owner, in registration order. Owners keep the order in which they
/// registered their first account; dispatch relies on it for first-match resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountIndex {
    owners: Vec<(String, Vec<Account>)>,
}

impl AccountIndex {
    pub fn accounts(&self, owner: &str) -> &[Account] {
        self.owners
            .iter()
            .find(|(id, _)| id == owner)
            .map(|(_, accounts)| accounts.as_slice())
            .unwrap_or(&[])
    }

    /// Every account, owners in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.owners.iter().flat_map(|(_, accounts)| accounts.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.owners.iter().all(|(_, accounts)| accounts.is_empty())
    }

    pub fn email_taken(&self, owner: &str, email: &str) -> bool {
        self.accounts(owner).iter().any(|a| same_text(&a.email, email))
    }

    pub fn command_taken(&self, owner: &str, command: &str) -> bool {
        self.accounts(owner).iter().any(|a| same_text(&a.command, command))
    }

    /// Append `account` to its owner's list, enforcing per-owner uniqueness of email and command.
    pub fn add(&mut self, account: Account) -> Result<(), Error> {
        if self.email_taken(&account.owner_id, &account.email) {
            return Err(Error::DuplicateRegistration {
                field: "email",
                value: account.email,
            });
        }
        if self.command_taken(&account.owner_id, &account.command) {
            return Err(Error::DuplicateRegistration {
                field: "command",
                value: account.command,
            });
        }
        match self.owners.iter_mut().find(|(id, _)| *id == account.owner_id) {
            Some((_, accounts)) => accounts.push(account),
            None => self.owners.push((account.owner_id.clone(), vec![account])),
        }
        Ok(())
    }

    /// Remove the owner's first account whose command or email equals `target` (ignoring case).
    pub fn remove(&mut self, owner: &str, target: &str) -> Option<Account> {
        let target = target.trim();
        let slot = self.owners.iter().position(|(id, _)| id == owner)?;
        let accounts = &mut self.owners[slot].1;
        let pos = accounts.iter().position(|a| a.matches_target(target))?;
        let removed = accounts.remove(pos);
        if accounts.is_empty() {
            self.owners.remove(slot);
        }
        Some(removed)
    }
}

impl Serialize for AccountIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.owners.len()))?;
        for (owner, accounts) in &self.owners {
            map.serialize_entry(owner, accounts)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AccountIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(IndexVisitor)
    }
}

struct IndexVisitor;

impl<'de> Visitor<'de> for IndexVisitor {
    type Value = AccountIndex;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of owner id to account list")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<AccountIndex, A::Error> {
        let mut owners = Vec::new();
        while let Some((owner, mut accounts)) = access.next_entry::<String, Vec<Account>>()? {
            for account in &mut accounts {
                account.owner_id = owner.clone();
            }
            owners.push((owner, accounts));
        }
        Ok(AccountIndex { owners })
    }
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
    fn duplicate_email_rejected_per_owner_only() {
        let mut index = AccountIndex::default();
        index.add(account("1", "me@gmail.com", "a")).unwrap();
        let err = index.add(account("1", "ME@Gmail.com", "b")).unwrap_err();
        assert!(matches!(err, Error::DuplicateRegistration { field: "email", .. }));
        index.add(account("2", "me@gmail.com", "a")).unwrap();
        assert_eq!(index.iter().count(), 2);
    }

    #[test]
    fn duplicate_command_rejected_per_owner_only() {
        let mut index = AccountIndex::default();
        index.add(account("1", "a@gmail.com", "steam")).unwrap();
        let err = index.add(account("1", "b@gmail.com", "STEAM")).unwrap_err();
        assert!(matches!(err, Error::DuplicateRegistration { field: "command", .. }));
        index.add(account("2", "b@gmail.com", "steam")).unwrap();
    }

    #[test]
    fn remove_by_command_or_email_leaves_others() {
        let mut index = AccountIndex::default();
        index.add(account("1", "a@gmail.com", "one")).unwrap();
        index.add(account("1", "b@gmail.com", "two")).unwrap();
        index.add(account("1", "c@gmail.com", "three")).unwrap();

        assert_eq!(index.remove("1", "TWO").unwrap().email, "b@gmail.com");
        assert_eq!(index.remove("1", "C@gmail.com").unwrap().command, "three");
        let left: Vec<_> = index.accounts("1").iter().map(|a| a.command.as_str()).collect();
        assert_eq!(left, vec!["one"]);
    }

    #[test]
    fn cyrillic_command_and_email_fold_case() {
        let mut index = AccountIndex::default();
        index.add(account("1", "иван@mail.ru", "код")).unwrap();
        index.add(account("1", "other@mail.ru", "ещё")).unwrap();

        let err = index.add(account("1", "ИВАН@mail.ru", "новый")).unwrap_err();
        assert!(matches!(err, Error::DuplicateRegistration { field: "email", .. }));
        let err = index.add(account("1", "new@mail.ru", "КОД")).unwrap_err();
        assert!(matches!(err, Error::DuplicateRegistration { field: "command", .. }));

        let removed = index.remove("1", "КОД").expect("account not removed");
        assert_eq!(removed.email, "иван@mail.ru");
        assert_eq!(index.remove("1", "OTHER@MAIL.RU").map(|a| a.command), Some("ещё".to_string()));
        assert!(index.is_empty());
    }

    #[test]
    fn remove_missing_target_changes_nothing() {
        let mut index = AccountIndex::default();
        index.add(account("1", "a@gmail.com", "one")).unwrap();
        let before = index.clone();
        assert!(index.remove("1", "nope").is_none());
        assert!(index.remove("2", "one").is_none());
        assert_eq!(index, before);
    }

    #[test]
    fn json_keeps_owner_order_and_fills_owner_id() {
        let json = r#"{
            "900": [{"email": "z@gmail.com", "password": "p", "command": "z"}],
            "100": [{"email": "a@gmail.com", "password": "p", "command": "a", "limit": 3, "period_hours": 24}]
        }"#;
        let index: AccountIndex = serde_json::from_str(json).unwrap();
        let owners: Vec<_> = index.iter().map(|a| a.owner_id.as_str()).collect();
        assert_eq!(owners, vec!["900", "100"]);
        let limited = &index.accounts("100")[0];
        assert_eq!(limited.limit, NonZeroU32::new(3));
        assert_eq!(limited.period_hours, NonZeroU32::new(24));

        let round: AccountIndex = serde_json::from_str(&serde_json::to_string(&index).unwrap()).unwrap();
        assert_eq!(round, index);
    }

    #[test]
    fn zero_limit_in_document_is_rejected() {
        let json = r#"{"1": [{"email": "a@gmail.com", "password": "p", "command": "a", "limit": 0}]}"#;
        assert!(serde_json::from_str::<AccountIndex>(json).is_err());
    }
}
