/*
 * json_file.rs
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

//! JSON documents on disk: `accounts.json` and `usage.json` in one data directory.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{AccountIndex, AccountStore, StoreError, UsageIndex, UsageStore};

pub const ACCOUNTS_FILE: &str = "accounts.json";
pub const USAGE_FILE: &str = "usage.json";

/// File-backed store. A missing file reads as an empty document; saves replace the file
/// atomically by writing a sibling temp file and renaming it over the target.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T, StoreError> {
        let path = self.dir.join(name);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }
        serde_json::from_slice(&bytes).map_err(|e| StoreError::json(path, e))
    }

    fn write<T: Serialize>(&self, name: &str, doc: &T) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            drop(fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700)));
        }
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!(".{}.tmp", name));
        let json = serde_json::to_vec_pretty(doc).map_err(|e| StoreError::json(&path, e))?;
        let mut f = open_for_write(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        f.write_all(&json)
            .and_then(|_| f.sync_all())
            .map_err(|e| StoreError::io(&tmp, e))?;
        drop(f);
        fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))
    }
}

/// Create or truncate `path`; on Unix with mode 0o600 since the accounts document holds passwords.
fn open_for_write(path: &Path) -> io::Result<fs::File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .mode(0o600)
            .open(path)
    }
    #[cfg(not(unix))]
    {
        fs::File::create(path)
    }
}

impl AccountStore for JsonFileStore {
    fn load_accounts(&self) -> Result<AccountIndex, StoreError> {
        self.read(ACCOUNTS_FILE)
    }

    fn save_accounts(&self, index: &AccountIndex) -> Result<(), StoreError> {
        self.write(ACCOUNTS_FILE, index)
    }
}

impl UsageStore for JsonFileStore {
    fn load_usage(&self) -> Result<UsageIndex, StoreError> {
        self.read(USAGE_FILE)
    }

    fn save_usage(&self, index: &UsageIndex) -> Result<(), StoreError> {
        self.write(USAGE_FILE, index)
    }
}
