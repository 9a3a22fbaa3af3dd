// Copyright (c) 2026, DoNet Edge Contributors.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3.
// You should have received a copy of this license along
// with this source code in a file named "LICENSE."
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

//! Persisted play-token to account-id mapping, kept
//! in a `redb` embedded store rather than a flat on-disk dbm file.

use crate::globals::DoId;
use crate::results::KvResult;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;

const PLAY_TOKENS: TableDefinition<&str, u32> = TableDefinition::new("play_tokens");

pub struct TokenStore {
    db: Database,
}

impl TokenStore {
    /// Opens (creating if absent) the store at `path`. `mode` is a dbm
    /// open-mode character (`"c"` create-if-missing, `"n"`
    /// always-recreate); anything else opens an existing store.
    pub fn open(path: &Path, mode: &str) -> KvResult<Self> {
        let db = match mode {
            "n" => Database::create(path)?,
            "c" if !path.exists() => Database::create(path)?,
            _ => Database::open(path)?,
        };
        // Ensure the table exists even on a freshly created file.
        let txn = db.begin_write()?;
        {
            txn.open_table(PLAY_TOKENS)?;
        }
        txn.commit()?;
        Ok(TokenStore { db })
    }

    /// Looks up the account id a play token was last issued to.
    pub fn lookup(&self, play_token: &str) -> KvResult<Option<DoId>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PLAY_TOKENS)?;
        Ok(table.get(play_token)?.map(|v| v.value()))
    }

    /// Records the account id a play token maps to, overwriting any
    /// prior mapping.
    pub fn store(&self, play_token: &str, account_id: DoId) -> KvResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(PLAY_TOKENS)?;
            table.insert(play_token, account_id)?;
        }
        txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile_stub::temp_db_path;

    mod tempfile_stub {
        use std::path::PathBuf;
        use std::sync::atomic::{AtomicU64, Ordering};

        static COUNTER: AtomicU64 = AtomicU64::new(0);

        /// Returns a unique path under the system temp directory; the
        /// test harness is responsible for its own cleanup on most CI
        /// runners' ephemeral filesystems.
        pub fn temp_db_path() -> PathBuf {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            std::env::temp_dir().join(format!("donet-edge-test-{}-{}.redb", std::process::id(), n))
        }
    }

    #[test]
    fn stores_and_looks_up_a_token() {
        let path = temp_db_path();
        let store = TokenStore::open(&path, "n").unwrap();
        store.store("abc123", 42).unwrap();
        assert_eq!(store.lookup("abc123").unwrap(), Some(42));
        assert_eq!(store.lookup("missing").unwrap(), None);
        let _ = std::fs::remove_file(&path);
    }
}
