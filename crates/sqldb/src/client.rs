use super::{functions, CodecKind, Error, Keyring};
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Where the database lives. In-memory databases use a named
/// shared-cache URI so that every connection of the Client observes the
/// same contents.
#[derive(Debug, Clone)]
pub enum Location {
    OnDisk(PathBuf),
    InMemory(String),
}

impl Location {
    fn is_memory(&self) -> bool {
        matches!(self, Location::InMemory(_))
    }
}

/// Client owns one embedded SQLite database: a single writer connection
/// serializing all write transactions, and (for on-disk databases) a
/// pool of read-only connections running concurrently under WAL.
///
/// Blob encoding and optional per-row encryption are configured here
/// and applied transparently by `encode_row` / `decode_row`.
pub struct Client {
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
    location: Location,
    codec: CodecKind,
    keyring: Option<Arc<dyn Keyring>>,
}

impl Client {
    pub fn open(
        location: Location,
        codec: CodecKind,
        keyring: Option<Arc<dyn Keyring>>,
    ) -> Result<Self, Error> {
        let conn = connect(&location, false)?;

        if !location.is_memory() {
            // Prefer write-ahead log over rollback journal: readers are
            // not blocked by the writer, and there is less amplification.
            // rusqlite is a bit finicky about this pragma and we must use query_row.
            conn.query_row("PRAGMA journal_mode=WAL", [], |_row| Ok(()))?;
        }
        tracing::debug!(?location, ?codec, "opened database");

        Ok(Self {
            writer: Mutex::new(conn),
            readers: Mutex::new(Vec::new()),
            location,
            codec,
            keyring,
        })
    }

    pub fn codec(&self) -> CodecKind {
        self.codec
    }

    /// Run `f` with the locked writer connection. `f` manages its own
    /// transaction scope; use this when work must happen under the
    /// writer lock but outside a transaction (e.g. post-commit event
    /// publication in commit order).
    pub fn with_write<T, E>(&self, f: impl FnOnce(&mut Connection) -> Result<T, E>) -> Result<T, E> {
        let mut conn = self.writer.lock().unwrap();
        f(&mut conn)
    }

    /// Run `f` inside a write transaction: BEGIN IMMEDIATE, `f`, then
    /// COMMIT on Ok. On Err (or panic) the transaction rolls back and
    /// the error surfaces unchanged.
    pub fn with_write_txn<T, E>(
        &self,
        f: impl FnOnce(&Transaction) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        self.with_write(|conn| {
            let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let out = f(&txn)?;
            txn.commit()?;
            Ok(out)
        })
    }

    /// Run `f` with a read connection. On-disk databases borrow from a
    /// pool of read-only connections which run concurrently with the
    /// writer; in-memory databases share the writer connection, as
    /// SQLite's shared-cache mode serializes cross-connection access
    /// anyway.
    pub fn with_read<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        if self.location.is_memory() {
            let conn = self.writer.lock().unwrap();
            return f(&conn);
        }

        let conn = match self.readers.lock().unwrap().pop() {
            Some(conn) => conn,
            None => connect(&self.location, true).map_err(E::from)?,
        };
        let out = f(&conn);
        self.readers.lock().unwrap().push(conn);
        out
    }

    /// Encode a document into its stored row form: the blob plus the
    /// nonce and DEK id which are non-empty only under encryption.
    pub fn encode_row(&self, doc: &Value) -> Result<(Vec<u8>, Vec<u8>, String), Error> {
        let blob = self.codec.encode(doc)?;
        match &self.keyring {
            None => Ok((blob, Vec::new(), String::new())),
            Some(keyring) => {
                let (dek_id, key) = keyring.current();
                let (sealed, nonce) = super::crypto::seal(&key, &blob)?;
                Ok((sealed, nonce, dek_id))
            }
        }
    }

    /// Decode a stored row back into its document, decrypting when the
    /// row carries a nonce and DEK id.
    pub fn decode_row(&self, blob: &[u8], nonce: &[u8], dek_id: &str) -> Result<Value, Error> {
        if dek_id.is_empty() && nonce.is_empty() {
            return self.codec.decode(blob);
        }
        let Some(key) = self.keyring.as_ref().and_then(|k| k.get(dek_id)) else {
            return Err(Error::UnknownKey {
                dek_id: dek_id.to_string(),
            });
        };
        let plain = super::crypto::open(&key, nonce, blob, dek_id)?;
        self.codec.decode(&plain)
    }

    /// Encode `doc` and write its `(key, object, objectnonce, dekid)`
    /// row through the prepared upsert `sql`.
    pub fn upsert_object(
        &self,
        txn: &Transaction,
        sql: &str,
        key: &str,
        doc: &Value,
    ) -> Result<(), Error> {
        let (blob, nonce, dek_id) = self.encode_row(doc)?;
        let mut stmt = txn.prepare_cached(sql)?;
        stmt.execute(rusqlite::params![key, blob, nonce, dek_id])?;
        Ok(())
    }

    /// Decode documents from rows shaped `(object, objectnonce, dekid, ...)`.
    pub fn read_objects(&self, rows: &mut rusqlite::Rows) -> Result<Vec<Value>, Error> {
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let blob: Vec<u8> = row.get(0)?;
            let nonce: Vec<u8> = row.get(1)?;
            let dek_id: String = row.get(2)?;
            out.push(self.decode_row(&blob, &nonce, &dek_id)?);
        }
        Ok(out)
    }
}

/// Read a single integer from a one-row, one-column result.
pub fn read_int(rows: &mut rusqlite::Rows) -> Result<i64, Error> {
    match rows.next()? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

/// Read a single-TEXT-column result.
pub fn read_strings(rows: &mut rusqlite::Rows) -> Result<Vec<String>, Error> {
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(row.get(0)?);
    }
    Ok(out)
}

/// Read a two-TEXT-column result.
pub fn read_string_pairs(rows: &mut rusqlite::Rows) -> Result<Vec<(String, String)>, Error> {
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push((row.get(0)?, row.get(1)?));
    }
    Ok(out)
}

fn connect(location: &Location, read_only: bool) -> Result<Connection, rusqlite::Error> {
    let flags = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
    } else {
        OpenFlags::default()
    };

    let conn = match location {
        Location::OnDisk(path) => Connection::open_with_flags(path, flags)?,
        Location::InMemory(name) => {
            Connection::open_with_flags(format!("file:{name}?mode=memory&cache=shared"), flags)?
        }
    };

    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.set_prepared_statement_cache_capacity(128);
    functions::install_functions(&conn)?;

    Ok(conn)
}
