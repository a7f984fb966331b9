use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::buffer::ResultBuffer;
use crate::classify::{self, Classification};
use crate::error::{Result, SqlError};
use crate::raw::{RawStatement, Step};
use crate::wire::{self, LineWriter, ResultSet};

/// Journal mode applied at open.
pub const JOURNAL_MODE: &str = "WAL";
/// Automatic checkpoints are off; the embedder calls [`Database::checkpoint`].
pub const WAL_AUTOCHECKPOINT: i64 = 0;

const ROLLED_BACK: &str = "transaction rolledback";

fn default_checkpoint_on_tick() -> bool {
    true
}

/// SQLite handle configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,
    /// Bytes reserved for the result buffer up front
    #[serde(default)]
    pub initial_buffer_capacity: usize,
    /// Whether periodic ticks fold the WAL back into the database file
    #[serde(default = "default_checkpoint_on_tick")]
    pub checkpoint_on_tick: bool,
}

impl SqliteConfig {
    /// Create a new SQLite config for the given database path
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            initial_buffer_capacity: 0,
            checkpoint_on_tick: default_checkpoint_on_tick(),
        }
    }

    pub fn with_initial_buffer_capacity(mut self, capacity: usize) -> Self {
        self.initial_buffer_capacity = capacity;
        self
    }

    pub fn with_checkpoint_on_tick(mut self, enabled: bool) -> Self {
        self.checkpoint_on_tick = enabled;
        self
    }
}

/// A request body: one statement, or several run as a single transaction.
///
/// On the wire this is a JSON string or a JSON array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Batch {
    Single(String),
    Transaction(Vec<String>),
}

impl Batch {
    pub fn from_json(body: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Outcome of [`Database::exec_batch`].
///
/// A transaction that hit an error reports that statement's message and
/// `"transaction rolledback"` for every statement after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchResponse {
    Single(ResultSet),
    Transaction(Vec<std::result::Result<ResultSet, String>>),
}

/// The single open connection plus the buffer results are encoded into.
///
/// Nothing here is synchronized: callers serialize access, e.g. through
/// [`crate::service::SqlService`].
pub struct Database {
    conn: Connection,
    buffer: ResultBuffer,
    config: SqliteConfig,
}

impl Database {
    /// Opens the database and applies the durability pragmas.
    ///
    /// Every failure here is [`SqlError::Fatal`].
    pub fn open(config: SqliteConfig) -> Result<Self> {
        info!(path = %config.db_path.display(), "opening sqlite database");
        let conn = Connection::open(&config.db_path).map_err(fatal)?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", JOURNAL_MODE, |row| row.get(0))
            .map_err(fatal)?;
        if !mode.eq_ignore_ascii_case(JOURNAL_MODE) {
            warn!(mode = %mode, "database did not switch to WAL journal mode");
        }
        conn.pragma_update_and_check(None, "wal_autocheckpoint", WAL_AUTOCHECKPOINT, |row| {
            row.get::<_, i64>(0)
        })
        .map_err(fatal)?;
        Ok(Self {
            conn,
            buffer: ResultBuffer::with_capacity(config.initial_buffer_capacity),
            config,
        })
    }

    /// Closes the connection. A failure is [`SqlError::Fatal`].
    pub fn close(self) -> Result<()> {
        info!(path = %self.config.db_path.display(), "closing sqlite database");
        self.conn.close().map_err(|(_, err)| fatal(err))
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.db_path
    }

    /// Truncates the WAL into the main database file, best effort.
    pub fn checkpoint(&self) {
        if let Err(err) = self.wal_checkpoint() {
            warn!(error = %err, "checkpoint failed");
        }
    }

    fn wal_checkpoint(&self) -> Result<()> {
        let busy: i64 = self
            .conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| row.get(0))
            .map_err(|e| SqlError::Maintenance(e.to_string()))?;
        if busy != 0 {
            return Err(SqlError::Maintenance("checkpoint blocked by readers".to_string()));
        }
        Ok(())
    }

    /// Classifies the first statement of `sql` against this database.
    pub fn classify<'a>(&self, sql: &'a str) -> Result<Classification<'a>> {
        classify::classify(&self.conn, sql)
    }

    /// Runs `sql` and returns its result in the wire format.
    ///
    /// The returned bytes are overwritten by the next call. Row stepping
    /// stops at the first engine error and that error is reported by
    /// finalize; on any error the buffer must not be read.
    pub fn execute(&mut self, sql: &str) -> Result<&[u8]> {
        self.buffer.reset();
        let (mut stmt, _) =
            RawStatement::prepare(&self.conn, sql).map_err(|e| SqlError::Parse(e.message))?;
        let ncols = stmt.column_count();

        let mut header = LineWriter::new(&mut self.buffer);
        for i in 0..ncols {
            header.field(stmt.column_name(i))?;
        }
        header.finish()?;

        let mut nrows = 0usize;
        loop {
            match stmt.step() {
                Step::Row => {
                    let mut line = LineWriter::new(&mut self.buffer);
                    for i in 0..ncols {
                        line.field(stmt.column_text(i))?;
                    }
                    line.finish()?;
                    nrows += 1;
                }
                Step::Done => break,
                Step::Failed(rc) => {
                    debug!(rc, "step failed");
                    break;
                }
            }
        }
        stmt.finalize().map_err(SqlError::Execution)?;
        debug!(columns = ncols, rows = nrows, bytes = self.buffer.len(), "executed statement");
        Ok(self.buffer.as_bytes())
    }

    /// Runs `sql` and decodes its result.
    pub fn query(&mut self, sql: &str) -> Result<ResultSet> {
        let bytes = self.execute(sql)?;
        wire::decode(bytes).map_err(|e| SqlError::Execution(format!("invalid response: {e}")))
    }

    /// Runs a request body. Transactions roll back at the first failing
    /// statement; a failed COMMIT or a fatal error also rolls back before
    /// the error is returned, so the handle is never left mid-transaction.
    pub fn exec_batch(&mut self, batch: &Batch) -> Result<BatchResponse> {
        let sqls = match batch {
            Batch::Single(sql) => return Ok(BatchResponse::Single(self.query(sql)?)),
            Batch::Transaction(sqls) => sqls,
        };
        self.execute("BEGIN")?;
        let mut results = Vec::with_capacity(sqls.len());
        for sql in sqls {
            match self.query(sql) {
                Ok(rows) => results.push(Ok(rows)),
                Err(err) if err.is_fatal() => return Err(self.abort_transaction(err)),
                Err(err) => {
                    debug!(error = %err, "rolling back transaction");
                    self.execute("ROLLBACK")?;
                    results.push(Err(err.message().to_string()));
                    results.resize(sqls.len(), Err(ROLLED_BACK.to_string()));
                    return Ok(BatchResponse::Transaction(results));
                }
            }
        }
        let committed = self.execute("COMMIT").map(|_| ());
        if let Err(err) = committed {
            return Err(self.abort_transaction(err));
        }
        Ok(BatchResponse::Transaction(results))
    }

    /// Best-effort ROLLBACK after `err`, which is handed back unchanged.
    fn abort_transaction(&mut self, err: SqlError) -> SqlError {
        debug!(error = %err, "aborting transaction");
        let rolled_back = self.execute("ROLLBACK").map(|_| ());
        if let Err(rollback) = rolled_back {
            warn!(error = %rollback, "rollback failed");
        }
        err
    }

    /// Checkpoints and copies the database file into `writer`.
    pub fn snapshot<W: Write>(&mut self, writer: &mut W) -> Result<u64> {
        self.checkpoint();
        let mut file = File::open(&self.config.db_path).map_err(io_error)?;
        io::copy(&mut file, writer).map_err(io_error)
    }

    /// Replaces the database with the bytes from `reader` and reopens it.
    ///
    /// The handle is closed first, so every failure is [`SqlError::Fatal`].
    pub fn restore<R: Read>(self, reader: &mut R) -> Result<Self> {
        let config = self.config.clone();
        self.close()?;
        info!(path = %config.db_path.display(), "restoring sqlite database");
        for suffix in ["-wal", "-shm"] {
            let sidecar = sidecar_path(&config.db_path, suffix);
            if sidecar.exists() {
                fs::remove_file(&sidecar).map_err(fatal)?;
            }
        }
        let mut file = File::create(&config.db_path).map_err(fatal)?;
        io::copy(reader, &mut file).map_err(fatal)?;
        file.sync_all().map_err(fatal)?;
        drop(file);
        Self::open(config)
    }
}

fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn fatal(err: impl std::fmt::Display) -> SqlError {
    SqlError::Fatal(err.to_string())
}

fn io_error(err: io::Error) -> SqlError {
    SqlError::Io(err.to_string())
}
