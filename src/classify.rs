use rusqlite::Connection;
use tracing::trace;

use crate::error::{Result, SqlError};
use crate::raw::RawStatement;

const MISSING_TABLE_PREFIX: &str = "no such table: ";

/// Read/write classification of the first statement in some SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification<'a> {
    /// The statement cannot modify persisted state.
    pub readonly: bool,
    /// Input after the first statement, untouched.
    pub tail: &'a str,
}

impl Classification<'_> {
    /// True when something other than whitespace follows the first statement.
    pub fn has_trailing_input(&self) -> bool {
        !self.tail.trim().is_empty()
    }
}

/// Prepares the first statement of `sql` on `conn` without running it and
/// asks the engine whether it is read-only.
///
/// A parse failure returns the engine's message as [`SqlError::Parse`].
pub fn classify<'a>(conn: &Connection, sql: &'a str) -> Result<Classification<'a>> {
    let (readonly, tail) = prepare_first(conn, sql);
    Ok(Classification {
        readonly: readonly?,
        tail,
    })
}

/// Classifies the first statement and returns the remaining input, which
/// the engine reports even when the statement fails to prepare.
fn prepare_first<'a>(conn: &Connection, sql: &'a str) -> (Result<bool>, &'a str) {
    let tail_at = move |offset: usize| sql.get(offset..).unwrap_or("");
    match RawStatement::prepare(conn, sql) {
        Err(err) => (Err(SqlError::Parse(err.message)), tail_at(err.tail_offset)),
        Ok((stmt, tail_offset)) => {
            let readonly = stmt.readonly();
            let finalized = stmt.finalize().map(|()| readonly).map_err(SqlError::Parse);
            let tail = tail_at(tail_offset);
            trace!(readonly, tail_len = tail.len(), "classified statement");
            (finalized, tail)
        }
    }
}

/// Validates client SQL against a private, schema-less connection before it
/// is routed.
///
/// Each client session owns one; it never touches the replicated database.
pub struct Validator {
    conn: Connection,
}

impl Validator {
    pub fn new() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| SqlError::Fatal(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Returns whether `sql` is a single read-only statement.
    ///
    /// Trailing statements are rejected. Missing tables are tolerated since
    /// the validator knows no schema; such statements are read-only only if
    /// they start with `SELECT`.
    pub fn validate(&self, sql: &str) -> Result<bool> {
        let sql = sql.trim();
        let (readonly, tail) = prepare_first(&self.conn, sql);
        if !tail.trim().is_empty() {
            return Err(SqlError::Parse("too much input".to_string()));
        }
        let readonly = match readonly {
            Ok(readonly) => readonly,
            Err(SqlError::Parse(msg)) if msg.starts_with(MISSING_TABLE_PREFIX) => false,
            Err(err) => return Err(err),
        };
        Ok(readonly || leading_keyword(sql).eq_ignore_ascii_case("select"))
    }
}

fn leading_keyword(sql: &str) -> &str {
    sql.split_ascii_whitespace().next().unwrap_or("")
}
