//! Prepared statements over the raw engine API.
//!
//! The executor needs `sqlite3_column_text` conversion, the exact prepare
//! tail, and finalize-time error reporting, so it talks to the C API
//! directly through this wrapper instead of `rusqlite::Statement`.

use std::ffi::{c_char, c_int, CStr};
use std::marker::PhantomData;
use std::ptr;

use rusqlite::{ffi, Connection};

/// Outcome of a single `sqlite3_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Row,
    Done,
    Failed(c_int),
}

/// A failed prepare: the engine's message and where parsing stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PrepareError {
    pub(crate) message: String,
    pub(crate) tail_offset: usize,
}

/// A prepared statement that is finalized on drop.
///
/// The statement pointer is null when the input held no statement (blank
/// text or only comments); every accessor treats that as an empty,
/// read-only statement.
pub(crate) struct RawStatement<'conn> {
    db: *mut ffi::sqlite3,
    stmt: *mut ffi::sqlite3_stmt,
    _conn: PhantomData<&'conn Connection>,
}

impl<'conn> RawStatement<'conn> {
    /// Prepares the first statement in `sql`.
    ///
    /// Returns the statement and the byte offset where the unparsed tail
    /// starts. The engine reports the tail on failure too.
    pub(crate) fn prepare(
        conn: &'conn Connection,
        sql: &str,
    ) -> Result<(Self, usize), PrepareError> {
        let len = c_int::try_from(sql.len()).map_err(|_| PrepareError {
            message: "statement too long".to_string(),
            tail_offset: 0,
        })?;
        // SAFETY: the handle outlives `'conn`, and the statement never
        // escapes the borrow of `conn`.
        let db = unsafe { conn.handle() };
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();
        // SAFETY: `sql` is valid for `len` bytes; no NUL terminator is
        // required when the length is given.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(db, sql.as_ptr().cast(), len, &mut stmt, &mut tail)
        };
        let tail_offset = if tail.is_null() {
            sql.len()
        } else {
            (tail as usize).saturating_sub(sql.as_ptr() as usize).min(sql.len())
        };
        if rc != ffi::SQLITE_OK {
            if !stmt.is_null() {
                // SAFETY: a statement returned alongside an error is still ours.
                unsafe { ffi::sqlite3_finalize(stmt) };
            }
            return Err(PrepareError {
                message: errmsg(db),
                tail_offset,
            });
        }
        let statement = Self {
            db,
            stmt,
            _conn: PhantomData,
        };
        Ok((statement, tail_offset))
    }

    pub(crate) fn column_count(&self) -> usize {
        // SAFETY: a null statement reports zero columns.
        let n = unsafe { ffi::sqlite3_column_count(self.stmt) };
        usize::try_from(n).unwrap_or(0)
    }

    pub(crate) fn column_name(&self, index: usize) -> Option<&[u8]> {
        let index = c_int::try_from(index).ok()?;
        // SAFETY: the name stays valid until the statement is stepped or
        // finalized, both of which need `&mut self`.
        unsafe {
            let name = ffi::sqlite3_column_name(self.stmt, index);
            if name.is_null() {
                None
            } else {
                Some(CStr::from_ptr(name).to_bytes())
            }
        }
    }

    /// True when the statement cannot modify the database.
    pub(crate) fn readonly(&self) -> bool {
        // SAFETY: a null statement is reported as read-only by the engine.
        unsafe { ffi::sqlite3_stmt_readonly(self.stmt) != 0 }
    }

    pub(crate) fn step(&mut self) -> Step {
        if self.stmt.is_null() {
            return Step::Done;
        }
        // SAFETY: the statement is live until finalize.
        match unsafe { ffi::sqlite3_step(self.stmt) } {
            ffi::SQLITE_ROW => Step::Row,
            ffi::SQLITE_DONE => Step::Done,
            rc => Step::Failed(rc),
        }
    }

    /// The text form of the current row's column, `None` for SQL NULL.
    pub(crate) fn column_text(&self, index: usize) -> Option<&[u8]> {
        let index = c_int::try_from(index).ok()?;
        // SAFETY: `column_bytes` is read after `column_text` so it reports
        // the length of the converted text; the slice lives until the next
        // step, which needs `&mut self`.
        unsafe {
            let text = ffi::sqlite3_column_text(self.stmt, index);
            if text.is_null() {
                return None;
            }
            let len = usize::try_from(ffi::sqlite3_column_bytes(self.stmt, index)).unwrap_or(0);
            Some(std::slice::from_raw_parts(text, len))
        }
    }

    /// Releases the statement, reporting any error from its last step.
    pub(crate) fn finalize(mut self) -> Result<(), String> {
        let stmt = std::mem::replace(&mut self.stmt, ptr::null_mut());
        // SAFETY: `stmt` is finalized exactly once; Drop sees null.
        let rc = unsafe { ffi::sqlite3_finalize(stmt) };
        if rc != ffi::SQLITE_OK {
            return Err(errmsg(self.db));
        }
        Ok(())
    }
}

impl Drop for RawStatement<'_> {
    fn drop(&mut self) {
        if !self.stmt.is_null() {
            // SAFETY: not yet finalized.
            unsafe { ffi::sqlite3_finalize(self.stmt) };
        }
    }
}

fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: sqlite3_errmsg never returns null for a live handle.
    unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)) }
        .to_string_lossy()
        .into_owned()
}
