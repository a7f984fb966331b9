use crate::classify::Validator;
use crate::error::{Result, SqlError};
use crate::sqlite::Batch;

/// Where a client command should go next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Safe to run on any node.
    Read(Batch),
    /// Must be applied through the leader.
    Write(Batch),
    /// Held until the open transaction ends.
    Queued,
    /// The open transaction was rolled back client-side.
    Discarded,
}

/// Per-client state: a validator and the statements of an open transaction.
pub struct Session {
    validator: Validator,
    in_transaction: bool,
    queued: Vec<String>,
    readonly: bool,
}

impl Session {
    pub fn new() -> Result<Self> {
        Ok(Self {
            validator: Validator::new()?,
            in_transaction: false,
            queued: Vec::new(),
            readonly: true,
        })
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Validates one statement and routes it, or queues it inside a
    /// transaction.
    pub fn submit(&mut self, sql: &str) -> Result<Routed> {
        let readonly = self.validator.validate(sql)?;
        if self.in_transaction {
            self.queued.push(sql.to_string());
            self.readonly &= readonly;
            return Ok(Routed::Queued);
        }
        let batch = Batch::Single(sql.to_string());
        Ok(if readonly {
            Routed::Read(batch)
        } else {
            Routed::Write(batch)
        })
    }

    pub fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(SqlError::Execution(
                "nested transactions are not supported".to_string(),
            ));
        }
        self.in_transaction = true;
        Ok(())
    }

    /// Ends the open transaction. On commit the queued statements become a
    /// transactional batch, routed as a read only if all of them were reads.
    pub fn end(&mut self, commit: bool) -> Result<Routed> {
        if !self.in_transaction {
            return Err(SqlError::Execution("transaction not started".to_string()));
        }
        let queued = std::mem::take(&mut self.queued);
        let readonly = self.readonly;
        self.reset();
        if !commit {
            return Ok(Routed::Discarded);
        }
        let batch = Batch::Transaction(queued);
        Ok(if readonly {
            Routed::Read(batch)
        } else {
            Routed::Write(batch)
        })
    }

    fn reset(&mut self) {
        self.in_transaction = false;
        self.queued.clear();
        self.readonly = true;
    }
}
