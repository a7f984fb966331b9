use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::lock::Mutex;
use tracing::info;

use crate::error::SqlError;
use crate::sqlite::{Batch, BatchResponse, Database, SqliteConfig};

/// Commands a replicated state machine applies to the database.
///
/// `exec` is only called with committed log entries; `query` may run on
/// any node and must not modify state.
#[async_trait]
pub trait StateMachine: Send + Sync {
    async fn query(&self, body: &str) -> Result<BatchResponse>;
    async fn exec(&self, body: &str) -> Result<BatchResponse>;
    async fn tick(&self);
    async fn snapshot(&self) -> Result<Vec<u8>>;
    async fn restore(&self, image: &[u8]) -> Result<()>;
}

/// Serializes every call onto one [`Database`].
///
/// The handle is `None` only after a failed restore or `close`; every later
/// call fails.
pub struct SqlService {
    db: Mutex<Option<Database>>,
}

impl SqlService {
    pub fn new(db: Database) -> Self {
        Self {
            db: Mutex::new(Some(db)),
        }
    }

    pub fn open(config: SqliteConfig) -> Result<Self> {
        let db = Database::open(config).context("failed to open sqlite database")?;
        Ok(Self::new(db))
    }

    pub async fn close(&self) -> Result<()> {
        let mut guard = self.db.lock().await;
        match guard.take() {
            Some(db) => Ok(db.close()?),
            None => Err(closed()),
        }
    }

    async fn run(&self, body: &str, readonly: bool) -> Result<BatchResponse> {
        let batch = Batch::from_json(body).context("invalid request body")?;
        let mut guard = self.db.lock().await;
        let db = guard.as_mut().ok_or_else(closed)?;
        if readonly {
            let sqls = match &batch {
                Batch::Single(sql) => std::slice::from_ref(sql),
                Batch::Transaction(sqls) => sqls.as_slice(),
            };
            for sql in sqls {
                if !db.classify(sql)?.readonly {
                    bail!("write statement on read path: {}", sql);
                }
            }
        }
        Ok(db.exec_batch(&batch)?)
    }
}

#[async_trait]
impl StateMachine for SqlService {
    async fn query(&self, body: &str) -> Result<BatchResponse> {
        self.run(body, true).await
    }

    async fn exec(&self, body: &str) -> Result<BatchResponse> {
        self.run(body, false).await
    }

    async fn tick(&self) {
        let guard = self.db.lock().await;
        if let Some(db) = guard.as_ref() {
            if db.config().checkpoint_on_tick {
                db.checkpoint();
            }
        }
    }

    async fn snapshot(&self) -> Result<Vec<u8>> {
        let mut guard = self.db.lock().await;
        let db = guard.as_mut().ok_or_else(closed)?;
        let mut image = Vec::new();
        let n = db.snapshot(&mut image)?;
        info!(bytes = n, "took database snapshot");
        Ok(image)
    }

    async fn restore(&self, image: &[u8]) -> Result<()> {
        let mut guard = self.db.lock().await;
        let db = guard.take().ok_or_else(closed)?;
        let mut reader = image;
        *guard = Some(db.restore(&mut reader)?);
        Ok(())
    }
}

/// True when `err` came from a failure that leaves the handle unusable.
pub fn is_fatal(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SqlError>()
        .map_or(false, SqlError::is_fatal)
}

fn closed() -> anyhow::Error {
    anyhow!("database is closed")
}
