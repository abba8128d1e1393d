use sea_orm::DatabaseConnection;

use crate::{LedgerRecorder, ReferenceGenerator, ResultEngine, RetryPolicy};

mod history;
mod ledger;
mod users;
mod wallets;

pub use ledger::Receipt;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
///
/// Rollback happens when the `DatabaseTransaction` is dropped without commit.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// The wallet ledger engine.
///
/// Holds no wallet state in memory: every operation reads and writes through
/// the database, which is the only synchronization point between concurrent
/// callers.
#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    references: ReferenceGenerator,
    recorder: LedgerRecorder,
    write_retry: RetryPolicy,
    read_retry: RetryPolicy,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    references: Option<ReferenceGenerator>,
    write_retry: Option<RetryPolicy>,
    read_retry: Option<RetryPolicy>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Override the reference generator (suffix source, length, attempts).
    pub fn references(mut self, references: ReferenceGenerator) -> EngineBuilder {
        self.references = Some(references);
        self
    }

    /// Retry bound for credit/debit and registration.
    pub fn write_retry(mut self, policy: RetryPolicy) -> EngineBuilder {
        self.write_retry = Some(policy);
        self
    }

    /// Retry bound for read-only lookups.
    pub fn read_retry(mut self, policy: RetryPolicy) -> EngineBuilder {
        self.read_retry = Some(policy);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            references: self.references.unwrap_or_default(),
            recorder: LedgerRecorder,
            write_retry: self.write_retry.unwrap_or_else(RetryPolicy::writes),
            read_retry: self.read_retry.unwrap_or_else(RetryPolicy::reads),
        })
    }
}
