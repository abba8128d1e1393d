//! Single-currency wallet ledger.
//!
//! Every user owns one wallet. Credits and debits run as one atomic unit
//! that locks the wallet, writes a transaction record and an append-only
//! ledger entry, and updates the cached balance. The database is the only
//! place state lives.

pub use audit::{AuditViolation, WalletAudit};
pub use error::{EngineError, Outcome};
pub use ledger_entries::{LedgerEntry, LedgerRecorder};
pub use money::Money;
pub use ops::{Engine, EngineBuilder, Receipt};
pub use reference::{AlphanumericSuffix, ReferenceGenerator, ReferenceOutcome, SuffixSource};
pub use retry::{RetryPolicy, retry_transient};
pub use transactions::{Transaction, TransactionKind, TransactionStatus};
pub use users::{NewUser, User};
pub use wallets::Wallet;

mod audit;
mod error;
mod ledger_entries;
mod money;
mod ops;
mod reference;
mod retry;
mod transactions;
mod users;
mod util;
mod wallets;

type ResultEngine<T> = Result<T, EngineError>;
