//! The module contains the errors the engine can return.
//!
//! Callers that only need to tell success from a user-facing refusal from an
//! infrastructure failure can collapse any error with [`EngineError::outcome`].
use sea_orm::{ConnAcquireErr, DbErr, RuntimeErr};
use thiserror::Error;

use crate::Money;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Money, requested: Money },
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Could not generate a unique reference after {attempts} attempts")]
    ReferenceGenerationFailed { attempts: u32 },
    #[error("Persistence failure after {attempts} attempts: {message}")]
    PersistenceFailure { attempts: u32, message: String },
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// Closed set of outcomes exposed to upstream layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The debit exceeded the balance. Nothing was persisted.
    InsufficientFunds,
    /// The request itself was refused (unknown wallet, bad amount, duplicate).
    Rejected,
    /// The store failed; the operation may be retried later.
    Failure,
}

impl EngineError {
    /// Whether a fresh attempt of the whole unit of work may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ReferenceGenerationFailed { .. } => true,
            Self::Database(err) => is_transient_db_error(err),
            _ => false,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            Self::InsufficientFunds { .. } => Outcome::InsufficientFunds,
            Self::WalletNotFound(_)
            | Self::UserNotFound(_)
            | Self::KeyNotFound(_)
            | Self::ExistingKey(_)
            | Self::InvalidAmount(_)
            | Self::InvalidInput(_) => Outcome::Rejected,
            Self::ReferenceGenerationFailed { .. }
            | Self::PersistenceFailure { .. }
            | Self::Database(_) => Outcome::Failure,
        }
    }
}

// SQLite primary codes 5 (BUSY) and 6 (LOCKED) with their extended forms,
// plus the SQLSTATEs for serialization failure, deadlock and lock timeout.
const SQLITE_TRANSIENT_PRIMARY: [i64; 2] = [5, 6];
const SQLSTATE_TRANSIENT: [&str; 3] = ["40001", "40P01", "55P03"];

fn database_code(err: &DbErr) -> Option<String> {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(sea_orm::sqlx::Error::Database(db_err)))
        | DbErr::Query(RuntimeErr::SqlxError(sea_orm::sqlx::Error::Database(db_err))) => {
            db_err.code().map(|code| code.into_owned())
        }
        _ => None,
    }
}

pub(crate) fn is_transient_db_error(err: &DbErr) -> bool {
    if matches!(err, DbErr::ConnectionAcquire(ConnAcquireErr::Timeout)) {
        return true;
    }
    let Some(code) = database_code(err) else {
        return false;
    };
    if SQLSTATE_TRANSIENT.contains(&code.as_str()) {
        return true;
    }
    // Extended SQLite result codes keep the primary code in the low byte.
    code.parse::<i64>()
        .map(|extended| SQLITE_TRANSIENT_PRIMARY.contains(&(extended & 0xff)))
        .unwrap_or(false)
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::InsufficientFunds {
                    balance: a,
                    requested: b,
                },
                Self::InsufficientFunds {
                    balance: c,
                    requested: d,
                },
            ) => a == c && b == d,
            (Self::WalletNotFound(a), Self::WalletNotFound(b)) => a == b,
            (Self::UserNotFound(a), Self::UserNotFound(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidInput(a), Self::InvalidInput(b)) => a == b,
            (
                Self::ReferenceGenerationFailed { attempts: a },
                Self::ReferenceGenerationFailed { attempts: b },
            ) => a == b,
            (
                Self::PersistenceFailure {
                    attempts: a,
                    message: m,
                },
                Self::PersistenceFailure {
                    attempts: b,
                    message: n,
                },
            ) => a == b && m == n,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
