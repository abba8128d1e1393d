use std::process::ExitCode;

use config::ConfigError;
use engine::{EngineError, Outcome};
use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("cannot encode output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("wallet audit found {0} violation(s)")]
    Inconsistent(usize),
}

impl CliError {
    /// Process exit status: 1 for infrastructure failures, 2 for refused
    /// requests, 3 for insufficient funds, 4 for a failed audit.
    pub fn exit_status(&self) -> u8 {
        match self {
            CliError::Engine(err) => match err.outcome() {
                Outcome::InsufficientFunds => 3,
                Outcome::Rejected => 2,
                Outcome::Failure => 1,
            },
            CliError::Inconsistent(_) => 4,
            CliError::Config(_) | CliError::Database(_) | CliError::Json(_) => 1,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

#[cfg(test)]
mod tests {
    use engine::Money;

    use super::*;

    #[test]
    fn exit_codes_follow_engine_outcomes() {
        let short = CliError::from(EngineError::InsufficientFunds {
            balance: Money::ZERO,
            requested: Money::major(1),
        });
        assert_eq!(short.exit_status(), 3);

        let missing = CliError::from(EngineError::WalletNotFound("u".to_string()));
        assert_eq!(missing.exit_status(), 2);

        assert_eq!(CliError::Inconsistent(1).exit_status(), 4);
    }
}
