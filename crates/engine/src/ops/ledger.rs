use chrono::Utc;
use sea_orm::{
    ActiveValue, ConnectionTrait, DatabaseTransaction, DbBackend, QueryFilter, QuerySelect,
    TransactionTrait,
    prelude::*,
    sea_query::{Expr, SimpleExpr},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, Money, ReferenceOutcome, ResultEngine, TransactionKind,
    retry::retry_transient,
    transactions::{self, NewTransaction},
    util::ensure_positive_amount,
    wallets,
};

use super::{Engine, with_tx};

/// What a successful credit or debit committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub reference: String,
    pub transaction_id: i64,
    pub ledger_entry_id: i64,
    pub kind: TransactionKind,
    pub amount: Money,
    pub previous_balance: Money,
    pub new_balance: Money,
}

impl Engine {
    /// Add `amount` to the user's wallet.
    ///
    /// One atomic unit: lock the wallet, create a `SUCCESSFUL` CREDIT
    /// transaction, append its ledger entry, write the new balance. Transient
    /// contention is retried according to the write retry policy.
    #[tracing::instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn credit(&self, user_id: Uuid, amount: Money) -> ResultEngine<Receipt> {
        self.move_funds(user_id, amount, TransactionKind::Credit)
            .await
    }

    /// Take `amount` from the user's wallet.
    ///
    /// The sufficiency check runs under the same lock as the mutation. When
    /// the balance is short the call fails with
    /// [`EngineError::InsufficientFunds`] and nothing is persisted.
    #[tracing::instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn debit(&self, user_id: Uuid, amount: Money) -> ResultEngine<Receipt> {
        self.move_funds(user_id, amount, TransactionKind::Debit)
            .await
    }

    async fn move_funds(
        &self,
        user_id: Uuid,
        amount: Money,
        kind: TransactionKind,
    ) -> ResultEngine<Receipt> {
        ensure_positive_amount(amount)?;
        let receipt = retry_transient(self.write_retry, kind.as_str(), || {
            self.apply_movement(user_id, amount, kind)
        })
        .await?;
        tracing::info!(
            reference = %receipt.reference,
            previous_balance = %receipt.previous_balance,
            new_balance = %receipt.new_balance,
            "{} committed",
            kind.as_str()
        );
        Ok(receipt)
    }

    async fn apply_movement(
        &self,
        user_id: Uuid,
        amount: Money,
        kind: TransactionKind,
    ) -> ResultEngine<Receipt> {
        with_tx!(self, |db_tx| {
            self.apply_movement_in_tx(&db_tx, user_id, amount, kind)
                .await
        })
    }

    async fn apply_movement_in_tx(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: Uuid,
        amount: Money,
        kind: TransactionKind,
    ) -> ResultEngine<Receipt> {
        let wallet = self.lock_wallet(db_tx, user_id).await?;
        let previous_balance = Money::new(wallet.balance);

        if kind == TransactionKind::Debit && previous_balance < amount {
            tracing::debug!(%previous_balance, requested = %amount, "insufficient funds");
            return Err(EngineError::InsufficientFunds {
                balance: previous_balance,
                requested: amount,
            });
        }
        let new_balance = kind.apply(previous_balance, amount).ok_or_else(|| {
            EngineError::InvalidAmount(format!(
                "balance overflow applying {amount} to {previous_balance}"
            ))
        })?;

        let reference = match self
            .references
            .generate(db_tx, kind.reference_namespace())
            .await?
        {
            ReferenceOutcome::Unique(reference) => reference,
            ReferenceOutcome::ExhaustedRetries { attempts } => {
                return Err(EngineError::ReferenceGenerationFailed { attempts });
            }
        };

        let new_tx = NewTransaction::successful(reference, user_id, amount, kind)?;
        let tx_model = transactions::ActiveModel::from(&new_tx)
            .insert(db_tx)
            .await?;

        let entry = self
            .recorder
            .record(db_tx, tx_model.id, user_id, previous_balance, new_balance)
            .await?;

        wallets::ActiveModel {
            id: ActiveValue::Set(wallet.id),
            balance: ActiveValue::Set(new_balance.minor()),
            updated_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        }
        .update(db_tx)
        .await?;

        Ok(Receipt {
            reference: tx_model.reference,
            transaction_id: tx_model.id,
            ledger_entry_id: entry.id,
            kind,
            amount,
            previous_balance,
            new_balance,
        })
    }

    /// Take the exclusive lock on the user's wallet row and return it.
    ///
    /// `SELECT ... FOR UPDATE` where the backend has row locks. SQLite has
    /// none, so a no-op `UPDATE` of the row first takes the database write
    /// lock, which holds until this transaction ends.
    pub(super) async fn lock_wallet(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: Uuid,
    ) -> ResultEngine<wallets::Model> {
        let user_key = user_id.to_string();

        if db_tx.get_database_backend() == DbBackend::Sqlite {
            let touched = wallets::Entity::update_many()
                .col_expr(
                    wallets::Column::Balance,
                    SimpleExpr::from(Expr::col(wallets::Column::Balance)),
                )
                .filter(wallets::Column::UserId.eq(user_key.as_str()))
                .exec(db_tx)
                .await?;
            if touched.rows_affected == 0 {
                return Err(EngineError::WalletNotFound(user_key));
            }
        }

        wallets::Entity::find()
            .filter(wallets::Column::UserId.eq(user_key.as_str()))
            .lock_exclusive()
            .one(db_tx)
            .await?
            .ok_or(EngineError::WalletNotFound(user_key))
    }
}
