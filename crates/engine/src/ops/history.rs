use sea_orm::{QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    EngineError, LedgerEntry, Money, ResultEngine, Transaction, WalletAudit, audit,
    ledger_entries, retry::retry_transient, transactions,
};

use super::{Engine, with_tx};

impl Engine {
    /// Most recent transactions of the user, newest first.
    pub async fn transactions(&self, user_id: Uuid, limit: u64) -> ResultEngine<Vec<Transaction>> {
        retry_transient(self.read_retry, "transactions", move || async move {
            self.require_wallet(&self.database, user_id).await?;
            transactions::Entity::find()
                .filter(transactions::Column::UserId.eq(user_id.to_string()))
                .order_by_desc(transactions::Column::Id)
                .limit(limit)
                .all(&self.database)
                .await?
                .into_iter()
                .map(Transaction::try_from)
                .collect()
        })
        .await
    }

    /// Most recent ledger entries of the user, newest first.
    pub async fn ledger_entries(&self, user_id: Uuid, limit: u64) -> ResultEngine<Vec<LedgerEntry>> {
        retry_transient(self.read_retry, "ledger_entries", move || async move {
            self.require_wallet(&self.database, user_id).await?;
            ledger_entries::Entity::find()
                .filter(ledger_entries::Column::UserId.eq(user_id.to_string()))
                .order_by_desc(ledger_entries::Column::Id)
                .limit(limit)
                .all(&self.database)
                .await?
                .into_iter()
                .map(LedgerEntry::try_from)
                .collect()
        })
        .await
    }

    pub async fn transaction_by_reference(&self, reference: &str) -> ResultEngine<Transaction> {
        retry_transient(self.read_retry, "transaction_by_reference", move || async move {
            let model = transactions::Entity::find()
                .filter(transactions::Column::Reference.eq(reference))
                .one(&self.database)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound(reference.to_string()))?;
            Transaction::try_from(model)
        })
        .await
    }

    /// Replay the wallet's ledger and compare it to the cached balance.
    ///
    /// Wallet, entries and transactions are read inside one database
    /// transaction so the snapshot is coherent. Nothing is written.
    #[tracing::instrument(skip(self))]
    pub async fn audit_wallet(&self, user_id: Uuid) -> ResultEngine<WalletAudit> {
        let report = retry_transient(self.read_retry, "audit_wallet", move || async move {
            with_tx!(self, |db_tx| {
                let wallet = self.require_wallet(&db_tx, user_id).await?;
                let user_key = user_id.to_string();

                let entries = ledger_entries::Entity::find()
                    .filter(ledger_entries::Column::UserId.eq(user_key.as_str()))
                    .order_by_asc(ledger_entries::Column::Id)
                    .all(&db_tx)
                    .await?
                    .into_iter()
                    .map(LedgerEntry::try_from)
                    .collect::<ResultEngine<Vec<_>>>()?;
                let history = transactions::Entity::find()
                    .filter(transactions::Column::UserId.eq(user_key.as_str()))
                    .order_by_asc(transactions::Column::Id)
                    .all(&db_tx)
                    .await?
                    .into_iter()
                    .map(Transaction::try_from)
                    .collect::<ResultEngine<Vec<_>>>()?;

                Ok::<_, EngineError>(audit::replay(
                    user_id,
                    Money::new(wallet.balance),
                    &entries,
                    &history,
                ))
            })
        })
        .await?;

        if report.is_consistent() {
            tracing::debug!(entries = report.entries, "wallet audit clean");
        } else {
            tracing::warn!(
                violations = report.violations.len(),
                wallet_balance = %report.wallet_balance,
                ledger_balance = %report.ledger_balance,
                "wallet audit found violations"
            );
        }
        Ok(report)
    }
}
