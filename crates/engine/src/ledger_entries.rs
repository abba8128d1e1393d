//! Wallet ledger entries: the append-only audit trail.
//!
//! One [`LedgerEntry`] is written per successful transaction, snapshotting
//! the wallet balance right before and right after the movement. Chaining
//! the entries of a wallet in insertion order replays its balance history.
//!
//! Writes go exclusively through [`LedgerRecorder::record`]; there is no
//! update or delete path.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, ConnectionTrait, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, Money, ResultEngine, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub transaction_id: i64,
    pub user_id: Uuid,
    pub previous_balance: Money,
    pub new_balance: Money,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// `new_balance - previous_balance`, or `None` on overflow.
    pub fn delta(&self) -> Option<Money> {
        self.new_balance.checked_sub(self.previous_balance)
    }
}

/// Appends ledger entries. It intentionally has no other method.
#[derive(Clone, Copy, Debug, Default)]
pub struct LedgerRecorder;

impl LedgerRecorder {
    /// Insert exactly one audit row for `transaction_id`.
    ///
    /// Must run on the same connection/transaction that moved the balance so
    /// the entry commits or rolls back with it.
    pub async fn record<C>(
        &self,
        db: &C,
        transaction_id: i64,
        user_id: Uuid,
        previous_balance: Money,
        new_balance: Money,
    ) -> ResultEngine<LedgerEntry>
    where
        C: ConnectionTrait,
    {
        if previous_balance.is_negative() || new_balance.is_negative() {
            return Err(EngineError::InvalidAmount(format!(
                "ledger snapshot must not be negative: {previous_balance} -> {new_balance}"
            )));
        }
        let model = ActiveModel {
            id: ActiveValue::NotSet,
            transaction_id: ActiveValue::Set(transaction_id),
            user_id: ActiveValue::Set(user_id.to_string()),
            previous_balance: ActiveValue::Set(previous_balance.minor()),
            new_balance: ActiveValue::Set(new_balance.minor()),
            created_at: ActiveValue::Set(Utc::now()),
        }
        .insert(db)
        .await?;
        LedgerEntry::try_from(model)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "wallet_ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub transaction_id: i64,
    pub user_id: String,
    pub previous_balance: i64,
    pub new_balance: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transactions::Entity",
        from = "Column::TransactionId",
        to = "super::transactions::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Transactions,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for LedgerEntry {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            transaction_id: model.transaction_id,
            user_id: parse_uuid(&model.user_id, "user")?,
            previous_balance: Money::new(model.previous_balance),
            new_balance: Money::new(model.new_balance),
            created_at: model.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_signed() {
        let entry = LedgerEntry {
            id: 1,
            transaction_id: 1,
            user_id: Uuid::new_v4(),
            previous_balance: Money::major(20_000),
            new_balance: Money::major(18_000),
            created_at: Utc::now(),
        };
        assert_eq!(entry.delta(), Some(Money::major(-2_000)));
    }
}
