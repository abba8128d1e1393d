//! The module contains the `Wallet` struct and its entity.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, Money, ResultEngine, util::parse_uuid};

/// A user's wallet.
///
/// Each user owns exactly one wallet. Its `balance` is a cache of the ledger:
/// it always equals the `new_balance` of the newest ledger entry, or zero when
/// the wallet has never moved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// A fresh, empty wallet for `user_id`.
    pub fn open(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance: Money::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "wallets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub user_id: String,
    pub balance: i64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Users,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Wallet> for ActiveModel {
    fn from(value: &Wallet) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            user_id: ActiveValue::Set(value.user_id.to_string()),
            balance: ActiveValue::Set(value.balance.minor()),
            created_at: ActiveValue::Set(value.created_at),
            updated_at: ActiveValue::Set(value.updated_at),
        }
    }
}

impl TryFrom<Model> for Wallet {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: parse_uuid(&model.id, "wallet")?,
            user_id: parse_uuid(&model.user_id, "user")?,
            balance: Money::new(model.balance),
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_starts_empty() {
        let user_id = Uuid::new_v4();
        let wallet = Wallet::open(user_id);
        assert_eq!(wallet.user_id, user_id);
        assert_eq!(wallet.balance, Money::ZERO);
        assert_eq!(wallet.created_at, wallet.updated_at);
    }

    #[test]
    fn model_round_trip_keeps_balance() {
        let mut wallet = Wallet::open(Uuid::new_v4());
        wallet.balance = Money::major(18_000);
        let active: ActiveModel = (&wallet).into();
        let model = Model {
            id: active.id.unwrap(),
            user_id: active.user_id.unwrap(),
            balance: active.balance.unwrap(),
            created_at: active.created_at.unwrap(),
            updated_at: active.updated_at.unwrap(),
        };
        assert_eq!(Wallet::try_from(model).unwrap(), wallet);
    }

    #[test]
    fn corrupt_id_is_reported() {
        let model = Model {
            id: "not-a-uuid".to_string(),
            user_id: Uuid::new_v4().to_string(),
            balance: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(
            Wallet::try_from(model).unwrap_err(),
            EngineError::InvalidInput("invalid wallet id".to_string())
        );
    }
}
