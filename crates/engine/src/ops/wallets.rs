use sea_orm::{ConnectionTrait, QueryFilter, prelude::*};
use uuid::Uuid;

use crate::{EngineError, Money, ResultEngine, Wallet, retry::retry_transient, wallets};

use super::Engine;

impl Engine {
    /// Current cached balance of the user's wallet.
    pub async fn balance(&self, user_id: Uuid) -> ResultEngine<Money> {
        let wallet = self.wallet(user_id).await?;
        Ok(wallet.balance)
    }

    /// Return a wallet snapshot from DB.
    pub async fn wallet(&self, user_id: Uuid) -> ResultEngine<Wallet> {
        retry_transient(self.read_retry, "wallet", move || async move {
            let model = self.require_wallet(&self.database, user_id).await?;
            Wallet::try_from(model)
        })
        .await
    }

    pub(super) async fn find_wallet<C>(
        &self,
        db: &C,
        user_id: Uuid,
    ) -> ResultEngine<Option<wallets::Model>>
    where
        C: ConnectionTrait,
    {
        wallets::Entity::find()
            .filter(wallets::Column::UserId.eq(user_id.to_string()))
            .one(db)
            .await
            .map_err(Into::into)
    }

    pub(super) async fn require_wallet<C>(&self, db: &C, user_id: Uuid) -> ResultEngine<wallets::Model>
    where
        C: ConnectionTrait,
    {
        self.find_wallet(db, user_id)
            .await?
            .ok_or_else(|| EngineError::WalletNotFound(user_id.to_string()))
    }
}
