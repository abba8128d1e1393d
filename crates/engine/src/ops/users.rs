use chrono::Utc;
use sea_orm::{DatabaseTransaction, DbErr, QueryFilter, SqlErr, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    EngineError, NewUser, ResultEngine, User, Wallet, retry::retry_transient, users, wallets,
};

use super::{Engine, with_tx};

impl Engine {
    /// Create a user and provision their wallet in one database transaction.
    ///
    /// A user is never visible without a wallet. A duplicate e-mail fails
    /// with [`EngineError::ExistingKey`].
    #[tracing::instrument(skip(self, new_user), fields(email = %new_user.email))]
    pub async fn register_user(&self, new_user: NewUser) -> ResultEngine<(User, Wallet)> {
        let normalized = new_user.normalized()?;
        let new_user = &normalized;
        let (user, wallet) = retry_transient(self.write_retry, "register_user", move || async move {
            with_tx!(self, |db_tx| {
                self.insert_user(&db_tx, new_user).await
            })
        })
        .await?;
        tracing::info!(user_id = %user.id, wallet_id = %wallet.id, "user registered");
        Ok((user, wallet))
    }

    /// Provision the wallet of an existing user.
    ///
    /// Every user owns exactly one wallet; a second call fails with
    /// [`EngineError::ExistingKey`].
    #[tracing::instrument(skip(self))]
    pub async fn open_wallet(&self, user_id: Uuid) -> ResultEngine<Wallet> {
        retry_transient(self.write_retry, "open_wallet", move || async move {
            with_tx!(self, |db_tx| {
                let exists = users::Entity::find_by_id(user_id.to_string())
                    .one(&db_tx)
                    .await?
                    .is_some();
                if !exists {
                    return Err(EngineError::UserNotFound(user_id.to_string()));
                }
                self.provision_wallet(&db_tx, user_id).await
            })
        })
        .await
    }

    async fn insert_user(
        &self,
        db_tx: &DatabaseTransaction,
        new_user: &NewUser,
    ) -> ResultEngine<(User, Wallet)> {
        let taken = users::Entity::find()
            .filter(users::Column::Email.eq(new_user.email.as_str()))
            .one(db_tx)
            .await?
            .is_some();
        if taken {
            return Err(EngineError::ExistingKey(new_user.email.clone()));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email.clone(),
            first_name: new_user.first_name.clone(),
            last_name: new_user.last_name.clone(),
            created_at: Utc::now(),
        };
        users::ActiveModel::from(&user)
            .insert(db_tx)
            .await
            .map_err(|err| unique_violation_as_existing(err, &user.email))?;

        let wallet = self.provision_wallet(db_tx, user.id).await?;
        Ok((user, wallet))
    }

    /// Insert the single wallet of `user_id`, starting at a zero balance.
    async fn provision_wallet(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: Uuid,
    ) -> ResultEngine<Wallet> {
        let key = format!("wallet for user {user_id}");
        if self.find_wallet(db_tx, user_id).await?.is_some() {
            return Err(EngineError::ExistingKey(key));
        }
        let wallet = Wallet::open(user_id);
        wallets::ActiveModel::from(&wallet)
            .insert(db_tx)
            .await
            .map_err(|err| unique_violation_as_existing(err, &key))?;
        Ok(wallet)
    }
}

/// A concurrent insert can still win the race past the existence check; the
/// UNIQUE constraint then decides.
fn unique_violation_as_existing(err: DbErr, key: &str) -> EngineError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => EngineError::ExistingKey(key.to_string()),
        _ => EngineError::Database(err),
    }
}
