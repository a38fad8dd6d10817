use async_trait::async_trait;
use sea_orm::{ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::entities::{accounts, prelude::*};
use crate::store::normalize_email;
use crate::{Credential, CredentialStore, StoreError};

pub struct AccountRepository {
    db: DatabaseConnection,
}

impl AccountRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn model_to_credential(model: accounts::Model) -> Credential {
        Credential {
            profile_id: model.profile_id,
            email: model.email,
            password_hash: model.password_hash,
        }
    }
}

#[async_trait]
impl CredentialStore for AccountRepository {
    async fn insert_credential(&self, credential: Credential) -> Result<(), StoreError> {
        let email = normalize_email(&credential.email);
        let account = accounts::ActiveModel {
            profile_id: ActiveValue::Set(credential.profile_id),
            email: ActiveValue::Set(email.clone()),
            password_hash: ActiveValue::Set(credential.password_hash),
            created_at: ActiveValue::Set(chrono::Utc::now().into()),
        };
        Accounts::insert(account)
            .exec(&self.db)
            .await
            .map_err(|e| StoreError::from_insert(e, &email))?;
        Ok(())
    }

    async fn find_credential(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        let account = Accounts::find()
            .filter(accounts::Column::Email.eq(normalize_email(email)))
            .one(&self.db)
            .await?;

        Ok(account.map(Self::model_to_credential))
    }
}
