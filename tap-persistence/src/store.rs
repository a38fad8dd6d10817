use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tap_types::{Identity, NewProfile, Profile, ProfileId};

use crate::StoreError;

/// Profile documents keyed by account identity. Every write names the acting
/// identity and is checked against [`AccessPolicy`](crate::AccessPolicy).
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn create_profile(
        &self,
        actor: &Identity,
        id: ProfileId,
        draft: NewProfile,
    ) -> Result<Profile, StoreError>;

    async fn find_profile(&self, id: ProfileId) -> Result<Option<Profile>, StoreError>;

    async fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>, StoreError>;

    /// Appends to the score history unconditionally.
    async fn append_score(
        &self,
        actor: &Identity,
        id: ProfileId,
        score: u32,
    ) -> Result<(), StoreError>;

    /// Sets the best score to `score` only when it is strictly higher than the
    /// stored value. Returns whether the stored value changed.
    async fn raise_best_score(
        &self,
        actor: &Identity,
        id: ProfileId,
        score: u32,
    ) -> Result<bool, StoreError>;

    async fn count_profiles(&self) -> Result<u64, StoreError>;

    /// Profile with the highest best score, or `None` while every profile is
    /// still at 0. Ties go to the earliest account.
    async fn top_profile(&self) -> Result<Option<Profile>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub profile_id: ProfileId,
    pub email: String,
    /// Argon2 hash in PHC string format, salt included.
    pub password_hash: String,
}

/// Email/password records for the built-in identity provider.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateEmail`] when the email is taken.
    async fn insert_credential(&self, credential: Credential) -> Result<(), StoreError>;

    async fn find_credential(&self, email: &str) -> Result<Option<Credential>, StoreError>;

    /// Persists which account is signed in on this device. Only the local
    /// store keeps a pointer, and it holds a single account: the last one to
    /// sign in. Shared backends ignore it.
    async fn remember_current_user(&self, _profile_id: Option<ProfileId>) -> Result<(), StoreError> {
        Ok(())
    }

    /// Clears the pointer, but only while it still names `profile_id`.
    async fn forget_current_user(&self, _profile_id: ProfileId) -> Result<(), StoreError> {
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<ProfileId>, StoreError> {
        Ok(None)
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
