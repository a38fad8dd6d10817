use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tap_types::{Identity, NewProfile, Profile, ProfileId};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::store::normalize_email;
use crate::{AccessPolicy, Credential, CredentialStore, Operation, ProfileStore, StoreError};

pub const DEFAULT_LOCAL_STORE_PATH: &str = "tap_rush_local.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LocalData {
    /// Profiles in sign-up order.
    profiles: Vec<Profile>,
    credentials: HashMap<String, Credential>,
    /// Last account signed in on this device. One slot per file.
    current_user: Option<ProfileId>,
}

impl LocalData {
    fn profile(&self, id: ProfileId) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    fn profile_mut(&mut self, id: ProfileId) -> Result<&mut Profile, StoreError> {
        self.profiles
            .iter_mut()
            .find(|profile| profile.id == id)
            .ok_or(StoreError::NotFound(id))
    }
}

/// Single-device store kept in one JSON file. Every mutation is applied to a
/// copy, written out, and only then becomes visible, so a failed write leaves
/// both the file and memory as they were.
pub struct LocalProfileStore {
    path: PathBuf,
    data: Mutex<LocalData>,
}

impl LocalProfileStore {
    /// Loads `path`, starting empty when the file does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LocalData::default(),
            Err(e) => return Err(e.into()),
        };

        info!("Opened local profile store at {}", path.display());
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, data: &LocalData) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(data)?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        debug!("Local profile store written to {}", self.path.display());
        Ok(())
    }

    async fn commit(
        &self,
        data: &mut MutexGuard<'_, LocalData>,
        next: LocalData,
    ) -> Result<(), StoreError> {
        self.persist(&next).await?;
        **data = next;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for LocalProfileStore {
    async fn create_profile(
        &self,
        actor: &Identity,
        id: ProfileId,
        draft: NewProfile,
    ) -> Result<Profile, StoreError> {
        AccessPolicy::check(Operation::Create, actor, id)?;

        let mut data = self.data.lock().await;
        let email = normalize_email(&draft.email);
        if data.profiles.iter().any(|profile| profile.email == email) {
            return Err(StoreError::DuplicateEmail(email));
        }

        let profile = Profile::new(
            id,
            NewProfile { email, ..draft },
            chrono::Utc::now().to_rfc3339(),
        );
        let mut next = data.clone();
        next.profiles.push(profile.clone());
        self.commit(&mut data, next).await?;
        Ok(profile)
    }

    async fn find_profile(&self, id: ProfileId) -> Result<Option<Profile>, StoreError> {
        Ok(self.data.lock().await.profile(id).cloned())
    }

    async fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>, StoreError> {
        let email = normalize_email(email);
        let data = self.data.lock().await;
        Ok(data
            .profiles
            .iter()
            .find(|profile| profile.email == email)
            .cloned())
    }

    async fn append_score(
        &self,
        actor: &Identity,
        id: ProfileId,
        score: u32,
    ) -> Result<(), StoreError> {
        AccessPolicy::check(Operation::Update, actor, id)?;

        let mut data = self.data.lock().await;
        let mut next = data.clone();
        next.profile_mut(id)?.scores.push(score);
        self.commit(&mut data, next).await
    }

    async fn raise_best_score(
        &self,
        actor: &Identity,
        id: ProfileId,
        score: u32,
    ) -> Result<bool, StoreError> {
        AccessPolicy::check(Operation::Update, actor, id)?;

        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let profile = next.profile_mut(id)?;
        if score <= profile.best_score {
            return Ok(false);
        }
        profile.best_score = score;
        self.commit(&mut data, next).await?;
        Ok(true)
    }

    async fn count_profiles(&self) -> Result<u64, StoreError> {
        Ok(self.data.lock().await.profiles.len() as u64)
    }

    async fn top_profile(&self) -> Result<Option<Profile>, StoreError> {
        let data = self.data.lock().await;
        // Strict comparison keeps the earliest profile on ties.
        let top = data
            .profiles
            .iter()
            .filter(|profile| profile.best_score > 0)
            .fold(None::<&Profile>, |best, profile| match best {
                Some(best) if best.best_score >= profile.best_score => Some(best),
                _ => Some(profile),
            });
        Ok(top.cloned())
    }
}

#[async_trait]
impl CredentialStore for LocalProfileStore {
    async fn insert_credential(&self, credential: Credential) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        let email = normalize_email(&credential.email);
        if data.credentials.contains_key(&email) {
            return Err(StoreError::DuplicateEmail(email));
        }

        let mut next = data.clone();
        next.credentials
            .insert(email.clone(), Credential { email, ..credential });
        self.commit(&mut data, next).await
    }

    async fn find_credential(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        let data = self.data.lock().await;
        Ok(data.credentials.get(&normalize_email(email)).cloned())
    }

    async fn remember_current_user(&self, profile_id: Option<ProfileId>) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        if data.current_user == profile_id {
            return Ok(());
        }
        let mut next = data.clone();
        next.current_user = profile_id;
        self.commit(&mut data, next).await
    }

    async fn forget_current_user(&self, profile_id: ProfileId) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        if data.current_user != Some(profile_id) {
            return Ok(());
        }
        let mut next = data.clone();
        next.current_user = None;
        self.commit(&mut data, next).await
    }

    async fn current_user(&self) -> Result<Option<ProfileId>, StoreError> {
        Ok(self.data.lock().await.current_user)
    }
}
