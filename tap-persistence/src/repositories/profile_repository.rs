use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use uuid::Uuid;

use crate::entities::{prelude::*, profiles, round_scores};
use crate::store::normalize_email;
use crate::{AccessPolicy, Operation, ProfileStore, StoreError};
use tap_types::{Identity, NewProfile, Profile, ProfileId};

pub struct ProfileRepository {
    db: DatabaseConnection,
}

fn to_column(score: u32) -> Result<i32, StoreError> {
    i32::try_from(score).map_err(|_| StoreError::ScoreOutOfRange(i64::from(score)))
}

fn from_column(score: i32) -> Result<u32, StoreError> {
    u32::try_from(score).map_err(|_| StoreError::ScoreOutOfRange(i64::from(score)))
}

impl ProfileRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn model_to_profile(
        model: profiles::Model,
        scores: Vec<round_scores::Model>,
    ) -> Result<Profile, StoreError> {
        Ok(Profile {
            id: model.id,
            first_name: model.first_name,
            email: model.email,
            best_score: from_column(model.best_score)?,
            scores: scores
                .into_iter()
                .map(|s| from_column(s.score))
                .collect::<Result<_, _>>()?,
            marketing_consent: model.marketing_consent,
            created_at: model.created_at.to_rfc3339(),
        })
    }

    async fn hydrate(&self, model: profiles::Model) -> Result<Profile, StoreError> {
        let scores = RoundScores::find()
            .filter(round_scores::Column::ProfileId.eq(model.id))
            .order_by_asc(round_scores::Column::Id)
            .all(&self.db)
            .await?;

        Self::model_to_profile(model, scores)
    }

    async fn ensure_exists(&self, id: Uuid) -> Result<(), StoreError> {
        match Profiles::find_by_id(id).one(&self.db).await? {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(id)),
        }
    }
}

#[async_trait]
impl ProfileStore for ProfileRepository {
    async fn create_profile(
        &self,
        actor: &Identity,
        id: ProfileId,
        draft: NewProfile,
    ) -> Result<Profile, StoreError> {
        AccessPolicy::check(Operation::Create, actor, id)?;

        let email = normalize_email(&draft.email);
        let now = chrono::Utc::now().into();
        let profile_model = profiles::ActiveModel {
            id: ActiveValue::Set(id),
            first_name: ActiveValue::Set(draft.first_name),
            email: ActiveValue::Set(email.clone()),
            best_score: ActiveValue::Set(0),
            marketing_consent: ActiveValue::Set(draft.marketing_consent),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        };

        Profiles::insert(profile_model)
            .exec(&self.db)
            .await
            .map_err(|e| StoreError::from_insert(e, &email))?;

        let created = Profiles::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        tracing::info!("Created profile {}", id);
        Self::model_to_profile(created, Vec::new())
    }

    async fn find_profile(&self, id: ProfileId) -> Result<Option<Profile>, StoreError> {
        match Profiles::find_by_id(id).one(&self.db).await? {
            Some(model) => Ok(Some(self.hydrate(model).await?)),
            None => Ok(None),
        }
    }

    async fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>, StoreError> {
        let profile_model = Profiles::find()
            .filter(profiles::Column::Email.eq(normalize_email(email)))
            .one(&self.db)
            .await?;

        match profile_model {
            Some(model) => Ok(Some(self.hydrate(model).await?)),
            None => Ok(None),
        }
    }

    async fn append_score(
        &self,
        actor: &Identity,
        id: ProfileId,
        score: u32,
    ) -> Result<(), StoreError> {
        AccessPolicy::check(Operation::Update, actor, id)?;
        let score_column = to_column(score)?;
        self.ensure_exists(id).await?;

        let entry = round_scores::ActiveModel {
            id: ActiveValue::NotSet,
            profile_id: ActiveValue::Set(id),
            score: ActiveValue::Set(score_column),
            recorded_at: ActiveValue::Set(chrono::Utc::now().into()),
        };
        RoundScores::insert(entry).exec(&self.db).await?;

        tracing::debug!("Appended score {} to profile {}", score, id);
        Ok(())
    }

    async fn raise_best_score(
        &self,
        actor: &Identity,
        id: ProfileId,
        score: u32,
    ) -> Result<bool, StoreError> {
        AccessPolicy::check(Operation::Update, actor, id)?;
        let score_column = to_column(score)?;

        let now: sea_orm::prelude::DateTimeWithTimeZone = chrono::Utc::now().into();
        let result = Profiles::update_many()
            .col_expr(profiles::Column::BestScore, Expr::value(score_column))
            .col_expr(profiles::Column::UpdatedAt, Expr::value(now))
            .filter(profiles::Column::Id.eq(id))
            .filter(profiles::Column::BestScore.lt(score_column))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            self.ensure_exists(id).await?;
            return Ok(false);
        }

        tracing::info!("Profile {} has a new best score: {}", id, score);
        Ok(true)
    }

    async fn count_profiles(&self) -> Result<u64, StoreError> {
        Ok(Profiles::find().count(&self.db).await?)
    }

    async fn top_profile(&self) -> Result<Option<Profile>, StoreError> {
        let top = Profiles::find()
            .filter(profiles::Column::BestScore.gt(0))
            .order_by_desc(profiles::Column::BestScore)
            .order_by_asc(profiles::Column::CreatedAt)
            .one(&self.db)
            .await?;

        match top {
            Some(model) => Ok(Some(self.hydrate(model).await?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::connect_to_memory_database;
    use migration::{Migrator, MigratorTrait};

    async fn setup_test_db() -> ProfileRepository {
        let db = connect_to_memory_database().await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        ProfileRepository::new(db)
    }

    fn identity(id: ProfileId, email: &str) -> Identity {
        Identity {
            profile_id: id,
            email: email.to_string(),
        }
    }

    async fn create(repo: &ProfileRepository, name: &str) -> Identity {
        let id = Uuid::new_v4();
        let email = format!("{}@example.com", name.to_lowercase());
        let actor = identity(id, &email);
        repo.create_profile(
            &actor,
            id,
            NewProfile {
                first_name: name.to_string(),
                email,
                marketing_consent: false,
            },
        )
        .await
        .unwrap();
        actor
    }

    #[tokio::test]
    async fn test_create_and_find_profile() {
        let repo = setup_test_db().await;
        let actor = create(&repo, "Alice").await;

        let found = repo.find_profile(actor.profile_id).await.unwrap().unwrap();
        assert_eq!(found.first_name, "Alice");
        assert_eq!(found.best_score, 0);
        assert!(found.scores.is_empty());

        let by_email = repo
            .find_profile_by_email("ALICE@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, actor.profile_id);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let repo = setup_test_db().await;
        create(&repo, "Alice").await;

        let id = Uuid::new_v4();
        let result = repo
            .create_profile(
                &identity(id, "alice@example.com"),
                id,
                NewProfile {
                    first_name: "Impostor".to_string(),
                    email: "alice@example.com".to_string(),
                    marketing_consent: true,
                },
            )
            .await;

        // Caught by the unique index on email, so racing sign-ups conflict too.
        assert!(matches!(result, Err(StoreError::DuplicateEmail(_))));
        assert_eq!(repo.count_profiles().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_score_beyond_column_range_is_rejected() {
        let repo = setup_test_db().await;
        let actor = create(&repo, "Alice").await;
        let too_big = i32::MAX as u32 + 1;

        let append = repo.append_score(&actor, actor.profile_id, too_big).await;
        assert!(matches!(append, Err(StoreError::ScoreOutOfRange(_))));
        let raise = repo.raise_best_score(&actor, actor.profile_id, too_big).await;
        assert!(matches!(raise, Err(StoreError::ScoreOutOfRange(_))));

        let profile = repo.find_profile(actor.profile_id).await.unwrap().unwrap();
        assert!(profile.scores.is_empty());
        assert_eq!(profile.best_score, 0);
    }

    #[test]
    fn test_negative_column_value_is_an_error() {
        assert!(matches!(from_column(-3), Err(StoreError::ScoreOutOfRange(-3))));
        assert_eq!(from_column(42).unwrap(), 42);
    }

    #[tokio::test]
    async fn test_create_for_someone_else_is_denied() {
        let repo = setup_test_db().await;
        let actor = identity(Uuid::new_v4(), "bob@example.com");

        let result = repo
            .create_profile(
                &actor,
                Uuid::new_v4(),
                NewProfile {
                    first_name: "Bob".to_string(),
                    email: "bob@example.com".to_string(),
                    marketing_consent: false,
                },
            )
            .await;

        assert!(result.unwrap_err().is_permission_denied());
        assert_eq!(repo.count_profiles().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_history_keeps_insertion_order() {
        let repo = setup_test_db().await;
        let actor = create(&repo, "Alice").await;

        for score in [3, 12, 7, 12, 0] {
            repo.append_score(&actor, actor.profile_id, score).await.unwrap();
        }

        let profile = repo.find_profile(actor.profile_id).await.unwrap().unwrap();
        assert_eq!(profile.scores, vec![3, 12, 7, 12, 0]);
    }

    #[tokio::test]
    async fn test_raise_best_score_only_when_higher() {
        let repo = setup_test_db().await;
        let actor = create(&repo, "Alice").await;
        let id = actor.profile_id;

        assert!(repo.raise_best_score(&actor, id, 10).await.unwrap());
        assert!(!repo.raise_best_score(&actor, id, 7).await.unwrap());
        assert!(!repo.raise_best_score(&actor, id, 10).await.unwrap());
        assert_eq!(repo.find_profile(id).await.unwrap().unwrap().best_score, 10);

        assert!(repo.raise_best_score(&actor, id, 15).await.unwrap());
        assert_eq!(repo.find_profile(id).await.unwrap().unwrap().best_score, 15);
    }

    #[tokio::test]
    async fn test_updates_by_other_players_are_denied() {
        let repo = setup_test_db().await;
        let alice = create(&repo, "Alice").await;
        let bob = create(&repo, "Bob").await;

        let append = repo.append_score(&bob, alice.profile_id, 99).await;
        assert!(append.unwrap_err().is_permission_denied());
        let raise = repo.raise_best_score(&bob, alice.profile_id, 99).await;
        assert!(raise.unwrap_err().is_permission_denied());

        let profile = repo.find_profile(alice.profile_id).await.unwrap().unwrap();
        assert!(profile.scores.is_empty());
        assert_eq!(profile.best_score, 0);
    }

    #[tokio::test]
    async fn test_writes_to_missing_profile_fail() {
        let repo = setup_test_db().await;
        let ghost = identity(Uuid::new_v4(), "ghost@example.com");

        let result = repo.append_score(&ghost, ghost.profile_id, 1).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        let result = repo.raise_best_score(&ghost, ghost.profile_id, 1).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_top_profile_and_count() {
        let repo = setup_test_db().await;
        assert!(repo.top_profile().await.unwrap().is_none());

        let alice = create(&repo, "Alice").await;
        let bob = create(&repo, "Bob").await;
        create(&repo, "Carol").await;
        assert_eq!(repo.count_profiles().await.unwrap(), 3);
        assert!(repo.top_profile().await.unwrap().is_none());

        repo.raise_best_score(&alice, alice.profile_id, 12).await.unwrap();
        repo.raise_best_score(&bob, bob.profile_id, 20).await.unwrap();

        let top = repo.top_profile().await.unwrap().unwrap();
        assert_eq!(top.first_name, "Bob");
        assert_eq!(top.best_score, 20);
    }
}
