use sea_orm_migration::prelude::*;

use crate::m20240101_000001_create_profiles_table::Profiles;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RoundScores::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RoundScores::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RoundScores::ProfileId).uuid().not_null())
                    .col(ColumnDef::new(RoundScores::Score).integer().not_null())
                    .col(
                        ColumnDef::new(RoundScores::RecordedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_round_scores_profile")
                            .from(RoundScores::Table, RoundScores::ProfileId)
                            .to(Profiles::Table, Profiles::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Score history is always read per profile in insertion order
        manager
            .create_index(
                Index::create()
                    .name("idx_round_scores_profile")
                    .table(RoundScores::Table)
                    .col(RoundScores::ProfileId)
                    .col(RoundScores::Id)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RoundScores::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RoundScores {
    Table,
    Id,
    ProfileId,
    Score,
    RecordedAt,
}
