use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub first_name: String,
    #[sea_orm(unique)]
    pub email: String,
    pub best_score: i32,
    pub marketing_consent: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::round_scores::Entity")]
    RoundScores,
}

impl Related<super::round_scores::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RoundScores.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
