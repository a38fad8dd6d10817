use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

pub type ProfileId = Uuid;

/// Durable per-account record. `best_score` only ever grows and tracks the
/// maximum of `scores`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Profile {
    pub id: ProfileId,
    pub first_name: String,
    pub email: String,
    pub best_score: u32,
    pub scores: Vec<u32>,
    pub marketing_consent: bool,
    pub created_at: String, // ISO 8601 string
}

impl Profile {
    pub fn new(id: ProfileId, draft: NewProfile, created_at: String) -> Self {
        Self {
            id,
            first_name: draft.first_name,
            email: draft.email,
            best_score: 0,
            scores: Vec::new(),
            marketing_consent: draft.marketing_consent,
            created_at,
        }
    }
}

/// Fields supplied at signup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProfile {
    pub first_name: String,
    pub email: String,
    pub marketing_consent: bool,
}

/// The signed-in account, as yielded by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Identity {
    pub profile_id: ProfileId,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LeaderboardEntry {
    pub profile_id: ProfileId,
    pub first_name: String,
    pub best_score: u32,
}

impl From<&Profile> for LeaderboardEntry {
    fn from(profile: &Profile) -> Self {
        LeaderboardEntry {
            profile_id: profile.id,
            first_name: profile.first_name.clone(),
            best_score: profile.best_score,
        }
    }
}

/// Point-in-time projection over all profiles: the single top scorer and the
/// number of competitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LeaderboardSummary {
    pub top: Option<LeaderboardEntry>,
    pub profile_count: u64,
}

impl LeaderboardSummary {
    pub fn empty() -> Self {
        Self {
            top: None,
            profile_count: 0,
        }
    }
}

/// What the idle screen shows. `Unavailable` renders as "N/A".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum LeaderboardState {
    Loading,
    Ready(LeaderboardSummary),
    Unavailable,
}
