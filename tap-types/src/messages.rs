use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{
    BonusToken, ConnectionError, DeviceProfile, GamePhase, HideReason, Identity,
    LeaderboardState, Position, Profile,
};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ClientMessage {
    Authenticate { token: String },
    SignOut,
    StartRound { device: Option<DeviceProfile> },
    TapTarget,
    TapBonus { token: BonusToken },
    ReturnToIdle,
    Heartbeat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ServerMessage {
    AuthStateChanged { identity: Option<Identity>, profile: Option<Profile> },
    AuthenticationFailed { error: ConnectionError },
    ProfileMissing { message: String },
    PhaseChanged { phase: GamePhase },
    RoundStarted { time_remaining: u32 },
    Tick { time_remaining: u32 },
    TargetShown { position: Position, size: u32 },
    TargetHidden { reason: HideReason },
    BonusShown { token: BonusToken, position: Position, size: u32 },
    BonusHidden { token: BonusToken, reason: HideReason },
    ScoreUpdate { score: u32 },
    RoundOver { final_score: u32 },
    ScoreSaved { score: u32, best_score: u32 },
    LeaderboardUpdate { state: LeaderboardState },
    Notification { message: String },
    Error { message: String },
}
