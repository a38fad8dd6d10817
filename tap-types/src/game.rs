use crate::ProfileId;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

/// Pixel dimensions of the area targets are placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlayArea {
    pub width: u32,
    pub height: u32,
}

impl PlayArea {
    /// Largest top-left coordinate that keeps a square footprint of `size`
    /// fully inside the area. Areas smaller than the footprint pin it to 0.
    pub fn max_origin(&self, size: u32) -> (u32, u32) {
        (
            self.width.saturating_sub(size),
            self.height.saturating_sub(size),
        )
    }

    pub fn contains(&self, position: Position, size: u32) -> bool {
        let (max_x, max_y) = self.max_origin(size);
        position.x <= max_x && position.y <= max_y
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum DeviceProfile {
    Desktop,
    Touch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum GamePhase {
    Unauthenticated,
    Idle,
    Playing,
    RoundOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum HideReason {
    Tapped,
    Expired,
    RoundEnded,
}

/// Identity token of one bonus appearance. A fresh token per appearance lets
/// the client restart its animation and lets the server reject stale taps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BonusToken(pub u32);

/// Final score of a completed round, handed to profile sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RoundResult {
    pub profile_id: ProfileId,
    pub score: u32,
}
