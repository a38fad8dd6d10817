pub mod bonus;
pub mod config;
pub mod game_events;
pub mod ledger;
pub mod placement;
pub mod round_timer;
pub mod session;
pub mod spawn;
pub mod timer;

// Re-export main components
pub use bonus::*;
pub use config::*;
pub use game_events::*;
pub use ledger::*;
pub use placement::*;
pub use round_timer::*;
pub use session::*;
pub use spawn::*;
pub use timer::*;
