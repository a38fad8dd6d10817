use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use tap_persistence::{ProfileStore, StoreError};
use tap_types::{LeaderboardEntry, LeaderboardState, LeaderboardSummary};

/// Top scorer and profile count, read straight from the store.
pub async fn load_summary(store: &dyn ProfileStore) -> Result<LeaderboardSummary, StoreError> {
    let profile_count = store.count_profiles().await?;
    let top = store.top_profile().await?;

    Ok(LeaderboardSummary {
        top: top.as_ref().map(LeaderboardEntry::from),
        profile_count,
    })
}

/// Latest leaderboard summary, shared by every connection. Read failures
/// publish `Unavailable` rather than keeping stale numbers.
#[derive(Clone)]
pub struct LeaderboardFeed {
    store: Arc<dyn ProfileStore>,
    state: Arc<watch::Sender<LeaderboardState>>,
}

impl LeaderboardFeed {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        let (state, _) = watch::channel(LeaderboardState::Loading);
        Self {
            store,
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LeaderboardState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> LeaderboardState {
        self.state.borrow().clone()
    }

    pub async fn refresh(&self) -> LeaderboardState {
        let next = match load_summary(self.store.as_ref()).await {
            Ok(summary) => {
                debug!(
                    "Leaderboard refreshed: {} profiles, top {:?}",
                    summary.profile_count,
                    summary.top.as_ref().map(|entry| entry.best_score)
                );
                LeaderboardState::Ready(summary)
            }
            Err(e) => {
                warn!("Leaderboard unavailable: {}", e);
                LeaderboardState::Unavailable
            }
        };

        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
        next
    }
}
