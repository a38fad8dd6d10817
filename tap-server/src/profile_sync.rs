use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use tap_persistence::{ProfileStore, StoreError};
use tap_types::{Identity, LeaderboardSummary, RoundResult};

use crate::leaderboard::{LeaderboardFeed, load_summary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based), doubling each time.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Saved {
        score: u32,
        best_score: u32,
        new_best: bool,
    },
    /// The signed-in account has no profile document.
    ProfileMissing,
    Failed {
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Profile sync worker is not running")]
    WorkerStopped,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Resolves once the background write for one round has finished.
#[derive(Debug)]
pub struct SyncTicket(oneshot::Receiver<SyncOutcome>);

impl SyncTicket {
    pub async fn outcome(self) -> SyncOutcome {
        self.0.await.unwrap_or_else(|_| SyncOutcome::Failed {
            reason: SyncError::WorkerStopped.to_string(),
        })
    }
}

struct SyncJob {
    identity: Identity,
    result: RoundResult,
    reply: oneshot::Sender<SyncOutcome>,
}

/// Records finished rounds against the signed-in profile on a background
/// queue, so the round itself never waits on storage.
#[derive(Clone)]
pub struct ProfileSync {
    jobs: mpsc::UnboundedSender<SyncJob>,
    store: Arc<dyn ProfileStore>,
    leaderboard: LeaderboardFeed,
}

impl ProfileSync {
    pub fn spawn(
        store: Arc<dyn ProfileStore>,
        leaderboard: LeaderboardFeed,
        policy: RetryPolicy,
    ) -> Self {
        let (jobs, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(
            receiver,
            store.clone(),
            leaderboard.clone(),
            policy,
        ));

        Self {
            jobs,
            store,
            leaderboard,
        }
    }

    pub fn leaderboard(&self) -> &LeaderboardFeed {
        &self.leaderboard
    }

    pub fn record_round_result(
        &self,
        identity: &Identity,
        result: RoundResult,
    ) -> Result<SyncTicket, SyncError> {
        let (reply, ticket) = oneshot::channel();
        self.jobs
            .send(SyncJob {
                identity: identity.clone(),
                result,
                reply,
            })
            .map_err(|_| SyncError::WorkerStopped)?;
        Ok(SyncTicket(ticket))
    }

    pub async fn fetch_leaderboard_summary(&self) -> Result<LeaderboardSummary, SyncError> {
        Ok(load_summary(self.store.as_ref()).await?)
    }
}

async fn run_worker(
    mut jobs: mpsc::UnboundedReceiver<SyncJob>,
    store: Arc<dyn ProfileStore>,
    leaderboard: LeaderboardFeed,
    policy: RetryPolicy,
) {
    while let Some(job) = jobs.recv().await {
        let outcome = match write_round(store.as_ref(), &job.identity, job.result, policy).await {
            Ok(outcome) => outcome,
            Err(StoreError::NotFound(id)) => {
                warn!("Round result for {} has no profile to land in", id);
                SyncOutcome::ProfileMissing
            }
            Err(e) => {
                error!(
                    "Failed to record score {} for {}: {}",
                    job.result.score, job.result.profile_id, e
                );
                SyncOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        if matches!(outcome, SyncOutcome::Saved { .. }) {
            leaderboard.refresh().await;
        }
        // The round may have been abandoned; nobody waiting is fine.
        let _ = job.reply.send(outcome);
    }
    info!("Profile sync worker stopped");
}

/// Appends the score, then raises the best score as a separate write only
/// when the round beat it. A retried step never repeats a finished one.
async fn write_round(
    store: &dyn ProfileStore,
    identity: &Identity,
    result: RoundResult,
    policy: RetryPolicy,
) -> Result<SyncOutcome, StoreError> {
    let RoundResult { profile_id, score } = result;

    with_retry(policy, "append score", || {
        store.append_score(identity, profile_id, score)
    })
    .await?;

    let profile = with_retry(policy, "read profile", || store.find_profile(profile_id))
        .await?
        .ok_or(StoreError::NotFound(profile_id))?;

    let new_best = score > profile.best_score
        && with_retry(policy, "raise best score", || {
            store.raise_best_score(identity, profile_id, score)
        })
        .await?;

    info!(
        "Recorded score {} for {} (best {})",
        score,
        profile_id,
        profile.best_score.max(score)
    );
    Ok(SyncOutcome::Saved {
        score,
        best_score: profile.best_score.max(score),
        new_best,
    })
}

async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    step: &str,
    mut operation: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    step, attempt, policy.max_attempts, delay, e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
