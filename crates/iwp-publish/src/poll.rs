//! Polling a remote resource until it reaches a state.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::PublishError;

/// Default interval between fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default limit on total time spent waiting.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(240);

/// Interval and overall timeout for [`poll_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Outcome of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    /// Expected state reached.
    Ready(T),
    /// Not there yet; fetch again.
    Pending,
    /// Terminal failure state, by name.
    Failed(String),
}

/// Fetch until `fetch` reports [`PollStep::Ready`].
///
/// A [`PollStep::Failed`] ends the wait with
/// [`PublishError::RemoteStateFailure`]; running past the policy's timeout
/// ends it with [`PublishError::RemoteStateTimeout`] no matter how many
/// fetches happened. Fetch errors propagate unchanged.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, expected: &str, mut fetch: F) -> Result<T, PublishError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStep<T>, PublishError>>,
{
    let started = Instant::now();
    let mut fetches: u32 = 0;

    loop {
        fetches += 1;
        match fetch().await? {
            PollStep::Ready(value) => {
                debug!(expected, fetches, elapsed_ms = started.elapsed().as_millis() as u64, "Remote state reached");
                return Ok(value);
            }
            PollStep::Failed(state) => {
                warn!(expected, %state, "Remote resource entered failure state");
                return Err(PublishError::RemoteStateFailure {
                    expected: expected.to_string(),
                    state,
                });
            }
            PollStep::Pending => {}
        }

        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            warn!(expected, fetches, elapsed_secs = elapsed.as_secs(), "Timed out waiting for remote state");
            return Err(PublishError::RemoteStateTimeout {
                expected: expected.to_string(),
                elapsed_secs: elapsed.as_secs(),
            });
        }
        tokio::time::sleep(policy.interval).await;
    }
}
