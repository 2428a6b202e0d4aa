// ── Reconciliation poller ──
//
// One parameterized "wait until the status reaches X" loop shared by every
// resource kind and operation. Each wait episode refreshes the remote
// entity, classifies its status against the pending and target sets, and
// sleeps between refreshes until it settles, times out, or is cancelled.
//
// The poller never retries: a failed refresh ends the episode. Callers
// that want "not found" to count as a state wrap their refresh with
// `absent_on_not_found`.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, OperationClass};
use crate::resource::ResourceDescriptor;

/// Synthetic status reported when the remote entity does not exist.
pub const ABSENT: &str = "ABSENT";

// ── Observation ────────────────────────────────────────────────────

/// One refresh result: the entity (if it exists) and its status code.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<T> {
    pub entity: Option<T>,
    pub status: String,
}

impl<T> Observation<T> {
    pub fn new(entity: T, status: impl Into<String>) -> Self {
        Self {
            entity: Some(entity),
            status: status.into(),
        }
    }

    /// The entity is gone; status is [`ABSENT`].
    pub fn absent() -> Self {
        Self {
            entity: None,
            status: ABSENT.to_owned(),
        }
    }

    pub fn is_absent(&self) -> bool {
        self.entity.is_none() && self.status == ABSENT
    }
}

/// Adapt a remote `get` result: 404 becomes [`Observation::absent`],
/// other errors pass through untouched.
pub fn absent_on_not_found<T>(
    result: Result<T, converge_api::Error>,
    status_of: impl FnOnce(&T) -> &str,
) -> Result<Observation<T>, converge_api::Error> {
    match result {
        Ok(entity) => {
            let status = status_of(&entity).to_owned();
            Ok(Observation::new(entity, status))
        }
        Err(e) if e.is_not_found() => Ok(Observation::absent()),
        Err(e) => Err(e),
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("status refresh failed: {0}")]
    RefreshFailed(#[source] converge_api::Error),

    #[error(
        "timed out after {timeout:?} while status was {}",
        .last_status.as_deref().unwrap_or("never observed")
    )]
    Timeout {
        timeout: Duration,
        last_status: Option<String>,
        last_entity: Option<Value>,
    },

    #[error("unexpected status {status:?} (waiting for {target:?}, tolerating {pending:?})")]
    UnexpectedState {
        status: String,
        pending: Vec<String>,
        target: Vec<String>,
        entity: Option<Value>,
    },

    #[error(
        "cancelled while status was {}",
        .last_status.as_deref().unwrap_or("never observed")
    )]
    Cancelled {
        last_status: Option<String>,
        last_entity: Option<Value>,
    },
}

impl WaitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

// ── Reconciliation ─────────────────────────────────────────────────

/// Parameters of one wait episode. Built fresh for every wait.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub pending: BTreeSet<String>,
    pub target: BTreeSet<String>,
    /// Budget for the polling loop, counted from the first refresh.
    pub timeout: Duration,
    pub initial_delay: Duration,
    pub min_poll_interval: Duration,
    pub cancel: CancellationToken,
}

impl Reconciliation {
    pub fn new<P, T>(pending: P, target: T) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        let defaults = EngineConfig::default();
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            timeout: defaults.timeouts.update,
            initial_delay: defaults.initial_delay,
            min_poll_interval: defaults.min_poll_interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Episode for `class` on a resource described by `descriptor`.
    pub fn for_operation(
        descriptor: &ResourceDescriptor,
        class: OperationClass,
        config: &EngineConfig,
        cancel: CancellationToken,
    ) -> Self {
        let transition = descriptor.statuses.for_class(class);
        Self {
            timeout: config.timeouts.for_class(class),
            initial_delay: config.initial_delay,
            min_poll_interval: config.min_poll_interval,
            cancel,
            ..Self::new(
                transition.pending.iter().copied(),
                transition.target.iter().copied(),
            )
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn with_min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Refresh until the status reaches the target set.
    ///
    /// Sleeps `initial_delay` once, then refreshes. A status in `target`
    /// returns the observation; a status in `pending` sleeps
    /// `min_poll_interval` (clipped to the remaining budget) and tries
    /// again; anything else fails at once without another sleep. Every
    /// sleep and refresh races the cancellation token.
    pub async fn wait<T, F, Fut>(&self, mut refresh: F) -> Result<Observation<T>, WaitError>
    where
        T: Serialize,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation<T>, converge_api::Error>>,
    {
        let episode = Uuid::new_v4();
        debug!(
            %episode,
            pending = ?self.pending,
            target = ?self.target,
            timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            "reconciliation started"
        );

        let mut last: Option<Observation<T>> = None;

        if !self.initial_delay.is_zero() && !self.pause(self.initial_delay).await {
            return Err(self.cancelled(episode, last.as_ref()));
        }

        let deadline = Instant::now() + self.timeout;
        let mut polls: u32 = 0;

        while Instant::now() < deadline {
            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(self.cancelled(episode, last.as_ref())),
                result = refresh() => result,
            };
            polls += 1;

            let observation = match result {
                Ok(o) => o,
                Err(e) => {
                    warn!(%episode, polls, error = %e, "status refresh failed");
                    return Err(WaitError::RefreshFailed(e));
                }
            };

            if self.target.contains(&observation.status) {
                info!(%episode, polls, status = %observation.status, "reconciliation settled");
                return Ok(observation);
            }

            if !self.pending.contains(&observation.status) {
                warn!(%episode, polls, status = %observation.status, "unexpected status");
                return Err(WaitError::UnexpectedState {
                    entity: snapshot(Some(&observation)),
                    status: observation.status,
                    pending: self.pending.iter().cloned().collect(),
                    target: self.target.iter().cloned().collect(),
                });
            }

            debug!(%episode, polls, status = %observation.status, "still pending");
            last = Some(observation);

            let remaining = deadline.saturating_duration_since(Instant::now());
            if !self.pause(self.min_poll_interval.min(remaining)).await {
                return Err(self.cancelled(episode, last.as_ref()));
            }
        }

        let last_status = last.as_ref().map(|o| o.status.clone());
        warn!(%episode, polls, ?last_status, "reconciliation timed out");
        Err(WaitError::Timeout {
            timeout: self.timeout,
            last_entity: snapshot(last.as_ref()),
            last_status,
        })
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }

    fn cancelled<T: Serialize>(&self, episode: Uuid, last: Option<&Observation<T>>) -> WaitError {
        let last_status = last.map(|o| o.status.clone());
        info!(%episode, ?last_status, "reconciliation cancelled");
        WaitError::Cancelled {
            last_status,
            last_entity: snapshot(last),
        }
    }
}

fn snapshot<T: Serialize>(observation: Option<&Observation<T>>) -> Option<Value> {
    observation
        .and_then(|o| o.entity.as_ref())
        .and_then(|e| serde_json::to_value(e).ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Thing {
        status: String,
    }

    /// Refresh closure replaying `statuses`, repeating the last one.
    fn scripted(
        statuses: &[&str],
    ) -> (
        Arc<Mutex<u32>>,
        impl FnMut() -> std::future::Ready<Result<Observation<Thing>, converge_api::Error>>,
    ) {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&calls);
        let mut script: VecDeque<String> = statuses.iter().map(|s| (*s).to_owned()).collect();
        let refresh = move || {
            *counter.lock().unwrap() += 1;
            let status = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            };
            std::future::ready(Ok(Observation::new(
                Thing {
                    status: status.clone(),
                },
                status,
            )))
        };
        (calls, refresh)
    }

    fn episode(pending: &[&str], target: &[&str]) -> Reconciliation {
        Reconciliation::new(pending.iter().copied(), target.iter().copied())
            .with_initial_delay(Duration::from_secs(1))
            .with_min_poll_interval(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn settles_after_pending_statuses() {
        let (calls, refresh) = scripted(&["CREATING", "CREATING", "RUNNING"]);

        let obs = episode(&["CREATING"], &["RUNNING"])
            .wait(refresh)
            .await
            .unwrap();

        assert_eq!(obs.status, "RUNNING");
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn never_settling_times_out() {
        // Poll interval longer than the whole budget: one refresh, then the
        // clipped sleep runs out the deadline.
        let (calls, refresh) = scripted(&["DELETING"]);
        let start = Instant::now();

        let err = episode(&["DELETING"], &[ABSENT])
            .with_timeout(Duration::from_secs(2))
            .with_min_poll_interval(Duration::from_secs(3))
            .wait(refresh)
            .await
            .unwrap_err();

        assert_eq!(*calls.lock().unwrap(), 1);
        match err {
            WaitError::Timeout {
                last_status,
                last_entity,
                timeout,
            } => {
                assert_eq!(last_status.as_deref(), Some("DELETING"));
                assert_eq!(last_entity, Some(serde_json::json!({ "status": "DELETING" })));
                assert_eq!(timeout, Duration::from_secs(2));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_status_fails_without_sleeping() {
        let (calls, refresh) = scripted(&["ERROR"]);
        let start = Instant::now();

        let err = episode(&["CREATING"], &["RUNNING"])
            .wait(refresh)
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::UnexpectedState { ref status, .. } if status == "ERROR"));
        assert_eq!(*calls.lock().unwrap(), 1);
        // Only the initial delay elapsed.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_failure_is_not_retried() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&calls);
        let refresh = move || {
            *counter.lock().unwrap() += 1;
            std::future::ready(Err::<Observation<Thing>, _>(converge_api::Error::Api {
                message: "boom".into(),
                code: None,
                status: 500,
            }))
        };

        let err = episode(&["CREATING"], &["RUNNING"])
            .wait(refresh)
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::RefreshFailed(_)));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_distinct_from_timeout() {
        let (_calls, refresh) = scripted(&["UPDATING"]);
        let cancel = CancellationToken::new();
        let reconciliation = episode(&["UPDATING"], &["ACTIVE"]).with_cancel(cancel.clone());

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            cancel.cancel();
        });

        let err = reconciliation.wait(refresh).await.unwrap_err();
        trigger.await.unwrap();

        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
        match err {
            WaitError::Cancelled { last_status, .. } => {
                assert_eq!(last_status.as_deref(), Some("UPDATING"));
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_first_refresh() {
        let (calls, refresh) = scripted(&["RUNNING"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = episode(&["CREATING"], &["RUNNING"])
            .with_cancel(cancel)
            .wait(refresh)
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Cancelled { last_status: None, .. }));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_counts_as_target_for_deletes() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&calls);
        let refresh = move || {
            let n = {
                let mut c = counter.lock().unwrap();
                *c += 1;
                *c
            };
            let result = if n < 2 {
                Ok(Thing {
                    status: "DELETING".into(),
                })
            } else {
                Err(converge_api::Error::Api {
                    message: "gone".into(),
                    code: None,
                    status: 404,
                })
            };
            std::future::ready(absent_on_not_found(result, |t| t.status.as_str()))
        };

        let obs = episode(&["DELETING"], &[ABSENT]).wait(refresh).await.unwrap();
        assert!(obs.is_absent());
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn other_errors_pass_through_absent_adapter() {
        let result: Result<Thing, _> = Err(converge_api::Error::Api {
            message: "denied".into(),
            code: None,
            status: 403,
        });
        assert!(absent_on_not_found(result, |t| t.status.as_str()).is_err());
    }
}
