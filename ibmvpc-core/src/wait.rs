//! Wait - Poll a remote object until its status reaches a target label
//!
//! Every "wait until the server is stopped" or "wait until the interface is
//! gone" in the provider is an instance of [`StateChangeConf`]: a refresh
//! closure, a set of pending labels, a set of target labels and timing.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::{Instant, sleep};

/// Default wait before the first refresh
pub const DEFAULT_DELAY: Duration = Duration::from_secs(10);
/// Default minimum wait between two refreshes
pub const DEFAULT_MIN_TIMEOUT: Duration = Duration::from_secs(10);
/// Default overall timeout for one wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Default number of consecutive empty observations tolerated
pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

/// One observation of a remote object
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<T> {
    /// The fetched object, `None` if the object no longer exists
    pub object: Option<T>,
    /// Status label drawn from the resource type's vocabulary
    pub status: String,
}

impl<T> Observation<T> {
    pub fn new(object: T, status: impl Into<String>) -> Self {
        Self {
            object: Some(object),
            status: status.into(),
        }
    }

    /// The object is gone; `status` is the type's terminal label (e.g. "deleted")
    pub fn gone(status: impl Into<String>) -> Self {
        Self {
            object: None,
            status: status.into(),
        }
    }

    /// Nothing was found and no label applies
    pub fn not_found() -> Self {
        Self {
            object: None,
            status: String::new(),
        }
    }
}

/// Errors returned by [`StateChangeConf::wait_for_state`]
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error(
        "timeout while waiting for state to become '{}' (last state: '{last_status}', timeout: {}s)",
        target.join(", "),
        timeout.as_secs()
    )]
    Timeout {
        target: Vec<String>,
        last_status: String,
        timeout: Duration,
    },

    #[error("couldn't find resource ({checks} retries)")]
    NotFound { checks: u32 },

    #[error("error refreshing state: {0}")]
    Refresh(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Configuration of one poll-until-target-state session
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    /// Labels on which polling continues
    pub pending: Vec<String>,
    /// Labels on which polling stops successfully
    pub target: Vec<String>,
    /// Wait before the first refresh
    pub delay: Duration,
    /// Minimum wait between refreshes
    pub min_timeout: Duration,
    /// Explicit wait between refreshes, overriding `max(delay, min_timeout)`
    pub poll_interval: Option<Duration>,
    /// Overall deadline, measured from the start of the wait
    pub timeout: Duration,
    /// Consecutive empty observations tolerated before failing
    pub not_found_checks: u32,
}

impl Default for StateChangeConf {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            target: Vec::new(),
            delay: DEFAULT_DELAY,
            min_timeout: DEFAULT_MIN_TIMEOUT,
            poll_interval: None,
            timeout: DEFAULT_TIMEOUT,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
        }
    }
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str], timeout: Duration) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            timeout,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    /// Wait between two refreshes
    pub fn interval(&self) -> Duration {
        self.poll_interval
            .unwrap_or_else(|| self.delay.max(self.min_timeout))
    }

    fn is_target(&self, status: &str) -> bool {
        self.target.iter().any(|t| t == status)
    }

    fn is_pending(&self, status: &str) -> bool {
        self.pending.iter().any(|p| p == status)
    }

    /// Poll `refresh` until it reports a target label
    ///
    /// Returns the last fetched object on success. A refresh error ends the
    /// wait immediately. Labels in neither set keep the loop going. The
    /// timeout is only reported once the deadline has passed.
    pub async fn wait_for_state<T, E, F, Fut>(&self, mut refresh: F) -> Result<Option<T>, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation<T>, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        // None when the timeout is too large to represent; the wait is then unbounded
        let deadline = Instant::now().checked_add(self.timeout);
        let interval = self.interval();
        let mut not_found = 0u32;

        debug!(
            "Waiting for state to become '{}' (timeout: {}s)",
            self.target.join(", "),
            self.timeout.as_secs()
        );

        sleep(self.delay).await;

        loop {
            let observation = refresh().await.map_err(|e| WaitError::Refresh(e.into()))?;
            let status = observation.status;

            if observation.object.is_none() && status.is_empty() {
                not_found += 1;
                debug!("Refresh found nothing ({}/{})", not_found, self.not_found_checks);
                if not_found > self.not_found_checks {
                    return Err(WaitError::NotFound {
                        checks: self.not_found_checks,
                    });
                }
            } else {
                not_found = 0;
                debug!("Refresh observed state '{}'", status);

                if self.is_target(&status) {
                    return Ok(observation.object);
                }
                if !self.is_pending(&status) {
                    warn!(
                        "Unexpected state '{}', wanted target '{}'; continuing to poll",
                        status,
                        self.target.join(", ")
                    );
                }
            }

            let now = Instant::now();
            match deadline {
                Some(deadline) if now >= deadline => {
                    return Err(WaitError::Timeout {
                        target: self.target.clone(),
                        last_status: status,
                        timeout: self.timeout,
                    });
                }
                Some(deadline) => sleep(interval.min(deadline - now)).await,
                None => sleep(interval).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, thiserror::Error)]
    #[error("transport failure")]
    struct TransportError;

    fn conf(timeout_secs: u64) -> StateChangeConf {
        StateChangeConf::new(
            &["available", "deleting", "pending"],
            &["deleted", "failed"],
            Duration::from_secs(timeout_secs),
        )
        .with_delay(Duration::from_secs(10))
        .with_min_timeout(Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_sequence_reaches_deleted() {
        let mut script: VecDeque<Observation<&str>> = VecDeque::from(vec![
            Observation::new("nic", "deleting"),
            Observation::new("nic", "deleting"),
            Observation::gone("deleted"),
        ]);
        let mut calls = 0;
        let start = Instant::now();

        let result = conf(60)
            .wait_for_state(|| {
                calls += 1;
                let next = script.pop_front();
                async move { next.ok_or(TransportError) }
            })
            .await
            .unwrap();

        assert_eq!(result, None);
        assert_eq!(calls, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_target_needs_one_refresh() {
        let mut calls = 0;
        let start = Instant::now();

        let result = conf(60)
            .wait_for_state(|| {
                calls += 1;
                async { Ok::<_, TransportError>(Observation::new(7, "failed")) }
            })
            .await
            .unwrap();

        assert_eq!(result, Some(7));
        assert_eq!(calls, 1);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_error_aborts() {
        let mut calls = 0;

        let err = conf(60)
            .wait_for_state(|| {
                calls += 1;
                async { Err::<Observation<()>, _>(TransportError) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Refresh(_)));
        assert_eq!(calls, 1);
        assert_eq!(err.to_string(), "error refreshing state: transport failure");
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_pending_times_out_at_deadline() {
        let mut calls = 0;
        let start = Instant::now();

        let err = conf(60)
            .wait_for_state(|| {
                calls += 1;
                async { Ok::<_, TransportError>(Observation::new((), "deleting")) }
            })
            .await
            .unwrap_err();

        match err {
            WaitError::Timeout {
                last_status,
                timeout,
                ..
            } => {
                assert_eq!(last_status, "deleting");
                assert_eq!(timeout, Duration::from_secs(60));
            }
            other => panic!("Expected Timeout, got {:?}", other),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        assert_eq!(calls, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_not_reported_early_with_uneven_interval() {
        let start = Instant::now();

        let err = conf(25)
            .wait_for_state(|| async { Ok::<_, TransportError>(Observation::new((), "pending")) })
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Timeout { .. }));
        assert!(start.elapsed() >= Duration::from_secs(25));
        assert!(start.elapsed() < Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_label_keeps_polling() {
        let mut script = VecDeque::from(vec!["maintenance", "mystery", "deleted"]);

        let result = conf(60)
            .wait_for_state(|| {
                let status = script.pop_front().unwrap_or("deleted");
                async move { Ok::<_, TransportError>(Observation::new(status, status)) }
            })
            .await
            .unwrap();

        assert_eq!(result, Some("deleted"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_budget() {
        let mut calls = 0;

        let err = conf(600)
            .with_not_found_checks(2)
            .wait_for_state(|| {
                calls += 1;
                async { Ok::<Observation<()>, TransportError>(Observation::not_found()) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::NotFound { checks: 2 }));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_interval_selection() {
        let c = StateChangeConf::default()
            .with_delay(Duration::from_secs(5))
            .with_min_timeout(Duration::from_secs(20));
        assert_eq!(c.interval(), Duration::from_secs(20));

        let c = c.with_poll_interval(Duration::from_secs(3));
        assert_eq!(c.interval(), Duration::from_secs(3));
    }

    #[test]
    fn test_timeout_message() {
        let err = WaitError::Timeout {
            target: vec!["done".to_string()],
            last_status: "provisioning".to_string(),
            timeout: Duration::from_secs(600),
        };
        assert_eq!(
            err.to_string(),
            "timeout while waiting for state to become 'done' (last state: 'provisioning', timeout: 600s)"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_polls_until_target() {
        let mut script: VecDeque<Observation<&str>> = VecDeque::from(vec![
            Observation::new("conn", "pending"),
            Observation::new("conn", "failed"),
        ]);
        let start = Instant::now();

        let result = StateChangeConf::new(&["pending"], &["failed"], Duration::from_secs(u64::MAX))
            .with_delay(Duration::from_secs(10))
            .with_min_timeout(Duration::from_secs(10))
            .wait_for_state(|| {
                let next = script.pop_front();
                async move { next.ok_or(TransportError) }
            })
            .await
            .unwrap();

        assert_eq!(result, Some("conn"));
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_largest_valid_timeout_override_does_not_overflow() {
        use crate::resource::{Resource, Value};
        use crate::schema::types;
        use crate::timeouts::{TIMEOUTS_ATTRIBUTE, Timeouts};
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert("create".to_string(), Value::Int(i64::MAX));
        let timeouts = Value::Map(map);
        assert!(types::timeouts().validate(&timeouts).is_ok());

        let resource = Resource::new("is_lb_listener_policy_rule", "rule")
            .with_attribute(TIMEOUTS_ATTRIBUTE, timeouts);
        let timeout = Timeouts::default().with_overrides(&resource).create;
        let mut script: VecDeque<Observation<()>> = VecDeque::from(vec![
            Observation::new((), "pending"),
            Observation::new((), "done"),
        ]);

        let result = StateChangeConf::new(&["pending"], &["done"], timeout)
            .wait_for_state(|| {
                let next = script.pop_front();
                async move { next.ok_or(TransportError) }
            })
            .await
            .unwrap();

        assert_eq!(result, Some(()));
    }
}
