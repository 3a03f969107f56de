//! Polling until a resource reaches a terminal state

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::args::Params;
use crate::error::{ModuleError, Result};

/// Default delay between two status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default `timeout` parameter, seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Whether and how long create/delete block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub enabled: bool,
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WaitPolicy {
    /// From the common `wait` and `timeout` parameters
    pub fn from_params(params: &Params, interval: Duration) -> Self {
        let timeout = params
            .get_i64("timeout")
            .map(|t| Duration::from_secs(t.max(0) as u64))
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        Self {
            enabled: params.get_bool("wait").unwrap_or(true),
            timeout,
            interval,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Result of one probe
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    Done(T),
    Pending,
}

/// Probe until it reports [`Probe::Done`] or the deadline passes. A zero
/// timeout probes exactly once; a timeout too large for the clock never
/// expires.
pub async fn poll_until<T, F, Fut>(policy: &WaitPolicy, what: &str, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T>>>,
{
    let deadline = Instant::now().checked_add(policy.timeout);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let Probe::Done(value) = probe().await? {
            tracing::debug!("{} after {} poll(s)", what, attempts);
            return Ok(value);
        }

        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(ModuleError::timeout(format!(
                        "{} not observed within {}s",
                        what,
                        policy.timeout.as_secs()
                    )));
                }
                policy.interval.min(deadline - now)
            }
            None => policy.interval,
        };
        tokio::time::sleep(pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(timeout_ms: u64) -> WaitPolicy {
        WaitPolicy {
            enabled: true,
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_returns_once_done() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let value = poll_until(&policy(5_000), "ready", move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(if n >= 2 { Probe::Done(n) } else { Probe::Pending })
        })
        .await
        .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_zero_timeout_probes_once() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = poll_until(&policy(0), "instance ACTIVE", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ModuleError>(Probe::<()>::Pending)
        })
        .await
        .unwrap_err();
        assert_eq!(err.taxon(), "timeout");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_huge_timeout_still_polls() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = WaitPolicy {
            enabled: true,
            timeout: Duration::from_secs(i64::MAX as u64),
            interval: Duration::from_millis(1),
        };
        let value = poll_until(&policy, "ready", move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(if n >= 1 { Probe::Done(n) } else { Probe::Pending })
        })
        .await
        .unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_probe_error_propagates() {
        let err = poll_until(&policy(1_000), "ready", || async {
            Err::<Probe<()>, _>(ModuleError::connectivity("HTTP 500"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.taxon(), "connectivity");
    }
}
