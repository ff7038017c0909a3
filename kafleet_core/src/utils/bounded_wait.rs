//! Bounded waits
//! Every wait in the fleet has a deadline: a probe is polled at a fixed interval until it
//! succeeds or the deadline passes, and retried commands back off exponentially for a bounded
//! number of attempts. Both use the tokio clock so tests can run them on paused time.
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

/// Upper bound for a single backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Error, Debug, PartialEq)]
pub enum WaitError<E> {
    #[error("{0} not satisfied after {1:?}")]
    TimedOut(String, Duration),
    #[error("{0} aborted: {1}")]
    Aborted(String, E),
}

/// Polls a probe every `poll_interval` until it succeeds or `timeout` elapses.
#[derive(Debug, Clone)]
pub struct BoundedWait {
    /// The name of what is waited for, used in logs and errors
    name: String,
    /// The maximum time to wait for, including the time spent in the probes
    timeout: Duration,
    /// The time between two probes
    poll_interval: Duration,
}

impl BoundedWait {
    pub fn new(name: &str, timeout: Duration, poll_interval: Duration) -> Self {
        Self { name: name.to_string(), timeout, poll_interval }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `probe` until it returns `Ok(true)`, returning the time it took.
    /// An `Err` from the probe aborts the wait immediately.
    /// The probe is always run at least once, and once more when the deadline is reached.
    pub async fn until<F, Fut, E>(&self, mut probe: F) -> Result<Duration, WaitError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;
        loop {
            match probe().await {
                Ok(true) => {
                    let elapsed = start.elapsed();
                    debug!("{}: satisfied after {:?}", self.name, elapsed);
                    return Ok(elapsed);
                },
                Ok(false) => trace!("{}: not yet", self.name),
                Err(err) => return Err(WaitError::Aborted(self.name.clone(), err)),
            }
            let now = Instant::now();
            if now >= deadline {
                warn!("{}: gave up after {:?}", self.name, self.timeout);
                return Err(WaitError::TimedOut(self.name.clone(), self.timeout));
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

/// Exponential backoff over a bounded number of attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    attempts: u32,
    initial_delay: Duration,
}

impl Backoff {
    /// `attempts` counts the first try, 0 is treated as 1.
    pub fn new(attempts: u32, initial_delay: Duration) -> Self {
        Self { attempts: attempts.max(1), initial_delay }
    }

    /// No retries, the operation runs exactly once.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The delay before the retry following attempt number `attempt` (starting at 1).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Runs `op` until it succeeds, fails with an error `is_transient` rejects or the attempts
    /// are exhausted, in which case the last error is returned.
    pub async fn retry<F, Fut, T, E, P>(&self, name: &str, mut op: F, is_transient: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(val) => return Ok(val),
                Err(err) if attempt < self.attempts && is_transient(&err) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{}: attempt {}/{} failed: {}, retrying in {:?}",
                        name, attempt, self.attempts, err, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                },
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn it_waits_until_the_probe_succeeds() {
        let probes = AtomicU32::new(0);
        let wait = BoundedWait::new("port 9092", Duration::from_secs(10), Duration::from_secs(1));
        let elapsed = wait
            .until(|| async { Ok::<_, ()>(probes.fetch_add(1, Ordering::SeqCst) == 3) })
            .await
            .unwrap();
        assert_eq!(probes.load(Ordering::SeqCst), 4);
        assert_eq!(elapsed, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn it_times_out_at_the_deadline() {
        let wait =
            BoundedWait::new("port 9093", Duration::from_millis(2500), Duration::from_secs(1));
        let start = Instant::now();
        let res = wait.until(|| async { Ok::<_, ()>(false) }).await;
        assert_eq!(
            res,
            Err(WaitError::TimedOut(String::from("port 9093"), Duration::from_millis(2500)))
        );
        assert_eq!(start.elapsed(), Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn it_aborts_on_probe_errors() {
        let wait = BoundedWait::new("broker 1", Duration::from_secs(10), Duration::from_secs(1));
        let res = wait.until(|| async { Err::<bool, _>("exited") }).await;
        assert_eq!(res, Err(WaitError::Aborted(String::from("broker 1"), "exited")));
    }

    #[test]
    fn it_doubles_the_backoff_delay() {
        let backoff = Backoff::new(5, Duration::from_millis(200));
        assert_eq!(backoff.delay_after(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_after(3), Duration::from_millis(800));
        assert_eq!(backoff.delay_after(30), MAX_BACKOFF);
        assert_eq!(Backoff::new(0, Duration::from_millis(1)).attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn it_retries_transient_errors_only() {
        let calls = AtomicU32::new(0);
        let backoff = Backoff::new(3, Duration::from_millis(100));
        let start = Instant::now();
        let res: Result<(), String> = backoff
            .retry(
                "list",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(String::from("unreachable"))
                },
                |_| true,
            )
            .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(300));

        calls.store(0, Ordering::SeqCst);
        let res: Result<(), String> = backoff
            .retry(
                "create",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(String::from("invalid"))
                },
                |_| false,
            )
            .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
