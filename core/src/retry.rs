//! bounded, jittered retry around a fallible async step.

use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64, jitter_pct: f64) -> Self {
        let clamped_base = base_delay_ms.max(1);
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: clamped_base,
            max_delay_ms: max_delay_ms.max(clamped_base),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    /// mint submission: three attempts in total.
    pub fn mint() -> Self {
        Self::new(3, 500, 2_000, 0.2)
    }

    /// single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, 1, 1, 0.0)
    }

    pub fn next_delay(&self, attempt: usize) -> Duration {
        let exp = 2_u64.saturating_pow(attempt as u32);
        let delay = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        let delay = if self.jitter_pct > 0.0 {
            let spread = (delay as f64 * self.jitter_pct) as i64;
            let delta = rand::thread_rng().gen_range(-spread..=spread);
            delay.saturating_add_signed(delta)
        } else {
            delay
        };
        Duration::from_millis(delay)
    }

    /// run `op` until it succeeds, fails with an error `retryable` refuses,
    /// or `max_attempts` is used up. `state` is lent to every attempt.
    pub async fn retry_with<S, T, E, F, R>(&self, state: &mut S, mut op: F, retryable: R) -> Result<T, E>
    where
        F: for<'a> FnMut(&'a mut S, usize) -> BoxFuture<'a, Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match op(&mut *state, attempt).await {
                Ok(val) => return Ok(val),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !retryable(&err) {
                        return Err(err);
                    }
                    let delay = self.next_delay(attempt - 1);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying");
                    sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::mint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn test_new_clamps_input_parameters() {
        let policy = RetryPolicy::new(0, 0, 0, 2.0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay_ms, 1);
        assert_eq!(policy.max_delay_ms, 1);
        assert_eq!(policy.jitter_pct, 1.0);
    }

    #[test]
    fn test_next_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, 100, 500, 0.0);
        let delays: Vec<_> = (0..5).map(|attempt| policy.next_delay(attempt)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert_eq!(delays[3], Duration::from_millis(500));
        assert_eq!(delays[4], Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::new(3, 10, 10, 0.0);
        let mut calls = Vec::new();

        let result: Result<&str, &str> = policy
            .retry_with(
                &mut calls,
                |calls, attempt| {
                    async move {
                        calls.push(attempt);
                        if attempt < 2 {
                            Err("timeout")
                        } else {
                            Ok("ok")
                        }
                    }
                    .boxed()
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(calls, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_max_attempts() {
        let policy = RetryPolicy::mint();
        let mut count = 0usize;

        let result: Result<(), &str> = policy
            .retry_with(
                &mut count,
                |count, _| {
                    async move {
                        *count += 1;
                        Err("timeout")
                    }
                    .boxed()
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Err("timeout"));
        assert_eq!(count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let policy = RetryPolicy::mint();
        let mut count = 0usize;

        let result: Result<(), &str> = policy
            .retry_with(
                &mut count,
                |count, _| {
                    async move {
                        *count += 1;
                        Err("rejected")
                    }
                    .boxed()
                },
                |e| *e == "timeout",
            )
            .await;

        assert_eq!(result, Err("rejected"));
        assert_eq!(count, 1);
    }
}
