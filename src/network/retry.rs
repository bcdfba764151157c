//! 显式重试策略 (Retry Policy)
//!
//! 在调用点包裹订阅拉取与节点探测，失败语义由 `retry_on` 判定而非隐式装饰。

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

pub struct RetryPolicy<E> {
    /// 总尝试次数 (含首次)，最小为 1
    pub max_attempts: u32,
    /// 第 n 次重试前等待 `backoff * n`，外加最多 1/4 的随机抖动
    pub backoff: Duration,
    retry_on: fn(&E) -> bool,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for RetryPolicy<E> {}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl<E: fmt::Display> RetryPolicy<E> {
    pub fn new(max_attempts: u32, backoff: Duration, retry_on: fn(&E) -> bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            retry_on,
        }
    }

    pub fn should_retry(&self, attempt: u32, err: &E) -> bool {
        attempt < self.max_attempts && (self.retry_on)(err)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.saturating_mul(attempt);
        let jitter_cap = u64::try_from(self.backoff.as_millis() / 4).unwrap_or(u64::MAX);
        if jitter_cap == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..=jitter_cap))
    }

    /// 执行任务，可重试错误在退避后重新执行
    pub async fn run<F, Fut, T>(&self, desc: impl fmt::Display, mut task: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match task().await {
                Ok(value) => return Ok(value),
                Err(e) if self.should_retry(attempt, &e) => {
                    let wait = self.delay(attempt);
                    warn!(
                        "第 {}/{} 次尝试失败 [{}]: {}, {:?} 后重试",
                        attempt, self.max_attempts, desc, e, wait
                    );
                    sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug)]
    enum Flaky {
        Transient,
        Fatal,
    }

    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy<Flaky> {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), |e| {
            matches!(e, Flaky::Transient)
        })
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = policy(3)
            .run("flaky", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Flaky::Transient)
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_stop_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(5)
            .run("fatal", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Flaky::Fatal)
            })
            .await;
        assert!(matches!(result, Err(Flaky::Fatal)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(2)
            .run("bounded", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Flaky::Transient)
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
