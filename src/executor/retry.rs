//! Bounded-retry decorator for any `ExecutionBackend`.
//!
//! Retries `pull_image`, `create_unit` and `start_unit` on transient failures
//! with a fixed delay. Waiting and reading output pass straight through.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::executor::{ExecutionBackend, ExecutorResult, UnitContext};

pub struct RetryingBackend {
    inner: Arc<dyn ExecutionBackend>,
    attempts: u32,
    delay: Duration,
}

impl RetryingBackend {
    /// `attempts` counts the first try; values below one are treated as one.
    pub fn new(inner: Arc<dyn ExecutionBackend>, attempts: u32, delay: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            delay,
        }
    }

    async fn retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> ExecutorResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = ExecutorResult<T>> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts && e.is_transient() => {
                    tracing::warn!(
                        backend = self.inner.name(),
                        operation,
                        attempt,
                        error = %e,
                        "Execution backend call failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl ExecutionBackend for RetryingBackend {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn image_is_loaded(&self, image: &str) -> ExecutorResult<bool> {
        self.inner.image_is_loaded(image).await
    }

    async fn pull_image(&self, image: &str) -> ExecutorResult<()> {
        self.retry("pull_image", || self.inner.pull_image(image)).await
    }

    async fn create_unit(
        &self,
        ctx: &UnitContext,
        image: &str,
        command: &str,
    ) -> ExecutorResult<String> {
        self.retry("create_unit", || self.inner.create_unit(ctx, image, command))
            .await
    }

    async fn start_unit(&self, execution_id: &str) -> ExecutorResult<()> {
        self.retry("start_unit", || self.inner.start_unit(execution_id))
            .await
    }

    async fn wait_unit(&self, execution_id: &str, timeout: Duration) -> ExecutorResult<()> {
        self.inner.wait_unit(execution_id, timeout).await
    }

    async fn read_output(&self, execution_id: &str) -> ExecutorResult<String> {
        self.inner.read_output(execution_id).await
    }

    async fn ping(&self) -> ExecutorResult<()> {
        self.inner.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorError;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `start_unit` with the configured error until `failures` calls have happened.
    struct Flaky {
        failures: u32,
        status: u16,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ExecutionBackend for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }
        async fn image_is_loaded(&self, _image: &str) -> ExecutorResult<bool> {
            Ok(true)
        }
        async fn pull_image(&self, _image: &str) -> ExecutorResult<()> {
            Ok(())
        }
        async fn create_unit(
            &self,
            _ctx: &UnitContext,
            _image: &str,
            _command: &str,
        ) -> ExecutorResult<String> {
            Ok("unit".to_string())
        }
        async fn start_unit(&self, _execution_id: &str) -> ExecutorResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(ExecutorError::Api {
                    status: self.status,
                    message: "boom".to_string(),
                })
            } else {
                Ok(())
            }
        }
        async fn wait_unit(&self, _execution_id: &str, timeout: Duration) -> ExecutorResult<()> {
            Err(ExecutorError::Timeout(timeout))
        }
        async fn read_output(&self, _execution_id: &str) -> ExecutorResult<String> {
            Ok(String::new())
        }
        async fn ping(&self) -> ExecutorResult<()> {
            Ok(())
        }
    }

    fn flaky(failures: u32, status: u16) -> Arc<Flaky> {
        Arc::new(Flaky {
            failures,
            status,
            calls: AtomicU32::new(0),
        })
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let inner = flaky(2, 500);
        let backend = RetryingBackend::new(inner.clone(), 3, Duration::ZERO);
        backend.start_unit("unit").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let inner = flaky(5, 500);
        let backend = RetryingBackend::new(inner.clone(), 3, Duration::ZERO);
        assert!(backend.start_unit("unit").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let inner = flaky(1, 404);
        let backend = RetryingBackend::new(inner.clone(), 3, Duration::ZERO);
        assert!(backend.start_unit("unit").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wait_timeout_passes_through() {
        let backend = RetryingBackend::new(flaky(0, 500), 3, Duration::ZERO);
        let err = backend
            .wait_unit("unit", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Timeout(_)));
    }
}
