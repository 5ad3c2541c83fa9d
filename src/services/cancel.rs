//! Cancellation helpers shared by every actor.
//!
//! Every suspension point races its future against the run's
//! [`CancellationToken`] through [`OrCancelExt::or_cancel`].

use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Returned when a future loses the race against its token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Extension trait for making futures cancellable
#[async_trait]
pub trait OrCancelExt: Sized {
    type Output;

    /// Race this future against the token.
    ///
    /// An already-cancelled token wins even if the future is ready.
    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, Cancelled>;
}

#[async_trait]
impl<F> OrCancelExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, Cancelled> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Cancelled),
            res = self => Ok(res),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_completes_when_not_cancelled() {
        let token = CancellationToken::new();
        let result = async { 42 }.or_cancel(&token).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_cancelled_token_wins() {
        let token = CancellationToken::new();
        let child = token.child_token();

        let canceller = tokio::spawn({
            let token = token.clone();
            async move {
                sleep(Duration::from_millis(10)).await;
                token.cancel();
            }
        });

        let result = async {
            sleep(Duration::from_secs(5)).await;
            7
        }
        .or_cancel(&child)
        .await;

        assert_eq!(result, Err(Cancelled));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_ready_future() {
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(async { 1 }.or_cancel(&token).await, Err(Cancelled));
    }
}
