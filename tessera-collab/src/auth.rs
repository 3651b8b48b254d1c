//! Auth token sources.
//!
//! The session asks for a token on every connect attempt. Returning `None`
//! aborts that attempt; the session reports an error status and retries
//! after the reconnect delay.

use futures_util::future::BoxFuture;
use std::future::Future;

pub trait TokenProvider: Send + Sync {
    fn fetch_token(&self) -> BoxFuture<'static, Option<String>>;
}

impl<F, Fut> TokenProvider for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Option<String>> + Send + 'static,
{
    fn fetch_token(&self) -> BoxFuture<'static, Option<String>> {
        Box::pin(self())
    }
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenProvider for StaticToken {
    fn fetch_token(&self) -> BoxFuture<'static, Option<String>> {
        let token = self.0.clone();
        Box::pin(async move { Some(token) })
    }
}

/// A provider that never has a token.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToken;

impl TokenProvider for NoToken {
    fn fetch_token(&self) -> BoxFuture<'static, Option<String>> {
        Box::pin(async { None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_static_token() {
        assert_eq!(StaticToken::new("abc").fetch_token().await.as_deref(), Some("abc"));
        assert_eq!(NoToken.fetch_token().await, None);
    }

    #[tokio::test]
    async fn test_closure_provider_rotates() {
        let counter = Arc::new(AtomicUsize::new(0));
        let provider = {
            let counter = counter.clone();
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { Some(format!("token-{n}")) }
            }
        };

        assert_eq!(provider.fetch_token().await.as_deref(), Some("token-0"));
        assert_eq!(provider.fetch_token().await.as_deref(), Some("token-1"));
    }
}
