//! Boxed, sendable future used at every suspension point of the pipeline
//!
//! Installer-agent calls, pacing delays and remediation routines all hand
//! back an `AsyncTask` so trait objects stay object-safe without pulling in
//! an async-trait macro.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Owned, pinned future with combinators for chaining agent calls
pub struct AsyncTask<T> {
    inner: Pin<Box<dyn Future<Output = T> + Send + 'static>>,
}

impl<T> AsyncTask<T> {
    /// Box an arbitrary future
    pub fn from_future<F>(fut: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            inner: Box::pin(fut),
        }
    }

    /// Task that resolves immediately with `value`
    pub fn ready(value: T) -> Self
    where
        T: Send + 'static,
    {
        Self::from_future(std::future::ready(value))
    }
}

impl<T> Future for AsyncTask<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl<T, E> AsyncTask<Result<T, E>> {
    /// Map the success value
    pub fn map<U, F>(self, f: F) -> AsyncTask<Result<U, E>>
    where
        F: FnOnce(T) -> U + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        U: Send + 'static,
    {
        AsyncTask::from_future(async move { self.await.map(f) })
    }

    /// Chain a second fallible call that only runs when the first succeeds
    pub fn and_then<U, F, Fut>(self, f: F) -> AsyncTask<Result<U, E>>
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<U, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        U: Send + 'static,
    {
        AsyncTask::from_future(async move {
            match self.await {
                Ok(value) => f(value).await,
                Err(err) => Err(err),
            }
        })
    }
}
