use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::error::{Error, Result};

/// A handle used for awaiting on blocking calls spawned onto tokio's blocking thread pool.
#[derive(Debug)]
pub(crate) struct BlockingJoinHandle<T>(tokio::task::JoinHandle<T>);

impl<T> BlockingJoinHandle<T> {
    pub(crate) fn spawn<F>(call: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::runtime::Handle::current();
        BlockingJoinHandle(handle.spawn_blocking(call))
    }
}

impl<T> Future for BlockingJoinHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx).map(|result| match result {
            Ok(value) => Ok(value),
            // A panic in the blocking call is re-raised on the awaiting task rather than turned
            // into an error.
            Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
            Err(error) => Err(Error::internal(format!(
                "blocking call was cancelled before completing: {}",
                error
            ))),
        })
    }
}
