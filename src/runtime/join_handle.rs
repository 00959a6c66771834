use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::error::{ErrorKind, Result};

/// Handle to a spawned background task. Dropping the handle detaches the
/// task rather than aborting it.
#[derive(Debug)]
pub(crate) struct AsyncJoinHandle<T>(tokio::task::JoinHandle<T>);

impl<T> AsyncJoinHandle<T> {
    #[track_caller]
    pub(crate) fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        AsyncJoinHandle(tokio::task::spawn(fut))
    }
}

impl<T> Future for AsyncJoinHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx).map(|result| {
            result.map_err(|e| {
                ErrorKind::Internal {
                    message: format!("{}", e),
                }
                .into()
            })
        })
    }
}
