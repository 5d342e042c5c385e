//! Handler completion aggregation.
//!
//! Each invoked handler yields a [`Reply`]: a plain value or a [`Deferred`]
//! result. Replies are normalized into [`CompletionUnit`]s and joined into a
//! single [`AllCompletions`] future handed back to the publisher.
//!
//! ```text
//! handler ──► Reply::Value ─────► CompletionUnit::Ready ──┐
//! handler ──► Reply::Deferred ──► CompletionUnit::Pending ┼──► AllCompletions
//! handler ──► Reply::Value ─────► CompletionUnit::Ready ──┘
//! ```
//!
//! A [`Deferred`] is settled by its [`Resolver`], not by polling, so dropping
//! the aggregate after a failure never cancels work still running elsewhere.

use crate::error::{CompletionError, HandlerError};
use beacon_filter::Value;
use futures_util::future::{try_join_all, BoxFuture};
use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

type Settlement = Result<Value, HandlerError>;

/// A result that some other party will settle later.
#[derive(Debug)]
pub struct Deferred {
    receiver: oneshot::Receiver<Settlement>,
}

/// Settles the paired [`Deferred`].
#[derive(Debug)]
pub struct Resolver {
    sender: oneshot::Sender<Settlement>,
}

impl Deferred {
    /// Create a pending deferred and its resolver.
    #[must_use]
    pub fn new() -> (Self, Resolver) {
        let (sender, receiver) = oneshot::channel();
        (Self { receiver }, Resolver { sender })
    }

    /// Create an already-resolved deferred.
    #[must_use]
    pub fn resolved(value: impl Into<Value>) -> Self {
        let (deferred, resolver) = Self::new();
        resolver.resolve(value);
        deferred
    }

    /// Create an already-rejected deferred.
    #[must_use]
    pub fn rejected(error: HandlerError) -> Self {
        let (deferred, resolver) = Self::new();
        resolver.reject(error);
        deferred
    }
}

impl Future for Deferred {
    type Output = Result<Value, CompletionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|settled| match settled {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(CompletionError::Failed(error)),
            Err(_) => Err(CompletionError::Abandoned),
        })
    }
}

impl Resolver {
    /// Resolve with a value.
    ///
    /// Returns `false` if the deferred was already dropped.
    pub fn resolve(self, value: impl Into<Value>) -> bool {
        self.sender.send(Ok(value.into())).is_ok()
    }

    /// Reject with an error.
    ///
    /// Returns `false` if the deferred was already dropped.
    pub fn reject(self, error: HandlerError) -> bool {
        self.sender.send(Err(error)).is_ok()
    }

    /// Check if the deferred side has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// What a handler hands back.
#[derive(Debug)]
pub enum Reply {
    /// Synchronous result.
    Value(Value),
    /// Result settled later.
    Deferred(Deferred),
}

impl From<()> for Reply {
    fn from((): ()) -> Self {
        Reply::Value(Value::Undefined)
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Value(value)
    }
}

impl From<Deferred> for Reply {
    fn from(deferred: Deferred) -> Self {
        Reply::Deferred(deferred)
    }
}

/// One handler's normalized contribution to [`AllCompletions`].
#[derive(Debug)]
pub enum CompletionUnit {
    /// Already complete. Yields its value once.
    Ready(Option<Value>),
    /// Waiting on a deferred.
    Pending(Deferred),
}

impl CompletionUnit {
    /// Normalize a handler reply.
    #[must_use]
    pub fn from_reply(reply: Reply) -> Self {
        match reply {
            Reply::Value(value) => CompletionUnit::Ready(Some(value)),
            Reply::Deferred(deferred) => CompletionUnit::Pending(deferred),
        }
    }
}

impl From<Reply> for CompletionUnit {
    fn from(reply: Reply) -> Self {
        Self::from_reply(reply)
    }
}

impl Future for CompletionUnit {
    type Output = Result<Value, CompletionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut *self {
            CompletionUnit::Ready(value) => Poll::Ready(Ok(value.take().unwrap_or_default())),
            CompletionUnit::Pending(deferred) => Pin::new(deferred).poll(cx),
        }
    }
}

/// Resolves once every handler's unit resolves; fails on the first failure.
///
/// Values are yielded in handler invocation order. An empty set resolves
/// immediately.
pub struct AllCompletions {
    units: usize,
    inner: BoxFuture<'static, Result<Vec<Value>, CompletionError>>,
}

impl AllCompletions {
    /// Join a set of units.
    #[must_use]
    pub fn new(units: Vec<CompletionUnit>) -> Self {
        Self {
            units: units.len(),
            inner: try_join_all(units).boxed(),
        }
    }

    /// Number of handler units being awaited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units
    }

    /// Check if no handler was invoked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units == 0
    }
}

impl Future for AllCompletions {
    type Output = Result<Vec<Value>, CompletionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl fmt::Debug for AllCompletions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllCompletions")
            .field("units", &self.units)
            .finish_non_exhaustive()
    }
}
