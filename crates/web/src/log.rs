//! The logging capability handed to the registry and the dispatcher.
//!
//! The engine never installs a global subscriber. A [`Logger`] either carries its own
//! [`Dispatch`], under which every dispatch runs, or defers to whatever subscriber is
//! current where the request is served.

use std::fmt;
use tracing::instrument::{WithDispatch, WithSubscriber};
use tracing::{Dispatch, Level, Subscriber};
use tracing_subscriber::FmtSubscriber;

#[derive(Clone, Default)]
pub struct Logger {
    dispatch: Option<Dispatch>,
}

impl Logger {
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch: Some(dispatch) }
    }

    pub fn from_subscriber<S>(subscriber: S) -> Self
    where
        S: Subscriber + Send + Sync + 'static,
    {
        Self::new(Dispatch::new(subscriber))
    }

    /// Logs to the subscriber current at the point of use.
    pub fn current() -> Self {
        Self { dispatch: None }
    }

    /// A human readable logger writing to stdout up to `level`.
    pub fn fmt(level: Level) -> Self {
        Self::from_subscriber(FmtSubscriber::builder().with_max_level(level).finish())
    }

    pub fn dispatch(&self) -> Option<&Dispatch> {
        self.dispatch.as_ref()
    }

    /// Runs `f` with this logger as the default subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    /// Attaches this logger to `future`, it is the default subscriber each time the future is polled.
    pub fn scope<F: Future>(&self, future: F) -> WithDispatch<F> {
        match &self.dispatch {
            Some(dispatch) => future.with_subscriber(dispatch.clone()),
            None => future.with_current_subscriber(),
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("injected", &self.dispatch.is_some()).finish()
    }
}
