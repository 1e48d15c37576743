//! The request time entry point of the engine.

use crate::body::ResponseBody;
use crate::config::DecoderConfig;
use crate::filter::Filter;
use crate::log::Logger;
use crate::RequestContext;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode};
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, debug_span, error};

/// Builds the extension of every new [`RequestContext`].
///
/// Any `Fn(&Request<Bytes>) -> X` closure is a factory.
pub trait ContextFactory<X: Send + 'static>: Send + Sync {
    fn create(&self, request: &Request<Bytes>) -> X;
}

impl<X, F> ContextFactory<X> for F
where
    X: Send + 'static,
    F: Fn(&Request<Bytes>) -> X + Send + Sync,
{
    fn create(&self, request: &Request<Bytes>) -> X {
        self(request)
    }
}

/// Drives one request through the frozen filter list.
pub struct Dispatcher<X = ()> {
    filters: Arc<[Filter<X>]>,
    factory: Box<dyn ContextFactory<X>>,
    config: Arc<DecoderConfig>,
    logger: Logger,
}

impl<X: Send + 'static> Dispatcher<X> {
    pub fn new(filters: Arc<[Filter<X>]>, factory: Box<dyn ContextFactory<X>>) -> Self {
        Self { filters, factory, config: Arc::new(DecoderConfig::default()), logger: Logger::current() }
    }

    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn filters(&self) -> &[Filter<X>] {
        &self.filters
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Runs the chain for `request`.
    ///
    /// Returns `None` when no filter is registered at all, leaving the response to the
    /// transport. A handler error becomes a `500` carrying the error message.
    pub async fn dispatch(&self, request: Request<Bytes>) -> Option<Response<ResponseBody>> {
        if self.filters.is_empty() {
            return None;
        }

        let span = self.logger.in_scope(|| debug_span!("dispatch", method = %request.method(), path = request.uri().path()));

        let extension = self.factory.create(&request);
        let mut ctx =
            RequestContext::new(Arc::clone(&self.filters), request, extension, Arc::clone(&self.config), self.logger.clone());

        let outcome = self.logger.scope(ctx.proceed().instrument(span)).await;
        match outcome {
            Ok(()) => Some(ctx.into_response()),
            Err(e) => {
                self.logger.in_scope(|| error!(cause = %e, path = ctx.path(), "filter chain failed"));
                Some(internal_error(&e.to_string()))
            }
        }
    }
}

fn internal_error(message: &str) -> Response<ResponseBody> {
    let mut response = Response::new(ResponseBody::from(format!("{message}\n")));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

impl<X> fmt::Debug for Dispatcher<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("filters", &self.filters.len())
            .field("config", &self.config)
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}
