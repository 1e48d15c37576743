//! The per-request traversal state.
//!
//! This module contains the core types a handler works with:
//! - `RequestContext`: the cursor over the filter chain, the request, the response sink and
//!   the request scoped attributes
//! - `Cursor`: the position of a context in its chain
//! - `PathParams`: the values captured by a template rule

use crate::body::ResponseBody;
use crate::config::DecoderConfig;
use crate::filter::Filter;
use crate::handler::HandlerResult;
use crate::log::Logger;
use crate::response::ResponseWriter;
use crate::values::Values;
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, Uri};
use percent_encoding::percent_decode_str;
use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Position of a [`RequestContext`] in its filter chain.
///
/// Transitions only move forward: `Unstarted -> At(0) -> ... -> At(n - 1) -> Exhausted`,
/// where the scan may jump over several positions at once. `Exhausted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Unstarted,
    At(usize),
    Exhausted,
}

impl Cursor {
    /// Moves one position forward in a chain of `len` filters.
    #[inline]
    fn advance(self, len: usize) -> Cursor {
        let next = match self {
            Cursor::Unstarted => 0,
            Cursor::At(index) => index + 1,
            Cursor::Exhausted => return Cursor::Exhausted,
        };

        if next < len { Cursor::At(next) } else { Cursor::Exhausted }
    }

    /// The filter index, when positioned.
    #[inline]
    pub fn index(self) -> Option<usize> {
        match self {
            Cursor::At(index) => Some(index),
            Cursor::Unstarted | Cursor::Exhausted => None,
        }
    }

    #[inline]
    pub fn is_exhausted(self) -> bool {
        self == Cursor::Exhausted
    }
}

/// The percent-decoded request path that rules are matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RoutePath {
    Pending,
    Decoded(String),
    // not valid UTF-8 once decoded, no rule matches it
    Invalid,
}

impl RoutePath {
    fn decode(raw: &str) -> RoutePath {
        match percent_decode_str(raw).decode_utf8() {
            Ok(path) => RoutePath::Decoded(path.into_owned()),
            Err(e) => {
                debug!(path = raw, cause = %e, "request path is not valid UTF-8");
                RoutePath::Invalid
            }
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            RoutePath::Decoded(path) => Some(path),
            RoutePath::Pending | RoutePath::Invalid => None,
        }
    }
}

/// Context of a single in-flight request.
///
/// A context is created by the dispatcher for each request and owned by the task serving
/// it. It walks the shared, immutable filter list with its own cursor, so no state is
/// shared between requests.
///
/// `X` is a caller defined extension, created per request by a
/// [`ContextFactory`](crate::ContextFactory).
pub struct RequestContext<X = ()> {
    filters: Arc<[Filter<X>]>,
    cursor: Cursor,
    // index of the last filter selected by the scan, its rule owns the path params
    matched: Option<usize>,

    request: Request<Bytes>,
    route_path: RoutePath,
    response: ResponseWriter,
    attributes: HashMap<Cow<'static, str>, Box<dyn Any + Send>>,

    path_params: Option<PathParams>,
    values: Option<Values>,

    config: Arc<DecoderConfig>,
    logger: Logger,
    extension: X,
}

impl<X: Send + 'static> RequestContext<X> {
    pub fn new(
        filters: Arc<[Filter<X>]>,
        request: Request<Bytes>,
        extension: X,
        config: Arc<DecoderConfig>,
        logger: Logger,
    ) -> Self {
        Self {
            filters,
            cursor: Cursor::Unstarted,
            matched: None,
            request,
            route_path: RoutePath::Pending,
            response: ResponseWriter::new(),
            attributes: HashMap::new(),
            path_params: None,
            values: None,
            config,
            logger,
            extension,
        }
    }

    /// Runs the next applicable filter.
    ///
    /// The cursor advances by one. A ruleless filter at the new position runs right away;
    /// otherwise the chain is scanned forward for the first filter whose method and path
    /// guards accept the request. When nothing is left the chain ends silently with `Ok`.
    ///
    /// The result of the executed handler is returned unchanged, so an error raised deep in
    /// the chain propagates through every nested `proceed` call.
    pub async fn proceed(&mut self) -> HandlerResult {
        self.cursor = self.cursor.advance(self.filters.len());
        let Some(position) = self.cursor.index() else {
            trace!("filter chain exhausted");
            return Ok(());
        };

        let filters = Arc::clone(&self.filters);
        let filter = &filters[position];
        if filter.is_ruleless() {
            debug!(position, "executing filter without rule");
            let handler = Arc::clone(filter.handler());
            return handler.handle(self).await;
        }

        let Some(index) = self.scan(position) else {
            trace!(from = position, "no filter matches, chain ends");
            self.cursor = Cursor::Exhausted;
            return Ok(());
        };

        self.select(index);
        let filter = &filters[index];
        debug!(filter = %filter, index, "executing filter");
        let handler = Arc::clone(filter.handler());
        handler.handle(self).await
    }

    /// Index of the first ruled filter at or after `from` that accepts the request.
    ///
    /// A plain loop over the index: chains may hold thousands of filters.
    fn scan(&mut self, from: usize) -> Option<usize> {
        self.decode_route_path();
        let method = self.request.method();
        let path = self.route_path.as_str()?;

        (from..self.filters.len()).find(|&index| {
            let filter = &self.filters[index];
            !filter.is_ruleless() && filter.accepts(method, path)
        })
    }

    fn select(&mut self, index: usize) {
        self.cursor = Cursor::At(index);
        if self.matched != Some(index) {
            self.matched = Some(index);
            self.path_params = None;
            self.values = None;
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// The filter the cursor currently points at.
    pub fn current_filter(&self) -> Option<&Filter<X>> {
        self.cursor.index().map(|index| &self.filters[index])
    }

    /// The last filter selected by rule matching; ruleless followers share its params.
    pub fn matched_filter(&self) -> Option<&Filter<X>> {
        self.matched.map(|index| &self.filters[index])
    }

    pub fn request(&self) -> &Request<Bytes> {
        &self.request
    }

    /// Mutable access to the request. The decoded path and the value caches are computed
    /// again on next use, so a rewritten URI takes part in the following scans.
    pub fn request_mut(&mut self) -> &mut Request<Bytes> {
        self.route_path = RoutePath::Pending;
        self.path_params = None;
        self.values = None;
        &mut self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    /// The raw request path, still percent-encoded.
    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    /// The percent-decoded request path rules are matched against, `None` if it does not
    /// decode to UTF-8.
    pub fn decoded_path(&mut self) -> Option<&str> {
        self.decode_route_path();
        self.route_path.as_str()
    }

    fn decode_route_path(&mut self) {
        if self.route_path == RoutePath::Pending {
            self.route_path = RoutePath::decode(self.request.uri().path());
        }
    }

    pub fn query(&self) -> Option<&str> {
        self.request.uri().query()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    pub fn body(&self) -> &Bytes {
        self.request.body()
    }

    pub fn response(&self) -> &ResponseWriter {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseWriter {
        &mut self.response
    }

    /// Swaps the response sink, returning the previous one.
    ///
    /// Callers that swap temporarily must restore the original on every exit path, see
    /// [`ResponseBuffer`](crate::ResponseBuffer).
    pub fn replace_response(&mut self, response: ResponseWriter) -> ResponseWriter {
        std::mem::replace(&mut self.response, response)
    }

    pub fn into_response(self) -> Response<ResponseBody> {
        self.response.into_response()
    }

    /// Gets a request scoped attribute, `None` if absent or of another type.
    pub fn attribute<T: Any>(&self, key: &str) -> Option<&T> {
        self.attributes.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    pub fn attribute_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.attributes.get_mut(key).and_then(|value| value.downcast_mut::<T>())
    }

    /// Sets a request scoped attribute, replacing any previous value under the key.
    pub fn set_attribute<T: Any + Send>(&mut self, key: impl Into<Cow<'static, str>>, value: T) {
        self.attributes.insert(key.into(), Box::new(value));
    }

    pub fn remove_attribute(&mut self, key: &str) -> bool {
        self.attributes.remove(key).is_some()
    }

    pub fn extension(&self) -> &X {
        &self.extension
    }

    pub fn extension_mut(&mut self) -> &mut X {
        &mut self.extension
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Values captured by the template rule of the matched filter.
    ///
    /// Computed on first access and cached until the scan selects another filter.
    pub fn path_params(&mut self) -> &PathParams {
        if self.path_params.is_none() {
            self.decode_route_path();
            let params = self
                .matched
                .and_then(|index| self.filters[index].rule())
                .zip(self.route_path.as_str())
                .and_then(|(rule, path)| rule.captures(path))
                .unwrap_or_else(PathParams::empty);
            self.path_params = Some(params);
        }

        self.path_params.get_or_insert_with(PathParams::empty)
    }

    /// Path values merged with the query values; a query value replaces a path value of the
    /// same name.
    pub fn values(&mut self) -> &Values {
        if self.values.is_none() {
            let mut values = Values::from(self.path_params());
            if let Some(query) = self.request.uri().query() {
                values.merge(Values::parse_query(query));
            }
            self.values = Some(values);
        }

        self.values.get_or_insert_with(Values::new)
    }
}

impl<X> fmt::Debug for RequestContext<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .field("cursor", &self.cursor)
            .field("matched", &self.matched)
            .field("filters", &self.filters.len())
            .finish_non_exhaustive()
    }
}

/// Represents values captured from the URL path by a template rule.
///
/// For the rule `/users/:id`, the path `/users/42` captures `id = "42"`. If a name occurs
/// twice in a rule, the first captured value wins on lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    entries: Vec<(String, String)>,
}

impl PathParams {
    /// Creates an empty PathParams instance with no parameters
    #[inline]
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn push(&mut self, name: String, value: String) {
        self.entries.push((name, value));
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Gets the value of a path parameter by its name
    /// Returns None if the parameter doesn't exist
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.entries.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{BoxError, SharedHandler, handler_fn};
    use futures::FutureExt;
    use std::sync::Mutex;

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    fn record(trace: &Trace, name: &'static str, proceed: bool) -> SharedHandler {
        let trace = Arc::clone(trace);
        Arc::new(handler_fn(move |ctx: &mut RequestContext| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().unwrap().push(name);
                if proceed { ctx.proceed().await } else { Ok(()) }
            }
            .boxed()
        }))
    }

    fn context(filters: Vec<Filter>, method: Method, uri: &str) -> RequestContext {
        let request = Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap();
        RequestContext::new(filters.into(), request, (), Arc::new(DecoderConfig::default()), Logger::current())
    }

    #[test]
    fn cursor_advances_and_pins() {
        assert_eq!(Cursor::Unstarted.advance(2), Cursor::At(0));
        assert_eq!(Cursor::At(0).advance(2), Cursor::At(1));
        assert_eq!(Cursor::At(1).advance(2), Cursor::Exhausted);
        assert_eq!(Cursor::Exhausted.advance(2), Cursor::Exhausted);
        assert_eq!(Cursor::Unstarted.advance(0), Cursor::Exhausted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn first_matching_filter_wins() {
        let trace = Trace::default();
        let filters = vec![
            Filter::new("/other", record(&trace, "other", true)),
            Filter::new("/a/*", record(&trace, "prefix", false)),
            Filter::new("/a/b", record(&trace, "exact", false)),
        ];

        let mut ctx = context(filters, Method::GET, "/a/b");
        ctx.proceed().await.unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["prefix"]);
        assert_eq!(ctx.cursor(), Cursor::At(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn skipped_filters_are_not_revisited() {
        let trace = Trace::default();
        let filters = vec![
            Filter::new("/x", record(&trace, "x1", true)),
            Filter::new("/y", record(&trace, "y", true)),
            Filter::new("/x", record(&trace, "x2", true)),
        ];

        let mut ctx = context(filters, Method::GET, "/x");
        ctx.proceed().await.unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["x1", "x2"]);
        assert_eq!(ctx.cursor(), Cursor::Exhausted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn ruleless_followers_run_only_after_their_head() {
        let trace = Trace::default();
        let filters = vec![
            Filter::new("/hi", record(&trace, "hi", true)),
            Filter::ruleless(record(&trace, "hi-follower", true)),
            Filter::new("/hello", record(&trace, "hello", true)),
            Filter::ruleless(record(&trace, "hello-follower", true)),
        ];

        let mut ctx = context(filters, Method::GET, "/hello");
        ctx.proceed().await.unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["hello", "hello-follower"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn method_guard_skips_filter() {
        let trace = Trace::default();
        let filters = vec![
            Filter::new("/hello", record(&trace, "get", true)).with_methods([Method::GET]),
            Filter::new("/hello", record(&trace, "any", true)),
        ];

        let mut ctx = context(filters, Method::POST, "/hello");
        ctx.proceed().await.unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["any"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn handler_without_proceed_short_circuits() {
        let trace = Trace::default();
        let filters = vec![Filter::ruleless(record(&trace, "stop", false)), Filter::ruleless(record(&trace, "never", true))];

        let mut ctx = context(filters, Method::GET, "/");
        ctx.proceed().await.unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["stop"]);
        assert_eq!(ctx.cursor(), Cursor::At(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn proceed_on_exhausted_is_idempotent() {
        let trace = Trace::default();
        let mut ctx = context(vec![Filter::ruleless(record(&trace, "only", false))], Method::GET, "/");

        ctx.proceed().await.unwrap();
        ctx.proceed().await.unwrap();
        assert_eq!(ctx.cursor(), Cursor::Exhausted);

        ctx.proceed().await.unwrap();
        assert_eq!(ctx.cursor(), Cursor::Exhausted);
        assert_eq!(*trace.lock().unwrap(), vec!["only"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn empty_chain_ends_silently() {
        let mut ctx = context(Vec::new(), Method::GET, "/");
        ctx.proceed().await.unwrap();
        assert!(ctx.cursor().is_exhausted());
        assert!(ctx.current_filter().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn handler_error_propagates_through_nested_proceed() {
        let trace = Trace::default();
        let failing: SharedHandler = Arc::new(handler_fn(|_ctx: &mut RequestContext| {
            async move { Err::<(), BoxError>("boom".into()) }.boxed()
        }));
        let filters = vec![Filter::ruleless(record(&trace, "outer", true)), Filter::new("/fail", failing)];

        let mut ctx = context(filters, Method::GET, "/fail");
        let error = ctx.proceed().await.unwrap_err();

        assert_eq!(error.to_string(), "boom");
        assert_eq!(*trace.lock().unwrap(), vec!["outer"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn long_chain_scan_does_not_grow_the_stack() {
        let trace = Trace::default();
        let mut filters = (0..20_000).map(|i| Filter::new(&format!("/route/{i}"), record(&trace, "miss", true))).collect::<Vec<_>>();
        filters.push(Filter::new("/target", record(&trace, "target", false)));

        let mut ctx = context(filters, Method::GET, "/target");
        ctx.proceed().await.unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["target"]);
        assert_eq!(ctx.cursor(), Cursor::At(20_000));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn path_params_follow_the_matched_filter() {
        let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::default();
        let capture = |seen: &Arc<Mutex<Vec<Option<String>>>>, proceed: bool| -> SharedHandler {
            let seen = Arc::clone(seen);
            Arc::new(handler_fn(move |ctx: &mut RequestContext| {
                let seen = Arc::clone(&seen);
                async move {
                    let id = ctx.path_params().get("id").map(str::to_owned);
                    seen.lock().unwrap().push(id);
                    if proceed { ctx.proceed().await } else { Ok(()) }
                }
                .boxed()
            }))
        };

        let filters = vec![
            Filter::new("/users/*", capture(&seen, true)),
            Filter::new("/users/:id", capture(&seen, true)),
            Filter::ruleless(capture(&seen, false)),
        ];

        let mut ctx = context(filters, Method::GET, "/users/42");
        ctx.proceed().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![None, Some("42".to_owned()), Some("42".to_owned())]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn params_are_captured_decoded() {
        let mut ctx = context(vec![Filter::new("/users/:name", record(&Trace::default(), "user", false))], Method::GET, "/users/john%20doe");
        ctx.proceed().await.unwrap();

        assert_eq!(ctx.cursor(), Cursor::At(0));
        assert_eq!(ctx.path(), "/users/john%20doe");
        assert_eq!(ctx.decoded_path(), Some("/users/john doe"));
        assert_eq!(ctx.path_params().get("name"), Some("john doe"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn non_ascii_rule_matches_encoded_path() {
        let trace = Trace::default();
        let mut ctx = context(vec![Filter::new("/café", record(&trace, "cafe", false))], Method::GET, "/caf%C3%A9");
        ctx.proceed().await.unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["cafe"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn invalid_utf8_path_matches_no_rule() {
        let trace = Trace::default();
        let filters = vec![
            Filter::ruleless(record(&trace, "ruleless", true)),
            Filter::new("/*", record(&trace, "catch-all", false)),
        ];

        let mut ctx = context(filters, Method::GET, "/bad%FF");
        ctx.proceed().await.unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["ruleless"]);
        assert!(ctx.cursor().is_exhausted());
        assert!(ctx.decoded_path().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn rewritten_uri_is_routed() {
        let trace = Trace::default();
        let rewrite: SharedHandler = Arc::new(handler_fn(|ctx: &mut RequestContext| {
            async move {
                *ctx.request_mut().uri_mut() = Uri::from_static("/new");
                ctx.proceed().await
            }
            .boxed()
        }));
        let filters = vec![
            Filter::ruleless(rewrite),
            Filter::new("/old", record(&trace, "old", false)),
            Filter::new("/new", record(&trace, "new", false)),
        ];

        let mut ctx = context(filters, Method::GET, "/old");
        ctx.proceed().await.unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["new"]);
    }

    #[test]
    fn values_merge_path_and_query() {
        let handler: SharedHandler = Arc::new(handler_fn(|_ctx: &mut RequestContext| async { Ok::<(), BoxError>(()) }.boxed()));
        let mut ctx = context(vec![Filter::new("/items/:id/:kind", handler)], Method::GET, "/items/7/book?kind=dvd&page=2");
        ctx.select(0);

        let values = ctx.values();
        assert_eq!(values.get("id"), Some("7"));
        assert_eq!(values.get("kind"), Some("dvd"));
        assert_eq!(values.parse::<u32>("page"), Some(2));
    }

    #[test]
    fn attributes_are_typed() {
        let mut ctx = context(Vec::new(), Method::GET, "/");
        ctx.set_attribute("user", String::from("ana"));
        ctx.set_attribute("count", 3_u32);

        assert_eq!(ctx.attribute::<String>("user").map(String::as_str), Some("ana"));
        assert_eq!(ctx.attribute::<u32>("count"), Some(&3));
        assert_eq!(ctx.attribute::<u64>("count"), None);

        *ctx.attribute_mut::<u32>("count").unwrap() += 1;
        assert_eq!(ctx.attribute::<u32>("count"), Some(&4));

        assert!(ctx.remove_attribute("user"));
        assert!(ctx.attribute::<String>("user").is_none());
    }

    #[test]
    fn context_is_send() {
        fn check_send<T: Send>() {}
        check_send::<RequestContext>();
    }

    #[allow(dead_code, reason = "compile time check of the handler future")]
    fn proceed_future_is_send(ctx: &mut RequestContext) -> impl std::future::Future<Output = HandlerResult> + Send + '_ {
        ctx.proceed()
    }
}
