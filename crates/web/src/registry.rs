//! Setup-time registration of filters.
//!
//! A [`FilterRegistry`] collects filters in registration order and is consumed into a
//! [`Dispatcher`] once setup is done; the resulting filter list cannot change anymore.
//!
//! Relative rules compose with the last group rule:
//!
//! ```
//! # use maze_web::{FilterRegistry, handler_fn};
//! let mut registry = FilterRegistry::new();
//! registry.push("/greet/*", ());
//! registry.get("sayhi/:id", handler_fn(|ctx| Box::pin(async move { ctx.proceed().await })));
//!
//! assert_eq!(registry.filters()[0].rule().unwrap().to_string(), "/greet/sayhi/:id");
//! ```

use crate::dispatcher::{ContextFactory, Dispatcher};
use crate::filter::Filter;
use crate::handler::IntoHandlers;
use crate::log::Logger;
use crate::rule::{SEPARATOR, WILDCARD};
use http::Method;
use std::fmt;
use tracing::debug;

pub struct FilterRegistry<X = ()> {
    filters: Vec<Filter<X>>,
    // the last group rule with its trailing wildcard stripped
    last_prefix: Option<String>,
    logger: Logger,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<X: Send + 'static> Default for FilterRegistry<X> {
    fn default() -> Self {
        Self { filters: Vec::new(), last_prefix: None, logger: Logger::current() }
    }
}

macro_rules! method_registrar {
    ($method:ident, $method_const:expr) => {
        #[doc = concat!("Registers handlers for `", stringify!($method_const), "` requests only.")]
        pub fn $method(&mut self, rule: &str, handlers: impl IntoHandlers<X>) -> &mut Self {
            self.push_method(Some(vec![$method_const]), rule, handlers)
        }
    };
}

impl<X: Send + 'static> FilterRegistry<X> {
    /// Creates a registry for contexts carrying the extension `X`.
    pub fn with_extension() -> Self {
        Self::default()
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    method_registrar!(get, Method::GET);
    method_registrar!(post, Method::POST);
    method_registrar!(put, Method::PUT);
    method_registrar!(delete, Method::DELETE);
    method_registrar!(patch, Method::PATCH);

    /// Registers handlers for any method.
    pub fn push(&mut self, rule: &str, handlers: impl IntoHandlers<X>) -> &mut Self {
        self.push_method(None, rule, handlers)
    }

    /// Registers handlers under `rule`, composed with the current group, for the given methods.
    ///
    /// The first handler carries the rule and the methods, the following ones are appended as
    /// ruleless filters and run as its sub-chain. Without handlers only the group changes.
    pub fn push_method(&mut self, methods: Option<Vec<Method>>, rule: &str, handlers: impl IntoHandlers<X>) -> &mut Self {
        let rule = self.resolve(rule);
        let mut handlers = handlers.into_handlers().into_iter();

        let Some(head) = handlers.next() else {
            self.logger.in_scope(|| debug!(rule = %rule, "register group"));
            return self;
        };

        let filter = match methods {
            Some(methods) => Filter::new(&rule, head).with_methods(methods),
            None => Filter::new(&rule, head),
        };
        self.logger.in_scope(|| debug!(filter = %filter, followers = handlers.len(), "register filter"));

        self.filters.push(filter);
        self.filters.extend(handlers.map(Filter::ruleless));
        self
    }

    /// Applies the group rules to `rule` and updates the current group.
    pub(crate) fn resolve(&mut self, rule: &str) -> String {
        if rule.is_empty() {
            return String::new();
        }

        if rule.starts_with(SEPARATOR) {
            self.last_prefix = rule.strip_suffix(WILDCARD).map(str::to_owned);
            return rule.to_owned();
        }

        if rule.starts_with(WILDCARD) {
            return rule.to_owned();
        }

        match &self.last_prefix {
            Some(prefix) => format!("{prefix}{rule}"),
            None => format!("{SEPARATOR}{rule}"),
        }
    }

    /// Appends prebuilt filters as they are, groups are neither applied nor changed.
    pub fn add(&mut self, filters: impl IntoIterator<Item = Filter<X>>) -> &mut Self {
        self.filters.extend(filters);
        self
    }

    pub fn filters(&self) -> &[Filter<X>] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Freezes the filters into a dispatcher creating extensions with `factory`.
    pub fn build_with<F>(self, factory: F) -> Dispatcher<X>
    where
        F: ContextFactory<X> + 'static,
    {
        Dispatcher::new(self.filters.into(), Box::new(factory)).with_logger(self.logger)
    }

    /// Freezes the filters into a dispatcher creating default extensions.
    pub fn build(self) -> Dispatcher<X>
    where
        X: Default,
    {
        self.build_with(|_: &http::Request<bytes::Bytes>| X::default())
    }
}

impl<X> fmt::Debug for FilterRegistry<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.filters)
            .field("last_prefix", &self.last_prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{BoxError, SharedHandler, handler_fn};
    use crate::rule::RuleShape;
    use crate::RequestContext;
    use futures::FutureExt;
    use std::sync::Arc;

    fn proceed() -> SharedHandler {
        Arc::new(handler_fn(|ctx: &mut RequestContext| ctx.proceed().boxed()))
    }

    fn noop() -> SharedHandler {
        Arc::new(handler_fn(|_ctx: &mut RequestContext| async { Ok::<(), BoxError>(()) }.boxed()))
    }

    fn rules(registry: &FilterRegistry) -> Vec<Option<String>> {
        registry.filters().iter().map(|filter| filter.rule().map(ToString::to_string)).collect()
    }

    #[test]
    fn group_then_relative_rule() {
        let mut registry = FilterRegistry::new();
        registry.push("/greet/*", ());
        registry.get("sayhi/:id", proceed());

        let mut direct = FilterRegistry::new();
        direct.get("/greet/sayhi/:id", proceed());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.filters()[0].rule(), direct.filters()[0].rule());
        assert_eq!(registry.filters()[0].rule().unwrap().shape(), RuleShape::Template);
        assert_eq!(registry.filters()[0].allowed_methods(), Some(&[Method::GET][..]));
    }

    #[test]
    fn relative_rule_without_group_is_rooted() {
        let mut registry = FilterRegistry::new();
        registry.push("hello", noop());
        assert_eq!(rules(&registry), vec![Some("/hello".to_owned())]);
    }

    #[test]
    fn absolute_rule_clears_group() {
        let mut registry = FilterRegistry::new();
        registry.push("/api/*", noop());
        registry.push("users", noop());
        registry.push("/health", noop());
        registry.push("status", noop());

        assert_eq!(
            rules(&registry),
            vec![
                Some("/api/*".to_owned()),
                Some("/api/users".to_owned()),
                Some("/health".to_owned()),
                Some("/status".to_owned()),
            ]
        );
    }

    #[test]
    fn suffix_wildcard_keeps_group() {
        let mut registry = FilterRegistry::new();
        registry.push("/static/*", ());
        registry.push("*.js", noop());
        registry.push("app.css", noop());

        assert_eq!(rules(&registry), vec![Some("*.js".to_owned()), Some("/static/app.css".to_owned())]);
    }

    #[test]
    fn followers_are_ruleless() {
        let mut registry = FilterRegistry::new();
        registry.post("/items", (noop(), noop(), noop()));

        assert_eq!(rules(&registry), vec![Some("/items".to_owned()), None, None]);
        assert_eq!(registry.filters()[0].allowed_methods(), Some(&[Method::POST][..]));
        assert!(registry.filters()[1].allowed_methods().is_none());
    }

    #[test]
    fn empty_rule_is_ruleless() {
        let mut registry = FilterRegistry::new();
        registry.push("/api/*", ());
        registry.push("", noop());
        registry.push("users", noop());

        assert_eq!(rules(&registry), vec![None, Some("/api/users".to_owned())]);
    }

    #[test]
    fn method_registrars() {
        let mut registry = FilterRegistry::new();
        registry.get("/r", noop()).post("/r", noop()).put("/r", noop()).delete("/r", noop()).patch("/r", noop());
        registry.push_method(Some(vec![Method::HEAD, Method::OPTIONS]), "/r", noop());

        let methods = registry.filters().iter().map(|filter| filter.allowed_methods().unwrap().to_vec()).collect::<Vec<_>>();
        assert_eq!(
            methods,
            vec![
                vec![Method::GET],
                vec![Method::POST],
                vec![Method::PUT],
                vec![Method::DELETE],
                vec![Method::PATCH],
                vec![Method::HEAD, Method::OPTIONS],
            ]
        );
    }

    #[test]
    fn empty_method_list_differs_from_none() {
        let mut registry = FilterRegistry::new();
        registry.push_method(Some(Vec::new()), "/closed", noop());
        registry.push_method(None, "/open", noop());

        let filters = registry.filters();
        assert_eq!(filters[0].allowed_methods(), Some(&[][..]));
        assert!(!filters[0].accepts(&Method::GET, "/closed"));
        assert!(filters[1].allowed_methods().is_none());
        assert!(filters[1].accepts(&Method::DELETE, "/open"));
    }

    #[test]
    fn add_keeps_filters_verbatim() {
        let mut registry = FilterRegistry::new();
        registry.push("/api/*", ());
        registry.add([Filter::new("raw", noop()), Filter::ruleless(noop())]);

        assert_eq!(rules(&registry), vec![Some("raw".to_owned()), None]);
    }
}
