//! A registered filter: an optional path rule, an optional method set and a handler.
//!
//! Filters are immutable once registered and shared by every in-flight request.

use crate::handler::SharedHandler;
use crate::rule::Rule;
use http::{Method, Request};
use std::fmt;

pub struct Filter<X = ()> {
    rule: Option<Rule>,
    allowed_methods: Option<Vec<Method>>,
    handler: SharedHandler<X>,
}

impl<X: Send + 'static> Filter<X> {
    /// Creates a filter guarded by `rule`; the empty string gives a ruleless filter.
    pub fn new(rule: &str, handler: SharedHandler<X>) -> Self {
        Self { rule: Rule::compile(rule), allowed_methods: None, handler }
    }

    /// Creates a filter that only runs as the follower of the filter before it.
    pub fn ruleless(handler: SharedHandler<X>) -> Self {
        Self { rule: None, allowed_methods: None, handler }
    }

    /// Restricts the filter to the given methods. An empty set admits no method at all.
    pub fn with_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.allowed_methods = Some(methods.into_iter().collect());
        self
    }

    pub fn rule(&self) -> Option<&Rule> {
        self.rule.as_ref()
    }

    pub fn allowed_methods(&self) -> Option<&[Method]> {
        self.allowed_methods.as_deref()
    }

    pub fn handler(&self) -> &SharedHandler<X> {
        &self.handler
    }

    #[inline]
    pub fn is_ruleless(&self) -> bool {
        self.rule.is_none()
    }

    /// Checks the method guard and the path rule against a request.
    pub fn is_valid<B>(&self, request: &Request<B>) -> bool {
        self.accepts(request.method(), request.uri().path())
    }

    /// Checks the method guard, then the path rule. A ruleless filter accepts any path.
    pub fn accepts(&self, method: &Method, path: &str) -> bool {
        if let Some(methods) = &self.allowed_methods {
            if !methods.contains(method) {
                return false;
            }
        }

        self.rule.as_ref().is_none_or(|rule| rule.matches(path))
    }
}

impl<X> fmt::Display for Filter<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rule {
            Some(rule) => write!(f, "{rule}")?,
            None => f.write_str("<ruleless>")?,
        }

        if let Some(methods) = &self.allowed_methods {
            let names = methods.iter().map(Method::as_str).collect::<Vec<_>>();
            write!(f, " [{}]", names.join(","))?;
        }
        Ok(())
    }
}

impl<X> fmt::Debug for Filter<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("rule", &self.rule)
            .field("allowed_methods", &self.allowed_methods)
            .finish_non_exhaustive()
    }
}
