//! The handler contract of the filter chain.
//!
//! A [`Handler`] receives the per-request [`RequestContext`] and decides whether the chain
//! continues: calling [`RequestContext::proceed`] runs the next matching filter, returning
//! without calling it stops the chain. An `Err` aborts the whole chain and reaches the
//! dispatcher unchanged.

use crate::RequestContext;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::error::Error;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub type BoxError = Box<dyn Error + Send + Sync>;

pub type HandlerResult = Result<(), BoxError>;

/// Handlers are shared between the filter list and every in-flight request.
pub type SharedHandler<X = ()> = Arc<dyn Handler<X>>;

#[async_trait]
pub trait Handler<X: Send + 'static = ()>: Send + Sync {
    async fn handle(&self, ctx: &mut RequestContext<X>) -> HandlerResult;
}

#[async_trait]
impl<X, H> Handler<X> for Arc<H>
where
    X: Send + 'static,
    H: Handler<X> + ?Sized,
{
    async fn handle(&self, ctx: &mut RequestContext<X>) -> HandlerResult {
        self.as_ref().handle(ctx).await
    }
}

/// a closure holder which represents a handler
pub struct FnHandler<F, X = ()> {
    f: F,
    _phantom: PhantomData<fn(X)>,
}

/// Creates a handler from a closure returning a boxed future.
///
/// ```
/// use maze_web::handler_fn;
///
/// let trace = handler_fn(|ctx| {
///     Box::pin(async move {
///         tracing::info!(path = ctx.path(), "requesting");
///         ctx.proceed().await
///     })
/// });
/// # let _: maze_web::FnHandler<_, ()> = trace;
/// ```
pub fn handler_fn<X, F>(f: F) -> FnHandler<F, X>
where
    X: Send + 'static,
    F: for<'a> Fn(&'a mut RequestContext<X>) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    FnHandler { f, _phantom: PhantomData }
}

#[async_trait]
impl<X, F> Handler<X> for FnHandler<F, X>
where
    X: Send + 'static,
    F: for<'a> Fn(&'a mut RequestContext<X>) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    async fn handle(&self, ctx: &mut RequestContext<X>) -> HandlerResult {
        (self.f)(ctx).await
    }
}

impl<F, X> fmt::Debug for FnHandler<F, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Conversion of one or more handlers into the list a registration appends.
///
/// The first handler carries the rule, the others become its ruleless sub-chain.
/// Implemented for [`FnHandler`], [`SharedHandler`], `Vec<SharedHandler>`, the unit type
/// (a group-only registration) and tuples of up to eight handlers.
pub trait IntoHandlers<X: Send + 'static> {
    fn into_handlers(self) -> Vec<SharedHandler<X>>;
}

impl<X: Send + 'static> IntoHandlers<X> for () {
    fn into_handlers(self) -> Vec<SharedHandler<X>> {
        Vec::new()
    }
}

impl<X, F> IntoHandlers<X> for FnHandler<F, X>
where
    X: Send + 'static,
    FnHandler<F, X>: Handler<X> + 'static,
{
    fn into_handlers(self) -> Vec<SharedHandler<X>> {
        vec![Arc::new(self)]
    }
}

impl<X: Send + 'static> IntoHandlers<X> for SharedHandler<X> {
    fn into_handlers(self) -> Vec<SharedHandler<X>> {
        vec![self]
    }
}

impl<X: Send + 'static> IntoHandlers<X> for Vec<SharedHandler<X>> {
    fn into_handlers(self) -> Vec<SharedHandler<X>> {
        self
    }
}

/// impl `IntoHandlers` for tuples, from 1 handler to 8 handlers
macro_rules! impl_into_handlers_for_tuple ({ $($param:ident)* } => {
    impl<X, $($param,)*> IntoHandlers<X> for ($($param,)*)
    where
        X: Send + 'static,
        $($param: Handler<X> + 'static,)*
    {
        #[inline]
        #[allow(non_snake_case, reason = "the type parameters name the tuple elements")]
        fn into_handlers(self) -> Vec<SharedHandler<X>> {
            let ($($param,)*) = self;
            vec![$(Arc::new($param) as SharedHandler<X>,)*]
        }
    }
});

impl_into_handlers_for_tuple! { A }
impl_into_handlers_for_tuple! { A B }
impl_into_handlers_for_tuple! { A B C }
impl_into_handlers_for_tuple! { A B C D }
impl_into_handlers_for_tuple! { A B C D E }
impl_into_handlers_for_tuple! { A B C D E F }
impl_into_handlers_for_tuple! { A B C D E F G }
impl_into_handlers_for_tuple! { A B C D E F G H }
