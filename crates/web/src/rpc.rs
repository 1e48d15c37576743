//! JSON-RPC style services built from an explicit action table.
//!
//! A service groups typed actions under one path: the action `create` of the service
//! `order` answers on `order/create`. Each action reads its parameter from the JSON request
//! body and writes its result as JSON.
//!
//! ```
//! use futures::FutureExt;
//! use maze_web::{FilterRegistry, JsonRpc, RequestContext};
//!
//! # fn main() -> Result<(), maze_web::RpcError> {
//! let rpc = JsonRpc::new("calc")
//!     .action("add", |_ctx: &mut RequestContext, (a, b): (i64, i64)| async move { Ok(a + b) }.boxed())?
//!     .action("neg", |_ctx: &mut RequestContext, a: i64| async move { Ok(-a) }.boxed())?;
//!
//! let mut registry = FilterRegistry::new();
//! registry.push_rpc(rpc);
//! assert_eq!(registry.filters()[0].rule().unwrap().to_string(), "/calc/add");
//! # Ok(())
//! # }
//! ```

use crate::error::RpcError;
use crate::handler::{BoxError, Handler, HandlerResult, IntoHandlers, SharedHandler};
use crate::registry::FilterRegistry;
use crate::RequestContext;
use async_trait::async_trait;
use futures::future::BoxFuture;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error};

pub struct JsonRpc<X = ()> {
    service_path: String,
    filters: Vec<SharedHandler<X>>,
    actions: Vec<Action<X>>,
}

struct Action<X> {
    name: String,
    filters: Vec<SharedHandler<X>>,
    call: SharedHandler<X>,
}

impl<X: Send + 'static> JsonRpc<X> {
    /// Creates a service answering below `service_path`; a relative path composes with the
    /// current group of the registry.
    pub fn new(service_path: impl Into<String>) -> Self {
        let service_path = service_path.into().trim_end_matches('/').to_owned();
        Self { service_path, filters: Vec::new(), actions: Vec::new() }
    }

    pub fn service_path(&self) -> &str {
        &self.service_path
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|action| action.name.as_str())
    }

    /// Sets the filters running before any action of the service.
    pub fn with_filters(mut self, handlers: impl IntoHandlers<X>) -> Self {
        self.filters = handlers.into_handlers();
        self
    }

    /// Adds an action. The parameter is the decoded JSON body, an empty body decodes as `null`.
    pub fn action<F, P, R>(mut self, name: impl Into<String>, f: F) -> Result<Self, RpcError>
    where
        F: for<'a> Fn(&'a mut RequestContext<X>, P) -> BoxFuture<'a, Result<R, BoxError>> + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
    {
        let name = name.into();
        if name.is_empty() || name.starts_with(['/', '*']) {
            return Err(RpcError::InvalidActionName { name });
        }
        if self.actions.iter().any(|action| action.name == name) {
            return Err(RpcError::DuplicatedAction { name });
        }

        let call = Call { f, _phantom: PhantomData };
        self.actions.push(Action { name, filters: Vec::new(), call: Arc::new(call) });
        Ok(self)
    }

    /// Sets the filters running before the call of one action.
    pub fn action_filters(mut self, name: &str, handlers: impl IntoHandlers<X>) -> Result<Self, RpcError> {
        let Some(action) = self.actions.iter_mut().find(|action| action.name == name) else {
            return Err(RpcError::UnknownAction { name: name.to_owned() });
        };
        action.filters = handlers.into_handlers();
        Ok(self)
    }
}

impl<X> fmt::Debug for JsonRpc<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRpc")
            .field("service_path", &self.service_path)
            .field("actions", &self.actions.iter().map(|action| action.name.as_str()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<X: Send + 'static> FilterRegistry<X> {
    /// Registers a service: its filters on `<service>/*`, one filter sub-chain per action on
    /// `<service>/<action>`, then a guard answering `404` for unknown actions.
    ///
    /// The service path goes through the same group composition as any other rule.
    pub fn push_rpc(&mut self, rpc: JsonRpc<X>) -> &mut Self {
        let group = self.resolve(&format!("{}/*", rpc.service_path));

        self.push(&group, rpc.filters);
        for action in rpc.actions {
            debug!(service = %group, action = %action.name, "register rpc action");
            let mut handlers = action.filters;
            handlers.push(action.call);
            self.push(&action.name, handlers);
        }

        let guard: SharedHandler<X> = Arc::new(UnknownService);
        self.push(&group, guard)
    }
}

struct Call<F, P, R> {
    f: F,
    _phantom: PhantomData<fn(P) -> R>,
}

#[async_trait]
impl<X, F, P, R> Handler<X> for Call<F, P, R>
where
    X: Send + 'static,
    F: for<'a> Fn(&'a mut RequestContext<X>, P) -> BoxFuture<'a, Result<R, BoxError>> + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    async fn handle(&self, ctx: &mut RequestContext<X>) -> HandlerResult {
        let param = ctx.payload::<P>().inspect_err(|e| {
            error!(cause = %e, path = ctx.path(), "can't decode the rpc call");
        })?;

        let result = (self.f)(ctx, param).await?;

        ctx.json(StatusCode::OK, &result).inspect_err(|e| {
            error!(cause = %e, path = ctx.path(), "can't encode the rpc result");
        })?;
        Ok(())
    }
}

struct UnknownService;

#[async_trait]
impl<X: Send + 'static> Handler<X> for UnknownService {
    async fn handle(&self, ctx: &mut RequestContext<X>) -> HandlerResult {
        let message = format!("Unknown Service {}", ctx.path());
        ctx.text(StatusCode::NOT_FOUND, message);
        Ok(())
    }
}
