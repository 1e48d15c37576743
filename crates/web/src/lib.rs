//! An HTTP filter chain engine.
//!
//! Requests are dispatched through an ordered list of filters. Each filter carries an
//! optional route rule, an optional method set and a handler; a handler either continues
//! the chain with [`RequestContext::proceed`] or ends it by returning.
//!
//! ```no_run
//! use maze_web::{FilterRegistry, Server, handler_fn};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = FilterRegistry::new();
//!     registry.push("", handler_fn(|ctx| Box::pin(async move {
//!         tracing::info!(path = ctx.path(), "requesting");
//!         ctx.proceed().await
//!     })));
//!     registry.get("/hello", handler_fn(|ctx| Box::pin(async move {
//!         ctx.reply("Hello World!");
//!         Ok(())
//!     })));
//!
//!     let server = Server::builder().dispatcher(registry.build()).address("127.0.0.1:8080").build().unwrap();
//!     server.start().await;
//! }
//! ```

mod body;
mod config;
mod dispatcher;
mod error;
mod extract;
mod filter;
mod handler;
mod log;
mod registry;
mod request;
mod responder;
mod response;
mod server;
mod values;

pub mod rpc;
pub mod rule;
pub mod sse;
pub mod static_files;

pub use body::ResponseBody;
pub use config::DecoderConfig;
pub use dispatcher::{ContextFactory, Dispatcher};
pub use error::{DecodeError, RpcError, ServerBuildError};
pub use filter::Filter;
pub use handler::{BoxError, FnHandler, Handler, HandlerResult, IntoHandlers, SharedHandler, handler_fn};
pub use log::Logger;
pub use registry::FilterRegistry;
pub use request::{Cursor, PathParams, RequestContext};
pub use response::{ResponseBuffer, ResponseWriter};
pub use rpc::JsonRpc;
pub use server::{Server, ServerBuilder};
pub use sse::{Event, SseBroker};
pub use static_files::StaticFiles;
pub use values::Values;
