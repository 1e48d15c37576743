//! HTTP/1 transport glue around a [`Dispatcher`].

use crate::body::ResponseBody;
use crate::dispatcher::Dispatcher;
use crate::error::ServerBuildError;
use crate::handler::BoxError;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, Limited, LengthLimitError};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

pub struct ServerBuilder<X = ()> {
    dispatcher: Option<Dispatcher<X>>,
    address: Option<io::Result<Vec<SocketAddr>>>,
}

impl<X: Send + 'static> ServerBuilder<X> {
    fn new() -> Self {
        Self { dispatcher: None, address: None }
    }

    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = Some(address.to_socket_addrs().map(Iterator::collect));
        self
    }

    pub fn dispatcher(mut self, dispatcher: Dispatcher<X>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn build(self) -> Result<Server<X>, ServerBuildError> {
        let dispatcher = self.dispatcher.ok_or(ServerBuildError::MissingDispatcher)?;
        let address = self.address.ok_or(ServerBuildError::MissingAddress)??;
        Ok(Server { dispatcher: Arc::new(dispatcher), address })
    }
}

pub struct Server<X = ()> {
    dispatcher: Arc<Dispatcher<X>>,
    address: Vec<SocketAddr>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }
}

impl<X: Send + 'static> Server<X> {
    pub fn builder_with_extension() -> ServerBuilder<X> {
        ServerBuilder::new()
    }

    /// Binds the configured address and serves until the process ends.
    pub async fn start(self) {
        let logger = self.dispatcher.logger().clone();
        logger
            .scope(async move {
                info!("start listening at {:?}", self.address);
                let tcp_listener = match TcpListener::bind(self.address.as_slice()).await {
                    Ok(tcp_listener) => tcp_listener,
                    Err(e) => {
                        error!(cause = %e, "bind server error");
                        return;
                    }
                };

                self.serve(tcp_listener).await;
            })
            .await;
    }

    /// Serves connections accepted on `tcp_listener`, one task per connection.
    pub async fn serve(self, tcp_listener: TcpListener) {
        let logger = self.dispatcher.logger().clone();
        loop {
            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let dispatcher = Arc::clone(&self.dispatcher);
            tokio::spawn(logger.scope(async move {
                let service = service_fn(move |request| {
                    let dispatcher = Arc::clone(&dispatcher);
                    async move { Ok::<_, Infallible>(respond(&dispatcher, request).await) }
                });

                match http1::Builder::new().serve_connection(TokioIo::new(tcp_stream), service).await {
                    Ok(()) => debug!(%remote_addr, "finished process, connection shutdown"),
                    Err(e) => error!(cause = %e, %remote_addr, "service has error, connection shutdown"),
                }
            }));
        }
    }
}

impl<X> fmt::Debug for ServerBuilder<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder").field("dispatcher", &self.dispatcher).field("address", &self.address).finish()
    }
}

impl<X> fmt::Debug for Server<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server").field("address", &self.address).finish_non_exhaustive()
    }
}

/// Collects the request body within the payload limit and dispatches it.
///
/// An empty registry leaves the transport default: `200` with an empty body.
pub(crate) async fn respond<X, B>(dispatcher: &Dispatcher<X>, request: Request<B>) -> Response<ResponseBody>
where
    X: Send + 'static,
    B: Body,
    B::Error: Into<BoxError>,
{
    let limit = dispatcher.config().payload_limit;
    let (parts, body) = request.into_parts();

    let bytes: Bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(limit, path = parts.uri.path(), "request body exceed the payload limit");
            return plain_response(StatusCode::PAYLOAD_TOO_LARGE, "payload too large");
        }
        Err(e) => {
            warn!(cause = %e, "failed to read request body");
            return plain_response(StatusCode::BAD_REQUEST, "invalid request body");
        }
    };

    match dispatcher.dispatch(Request::from_parts(parts, bytes)).await {
        Some(response) => response,
        None => Response::new(ResponseBody::empty()),
    }
}

fn plain_response(status: StatusCode, message: &'static str) -> Response<ResponseBody> {
    let mut response = Response::new(ResponseBody::from(message));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
