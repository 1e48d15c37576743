//! The response sink handed to handlers, and the filter that buffers it.

use crate::body::ResponseBody;
use crate::handler::{Handler, HandlerResult};
use crate::RequestContext;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::FutureExt;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Response, StatusCode};
use std::panic::AssertUnwindSafe;
use tracing::warn;

/// Accumulates the status, headers and body a chain produces for one request.
///
/// The first body write commits the response: once committed, status and header changes are
/// ignored with a warning, like on a real connection where they already went out. A deferred
/// writer, see [`ResponseWriter::deferred`], never commits and keeps headers mutable until it
/// is flushed.
#[derive(Debug)]
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: WriterBody,
    committed: bool,
    deferred: bool,
}

#[derive(Debug)]
enum WriterBody {
    Buffered(BytesMut),
    Streaming(ResponseBody),
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: WriterBody::Buffered(BytesMut::new()),
            committed: false,
            deferred: false,
        }
    }

    /// A writer whose status and headers stay mutable after body writes.
    pub fn deferred() -> Self {
        Self { deferred: true, ..Self::new() }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable headers, `None` once the response is committed.
    pub fn headers_mut(&mut self) -> Option<&mut HeaderMap> {
        if self.committed { None } else { Some(&mut self.headers) }
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn set_status(&mut self, status: StatusCode) {
        if self.committed {
            warn!(current = %self.status, ignored = %status, "response already committed, status change ignored");
            return;
        }
        self.status = status;
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.committed {
            warn!(header = %name, "response already committed, header change ignored");
            return;
        }
        self.headers.insert(name, value);
    }

    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.committed {
            warn!(header = %name, "response already committed, header change ignored");
            return;
        }
        self.headers.append(name, value);
    }

    /// Appends bytes to the body and commits the response.
    pub fn write(&mut self, bytes: impl AsRef<[u8]>) {
        match &mut self.body {
            WriterBody::Buffered(buffer) => buffer.extend_from_slice(bytes.as_ref()),
            WriterBody::Streaming(_) => {
                warn!("response body is streaming, write ignored");
                return;
            }
        }
        self.commit();
    }

    /// Replaces the body with a stream and commits the response.
    pub fn stream(&mut self, body: ResponseBody) {
        if self.committed {
            warn!("response already committed, stream ignored");
            return;
        }
        self.body = WriterBody::Streaming(body);
        self.commit();
    }

    fn commit(&mut self) {
        if !self.deferred {
            self.committed = true;
        }
    }

    /// The bytes written so far, `None` for a streaming body.
    pub fn buffered_body(&self) -> Option<&[u8]> {
        match &self.body {
            WriterBody::Buffered(buffer) => Some(&buffer[..]),
            WriterBody::Streaming(_) => None,
        }
    }

    fn has_body(&self) -> bool {
        match &self.body {
            WriterBody::Buffered(buffer) => !buffer.is_empty(),
            WriterBody::Streaming(_) => true,
        }
    }

    /// Moves status, headers and body into `target`, as if they were written to it directly.
    pub fn flush_into(self, target: &mut ResponseWriter) {
        let has_body = self.has_body();

        if !target.committed {
            target.status = self.status;
            target.headers.extend(self.headers);
        } else {
            warn!("target response already committed, status and headers dropped");
        }

        match self.body {
            WriterBody::Buffered(buffer) if has_body => target.write(buffer.freeze()),
            WriterBody::Buffered(_) => {}
            WriterBody::Streaming(body) => target.stream(body),
        }
    }

    pub fn into_response(self) -> Response<ResponseBody> {
        let body = match self.body {
            WriterBody::Buffered(buffer) => ResponseBody::once(buffer.freeze()),
            WriterBody::Streaming(body) => body,
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Buffers everything the rest of the chain writes, so it can still set headers and status
/// after writing body bytes.
///
/// The buffer replaces the context's response for the duration of [`RequestContext::proceed`].
/// The original writer is restored on every exit: success, error and panic. The buffered
/// response is flushed into it only on success.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseBuffer;

#[async_trait]
impl<X: Send + 'static> Handler<X> for ResponseBuffer {
    async fn handle(&self, ctx: &mut RequestContext<X>) -> HandlerResult {
        let original = ctx.replace_response(ResponseWriter::deferred());
        let outcome = AssertUnwindSafe(ctx.proceed()).catch_unwind().await;
        let buffered = ctx.replace_response(original);

        match outcome {
            Ok(Ok(())) => {
                buffered.flush_into(ctx.response_mut());
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderConfig;
    use crate::filter::Filter;
    use crate::handler::{BoxError, SharedHandler, handler_fn};
    use crate::log::Logger;
    use bytes::Bytes;
    use http::{Method, Request};
    use http_body_util::BodyExt;
    use std::sync::Arc;

    fn context(filters: Vec<Filter>) -> RequestContext {
        let request = Request::builder().method(Method::GET).uri("/buffered").body(Bytes::new()).unwrap();
        RequestContext::new(filters.into(), request, (), Arc::new(DecoderConfig::default()), Logger::current())
    }

    fn late_header_writer() -> SharedHandler {
        Arc::new(handler_fn(|ctx: &mut RequestContext| {
            async move {
                ctx.response_mut().write("body first");
                ctx.response_mut().insert_header(HeaderName::from_static("x-late"), HeaderValue::from_static("yes"));
                ctx.response_mut().set_status(StatusCode::CREATED);
                Ok::<(), BoxError>(())
            }
            .boxed()
        }))
    }

    #[test]
    fn first_write_commits() {
        let mut writer = ResponseWriter::new();
        writer.set_status(StatusCode::ACCEPTED);
        writer.write("hello");
        assert!(writer.is_committed());

        writer.set_status(StatusCode::NOT_FOUND);
        writer.insert_header(HeaderName::from_static("x-ignored"), HeaderValue::from_static("1"));
        assert!(writer.headers_mut().is_none());
        writer.write(" world");

        assert_eq!(writer.status(), StatusCode::ACCEPTED);
        assert!(writer.headers().get("x-ignored").is_none());
        assert_eq!(writer.buffered_body(), Some(&b"hello world"[..]));
    }

    #[test]
    fn deferred_writer_keeps_headers_open() {
        let mut writer = ResponseWriter::deferred();
        writer.write("x");
        writer.set_status(StatusCode::CREATED);
        assert!(!writer.is_committed());
        assert_eq!(writer.status(), StatusCode::CREATED);
    }

    #[test]
    fn flush_copies_everything() {
        let mut buffered = ResponseWriter::deferred();
        buffered.write("payload");
        buffered.insert_header(http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        buffered.set_status(StatusCode::CREATED);

        let mut target = ResponseWriter::new();
        buffered.flush_into(&mut target);

        assert!(target.is_committed());
        assert_eq!(target.status(), StatusCode::CREATED);
        assert_eq!(target.headers()[http::header::CONTENT_TYPE], "text/plain");
        assert_eq!(target.buffered_body(), Some(&b"payload"[..]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn buffer_allows_late_headers() {
        let mut ctx = context(vec![Filter::ruleless(Arc::new(ResponseBuffer)), Filter::ruleless(late_header_writer())]);
        ctx.proceed().await.unwrap();

        let response = ctx.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-late"], "yes");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from("body first"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn buffer_restores_writer_on_error() {
        let failing: SharedHandler = Arc::new(handler_fn(|ctx: &mut RequestContext| {
            async move {
                ctx.response_mut().write("partial");
                Err::<(), BoxError>("failed after write".into())
            }
            .boxed()
        }));
        let mut ctx = context(vec![Filter::ruleless(Arc::new(ResponseBuffer)), Filter::ruleless(failing)]);

        let error = ctx.proceed().await.unwrap_err();
        assert_eq!(error.to_string(), "failed after write");

        assert!(!ctx.response().is_committed());
        assert_eq!(ctx.response().buffered_body(), Some(&b""[..]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn buffer_restores_writer_on_panic() {
        let panicking: SharedHandler = Arc::new(handler_fn(|ctx: &mut RequestContext| {
            async move {
                ctx.response_mut().write("partial");
                let fail = ctx.path() == "/buffered";
                assert!(!fail, "handler panicked");
                Ok::<(), BoxError>(())
            }
            .boxed()
        }));
        let mut ctx = context(vec![Filter::ruleless(Arc::new(ResponseBuffer)), Filter::ruleless(panicking)]);
        ctx.response_mut().insert_header(HeaderName::from_static("x-original"), HeaderValue::from_static("1"));

        let outcome = AssertUnwindSafe(ctx.proceed()).catch_unwind().await;
        assert!(outcome.is_err());

        assert_eq!(ctx.response().headers()["x-original"], "1");
        assert!(!ctx.response().is_committed());
        assert_eq!(ctx.response().buffered_body(), Some(&b""[..]));
    }
}
