//! Response helpers on the request context.
//!
//! [`RequestContext::text`] and [`RequestContext::json`] set the content type and
//! `Expires: -1` before writing, so intermediate caches never keep dynamic responses.
//! [`RequestContext::reply`] only writes.

use crate::RequestContext;
use http::header::{CONTENT_TYPE, EXPIRES};
use http::{HeaderValue, StatusCode};
use serde::Serialize;

impl<X: Send + 'static> RequestContext<X> {
    /// Writes `value` as `text/plain` with the given status.
    pub fn text(&mut self, status: StatusCode, value: impl ToString) {
        let response = self.response_mut();
        response.insert_header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        response.insert_header(EXPIRES, HeaderValue::from_static("-1"));
        response.set_status(status);
        response.write(value.to_string());
    }

    /// Serializes `value` as `application/json` with the given status.
    ///
    /// Nothing is written when serialization fails.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: StatusCode, value: &T) -> Result<(), serde_json::Error> {
        let body = serde_json::to_vec(value)?;

        let response = self.response_mut();
        response.insert_header(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        response.insert_header(EXPIRES, HeaderValue::from_static("-1"));
        response.set_status(status);
        response.write(body);
        Ok(())
    }

    /// Writes the string form of `value` to the body, headers untouched.
    pub fn reply(&mut self, value: impl ToString) {
        self.response_mut().write(value.to_string());
    }
}
