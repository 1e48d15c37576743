//! Typed decoding of request variables and payloads.
//!
//! Every decoder reads from the context's request and its [`DecoderConfig`](crate::DecoderConfig).
//! Path and merged variables go through `serde_urlencoded`, so scalar fields are parsed from
//! their string form; query strings go through `serde_qs`, which also understands nested keys.
//!
//! # Example
//! ```
//! # use serde::Deserialize;
//! # use maze_web::{RequestContext, HandlerResult};
//! #[derive(Deserialize)]
//! struct Greeting {
//!     id: u64,
//!     lang: Option<String>,
//! }
//!
//! async fn greet(ctx: &mut RequestContext) -> HandlerResult {
//!     let greeting: Greeting = ctx.vars()?;
//!     ctx.reply(format!("{} {:?}", greeting.id, greeting.lang));
//!     Ok(())
//! }
//! ```

use crate::error::DecodeError;
use crate::RequestContext;
use http::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use tracing::debug;

impl<X: Send + 'static> RequestContext<X> {
    /// Decodes the JSON request body.
    ///
    /// An empty body decodes as `null`, so `Option<T>` reads it as `None`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let config = self.config();
        let body = self.body();
        if body.len() > config.payload_limit {
            return Err(DecodeError::payload_too_large(body.len(), config.payload_limit));
        }

        if config.require_json_content_type {
            self.check_json_content_type()?;
        }

        if body.is_empty() {
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(serde_json::from_slice(body)?)
    }

    fn check_json_content_type(&self) -> Result<(), DecodeError> {
        let content_type = self.headers().get(CONTENT_TYPE).and_then(|value| value.to_str().ok()).unwrap_or_default();

        let is_json = content_type
            .parse::<mime::Mime>()
            .is_ok_and(|mime| mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON));

        if is_json {
            Ok(())
        } else {
            debug!(content_type, "reject payload");
            Err(DecodeError::unsupported_content_type(content_type))
        }
    }

    /// Decodes the values captured by the matched template rule.
    pub fn path_vars<T: DeserializeOwned>(&mut self) -> Result<T, DecodeError> {
        let encoded = crate::Values::from(self.path_params()).to_single_query_string()?;
        Ok(serde_urlencoded::from_str(&encoded)?)
    }

    /// Decodes the query string, a request without query decodes as an empty one.
    pub fn query_vars<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        Ok(serde_qs::from_str(self.query().unwrap_or_default())?)
    }

    /// Decodes path and query values together, a query value overrides a path value.
    pub fn vars<T: DeserializeOwned>(&mut self) -> Result<T, DecodeError> {
        let encoded = self.values().to_single_query_string()?;
        Ok(serde_urlencoded::from_str(&encoded)?)
    }
}
