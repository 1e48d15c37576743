use serde::Deserialize;

/// Default upper bound of a request body accepted by the decoders, 4 MiB.
pub const DEFAULT_PAYLOAD_LIMIT: usize = 4 * 1024 * 1024;

/// Decoding settings shared by every request of one dispatcher.
///
/// Built once at setup and handed to the dispatcher, every [`RequestContext`](crate::RequestContext)
/// reads it through [`RequestContext::config`](crate::RequestContext::config).
///
/// ```
/// # use maze_web::DecoderConfig;
/// let config: DecoderConfig = serde_json::from_str(r#"{ "payload_limit": 1024 }"#).unwrap();
/// assert_eq!(config.payload_limit, 1024);
/// assert!(!config.require_json_content_type);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Maximum body size in bytes, for the server glue and for [`payload`](crate::RequestContext::payload).
    pub payload_limit: usize,
    /// Rejects JSON payloads whose `Content-Type` is not `application/json`.
    pub require_json_content_type: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self { payload_limit: DEFAULT_PAYLOAD_LIMIT, require_json_content_type: false }
    }
}

impl DecoderConfig {
    pub fn with_payload_limit(mut self, payload_limit: usize) -> Self {
        self.payload_limit = payload_limit;
        self
    }

    pub fn with_json_content_type_required(mut self, required: bool) -> Self {
        self.require_json_content_type = required;
        self
    }
}
