use thiserror::Error;

/// Failure of one of the typed decoders on [`RequestContext`](crate::RequestContext).
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid json payload: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("invalid query string: {source}")]
    Query {
        #[from]
        source: serde_qs::Error,
    },

    #[error("invalid request variables: {source}")]
    Vars {
        #[from]
        source: serde_urlencoded::de::Error,
    },

    #[error("can't encode request variables: {source}")]
    Encode {
        #[from]
        source: serde_urlencoded::ser::Error,
    },

    #[error("payload size {size} exceed the limit {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },
}

impl DecodeError {
    pub fn payload_too_large(size: usize, limit: usize) -> Self {
        Self::PayloadTooLarge { size, limit }
    }

    pub fn unsupported_content_type<S: ToString>(content_type: S) -> Self {
        Self::UnsupportedContentType { content_type: content_type.to_string() }
    }
}

/// Failure while declaring a [`JsonRpc`](crate::JsonRpc) service.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RpcError {
    #[error("unknown action: {name}")]
    UnknownAction { name: String },

    #[error("duplicated action: {name}")]
    DuplicatedAction { name: String },

    #[error("invalid action name: '{name}', it must be a non empty relative name")]
    InvalidActionName { name: String },
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("dispatcher must be set")]
    MissingDispatcher,

    #[error("address must be set")]
    MissingAddress,

    #[error("invalid address: {source}")]
    InvalidAddress {
        #[from]
        source: std::io::Error,
    },
}
