use thiserror::Error;

pub mod code {
    pub const VALIDATION_INVALID_ARGUMENT: &str = "EDGE_METHOD_VALIDATION_INVALID_ARGUMENT";
    pub const AUTH_TOKEN_UNAVAILABLE: &str = "EDGE_METHOD_AUTH_TOKEN_UNAVAILABLE";
    pub const AUTH_TRUST_BUNDLE_UNAVAILABLE: &str = "EDGE_METHOD_AUTH_TRUST_BUNDLE_UNAVAILABLE";
    pub const BUILD_ENVELOPE_FAILED: &str = "EDGE_METHOD_BUILD_ENVELOPE_FAILED";
    pub const TRANSPORT_HTTP_STATUS: &str = "EDGE_METHOD_TRANSPORT_HTTP_STATUS";
    pub const TRANSPORT_TLS_CONFIG: &str = "EDGE_METHOD_TRANSPORT_TLS_CONFIG";
    pub const TRANSPORT_REQUEST_FAILED: &str = "EDGE_METHOD_TRANSPORT_REQUEST_FAILED";
    pub const DECODE_MALFORMED_RESPONSE: &str = "EDGE_METHOD_DECODE_MALFORMED_RESPONSE";
    pub const CONFIG_INVALID: &str = "EDGE_METHOD_CONFIG_INVALID";
}

/// Coarse grouping of [`InvokeError`], one per failing stage family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCategory {
    Validation,
    Auth,
    Build,
    Transport,
    Decode,
}

/// Single-value outcome for callers that only distinguish "bad input" from
/// "everything else failed".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClientResult {
    Ok,
    InvalidArg,
    Error,
}

impl ClientResult {
    pub fn from_outcome<T>(outcome: &Result<T, InvokeError>) -> Self {
        match outcome {
            Ok(_) => Self::Ok,
            Err(err) => err.client_result(),
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("shared access key is not valid base64: {0}")]
    InvalidKey(String),
    #[error("sas token signing failed: {0}")]
    Signing(String),
    #[error("system clock is before the unix epoch")]
    Clock,
    #[error("trust bundle unavailable: {0}")]
    TrustBundle(String),
    #[error("authorization provider failed: {0}")]
    Provider(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::TrustBundle(_) => code::AUTH_TRUST_BUNDLE_UNAVAILABLE,
            _ => code::AUTH_TOKEN_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error("request body formatting failed: {0}")]
    Format(String),
    #[error("header '{0}' is already present")]
    DuplicateHeader(String),
    #[error("header '{0}' is not present")]
    MissingHeader(String),
    #[error("header '{0}' contains a line break")]
    InvalidHeaderValue(String),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("http request returned status {status}")]
    Status { status: u16 },
    #[error("tls configuration failed: {0}")]
    TlsConfig(String),
    #[error("http request failed: {0}")]
    Request(String),
    #[error("reading http response failed: {0}")]
    Io(String),
}

impl TransportError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Status { .. } => code::TRANSPORT_HTTP_STATUS,
            Self::TlsConfig(_) => code::TRANSPORT_TLS_CONFIG,
            Self::Request(_) | Self::Io(_) => code::TRANSPORT_REQUEST_FAILED,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("response body is not valid utf-8")]
    NotUtf8,
    #[error("response body is not valid json: {0}")]
    Malformed(String),
    #[error("response body is not a json object")]
    NotAnObject,
    #[error("response is missing field '{0}'")]
    MissingField(&'static str),
    #[error("response field 'status' is not a number")]
    NonNumericStatus,
    #[error("response field 'status' is out of range")]
    StatusOutOfRange,
    #[error("re-serializing response payload failed: {0}")]
    Serialize(String),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InvokeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl InvokeError {
    pub fn invalid_argument(field: &str, reason: &str) -> Self {
        Self::InvalidArgument(format!("'{field}' {reason}"))
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument(_) => ErrorCategory::Validation,
            Self::Auth(_) => ErrorCategory::Auth,
            Self::Build(_) => ErrorCategory::Build,
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Decode(_) => ErrorCategory::Decode,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => code::VALIDATION_INVALID_ARGUMENT,
            Self::Auth(err) => err.code(),
            Self::Build(_) => code::BUILD_ENVELOPE_FAILED,
            Self::Transport(err) => err.code(),
            Self::Decode(_) => code::DECODE_MALFORMED_RESPONSE,
        }
    }

    pub fn client_result(&self) -> ClientResult {
        match self {
            Self::InvalidArgument(_) => ClientResult::InvalidArg,
            _ => ClientResult::Error,
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingVariable(&'static str),
    #[error("auth scheme '{0}' is not supported, only SasToken")]
    UnsupportedAuthScheme(String),
    #[error("hub hostname '{0}' is invalid, expected '<name>.<suffix>'")]
    InvalidHubHostname(String),
    #[error("connection string is missing '{0}'")]
    MissingConnectionStringField(&'static str),
    #[error("connection string segment '{0}' is not a key=value pair")]
    MalformedConnectionString(String),
    #[error("config field '{field}' {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("reading config failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config failed: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        code::CONFIG_INVALID
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField { field, reason: reason.into() }
    }
}
